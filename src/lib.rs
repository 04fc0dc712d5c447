pub mod aggregator;
pub mod config;
pub mod merge;
pub mod observability;
pub mod source;
pub mod store;
pub mod tracker;
pub mod value;

pub use aggregator::{
	AggregateSnapshot, Aggregator, LifecycleError, PassError, SnapshotError, SnapshotMarshaler,
	SourceSet,
};
pub use config::{ConfigError, ProviderConfig, Settings, ValidatedConfig};
pub use merge::{MergeError, merge};
pub use source::{SourceDescriptor, SourceFormat};
pub use store::{ObjectStore, StoreError};
pub use tracker::{SourceSnapshot, SourceTracker, TrackerError};
pub use value::{CanonicalValue, NormalizeError};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use thiserror::Error;
use tokio::io::AsyncReadExt;

use crate::config::ConfigError;
use crate::source::{SourceDescriptor, SourceFormat};
use crate::store::{ObjectStore, StoreError};
use crate::value::{self, CanonicalValue, NormalizeError};

/// Value captured from one object at one version.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSnapshot {
	pub descriptor: SourceDescriptor,
	pub value: CanonicalValue,
	pub observed_modified_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum TrackerError {
	#[error("unable to get attributes for {object}: {source}")]
	Probe { object: String, source: StoreError },

	#[error("failed to get object {object}: {source}")]
	Fetch { object: String, source: StoreError },

	#[error("failed to read object {object}: {source}")]
	Read {
		object: String,
		source: std::io::Error,
	},

	#[error("failed to decode {format} for {object}: {message}")]
	Decode {
		object: String,
		format: SourceFormat,
		message: String,
	},

	#[error("failed to convert decoded {format} to canonical values for {object}: {source}")]
	Normalize {
		object: String,
		format: SourceFormat,
		source: NormalizeError,
	},
}

impl TrackerError {
	/// `bucket/key` of the object the error concerns.
	pub fn object(&self) -> &str {
		match self {
			TrackerError::Probe { object, .. }
			| TrackerError::Fetch { object, .. }
			| TrackerError::Read { object, .. }
			| TrackerError::Decode { object, .. }
			| TrackerError::Normalize { object, .. } => object,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decoder {
	Json,
	Yaml,
}

impl Decoder {
	fn format(self) -> SourceFormat {
		match self {
			Decoder::Json => SourceFormat::Json,
			Decoder::Yaml => SourceFormat::Yaml,
		}
	}
}

/// Change detection and fetch-and-decode for a single object.
///
/// The tracker caches the last successfully decoded value. A failed probe or
/// retrieval never clears or alters that cache.
pub struct SourceTracker {
	descriptor: SourceDescriptor,
	decoder: Decoder,
	store: Arc<dyn ObjectStore>,
	snapshot: Option<SourceSnapshot>,
}

impl SourceTracker {
	/// Create a tracker for a validated descriptor. The descriptor's format
	/// must already be resolved.
	pub fn new(descriptor: SourceDescriptor, store: Arc<dyn ObjectStore>) -> Result<Self, ConfigError> {
		let decoder = match descriptor.format {
			SourceFormat::Json => Decoder::Json,
			SourceFormat::Yaml => Decoder::Yaml,
			SourceFormat::Unspecified => {
				return Err(ConfigError::UnresolvedFormat {
					object: descriptor.object_name(),
				});
			}
		};
		Ok(Self {
			descriptor,
			decoder,
			store,
			snapshot: None,
		})
	}

	/// Seed the tracker with a previously observed value.
	pub fn with_snapshot(
		mut self,
		value: CanonicalValue,
		observed_modified_at: DateTime<Utc>,
	) -> Self {
		self.snapshot = Some(SourceSnapshot {
			descriptor: self.descriptor.clone(),
			value,
			observed_modified_at,
		});
		self
	}

	pub fn descriptor(&self) -> &SourceDescriptor {
		&self.descriptor
	}

	pub fn snapshot(&self) -> Option<&SourceSnapshot> {
		self.snapshot.as_ref()
	}

	/// Whether the object has a newer version than the cached one.
	///
	/// Without a cached value this is always true and the store is not
	/// contacted. A failed probe is an error, never "changed".
	pub async fn has_changed(&self) -> Result<bool, TrackerError> {
		let Some(snapshot) = &self.snapshot else {
			return Ok(true);
		};

		let meta = self
			.store
			.head_object(&self.descriptor.bucket, &self.descriptor.key)
			.await
			.map_err(|source| {
				warn!(
					"unable to get attributes for {}: {}",
					self.descriptor.object_name(),
					source
				);
				TrackerError::Probe {
					object: self.descriptor.object_name(),
					source,
				}
			})?;

		Ok(meta.last_modified > snapshot.observed_modified_at)
	}

	/// Fetch, decode and normalize the object, replacing the cached snapshot
	/// only when every step succeeds.
	pub async fn retrieve(&mut self) -> Result<(), TrackerError> {
		let object = self.descriptor.object_name();

		let fetched = self
			.store
			.get_object(&self.descriptor.bucket, &self.descriptor.key)
			.await
			.map_err(|source| {
				warn!("failed to get object {}: {}", object, source);
				TrackerError::Fetch {
					object: object.clone(),
					source,
				}
			})?;

		let mut raw = Vec::new();
		let mut body = fetched.body;
		body.read_to_end(&mut raw).await.map_err(|source| {
			warn!("failed to read object {}: {}", object, source);
			TrackerError::Read {
				object: object.clone(),
				source,
			}
		})?;

		let value = self.decode(&object, &raw).inspect_err(|e| warn!("{}", e))?;

		// Never move the known version backwards, even if the store does.
		let observed_modified_at = match &self.snapshot {
			Some(prev) if prev.observed_modified_at > fetched.last_modified => {
				prev.observed_modified_at
			}
			_ => fetched.last_modified,
		};

		debug!(
			"retrieved {} ({} bytes, modified {})",
			object,
			raw.len(),
			fetched.last_modified
		);

		self.snapshot = Some(SourceSnapshot {
			descriptor: self.descriptor.clone(),
			value,
			observed_modified_at,
		});
		Ok(())
	}

	fn decode(&self, object: &str, raw: &[u8]) -> Result<CanonicalValue, TrackerError> {
		let format = self.decoder.format();
		let decode_error = |message: String| TrackerError::Decode {
			object: object.to_string(),
			format,
			message,
		};
		let normalize_error = |source: NormalizeError| TrackerError::Normalize {
			object: object.to_string(),
			format,
			source,
		};

		match self.decoder {
			Decoder::Json => {
				let tree: serde_json::Value =
					serde_json::from_slice(raw).map_err(|e| decode_error(e.to_string()))?;
				value::from_json(tree).map_err(normalize_error)
			}
			Decoder::Yaml => {
				let tree: serde_yaml::Value =
					serde_yaml::from_slice(raw).map_err(|e| decode_error(e.to_string()))?;
				value::from_yaml(tree).map_err(normalize_error)
			}
		}
	}
}

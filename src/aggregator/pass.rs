use std::sync::Arc;

use log::{debug, info};
use thiserror::Error;

use crate::config::{ConfigError, ValidatedConfig};
use crate::merge::{self, MergeError};
use crate::observability::AggregatorMetrics;
use crate::store::ObjectStore;
use crate::tracker::{SourceTracker, TrackerError};
use crate::value::CanonicalValue;

/// Why a poll pass produced no merged value.
#[derive(Debug, Error)]
pub enum PassError {
	#[error(transparent)]
	Source(#[from] TrackerError),

	#[error("failed to merge {object}: {source}")]
	Merge { object: String, source: MergeError },
}

/// The ordered trackers of one aggregator and the logic of a single pass.
pub struct SourceSet {
	trackers: Vec<SourceTracker>,
	metrics: Option<Arc<AggregatorMetrics>>,
}

impl SourceSet {
	pub fn new(trackers: Vec<SourceTracker>) -> Self {
		Self {
			trackers,
			metrics: None,
		}
	}

	/// One tracker per configured source, all sharing `store`.
	pub fn from_config(
		config: &ValidatedConfig,
		store: Arc<dyn ObjectStore>,
	) -> Result<Self, ConfigError> {
		let trackers = config
			.sources
			.iter()
			.map(|d| SourceTracker::new(d.clone(), Arc::clone(&store)))
			.collect::<Result<Vec<_>, _>>()?;
		Ok(Self::new(trackers))
	}

	pub fn with_metrics(mut self, metrics: Arc<AggregatorMetrics>) -> Self {
		self.metrics = Some(metrics);
		self
	}

	pub fn trackers(&self) -> &[SourceTracker] {
		&self.trackers
	}

	pub(crate) fn metrics(&self) -> Option<&Arc<AggregatorMetrics>> {
		self.metrics.as_ref()
	}

	/// Run one pass: probe every source, re-fetch the changed ones, and merge
	/// all cached values in declaration order.
	///
	/// Returns `Ok(None)` when nothing changed. The first probe or retrieval
	/// error aborts the pass; trackers keep whatever they held before.
	pub async fn poll_once(&mut self) -> Result<Option<CanonicalValue>, PassError> {
		if let Some(m) = &self.metrics {
			m.passes_total.inc();
		}
		let result = self.run_pass().await;
		if result.is_err() {
			if let Some(m) = &self.metrics {
				m.pass_failures_total.inc();
			}
		}
		result
	}

	async fn run_pass(&mut self) -> Result<Option<CanonicalValue>, PassError> {
		let mut changed = Vec::with_capacity(self.trackers.len());
		for (idx, tracker) in self.trackers.iter().enumerate() {
			if tracker.has_changed().await? {
				changed.push(idx);
			}
		}

		if changed.is_empty() {
			debug!("no source changed");
			return Ok(None);
		}

		for idx in changed {
			let tracker = &mut self.trackers[idx];
			info!("source {} changed, fetching", tracker.descriptor());
			tracker.retrieve().await?;
			if let Some(m) = &self.metrics {
				m.source_fetches_total.inc();
			}
		}

		let held: Vec<_> = self.trackers.iter().filter_map(|t| t.snapshot()).collect();
		merge::merge(held.iter().map(|s| &s.value))
			.map(Some)
			.map_err(|source| {
				let MergeError::RootNotMapping { position, .. } = &source;
				PassError::Merge {
					object: held
						.get(*position)
						.map(|s| s.descriptor.object_name())
						.unwrap_or_default(),
					source,
				}
			})
	}
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	use chrono::{Duration, Utc};
	use serde_json::json;

	use super::*;
	use crate::source::{SourceDescriptor, SourceFormat};
	use crate::store::MemoryObjectStore;
	use crate::value::from_json;

	fn set(store: &Arc<MemoryObjectStore>, keys: &[&str]) -> SourceSet {
		let config = ValidatedConfig {
			poll_interval: std::time::Duration::from_secs(1),
			sources: keys
				.iter()
				.map(|k| SourceDescriptor::new("b", *k, SourceFormat::Json))
				.collect(),
		};
		SourceSet::from_config(&config, store.clone()).unwrap()
	}

	#[tokio::test]
	async fn first_pass_fetches_everything_then_goes_quiet() {
		let store = Arc::new(MemoryObjectStore::new());
		let now = Utc::now();
		store.put("b", "one.json", r#"{"x": 1, "l": [1]}"#, now);
		store.put("b", "two.json", r#"{"x": 2, "l": [2]}"#, now);
		let metrics = Arc::new(AggregatorMetrics::new().unwrap());
		let mut sources = set(&store, &["one.json", "two.json"]).with_metrics(metrics.clone());

		let merged = sources.poll_once().await.unwrap().unwrap();
		assert_eq!(merged, from_json(json!({"x": 2, "l": [1, 2]})).unwrap());
		assert_eq!(store.head_calls(), 0);

		assert!(sources.poll_once().await.unwrap().is_none());
		assert_eq!(store.head_calls(), 2);
		assert_eq!(store.get_calls(), 2);
		assert_eq!(metrics.passes_total.get(), 2);
		assert_eq!(metrics.source_fetches_total.get(), 2);
	}

	#[tokio::test]
	async fn only_changed_sources_are_refetched() {
		let store = Arc::new(MemoryObjectStore::new());
		let now = Utc::now();
		store.put("b", "one.json", r#"{"x": 1}"#, now);
		store.put("b", "two.json", r#"{"y": 1}"#, now);
		let mut sources = set(&store, &["one.json", "two.json"]);
		sources.poll_once().await.unwrap();

		store.put("b", "one.json", r#"{"x": 5}"#, now + Duration::seconds(1));
		let merged = sources.poll_once().await.unwrap().unwrap();
		assert_eq!(merged, from_json(json!({"x": 5, "y": 1})).unwrap());
		assert_eq!(store.get_calls(), 3);
	}

	#[tokio::test]
	async fn merge_failure_names_the_source() {
		let store = Arc::new(MemoryObjectStore::new());
		store.put("b", "one.json", r#"{"x": 1}"#, Utc::now());
		store.put("b", "list.json", "[1, 2]", Utc::now());
		let metrics = Arc::new(AggregatorMetrics::new().unwrap());
		let mut sources = set(&store, &["one.json", "list.json"]).with_metrics(metrics.clone());

		let err = sources.poll_once().await.unwrap_err();
		assert!(matches!(err, PassError::Merge { ref object, .. } if object == "b/list.json"));
		assert_eq!(metrics.pass_failures_total.get(), 1);
	}

	#[tokio::test]
	async fn probe_failure_aborts_the_pass() {
		let store = Arc::new(MemoryObjectStore::new());
		let now = Utc::now();
		store.put("b", "one.json", r#"{"x": 1}"#, now);
		store.put("b", "two.json", r#"{"y": 1}"#, now);
		let mut sources = set(&store, &["one.json", "two.json"]);
		sources.poll_once().await.unwrap();

		store.set_unavailable("b", "one.json", Some("Oh no!"));
		store.put("b", "two.json", r#"{"y": 2}"#, now + Duration::seconds(1));
		let err = sources.poll_once().await.unwrap_err();
		assert!(matches!(err, PassError::Source(TrackerError::Probe { .. })));
		// two.json was not fetched because the pass stopped at the probe
		assert_eq!(store.get_calls(), 2);
		assert_eq!(
			sources.trackers()[1].snapshot().unwrap().value,
			from_json(json!({"y": 1})).unwrap()
		);
	}
}

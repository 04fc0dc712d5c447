use prometheus::{IntCounter, Opts, Registry, TextEncoder};

/// Prometheus counters for the aggregator poll loop.
pub struct AggregatorMetrics {
	registry: Registry,

	pub passes_total: IntCounter,
	pub pass_failures_total: IntCounter,
	pub snapshots_emitted_total: IntCounter,
	pub source_fetches_total: IntCounter,
}

fn counter(name: &str, help: &str) -> Result<IntCounter, prometheus::Error> {
	IntCounter::with_opts(Opts::new(name, help).namespace("mimir"))
}

impl AggregatorMetrics {
	pub fn new() -> Result<Self, prometheus::Error> {
		let registry = Registry::new();

		let passes_total = counter("passes_total", "Total poll passes run")?;
		let pass_failures_total =
			counter("pass_failures_total", "Poll passes that ended in a failure snapshot")?;
		let snapshots_emitted_total =
			counter("snapshots_emitted_total", "Snapshots delivered to the sink")?;
		let source_fetches_total =
			counter("source_fetches_total", "Objects fetched after a detected change")?;

		registry.register(Box::new(passes_total.clone()))?;
		registry.register(Box::new(pass_failures_total.clone()))?;
		registry.register(Box::new(snapshots_emitted_total.clone()))?;
		registry.register(Box::new(source_fetches_total.clone()))?;

		Ok(Self {
			registry,
			passes_total,
			pass_failures_total,
			snapshots_emitted_total,
			source_fetches_total,
		})
	}

	/// Encode metrics in Prometheus text format
	pub fn encode(&self) -> String {
		let encoder = TextEncoder::new();
		let metric_families = self.registry.gather();
		match encoder.encode_to_string(&metric_families) {
			Ok(s) => s,
			Err(e) => {
				log::error!("Failed to encode metrics: {}", e);
				String::new()
			}
		}
	}
}

#[cfg(feature = "unit-tests")]
mod tests {
	#[test]
	fn metrics_are_namespaced() {
		let metrics = super::AggregatorMetrics::new().unwrap();
		metrics.passes_total.inc();
		let text = metrics.encode();
		assert!(text.contains("mimir_passes_total 1"));
		assert!(text.contains("mimir_snapshots_emitted_total 0"));
	}

	#[test]
	fn metrics_increment() {
		let metrics = super::AggregatorMetrics::new().unwrap();
		metrics.source_fetches_total.inc_by(3);
		metrics.pass_failures_total.inc();
		assert_eq!(metrics.source_fetches_total.get(), 3);
		assert!(metrics.encode().contains("mimir_pass_failures_total 1"));
	}
}

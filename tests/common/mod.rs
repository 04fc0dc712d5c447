//! Fixtures and helpers shared by the integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use vanopticon_mimir::store::MemoryObjectStore;
use vanopticon_mimir::{
	AggregateSnapshot, Aggregator, CanonicalValue, SourceDescriptor, SourceFormat,
	ValidatedConfig, value,
};

pub const BUCKET: &str = "testbucket";

pub const JSON1: &str = r#"{
	"tls": {
		"certificates": [
			{"certFile": "certpath", "keyFile": "keypath"},
			{"certFile": "certpath2", "keyFile": "keypath2"}
		],
		"additional": "somevalue"
	}
}"#;

pub const JSON2: &str = r#"{
	"tls": {
		"certificates": [
			{"certFile": "certpath2", "keyFile": "keypath2"},
			{"certFile": "certpath", "keyFile": "keypath"}
		],
		"newAdditional": "diffvalue"
	}
}"#;

pub const YAML1: &str = "
tls:
  certificates:
    - certFile: /path/to/domain.cert
      keyFile: /path/to/domain.key
    - certFile: /path/to/other-domain.cert
      keyFile: /path/to/other-domain.key";

pub const MALFORMED_JSON: &str = r#"{"tls": {"certificates": ["#;

/// JSON1 merged over by YAML1.
pub fn json1_and_yaml1() -> CanonicalValue {
	value::from_json(json!({
		"tls": {
			"certificates": [
				{"certFile": "certpath", "keyFile": "keypath"},
				{"certFile": "certpath2", "keyFile": "keypath2"},
				{"certFile": "/path/to/domain.cert", "keyFile": "/path/to/domain.key"},
				{"certFile": "/path/to/other-domain.cert", "keyFile": "/path/to/other-domain.key"}
			],
			"additional": "somevalue"
		}
	}))
	.expect("fixture normalizes")
}

/// JSON2 merged over by YAML1.
pub fn json2_and_yaml1() -> CanonicalValue {
	value::from_json(json!({
		"tls": {
			"certificates": [
				{"certFile": "certpath2", "keyFile": "keypath2"},
				{"certFile": "certpath", "keyFile": "keypath"},
				{"certFile": "/path/to/domain.cert", "keyFile": "/path/to/domain.key"},
				{"certFile": "/path/to/other-domain.cert", "keyFile": "/path/to/other-domain.key"}
			],
			"newAdditional": "diffvalue"
		}
	}))
	.expect("fixture normalizes")
}

pub fn config(keys: &[(&str, SourceFormat)], poll_interval: Duration) -> ValidatedConfig {
	ValidatedConfig {
		poll_interval,
		sources: keys
			.iter()
			.map(|(key, format)| SourceDescriptor::new(BUCKET, *key, *format))
			.collect(),
	}
}

/// Start an aggregator over `store` and return it with its snapshot receiver.
pub fn start(
	store: &Arc<MemoryObjectStore>,
	keys: &[(&str, SourceFormat)],
	poll_interval: Duration,
) -> (Aggregator, mpsc::Receiver<AggregateSnapshot>) {
	let mut aggregator = Aggregator::new("test", config(keys, poll_interval), store.clone())
		.expect("sources resolve");
	let (tx, rx) = mpsc::channel(4);
	aggregator.start(tx).expect("fresh aggregator starts");
	(aggregator, rx)
}

/// Wait for the next snapshot, failing the test after a few seconds.
pub async fn next(rx: &mut mpsc::Receiver<AggregateSnapshot>) -> AggregateSnapshot {
	tokio::time::timeout(Duration::from_secs(5), rx.recv())
		.await
		.expect("snapshot within timeout")
		.expect("channel open")
}

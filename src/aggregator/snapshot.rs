use std::sync::Arc;

use thiserror::Error;

use super::PassError;
use crate::value::CanonicalValue;

#[derive(Debug, Error)]
pub enum SnapshotError {
	#[error("aggregation pass failed: {0}")]
	Pass(Arc<PassError>),

	#[error("failed to encode merged configuration: {0}")]
	Encode(#[from] serde_json::Error),
}

/// Produces the serialized form of an emitted snapshot on demand.
pub trait SnapshotMarshaler {
	fn marshal(&self) -> Result<Vec<u8>, SnapshotError>;
}

/// What one poll pass hands to the consumer: the merged configuration, or the
/// error that aborted the pass.
#[derive(Debug, Clone)]
pub struct AggregateSnapshot {
	outcome: Result<CanonicalValue, Arc<PassError>>,
}

impl AggregateSnapshot {
	pub fn from_value(value: CanonicalValue) -> Self {
		Self { outcome: Ok(value) }
	}

	pub fn failure(error: PassError) -> Self {
		Self {
			outcome: Err(Arc::new(error)),
		}
	}

	pub fn merged(&self) -> Option<&CanonicalValue> {
		self.outcome.as_ref().ok()
	}

	pub fn error(&self) -> Option<&PassError> {
		self.outcome.as_ref().err().map(|e| e.as_ref())
	}

	pub fn is_failure(&self) -> bool {
		self.outcome.is_err()
	}

	pub fn into_result(self) -> Result<CanonicalValue, Arc<PassError>> {
		self.outcome
	}
}

impl SnapshotMarshaler for AggregateSnapshot {
	fn marshal(&self) -> Result<Vec<u8>, SnapshotError> {
		match &self.outcome {
			Ok(value) => Ok(serde_json::to_vec(value)?),
			Err(e) => Err(SnapshotError::Pass(Arc::clone(e))),
		}
	}
}

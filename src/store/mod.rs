//! Object store capability consumed by source trackers.
//!
//! Trackers only need two things from a store: a cheap metadata probe that
//! reports an object's last-modified time without transferring its body, and
//! a body fetch. Credentials, retries and connection reuse are the adapter's
//! business.

pub mod fs;
pub mod http;
pub mod memory;

use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::io::AsyncRead;

use crate::config::{StoreKind, StoreSettings};

pub use fs::FsObjectStore;
pub use http::HttpObjectStore;
pub use memory::MemoryObjectStore;

/// Errors reported by object store adapters.
#[derive(Debug, Error)]
pub enum StoreError {
	#[error("request to {url} failed: {source}")]
	Http {
		url: String,
		source: reqwest::Error,
	},

	#[error("{url} returned status {status}")]
	Status {
		url: String,
		status: reqwest::StatusCode,
	},

	#[error("object {0} not found")]
	NotFound(String),

	#[error("object {0} has no Last-Modified header")]
	MissingLastModified(String),

	#[error("invalid Last-Modified value {value:?}: {reason}")]
	InvalidLastModified { value: String, reason: String },

	#[error("I/O error on {path}: {source}")]
	Io {
		path: String,
		source: std::io::Error,
	},

	#[error("invalid object path {0:?}")]
	InvalidPath(String),

	#[error("object store client could not be built: {0}")]
	Client(String),

	#[error("object store unavailable: {0}")]
	Unavailable(String),
}

/// Result of a metadata-only probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectMetadata {
	pub last_modified: DateTime<Utc>,
}

/// Result of a body fetch: a readable stream plus the object's version time.
pub struct ObjectBody {
	pub last_modified: DateTime<Utc>,
	pub body: Box<dyn AsyncRead + Send + Unpin>,
}

impl ObjectBody {
	/// Wrap an in-memory payload.
	pub fn from_bytes(last_modified: DateTime<Utc>, bytes: impl Into<Vec<u8>>) -> Self {
		Self {
			last_modified,
			body: Box::new(Cursor::new(bytes.into())),
		}
	}
}

impl fmt::Debug for ObjectBody {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ObjectBody")
			.field("last_modified", &self.last_modified)
			.finish_non_exhaustive()
	}
}

/// Minimal object store API used by the trackers.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
	/// Fetch the object's last-modified time without its body.
	async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, StoreError>;

	/// Fetch the object's body and last-modified time.
	async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody, StoreError>;
}

/// Build the adapter selected by `settings`.
pub fn from_settings(settings: &StoreSettings) -> Result<Arc<dyn ObjectStore>, StoreError> {
	match settings.kind {
		StoreKind::Http => Ok(Arc::new(HttpObjectStore::new(
			settings.endpoint.clone(),
			settings.timeout(),
			settings.bearer_token.clone(),
		)?)),
		StoreKind::Filesystem => Ok(Arc::new(FsObjectStore::new(settings.root.clone()))),
	}
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	use tokio::io::AsyncReadExt;

	use super::*;
	use crate::config::StoreSettings;

	#[tokio::test]
	async fn object_body_from_bytes_is_readable() {
		let mut body = ObjectBody::from_bytes(Utc::now(), b"{\"a\":1}".to_vec());
		let mut out = String::new();
		body.body.read_to_string(&mut out).await.unwrap();
		assert_eq!(out, "{\"a\":1}");
	}

	#[test]
	fn builds_each_adapter_kind() {
		let mut settings = StoreSettings::default();
		assert!(from_settings(&settings).is_ok());
		settings.kind = StoreKind::Filesystem;
		assert!(from_settings(&settings).is_ok());
	}
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{ObjectBody, ObjectMetadata, ObjectStore, StoreError};

#[derive(Debug, Clone)]
struct StoredObject {
	bytes: Vec<u8>,
	last_modified: DateTime<Utc>,
}

/// In-process object store.
///
/// Holds objects in memory and counts probe/fetch calls. Embedders use it to
/// feed configuration produced elsewhere in the process; it also backs the
/// test suites. `set_unavailable` simulates an outage for a single object.
#[derive(Default)]
pub struct MemoryObjectStore {
	objects: Mutex<HashMap<(String, String), StoredObject>>,
	outages: Mutex<HashMap<(String, String), String>>,
	head_calls: AtomicUsize,
	get_calls: AtomicUsize,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
	m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn id(bucket: &str, key: &str) -> (String, String) {
	(bucket.to_string(), key.to_string())
}

impl MemoryObjectStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Store (or replace) an object.
	pub fn put(
		&self,
		bucket: &str,
		key: &str,
		bytes: impl Into<Vec<u8>>,
		last_modified: DateTime<Utc>,
	) {
		lock(&self.objects).insert(
			id(bucket, key),
			StoredObject {
				bytes: bytes.into(),
				last_modified,
			},
		);
	}

	pub fn remove(&self, bucket: &str, key: &str) -> bool {
		lock(&self.objects).remove(&id(bucket, key)).is_some()
	}

	/// Make every call for one object fail with `reason`, or clear the outage
	/// with `None`.
	pub fn set_unavailable(&self, bucket: &str, key: &str, reason: Option<&str>) {
		let mut outages = lock(&self.outages);
		match reason {
			Some(r) => {
				outages.insert(id(bucket, key), r.to_string());
			}
			None => {
				outages.remove(&id(bucket, key));
			}
		}
	}

	pub fn head_calls(&self) -> usize {
		self.head_calls.load(Ordering::Relaxed)
	}

	pub fn get_calls(&self) -> usize {
		self.get_calls.load(Ordering::Relaxed)
	}

	fn lookup(&self, bucket: &str, key: &str) -> Result<StoredObject, StoreError> {
		if let Some(reason) = lock(&self.outages).get(&id(bucket, key)) {
			return Err(StoreError::Unavailable(reason.clone()));
		}
		lock(&self.objects)
			.get(&id(bucket, key))
			.cloned()
			.ok_or_else(|| StoreError::NotFound(format!("{}/{}", bucket, key)))
	}
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
	async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, StoreError> {
		self.head_calls.fetch_add(1, Ordering::Relaxed);
		let obj = self.lookup(bucket, key)?;
		Ok(ObjectMetadata {
			last_modified: obj.last_modified,
		})
	}

	async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody, StoreError> {
		self.get_calls.fetch_add(1, Ordering::Relaxed);
		let obj = self.lookup(bucket, key)?;
		Ok(ObjectBody::from_bytes(obj.last_modified, obj.bytes))
	}
}

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{ObjectBody, ObjectMetadata, ObjectStore, StoreError};

/// Local directory laid out as `<root>/<bucket>/<key>`, using file mtimes as
/// last-modified times. Useful for development and for volumes synced from a
/// bucket by an external tool.
pub struct FsObjectStore {
	root: PathBuf,
}

impl FsObjectStore {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	/// Resolve an object to a path under the root. Buckets and keys may not
	/// climb out of the root or be absolute.
	pub fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
		let relative = Path::new(bucket).join(key);
		let safe = !bucket.is_empty()
			&& !key.is_empty()
			&& relative
				.components()
				.all(|c| matches!(c, Component::Normal(_)));
		if !safe {
			return Err(StoreError::InvalidPath(format!("{}/{}", bucket, key)));
		}
		Ok(self.root.join(relative))
	}
}

fn io_error(path: &Path, bucket: &str, key: &str, source: std::io::Error) -> StoreError {
	if source.kind() == ErrorKind::NotFound {
		StoreError::NotFound(format!("{}/{}", bucket, key))
	} else {
		StoreError::Io {
			path: path.display().to_string(),
			source,
		}
	}
}

fn modified(path: &Path, metadata: &std::fs::Metadata) -> Result<DateTime<Utc>, StoreError> {
	metadata
		.modified()
		.map(DateTime::<Utc>::from)
		.map_err(|source| StoreError::Io {
			path: path.display().to_string(),
			source,
		})
}

#[async_trait]
impl ObjectStore for FsObjectStore {
	async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, StoreError> {
		let path = self.object_path(bucket, key)?;
		let metadata = tokio::fs::metadata(&path)
			.await
			.map_err(|e| io_error(&path, bucket, key, e))?;
		if !metadata.is_file() {
			return Err(StoreError::NotFound(format!("{}/{}", bucket, key)));
		}
		Ok(ObjectMetadata {
			last_modified: modified(&path, &metadata)?,
		})
	}

	async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody, StoreError> {
		let path = self.object_path(bucket, key)?;
		let file = tokio::fs::File::open(&path)
			.await
			.map_err(|e| io_error(&path, bucket, key, e))?;
		let metadata = file
			.metadata()
			.await
			.map_err(|e| io_error(&path, bucket, key, e))?;
		Ok(ObjectBody {
			last_modified: modified(&path, &metadata)?,
			body: Box::new(file),
		})
	}
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	use std::time::{Duration, SystemTime};

	use tokio::io::AsyncReadExt;

	use super::*;

	#[test]
	fn rejects_escaping_paths() {
		let store = FsObjectStore::new("/srv/objects");
		assert!(store.object_path("b", "../../etc/passwd").is_err());
		assert!(store.object_path("..", "x.json").is_err());
		assert!(store.object_path("b", "/abs.json").is_err());
		assert!(store.object_path("", "x.json").is_err());
		assert_eq!(
			store.object_path("b", "dir/x.json").unwrap(),
			PathBuf::from("/srv/objects/b/dir/x.json")
		);
	}

	#[tokio::test]
	async fn head_and_get_report_file_mtime() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::create_dir_all(dir.path().join("cfg")).unwrap();
		let path = dir.path().join("cfg").join("a.json");
		std::fs::write(&path, br#"{"a": 1}"#).unwrap();

		let when = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
		std::fs::File::options()
			.write(true)
			.open(&path)
			.unwrap()
			.set_modified(when)
			.unwrap();

		let store = FsObjectStore::new(dir.path());
		let meta = store.head_object("cfg", "a.json").await.unwrap();
		assert_eq!(meta.last_modified, DateTime::<Utc>::from(when));

		let mut body = store.get_object("cfg", "a.json").await.unwrap();
		assert_eq!(body.last_modified, meta.last_modified);
		let mut text = String::new();
		body.body.read_to_string(&mut text).await.unwrap();
		assert_eq!(text, r#"{"a": 1}"#);
	}

	#[tokio::test]
	async fn missing_objects_are_not_found() {
		let dir = tempfile::tempdir().unwrap();
		let store = FsObjectStore::new(dir.path());
		let err = store.head_object("cfg", "missing.yaml").await.unwrap_err();
		assert!(matches!(err, StoreError::NotFound(ref name) if name == "cfg/missing.yaml"));
	}
}

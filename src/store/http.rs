use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use log::debug;
use reqwest::header::{HeaderMap, LAST_MODIFIED};
use reqwest::{Method, Response, StatusCode};
use tokio_util::io::StreamReader;
use url::Url;

use super::{ObjectBody, ObjectMetadata, ObjectStore, StoreError};

/// Path-style HTTP object store access (`{endpoint}/{bucket}/{key}`).
///
/// Works against S3-compatible gateways that serve anonymous or bearer
/// authenticated reads, and against plain static file servers that set
/// `Last-Modified`.
pub struct HttpObjectStore {
	client: reqwest::Client,
	endpoint: Url,
	bearer_token: Option<String>,
}

impl HttpObjectStore {
	pub fn new(
		endpoint: Url,
		timeout: Duration,
		bearer_token: Option<String>,
	) -> Result<Self, StoreError> {
		if endpoint.cannot_be_a_base() {
			return Err(StoreError::InvalidPath(endpoint.to_string()));
		}

		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| StoreError::Client(e.to_string()))?;

		Ok(Self {
			client,
			endpoint,
			bearer_token,
		})
	}

	/// Build the object URL, percent-encoding each key segment. Empty segments
	/// are kept, so `a//b` and `a/b` address different objects.
	pub fn object_url(&self, bucket: &str, key: &str) -> Result<Url, StoreError> {
		let mut url = self.endpoint.clone();
		{
			let mut segments = url
				.path_segments_mut()
				.map_err(|_| StoreError::InvalidPath(self.endpoint.to_string()))?;
			segments.pop_if_empty().push(bucket).extend(key.split('/'));
		}
		Ok(url)
	}

	async fn send(&self, method: Method, bucket: &str, key: &str) -> Result<Response, StoreError> {
		let url = self.object_url(bucket, key)?;
		let shown = url.to_string();
		debug!("{} {}", method, shown);

		let mut req = self.client.request(method, url);
		if let Some(token) = &self.bearer_token {
			req = req.bearer_auth(token);
		}

		let response = req.send().await.map_err(|source| StoreError::Http {
			url: shown.clone(),
			source,
		})?;

		let status = response.status();
		if status == StatusCode::NOT_FOUND {
			return Err(StoreError::NotFound(format!("{}/{}", bucket, key)));
		}
		if !status.is_success() {
			return Err(StoreError::Status { url: shown, status });
		}
		Ok(response)
	}
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
	async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, StoreError> {
		let response = self.send(Method::HEAD, bucket, key).await?;
		let last_modified = last_modified(response.headers(), bucket, key)?;
		Ok(ObjectMetadata { last_modified })
	}

	async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody, StoreError> {
		let response = self.send(Method::GET, bucket, key).await?;
		let last_modified = last_modified(response.headers(), bucket, key)?;
		let stream = response
			.bytes_stream()
			.map(|chunk| chunk.map_err(std::io::Error::other));
		Ok(ObjectBody {
			last_modified,
			body: Box::new(StreamReader::new(Box::pin(stream))),
		})
	}
}

fn last_modified(headers: &HeaderMap, bucket: &str, key: &str) -> Result<DateTime<Utc>, StoreError> {
	let raw = headers
		.get(LAST_MODIFIED)
		.ok_or_else(|| StoreError::MissingLastModified(format!("{}/{}", bucket, key)))?;
	let text = raw.to_str().map_err(|e| StoreError::InvalidLastModified {
		value: String::from_utf8_lossy(raw.as_bytes()).into_owned(),
		reason: e.to_string(),
	})?;
	parse_http_date(text)
}

/// Parse an HTTP-date (`Wed, 21 Oct 2015 07:28:00 GMT`).
pub fn parse_http_date(value: &str) -> Result<DateTime<Utc>, StoreError> {
	DateTime::parse_from_rfc2822(value.trim())
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|e| StoreError::InvalidLastModified {
			value: value.to_string(),
			reason: e.to_string(),
		})
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	use chrono::TimeZone;

	use super::*;

	fn store(endpoint: &str) -> HttpObjectStore {
		HttpObjectStore::new(
			Url::parse(endpoint).unwrap(),
			Duration::from_secs(1),
			None,
		)
		.unwrap()
	}

	#[test]
	fn parses_imf_fixdate() {
		let dt = parse_http_date("Wed, 21 Oct 2015 07:28:00 GMT").unwrap();
		assert_eq!(dt, Utc.with_ymd_and_hms(2015, 10, 21, 7, 28, 0).unwrap());
	}

	#[test]
	fn rejects_garbage_dates() {
		let err = parse_http_date("yesterday-ish").unwrap_err();
		assert!(matches!(err, StoreError::InvalidLastModified { .. }));
	}

	#[test]
	fn builds_path_style_urls() {
		let s = store("http://minio.local:9000");
		assert_eq!(
			s.object_url("configs", "traefik/dynamic.yaml").unwrap().as_str(),
			"http://minio.local:9000/configs/traefik/dynamic.yaml"
		);

		let prefixed = store("https://objects.example.com/storage/");
		assert_eq!(
			prefixed.object_url("b", "a file.json").unwrap().as_str(),
			"https://objects.example.com/storage/b/a%20file.json"
		);
	}

	#[test]
	fn keeps_empty_key_segments() {
		let s = store("http://minio.local:9000");
		assert_eq!(
			s.object_url("b", "a//b.json").unwrap().as_str(),
			"http://minio.local:9000/b/a//b.json"
		);
		assert_ne!(s.object_url("b", "a//b.json").unwrap(), s.object_url("b", "a/b.json").unwrap());
	}

	#[test]
	fn rejects_non_base_endpoints() {
		let result = HttpObjectStore::new(
			Url::parse("mailto:ops@example.com").unwrap(),
			Duration::from_secs(1),
			None,
		);
		assert!(matches!(result, Err(StoreError::InvalidPath(_))));
	}
}

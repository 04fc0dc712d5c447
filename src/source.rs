use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

/// Document format of a configuration object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
	Json,
	Yaml,
	/// Not given in configuration; resolved from the key's extension during
	/// validation. Never held by a tracker.
	#[default]
	Unspecified,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{0:?} is not a valid parser")]
pub struct UnknownFormat(pub String);

impl SourceFormat {
	pub fn as_str(&self) -> &'static str {
		match self {
			SourceFormat::Json => "json",
			SourceFormat::Yaml => "yaml",
			SourceFormat::Unspecified => "unspecified",
		}
	}

	/// Infer the format from an object key's file extension.
	pub fn from_extension(key: &str) -> Option<Self> {
		let ext = Path::new(key).extension()?.to_str()?;
		if ext.eq_ignore_ascii_case("json") {
			Some(SourceFormat::Json)
		} else if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") {
			Some(SourceFormat::Yaml)
		} else {
			None
		}
	}

	pub fn is_resolved(&self) -> bool {
		!matches!(self, SourceFormat::Unspecified)
	}
}

impl FromStr for SourceFormat {
	type Err = UnknownFormat;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_lowercase().as_str() {
			"json" => Ok(SourceFormat::Json),
			"yaml" => Ok(SourceFormat::Yaml),
			"" => Ok(SourceFormat::Unspecified),
			other => Err(UnknownFormat(other.to_string())),
		}
	}
}

impl fmt::Display for SourceFormat {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SourceFormat::Json => f.write_str("JSON"),
			SourceFormat::Yaml => f.write_str("YAML"),
			SourceFormat::Unspecified => f.write_str("unspecified format"),
		}
	}
}

/// One configuration object in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceDescriptor {
	pub bucket: String,
	pub key: String,
	pub format: SourceFormat,
}

impl SourceDescriptor {
	pub fn new(bucket: impl Into<String>, key: impl Into<String>, format: SourceFormat) -> Self {
		Self {
			bucket: bucket.into(),
			key: key.into(),
			format,
		}
	}

	/// `bucket/key`, the name used in logs and error messages.
	pub fn object_name(&self) -> String {
		format!("{}/{}", self.bucket, self.key)
	}
}

impl fmt::Display for SourceDescriptor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{} ({})", self.bucket, self.key, self.format.as_str())
	}
}

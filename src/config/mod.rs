use std::path::{Path, PathBuf};
use std::time::Duration;

use log::Level;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::source::{SourceDescriptor, SourceFormat};

/// Runtime configuration for Mimir.
///
/// Values are loaded from (in order): the `/etc/vanopticon/mimir.json` file,
/// the user and local config folders (optional), an explicitly named file,
/// and environment variables prefixed with `MMR_` (e.g. `MMR_LOG_LEVEL`).
#[derive(Debug, Deserialize, PartialEq, Eq, Clone)]
#[serde(default)]
pub struct Settings {
	pub log_level: Level,
	pub provider: ProviderConfig,
	pub store: StoreSettings,
	// Bound of the snapshot channel handed to the aggregator
	pub channel_capacity: usize,
}

impl Default for Settings {
	fn default() -> Self {
		Self {
			log_level: Level::Info,
			provider: ProviderConfig::default(),
			store: StoreSettings::default(),
			channel_capacity: 4,
		}
	}
}

/// One object to aggregate.
#[derive(Debug, Deserialize, PartialEq, Eq, Clone)]
pub struct ObjectReference {
	/// The bucket to look up against
	pub bucket: String,
	/// The key of the object within the bucket
	pub key: String,
	/// Explicit parser (`json` or `yaml`) when it cannot be inferred from the
	/// key's extension
	#[serde(default)]
	pub parser: Option<String>,
}

/// Provider configuration: what to watch and how often.
#[derive(Debug, Deserialize, PartialEq, Eq, Clone)]
#[serde(default, rename_all = "camelCase")]
pub struct ProviderConfig {
	/// Duration string for the interval at which objects are checked
	/// for changes (`"30s"`, `"5m"`)
	#[serde(alias = "pollinterval", alias = "poll_interval")]
	pub poll_interval: String,
	/// Objects in declaration order; later objects take precedence
	pub objects: Vec<ObjectReference>,
}

impl Default for ProviderConfig {
	fn default() -> Self {
		Self {
			poll_interval: "300s".to_string(),
			objects: Vec::new(),
		}
	}
}

/// Provider configuration after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedConfig {
	pub poll_interval: Duration,
	pub sources: Vec<SourceDescriptor>,
}

/// Which object store adapter to build.
#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
	#[default]
	Http,
	Filesystem,
}

/// Connection settings for the object store.
#[derive(Debug, Deserialize, PartialEq, Eq, Clone)]
#[serde(default)]
pub struct StoreSettings {
	pub kind: StoreKind,
	/// Base URL for path-style HTTP access (`{endpoint}/{bucket}/{key}`)
	pub endpoint: Url,
	/// Root directory for the filesystem store (`{root}/{bucket}/{key}`)
	pub root: PathBuf,
	/// Per-request timeout in milliseconds
	pub timeout_ms: u64,
	pub bearer_token: Option<String>,
}

impl Default for StoreSettings {
	fn default() -> Self {
		Self {
			kind: StoreKind::Http,
			endpoint: Url::parse("http://localhost:9000").expect("static URL is valid"),
			root: PathBuf::from("/var/lib/vanopticon/mimir"),
			timeout_ms: 30_000,
			bearer_token: None,
		}
	}
}

impl StoreSettings {
	pub fn timeout(&self) -> Duration {
		Duration::from_millis(self.timeout_ms)
	}
}

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("configuration error: {0}")]
	Load(#[from] ::config::ConfigError),

	#[error("invalid poll interval {value:?}: {source}")]
	PollIntervalSyntax {
		value: String,
		source: humantime::DurationError,
	},

	#[error("poll interval must be greater than 0")]
	PollIntervalNotPositive,

	#[error("objects must be non-empty to use the object store provider")]
	NoObjects,

	#[error("object[{index}] cannot have empty key")]
	EmptyKey { index: usize },

	#[error("object[{index}] cannot have empty bucket name")]
	EmptyBucket { index: usize },

	#[error("object[{index}] has an invalid parser: {reason}")]
	UnknownParser { index: usize, reason: String },

	#[error(
		"object[{index}] cannot infer parser for key {key}. Must have a known extension or explicitly set parser"
	)]
	UninferableParser { index: usize, key: String },

	#[error("source {object} has no resolved format")]
	UnresolvedFormat { object: String },
}

impl ProviderConfig {
	/// Validate the configuration and resolve every object's format.
	pub fn validate(&self) -> Result<ValidatedConfig, ConfigError> {
		let poll_interval = parse_poll_interval(&self.poll_interval)?;

		if self.objects.is_empty() {
			return Err(ConfigError::NoObjects);
		}

		let sources = self
			.objects
			.iter()
			.enumerate()
			.map(|(index, obj)| obj.resolve(index))
			.collect::<Result<Vec<_>, _>>()?;

		Ok(ValidatedConfig {
			poll_interval,
			sources,
		})
	}
}

impl ObjectReference {
	fn resolve(&self, index: usize) -> Result<SourceDescriptor, ConfigError> {
		if self.key.is_empty() {
			return Err(ConfigError::EmptyKey { index });
		}
		if self.bucket.is_empty() {
			return Err(ConfigError::EmptyBucket { index });
		}

		let explicit = match self.parser.as_deref() {
			Some(p) => p.parse::<SourceFormat>().map_err(|e| ConfigError::UnknownParser {
				index,
				reason: e.to_string(),
			})?,
			None => SourceFormat::Unspecified,
		};

		let format = match explicit {
			SourceFormat::Unspecified => SourceFormat::from_extension(&self.key).ok_or_else(|| {
				ConfigError::UninferableParser {
					index,
					key: self.key.clone(),
				}
			})?,
			resolved => resolved,
		};

		Ok(SourceDescriptor::new(&self.bucket, &self.key, format))
	}
}

fn parse_poll_interval(value: &str) -> Result<Duration, ConfigError> {
	let interval =
		humantime::parse_duration(value.trim()).map_err(|source| ConfigError::PollIntervalSyntax {
			value: value.to_string(),
			source,
		})?;
	if interval.is_zero() {
		return Err(ConfigError::PollIntervalNotPositive);
	}
	Ok(interval)
}

/// Load settings from the standard locations, optionally layering an explicit
/// file on top before the environment is applied.
pub fn load(explicit: Option<&Path>) -> Result<Settings, ConfigError> {
	let mut builder = ::config::Config::builder()
		.add_source(::config::File::with_name("/etc/vanopticon/mimir.json").required(false));

	if let Some(folder) = dirs::config_dir() {
		let user_config_path = folder.join("vanopticon").join("mimir.json");
		builder = builder.add_source(::config::File::from(user_config_path).required(false));
	}
	if let Some(folder) = dirs::config_local_dir() {
		let local_config_path = folder.join("vanopticon").join("mimir.json");
		builder = builder.add_source(::config::File::from(local_config_path).required(false));
	}
	if let Some(path) = explicit {
		builder = builder.add_source(::config::File::from(path).required(true));
	}

	builder = builder.add_source(::config::Environment::with_prefix("MMR").separator("__"));

	let cfg = builder.build()?;

	let mut s: Settings = cfg.try_deserialize()?;

	// Direct variables win over anything the layered sources produced.
	if let Ok(p) = std::env::var("MMR_POLL_INTERVAL") {
		if !p.is_empty() {
			s.provider.poll_interval = p;
		}
	}
	if let Ok(e) = std::env::var("MMR_STORE_ENDPOINT") {
		if let Ok(parsed) = Url::parse(&e) {
			s.store.endpoint = parsed;
		}
	}
	if let Ok(r) = std::env::var("MMR_STORE_ROOT") {
		if !r.is_empty() {
			s.store.root = PathBuf::from(r);
		}
	}
	if let Ok(l) = std::env::var("MMR_LOG_LEVEL") {
		if let Ok(parsed) = l.parse::<Level>() {
			s.log_level = parsed;
		}
	}

	Ok(s)
}

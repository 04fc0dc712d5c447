//! Canonical value model shared by every configuration source.
//!
//! JSON and YAML decoders disagree about scalars (YAML keeps integers and
//! floats apart, JSON has a single number type). Both are converted into
//! [`CanonicalValue`] before merging so that a fragment authored in one format
//! merges cleanly with a fragment authored in the other.

pub mod yaml;

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use thiserror::Error;

pub use yaml::from_yaml;

/// Largest integer an `f64` represents exactly (2^53 - 1).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Errors raised while converting a decoded document into a [`CanonicalValue`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NormalizeError {
	#[error("mapping keys must be scalars, found a {0} key")]
	NonScalarKey(&'static str),
	#[error("number {0} cannot be represented as a double-precision float")]
	Number(String),
}

/// Format-independent configuration value.
///
/// Mapping keys are kept sorted, which makes serialized output deterministic
/// regardless of the order keys appeared in the source documents.
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalValue {
	Null,
	Boolean(bool),
	Number(f64),
	String(String),
	Sequence(Vec<CanonicalValue>),
	Mapping(BTreeMap<String, CanonicalValue>),
}

impl CanonicalValue {
	/// An empty mapping, the identity element for merging.
	pub fn empty_mapping() -> Self {
		CanonicalValue::Mapping(BTreeMap::new())
	}

	/// Short name of the variant, used in error messages.
	pub fn kind(&self) -> &'static str {
		match self {
			CanonicalValue::Null => "null",
			CanonicalValue::Boolean(_) => "boolean",
			CanonicalValue::Number(_) => "number",
			CanonicalValue::String(_) => "string",
			CanonicalValue::Sequence(_) => "sequence",
			CanonicalValue::Mapping(_) => "mapping",
		}
	}

	pub fn is_null(&self) -> bool {
		matches!(self, CanonicalValue::Null)
	}

	pub fn as_mapping(&self) -> Option<&BTreeMap<String, CanonicalValue>> {
		match self {
			CanonicalValue::Mapping(map) => Some(map),
			_ => None,
		}
	}

	pub fn as_sequence(&self) -> Option<&[CanonicalValue]> {
		match self {
			CanonicalValue::Sequence(items) => Some(items),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			CanonicalValue::String(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_f64(&self) -> Option<f64> {
		match self {
			CanonicalValue::Number(n) => Some(*n),
			_ => None,
		}
	}

	/// Look up a key when this value is a mapping.
	pub fn get(&self, key: &str) -> Option<&CanonicalValue> {
		self.as_mapping().and_then(|map| map.get(key))
	}

	/// Walk a dotted path (`tls.certificates`) through nested mappings.
	pub fn pointer(&self, path: &str) -> Option<&CanonicalValue> {
		path.split('.')
			.try_fold(self, |current, segment| current.get(segment))
	}
}

impl Serialize for CanonicalValue {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		match self {
			CanonicalValue::Null => serializer.serialize_unit(),
			CanonicalValue::Boolean(b) => serializer.serialize_bool(*b),
			CanonicalValue::Number(n) => serialize_number(*n, serializer),
			CanonicalValue::String(s) => serializer.serialize_str(s),
			CanonicalValue::Sequence(items) => serializer.collect_seq(items),
			CanonicalValue::Mapping(map) => serializer.collect_map(map),
		}
	}
}

/// Integral values are written without a fraction so `1` stays `1`, not `1.0`.
fn serialize_number<S: Serializer>(n: f64, serializer: S) -> Result<S::Ok, S::Error> {
	if !n.is_finite() {
		return serializer.serialize_unit();
	}
	if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
		return serializer.serialize_i64(n as i64);
	}
	serializer.serialize_f64(n)
}

/// Convert a decoded JSON tree. JSON already has one numeric kind, so this is
/// a direct structural mapping.
pub fn from_json(value: serde_json::Value) -> Result<CanonicalValue, NormalizeError> {
	use serde_json::Value;

	Ok(match value {
		Value::Null => CanonicalValue::Null,
		Value::Bool(b) => CanonicalValue::Boolean(b),
		Value::Number(n) => match n.as_f64() {
			Some(f) => CanonicalValue::Number(f),
			None => return Err(NormalizeError::Number(n.to_string())),
		},
		Value::String(s) => CanonicalValue::String(s),
		Value::Array(items) => CanonicalValue::Sequence(
			items
				.into_iter()
				.map(from_json)
				.collect::<Result<Vec<_>, _>>()?,
		),
		Value::Object(map) => {
			let mut out = BTreeMap::new();
			for (key, value) in map {
				out.insert(key, from_json(value)?);
			}
			CanonicalValue::Mapping(out)
		}
	})
}

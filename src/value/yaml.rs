use std::collections::BTreeMap;

use serde_yaml::Value as YamlValue;

use super::{CanonicalValue, NormalizeError};

/// Convert a decoded YAML tree into the value a JSON decoder would have
/// produced for the equivalent JSON document.
///
/// YAML integers and floats both become [`CanonicalValue::Number`]. Keys are
/// taken in their string form (`1: x` yields the key `"1"`). A scalar carrying
/// an application tag (`!Ref name`) becomes the string of its value; tagged
/// sequences and mappings convert as if untagged.
///
/// `~`, `null` and empty scalars become [`CanonicalValue::Null`], which is what
/// a JSON decoder yields for `null`. Decoders that keep the raw scalar text
/// would produce the strings `"~"` or `""` instead.
pub fn from_yaml(value: YamlValue) -> Result<CanonicalValue, NormalizeError> {
	match value {
		YamlValue::Null => Ok(CanonicalValue::Null),
		YamlValue::Bool(b) => Ok(CanonicalValue::Boolean(b)),
		YamlValue::Number(n) => match n.as_f64() {
			Some(f) => Ok(CanonicalValue::Number(f)),
			None => Err(NormalizeError::Number(n.to_string())),
		},
		YamlValue::String(s) => Ok(CanonicalValue::String(s)),
		YamlValue::Sequence(items) => items
			.into_iter()
			.map(from_yaml)
			.collect::<Result<Vec<_>, _>>()
			.map(CanonicalValue::Sequence),
		YamlValue::Mapping(map) => {
			let mut out = BTreeMap::new();
			for (key, value) in map {
				out.insert(mapping_key(key)?, from_yaml(value)?);
			}
			Ok(CanonicalValue::Mapping(out))
		}
		YamlValue::Tagged(tagged) => match tagged.value {
			nested @ (YamlValue::Sequence(_) | YamlValue::Mapping(_) | YamlValue::Tagged(_)) => {
				from_yaml(nested)
			}
			scalar => Ok(CanonicalValue::String(scalar_text(scalar))),
		},
	}
}

/// Textual form of a scalar that a tag kept from being typed.
fn scalar_text(value: YamlValue) -> String {
	match value {
		YamlValue::String(s) => s,
		YamlValue::Number(n) => n.to_string(),
		YamlValue::Bool(b) => b.to_string(),
		_ => String::new(),
	}
}

fn mapping_key(key: YamlValue) -> Result<String, NormalizeError> {
	match key {
		YamlValue::String(s) => Ok(s),
		YamlValue::Number(n) => Ok(n.to_string()),
		YamlValue::Bool(b) => Ok(b.to_string()),
		YamlValue::Null => Ok("null".to_string()),
		YamlValue::Sequence(_) => Err(NormalizeError::NonScalarKey("sequence")),
		YamlValue::Mapping(_) => Err(NormalizeError::NonScalarKey("mapping")),
		YamlValue::Tagged(tagged) => mapping_key(tagged.value),
	}
}

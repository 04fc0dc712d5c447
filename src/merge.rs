use std::collections::BTreeMap;

use thiserror::Error;

use crate::value::CanonicalValue;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MergeError {
	#[error("document at position {position} is a {kind}, expected a mapping")]
	RootNotMapping { position: usize, kind: &'static str },
}

/// Deep-merge documents in order, later documents taking precedence.
///
/// Mappings merge key-wise and recursively. Sequences that meet at the same
/// key are concatenated with the earlier elements first. Every other pairing
/// is replaced by the later value. `Null` roots contribute nothing.
pub fn merge<'a, I>(values: I) -> Result<CanonicalValue, MergeError>
where
	I: IntoIterator<Item = &'a CanonicalValue>,
{
	let mut acc = BTreeMap::new();
	for (position, value) in values.into_iter().enumerate() {
		match value {
			CanonicalValue::Mapping(m) => merge_mappings(&mut acc, m),
			CanonicalValue::Null => {}
			other => {
				return Err(MergeError::RootNotMapping {
					position,
					kind: other.kind(),
				});
			}
		}
	}
	Ok(CanonicalValue::Mapping(acc))
}

fn merge_mappings(
	dst: &mut BTreeMap<String, CanonicalValue>,
	src: &BTreeMap<String, CanonicalValue>,
) {
	for (key, incoming) in src {
		match dst.get_mut(key) {
			Some(existing) => merge_value(existing, incoming),
			None => {
				dst.insert(key.clone(), incoming.clone());
			}
		}
	}
}

fn merge_value(dst: &mut CanonicalValue, src: &CanonicalValue) {
	match (dst, src) {
		(CanonicalValue::Mapping(d), CanonicalValue::Mapping(s)) => merge_mappings(d, s),
		(CanonicalValue::Sequence(d), CanonicalValue::Sequence(s)) => d.extend(s.iter().cloned()),
		(d, s) => *d = s.clone(),
	}
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	use serde_json::json;

	use super::*;
	use crate::value::from_json;

	fn v(j: serde_json::Value) -> CanonicalValue {
		from_json(j).unwrap()
	}

	#[test]
	fn empty_input_is_empty_mapping() {
		let none: Vec<CanonicalValue> = Vec::new();
		assert_eq!(merge(&none).unwrap(), CanonicalValue::empty_mapping());
	}

	#[test]
	fn later_scalars_win_and_sequences_concatenate() {
		let a = v(json!({"x": 1, "l": [1]}));
		let b = v(json!({"x": 2, "l": [2]}));

		assert_eq!(merge([&a, &b]).unwrap(), v(json!({"x": 2, "l": [1, 2]})));
		assert_eq!(merge([&b, &a]).unwrap(), v(json!({"x": 1, "l": [2, 1]})));
	}

	#[test]
	fn nested_mappings_merge_recursively() {
		let a = v(json!({"http": {"routers": {"a": {"rule": "Host(`a`)"}}, "keep": true}}));
		let b = v(json!({"http": {"routers": {"b": {"rule": "Host(`b`)"}}}}));

		assert_eq!(
			merge([&a, &b]).unwrap(),
			v(json!({"http": {
				"routers": {"a": {"rule": "Host(`a`)"}, "b": {"rule": "Host(`b`)"}},
				"keep": true
			}}))
		);
	}

	#[test]
	fn kind_mismatch_replaces() {
		let a = v(json!({"k": {"nested": 1}, "s": [1, 2], "n": "text"}));
		let b = v(json!({"k": "flat", "s": {"m": 1}, "n": [3]}));

		assert_eq!(
			merge([&a, &b]).unwrap(),
			v(json!({"k": "flat", "s": {"m": 1}, "n": [3]}))
		);
	}

	#[test]
	fn sequences_are_never_deduplicated() {
		let a = v(json!({"l": ["x", "y"]}));
		assert_eq!(merge([&a, &a]).unwrap(), v(json!({"l": ["x", "y", "x", "y"]})));
	}

	#[test]
	fn inputs_are_not_modified() {
		let a = v(json!({"l": [1]}));
		let b = v(json!({"l": [2]}));
		let before = a.clone();
		merge([&a, &b]).unwrap();
		assert_eq!(a, before);
	}

	#[test]
	fn null_roots_are_skipped() {
		let a = v(json!({"x": 1}));
		assert_eq!(merge([&CanonicalValue::Null, &a]).unwrap(), a);
	}

	#[test]
	fn scalar_root_is_rejected() {
		let a = v(json!({"x": 1}));
		let b = v(json!([1, 2]));
		assert_eq!(
			merge([&a, &b]).unwrap_err(),
			MergeError::RootNotMapping {
				position: 1,
				kind: "sequence"
			}
		);
	}
}

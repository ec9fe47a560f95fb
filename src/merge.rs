//! Deep merge of YAML configuration values.
//!
//! Mappings merge key by key and scalars in the overlay win. Sequences are
//! concatenated, base first, so an environment can append entries (extra
//! regions for instance) without restating the common ones.

use serde_yaml::value::TaggedValue;
use serde_yaml::Value;

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("Cannot merge {overlay} onto {base} at `{path}`")]
pub struct MergeConflict {
    pub path: String,
    pub base: &'static str,
    pub overlay: &'static str,
}

/// Merge `overlay` onto `base`.
///
/// - mapping + mapping: recurse, keys only present in the overlay are added
/// - sequence + sequence: base elements followed by overlay elements
/// - overlay is null: base is kept (null means "not specified")
/// - base is null, or both are scalars: overlay wins
/// - YAML tags: a tagged overlay keeps its tag; a tagged base keeps its tag
///   when its mapping or sequence is merged into, and loses it when a scalar
///   overlay replaces it
/// - anything else (mapping vs scalar, sequence vs mapping, ...) is a conflict
pub fn deep_merge(base: Value, overlay: Value) -> Result<Value, MergeConflict> {
    merge_at("", base, overlay)
}

fn merge_at(path: &str, base: Value, overlay: Value) -> Result<Value, MergeConflict> {
    match (base, overlay) {
        (Value::Mapping(mut base_map), Value::Mapping(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let child_path = join_path(path, &key);
                match base_map.get_mut(&key) {
                    Some(slot) => {
                        let base_value = std::mem::replace(slot, Value::Null);
                        *slot = merge_at(&child_path, base_value, overlay_value)?;
                    }
                    None => {
                        base_map.insert(key, overlay_value);
                    }
                }
            }
            Ok(Value::Mapping(base_map))
        }
        (Value::Sequence(mut base_seq), Value::Sequence(overlay_seq)) => {
            base_seq.extend(overlay_seq);
            Ok(Value::Sequence(base_seq))
        }
        (base, Value::Null) => Ok(base),
        (Value::Null, overlay) => Ok(overlay),
        (Value::Tagged(base), overlay) => {
            let TaggedValue { tag, value } = *base;
            match merge_at(path, value, overlay)? {
                merged @ (Value::Mapping(_) | Value::Sequence(_)) => {
                    Ok(Value::Tagged(Box::new(TaggedValue { tag, value: merged })))
                }
                replaced => Ok(replaced),
            }
        }
        (base, Value::Tagged(overlay)) => {
            let TaggedValue { tag, value } = *overlay;
            let merged = merge_at(path, base, value)?;
            Ok(Value::Tagged(Box::new(TaggedValue { tag, value: merged })))
        }
        (base, overlay) if is_scalar(&base) && is_scalar(&overlay) => Ok(overlay),
        (base, overlay) => Err(MergeConflict {
            path: path.to_string(),
            base: type_name(&base),
            overlay: type_name(&overlay),
        }),
    }
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::Bool(_) | Value::Number(_) | Value::String(_))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

fn join_path(parent: &str, key: &Value) -> String {
    let key = match key {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| String::from("?")),
    };

    if parent.is_empty() {
        key
    } else {
        format!("{}.{}", parent, key)
    }
}

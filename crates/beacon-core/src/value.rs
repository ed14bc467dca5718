//! Deep-merge and flatten operations over `serde_json::Value` trees.
//!
//! Payloads arriving from the host are heterogeneous nested maps. These
//! helpers give them explicit merge semantics: maps merge recursively,
//! everything else is replaced by the incoming value.

use serde_json::{Map, Value};

/// Recursively merges `incoming` into `base`.
///
/// - Object values merge key by key; nested objects recurse.
/// - Any other value type (including arrays) replaces the existing value.
/// - `Value::Null` in `incoming` removes the key from `base`.
pub fn deep_merge(base: &mut Map<String, Value>, incoming: &Map<String, Value>) {
    for (key, value) in incoming {
        match value {
            Value::Null => {
                base.remove(key);
            }
            Value::Object(incoming_obj) => match base.get_mut(key) {
                Some(Value::Object(existing)) => deep_merge(existing, incoming_obj),
                _ => {
                    base.insert(key.clone(), Value::Object(incoming_obj.clone()));
                }
            },
            other => {
                base.insert(key.clone(), other.clone());
            }
        }
    }
}

/// Flattens a nested object tree into dotted-path keys.
///
/// `{"a": {"b": 1}, "c": true}` becomes `{"a.b": 1, "c": true}`. Arrays are
/// treated as leaves.
pub fn flatten(tree: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    flatten_into(&mut out, tree, "");
    out
}

fn flatten_into(out: &mut Map<String, Value>, tree: &Map<String, Value>, prefix: &str) {
    for (key, value) in tree {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(nested) => flatten_into(out, nested, &path),
            leaf => {
                out.insert(path, leaf.clone());
            }
        }
    }
}

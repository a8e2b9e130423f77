//! Layer merging
//!
//! Layers are JSON values merged in precedence order:
//! - objects merge key by key, recursively
//! - arrays are replaced wholesale
//! - scalars (and null) replace

use serde_json::Value;

/// Merge `overlay` on top of `base`
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut merged), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let next = match merged.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                merged.insert(key, next);
            }
            Value::Object(merged)
        }
        (_, overlay) => overlay,
    }
}

/// Merge layers, lowest precedence first
pub fn merge_layers(layers: impl IntoIterator<Item = Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}

//! Deep merge for partial configuration updates

use serde_json::Value;

/// Merge `incoming` into `existing`
///
/// Objects merge key by key, recursively. Arrays and scalars in `incoming`
/// replace the existing value wholesale. A `null` in `incoming` removes the
/// key from the containing object.
pub fn deep_merge(existing: &mut Value, incoming: Value) {
    match (existing, incoming) {
        (Value::Object(target), Value::Object(source)) => {
            for (key, value) in source {
                if value.is_null() {
                    target.remove(&key);
                    continue;
                }

                if let Some(current) = target.get_mut(&key) {
                    if current.is_object() && value.is_object() {
                        deep_merge(current, value);
                        continue;
                    }
                }

                target.insert(key, value);
            }
        }
        (target, incoming) => *target = incoming,
    }
}

/// Non-mutating variant of [`deep_merge`]
pub fn merged(existing: &Value, incoming: Value) -> Value {
    let mut result = existing.clone();
    deep_merge(&mut result, incoming);
    result
}

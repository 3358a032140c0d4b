//! JSON manipulation helpers.
//!
//! The external command surface patches node payloads with JSON partials;
//! [`shallow_merge`] implements the merge rule: top-level keys of the
//! partial overwrite the corresponding keys of the base object, everything
//! else is untouched. Nested objects are replaced, not merged; payloads
//! are flat by construction, so a shallow rule keeps patches predictable.

use serde_json::{Map, Value};

/// Shallow-merge `partial` over `base`.
///
/// When both are objects, `partial`'s keys win at the top level. When either
/// is not an object, `partial` replaces `base` entirely.
///
/// # Examples
///
/// ```rust
/// use musegraph::utils::json_ext::shallow_merge;
/// use serde_json::json;
///
/// let base = json!({"type": "prompt", "text": "old", "kept": 1});
/// let patch = json!({"text": "new"});
/// assert_eq!(
///     shallow_merge(&base, &patch),
///     json!({"type": "prompt", "text": "new", "kept": 1})
/// );
/// ```
#[must_use]
pub fn shallow_merge(base: &Value, partial: &Value) -> Value {
    match (base, partial) {
        (Value::Object(base_obj), Value::Object(partial_obj)) => {
            let mut out: Map<String, Value> = base_obj.clone();
            for (k, v) in partial_obj {
                out.insert(k.clone(), v.clone());
            }
            Value::Object(out)
        }
        _ => partial.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn partial_keys_overwrite() {
        let merged = shallow_merge(&json!({"a": 1, "b": 2}), &json!({"b": 3, "c": 4}));
        assert_eq!(merged, json!({"a": 1, "b": 3, "c": 4}));
    }

    #[test]
    fn nested_objects_are_replaced_not_merged() {
        let merged = shallow_merge(&json!({"o": {"x": 1, "y": 2}}), &json!({"o": {"x": 9}}));
        assert_eq!(merged, json!({"o": {"x": 9}}));
    }

    #[test]
    fn non_object_partial_replaces() {
        assert_eq!(shallow_merge(&json!({"a": 1}), &json!(null)), json!(null));
    }
}

//! Value utility functions shared across modules
//!
//! This module provides helpers for classifying JSON values and for building
//! type-correct default values, used when a new array element is appended.

use serde_json::{Map, Value};

/// True for scalar values (string, number, boolean, null)
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use docbulk_core::value_utils::is_leaf;
///
/// assert!(is_leaf(&json!("text")));
/// assert!(is_leaf(&json!(null)));
/// assert!(!is_leaf(&json!([1, 2])));
/// ```
pub fn is_leaf(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

/// Default value for the type of `value`
///
/// - string → `""`
/// - number → `0`
/// - boolean → `false`
/// - null → `null`
/// - array → `[]`
/// - object → `{}`
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use docbulk_core::value_utils::default_for;
///
/// assert_eq!(default_for(&json!("abc")), json!(""));
/// assert_eq!(default_for(&json!(4.5)), json!(0));
/// assert_eq!(default_for(&json!({"a": 1})), json!({}));
/// ```
pub fn default_for(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Bool(_) => Value::Bool(false),
        Value::Number(_) => Value::from(0),
        Value::String(_) => Value::String(String::new()),
        Value::Array(_) => Value::Array(Vec::new()),
        Value::Object(_) => Value::Object(Map::new()),
    }
}

/// Build a new list element shaped like the existing ones
///
/// Only the first element is inspected:
/// - an object yields an object with the same keys, each defaulted by the
///   type of its sibling value (one level deep)
/// - a scalar or array yields the default for its type
/// - an empty list yields an empty string
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use docbulk_core::value_utils::default_element;
///
/// let items = vec![json!({"sku": "A-1", "qty": 3, "taxed": true})];
/// assert_eq!(
///     default_element(&items),
///     json!({"sku": "", "qty": 0, "taxed": false})
/// );
/// assert_eq!(default_element(&[]), json!(""));
/// ```
pub fn default_element(list: &[Value]) -> Value {
    match list.first() {
        Some(Value::Object(template)) => Value::Object(
            template
                .iter()
                .map(|(key, sibling)| (key.clone(), default_for(sibling)))
                .collect(),
        ),
        Some(leaf) => default_for(leaf),
        None => Value::String(String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_is_leaf() {
        assert!(is_leaf(&json!(1)));
        assert!(is_leaf(&json!(false)));
        assert!(is_leaf(&json!("")));
        assert!(!is_leaf(&json!({})));
        assert!(!is_leaf(&json!([])));
    }

    #[test]
    fn test_default_for_every_type() {
        assert_eq!(default_for(&json!(null)), json!(null));
        assert_eq!(default_for(&json!(true)), json!(false));
        assert_eq!(default_for(&json!(-12)), json!(0));
        assert_eq!(default_for(&json!("x")), json!(""));
        assert_eq!(default_for(&json!([1, 2, 3])), json!([]));
        assert_eq!(default_for(&json!({"nested": {"a": 1}})), json!({}));
    }

    #[test]
    fn test_default_element_from_object_template() {
        let items = vec![
            json!({
                "name": "Widget",
                "price": 9.99,
                "discount": null,
                "labels": ["red"],
                "dims": {"w": 1}
            }),
            json!({"other": "ignored"}),
        ];
        let element = default_element(&items);
        assert_eq!(
            element,
            json!({
                "name": "",
                "price": 0,
                "discount": null,
                "labels": [],
                "dims": {}
            })
        );
    }

    #[test]
    fn test_default_element_from_leaf_template() {
        assert_eq!(default_element(&[json!(42), json!("mixed")]), json!(0));
        assert_eq!(default_element(&[json!("a")]), json!(""));
        assert_eq!(default_element(&[json!([1])]), json!([]));
    }

    #[test]
    fn test_default_element_empty_list() {
        assert_eq!(default_element(&[]), json!(""));
    }
}

// docbulk-core/src/mutation.rs
//! Typed edit operations on extracted fields, metadata and tags
//!
//! Field edits work in place on a `serde_json::Value` through the path
//! resolver. Callers that need the original untouched clone the field tree
//! first (see `operation::Mutation::apply`).

use crate::error::PathError;
use crate::path::{self, Location, PathToken, ResolveMode};
use crate::value_utils::{default_element, is_leaf};
use serde_json::Value;
use std::collections::BTreeMap;

/// Replace an existing scalar at `path`, returning the previous value
pub fn set_leaf(root: &mut Value, path: &[PathToken], value: Value) -> Result<Value, PathError> {
    if !is_leaf(&value) {
        return Err(PathError::TypeMismatch {
            path: path::render(path),
            expected: "scalar value",
            found: path::type_name(&value),
        });
    }

    let location = path::resolve(root, path, ResolveMode::Existing)?;
    match location.get() {
        Some(current) if !is_leaf(current) => {
            return Err(PathError::TypeMismatch {
                path: path::render(path),
                expected: "scalar target",
                found: path::type_name(current),
            });
        }
        Some(_) => {}
        None => return Err(PathError::PathNotFound { path: path::render(path) }),
    }

    Ok(location.set(value).unwrap_or(Value::Null))
}

/// Remove element `index` from the list at `list_path`
///
/// Later elements shift down by one.
pub fn delete_index(
    root: &mut Value,
    list_path: &[PathToken],
    index: usize,
) -> Result<Value, PathError> {
    let list = list_at(root, list_path)?;
    if index >= list.len() {
        return Err(PathError::IndexOutOfRange {
            path: path::render(list_path),
            index,
            len: list.len(),
        });
    }
    Ok(list.remove(index))
}

/// Append a default element to the list at `list_path`, returning its index
///
/// The element is shaped after the first existing element, see
/// [`default_element`]. It is written through the one-past-the-end slot
/// `list_path[len]`.
pub fn append_default(root: &mut Value, list_path: &[PathToken]) -> Result<usize, PathError> {
    let list = list_at(root, list_path)?;
    let element = default_element(list);
    let index = list.len();

    let mut slot = list_path.to_vec();
    slot.push(PathToken::Index(index));
    match path::resolve(root, &slot, ResolveMode::Insert)? {
        location @ Location::End { .. } => {
            location.set(element);
            Ok(index)
        }
        _ => Err(PathError::IndexOutOfRange {
            path: path::render(list_path),
            index,
            len: index,
        }),
    }
}

fn list_at<'a>(root: &'a mut Value, list_path: &[PathToken]) -> Result<&'a mut Vec<Value>, PathError> {
    match path::get_mut(root, list_path, ResolveMode::Existing)? {
        Value::Array(list) => Ok(list),
        other => Err(PathError::TypeMismatch {
            path: if list_path.is_empty() {
                "$".to_string()
            } else {
                path::render(list_path)
            },
            expected: "array",
            found: path::type_name(other),
        }),
    }
}

/// Normalized form used to detect duplicate metadata keys
pub fn normalize_metadata_key(key: &str) -> String {
    key.trim().to_lowercase()
}

/// Set or overwrite each payload key; other keys stay untouched
///
/// Keys are stored trimmed. Payload keys must already be unique under
/// [`normalize_metadata_key`] (checked during validation).
pub fn merge_metadata(metadata: &mut BTreeMap<String, String>, entries: &[(String, String)]) {
    for (key, value) in entries {
        metadata.insert(key.trim().to_string(), value.clone());
    }
}

/// Delete each named key if present
pub fn remove_metadata_keys(metadata: &mut BTreeMap<String, String>, keys: &[String]) {
    for key in keys {
        metadata.remove(key.trim());
    }
}

pub fn clear_metadata(metadata: &mut BTreeMap<String, String>) {
    metadata.clear();
}

/// Original tags first, then new ids in payload order, without duplicates
///
/// # Examples
///
/// ```
/// use docbulk_core::mutation::add_tags;
///
/// let tags = vec!["t1".to_string()];
/// let added = add_tags(&tags, &["t1".to_string(), "t2".to_string()]);
/// assert_eq!(added, vec!["t1", "t2"]);
/// ```
pub fn add_tags(tags: &[String], new_ids: &[String]) -> Vec<String> {
    let mut result = tags.to_vec();
    for id in new_ids {
        if !result.contains(id) {
            result.push(id.clone());
        }
    }
    result
}

/// Original tags minus every id in `remove_ids`
pub fn remove_tags(tags: &[String], remove_ids: &[String]) -> Vec<String> {
    tags.iter()
        .filter(|tag| !remove_ids.contains(tag))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::tokenize;
    use serde_json::json;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_set_leaf_nested_index() {
        let mut doc = json!({"items": [{"qty": "1"}, {"qty": "2"}]});
        let old = set_leaf(&mut doc, &tokenize("items[1].qty").unwrap(), json!("5")).unwrap();
        assert_eq!(old, json!("2"));
        assert_eq!(doc, json!({"items": [{"qty": "1"}, {"qty": "5"}]}));
    }

    #[test]
    fn test_set_leaf_rejects_missing_target() {
        let mut doc = json!({"items": []});
        let err = set_leaf(&mut doc, &tokenize("total").unwrap(), json!(1)).unwrap_err();
        assert!(matches!(err, PathError::PathNotFound { .. }));
        assert_eq!(doc, json!({"items": []}));
    }

    #[test]
    fn test_set_leaf_rejects_container_target() {
        let mut doc = json!({"items": [1]});
        let err = set_leaf(&mut doc, &tokenize("items").unwrap(), json!(1)).unwrap_err();
        assert!(matches!(
            err,
            PathError::TypeMismatch {
                found: "array",
                ..
            }
        ));
    }

    #[test]
    fn test_set_leaf_rejects_container_value() {
        let mut doc = json!({"total": 1});
        let err = set_leaf(&mut doc, &tokenize("total").unwrap(), json!({"a": 1})).unwrap_err();
        assert!(matches!(err, PathError::TypeMismatch { found: "object", .. }));
        assert_eq!(doc["total"], 1);
    }

    #[test]
    fn test_delete_index_shifts() {
        let mut doc = json!({"lines": ["a", "b", "c", "d"]});
        let removed = delete_index(&mut doc, &tokenize("lines").unwrap(), 1).unwrap();
        assert_eq!(removed, json!("b"));
        assert_eq!(doc["lines"], json!(["a", "c", "d"]));
    }

    #[test]
    fn test_delete_index_out_of_range() {
        let mut doc = json!({"lines": ["a"]});
        let err = delete_index(&mut doc, &tokenize("lines").unwrap(), 1).unwrap_err();
        assert_eq!(
            err,
            PathError::IndexOutOfRange {
                path: "lines".to_string(),
                index: 1,
                len: 1
            }
        );
    }

    #[test]
    fn test_delete_index_on_non_list() {
        let mut doc = json!({"lines": "a"});
        let err = delete_index(&mut doc, &tokenize("lines").unwrap(), 0).unwrap_err();
        assert!(matches!(err, PathError::TypeMismatch { expected: "array", .. }));
    }

    #[test]
    fn test_append_default_uses_first_element() {
        let mut doc = json!({"items": [{"sku": "A", "qty": 2}, {"sku": "B"}]});
        let index = append_default(&mut doc, &tokenize("items").unwrap()).unwrap();
        assert_eq!(index, 2);
        assert_eq!(doc["items"][2], json!({"sku": "", "qty": 0}));
    }

    #[test]
    fn test_append_default_nested_list() {
        let mut doc = json!({"orders": [{"lines": [true]}], "total": 4});
        let index = append_default(&mut doc, &tokenize("orders[0].lines").unwrap()).unwrap();
        assert_eq!(index, 1);
        assert_eq!(doc["orders"][0]["lines"], json!([true, false]));

        let err = append_default(&mut doc, &tokenize("total").unwrap()).unwrap_err();
        assert!(matches!(err, PathError::TypeMismatch { expected: "array", .. }));
        assert_eq!(doc["total"], 4);
    }

    #[test]
    fn test_append_default_empty_list() {
        let mut doc = json!({"notes": []});
        append_default(&mut doc, &tokenize("notes").unwrap()).unwrap();
        assert_eq!(doc["notes"], json!([""]));
    }

    #[test]
    fn test_merge_metadata_overwrites_and_keeps_others() {
        let mut metadata = BTreeMap::from([
            ("author".to_string(), "Ann".to_string()),
            ("type".to_string(), "memo".to_string()),
        ]);
        merge_metadata(
            &mut metadata,
            &[
                ("type".to_string(), "invoice".to_string()),
                (" year ".to_string(), "2024".to_string()),
            ],
        );
        assert_eq!(metadata.len(), 3);
        assert_eq!(metadata["author"], "Ann");
        assert_eq!(metadata["type"], "invoice");
        assert_eq!(metadata["year"], "2024");
    }

    #[test]
    fn test_remove_metadata_keys_idempotent() {
        let mut metadata = BTreeMap::from([("author".to_string(), "Ann".to_string())]);
        remove_metadata_keys(&mut metadata, &strings(&["missing"]));
        assert_eq!(metadata.len(), 1);
        remove_metadata_keys(&mut metadata, &strings(&["author"]));
        remove_metadata_keys(&mut metadata, &strings(&["author"]));
        assert!(metadata.is_empty());
    }

    #[test]
    fn test_clear_metadata() {
        let mut metadata = BTreeMap::from([("a".to_string(), "1".to_string())]);
        clear_metadata(&mut metadata);
        assert!(metadata.is_empty());
    }

    #[test]
    fn test_add_tags_order_and_dedup() {
        let tags = strings(&["b", "a"]);
        let result = add_tags(&tags, &strings(&["c", "a", "d", "c"]));
        assert_eq!(result, strings(&["b", "a", "c", "d"]));
    }

    #[test]
    fn test_remove_tags() {
        let tags = strings(&["a", "b", "c"]);
        assert_eq!(remove_tags(&tags, &strings(&["b", "x"])), strings(&["a", "c"]));
        assert_eq!(remove_tags(&tags, &[]), tags);
    }

    #[test]
    fn test_normalize_metadata_key() {
        assert_eq!(normalize_metadata_key("  Author "), "author");
    }
}

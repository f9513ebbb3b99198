// docbulk-core/src/operation.rs
//! Bulk operation catalog
//!
//! Every [`OperationKind`] has a payload shape. [`OperationCatalog::build`]
//! validates a [`PendingOperation`] once, up front, and turns it into a
//! [`Mutation`]: a parsed, pure per-document edit. A malformed request never
//! reaches the collaborator.
//!
//! | Kind | Payload |
//! |---|---|
//! | `add-tags`, `remove-tags` | `["t1", "t2"]` |
//! | `merge-metadata` | `{"key": "value"}` or `[["key", "value"]]` |
//! | `remove-metadata-keys` | `["key"]` |
//! | `clear-metadata` | ignored |
//! | `set-field` | `{"path": "items[1].qty", "value": "5"}` |
//! | `delete-array-item` | `{"path": "items", "index": 2}` |
//! | `append-array-item` | `{"path": "items"}` |

use crate::document::{Document, DocumentPatch};
use crate::error::{PathError, ValidationError};
use crate::mutation;
use crate::path::{self, PathToken};
use crate::value_utils::is_leaf;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    AddTags,
    RemoveTags,
    MergeMetadata,
    RemoveMetadataKeys,
    ClearMetadata,
    SetField,
    DeleteArrayItem,
    AppendArrayItem,
}

impl OperationKind {
    pub const ALL: [OperationKind; 8] = [
        OperationKind::AddTags,
        OperationKind::RemoveTags,
        OperationKind::MergeMetadata,
        OperationKind::RemoveMetadataKeys,
        OperationKind::ClearMetadata,
        OperationKind::SetField,
        OperationKind::DeleteArrayItem,
        OperationKind::AppendArrayItem,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::AddTags => "add-tags",
            OperationKind::RemoveTags => "remove-tags",
            OperationKind::MergeMetadata => "merge-metadata",
            OperationKind::RemoveMetadataKeys => "remove-metadata-keys",
            OperationKind::ClearMetadata => "clear-metadata",
            OperationKind::SetField => "set-field",
            OperationKind::DeleteArrayItem => "delete-array-item",
            OperationKind::AppendArrayItem => "append-array-item",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| {
                let known: Vec<_> = OperationKind::ALL.iter().map(|k| k.as_str()).collect();
                format!("unknown operation '{}' (expected one of: {})", s, known.join(", "))
            })
    }
}

/// An operation the user asked for, not yet validated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub kind: OperationKind,
    #[serde(default)]
    pub payload: Value,
}

impl PendingOperation {
    pub fn new(kind: OperationKind, payload: Value) -> Self {
        PendingOperation { kind, payload }
    }
}

/// A validated per-document edit
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    AddTags(Vec<String>),
    RemoveTags(Vec<String>),
    MergeMetadata(Vec<(String, String)>),
    RemoveMetadataKeys(Vec<String>),
    ClearMetadata,
    SetField { path: Vec<PathToken>, value: Value },
    DeleteArrayItem { path: Vec<PathToken>, index: usize },
    AppendArrayItem { path: Vec<PathToken> },
}

impl Mutation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Mutation::AddTags(_) => OperationKind::AddTags,
            Mutation::RemoveTags(_) => OperationKind::RemoveTags,
            Mutation::MergeMetadata(_) => OperationKind::MergeMetadata,
            Mutation::RemoveMetadataKeys(_) => OperationKind::RemoveMetadataKeys,
            Mutation::ClearMetadata => OperationKind::ClearMetadata,
            Mutation::SetField { .. } => OperationKind::SetField,
            Mutation::DeleteArrayItem { .. } => OperationKind::DeleteArrayItem,
            Mutation::AppendArrayItem { .. } => OperationKind::AppendArrayItem,
        }
    }

    /// Compute the mutated fields for `doc` without touching it
    pub fn apply(&self, doc: &Document) -> Result<DocumentPatch, PathError> {
        self.apply_owned(doc.clone())
    }

    /// Same as [`Mutation::apply`], consuming a document the caller no longer needs
    ///
    /// Edits happen in place on the owned value, so no field tree is copied.
    pub fn apply_owned(&self, doc: Document) -> Result<DocumentPatch, PathError> {
        let Document {
            tag_ids,
            mut metadata,
            mut extracted_fields,
            ..
        } = doc;

        let patch = match self {
            Mutation::AddTags(ids) => DocumentPatch {
                tag_ids: Some(mutation::add_tags(&tag_ids, ids)),
                ..Default::default()
            },
            Mutation::RemoveTags(ids) => DocumentPatch {
                tag_ids: Some(mutation::remove_tags(&tag_ids, ids)),
                ..Default::default()
            },
            Mutation::MergeMetadata(entries) => {
                mutation::merge_metadata(&mut metadata, entries);
                DocumentPatch {
                    metadata: Some(metadata),
                    ..Default::default()
                }
            }
            Mutation::RemoveMetadataKeys(keys) => {
                mutation::remove_metadata_keys(&mut metadata, keys);
                DocumentPatch {
                    metadata: Some(metadata),
                    ..Default::default()
                }
            }
            Mutation::ClearMetadata => {
                mutation::clear_metadata(&mut metadata);
                DocumentPatch {
                    metadata: Some(metadata),
                    ..Default::default()
                }
            }
            Mutation::SetField { path, value } => {
                mutation::set_leaf(&mut extracted_fields, path, value.clone())?;
                DocumentPatch {
                    extracted_fields: Some(extracted_fields),
                    ..Default::default()
                }
            }
            Mutation::DeleteArrayItem { path, index } => {
                mutation::delete_index(&mut extracted_fields, path, *index)?;
                DocumentPatch {
                    extracted_fields: Some(extracted_fields),
                    ..Default::default()
                }
            }
            Mutation::AppendArrayItem { path } => {
                mutation::append_default(&mut extracted_fields, path)?;
                DocumentPatch {
                    extracted_fields: Some(extracted_fields),
                    ..Default::default()
                }
            }
        };

        Ok(patch)
    }

    /// The document as it would look after a successful commit
    pub fn preview(&self, doc: &Document) -> Result<Document, PathError> {
        let patch = self.apply(doc)?;
        let mut preview = doc.clone();
        patch.apply_to(&mut preview);
        Ok(preview)
    }
}

/// Validation rules and mutation builders for every [`OperationKind`]
pub struct OperationCatalog;

impl OperationCatalog {
    /// Check a payload without building anything
    pub fn validate(kind: OperationKind, payload: &Value) -> Result<(), ValidationError> {
        Self::parse(kind, payload).map(|_| ())
    }

    /// Validate a pending operation and build its mutation
    pub fn build(pending: &PendingOperation) -> Result<Mutation, ValidationError> {
        Self::parse(pending.kind, &pending.payload)
    }

    fn parse(kind: OperationKind, payload: &Value) -> Result<Mutation, ValidationError> {
        match kind {
            OperationKind::AddTags => Ok(Mutation::AddTags(string_list(kind, payload)?)),
            OperationKind::RemoveTags => Ok(Mutation::RemoveTags(string_list(kind, payload)?)),
            OperationKind::MergeMetadata => {
                Ok(Mutation::MergeMetadata(metadata_entries(kind, payload)?))
            }
            OperationKind::RemoveMetadataKeys => {
                Ok(Mutation::RemoveMetadataKeys(string_list(kind, payload)?))
            }
            OperationKind::ClearMetadata => Ok(Mutation::ClearMetadata),
            OperationKind::SetField => {
                let path = field_path(kind, payload)?;
                let value = payload.get("value").ok_or_else(|| invalid(kind, "missing 'value'"))?;
                if !is_leaf(value) {
                    return Err(invalid(
                        kind,
                        &format!("'value' must be a scalar, got {}", path::type_name(value)),
                    ));
                }
                Ok(Mutation::SetField {
                    path,
                    value: value.clone(),
                })
            }
            OperationKind::DeleteArrayItem => {
                let path = field_path(kind, payload)?;
                let index = payload
                    .get("index")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| invalid(kind, "'index' must be a non-negative integer"))?;
                Ok(Mutation::DeleteArrayItem {
                    path,
                    index: index as usize,
                })
            }
            OperationKind::AppendArrayItem => Ok(Mutation::AppendArrayItem {
                path: field_path(kind, payload)?,
            }),
        }
    }
}

fn invalid(kind: OperationKind, reason: &str) -> ValidationError {
    ValidationError::InvalidPayload {
        kind,
        reason: reason.to_string(),
    }
}

/// Non-empty list of non-blank strings, trimmed
fn string_list(kind: OperationKind, payload: &Value) -> Result<Vec<String>, ValidationError> {
    let items = payload
        .as_array()
        .ok_or_else(|| invalid(kind, "payload must be a list of strings"))?;
    if items.is_empty() {
        return Err(ValidationError::EmptyPayload { kind });
    }

    items
        .iter()
        .map(|item| match item.as_str().map(str::trim) {
            Some(s) if !s.is_empty() => Ok(s.to_string()),
            Some(_) => Err(invalid(kind, "entries must not be blank")),
            None => Err(invalid(kind, "entries must be strings")),
        })
        .collect()
}

/// Metadata entries from an object or a list of `[key, value]` pairs
///
/// Keys must be unique after trimming and case folding.
fn metadata_entries(
    kind: OperationKind,
    payload: &Value,
) -> Result<Vec<(String, String)>, ValidationError> {
    let raw: Vec<(&str, &Value)> = match payload {
        Value::Object(map) => map.iter().map(|(k, v)| (k.as_str(), v)).collect(),
        Value::Array(pairs) => pairs
            .iter()
            .map(|pair| match pair.as_array().map(Vec::as_slice) {
                Some([Value::String(key), value]) => Ok((key.as_str(), value)),
                _ => Err(invalid(kind, "list entries must be [key, value] pairs")),
            })
            .collect::<Result<_, _>>()?,
        _ => return Err(invalid(kind, "payload must be an object or a list of pairs")),
    };

    if raw.is_empty() {
        return Err(ValidationError::EmptyPayload { kind });
    }

    let mut seen = HashSet::new();
    let mut entries = Vec::with_capacity(raw.len());
    for (key, value) in raw {
        if key.trim().is_empty() {
            return Err(invalid(kind, "metadata keys must not be blank"));
        }
        let value = value
            .as_str()
            .ok_or_else(|| invalid(kind, &format!("value for '{}' must be a string", key)))?;
        if !seen.insert(mutation::normalize_metadata_key(key)) {
            return Err(ValidationError::DuplicateMetadataKey {
                kind,
                key: key.to_string(),
            });
        }
        entries.push((key.to_string(), value.to_string()));
    }
    Ok(entries)
}

fn field_path(kind: OperationKind, payload: &Value) -> Result<Vec<PathToken>, ValidationError> {
    let raw = payload
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(kind, "missing 'path'"))?;
    path::tokenize(raw).map_err(|source| ValidationError::InvalidPath { kind, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn build(kind: OperationKind, payload: Value) -> Result<Mutation, ValidationError> {
        OperationCatalog::build(&PendingOperation::new(kind, payload))
    }

    #[test]
    fn test_kind_parse_and_display() {
        for kind in OperationKind::ALL {
            assert_eq!(kind.to_string().parse::<OperationKind>().unwrap(), kind);
        }
        assert!("rename-everything".parse::<OperationKind>().is_err());
        assert_eq!(
            serde_json::to_value(OperationKind::RemoveMetadataKeys).unwrap(),
            json!("remove-metadata-keys")
        );
    }

    #[test]
    fn test_tag_payload_validation() {
        assert_eq!(
            build(OperationKind::AddTags, json!([])),
            Err(ValidationError::EmptyPayload {
                kind: OperationKind::AddTags
            })
        );
        assert!(build(OperationKind::AddTags, json!("t1")).is_err());
        assert!(build(OperationKind::AddTags, json!(["t1", 2])).is_err());
        assert!(build(OperationKind::RemoveTags, json!(["  "])).is_err());
        assert_eq!(
            build(OperationKind::AddTags, json!([" t1 ", "t2"])).unwrap(),
            Mutation::AddTags(vec!["t1".to_string(), "t2".to_string()])
        );
    }

    #[test]
    fn test_metadata_duplicate_keys_rejected() {
        let err = build(OperationKind::MergeMetadata, json!({"Author": "a", " author": "b"}))
            .unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateMetadataKey { .. }));

        let err = build(
            OperationKind::MergeMetadata,
            json!([["type", "a"], ["type", "b"]]),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::DuplicateMetadataKey {
                kind: OperationKind::MergeMetadata,
                key: "type".to_string()
            }
        );
    }

    #[test]
    fn test_metadata_payload_shapes() {
        assert!(build(OperationKind::MergeMetadata, json!({})).is_err());
        assert!(build(OperationKind::MergeMetadata, json!({"a": 1})).is_err());
        assert!(build(OperationKind::MergeMetadata, json!({"": "x"})).is_err());
        assert!(build(OperationKind::MergeMetadata, json!([["a"]])).is_err());
        assert_eq!(
            build(OperationKind::MergeMetadata, json!([["a", "1"], ["b", "2"]])).unwrap(),
            Mutation::MergeMetadata(vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string())
            ])
        );
    }

    #[test]
    fn test_field_payload_validation() {
        assert!(build(OperationKind::SetField, json!({"value": 1})).is_err());
        assert!(build(OperationKind::SetField, json!({"path": "a"})).is_err());
        assert!(build(OperationKind::SetField, json!({"path": "a", "value": [1]})).is_err());
        assert!(matches!(
            build(OperationKind::SetField, json!({"path": "a[", "value": 1})),
            Err(ValidationError::InvalidPath { .. })
        ));
        assert!(build(OperationKind::DeleteArrayItem, json!({"path": "a", "index": -1})).is_err());
        assert!(build(OperationKind::DeleteArrayItem, json!({"path": "a", "index": 1.5})).is_err());
        assert!(build(OperationKind::AppendArrayItem, json!({})).is_err());
        assert!(OperationCatalog::validate(OperationKind::ClearMetadata, &Value::Null).is_ok());
    }

    #[test]
    fn test_add_tags_scenario() {
        let doc = Document::new("d1", "doc").with_tags(["t1"]);
        let mutation = build(OperationKind::AddTags, json!(["t1", "t2"])).unwrap();
        let patch = mutation.apply(&doc).unwrap();
        assert_eq!(patch.tag_ids, Some(vec!["t1".to_string(), "t2".to_string()]));
        assert!(patch.metadata.is_none());
        assert!(patch.extracted_fields.is_none());
    }

    #[test]
    fn test_set_field_scenario() {
        let doc = Document::new("d1", "doc")
            .with_fields(json!({"items": [{"qty": "1"}, {"qty": "2"}]}));
        let mutation = build(
            OperationKind::SetField,
            json!({"path": "items[1].qty", "value": "5"}),
        )
        .unwrap();
        let preview = mutation.preview(&doc).unwrap();
        assert_eq!(preview.extracted_fields["items"][1]["qty"], "5");
        assert_eq!(preview.extracted_fields["items"][0], json!({"qty": "1"}));
        // Source document is untouched
        assert_eq!(doc.extracted_fields["items"][1]["qty"], "2");
    }

    #[test]
    fn test_append_array_item_scenario() {
        let doc = Document::new("d1", "doc").with_fields(json!({
            "items": [{"sku": "A-1", "qty": 3, "taxed": true, "note": null}]
        }));
        let mutation = build(OperationKind::AppendArrayItem, json!({"path": "items"})).unwrap();
        assert_eq!(mutation.kind(), OperationKind::AppendArrayItem);

        let patch = mutation.apply(&doc).unwrap();
        assert!(patch.tag_ids.is_none());
        assert!(patch.metadata.is_none());
        let fields = patch.extracted_fields.unwrap();
        assert_eq!(
            fields["items"],
            json!([
                {"sku": "A-1", "qty": 3, "taxed": true, "note": null},
                {"sku": "", "qty": 0, "taxed": false, "note": null}
            ])
        );
        assert_eq!(doc.extracted_fields["items"].as_array().unwrap().len(), 1);

        let missing = build(OperationKind::AppendArrayItem, json!({"path": "lines"})).unwrap();
        assert!(matches!(
            missing.apply(&doc),
            Err(PathError::PathNotFound { .. })
        ));
    }

    #[test]
    fn test_path_error_surfaces_per_document() {
        let doc = Document::new("d1", "doc").with_fields(json!({"items": []}));
        let mutation = build(
            OperationKind::DeleteArrayItem,
            json!({"path": "items", "index": 0}),
        )
        .unwrap();
        assert!(matches!(
            mutation.apply(&doc),
            Err(PathError::IndexOutOfRange { index: 0, len: 0, .. })
        ));
    }

    #[test]
    fn test_metadata_mutations() {
        let doc = Document::new("d1", "doc")
            .with_metadata("author", "Ann")
            .with_metadata("type", "memo");

        let merged = build(OperationKind::MergeMetadata, json!({"type": "invoice"}))
            .unwrap()
            .apply(&doc)
            .unwrap()
            .metadata
            .unwrap();
        assert_eq!(merged["author"], "Ann");
        assert_eq!(merged["type"], "invoice");

        let removed = build(OperationKind::RemoveMetadataKeys, json!(["type", "nope"]))
            .unwrap()
            .apply(&doc)
            .unwrap()
            .metadata
            .unwrap();
        assert_eq!(removed.len(), 1);

        let cleared = Mutation::ClearMetadata.apply(&doc).unwrap().metadata.unwrap();
        assert!(cleared.is_empty());
    }
}

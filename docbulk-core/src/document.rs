// docbulk-core/src/document.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// A document as returned by the listing collaborator
///
/// `tag_ids` keeps insertion order but never holds duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Empty until the store assigns one, see [`Document::ensure_id`]
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub tag_ids: Vec<String>,

    #[serde(default)]
    pub metadata: BTreeMap<String, String>,

    #[serde(default)]
    pub extracted_fields: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

impl Document {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Document {
            id: id.into(),
            name: name.into(),
            tag_ids: Vec::new(),
            metadata: BTreeMap::new(),
            extracted_fields: Value::Object(serde_json::Map::new()),
            modified_at: None,
        }
    }

    /// Assign a random UUID v4 id if the document has none
    ///
    /// Returns true when an id was generated.
    pub fn ensure_id(&mut self) -> bool {
        if !self.id.trim().is_empty() {
            return false;
        }
        self.id = Uuid::new_v4().to_string();
        true
    }

    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        for tag in tags {
            let tag = tag.into();
            if !self.tag_ids.contains(&tag) {
                self.tag_ids.push(tag);
            }
        }
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_fields(mut self, fields: Value) -> Self {
        self.extracted_fields = fields;
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tag_ids.iter().any(|t| t == tag)
    }
}

/// The mutated fields sent to the update collaborator
///
/// Fields left as `None` are not touched server-side; present fields are
/// replaced wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_ids: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_fields: Option<Value>,
}

impl DocumentPatch {
    pub fn is_empty(&self) -> bool {
        self.tag_ids.is_none() && self.metadata.is_none() && self.extracted_fields.is_none()
    }

    /// Replace the supplied fields on `doc`
    pub fn apply_to(&self, doc: &mut Document) {
        if let Some(tags) = &self.tag_ids {
            doc.tag_ids = tags.clone();
        }
        if let Some(metadata) = &self.metadata {
            doc.metadata = metadata.clone();
        }
        if let Some(fields) = &self.extracted_fields {
            doc.extracted_fields = fields.clone();
        }
    }
}

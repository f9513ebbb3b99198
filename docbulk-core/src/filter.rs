// docbulk-core/src/filter.rs
// Document filters: name substring, tag ids, metadata key=value pairs

use crate::document::Document;
use crate::error::{BulkError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which documents a bulk operation targets
///
/// Every present criterion must match (AND semantics).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSpec {
    /// Case-insensitive substring of the document name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_search: Option<String>,

    /// Tag ids that must all be present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_ids: Option<BTreeSet<String>>,

    /// Metadata pairs that must all match exactly, in caller order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_pairs: Option<Vec<(String, String)>>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name_search(mut self, name: impl Into<String>) -> Self {
        self.name_search = Some(name.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag_ids.get_or_insert_with(BTreeSet::new).insert(tag.into());
        self
    }

    pub fn with_metadata_pair(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata_pairs
            .get_or_insert_with(Vec::new)
            .push((key.into(), value.into()));
        self
    }

    /// True if no criterion is set, i.e. the filter matches every document
    pub fn is_empty(&self) -> bool {
        self.name_search.as_deref().map_or(true, str::is_empty)
            && self.tag_ids.as_ref().map_or(true, BTreeSet::is_empty)
            && self.metadata_pairs.as_ref().map_or(true, Vec::is_empty)
    }

    /// Evaluate the filter against a single document
    pub fn matches(&self, doc: &Document) -> bool {
        if let Some(needle) = self.name_search.as_deref().filter(|s| !s.is_empty()) {
            if !doc.name.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }

        if let Some(tags) = &self.tag_ids {
            if !tags.iter().all(|tag| doc.has_tag(tag)) {
                return false;
            }
        }

        if let Some(pairs) = &self.metadata_pairs {
            if !pairs
                .iter()
                .all(|(key, value)| doc.metadata.get(key) == Some(value))
            {
                return false;
            }
        }

        true
    }

    /// Query parameters for the listing collaborator
    ///
    /// Empty criteria are omitted. Tag ids are joined with `,`; metadata uses
    /// [`encode_metadata_pairs`].
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(name) = self.name_search.as_deref().filter(|s| !s.is_empty()) {
            params.push(("name", name.to_string()));
        }
        if let Some(tags) = self.tag_ids.as_ref().filter(|t| !t.is_empty()) {
            params.push(("tags", tags.iter().cloned().collect::<Vec<_>>().join(",")));
        }
        if let Some(pairs) = self.metadata_pairs.as_ref().filter(|p| !p.is_empty()) {
            params.push(("metadata", encode_metadata_pairs(pairs)));
        }
        params
    }
}

/// Encode metadata pairs as `key=value` joined by `,`
///
/// Key and value are percent-encoded independently, so a literal `,` or `=`
/// inside either never breaks the framing.
///
/// # Examples
///
/// ```
/// use docbulk_core::filter::encode_metadata_pairs;
///
/// let pairs = vec![
///     ("author".to_string(), "John Smith".to_string()),
///     ("type".to_string(), "invoice".to_string()),
/// ];
/// assert_eq!(encode_metadata_pairs(&pairs), "author=John%20Smith,type=invoice");
/// ```
pub fn encode_metadata_pairs(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(value)
            )
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Inverse of [`encode_metadata_pairs`]
pub fn decode_metadata_pairs(encoded: &str) -> Result<Vec<(String, String)>> {
    if encoded.is_empty() {
        return Ok(Vec::new());
    }

    encoded
        .split(',')
        .map(|pair| {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                BulkError::InvalidFilter(format!("metadata pair '{}' has no '='", pair))
            })?;
            Ok((decode_component(key)?, decode_component(value)?))
        })
        .collect()
}

fn decode_component(raw: &str) -> Result<String> {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| BulkError::InvalidFilter(format!("cannot decode '{}': {}", raw, e)))
}

/// Parse free-form search text such as `"author=John Smith,type=invoice"`
///
/// Pairs are split on `,`, then on the first `=`. Keys are trimmed and must
/// not be empty; blank segments are skipped.
pub fn parse_metadata_search(text: &str) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for segment in text.split(',') {
        if segment.trim().is_empty() {
            continue;
        }
        let (key, value) = segment.split_once('=').ok_or_else(|| {
            BulkError::InvalidFilter(format!("expected key=value, got '{}'", segment.trim()))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(BulkError::InvalidFilter(format!(
                "empty metadata key in '{}'",
                segment.trim()
            )));
        }
        pairs.push((key.to_string(), value.trim().to_string()));
    }
    Ok(pairs)
}

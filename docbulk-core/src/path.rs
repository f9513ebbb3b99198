// docbulk-core/src/path.rs
//! Path addressing for extracted-field records
//!
//! A path string such as `"items[2].name"` is tokenized into
//! `[Field("items"), Index(2), Field("name")]` and then walked against a
//! `serde_json::Value`.
//!
//! Supported forms:
//! - Simple fields: `"total"`
//! - Nested objects: `"vendor.address.city"`
//! - Array indexing: `"items[0]"`, `"matrix[1][2]"`, `"[0].name"`
//! - Nested path after an index: `"items[2].name"`
//!
//! Reads never create anything. Writes in [`ResolveMode::Insert`] may create
//! missing intermediate objects and may address one past the end of a list.

use crate::error::PathError;
use serde_json::{Map, Value};
use std::fmt;

/// One step in a structured-field address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathToken {
    Field(String),
    Index(usize),
}

impl fmt::Display for PathToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathToken::Field(name) => write!(f, "{}", name),
            PathToken::Index(position) => write!(f, "[{}]", position),
        }
    }
}

/// How strictly a path is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// Every step and the final target must already exist
    Existing,
    /// Missing intermediate objects are created and `len` is a valid final index
    Insert,
}

/// A resolved write target inside a document
#[derive(Debug)]
pub enum Location<'a> {
    /// A key of an object (present unless resolved in `Insert` mode)
    Key {
        map: &'a mut Map<String, Value>,
        key: String,
    },
    /// An existing element of a list
    Index { list: &'a mut Vec<Value>, index: usize },
    /// One past the last element of a list
    End { list: &'a mut Vec<Value> },
}

impl<'a> Location<'a> {
    /// Current value at the location, if any
    pub fn get(&self) -> Option<&Value> {
        match self {
            Location::Key { map, key } => map.get(key),
            Location::Index { list, index } => list.get(*index),
            Location::End { .. } => None,
        }
    }

    /// Write a value, returning the previous one
    pub fn set(self, value: Value) -> Option<Value> {
        match self {
            Location::Key { map, key } => map.insert(key, value),
            Location::Index { list, index } => Some(std::mem::replace(&mut list[index], value)),
            Location::End { list } => {
                list.push(value);
                None
            }
        }
    }

    /// Remove the value at the location. List elements after it shift down.
    pub fn remove(self) -> Option<Value> {
        match self {
            Location::Key { map, key } => map.remove(&key),
            Location::Index { list, index } => Some(list.remove(index)),
            Location::End { .. } => None,
        }
    }
}

/// Tokenize a dotted/bracketed path string
///
/// # Examples
///
/// ```
/// use docbulk_core::path::{tokenize, PathToken};
///
/// let tokens = tokenize("items[1].qty").unwrap();
/// assert_eq!(
///     tokens,
///     vec![
///         PathToken::Field("items".to_string()),
///         PathToken::Index(1),
///         PathToken::Field("qty".to_string()),
///     ]
/// );
/// ```
pub fn tokenize(path: &str) -> Result<Vec<PathToken>, PathError> {
    let invalid = |reason: &str| PathError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    if path.trim().is_empty() {
        return Err(invalid("path is empty"));
    }

    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars().peekable();
    // True right after a ']' so that "a[0]b" is rejected but "a[0].b" and "a[0][1]" pass
    let mut after_index = false;

    while let Some(ch) = chars.next() {
        match ch {
            '.' => {
                if current.is_empty() && !after_index {
                    return Err(invalid("empty field name"));
                }
                if !current.is_empty() {
                    tokens.push(PathToken::Field(std::mem::take(&mut current)));
                }
                match chars.peek() {
                    None => return Err(invalid("path ends with '.'")),
                    Some('[') => return Err(invalid("'[' directly after '.'")),
                    Some(_) => {}
                }
                after_index = false;
            }
            '[' => {
                if !current.is_empty() {
                    tokens.push(PathToken::Field(std::mem::take(&mut current)));
                }

                let mut digits = String::new();
                let mut closed = false;
                for inner in chars.by_ref() {
                    if inner == ']' {
                        closed = true;
                        break;
                    }
                    digits.push(inner);
                }
                if !closed {
                    return Err(invalid("unclosed '['"));
                }

                let digits = digits.trim();
                if digits.starts_with('-') {
                    return Err(invalid("negative index"));
                }
                let position = digits
                    .parse::<usize>()
                    .map_err(|_| invalid(&format!("'{}' is not an array index", digits)))?;
                tokens.push(PathToken::Index(position));
                after_index = true;
            }
            ']' => return Err(invalid("unexpected ']'")),
            other => {
                if after_index {
                    return Err(invalid("expected '.' or '[' after index"));
                }
                current.push(other);
            }
        }
    }

    if !current.is_empty() {
        tokens.push(PathToken::Field(current));
    }

    Ok(tokens)
}

/// Render tokens back into path syntax
pub fn render(tokens: &[PathToken]) -> String {
    let mut out = String::new();
    for token in tokens {
        match token {
            PathToken::Field(name) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(name);
            }
            PathToken::Index(position) => {
                out.push_str(&format!("[{}]", position));
            }
        }
    }
    out
}

/// Short type name used in error messages
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Read the value at a path. Never creates anything.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use docbulk_core::path::{get, tokenize};
///
/// let doc = json!({"items": [{"qty": "1"}, {"qty": "2"}]});
/// let path = tokenize("items[1].qty").unwrap();
/// assert_eq!(get(&doc, &path).unwrap(), &json!("2"));
/// ```
pub fn get<'a>(root: &'a Value, path: &[PathToken]) -> Result<&'a Value, PathError> {
    let mut current = root;
    for (depth, token) in path.iter().enumerate() {
        current = match (token, current) {
            (PathToken::Field(name), Value::Object(map)) => {
                map.get(name).ok_or_else(|| PathError::PathNotFound {
                    path: render(&path[..=depth]),
                })?
            }
            (PathToken::Index(index), Value::Array(list)) => {
                list.get(*index).ok_or_else(|| PathError::IndexOutOfRange {
                    path: render(&path[..depth]),
                    index: *index,
                    len: list.len(),
                })?
            }
            (PathToken::Field(_), other) => {
                return Err(mismatch(&path[..depth], "object", other));
            }
            (PathToken::Index(_), other) => {
                return Err(mismatch(&path[..depth], "array", other));
            }
        };
    }
    Ok(current)
}

/// Mutable access to the value at a path
///
/// In `Insert` mode missing object keys along the way are created as empty
/// objects; the final value is created the same way if absent.
pub fn get_mut<'a>(
    root: &'a mut Value,
    path: &[PathToken],
    mode: ResolveMode,
) -> Result<&'a mut Value, PathError> {
    let mut current = root;
    for depth in 0..path.len() {
        current = step_mut(current, path, depth, mode)?;
    }
    Ok(current)
}

/// Resolve a path to a writable location
///
/// All tokens but the last are walked with [`get_mut`] semantics; the last
/// token picks the slot inside its parent container.
pub fn resolve<'a>(
    root: &'a mut Value,
    path: &[PathToken],
    mode: ResolveMode,
) -> Result<Location<'a>, PathError> {
    let Some((last, parents)) = path.split_last() else {
        return Err(PathError::InvalidPath {
            path: String::new(),
            reason: "path is empty".to_string(),
        });
    };

    let mut current = root;
    for depth in 0..parents.len() {
        current = step_mut(current, path, depth, mode)?;
    }

    match (last, current) {
        (PathToken::Field(name), Value::Object(map)) => {
            if mode == ResolveMode::Existing && !map.contains_key(name) {
                return Err(PathError::PathNotFound { path: render(path) });
            }
            Ok(Location::Key {
                map,
                key: name.clone(),
            })
        }
        (PathToken::Index(index), Value::Array(list)) => {
            let len = list.len();
            if *index < len {
                Ok(Location::Index {
                    list,
                    index: *index,
                })
            } else if *index == len && mode == ResolveMode::Insert {
                Ok(Location::End { list })
            } else {
                Err(PathError::IndexOutOfRange {
                    path: render(parents),
                    index: *index,
                    len,
                })
            }
        }
        (PathToken::Field(_), other) => Err(mismatch(parents, "object", other)),
        (PathToken::Index(_), other) => Err(mismatch(parents, "array", other)),
    }
}

fn step_mut<'a>(
    current: &'a mut Value,
    path: &[PathToken],
    depth: usize,
    mode: ResolveMode,
) -> Result<&'a mut Value, PathError> {
    match (&path[depth], current) {
        (PathToken::Field(name), Value::Object(map)) => {
            if mode == ResolveMode::Insert {
                Ok(map
                    .entry(name.clone())
                    .or_insert_with(|| Value::Object(Map::new())))
            } else {
                map.get_mut(name).ok_or_else(|| PathError::PathNotFound {
                    path: render(&path[..=depth]),
                })
            }
        }
        (PathToken::Index(index), Value::Array(list)) => {
            let len = list.len();
            list.get_mut(*index).ok_or_else(|| PathError::IndexOutOfRange {
                path: render(&path[..depth]),
                index: *index,
                len,
            })
        }
        (PathToken::Field(_), other) => Err(mismatch(&path[..depth], "object", other)),
        (PathToken::Index(_), other) => Err(mismatch(&path[..depth], "array", other)),
    }
}

fn mismatch(at: &[PathToken], expected: &'static str, found: &Value) -> PathError {
    PathError::TypeMismatch {
        path: if at.is_empty() {
            "$".to_string()
        } else {
            render(at)
        },
        expected,
        found: type_name(found),
    }
}

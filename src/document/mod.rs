//! The canonical report document
//!
//! A [`Document`] is a JSON object whose top-level keys are restricted to the
//! [`Section`] allow-list. All addressing goes through [`FieldPath`].

mod change_log;
pub mod path;
mod section;
mod store;

pub use change_log::{ChangeLog, ChangeRecord, DEFAULT_CAPACITY};
pub use path::{FieldPath, PathError, Segment};
pub use section::{is_allowed_key, Presence, Section, SectionKind, META_KEY};
pub use store::{DocumentStore, OperationError};

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// The canonical in-memory record
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Document {
    root: Value,
}

impl Document {
    /// A document with no sections at all
    pub fn empty() -> Self {
        Self {
            root: Value::Object(Map::new()),
        }
    }

    /// The blank report handed out at initialization and reset
    pub fn template() -> Self {
        let sections = Section::ALL
            .iter()
            .filter_map(|s| s.template_value().map(|v| (s.key().to_string(), v)))
            .collect();
        Self {
            root: Value::Object(sections),
        }
    }

    /// Build from already-filtered sections. Keys outside the allow-list are
    /// dropped.
    pub(crate) fn from_sections(sections: Map<String, Value>) -> Self {
        let root = sections
            .into_iter()
            .filter(|(key, _)| Section::from_key(key).is_some())
            .collect();
        Self {
            root: Value::Object(root),
        }
    }

    pub fn section(&self, section: Section) -> Option<&Value> {
        self.root.get(section.key())
    }

    /// Sections currently present, in document order
    pub fn sections(&self) -> impl Iterator<Item = Section> + '_ {
        self.root
            .as_object()
            .into_iter()
            .flat_map(|m| m.keys())
            .filter_map(|k| Section::from_key(k))
    }

    pub fn get(&self, path: &FieldPath) -> Option<&Value> {
        path::get(&self.root, path)
    }

    /// Write a value. The path must start at a known section.
    pub fn set(&mut self, path: &FieldPath, value: Value) -> Result<(), PathError> {
        Self::check_section(path)?;
        path::set(&mut self.root, path, value)
    }

    pub fn remove(&mut self, path: &FieldPath) -> Result<Option<Value>, PathError> {
        Self::check_section(path)?;
        Ok(path::remove(&mut self.root, path))
    }

    fn check_section(path: &FieldPath) -> Result<(), PathError> {
        match Section::from_key(path.root_key()) {
            Some(_) => Ok(()),
            None => Err(PathError::UnknownSection(path.root_key().to_string())),
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    pub fn to_value(&self) -> Value {
        self.root.clone()
    }

    /// Hex SHA-256 of the compact serialization
    pub fn digest(&self) -> String {
        digest_value(&self.root)
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::template()
    }
}

pub(crate) fn digest_value(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Name of a JSON value's type as used in error messages
pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "record",
    }
}

/// Structural equality where `1` and `1.0` are the same number and absence
/// only equals absence.
pub fn json_eq(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => value_eq(a, b),
        _ => false,
    }
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| value_eq(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).map_or(false, |other| value_eq(v, other)))
        }
        _ => a == b,
    }
}

//! Path addressing into the canonical document
//!
//! A path is a dot-separated list of field names, each optionally followed
//! by one or more bracketed list indices: `contracts[2].creditor.name`.
//! Paths are parsed once into a [`FieldPath`] and then applied to a
//! `serde_json::Value` tree.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

/// Most slots a single write may append to a list
pub const MAX_LIST_GROWTH: usize = 1024;

/// Errors produced while parsing or applying a path
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Empty path")]
    Empty,

    #[error("Malformed path '{path}': {reason}")]
    Malformed { path: String, reason: String },

    #[error("Unknown section '{0}'")]
    UnknownSection(String),

    #[error("Index {index} in '{path}' is too far past the end of a list of length {len}")]
    IndexTooLarge {
        path: String,
        index: usize,
        len: usize,
    },

    #[error("Cannot write '{path}': '{at}' is not a {expected}")]
    NotAContainer {
        path: String,
        at: String,
        expected: &'static str,
    },
}

/// One step of a path
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Segment {
    Field(String),
    Index(usize),
}

/// A parsed path. Always starts with a field segment.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<Segment>,
}

impl FieldPath {
    /// Parse a textual path such as `employees[0].cpf`
    pub fn parse(input: &str) -> Result<Self, PathError> {
        if input.is_empty() {
            return Err(PathError::Empty);
        }

        let malformed = |reason: &str| PathError::Malformed {
            path: input.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        for part in input.split('.') {
            let (name, mut rest) = match part.find('[') {
                Some(pos) => part.split_at(pos),
                None => (part, ""),
            };
            if name.is_empty() {
                return Err(malformed("empty field name"));
            }
            if name.contains(']') {
                return Err(malformed("unbalanced ']'"));
            }
            segments.push(Segment::Field(name.to_string()));

            while !rest.is_empty() {
                let inner = rest
                    .strip_prefix('[')
                    .ok_or_else(|| malformed("expected '[' after index"))?;
                let close = inner
                    .find(']')
                    .ok_or_else(|| malformed("unterminated index"))?;
                let digits = &inner[..close];
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(malformed("index must be a non-negative integer"));
                }
                let index = digits
                    .parse::<usize>()
                    .map_err(|_| malformed("index out of range"))?;
                segments.push(Segment::Index(index));
                rest = &inner[close + 1..];
            }
        }

        Ok(Self { segments })
    }

    /// A single-segment path naming a top-level key
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            segments: vec![Segment::Field(name.into())],
        }
    }

    /// Extend with a field segment
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.segments.push(Segment::Field(name.into()));
        self
    }

    /// Extend with an index segment
    pub fn index(mut self, index: usize) -> Self {
        self.segments.push(Segment::Index(index));
        self
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The top-level key this path addresses
    pub fn root_key(&self) -> &str {
        match self.segments.first() {
            Some(Segment::Field(name)) => name,
            _ => "",
        }
    }

    fn prefix(&self, len: usize) -> FieldPath {
        FieldPath {
            segments: self.segments[..len].to_vec(),
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (pos, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Field(name) if pos == 0 => write!(f, "{}", name)?,
                Segment::Field(name) => write!(f, ".{}", name)?,
                Segment::Index(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

impl FromStr for FieldPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FieldPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        FieldPath::parse(&raw).map_err(D::Error::custom)
    }
}

/// Read the value at `path`. Missing intermediates yield `None`.
pub fn get<'a>(root: &'a Value, path: &FieldPath) -> Option<&'a Value> {
    path.segments.iter().try_fold(root, |node, segment| match segment {
        Segment::Field(name) => node.as_object()?.get(name),
        Segment::Index(index) => node.as_array()?.get(*index),
    })
}

fn get_mut<'a>(root: &'a mut Value, segments: &[Segment]) -> Option<&'a mut Value> {
    segments.iter().try_fold(root, |node, segment| match segment {
        Segment::Field(name) => node.as_object_mut()?.get_mut(name),
        Segment::Index(index) => node.as_array_mut()?.get_mut(*index),
    })
}

/// Write `value` at `path`, creating missing records and lists on the way.
///
/// Lists are extended with empty records up to the addressed index. A final
/// index segment replaces the whole list element. Fails without touching
/// `root` when an existing node on the path is a primitive.
pub fn set(root: &mut Value, path: &FieldPath, value: Value) -> Result<(), PathError> {
    ensure_writable(root, path)?;

    let (last, parents) = path.segments.split_last().ok_or(PathError::Empty)?;
    let mut node = root;
    for (pos, segment) in parents.iter().enumerate() {
        let next = &path.segments[pos + 1];
        node = descend_or_create(node, segment, next)
            .ok_or_else(|| not_a_container(path, pos, segment))?;
    }

    if node.is_null() {
        *node = empty_container_for(last);
    }
    match last {
        Segment::Field(name) => {
            let record = node
                .as_object_mut()
                .ok_or_else(|| not_a_container(path, parents.len(), last))?;
            record.insert(name.clone(), value);
        }
        Segment::Index(index) => {
            let list = node
                .as_array_mut()
                .ok_or_else(|| not_a_container(path, parents.len(), last))?;
            if list.len() <= *index {
                list.resize(*index + 1, Value::Object(Map::new()));
            }
            list[*index] = value;
        }
    }
    Ok(())
}

/// Remove the value at `path`. A removed list element that is not the last
/// one is replaced by `null` so the positions of its siblings are preserved.
pub fn remove(root: &mut Value, path: &FieldPath) -> Option<Value> {
    let (last, parents) = path.segments.split_last()?;
    let parent = get_mut(root, parents)?;
    match last {
        Segment::Field(name) => parent.as_object_mut()?.remove(name),
        Segment::Index(index) => {
            let list = parent.as_array_mut()?;
            if *index >= list.len() {
                None
            } else if *index + 1 == list.len() {
                list.pop()
            } else {
                Some(std::mem::replace(&mut list[*index], Value::Null))
            }
        }
    }
}

/// Walk the existing part of `path` and reject primitives in container
/// position and indices that would grow a list by more than
/// [`MAX_LIST_GROWTH`]. Everything past the first missing node is created
/// fresh, so its indices are measured against an empty list.
fn ensure_writable(root: &Value, path: &FieldPath) -> Result<(), PathError> {
    let mut node = Some(root);
    for (pos, segment) in path.segments.iter().enumerate() {
        let current = node.filter(|value| !value.is_null());
        node = match (segment, current) {
            (Segment::Field(_), None) => None,
            (Segment::Index(index), None) => {
                check_index(path, *index, 0)?;
                None
            }
            (Segment::Field(name), Some(value)) => value
                .as_object()
                .ok_or_else(|| not_a_container(path, pos, segment))?
                .get(name),
            (Segment::Index(index), Some(value)) => {
                let list = value
                    .as_array()
                    .ok_or_else(|| not_a_container(path, pos, segment))?;
                check_index(path, *index, list.len())?;
                list.get(*index)
            }
        };
    }
    Ok(())
}

fn check_index(path: &FieldPath, index: usize, len: usize) -> Result<(), PathError> {
    match index.checked_add(1) {
        Some(needed) if needed <= len.saturating_add(MAX_LIST_GROWTH) => Ok(()),
        _ => Err(PathError::IndexTooLarge {
            path: path.to_string(),
            index,
            len,
        }),
    }
}

fn descend_or_create<'a>(
    node: &'a mut Value,
    segment: &Segment,
    next: &Segment,
) -> Option<&'a mut Value> {
    if node.is_null() {
        *node = empty_container_for(segment);
    }
    let child = match segment {
        Segment::Field(name) => node
            .as_object_mut()?
            .entry(name.clone())
            .or_insert_with(|| empty_container_for(next)),
        Segment::Index(index) => {
            let list = node.as_array_mut()?;
            if list.len() <= *index {
                list.resize(*index, Value::Object(Map::new()));
                list.push(empty_container_for(next));
            }
            &mut list[*index]
        }
    };
    if child.is_null() {
        *child = empty_container_for(next);
    }
    Some(child)
}

/// The container a segment needs to be applied to
fn empty_container_for(segment: &Segment) -> Value {
    match segment {
        Segment::Field(_) => Value::Object(Map::new()),
        Segment::Index(_) => Value::Array(Vec::new()),
    }
}

fn not_a_container(path: &FieldPath, pos: usize, segment: &Segment) -> PathError {
    PathError::NotAContainer {
        path: path.to_string(),
        at: if pos == 0 {
            "<root>".to_string()
        } else {
            path.prefix(pos).to_string()
        },
        expected: match segment {
            Segment::Field(_) => "record",
            Segment::Index(_) => "list",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(s: &str) -> FieldPath {
        FieldPath::parse(s).unwrap()
    }

    #[test]
    fn test_parse_fields_and_indices() {
        let p = path("contracts[2].creditor.name");
        assert_eq!(
            p.segments(),
            &[
                Segment::Field("contracts".into()),
                Segment::Index(2),
                Segment::Field("creditor".into()),
                Segment::Field("name".into()),
            ]
        );
        assert_eq!(p.to_string(), "contracts[2].creditor.name");
        assert_eq!(p.root_key(), "contracts");

        let nested = path("matrix[1][3]");
        assert_eq!(nested.segments().len(), 3);
        assert_eq!(nested.to_string(), "matrix[1][3]");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(FieldPath::parse(""), Err(PathError::Empty));
        for bad in ["a..b", ".a", "a.", "a[", "a[x]", "a[-1]", "[0]", "a]b", "a[1]b"] {
            assert!(
                matches!(FieldPath::parse(bad), Err(PathError::Malformed { .. })),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_builder_matches_parse() {
        let built = FieldPath::root("employees").index(0).field("cpf");
        assert_eq!(built, path("employees[0].cpf"));
    }

    #[test]
    fn test_get_missing_is_none() {
        let doc = json!({"descriptor": {"year": 2024}, "contracts": []});
        assert_eq!(get(&doc, &path("descriptor.year")), Some(&json!(2024)));
        assert_eq!(get(&doc, &path("descriptor.month")), None);
        assert_eq!(get(&doc, &path("contracts[0].number")), None);
        assert_eq!(get(&doc, &path("descriptor.year.inner")), None);
        assert_eq!(get(&doc, &path("descriptor[0]")), None);
    }

    #[test]
    fn test_set_then_get_roundtrip() {
        let mut doc = json!({});
        let cases = [
            ("descriptor.municipality", json!("São Paulo")),
            ("contracts[2].amount", json!(1500.5)),
            ("assets.movable_acquired[0]", json!({"asset_number": "P-1"})),
            ("declarations.flags[1][0]", json!(false)),
        ];
        for (p, v) in cases {
            set(&mut doc, &path(p), v.clone()).unwrap();
            assert_eq!(get(&doc, &path(p)), Some(&v), "round trip for {}", p);
        }
    }

    #[test]
    fn test_set_sparse_fills_with_records() {
        let mut doc = json!({});
        set(&mut doc, &path("contracts[2].number"), json!("C-3")).unwrap();
        assert_eq!(doc, json!({"contracts": [{}, {}, {"number": "C-3"}]}));
    }

    #[test]
    fn test_set_final_index_replaces_element() {
        let mut doc = json!({"contracts": [{"number": "A", "amount": 1}]});
        set(&mut doc, &path("contracts[0]"), json!({"number": "B"})).unwrap();
        assert_eq!(doc, json!({"contracts": [{"number": "B"}]}));
    }

    #[test]
    fn test_set_replaces_null_intermediates() {
        let mut doc = json!({"assets": null});
        set(&mut doc, &path("assets.immovable[0].description"), json!("Lot")).unwrap();
        assert_eq!(doc, json!({"assets": {"immovable": [{"description": "Lot"}]}}));
    }

    #[test]
    fn test_set_through_primitive_fails_untouched() {
        let mut doc = json!({"contracts": "not a list", "payments": [{"v": 1}, 7]});
        let before = doc.clone();

        let err = set(&mut doc, &path("contracts[0].number"), json!("x")).unwrap_err();
        assert!(matches!(err, PathError::NotAContainer { ref at, expected: "list", .. } if at == "contracts"));

        let err = set(&mut doc, &path("payments[1].v"), json!(2)).unwrap_err();
        assert!(matches!(err, PathError::NotAContainer { expected: "record", .. }));

        assert_eq!(doc, before);
    }

    #[test]
    fn test_set_rejects_runaway_index_untouched() {
        let mut doc = json!({"contracts": [{"number": "A"}]});
        let before = doc.clone();

        let huge = format!("contracts[{}]", usize::MAX);
        let err = set(&mut doc, &path(&huge), json!({"number": "B"})).unwrap_err();
        assert!(matches!(
            err,
            PathError::IndexTooLarge { index: usize::MAX, len: 1, .. }
        ));

        let err = set(&mut doc, &path("contracts[10000000000].number"), json!("B")).unwrap_err();
        assert!(matches!(err, PathError::IndexTooLarge { len: 1, .. }));

        let err = set(&mut doc, &path("employees[5000].cpf"), json!("1")).unwrap_err();
        assert!(matches!(err, PathError::IndexTooLarge { index: 5000, len: 0, .. }));

        assert_eq!(doc, before);
    }

    #[test]
    fn test_set_allows_growth_up_to_limit() {
        let mut doc = json!({"contracts": [{"number": "A"}]});
        let last = format!("contracts[{}]", MAX_LIST_GROWTH);
        set(&mut doc, &path(&last), json!({"number": "Z"})).unwrap();
        let list = doc["contracts"].as_array().unwrap();
        assert_eq!(list.len(), MAX_LIST_GROWTH + 1);
        assert_eq!(list[0], json!({"number": "A"}));

        let over = format!("payments[{}]", MAX_LIST_GROWTH);
        assert!(set(&mut doc, &path(&over), json!(1)).is_err());
        assert!(doc.get("payments").is_none());
    }

    #[test]
    fn test_remove() {
        let mut doc = json!({"descriptor": {"year": 2024}, "contracts": [1, 2, 3]});
        assert_eq!(remove(&mut doc, &path("descriptor.year")), Some(json!(2024)));
        assert_eq!(remove(&mut doc, &path("contracts[2]")), Some(json!(3)));
        assert_eq!(remove(&mut doc, &path("contracts[0]")), Some(json!(1)));
        assert_eq!(remove(&mut doc, &path("contracts[9]")), None);
        assert_eq!(doc, json!({"descriptor": {}, "contracts": [null, 2]}));
    }

    #[test]
    fn test_serde_as_string() {
        let p = path("employees[3].cpf");
        let encoded = serde_json::to_string(&p).unwrap();
        assert_eq!(encoded, "\"employees[3].cpf\"");
        let decoded: FieldPath = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, p);
        assert!(serde_json::from_str::<FieldPath>("\"a[\"").is_err());
    }
}

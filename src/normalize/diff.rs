//! Structural diff between two JSON trees

use serde::Serialize;
use serde_json::Value;

use crate::document::json_eq;

/// One leaf-level difference. `None` means the key is absent on that side.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Difference {
    pub path: String,
    pub from: Option<Value>,
    pub to: Option<Value>,
}

/// Compare `a` and `b`, prefixing every reported path with `prefix`.
///
/// Records and lists present on both sides are compared member by member;
/// anything else that differs is reported as a single leaf change.
pub fn diff(a: &Value, b: &Value, prefix: &str) -> Vec<Difference> {
    let mut out = Vec::new();
    diff_into(Some(a), Some(b), prefix.to_string(), &mut out);
    out
}

fn diff_into(a: Option<&Value>, b: Option<&Value>, path: String, out: &mut Vec<Difference>) {
    if json_eq(a, b) {
        return;
    }

    match (a, b) {
        (Some(Value::Object(left)), Some(Value::Object(right))) => {
            let keys = left
                .keys()
                .chain(right.keys().filter(|k| !left.contains_key(*k)));
            for key in keys {
                let child = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                diff_into(left.get(key), right.get(key), child, out);
            }
        }
        (Some(Value::Array(left)), Some(Value::Array(right))) => {
            for index in 0..left.len().max(right.len()) {
                diff_into(
                    left.get(index),
                    right.get(index),
                    format!("{}[{}]", path, index),
                    out,
                );
            }
        }
        _ => out.push(Difference {
            path,
            from: a.cloned(),
            to: b.cloned(),
        }),
    }
}

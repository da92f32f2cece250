//! Conversion between external JSON text and the canonical [`Document`]
//!
//! Import is tolerant: unknown top-level fields are reported and dropped,
//! never kept. Export optionally strips empty values and appends a metadata
//! block under [`META_KEY`].

mod coerce;
mod diff;

pub use coerce::{digits_only, parse_number};
pub use diff::{diff, Difference};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::document::{
    digest_value, is_allowed_key, type_name, Document, Presence, Section, SectionKind, META_KEY,
};

/// Schema version written into the export metadata
pub const SCHEMA_VERSION: &str = "1.9";

const GENERATOR: &str = concat!("audesp-sync/", env!("CARGO_PKG_VERSION"));

/// A problem found while importing. Errors make the import fail; warnings
/// are informational.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImportIssue {
    #[error("Failed to parse JSON: {message}")]
    Parse { message: String },

    #[error("Document root must be a JSON object, found {found}")]
    NotAnObject { found: String },

    #[error("Required section missing: {section}")]
    MissingRequired { section: String },

    #[error("Recommended section missing: {section}")]
    MissingRecommended { section: String },

    #[error("Section '{section}' must be {expected}, found {found}")]
    WrongSectionType {
        section: String,
        expected: String,
        found: String,
    },

    #[error("Ignored fields (not permitted): {}", fields.join(", "))]
    UnknownFields { fields: Vec<String> },
}

/// Outcome of [`import`]. `data` is present exactly when `success` is.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ImportReport {
    pub success: bool,
    pub data: Option<Document>,
    pub errors: Vec<ImportIssue>,
    pub warnings: Vec<ImportIssue>,
}

impl ImportReport {
    fn failed(errors: Vec<ImportIssue>, warnings: Vec<ImportIssue>) -> Self {
        Self {
            success: false,
            data: None,
            errors,
            warnings,
        }
    }
}

/// How [`export`] renders a document
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Keep empty lists, nulls and empty strings
    pub include_empty: bool,
    /// Two-space indentation instead of compact output
    pub pretty: bool,
    /// Append the metadata block
    pub include_meta: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_empty: false,
            pretty: true,
            include_meta: true,
        }
    }
}

/// Contents of the reserved metadata block
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportMeta {
    pub exported_at: DateTime<Utc>,
    pub schema_version: String,
    pub generator: String,
    /// Hex SHA-256 of the exported content without this block
    pub content_digest: String,
}

/// Parse and normalize an external JSON document
pub fn import(raw: &str) -> ImportReport {
    let parsed: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            return ImportReport::failed(
                vec![ImportIssue::Parse {
                    message: e.to_string(),
                }],
                Vec::new(),
            )
        }
    };

    let mut root = match parsed {
        Value::Object(record) => record,
        other => {
            return ImportReport::failed(
                vec![ImportIssue::NotAnObject {
                    found: type_name(&other).to_string(),
                }],
                Vec::new(),
            )
        }
    };

    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let unknown: Vec<String> = root
        .keys()
        .filter(|k| !is_allowed_key(k))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        log::warn!("Dropping fields outside the section allow-list: {}", unknown.join(", "));
        warnings.push(ImportIssue::UnknownFields { fields: unknown });
    }

    let mut normalized = Map::new();
    for section in Section::ALL {
        let value = match root.remove(section.key()) {
            Some(Value::Null) | None => {
                if section.presence() == Presence::Required {
                    errors.push(ImportIssue::MissingRequired {
                        section: section.key().to_string(),
                    });
                } else if Section::IMPORT_RECOMMENDED.contains(&section) {
                    warnings.push(ImportIssue::MissingRecommended {
                        section: section.key().to_string(),
                    });
                }
                continue;
            }
            Some(value) => value,
        };

        let shape_ok = match section.kind() {
            SectionKind::Singleton => value.is_object(),
            SectionKind::List => value.is_array(),
        };
        if !shape_ok {
            errors.push(ImportIssue::WrongSectionType {
                section: section.key().to_string(),
                expected: match section.kind() {
                    SectionKind::Singleton => "a record".to_string(),
                    SectionKind::List => "a list".to_string(),
                },
                found: type_name(&value).to_string(),
            });
            continue;
        }

        normalized.insert(
            section.key().to_string(),
            coerce::coerce_section(section, value),
        );
    }

    if !errors.is_empty() {
        log::info!("Import rejected with {} error(s)", errors.len());
        return ImportReport::failed(errors, warnings);
    }

    log::debug!(
        "Imported {} section(s) with {} warning(s)",
        normalized.len(),
        warnings.len()
    );
    ImportReport {
        success: true,
        data: Some(Document::from_sections(normalized)),
        errors,
        warnings,
    }
}

/// Render a document as JSON text, stamping metadata with the current time
pub fn export(document: &Document, options: &ExportOptions) -> Result<String, serde_json::Error> {
    export_at(document, options, Utc::now())
}

/// [`export`] with an explicit timestamp
pub fn export_at(
    document: &Document,
    options: &ExportOptions,
    now: DateTime<Utc>,
) -> Result<String, serde_json::Error> {
    let mut root = document.to_value();
    if !options.include_empty {
        root = strip_empty(root).unwrap_or_else(|| Value::Object(Map::new()));
    }

    if options.include_meta {
        let meta = ExportMeta {
            exported_at: now,
            schema_version: SCHEMA_VERSION.to_string(),
            generator: GENERATOR.to_string(),
            content_digest: digest_value(&root),
        };
        let meta = serde_json::to_value(meta)?;
        if let Some(record) = root.as_object_mut() {
            record.insert(META_KEY.to_string(), meta);
        }
    }

    if options.pretty {
        serde_json::to_string_pretty(&root)
    } else {
        serde_json::to_string(&root)
    }
}

/// Recursively drop empty lists, nulls and empty strings. `false` and `0`
/// are kept. Returns `None` when `value` itself is empty.
pub fn strip_empty(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::Array(items) => {
            let kept: Vec<Value> = items.into_iter().filter_map(strip_empty).collect();
            if kept.is_empty() {
                None
            } else {
                Some(Value::Array(kept))
            }
        }
        Value::Object(record) => Some(Value::Object(
            record
                .into_iter()
                .filter_map(|(k, v)| strip_empty(v).map(|v| (k, v)))
                .collect(),
        )),
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::FieldPath;
    use chrono::TimeZone;
    use serde_json::json;

    fn field(doc: &Document, path: &str) -> Option<Value> {
        doc.get(&FieldPath::parse(path).unwrap()).cloned()
    }

    #[test]
    fn test_parse_error_is_terminal() {
        let report = import("{not json");
        assert!(!report.success);
        assert!(report.data.is_none());
        assert!(matches!(report.errors.as_slice(), [ImportIssue::Parse { .. }]));
    }

    #[test]
    fn test_root_must_be_object() {
        let report = import("[1, 2]");
        assert!(!report.success);
        assert_eq!(
            report.errors,
            vec![ImportIssue::NotAnObject {
                found: "list".into()
            }]
        );
    }

    #[test]
    fn test_unknown_fields_warned_and_dropped() {
        let report =
            import(r#"{"descriptor": {"municipality": 1}, "mystery_field": 1, "other": null}"#);
        assert!(report.success);
        let doc = report.data.unwrap();
        assert!(doc.as_value().get("mystery_field").is_none());
        assert!(doc.as_value().get("other").is_none());

        let unknown = report
            .warnings
            .iter()
            .find(|w| matches!(w, ImportIssue::UnknownFields { .. }))
            .unwrap();
        assert!(unknown.to_string().contains("mystery_field"));
        assert!(unknown.to_string().contains("other"));
    }

    #[test]
    fn test_meta_block_is_accepted_and_dropped() {
        let report = import(r#"{"descriptor": {}, "_meta": {"schema_version": "1.9"}}"#);
        assert!(report.success);
        assert!(!report
            .warnings
            .iter()
            .any(|w| matches!(w, ImportIssue::UnknownFields { .. })));
        assert!(report.data.unwrap().as_value().get(META_KEY).is_none());
    }

    #[test]
    fn test_presence_checks() {
        let report = import(r#"{"contracts": []}"#);
        assert!(!report.success);
        assert_eq!(
            report.errors,
            vec![ImportIssue::MissingRequired {
                section: "descriptor".into()
            }]
        );
        assert!(report.warnings.contains(&ImportIssue::MissingRecommended {
            section: "revenues".into()
        }));
        assert!(report.warnings.contains(&ImportIssue::MissingRecommended {
            section: "payments".into()
        }));
    }

    #[test]
    fn test_wrong_section_type_fails() {
        let report = import(r#"{"descriptor": {}, "contracts": "none"}"#);
        assert!(!report.success);
        assert_eq!(
            report.errors,
            vec![ImportIssue::WrongSectionType {
                section: "contracts".into(),
                expected: "a list".into(),
                found: "string".into(),
            }]
        );
    }

    #[test]
    fn test_numeric_coercion() {
        let report = import(
            r#"{"descriptor": {"municipality": "1", "entity": 2, "year": "2024", "month": "13"},
                "payments": [{"payment_amount": "R$ 10,00", "payment_date": "2024-01-05"}]}"#,
        );
        assert!(report.success);
        let doc = report.data.unwrap();
        assert_eq!(field(&doc, "descriptor.municipality"), Some(json!(1)));
        assert_eq!(field(&doc, "descriptor.year"), Some(json!(2024)));
        assert_eq!(field(&doc, "descriptor.month"), Some(json!(13)));
        assert_eq!(field(&doc, "payments[0].payment_amount"), Some(json!(10)));
    }

    #[test]
    fn test_canonical_section_order() {
        let report = import(r#"{"payments": [], "revenues": {}, "descriptor": {}}"#);
        let doc = report.data.unwrap();
        let order: Vec<Section> = doc.sections().collect();
        assert_eq!(
            order,
            vec![Section::Descriptor, Section::Payments, Section::Revenues]
        );
    }

    #[test]
    fn test_strip_empty_keeps_false_and_zero() {
        let stripped = strip_empty(json!({
            "a": [],
            "b": null,
            "c": "",
            "d": false,
            "e": 0,
            "f": {"g": [null, "", 0, false, []]},
            "h": {}
        }))
        .unwrap();
        assert_eq!(
            stripped,
            json!({"d": false, "e": 0, "f": {"g": [0, false]}, "h": {}})
        );
    }

    #[test]
    fn test_export_strips_and_stamps_meta() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let text = export_at(&Document::template(), &ExportOptions::default(), now).unwrap();
        assert!(text.contains("\n  \""), "pretty output uses two-space indent");

        let value: Value = serde_json::from_str(&text).unwrap();
        assert!(value.get("contracts").is_none());
        assert_eq!(value["descriptor"], json!({}));
        assert_eq!(value[META_KEY]["schema_version"], json!(SCHEMA_VERSION));
        assert_eq!(value[META_KEY]["exported_at"], json!("2024-05-01T12:00:00Z"));

        let mut content = value.clone();
        content.as_object_mut().unwrap().remove(META_KEY);
        assert_eq!(value[META_KEY]["content_digest"], json!(digest_value(&content)));
    }

    #[test]
    fn test_export_compact_with_empties() {
        let options = ExportOptions {
            include_empty: true,
            pretty: false,
            include_meta: false,
        };
        let text = export(&Document::template(), &options).unwrap();
        assert!(!text.contains('\n'));
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, Document::template().to_value());
    }

    #[test]
    fn test_export_then_import_preserves_content() {
        let mut doc = Document::template();
        doc.set(&FieldPath::parse("descriptor.municipality").unwrap(), json!(3550308))
            .unwrap();
        doc.set(&FieldPath::parse("revenues.flag").unwrap(), json!(false))
            .unwrap();
        let text = export(&doc, &ExportOptions::default()).unwrap();
        let report = import(&text);
        assert!(report.success);
        let back = report.data.unwrap();
        assert_eq!(field(&back, "descriptor.municipality"), Some(json!(3550308)));
        assert_eq!(field(&back, "revenues.flag"), Some(json!(false)));
    }
}

//! Per-section rule registry
//!
//! Every [`Section`] maps to exactly one check through an exhaustive match.
//! A check sees only its own section's data.

use serde_json::{Map, Value};

use super::{Category, Diagnostic, Validator};
use crate::document::{FieldPath, Presence, Section, SectionKind};

/// How strongly a field is expected inside a record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Need {
    Required,
    Recommended,
}

#[derive(Clone, Copy, Debug)]
struct FieldSpec {
    name: &'static str,
    need: Need,
}

impl FieldSpec {
    const fn required(name: &'static str) -> Self {
        Self {
            name,
            need: Need::Required,
        }
    }

    const fn recommended(name: &'static str) -> Self {
        Self {
            name,
            need: Need::Recommended,
        }
    }
}

const DESCRIPTOR_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("municipality"),
    FieldSpec::required("entity"),
    FieldSpec::required("year"),
];
const ADJUSTMENT_CODE_FIELDS: &[FieldSpec] = &[FieldSpec::recommended("code")];
const EMPLOYEE_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("cpf"),
    FieldSpec::required("cbo"),
    FieldSpec::required("contractual_salary"),
];
const MOVABLE_ASSET_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("asset_number"),
    FieldSpec::required("acquisition_value"),
];
const CONTRACT_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("number"),
    FieldSpec::required("amount"),
    FieldSpec::required("signature_date"),
];
const FISCAL_DOCUMENT_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("number"),
    FieldSpec::required("gross_amount"),
];
const PAYMENT_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("payment_date"),
    FieldSpec::required("payment_amount"),
];

pub(super) fn check(validator: &Validator, section: Section, data: Option<&Value>) -> Vec<Diagnostic> {
    let data = match data {
        None | Some(Value::Null) => return absent(section).into_iter().collect(),
        Some(data) => data,
    };

    let key = section.key();
    let root = FieldPath::root(key);
    let mut out = Vec::new();

    match (section.kind(), data) {
        (SectionKind::List, Value::Array(items)) => {
            if items.is_empty() && section.presence() == Presence::Recommended {
                out.push(Diagnostic::warning(
                    key,
                    key,
                    format!("{}: no entries reported", section.label()),
                    Category::Info,
                ));
            }
        }
        (SectionKind::Singleton, Value::Object(_)) => {}
        (kind, _) => {
            let expected = match kind {
                SectionKind::List => "a list",
                SectionKind::Singleton => "a record",
            };
            out.push(Diagnostic::error(
                key,
                key,
                format!("{} must be {}", section.label(), expected),
                Category::Type,
            ));
            return out;
        }
    }

    match section {
        Section::Descriptor => descriptor(&root, data, &mut out),
        Section::AdjustmentCode => {
            if let Some(record) = data.as_object() {
                required_fields(&root, record, ADJUSTMENT_CODE_FIELDS, &mut out);
            }
        }
        Section::Employees => each_item(&root, data, &mut out, |path, item, out| {
            required_fields(path, item, EMPLOYEE_FIELDS, out);
            cpf_field(validator, path, item, out);
            if is_missing(item.get("remuneration_periods")) {
                out.push(Diagnostic::warning(
                    path.clone().field("remuneration_periods").to_string(),
                    "remuneration_periods",
                    "Employee has no remuneration periods",
                    Category::Info,
                ));
            }
        }),
        Section::Assets => {
            if let Some(movable) = data.get("movable_acquired") {
                let path = root.clone().field("movable_acquired");
                each_item(&path, movable, &mut out, |path, item, out| {
                    required_fields(path, item, MOVABLE_ASSET_FIELDS, out);
                });
            }
        }
        Section::Contracts => each_item(&root, data, &mut out, |path, item, out| {
            required_fields(path, item, CONTRACT_FIELDS, out);
        }),
        Section::FiscalDocuments => each_item(&root, data, &mut out, |path, item, out| {
            required_fields(path, item, FISCAL_DOCUMENT_FIELDS, out);
        }),
        Section::Payments => each_item(&root, data, &mut out, |path, item, out| {
            required_fields(path, item, PAYMENT_FIELDS, out);
        }),
        Section::SecondedServants => each_item(&root, data, &mut out, |path, item, out| {
            if !is_missing(item.get("cpf")) {
                cpf_field(validator, path, item, out);
            }
        }),
        Section::Availabilities
        | Section::Revenues
        | Section::Discounts
        | Section::Refunds
        | Section::Disallowances
        | Section::Commitments
        | Section::Transfers
        | Section::Declarations
        | Section::Transparency
        | Section::ActivityReport
        | Section::GovernmentReport
        | Section::FinancialStatements
        | Section::OpinionPublications
        | Section::ConclusiveOpinion
        | Section::EntityGeneralData
        | Section::ResponsibleParties => {}
    }

    out
}

fn absent(section: Section) -> Option<Diagnostic> {
    let key = section.key();
    match section.presence() {
        Presence::Required => Some(Diagnostic::error(
            key,
            key,
            format!("{} is required", section.label()),
            Category::Required,
        )),
        Presence::Recommended => Some(Diagnostic::warning(
            key,
            key,
            format!("{} is missing", section.label()),
            Category::Recommended,
        )),
        Presence::Optional => None,
    }
}

fn descriptor(root: &FieldPath, data: &Value, out: &mut Vec<Diagnostic>) {
    let Some(record) = data.as_object() else {
        return;
    };
    required_fields(root, record, DESCRIPTOR_FIELDS, out);

    if let Some(year) = record.get("year").filter(|v| !is_missing(Some(*v))) {
        if as_integer(year).is_none() {
            out.push(Diagnostic::error(
                root.clone().field("year").to_string(),
                "year",
                "Year must be an integer",
                Category::Type,
            ));
        }
    }

    let month_path = root.clone().field("month").to_string();
    match record.get("month") {
        month if is_missing(month) => out.push(Diagnostic::error(
            month_path,
            "month",
            "Month is required",
            Category::Required,
        )),
        Some(month) => match as_integer(month) {
            Some(m) if (1..=12).contains(&m) => {}
            Some(m) => out.push(Diagnostic::error(
                month_path,
                "month",
                format!("Month must be between 1 and 12, got {}", m),
                Category::Range,
            )),
            None => out.push(Diagnostic::error(
                month_path,
                "month",
                "Month must be an integer",
                Category::Type,
            )),
        },
        None => {}
    }
}

/// Run `f` on every item of a list, flagging items that are not records
fn each_item<F>(list_path: &FieldPath, data: &Value, out: &mut Vec<Diagnostic>, mut f: F)
where
    F: FnMut(&FieldPath, &Map<String, Value>, &mut Vec<Diagnostic>),
{
    let Some(items) = data.as_array() else {
        return;
    };
    for (i, item) in items.iter().enumerate() {
        let path = list_path.clone().index(i);
        match item.as_object() {
            Some(record) => f(&path, record, out),
            None => {
                let field = path.to_string();
                out.push(Diagnostic::error(
                    field.clone(),
                    field,
                    "Entry must be a record",
                    Category::Type,
                ));
            }
        }
    }
}

fn required_fields(
    path: &FieldPath,
    record: &Map<String, Value>,
    specs: &[FieldSpec],
    out: &mut Vec<Diagnostic>,
) {
    for spec in specs {
        if !is_missing(record.get(spec.name)) {
            continue;
        }
        let field_path = path.clone().field(spec.name).to_string();
        out.push(match spec.need {
            Need::Required => Diagnostic::error(
                field_path,
                spec.name,
                format!("Field '{}' is required", spec.name),
                Category::Required,
            ),
            Need::Recommended => Diagnostic::warning(
                field_path,
                spec.name,
                format!("Field '{}' is recommended", spec.name),
                Category::Recommended,
            ),
        });
    }
}

/// Checksum an already-present `cpf` field
fn cpf_field(
    validator: &Validator,
    path: &FieldPath,
    record: &Map<String, Value>,
    out: &mut Vec<Diagnostic>,
) {
    let raw = match record.get("cpf") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return,
    };
    if !validator.cpf_is_valid(&raw) {
        out.push(Diagnostic::error(
            path.clone().field("cpf").to_string(),
            "cpf",
            format!("Invalid CPF '{}'", raw),
            Category::Format,
        ));
    }
}

/// Integer reading of a number. Integral floats such as `6.0` count.
fn as_integer(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|n| n.fract() == 0.0 && n.abs() < 9.0e15)
            .map(|n| n as i64)
    })
}

/// Absent, null, empty string and empty list all count as missing
fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}

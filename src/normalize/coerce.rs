//! Field coercion applied to imported sections

use serde_json::{Map, Number, Value};

use crate::document::Section;

const EMPLOYEE_MONEY: &[&str] = &["contractual_salary"];
const CONTRACT_MONEY: &[&str] = &["amount"];
const FISCAL_DOCUMENT_MONEY: &[&str] = &["gross_amount", "net_amount", "charges"];
const PAYMENT_MONEY: &[&str] = &["payment_amount"];
const ASSET_MONEY: &[&str] = &["acquisition_value"];

/// Normalize one known section. Values of the wrong shape are returned as-is.
pub(crate) fn coerce_section(section: Section, mut value: Value) -> Value {
    match section {
        Section::Descriptor => {
            if let Some(record) = value.as_object_mut() {
                for key in ["municipality", "entity", "year", "month"] {
                    numeric_field(record, key);
                }
            }
        }
        Section::Employees => for_each_item(&mut value, |item| {
            digits_field(item, "cpf");
            for key in EMPLOYEE_MONEY {
                numeric_field(item, key);
            }
            default_list(item, "remuneration_periods");
        }),
        Section::Assets => {
            if let Some(record) = value.as_object_mut() {
                default_list(record, "movable_acquired");
                default_list(record, "immovable");
                if let Some(items) = record.get_mut("movable_acquired") {
                    for_each_item(items, |item| {
                        for key in ASSET_MONEY {
                            numeric_field(item, key);
                        }
                    });
                }
            }
        }
        Section::Contracts => for_each_item(&mut value, |item| {
            for key in CONTRACT_MONEY {
                numeric_field(item, key);
            }
            creditor_document(item);
        }),
        Section::FiscalDocuments => for_each_item(&mut value, |item| {
            for key in FISCAL_DOCUMENT_MONEY {
                numeric_field(item, key);
            }
            creditor_document(item);
        }),
        Section::Payments => for_each_item(&mut value, |item| {
            for key in PAYMENT_MONEY {
                numeric_field(item, key);
            }
        }),
        Section::Availabilities => {
            if let Some(record) = value.as_object_mut() {
                default_list(record, "balances");
            }
        }
        Section::Revenues => {
            if let Some(record) = value.as_object_mut() {
                default_list(record, "transfers_received");
                default_list(record, "other_revenues");
            }
        }
        Section::SecondedServants => for_each_item(&mut value, |item| digits_field(item, "cpf")),
        Section::AdjustmentCode
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
    value
}

fn for_each_item(list: &mut Value, mut f: impl FnMut(&mut Map<String, Value>)) {
    if let Some(items) = list.as_array_mut() {
        for item in items.iter_mut().filter_map(Value::as_object_mut) {
            f(item);
        }
    }
}

fn creditor_document(item: &mut Map<String, Value>) {
    if let Some(creditor) = item.get_mut("creditor").and_then(Value::as_object_mut) {
        digits_field(creditor, "document_number");
    }
}

fn numeric_field(record: &mut Map<String, Value>, key: &str) {
    if let Some(value) = record.get_mut(key) {
        if let Some(n) = parse_number(value) {
            *value = number_value(n);
        }
    }
}

fn digits_field(record: &mut Map<String, Value>, key: &str) {
    if let Some(value) = record.get_mut(key) {
        let raw = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return,
        };
        *value = Value::String(digits_only(&raw));
    }
}

fn default_list(record: &mut Map<String, Value>, key: &str) {
    let missing = !matches!(record.get(key), Some(Value::Array(_)));
    if missing {
        record.insert(key.to_string(), Value::Array(Vec::new()));
    }
}

/// Strip everything but ASCII digits
pub fn digits_only(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Numeric reading of a JSON value. Accepts plain decimals and Brazilian
/// formatting (`R$ 1.234,56`). Without a comma, dots that split the digits
/// into groups of three (`1.234`, `1.234.567`) are thousands separators;
/// any other dot is a decimal point. Non-numeric strings yield `None`.
pub fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_numeric_str(s),
        _ => None,
    }
}

fn parse_numeric_str(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix("R$").unwrap_or(trimmed).trim();
    if trimmed.is_empty() {
        return None;
    }
    let normalized = if trimmed.contains(',') {
        trimmed.replace('.', "").replace(',', ".")
    } else if is_thousands_grouped(trimmed) {
        trimmed.replace('.', "")
    } else {
        trimmed.to_string()
    };
    if !normalized
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+'))
    {
        return None;
    }
    normalized.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// `1.234` style grouping: a leading group of one to three digits not
/// starting with zero, then one or more dot-separated groups of three
fn is_thousands_grouped(raw: &str) -> bool {
    let unsigned = raw.strip_prefix(|c: char| c == '-' || c == '+').unwrap_or(raw);
    let mut groups = unsigned.split('.');
    let head = groups.next().unwrap_or_default();
    let tail: Vec<&str> = groups.collect();
    let all_digits = |g: &str| g.bytes().all(|b| b.is_ascii_digit());

    !tail.is_empty()
        && (1..=3).contains(&head.len())
        && !head.starts_with('0')
        && all_digits(head)
        && tail.iter().all(|g| g.len() == 3 && all_digits(g))
}

/// Integral values become JSON integers, everything else a float
pub fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

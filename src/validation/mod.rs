//! Per-section validation of the report
//!
//! The [`Validator`] is stateless: it takes a [`Document`] and returns a
//! fresh [`ValidationReport`]. Each section is checked by its own pure
//! function with no access to sibling sections.

pub mod identifiers;
mod sections;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{Document, Section};

/// External identifier check, e.g. a CPF checksum
pub type IdentifierCheck = fn(&str) -> bool;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// What kind of rule produced a diagnostic
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Required,
    Recommended,
    Format,
    Range,
    Type,
    Info,
}

/// One validation finding tied to a path
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub path: String,
    pub field: String,
    pub message: String,
    pub severity: Severity,
    pub category: Category,
}

impl Diagnostic {
    pub fn error(
        path: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
        category: Category,
    ) -> Self {
        Self {
            path: path.into(),
            field: field.into(),
            message: message.into(),
            severity: Severity::Error,
            category,
        }
    }

    pub fn warning(
        path: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
        category: Category,
    ) -> Self {
        Self {
            path: path.into(),
            field: field.into(),
            message: message.into(),
            severity: Severity::Warning,
            category,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Error and warning counts for one section
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionStatus {
    pub valid: bool,
    pub error_count: usize,
    pub warning_count: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub total_errors: usize,
    pub total_warnings: usize,
    pub sections: BTreeMap<Section, SectionStatus>,
}

/// Result of one validation run. `valid` is true iff there are no errors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub summary: ValidationSummary,
}

impl ValidationReport {
    /// Aggregate diagnostics into a report with per-section counts
    pub fn from_diagnostics(diagnostics: Vec<Diagnostic>) -> Self {
        let (errors, warnings): (Vec<_>, Vec<_>) =
            diagnostics.into_iter().partition(Diagnostic::is_error);

        let sections = Section::ALL
            .iter()
            .map(|&section| {
                let error_count = errors.iter().filter(|d| section.contains_path(&d.path)).count();
                let warning_count = warnings
                    .iter()
                    .filter(|d| section.contains_path(&d.path))
                    .count();
                let status = SectionStatus {
                    valid: error_count == 0,
                    error_count,
                    warning_count,
                };
                (section, status)
            })
            .collect();

        Self {
            valid: errors.is_empty(),
            summary: ValidationSummary {
                total_errors: errors.len(),
                total_warnings: warnings.len(),
                sections,
            },
            errors,
            warnings,
        }
    }

    pub fn section(&self, section: Section) -> SectionStatus {
        self.summary
            .sections
            .get(&section)
            .copied()
            .unwrap_or_default()
    }

    /// Errors whose path is exactly `path`
    pub fn errors_at<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a Diagnostic> + 'a {
        self.errors.iter().filter(move |d| d.path == path)
    }
}

/// Runs the per-section checks
#[derive(Clone, Copy)]
pub struct Validator {
    cpf_check: IdentifierCheck,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            cpf_check: identifiers::is_valid_cpf,
        }
    }

    /// Replace the person tax ID checksum
    pub fn with_cpf_check(mut self, check: IdentifierCheck) -> Self {
        self.cpf_check = check;
        self
    }

    pub(crate) fn cpf_is_valid(&self, raw: &str) -> bool {
        (self.cpf_check)(raw)
    }

    /// Validate every section of `document`
    pub fn validate(&self, document: &Document) -> ValidationReport {
        let diagnostics = Section::ALL
            .iter()
            .flat_map(|&section| self.check_section(section, document.section(section)))
            .collect();
        let report = ValidationReport::from_diagnostics(diagnostics);
        log::debug!(
            "Validation finished: {} error(s), {} warning(s)",
            report.errors.len(),
            report.warnings.len()
        );
        report
    }

    /// Diagnostics for a single section of `document`
    pub fn validate_section(&self, document: &Document, section: Section) -> Vec<Diagnostic> {
        self.check_section(section, document.section(section))
    }

    /// Run the check registered for `section` on its raw data
    pub fn check_section(&self, section: Section, data: Option<&Value>) -> Vec<Diagnostic> {
        sections::check(self, section, data)
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator").finish_non_exhaustive()
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

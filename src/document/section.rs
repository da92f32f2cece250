//! The closed set of top-level report sections
//!
//! [`Section`] is both the import allow-list and the key of the validator
//! registry. Adding a variant forces a decision in every exhaustive `match`
//! over it, including the per-section checks in `validation::sections`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Reserved key for the export metadata block. Accepted on import, never kept.
pub const META_KEY: &str = "_meta";

/// Shape of a section's value
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SectionKind {
    /// A single record
    Singleton,
    /// An ordered list of item records
    List,
}

/// How strongly a section is expected to be present
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Presence {
    Required,
    Recommended,
    Optional,
}

/// A named top-level subtree of the report
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Descriptor,
    AdjustmentCode,
    Employees,
    Assets,
    Contracts,
    FiscalDocuments,
    Payments,
    Availabilities,
    Revenues,
    SecondedServants,
    Discounts,
    Refunds,
    Disallowances,
    Commitments,
    Transfers,
    Declarations,
    Transparency,
    ActivityReport,
    GovernmentReport,
    FinancialStatements,
    OpinionPublications,
    ConclusiveOpinion,
    EntityGeneralData,
    ResponsibleParties,
}

impl Section {
    /// Every section, in canonical document order
    pub const ALL: [Section; 24] = [
        Section::Descriptor,
        Section::AdjustmentCode,
        Section::Employees,
        Section::Assets,
        Section::Contracts,
        Section::FiscalDocuments,
        Section::Payments,
        Section::Availabilities,
        Section::Revenues,
        Section::SecondedServants,
        Section::Discounts,
        Section::Refunds,
        Section::Disallowances,
        Section::Commitments,
        Section::Transfers,
        Section::Declarations,
        Section::Transparency,
        Section::ActivityReport,
        Section::GovernmentReport,
        Section::FinancialStatements,
        Section::OpinionPublications,
        Section::ConclusiveOpinion,
        Section::EntityGeneralData,
        Section::ResponsibleParties,
    ];

    /// Sections whose absence is reported as a warning on import
    pub const IMPORT_RECOMMENDED: [Section; 2] = [Section::Revenues, Section::Payments];

    /// The wire key of this section
    pub fn key(self) -> &'static str {
        match self {
            Section::Descriptor => "descriptor",
            Section::AdjustmentCode => "adjustment_code",
            Section::Employees => "employees",
            Section::Assets => "assets",
            Section::Contracts => "contracts",
            Section::FiscalDocuments => "fiscal_documents",
            Section::Payments => "payments",
            Section::Availabilities => "availabilities",
            Section::Revenues => "revenues",
            Section::SecondedServants => "seconded_servants",
            Section::Discounts => "discounts",
            Section::Refunds => "refunds",
            Section::Disallowances => "disallowances",
            Section::Commitments => "commitments",
            Section::Transfers => "transfers",
            Section::Declarations => "declarations",
            Section::Transparency => "transparency",
            Section::ActivityReport => "activity_report",
            Section::GovernmentReport => "government_report",
            Section::FinancialStatements => "financial_statements",
            Section::OpinionPublications => "opinion_publications",
            Section::ConclusiveOpinion => "conclusive_opinion",
            Section::EntityGeneralData => "entity_general_data",
            Section::ResponsibleParties => "responsible_parties",
        }
    }

    pub fn from_key(key: &str) -> Option<Section> {
        Section::ALL.iter().copied().find(|s| s.key() == key)
    }

    pub fn kind(self) -> SectionKind {
        match self {
            Section::Employees
            | Section::Contracts
            | Section::FiscalDocuments
            | Section::Payments
            | Section::SecondedServants
            | Section::Discounts
            | Section::Refunds
            | Section::Disallowances
            | Section::Commitments
            | Section::Transfers
            | Section::OpinionPublications => SectionKind::List,
            _ => SectionKind::Singleton,
        }
    }

    pub fn presence(self) -> Presence {
        match self {
            Section::Descriptor => Presence::Required,
            Section::AdjustmentCode
            | Section::ActivityReport
            | Section::GovernmentReport
            | Section::FinancialStatements
            | Section::OpinionPublications
            | Section::ConclusiveOpinion
            | Section::EntityGeneralData
            | Section::ResponsibleParties => Presence::Optional,
            _ => Presence::Recommended,
        }
    }

    /// Human-readable name used in diagnostics
    pub fn label(self) -> &'static str {
        match self {
            Section::Descriptor => "Descriptor",
            Section::AdjustmentCode => "Adjustment code",
            Section::Employees => "Employees",
            Section::Assets => "Assets",
            Section::Contracts => "Contracts",
            Section::FiscalDocuments => "Fiscal documents",
            Section::Payments => "Payments",
            Section::Availabilities => "Availabilities",
            Section::Revenues => "Revenues",
            Section::SecondedServants => "Seconded servants",
            Section::Discounts => "Discounts",
            Section::Refunds => "Refunds",
            Section::Disallowances => "Disallowances",
            Section::Commitments => "Commitments",
            Section::Transfers => "Transfers",
            Section::Declarations => "Declarations",
            Section::Transparency => "Transparency",
            Section::ActivityReport => "Activity report",
            Section::GovernmentReport => "Government report",
            Section::FinancialStatements => "Financial statements",
            Section::OpinionPublications => "Opinion publications",
            Section::ConclusiveOpinion => "Conclusive opinion",
            Section::EntityGeneralData => "Entity general data",
            Section::ResponsibleParties => "Responsible parties",
        }
    }

    /// Value placed in the empty template, `None` for optional sections
    pub fn template_value(self) -> Option<Value> {
        if self.presence() == Presence::Optional {
            return None;
        }
        Some(match self {
            Section::Descriptor => json!({
                "municipality": "",
                "entity": "",
                "year": null,
                "month": null,
            }),
            Section::Assets => json!({"movable_acquired": [], "immovable": []}),
            Section::Availabilities => json!({"balances": []}),
            Section::Revenues => json!({"transfers_received": [], "other_revenues": []}),
            Section::Transparency => json!({"websites": []}),
            _ => match self.kind() {
                SectionKind::List => json!([]),
                SectionKind::Singleton => json!({}),
            },
        })
    }

    /// Whether a diagnostic path falls inside this section. Matches whole
    /// segments only.
    pub fn contains_path(self, path: &str) -> bool {
        match path.strip_prefix(self.key()) {
            Some(rest) => rest.is_empty() || rest.starts_with('.') || rest.starts_with('['),
            None => false,
        }
    }
}

/// Whether `key` may appear at the top level of an imported document
pub fn is_allowed_key(key: &str) -> bool {
    key == META_KEY || Section::from_key(key).is_some()
}

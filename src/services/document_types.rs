//! Document-type inference from filenames.
//!
//! Rules are evaluated top to bottom and the first match wins, so a file
//! named "operating lease.pdf" is an operating statement, not a lease.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DocumentKind {
    RentRoll,
    OperatingStatement,
    LeaseAgreement,
    ProfitAndLoss,
    BalanceSheet,
    Appraisal,
    InspectionReport,
    FinancialStatement,
    Other,
}

impl DocumentKind {
    /// Label used in prompts and the fallback analysis.
    pub fn label(&self) -> &'static str {
        match self {
            Self::RentRoll => "rent roll",
            Self::OperatingStatement => "operating statement",
            Self::LeaseAgreement => "lease agreement",
            Self::ProfitAndLoss => "profit and loss",
            Self::BalanceSheet => "balance sheet",
            Self::Appraisal => "appraisal",
            Self::InspectionReport => "inspection report",
            Self::FinancialStatement => "financial statement",
            Self::Other => "other",
        }
    }
}

/// A filename matches when it contains every `all_of` keyword and, if
/// `any_of` is non-empty, at least one of those.
struct Rule {
    all_of: &'static [&'static str],
    any_of: &'static [&'static str],
    kind: DocumentKind,
}

impl Rule {
    fn matches(&self, lowered: &str) -> bool {
        self.all_of.iter().all(|k| lowered.contains(k))
            && (self.any_of.is_empty() || self.any_of.iter().any(|k| lowered.contains(k)))
    }
}

const RULES: &[Rule] = &[
    Rule { all_of: &["rent", "roll"], any_of: &[], kind: DocumentKind::RentRoll },
    Rule { all_of: &[], any_of: &["operating", "income"], kind: DocumentKind::OperatingStatement },
    Rule { all_of: &["lease"], any_of: &[], kind: DocumentKind::LeaseAgreement },
    Rule { all_of: &[], any_of: &["p&l", "profit"], kind: DocumentKind::ProfitAndLoss },
    Rule { all_of: &["balance"], any_of: &[], kind: DocumentKind::BalanceSheet },
    Rule { all_of: &["appraisal"], any_of: &[], kind: DocumentKind::Appraisal },
    Rule { all_of: &["inspection"], any_of: &[], kind: DocumentKind::InspectionReport },
    Rule { all_of: &["financial"], any_of: &[], kind: DocumentKind::FinancialStatement },
];

/// Classify a document by keywords in its filename (case-insensitive).
pub fn infer_document_type(filename: &str) -> DocumentKind {
    let lowered = filename.to_lowercase();
    RULES
        .iter()
        .find(|rule| rule.matches(&lowered))
        .map(|rule| rule.kind)
        .unwrap_or(DocumentKind::Other)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_common_underwriting_documents() {
        let cases = [
            ("2024_Rent_Roll.pdf", "rent roll"),
            ("Q1 Operating Statement.txt", "operating statement"),
            ("Lease_Unit2A.docx", "lease agreement"),
            ("random.pdf", "other"),
            ("T12 Income Summary.xlsx", "operating statement"),
            ("P&L 2023.pdf", "profit and loss"),
            ("Balance-Sheet.csv", "balance sheet"),
            ("Broker Appraisal.pdf", "appraisal"),
            ("Roof INSPECTION.pdf", "inspection report"),
            ("Audited Financials.pdf", "financial statement"),
        ];
        for (filename, expected) in cases {
            assert_eq!(infer_document_type(filename).label(), expected, "{}", filename);
        }
    }

    #[test]
    fn earlier_rules_take_priority() {
        // "income" outranks "lease"; "rent roll" outranks "income"
        assert_eq!(
            infer_document_type("lease income schedule.pdf"),
            DocumentKind::OperatingStatement
        );
        assert_eq!(
            infer_document_type("rent roll with income.pdf"),
            DocumentKind::RentRoll
        );
    }

    #[test]
    fn rent_without_roll_is_not_a_rent_roll() {
        assert_eq!(infer_document_type("rent_comps.pdf"), DocumentKind::Other);
    }
}

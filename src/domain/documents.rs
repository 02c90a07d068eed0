use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::analysis::AnalysisResult;

/// Document analysis status.
///
/// `uploaded | error → analyzing → analyzed | error`; both terminal states
/// may be picked up again by a later analysis run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    #[default]
    Uploaded,
    Analyzing,
    Analyzed,
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Analyzing => "analyzing",
            Self::Analyzed => "analyzed",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "analyzing" => Self::Analyzing,
            "analyzed" => Self::Analyzed,
            "error" => Self::Error,
            _ => Self::Uploaded,
        }
    }

    /// Eligible for a (re-)analysis run.
    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Uploaded | Self::Error)
    }
}

/// Document entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: i32,
    pub deal_id: i32,
    /// Name on disk
    pub filename: String,
    pub original_filename: String,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: String,
    pub status: DocumentStatus,
    pub analysis_result: Option<AnalysisResult>,
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// Stored as UTF-8 text and safe to hand to the model verbatim.
    pub fn is_text(&self) -> bool {
        self.mime_type.starts_with("text/")
            || self.mime_type == "application/json"
            || self.file_path.contains("text-documents")
    }
}

/// Row to insert after the bytes have been written to the document store
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub deal_id: i32,
    pub filename: String,
    pub original_filename: String,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: String,
}

/// The slice of a document the chat context needs.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedDocument {
    pub original_filename: String,
    pub analysis: AnalysisResult,
}

/// Request DTO for pasting a text document
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTextRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default = "default_pasted_type")]
    pub document_type: String,
}

fn default_pasted_type() -> String {
    "document".to_string()
}

/// Request DTO for ad-hoc analysis outside any deal
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeTextRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default = "default_ad_hoc_type")]
    pub document_type: String,
}

fn default_ad_hoc_type() -> String {
    "text document".to_string()
}

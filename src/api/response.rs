//! Success bodies for the deal and document endpoints.
//!
//! Errors use [`crate::error::ErrorResponse`]; plain rows (a deal, a list of
//! documents) are returned as bare JSON without an envelope.

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::domain::{AnalysisResult, Deal, Document};
use crate::services::analysis::AnalysisRun;

/// Body of `DELETE /deals/:id`
#[derive(Debug, Serialize)]
pub struct DeleteDealResponse {
    pub message: &'static str,
    pub deleted_deal: Deal,
}

impl DeleteDealResponse {
    pub fn new(deleted_deal: Deal) -> Self {
        Self {
            message: "Deal deleted successfully",
            deleted_deal,
        }
    }
}

/// Body of `POST /deals/:id/upload`
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: &'static str,
    pub documents: Vec<Document>,
}

impl UploadResponse {
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            message: "Files uploaded successfully",
            documents,
        }
    }
}

/// Body of `POST /deals/:id/upload-text`
#[derive(Debug, Serialize)]
pub struct TextDocumentResponse {
    pub message: &'static str,
    pub document: Document,
}

impl TextDocumentResponse {
    pub fn new(document: Document) -> Self {
        Self {
            message: "Text document added successfully",
            document,
        }
    }
}

/// Body of `POST /deals/:id/analyze`: `{message, results, summary}`
#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub message: &'static str,
    #[serde(flatten)]
    pub run: AnalysisRun,
}

impl AnalyzeResponse {
    pub fn new(run: AnalysisRun) -> Self {
        Self {
            message: "Analysis completed",
            run,
        }
    }
}

/// Body of `POST /analyze-text`. `degraded` is set when the model could not
/// be consulted and `analysis` is the low-confidence placeholder.
#[derive(Debug, Serialize)]
pub struct AnalyzeTextResponse {
    pub success: bool,
    pub analysis: AnalysisResult,
    pub degraded: bool,
}

macro_rules! json_response {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl IntoResponse for $ty {
                fn into_response(self) -> Response {
                    Json(self).into_response()
                }
            }
        )+
    };
}

json_response!(
    DeleteDealResponse,
    UploadResponse,
    TextDocumentResponse,
    AnalyzeResponse,
    AnalyzeTextResponse,
);

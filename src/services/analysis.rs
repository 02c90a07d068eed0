//! Per-deal analysis runs.
//!
//! A run walks the deal's eligible documents one at a time, newest first.
//! Each document is claimed with a conditional status update, analysed, and
//! finished with a single write that sets status and result together. One
//! document failing never stops the rest of the batch.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, instrument, warn, Instrument};

use super::ai_client::{AiClient, AnalysisOutcome};
use super::document_types::infer_document_type;
use super::storage::DocumentStorage;
use crate::domain::{AnalysisResult, DealStatus, Document};
use crate::error::ApiError;
use crate::store::DealStore;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Deal {0} not found")]
    DealNotFound(i32),

    #[error("No documents available for analysis")]
    NoEligibleDocuments,

    #[error("Analysis is already running for deal {0}")]
    AlreadyRunning(i32),

    #[error(transparent)]
    Store(#[from] anyhow::Error),

    #[error("Analysis task for the deal stopped unexpectedly")]
    Aborted(#[from] tokio::task::JoinError),
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        let message = err.to_string();
        match err {
            AnalysisError::DealNotFound(_) => ApiError::NotFound(message),
            AnalysisError::NoEligibleDocuments => ApiError::BadRequest(message),
            AnalysisError::AlreadyRunning(_) => ApiError::Conflict(message),
            AnalysisError::Store(e) => ApiError::Internal(e),
            AnalysisError::Aborted(e) => ApiError::Internal(anyhow::Error::new(e).context(message)),
        }
    }
}

/// Deals with a run in progress in this process.
#[derive(Clone, Default)]
pub struct AnalysisLocks {
    running: Arc<Mutex<HashSet<i32>>>,
}

/// Held for the duration of a run; releases the deal on drop.
pub struct AnalysisGuard {
    running: Arc<Mutex<HashSet<i32>>>,
    deal_id: i32,
}

impl AnalysisLocks {
    pub fn try_acquire(&self, deal_id: i32) -> Option<AnalysisGuard> {
        if !self.running.lock().insert(deal_id) {
            return None;
        }
        Some(AnalysisGuard {
            running: Arc::clone(&self.running),
            deal_id,
        })
    }
}

impl Drop for AnalysisGuard {
    fn drop(&mut self) {
        self.running.lock().remove(&self.deal_id);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Error,
}

/// Outcome for one document of a run.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentAnalysis {
    /// The document as it was when the run picked it up.
    pub document: Document,
    pub analysis: Option<AnalysisResult>,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DocumentAnalysis {
    fn success(document: &Document, analysis: AnalysisResult) -> Self {
        Self {
            document: document.clone(),
            analysis: Some(analysis),
            status: RunStatus::Success,
            error: None,
        }
    }

    fn failure(document: &Document, error: impl Into<String>) -> Self {
        Self {
            document: document.clone(),
            analysis: None,
            status: RunStatus::Error,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AnalysisSummary {
    pub total: usize,
    pub successful: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRun {
    pub results: Vec<DocumentAnalysis>,
    pub summary: AnalysisSummary,
}

impl AnalysisRun {
    fn new(results: Vec<DocumentAnalysis>) -> Self {
        let successful = results
            .iter()
            .filter(|r| r.status == RunStatus::Success)
            .count();
        let summary = AnalysisSummary {
            total: results.len(),
            successful,
            errors: results.len() - successful,
        };
        Self { results, summary }
    }
}

/// Drives analysis runs for deals.
#[derive(Clone)]
pub struct AnalysisService {
    store: Arc<dyn DealStore>,
    ai_client: AiClient,
    storage: DocumentStorage,
    locks: AnalysisLocks,
    delay: Duration,
}

impl AnalysisService {
    pub fn new(
        store: Arc<dyn DealStore>,
        ai_client: AiClient,
        storage: DocumentStorage,
        locks: AnalysisLocks,
        delay: Duration,
    ) -> Self {
        Self {
            store,
            ai_client,
            storage,
            locks,
            delay,
        }
    }

    /// Analyse every eligible document of a deal.
    ///
    /// Leaves the deal `completed` once the batch has been walked, whatever
    /// the individual outcomes. A store failure outside the per-document
    /// loop puts the deal back to `uploaded`.
    ///
    /// The run executes on its own task. Dropping the returned future (a
    /// client hanging up, say) does not stop it.
    pub async fn run(&self, deal_id: i32) -> Result<AnalysisRun, AnalysisError> {
        let service = self.clone();
        tokio::spawn(async move { service.run_to_completion(deal_id).await }.in_current_span())
            .await?
    }

    #[instrument(skip(self))]
    async fn run_to_completion(&self, deal_id: i32) -> Result<AnalysisRun, AnalysisError> {
        let _guard = self
            .locks
            .try_acquire(deal_id)
            .ok_or(AnalysisError::AlreadyRunning(deal_id))?;

        let deal = match self.store.get_deal(deal_id).await {
            Ok(Some(deal)) => deal,
            Ok(None) => return Err(AnalysisError::DealNotFound(deal_id)),
            Err(e) => {
                self.restore_deal_status(deal_id).await;
                return Err(AnalysisError::Store(e));
            }
        };

        let documents = match self.store.eligible_documents(deal_id).await {
            Ok(documents) => documents,
            Err(e) => {
                self.restore_deal_status(deal_id).await;
                return Err(AnalysisError::Store(e));
            }
        };

        if documents.is_empty() {
            return Err(AnalysisError::NoEligibleDocuments);
        }

        info!(deal_id, deal = %deal.name, documents = documents.len(), "Starting deal analysis");

        if let Err(e) = self.store.set_deal_status(deal_id, DealStatus::Analyzing).await {
            self.restore_deal_status(deal_id).await;
            return Err(AnalysisError::Store(e));
        }

        let mut results = Vec::with_capacity(documents.len());
        for (index, document) in documents.iter().enumerate() {
            if index > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            results.push(self.analyze_document(document).await);
        }

        if let Err(e) = self.store.set_deal_status(deal_id, DealStatus::Completed).await {
            self.restore_deal_status(deal_id).await;
            return Err(AnalysisError::Store(e));
        }

        let run = AnalysisRun::new(results);
        info!(
            deal_id,
            successful = run.summary.successful,
            errors = run.summary.errors,
            "Deal analysis completed"
        );

        Ok(run)
    }

    async fn analyze_document(&self, document: &Document) -> DocumentAnalysis {
        match self.store.claim_document(document.id).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(document_id = document.id, "Document no longer eligible, skipping");
                return DocumentAnalysis::failure(document, "Document is already being analyzed");
            }
            Err(e) => {
                error!(document_id = document.id, error = ?e, "Failed to claim document");
                return DocumentAnalysis::failure(document, format!("{:#}", e));
            }
        }

        let text = self.document_text(document).await;
        let document_type = infer_document_type(&document.original_filename);

        info!(
            document_id = document.id,
            filename = %document.original_filename,
            document_type = document_type.label(),
            "Analyzing document"
        );

        let outcome = self
            .ai_client
            .analyze_document(&text, &document.original_filename, Some(document_type.label()))
            .await;

        match outcome {
            AnalysisOutcome::Complete(result) => {
                match self.store.complete_document(document.id, &result).await {
                    Ok(()) => DocumentAnalysis::success(document, result),
                    Err(e) => {
                        error!(document_id = document.id, error = ?e, "Failed to persist analysis");
                        self.mark_failed(document.id).await;
                        DocumentAnalysis::failure(document, format!("{:#}", e))
                    }
                }
            }
            AnalysisOutcome::Degraded { reason, .. } => {
                self.mark_failed(document.id).await;
                DocumentAnalysis::failure(document, format!("AI analysis unavailable: {}", reason))
            }
        }
    }

    /// Text handed to the model. Binary formats and unreadable files are
    /// described rather than extracted.
    async fn document_text(&self, document: &Document) -> String {
        if !document.is_text() {
            return format!(
                "Document: {}\nType: {}\nSize: {} bytes\n\n\
                 Note: This file type requires manual review as automatic text extraction is not yet implemented.",
                document.original_filename, document.mime_type, document.file_size
            );
        }

        match self.storage.read_text(&document.file_path).await {
            Ok(text) => text,
            Err(e) => {
                warn!(document_id = document.id, error = ?e, "Could not read document");
                format!(
                    "Document: {}\nError: Could not read file content. Manual review required.",
                    document.original_filename
                )
            }
        }
    }

    async fn mark_failed(&self, document_id: i32) {
        if let Err(e) = self.store.fail_document(document_id).await {
            error!(document_id, error = ?e, "Failed to mark document as errored");
        }
    }

    async fn restore_deal_status(&self, deal_id: i32) {
        if let Err(e) = self.store.set_deal_status(deal_id, DealStatus::Uploaded).await {
            error!(deal_id, error = ?e, "Failed to restore deal status");
        }
    }
}

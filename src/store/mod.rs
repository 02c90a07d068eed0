//! Relational store for deals and documents.
//!
//! Handlers and services talk to `DealStore`; production uses `PgStore`,
//! tests use the in-memory store with failure injection.

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::{
    AnalysisResult, AnalyzedDocument, CreateDealRequest, Deal, DealStatus, Document, NewDocument,
    UpdateDealRequest,
};

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::PgStore;

#[async_trait]
pub trait DealStore: Send + Sync {
    /// All deals, newest first.
    async fn list_deals(&self) -> Result<Vec<Deal>>;

    /// Insert a deal in `draft` status.
    async fn create_deal(&self, req: &CreateDealRequest) -> Result<Deal>;

    async fn get_deal(&self, deal_id: i32) -> Result<Option<Deal>>;

    async fn update_deal(&self, deal_id: i32, req: &UpdateDealRequest) -> Result<Option<Deal>>;

    /// Remove a deal together with its documents, returning the deleted row.
    async fn delete_deal(&self, deal_id: i32) -> Result<Option<Deal>>;

    async fn set_deal_status(&self, deal_id: i32, status: DealStatus) -> Result<()>;

    /// Documents of a deal, newest first.
    async fn list_documents(&self, deal_id: i32) -> Result<Vec<Document>>;

    /// Insert a document in `uploaded` status.
    async fn insert_document(&self, doc: &NewDocument) -> Result<Document>;

    /// Documents in `uploaded` or `error` status, newest first.
    async fn eligible_documents(&self, deal_id: i32) -> Result<Vec<Document>>;

    /// Move an eligible document to `analyzing`. Returns `false` when the
    /// document is no longer eligible (another run picked it up).
    async fn claim_document(&self, document_id: i32) -> Result<bool>;

    /// Set `analyzed` and the result in one statement.
    async fn complete_document(&self, document_id: i32, result: &AnalysisResult) -> Result<()>;

    /// Set `error` and clear any result in one statement.
    async fn fail_document(&self, document_id: i32) -> Result<()>;

    /// Documents of a deal that carry an analysis result.
    async fn analyzed_documents(&self, deal_id: i32) -> Result<Vec<AnalyzedDocument>>;

    /// Liveness probe for the health endpoint.
    async fn ping(&self) -> bool;
}

//! PostgreSQL implementation of [`DealStore`].
//!
//! Schema (managed outside this service):
//! `deals(id, name, property_type, address, status, created_at, updated_at)` and
//! `documents(id, deal_id → deals.id, filename, original_filename, file_path,
//! file_size, mime_type, status, analysis_result JSONB, created_at)`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    types::Json,
    PgPool,
};
use std::str::FromStr;
use std::time::Duration;

use super::DealStore;
use crate::config::Settings;
use crate::domain::{
    AnalysisResult, AnalyzedDocument, CreateDealRequest, Deal, DealStatus, Document,
    DocumentStatus, NewDocument, PropertyType, UpdateDealRequest,
};

const DEAL_COLUMNS: &str = "id, name, property_type, address, status, created_at, updated_at";
const DOCUMENT_COLUMNS: &str = "id, deal_id, filename, original_filename, file_path, file_size, \
                                mime_type, status, analysis_result, created_at";

/// Database row for a deal
#[derive(Debug, sqlx::FromRow)]
struct DealRow {
    id: i32,
    name: String,
    property_type: Option<String>,
    address: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DealRow> for Deal {
    fn from(row: DealRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            property_type: row.property_type.as_deref().and_then(PropertyType::parse),
            address: row.address,
            status: DealStatus::parse(&row.status),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Database row for a document
#[derive(Debug, sqlx::FromRow)]
struct DocumentRow {
    id: i32,
    deal_id: i32,
    filename: String,
    original_filename: String,
    file_path: String,
    file_size: i64,
    mime_type: String,
    status: String,
    analysis_result: Option<Json<serde_json::Value>>,
    created_at: DateTime<Utc>,
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        Self {
            id: row.id,
            deal_id: row.deal_id,
            filename: row.filename,
            original_filename: row.original_filename,
            file_path: row.file_path,
            file_size: row.file_size,
            mime_type: row.mime_type,
            status: DocumentStatus::parse(&row.status),
            analysis_result: row.analysis_result.and_then(|json| decode_analysis(json.0)),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AnalyzedDocumentRow {
    original_filename: String,
    analysis_result: Json<serde_json::Value>,
}

/// Rows written by older releases may not match the current shape; those
/// read as "no result" rather than failing the whole query.
fn decode_analysis(value: serde_json::Value) -> Option<AnalysisResult> {
    match serde_json::from_value(value) {
        Ok(result) => Some(result),
        Err(e) => {
            tracing::warn!(error = %e, "Stored analysis result could not be decoded");
            None
        }
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Open the pool shared by every request.
    pub async fn connect(settings: &Settings) -> Result<Self> {
        let connect_options = PgConnectOptions::from_str(&settings.database_url)
            .context("Invalid DATABASE_URL")?
            .application_name("underwriter-backend");

        let pool = PgPoolOptions::new()
            .max_connections(settings.database_max_connections)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(1800))
            .connect_with(connect_options)
            .await
            .context("Failed to connect to PostgreSQL")?;

        tracing::info!(
            max_connections = settings.database_max_connections,
            "Database connection pool established"
        );

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DealStore for PgStore {
    async fn list_deals(&self) -> Result<Vec<Deal>> {
        let rows = sqlx::query_as::<_, DealRow>(&format!(
            "SELECT {} FROM deals ORDER BY created_at DESC",
            DEAL_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list deals")?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn create_deal(&self, req: &CreateDealRequest) -> Result<Deal> {
        let row = sqlx::query_as::<_, DealRow>(&format!(
            "INSERT INTO deals (name, property_type, address, status) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            DEAL_COLUMNS
        ))
        .bind(&req.name)
        .bind(req.property_type.map(|p| p.as_str()))
        .bind(&req.address)
        .bind(DealStatus::Draft.as_str())
        .fetch_one(&self.pool)
        .await
        .context("Failed to create deal")?;

        Ok(row.into())
    }

    async fn get_deal(&self, deal_id: i32) -> Result<Option<Deal>> {
        let row = sqlx::query_as::<_, DealRow>(&format!(
            "SELECT {} FROM deals WHERE id = $1",
            DEAL_COLUMNS
        ))
        .bind(deal_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch deal")?;

        Ok(row.map(Into::into))
    }

    async fn update_deal(&self, deal_id: i32, req: &UpdateDealRequest) -> Result<Option<Deal>> {
        let row = sqlx::query_as::<_, DealRow>(&format!(
            r#"
            UPDATE deals
            SET name = $1, property_type = $2, address = $3,
                status = COALESCE($4, status), updated_at = NOW()
            WHERE id = $5
            RETURNING {}
            "#,
            DEAL_COLUMNS
        ))
        .bind(&req.name)
        .bind(req.property_type.map(|p| p.as_str()))
        .bind(&req.address)
        .bind(req.status.map(|s| s.as_str()))
        .bind(deal_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to update deal")?;

        Ok(row.map(Into::into))
    }

    async fn delete_deal(&self, deal_id: i32) -> Result<Option<Deal>> {
        let mut tx = self.pool.begin().await.context("Failed to open transaction")?;

        // The foreign key cascades too; deleting explicitly keeps this correct
        // on schemas created without ON DELETE CASCADE.
        sqlx::query("DELETE FROM documents WHERE deal_id = $1")
            .bind(deal_id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete deal documents")?;

        let row = sqlx::query_as::<_, DealRow>(&format!(
            "DELETE FROM deals WHERE id = $1 RETURNING {}",
            DEAL_COLUMNS
        ))
        .bind(deal_id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to delete deal")?;

        tx.commit().await.context("Failed to commit deal deletion")?;

        Ok(row.map(Into::into))
    }

    async fn set_deal_status(&self, deal_id: i32, status: DealStatus) -> Result<()> {
        sqlx::query("UPDATE deals SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(status.as_str())
            .bind(deal_id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to set deal {} status to {}", deal_id, status))?;

        Ok(())
    }

    async fn list_documents(&self, deal_id: i32) -> Result<Vec<Document>> {
        let rows = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT {} FROM documents WHERE deal_id = $1 ORDER BY created_at DESC",
            DOCUMENT_COLUMNS
        ))
        .bind(deal_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list documents")?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn insert_document(&self, doc: &NewDocument) -> Result<Document> {
        let row = sqlx::query_as::<_, DocumentRow>(&format!(
            r#"
            INSERT INTO documents (deal_id, filename, original_filename, file_path, file_size, mime_type, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            DOCUMENT_COLUMNS
        ))
        .bind(doc.deal_id)
        .bind(&doc.filename)
        .bind(&doc.original_filename)
        .bind(&doc.file_path)
        .bind(doc.file_size)
        .bind(&doc.mime_type)
        .bind(DocumentStatus::Uploaded.as_str())
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert document")?;

        Ok(row.into())
    }

    async fn eligible_documents(&self, deal_id: i32) -> Result<Vec<Document>> {
        let rows = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT {} FROM documents WHERE deal_id = $1 AND status IN ($2, $3) ORDER BY created_at DESC",
            DOCUMENT_COLUMNS
        ))
        .bind(deal_id)
        .bind(DocumentStatus::Uploaded.as_str())
        .bind(DocumentStatus::Error.as_str())
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch documents eligible for analysis")?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn claim_document(&self, document_id: i32) -> Result<bool> {
        let claimed = sqlx::query(
            "UPDATE documents SET status = $1 WHERE id = $2 AND status IN ($3, $4)",
        )
        .bind(DocumentStatus::Analyzing.as_str())
        .bind(document_id)
        .bind(DocumentStatus::Uploaded.as_str())
        .bind(DocumentStatus::Error.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to mark document as analyzing")?;

        Ok(claimed.rows_affected() == 1)
    }

    async fn complete_document(&self, document_id: i32, result: &AnalysisResult) -> Result<()> {
        sqlx::query("UPDATE documents SET status = $1, analysis_result = $2 WHERE id = $3")
            .bind(DocumentStatus::Analyzed.as_str())
            .bind(Json(result))
            .bind(document_id)
            .execute(&self.pool)
            .await
            .context("Failed to store analysis result")?;

        Ok(())
    }

    async fn fail_document(&self, document_id: i32) -> Result<()> {
        sqlx::query("UPDATE documents SET status = $1, analysis_result = NULL WHERE id = $2")
            .bind(DocumentStatus::Error.as_str())
            .bind(document_id)
            .execute(&self.pool)
            .await
            .context("Failed to mark document as errored")?;

        Ok(())
    }

    async fn analyzed_documents(&self, deal_id: i32) -> Result<Vec<AnalyzedDocument>> {
        let rows = sqlx::query_as::<_, AnalyzedDocumentRow>(
            r#"
            SELECT original_filename, analysis_result
            FROM documents
            WHERE deal_id = $1 AND analysis_result IS NOT NULL
            ORDER BY created_at ASC
            "#,
        )
        .bind(deal_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch analyzed documents")?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                decode_analysis(row.analysis_result.0).map(|analysis| AnalyzedDocument {
                    original_filename: row.original_filename,
                    analysis,
                })
            })
            .collect())
    }

    async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }
}

//! In-memory `DealStore` for tests, with switches to inject failures.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use super::DealStore;
use crate::domain::{
    AnalysisResult, AnalyzedDocument, CreateDealRequest, Deal, DealStatus, Document,
    DocumentStatus, NewDocument, UpdateDealRequest,
};

#[derive(Default)]
struct Tables {
    deals: Vec<Deal>,
    documents: Vec<Document>,
    next_deal_id: i32,
    next_document_id: i32,
    // Monotonic clock so "newest first" is deterministic within a test
    tick: i64,
}

impl Tables {
    fn now(&mut self) -> chrono::DateTime<Utc> {
        self.tick += 1;
        Utc::now() + Duration::milliseconds(self.tick)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_reads: AtomicBool,
    fail_eligible: AtomicBool,
    fail_completion_for: Mutex<HashSet<i32>>,
    claimed_elsewhere: Mutex<HashSet<i32>>,
    inserts_left: Mutex<Option<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every read query fails from now on.
    pub fn fail_reads(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }

    /// The eligible-documents query fails from now on.
    pub fn fail_eligible_query(&self) {
        self.fail_eligible.store(true, Ordering::SeqCst);
    }

    /// Persisting a result for this document fails.
    pub fn fail_completion_of(&self, document_id: i32) {
        self.fail_completion_for.lock().insert(document_id);
    }

    /// Another run claims this document between listing and claiming.
    pub fn steal_claim_of(&self, document_id: i32) {
        self.claimed_elsewhere.lock().insert(document_id);
    }

    /// Only the next `count` document inserts succeed.
    pub fn fail_inserts_after(&self, count: usize) {
        *self.inserts_left.lock() = Some(count);
    }

    pub fn deal(&self, deal_id: i32) -> Option<Deal> {
        self.tables.lock().deals.iter().find(|d| d.id == deal_id).cloned()
    }

    pub fn document(&self, document_id: i32) -> Option<Document> {
        self.tables
            .lock()
            .documents
            .iter()
            .find(|d| d.id == document_id)
            .cloned()
    }

    /// Seed a document directly in the given state.
    pub fn seed_document(
        &self,
        deal_id: i32,
        original_filename: &str,
        status: DocumentStatus,
        analysis_result: Option<AnalysisResult>,
    ) -> Document {
        let mut tables = self.tables.lock();
        tables.next_document_id += 1;
        let created_at = tables.now();
        let doc = Document {
            id: tables.next_document_id,
            deal_id,
            filename: original_filename.to_string(),
            original_filename: original_filename.to_string(),
            file_path: format!("missing/{}", original_filename),
            file_size: 0,
            mime_type: "application/pdf".to_string(),
            status,
            analysis_result,
            created_at,
        };
        tables.documents.push(doc.clone());
        doc
    }

    fn check_reads(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            bail!("connection refused");
        }
        Ok(())
    }

    fn update_document(&self, document_id: i32, apply: impl FnOnce(&mut Document)) {
        if let Some(doc) = self
            .tables
            .lock()
            .documents
            .iter_mut()
            .find(|d| d.id == document_id)
        {
            apply(doc);
        }
    }
}

fn newest_first<T>(items: &mut [T], created_at: impl Fn(&T) -> chrono::DateTime<Utc>) {
    items.sort_by_key(|item| std::cmp::Reverse(created_at(item)));
}

#[async_trait]
impl DealStore for MemoryStore {
    async fn list_deals(&self) -> Result<Vec<Deal>> {
        self.check_reads()?;
        let mut deals = self.tables.lock().deals.clone();
        newest_first(&mut deals, |d| d.created_at);
        Ok(deals)
    }

    async fn create_deal(&self, req: &CreateDealRequest) -> Result<Deal> {
        let mut tables = self.tables.lock();
        tables.next_deal_id += 1;
        let now = tables.now();
        let deal = Deal {
            id: tables.next_deal_id,
            name: req.name.clone(),
            property_type: req.property_type,
            address: req.address.clone(),
            status: DealStatus::Draft,
            created_at: now,
            updated_at: now,
        };
        tables.deals.push(deal.clone());
        Ok(deal)
    }

    async fn get_deal(&self, deal_id: i32) -> Result<Option<Deal>> {
        self.check_reads()?;
        Ok(self.deal(deal_id))
    }

    async fn update_deal(&self, deal_id: i32, req: &UpdateDealRequest) -> Result<Option<Deal>> {
        let mut tables = self.tables.lock();
        let now = tables.now();
        Ok(tables.deals.iter_mut().find(|d| d.id == deal_id).map(|deal| {
            deal.name = req.name.clone();
            deal.property_type = req.property_type;
            deal.address = req.address.clone();
            if let Some(status) = req.status {
                deal.status = status;
            }
            deal.updated_at = now;
            deal.clone()
        }))
    }

    async fn delete_deal(&self, deal_id: i32) -> Result<Option<Deal>> {
        let mut tables = self.tables.lock();
        tables.documents.retain(|d| d.deal_id != deal_id);
        let position = tables.deals.iter().position(|d| d.id == deal_id);
        Ok(position.map(|idx| tables.deals.remove(idx)))
    }

    async fn set_deal_status(&self, deal_id: i32, status: DealStatus) -> Result<()> {
        let mut tables = self.tables.lock();
        let now = tables.now();
        if let Some(deal) = tables.deals.iter_mut().find(|d| d.id == deal_id) {
            deal.status = status;
            deal.updated_at = now;
        }
        Ok(())
    }

    async fn list_documents(&self, deal_id: i32) -> Result<Vec<Document>> {
        self.check_reads()?;
        let mut docs: Vec<Document> = self
            .tables
            .lock()
            .documents
            .iter()
            .filter(|d| d.deal_id == deal_id)
            .cloned()
            .collect();
        newest_first(&mut docs, |d| d.created_at);
        Ok(docs)
    }

    async fn insert_document(&self, doc: &NewDocument) -> Result<Document> {
        if let Some(left) = self.inserts_left.lock().as_mut() {
            if *left == 0 {
                bail!("insert into documents failed");
            }
            *left -= 1;
        }
        let mut tables = self.tables.lock();
        tables.next_document_id += 1;
        let created_at = tables.now();
        let document = Document {
            id: tables.next_document_id,
            deal_id: doc.deal_id,
            filename: doc.filename.clone(),
            original_filename: doc.original_filename.clone(),
            file_path: doc.file_path.clone(),
            file_size: doc.file_size,
            mime_type: doc.mime_type.clone(),
            status: DocumentStatus::Uploaded,
            analysis_result: None,
            created_at,
        };
        tables.documents.push(document.clone());
        Ok(document)
    }

    async fn eligible_documents(&self, deal_id: i32) -> Result<Vec<Document>> {
        self.check_reads()?;
        if self.fail_eligible.load(Ordering::SeqCst) {
            bail!("relation \"documents\" is locked");
        }
        let mut docs: Vec<Document> = self
            .tables
            .lock()
            .documents
            .iter()
            .filter(|d| d.deal_id == deal_id && d.status.is_eligible())
            .cloned()
            .collect();
        newest_first(&mut docs, |d| d.created_at);
        Ok(docs)
    }

    async fn claim_document(&self, document_id: i32) -> Result<bool> {
        if self.claimed_elsewhere.lock().contains(&document_id) {
            return Ok(false);
        }
        let mut tables = self.tables.lock();
        match tables.documents.iter_mut().find(|d| d.id == document_id) {
            Some(doc) if doc.status.is_eligible() => {
                doc.status = DocumentStatus::Analyzing;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete_document(&self, document_id: i32, result: &AnalysisResult) -> Result<()> {
        if self.fail_completion_for.lock().contains(&document_id) {
            bail!("could not write analysis_result for document {}", document_id);
        }
        self.update_document(document_id, |doc| {
            doc.status = DocumentStatus::Analyzed;
            doc.analysis_result = Some(result.clone());
        });
        Ok(())
    }

    async fn fail_document(&self, document_id: i32) -> Result<()> {
        self.update_document(document_id, |doc| {
            doc.status = DocumentStatus::Error;
            doc.analysis_result = None;
        });
        Ok(())
    }

    async fn analyzed_documents(&self, deal_id: i32) -> Result<Vec<AnalyzedDocument>> {
        self.check_reads()?;
        Ok(self
            .tables
            .lock()
            .documents
            .iter()
            .filter(|d| d.deal_id == deal_id)
            .filter_map(|d| {
                d.analysis_result.clone().map(|analysis| AnalyzedDocument {
                    original_filename: d.original_filename.clone(),
                    analysis,
                })
            })
            .collect())
    }

    async fn ping(&self) -> bool {
        !self.fail_reads.load(Ordering::SeqCst)
    }
}

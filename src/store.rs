//! Record store gateway: persistence as an external collaborator.
//!
//! The pipeline owns an [`crate::record::AnalysisRecord`] exclusively until
//! it is saved; after `create` the store owns the persisted copy and the
//! in-memory value is a disposable view. Diagram images are stored under a
//! key next to the record and resolved to a fetchable URL on read.
//!
//! [`MemoryStore`] is the in-process implementation used by tests and the
//! CLI; a deployment backs the same trait with its database and object
//! storage.

use crate::record::{AnalysisRecord, ApplicationType, DataClassification};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Store failures, kept separate from pipeline errors: a store problem
/// never invalidates the in-memory analysis.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("record not found: {id}")]
    NotFound { id: Uuid },
    #[error("store backend error: {message}")]
    Backend { message: String },
}

impl From<StoreError> for crate::error::ThreatDocError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { id } => crate::error::ThreatDocError::RecordNotFound { id },
            StoreError::Backend { message } => crate::error::ThreatDocError::Store { message },
        }
    }
}

/// An uploaded diagram travelling alongside its record.
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// What `list` returns per record: enough to render a dashboard row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub id: Uuid,
    pub title: String,
    pub app_type: ApplicationType,
    pub classification: DataClassification,
    pub threat_count: usize,
    pub created_at: DateTime<Utc>,
    /// Fetchable URL of the stored diagram, if one was saved.
    pub image_url: Option<String>,
}

/// CRUD contract for persisted analyses.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Summaries of every stored record, image keys resolved to URLs.
    async fn list(&self) -> Result<Vec<RecordSummary>, StoreError>;

    /// The full record, for re-viewing a saved analysis.
    async fn fetch(&self, id: Uuid) -> Result<AnalysisRecord, StoreError>;

    /// Persist a completed record (and its diagram, if any). Returns the
    /// stored id.
    async fn create(
        &self,
        record: &AnalysisRecord,
        image: Option<StoredImage>,
    ) -> Result<Uuid, StoreError>;

    /// Remove a record and its stored diagram.
    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;
}

// ── In-memory implementation ─────────────────────────────────────────────

#[derive(Default)]
struct MemoryInner {
    records: HashMap<Uuid, AnalysisRecord>,
    images: HashMap<String, StoredImage>,
}

/// In-process [`RecordStore`] backed by a `RwLock`ed map.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw bytes of a stored diagram, for report export.
    pub async fn image_bytes(&self, key: &str) -> Option<Vec<u8>> {
        self.inner
            .read()
            .await
            .images
            .get(key)
            .map(|img| img.bytes.clone())
    }

    fn image_url(key: &str) -> String {
        format!("memory://images/{key}")
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn list(&self) -> Result<Vec<RecordSummary>, StoreError> {
        let inner = self.inner.read().await;
        let mut summaries: Vec<RecordSummary> = inner
            .records
            .values()
            .map(|r| RecordSummary {
                id: r.id,
                title: r.title.clone(),
                app_type: r.app_type,
                classification: r.classification,
                threat_count: r.threats.len(),
                created_at: r.created_at,
                image_url: r.image_key.as_deref().map(Self::image_url),
            })
            .collect();
        // Newest first, id as the tiebreaker for a stable order.
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(summaries)
    }

    async fn fetch(&self, id: Uuid) -> Result<AnalysisRecord, StoreError> {
        self.inner
            .read()
            .await
            .records
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound { id })
    }

    async fn create(
        &self,
        record: &AnalysisRecord,
        image: Option<StoredImage>,
    ) -> Result<Uuid, StoreError> {
        let mut inner = self.inner.write().await;
        let mut stored = record.clone();
        if let Some(image) = image {
            let key = format!("uploads/{}", stored.id);
            inner.images.insert(key.clone(), image);
            stored.image_key = Some(key);
        }
        let id = stored.id;
        debug!(%id, title = %stored.title, "record persisted");
        inner.records.insert(id, stored);
        Ok(id)
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let record = inner
            .records
            .remove(&id)
            .ok_or(StoreError::NotFound { id })?;
        if let Some(key) = record.image_key {
            inner.images.remove(&key);
        }
        debug!(%id, "record deleted");
        Ok(())
    }
}

//! Store contracts used by the engine, and the SQLite-backed implementation.
//!
//! The resolver, refresh scheduler and ingestion pipeline only see the
//! `LinkIndexStore` and `BrandDirectory` traits. `LinkStore` serializes access
//! to one SQLite connection behind a `parking_lot::Mutex`; every mutation is a
//! single statement or a transaction, so callers never read-modify-write.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::PathBuf;

use chrono::Utc;
use parking_lot::Mutex;

use crate::canonical::canonicalize_url;
use crate::db::{DbError, LinkDb};
use crate::embeddings::cosine_similarity;
use crate::types::{
    Brand, ImportJobStatus, LinkEntryInput, LinkIndexEntry, LinkPreferences, ScoredEntry,
    SitemapImportJob,
};

/// The catalog of known brand URLs.
pub trait LinkIndexStore: Send + Sync {
    /// Healthy entries for a brand.
    fn get(&self, brand_id: &str) -> Result<Vec<LinkIndexEntry>, DbError>;

    /// Every entry for a brand, healthy or not.
    fn get_all(&self, brand_id: &str) -> Result<Vec<LinkIndexEntry>, DbError>;

    fn upsert_batch(&self, brand_id: &str, entries: &[LinkEntryInput]) -> Result<usize, DbError>;

    /// Increment `use_count` and stamp `last_used_at`. Atomic per row.
    fn record_usage(&self, entry_id: &str) -> Result<(), DbError>;

    /// Top `k` healthy entries with embeddings by cosine similarity, descending.
    /// Ties go to the entry with the higher `use_count`.
    fn vector_search(
        &self,
        brand_id: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredEntry>, DbError>;

    fn set_health(&self, entry_id: &str, healthy: bool) -> Result<(), DbError>;

    /// Explicit administrative removal.
    fn remove_entry(&self, entry_id: &str) -> Result<bool, DbError>;

    /// Replace a brand's catalog with `entries` in one transaction: upsert what
    /// was discovered, delete what was not. Returns `(written, pruned)`.
    fn replace_catalog(
        &self,
        brand_id: &str,
        entries: &[LinkEntryInput],
    ) -> Result<(usize, usize), DbError>;
}

/// Brand records and their import jobs.
pub trait BrandDirectory: Send + Sync {
    fn get_brand(&self, brand_id: &str) -> Result<Option<Brand>, DbError>;
    fn list_brands(&self) -> Result<Vec<Brand>, DbError>;
    fn upsert_brand(&self, brand: &Brand) -> Result<(), DbError>;
    fn set_preferences(&self, brand_id: &str, prefs: &LinkPreferences) -> Result<(), DbError>;
    fn mark_ingested(&self, brand_id: &str, ingested_at: &str) -> Result<(), DbError>;

    fn create_import_job(&self, brand_id: &str) -> Result<SitemapImportJob, DbError>;
    fn active_import_job(&self, brand_id: &str) -> Result<Option<SitemapImportJob>, DbError>;
    fn update_import_job(
        &self,
        job_id: &str,
        status: ImportJobStatus,
        urls_found: Option<i64>,
    ) -> Result<(), DbError>;
    fn complete_import_job(
        &self,
        job_id: &str,
        urls_found: i64,
        urls_processed: i64,
        urls_failed: i64,
    ) -> Result<(), DbError>;
    fn fail_import_job(&self, job_id: &str, error_message: &str) -> Result<(), DbError>;
}

/// Rank entries against a query embedding. Entries without an embedding, or
/// with one of a different dimension, are skipped.
pub fn rank_by_similarity(
    entries: Vec<LinkIndexEntry>,
    query: &[f32],
    k: usize,
) -> Vec<ScoredEntry> {
    let mut scored: Vec<ScoredEntry> = entries
        .into_iter()
        .filter_map(|entry| {
            let embedding = entry.embedding.as_deref()?;
            if embedding.len() != query.len() {
                return None;
            }
            let similarity = cosine_similarity(query, embedding);
            similarity.is_finite().then_some(ScoredEntry { entry, similarity })
        })
        .collect();

    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.entry.use_count.cmp(&a.entry.use_count))
    });
    scored.truncate(k);
    scored
}

pub struct LinkStore {
    db: Mutex<LinkDb>,
}

impl LinkStore {
    pub fn new(db: LinkDb) -> Self {
        Self { db: Mutex::new(db) }
    }

    /// Open the default database (`$LINKWISE_DB` or `~/.linkwise/links.db`).
    pub fn open() -> Result<Self, DbError> {
        Ok(Self::new(LinkDb::open()?))
    }

    pub fn open_at(path: PathBuf) -> Result<Self, DbError> {
        Ok(Self::new(LinkDb::open_at(path)?))
    }

    pub fn get_entry(&self, entry_id: &str) -> Result<Option<LinkIndexEntry>, DbError> {
        self.db.lock().get_link_entry(entry_id)
    }

    pub fn get_import_job(&self, job_id: &str) -> Result<Option<SitemapImportJob>, DbError> {
        self.db.lock().get_import_job(job_id)
    }
}

impl LinkIndexStore for LinkStore {
    fn get(&self, brand_id: &str) -> Result<Vec<LinkIndexEntry>, DbError> {
        self.db.lock().get_link_entries(brand_id, false)
    }

    fn get_all(&self, brand_id: &str) -> Result<Vec<LinkIndexEntry>, DbError> {
        self.db.lock().get_link_entries(brand_id, true)
    }

    fn upsert_batch(&self, brand_id: &str, entries: &[LinkEntryInput]) -> Result<usize, DbError> {
        let db = self.db.lock();
        db.with_transaction(|tx| tx.upsert_link_entries(brand_id, entries))
    }

    fn record_usage(&self, entry_id: &str) -> Result<(), DbError> {
        let now = Utc::now().to_rfc3339();
        if !self.db.lock().record_link_usage(entry_id, &now)? {
            log::debug!("record_usage: link {} no longer exists", entry_id);
        }
        Ok(())
    }

    fn vector_search(
        &self,
        brand_id: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredEntry>, DbError> {
        if query.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let entries = self.db.lock().get_link_entries(brand_id, false)?;
        Ok(rank_by_similarity(entries, query, k))
    }

    fn set_health(&self, entry_id: &str, healthy: bool) -> Result<(), DbError> {
        if !self.db.lock().set_link_health(entry_id, healthy)? {
            return Err(DbError::NotFound(format!("link {}", entry_id)));
        }
        Ok(())
    }

    fn remove_entry(&self, entry_id: &str) -> Result<bool, DbError> {
        self.db.lock().delete_link_entry(entry_id)
    }

    fn replace_catalog(
        &self,
        brand_id: &str,
        entries: &[LinkEntryInput],
    ) -> Result<(usize, usize), DbError> {
        let keep: HashSet<String> = entries.iter().map(|e| canonicalize_url(&e.url)).collect();
        let db = self.db.lock();
        db.with_transaction(|tx| {
            let written = tx.upsert_link_entries(brand_id, entries)?;
            let pruned = tx.prune_link_entries(brand_id, &keep)?;
            Ok((written, pruned))
        })
    }
}

impl BrandDirectory for LinkStore {
    fn get_brand(&self, brand_id: &str) -> Result<Option<Brand>, DbError> {
        self.db.lock().get_brand(brand_id)
    }

    fn list_brands(&self) -> Result<Vec<Brand>, DbError> {
        self.db.lock().list_brands()
    }

    fn upsert_brand(&self, brand: &Brand) -> Result<(), DbError> {
        self.db.lock().upsert_brand(brand)
    }

    fn set_preferences(&self, brand_id: &str, prefs: &LinkPreferences) -> Result<(), DbError> {
        self.db.lock().set_link_preferences(brand_id, prefs)
    }

    fn mark_ingested(&self, brand_id: &str, ingested_at: &str) -> Result<(), DbError> {
        self.db.lock().mark_brand_ingested(brand_id, ingested_at)
    }

    fn create_import_job(&self, brand_id: &str) -> Result<SitemapImportJob, DbError> {
        self.db.lock().create_import_job(brand_id)
    }

    fn active_import_job(&self, brand_id: &str) -> Result<Option<SitemapImportJob>, DbError> {
        self.db.lock().active_import_job(brand_id)
    }

    fn update_import_job(
        &self,
        job_id: &str,
        status: ImportJobStatus,
        urls_found: Option<i64>,
    ) -> Result<(), DbError> {
        self.db
            .lock()
            .update_import_job_status(job_id, status, urls_found)
    }

    fn complete_import_job(
        &self,
        job_id: &str,
        urls_found: i64,
        urls_processed: i64,
        urls_failed: i64,
    ) -> Result<(), DbError> {
        self.db
            .lock()
            .complete_import_job(job_id, urls_found, urls_processed, urls_failed)
    }

    fn fail_import_job(&self, job_id: &str, error_message: &str) -> Result<(), DbError> {
        self.db.lock().fail_import_job(job_id, error_message)
    }
}

//! Shared type definitions for the database layer.

use rusqlite::Row;
use thiserror::Error;

use crate::embeddings::blob_to_f32_vec;
use crate::types::{
    Brand, ImportJobStatus, LinkIndexEntry, LinkPreferences, LinkType, SitemapImportJob,
};

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),

    #[error("Failed to encode column value: {0}")]
    Encode(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

pub(crate) const LINK_COLUMNS: &str = "id, brand_id, url, title, link_type, embedding, \
     is_healthy, use_count, last_used_at, created_at";

pub(crate) const BRAND_COLUMNS: &str =
    "id, name, domain, last_ingested_at, link_preferences_json";

pub(crate) const JOB_COLUMNS: &str = "id, brand_id, status, urls_found, urls_processed, \
     urls_failed, error_message, created_at, updated_at, completed_at";

/// Map a `link_index` row selected with `LINK_COLUMNS`.
///
/// A corrupt embedding blob is logged and treated as missing, which only
/// removes the entry from vector matching.
pub(crate) fn map_link_row(row: &Row) -> rusqlite::Result<LinkIndexEntry> {
    let id: String = row.get(0)?;
    let blob: Option<Vec<u8>> = row.get(5)?;
    let embedding = match blob {
        Some(bytes) => match blob_to_f32_vec(&bytes) {
            Ok(values) if !values.is_empty() => Some(values),
            Ok(_) => None,
            Err(e) => {
                log::warn!("Ignoring embedding for link {}: {}", id, e);
                None
            }
        },
        None => None,
    };
    let link_type: String = row.get(4)?;

    Ok(LinkIndexEntry {
        id,
        brand_id: row.get(1)?,
        url: row.get(2)?,
        title: row.get(3)?,
        link_type: LinkType::from_str_lossy(&link_type),
        embedding,
        is_healthy: row.get::<_, i64>(6)? != 0,
        use_count: row.get(7)?,
        last_used_at: row.get(8)?,
        created_at: row.get(9)?,
    })
}

pub(crate) fn map_brand_row(row: &Row) -> rusqlite::Result<Brand> {
    let id: String = row.get(0)?;
    let prefs_json: Option<String> = row.get(4)?;
    let preferences = match prefs_json.as_deref() {
        Some(json) if !json.trim().is_empty() => {
            serde_json::from_str::<LinkPreferences>(json).unwrap_or_else(|e| {
                log::warn!("Ignoring malformed link preferences for brand {}: {}", id, e);
                LinkPreferences::default()
            })
        }
        _ => LinkPreferences::default(),
    };

    Ok(Brand {
        id,
        name: row.get(1)?,
        domain: row.get(2)?,
        last_ingested_at: row.get(3)?,
        preferences,
    })
}

pub(crate) fn map_job_row(row: &Row) -> rusqlite::Result<SitemapImportJob> {
    let status: String = row.get(2)?;
    Ok(SitemapImportJob {
        id: row.get(0)?,
        brand_id: row.get(1)?,
        status: ImportJobStatus::from_str_lossy(&status),
        urls_found: row.get(3)?,
        urls_processed: row.get(4)?,
        urls_failed: row.get(5)?,
        error_message: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        completed_at: row.get(9)?,
    })
}

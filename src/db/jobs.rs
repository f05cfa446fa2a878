use chrono::Utc;
use rusqlite::params;

use super::*;
use crate::types::{ImportJobStatus, SitemapImportJob};

impl LinkDb {
    // =========================================================================
    // Sitemap import jobs
    // =========================================================================

    /// Create a `pending` job for a brand.
    pub fn create_import_job(&self, brand_id: &str) -> Result<SitemapImportJob, DbError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO sitemap_import_jobs (id, brand_id, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![id, brand_id, ImportJobStatus::Pending.as_str(), now],
        )?;
        self.get_import_job(&id)?
            .ok_or_else(|| DbError::NotFound(format!("import job {}", id)))
    }

    pub fn get_import_job(&self, job_id: &str) -> Result<Option<SitemapImportJob>, DbError> {
        let sql = format!("SELECT {} FROM sitemap_import_jobs WHERE id = ?1", JOB_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![job_id], map_job_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Most recent job for the brand that has not reached `complete` or `failed`.
    pub fn active_import_job(&self, brand_id: &str) -> Result<Option<SitemapImportJob>, DbError> {
        let sql = format!(
            "SELECT {} FROM sitemap_import_jobs
             WHERE brand_id = ?1 AND status NOT IN ('complete', 'failed')
             ORDER BY created_at DESC
             LIMIT 1",
            JOB_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![brand_id], map_job_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub fn update_import_job_status(
        &self,
        job_id: &str,
        status: ImportJobStatus,
        urls_found: Option<i64>,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE sitemap_import_jobs
             SET status = ?2,
                 urls_found = COALESCE(?3, urls_found),
                 updated_at = ?4
             WHERE id = ?1",
            params![job_id, status.as_str(), urls_found, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn complete_import_job(
        &self,
        job_id: &str,
        urls_found: i64,
        urls_processed: i64,
        urls_failed: i64,
    ) -> Result<(), DbError> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE sitemap_import_jobs
             SET status = 'complete',
                 urls_found = ?2,
                 urls_processed = ?3,
                 urls_failed = ?4,
                 error_message = NULL,
                 updated_at = ?5,
                 completed_at = ?5
             WHERE id = ?1",
            params![job_id, urls_found, urls_processed, urls_failed, now],
        )?;
        Ok(())
    }

    pub fn fail_import_job(&self, job_id: &str, error_message: &str) -> Result<(), DbError> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE sitemap_import_jobs
             SET status = 'failed', error_message = ?2, updated_at = ?3, completed_at = ?3
             WHERE id = ?1",
            params![job_id, error_message, now],
        )?;
        Ok(())
    }
}

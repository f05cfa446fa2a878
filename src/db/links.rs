use std::collections::{HashMap, HashSet};

use chrono::Utc;
use rusqlite::params;

use super::*;
use crate::canonical::canonicalize_url;
use crate::embeddings::f32_vec_to_blob;
use crate::types::{LinkEntryInput, LinkIndexEntry};

/// Canonical URL per input, first-seen order, later duplicates replacing
/// earlier ones.
fn dedupe_by_canonical_url(entries: &[LinkEntryInput]) -> Vec<(String, &LinkEntryInput)> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<(String, &LinkEntryInput)> = Vec::with_capacity(entries.len());
    for entry in entries {
        let url = canonicalize_url(&entry.url);
        match slots.get(&url).copied() {
            Some(i) => out[i].1 = entry,
            None => {
                slots.insert(url.clone(), out.len());
                out.push((url, entry));
            }
        }
    }
    out
}

impl LinkDb {
    // =========================================================================
    // Link index
    // =========================================================================

    /// Insert or update link entries for a brand. Identity is
    /// `(brand_id, canonical url)`: input URLs are canonicalized first and
    /// duplicates within the batch collapse onto one row, the later input
    /// winning.
    ///
    /// Re-ingesting an existing URL refreshes its title, type and health but keeps
    /// its usage history. A missing embedding in the input keeps the stored one.
    /// Returns the number of distinct rows written.
    pub fn upsert_link_entries(
        &self,
        brand_id: &str,
        entries: &[LinkEntryInput],
    ) -> Result<usize, DbError> {
        let now = Utc::now().to_rfc3339();
        let mut stmt = self.conn.prepare(
            "INSERT INTO link_index (id, brand_id, url, title, link_type, embedding,
                                     is_healthy, use_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, 0, ?7)
             ON CONFLICT(brand_id, url) DO UPDATE SET
                title = excluded.title,
                link_type = excluded.link_type,
                embedding = COALESCE(excluded.embedding, link_index.embedding),
                is_healthy = 1",
        )?;

        let mut written = 0;
        for (url, entry) in dedupe_by_canonical_url(entries) {
            let blob = entry.embedding.as_deref().map(f32_vec_to_blob);
            written += stmt.execute(params![
                uuid::Uuid::new_v4().to_string(),
                brand_id,
                url,
                entry.title,
                entry.link_type.as_str(),
                blob,
                now,
            ])?;
        }
        Ok(written)
    }

    /// Delete a brand's entries whose URL is not in `keep_urls`.
    pub fn prune_link_entries(
        &self,
        brand_id: &str,
        keep_urls: &HashSet<String>,
    ) -> Result<usize, DbError> {
        let stale: Vec<String> = {
            let mut stmt = self
                .conn
                .prepare("SELECT id, url FROM link_index WHERE brand_id = ?1")?;
            let rows = stmt.query_map(params![brand_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            let mut ids = Vec::new();
            for row in rows {
                let (id, url) = row?;
                if !keep_urls.contains(&url) {
                    ids.push(id);
                }
            }
            ids
        };

        for id in &stale {
            self.conn
                .execute("DELETE FROM link_index WHERE id = ?1", params![id])?;
        }
        Ok(stale.len())
    }

    /// Entries for a brand in insertion order, ties broken by URL. The order does
    /// not move with usage, so list prompts enumerate a catalog the same way
    /// every time. Unhealthy rows only when asked.
    pub fn get_link_entries(
        &self,
        brand_id: &str,
        include_unhealthy: bool,
    ) -> Result<Vec<LinkIndexEntry>, DbError> {
        let sql = format!(
            "SELECT {} FROM link_index
             WHERE brand_id = ?1 AND (?2 = 1 OR is_healthy = 1)
             ORDER BY created_at ASC, url ASC",
            LINK_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![brand_id, include_unhealthy as i64], map_link_row)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    pub fn get_link_entry(&self, entry_id: &str) -> Result<Option<LinkIndexEntry>, DbError> {
        let sql = format!("SELECT {} FROM link_index WHERE id = ?1", LINK_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![entry_id], map_link_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Bump `use_count` and stamp `last_used_at` in one statement.
    /// Returns false when the entry no longer exists.
    pub fn record_link_usage(&self, entry_id: &str, used_at: &str) -> Result<bool, DbError> {
        let changed = self.conn.execute(
            "UPDATE link_index SET use_count = use_count + 1, last_used_at = ?2 WHERE id = ?1",
            params![entry_id, used_at],
        )?;
        Ok(changed > 0)
    }

    pub fn set_link_health(&self, entry_id: &str, healthy: bool) -> Result<bool, DbError> {
        let changed = self.conn.execute(
            "UPDATE link_index SET is_healthy = ?2 WHERE id = ?1",
            params![entry_id, healthy as i64],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_link_entry(&self, entry_id: &str) -> Result<bool, DbError> {
        let changed = self
            .conn
            .execute("DELETE FROM link_index WHERE id = ?1", params![entry_id])?;
        Ok(changed > 0)
    }
}

use chrono::Utc;
use rusqlite::params;

use super::*;
use crate::types::{Brand, LinkPreferences};

impl LinkDb {
    // =========================================================================
    // Brands
    // =========================================================================

    /// Insert or update a brand. `last_ingested_at` is only written by
    /// `mark_brand_ingested`, so re-saving a brand never resets staleness.
    pub fn upsert_brand(&self, brand: &Brand) -> Result<(), DbError> {
        let now = Utc::now().to_rfc3339();
        let prefs_json = serde_json::to_string(&brand.preferences)
            .map_err(|e| DbError::Encode(e.to_string()))?;
        self.conn.execute(
            "INSERT INTO brands (id, name, domain, last_ingested_at, link_preferences_json,
                                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                domain = excluded.domain,
                link_preferences_json = excluded.link_preferences_json,
                updated_at = excluded.updated_at",
            params![
                brand.id,
                brand.name,
                brand.domain,
                brand.last_ingested_at,
                prefs_json,
                now,
            ],
        )?;
        Ok(())
    }

    pub fn get_brand(&self, brand_id: &str) -> Result<Option<Brand>, DbError> {
        let sql = format!("SELECT {} FROM brands WHERE id = ?1", BRAND_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![brand_id], map_brand_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub fn list_brands(&self) -> Result<Vec<Brand>, DbError> {
        let sql = format!("SELECT {} FROM brands ORDER BY name ASC, id ASC", BRAND_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], map_brand_row)?;
        let mut brands = Vec::new();
        for row in rows {
            brands.push(row?);
        }
        Ok(brands)
    }

    pub fn set_link_preferences(
        &self,
        brand_id: &str,
        prefs: &LinkPreferences,
    ) -> Result<(), DbError> {
        let prefs_json =
            serde_json::to_string(prefs).map_err(|e| DbError::Encode(e.to_string()))?;
        let changed = self.conn.execute(
            "UPDATE brands SET link_preferences_json = ?2, updated_at = ?3 WHERE id = ?1",
            params![brand_id, prefs_json, Utc::now().to_rfc3339()],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound(format!("brand {}", brand_id)));
        }
        Ok(())
    }

    pub fn mark_brand_ingested(&self, brand_id: &str, ingested_at: &str) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE brands SET last_ingested_at = ?2, updated_at = ?2 WHERE id = ?1",
            params![brand_id, ingested_at],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::db::test_utils::{seed_brand, test_db};
    use super::*;
    use crate::types::LinkRule;

    #[test]
    fn test_upsert_and_get_brand() {
        let db = test_db();
        let mut brand = seed_brand(&db, "b1", Some("brand.com"));
        brand.name = "Renamed".to_string();
        db.upsert_brand(&brand).expect("update");

        let loaded = db.get_brand("b1").expect("get").expect("exists");
        assert_eq!(loaded.name, "Renamed");
        assert_eq!(loaded.domain.as_deref(), Some("brand.com"));
        assert!(db.get_brand("missing").expect("get").is_none());
    }

    #[test]
    fn test_preferences_roundtrip_in_order() {
        let db = test_db();
        seed_brand(&db, "b1", None);
        let prefs = LinkPreferences {
            default_destination_url: Some("https://brand.com/collections/all".to_string()),
            rules: vec![
                LinkRule {
                    name: "Winter".to_string(),
                    destination_url: "https://brand.com/collections/winter".to_string(),
                },
                LinkRule {
                    name: "Sale".to_string(),
                    destination_url: "https://brand.com/collections/sale".to_string(),
                },
            ],
        };
        db.set_link_preferences("b1", &prefs).expect("set");
        let loaded = db.get_brand("b1").expect("get").expect("exists");
        assert_eq!(loaded.preferences, prefs);

        assert!(matches!(
            db.set_link_preferences("nope", &prefs),
            Err(DbError::NotFound(_))
        ));
    }

    #[test]
    fn test_resave_keeps_ingestion_stamp() {
        let db = test_db();
        let brand = seed_brand(&db, "b1", Some("brand.com"));
        db.mark_brand_ingested("b1", "2026-01-01T00:00:00+00:00").expect("mark");
        db.upsert_brand(&brand).expect("resave");
        let loaded = db.get_brand("b1").expect("get").expect("exists");
        assert_eq!(loaded.last_ingested_at.as_deref(), Some("2026-01-01T00:00:00+00:00"));
    }
}

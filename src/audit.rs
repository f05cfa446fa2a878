//! Health audit over a brand's whole link index.
//!
//! This is the only place outside ingestion that writes `is_healthy`. Entries
//! that fail verification drop out of resolution until they pass again or the
//! brand is re-ingested.

use serde::Serialize;

use crate::db::DbError;
use crate::store::LinkIndexStore;
use crate::verifier::{HealthVerifier, Verdict};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSummary {
    pub checked: usize,
    pub healthy: usize,
    pub soft_accepted: usize,
    pub unhealthy: usize,
    /// Previously unhealthy entries that passed this time.
    pub recovered: usize,
    /// URLs that failed verification.
    pub failed_urls: Vec<String>,
}

pub async fn audit_brand_links(
    store: &dyn LinkIndexStore,
    verifier: &HealthVerifier,
    brand_id: &str,
    trusted_hosts: &[String],
) -> Result<AuditSummary, DbError> {
    let entries = store.get_all(brand_id)?;
    let mut summary = AuditSummary::default();

    for entry in entries {
        let verdict = verifier.check(&entry.url, trusted_hosts).await;
        let healthy = verdict.is_accepted();
        summary.checked += 1;
        match verdict {
            Verdict::Healthy | Verdict::ActionToken => summary.healthy += 1,
            Verdict::SoftAccepted => summary.soft_accepted += 1,
            Verdict::Rejected => {
                summary.unhealthy += 1;
                summary.failed_urls.push(entry.url.clone());
            }
        }
        if healthy && !entry.is_healthy {
            summary.recovered += 1;
        }
        if healthy != entry.is_healthy {
            store.set_health(&entry.id, healthy)?;
        }
    }

    log::info!(
        "Audit for brand {}: {} checked, {} healthy, {} soft-accepted, {} unhealthy, {} recovered",
        brand_id,
        summary.checked,
        summary.healthy,
        summary.soft_accepted,
        summary.unhealthy,
        summary.recovered
    );
    Ok(summary)
}

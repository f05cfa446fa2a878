//! Refresh scheduler: keeps link catalogs from going stale.
//!
//! Each pass recomputes the stale set from brand records (`last_ingested_at`
//! missing or older than `stale_after_days`), creates a `pending` import job per
//! brand and hands it to the ingestion dispatcher, pausing between brands.
//! Nothing is cached between passes.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::collaborators::{with_timeout, IngestionDispatcher};
use crate::config::EngineConfig;
use crate::db::DbError;
use crate::store::BrandDirectory;
use crate::types::{Brand, SitemapImportJob};

/// Upper bound on how long the loop sleeps between checks.
const POLL_INTERVAL_SECS: u64 = 60;

/// Time jump threshold to detect sleep/wake (5 minutes)
const TIME_JUMP_THRESHOLD_SECS: i64 = 300;

/// Outcome of one refresh pass, by brand id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshReport {
    pub dispatched: Vec<String>,
    pub skipped_no_domain: Vec<String>,
    pub skipped_in_flight: Vec<String>,
    /// `(brand_id, error)`
    pub failed: Vec<(String, String)>,
}

/// True when a catalog needs re-ingestion. Unparseable timestamps count as
/// never ingested.
pub fn is_stale(last_ingested_at: Option<&str>, now: DateTime<Utc>, stale_after_days: i64) -> bool {
    let Some(raw) = last_ingested_at else {
        return true;
    };
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => now.signed_duration_since(ts.with_timezone(&Utc)) > chrono::Duration::days(stale_after_days),
        Err(e) => {
            log::warn!("Unparseable last_ingested_at {:?}: {}", raw, e);
            true
        }
    }
}

pub struct RefreshScheduler {
    brands: Arc<dyn BrandDirectory>,
    dispatcher: Arc<dyn IngestionDispatcher>,
    config: EngineConfig,
}

impl RefreshScheduler {
    pub fn new(
        brands: Arc<dyn BrandDirectory>,
        dispatcher: Arc<dyn IngestionDispatcher>,
        config: EngineConfig,
    ) -> Self {
        Self {
            brands,
            dispatcher,
            config,
        }
    }

    pub fn stale_brands(&self, now: DateTime<Utc>) -> Result<Vec<Brand>, DbError> {
        Ok(self
            .brands
            .list_brands()?
            .into_iter()
            .filter(|b| is_stale(b.last_ingested_at.as_deref(), now, self.config.stale_after_days))
            .collect())
    }

    /// An unfinished job whose last update is older than
    /// `import_job_timeout_secs`. Unparseable timestamps count as abandoned.
    fn is_abandoned(&self, job: &SitemapImportJob, now: DateTime<Utc>) -> bool {
        let timeout = chrono::Duration::seconds(self.config.import_job_timeout_secs as i64);
        match DateTime::parse_from_rfc3339(&job.updated_at) {
            Ok(ts) => now.signed_duration_since(ts.with_timezone(&Utc)) > timeout,
            Err(_) => true,
        }
    }

    /// Dispatch re-ingestion for every stale brand.
    ///
    /// Brands without a domain are reported and skipped. A brand that already
    /// has an unfinished import job is not enqueued again unless that job has
    /// gone quiet past the import timeout, in which case it is failed and the
    /// brand re-dispatched. Per-brand failures are reported and do not stop the
    /// pass.
    pub async fn run_refresh_pass(&self, now: DateTime<Utc>) -> Result<RefreshReport, DbError> {
        let stale = self.stale_brands(now)?;
        let mut report = RefreshReport::default();
        let stagger = Duration::from_millis(self.config.dispatch_stagger_ms);

        for brand in stale {
            let Some(domain) = brand
                .domain
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
            else {
                log::info!("Refresh: brand {} has no domain, skipping", brand.id);
                report.skipped_no_domain.push(brand.id);
                continue;
            };

            match self.brands.active_import_job(&brand.id) {
                Ok(Some(job)) if self.is_abandoned(&job, now) => {
                    log::warn!(
                        "Refresh: job {} for brand {} stuck in {} since {}, failing it",
                        job.id,
                        brand.id,
                        job.status.as_str(),
                        job.updated_at
                    );
                    let reason = format!(
                        "abandoned: no progress for {}s",
                        self.config.import_job_timeout_secs
                    );
                    if let Err(e) = self.brands.fail_import_job(&job.id, &reason) {
                        log::warn!("Refresh: could not fail job {}: {}", job.id, e);
                        report.failed.push((brand.id, e.to_string()));
                        continue;
                    }
                }
                Ok(Some(job)) => {
                    log::debug!(
                        "Refresh: brand {} already has job {} ({})",
                        brand.id,
                        job.id,
                        job.status.as_str()
                    );
                    report.skipped_in_flight.push(brand.id);
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    log::warn!("Refresh: job lookup failed for brand {}: {}", brand.id, e);
                    report.failed.push((brand.id, e.to_string()));
                    continue;
                }
            }

            if !report.dispatched.is_empty() && !stagger.is_zero() {
                tokio::time::sleep(stagger).await;
            }

            let job = match self.brands.create_import_job(&brand.id) {
                Ok(job) => job,
                Err(e) => {
                    log::warn!("Refresh: could not create job for brand {}: {}", brand.id, e);
                    report.failed.push((brand.id, e.to_string()));
                    continue;
                }
            };

            let dispatched = with_timeout(
                self.config.collaborator_timeout(),
                self.dispatcher.dispatch(&job, domain),
            )
            .await;
            match dispatched {
                Ok(()) => {
                    log::info!("Refresh: dispatched job {} for brand {} ({})", job.id, brand.id, domain);
                    report.dispatched.push(brand.id);
                }
                Err(e) => {
                    log::warn!("Refresh: dispatch failed for brand {}: {}", brand.id, e);
                    if let Err(db_err) = self.brands.fail_import_job(&job.id, &e.to_string()) {
                        log::warn!("Refresh: could not mark job {} failed: {}", job.id, db_err);
                    }
                    report.failed.push((brand.id, e.to_string()));
                }
            }
        }

        log::info!(
            "Refresh pass: {} dispatched, {} without domain, {} in flight, {} failed",
            report.dispatched.len(),
            report.skipped_no_domain.len(),
            report.skipped_in_flight.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Run a pass now and return the brands that were dispatched.
    pub async fn trigger_stale_refresh(&self) -> Result<Vec<String>, DbError> {
        Ok(self.run_refresh_pass(Utc::now()).await?.dispatched)
    }

    /// Run forever: one pass immediately, then one every `refresh_interval_secs`.
    ///
    /// The loop polls instead of sleeping the full interval so a machine that
    /// slept through a tick refreshes shortly after waking.
    pub async fn run(&self) {
        let interval = chrono::Duration::seconds(self.config.refresh_interval_secs as i64);
        let poll = Duration::from_secs(POLL_INTERVAL_SECS.min(self.config.refresh_interval_secs.max(1)));

        let mut last_pass = Utc::now();
        self.run_logged_pass(last_pass).await;
        let mut last_check = last_pass;

        loop {
            tokio::time::sleep(poll).await;
            let now = Utc::now();

            let time_jump = (now - last_check).num_seconds();
            if time_jump > TIME_JUMP_THRESHOLD_SECS {
                log::info!("Refresh scheduler: detected time jump of {}s (sleep/wake)", time_jump);
            }
            last_check = now;

            if now - last_pass >= interval {
                last_pass = now;
                self.run_logged_pass(now).await;
            }
        }
    }

    async fn run_logged_pass(&self, now: DateTime<Utc>) {
        if let Err(e) = self.run_refresh_pass(now).await {
            log::error!("Refresh pass failed: {}", e);
        }
    }
}

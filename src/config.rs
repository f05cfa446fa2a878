//! Engine configuration.
//!
//! Every tunable threshold lives here as a named default so the resolution
//! tiers can be tested independently of the numbers. Operators override them in
//! `~/.linkwise/config.json` (camelCase keys, all optional).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Healthy-entry count below which the small-catalog list classifier is used.
pub const SMALL_CATALOG_THRESHOLD: usize = 50;

/// Vector similarity strictly above this is accepted without confirmation.
pub const HIGH_CONFIDENCE_THRESHOLD: f32 = 0.90;

/// Vector similarity strictly above this (and not above the high threshold) is
/// sent to the reasoner for confirmation. At or below it the result is `no_match`.
pub const CONFIRM_THRESHOLD: f32 = 0.75;

/// Minimum navigation score for a candidate URL to be returned.
pub const NAVIGATION_MIN_SCORE: i32 = 5;

/// Candidates pulled from vector search.
pub const VECTOR_TOP_K: usize = 5;

/// Confidence reported for a small-catalog list match.
pub const LIST_MATCH_CONFIDENCE: f32 = 0.9;

pub const HEALTH_TIMEOUT_MS: u64 = 6_500;
pub const COLLABORATOR_TIMEOUT_SECS: u64 = 30;

/// Catalogs older than this are re-ingested.
pub const STALE_AFTER_DAYS: i64 = 7;

pub const REFRESH_INTERVAL_SECS: u64 = 86_400;

/// Pause between ingestion dispatches in one refresh pass.
pub const DISPATCH_STAGGER_MS: u64 = 2_000;

/// An unfinished import job with no progress for this long is treated as
/// abandoned and failed so the brand can be re-dispatched.
pub const IMPORT_JOB_TIMEOUT_SECS: u64 = 7_200;

/// Social platforms that get the same verification leniency as the brand's
/// own domain.
pub const DEFAULT_SOCIAL_HOSTS: &[&str] = &[
    "facebook.com",
    "instagram.com",
    "tiktok.com",
    "twitter.com",
    "x.com",
    "youtube.com",
    "pinterest.com",
    "linkedin.com",
    "threads.net",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default = "default_small_catalog_threshold")]
    pub small_catalog_threshold: usize,
    #[serde(default = "default_high_confidence_threshold")]
    pub high_confidence_threshold: f32,
    #[serde(default = "default_confirm_threshold")]
    pub confirm_threshold: f32,
    #[serde(default = "default_navigation_min_score")]
    pub navigation_min_score: i32,
    #[serde(default = "default_vector_top_k")]
    pub vector_top_k: usize,
    #[serde(default = "default_list_match_confidence")]
    pub list_match_confidence: f32,
    #[serde(default = "default_health_timeout_ms")]
    pub health_timeout_ms: u64,
    #[serde(default = "default_collaborator_timeout_secs")]
    pub collaborator_timeout_secs: u64,
    #[serde(default = "default_stale_after_days")]
    pub stale_after_days: i64,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_dispatch_stagger_ms")]
    pub dispatch_stagger_ms: u64,
    #[serde(default = "default_import_job_timeout_secs")]
    pub import_job_timeout_secs: u64,
    #[serde(default = "default_social_hosts")]
    pub social_hosts: Vec<String>,
    /// Site-discovery service used by the ingestion pipeline. When unset, jobs
    /// are left `pending` for an external worker.
    #[serde(default)]
    pub discovery_endpoint: Option<String>,
    #[serde(default)]
    pub reasoner_model: Option<String>,
    #[serde(default)]
    pub embedding_model: Option<String>,
}

fn default_small_catalog_threshold() -> usize {
    SMALL_CATALOG_THRESHOLD
}

fn default_high_confidence_threshold() -> f32 {
    HIGH_CONFIDENCE_THRESHOLD
}

fn default_confirm_threshold() -> f32 {
    CONFIRM_THRESHOLD
}

fn default_navigation_min_score() -> i32 {
    NAVIGATION_MIN_SCORE
}

fn default_vector_top_k() -> usize {
    VECTOR_TOP_K
}

fn default_list_match_confidence() -> f32 {
    LIST_MATCH_CONFIDENCE
}

fn default_health_timeout_ms() -> u64 {
    HEALTH_TIMEOUT_MS
}

fn default_collaborator_timeout_secs() -> u64 {
    COLLABORATOR_TIMEOUT_SECS
}

fn default_stale_after_days() -> i64 {
    STALE_AFTER_DAYS
}

fn default_refresh_interval_secs() -> u64 {
    REFRESH_INTERVAL_SECS
}

fn default_dispatch_stagger_ms() -> u64 {
    DISPATCH_STAGGER_MS
}

fn default_import_job_timeout_secs() -> u64 {
    IMPORT_JOB_TIMEOUT_SECS
}

fn default_social_hosts() -> Vec<String> {
    DEFAULT_SOCIAL_HOSTS.iter().map(|h| h.to_string()).collect()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            small_catalog_threshold: default_small_catalog_threshold(),
            high_confidence_threshold: default_high_confidence_threshold(),
            confirm_threshold: default_confirm_threshold(),
            navigation_min_score: default_navigation_min_score(),
            vector_top_k: default_vector_top_k(),
            list_match_confidence: default_list_match_confidence(),
            health_timeout_ms: default_health_timeout_ms(),
            collaborator_timeout_secs: default_collaborator_timeout_secs(),
            stale_after_days: default_stale_after_days(),
            refresh_interval_secs: default_refresh_interval_secs(),
            dispatch_stagger_ms: default_dispatch_stagger_ms(),
            import_job_timeout_secs: default_import_job_timeout_secs(),
            social_hosts: default_social_hosts(),
            discovery_endpoint: None,
            reasoner_model: None,
            embedding_model: None,
        }
    }
}

impl EngineConfig {
    pub fn health_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.health_timeout_ms)
    }

    pub fn collaborator_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.collaborator_timeout_secs)
    }

    /// Trusted hosts for a brand: its own domain plus the social platforms.
    pub fn trusted_hosts_for(&self, brand_domain: Option<&str>) -> Vec<String> {
        let mut hosts = Vec::with_capacity(self.social_hosts.len() + 1);
        if let Some(domain) = brand_domain {
            if let Some(host) = crate::canonical::registrable_host(domain) {
                hosts.push(host);
            }
        }
        hosts.extend(self.social_hosts.iter().cloned());
        hosts
    }
}

/// `~/.linkwise`
pub fn config_dir() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    Ok(home.join(".linkwise"))
}

/// Load configuration from `~/.linkwise/config.json`.
///
/// A missing file yields defaults. A malformed file is an error.
pub fn load_config() -> Result<EngineConfig, String> {
    let path = config_dir()?.join("config.json");
    load_config_from(&path)
}

pub fn load_config_from(path: &std::path::Path) -> Result<EngineConfig, String> {
    if !path.exists() {
        log::debug!("No config at {}, using defaults", path.display());
        return Ok(EngineConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config: {}", e))?;
    serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))
}

//! `LinkEngine`: the public face of the crate.
//!
//! Wires the store, collaborators, resolver, verifier and refresh scheduler
//! together and exposes the entry points callers use.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::audit::{audit_brand_links, AuditSummary};
use crate::collaborators::{Embedder, IngestionDispatcher, TextReasoner};
use crate::config::EngineConfig;
use crate::db::DbError;
use crate::embeddings::embedder_from_env;
use crate::reasoner::AnthropicReasoner;
use crate::refresh::{RefreshReport, RefreshScheduler};
use crate::resolver::TieredResolver;
use crate::scorer;
use crate::store::{BrandDirectory, LinkIndexStore};
use crate::types::{Brand, LinkPreferences, MatchResult, ResolutionRequest};
use crate::verifier::{HealthVerifier, LinkProbe, ReqwestProbe};

/// External collaborators the engine depends on.
pub struct Collaborators {
    pub reasoner: Arc<dyn TextReasoner>,
    pub embedder: Arc<dyn Embedder>,
    pub probe: Arc<dyn LinkProbe>,
    pub dispatcher: Arc<dyn IngestionDispatcher>,
}

impl Collaborators {
    /// Production collaborators: Anthropic for reasoning, OpenAI (or local
    /// hashing) for embeddings, reqwest for health probes.
    pub fn from_env(
        config: &EngineConfig,
        dispatcher: Arc<dyn IngestionDispatcher>,
    ) -> Result<Self, String> {
        let reasoner = AnthropicReasoner::from_env(
            config.reasoner_model.clone(),
            config.collaborator_timeout(),
        )
        .ok_or("ANTHROPIC_API_KEY not set")?;
        let embedder =
            embedder_from_env(config.embedding_model.clone(), config.collaborator_timeout());
        let probe = ReqwestProbe::new()?;
        Ok(Self {
            reasoner: Arc::new(reasoner),
            embedder,
            probe: Arc::new(probe),
            dispatcher,
        })
    }
}

pub struct LinkEngine {
    links: Arc<dyn LinkIndexStore>,
    brands: Arc<dyn BrandDirectory>,
    verifier: HealthVerifier,
    resolver: TieredResolver,
    refresh: RefreshScheduler,
    config: EngineConfig,
}

impl LinkEngine {
    pub fn new(
        links: Arc<dyn LinkIndexStore>,
        brands: Arc<dyn BrandDirectory>,
        collaborators: Collaborators,
        config: EngineConfig,
    ) -> Self {
        let verifier = HealthVerifier::new(collaborators.probe, config.health_timeout());
        let resolver = TieredResolver::new(
            links.clone(),
            brands.clone(),
            collaborators.reasoner,
            collaborators.embedder,
            verifier.clone(),
            config.clone(),
        );
        let refresh = RefreshScheduler::new(brands.clone(), collaborators.dispatcher, config.clone());
        Self {
            links,
            brands,
            verifier,
            resolver,
            refresh,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Resolution
    // -------------------------------------------------------------------------

    pub async fn resolve(&self, request: &ResolutionRequest) -> MatchResult {
        self.resolver.resolve(request).await
    }

    /// Best evergreen URL for a navigation label, without a liveness check.
    pub fn score_navigation_candidate(
        &self,
        label: &str,
        discovered_urls: &[String],
        brand_domain: &str,
    ) -> Option<String> {
        scorer::score_navigation_candidate(
            label,
            discovered_urls,
            brand_domain,
            self.config.navigation_min_score,
        )
    }

    /// Score, then verify. Returns the URL only if it passes the health check.
    pub async fn resolve_navigation_link(
        &self,
        label: &str,
        discovered_urls: &[String],
        brand_domain: &str,
    ) -> Option<String> {
        let url = self.score_navigation_candidate(label, discovered_urls, brand_domain)?;
        let trusted = self.config.trusted_hosts_for(Some(brand_domain));
        if self.verifier.verify(&url, &trusted).await {
            Some(url)
        } else {
            log::info!("Navigation link {} for {:?} failed verification", url, label);
            None
        }
    }

    // -------------------------------------------------------------------------
    // Freshness
    // -------------------------------------------------------------------------

    pub async fn trigger_stale_refresh(&self) -> Result<Vec<String>, DbError> {
        self.refresh.trigger_stale_refresh().await
    }

    pub async fn run_refresh_pass(&self, now: DateTime<Utc>) -> Result<RefreshReport, DbError> {
        self.refresh.run_refresh_pass(now).await
    }

    /// Re-verify every entry of a brand and persist the results.
    pub async fn audit_brand(&self, brand_id: &str) -> Result<AuditSummary, DbError> {
        let brand = self
            .brands
            .get_brand(brand_id)?
            .ok_or_else(|| DbError::NotFound(format!("brand {}", brand_id)))?;
        let trusted = self.config.trusted_hosts_for(brand.domain.as_deref());
        audit_brand_links(self.links.as_ref(), &self.verifier, brand_id, &trusted).await
    }

    // -------------------------------------------------------------------------
    // Administration
    // -------------------------------------------------------------------------

    pub fn get_brand(&self, brand_id: &str) -> Result<Option<Brand>, DbError> {
        self.brands.get_brand(brand_id)
    }

    pub fn upsert_brand(&self, brand: &Brand) -> Result<(), DbError> {
        self.brands.upsert_brand(brand)
    }

    pub fn set_preferences(&self, brand_id: &str, prefs: &LinkPreferences) -> Result<(), DbError> {
        self.brands.set_preferences(brand_id, prefs)
    }

    pub fn remove_entry(&self, entry_id: &str) -> Result<bool, DbError> {
        self.links.remove_entry(entry_id)
    }
}

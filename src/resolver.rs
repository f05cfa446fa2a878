//! Tiered link resolution.
//!
//! One pass per request, cheapest strategy first:
//! 1. brand rules / default destination (generic CTAs only)
//! 2. small catalog: the reasoner picks from the full enumerated list
//! 3. large catalog: vector search, auto-accept / confirm / reject by similarity
//!
//! Every URL that leaves this module has passed the health verifier or is an
//! ESP action token. Collaborator failures are logged and downgraded to the
//! next-lower outcome; `resolve` itself cannot fail.

use std::sync::Arc;

use crate::collaborators::{with_timeout, Embedder, TextReasoner};
use crate::config::EngineConfig;
use crate::reasoner::{confirmation_prompt, list_match_prompt, parse_choice, Choice};
use crate::store::{BrandDirectory, LinkIndexStore};
use crate::types::{
    CampaignContext, LinkIndexEntry, LinkPreferences, LinkRule, MatchResult, MatchSource,
    ResolutionRequest, ScoredEntry,
};
use crate::verifier::HealthVerifier;

/// Acceptance band for a vector similarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceTier {
    /// Above the high threshold: accept without confirmation.
    AutoAccept,
    /// Above the confirm threshold, at or below the high one.
    Confirm,
    /// At or below the confirm threshold.
    Reject,
}

/// Both boundaries are strict: exactly 0.90 confirms, exactly 0.75 rejects.
pub fn confidence_tier(similarity: f32, config: &EngineConfig) -> ConfidenceTier {
    if similarity > config.high_confidence_threshold {
        ConfidenceTier::AutoAccept
    } else if similarity > config.confirm_threshold {
        ConfidenceTier::Confirm
    } else {
        ConfidenceTier::Reject
    }
}

/// First rule whose lowercased name occurs anywhere in the campaign context.
///
/// Plain substring containment: a short rule name like "hat" also matches
/// "chat" or "sweatshirt". Rule authors are expected to use distinctive names.
pub fn match_brand_rule<'a>(
    prefs: &'a LinkPreferences,
    context: &CampaignContext,
) -> Option<&'a LinkRule> {
    let haystack = context.rule_haystack();
    prefs.rules.iter().find(|rule| {
        let needle = rule.name.to_lowercase();
        !needle.trim().is_empty() && haystack.contains(&needle)
    })
}

pub struct TieredResolver {
    links: Arc<dyn LinkIndexStore>,
    brands: Arc<dyn BrandDirectory>,
    reasoner: Arc<dyn TextReasoner>,
    embedder: Arc<dyn Embedder>,
    verifier: HealthVerifier,
    config: EngineConfig,
}

impl TieredResolver {
    pub fn new(
        links: Arc<dyn LinkIndexStore>,
        brands: Arc<dyn BrandDirectory>,
        reasoner: Arc<dyn TextReasoner>,
        embedder: Arc<dyn Embedder>,
        verifier: HealthVerifier,
        config: EngineConfig,
    ) -> Self {
        Self {
            links,
            brands,
            reasoner,
            embedder,
            verifier,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn resolve(&self, request: &ResolutionRequest) -> MatchResult {
        let brand_id = request.brand_id.as_str();
        let brand = match self.brands.get_brand(brand_id) {
            Ok(brand) => brand,
            Err(e) => {
                log::warn!("Brand lookup failed for {}: {}", brand_id, e);
                None
            }
        };
        let trusted = self
            .config
            .trusted_hosts_for(brand.as_ref().and_then(|b| b.domain.as_deref()));

        let description = if request.is_generic_cta {
            if let Some(brand) = &brand {
                if let Some(result) = self
                    .resolve_from_preferences(brand_id, &brand.preferences, request, &trusted)
                    .await
                {
                    return self.finish(brand_id, result);
                }
            }
            let focus = request.campaign_context.primary_focus.trim();
            if focus.is_empty() {
                request.slice_description.as_str()
            } else {
                focus
            }
        } else {
            request.slice_description.as_str()
        };

        let result = self.resolve_from_catalog(brand_id, description, &trusted).await;
        self.finish(brand_id, result)
    }

    /// Rules first, then the default. `None` means fall through to the catalog.
    async fn resolve_from_preferences(
        &self,
        brand_id: &str,
        prefs: &LinkPreferences,
        request: &ResolutionRequest,
        trusted: &[String],
    ) -> Option<MatchResult> {
        let (url, source) = match match_brand_rule(prefs, &request.campaign_context) {
            Some(rule) => {
                log::debug!("Brand {} rule {:?} matched", brand_id, rule.name);
                (rule.destination_url.as_str(), MatchSource::BrandRule)
            }
            None => (
                prefs.default_destination_url.as_deref()?,
                MatchSource::BrandDefault,
            ),
        };
        Some(self.verified(url, source, 1.0, None, trusted).await)
    }

    async fn resolve_from_catalog(
        &self,
        brand_id: &str,
        description: &str,
        trusted: &[String],
    ) -> MatchResult {
        let entries = match self.links.get(brand_id) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Link index unavailable for brand {}: {}", brand_id, e);
                return MatchResult::unmatched(MatchSource::NoIndex);
            }
        };
        if entries.is_empty() {
            return MatchResult::unmatched(MatchSource::NoIndex);
        }

        if entries.len() < self.config.small_catalog_threshold {
            self.match_small_catalog(brand_id, description, &entries, trusted)
                .await
        } else {
            self.match_large_catalog(brand_id, description, trusted)
                .await
        }
    }

    async fn match_small_catalog(
        &self,
        brand_id: &str,
        description: &str,
        entries: &[LinkIndexEntry],
        trusted: &[String],
    ) -> MatchResult {
        let prompt = list_match_prompt(description, entries);
        let Some(choice) = self.ask_reasoner(brand_id, "list match", &prompt, entries.len()).await
        else {
            return MatchResult::unmatched(MatchSource::NoMatch);
        };

        match choice {
            Choice::Entry(i) => {
                let entry = &entries[i];
                self.verified(
                    &entry.url,
                    MatchSource::IndexListMatch,
                    self.config.list_match_confidence,
                    Some(entry.id.clone()),
                    trusted,
                )
                .await
            }
            Choice::NoMatch => MatchResult::unmatched(MatchSource::NoMatch),
        }
    }

    async fn match_large_catalog(
        &self,
        brand_id: &str,
        description: &str,
        trusted: &[String],
    ) -> MatchResult {
        let query = match with_timeout(
            self.config.collaborator_timeout(),
            self.embedder.embed(description),
        )
        .await
        {
            Ok(v) if !v.is_empty() => v,
            Ok(_) => {
                log::warn!("Embedder returned an empty vector for brand {}", brand_id);
                return MatchResult::unmatched(MatchSource::NoMatch);
            }
            Err(e) => {
                log::warn!("Embedding failed for brand {}: {}", brand_id, e);
                return MatchResult::unmatched(MatchSource::NoMatch);
            }
        };

        let candidates = match self
            .links
            .vector_search(brand_id, &query, self.config.vector_top_k)
        {
            Ok(c) => c,
            Err(e) => {
                log::warn!("Vector search failed for brand {}: {}", brand_id, e);
                return MatchResult::unmatched(MatchSource::NoMatch);
            }
        };
        let Some(top) = candidates.first() else {
            return MatchResult::unmatched(MatchSource::NoMatch);
        };
        let best = top.similarity;

        match confidence_tier(best, &self.config) {
            ConfidenceTier::AutoAccept => {
                self.verified(
                    &top.entry.url,
                    MatchSource::VectorHighConfidence,
                    best,
                    Some(top.entry.id.clone()),
                    trusted,
                )
                .await
            }
            ConfidenceTier::Confirm => {
                self.confirm_candidates(brand_id, description, &candidates, trusted)
                    .await
            }
            ConfidenceTier::Reject => {
                MatchResult::unmatched(MatchSource::NoMatch).with_best_similarity(best)
            }
        }
    }

    async fn confirm_candidates(
        &self,
        brand_id: &str,
        description: &str,
        candidates: &[ScoredEntry],
        trusted: &[String],
    ) -> MatchResult {
        let best = candidates.first().map(|c| c.similarity).unwrap_or(0.0);
        let low_confidence = MatchResult::unmatched(MatchSource::LowConfidence).with_best_similarity(best);

        let prompt = confirmation_prompt(description, candidates);
        match self
            .ask_reasoner(brand_id, "confirmation", &prompt, candidates.len())
            .await
        {
            Some(Choice::Entry(i)) => {
                let chosen = &candidates[i];
                self.verified(
                    &chosen.entry.url,
                    MatchSource::VectorConfirmed,
                    chosen.similarity,
                    Some(chosen.entry.id.clone()),
                    trusted,
                )
                .await
            }
            Some(Choice::NoMatch) | None => low_confidence,
        }
    }

    /// Ask the reasoner and parse its answer. `None` on any failure.
    async fn ask_reasoner(
        &self,
        brand_id: &str,
        step: &str,
        prompt: &str,
        options: usize,
    ) -> Option<Choice> {
        let answer = match with_timeout(
            self.config.collaborator_timeout(),
            self.reasoner.classify(prompt),
        )
        .await
        {
            Ok(answer) => answer,
            Err(e) => {
                log::warn!("Reasoner {} failed for brand {}: {}", step, brand_id, e);
                return None;
            }
        };

        match parse_choice(&answer, options) {
            Ok(choice) => Some(choice),
            Err(e) => {
                log::warn!("Reasoner {} answer rejected for brand {}: {}", step, brand_id, e);
                None
            }
        }
    }

    /// Verify `url` and build the result. A failed check yields
    /// `verification_failed` with no URL.
    async fn verified(
        &self,
        url: &str,
        source: MatchSource,
        confidence: f32,
        matched_entry_id: Option<String>,
        trusted: &[String],
    ) -> MatchResult {
        if self.verifier.verify(url, trusted).await {
            MatchResult::matched(url, source, confidence, matched_entry_id)
        } else {
            log::info!("Candidate {} ({}) failed health verification", url, source);
            MatchResult::unmatched(MatchSource::VerificationFailed)
        }
    }

    fn finish(&self, brand_id: &str, result: MatchResult) -> MatchResult {
        log::info!(
            "Resolved link for brand {}: source={} confidence={:.2}",
            brand_id,
            result.source,
            result.confidence
        );
        if let (Some(_), Some(entry_id)) = (&result.url, &result.matched_entry_id) {
            self.record_usage_detached(entry_id.clone());
        }
        result
    }

    /// Best-effort usage bump. Never awaited; failures are only logged.
    fn record_usage_detached(&self, entry_id: String) {
        let links = self.links.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = links.record_usage(&entry_id) {
                log::warn!("Failed to record usage for link {}: {}", entry_id, e);
            }
        });
    }
}

//! Domain types shared by the resolver, scorer, verifier and refresh scheduler.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Link index
// =============================================================================

/// Kind of destination a catalog entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    Product,
    Collection,
    Page,
    Social,
    Other,
}

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkType::Product => "product",
            LinkType::Collection => "collection",
            LinkType::Page => "page",
            LinkType::Social => "social",
            LinkType::Other => "other",
        }
    }

    /// Parse a stored value. Unknown strings map to `Other`.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "product" => LinkType::Product,
            "collection" => LinkType::Collection,
            "page" => LinkType::Page,
            "social" => LinkType::Social,
            _ => LinkType::Other,
        }
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single known destination on a brand's site (a row of `link_index`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkIndexEntry {
    pub id: String,
    pub brand_id: String,
    /// Canonicalized, tracking parameters stripped.
    pub url: String,
    pub title: Option<String>,
    pub link_type: LinkType,
    /// Required before the entry is reachable by vector matching.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub is_healthy: bool,
    pub use_count: i64,
    pub last_used_at: Option<String>,
    pub created_at: String,
}

impl LinkIndexEntry {
    /// Title for prompts; falls back to the URL when the title is missing.
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.url)
    }
}

/// Catalog entry paired with its cosine similarity to a query embedding.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredEntry {
    pub entry: LinkIndexEntry,
    pub similarity: f32,
}

/// Input row for `upsert_batch`. Identity is `(brand_id, url)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkEntryInput {
    pub url: String,
    pub title: Option<String>,
    pub link_type: LinkType,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

// =============================================================================
// Brand-level preferences
// =============================================================================

/// Operator-authored override: if `name` appears in the campaign context, link to
/// `destination_url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRule {
    pub name: String,
    pub destination_url: String,
}

/// Per-brand link preferences. Rules are evaluated in list order; the first match
/// wins and takes precedence over the default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkPreferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_destination_url: Option<String>,
    #[serde(default)]
    pub rules: Vec<LinkRule>,
}

/// A brand whose site the link index catalogs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Brand {
    pub id: String,
    pub name: String,
    /// Site domain (`brand.com`). Brands without one are never refreshed.
    pub domain: Option<String>,
    /// RFC 3339 timestamp of the last completed ingestion.
    pub last_ingested_at: Option<String>,
    #[serde(default)]
    pub preferences: LinkPreferences,
}

// =============================================================================
// Resolution request / result
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignContext {
    #[serde(default)]
    pub campaign_type: Option<String>,
    #[serde(default)]
    pub primary_focus: String,
    #[serde(default)]
    pub detected_products: Vec<String>,
    #[serde(default)]
    pub detected_collections: Vec<String>,
}

impl CampaignContext {
    /// Lowercased focus + detected products + detected collections, space-joined.
    /// This is the haystack brand rules are matched against.
    pub fn rule_haystack(&self) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(
            1 + self.detected_products.len() + self.detected_collections.len(),
        );
        parts.push(&self.primary_focus);
        parts.extend(self.detected_products.iter().map(String::as_str));
        parts.extend(self.detected_collections.iter().map(String::as_str));
        parts.join(" ").to_lowercase()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionRequest {
    pub brand_id: String,
    pub slice_description: String,
    #[serde(default)]
    pub campaign_context: CampaignContext,
    #[serde(default)]
    pub is_generic_cta: bool,
}

/// Where a `MatchResult` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    BrandRule,
    BrandDefault,
    IndexListMatch,
    VectorHighConfidence,
    /// Mid-band vector candidate confirmed by the text-reasoning collaborator.
    #[serde(rename = "vector_claude_confirmed")]
    VectorConfirmed,
    LowConfidence,
    NoMatch,
    NoIndex,
    /// A candidate was chosen but did not pass health verification.
    VerificationFailed,
}

impl MatchSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchSource::BrandRule => "brand_rule",
            MatchSource::BrandDefault => "brand_default",
            MatchSource::IndexListMatch => "index_list_match",
            MatchSource::VectorHighConfidence => "vector_high_confidence",
            MatchSource::VectorConfirmed => "vector_claude_confirmed",
            MatchSource::LowConfidence => "low_confidence",
            MatchSource::NoMatch => "no_match",
            MatchSource::NoIndex => "no_index",
            MatchSource::VerificationFailed => "verification_failed",
        }
    }
}

impl fmt::Display for MatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the resolver.
///
/// Invariants: `confidence` is in `[0, 1]`; `url == None` implies
/// `confidence == 0`; `matched_entry_id` is set only when the URL came from the
/// link index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub url: Option<String>,
    pub source: MatchSource,
    pub confidence: f32,
    pub matched_entry_id: Option<String>,
    /// Best vector similarity seen when a candidate was rejected. Diagnostic only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_similarity: Option<f32>,
}

impl MatchResult {
    /// A result without a URL. Confidence is always zero.
    pub fn unmatched(source: MatchSource) -> Self {
        Self {
            url: None,
            source,
            confidence: 0.0,
            matched_entry_id: None,
            best_similarity: None,
        }
    }

    /// A result carrying a verified URL.
    pub fn matched(
        url: impl Into<String>,
        source: MatchSource,
        confidence: f32,
        matched_entry_id: Option<String>,
    ) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            url: Some(url.into()),
            source,
            confidence,
            matched_entry_id,
            best_similarity: None,
        }
    }

    pub fn with_best_similarity(mut self, similarity: f32) -> Self {
        self.best_similarity = Some(similarity);
        self
    }

    pub fn is_match(&self) -> bool {
        self.url.is_some()
    }
}

// =============================================================================
// Sitemap import jobs
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportJobStatus {
    Pending,
    Parsing,
    FetchingTitles,
    GeneratingEmbeddings,
    Complete,
    Failed,
}

impl ImportJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportJobStatus::Pending => "pending",
            ImportJobStatus::Parsing => "parsing",
            ImportJobStatus::FetchingTitles => "fetching_titles",
            ImportJobStatus::GeneratingEmbeddings => "generating_embeddings",
            ImportJobStatus::Complete => "complete",
            ImportJobStatus::Failed => "failed",
        }
    }

    /// Parse a stored value. Unknown strings are treated as `Failed` so they never
    /// block a brand from being refreshed.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "pending" => ImportJobStatus::Pending,
            "parsing" => ImportJobStatus::Parsing,
            "fetching_titles" => ImportJobStatus::FetchingTitles,
            "generating_embeddings" => ImportJobStatus::GeneratingEmbeddings,
            "complete" => ImportJobStatus::Complete,
            _ => ImportJobStatus::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ImportJobStatus::Complete | ImportJobStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SitemapImportJob {
    pub id: String,
    pub brand_id: String,
    pub status: ImportJobStatus,
    pub urls_found: i64,
    pub urls_processed: i64,
    pub urls_failed: i64,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

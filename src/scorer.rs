//! Navigation-link scoring.
//!
//! Matches footer/menu label text ("SHIPPING & RETURNS", "SALE - up to 50% OFF")
//! against URLs already discovered on the brand's site and picks an evergreen
//! destination. Pure and synchronous: no network, no store.

use url::Url;

use crate::canonical::{canonicalize_url, host_is_trusted, is_homepage, registrable_host};

/// Promotional words that carry no information about the destination.
const FILLER_WORDS: &[&str] = &[
    "up", "to", "off", "save", "now", "here", "click", "learn", "more",
];

/// Labels containing any of these never resolve to the bare homepage.
const HOMEPAGE_REJECT_KEYWORDS: &[&str] = &[
    "deal",
    "sale",
    "weekly",
    "collection",
    "shop",
    "product",
    "fit",
    "testimonial",
    "about",
    "contact",
];

const SLUG_MATCH_SCORE: i32 = 12;
const COMPACT_MATCH_SCORE: i32 = 8;
const TOKEN_MATCH_SCORE: i32 = 1;
const UTILITY_PAGE_BONUS: i32 = 5;
const COLLECTION_BONUS: i32 = 3;

/// A label reduced to comparable tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedLabel {
    pub tokens: Vec<String>,
    /// Tokens joined with `-`.
    pub slug: String,
    /// Tokens joined with nothing.
    pub compact: String,
}

/// Drop the marketing suffix after a dash ("SALE — up to 50% OFF" -> "SALE ").
fn strip_marketing_suffix(label: &str) -> &str {
    let cut = [label.find('—'), label.find('–'), label.find(" - ")]
        .into_iter()
        .flatten()
        .min();
    match cut {
        Some(idx) if !label[..idx].trim().is_empty() => &label[..idx],
        _ => label,
    }
}

pub fn normalize_label(label: &str) -> NormalizedLabel {
    let head = strip_marketing_suffix(label);
    let cleaned: String = head
        .chars()
        .filter(|c| !c.is_ascii_digit() && *c != '%')
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let tokens: Vec<String> = cleaned
        .split_whitespace()
        .filter(|t| !FILLER_WORDS.contains(t))
        .map(str::to_string)
        .collect();

    NormalizedLabel {
        slug: tokens.join("-"),
        compact: tokens.join(""),
        tokens,
    }
}

/// Score one candidate path (lowercased) against a normalized label.
/// Returns `None` for paths that are never acceptable navigation targets.
pub fn score_path(path: &str, label: &NormalizedLabel) -> Option<i32> {
    if path.contains("/products/") {
        return None;
    }

    let mut score = 0;
    if !label.slug.is_empty() && path.contains(&label.slug) {
        score += SLUG_MATCH_SCORE;
    }
    if !label.compact.is_empty() && path.contains(&label.compact) {
        score += COMPACT_MATCH_SCORE;
    }
    for token in &label.tokens {
        if token.chars().count() >= 2 && path.contains(token.as_str()) {
            score += TOKEN_MATCH_SCORE;
        }
    }

    if path.starts_with("/pages/") || path.starts_with("/policies/") {
        score += UTILITY_PAGE_BONUS;
    } else if path.starts_with("/collections/") {
        score += COLLECTION_BONUS;
    }

    Some(score)
}

/// Pick the best evergreen URL for a navigation label.
///
/// Only candidates on the brand's own host are considered. The first candidate
/// with the highest score wins; it is returned canonicalized if its score
/// reaches `min_score`.
pub fn score_navigation_candidate(
    label: &str,
    discovered_urls: &[String],
    brand_domain: &str,
    min_score: i32,
) -> Option<String> {
    let normalized = normalize_label(label);
    if normalized.tokens.is_empty() {
        return None;
    }
    let brand_host = registrable_host(brand_domain)?;
    let trusted = [brand_host];
    let label_lower = label.to_lowercase();
    let homepage_rejected = HOMEPAGE_REJECT_KEYWORDS
        .iter()
        .any(|kw| label_lower.contains(kw));

    let mut best: Option<(i32, &str)> = None;
    for candidate in discovered_urls {
        let Ok(parsed) = Url::parse(candidate.trim()) else {
            continue;
        };
        let on_brand_host = parsed
            .host_str()
            .is_some_and(|host| host_is_trusted(host, &trusted));
        if !on_brand_host {
            continue;
        }
        if homepage_rejected && is_homepage(&parsed) {
            continue;
        }

        let path = parsed.path().to_lowercase();
        let Some(score) = score_path(&path, &normalized) else {
            continue;
        };
        if best.map_or(true, |(top, _)| score > top) {
            best = Some((score, candidate.as_str()));
        }
    }

    match best {
        Some((score, url)) if score >= min_score => {
            log::debug!("Navigation label {:?} -> {} (score {})", label, url, score);
            Some(canonicalize_url(url))
        }
        _ => None,
    }
}

//! URL canonicalization and host helpers.
//!
//! Everything that compares URLs (index identity, navigation scoring, trust
//! checks) goes through these so `https://WWW.Brand.com/pages/faq/?utm_source=x`
//! and `https://www.brand.com/pages/faq` are the same destination.

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use crate::types::LinkType;

/// Query parameters that only carry attribution and never change the page.
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "ref", "ref_", "srsltid"];

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Canonical form of a web URL: fragment dropped, tracking parameters removed,
/// host lowercased, trailing slash removed from non-root paths.
///
/// Non-http(s) or unparseable input is returned trimmed and otherwise untouched.
pub fn canonicalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut url = match Url::parse(trimmed) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => url,
        _ => return trimmed.to_string(),
    };

    url.set_fragment(None);

    // Filter raw segments so kept parameters keep their original encoding.
    if let Some(query) = url.query().map(str::to_string) {
        let kept = query
            .split('&')
            .filter(|segment| {
                let key = segment.split_once('=').map_or(*segment, |(k, _)| k);
                !segment.is_empty() && !is_tracking_param(key)
            })
            .collect::<Vec<_>>()
            .join("&");
        url.set_query((!kept.is_empty()).then_some(kept.as_str()));
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    url.to_string()
}

fn placeholder_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\{\{.*\}\}|\{%.*%\}|\*\|.*\|\*|\[\[.*\]\]|%%.*%%|\$[A-Za-z_][A-Za-z0-9_]*\$)$").ok()
    })
    .as_ref()
}

fn embedded_tag_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{.+?\}\}|\{%.+?%\}|\*\|.+?\|\*|\[\[.+?\]\]|%%.+?%%").ok())
        .as_ref()
}

/// Email-system action links the ESP fills in at send time.
///
/// `mailto:` links and bare merge tags are always action tokens. A URL that
/// merely contains a merge tag only counts when it is an unsubscribe or
/// preferences link.
pub fn is_action_token(url: &str) -> bool {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return false;
    }
    let lower = trimmed.to_lowercase();
    if lower.starts_with("mailto:") {
        return true;
    }
    if placeholder_re().is_some_and(|re| re.is_match(trimmed)) {
        return true;
    }
    let manages_subscription = ["unsubscribe", "preference", "opt-out", "optout", "opt_out"]
        .iter()
        .any(|kw| lower.contains(kw));
    manages_subscription && embedded_tag_re().is_some_and(|re| re.is_match(trimmed))
}

/// Lowercased host of a URL.
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url.trim())
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}

/// Host with a leading `www.` removed. Accepts a full URL or a bare domain.
pub fn registrable_host(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    let host = if trimmed.contains("://") {
        host_of(trimmed)?
    } else {
        host_of(&format!("https://{}", trimmed))?
    };
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

/// True when `host` equals a trusted host or is a subdomain of one.
pub fn host_is_trusted(host: &str, trusted_hosts: &[String]) -> bool {
    let host = host.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    trusted_hosts.iter().any(|t| {
        let t = t.trim().to_ascii_lowercase();
        let t = t.strip_prefix("www.").unwrap_or(&t);
        !t.is_empty() && (host == t || host.ends_with(&format!(".{}", t)))
    })
}

/// True when the URL points at the site root.
pub fn is_homepage(url: &Url) -> bool {
    matches!(url.path(), "" | "/")
}

/// Infer the link type from URL shape. Storefront path conventions first,
/// then social hosts.
pub fn classify_link_type(url: &str, social_hosts: &[String]) -> LinkType {
    let Ok(parsed) = Url::parse(url.trim()) else {
        return LinkType::Other;
    };
    if let Some(host) = parsed.host_str() {
        if host_is_trusted(host, social_hosts) {
            return LinkType::Social;
        }
    }
    let path = parsed.path().to_ascii_lowercase();
    if path.contains("/products/") {
        LinkType::Product
    } else if path.contains("/collections/") {
        LinkType::Collection
    } else if path.contains("/pages/") || path.contains("/policies/") || path.contains("/blogs/") {
        LinkType::Page
    } else {
        LinkType::Other
    }
}

//! Link health verification.
//!
//! A URL is trusted only after a live existence check. Sites that block bots
//! get the benefit of the doubt, but only when they are the brand's own domain
//! or a known social platform.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{RANGE, USER_AGENT};
use thiserror::Error;

use crate::canonical::{canonicalize_url, host_is_trusted, host_of, is_action_token};

/// Statuses that usually mean "you look like a bot", not "this page is gone".
const BOT_BLOCK_STATUSES: &[u16] = &[401, 403, 405];

const PROBE_USER_AGENT: &str = "Mozilla/5.0 (compatible; linkwise-linkcheck/0.1)";
const RANGED_GET_BYTES: &str = "bytes=0-1023";

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProbeError::Timeout
        } else if err.is_connect() {
            ProbeError::Connect(err.to_string())
        } else {
            ProbeError::Other(err.to_string())
        }
    }
}

/// HTTP existence checks. Both methods return the final status code.
#[async_trait]
pub trait LinkProbe: Send + Sync {
    async fn head(&self, url: &str) -> Result<u16, ProbeError>;

    /// GET of the first kilobyte only.
    async fn ranged_get(&self, url: &str) -> Result<u16, ProbeError>;
}

pub struct ReqwestProbe {
    client: reqwest::Client,
}

impl ReqwestProbe {
    pub fn new() -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| format!("Failed to build probe HTTP client: {}", e))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl LinkProbe for ReqwestProbe {
    async fn head(&self, url: &str) -> Result<u16, ProbeError> {
        let resp = self
            .client
            .head(url)
            .header(USER_AGENT, PROBE_USER_AGENT)
            .send()
            .await?;
        Ok(resp.status().as_u16())
    }

    async fn ranged_get(&self, url: &str) -> Result<u16, ProbeError> {
        let resp = self
            .client
            .get(url)
            .header(USER_AGENT, PROBE_USER_AGENT)
            .header(RANGE, RANGED_GET_BYTES)
            .send()
            .await?;
        Ok(resp.status().as_u16())
    }
}

/// Outcome of a health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Responded with a 2xx/3xx status.
    Healthy,
    /// Failed in a way consistent with bot-blocking or a transient outage on a
    /// trusted host.
    SoftAccepted,
    /// ESP placeholder or `mailto:`; never probed.
    ActionToken,
    Rejected,
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Verdict::Rejected)
    }
}

enum Attempt {
    Decided(Verdict),
    Inconclusive,
}

fn is_success(status: u16) -> bool {
    (200..400).contains(&status)
}

#[derive(Clone)]
pub struct HealthVerifier {
    probe: Arc<dyn LinkProbe>,
    timeout: Duration,
}

impl HealthVerifier {
    pub fn new(probe: Arc<dyn LinkProbe>, timeout: Duration) -> Self {
        Self { probe, timeout }
    }

    /// True if the URL may be put in front of recipients.
    pub async fn verify(&self, url: &str, trusted_hosts: &[String]) -> bool {
        self.check(url, trusted_hosts).await.is_accepted()
    }

    pub async fn check(&self, url: &str, trusted_hosts: &[String]) -> Verdict {
        if is_action_token(url) {
            return Verdict::ActionToken;
        }

        let canonical = canonicalize_url(url);
        let Some(host) = host_of(&canonical) else {
            log::debug!("Rejecting non-web URL {:?}", url);
            return Verdict::Rejected;
        };
        if !canonical.starts_with("http://") && !canonical.starts_with("https://") {
            return Verdict::Rejected;
        }
        let trusted = host_is_trusted(&host, trusted_hosts);

        let head = self.bounded(self.probe.head(&canonical)).await;
        if let Attempt::Decided(verdict) = Self::judge(&canonical, "HEAD", head, trusted, false) {
            return verdict;
        }

        let get = self.bounded(self.probe.ranged_get(&canonical)).await;
        match Self::judge(&canonical, "GET", get, trusted, true) {
            Attempt::Decided(verdict) => verdict,
            Attempt::Inconclusive => Verdict::Rejected,
        }
    }

    async fn bounded<F>(&self, fut: F) -> Result<u16, ProbeError>
    where
        F: std::future::Future<Output = Result<u16, ProbeError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout),
        }
    }

    /// Apply the accept/soft-accept rules to one attempt. Transport errors on
    /// untrusted hosts stay inconclusive until the final attempt.
    fn judge(
        url: &str,
        method: &str,
        outcome: Result<u16, ProbeError>,
        trusted: bool,
        final_attempt: bool,
    ) -> Attempt {
        match outcome {
            Ok(status) if is_success(status) => Attempt::Decided(Verdict::Healthy),
            Ok(status) if trusted && BOT_BLOCK_STATUSES.contains(&status) => {
                log::debug!("{} {} -> {} on trusted host, soft-accepting", method, url, status);
                Attempt::Decided(Verdict::SoftAccepted)
            }
            Ok(status) => {
                log::debug!("{} {} -> {}", method, url, status);
                Attempt::Inconclusive
            }
            Err(e) if trusted => {
                log::info!("{} {} failed on trusted host ({}), soft-accepting", method, url, e);
                Attempt::Decided(Verdict::SoftAccepted)
            }
            Err(e) => {
                if final_attempt {
                    log::info!("{} {} failed: {}", method, url, e);
                }
                Attempt::Inconclusive
            }
        }
    }
}

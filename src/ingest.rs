//! Ingestion: turn discovered site URLs into link index entries.
//!
//! This module does not crawl. URLs come from a `SiteDiscovery` collaborator;
//! the pipeline canonicalizes them, derives titles, computes embeddings and
//! replaces the brand's catalog, moving the import job through
//! `pending -> parsing -> fetching_titles -> generating_embeddings -> complete`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use url::Url;

use crate::canonical::{canonicalize_url, classify_link_type, host_is_trusted, registrable_host};
use crate::collaborators::{
    with_timeout, DiscoveredUrl, Embedder, IngestionDispatcher, SiteDiscovery,
};
use crate::config::EngineConfig;
use crate::error::CollaboratorError;
use crate::store::{BrandDirectory, LinkIndexStore};
use crate::types::{ImportJobStatus, LinkEntryInput, SitemapImportJob};

/// Counts for a finished job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestionSummary {
    pub urls_found: i64,
    pub urls_processed: i64,
    pub urls_failed: i64,
    pub pruned: usize,
}

#[derive(Clone)]
pub struct IngestionPipeline {
    links: Arc<dyn LinkIndexStore>,
    brands: Arc<dyn BrandDirectory>,
    discovery: Arc<dyn SiteDiscovery>,
    embedder: Arc<dyn Embedder>,
    config: EngineConfig,
}

impl IngestionPipeline {
    pub fn new(
        links: Arc<dyn LinkIndexStore>,
        brands: Arc<dyn BrandDirectory>,
        discovery: Arc<dyn SiteDiscovery>,
        embedder: Arc<dyn Embedder>,
        config: EngineConfig,
    ) -> Self {
        Self {
            links,
            brands,
            discovery,
            embedder,
            config,
        }
    }

    /// Run one import job to completion. On error the job is marked `failed`
    /// and the existing catalog is left untouched.
    pub async fn run_job(
        &self,
        job: &SitemapImportJob,
        domain: &str,
    ) -> Result<IngestionSummary, String> {
        match self.ingest(job, domain).await {
            Ok(summary) => {
                log::info!(
                    "Ingestion job {} for brand {} complete: {} found, {} processed, {} failed, {} pruned",
                    job.id,
                    job.brand_id,
                    summary.urls_found,
                    summary.urls_processed,
                    summary.urls_failed,
                    summary.pruned
                );
                Ok(summary)
            }
            Err(e) => {
                log::warn!("Ingestion job {} for brand {} failed: {}", job.id, job.brand_id, e);
                if let Err(db_err) = self.brands.fail_import_job(&job.id, &e) {
                    log::error!("Could not mark job {} failed: {}", job.id, db_err);
                }
                Err(e)
            }
        }
    }

    async fn ingest(&self, job: &SitemapImportJob, domain: &str) -> Result<IngestionSummary, String> {
        let brand_id = job.brand_id.as_str();
        let brand_host =
            registrable_host(domain).ok_or_else(|| format!("Invalid brand domain {:?}", domain))?;

        self.set_status(job, ImportJobStatus::Parsing, None)?;
        let discovered = with_timeout(
            self.config.collaborator_timeout(),
            self.discovery.discover(domain),
        )
        .await
        .map_err(|e| format!("Site discovery failed: {}", e))?;
        let urls_found = discovered.len() as i64;

        let pages = select_pages(discovered, &brand_host, &self.config.social_hosts);
        if pages.is_empty() {
            return Err(format!("No usable URLs discovered on {}", domain));
        }

        self.set_status(job, ImportJobStatus::FetchingTitles, Some(urls_found))?;
        let titled: Vec<(String, String)> = pages
            .into_iter()
            .map(|(url, title)| {
                let title = title.unwrap_or_else(|| derive_title(&url));
                (url, title)
            })
            .collect();

        self.set_status(job, ImportJobStatus::GeneratingEmbeddings, None)?;
        let mut entries = Vec::with_capacity(titled.len());
        let mut urls_failed = 0i64;
        for (url, title) in titled {
            let text = embedding_text(&title, &url);
            let embedding = match with_timeout(
                self.config.collaborator_timeout(),
                self.embedder.embed(&text),
            )
            .await
            {
                Ok(v) if !v.is_empty() => Some(v),
                Ok(_) => {
                    urls_failed += 1;
                    None
                }
                Err(e) => {
                    log::debug!("Embedding failed for {}: {}", url, e);
                    urls_failed += 1;
                    None
                }
            };
            entries.push(LinkEntryInput {
                link_type: classify_link_type(&url, &self.config.social_hosts),
                url,
                title: Some(title),
                embedding,
            });
        }

        let (_, pruned) = self
            .links
            .replace_catalog(brand_id, &entries)
            .map_err(|e| format!("Failed to replace link index: {}", e))?;

        let urls_processed = entries.len() as i64;
        self.brands
            .mark_ingested(brand_id, &Utc::now().to_rfc3339())
            .map_err(|e| format!("Failed to stamp brand: {}", e))?;
        self.brands
            .complete_import_job(&job.id, urls_found, urls_processed, urls_failed)
            .map_err(|e| format!("Failed to complete job: {}", e))?;

        Ok(IngestionSummary {
            urls_found,
            urls_processed,
            urls_failed,
            pruned,
        })
    }

    fn set_status(
        &self,
        job: &SitemapImportJob,
        status: ImportJobStatus,
        urls_found: Option<i64>,
    ) -> Result<(), String> {
        log::debug!("Ingestion job {} -> {}", job.id, status.as_str());
        self.brands
            .update_import_job(&job.id, status, urls_found)
            .map_err(|e| format!("Failed to update job status: {}", e))
    }
}

#[async_trait]
impl IngestionDispatcher for IngestionPipeline {
    /// Spawn the job on the runtime and return immediately.
    async fn dispatch(&self, job: &SitemapImportJob, domain: &str) -> Result<(), CollaboratorError> {
        let pipeline = self.clone();
        let job = job.clone();
        let domain = domain.to_string();
        tokio::spawn(async move {
            let _ = pipeline.run_job(&job, &domain).await;
        });
        Ok(())
    }
}

/// Leaves jobs `pending` for an out-of-process worker that polls
/// `sitemap_import_jobs`.
pub struct PendingJobDispatcher;

#[async_trait]
impl IngestionDispatcher for PendingJobDispatcher {
    async fn dispatch(&self, job: &SitemapImportJob, domain: &str) -> Result<(), CollaboratorError> {
        log::info!(
            "Import job {} for {} left pending for external worker",
            job.id,
            domain
        );
        Ok(())
    }
}

/// Site discovery over HTTP: `GET {endpoint}?domain=...` returning a JSON array
/// of `{ "url": ..., "title": ... }`.
pub struct HttpDiscovery {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpDiscovery {
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self, String> {
        Url::parse(&endpoint).map_err(|e| format!("Invalid discovery endpoint: {}", e))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| format!("Failed to build discovery HTTP client: {}", e))?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl SiteDiscovery for HttpDiscovery {
    async fn discover(&self, domain: &str) -> Result<Vec<DiscoveredUrl>, CollaboratorError> {
        let url = Url::parse_with_params(&self.endpoint, &[("domain", domain)])
            .map_err(|e| CollaboratorError::Unavailable(e.to_string()))?;
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(CollaboratorError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp.json().await?)
    }
}

/// Canonicalize, keep brand-host and social URLs, de-duplicate. A later
/// duplicate only contributes a title when the first had none.
fn select_pages(
    discovered: Vec<DiscoveredUrl>,
    brand_host: &str,
    social_hosts: &[String],
) -> Vec<(String, Option<String>)> {
    let brand = [brand_host.to_string()];
    let mut order: Vec<String> = Vec::new();
    let mut titles: HashMap<String, Option<String>> = HashMap::new();

    for item in discovered {
        let url = canonicalize_url(&item.url);
        let Ok(parsed) = Url::parse(&url) else {
            continue;
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            continue;
        }
        let Some(host) = parsed.host_str() else {
            continue;
        };
        if !host_is_trusted(host, &brand) && !host_is_trusted(host, social_hosts) {
            continue;
        }

        let title = item
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        match titles.get_mut(&url) {
            Some(existing) => {
                if existing.is_none() {
                    *existing = title;
                }
            }
            None => {
                order.push(url.clone());
                titles.insert(url, title);
            }
        }
    }

    order
        .into_iter()
        .map(|url| {
            let title = titles.remove(&url).flatten();
            (url, title)
        })
        .collect()
}

/// Title from the last path segment: `/products/cruz-snow-jacket` -> "Cruz Snow Jacket".
pub fn derive_title(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return url.to_string();
    };
    let segment = parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(|s| s.to_string());

    match segment {
        Some(seg) => seg
            .split(|c: char| c == '-' || c == '_' || c == '+')
            .filter(|w| !w.is_empty())
            .map(|w| {
                let mut chars = w.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" "),
        None => parsed.host_str().unwrap_or(url).to_string(),
    }
}

fn embedding_text(title: &str, url: &str) -> String {
    let path = Url::parse(url)
        .map(|u| u.path().replace(['/', '-', '_'], " "))
        .unwrap_or_default();
    format!("{} {}", title, path.trim())
}

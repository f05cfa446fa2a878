//! Seams to the outside world.
//!
//! The engine never talks to a model, a crawler or the network directly; it
//! goes through these traits so each can be swapped for a fake in tests.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;
use crate::types::SitemapImportJob;

/// Free-text reasoning. The prompt tells the model to answer with a 1-based
/// index or `none`; interpreting the answer is the caller's job.
#[async_trait]
pub trait TextReasoner: Send + Sync {
    async fn classify(&self, prompt: &str) -> Result<String, CollaboratorError>;
}

/// Text embedding of fixed dimensionality.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CollaboratorError>;
}

/// One URL known to exist on a brand's site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredUrl {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// Supplies the URLs of a brand's site. How they are found is not our concern.
#[async_trait]
pub trait SiteDiscovery: Send + Sync {
    async fn discover(&self, domain: &str) -> Result<Vec<DiscoveredUrl>, CollaboratorError>;
}

/// Receives a freshly created `pending` import job. Implementations must
/// return promptly; the work itself happens elsewhere.
#[async_trait]
pub trait IngestionDispatcher: Send + Sync {
    async fn dispatch(&self, job: &SitemapImportJob, domain: &str)
        -> Result<(), CollaboratorError>;
}

/// Run a collaborator future under a deadline. An elapsed deadline becomes
/// `CollaboratorError::Timeout`.
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, CollaboratorError>
where
    F: Future<Output = Result<T, CollaboratorError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(CollaboratorError::Timeout(limit)),
    }
}

//! Shared fakes and fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use linkwise_lib::collaborators::{
    DiscoveredUrl, Embedder, IngestionDispatcher, SiteDiscovery, TextReasoner,
};
use linkwise_lib::error::CollaboratorError;
use linkwise_lib::store::{BrandDirectory, LinkIndexStore, LinkStore};
use linkwise_lib::types::{
    Brand, CampaignContext, LinkEntryInput, LinkPreferences, LinkType, ResolutionRequest,
    SitemapImportJob,
};
use linkwise_lib::verifier::{LinkProbe, ProbeError};
use linkwise_lib::{Collaborators, EngineConfig, LinkEngine};

// =============================================================================
// Store fixtures
// =============================================================================

pub fn temp_store() -> Arc<LinkStore> {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("links.db");
    std::mem::forget(dir);
    Arc::new(LinkStore::open_at(path).expect("open store"))
}

pub fn seed_brand(
    store: &LinkStore,
    id: &str,
    domain: Option<&str>,
    preferences: LinkPreferences,
) -> Brand {
    let brand = Brand {
        id: id.to_string(),
        name: format!("Brand {}", id),
        domain: domain.map(str::to_string),
        last_ingested_at: None,
        preferences,
    };
    store.upsert_brand(&brand).expect("seed brand");
    brand
}

pub fn entry(url: &str, title: &str, link_type: LinkType, embedding: Option<Vec<f32>>) -> LinkEntryInput {
    LinkEntryInput {
        url: url.to_string(),
        title: Some(title.to_string()),
        link_type,
        embedding,
    }
}

pub fn entry_id(store: &LinkStore, brand_id: &str, url: &str) -> String {
    store
        .get_all(brand_id)
        .expect("list entries")
        .into_iter()
        .find(|e| e.url == url)
        .map(|e| e.id)
        .expect("entry exists")
}

/// Poll until the entry's use_count reaches `expected` (usage is recorded in
/// the background).
pub async fn wait_for_use_count(store: &LinkStore, entry_id: &str, expected: i64) -> i64 {
    let mut last = -1;
    for _ in 0..100 {
        last = store
            .get_entry(entry_id)
            .expect("get entry")
            .map(|e| e.use_count)
            .unwrap_or(-1);
        if last >= expected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    last
}

pub fn request(brand_id: &str, description: &str) -> ResolutionRequest {
    ResolutionRequest {
        brand_id: brand_id.to_string(),
        slice_description: description.to_string(),
        campaign_context: CampaignContext::default(),
        is_generic_cta: false,
    }
}

// =============================================================================
// Collaborator fakes
// =============================================================================

enum ReasonerMode {
    Answer(String),
    PickTitle(String),
    Fail,
}

/// Text reasoner with a scripted answer. Records every prompt it sees.
pub struct ScriptedReasoner {
    mode: ReasonerMode,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedReasoner {
    pub fn answering(answer: &str) -> Arc<Self> {
        Arc::new(Self {
            mode: ReasonerMode::Answer(answer.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Answers with the number of the enumerated line containing `title`,
    /// or `none` when no line does.
    pub fn picking_title(title: &str) -> Arc<Self> {
        Arc::new(Self {
            mode: ReasonerMode::PickTitle(title.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            mode: ReasonerMode::Fail,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().last().cloned()
    }
}

#[async_trait]
impl TextReasoner for ScriptedReasoner {
    async fn classify(&self, prompt: &str) -> Result<String, CollaboratorError> {
        self.prompts.lock().push(prompt.to_string());
        match &self.mode {
            ReasonerMode::Answer(answer) => Ok(answer.clone()),
            ReasonerMode::Fail => Err(CollaboratorError::Api {
                status: 529,
                message: "overloaded".to_string(),
            }),
            ReasonerMode::PickTitle(title) => {
                let picked = prompt.lines().find_map(|line| {
                    let (number, rest) = line.split_once(". ")?;
                    let number: usize = number.trim().parse().ok()?;
                    rest.contains(title.as_str()).then_some(number)
                });
                Ok(picked.map_or_else(|| "none".to_string(), |n| n.to_string()))
            }
        }
    }
}

/// Returns the same query vector for every text.
pub struct FixedEmbedder {
    vector: Option<Vec<f32>>,
    pub calls: AtomicUsize,
}

impl FixedEmbedder {
    pub fn new(vector: Vec<f32>) -> Arc<Self> {
        Arc::new(Self {
            vector: Some(vector),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            vector: None,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.vector
            .clone()
            .ok_or_else(|| CollaboratorError::Http("connection reset".to_string()))
    }
}

/// Answers every probe with a per-URL status, falling back to a default.
pub struct StatusProbe {
    default_status: u16,
    overrides: HashMap<String, u16>,
    pub calls: AtomicUsize,
}

impl StatusProbe {
    pub fn all(status: u16) -> Arc<Self> {
        Arc::new(Self {
            default_status: status,
            overrides: HashMap::new(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn with_overrides(default_status: u16, overrides: &[(&str, u16)]) -> Arc<Self> {
        Arc::new(Self {
            default_status,
            overrides: overrides
                .iter()
                .map(|(url, status)| (url.to_string(), *status))
                .collect(),
            calls: AtomicUsize::new(0),
        })
    }

    fn status_for(&self, url: &str) -> u16 {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.overrides
            .get(url)
            .copied()
            .unwrap_or(self.default_status)
    }
}

#[async_trait]
impl LinkProbe for StatusProbe {
    async fn head(&self, url: &str) -> Result<u16, ProbeError> {
        Ok(self.status_for(url))
    }

    async fn ranged_get(&self, url: &str) -> Result<u16, ProbeError> {
        Ok(self.status_for(url))
    }
}

/// Records dispatched jobs. Fails for brands listed in `fail_for`.
#[derive(Default)]
pub struct RecordingDispatcher {
    pub dispatched: Mutex<Vec<(String, String, String)>>,
    fail_for: Vec<String>,
}

impl RecordingDispatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_for(brand_ids: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            dispatched: Mutex::new(Vec::new()),
            fail_for: brand_ids.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn brand_ids(&self) -> Vec<String> {
        self.dispatched.lock().iter().map(|(_, b, _)| b.clone()).collect()
    }
}

#[async_trait]
impl IngestionDispatcher for RecordingDispatcher {
    async fn dispatch(&self, job: &SitemapImportJob, domain: &str) -> Result<(), CollaboratorError> {
        if self.fail_for.contains(&job.brand_id) {
            return Err(CollaboratorError::Unavailable("crawler offline".to_string()));
        }
        self.dispatched
            .lock()
            .push((job.id.clone(), job.brand_id.clone(), domain.to_string()));
        Ok(())
    }
}

/// Site discovery returning a fixed list.
pub struct StaticDiscovery {
    pub urls: Vec<DiscoveredUrl>,
}

impl StaticDiscovery {
    pub fn new(urls: &[(&str, Option<&str>)]) -> Arc<Self> {
        Arc::new(Self {
            urls: urls
                .iter()
                .map(|(url, title)| DiscoveredUrl {
                    url: url.to_string(),
                    title: title.map(str::to_string),
                })
                .collect(),
        })
    }
}

#[async_trait]
impl SiteDiscovery for StaticDiscovery {
    async fn discover(&self, _domain: &str) -> Result<Vec<DiscoveredUrl>, CollaboratorError> {
        Ok(self.urls.clone())
    }
}

// =============================================================================
// Engine wiring
// =============================================================================

pub fn test_config() -> EngineConfig {
    EngineConfig {
        dispatch_stagger_ms: 0,
        health_timeout_ms: 200,
        collaborator_timeout_secs: 2,
        ..EngineConfig::default()
    }
}

pub fn engine(
    store: &Arc<LinkStore>,
    reasoner: Arc<dyn TextReasoner>,
    embedder: Arc<dyn Embedder>,
    probe: Arc<dyn LinkProbe>,
    config: EngineConfig,
) -> LinkEngine {
    LinkEngine::new(
        store.clone(),
        store.clone(),
        Collaborators {
            reasoner,
            embedder,
            probe,
            dispatcher: RecordingDispatcher::new(),
        },
        config,
    )
}

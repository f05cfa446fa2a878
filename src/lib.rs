//! Link resolution engine.
//!
//! Maps a described element of a marketing email (a product photo, a CTA, a
//! footer label) to a stable, verified URL on the brand's own site, or to
//! nothing at all when no trustworthy match exists.

pub mod audit;
pub mod canonical;
pub mod collaborators;
pub mod config;
pub mod db;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod ingest;
mod migrations;
pub mod reasoner;
pub mod refresh;
pub mod resolver;
pub mod scorer;
pub mod store;
pub mod types;
pub mod verifier;

pub use config::{load_config, EngineConfig};
pub use engine::{Collaborators, LinkEngine};
pub use types::{
    Brand, CampaignContext, LinkIndexEntry, LinkPreferences, LinkRule, LinkType, MatchResult,
    MatchSource, ResolutionRequest,
};

/// Initialise `env_logger` with `info` as the default level. `RUST_LOG` wins.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

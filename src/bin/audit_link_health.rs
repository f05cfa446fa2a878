//! One-shot health audit of brand link indexes.
//!
//! Usage: `audit_link_health [BRAND_ID ...]`. With no arguments every brand is
//! audited. Results are written back to `is_healthy` and printed as JSON.

use std::sync::Arc;

use linkwise_lib::audit::audit_brand_links;
use linkwise_lib::load_config;
use linkwise_lib::store::{BrandDirectory, LinkStore};
use linkwise_lib::verifier::{HealthVerifier, ReqwestProbe};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    linkwise_lib::init_logging();

    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {e}"))?;
    let store = LinkStore::open().map_err(|e| anyhow::anyhow!("Failed to open database: {e}"))?;
    let probe = ReqwestProbe::new().map_err(|e| anyhow::anyhow!(e))?;
    let verifier = HealthVerifier::new(Arc::new(probe), config.health_timeout());

    let requested: Vec<String> = std::env::args().skip(1).collect();
    let brands = if requested.is_empty() {
        store.list_brands()?
    } else {
        let mut brands = Vec::with_capacity(requested.len());
        for id in &requested {
            match store.get_brand(id)? {
                Some(brand) => brands.push(brand),
                None => log::warn!("Unknown brand {}", id),
            }
        }
        brands
    };

    let mut failures = 0usize;
    for brand in brands {
        let trusted = config.trusted_hosts_for(brand.domain.as_deref());
        match audit_brand_links(&store, &verifier, &brand.id, &trusted).await {
            Ok(summary) => {
                println!(
                    "{}",
                    serde_json::json!({ "brandId": brand.id, "summary": summary })
                );
            }
            Err(e) => {
                failures += 1;
                log::error!("Audit failed for brand {}: {}", brand.id, e);
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} brand audit(s) failed", failures);
    }
    Ok(())
}

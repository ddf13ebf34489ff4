pub mod event;
pub mod retrieve;
pub mod sources;
pub mod status;

pub use event::show_event;
pub use retrieve::run_retrieve;
pub use sources::list_sources;
pub use status::show_status;

use std::sync::Arc;

use anyhow::{Context, Result};
use harvestry_harvest::hal::HalHarvester;
use harvestry_harvest::{Config, HarvesterRegistry, RetrievalCoordinator};

/// Build the coordinator with every available harvester registered.
pub fn build_coordinator(config: &Config) -> Result<RetrievalCoordinator> {
    let mut registry = HarvesterRegistry::new();
    registry.register(Arc::new(
        HalHarvester::new(config.hal_api_url.clone(), config.request_timeout())
            .context("Failed to build the HAL client")?,
    ));
    Ok(RetrievalCoordinator::new(
        &config.database_path,
        Arc::new(registry),
    ))
}

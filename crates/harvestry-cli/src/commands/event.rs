use anyhow::{anyhow, Result};

use harvestry_core::model::ReferenceEventId;
use harvestry_harvest::Config;

use super::build_coordinator;

pub fn show_event(config: &Config, event_id: &str) -> Result<()> {
    let event_id = event_id
        .parse::<ReferenceEventId>()
        .map_err(|e| anyhow!("invalid event id {event_id:?}: {e}"))?;

    let coordinator = build_coordinator(config)?;
    let event = coordinator
        .get_reference_event(&event_id)?
        .ok_or_else(|| anyhow!("no event {event_id}"))?;

    println!(
        "{} at {} (harvesting {})",
        event.kind, event.timestamp, event.harvesting_id
    );
    println!("{}", serde_json::to_string_pretty(&event.reference)?);
    Ok(())
}

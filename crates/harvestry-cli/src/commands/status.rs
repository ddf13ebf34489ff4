use anyhow::{anyhow, Result};

use harvestry_core::model::RetrievalId;
use harvestry_harvest::{Config, RetrievalSnapshot};

use super::build_coordinator;

pub fn show_status(config: &Config, retrieval_id: &str) -> Result<()> {
    let retrieval_id = retrieval_id
        .parse::<RetrievalId>()
        .map_err(|e| anyhow!("invalid retrieval id {retrieval_id:?}: {e}"))?;

    let coordinator = build_coordinator(config)?;
    let snapshot = coordinator
        .get_retrieval(&retrieval_id)?
        .ok_or_else(|| anyhow!("no retrieval {retrieval_id}"))?;

    println!(
        "Retrieval {} for {} ({})",
        snapshot.retrieval.id,
        snapshot.retrieval.person.display_name,
        if snapshot.is_complete() {
            "complete"
        } else {
            "in progress"
        }
    );
    print_snapshot(&snapshot);
    Ok(())
}

/// Print each harvesting with its retained events.
pub fn print_snapshot(snapshot: &RetrievalSnapshot) {
    for harvesting in &snapshot.harvestings {
        println!(
            "\n  {} [{}]",
            harvesting.harvesting.harvester, harvesting.harvesting.state
        );
        if let Some(error) = &harvesting.harvesting.error {
            println!("    error: {error}");
        }
        for event in &harvesting.events {
            let title = event
                .reference
                .titles
                .first()
                .map_or("(untitled)", |t| t.value.as_str());
            println!(
                "    {:9} {} {} {}",
                event.kind, event.id, event.reference.source_identifier, title
            );
        }
    }
}

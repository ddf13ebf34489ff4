use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use harvestry_core::model::{EventKind, IdentifierKind, Person};
use harvestry_harvest::{Config, RetrievalSnapshot};

use super::build_coordinator;
use crate::commands::status::print_snapshot;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub async fn run_retrieve(
    config: &Config,
    name: String,
    identifiers: Vec<String>,
    sources: Vec<String>,
    event_kinds: Vec<String>,
    wait: bool,
) -> Result<()> {
    let mut person = Person::new(name);
    for raw in &identifiers {
        let (kind, value) = parse_identifier(raw)?;
        person = person.with_identifier(kind, value);
    }

    let event_kinds = event_kinds
        .iter()
        .map(|raw| {
            raw.parse::<EventKind>()
                .map_err(|message| anyhow!("invalid event kind {raw:?}: {message}"))
        })
        .collect::<Result<Vec<_>>>()?;

    // No --source flag means "every relevant registered source".
    let sources = (!sources.is_empty()).then_some(sources);

    let coordinator = build_coordinator(config)?;
    let retrieval_id = coordinator
        .start_retrieval(person, sources, event_kinds)
        .await
        .context("Failed to start the retrieval")?;

    println!("Retrieval started: {retrieval_id}");

    if !wait {
        println!("Follow it with `harvestry status {retrieval_id}`");
        return Ok(());
    }

    let snapshot = loop {
        let snapshot = coordinator
            .get_retrieval(&retrieval_id)?
            .ok_or_else(|| anyhow!("retrieval {retrieval_id} disappeared"))?;
        if snapshot.is_complete() {
            break snapshot;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    };

    print_summary(&snapshot);
    print_snapshot(&snapshot);
    Ok(())
}

fn parse_identifier(raw: &str) -> Result<(IdentifierKind, &str)> {
    let (kind, value) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("identifier must be kind:value, got {raw:?}"))?;
    let kind = kind
        .parse::<IdentifierKind>()
        .map_err(|message| anyhow!("invalid identifier kind {kind:?}: {message}"))?;
    Ok((kind, value))
}

fn print_summary(snapshot: &RetrievalSnapshot) {
    let events: usize = snapshot.harvestings.iter().map(|h| h.events.len()).sum();
    println!(
        "\nRetrieval complete: {} harvesting(s), {} event(s)",
        snapshot.harvestings.len(),
        events
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_identifier() {
        let (kind, value) = parse_identifier("id_hal:169647").unwrap();
        assert_eq!(kind, IdentifierKind::IdHal);
        assert_eq!(value, "169647");

        assert!(parse_identifier("169647").is_err());
        assert!(parse_identifier("scopus:169647").is_err());
    }
}

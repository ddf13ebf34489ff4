use anyhow::Result;

use harvestry_harvest::Config;

use super::build_coordinator;

pub fn list_sources(config: &Config) -> Result<()> {
    let coordinator = build_coordinator(config)?;
    for name in coordinator.known_sources() {
        println!("{name}");
    }
    Ok(())
}

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

mod commands;

#[derive(Debug, Parser)]
#[command(name = "harvestry", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the database (default: ~/.local/share/harvestry/harvestry.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Launch a retrieval for a person
    ///
    /// Starts one harvesting per requested source (every relevant
    /// registered source when --source is not given) and prints the
    /// retrieval id immediately. Each harvesting fetches the person's
    /// current document set from its source, normalizes it, and
    /// reconciles it against the stored state, emitting one event per
    /// reference: created, updated, deleted, or unchanged.
    ///
    /// The person is described by a display name and any number of
    /// identifiers in kind:value form (kinds: id_hal, idref, orcid,
    /// local), e.g. --identifier id_hal:169647.
    ///
    /// With --wait, polls until every harvesting reaches a terminal
    /// state and prints the final summary. Without it, use
    /// `harvestry status <retrieval-id>` to follow progress.
    Retrieve {
        /// Display name of the person
        #[arg(long)]
        name: String,

        /// Person identifier as kind:value (repeatable)
        #[arg(long = "identifier", value_name = "KIND:VALUE")]
        identifiers: Vec<String>,

        /// Source to harvest from (repeatable; default: all relevant)
        #[arg(long = "source", value_name = "SOURCE")]
        sources: Vec<String>,

        /// Retain only these event kinds in status output (repeatable;
        /// default: all kinds)
        #[arg(long = "events", value_name = "KIND")]
        event_kinds: Vec<String>,

        /// Block until the retrieval completes
        #[arg(long)]
        wait: bool,
    },
    /// Show the state of a retrieval and its harvestings
    Status {
        /// The retrieval id printed by `retrieve`
        retrieval_id: String,
    },
    /// Show one reference event with its full reference payload
    Event {
        /// The event id shown by `status`
        event_id: String,
    },
    /// List the registered sources
    Sources,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match cli.db {
        Some(db_path) => harvestry_harvest::Config::load_with_db_path(db_path)?,
        None => harvestry_harvest::Config::load()?,
    };

    // Ensure database directory exists
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    match cli.command {
        Commands::Retrieve {
            name,
            identifiers,
            sources,
            event_kinds,
            wait,
        } => {
            commands::run_retrieve(&config, name, identifiers, sources, event_kinds, wait).await?;
        }
        Commands::Status { retrieval_id } => {
            commands::show_status(&config, &retrieval_id)?;
        }
        Commands::Event { event_id } => {
            commands::show_event(&config, &event_id)?;
        }
        Commands::Sources => {
            commands::list_sources(&config)?;
        }
    }

    Ok(())
}

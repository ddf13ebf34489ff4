//! Retrieval orchestration for harvestry.
//!
//! Implements the harvester adapter seam, the contributor identity
//! resolver, the reference reconciliation engine, the harvesting job
//! state machine, and the retrieval coordinator that fans one
//! concurrent job out per requested source.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod config;
pub mod coordinator;
pub mod error;
pub mod hal;
pub mod harvester;
pub mod identity;
pub mod job;
pub mod reconcile;
pub mod resilience;

pub use config::Config;
pub use coordinator::{HarvestingSnapshot, RetrievalCoordinator, RetrievalSnapshot};
pub use error::{HarvestError, HarvestResult};
pub use harvester::{Harvester, HarvesterRegistry, NormalizedReference, RawDocument};
pub use identity::{ContributorMention, IdentityResolver};
pub use reconcile::Reconciler;

//! Core domain model for harvestry.
//!
//! This crate defines the bibliographic entities shared by every
//! harvester (Person, Reference, Contributor, Contribution,
//! ReferenceEvent), the retrieval/harvesting bookkeeping records, and
//! the SQLite store they are persisted in.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod error;
pub mod model;
pub mod schema;

pub use error::{Error, Result};

//! Contributor identity resolution.
//!
//! Decides, for each contributor mention encountered while processing
//! a harvesting's documents, which contributor row the contribution
//! attaches to: an existing row matched by `(source,
//! source_identifier)`, or a freshly created one.

use harvestry_core::model::Contributor;
use harvestry_core::schema::Database;

use crate::error::HarvestResult;

/// A contributor as mentioned in one source document, prior to
/// resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContributorMention {
    pub source_identifier: Option<String>,
    pub name: String,
    pub role: String,
}

impl ContributorMention {
    #[must_use]
    pub fn new(source_identifier: Option<String>, name: impl Into<String>) -> Self {
        Self {
            source_identifier,
            name: name.into(),
            role: "aut".to_string(),
        }
    }

    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }
}

/// Resolves contributor mentions against one source's identifier
/// space.
///
/// Matching is strictly identifier-based: mentions without a source
/// identifier always create a fresh row (no fuzzy name matching), and
/// two rows with distinct identifiers are never merged however similar
/// their names. When the same identifier carries different name forms,
/// the resolution is last-seen-wins: the later mention's name becomes
/// current and the superseded name is folded into the variants. This
/// holds uniformly within one batch and across runs, since every
/// mention goes through the store.
#[derive(Debug)]
pub struct IdentityResolver<'a> {
    db: &'a Database,
    source: String,
}

impl<'a> IdentityResolver<'a> {
    #[must_use]
    pub fn new(db: &'a Database, source: impl Into<String>) -> Self {
        Self {
            db,
            source: source.into(),
        }
    }

    /// Return the contributor row a contribution for this mention
    /// should attach to, creating or updating it as needed.
    pub fn resolve(&self, mention: &ContributorMention) -> HarvestResult<Contributor> {
        let Some(identifier) = mention.source_identifier.as_deref() else {
            // No identifier: no persistent cross-run identity.
            let contributor = Contributor::new(self.source.clone(), None, mention.name.clone());
            self.db.insert_contributor(&contributor)?;
            return Ok(contributor);
        };

        match self.db.get_contributor_by_identifier(&self.source, identifier)? {
            Some(mut existing) => {
                if existing.record_name(&mention.name) {
                    tracing::debug!(
                        source = %self.source,
                        identifier,
                        name = %mention.name,
                        "contributor name superseded"
                    );
                    self.db.upsert_contributor(&existing)?;
                }
                Ok(existing)
            }
            None => {
                let contributor = Contributor::new(
                    self.source.clone(),
                    Some(identifier.to_string()),
                    mention.name.clone(),
                );
                self.db.upsert_contributor(&contributor)?;
                // Re-read: a concurrent retrieval may have won the
                // insert, in which case the upsert landed on its row.
                let stored = self
                    .db
                    .get_contributor_by_identifier(&self.source, identifier)?
                    .unwrap_or(contributor);
                Ok(stored)
            }
        }
    }
}

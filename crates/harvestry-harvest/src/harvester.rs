//! The harvester adapter seam and its registry.
//!
//! A harvester supplies two capabilities: `fetch` (person → raw
//! documents, failing on transport errors or an unparseable top-level
//! payload) and `normalize` (raw document → canonical reference,
//! failing per record). Concrete sources are registered in a lookup
//! table keyed by source name.

use std::collections::HashMap;
use std::sync::Arc;

use harvestry_core::model::{Person, Reference};

use crate::error::HarvestResult;
use crate::identity::ContributorMention;

/// One raw document as returned by a source, prior to normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    pub payload: serde_json::Value,
}

impl RawDocument {
    #[must_use]
    pub fn new(payload: serde_json::Value) -> Self {
        Self { payload }
    }
}

/// A canonical reference as produced by `normalize`, with its
/// contributor mentions still unresolved.
///
/// Mentions are in source order; their position determines the
/// contribution ranks once the identity resolver has assigned
/// contributor rows.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedReference {
    pub reference: Reference,
    pub contributors: Vec<ContributorMention>,
}

/// An external bibliographic source.
#[async_trait::async_trait]
pub trait Harvester: std::fmt::Debug + Send + Sync {
    /// The source name, unique across the registry ("hal", "idref", ...).
    fn name(&self) -> &'static str;

    /// Semantic version stamped on every reference this harvester
    /// produces.
    fn version(&self) -> &'static str;

    /// Whether this harvester can query anything for the person
    /// (typically: the person carries the identifier it queries by).
    fn is_relevant(&self, person: &Person) -> bool;

    /// Fetch the person's current document set from the source.
    async fn fetch(&self, person: &Person) -> HarvestResult<Vec<RawDocument>>;

    /// Normalize one raw document into a canonical reference.
    ///
    /// A per-record failure here is skipped with a warning by the
    /// harvesting job; it does not fail the run.
    fn normalize(
        &self,
        person: &Person,
        document: &RawDocument,
    ) -> HarvestResult<NormalizedReference>;
}

/// Name-keyed lookup table of registered harvesters.
#[derive(Default, Clone)]
pub struct HarvesterRegistry {
    harvesters: HashMap<&'static str, Arc<dyn Harvester>>,
}

impl HarvesterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a harvester under its own name. Replaces any previous
    /// harvester with the same name.
    pub fn register(&mut self, harvester: Arc<dyn Harvester>) {
        self.harvesters.insert(harvester.name(), harvester);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Harvester>> {
        self.harvesters.get(name).map(Arc::clone)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.harvesters.contains_key(name)
    }

    /// All registered source names, sorted for stable output.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.harvesters.keys().copied().collect();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.harvesters.is_empty()
    }
}

impl std::fmt::Debug for HarvesterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HarvesterRegistry")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarvestError;

    #[derive(Debug)]
    struct NullHarvester(&'static str);

    #[async_trait::async_trait]
    impl Harvester for NullHarvester {
        fn name(&self) -> &'static str {
            self.0
        }

        fn version(&self) -> &'static str {
            "0.0.0"
        }

        fn is_relevant(&self, _person: &Person) -> bool {
            true
        }

        async fn fetch(&self, _person: &Person) -> HarvestResult<Vec<RawDocument>> {
            Ok(Vec::new())
        }

        fn normalize(
            &self,
            _person: &Person,
            _document: &RawDocument,
        ) -> HarvestResult<NormalizedReference> {
            Err(HarvestError::Parse {
                source_name: self.0.to_string(),
                message: "null harvester has no documents".to_string(),
            })
        }
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = HarvesterRegistry::new();
        registry.register(Arc::new(NullHarvester("hal")));
        registry.register(Arc::new(NullHarvester("idref")));

        assert!(registry.contains("hal"));
        assert!(!registry.contains("scopus"));
        assert_eq!(registry.names(), vec!["hal", "idref"]);
    }

    #[test]
    fn test_registry_replaces_same_name() {
        let mut registry = HarvesterRegistry::new();
        registry.register(Arc::new(NullHarvester("hal")));
        registry.register(Arc::new(NullHarvester("hal")));
        assert_eq!(registry.names().len(), 1);
    }
}

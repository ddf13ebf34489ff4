use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::ContributorId;

/// A person-as-author record, scoped to one source's identifier space.
///
/// A contributor is keyed by `(source, source_identifier)` when the
/// source supplies an identifier; name-only contributors have no
/// stable key and are re-created at every harvest. Contributors are
/// permanent: rows are never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contributor {
    pub id: ContributorId,
    pub source: String,
    pub source_identifier: Option<String>,

    /// The most recently seen name form.
    pub name: String,

    /// Distinct previously seen names, excluding the current one.
    /// Set semantics: deduplicated, order not significant.
    pub name_variants: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contributor {
    #[must_use]
    pub fn new(
        source: impl Into<String>,
        source_identifier: Option<String>,
        name: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ContributorId::new(),
            source: source.into(),
            source_identifier,
            name: name.into(),
            name_variants: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Record a newly seen name form.
    ///
    /// If `name` differs from the current name, the superseded name is
    /// folded into `name_variants` and `name` becomes current. Returns
    /// `true` when the contributor changed.
    pub fn record_name(&mut self, name: &str) -> bool {
        if self.name == name {
            return false;
        }
        let superseded = std::mem::replace(&mut self.name, name.to_string());
        if !self.name_variants.contains(&superseded) {
            self.name_variants.push(superseded);
        }
        // The new current name must not linger as a variant of itself.
        self.name_variants.retain(|v| v != name);
        self.updated_at = Utc::now();
        true
    }
}

/// The join of a reference and a contributor, with a role and a rank.
///
/// Ranks are zero-based, unique per reference, and reflect the order
/// contributors appear in the source document. The same contributor
/// may appear more than once on one reference only with distinct
/// roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub contributor_id: ContributorId,

    /// The contributor's name at the time of this harvest.
    pub contributor_name: String,

    /// Free-form role code, source vocabulary.
    pub role: String,

    pub rank: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_name_folds_variant() {
        let mut contributor = Contributor::new("hal", Some("169647".to_string()), "A. Buccheri");
        assert!(contributor.record_name("Alessandro Buccheri"));

        assert_eq!(contributor.name, "Alessandro Buccheri");
        assert_eq!(contributor.name_variants, vec!["A. Buccheri".to_string()]);
    }

    #[test]
    fn test_record_name_unchanged() {
        let mut contributor = Contributor::new("hal", Some("169647".to_string()), "A. Buccheri");
        assert!(!contributor.record_name("A. Buccheri"));
        assert!(contributor.name_variants.is_empty());
    }

    #[test]
    fn test_record_name_deduplicates_variants() {
        let mut contributor = Contributor::new("hal", None, "A. Buccheri");
        contributor.record_name("Alessandro Buccheri");
        contributor.record_name("A. Buccheri");
        contributor.record_name("Alessandro Buccheri");

        assert_eq!(contributor.name, "Alessandro Buccheri");
        assert_eq!(contributor.name_variants, vec!["A. Buccheri".to_string()]);
    }

    #[test]
    fn test_variant_never_equals_current_name() {
        let mut contributor = Contributor::new("hal", None, "X");
        contributor.record_name("Y");
        contributor.record_name("X");
        assert!(!contributor.name_variants.contains(&contributor.name));
    }
}

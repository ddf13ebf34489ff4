use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::contributor::Contribution;
use crate::model::ids::{PersonId, ReferenceId};

/// A title literal with its language tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Title {
    pub value: String,
    pub language: Option<String>,
}

/// An abstract literal with its language tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Abstract {
    pub value: String,
    pub language: Option<String>,
}

/// A concrete embodiment of the reference at the source: a landing
/// page, an optional direct download, and any additional files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifestation {
    pub page: String,
    pub download_url: Option<String>,
    pub additional_files: Vec<String>,
}

impl Manifestation {
    #[must_use]
    pub fn new(page: impl Into<String>) -> Self {
        Self {
            page: page.into(),
            download_url: None,
            additional_files: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_download_url(mut self, url: impl Into<String>) -> Self {
        self.download_url = Some(url.into());
        self
    }
}

/// A bibliographic work as known from one source.
///
/// Keyed by `(source, source_identifier)`, unique per source. Created
/// on first successful harvest; later harvests leave it unchanged,
/// update its mutable fields in place, or flag it deleted when the
/// source's current document set no longer contains it. Never hard
/// deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub id: ReferenceId,
    pub source: String,
    pub source_identifier: String,

    /// The person this reference was harvested for.
    pub person_id: PersonId,

    /// Version of the harvester that produced the current state.
    pub harvester_version: String,

    pub titles: Vec<Title>,
    pub abstracts: Vec<Abstract>,
    pub manifestations: Vec<Manifestation>,
    pub document_type: Option<String>,

    /// Ordered by rank; fully recomputed at each harvest.
    pub contributions: Vec<Contribution>,

    pub deleted: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reference {
    #[must_use]
    pub fn new(
        source: impl Into<String>,
        source_identifier: impl Into<String>,
        person_id: PersonId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ReferenceId::new(),
            source: source.into(),
            source_identifier: source_identifier.into(),
            person_id,
            harvester_version: "0.0.0".to_string(),
            titles: Vec::new(),
            abstracts: Vec::new(),
            manifestations: Vec::new(),
            document_type: None,
            contributions: Vec::new(),
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn with_title(mut self, value: impl Into<String>, language: Option<&str>) -> Self {
        self.titles.push(Title {
            value: value.into(),
            language: language.map(String::from),
        });
        self
    }

    #[must_use]
    pub fn with_abstract(mut self, value: impl Into<String>, language: Option<&str>) -> Self {
        self.abstracts.push(Abstract {
            value: value.into(),
            language: language.map(String::from),
        });
        self
    }

    #[must_use]
    pub fn with_manifestation(mut self, manifestation: Manifestation) -> Self {
        self.manifestations.push(manifestation);
        self
    }

    #[must_use]
    pub fn with_document_type(mut self, document_type: impl Into<String>) -> Self {
        self.document_type = Some(document_type.into());
        self
    }

    #[must_use]
    pub fn with_harvester_version(mut self, version: impl Into<String>) -> Self {
        self.harvester_version = version.into();
        self
    }

    /// Whether the mutable fields of `self` and `other` are identical.
    ///
    /// Compares exactly the fields a harvest may change: titles,
    /// abstracts, manifestations, document type, and contributions by
    /// `(name, role, rank)`. Ids and timestamps are excluded, as are
    /// the resolved contributor row ids: a name-only contributor
    /// resolves to a fresh row every run, and that alone must not
    /// register as a content change.
    #[must_use]
    pub fn content_eq(&self, other: &Self) -> bool {
        self.titles == other.titles
            && self.abstracts == other.abstracts
            && self.manifestations == other.manifestations
            && self.document_type == other.document_type
            && self.contributions.len() == other.contributions.len()
            && self
                .contributions
                .iter()
                .zip(&other.contributions)
                .all(|(a, b)| {
                    a.contributor_name == b.contributor_name
                        && a.role == b.role
                        && a.rank == b.rank
                })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_reference() -> Reference {
        Reference::new("hal", "hal-0001", PersonId::new())
            .with_title("Les inscriptions de Delphes", Some("fr"))
            .with_document_type("ART")
            .with_manifestation(
                Manifestation::new("https://hal.science/hal-0001")
                    .with_download_url("https://hal.science/hal-0001/document"),
            )
    }

    #[test]
    fn test_reference_builder() {
        let reference = sample_reference();
        assert_eq!(reference.titles.len(), 1);
        assert_eq!(reference.document_type.as_deref(), Some("ART"));
        assert!(!reference.deleted);
    }

    #[test]
    fn test_content_eq_ignores_identity() {
        let a = sample_reference();
        let mut b = sample_reference();
        b.id = ReferenceId::new();
        b.created_at = Utc::now();
        assert!(a.content_eq(&b));
    }

    #[test]
    fn test_content_eq_ignores_contributor_row_ids() {
        use crate::model::{Contribution, ContributorId};

        let contribution = |contributor_id| Contribution {
            contributor_id,
            contributor_name: "Jeanne Mas".to_string(),
            role: "aut".to_string(),
            rank: 0,
        };

        let mut a = sample_reference();
        a.contributions.push(contribution(ContributorId::new()));
        let mut b = sample_reference();
        b.contributions.push(contribution(ContributorId::new()));
        assert!(a.content_eq(&b));

        b.contributions[0].role = "edt".to_string();
        assert!(!a.content_eq(&b));
    }

    #[test]
    fn test_content_eq_detects_title_change() {
        let a = sample_reference();
        let mut b = sample_reference();
        b.titles[0].value = "Les inscriptions de Délos".to_string();
        assert!(!a.content_eq(&b));
    }
}

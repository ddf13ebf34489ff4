use serde::{Deserialize, Serialize};

use crate::model::ids::PersonId;

/// The kind of identifier a source uses to designate a person.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    /// HAL author identifier (`idHal`).
    IdHal,
    /// IdRef authority identifier.
    Idref,
    /// ORCID.
    Orcid,
    /// Institution-local identifier.
    Local,
}

impl IdentifierKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::IdHal => "id_hal",
            Self::Idref => "idref",
            Self::Orcid => "orcid",
            Self::Local => "local",
        }
    }
}

impl std::str::FromStr for IdentifierKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "id_hal" | "idhal" => Ok(Self::IdHal),
            "idref" => Ok(Self::Idref),
            "orcid" => Ok(Self::Orcid),
            "local" => Ok(Self::Local),
            other => Err(format!("unknown identifier kind: {other}")),
        }
    }
}

/// One `(kind, value)` identifier pair attached to a person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonIdentifier {
    pub kind: IdentifierKind,
    pub value: String,
}

/// The subject of a retrieval.
///
/// Immutable for the duration of one retrieval: harvesters read the
/// display name and identifiers but never write back to the person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub display_name: String,
    pub identifiers: Vec<PersonIdentifier>,
}

impl Person {
    #[must_use]
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            id: PersonId::new(),
            display_name: display_name.into(),
            identifiers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_identifier(mut self, kind: IdentifierKind, value: impl Into<String>) -> Self {
        self.identifiers.push(PersonIdentifier {
            kind,
            value: value.into(),
        });
        self
    }

    /// The person's identifier of the given kind, if any.
    #[must_use]
    pub fn identifier(&self, kind: IdentifierKind) -> Option<&str> {
        self.identifiers
            .iter()
            .find(|i| i.kind == kind)
            .map(|i| i.value.as_str())
    }
}

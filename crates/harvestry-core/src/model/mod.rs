pub mod contributor;
pub mod event;
pub mod harvesting;
pub mod ids;
pub mod person;
pub mod reference;
pub mod retrieval;

pub use contributor::{Contribution, Contributor};
pub use event::{EventKind, ReferenceEvent};
pub use harvesting::{Harvesting, HarvestingState};
pub use ids::{
    ContributorId, HarvestingId, PersonId, ReferenceEventId, ReferenceId, RetrievalId,
};
pub use person::{IdentifierKind, Person, PersonIdentifier};
pub use reference::{Abstract, Manifestation, Reference, Title};
pub use retrieval::Retrieval;

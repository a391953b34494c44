pub mod branch;
pub mod component;
pub mod concept;
pub mod constants;
pub mod description;
pub mod query_concept;
pub mod refset;
pub mod relationship;

pub use branch::Branch;
pub use component::{ReleaseDetails, SnomedComponent, Timepoint, VersionMeta};
pub use concept::{Axiom, Concept};
pub use description::Description;
pub use query_concept::QueryConcept;
pub use refset::ReferenceSetMember;
pub use relationship::Relationship;

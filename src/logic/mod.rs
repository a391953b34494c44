pub mod axioms;
pub mod concepts;
pub mod definition_status;
pub mod identifiers;
pub mod members;
pub mod semantic_index;
pub mod updates;
pub mod validate;

pub use concepts::ConceptService;
pub use identifiers::{ComponentType, IdentifierService};
pub use members::ReferenceSetMemberService;
pub use semantic_index::Form;
pub use updates::PersistedComponents;

//! Snowstorm core: a versioned SNOMED CT component store with branch
//! version control, a concept update pipeline, a transitive-closure
//! semantic index, and ECL evaluation over it.

pub mod cancel;
pub mod config;
pub mod ecl;
pub mod error;
pub mod logic;
pub mod model;
pub mod store;
pub mod vc;

pub use cancel::CancellationToken;
pub use config::AppConfig;
pub use ecl::EclQueryService;
pub use error::{Result, TerminologyError};
pub use logic::{ConceptService, IdentifierService, ReferenceSetMemberService};
pub use model::*;
pub use store::{MemoryStore, Page, PageRequest};
pub use vc::{BranchCriteria, BranchMergeService, BranchService, Commit};

use std::sync::Arc;

/// Wire up the in-memory edition of the terminology server core.
pub fn new_in_memory() -> (Arc<MemoryStore>, BranchService, ConceptService<MemoryStore>) {
    // Initialize logging once; later calls are ignored.
    let _ = env_logger::builder().is_test(false).try_init();

    let config = AppConfig::default();
    let store = Arc::new(MemoryStore::new());
    let registry = BranchService::new();
    let identifiers = Arc::new(IdentifierService::new(config.identifier.namespace));
    let concepts = ConceptService::new(Arc::clone(&store), registry.clone(), identifiers);
    (store, registry, concepts)
}

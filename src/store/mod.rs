pub mod index;
pub mod memory;
pub mod traits;

pub use index::{BoolQuery, IndexDocument, IndexValue, Page, PageRequest, Query, SearchIndex};
pub use memory::MemoryStore;
pub use traits::*;

pub mod ast;
pub mod executor;
pub mod parser;

pub use ast::{EclAttribute, ExpressionConstraint, FocusConcept, Operator, SubExpressionConstraint};
pub use executor::EclQueryService;
pub use parser::parse;

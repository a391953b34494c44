//! The post-parse ECL contract: the AST shape the executor consumes.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    DescendantOf,
    DescendantOrSelfOf,
    AncestorOf,
    AncestorOrSelfOf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FocusConcept {
    Id(String),
    Wildcard,
}

/// `[op] [^] focus` — member-of (`^`) resolves a reference set to its
/// referenced components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubExpressionConstraint {
    pub operator: Option<Operator>,
    pub member_of: bool,
    pub focus: FocusConcept,
}

impl SubExpressionConstraint {
    pub fn self_of(concept_id: &str) -> Self {
        Self {
            operator: None,
            member_of: false,
            focus: FocusConcept::Id(concept_id.to_string()),
        }
    }
}

/// Single attribute refinement, expression comparison only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EclAttribute {
    pub name: SubExpressionConstraint,
    pub value: SubExpressionConstraint,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpressionConstraint {
    Sub(SubExpressionConstraint),
    Refined {
        sub: SubExpressionConstraint,
        attribute: EclAttribute,
    },
}

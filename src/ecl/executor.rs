//! ECL execution: compiles the AST into semantic-index and relationship
//! lookups, intersects focus with refinement, and pages the result.

use std::collections::BTreeSet;

use crate::cancel::CancellationToken;
use crate::ecl::ast::{
    EclAttribute, ExpressionConstraint, FocusConcept, Operator, SubExpressionConstraint,
};
use crate::ecl::parser;
use crate::error::{Result, TerminologyError};
use crate::model::constants;
use crate::store::index::{partition_clauses, Page, PageRequest, CLAUSE_LIMIT};
use crate::store::traits::{MemberSearchRequest, RelationshipSearch, Store};
use crate::vc::{BranchCriteria, BranchService};

/// Resolved focus: either every concept on the branch or an explicit set.
enum CandidateSet {
    All,
    Ids(BTreeSet<u64>),
}

pub struct EclQueryService;

impl EclQueryService {
    /// Evaluate an ECL expression on a branch. Results are concept ids in
    /// ascending numeric order; offsets produce disjoint pages.
    pub async fn execute<S: Store>(
        store: &S,
        registry: &BranchService,
        path: &str,
        ecl: &str,
        stated: bool,
        page: PageRequest,
        cancel: &CancellationToken,
    ) -> Result<Page<String>> {
        let constraint = parser::parse(ecl)?;
        let criteria = BranchCriteria::for_branch(registry, path)?;

        let candidates = match &constraint {
            ExpressionConstraint::Sub(sub) => {
                Self::resolve_sub(store, &criteria, sub, stated, cancel).await?
            }
            ExpressionConstraint::Refined { sub, attribute } => {
                let focus = Self::resolve_sub(store, &criteria, sub, stated, cancel).await?;
                Self::apply_refinement(store, &criteria, focus, attribute, stated, cancel).await?
            }
        };

        let ids = match candidates {
            CandidateSet::Ids(ids) => ids,
            CandidateSet::All => Self::all_concepts(store, &criteria, stated).await?,
        };

        let total = ids.len();
        let items: Vec<String> = ids
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .map(|id| id.to_string())
            .collect();
        Ok(Page {
            items,
            total,
            offset: page.offset,
            limit: page.limit,
        })
    }

    async fn all_concepts<S: Store>(
        store: &S,
        criteria: &BranchCriteria,
        stated: bool,
    ) -> Result<BTreeSet<u64>> {
        Ok(store
            .stream_query_concepts(stated, criteria)
            .await?
            .into_iter()
            .map(|row| row.concept_id)
            .collect())
    }

    async fn resolve_sub<S: Store>(
        store: &S,
        criteria: &BranchCriteria,
        sub: &SubExpressionConstraint,
        stated: bool,
        cancel: &CancellationToken,
    ) -> Result<CandidateSet> {
        cancel.check()?;
        if sub.member_of {
            return Self::resolve_member_of(store, criteria, sub).await;
        }
        let concept_id = match &sub.focus {
            FocusConcept::Wildcard => return Ok(CandidateSet::All),
            FocusConcept::Id(id) => id
                .parse::<u64>()
                .map_err(|_| TerminologyError::InvalidArgument(format!("Invalid SCTID '{}'", id)))?,
        };

        let ids = match sub.operator {
            None => BTreeSet::from([concept_id]),
            Some(Operator::DescendantOf) => store
                .concepts_with_ancestor(concept_id, stated, criteria)
                .await?
                .into_iter()
                .collect(),
            Some(Operator::DescendantOrSelfOf) => {
                let mut ids: BTreeSet<u64> = store
                    .concepts_with_ancestor(concept_id, stated, criteria)
                    .await?
                    .into_iter()
                    .collect();
                ids.insert(concept_id);
                ids
            }
            Some(Operator::AncestorOf) => Self::ancestors_of(store, criteria, concept_id, stated)
                .await?
                .into_iter()
                .collect(),
            Some(Operator::AncestorOrSelfOf) => {
                let mut ids = Self::ancestors_of(store, criteria, concept_id, stated).await?;
                ids.insert(concept_id);
                ids
            }
        };
        Ok(CandidateSet::Ids(ids))
    }

    async fn ancestors_of<S: Store>(
        store: &S,
        criteria: &BranchCriteria,
        concept_id: u64,
        stated: bool,
    ) -> Result<BTreeSet<u64>> {
        let rows = store
            .find_query_concepts(&[concept_id], stated, criteria)
            .await?;
        Ok(rows
            .into_iter()
            .next()
            .map(|row| row.ancestors.into_iter().collect())
            .unwrap_or_default())
    }

    /// `^ refsetId`: the active members' referenced components.
    async fn resolve_member_of<S: Store>(
        store: &S,
        criteria: &BranchCriteria,
        sub: &SubExpressionConstraint,
    ) -> Result<CandidateSet> {
        let refset_id = match &sub.focus {
            FocusConcept::Id(id) => id.clone(),
            FocusConcept::Wildcard => {
                return Err(TerminologyError::Unsupported(
                    "MemberOf a wildcard reference set is not supported.".to_string(),
                ))
            }
        };
        if sub.operator.is_some() {
            return Err(TerminologyError::Unsupported(
                "A constraint operator combined with MemberOf is not supported.".to_string(),
            ));
        }
        let search = MemberSearchRequest::active_in_refset(&refset_id);
        let members = store.stream_members(&search, criteria).await?;
        Ok(CandidateSet::Ids(
            members
                .into_iter()
                .filter_map(|m| m.referenced_component_id.parse().ok())
                .collect(),
        ))
    }

    /// Keep candidates with an active relationship whose type and
    /// destination resolve from the attribute name and value.
    async fn apply_refinement<S: Store>(
        store: &S,
        criteria: &BranchCriteria,
        candidates: CandidateSet,
        attribute: &EclAttribute,
        stated: bool,
        cancel: &CancellationToken,
    ) -> Result<CandidateSet> {
        let types = Self::resolve_sub(store, criteria, &attribute.name, stated, cancel).await?;
        let values = Self::resolve_sub(store, criteria, &attribute.value, stated, cancel).await?;

        let type_ids = match types {
            CandidateSet::All => None,
            CandidateSet::Ids(ids) => Some(ids.iter().map(u64::to_string).collect::<Vec<_>>()),
        };
        let destination_ids = match values {
            CandidateSet::All => None,
            CandidateSet::Ids(ids) => Some(ids.iter().map(u64::to_string).collect::<Vec<_>>()),
        };
        let characteristic_type_id = if stated {
            constants::STATED_RELATIONSHIP
        } else {
            constants::INFERRED_RELATIONSHIP
        };

        let mut matching_sources: BTreeSet<u64> = BTreeSet::new();
        match &candidates {
            CandidateSet::All => {
                cancel.check()?;
                let search = RelationshipSearch {
                    active: Some(true),
                    type_ids: type_ids.clone(),
                    destination_ids: destination_ids.clone(),
                    characteristic_type_id: Some(characteristic_type_id.to_string()),
                    ..Default::default()
                };
                for relationship in store.find_relationships(&search, criteria).await? {
                    if let Ok(source) = relationship.source_id.parse() {
                        matching_sources.insert(source);
                    }
                }
            }
            CandidateSet::Ids(ids) => {
                let source_strings: Vec<String> = ids.iter().map(u64::to_string).collect();
                for chunk in partition_clauses(&source_strings, CLAUSE_LIMIT) {
                    cancel.check()?;
                    let search = RelationshipSearch {
                        active: Some(true),
                        source_ids: Some(chunk),
                        type_ids: type_ids.clone(),
                        destination_ids: destination_ids.clone(),
                        characteristic_type_id: Some(characteristic_type_id.to_string()),
                        ..Default::default()
                    };
                    for relationship in store.find_relationships(&search, criteria).await? {
                        if let Ok(source) = relationship.source_id.parse() {
                            matching_sources.insert(source);
                        }
                    }
                }
            }
        }

        Ok(match candidates {
            CandidateSet::All => CandidateSet::Ids(matching_sources),
            CandidateSet::Ids(ids) => {
                CandidateSet::Ids(ids.intersection(&matching_sources).copied().collect())
            }
        })
    }
}

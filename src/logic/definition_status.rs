//! Keeps `definitionStatusId` coupled to the OWL axioms: a concept is fully
//! defined exactly when one of its active axiom members is an
//! `EquivalentClasses` expression.

use log::debug;
use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::model::constants;
use crate::model::refset::fields;
use crate::model::SnomedComponent;
use crate::store::index::{partition_clauses, CLAUSE_LIMIT};
use crate::store::traits::{MemberSearchRequest, Store};
use crate::vc::{BranchCriteria, BranchService, Commit};

/// Recompute the definition status of the given concepts from their active
/// OWL members, within the open commit. Writes a new concept version only
/// when the stored value differs.
pub async fn update_within_commit<S: Store>(
    store: &S,
    registry: &BranchService,
    commit: &Commit,
    concept_ids: &HashSet<String>,
) -> Result<usize> {
    if concept_ids.is_empty() {
        return Ok(0);
    }
    let criteria = BranchCriteria::including_open_commit(registry, commit)?;
    let ids: Vec<String> = concept_ids.iter().cloned().collect();

    let mut has_equivalent_axiom: HashMap<String, bool> = HashMap::new();
    for chunk in partition_clauses(&ids, CLAUSE_LIMIT) {
        let search = MemberSearchRequest {
            active: Some(true),
            refset_id: Some(constants::OWL_AXIOM_REFERENCE_SET.to_string()),
            referenced_component_ids: Some(chunk),
            ..Default::default()
        };
        for member in store.stream_members(&search, &criteria).await? {
            let equivalent = member
                .additional_field(fields::OWL_EXPRESSION)
                .map_or(false, |e| e.trim_start().starts_with("EquivalentClasses"));
            let entry = has_equivalent_axiom
                .entry(member.referenced_component_id.clone())
                .or_insert(false);
            *entry = *entry || equivalent;
        }
    }

    let mut updated = Vec::new();
    for chunk in partition_clauses(&ids, CLAUSE_LIMIT) {
        for mut concept in store.find_concepts(&chunk, &criteria).await? {
            let computed = if has_equivalent_axiom
                .get(&concept.concept_id)
                .copied()
                .unwrap_or(false)
            {
                constants::FULLY_DEFINED
            } else {
                constants::PRIMITIVE
            };
            if concept.definition_status_id != computed {
                debug!(
                    "Definition status of {} -> {}",
                    concept.concept_id, computed
                );
                concept.definition_status_id = computed.to_string();
                concept.mark_changed();
                concept.update_effective_time();
                updated.push(concept);
            }
        }
    }
    let count = updated.len();
    store.save_concepts(updated, commit).await?;
    Ok(count)
}

//! Transitive-closure maintenance: keeps one QueryConcept row per
//! (concept, form) per branch, updated incrementally at commit time and
//! rebuildable from scratch.

use log::{debug, warn};
use roaring::RoaringTreemap;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::cancel::CancellationToken;
use crate::error::{Result, TerminologyError};
use crate::logic::axioms;
use crate::model::constants;
use crate::model::refset::fields;
use crate::model::{QueryConcept, SnomedComponent};
use crate::store::traits::{MemberSearchRequest, RelationshipSearch, Store};
use crate::store::index::{partition_clauses, CLAUSE_LIMIT};
use crate::vc::{BranchCriteria, BranchService, Commit};

/// Form selector. Stated parents come from class axioms; inferred parents
/// from inferred-characteristic ISA relationship rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Form {
    Stated,
    Inferred,
}

impl Form {
    pub fn is_stated(self) -> bool {
        matches!(self, Form::Stated)
    }

    pub fn both() -> [Form; 2] {
        [Form::Stated, Form::Inferred]
    }
}

/// Incrementally update the closure for one form within an open commit.
/// `touched` is the set of concepts whose ISA footprint may have changed.
/// Returns the number of rows written.
pub async fn update_transitive_closure<S: Store>(
    store: &S,
    registry: &BranchService,
    commit: &Commit,
    touched: &HashSet<u64>,
    form: Form,
) -> Result<usize> {
    if touched.is_empty() {
        return Ok(0);
    }
    let criteria = BranchCriteria::including_open_commit(registry, commit)?;

    // Dirty set plus every known descendant of it.
    let mut dirty = RoaringTreemap::new();
    for concept_id in touched {
        dirty.insert(*concept_id);
        for descendant in store
            .concepts_with_ancestor(*concept_id, form.is_stated(), &criteria)
            .await?
        {
            dirty.insert(descendant);
        }
    }

    let dirty_ids: Vec<u64> = dirty.iter().collect();
    let parents = load_parents(store, &criteria, &dirty_ids, form).await?;
    let active = load_active_flags(store, &criteria, &dirty_ids).await?;

    // Ancestor sets of clean concepts referenced as parents.
    let mut clean_parents: BTreeSet<u64> = BTreeSet::new();
    for parent_set in parents.values() {
        for parent in parent_set {
            if !dirty.contains(*parent) {
                clean_parents.insert(*parent);
            }
        }
    }
    let clean_rows = store
        .find_query_concepts(
            &clean_parents.iter().copied().collect::<Vec<u64>>(),
            form.is_stated(),
            &criteria,
        )
        .await?;
    let mut ancestors_memo: HashMap<u64, BTreeSet<u64>> = clean_rows
        .into_iter()
        .map(|row| {
            let mut reachable = row.ancestors.clone();
            reachable.insert(row.concept_id);
            (row.concept_id, reachable)
        })
        .collect();

    let existing_rows: HashMap<u64, QueryConcept> = store
        .find_query_concepts(&dirty_ids, form.is_stated(), &criteria)
        .await?
        .into_iter()
        .map(|row| (row.concept_id, row))
        .collect();

    let mut rows_to_save = Vec::new();
    for concept_id in &dirty_ids {
        let is_active = active.get(concept_id).copied().unwrap_or(false);
        if !is_active {
            // Inactive or deleted concepts leave the index.
            if let Some(existing) = existing_rows.get(concept_id) {
                let mut tombstone = existing.clone();
                tombstone.meta.deleted = true;
                rows_to_save.push(tombstone);
            }
            continue;
        }
        let own_parents = parents.get(concept_id).cloned().unwrap_or_default();
        let mut ancestors = BTreeSet::new();
        for parent in &own_parents {
            ancestors.insert(*parent);
            let reachable =
                reachable_through(*parent, &parents, &dirty, &mut ancestors_memo, &mut Vec::new())?;
            ancestors.extend(reachable);
        }
        if ancestors.contains(concept_id) {
            return Err(TerminologyError::CycleDetected(
                cycle_members(*concept_id, &parents, &dirty),
            ));
        }
        let row = QueryConcept::new(*concept_id, own_parents, ancestors, form.is_stated());
        let unchanged = existing_rows.get(concept_id).map_or(false, |existing| {
            existing.parents == row.parents && existing.ancestors == row.ancestors
        });
        if !unchanged {
            rows_to_save.push(row);
        }
    }

    let written = rows_to_save.len();
    store.save_query_concepts(rows_to_save, commit).await?;
    debug!(
        "Semantic index ({:?}) updated {} row(s) on {}",
        form,
        written,
        commit.path()
    );
    Ok(written)
}

/// Nodes reachable from `node` (inclusive) following dirty parents and
/// indexed ancestors of clean ones.
fn reachable_through(
    node: u64,
    parents: &HashMap<u64, BTreeSet<u64>>,
    dirty: &RoaringTreemap,
    memo: &mut HashMap<u64, BTreeSet<u64>>,
    visiting: &mut Vec<u64>,
) -> Result<BTreeSet<u64>> {
    if let Some(cached) = memo.get(&node) {
        return Ok(cached.clone());
    }
    if !dirty.contains(node) {
        // Clean and unindexed: a parent created outside the index, treated
        // as a root.
        let mut only_self = BTreeSet::new();
        only_self.insert(node);
        memo.insert(node, only_self.clone());
        return Ok(only_self);
    }
    if visiting.contains(&node) {
        let mut cycle = visiting.clone();
        cycle.push(node);
        return Err(TerminologyError::CycleDetected(cycle));
    }
    visiting.push(node);
    let mut reachable = BTreeSet::new();
    reachable.insert(node);
    if let Some(node_parents) = parents.get(&node) {
        for parent in node_parents {
            reachable.extend(reachable_through(*parent, parents, dirty, memo, visiting)?);
        }
    }
    visiting.pop();
    memo.insert(node, reachable.clone());
    Ok(reachable)
}

fn cycle_members(
    start: u64,
    parents: &HashMap<u64, BTreeSet<u64>>,
    dirty: &RoaringTreemap,
) -> Vec<u64> {
    // Best-effort SCC listing: nodes reachable from `start` that can reach
    // it back through the dirty set.
    let mut members = vec![start];
    let mut frontier = vec![start];
    let mut seen = BTreeSet::new();
    seen.insert(start);
    while let Some(node) = frontier.pop() {
        if let Some(node_parents) = parents.get(&node) {
            for parent in node_parents {
                if dirty.contains(*parent) && seen.insert(*parent) {
                    members.push(*parent);
                    frontier.push(*parent);
                }
            }
        }
    }
    members.sort_unstable();
    members
}

/// Rebuild the closure for one form on a branch from scratch, within its
/// own commit.
pub async fn rebuild<S: Store>(
    store: &S,
    registry: &BranchService,
    path: &str,
    form: Form,
    cancel: &CancellationToken,
) -> Result<usize> {
    let commit = registry.open_commit(path)?;
    store
        .remove_query_concept_rows(path, form.is_stated())
        .await?;

    let result = rebuild_within_commit(store, registry, &commit, form, cancel).await;
    match result {
        Ok(written) => {
            commit.mark_successful()?;
            Ok(written)
        }
        Err(err) => {
            store.rollback_commit(path, commit.timepoint()).await?;
            commit.mark_failed();
            Err(err)
        }
    }
}

async fn rebuild_within_commit<S: Store>(
    store: &S,
    registry: &BranchService,
    commit: &Commit,
    form: Form,
    cancel: &CancellationToken,
) -> Result<usize> {
    let criteria = BranchCriteria::including_open_commit(registry, commit)?;
    let concepts = store
        .search_concepts(&criteria, crate::store::index::PageRequest::of(0, usize::MAX))
        .await?;
    let concept_ids: Vec<u64> = concepts
        .items
        .iter()
        .filter(|c| c.active)
        .filter_map(|c| c.concept_id.parse().ok())
        .collect();

    let parents = load_parents(store, &criteria, &concept_ids, form).await?;

    // Roots first: repeatedly peel concepts whose parents are all resolved.
    let mut ancestors: HashMap<u64, BTreeSet<u64>> = HashMap::new();
    let mut remaining: BTreeSet<u64> = concept_ids.iter().copied().collect();
    let mut rows = Vec::new();
    while !remaining.is_empty() {
        cancel.check()?;
        let ready: Vec<u64> = remaining
            .iter()
            .copied()
            .filter(|id| {
                parents.get(id).map_or(true, |ps| {
                    ps.iter().all(|p| !remaining.contains(p))
                })
            })
            .collect();
        if ready.is_empty() {
            return Err(TerminologyError::CycleDetected(
                remaining.iter().copied().collect(),
            ));
        }
        for concept_id in ready {
            remaining.remove(&concept_id);
            let own_parents = parents.get(&concept_id).cloned().unwrap_or_default();
            let mut ancestor_set = BTreeSet::new();
            for parent in &own_parents {
                ancestor_set.insert(*parent);
                if let Some(parent_ancestors) = ancestors.get(parent) {
                    ancestor_set.extend(parent_ancestors.iter().copied());
                }
            }
            ancestors.insert(concept_id, ancestor_set.clone());
            rows.push(QueryConcept::new(
                concept_id,
                own_parents,
                ancestor_set,
                form.is_stated(),
            ));
        }
    }

    let written = rows.len();
    store.save_query_concepts(rows, commit).await?;
    Ok(written)
}

/// Authoritative active ISA parents for the given concepts in the given
/// form, chunked to stay under the clause limit.
async fn load_parents<S: Store>(
    store: &S,
    criteria: &BranchCriteria,
    concept_ids: &[u64],
    form: Form,
) -> Result<HashMap<u64, BTreeSet<u64>>> {
    let mut parents: HashMap<u64, BTreeSet<u64>> = HashMap::new();
    match form {
        Form::Stated => {
            let id_strings: Vec<String> = concept_ids.iter().map(u64::to_string).collect();
            for chunk in partition_clauses(&id_strings, CLAUSE_LIMIT) {
                let search = MemberSearchRequest {
                    active: Some(true),
                    refset_id: Some(constants::OWL_AXIOM_REFERENCE_SET.to_string()),
                    referenced_component_ids: Some(chunk),
                    ..Default::default()
                };
                for member in store.stream_members(&search, criteria).await? {
                    let expression = match member.additional_field(fields::OWL_EXPRESSION) {
                        Some(expression) => expression,
                        None => continue,
                    };
                    let parsed = match axioms::from_owl_expression(expression) {
                        Ok(parsed) => parsed,
                        Err(_) => {
                            warn!(
                                "Skipping malformed OWL expression on member {}",
                                member.component_id()
                            );
                            continue;
                        }
                    };
                    if parsed.gci {
                        continue;
                    }
                    let source: u64 = match parsed.referenced_concept_id.parse() {
                        Ok(source) => source,
                        Err(_) => continue,
                    };
                    for relationship in parsed.relationships.iter().filter(|r| r.is_isa()) {
                        if let Ok(destination) = relationship.destination_id.parse() {
                            parents.entry(source).or_default().insert(destination);
                        }
                    }
                }
            }
        }
        Form::Inferred => {
            let id_strings: Vec<String> = concept_ids.iter().map(u64::to_string).collect();
            for chunk in partition_clauses(&id_strings, CLAUSE_LIMIT) {
                let search = RelationshipSearch::active_isa_from_sources(
                    chunk,
                    constants::INFERRED_RELATIONSHIP,
                );
                for relationship in store.find_relationships(&search, criteria).await? {
                    if let (Ok(source), Ok(destination)) = (
                        relationship.source_id.parse(),
                        relationship.destination_id.parse::<u64>(),
                    ) {
                        parents
                            .entry(source)
                            .or_insert_with(BTreeSet::new)
                            .insert(destination);
                    }
                }
            }
        }
    }
    Ok(parents)
}

async fn load_active_flags<S: Store>(
    store: &S,
    criteria: &BranchCriteria,
    concept_ids: &[u64],
) -> Result<HashMap<u64, bool>> {
    let id_strings: Vec<String> = concept_ids.iter().map(u64::to_string).collect();
    let mut flags = HashMap::new();
    for chunk in partition_clauses(&id_strings, CLAUSE_LIMIT) {
        for concept in store.find_concepts(&chunk, criteria).await? {
            if let Ok(id) = concept.concept_id.parse() {
                flags.insert(id, concept.active);
            }
        }
    }
    Ok(flags)
}

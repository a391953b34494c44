//! Rebase and promote: pull parent changes into a child branch, or replay a
//! child's changes onto its parent, with conflict detection over the
//! components both sides wrote.

use log::info;
use std::collections::HashSet;

use crate::error::{Result, TerminologyError};
use crate::logic::semantic_index::{self, Form};
use crate::model::constants;
use crate::model::SnomedComponent;
use crate::store::traits::{
    ChangedComponents, MemberSearchRequest, RelationshipSearch, Store,
};
use crate::vc::branches::BranchService;
use crate::vc::commit::{Commit, CommitKind};
use crate::vc::criteria::BranchCriteria;

pub struct BranchMergeService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ComponentKind {
    Concept,
    Description,
    Relationship,
    Member,
}

impl BranchMergeService {
    /// Rebase `path` onto its parent's current head. Components changed on
    /// both sides since the child's base are conflicts; the only automatic
    /// resolution is a tombstone on one side with the other side byte-equal
    /// to the common base (the deletion wins).
    pub async fn rebase<S: Store>(
        store: &S,
        registry: &BranchService,
        path: &str,
    ) -> Result<()> {
        let branch = registry.find_or_err(path)?;
        let parent_path = branch
            .parent_path()
            .map(str::to_string)
            .ok_or_else(|| {
                TerminologyError::InvalidArgument("MAIN has no parent to rebase onto".to_string())
            })?;
        let parent = registry.find_or_err(&parent_path)?;
        let base = branch.base.unwrap_or(0);

        let child_changes = store.changed_components_since(path, 0).await?;
        let parent_changes = store.changed_components_since(&parent_path, base).await?;

        let child_criteria = BranchCriteria::for_branch(registry, path)?;
        let parent_criteria = BranchCriteria::for_branch(registry, &parent_path)?;
        let base_criteria = BranchCriteria::for_branch_at(registry, &parent_path, base)?;

        let mut conflicts = Vec::new();
        let mut deletions_to_apply = Vec::new();
        for (kind, component_id) in typed_intersection(&child_changes, &parent_changes) {
            let child_state = fetch_state(store, kind, &component_id, &child_criteria).await?;
            let parent_state = fetch_state(store, kind, &component_id, &parent_criteria).await?;
            let base_state = fetch_state(store, kind, &component_id, &base_criteria).await?;
            match (&child_state, &parent_state) {
                (None, None) => {}
                (None, Some(_)) if parent_state == base_state => {
                    // Child deleted, parent untouched in content: the child
                    // tombstone keeps shadowing.
                }
                (Some(_), None) if child_state == base_state => {
                    deletions_to_apply.push((kind, component_id));
                }
                _ => conflicts.push(component_id),
            }
        }
        if !conflicts.is_empty() {
            return Err(TerminologyError::conflict(
                format!(
                    "Rebase of {} conflicts with {} on {} component(s)",
                    path,
                    parent_path,
                    conflicts.len()
                ),
                conflicts,
            ));
        }

        let commit = registry.open_commit_of_kind(path, CommitKind::Rebase)?;
        commit.set_new_base(parent.head);
        let outcome =
            Self::apply_rebase(store, registry, &commit, deletions_to_apply, &parent_path, base)
                .await;
        match outcome {
            Ok(()) => {
                commit.mark_successful()?;
                info!("Rebased {} onto {} at {}", path, parent_path, parent.head);
                Ok(())
            }
            Err(err) => {
                store.rollback_commit(path, commit.timepoint()).await?;
                commit.mark_failed();
                Err(err)
            }
        }
    }

    async fn apply_rebase<S: Store>(
        store: &S,
        registry: &BranchService,
        commit: &Commit,
        deletions: Vec<(ComponentKind, String)>,
        parent_path: &str,
        base: crate::model::Timepoint,
    ) -> Result<()> {
        let criteria = BranchCriteria::including_open_commit(registry, commit)?;
        for (kind, component_id) in deletions {
            apply_child_deletion(store, commit, &criteria, kind, &component_id).await?;
        }

        // The parent's index row churn since the base is exactly the ISA
        // delta the child now inherits.
        for form in Form::both() {
            let touched: HashSet<u64> = store
                .changed_query_concepts_since(parent_path, base, form.is_stated())
                .await?
                .into_iter()
                .collect();
            semantic_index::update_transitive_closure(store, registry, commit, &touched, form)
                .await?;
        }
        Ok(())
    }

    /// Replay the child's changes onto the parent at a new parent timepoint
    /// and empty the child. The child must be rebased first.
    pub async fn promote<S: Store>(
        store: &S,
        registry: &BranchService,
        path: &str,
    ) -> Result<()> {
        let branch = registry.find_or_err(path)?;
        let parent_path = branch
            .parent_path()
            .map(str::to_string)
            .ok_or_else(|| {
                TerminologyError::InvalidArgument("MAIN has no parent to promote to".to_string())
            })?;
        let parent = registry.find_or_err(&parent_path)?;
        if branch.base.map_or(true, |base| base < parent.head) {
            return Err(TerminologyError::conflict(
                format!(
                    "Branch {} is behind {}; rebase before promoting",
                    path, parent_path
                ),
                vec![],
            ));
        }

        let parent_commit = registry.open_commit_of_kind(&parent_path, CommitKind::Promotion)?;
        let child_commit = registry.open_commit(path)?;

        let outcome = Self::apply_promotion(store, registry, &parent_commit, path).await;
        match outcome {
            Ok(()) => {
                parent_commit.mark_successful()?;
                store.remove_branch_rows(path).await?;
                registry.reset_after_promotion(path, parent_commit.timepoint())?;
                child_commit.mark_failed();
                info!("Promoted {} to {}", path, parent_path);
                Ok(())
            }
            Err(err) => {
                store
                    .rollback_commit(&parent_path, parent_commit.timepoint())
                    .await?;
                parent_commit.mark_failed();
                child_commit.mark_failed();
                Err(err)
            }
        }
    }

    async fn apply_promotion<S: Store>(
        store: &S,
        registry: &BranchService,
        parent_commit: &Commit,
        child_path: &str,
    ) -> Result<()> {
        let rows = store.authored_rows(child_path).await?;
        if rows.is_empty() {
            return Ok(());
        }

        let mut touched: HashSet<u64> = rows
            .relationships
            .iter()
            .filter(|r| r.is_isa())
            .filter_map(|r| r.source_id.parse().ok())
            .collect();
        touched.extend(
            rows.members
                .iter()
                .filter(|m| m.refset_id == constants::OWL_AXIOM_REFERENCE_SET)
                .filter_map(|m| m.referenced_component_id.parse::<u64>().ok()),
        );
        touched.extend(rows.concepts.iter().filter_map(|c| c.concept_id.parse::<u64>().ok()));

        let mut concepts = rows.concepts;
        concepts.iter_mut().for_each(|c| c.mark_changed());
        store.save_concepts(concepts, parent_commit).await?;

        let mut descriptions = rows.descriptions;
        descriptions.iter_mut().for_each(|d| d.mark_changed());
        store.save_descriptions(descriptions, parent_commit).await?;

        let mut relationships = rows.relationships;
        relationships.iter_mut().for_each(|r| r.mark_changed());
        store.save_relationships(relationships, parent_commit).await?;

        let mut members = rows.members;
        members.iter_mut().for_each(|m| m.mark_changed());
        store.save_members(members, parent_commit).await?;

        for form in Form::both() {
            semantic_index::update_transitive_closure(
                store,
                registry,
                parent_commit,
                &touched,
                form,
            )
            .await?;
        }
        Ok(())
    }
}

fn typed_intersection(
    left: &ChangedComponents,
    right: &ChangedComponents,
) -> Vec<(ComponentKind, String)> {
    let mut both = Vec::new();
    both.extend(
        left.concepts
            .intersection(&right.concepts)
            .map(|id| (ComponentKind::Concept, id.clone())),
    );
    both.extend(
        left.descriptions
            .intersection(&right.descriptions)
            .map(|id| (ComponentKind::Description, id.clone())),
    );
    both.extend(
        left.relationships
            .intersection(&right.relationships)
            .map(|id| (ComponentKind::Relationship, id.clone())),
    );
    both.extend(
        left.members
            .intersection(&right.members)
            .map(|id| (ComponentKind::Member, id.clone())),
    );
    both.sort_by(|a, b| a.1.cmp(&b.1));
    both
}

/// Released-field fingerprint of the visible version, None when deleted or
/// absent on the view.
async fn fetch_state<S: Store>(
    store: &S,
    kind: ComponentKind,
    component_id: &str,
    criteria: &BranchCriteria,
) -> Result<Option<String>> {
    Ok(match kind {
        ComponentKind::Concept => store
            .find_concept(component_id, criteria)
            .await?
            .map(|c| c.release_hash_input()),
        ComponentKind::Description => store
            .find_descriptions_by_ids(&[component_id.to_string()], criteria)
            .await?
            .pop()
            .map(|d| d.release_hash_input()),
        ComponentKind::Relationship => {
            let search = RelationshipSearch {
                relationship_ids: Some(vec![component_id.to_string()]),
                ..Default::default()
            };
            store
                .find_relationships(&search, criteria)
                .await?
                .pop()
                .map(|r| r.release_hash_input())
        }
        ComponentKind::Member => {
            let search = MemberSearchRequest {
                member_ids: Some(vec![component_id.to_string()]),
                ..Default::default()
            };
            store
                .stream_members(&search, criteria)
                .await?
                .pop()
                .map(|m| m.release_hash_input())
        }
    })
}

/// Drop the child's version of a component the parent deleted.
async fn apply_child_deletion<S: Store>(
    store: &S,
    commit: &Commit,
    criteria: &BranchCriteria,
    kind: ComponentKind,
    component_id: &str,
) -> Result<()> {
    match kind {
        ComponentKind::Concept => {
            if let Some(mut concept) = store.find_concept(component_id, criteria).await? {
                concept.mark_deleted();
                store.save_concepts(vec![concept], commit).await?;
            }
        }
        ComponentKind::Description => {
            if let Some(mut description) = store
                .find_descriptions_by_ids(&[component_id.to_string()], criteria)
                .await?
                .pop()
            {
                description.mark_deleted();
                store.save_descriptions(vec![description], commit).await?;
            }
        }
        ComponentKind::Relationship => {
            let search = RelationshipSearch {
                relationship_ids: Some(vec![component_id.to_string()]),
                ..Default::default()
            };
            if let Some(mut relationship) =
                store.find_relationships(&search, criteria).await?.pop()
            {
                relationship.mark_deleted();
                store.save_relationships(vec![relationship], commit).await?;
            }
        }
        ComponentKind::Member => {
            let search = MemberSearchRequest {
                member_ids: Some(vec![component_id.to_string()]),
                ..Default::default()
            };
            if let Some(mut member) = store.stream_members(&search, criteria).await?.pop() {
                member.mark_deleted();
                store.save_members(vec![member], commit).await?;
            }
        }
    }
    Ok(())
}

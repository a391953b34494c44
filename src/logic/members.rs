//! Reference set member service: member CRUD in self-contained commits and
//! the batch persistence rules shared with the update pipeline.

use log::warn;
use std::collections::{HashMap, HashSet};

use crate::error::{Result, TerminologyError};
use crate::logic::{definition_status, identifiers, semantic_index};
use crate::model::constants;
use crate::model::{ReferenceSetMember, SnomedComponent};
use crate::store::index::{partition_clauses, Page, PageRequest, CLAUSE_LIMIT};
use crate::store::traits::{MemberSearchRequest, Store};
use crate::vc::{BranchCriteria, BranchService, Commit};

pub struct ReferenceSetMemberService;

impl ReferenceSetMemberService {
    pub async fn find_members<S: Store>(
        store: &S,
        registry: &BranchService,
        path: &str,
        search: &MemberSearchRequest,
        page: PageRequest,
    ) -> Result<Page<ReferenceSetMember>> {
        let criteria = BranchCriteria::for_branch(registry, path)?;
        store.find_members(search, &criteria, page).await
    }

    pub async fn find_member<S: Store>(
        store: &S,
        registry: &BranchService,
        path: &str,
        uuid: &str,
    ) -> Result<Option<ReferenceSetMember>> {
        let criteria = BranchCriteria::for_branch(registry, path)?;
        let search = MemberSearchRequest {
            member_ids: Some(vec![uuid.to_string()]),
            ..Default::default()
        };
        Ok(store.stream_members(&search, &criteria).await?.pop())
    }

    pub async fn create_member<S: Store>(
        store: &S,
        registry: &BranchService,
        path: &str,
        member: ReferenceSetMember,
    ) -> Result<ReferenceSetMember> {
        let mut members = Self::create_members(store, registry, path, vec![member]).await?;
        members.pop().ok_or_else(|| {
            TerminologyError::Internal("Created member was not persisted".to_string())
        })
    }

    /// Create members under fresh UUIDs in one commit.
    pub async fn create_members<S: Store>(
        store: &S,
        registry: &BranchService,
        path: &str,
        mut members: Vec<ReferenceSetMember>,
    ) -> Result<Vec<ReferenceSetMember>> {
        let commit = registry.open_commit(path)?;
        for member in members.iter_mut() {
            member.member_id = uuid::Uuid::new_v4().to_string();
            member.mark_changed();
        }
        let outcome = Self::apply_member_changes(store, registry, &commit, members).await;
        match outcome {
            Ok(saved) => {
                commit.mark_successful()?;
                Ok(saved)
            }
            Err(err) => {
                store.rollback_commit(path, commit.timepoint()).await?;
                commit.mark_failed();
                Err(err)
            }
        }
    }

    pub async fn delete_member<S: Store>(
        store: &S,
        registry: &BranchService,
        path: &str,
        uuid: &str,
    ) -> Result<()> {
        let mut member = Self::find_member(store, registry, path, uuid)
            .await?
            .ok_or_else(|| {
                TerminologyError::not_found(format!(
                    "Reference set member {} on branch {}",
                    uuid, path
                ))
            })?;
        let commit = registry.open_commit(path)?;
        member.mark_deleted();
        commit.record_deleted_components([member.member_id.clone()]);
        let outcome = Self::apply_member_changes(store, registry, &commit, vec![member]).await;
        match outcome {
            Ok(_) => {
                commit.mark_successful()?;
                Ok(())
            }
            Err(err) => {
                store.rollback_commit(path, commit.timepoint()).await?;
                commit.mark_failed();
                Err(err)
            }
        }
    }

    /// Persist members and run the downstream maintenance a member change
    /// implies: definition status and the stated closure for OWL members.
    async fn apply_member_changes<S: Store>(
        store: &S,
        registry: &BranchService,
        commit: &Commit,
        members: Vec<ReferenceSetMember>,
    ) -> Result<Vec<ReferenceSetMember>> {
        let owl_concepts: HashSet<String> = members
            .iter()
            .filter(|m| m.refset_id == constants::OWL_AXIOM_REFERENCE_SET)
            .map(|m| m.referenced_component_id.clone())
            .collect();

        let saved = Self::save_batch_members(store, registry, commit, members).await?;

        if !owl_concepts.is_empty() {
            definition_status::update_within_commit(store, registry, commit, &owl_concepts).await?;
            let touched: HashSet<u64> = owl_concepts
                .iter()
                .filter_map(|id| id.parse().ok())
                .collect();
            semantic_index::update_transitive_closure(
                store,
                registry,
                commit,
                &touched,
                semantic_index::Form::Stated,
            )
            .await?;
        }
        Ok(saved)
    }

    /// Batch member persistence. Inactive members which have never been
    /// released are deleted outright. Members referencing a description get
    /// `conceptId` denormalized; members whose description cannot be found
    /// are dropped with a warning rather than failing the batch.
    pub async fn save_batch_members<S: Store>(
        store: &S,
        registry: &BranchService,
        commit: &Commit,
        mut members: Vec<ReferenceSetMember>,
    ) -> Result<Vec<ReferenceSetMember>> {
        for member in members.iter_mut() {
            if !member.is_active() && !member.is_released() {
                member.mark_deleted();
            }
        }

        let description_ids: Vec<String> = members
            .iter()
            .filter(|m| !m.is_deleted())
            .filter(|m| identifiers::is_description_id(&m.referenced_component_id))
            .filter(|m| m.concept_id.is_none())
            .map(|m| m.referenced_component_id.clone())
            .collect();

        if !description_ids.is_empty() {
            let criteria = BranchCriteria::including_open_commit(registry, commit)?;
            let mut description_concepts: HashMap<String, String> = HashMap::new();
            for chunk in partition_clauses(&description_ids, CLAUSE_LIMIT) {
                for description in store.find_descriptions_by_ids(&chunk, &criteria).await? {
                    description_concepts
                        .insert(description.description_id.clone(), description.concept_id.clone());
                }
            }
            members.retain(|member| {
                if member.is_deleted()
                    || member.concept_id.is_some()
                    || !identifiers::is_description_id(&member.referenced_component_id)
                {
                    return true;
                }
                if description_concepts.contains_key(&member.referenced_component_id) {
                    return true;
                }
                warn!(
                    "Refset member refers to description which does not exist, this will not \
                     be persisted {} -> {}",
                    member.member_id, member.referenced_component_id
                );
                false
            });
            for member in members.iter_mut() {
                if member.concept_id.is_none() {
                    if let Some(concept_id) =
                        description_concepts.get(&member.referenced_component_id)
                    {
                        member.concept_id = Some(concept_id.clone());
                    }
                }
            }
        }

        store.save_members(members, commit).await
    }

    /// Cascade: delete every member whose referenced component was deleted
    /// by this commit.
    pub async fn delete_members_where_referenced_component_deleted<S: Store>(
        store: &S,
        registry: &BranchService,
        commit: &Commit,
    ) -> Result<usize> {
        let deleted = commit.deleted_components();
        if deleted.is_empty() {
            return Ok(0);
        }
        let criteria = BranchCriteria::including_open_commit(registry, commit)?;
        let deleted_ids: Vec<String> = deleted.iter().cloned().collect();
        let mut to_delete = Vec::new();
        for chunk in partition_clauses(&deleted_ids, CLAUSE_LIMIT) {
            let search = MemberSearchRequest {
                referenced_component_ids: Some(chunk),
                ..Default::default()
            };
            for mut member in store.stream_members(&search, &criteria).await? {
                member.mark_deleted();
                to_delete.push(member);
            }
        }
        let count = to_delete.len();
        store.save_members(to_delete, commit).await?;
        Ok(count)
    }
}

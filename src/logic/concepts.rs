//! Concept service: aggregate reads (concept + descriptions + members +
//! axioms), batch authoring through the update pipeline, and cascade
//! deletion.

use log::{info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::cancel::CancellationToken;
use crate::error::{Result, TerminologyError};
use crate::logic::identifiers::IdentifierService;
use crate::logic::members::ReferenceSetMemberService;
use crate::logic::semantic_index::{self, Form};
use crate::logic::updates::{self, PersistedComponents};
use crate::logic::{axioms, definition_status};
use crate::model::concept::Axiom;
use crate::model::constants;
use crate::model::refset::fields;
use crate::model::{Concept, ReferenceSetMember, SnomedComponent};
use crate::store::index::{partition_clauses, Page, PageRequest, CLAUSE_LIMIT};
use crate::store::traits::{MemberSearchRequest, RelationshipSearch, Store};
use crate::vc::{BranchCriteria, BranchService, Commit};

pub struct ConceptService<S: Store> {
    store: Arc<S>,
    registry: BranchService,
    identifiers: Arc<IdentifierService>,
}

impl<S: Store> ConceptService<S> {
    pub fn new(
        store: Arc<S>,
        registry: BranchService,
        identifiers: Arc<IdentifierService>,
    ) -> Self {
        Self {
            store,
            registry,
            identifiers,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn registry(&self) -> &BranchService {
        &self.registry
    }

    pub async fn create(&self, concept: Concept, path: &str) -> Result<Concept> {
        if !concept.concept_id.is_empty() && self.find(&concept.concept_id, path).await?.is_some() {
            return Err(TerminologyError::InvalidArgument(format!(
                "Concept '{}' already exists on branch {}",
                concept.concept_id, path
            )));
        }
        let persisted = self.create_update_multiple(vec![concept], path).await?;
        let concept_id = persisted
            .concepts
            .first()
            .map(|c| c.concept_id.clone())
            .ok_or_else(|| TerminologyError::Internal("Concept was not persisted".to_string()))?;
        self.find(&concept_id, path).await?.ok_or_else(|| {
            TerminologyError::Internal("Created concept not visible after commit".to_string())
        })
    }

    pub async fn update(&self, concept: Concept, path: &str) -> Result<Concept> {
        if self.find(&concept.concept_id, path).await?.is_none() {
            return Err(TerminologyError::not_found(format!(
                "Concept '{}' on branch {}",
                concept.concept_id, path
            )));
        }
        let concept_id = concept.concept_id.clone();
        self.create_update_multiple(vec![concept], path).await?;
        self.find(&concept_id, path).await?.ok_or_else(|| {
            TerminologyError::Internal("Updated concept not visible after commit".to_string())
        })
    }

    /// Batch create/update. An empty batch is a no-op.
    pub async fn create_update_multiple(
        &self,
        concepts: Vec<Concept>,
        path: &str,
    ) -> Result<PersistedComponents> {
        if concepts.is_empty() {
            return Ok(PersistedComponents::default());
        }
        let commit = self.registry.open_commit(path)?;
        let outcome = self.save_within_commit(concepts, &commit).await;
        match outcome {
            Ok(persisted) => {
                commit.mark_successful()?;
                Ok(persisted)
            }
            Err(err) => {
                self.store
                    .rollback_commit(path, commit.timepoint())
                    .await?;
                commit.mark_failed();
                Err(err)
            }
        }
    }

    async fn save_within_commit(
        &self,
        concepts: Vec<Concept>,
        commit: &Commit,
    ) -> Result<PersistedComponents> {
        let criteria = BranchCriteria::including_open_commit(&self.registry, commit)?;
        let existing_ids: Vec<String> = concepts
            .iter()
            .filter(|c| !c.concept_id.is_empty())
            .map(|c| c.concept_id.clone())
            .collect();
        let existing_concepts: HashMap<String, Concept> = self
            .load_aggregates(&criteria, &existing_ids)
            .await?
            .into_iter()
            .map(|c| (c.concept_id.clone(), c))
            .collect();

        let persisted = updates::save_new_or_updated_concepts(
            self.store.as_ref(),
            &self.registry,
            &self.identifiers,
            commit,
            concepts,
            &existing_concepts,
        )
        .await?;

        let touched_ids: HashSet<String> = persisted
            .concepts
            .iter()
            .map(|c| c.concept_id.clone())
            .collect();
        definition_status::update_within_commit(
            self.store.as_ref(),
            &self.registry,
            commit,
            &touched_ids,
        )
        .await?;

        let touched: HashSet<u64> = touched_ids.iter().filter_map(|id| id.parse().ok()).collect();
        for form in Form::both() {
            semantic_index::update_transitive_closure(
                self.store.as_ref(),
                &self.registry,
                commit,
                &touched,
                form,
            )
            .await?;
        }
        Ok(persisted)
    }

    pub async fn find(&self, concept_id: &str, path: &str) -> Result<Option<Concept>> {
        let criteria = BranchCriteria::for_branch(&self.registry, path)?;
        Ok(self
            .load_aggregates(&criteria, &[concept_id.to_string()])
            .await?
            .into_iter()
            .next())
    }

    pub async fn find_multiple(&self, concept_ids: &[String], path: &str) -> Result<Vec<Concept>> {
        let criteria = BranchCriteria::for_branch(&self.registry, path)?;
        self.load_aggregates(&criteria, concept_ids).await
    }

    pub async fn find_all(&self, path: &str, page: PageRequest) -> Result<Page<Concept>> {
        let criteria = BranchCriteria::for_branch(&self.registry, path)?;
        self.store.search_concepts(&criteria, page).await
    }

    /// Delete a concept and cascade through its descriptions, their
    /// language members, and every member referencing any deleted component.
    pub async fn delete_concept(&self, concept_id: &str, path: &str) -> Result<()> {
        let commit = self.registry.open_commit(path)?;
        let outcome = self.delete_within_commit(concept_id, &commit).await;
        match outcome {
            Ok(()) => {
                commit.mark_successful()?;
                info!(
                    "Deleted concept {} on branch {} at timepoint {}",
                    concept_id,
                    path,
                    commit.timepoint()
                );
                Ok(())
            }
            Err(err) => {
                self.store
                    .rollback_commit(path, commit.timepoint())
                    .await?;
                commit.mark_failed();
                Err(err)
            }
        }
    }

    async fn delete_within_commit(&self, concept_id: &str, commit: &Commit) -> Result<()> {
        let criteria = BranchCriteria::including_open_commit(&self.registry, commit)?;
        let mut concept = self
            .load_aggregates(&criteria, &[concept_id.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                TerminologyError::not_found(format!(
                    "Concept '{}' on branch {}",
                    concept_id,
                    commit.path()
                ))
            })?;

        concept.mark_deleted();
        let mut members_to_delete: Vec<ReferenceSetMember> = Vec::new();
        let mut deleted_ids: HashSet<String> = HashSet::new();
        deleted_ids.insert(concept.concept_id.clone());

        for description in concept.descriptions.iter_mut() {
            description.mark_deleted();
            deleted_ids.insert(description.description_id.clone());
            members_to_delete.extend(description.lang_refset_members.values().cloned());
            if let Some(member) = description.inactivation_indicator_member.take() {
                members_to_delete.push(member);
            }
            members_to_delete.extend(description.association_target_members.drain(..));
        }
        if let Some(member) = concept.inactivation_indicator_member.take() {
            members_to_delete.push(member);
        }
        members_to_delete.extend(concept.association_target_members.drain(..));
        members_to_delete.extend(concept.all_owl_axiom_members());
        for relationship in concept.relationships.iter_mut() {
            relationship.mark_deleted();
            deleted_ids.insert(relationship.relationship_id.clone());
        }

        for member in members_to_delete.iter_mut() {
            member.mark_deleted();
            deleted_ids.insert(member.member_id.clone());
        }
        commit.record_deleted_components(deleted_ids);

        let descriptions = std::mem::take(&mut concept.descriptions);
        let relationships = std::mem::take(&mut concept.relationships);
        self.store.save_concepts(vec![concept], commit).await?;
        self.store.save_descriptions(descriptions, commit).await?;
        self.store.save_relationships(relationships, commit).await?;
        self.store.save_members(members_to_delete, commit).await?;
        ReferenceSetMemberService::delete_members_where_referenced_component_deleted(
            self.store.as_ref(),
            &self.registry,
            commit,
        )
        .await?;

        let touched: HashSet<u64> = concept_id.parse().into_iter().collect();
        for form in Form::both() {
            semantic_index::update_transitive_closure(
                self.store.as_ref(),
                &self.registry,
                commit,
                &touched,
                form,
            )
            .await?;
        }
        Ok(())
    }

    /// On-demand full rebuild of the semantic index for a branch.
    pub async fn rebuild_semantic_index(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let mut written = 0;
        for form in Form::both() {
            written +=
                semantic_index::rebuild(self.store.as_ref(), &self.registry, path, form, cancel)
                    .await?;
        }
        Ok(written)
    }

    /// Assemble concept aggregates: join descriptions, relationships,
    /// language/indicator/association members and axioms by conceptId and
    /// descriptionId.
    async fn load_aggregates(
        &self,
        criteria: &BranchCriteria,
        concept_ids: &[String],
    ) -> Result<Vec<Concept>> {
        if concept_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut concepts = Vec::new();
        for chunk in partition_clauses(concept_ids, CLAUSE_LIMIT) {
            concepts.extend(self.store.find_concepts(&chunk, criteria).await?);
        }
        if concepts.is_empty() {
            return Ok(concepts);
        }
        let found_ids: Vec<String> = concepts.iter().map(|c| c.concept_id.clone()).collect();

        let mut descriptions = Vec::new();
        for chunk in partition_clauses(&found_ids, CLAUSE_LIMIT) {
            descriptions.extend(self.store.find_descriptions(&chunk, criteria).await?);
        }
        let description_ids: Vec<String> = descriptions
            .iter()
            .map(|d| d.description_id.clone())
            .collect();

        let mut relationships = Vec::new();
        for chunk in partition_clauses(&found_ids, CLAUSE_LIMIT) {
            let search = RelationshipSearch {
                source_ids: Some(chunk),
                ..Default::default()
            };
            relationships.extend(self.store.find_relationships(&search, criteria).await?);
        }

        let mut referenced_ids = found_ids.clone();
        referenced_ids.extend(description_ids.iter().cloned());
        let mut members = Vec::new();
        for chunk in partition_clauses(&referenced_ids, CLAUSE_LIMIT) {
            let search = MemberSearchRequest {
                referenced_component_ids: Some(chunk),
                ..Default::default()
            };
            members.extend(self.store.stream_members(&search, criteria).await?);
        }

        distribute_aggregate_parts(&mut concepts, descriptions, relationships, members);
        Ok(concepts)
    }
}

fn invert(map: HashMap<&'static str, &'static str>) -> HashMap<String, String> {
    map.into_iter()
        .map(|(name, id)| (id.to_string(), name.to_string()))
        .collect()
}

fn distribute_aggregate_parts(
    concepts: &mut [Concept],
    descriptions: Vec<crate::model::Description>,
    relationships: Vec<crate::model::Relationship>,
    members: Vec<ReferenceSetMember>,
) {
    let acceptability_names = invert(constants::acceptability_ids());
    let indicator_names = invert(constants::inactivation_indicator_ids());
    let association_names = invert(constants::historical_association_ids());

    let mut descriptions_by_concept: HashMap<String, Vec<crate::model::Description>> =
        HashMap::new();
    for description in descriptions {
        descriptions_by_concept
            .entry(description.concept_id.clone())
            .or_default()
            .push(description);
    }
    let mut relationships_by_source: HashMap<String, Vec<crate::model::Relationship>> =
        HashMap::new();
    for relationship in relationships {
        relationships_by_source
            .entry(relationship.source_id.clone())
            .or_default()
            .push(relationship);
    }
    let mut members_by_referenced: HashMap<String, Vec<ReferenceSetMember>> = HashMap::new();
    for member in members {
        members_by_referenced
            .entry(member.referenced_component_id.clone())
            .or_default()
            .push(member);
    }

    for concept in concepts.iter_mut() {
        concept.descriptions = descriptions_by_concept
            .remove(&concept.concept_id)
            .unwrap_or_default();
        concept.relationships = relationships_by_source
            .remove(&concept.concept_id)
            .unwrap_or_default();

        for member in members_by_referenced
            .remove(&concept.concept_id)
            .unwrap_or_default()
        {
            if member.refset_id == constants::OWL_AXIOM_REFERENCE_SET {
                if !member.is_active() {
                    continue;
                }
                let expression = member.additional_field(fields::OWL_EXPRESSION).unwrap_or("");
                match axioms::from_owl_expression(expression) {
                    Ok(parsed) => {
                        let axiom = Axiom {
                            axiom_id: Some(member.member_id.clone()),
                            definition_status_id: parsed.definition_status_id,
                            module_id: member.module_id.clone(),
                            active: member.is_active(),
                            relationships: parsed.relationships,
                            member: Some(member),
                        };
                        if parsed.gci {
                            concept.gci_axioms.push(axiom);
                        } else {
                            concept.class_axioms.push(axiom);
                        }
                    }
                    Err(_) => {
                        warn!(
                            "Skipping malformed OWL expression on member {}",
                            member.member_id
                        );
                    }
                }
            } else if member.refset_id == constants::CONCEPT_INACTIVATION_INDICATOR_REFERENCE_SET {
                if member.is_active() {
                    concept.inactivation_indicator = member
                        .additional_field(fields::VALUE_ID)
                        .and_then(|id| indicator_names.get(id).cloned());
                    concept.inactivation_indicator_member = Some(member);
                }
            } else if let Some(name) = association_names.get(&member.refset_id) {
                if member.is_active() {
                    if let Some(target) = member.additional_field(fields::TARGET_COMPONENT_ID) {
                        concept
                            .association_targets
                            .entry(name.clone())
                            .or_default()
                            .insert(target.to_string());
                    }
                    concept.association_target_members.push(member);
                }
            }
        }

        for description in concept.descriptions.iter_mut() {
            for member in members_by_referenced
                .remove(&description.description_id)
                .unwrap_or_default()
            {
                if member.additional_field(fields::ACCEPTABILITY_ID).is_some() {
                    if member.is_active() {
                        if let Some(name) = member
                            .additional_field(fields::ACCEPTABILITY_ID)
                            .and_then(|id| acceptability_names.get(id))
                        {
                            description
                                .acceptability_map
                                .insert(member.refset_id.clone(), name.clone());
                        }
                    }
                    description
                        .lang_refset_members
                        .insert(member.refset_id.clone(), member);
                } else if member.refset_id
                    == constants::DESCRIPTION_INACTIVATION_INDICATOR_REFERENCE_SET
                {
                    if member.is_active() {
                        description.inactivation_indicator = member
                            .additional_field(fields::VALUE_ID)
                            .and_then(|id| indicator_names.get(id).cloned());
                        description.inactivation_indicator_member = Some(member);
                    }
                } else if let Some(name) = association_names.get(&member.refset_id) {
                    if member.is_active() {
                        if let Some(target) = member.additional_field(fields::TARGET_COMPONENT_ID) {
                            description
                                .association_targets
                                .entry(name.clone())
                                .or_default()
                                .insert(target.to_string());
                        }
                        description.association_target_members.push(member);
                    }
                }
            }
        }
    }
}

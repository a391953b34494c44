//! The concept update pipeline: diffs incoming concept aggregates against
//! the existing branch view, assigns identifiers, and reconciles the
//! reference-set side tables, all within one commit.

use log::debug;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::error::{Result, TerminologyError};
use crate::logic::identifiers::{ComponentType, IdentifierService};
use crate::logic::members::ReferenceSetMemberService;
use crate::logic::{axioms, validate};
use crate::model::constants;
use crate::model::refset::fields;
use crate::model::{
    Concept, Description, ReferenceSetMember, Relationship, SnomedComponent,
};
use crate::store::traits::Store;
use crate::vc::{BranchService, Commit};

/// The four persisted collections, returned for downstream triggers.
#[derive(Debug, Default)]
pub struct PersistedComponents {
    pub concepts: Vec<Concept>,
    pub descriptions: Vec<Description>,
    pub relationships: Vec<Relationship>,
    pub members: Vec<ReferenceSetMember>,
}

pub async fn save_new_or_updated_concepts<S: Store>(
    store: &S,
    registry: &BranchService,
    identifiers: &IdentifierService,
    commit: &Commit,
    mut concepts: Vec<Concept>,
    existing_concepts: &HashMap<String, Concept>,
) -> Result<PersistedComponents> {
    let saving_merged_concepts = commit.is_rebase();

    validate::validate_concepts(&concepts)?;

    // Reserve identifiers for everything new in the batch.
    let new_concept_count = concepts.iter().filter(|c| c.concept_id.is_empty()).count();
    let new_description_count = concepts
        .iter()
        .flat_map(|c| c.descriptions.iter())
        .filter(|d| d.description_id.is_empty())
        .count();
    let new_relationship_count = concepts
        .iter()
        .flat_map(|c| c.relationships.iter())
        .filter(|r| r.relationship_id.is_empty())
        .count();
    let mut reserved_ids = identifiers.reserve_block(
        new_concept_count,
        new_description_count,
        new_relationship_count,
    );
    for concept in concepts.iter_mut().filter(|c| c.concept_id.is_empty()) {
        concept.concept_id = reserved_ids.next_id(ComponentType::Concept)?;
    }

    // Convert axioms to OWL-axiom reference set members before persisting.
    axioms::populate_axiom_members(&mut concepts);

    let mut descriptions_to_persist: Vec<Description> = Vec::new();
    let mut relationships_to_persist: Vec<Relationship> = Vec::new();
    let mut refset_members_to_persist: Vec<ReferenceSetMember> = Vec::new();

    for concept in concepts.iter_mut() {
        let existing_concept = existing_concepts.get(&concept.concept_id);
        let mut new_version_owl_members: Vec<ReferenceSetMember> = concept.all_owl_axiom_members();

        if concept.active {
            // Inactivation refsets must not persist on an active concept.
            concept.inactivation_indicator = None;
            concept.association_targets.clear();
        } else {
            for relationship in concept.relationships.iter_mut() {
                relationship.active = false;
            }
            for member in new_version_owl_members.iter_mut() {
                member.active = false;
            }
        }

        match existing_concept {
            Some(existing) => {
                let changed =
                    concept.is_component_changed(Some(existing)) || saving_merged_concepts;
                concept.set_changed(changed);
                concept.copy_release_details(existing);
                concept.update_effective_time();

                mark_deletions_and_updates(
                    &mut concept.descriptions,
                    &existing.descriptions,
                    saving_merged_concepts,
                );
                mark_deletions_and_updates(
                    &mut concept.relationships,
                    &existing.relationships,
                    saving_merged_concepts,
                );
                mark_deletions_and_updates(
                    &mut new_version_owl_members,
                    &existing.all_owl_axiom_members(),
                    saving_merged_concepts,
                );
            }
            None => {
                concept.set_creating(true);
                concept.set_changed(true);
                concept.clear_release_details();
                for description in concept.descriptions.iter_mut() {
                    description.set_creating(true);
                    description.set_changed(true);
                    description.clear_release_details();
                }
                for relationship in concept.relationships.iter_mut() {
                    relationship.set_creating(true);
                    relationship.set_changed(true);
                    relationship.clear_release_details();
                }
                for member in new_version_owl_members.iter_mut() {
                    member.set_creating(true);
                    member.set_changed(true);
                    member.clear_release_details();
                }
            }
        }

        // Concept inactivation indicator and association changes.
        update_inactivation_indicator(
            concept.inactivation_indicator.as_deref(),
            existing_concept.and_then(|e| e.inactivation_indicator.as_deref()),
            existing_concept.and_then(|e| e.inactivation_indicator_member.as_ref()),
            &concept.module_id,
            &concept.concept_id,
            constants::CONCEPT_INACTIVATION_INDICATOR_REFERENCE_SET,
            &mut refset_members_to_persist,
        )?;
        update_associations(
            &concept.association_targets,
            existing_concept.map(|e| &e.association_targets),
            existing_concept.map(|e| e.association_target_members.as_slice()),
            &concept.module_id,
            &concept.concept_id,
            &mut refset_members_to_persist,
        )?;

        let existing_descriptions: HashMap<String, &Description> = existing_concept
            .map(|e| {
                e.descriptions
                    .iter()
                    .map(|d| (d.description_id.clone(), d))
                    .collect()
            })
            .unwrap_or_default();

        for description in concept.descriptions.iter_mut() {
            description.concept_id = concept.concept_id.clone();
            if description.is_deleted() {
                // Language members cascade through the deleted-component
                // sweep after persistence.
                continue;
            }
            let existing_description = existing_descriptions
                .get(&description.description_id)
                .copied();
            let mut existing_members_to_match: BTreeMap<String, ReferenceSetMember> =
                existing_description
                    .map(|e| e.lang_refset_members.clone())
                    .unwrap_or_default();
            if existing_description.is_none() {
                description.set_creating(true);
                if description.description_id.is_empty() {
                    description.description_id = reserved_ids.next_id(ComponentType::Description)?;
                }
            }
            if description.active {
                description.inactivation_indicator = None;
            } else {
                description.acceptability_map.clear();
            }

            update_inactivation_indicator(
                description.inactivation_indicator.as_deref(),
                existing_description.and_then(|e| e.inactivation_indicator.as_deref()),
                existing_description.and_then(|e| e.inactivation_indicator_member.as_ref()),
                &description.module_id,
                &description.description_id,
                constants::DESCRIPTION_INACTIVATION_INDICATOR_REFERENCE_SET,
                &mut refset_members_to_persist,
            )?;
            update_associations(
                &description.association_targets,
                existing_description.map(|e| &e.association_targets),
                existing_description.map(|e| e.association_target_members.as_slice()),
                &description.module_id,
                &description.description_id,
                &mut refset_members_to_persist,
            )?;

            // Acceptability / language reference set changes.
            let acceptability_ids = constants::acceptability_ids();
            for (language_refset_id, acceptability_name) in &description.acceptability_map {
                let acceptability_id = acceptability_ids
                    .get(acceptability_name.as_str())
                    .copied()
                    .ok_or_else(|| {
                        TerminologyError::InvalidArgument(format!(
                            "Acceptability value not recognised '{}'",
                            acceptability_name
                        ))
                    })?;

                match existing_members_to_match.remove(language_refset_id) {
                    Some(existing_member) => {
                        let mut member = ReferenceSetMember::new_version_of(&existing_member);
                        member.refset_id = language_refset_id.clone();
                        member.referenced_component_id = description.description_id.clone();
                        member.set_additional_field(fields::ACCEPTABILITY_ID, acceptability_id);
                        member.concept_id = Some(concept.concept_id.clone());
                        if member.is_component_changed(Some(&existing_member))
                            || saving_merged_concepts
                        {
                            member.set_changed(true);
                            member.copy_release_details(&existing_member);
                            member.update_effective_time();
                            refset_members_to_persist.push(member);
                        }
                    }
                    None => {
                        let mut member = ReferenceSetMember::new(
                            &description.module_id,
                            language_refset_id,
                            &description.description_id,
                        );
                        member.set_additional_field(fields::ACCEPTABILITY_ID, acceptability_id);
                        member.concept_id = Some(concept.concept_id.clone());
                        member.set_changed(true);
                        refset_members_to_persist.push(member);
                    }
                }
            }
            for leftover_member in existing_members_to_match.into_values() {
                if leftover_member.is_active() {
                    let mut member = leftover_member;
                    member.active = false;
                    member.mark_changed();
                    refset_members_to_persist.push(member);
                }
            }
        }

        for relationship in concept.relationships.iter_mut() {
            relationship.source_id = concept.concept_id.clone();
            if relationship.relationship_id.is_empty() && !relationship.is_deleted() {
                relationship.relationship_id = reserved_ids.next_id(ComponentType::Relationship)?;
            }
        }

        // Detach the aggregate's components to be persisted separately.
        descriptions_to_persist.append(&mut concept.descriptions);
        relationships_to_persist.append(&mut concept.relationships);
        refset_members_to_persist.append(&mut new_version_owl_members);
        concept.class_axioms.clear();
        concept.gci_axioms.clear();
    }

    // Record deletions for the member cascade.
    let deleted_ids: HashSet<String> = descriptions_to_persist
        .iter()
        .filter(|d| d.is_deleted())
        .map(|d| d.description_id.clone())
        .chain(
            relationships_to_persist
                .iter()
                .filter(|r| r.is_deleted())
                .map(|r| r.relationship_id.clone()),
        )
        .chain(
            refset_members_to_persist
                .iter()
                .filter(|m| m.is_deleted())
                .map(|m| m.member_id.clone()),
        )
        .collect();
    commit.record_deleted_components(deleted_ids);

    let persisted_concepts = store.save_concepts(concepts, commit).await?;
    let persisted_descriptions = store
        .save_descriptions(descriptions_to_persist, commit)
        .await?;
    let persisted_relationships = store
        .save_relationships(relationships_to_persist, commit)
        .await?;
    let persisted_members = ReferenceSetMemberService::save_batch_members(
        store,
        registry,
        commit,
        refset_members_to_persist,
    )
    .await?;
    ReferenceSetMemberService::delete_members_where_referenced_component_deleted(
        store, registry, commit,
    )
    .await?;

    // Store assigned identifiers for registration with the id service.
    identifiers.persist_assigned_ids(&reserved_ids);

    debug!(
        "Pipeline persisted {} concept(s), {} description(s), {} relationship(s), {} member(s)",
        persisted_concepts.len(),
        persisted_descriptions.len(),
        persisted_relationships.len(),
        persisted_members.len()
    );
    Ok(PersistedComponents {
        concepts: persisted_concepts,
        descriptions: persisted_descriptions,
        relationships: persisted_relationships,
        members: persisted_members,
    })
}

/// Mark components absent from the new state as deleted, and stamp
/// changed/creating flags and release details on the rest.
fn mark_deletions_and_updates<T: SnomedComponent>(
    new_components: &mut Vec<T>,
    existing_components: &[T],
    rebase: bool,
) {
    let new_ids: HashSet<String> = new_components.iter().map(|c| c.component_id()).collect();
    for existing in existing_components {
        if !new_ids.contains(&existing.component_id()) {
            let mut removed = existing.clone();
            removed.mark_deleted();
            new_components.push(removed);
        }
    }
    let existing_by_id: HashMap<String, &T> = existing_components
        .iter()
        .map(|c| (c.component_id(), c))
        .collect();
    for component in new_components.iter_mut() {
        if component.is_deleted() {
            continue;
        }
        match existing_by_id.get(&component.component_id()) {
            Some(existing) => {
                let changed = component.is_component_changed(Some(existing)) || rebase;
                component.set_changed(changed);
                component.copy_release_details(existing);
                component.update_effective_time();
            }
            None => {
                component.set_creating(true);
                component.set_changed(true);
                component.clear_release_details();
            }
        }
    }
}

fn update_inactivation_indicator(
    new_indicator: Option<&str>,
    existing_indicator: Option<&str>,
    existing_member: Option<&ReferenceSetMember>,
    module_id: &str,
    referenced_component_id: &str,
    indicator_refset_id: &str,
    refset_members_to_persist: &mut Vec<ReferenceSetMember>,
) -> Result<()> {
    if let Some(existing_name) = existing_indicator {
        if Some(existing_name) != new_indicator {
            if let Some(existing_member) = existing_member {
                let mut member = existing_member.clone();
                member.active = false;
                member.mark_changed();
                refset_members_to_persist.push(member);
            }
        }
    }
    if let Some(new_name) = new_indicator {
        if Some(new_name) != existing_indicator {
            let indicator_ids = constants::inactivation_indicator_ids();
            let value_id = indicator_ids.get(new_name).copied().ok_or_else(|| {
                TerminologyError::InvalidArgument(format!(
                    "Inactivation indicator not recognised '{}'",
                    new_name
                ))
            })?;
            let mut member =
                ReferenceSetMember::new(module_id, indicator_refset_id, referenced_component_id);
            member.set_additional_field(fields::VALUE_ID, value_id);
            member.set_changed(true);
            refset_members_to_persist.push(member);
        }
    }
    Ok(())
}

fn update_associations(
    new_associations: &BTreeMap<String, BTreeSet<String>>,
    existing_associations: Option<&BTreeMap<String, BTreeSet<String>>>,
    existing_members: Option<&[ReferenceSetMember]>,
    module_id: &str,
    referenced_component_id: &str,
    refset_members_to_persist: &mut Vec<ReferenceSetMember>,
) -> Result<()> {
    let association_ids = constants::historical_association_ids();

    // Existing association targets absent from the new set are deactivated.
    if let Some(existing_associations) = existing_associations {
        for (association_name, existing_targets) in existing_associations {
            let new_targets = new_associations.get(association_name);
            for existing_target in existing_targets {
                if new_targets.map_or(true, |targets| !targets.contains(existing_target)) {
                    let association_refset_id = association_ids
                        .get(association_name.as_str())
                        .copied()
                        .unwrap_or_default();
                    for existing_member in existing_members.unwrap_or_default() {
                        if existing_member.is_active()
                            && existing_member.refset_id == association_refset_id
                            && existing_member.additional_field(fields::TARGET_COMPONENT_ID)
                                == Some(existing_target.as_str())
                        {
                            let mut member = existing_member.clone();
                            member.active = false;
                            member.mark_changed();
                            refset_members_to_persist.push(member);
                        }
                    }
                }
            }
        }
    }

    // New association targets absent from the existing set are created.
    for (association_name, new_targets) in new_associations {
        let association_refset_id = association_ids
            .get(association_name.as_str())
            .copied()
            .ok_or_else(|| {
                TerminologyError::InvalidArgument(format!(
                    "Association reference set not recognised '{}'",
                    association_name
                ))
            })?;
        let existing_targets = existing_associations.and_then(|e| e.get(association_name));
        for target in new_targets {
            if existing_targets.map_or(true, |targets| !targets.contains(target)) {
                let mut member = ReferenceSetMember::new(
                    module_id,
                    association_refset_id,
                    referenced_component_id,
                );
                member.set_additional_field(fields::TARGET_COMPONENT_ID, target);
                member.mark_changed();
                refset_members_to_persist.push(member);
            }
        }
    }
    Ok(())
}

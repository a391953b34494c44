//! Concept authoring scenarios: axiom storage and definition status
//! coupling, acceptability reconciliation, inactivation side tables,
//! cascade deletion and release bookkeeping.

use snowstorm::model::constants;
use snowstorm::model::refset::fields;
use snowstorm::store::traits::{MaintenanceStore, MemberSearchRequest};
use snowstorm::{
    new_in_memory, Axiom, Concept, Description, PageRequest, ReferenceSetMember,
    ReferenceSetMemberService, Relationship, SnomedComponent,
};

const PATH: &str = "MAIN/A";

fn setup_branches(registry: &snowstorm::BranchService) {
    registry.create("MAIN").unwrap();
    registry.create(PATH).unwrap();
}

#[tokio::test]
async fn new_concept_authoring_stores_axiom_and_owl_member() {
    let (store, registry, concepts) = new_in_memory();
    setup_branches(&registry);

    let concept = Concept::new("50960005", constants::CORE_MODULE, constants::PRIMITIVE)
        .with_class_axiom(Axiom::new(
            constants::FULLY_DEFINED,
            vec![
                Relationship::isa("10000100"),
                Relationship::new("10000200", "10000300"),
            ],
        ));
    concepts.create(concept, PATH).await.unwrap();

    let saved = concepts.find("50960005", PATH).await.unwrap().unwrap();
    assert_eq!(saved.class_axioms.len(), 1);
    let axiom = &saved.class_axioms[0];
    assert_eq!(axiom.definition_status_id, constants::FULLY_DEFINED);
    // The axiom drives the concept's own status.
    assert_eq!(saved.definition_status_id, constants::FULLY_DEFINED);

    let members = ReferenceSetMemberService::find_members(
        store.as_ref(),
        &registry,
        PATH,
        &MemberSearchRequest {
            active: Some(true),
            refset_id: Some(constants::OWL_AXIOM_REFERENCE_SET.to_string()),
            referenced_component_ids: Some(vec!["50960005".to_string()]),
            ..Default::default()
        },
        PageRequest::of(0, 10),
    )
    .await
    .unwrap();
    assert_eq!(members.total, 1);
    assert_eq!(
        members.items[0].additional_field(fields::OWL_EXPRESSION),
        Some(
            "EquivalentClasses(:50960005 ObjectIntersectionOf(:10000100 \
             ObjectSomeValuesFrom(:609096000 ObjectSomeValuesFrom(:10000200 :10000300))) )"
        )
    );
    assert_eq!(members.items[0].member_id, axiom.axiom_id.clone().unwrap());
}

#[tokio::test]
async fn deleting_the_axiom_member_makes_the_concept_primitive() {
    let (store, registry, concepts) = new_in_memory();
    setup_branches(&registry);

    let concept = Concept::new("50960005", constants::CORE_MODULE, constants::FULLY_DEFINED)
        .with_class_axiom(Axiom::new(
            constants::FULLY_DEFINED,
            vec![
                Relationship::isa("10000100"),
                Relationship::new("10000200", "10000300"),
            ],
        ));
    concepts.create(concept, PATH).await.unwrap();

    let saved = concepts.find("50960005", PATH).await.unwrap().unwrap();
    assert_eq!(saved.definition_status_id, constants::FULLY_DEFINED);
    let axiom_id = saved.class_axioms[0].axiom_id.clone().unwrap();

    ReferenceSetMemberService::delete_member(store.as_ref(), &registry, PATH, &axiom_id)
        .await
        .unwrap();

    let updated = concepts.find("50960005", PATH).await.unwrap().unwrap();
    assert_eq!(updated.definition_status_id, "900000000000074008");
    assert!(updated.class_axioms.is_empty());
}

#[tokio::test]
async fn replacing_an_equivalent_axiom_with_subclass_reverts_status() {
    let (store, registry, concepts) = new_in_memory();
    setup_branches(&registry);

    let concept = Concept::new("50960005", constants::CORE_MODULE, constants::FULLY_DEFINED)
        .with_class_axiom(Axiom::new(
            constants::FULLY_DEFINED,
            vec![Relationship::isa("10000100")],
        ));
    concepts.create(concept, PATH).await.unwrap();
    let saved = concepts.find("50960005", PATH).await.unwrap().unwrap();
    let axiom_id = saved.class_axioms[0].axiom_id.clone().unwrap();

    ReferenceSetMemberService::delete_member(store.as_ref(), &registry, PATH, &axiom_id)
        .await
        .unwrap();
    let replacement = ReferenceSetMember::new(
        constants::CORE_MODULE,
        constants::OWL_AXIOM_REFERENCE_SET,
        "50960005",
    )
    .with_additional_field(fields::OWL_EXPRESSION, "SubClassOf(:50960005 :10000100 )");
    ReferenceSetMemberService::create_member(store.as_ref(), &registry, PATH, replacement)
        .await
        .unwrap();

    let updated = concepts.find("50960005", PATH).await.unwrap().unwrap();
    assert_eq!(updated.definition_status_id, "900000000000074008");
    assert_eq!(updated.class_axioms.len(), 1);
    assert_eq!(
        updated.class_axioms[0].definition_status_id,
        "900000000000074008"
    );
}

#[tokio::test]
async fn saving_the_same_concept_twice_writes_no_new_versions() {
    let (store, registry, concepts) = new_in_memory();
    setup_branches(&registry);

    let concept = Concept::primitive("100001000").with_description(
        Description::synonym("Heart")
            .with_id("100001011")
            .preferred_in(constants::US_EN_LANGUAGE_REFERENCE_SET)
            .acceptable_in(constants::GB_EN_LANGUAGE_REFERENCE_SET),
    );
    concepts.create(concept, PATH).await.unwrap();
    let head_after_first_save = registry.find(PATH).unwrap().head;

    let reloaded = concepts.find("100001000", PATH).await.unwrap().unwrap();
    concepts.update(reloaded, PATH).await.unwrap();

    let changed = store
        .changed_components_since(PATH, head_after_first_save)
        .await
        .unwrap();
    assert!(
        changed.members.is_empty(),
        "second save produced member versions: {:?}",
        changed.members
    );
    assert!(changed.descriptions.is_empty());
    assert!(changed.concepts.is_empty());
}

#[tokio::test]
async fn changing_acceptability_writes_a_new_member_version_with_same_identity() {
    let (store, registry, concepts) = new_in_memory();
    setup_branches(&registry);

    let concept = Concept::primitive("100001000").with_description(
        Description::synonym("Heart")
            .with_id("100001011")
            .preferred_in(constants::US_EN_LANGUAGE_REFERENCE_SET),
    );
    concepts.create(concept, PATH).await.unwrap();
    let first = concepts.find("100001000", PATH).await.unwrap().unwrap();
    let member_before = first.descriptions[0]
        .lang_refset_members
        .get(constants::US_EN_LANGUAGE_REFERENCE_SET)
        .unwrap()
        .clone();

    let mut edited = first;
    edited.descriptions[0]
        .acceptability_map
        .insert(
            constants::US_EN_LANGUAGE_REFERENCE_SET.to_string(),
            "ACCEPTABLE".to_string(),
        );
    concepts.update(edited, PATH).await.unwrap();

    let after = concepts.find("100001000", PATH).await.unwrap().unwrap();
    let member_after = after.descriptions[0]
        .lang_refset_members
        .get(constants::US_EN_LANGUAGE_REFERENCE_SET)
        .unwrap();
    assert_eq!(member_after.member_id, member_before.member_id);
    assert_eq!(
        member_after.additional_field(fields::ACCEPTABILITY_ID),
        Some(constants::ACCEPTABLE)
    );
    let changed = store
        .changed_components_since(PATH, 0)
        .await
        .unwrap();
    assert!(changed.members.contains(&member_before.member_id));
}

#[tokio::test]
async fn dropped_acceptability_entries_deactivate_their_members() {
    let (_store, registry, concepts) = new_in_memory();
    setup_branches(&registry);

    let concept = Concept::primitive("100001000").with_description(
        Description::synonym("Heart")
            .with_id("100001011")
            .preferred_in(constants::US_EN_LANGUAGE_REFERENCE_SET)
            .acceptable_in(constants::GB_EN_LANGUAGE_REFERENCE_SET),
    );
    concepts.create(concept, PATH).await.unwrap();

    let mut edited = concepts.find("100001000", PATH).await.unwrap().unwrap();
    edited.descriptions[0]
        .acceptability_map
        .remove(constants::GB_EN_LANGUAGE_REFERENCE_SET);
    concepts.update(edited, PATH).await.unwrap();

    let after = concepts.find("100001000", PATH).await.unwrap().unwrap();
    assert!(!after.descriptions[0]
        .acceptability_map
        .contains_key(constants::GB_EN_LANGUAGE_REFERENCE_SET));
    let gb_member = after.descriptions[0]
        .lang_refset_members
        .get(constants::GB_EN_LANGUAGE_REFERENCE_SET);
    assert!(gb_member.map_or(true, |m| !m.active));
}

#[tokio::test]
async fn empty_concept_save_is_a_no_op() {
    let (_store, registry, concepts) = new_in_memory();
    setup_branches(&registry);
    let head_before = registry.find(PATH).unwrap().head;

    let persisted = concepts.create_update_multiple(Vec::new(), PATH).await.unwrap();
    assert!(persisted.concepts.is_empty());
    assert_eq!(registry.find(PATH).unwrap().head, head_before);
}

#[tokio::test]
async fn inactivation_indicator_and_association_round_trip() {
    let (_store, registry, concepts) = new_in_memory();
    setup_branches(&registry);

    concepts
        .create(Concept::primitive("100002000"), PATH)
        .await
        .unwrap();
    concepts
        .create(Concept::primitive("100001000"), PATH)
        .await
        .unwrap();

    let mut inactivated = concepts.find("100001000", PATH).await.unwrap().unwrap();
    inactivated.active = false;
    inactivated.inactivation_indicator = Some("OUTDATED".to_string());
    inactivated
        .association_targets
        .entry("REPLACED_BY".to_string())
        .or_default()
        .insert("100002000".to_string());
    concepts.update(inactivated, PATH).await.unwrap();

    let found = concepts.find("100001000", PATH).await.unwrap().unwrap();
    assert!(!found.active);
    assert_eq!(found.inactivation_indicator.as_deref(), Some("OUTDATED"));
    assert!(found
        .association_targets
        .get("REPLACED_BY")
        .unwrap()
        .contains("100002000"));

    // Reactivation clears both side tables.
    let mut reactivated = found;
    reactivated.active = true;
    concepts.update(reactivated, PATH).await.unwrap();
    let cleared = concepts.find("100001000", PATH).await.unwrap().unwrap();
    assert!(cleared.inactivation_indicator.is_none());
    assert!(cleared.association_targets.is_empty());
}

#[tokio::test]
async fn unknown_indicator_and_association_names_fail() {
    let (_store, registry, concepts) = new_in_memory();
    setup_branches(&registry);
    concepts
        .create(Concept::primitive("100001000"), PATH)
        .await
        .unwrap();

    let mut bad_indicator = concepts.find("100001000", PATH).await.unwrap().unwrap();
    bad_indicator.active = false;
    bad_indicator.inactivation_indicator = Some("NOT_A_REASON".to_string());
    assert!(matches!(
        concepts.update(bad_indicator, PATH).await.unwrap_err(),
        snowstorm::TerminologyError::InvalidArgument(_)
    ));
    // The failed commit left nothing behind.
    assert!(concepts
        .find("100001000", PATH)
        .await
        .unwrap()
        .unwrap()
        .active);

    let mut bad_association = concepts.find("100001000", PATH).await.unwrap().unwrap();
    bad_association.active = false;
    bad_association
        .association_targets
        .entry("RELATED_SOMEHOW".to_string())
        .or_default()
        .insert("100002000".to_string());
    assert!(matches!(
        concepts.update(bad_association, PATH).await.unwrap_err(),
        snowstorm::TerminologyError::InvalidArgument(_)
    ));
}

#[tokio::test]
async fn deleting_a_concept_cascades_to_descriptions_and_members() {
    let (store, registry, concepts) = new_in_memory();
    setup_branches(&registry);

    let concept = Concept::primitive("100001000")
        .with_description(
            Description::synonym("Heart")
                .with_id("100001011")
                .preferred_in(constants::US_EN_LANGUAGE_REFERENCE_SET),
        )
        .with_relationship(Relationship::isa("100009000").with_id("100001025"));
    concepts.create(concept, PATH).await.unwrap();

    // An extra member referencing the concept from elsewhere.
    let simple_member =
        ReferenceSetMember::new(constants::CORE_MODULE, "723264001", "100001000");
    ReferenceSetMemberService::create_member(store.as_ref(), &registry, PATH, simple_member)
        .await
        .unwrap();

    concepts.delete_concept("100001000", PATH).await.unwrap();

    assert!(concepts.find("100001000", PATH).await.unwrap().is_none());
    for referenced in ["100001000", "100001011"] {
        let members = ReferenceSetMemberService::find_members(
            store.as_ref(),
            &registry,
            PATH,
            &MemberSearchRequest::referenced_component(referenced),
            PageRequest::of(0, 10),
        )
        .await
        .unwrap();
        assert_eq!(members.total, 0, "members still visible for {}", referenced);
    }
}

#[tokio::test]
async fn inactive_unreleased_members_are_garbage_collected() {
    let (store, registry, _concepts) = new_in_memory();
    setup_branches(&registry);

    let mut member =
        ReferenceSetMember::new(constants::CORE_MODULE, "723264001", "100001000");
    member.active = false;
    let saved =
        ReferenceSetMemberService::create_member(store.as_ref(), &registry, PATH, member)
            .await
            .unwrap();

    let found =
        ReferenceSetMemberService::find_member(store.as_ref(), &registry, PATH, &saved.member_id)
            .await
            .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn deleting_a_missing_member_is_not_found() {
    let (store, registry, _concepts) = new_in_memory();
    setup_branches(&registry);
    let err = ReferenceSetMemberService::delete_member(
        store.as_ref(),
        &registry,
        PATH,
        "0000-not-a-member",
    )
    .await
    .unwrap_err();
    assert!(matches!(err, snowstorm::TerminologyError::NotFound(_)));
}

#[tokio::test]
async fn released_fields_pin_the_effective_time() {
    let mut concept = Concept::primitive("100001000");
    concept.release_component(20020131);
    assert_eq!(concept.effective_time, Some(20020131));
    assert!(concept.is_released());

    // Any released-field edit clears the effective time.
    concept.active = false;
    concept.update_effective_time();
    assert_eq!(concept.effective_time, None);

    // Restoring the released state restores it.
    concept.active = true;
    concept.update_effective_time();
    assert_eq!(concept.effective_time, Some(20020131));
}

//! Branch registry semantics, inheritance, shadowing, rebase conflicts and
//! promotion.

use snowstorm::model::constants;
use snowstorm::store::traits::MaintenanceStore;
use snowstorm::{
    new_in_memory, BranchMergeService, Concept, Description, Relationship, TerminologyError,
};

#[tokio::test]
async fn create_and_find_branches() {
    let (_store, registry, _concepts) = new_in_memory();

    assert!(registry.find("MAIN").is_none());
    registry.create("MAIN").unwrap();

    let main = registry.find("MAIN").unwrap();
    assert_eq!(main.path, "MAIN");
    assert!(main.base.is_none());
    assert!(main.head > 0);

    assert!(registry.find("MAIN/A").is_none());
    registry.create("MAIN/A").unwrap();
    let a = registry.find("MAIN/A").unwrap();
    assert_eq!(a.path, "MAIN/A");
    assert_eq!(a.parent_path(), Some("MAIN"));
    assert_eq!(a.base, Some(registry.find("MAIN").unwrap().head));

    assert!(registry.find("MAIN").is_some());
    assert_eq!(registry.children("MAIN").len(), 1);

    registry.delete_all();
    assert!(registry.find("MAIN").is_none());
}

#[tokio::test]
async fn missing_parent_and_duplicates_fail() {
    let (_store, registry, _concepts) = new_in_memory();
    assert!(matches!(
        registry.create("MAIN/A").unwrap_err(),
        TerminologyError::NotFound(_)
    ));
    registry.create("MAIN").unwrap();
    registry.create("MAIN/A").unwrap();
    assert!(matches!(
        registry.create("MAIN/A").unwrap_err(),
        TerminologyError::Conflict { .. }
    ));
}

#[tokio::test]
async fn child_inherits_parent_content_at_fork() {
    let (_store, registry, concepts) = new_in_memory();
    registry.create("MAIN").unwrap();

    concepts
        .create(Concept::primitive("100001000"), "MAIN")
        .await
        .unwrap();
    registry.create("MAIN/A").unwrap();

    // Visible on the child from the moment of creation.
    assert!(concepts.find("100001000", "MAIN/A").await.unwrap().is_some());

    // Content committed to the parent after the fork stays invisible.
    concepts
        .create(Concept::primitive("100002000"), "MAIN")
        .await
        .unwrap();
    assert!(concepts.find("100002000", "MAIN").await.unwrap().is_some());
    assert!(concepts.find("100002000", "MAIN/A").await.unwrap().is_none());
}

#[tokio::test]
async fn child_edits_shadow_parent_and_never_leak_up() {
    let (_store, registry, concepts) = new_in_memory();
    registry.create("MAIN").unwrap();
    concepts
        .create(Concept::primitive("100001000"), "MAIN")
        .await
        .unwrap();
    registry.create("MAIN/A").unwrap();

    let mut edited = concepts.find("100001000", "MAIN/A").await.unwrap().unwrap();
    edited.active = false;
    concepts.update(edited, "MAIN/A").await.unwrap();

    assert!(!concepts
        .find("100001000", "MAIN/A")
        .await
        .unwrap()
        .unwrap()
        .active);
    assert!(concepts
        .find("100001000", "MAIN")
        .await
        .unwrap()
        .unwrap()
        .active);
}

#[tokio::test]
async fn rebase_surfaces_conflicting_term_edits() {
    let (store, registry, concepts) = new_in_memory();
    registry.create("MAIN").unwrap();

    let concept = Concept::primitive("100001000").with_description(
        Description::synonym("Original term")
            .with_id("100001011")
            .preferred_in(constants::US_EN_LANGUAGE_REFERENCE_SET),
    );
    concepts.create(concept, "MAIN").await.unwrap();
    registry.create("MAIN/A").unwrap();

    // Parent and child edit the same description's term since the fork.
    let mut on_parent = concepts.find("100001000", "MAIN").await.unwrap().unwrap();
    on_parent.descriptions[0].term = "Parent term".to_string();
    concepts.update(on_parent, "MAIN").await.unwrap();

    let mut on_child = concepts.find("100001000", "MAIN/A").await.unwrap().unwrap();
    on_child.descriptions[0].term = "Child term".to_string();
    concepts.update(on_child, "MAIN/A").await.unwrap();

    let err = BranchMergeService::rebase(store.as_ref(), &registry, "MAIN/A")
        .await
        .unwrap_err();
    match err {
        TerminologyError::Conflict { component_ids, .. } => {
            assert!(component_ids.contains(&"100001011".to_string()));
        }
        other => panic!("expected conflict, got {:?}", other),
    }

    // No auto-merge: both sides keep their own term.
    let child_view = concepts.find("100001000", "MAIN/A").await.unwrap().unwrap();
    assert_eq!(child_view.descriptions[0].term, "Child term");
    let parent_view = concepts.find("100001000", "MAIN").await.unwrap().unwrap();
    assert_eq!(parent_view.descriptions[0].term, "Parent term");
}

#[tokio::test]
async fn rebase_pulls_parent_changes_into_child() {
    let (store, registry, concepts) = new_in_memory();
    registry.create("MAIN").unwrap();
    registry.create("MAIN/A").unwrap();

    concepts
        .create(Concept::primitive("100001000"), "MAIN")
        .await
        .unwrap();
    assert!(concepts.find("100001000", "MAIN/A").await.unwrap().is_none());

    BranchMergeService::rebase(store.as_ref(), &registry, "MAIN/A")
        .await
        .unwrap();
    assert!(concepts.find("100001000", "MAIN/A").await.unwrap().is_some());
    let child = registry.find("MAIN/A").unwrap();
    assert_eq!(child.base, Some(registry.find("MAIN").unwrap().head));
}

#[tokio::test]
async fn promote_replays_child_changes_and_empties_the_child() {
    let (store, registry, concepts) = new_in_memory();
    registry.create("MAIN").unwrap();
    registry.create("MAIN/A").unwrap();

    let concept = Concept::primitive("100001000")
        .with_relationship(Relationship::isa("100009000").with_id("100001025"));
    concepts.create(concept, "MAIN/A").await.unwrap();
    assert!(concepts.find("100001000", "MAIN").await.unwrap().is_none());

    BranchMergeService::promote(store.as_ref(), &registry, "MAIN/A")
        .await
        .unwrap();

    let promoted = concepts.find("100001000", "MAIN").await.unwrap().unwrap();
    assert_eq!(promoted.relationships.len(), 1);
    // Still visible on the child through inheritance, but no longer
    // authored there.
    assert!(concepts.find("100001000", "MAIN/A").await.unwrap().is_some());
    let authored = store.authored_rows("MAIN/A").await.unwrap();
    assert!(authored.is_empty());
}

#[tokio::test]
async fn promote_requires_a_current_base() {
    let (store, registry, concepts) = new_in_memory();
    registry.create("MAIN").unwrap();
    registry.create("MAIN/A").unwrap();
    concepts
        .create(Concept::primitive("100002000"), "MAIN")
        .await
        .unwrap();

    let err = BranchMergeService::promote(store.as_ref(), &registry, "MAIN/A")
        .await
        .unwrap_err();
    assert!(matches!(err, TerminologyError::Conflict { .. }));
}

//! ECL evaluation over the semantic index: operators, wildcard paging,
//! refinement, member-of, and the unsupported subset boundary.

use snowstorm::model::constants;
use snowstorm::{
    new_in_memory, Axiom, CancellationToken, Concept, EclQueryService, PageRequest,
    ReferenceSetMember, ReferenceSetMemberService, Relationship, TerminologyError,
};
use std::collections::BTreeSet;

const PATH: &str = "MAIN";

async fn query(
    store: &snowstorm::MemoryStore,
    registry: &snowstorm::BranchService,
    ecl: &str,
) -> BTreeSet<String> {
    EclQueryService::execute(
        store,
        registry,
        PATH,
        ecl,
        false,
        PageRequest::of(0, 1000),
        &CancellationToken::new(),
    )
    .await
    .unwrap()
    .items
    .into_iter()
    .collect()
}

fn ids(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// ISA edges: B→A, C→B, D→A.
async fn build_small_hierarchy(concepts: &snowstorm::ConceptService<snowstorm::MemoryStore>) {
    let a = Concept::primitive("10000100");
    let b = Concept::primitive("10000200").with_relationship(Relationship::isa("10000100"));
    let c = Concept::primitive("10000300").with_relationship(Relationship::isa("10000200"));
    let d = Concept::primitive("10000400").with_relationship(Relationship::isa("10000100"));
    concepts
        .create_update_multiple(vec![a, b, c, d], PATH)
        .await
        .unwrap();
}

#[tokio::test]
async fn descendant_and_ancestor_operators() {
    let (store, registry, concepts) = new_in_memory();
    registry.create(PATH).unwrap();
    build_small_hierarchy(&concepts).await;

    assert_eq!(
        query(&store, &registry, "<<10000100").await,
        ids(&["10000100", "10000200", "10000300", "10000400"])
    );
    assert_eq!(
        query(&store, &registry, "<10000100").await,
        ids(&["10000200", "10000300", "10000400"])
    );
    assert_eq!(
        query(&store, &registry, ">10000300").await,
        ids(&["10000100", "10000200"])
    );
    assert_eq!(
        query(&store, &registry, ">>10000300").await,
        ids(&["10000100", "10000200", "10000300"])
    );
    assert_eq!(
        query(&store, &registry, "*").await,
        ids(&["10000100", "10000200", "10000300", "10000400"])
    );
    assert_eq!(query(&store, &registry, "10000200").await, ids(&["10000200"]));
}

#[tokio::test]
async fn refinement_intersects_focus_with_relationship_existence() {
    let (store, registry, concepts) = new_in_memory();
    registry.create(PATH).unwrap();

    let root = Concept::primitive("10000100");
    let x = Concept::primitive("10000200")
        .with_relationship(Relationship::isa("10000100"))
        .with_relationship(Relationship::new("72705000", "10000900"));
    let y = Concept::primitive("10000300").with_relationship(Relationship::isa("10000100"));
    concepts
        .create_update_multiple(vec![root, x, y], PATH)
        .await
        .unwrap();

    assert_eq!(
        query(&store, &registry, "<<10000100 : 72705000 = 10000900").await,
        ids(&["10000200"])
    );
    assert_eq!(
        query(&store, &registry, "* : 72705000 = 10000900").await,
        ids(&["10000200"])
    );
    assert_eq!(
        query(&store, &registry, "<<10000100 : 72705000 = 10000100").await,
        ids(&[])
    );
}

#[tokio::test]
async fn wildcard_pagination_is_stable_and_disjoint() {
    let (store, registry, concepts) = new_in_memory();
    registry.create(PATH).unwrap();

    let mut batch = vec![Concept::primitive("10000100")];
    for i in 1..=20 {
        batch.push(
            Concept::primitive(&format!("{}", 10000100 + i * 100))
                .with_relationship(Relationship::isa("10000100")),
        );
    }
    concepts.create_update_multiple(batch, PATH).await.unwrap();

    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut offset = 0;
    loop {
        let page = EclQueryService::execute(
            store.as_ref(),
            &registry,
            PATH,
            "*",
            false,
            PageRequest::of(offset, 7),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(page.total, 21);
        for id in &page.items {
            assert!(seen.insert(id.clone()), "page overlap on {}", id);
        }
        if page.items.is_empty() {
            break;
        }
        offset += 7;
    }
    assert_eq!(seen.len(), 21);
}

#[tokio::test]
async fn member_of_expands_a_reference_set() {
    let (store, registry, concepts) = new_in_memory();
    registry.create(PATH).unwrap();
    build_small_hierarchy(&concepts).await;

    for referenced in ["10000200", "10000400"] {
        let member =
            ReferenceSetMember::new(constants::CORE_MODULE, "723264001", referenced);
        ReferenceSetMemberService::create_member(store.as_ref(), &registry, PATH, member)
            .await
            .unwrap();
    }

    assert_eq!(
        query(&store, &registry, "^723264001").await,
        ids(&["10000200", "10000400"])
    );
}

#[tokio::test]
async fn stated_form_follows_axioms() {
    let (store, registry, concepts) = new_in_memory();
    registry.create(PATH).unwrap();

    let parent = Concept::primitive("10000100");
    let child = Concept::primitive("10000200").with_class_axiom(Axiom::new(
        constants::PRIMITIVE,
        vec![Relationship::isa("10000100")],
    ));
    concepts
        .create_update_multiple(vec![parent, child], PATH)
        .await
        .unwrap();

    let stated = EclQueryService::execute(
        store.as_ref(),
        &registry,
        PATH,
        "<10000100",
        true,
        PageRequest::of(0, 10),
        &CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(stated.items, vec!["10000200".to_string()]);

    // No inferred ISA rows were written, so the inferred form is empty.
    assert_eq!(query(&store, &registry, "<10000100").await, ids(&[]));
}

#[tokio::test]
async fn unsupported_constructs_are_rejected() {
    let (store, registry, concepts) = new_in_memory();
    registry.create(PATH).unwrap();
    build_small_hierarchy(&concepts).await;

    for ecl in [
        "10000100 AND 10000200",
        "10000100 OR 10000200",
        "10000100 MINUS 10000200",
        "10000100 . 72705000",
        "<<10000100 : 1 = 2, 3 = 4",
    ] {
        let err = EclQueryService::execute(
            store.as_ref(),
            &registry,
            PATH,
            ecl,
            false,
            PageRequest::of(0, 10),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(
            matches!(err, TerminologyError::Unsupported(_)),
            "'{}' should be unsupported",
            ecl
        );
    }
}

#[tokio::test]
async fn cancelled_queries_abandon_work() {
    let (store, registry, concepts) = new_in_memory();
    registry.create(PATH).unwrap();
    build_small_hierarchy(&concepts).await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = EclQueryService::execute(
        store.as_ref(),
        &registry,
        PATH,
        "<<10000100",
        false,
        PageRequest::of(0, 10),
        &cancel,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, TerminologyError::Internal(_)));
}

//! In-memory component store over the generic search index, implementing
//! the append-only version-control semantics: new versions start at the
//! commit timepoint, superseded versions get end-stamped, deletions write
//! tombstones (or purge never-released rows outright).

use async_trait::async_trait;
use log::debug;

use crate::error::Result;
use crate::model::component::Timepoint;
use crate::model::{
    Branch, Concept, Description, QueryConcept, ReferenceSetMember, Relationship, SnomedComponent,
};
use crate::store::index::{
    BoolQuery, IndexDocument, IndexValue, Page, PageRequest, Query, SearchIndex,
};
use crate::store::traits::{
    AuthoredRows, ChangedComponents, ConceptStore, DescriptionStore, MaintenanceStore,
    MemberSearchRequest, QueryConceptStore, RefsetMemberStore, RelationshipSearch,
    RelationshipStore, Store,
};
use crate::vc::{BranchCriteria, Commit};

/// Encoding for an open-ended version row; `end` is absent on the row
/// itself but +infinity for range purposes.
const END_OPEN: i64 = i64::MAX;

fn envelope_values(
    meta: &crate::model::VersionMeta,
    field: &str,
) -> Option<Vec<IndexValue>> {
    match field {
        "path" => Some(vec![IndexValue::keyword(&meta.path)]),
        "start" => Some(vec![IndexValue::Long(meta.start)]),
        "end" => Some(vec![IndexValue::Long(meta.end.unwrap_or(END_OPEN))]),
        "deleted" => Some(vec![IndexValue::Flag(meta.deleted)]),
        _ => None,
    }
}

fn version_key(id: &str, meta: &crate::model::VersionMeta) -> String {
    format!("{}|{}|{}", id, meta.path, meta.start)
}

fn numeric_sort_key(id: &str, meta: &crate::model::VersionMeta) -> String {
    format!("{:0>20}|{}|{}", id, meta.path, meta.start)
}

impl IndexDocument for Concept {
    fn doc_key(&self) -> String {
        version_key(&self.concept_id, &self.meta)
    }

    fn field_values(&self, field: &str) -> Vec<IndexValue> {
        if let Some(values) = envelope_values(&self.meta, field) {
            return values;
        }
        match field {
            "id" | "conceptId" => vec![IndexValue::keyword(&self.concept_id)],
            "active" => vec![IndexValue::Flag(self.active)],
            "moduleId" => vec![IndexValue::keyword(&self.module_id)],
            "definitionStatusId" => vec![IndexValue::keyword(&self.definition_status_id)],
            _ => vec![],
        }
    }

    fn sort_key(&self) -> String {
        numeric_sort_key(&self.concept_id, &self.meta)
    }
}

impl IndexDocument for Description {
    fn doc_key(&self) -> String {
        version_key(&self.description_id, &self.meta)
    }

    fn field_values(&self, field: &str) -> Vec<IndexValue> {
        if let Some(values) = envelope_values(&self.meta, field) {
            return values;
        }
        match field {
            "id" | "descriptionId" => vec![IndexValue::keyword(&self.description_id)],
            "conceptId" => vec![IndexValue::keyword(&self.concept_id)],
            "active" => vec![IndexValue::Flag(self.active)],
            "typeId" => vec![IndexValue::keyword(&self.type_id)],
            "languageCode" => vec![IndexValue::keyword(&self.language_code)],
            _ => vec![],
        }
    }

    fn sort_key(&self) -> String {
        numeric_sort_key(&self.description_id, &self.meta)
    }
}

impl IndexDocument for Relationship {
    fn doc_key(&self) -> String {
        version_key(&self.relationship_id, &self.meta)
    }

    fn field_values(&self, field: &str) -> Vec<IndexValue> {
        if let Some(values) = envelope_values(&self.meta, field) {
            return values;
        }
        match field {
            "id" | "relationshipId" => vec![IndexValue::keyword(&self.relationship_id)],
            "active" => vec![IndexValue::Flag(self.active)],
            "sourceId" => vec![IndexValue::keyword(&self.source_id)],
            "destinationId" => vec![IndexValue::keyword(&self.destination_id)],
            "typeId" => vec![IndexValue::keyword(&self.type_id)],
            "characteristicTypeId" => vec![IndexValue::keyword(&self.characteristic_type_id)],
            "group" => vec![IndexValue::Long(self.group as i64)],
            _ => vec![],
        }
    }

    fn sort_key(&self) -> String {
        numeric_sort_key(&self.relationship_id, &self.meta)
    }
}

impl IndexDocument for ReferenceSetMember {
    fn doc_key(&self) -> String {
        version_key(&self.member_id, &self.meta)
    }

    fn field_values(&self, field: &str) -> Vec<IndexValue> {
        if let Some(values) = envelope_values(&self.meta, field) {
            return values;
        }
        if let Some(additional) = field.strip_prefix("additionalFields.") {
            return self
                .additional_fields
                .get(additional)
                .map(|v| vec![IndexValue::keyword(v)])
                .unwrap_or_default();
        }
        match field {
            "id" | "memberId" => vec![IndexValue::keyword(&self.member_id)],
            "active" => vec![IndexValue::Flag(self.active)],
            "refsetId" => vec![IndexValue::keyword(&self.refset_id)],
            "referencedComponentId" => vec![IndexValue::keyword(&self.referenced_component_id)],
            "conceptId" => self
                .concept_id
                .as_ref()
                .map(|v| vec![IndexValue::keyword(v)])
                .unwrap_or_default(),
            _ => vec![],
        }
    }

    fn sort_key(&self) -> String {
        format!("{}|{}|{}", self.member_id, self.meta.path, self.meta.start)
    }
}

impl IndexDocument for QueryConcept {
    fn doc_key(&self) -> String {
        version_key(&self.concept_id_form(), &self.meta)
    }

    fn field_values(&self, field: &str) -> Vec<IndexValue> {
        if let Some(values) = envelope_values(&self.meta, field) {
            return values;
        }
        match field {
            "id" | "conceptIdForm" => vec![IndexValue::keyword(self.concept_id_form())],
            "conceptId" => vec![IndexValue::Long(self.concept_id as i64)],
            "stated" => vec![IndexValue::Flag(self.stated)],
            "parents" => self
                .parents
                .iter()
                .map(|p| IndexValue::Long(*p as i64))
                .collect(),
            "ancestors" => self
                .ancestors
                .iter()
                .map(|a| IndexValue::Long(*a as i64))
                .collect(),
            _ => vec![],
        }
    }

    fn sort_key(&self) -> String {
        format!("{:020}|{}|{}|{}", self.concept_id, self.stated, self.meta.path, self.meta.start)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    concepts: SearchIndex<Concept>,
    descriptions: SearchIndex<Description>,
    relationships: SearchIndex<Relationship>,
    members: SearchIndex<ReferenceSetMember>,
    query_concepts: SearchIndex<QueryConcept>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test support: drop every row.
    pub fn clear(&self) {
        self.concepts.clear();
        self.descriptions.clear();
        self.relationships.clear();
        self.members.clear();
        self.query_concepts.clear();
    }
}

fn id_on_path(id: &str, path: &str) -> Query {
    BoolQuery::new()
        .must(Query::term("id", IndexValue::keyword(id)))
        .must(Query::term("path", IndexValue::keyword(path)))
        .build()
}

/// The open row for `id` on `path` written before this commit.
fn open_predecessor(id: &str, path: &str, timepoint: Timepoint) -> Query {
    BoolQuery::new()
        .must(Query::term("id", IndexValue::keyword(id)))
        .must(Query::term("path", IndexValue::keyword(path)))
        .must(Query::term("end", IndexValue::Long(END_OPEN)))
        .must(Query::lte("start", timepoint - 1))
        .build()
}

/// Version-control write path shared by every component type.
fn do_save_batch<T>(index: &SearchIndex<T>, components: Vec<T>, commit: &Commit) -> Vec<T>
where
    T: SnomedComponent + IndexDocument,
{
    let timepoint = commit.timepoint();
    let path = commit.path().to_string();
    let mut to_upsert = Vec::new();
    let mut persisted = Vec::new();

    for mut component in components {
        if !component.is_changed() && !component.is_deleted() {
            persisted.push(component);
            continue;
        }
        let id = component.component_id();

        // Close the superseded version on this path.
        index.update_where(&open_predecessor(&id, &path, timepoint), |row| {
            row.meta_mut().end = Some(timepoint);
        });

        if component.is_deleted() && !component.is_released() {
            // Never published: remove the version rows outright. A tombstone
            // is only needed while ancestor paths still hold versions.
            index.delete_where(&id_on_path(&id, &path));
            let shadowed = BoolQuery::new()
                .must(Query::term("id", IndexValue::keyword(&id)))
                .build();
            if index.stream(&shadowed).is_empty() {
                persisted.push(component);
                continue;
            }
        }

        let meta = component.meta_mut();
        meta.path = path.clone();
        meta.start = timepoint;
        meta.end = None;
        to_upsert.push(component.clone());
        persisted.push(component);
    }

    debug!(
        "Persisted {} row(s) on {} at {}",
        to_upsert.len(),
        path,
        timepoint
    );
    index.bulk_upsert(to_upsert);
    persisted
}

fn criteria_with(criteria: &BranchCriteria, extra: Vec<Query>) -> Query {
    let mut query = BoolQuery::new().must(criteria.to_query());
    for clause in extra {
        query = query.must(clause);
    }
    query.build()
}

// Only identity fields go into the index query; a newer version on a nearer
// path may have changed any mutable field, so those predicates apply after
// the collapse picks the visible version.

fn member_query(search: &MemberSearchRequest, criteria: &BranchCriteria) -> Query {
    let mut extra = Vec::new();
    if let Some(refset_id) = &search.refset_id {
        extra.push(Query::term("refsetId", IndexValue::keyword(refset_id)));
    }
    if let Some(ids) = &search.referenced_component_ids {
        extra.push(Query::terms(
            "referencedComponentId",
            ids.iter().map(IndexValue::keyword).collect(),
        ));
    }
    if let Some(member_ids) = &search.member_ids {
        extra.push(Query::terms(
            "memberId",
            member_ids.iter().map(IndexValue::keyword).collect(),
        ));
    }
    criteria_with(criteria, extra)
}

fn member_matches(member: &ReferenceSetMember, search: &MemberSearchRequest) -> bool {
    if search.active.map_or(false, |a| member.active != a) {
        return false;
    }
    if let Some(target) = &search.target_component_id {
        if member.additional_field(crate::model::refset::fields::TARGET_COMPONENT_ID)
            != Some(target.as_str())
        {
            return false;
        }
    }
    true
}

fn relationship_query(search: &RelationshipSearch, criteria: &BranchCriteria) -> Query {
    let mut extra = Vec::new();
    if let Some(ids) = &search.relationship_ids {
        extra.push(Query::terms(
            "id",
            ids.iter().map(IndexValue::keyword).collect(),
        ));
    }
    if let Some(source_ids) = &search.source_ids {
        extra.push(Query::terms(
            "sourceId",
            source_ids.iter().map(IndexValue::keyword).collect(),
        ));
    }
    criteria_with(criteria, extra)
}

fn relationship_matches(relationship: &Relationship, search: &RelationshipSearch) -> bool {
    if search.active.map_or(false, |a| relationship.active != a) {
        return false;
    }
    if let Some(type_ids) = &search.type_ids {
        if !type_ids.contains(&relationship.type_id) {
            return false;
        }
    }
    if let Some(destination_ids) = &search.destination_ids {
        if !destination_ids.contains(&relationship.destination_id) {
            return false;
        }
    }
    if let Some(characteristic) = &search.characteristic_type_id {
        if &relationship.characteristic_type_id != characteristic {
            return false;
        }
    }
    true
}

fn page_after_collapse<T: Clone>(collapsed: Vec<T>, request: PageRequest) -> Page<T> {
    let total = collapsed.len();
    let items = collapsed
        .into_iter()
        .skip(request.offset)
        .take(request.limit)
        .collect();
    Page {
        items,
        total,
        offset: request.offset,
        limit: request.limit,
    }
}

#[async_trait]
impl ConceptStore for MemoryStore {
    async fn save_concepts(&self, concepts: Vec<Concept>, commit: &Commit) -> Result<Vec<Concept>> {
        Ok(do_save_batch(&self.concepts, concepts, commit))
    }

    async fn find_concept(
        &self,
        concept_id: &str,
        criteria: &BranchCriteria,
    ) -> Result<Option<Concept>> {
        let query = criteria_with(
            criteria,
            vec![Query::term("id", IndexValue::keyword(concept_id))],
        );
        let rows = self.concepts.stream(&query);
        Ok(criteria.collapse(rows).into_iter().next())
    }

    async fn find_concepts(
        &self,
        concept_ids: &[String],
        criteria: &BranchCriteria,
    ) -> Result<Vec<Concept>> {
        if concept_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = criteria_with(
            criteria,
            vec![Query::terms(
                "id",
                concept_ids.iter().map(IndexValue::keyword).collect(),
            )],
        );
        Ok(criteria.collapse(self.concepts.stream(&query)))
    }

    async fn search_concepts(
        &self,
        criteria: &BranchCriteria,
        request: PageRequest,
    ) -> Result<Page<Concept>> {
        let rows = self.concepts.stream(&criteria.to_query());
        Ok(page_after_collapse(criteria.collapse(rows), request))
    }
}

#[async_trait]
impl DescriptionStore for MemoryStore {
    async fn save_descriptions(
        &self,
        descriptions: Vec<Description>,
        commit: &Commit,
    ) -> Result<Vec<Description>> {
        Ok(do_save_batch(&self.descriptions, descriptions, commit))
    }

    async fn find_descriptions(
        &self,
        concept_ids: &[String],
        criteria: &BranchCriteria,
    ) -> Result<Vec<Description>> {
        if concept_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = criteria_with(
            criteria,
            vec![Query::terms(
                "conceptId",
                concept_ids.iter().map(IndexValue::keyword).collect(),
            )],
        );
        Ok(criteria.collapse(self.descriptions.stream(&query)))
    }

    async fn find_descriptions_by_ids(
        &self,
        description_ids: &[String],
        criteria: &BranchCriteria,
    ) -> Result<Vec<Description>> {
        if description_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = criteria_with(
            criteria,
            vec![Query::terms(
                "id",
                description_ids.iter().map(IndexValue::keyword).collect(),
            )],
        );
        Ok(criteria.collapse(self.descriptions.stream(&query)))
    }
}

#[async_trait]
impl RelationshipStore for MemoryStore {
    async fn save_relationships(
        &self,
        relationships: Vec<Relationship>,
        commit: &Commit,
    ) -> Result<Vec<Relationship>> {
        Ok(do_save_batch(&self.relationships, relationships, commit))
    }

    async fn find_relationships(
        &self,
        search: &RelationshipSearch,
        criteria: &BranchCriteria,
    ) -> Result<Vec<Relationship>> {
        let query = relationship_query(search, criteria);
        let collapsed = criteria.collapse(self.relationships.stream(&query));
        Ok(collapsed
            .into_iter()
            .filter(|r| relationship_matches(r, search))
            .collect())
    }
}

#[async_trait]
impl RefsetMemberStore for MemoryStore {
    async fn save_members(
        &self,
        members: Vec<ReferenceSetMember>,
        commit: &Commit,
    ) -> Result<Vec<ReferenceSetMember>> {
        Ok(do_save_batch(&self.members, members, commit))
    }

    async fn find_members(
        &self,
        search: &MemberSearchRequest,
        criteria: &BranchCriteria,
        request: PageRequest,
    ) -> Result<Page<ReferenceSetMember>> {
        let members = self.stream_members(search, criteria).await?;
        Ok(page_after_collapse(members, request))
    }

    async fn stream_members(
        &self,
        search: &MemberSearchRequest,
        criteria: &BranchCriteria,
    ) -> Result<Vec<ReferenceSetMember>> {
        let query = member_query(search, criteria);
        let collapsed = criteria.collapse(self.members.stream(&query));
        Ok(collapsed
            .into_iter()
            .filter(|m| member_matches(m, search))
            .collect())
    }
}

#[async_trait]
impl QueryConceptStore for MemoryStore {
    async fn save_query_concepts(
        &self,
        rows: Vec<QueryConcept>,
        commit: &Commit,
    ) -> Result<Vec<QueryConcept>> {
        let timepoint = commit.timepoint();
        let path = commit.path().to_string();
        let mut to_upsert = Vec::new();
        for mut row in rows {
            let id_form = row.concept_id_form();
            self.query_concepts
                .update_where(&open_predecessor(&id_form, &path, timepoint), |existing| {
                    existing.meta.end = Some(timepoint);
                });
            row.meta.path = path.clone();
            row.meta.start = timepoint;
            row.meta.end = None;
            to_upsert.push(row);
        }
        self.query_concepts.bulk_upsert(to_upsert.clone());
        Ok(to_upsert)
    }

    async fn find_query_concepts(
        &self,
        concept_ids: &[u64],
        stated: bool,
        criteria: &BranchCriteria,
    ) -> Result<Vec<QueryConcept>> {
        if concept_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = criteria_with(
            criteria,
            vec![
                Query::term("stated", IndexValue::Flag(stated)),
                Query::terms(
                    "conceptId",
                    concept_ids.iter().map(|id| IndexValue::Long(*id as i64)).collect(),
                ),
            ],
        );
        Ok(criteria.collapse_query_concepts(self.query_concepts.stream(&query)))
    }

    async fn concepts_with_ancestor(
        &self,
        ancestor: u64,
        stated: bool,
        criteria: &BranchCriteria,
    ) -> Result<Vec<u64>> {
        let query = criteria_with(
            criteria,
            vec![Query::term("stated", IndexValue::Flag(stated))],
        );
        let rows = criteria.collapse_query_concepts(self.query_concepts.stream(&query));
        // Ancestor membership is re-checked after collapse; a shadowing
        // child row may have dropped the edge.
        Ok(rows
            .into_iter()
            .filter(|row| row.ancestors.contains(&ancestor))
            .map(|row| row.concept_id)
            .collect())
    }

    async fn stream_query_concepts(
        &self,
        stated: bool,
        criteria: &BranchCriteria,
    ) -> Result<Vec<QueryConcept>> {
        let query = criteria_with(
            criteria,
            vec![Query::term("stated", IndexValue::Flag(stated))],
        );
        Ok(criteria.collapse_query_concepts(self.query_concepts.stream(&query)))
    }

    async fn remove_query_concept_rows(&self, path: &str, stated: bool) -> Result<usize> {
        let query = BoolQuery::new()
            .must(Query::term("path", IndexValue::keyword(path)))
            .must(Query::term("stated", IndexValue::Flag(stated)))
            .build();
        Ok(self.query_concepts.delete_where(&query))
    }

    async fn changed_query_concepts_since(
        &self,
        path: &str,
        since: Timepoint,
        stated: bool,
    ) -> Result<Vec<u64>> {
        let query = BoolQuery::new()
            .must(Query::term("path", IndexValue::keyword(path)))
            .must(Query::gt("start", since))
            .must(Query::term("stated", IndexValue::Flag(stated)))
            .build();
        let mut ids: Vec<u64> = self
            .query_concepts
            .stream(&query)
            .into_iter()
            .map(|row| row.concept_id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }
}

fn started_at(path: &str, timepoint: Timepoint) -> Query {
    BoolQuery::new()
        .must(Query::term("path", IndexValue::keyword(path)))
        .must(Query::term("start", IndexValue::Long(timepoint)))
        .build()
}

fn ended_at(path: &str, timepoint: Timepoint) -> Query {
    BoolQuery::new()
        .must(Query::term("path", IndexValue::keyword(path)))
        .must(Query::term("end", IndexValue::Long(timepoint)))
        .build()
}

fn on_path(path: &str) -> Query {
    Query::term("path", IndexValue::keyword(path))
}

fn current_on_path(path: &str) -> Query {
    BoolQuery::new()
        .must(Query::term("path", IndexValue::keyword(path)))
        .must(Query::term("end", IndexValue::Long(END_OPEN)))
        .build()
}

fn changed_on_path(path: &str, since: Timepoint) -> Query {
    BoolQuery::new()
        .must(Query::term("path", IndexValue::keyword(path)))
        .must(Query::gt("start", since))
        .build()
}

#[async_trait]
impl MaintenanceStore for MemoryStore {
    async fn rollback_commit(&self, path: &str, timepoint: Timepoint) -> Result<()> {
        let started = started_at(path, timepoint);
        let ended = ended_at(path, timepoint);
        let mut removed = 0;
        removed += self.concepts.delete_where(&started);
        removed += self.descriptions.delete_where(&started);
        removed += self.relationships.delete_where(&started);
        removed += self.members.delete_where(&started);
        removed += self.query_concepts.delete_where(&started);
        self.concepts.update_where(&ended, |row| row.meta.end = None);
        self.descriptions.update_where(&ended, |row| row.meta.end = None);
        self.relationships.update_where(&ended, |row| row.meta.end = None);
        self.members.update_where(&ended, |row| row.meta.end = None);
        self.query_concepts.update_where(&ended, |row| row.meta.end = None);
        debug!("Rolled back {} row(s) on {} at {}", removed, path, timepoint);
        Ok(())
    }

    async fn purge_orphaned(&self, branch: &Branch) -> Result<usize> {
        let orphan_start = BoolQuery::new()
            .must(Query::term("path", IndexValue::keyword(&branch.path)))
            .must(Query::gt("start", branch.head))
            .build();
        let orphan_end = BoolQuery::new()
            .must(Query::term("path", IndexValue::keyword(&branch.path)))
            .must(Query::gt("end", branch.head))
            .must_not(Query::term("end", IndexValue::Long(END_OPEN)))
            .build();
        let mut purged = 0;
        purged += self.concepts.delete_where(&orphan_start);
        purged += self.descriptions.delete_where(&orphan_start);
        purged += self.relationships.delete_where(&orphan_start);
        purged += self.members.delete_where(&orphan_start);
        purged += self.query_concepts.delete_where(&orphan_start);
        self.concepts.update_where(&orphan_end, |row| row.meta.end = None);
        self.descriptions.update_where(&orphan_end, |row| row.meta.end = None);
        self.relationships.update_where(&orphan_end, |row| row.meta.end = None);
        self.members.update_where(&orphan_end, |row| row.meta.end = None);
        self.query_concepts.update_where(&orphan_end, |row| row.meta.end = None);
        Ok(purged)
    }

    async fn changed_components_since(
        &self,
        path: &str,
        since: Timepoint,
    ) -> Result<ChangedComponents> {
        let query = changed_on_path(path, since);
        let mut changed = ChangedComponents::default();
        changed.concepts = self
            .concepts
            .stream(&query)
            .into_iter()
            .map(|c| c.concept_id)
            .collect();
        changed.descriptions = self
            .descriptions
            .stream(&query)
            .into_iter()
            .map(|d| d.description_id)
            .collect();
        changed.relationships = self
            .relationships
            .stream(&query)
            .into_iter()
            .map(|r| r.relationship_id)
            .collect();
        changed.members = self
            .members
            .stream(&query)
            .into_iter()
            .map(|m| m.member_id)
            .collect();
        Ok(changed)
    }

    async fn authored_rows(&self, path: &str) -> Result<AuthoredRows> {
        let query = current_on_path(path);
        Ok(AuthoredRows {
            concepts: self.concepts.stream(&query),
            descriptions: self.descriptions.stream(&query),
            relationships: self.relationships.stream(&query),
            members: self.members.stream(&query),
        })
    }

    async fn remove_branch_rows(&self, path: &str) -> Result<usize> {
        let query = on_path(path);
        let mut removed = 0;
        removed += self.concepts.delete_where(&query);
        removed += self.descriptions.delete_where(&query);
        removed += self.relationships.delete_where(&query);
        removed += self.members.delete_where(&query);
        removed += self.query_concepts.delete_where(&query);
        Ok(removed)
    }
}

impl Store for MemoryStore {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::branch::MAIN;
    use crate::vc::BranchService;

    async fn save_concept(
        store: &MemoryStore,
        registry: &BranchService,
        path: &str,
        mut concept: Concept,
    ) -> Concept {
        let commit = registry.open_commit(path).unwrap();
        concept.mark_changed();
        let saved = store
            .save_concepts(vec![concept], &commit)
            .await
            .unwrap()
            .remove(0);
        commit.mark_successful().unwrap();
        saved
    }

    #[tokio::test]
    async fn new_version_supersedes_previous() {
        let registry = BranchService::new();
        registry.create(MAIN).unwrap();
        let store = MemoryStore::new();

        save_concept(&store, &registry, MAIN, Concept::primitive("100")).await;
        let mut updated = Concept::primitive("100");
        updated.active = false;
        save_concept(&store, &registry, MAIN, updated).await;

        let criteria = BranchCriteria::for_branch(&registry, MAIN).unwrap();
        let found = store.find_concept("100", &criteria).await.unwrap().unwrap();
        assert!(!found.active);
        // Two rows exist; one visible.
        assert_eq!(store.concepts.len(), 2);
    }

    #[tokio::test]
    async fn child_version_shadows_parent() {
        let registry = BranchService::new();
        registry.create(MAIN).unwrap();
        let store = MemoryStore::new();

        save_concept(&store, &registry, MAIN, Concept::primitive("100")).await;
        registry.create("MAIN/A").unwrap();
        let mut child_version = Concept::primitive("100");
        child_version.active = false;
        save_concept(&store, &registry, "MAIN/A", child_version).await;

        let child_criteria = BranchCriteria::for_branch(&registry, "MAIN/A").unwrap();
        let parent_criteria = BranchCriteria::for_branch(&registry, MAIN).unwrap();
        assert!(!store
            .find_concept("100", &child_criteria)
            .await
            .unwrap()
            .unwrap()
            .active);
        assert!(store
            .find_concept("100", &parent_criteria)
            .await
            .unwrap()
            .unwrap()
            .active);
    }

    #[tokio::test]
    async fn uncommitted_rows_are_invisible_and_purgeable() {
        let registry = BranchService::new();
        registry.create(MAIN).unwrap();
        let store = MemoryStore::new();

        let commit = registry.open_commit(MAIN).unwrap();
        let mut concept = Concept::primitive("100");
        concept.mark_changed();
        store.save_concepts(vec![concept], &commit).await.unwrap();
        let timepoint = commit.timepoint();
        commit.mark_failed();
        store.rollback_commit(MAIN, timepoint).await.unwrap();

        let criteria = BranchCriteria::for_branch(&registry, MAIN).unwrap();
        assert!(store.find_concept("100", &criteria).await.unwrap().is_none());
        assert_eq!(store.concepts.len(), 0);
    }

    #[tokio::test]
    async fn unreleased_delete_removes_rows() {
        let registry = BranchService::new();
        registry.create(MAIN).unwrap();
        let store = MemoryStore::new();

        save_concept(&store, &registry, MAIN, Concept::primitive("100")).await;
        let mut tombstone = Concept::primitive("100");
        tombstone.mark_deleted();
        save_concept(&store, &registry, MAIN, tombstone).await;

        let criteria = BranchCriteria::for_branch(&registry, MAIN).unwrap();
        assert!(store.find_concept("100", &criteria).await.unwrap().is_none());
        assert_eq!(store.concepts.len(), 0);
    }
}

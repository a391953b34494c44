use async_trait::async_trait;
use std::collections::HashSet;

use crate::error::Result;
use crate::model::{Branch, Concept, Description, QueryConcept, ReferenceSetMember, Relationship, Timepoint};
use crate::store::index::{Page, PageRequest};
use crate::vc::{BranchCriteria, Commit};

/// Filter for reference set member searches.
#[derive(Debug, Clone, Default)]
pub struct MemberSearchRequest {
    pub active: Option<bool>,
    pub refset_id: Option<String>,
    pub referenced_component_ids: Option<Vec<String>>,
    pub target_component_id: Option<String>,
    pub member_ids: Option<Vec<String>>,
}

impl MemberSearchRequest {
    pub fn referenced_component(id: &str) -> Self {
        Self {
            referenced_component_ids: Some(vec![id.to_string()]),
            ..Default::default()
        }
    }

    pub fn active_in_refset(refset_id: &str) -> Self {
        Self {
            active: Some(true),
            refset_id: Some(refset_id.to_string()),
            ..Default::default()
        }
    }
}

/// Filter for relationship searches.
#[derive(Debug, Clone, Default)]
pub struct RelationshipSearch {
    pub active: Option<bool>,
    pub relationship_ids: Option<Vec<String>>,
    pub source_ids: Option<Vec<String>>,
    pub type_ids: Option<Vec<String>>,
    pub destination_ids: Option<Vec<String>>,
    pub characteristic_type_id: Option<String>,
}

impl RelationshipSearch {
    pub fn active_isa_from_sources(source_ids: Vec<String>, characteristic_type_id: &str) -> Self {
        Self {
            active: Some(true),
            source_ids: Some(source_ids),
            type_ids: Some(vec![crate::model::constants::ISA.to_string()]),
            characteristic_type_id: Some(characteristic_type_id.to_string()),
            ..Default::default()
        }
    }
}

/// ComponentIds written on a path since a timepoint, per type.
#[derive(Debug, Clone, Default)]
pub struct ChangedComponents {
    pub concepts: HashSet<String>,
    pub descriptions: HashSet<String>,
    pub relationships: HashSet<String>,
    pub members: HashSet<String>,
}

impl ChangedComponents {
    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
            && self.descriptions.is_empty()
            && self.relationships.is_empty()
            && self.members.is_empty()
    }

    /// ComponentIds present in both change sets.
    pub fn intersection(&self, other: &ChangedComponents) -> Vec<String> {
        let mut ids: Vec<String> = self
            .concepts
            .intersection(&other.concepts)
            .chain(self.descriptions.intersection(&other.descriptions))
            .chain(self.relationships.intersection(&other.relationships))
            .chain(self.members.intersection(&other.members))
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

/// Current (open-ended) rows authored on one path, tombstones included.
#[derive(Debug, Clone, Default)]
pub struct AuthoredRows {
    pub concepts: Vec<Concept>,
    pub descriptions: Vec<Description>,
    pub relationships: Vec<Relationship>,
    pub members: Vec<ReferenceSetMember>,
}

impl AuthoredRows {
    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
            && self.descriptions.is_empty()
            && self.relationships.is_empty()
            && self.members.is_empty()
    }
}

#[async_trait]
pub trait ConceptStore: Send + Sync {
    /// Persist changed/deleted concepts within the commit, stamping version
    /// envelopes. Unchanged components pass through untouched.
    async fn save_concepts(&self, concepts: Vec<Concept>, commit: &Commit) -> Result<Vec<Concept>>;
    async fn find_concept(&self, concept_id: &str, criteria: &BranchCriteria) -> Result<Option<Concept>>;
    async fn find_concepts(&self, concept_ids: &[String], criteria: &BranchCriteria) -> Result<Vec<Concept>>;
    async fn search_concepts(&self, criteria: &BranchCriteria, request: PageRequest) -> Result<Page<Concept>>;
}

#[async_trait]
pub trait DescriptionStore: Send + Sync {
    async fn save_descriptions(&self, descriptions: Vec<Description>, commit: &Commit) -> Result<Vec<Description>>;
    /// Descriptions of the given concepts on the visible set.
    async fn find_descriptions(&self, concept_ids: &[String], criteria: &BranchCriteria) -> Result<Vec<Description>>;
    async fn find_descriptions_by_ids(&self, description_ids: &[String], criteria: &BranchCriteria) -> Result<Vec<Description>>;
}

#[async_trait]
pub trait RelationshipStore: Send + Sync {
    async fn save_relationships(&self, relationships: Vec<Relationship>, commit: &Commit) -> Result<Vec<Relationship>>;
    async fn find_relationships(&self, search: &RelationshipSearch, criteria: &BranchCriteria) -> Result<Vec<Relationship>>;
}

#[async_trait]
pub trait RefsetMemberStore: Send + Sync {
    async fn save_members(&self, members: Vec<ReferenceSetMember>, commit: &Commit) -> Result<Vec<ReferenceSetMember>>;
    async fn find_members(
        &self,
        search: &MemberSearchRequest,
        criteria: &BranchCriteria,
        request: PageRequest,
    ) -> Result<Page<ReferenceSetMember>>;
    async fn stream_members(&self, search: &MemberSearchRequest, criteria: &BranchCriteria) -> Result<Vec<ReferenceSetMember>>;
}

#[async_trait]
pub trait QueryConceptStore: Send + Sync {
    async fn save_query_concepts(&self, rows: Vec<QueryConcept>, commit: &Commit) -> Result<Vec<QueryConcept>>;
    async fn find_query_concepts(&self, concept_ids: &[u64], stated: bool, criteria: &BranchCriteria) -> Result<Vec<QueryConcept>>;
    /// Concepts whose ancestor set contains `ancestor`, in the given form.
    async fn concepts_with_ancestor(&self, ancestor: u64, stated: bool, criteria: &BranchCriteria) -> Result<Vec<u64>>;
    async fn stream_query_concepts(&self, stated: bool, criteria: &BranchCriteria) -> Result<Vec<QueryConcept>>;
    /// Drop semantic index rows authored on the path, one form. Rebuild support.
    async fn remove_query_concept_rows(&self, path: &str, stated: bool) -> Result<usize>;
    /// ConceptIds whose index rows were rewritten on the path after `since`.
    async fn changed_query_concepts_since(&self, path: &str, since: Timepoint, stated: bool) -> Result<Vec<u64>>;
}

#[async_trait]
pub trait MaintenanceStore: Send + Sync {
    /// Undo a failed commit: remove rows started at the timepoint and
    /// reopen rows end-stamped by it.
    async fn rollback_commit(&self, path: &str, timepoint: Timepoint) -> Result<()>;
    /// Lazy compactor: remove rows on the branch whose start or end passed
    /// the head without a successful commit.
    async fn purge_orphaned(&self, branch: &Branch) -> Result<usize>;
    /// ComponentIds written on the path strictly after `since`.
    async fn changed_components_since(&self, path: &str, since: Timepoint) -> Result<ChangedComponents>;
    /// Current rows authored on the path, tombstones included.
    async fn authored_rows(&self, path: &str) -> Result<AuthoredRows>;
    /// Remove every row authored on the path (promotion emptying, teardown).
    async fn remove_branch_rows(&self, path: &str) -> Result<usize>;
}

pub trait Store:
    ConceptStore
    + DescriptionStore
    + RelationshipStore
    + RefsetMemberStore
    + QueryConceptStore
    + MaintenanceStore
    + Send
    + Sync
{
}

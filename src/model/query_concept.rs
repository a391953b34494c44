use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::model::component::{Timepoint, VersionMeta};

/// Semantic index row: one per (concept, form) per branch, holding the
/// reflexive-transitive ISA closure as an ancestor set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct QueryConcept {
    pub concept_id: u64,
    pub parents: BTreeSet<u64>,
    pub ancestors: BTreeSet<u64>,
    pub stated: bool,
    #[serde(flatten)]
    pub meta: VersionMeta,
}

impl QueryConcept {
    pub fn new(concept_id: u64, parents: BTreeSet<u64>, ancestors: BTreeSet<u64>, stated: bool) -> Self {
        Self {
            concept_id,
            parents,
            ancestors,
            stated,
            ..Default::default()
        }
    }

    /// Document key: the concept id plus a form marker, so the stated and
    /// inferred rows for one concept coexist.
    pub fn concept_id_form(&self) -> String {
        Self::id_form(self.concept_id, self.stated)
    }

    pub fn id_form(concept_id: u64, stated: bool) -> String {
        format!("{}_{}", concept_id, if stated { "s" } else { "i" })
    }

    pub fn start(&self) -> Timepoint {
        self.meta.start
    }
}

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::model::component::{ReleaseDetails, SnomedComponent, VersionMeta};
use crate::model::constants;
use crate::model::description::Description;
use crate::model::refset::ReferenceSetMember;
use crate::model::relationship::Relationship;

/// Concept row plus its joined aggregate. The joined collections are
/// assembled at read time and detached again before persistence; only the
/// row fields are serialized.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Concept {
    pub concept_id: String,
    pub definition_status_id: String,
    pub active: bool,
    pub module_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_time: Option<i32>,
    #[serde(flatten)]
    pub release: ReleaseDetails,
    #[serde(flatten)]
    pub meta: VersionMeta,

    #[serde(skip)]
    pub descriptions: Vec<Description>,
    #[serde(skip)]
    pub relationships: Vec<Relationship>,
    #[serde(skip)]
    pub class_axioms: Vec<Axiom>,
    #[serde(skip)]
    pub gci_axioms: Vec<Axiom>,
    #[serde(skip)]
    pub inactivation_indicator: Option<String>,
    #[serde(skip)]
    pub inactivation_indicator_member: Option<ReferenceSetMember>,
    #[serde(skip)]
    pub association_targets: BTreeMap<String, BTreeSet<String>>,
    #[serde(skip)]
    pub association_target_members: Vec<ReferenceSetMember>,
}

impl Concept {
    pub fn new(concept_id: &str, module_id: &str, definition_status_id: &str) -> Self {
        Self {
            concept_id: concept_id.to_string(),
            definition_status_id: definition_status_id.to_string(),
            active: true,
            module_id: module_id.to_string(),
            ..Default::default()
        }
    }

    pub fn primitive(concept_id: &str) -> Self {
        Self::new(concept_id, constants::CORE_MODULE, constants::PRIMITIVE)
    }

    pub fn with_description(mut self, description: Description) -> Self {
        self.descriptions.push(description);
        self
    }

    pub fn with_relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    pub fn with_class_axiom(mut self, axiom: Axiom) -> Self {
        self.class_axioms.push(axiom);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// All OWL axiom refset members across class and GCI axioms.
    pub fn all_owl_axiom_members(&self) -> Vec<ReferenceSetMember> {
        self.class_axioms
            .iter()
            .chain(self.gci_axioms.iter())
            .filter_map(|axiom| axiom.member.clone())
            .collect()
    }
}

impl SnomedComponent for Concept {
    fn component_id(&self) -> String {
        self.concept_id.clone()
    }

    fn meta(&self) -> &VersionMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut VersionMeta {
        &mut self.meta
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    fn module_id(&self) -> &str {
        &self.module_id
    }

    fn effective_time(&self) -> Option<i32> {
        self.effective_time
    }

    fn set_effective_time(&mut self, effective_time: Option<i32>) {
        self.effective_time = effective_time;
    }

    fn release(&self) -> &ReleaseDetails {
        &self.release
    }

    fn release_mut(&mut self) -> &mut ReleaseDetails {
        &mut self.release
    }

    fn release_hash_input(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.active, self.module_id, self.definition_status_id, self.concept_id
        )
    }
}

/// An authored OWL axiom, held on the concept aggregate. The refset member
/// is its stored form; the relationships are its projection for the
/// semantic index.
#[derive(Debug, Clone, Default)]
pub struct Axiom {
    /// Member UUID once stored.
    pub axiom_id: Option<String>,
    pub definition_status_id: String,
    pub module_id: String,
    pub active: bool,
    pub relationships: Vec<Relationship>,
    pub member: Option<ReferenceSetMember>,
}

impl Axiom {
    pub fn new(definition_status_id: &str, relationships: Vec<Relationship>) -> Self {
        Self {
            axiom_id: None,
            definition_status_id: definition_status_id.to_string(),
            module_id: constants::CORE_MODULE.to_string(),
            active: true,
            relationships,
            member: None,
        }
    }

    pub fn with_module(mut self, module_id: &str) -> Self {
        self.module_id = module_id.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SnomedComponent;

    #[test]
    fn stored_row_omits_joined_collections_and_open_end() {
        let mut concept = Concept::primitive("100001000")
            .with_description(Description::synonym("Heart"))
            .with_relationship(Relationship::isa("100009000"));
        concept.meta.path = "MAIN".to_string();
        concept.meta.start = 1;
        concept.mark_changed();

        let row = serde_json::to_value(&concept).unwrap();
        assert_eq!(row["conceptId"], "100001000");
        assert_eq!(row["path"], "MAIN");
        assert!(row.get("end").is_none());
        assert!(row.get("descriptions").is_none());
        assert!(row.get("relationships").is_none());
        assert!(row.get("changed").is_none());

        let parsed: Concept = serde_json::from_value(row).unwrap();
        assert_eq!(parsed.concept_id, concept.concept_id);
        assert!(parsed.descriptions.is_empty());
        assert!(!parsed.is_changed());
    }
}

use serde::{Deserialize, Serialize};

use crate::model::component::{ReleaseDetails, SnomedComponent, VersionMeta};
use crate::model::constants;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub relationship_id: String,
    pub source_id: String,
    pub destination_id: String,
    pub type_id: String,
    pub group: i32,
    pub characteristic_type_id: String,
    pub modifier_id: String,
    pub active: bool,
    pub module_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_time: Option<i32>,
    #[serde(flatten)]
    pub release: ReleaseDetails,
    #[serde(flatten)]
    pub meta: VersionMeta,
}

impl Relationship {
    /// An inferred-form relationship; `source_id` is stamped from the owning
    /// concept during the update pipeline.
    pub fn new(type_id: &str, destination_id: &str) -> Self {
        Self {
            type_id: type_id.to_string(),
            destination_id: destination_id.to_string(),
            characteristic_type_id: constants::INFERRED_RELATIONSHIP.to_string(),
            modifier_id: constants::EXISTENTIAL_MODIFIER.to_string(),
            active: true,
            module_id: constants::CORE_MODULE.to_string(),
            ..Default::default()
        }
    }

    pub fn isa(destination_id: &str) -> Self {
        Self::new(constants::ISA, destination_id)
    }

    pub fn stated(mut self) -> Self {
        self.characteristic_type_id = constants::STATED_RELATIONSHIP.to_string();
        self
    }

    pub fn in_group(mut self, group: i32) -> Self {
        self.group = group;
        self
    }

    pub fn with_id(mut self, relationship_id: &str) -> Self {
        self.relationship_id = relationship_id.to_string();
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn is_isa(&self) -> bool {
        self.type_id == constants::ISA
    }
}

impl SnomedComponent for Relationship {
    fn component_id(&self) -> String {
        self.relationship_id.clone()
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
            "{}|{}|{}|{}|{}|{}|{}|{}|{}",
            self.active,
            self.module_id,
            self.relationship_id,
            self.source_id,
            self.destination_id,
            self.type_id,
            self.group,
            self.characteristic_type_id,
            self.modifier_id
        )
    }
}

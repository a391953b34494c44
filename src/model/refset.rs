use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::model::component::{ReleaseDetails, SnomedComponent, VersionMeta};

/// Recognized `additional_fields` keys.
pub mod fields {
    pub const ACCEPTABILITY_ID: &str = "acceptabilityId";
    pub const VALUE_ID: &str = "valueId";
    pub const TARGET_COMPONENT_ID: &str = "targetComponentId";
    pub const OWL_EXPRESSION: &str = "owlExpression";
    pub const MAP_TARGET: &str = "mapTarget";
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceSetMember {
    pub member_id: String,
    pub refset_id: String,
    pub referenced_component_id: String,
    /// The refset-type-specific payload, validated at ingress.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_fields: BTreeMap<String, String>,
    /// Concept backing the referenced component, denormalized at persistence
    /// for description-referencing members.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept_id: Option<String>,
    pub active: bool,
    pub module_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_time: Option<i32>,
    #[serde(flatten)]
    pub release: ReleaseDetails,
    #[serde(flatten)]
    pub meta: VersionMeta,
}

impl ReferenceSetMember {
    /// A new member with a fresh UUID.
    pub fn new(module_id: &str, refset_id: &str, referenced_component_id: &str) -> Self {
        Self {
            member_id: Uuid::new_v4().to_string(),
            refset_id: refset_id.to_string(),
            referenced_component_id: referenced_component_id.to_string(),
            active: true,
            module_id: module_id.to_string(),
            ..Default::default()
        }
    }

    /// A new version of an existing member, keeping its identity.
    pub fn new_version_of(existing: &ReferenceSetMember) -> Self {
        Self {
            member_id: existing.member_id.clone(),
            refset_id: existing.refset_id.clone(),
            referenced_component_id: existing.referenced_component_id.clone(),
            active: true,
            module_id: existing.module_id.clone(),
            ..Default::default()
        }
    }

    pub fn with_additional_field(mut self, key: &str, value: &str) -> Self {
        self.additional_fields
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn set_additional_field(&mut self, key: &str, value: &str) {
        self.additional_fields
            .insert(key.to_string(), value.to_string());
    }

    pub fn additional_field(&self, key: &str) -> Option<&str> {
        self.additional_fields.get(key).map(String::as_str)
    }
}

impl SnomedComponent for ReferenceSetMember {
    fn component_id(&self) -> String {
        self.member_id.clone()
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
        let additional = self
            .additional_fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "{}|{}|{}|{}|{}|{}",
            self.active,
            self.module_id,
            self.member_id,
            self.refset_id,
            self.referenced_component_id,
            additional
        )
    }
}

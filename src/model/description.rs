use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::model::component::{ReleaseDetails, SnomedComponent, VersionMeta};
use crate::model::constants;
use crate::model::refset::ReferenceSetMember;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Description {
    pub description_id: String,
    pub concept_id: String,
    pub term: String,
    pub language_code: String,
    pub type_id: String,
    pub case_significance_id: String,
    pub active: bool,
    pub module_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_time: Option<i32>,
    #[serde(flatten)]
    pub release: ReleaseDetails,
    #[serde(flatten)]
    pub meta: VersionMeta,

    /// languageRefsetId → acceptability name ("PREFERRED" / "ACCEPTABLE"),
    /// as authored. Reconciled against the stored language members on save.
    #[serde(skip)]
    pub acceptability_map: BTreeMap<String, String>,
    /// languageRefsetId → stored member, populated at read time.
    #[serde(skip)]
    pub lang_refset_members: BTreeMap<String, ReferenceSetMember>,
    #[serde(skip)]
    pub inactivation_indicator: Option<String>,
    #[serde(skip)]
    pub inactivation_indicator_member: Option<ReferenceSetMember>,
    #[serde(skip)]
    pub association_targets: BTreeMap<String, BTreeSet<String>>,
    #[serde(skip)]
    pub association_target_members: Vec<ReferenceSetMember>,
}

impl Description {
    pub fn new(term: &str, type_id: &str) -> Self {
        Self {
            term: term.to_string(),
            type_id: type_id.to_string(),
            language_code: "en".to_string(),
            case_significance_id: constants::CASE_INSENSITIVE.to_string(),
            active: true,
            module_id: constants::CORE_MODULE.to_string(),
            ..Default::default()
        }
    }

    pub fn synonym(term: &str) -> Self {
        Self::new(term, constants::SYNONYM)
    }

    pub fn fsn(term: &str) -> Self {
        Self::new(term, constants::FSN)
    }

    pub fn with_id(mut self, description_id: &str) -> Self {
        self.description_id = description_id.to_string();
        self
    }

    pub fn with_acceptability(mut self, language_refset_id: &str, acceptability: &str) -> Self {
        self.acceptability_map
            .insert(language_refset_id.to_string(), acceptability.to_string());
        self
    }

    pub fn preferred_in(self, language_refset_id: &str) -> Self {
        self.with_acceptability(language_refset_id, "PREFERRED")
    }

    pub fn acceptable_in(self, language_refset_id: &str) -> Self {
        self.with_acceptability(language_refset_id, "ACCEPTABLE")
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

impl SnomedComponent for Description {
    fn component_id(&self) -> String {
        self.description_id.clone()
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
            "{}|{}|{}|{}|{}|{}|{}|{}",
            self.active,
            self.module_id,
            self.description_id,
            self.concept_id,
            self.term,
            self.language_code,
            self.type_id,
            self.case_significance_id
        )
    }
}

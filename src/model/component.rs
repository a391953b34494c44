//! Version envelope and common behavior shared by every stored component.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Commit timepoint in milliseconds. Strictly monotonic per branch.
pub type Timepoint = i64;

/// Version-control envelope present on every stored row. `start`/`end`
/// bracket the row's visibility; `changed`/`creating` only live for the
/// duration of a commit and are never serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct VersionMeta {
    pub path: String,
    pub start: Timepoint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<Timepoint>,
    /// Tombstone marker. A deleted row shadows ancestor versions and is
    /// dropped from every read.
    #[serde(default)]
    pub deleted: bool,
    #[serde(skip)]
    pub changed: bool,
    #[serde(skip)]
    pub creating: bool,
}

/// Release bookkeeping. `release_hash` is the hash of the released field
/// subset at versioning time; while the live fields hash to the same value
/// the component keeps its released `effective_time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseDetails {
    pub released: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub released_effective_time: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_hash: Option<String>,
}

/// Behavior common to Concept, Description, Relationship and
/// ReferenceSetMember. Identity is stable across versions; one logical
/// component has many rows over time and across branches.
pub trait SnomedComponent: Clone + Send + Sync {
    fn component_id(&self) -> String;

    fn meta(&self) -> &VersionMeta;
    fn meta_mut(&mut self) -> &mut VersionMeta;

    fn is_active(&self) -> bool;
    fn set_active(&mut self, active: bool);

    fn module_id(&self) -> &str;

    fn effective_time(&self) -> Option<i32>;
    fn set_effective_time(&mut self, effective_time: Option<i32>);

    fn release(&self) -> &ReleaseDetails;
    fn release_mut(&mut self) -> &mut ReleaseDetails;

    /// The released field subset, serialized for hashing and change
    /// comparison. Field order must be stable.
    fn release_hash_input(&self) -> String;

    fn is_released(&self) -> bool {
        self.release().released
    }

    fn is_changed(&self) -> bool {
        self.meta().changed
    }

    fn is_deleted(&self) -> bool {
        self.meta().deleted
    }

    fn set_changed(&mut self, changed: bool) {
        self.meta_mut().changed = changed;
    }

    fn mark_changed(&mut self) {
        self.meta_mut().changed = true;
    }

    fn mark_deleted(&mut self) {
        let meta = self.meta_mut();
        meta.deleted = true;
        meta.changed = true;
    }

    fn set_creating(&mut self, creating: bool) {
        self.meta_mut().creating = creating;
    }

    /// True when the released field subset differs from `existing`.
    /// A missing existing version always counts as changed.
    fn is_component_changed(&self, existing: Option<&Self>) -> bool {
        match existing {
            Some(existing) => self.release_hash_input() != existing.release_hash_input(),
            None => true,
        }
    }

    fn build_release_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.release_hash_input().as_bytes());
        hex::encode(hasher.finalize())
    }

    fn copy_release_details(&mut self, existing: &Self) {
        *self.release_mut() = existing.release().clone();
    }

    fn clear_release_details(&mut self) {
        *self.release_mut() = ReleaseDetails::default();
        self.set_effective_time(None);
    }

    /// Restore the released effective time when the live fields match the
    /// released state, clear it otherwise.
    fn update_effective_time(&mut self) {
        let restored = self.is_released()
            && self.release().release_hash.as_deref() == Some(self.build_release_hash().as_str());
        if restored {
            let released_time = self.release().released_effective_time;
            self.set_effective_time(released_time);
        } else {
            self.set_effective_time(None);
        }
    }

    /// Stamp the component as published in the release dated
    /// `effective_time` (YYYYMMDD).
    fn release_component(&mut self, effective_time: i32) {
        let hash = self.build_release_hash();
        let release = self.release_mut();
        release.released = true;
        release.released_effective_time = Some(effective_time);
        release.release_hash = Some(hash);
        self.set_effective_time(Some(effective_time));
    }
}

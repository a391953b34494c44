//! Branch registry: names the branch tree, records base/head timepoints and
//! serializes writers with per-branch commit locks.

use chrono::Utc;
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{Result, TerminologyError};
use crate::model::branch::{is_valid_path, parent_of, Branch, MAIN};
use crate::model::component::Timepoint;
use crate::vc::commit::{Commit, CommitKind};

/// Cheaply cloneable handle; clones share the registry state.
#[derive(Debug, Clone, Default)]
pub struct BranchService {
    branches: Arc<RwLock<HashMap<String, Branch>>>,
}

impl BranchService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a branch. The parent must already exist unless the path is
    /// `MAIN`. A child starts based on the parent's current head.
    pub fn create(&self, path: &str) -> Result<Branch> {
        if !is_valid_path(path) {
            return Err(TerminologyError::InvalidArgument(format!(
                "Invalid branch path '{}'",
                path
            )));
        }
        let mut branches = self.branches.write().expect("branch registry lock poisoned");
        if branches.contains_key(path) {
            return Err(TerminologyError::conflict(
                format!("Branch '{}' already exists", path),
                vec![],
            ));
        }
        let base = match parent_of(path) {
            Some(parent_path) => {
                let parent = branches.get(parent_path).ok_or_else(|| {
                    TerminologyError::not_found(format!("Parent branch '{}'", parent_path))
                })?;
                Some(parent.head)
            }
            None => None,
        };
        let branch = Branch::new(path.to_string(), base, Utc::now().timestamp_millis());
        branches.insert(path.to_string(), branch.clone());
        debug!(
            "Created branch {} base {:?} head {}",
            path, branch.base, branch.head
        );
        Ok(branch)
    }

    pub fn find(&self, path: &str) -> Option<Branch> {
        self.branches
            .read()
            .expect("branch registry lock poisoned")
            .get(path)
            .cloned()
    }

    pub fn find_or_err(&self, path: &str) -> Result<Branch> {
        self.find(path)
            .ok_or_else(|| TerminologyError::not_found(format!("Branch '{}'", path)))
    }

    pub fn exists(&self, path: &str) -> bool {
        self.branches
            .read()
            .expect("branch registry lock poisoned")
            .contains_key(path)
    }

    /// Direct children of `path`, sorted.
    pub fn children(&self, path: &str) -> Vec<Branch> {
        let branches = self.branches.read().expect("branch registry lock poisoned");
        let mut children: Vec<Branch> = branches
            .values()
            .filter(|b| parent_of(&b.path) == Some(path))
            .cloned()
            .collect();
        children.sort_by(|a, b| a.path.cmp(&b.path));
        children
    }

    pub fn update_metadata(
        &self,
        path: &str,
        metadata: std::collections::BTreeMap<String, String>,
    ) -> Result<Branch> {
        let mut branches = self.branches.write().expect("branch registry lock poisoned");
        let branch = branches
            .get_mut(path)
            .ok_or_else(|| TerminologyError::not_found(format!("Branch '{}'", path)))?;
        branch.metadata = metadata;
        Ok(branch.clone())
    }

    /// Open an exclusive commit on the branch. Fails with `Conflict` when
    /// another commit is already open. The commit timepoint is strictly
    /// greater than the branch head.
    pub fn open_commit(&self, path: &str) -> Result<Commit> {
        self.open_commit_of_kind(path, CommitKind::Content)
    }

    pub fn open_commit_of_kind(&self, path: &str, kind: CommitKind) -> Result<Commit> {
        let branch = {
            let mut branches = self.branches.write().expect("branch registry lock poisoned");
            let branch = branches
                .get_mut(path)
                .ok_or_else(|| TerminologyError::not_found(format!("Branch '{}'", path)))?;
            if branch.locked {
                return Err(TerminologyError::conflict(
                    format!("Branch '{}' is locked by another commit", path),
                    vec![],
                ));
            }
            branch.locked = true;
            branch.clone()
        };
        let timepoint = next_timepoint(branch.head);
        debug!("Opened {:?} commit on {} at {}", kind, path, timepoint);
        Ok(Commit::new(branch, timepoint, kind, self.clone()))
    }

    /// Flip head (and base, for rebase commits) and release the lock.
    /// Called by `Commit::mark_successful`.
    pub(crate) fn complete_commit(
        &self,
        path: &str,
        timepoint: Timepoint,
        new_base: Option<Timepoint>,
    ) -> Result<()> {
        let mut branches = self.branches.write().expect("branch registry lock poisoned");
        let branch = branches
            .get_mut(path)
            .ok_or_else(|| TerminologyError::not_found(format!("Branch '{}'", path)))?;
        branch.head = timepoint;
        if let Some(base) = new_base {
            branch.base = Some(base);
        }
        branch.locked = false;
        Ok(())
    }

    pub(crate) fn unlock(&self, path: &str) {
        let mut branches = self.branches.write().expect("branch registry lock poisoned");
        if let Some(branch) = branches.get_mut(path) {
            branch.locked = false;
        }
    }

    /// Re-base a child after promotion; the caller holds both branch locks.
    pub(crate) fn reset_after_promotion(
        &self,
        child_path: &str,
        parent_head: Timepoint,
    ) -> Result<()> {
        let mut branches = self.branches.write().expect("branch registry lock poisoned");
        let child = branches
            .get_mut(child_path)
            .ok_or_else(|| TerminologyError::not_found(format!("Branch '{}'", child_path)))?;
        child.base = Some(parent_head);
        child.head = next_timepoint(child.head);
        Ok(())
    }

    /// Test support: drop every branch.
    pub fn delete_all(&self) {
        self.branches
            .write()
            .expect("branch registry lock poisoned")
            .clear();
    }
}

/// Millisecond wall clock, clamped to stay strictly ahead of `head` so
/// per-branch ordering never depends on the clock alone.
pub fn next_timepoint(head: Timepoint) -> Timepoint {
    Utc::now().timestamp_millis().max(head + 1)
}

//! A commit is a scoped unit of work. Rows written during the commit carry
//! its timepoint; they only become visible when `mark_successful` advances
//! the branch head past that timepoint.

use log::{debug, warn};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

use crate::error::Result;
use crate::model::branch::Branch;
use crate::model::component::Timepoint;
use crate::vc::branches::BranchService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitKind {
    Content,
    Rebase,
    Promotion,
}

const STATE_OPEN: u8 = 0;
const STATE_SUCCESSFUL: u8 = 1;
const STATE_FAILED: u8 = 2;

#[derive(Debug)]
pub struct Commit {
    branch: Branch,
    timepoint: Timepoint,
    kind: CommitKind,
    /// Set by rebase before completion; becomes the branch base on success.
    new_base: Mutex<Option<Timepoint>>,
    /// ComponentIds deleted within this commit, for cascade handling.
    entities_deleted: Mutex<HashSet<String>>,
    registry: BranchService,
    state: AtomicU8,
}

impl Commit {
    pub(crate) fn new(
        branch: Branch,
        timepoint: Timepoint,
        kind: CommitKind,
        registry: BranchService,
    ) -> Self {
        Self {
            branch,
            timepoint,
            kind,
            new_base: Mutex::new(None),
            entities_deleted: Mutex::new(HashSet::new()),
            registry,
            state: AtomicU8::new(STATE_OPEN),
        }
    }

    pub fn path(&self) -> &str {
        &self.branch.path
    }

    /// The branch as it was when the commit opened.
    pub fn branch(&self) -> &Branch {
        &self.branch
    }

    pub fn timepoint(&self) -> Timepoint {
        self.timepoint
    }

    pub fn kind(&self) -> CommitKind {
        self.kind
    }

    /// Rebase commits force change-flags even for byte-equal content.
    pub fn is_rebase(&self) -> bool {
        self.kind == CommitKind::Rebase
    }

    pub(crate) fn set_new_base(&self, base: Timepoint) {
        *self.new_base.lock().expect("commit lock poisoned") = Some(base);
    }

    /// The base a rebase commit will move to; mid-commit reads already see
    /// the parent at this timepoint.
    pub fn rebased_base(&self) -> Option<Timepoint> {
        *self.new_base.lock().expect("commit lock poisoned")
    }

    pub fn record_deleted_components<I>(&self, component_ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.entities_deleted
            .lock()
            .expect("commit lock poisoned")
            .extend(component_ids);
    }

    pub fn deleted_components(&self) -> HashSet<String> {
        self.entities_deleted
            .lock()
            .expect("commit lock poisoned")
            .clone()
    }

    /// Flip visibility: advance head (and base for rebases) and unlock.
    pub fn mark_successful(&self) -> Result<()> {
        self.state.store(STATE_SUCCESSFUL, Ordering::SeqCst);
        let new_base = *self.new_base.lock().expect("commit lock poisoned");
        debug!(
            "Commit successful on {} at {}",
            self.branch.path, self.timepoint
        );
        self.registry
            .complete_commit(&self.branch.path, self.timepoint, new_base)
    }

    /// Record failure and unlock. Rows written at this timepoint stay
    /// invisible; the caller purges them through the store.
    pub fn mark_failed(&self) {
        self.state.store(STATE_FAILED, Ordering::SeqCst);
        self.registry.unlock(&self.branch.path);
    }

    pub fn is_open(&self) -> bool {
        self.state.load(Ordering::SeqCst) == STATE_OPEN
    }
}

impl Drop for Commit {
    fn drop(&mut self) {
        if self.is_open() {
            warn!(
                "Commit on {} at {} dropped without completion, unlocking",
                self.branch.path, self.timepoint
            );
            self.registry.unlock(&self.branch.path);
        }
    }
}

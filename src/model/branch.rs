use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::component::Timepoint;

pub const MAIN: &str = "MAIN";

/// A node in the branch tree. `base` is the parent timepoint this branch
/// last synced with (absent on MAIN); `head` is the latest successful
/// commit timepoint on the branch itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<Timepoint>,
    pub head: Timepoint,
    pub locked: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Branch {
    pub fn new(path: String, base: Option<Timepoint>, head: Timepoint) -> Self {
        Self {
            path,
            base,
            head,
            locked: false,
            metadata: BTreeMap::new(),
        }
    }

    /// Parent path, derived lexically. `MAIN` has no parent.
    pub fn parent_path(&self) -> Option<&str> {
        parent_of(&self.path)
    }

    pub fn is_main(&self) -> bool {
        self.path == MAIN
    }
}

/// Lexical parent of a slash-delimited branch path.
pub fn parent_of(path: &str) -> Option<&str> {
    path.rfind('/').map(|idx| &path[..idx])
}

/// A branch path is `MAIN` or a slash-delimited chain of non-empty,
/// uppercase-alphanumeric segments under it.
pub fn is_valid_path(path: &str) -> bool {
    let mut segments = path.split('/');
    if segments.next() != Some(MAIN) {
        return false;
    }
    segments.all(|segment| {
        !segment.is_empty()
            && segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_is_derived_lexically() {
        assert_eq!(parent_of("MAIN"), None);
        assert_eq!(parent_of("MAIN/PROJ"), Some("MAIN"));
        assert_eq!(parent_of("MAIN/PROJ/TASK"), Some("MAIN/PROJ"));
    }

    #[test]
    fn path_validation() {
        assert!(is_valid_path("MAIN"));
        assert!(is_valid_path("MAIN/PROJ-1/TASK_2"));
        assert!(!is_valid_path("main"));
        assert!(!is_valid_path("MAIN//TASK"));
        assert!(!is_valid_path("OTHER/TASK"));
    }
}

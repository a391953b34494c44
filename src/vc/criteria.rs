//! Branch criteria: the predicate selecting the visible version of every
//! component on a branch at a timepoint.

use std::collections::HashMap;

use crate::error::Result;
use crate::model::component::{SnomedComponent, Timepoint};
use crate::store::index::{BoolQuery, IndexValue, Query};
use crate::vc::branches::BranchService;
use crate::vc::commit::Commit;

/// One branch on the ancestor walk, with the timepoint capping which of its
/// versions the viewing branch can see.
#[derive(Debug, Clone)]
struct CriteriaEntry {
    path: String,
    cap: Timepoint,
}

/// Ordered nearest-first: the branch itself, then its parent, up to MAIN.
/// Built once per read and composed into every store query.
#[derive(Debug, Clone)]
pub struct BranchCriteria {
    entries: Vec<CriteriaEntry>,
}

impl BranchCriteria {
    /// Visible set of `path` at its current head.
    pub fn for_branch(registry: &BranchService, path: &str) -> Result<Self> {
        let branch = registry.find_or_err(path)?;
        Self::walk(registry, path, branch.head, branch.base)
    }

    /// Visible set of `path` capped at `timepoint` (historical view).
    pub fn for_branch_at(registry: &BranchService, path: &str, timepoint: Timepoint) -> Result<Self> {
        let branch = registry.find_or_err(path)?;
        let base = branch.base.map(|b| b.min(timepoint));
        Self::walk(registry, path, timepoint, base)
    }

    /// Visible set during a commit: the branch under edit is capped at the
    /// commit timepoint, so mid-commit reads see the commit's own writes.
    /// A rebase commit already reads the parent at the new base.
    pub fn including_open_commit(registry: &BranchService, commit: &Commit) -> Result<Self> {
        let base = commit.rebased_base().or(commit.branch().base);
        Self::walk(registry, commit.path(), commit.timepoint(), base)
    }

    fn walk(
        registry: &BranchService,
        path: &str,
        own_cap: Timepoint,
        own_base: Option<Timepoint>,
    ) -> Result<Self> {
        let mut entries = vec![CriteriaEntry {
            path: path.to_string(),
            cap: own_cap,
        }];
        // The cap carried up the walk never increases, so an ancestor
        // rebased after this branch forked cannot leak newer state in.
        let mut cap = own_base;
        let mut current = path.to_string();
        while let Some(parent_path) = crate::model::branch::parent_of(&current).map(str::to_string) {
            let parent = registry.find_or_err(&parent_path)?;
            let parent_cap = match cap {
                Some(c) => c,
                None => break,
            };
            entries.push(CriteriaEntry {
                path: parent_path.clone(),
                cap: parent_cap,
            });
            cap = match parent.base {
                Some(parent_base) => Some(parent_base.min(parent_cap)),
                None => None,
            };
            current = parent_path;
        }
        Ok(Self { entries })
    }

    /// Compose into an index query over the `path`/`start`/`end` envelope.
    pub fn to_query(&self) -> Query {
        let mut outer = BoolQuery::new();
        for entry in &self.entries {
            outer = outer.should(
                BoolQuery::new()
                    .must(Query::term("path", IndexValue::keyword(&entry.path)))
                    .must(Query::lte("start", entry.cap))
                    .must_not(Query::lte("end", entry.cap))
                    .build(),
            );
        }
        outer.build()
    }

    pub fn paths(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.path.as_str()).collect()
    }

    /// Position of a path on the walk; lower is nearer the viewing branch.
    fn path_rank(&self, path: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.path == path)
    }

    /// Shadowing and tombstone handling: per componentId keep the version
    /// from the nearest path, then drop deleted rows.
    pub fn collapse<T: SnomedComponent>(&self, rows: Vec<T>) -> Vec<T> {
        self.collapse_by(rows, |row| row.component_id(), |row| &row.meta().path, |row| {
            row.meta().deleted
        })
    }

    /// Collapse for semantic index rows, keyed by (conceptId, form).
    pub fn collapse_query_concepts(
        &self,
        rows: Vec<crate::model::QueryConcept>,
    ) -> Vec<crate::model::QueryConcept> {
        let mut collapsed = self.collapse_by(
            rows,
            |row| row.concept_id_form(),
            |row| &row.meta.path,
            |row| row.meta.deleted,
        );
        collapsed.sort_by_key(|row| (row.concept_id, row.stated));
        collapsed
    }

    fn collapse_by<T, K, P, D>(&self, rows: Vec<T>, key: K, path: P, deleted: D) -> Vec<T>
    where
        K: Fn(&T) -> String,
        P: Fn(&T) -> &str,
        D: Fn(&T) -> bool,
    {
        let mut nearest: HashMap<String, (usize, T)> = HashMap::new();
        for row in rows {
            let rank = match self.path_rank(path(&row)) {
                Some(rank) => rank,
                None => continue,
            };
            let row_key = key(&row);
            match nearest.get(&row_key) {
                Some((existing_rank, _)) if *existing_rank <= rank => {}
                _ => {
                    nearest.insert(row_key, (rank, row));
                }
            }
        }
        let mut visible: Vec<(String, T)> = nearest
            .into_iter()
            .filter(|(_, (_, row))| !deleted(row))
            .map(|(k, (_, row))| (k, row))
            .collect();
        visible.sort_by(|a, b| a.0.cmp(&b.0));
        visible.into_iter().map(|(_, row)| row).collect()
    }
}

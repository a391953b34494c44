//! Generic in-memory search index: term queries, boolean composition,
//! ranges, pagination and streaming scans over component rows. This is the
//! KV-index seam; everything above it only speaks `Query`.

use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Clone, PartialEq)]
pub enum IndexValue {
    Keyword(String),
    Long(i64),
    Flag(bool),
}

impl IndexValue {
    pub fn keyword(value: impl Into<String>) -> Self {
        IndexValue::Keyword(value.into())
    }

    fn as_long(&self) -> Option<i64> {
        match self {
            IndexValue::Long(value) => Some(*value),
            _ => None,
        }
    }
}

/// A row the index can store. `doc_key` must be unique per version row;
/// `sort_key` gives searches a stable order.
pub trait IndexDocument: Clone + Send + Sync + 'static {
    fn doc_key(&self) -> String;
    fn field_values(&self, field: &str) -> Vec<IndexValue>;
    fn sort_key(&self) -> String;
}

#[derive(Debug, Clone)]
pub enum Query {
    MatchAll,
    Term {
        field: String,
        value: IndexValue,
    },
    Terms {
        field: String,
        values: Vec<IndexValue>,
    },
    /// numeric field <= bound
    Lte {
        field: String,
        bound: i64,
    },
    /// numeric field > bound
    Gt {
        field: String,
        bound: i64,
    },
    Bool {
        must: Vec<Query>,
        must_not: Vec<Query>,
        should: Vec<Query>,
    },
}

impl Query {
    pub fn term(field: &str, value: IndexValue) -> Self {
        Query::Term {
            field: field.to_string(),
            value,
        }
    }

    pub fn terms(field: &str, values: Vec<IndexValue>) -> Self {
        Query::Terms {
            field: field.to_string(),
            values,
        }
    }

    pub fn lte(field: &str, bound: i64) -> Self {
        Query::Lte {
            field: field.to_string(),
            bound,
        }
    }

    pub fn gt(field: &str, bound: i64) -> Self {
        Query::Gt {
            field: field.to_string(),
            bound,
        }
    }

    pub fn matches<T: IndexDocument>(&self, doc: &T) -> bool {
        match self {
            Query::MatchAll => true,
            Query::Term { field, value } => doc.field_values(field).iter().any(|v| v == value),
            Query::Terms { field, values } => {
                let doc_values = doc.field_values(field);
                doc_values.iter().any(|v| values.contains(v))
            }
            Query::Lte { field, bound } => doc
                .field_values(field)
                .iter()
                .filter_map(IndexValue::as_long)
                .any(|v| v <= *bound),
            Query::Gt { field, bound } => doc
                .field_values(field)
                .iter()
                .filter_map(IndexValue::as_long)
                .any(|v| v > *bound),
            Query::Bool {
                must,
                must_not,
                should,
            } => {
                must.iter().all(|q| q.matches(doc))
                    && !must_not.iter().any(|q| q.matches(doc))
                    && (should.is_empty() || should.iter().any(|q| q.matches(doc)))
            }
        }
    }
}

/// Builder mirroring the must / must_not / should composition of the
/// underlying index technology.
#[derive(Debug, Clone, Default)]
pub struct BoolQuery {
    must: Vec<Query>,
    must_not: Vec<Query>,
    should: Vec<Query>,
}

impl BoolQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn must(mut self, query: Query) -> Self {
        self.must.push(query);
        self
    }

    pub fn must_not(mut self, query: Query) -> Self {
        self.must_not.push(query);
        self
    }

    pub fn should(mut self, query: Query) -> Self {
        self.should.push(query);
        self
    }

    pub fn build(self) -> Query {
        Query::Bool {
            must: self.must,
            must_not: self.must_not,
            should: self.should,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
}

impl PageRequest {
    pub fn of(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }
}

/// Maximum terms per terms-query clause; batched lookups partition to stay
/// under it.
pub const CLAUSE_LIMIT: usize = 800;

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

impl<T> Page<T> {
    pub fn empty(request: PageRequest) -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            offset: request.offset,
            limit: request.limit,
        }
    }
}

/// One index per component type. Interior mutability only; locks are never
/// held across await points.
pub struct SearchIndex<T: IndexDocument> {
    docs: RwLock<HashMap<String, T>>,
}

impl<T: IndexDocument> Default for SearchIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: IndexDocument> SearchIndex<T> {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
        }
    }

    pub fn bulk_upsert(&self, docs: Vec<T>) {
        let mut guard = self.docs.write().expect("index lock poisoned");
        for doc in docs {
            guard.insert(doc.doc_key(), doc);
        }
    }

    pub fn bulk_delete(&self, keys: &[String]) {
        let mut guard = self.docs.write().expect("index lock poisoned");
        for key in keys {
            guard.remove(key);
        }
    }

    /// All matches, sorted. The scan equivalent of a paged search.
    pub fn stream(&self, query: &Query) -> Vec<T> {
        let guard = self.docs.read().expect("index lock poisoned");
        let mut matches: Vec<T> = guard.values().filter(|d| query.matches(*d)).cloned().collect();
        matches.sort_by_key(|d| d.sort_key());
        matches
    }

    pub fn search(&self, query: &Query, request: PageRequest) -> Page<T> {
        let matches = self.stream(query);
        let total = matches.len();
        let items = matches
            .into_iter()
            .skip(request.offset)
            .take(request.limit)
            .collect();
        Page {
            items,
            total,
            offset: request.offset,
            limit: request.limit,
        }
    }

    /// Read-modify-write over every match. Returns the number of rows
    /// touched.
    pub fn update_where<F>(&self, query: &Query, mut update: F) -> usize
    where
        F: FnMut(&mut T),
    {
        let mut guard = self.docs.write().expect("index lock poisoned");
        let keys: Vec<String> = guard
            .values()
            .filter(|d| query.matches(*d))
            .map(|d| d.doc_key())
            .collect();
        for key in &keys {
            if let Some(doc) = guard.remove(key) {
                let mut doc = doc;
                update(&mut doc);
                guard.insert(doc.doc_key(), doc);
            }
        }
        keys.len()
    }

    /// Remove every match. Returns the number of rows removed.
    pub fn delete_where(&self, query: &Query) -> usize {
        let mut guard = self.docs.write().expect("index lock poisoned");
        let keys: Vec<String> = guard
            .values()
            .filter(|d| query.matches(*d))
            .map(|d| d.doc_key())
            .collect();
        for key in &keys {
            guard.remove(key);
        }
        keys.len()
    }

    pub fn clear(&self) {
        self.docs.write().expect("index lock poisoned").clear();
    }

    pub fn len(&self) -> usize {
        self.docs.read().expect("index lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Partition `values` into chunks no larger than `clause_limit`, for
/// terms-queries that would otherwise exceed the index clause budget.
pub fn partition_clauses<V: Clone>(values: &[V], clause_limit: usize) -> Vec<Vec<V>> {
    values
        .chunks(clause_limit.max(1))
        .map(|chunk| chunk.to_vec())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Row {
        id: String,
        group: String,
        rank: i64,
    }

    impl IndexDocument for Row {
        fn doc_key(&self) -> String {
            self.id.clone()
        }

        fn field_values(&self, field: &str) -> Vec<IndexValue> {
            match field {
                "id" => vec![IndexValue::keyword(&self.id)],
                "group" => vec![IndexValue::keyword(&self.group)],
                "rank" => vec![IndexValue::Long(self.rank)],
                _ => vec![],
            }
        }

        fn sort_key(&self) -> String {
            self.id.clone()
        }
    }

    fn index_with_rows() -> SearchIndex<Row> {
        let index = SearchIndex::new();
        index.bulk_upsert(vec![
            Row {
                id: "a".into(),
                group: "x".into(),
                rank: 1,
            },
            Row {
                id: "b".into(),
                group: "x".into(),
                rank: 2,
            },
            Row {
                id: "c".into(),
                group: "y".into(),
                rank: 3,
            },
        ]);
        index
    }

    #[test]
    fn term_and_bool_composition() {
        let index = index_with_rows();
        let query = BoolQuery::new()
            .must(Query::term("group", IndexValue::keyword("x")))
            .must_not(Query::term("id", IndexValue::keyword("a")))
            .build();
        let hits = index.stream(&query);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "b");
    }

    #[test]
    fn range_queries() {
        let index = index_with_rows();
        assert_eq!(index.stream(&Query::lte("rank", 2)).len(), 2);
        assert_eq!(index.stream(&Query::gt("rank", 2)).len(), 1);
    }

    #[test]
    fn pagination_is_stable_and_disjoint() {
        let index = index_with_rows();
        let first = index.search(&Query::MatchAll, PageRequest::of(0, 2));
        let second = index.search(&Query::MatchAll, PageRequest::of(2, 2));
        assert_eq!(first.total, 3);
        assert_eq!(first.items.len(), 2);
        assert_eq!(second.items.len(), 1);
        assert!(first.items.iter().all(|r| r.id != second.items[0].id));
    }

    #[test]
    fn clause_partitioning() {
        let values: Vec<u32> = (0..5).collect();
        let parts = partition_clauses(&values, 2);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[2], vec![4]);
    }
}

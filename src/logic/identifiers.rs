//! SCTID generation: partitioned numeric identifiers with the Verhoeff
//! check digit, reserved in blocks ahead of a batch save.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::error::{Result, TerminologyError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentType {
    Concept,
    Description,
    Relationship,
}

impl ComponentType {
    /// Second digit of the partition identifier.
    fn partition_digit(self) -> char {
        match self {
            ComponentType::Concept => '0',
            ComponentType::Description => '1',
            ComponentType::Relationship => '2',
        }
    }
}

/// Verhoeff dihedral-group multiplication table.
const D: [[u8; 10]; 10] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
    [1, 2, 3, 4, 0, 6, 7, 8, 9, 5],
    [2, 3, 4, 0, 1, 7, 8, 9, 5, 6],
    [3, 4, 0, 1, 2, 8, 9, 5, 6, 7],
    [4, 0, 1, 2, 3, 9, 5, 6, 7, 8],
    [5, 9, 8, 7, 6, 0, 4, 3, 2, 1],
    [6, 5, 9, 8, 7, 1, 0, 4, 3, 2],
    [7, 6, 5, 9, 8, 2, 1, 0, 4, 3],
    [8, 7, 6, 5, 9, 3, 2, 1, 0, 4],
    [9, 8, 7, 6, 5, 4, 3, 2, 1, 0],
];

/// Verhoeff permutation table.
const P: [[u8; 10]; 8] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
    [1, 5, 7, 6, 2, 8, 3, 0, 9, 4],
    [5, 8, 0, 3, 7, 9, 6, 1, 4, 2],
    [8, 9, 1, 6, 0, 4, 3, 5, 2, 7],
    [9, 4, 5, 3, 1, 2, 6, 8, 7, 0],
    [4, 2, 8, 6, 5, 7, 3, 9, 0, 1],
    [2, 7, 9, 3, 8, 0, 6, 4, 1, 5],
    [7, 0, 4, 6, 9, 1, 3, 2, 5, 8],
];

/// Verhoeff multiplicative inverse table.
const INV: [u8; 10] = [0, 4, 3, 2, 1, 5, 6, 7, 8, 9];

/// Check digit over the identifier body.
pub fn verhoeff_check_digit(body: &str) -> char {
    let mut c: u8 = 0;
    for (i, ch) in body.chars().rev().enumerate() {
        let digit = ch.to_digit(10).unwrap_or(0) as usize;
        c = D[c as usize][P[(i + 1) % 8][digit] as usize];
    }
    char::from_digit(INV[c as usize] as u32, 10).unwrap_or('0')
}

pub fn verhoeff_is_valid(sctid: &str) -> bool {
    let mut c: u8 = 0;
    for (i, ch) in sctid.chars().rev().enumerate() {
        let digit = match ch.to_digit(10) {
            Some(d) => d as usize,
            None => return false,
        };
        c = D[c as usize][P[i % 8][digit] as usize];
    }
    c == 0
}

/// Partition-digit check: `..X C` where X is the component type digit and C
/// the check digit.
pub fn is_description_id(sctid: &str) -> bool {
    partition_digit(sctid) == Some('1')
}

pub fn is_concept_id(sctid: &str) -> bool {
    partition_digit(sctid) == Some('0')
}

fn partition_digit(sctid: &str) -> Option<char> {
    if sctid.len() < 6 || sctid.len() > 18 {
        return None;
    }
    sctid.chars().rev().nth(1)
}

/// A block of identifiers reserved for one batch save.
#[derive(Debug, Default)]
pub struct IdentifierReservedBlock {
    concepts: VecDeque<String>,
    descriptions: VecDeque<String>,
    relationships: VecDeque<String>,
}

impl IdentifierReservedBlock {
    pub fn next_id(&mut self, component_type: ComponentType) -> Result<String> {
        let queue = match component_type {
            ComponentType::Concept => &mut self.concepts,
            ComponentType::Description => &mut self.descriptions,
            ComponentType::Relationship => &mut self.relationships,
        };
        queue.pop_front().ok_or_else(|| {
            TerminologyError::Internal(format!(
                "Identifier block exhausted for {:?}",
                component_type
            ))
        })
    }

    pub fn all_ids(&self) -> Vec<String> {
        self.concepts
            .iter()
            .chain(self.descriptions.iter())
            .chain(self.relationships.iter())
            .cloned()
            .collect()
    }
}

/// Local stand-in for the external identifier service: allocates SCTIDs from
/// a process-wide counter and records assignments for later registration.
pub struct IdentifierService {
    namespace: u32,
    item_counter: AtomicU64,
    assigned_for_registration: Mutex<Vec<String>>,
}

impl IdentifierService {
    pub fn new(namespace: u32) -> Self {
        Self {
            namespace,
            item_counter: AtomicU64::new(1_000),
            assigned_for_registration: Mutex::new(Vec::new()),
        }
    }

    pub fn generate(&self, component_type: ComponentType) -> String {
        let item = self.item_counter.fetch_add(1, Ordering::SeqCst);
        let body = if self.namespace == 0 {
            format!("{}0{}", item, component_type.partition_digit())
        } else {
            format!("{}{:07}1{}", item, self.namespace, component_type.partition_digit())
        };
        let check = verhoeff_check_digit(&body);
        format!("{}{}", body, check)
    }

    /// Reserve identifiers for every new component in the batch.
    pub fn reserve_block(
        &self,
        concept_count: usize,
        description_count: usize,
        relationship_count: usize,
    ) -> IdentifierReservedBlock {
        let mut block = IdentifierReservedBlock::default();
        for _ in 0..concept_count {
            block.concepts.push_back(self.generate(ComponentType::Concept));
        }
        for _ in 0..description_count {
            block
                .descriptions
                .push_back(self.generate(ComponentType::Description));
        }
        for _ in 0..relationship_count {
            block
                .relationships
                .push_back(self.generate(ComponentType::Relationship));
        }
        block
    }

    /// Record assigned identifiers for registration with the external
    /// identifier service.
    pub fn persist_assigned_ids(&self, block: &IdentifierReservedBlock) {
        self.assigned_for_registration
            .lock()
            .expect("identifier lock poisoned")
            .extend(block.all_ids());
    }

    pub fn assigned_ids(&self) -> Vec<String> {
        self.assigned_for_registration
            .lock()
            .expect("identifier lock poisoned")
            .clone()
    }
}

//! Key and value interning for the layer builder.
//!
//! An index maps an input to its position in the layer's dictionary,
//! appending on first sight. The hashed variants carry one hash table per
//! layer; the linear variants scan the dictionary and need no extra
//! memory, which wins for small tables. An index is scoped to a single
//! layer and must observe every insertion into its table.

use foldhash::fast::RandomState;
use indexmap::IndexSet;

use crate::value::Value;

/// Deduplication policy for layer keys.
pub trait KeyIndex {
    /// Returns the dictionary index of `key`, appending it if new.
    fn intern(&mut self, table: &mut Vec<String>, key: &str) -> u32;
}

/// Deduplication policy for layer values.
pub trait ValueIndex {
    /// Returns the dictionary index of `value`, appending it if new.
    fn intern(&mut self, table: &mut Vec<Value>, value: Value) -> u32;
}

/// Key index that scans the dictionary.
#[derive(Debug, Default)]
pub struct LinearKeyIndex;

impl KeyIndex for LinearKeyIndex {
    fn intern(&mut self, table: &mut Vec<String>, key: &str) -> u32 {
        match table.iter().position(|k| k == key) {
            Some(index) => index as u32,
            None => {
                table.push(key.to_string());
                (table.len() - 1) as u32
            }
        }
    }
}

/// Key index backed by a hash table.
#[derive(Debug, Default)]
pub struct HashedKeyIndex {
    set: IndexSet<String, RandomState>,
}

impl HashedKeyIndex {
    pub fn new() -> Self {
        Default::default()
    }
}

impl KeyIndex for HashedKeyIndex {
    fn intern(&mut self, table: &mut Vec<String>, key: &str) -> u32 {
        match self.set.get_index_of(key) {
            Some(index) => index as u32,
            None => {
                let (index, _) = self.set.insert_full(key.to_string());
                debug_assert_eq!(index, table.len());
                table.push(key.to_string());
                index as u32
            }
        }
    }
}

/// Value index that scans the dictionary.
#[derive(Debug, Default)]
pub struct LinearValueIndex;

impl ValueIndex for LinearValueIndex {
    fn intern(&mut self, table: &mut Vec<Value>, value: Value) -> u32 {
        match table.iter().position(|v| v == &value) {
            Some(index) => index as u32,
            None => {
                table.push(value);
                (table.len() - 1) as u32
            }
        }
    }
}

/// Value index backed by a hash table.
#[derive(Debug, Default)]
pub struct HashedValueIndex {
    set: IndexSet<Value, RandomState>,
}

impl HashedValueIndex {
    pub fn new() -> Self {
        Default::default()
    }
}

impl ValueIndex for HashedValueIndex {
    fn intern(&mut self, table: &mut Vec<Value>, value: Value) -> u32 {
        match self.set.get_index_of(&value) {
            Some(index) => index as u32,
            None => {
                let (index, _) = self.set.insert_full(value.clone());
                debug_assert_eq!(index, table.len());
                table.push(value);
                index as u32
            }
        }
    }
}

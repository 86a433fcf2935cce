//! Symbol tables.
//!
//! Every table keys on interned [`Symbol`]s, so lookup hashes a small
//! integer rather than string contents. Entries remember where the name
//! was declared, for redefinition diagnostics.

use crate::value::ValueId;
use crick_lexer::{Pos, Symbol};
use rustc_hash::FxHashMap;

#[derive(Clone, Copy, Debug)]
pub struct TableEntry {
    pub val: ValueId,
    pub decl_pos: Option<Pos>,
}

/// One scope's name → value mapping (the global table, or the locals of
/// a stack frame).
#[derive(Default)]
pub struct SymTable {
    entries: FxHashMap<Symbol, TableEntry>,
}

impl SymTable {
    pub fn new() -> SymTable {
        SymTable::default()
    }

    /// Bind `key`; returns false (leaving the table unchanged) if the
    /// name is already bound.
    pub fn set(&mut self, key: Symbol, val: ValueId, decl_pos: Option<Pos>) -> bool {
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, TableEntry { val, decl_pos });
        true
    }

    pub fn get(&self, key: Symbol) -> Option<ValueId> {
        self.entries.get(&key).map(|e| e.val)
    }

    pub fn delete(&mut self, key: Symbol) -> Option<ValueId> {
        self.entries.remove(&key).map(|e| e.val)
    }

    pub fn contains(&self, key: Symbol) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Symbol, ValueId)> + '_ {
        self.entries.iter().map(|(&k, e)| (k, e.val))
    }

    /// Remove every entry the predicate selects, yielding the removed
    /// values (used when a scope ends).
    pub fn drain_filter(&mut self, mut keep: impl FnMut(Symbol, ValueId) -> bool) -> Vec<ValueId> {
        let doomed: Vec<Symbol> = self
            .entries
            .iter()
            .filter(|(&k, e)| !keep(k, e.val))
            .map(|(&k, _)| k)
            .collect();
        doomed
            .into_iter()
            .filter_map(|k| self.entries.remove(&k).map(|e| e.val))
            .collect()
    }

    pub fn values(&self) -> impl Iterator<Item = ValueId> + '_ {
        self.entries.values().map(|e| e.val)
    }
}

//! Resolution cache
//!
//! The first execution of an instruction that names a constant pool entry
//! resolves it and stores the result here; later executions read the slot
//! instead of resolving again. Bytecode itself is never rewritten.
//!
//! Resolution is a property of the pool entry, so every instruction naming
//! the same entry of the same class shares a slot.

use crate::vm::classes::{ClassId, Method, ResolvedField, ResolvedStatic};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Resolved form of a pool entry
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Class reference
    Class(ClassId),
    /// Instance field
    Field(ResolvedField),
    /// Static field
    Static(ResolvedStatic),
    /// Method, carrying its virtual table slot when it has one
    Method(Arc<Method>),
}

/// Per-entry resolution slots
#[derive(Debug, Default)]
pub struct InlineCache {
    slots: FxHashMap<(ClassId, u16), Resolution>,
    hits: u64,
    misses: u64,
}

impl InlineCache {
    /// Cached resolution of pool entry `index` of `class`
    pub fn get(&mut self, class: ClassId, index: u16) -> Option<&Resolution> {
        match self.slots.get(&(class, index)) {
            Some(resolution) => {
                self.hits += 1;
                Some(resolution)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Fill a slot
    pub fn insert(&mut self, class: ClassId, index: u16, resolution: Resolution) {
        self.slots.insert((class, index), resolution);
    }

    /// Number of filled slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True before the first resolution
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Lookups served from the cache and lookups that had to resolve
    pub fn counts(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_are_per_class_and_index() {
        let mut cache = InlineCache::default();
        cache.insert(ClassId(1), 4, Resolution::Class(ClassId(9)));
        assert!(matches!(cache.get(ClassId(1), 4), Some(Resolution::Class(ClassId(9)))));
        assert!(cache.get(ClassId(2), 4).is_none());
        assert!(cache.get(ClassId(1), 5).is_none());
        assert_eq!(cache.counts(), (1, 2));
        assert_eq!(cache.len(), 1);
    }
}

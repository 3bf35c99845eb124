//! Property name tables.
//!
//! A [`Names`] table runs parallel to an object's slots. Small tables are
//! searched linearly; once more than [`HASH_THRESHOLD`] slots carry names a
//! hash index keyed by the unqualified name is maintained alongside.

use core_types::QualifiedName;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::sync::Arc;

/// Named slot count above which lookups go through the hash index.
pub const HASH_THRESHOLD: usize = 8;

/// Outcome of a namespace-agnostic lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Exactly one slot carries the name
    Found(u32),
    /// No slot carries the name
    NotFound,
    /// The name exists in more than one namespace
    Ambiguous,
}

impl Lookup {
    /// The slot, if the lookup found exactly one.
    pub fn slot(self) -> Option<u32> {
        match self {
            Lookup::Found(slot) => Some(slot),
            _ => None,
        }
    }
}

/// Slot names of one object.
#[derive(Debug, Clone, Default)]
pub struct Names {
    entries: Vec<QualifiedName>,
    named: usize,
    index: Option<FxHashMap<Arc<str>, SmallVec<[u32; 2]>>>,
}

impl Names {
    /// An empty table.
    pub fn new() -> Self {
        Names::default()
    }

    /// Number of entries (named or not).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True once the hash index is in use.
    pub fn is_hashed(&self) -> bool {
        self.index.is_some()
    }

    /// Name of `slot`, if it has one.
    pub fn get(&self, slot: u32) -> Option<&QualifiedName> {
        self.entries
            .get(slot as usize)
            .filter(|name| !name.is_empty())
    }

    /// Extends the table with unnamed entries up to `len`.
    pub fn resize(&mut self, len: usize) {
        if len > self.entries.len() {
            self.entries.resize(len, QualifiedName::default());
        }
    }

    /// Names `slot`, replacing any previous name.
    pub fn set(&mut self, slot: u32, name: QualifiedName) {
        self.resize(slot as usize + 1);
        self.clear(slot);
        if name.is_empty() {
            return;
        }
        if let Some(index) = self.index.as_mut() {
            index.entry(name.name.clone()).or_default().push(slot);
        }
        self.entries[slot as usize] = name;
        self.named += 1;
        if self.index.is_none() && self.named > HASH_THRESHOLD {
            self.rebuild_index();
        }
    }

    /// Removes the name of `slot`. The entry itself stays so later slots
    /// keep their numbers.
    pub fn clear(&mut self, slot: u32) {
        let Some(entry) = self.entries.get_mut(slot as usize) else {
            return;
        };
        if entry.is_empty() {
            return;
        }
        let old = std::mem::take(entry);
        self.named -= 1;
        if let Some(index) = self.index.as_mut() {
            if let Some(slots) = index.get_mut(&old.name) {
                slots.retain(|s| *s != slot);
                if slots.is_empty() {
                    index.remove(&old.name);
                }
            }
        }
    }

    /// Opens `count` unnamed entries at `at`, renumbering the entries that
    /// follow.
    pub fn insert_room(&mut self, count: usize, at: usize) {
        let at = at.min(self.entries.len());
        let tail = self.entries.split_off(at);
        self.entries
            .extend(std::iter::repeat(QualifiedName::default()).take(count));
        self.entries.extend(tail);
        if self.index.is_some() {
            self.rebuild_index();
        }
    }

    /// Slot of an exact (namespace, name) match.
    pub fn lookup(&self, name: &QualifiedName) -> Option<u32> {
        self.candidates(&name.name)
            .into_iter()
            .find(|&slot| self.entries[slot as usize].space == name.space)
    }

    /// Slot carrying `name` in any namespace, if that slot is unique.
    pub fn lookup_unqualified(&self, name: &str) -> Lookup {
        let candidates = self.candidates(name);
        match candidates.as_slice() {
            [] => Lookup::NotFound,
            [slot] => Lookup::Found(*slot),
            _ => Lookup::Ambiguous,
        }
    }

    /// Slots carrying `name` in any namespace, in slot order.
    pub fn candidates(&self, name: &str) -> SmallVec<[u32; 2]> {
        if name.is_empty() {
            return SmallVec::new();
        }
        match &self.index {
            Some(index) => {
                let mut slots = index.get(name).cloned().unwrap_or_default();
                slots.sort_unstable();
                slots
            }
            None => self
                .entries
                .iter()
                .enumerate()
                .filter(|(_, entry)| &*entry.name == name)
                .map(|(slot, _)| slot as u32)
                .collect(),
        }
    }

    /// Iterates over `(slot, name)` for named slots.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &QualifiedName)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, name)| !name.is_empty())
            .map(|(slot, name)| (slot as u32, name))
    }

    fn rebuild_index(&mut self) {
        let mut index: FxHashMap<Arc<str>, SmallVec<[u32; 2]>> = FxHashMap::default();
        for (slot, entry) in self.entries.iter().enumerate() {
            if !entry.is_empty() {
                index.entry(entry.name.clone()).or_default().push(slot as u32);
            }
        }
        self.index = Some(index);
    }
}

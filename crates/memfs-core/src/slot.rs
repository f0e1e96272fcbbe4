// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Slot table: stable integer identities for allocated records
//!
//! Ids are minted from a monotonically increasing counter and are never
//! handed out twice. The backing slots are recycled through a free list, so
//! memory stays proportional to the live record count while lookups remain
//! O(1) through the id → slot index.

use std::collections::HashMap;

use crate::error::{FsError, FsResult};
use crate::types::InodeId;

#[derive(Debug)]
pub struct SlotTable<T> {
    slots: Vec<Option<T>>,
    free: Vec<usize>,
    index: HashMap<InodeId, usize>,
    next_id: u64,
}

impl<T> SlotTable<T> {
    /// Create an empty table whose first minted id is `first_id`.
    pub fn new(first_id: u64) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            next_id: first_id,
        }
    }

    /// Store a record built from its freshly minted id.
    pub fn allocate_with(&mut self, build: impl FnOnce(InodeId) -> T) -> FsResult<InodeId> {
        self.index.try_reserve(1)?;
        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                self.slots.try_reserve(1)?;
                self.slots.push(None);
                self.slots.len() - 1
            }
        };

        let id = InodeId::new(self.next_id);
        self.next_id += 1;
        self.slots[slot] = Some(build(id));
        self.index.insert(id, slot);
        tracing::trace!(target: "memfs::slot", %id, slot, "allocated slot");
        Ok(id)
    }

    pub fn allocate(&mut self, record: T) -> FsResult<InodeId> {
        self.allocate_with(|_| record)
    }

    pub fn get(&self, id: InodeId) -> FsResult<&T> {
        let slot = *self.index.get(&id).ok_or(FsError::NotFound)?;
        self.slots[slot].as_ref().ok_or(FsError::NotFound)
    }

    pub fn get_mut(&mut self, id: InodeId) -> FsResult<&mut T> {
        let slot = *self.index.get(&id).ok_or(FsError::NotFound)?;
        self.slots[slot].as_mut().ok_or(FsError::NotFound)
    }

    pub fn contains(&self, id: InodeId) -> bool {
        self.index.contains_key(&id)
    }

    /// Logical delete: the slot becomes reusable, the id is retired.
    pub fn remove(&mut self, id: InodeId) -> FsResult<T> {
        let slot = self.index.remove(&id).ok_or(FsError::NotFound)?;
        let record = self.slots[slot].take().ok_or(FsError::NotFound)?;
        self.free.push(slot);
        tracing::trace!(target: "memfs::slot", %id, slot, "released slot");
        Ok(record)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Live records, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (InodeId, &T)> + '_ {
        self.index.iter().filter_map(|(id, &slot)| self.slots[slot].as_ref().map(|r| (*id, r)))
    }
}

impl<T> Default for SlotTable<T> {
    fn default() -> Self {
        Self::new(1)
    }
}

// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Inode store: file content buffers and per-file metadata
//!
//! Each inode sits behind its own `RwLock`; the slot table holding them has
//! a separate lock that is only taken for allocation, lookup and
//! reclamation. Readers of one inode never block writers of another.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{trace, warn};

use crate::clock::Clock;
use crate::config::FsLimits;
use crate::error::{FsError, FsResult};
use crate::fault::{FaultInjector, FaultOp};
use crate::slot::SlotTable;
use crate::sync::{read_lock, write_lock};
use crate::types::{is_dir_mode, Attributes, FileTimes, InodeId, Owner};

/// One file's (or directory's) content and metadata
#[derive(Debug)]
pub struct Inode {
    id: InodeId,
    /// Allocated buffer; its length is the inode's capacity.
    data: Vec<u8>,
    /// Logical length, never larger than `data.len()`.
    size: u64,
    pub(crate) mode: u32,
    pub(crate) uid: u32,
    pub(crate) gid: u32,
    // Updated by readers holding only a shared lock.
    atime: AtomicI64,
    mtime: i64,
    ctime: i64,
    open_count: u32,
    unlinked: bool,
}

impl Inode {
    fn new(id: InodeId, mode: u32, owner: Owner, now: i64) -> Self {
        Self {
            id,
            data: Vec::new(),
            size: 0,
            mode,
            uid: owner.uid,
            gid: owner.gid,
            atime: AtomicI64::new(now),
            mtime: now,
            ctime: now,
            open_count: 0,
            unlinked: false,
        }
    }

    pub fn id(&self) -> InodeId {
        self.id
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn capacity(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn open_count(&self) -> u32 {
        self.open_count
    }

    pub fn is_unlinked(&self) -> bool {
        self.unlinked
    }

    pub fn is_reclaimable(&self) -> bool {
        self.unlinked && self.open_count == 0
    }

    pub fn times(&self) -> FileTimes {
        FileTimes {
            atime: self.atime.load(Ordering::Relaxed),
            mtime: self.mtime,
            ctime: self.ctime,
        }
    }

    pub fn attributes(&self) -> Attributes {
        Attributes {
            ino: self.id,
            mode: self.mode,
            uid: self.uid,
            gid: self.gid,
            size: self.size,
            nlink: 1,
            times: self.times(),
        }
    }

    /// Byte-range access is for regular files only, and through a handle
    /// only while one is open.
    fn check_io(&self, require_open: bool) -> FsResult<()> {
        if require_open && self.open_count == 0 {
            return Err(FsError::BadDescriptor);
        }
        if is_dir_mode(self.mode) {
            return Err(FsError::IsADirectory);
        }
        Ok(())
    }

    /// Copy up to `buf.len()` bytes starting at `offset`; 0 at or past EOF.
    fn read(&self, buf: &mut [u8], offset: u64) -> usize {
        if offset >= self.size {
            return 0;
        }
        // offset < size <= data.len(), so both fit in usize
        let start = offset as usize;
        let end = std::cmp::min(start.saturating_add(buf.len()), self.size as usize);
        let n = end - start;
        buf[..n].copy_from_slice(&self.data[start..end]);
        n
    }

    fn set_times(&mut self, atime: i64, mtime: i64, now: i64) {
        self.atime.store(atime, Ordering::Relaxed);
        self.mtime = mtime;
        self.ctime = now;
    }

    fn touch_modified(&mut self, now: i64) {
        self.mtime = now;
        self.ctime = now;
    }
}

/// Owner of every inode of a mount
pub struct InodeStore {
    table: RwLock<SlotTable<Arc<RwLock<Inode>>>>,
    bytes_in_memory: AtomicU64,
    limits: FsLimits,
    faults: Arc<FaultInjector>,
    clock: Arc<dyn Clock>,
}

impl InodeStore {
    pub fn new(limits: FsLimits, faults: Arc<FaultInjector>, clock: Arc<dyn Clock>) -> Self {
        Self {
            table: RwLock::new(SlotTable::new(1)),
            bytes_in_memory: AtomicU64::new(0),
            limits,
            faults,
            clock,
        }
    }

    /// Allocate a zero-length, zero-capacity inode with no mode bits.
    pub fn create(&self) -> FsResult<InodeId> {
        self.create_with(0, Owner { uid: 0, gid: 0 })
    }

    pub fn create_with(&self, mode: u32, owner: Owner) -> FsResult<InodeId> {
        let mut table = write_lock(&self.table);
        if let Some(max) = self.limits.max_inodes {
            if table.len() >= max {
                return Err(FsError::OutOfMemory);
            }
        }
        self.faults.check(FaultOp::CreateInode)?;
        let now = self.clock.now();
        table.allocate_with(|id| Arc::new(RwLock::new(Inode::new(id, mode, owner, now))))
    }

    fn get(&self, id: InodeId) -> FsResult<Arc<RwLock<Inode>>> {
        read_lock(&self.table).get(id).cloned()
    }

    pub fn contains(&self, id: InodeId) -> bool {
        read_lock(&self.table).contains(id)
    }

    /// Run `f` with shared access to the inode.
    pub fn with_inode<R>(&self, id: InodeId, f: impl FnOnce(&Inode) -> R) -> FsResult<R> {
        let inode = self.get(id)?;
        let guard = read_lock(&*inode);
        Ok(f(&guard))
    }

    pub fn attributes(&self, id: InodeId) -> FsResult<Attributes> {
        self.with_inode(id, Inode::attributes)
    }

    pub fn write(&self, id: InodeId, data: &[u8], offset: u64) -> FsResult<usize> {
        self.write_inner(id, data, offset, false)
    }

    /// `write` that additionally requires an open handle on the inode.
    pub(crate) fn write_open(&self, id: InodeId, data: &[u8], offset: u64) -> FsResult<usize> {
        self.write_inner(id, data, offset, true)
    }

    fn write_inner(
        &self,
        id: InodeId,
        data: &[u8],
        offset: u64,
        require_open: bool,
    ) -> FsResult<usize> {
        let inode = self.get(id)?;
        let mut guard = write_lock(&*inode);
        guard.check_io(require_open)?;
        if offset > guard.size {
            return Err(FsError::Overflow);
        }
        let end = offset.checked_add(data.len() as u64).ok_or(FsError::InvalidInput)?;
        let end_usize = usize::try_from(end).map_err(|_| FsError::InvalidInput)?;
        if end > guard.capacity() {
            self.grow(&mut guard, end_usize)?;
        }

        let start = offset as usize;
        guard.data[start..end_usize].copy_from_slice(data);
        guard.size = std::cmp::max(guard.size, end);
        guard.touch_modified(self.clock.now());
        trace!(target: "memfs::inode", %id, offset, len = data.len(), size = guard.size, "write");
        Ok(data.len())
    }

    pub fn read(&self, id: InodeId, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        self.read_inner(id, buf, offset, false)
    }

    pub(crate) fn read_open(&self, id: InodeId, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        self.read_inner(id, buf, offset, true)
    }

    fn read_inner(
        &self,
        id: InodeId,
        buf: &mut [u8],
        offset: u64,
        require_open: bool,
    ) -> FsResult<usize> {
        let inode = self.get(id)?;
        let guard = read_lock(&*inode);
        guard.check_io(require_open)?;
        let n = guard.read(buf, offset);
        guard.atime.store(self.clock.now(), Ordering::Relaxed);
        Ok(n)
    }

    /// Set the logical size to `new_size`. Growth zero-fills the new region;
    /// shrinking releases the tail of the buffer.
    pub fn truncate(&self, id: InodeId, new_size: u64) -> FsResult<()> {
        self.truncate_inner(id, new_size, false)
    }

    pub(crate) fn truncate_open(&self, id: InodeId, new_size: u64) -> FsResult<()> {
        self.truncate_inner(id, new_size, true)
    }

    fn truncate_inner(&self, id: InodeId, new_size: u64, require_open: bool) -> FsResult<()> {
        let new_len = usize::try_from(new_size).map_err(|_| FsError::InvalidInput)?;
        let inode = self.get(id)?;
        let mut guard = write_lock(&*inode);
        guard.check_io(require_open)?;

        if new_size > guard.capacity() {
            // Bytes between the logical end and the old capacity may hold
            // stale content; the grown file must read back zeros there.
            let size = guard.size as usize;
            guard.data[size..].fill(0);
            self.grow(&mut guard, new_len)?;
        } else {
            let released = guard.capacity() - new_size;
            if new_size > guard.size {
                let size = guard.size as usize;
                guard.data[size..new_len].fill(0);
            }
            guard.data.truncate(new_len);
            guard.data.shrink_to_fit();
            self.bytes_in_memory.fetch_sub(released, Ordering::AcqRel);
        }
        guard.size = new_size;
        guard.touch_modified(self.clock.now());
        trace!(target: "memfs::inode", %id, new_size, "truncate");
        Ok(())
    }

    /// Grow the buffer to exactly `new_len` bytes, zero-filling the tail.
    fn grow(&self, inode: &mut Inode, new_len: usize) -> FsResult<()> {
        let extra = (new_len - inode.data.len()) as u64;
        self.faults.check(FaultOp::GrowBuffer)?;
        self.charge(extra)?;
        if let Err(err) = inode.data.try_reserve_exact(extra as usize) {
            self.bytes_in_memory.fetch_sub(extra, Ordering::AcqRel);
            return Err(err.into());
        }
        inode.data.resize(new_len, 0);
        Ok(())
    }

    fn charge(&self, extra: u64) -> FsResult<()> {
        let Some(max) = self.limits.max_bytes_in_memory else {
            self.bytes_in_memory.fetch_add(extra, Ordering::AcqRel);
            return Ok(());
        };
        let mut current = self.bytes_in_memory.load(Ordering::Acquire);
        loop {
            let next =
                current.checked_add(extra).filter(|n| *n <= max).ok_or(FsError::OutOfMemory)?;
            match self.bytes_in_memory.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    pub fn open(&self, id: InodeId) -> FsResult<()> {
        let inode = self.get(id)?;
        let mut guard = write_lock(&*inode);
        guard.open_count = guard.open_count.checked_add(1).ok_or(FsError::Busy)?;
        Ok(())
    }

    /// Drop one open reference. Returns `true` when this close reclaimed
    /// the inode.
    pub fn close(&self, id: InodeId) -> FsResult<bool> {
        let inode = self.get(id).map_err(|_| FsError::BadDescriptor)?;
        let reclaim = {
            let mut guard = write_lock(&*inode);
            if guard.open_count == 0 {
                return Err(FsError::BadDescriptor);
            }
            guard.open_count -= 1;
            guard.is_reclaimable()
        };
        if reclaim {
            self.reclaim(id);
        }
        Ok(reclaim)
    }

    /// Flag the inode as no longer linked from the catalog. Returns `true`
    /// when it was reclaimed immediately (no open handles).
    pub fn mark_unlinked(&self, id: InodeId) -> FsResult<bool> {
        let inode = self.get(id)?;
        let reclaim = {
            let mut guard = write_lock(&*inode);
            guard.unlinked = true;
            guard.ctime = self.clock.now();
            guard.is_reclaimable()
        };
        if reclaim {
            self.reclaim(id);
        }
        Ok(reclaim)
    }

    fn reclaim(&self, id: InodeId) {
        match write_lock(&self.table).remove(id) {
            Ok(inode) => {
                let capacity = read_lock(&*inode).capacity();
                self.bytes_in_memory.fetch_sub(capacity, Ordering::AcqRel);
                trace!(target: "memfs::inode", %id, capacity, "reclaimed");
            }
            Err(_) => warn!(target: "memfs::inode", %id, "inode already reclaimed"),
        }
    }

    pub fn set_mode(&self, id: InodeId, mode: u32) -> FsResult<()> {
        self.update(id, |inode, now| {
            inode.mode = mode;
            inode.ctime = now;
        })
    }

    pub fn set_owner(&self, id: InodeId, owner: Owner) -> FsResult<()> {
        self.update(id, |inode, now| {
            inode.uid = owner.uid;
            inode.gid = owner.gid;
            inode.ctime = now;
        })
    }

    pub fn set_times(&self, id: InodeId, atime: i64, mtime: i64) -> FsResult<()> {
        self.update(id, |inode, now| inode.set_times(atime, mtime, now))
    }

    /// Stamp mtime/ctime, e.g. on a directory whose entries changed.
    pub fn touch(&self, id: InodeId) -> FsResult<()> {
        self.update(id, |inode, now| inode.touch_modified(now))
    }

    fn update(&self, id: InodeId, f: impl FnOnce(&mut Inode, i64)) -> FsResult<()> {
        let inode = self.get(id)?;
        let mut guard = write_lock(&*inode);
        f(&mut guard, self.clock.now());
        Ok(())
    }

    pub fn len(&self) -> usize {
        read_lock(&self.table).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bytes_in_memory(&self) -> u64 {
        self.bytes_in_memory.load(Ordering::Acquire)
    }

    pub fn open_handles(&self) -> u64 {
        let table = read_lock(&self.table);
        table.iter().map(|(_, inode)| u64::from(read_lock(&**inode).open_count)).sum()
    }
}

// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Storage: one mount's inode store and catalog, and the filesystem verbs
//! composed from them
//!
//! Lock order is catalog → slot table → inode. Verbs that look up a path
//! hold the catalog lock for the whole operation so that the existence
//! check, the open-count check and the structural change are atomic with
//! respect to other path-addressed verbs.

use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use crate::catalog::{split_parent, Catalog, NodeId};
use crate::clock::{Clock, SystemClock};
use crate::config::{FsConfig, UnlinkOpenPolicy};
use crate::error::{FsError, FsResult};
use crate::fault::{FaultInjector, FaultOp, FaultPolicy};
use crate::inode::InodeStore;
use crate::sync::{read_lock, write_lock};
use crate::types::{
    dir_mode, file_mode, is_dir_mode, Attributes, DirEntry, FileHandle, FsStats, InodeId, Owner,
};

/// Permission bits for files created implicitly by `set_size`.
pub const DEFAULT_FILE_PERMISSIONS: u32 = 0o644;

/// Directory listing. The entries are a snapshot taken under the catalog
/// lock when `list` runs, not a walk of the live tree; later changes to the
/// directory are not reflected. The iterator is consumed once and cannot be
/// rewound.
#[derive(Debug)]
pub struct ReadDir {
    entries: std::vec::IntoIter<DirEntry>,
}

impl Iterator for ReadDir {
    type Item = DirEntry;

    fn next(&mut self) -> Option<DirEntry> {
        self.entries.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl ExactSizeIterator for ReadDir {}

/// The in-memory filesystem of a single mount
pub struct Storage {
    config: FsConfig,
    inodes: InodeStore,
    catalog: RwLock<Catalog>,
    faults: Arc<FaultInjector>,
}

impl Storage {
    /// Mount a fresh, empty filesystem.
    pub fn new(config: FsConfig) -> FsResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: FsConfig, clock: Arc<dyn Clock>) -> FsResult<Self> {
        let faults = Arc::new(FaultInjector::new(config.faults.clone()));
        let inodes = InodeStore::new(config.limits.clone(), Arc::clone(&faults), clock);

        let root_owner = Owner {
            uid: config.security.default_uid,
            gid: config.security.default_gid,
        };
        let root_inode = inodes.create_with(dir_mode(config.security.root_mode), root_owner)?;
        debug!(target: "memfs::storage", root = %root_inode, "storage initialized");

        Ok(Self {
            config,
            inodes,
            catalog: RwLock::new(Catalog::new(root_inode)),
            faults,
        })
    }

    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    pub fn inodes(&self) -> &InodeStore {
        &self.inodes
    }

    /// Run `f` with shared access to the catalog.
    pub fn with_catalog<R>(&self, f: impl FnOnce(&Catalog) -> R) -> R {
        f(&read_lock(&self.catalog))
    }

    pub fn root(&self) -> NodeId {
        read_lock(&self.catalog).root()
    }

    pub fn resolve(&self, path: &str) -> FsResult<NodeId> {
        read_lock(&self.catalog).resolve(path)
    }

    pub fn exists(&self, path: &str) -> bool {
        read_lock(&self.catalog).exists(path)
    }

    pub fn set_fault_policy(&self, policy: FaultPolicy) {
        debug!(
            target: "memfs::storage",
            active = policy.is_active(),
            rules = policy.rules.len(),
            "fault policy replaced"
        );
        self.faults.set_policy(policy);
    }

    fn default_owner(&self) -> Owner {
        Owner {
            uid: self.config.security.default_uid,
            gid: self.config.security.default_gid,
        }
    }

    fn inode_at(catalog: &Catalog, path: &str) -> FsResult<InodeId> {
        Ok(catalog.node(catalog.resolve(path)?)?.inode())
    }

    pub fn stat(&self, path: &str) -> FsResult<Attributes> {
        debug!(target: "memfs::ops", path, "stat");
        let catalog = read_lock(&self.catalog);
        let ino = Self::inode_at(&catalog, path)?;
        self.inodes.attributes(ino)
    }

    /// Metadata of an open handle's inode.
    pub fn stat_handle(&self, handle: FileHandle) -> FsResult<Attributes> {
        let attrs = self
            .inodes
            .with_inode(handle, |inode| (inode.open_count() > 0).then(|| inode.attributes()))
            .map_err(Self::handle_error)?;
        attrs.ok_or(FsError::BadDescriptor)
    }

    /// Entries of the directory at `path`, `.` and `..` first.
    pub fn list(&self, path: &str) -> FsResult<ReadDir> {
        debug!(target: "memfs::ops", path, "list");
        let catalog = read_lock(&self.catalog);
        let entries = catalog.entries(catalog.resolve(path)?)?;
        Ok(ReadDir {
            entries: entries.into_iter(),
        })
    }

    pub fn make_directory(&self, path: &str, mode: u32) -> FsResult<()> {
        self.make_directory_as(path, mode, self.default_owner())
    }

    pub fn make_directory_as(&self, path: &str, mode: u32, owner: Owner) -> FsResult<()> {
        debug!(
            target: "memfs::ops",
            path,
            mode,
            uid = owner.uid,
            gid = owner.gid,
            "make_directory"
        );
        let mut catalog = write_lock(&self.catalog);
        self.make_entry(&mut catalog, path, true, mode, owner).map(|_| ())
    }

    pub fn make_file(&self, path: &str, mode: u32) -> FsResult<()> {
        self.make_file_as(path, mode, self.default_owner())
    }

    pub fn make_file_as(&self, path: &str, mode: u32, owner: Owner) -> FsResult<()> {
        debug!(
            target: "memfs::ops",
            path,
            mode,
            uid = owner.uid,
            gid = owner.gid,
            "make_file"
        );
        let mut catalog = write_lock(&self.catalog);
        self.make_entry(&mut catalog, path, false, mode, owner).map(|_| ())
    }

    fn make_entry(
        &self,
        catalog: &mut Catalog,
        path: &str,
        is_directory: bool,
        mode: u32,
        owner: Owner,
    ) -> FsResult<InodeId> {
        if catalog.exists(path) {
            return Err(FsError::AlreadyExists);
        }
        let (parent_path, name) = split_parent(path)?;
        let parent_inode = Self::inode_at(catalog, parent_path)?;

        let mode = if is_directory { dir_mode(mode) } else { file_mode(mode) };
        let ino = self.inodes.create_with(mode, owner)?;
        let linked = self
            .faults
            .check(FaultOp::InsertEntry)
            .and_then(|()| catalog.insert(parent_path, name, is_directory, ino));
        if let Err(err) = linked {
            // Never leave an inode that no catalog entry refers to.
            self.inodes.mark_unlinked(ino)?;
            return Err(err);
        }
        self.inodes.touch(parent_inode)?;
        Ok(ino)
    }

    /// Open the file at `path` for reading and writing.
    pub fn open_for_io(&self, path: &str) -> FsResult<FileHandle> {
        debug!(target: "memfs::ops", path, "open");
        let catalog = read_lock(&self.catalog);
        let ino = Self::inode_at(&catalog, path)?;
        if self.inodes.with_inode(ino, |inode| is_dir_mode(inode.mode))? {
            return Err(FsError::IsADirectory);
        }
        self.inodes.open(ino)?;
        Ok(ino)
    }

    pub fn open_directory(&self, path: &str) -> FsResult<FileHandle> {
        debug!(target: "memfs::ops", path, "open_directory");
        let catalog = read_lock(&self.catalog);
        let ino = Self::inode_at(&catalog, path)?;
        if !self.inodes.with_inode(ino, |inode| is_dir_mode(inode.mode))? {
            return Err(FsError::NotADirectory);
        }
        self.inodes.open(ino)?;
        Ok(ino)
    }

    /// Read up to `buf.len()` bytes at `offset`; 0 at or past end of file.
    pub fn read_at(&self, handle: FileHandle, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        debug!(target: "memfs::ops", ino = %handle, offset, size = buf.len(), "read");
        self.inodes.read_open(handle, buf, offset).map_err(Self::handle_error)
    }

    pub fn write_at(&self, handle: FileHandle, data: &[u8], offset: u64) -> FsResult<usize> {
        debug!(target: "memfs::ops", ino = %handle, offset, size = data.len(), "write");
        self.inodes.write_open(handle, data, offset).map_err(Self::handle_error)
    }

    pub fn close(&self, handle: FileHandle) -> FsResult<()> {
        debug!(target: "memfs::ops", ino = %handle, "close");
        self.release(handle, false)
    }

    pub fn close_directory(&self, handle: FileHandle) -> FsResult<()> {
        debug!(target: "memfs::ops", ino = %handle, "close_directory");
        self.release(handle, true)
    }

    fn release(&self, handle: FileHandle, directory: bool) -> FsResult<()> {
        let is_dir = self
            .inodes
            .with_inode(handle, |inode| is_dir_mode(inode.mode))
            .map_err(Self::handle_error)?;
        match (directory, is_dir) {
            (false, true) => return Err(FsError::IsADirectory),
            (true, false) => return Err(FsError::NotADirectory),
            _ => {}
        }
        if self.inodes.close(handle)? {
            debug!(target: "memfs::ops", ino = %handle, "reclaimed on last close");
        }
        Ok(())
    }

    fn handle_error(err: FsError) -> FsError {
        match err {
            FsError::NotFound => FsError::BadDescriptor,
            other => other,
        }
    }

    pub fn unlink(&self, path: &str) -> FsResult<()> {
        debug!(target: "memfs::ops", path, "unlink");
        let mut catalog = write_lock(&self.catalog);
        let node_id = catalog.resolve(path)?;
        let node = catalog.node(node_id)?;
        if node.is_directory() {
            return Err(FsError::IsADirectory);
        }
        let ino = node.inode();
        let open_count = self.inodes.with_inode(ino, |inode| inode.open_count())?;
        if open_count > 0 && self.config.unlink_open == UnlinkOpenPolicy::Busy {
            return Err(FsError::Busy);
        }
        self.remove_node(&mut catalog, node_id)
    }

    pub fn remove_directory(&self, path: &str) -> FsResult<()> {
        debug!(target: "memfs::ops", path, "remove_directory");
        let mut catalog = write_lock(&self.catalog);
        let node_id = catalog.resolve(path)?;
        let node = catalog.node(node_id)?;
        if !node.is_directory() {
            return Err(FsError::NotADirectory);
        }
        if node_id == catalog.root() {
            return Err(FsError::Busy);
        }
        if self.inodes.with_inode(node.inode(), |inode| inode.open_count())? > 0 {
            return Err(FsError::Busy);
        }
        if node.child_count() > 0 {
            return Err(FsError::NotEmpty);
        }
        self.remove_node(&mut catalog, node_id)
    }

    fn remove_node(&self, catalog: &mut Catalog, node_id: NodeId) -> FsResult<()> {
        let parent_inode = catalog.node(catalog.parent_of(node_id)?)?.inode();
        for ino in catalog.erase(node_id, true)? {
            match self.inodes.mark_unlinked(ino) {
                Ok(true) => {}
                Ok(false) => debug!(target: "memfs::ops", ino = %ino, "unlinked while open"),
                Err(err) => {
                    warn!(target: "memfs::ops", ino = %ino, %err, "erased entry had no inode")
                }
            }
        }
        self.inodes.touch(parent_inode)
    }

    /// Resize the file at `path`, creating it under an existing parent if
    /// it does not exist yet.
    pub fn set_size(&self, path: &str, new_size: u64) -> FsResult<()> {
        debug!(target: "memfs::ops", path, new_size, "set_size");
        let mut catalog = write_lock(&self.catalog);
        let ino = match Self::inode_at(&catalog, path) {
            Ok(ino) => ino,
            Err(FsError::NotFound) => self.make_entry(
                &mut catalog,
                path,
                false,
                DEFAULT_FILE_PERMISSIONS,
                self.default_owner(),
            )?,
            Err(err) => return Err(err),
        };
        if self.inodes.with_inode(ino, |inode| is_dir_mode(inode.mode))? {
            return Err(FsError::IsADirectory);
        }
        self.inodes.truncate(ino, new_size)
    }

    pub fn truncate_handle(&self, handle: FileHandle, new_size: u64) -> FsResult<()> {
        debug!(target: "memfs::ops", ino = %handle, new_size, "truncate_handle");
        self.inodes.truncate_open(handle, new_size).map_err(Self::handle_error)
    }

    /// Replace permission bits; the file type bits are kept.
    pub fn set_mode(&self, path: &str, mode: u32) -> FsResult<()> {
        debug!(target: "memfs::ops", path, mode, "set_mode");
        let catalog = read_lock(&self.catalog);
        let ino = Self::inode_at(&catalog, path)?;
        let is_dir = self.inodes.with_inode(ino, |inode| is_dir_mode(inode.mode))?;
        let mode = if is_dir { dir_mode(mode) } else { file_mode(mode) };
        self.inodes.set_mode(ino, mode)
    }

    pub fn set_owner(&self, path: &str, owner: Owner) -> FsResult<()> {
        debug!(target: "memfs::ops", path, uid = owner.uid, gid = owner.gid, "set_owner");
        let catalog = read_lock(&self.catalog);
        self.inodes.set_owner(Self::inode_at(&catalog, path)?, owner)
    }

    pub fn set_times(&self, path: &str, atime: i64, mtime: i64) -> FsResult<()> {
        debug!(target: "memfs::ops", path, atime, mtime, "set_times");
        let catalog = read_lock(&self.catalog);
        self.inodes.set_times(Self::inode_at(&catalog, path)?, atime, mtime)
    }

    pub fn stats(&self) -> FsStats {
        let catalog_entries = read_lock(&self.catalog).len();
        FsStats {
            inodes: self.inodes.len(),
            catalog_entries,
            open_handles: self.inodes.open_handles(),
            bytes_in_memory: self.inodes.bytes_in_memory(),
        }
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        let stats = self.stats();
        debug!(
            target: "memfs::storage",
            inodes = stats.inodes,
            entries = stats.catalog_entries,
            open_handles = stats.open_handles,
            bytes = stats.bytes_in_memory,
            "storage released"
        );
    }
}

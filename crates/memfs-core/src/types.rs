// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Core type definitions for MemFS

use serde::{Deserialize, Serialize};

/// Stable inode identifier, minted by the slot table and never reused
/// during the lifetime of a `Storage`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InodeId(pub u64);

impl InodeId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for InodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle returned by `open_for_io` / `open_directory`: the inode id itself.
pub type FileHandle = InodeId;

/// File timestamps (seconds since the Unix epoch)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FileTimes {
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

impl FileTimes {
    pub fn at(now: i64) -> Self {
        Self {
            atime: now,
            mtime: now,
            ctime: now,
        }
    }
}

/// Caller identity stamped onto newly created entries
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Owner {
    pub uid: u32,
    pub gid: u32,
}

/// File attributes surfaced to the host
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attributes {
    pub ino: InodeId,
    /// Type and permission bits (`S_IFDIR`/`S_IFREG` | perms)
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub nlink: u32,
    pub times: FileTimes,
}

impl Attributes {
    pub fn is_dir(&self) -> bool {
        is_dir_mode(self.mode)
    }

    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }
}

/// Directory entry yielded by `list`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub ino: InodeId,
    pub is_dir: bool,
}

/// Filesystem statistics
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FsStats {
    pub inodes: usize,
    pub catalog_entries: usize,
    pub open_handles: u64,
    pub bytes_in_memory: u64,
}

pub(crate) const S_IFMT: u32 = libc::S_IFMT as u32;
pub(crate) const S_IFDIR: u32 = libc::S_IFDIR as u32;
pub(crate) const S_IFREG: u32 = libc::S_IFREG as u32;

pub(crate) fn is_dir_mode(mode: u32) -> bool {
    mode & S_IFMT == S_IFDIR
}

pub(crate) fn dir_mode(perms: u32) -> u32 {
    S_IFDIR | (perms & 0o7777)
}

pub(crate) fn file_mode(perms: u32) -> u32 {
    S_IFREG | (perms & 0o7777)
}

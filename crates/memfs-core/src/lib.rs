// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! MemFS core - an in-memory filesystem engine
//!
//! This crate provides the storage behind a host filesystem layer: an inode
//! store holding file content and metadata, a directory catalog mapping
//! slash-separated paths to inodes, and the POSIX-like verbs composed from
//! the two. Nothing is persisted; a `Storage` lives exactly as long as the
//! mount it backs.

pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
pub mod fault;
pub mod inode;
pub mod ops;
pub mod slot;
pub mod storage;
pub mod types;

mod sync;

#[cfg(test)]
mod testing;

// Re-export key types
pub use config::{FsConfig, FsLimits, SecurityPolicy, UnlinkOpenPolicy};
pub use error::{FsError, FsResult};
pub use ops::{FilesystemOps, IntoStatus, status};
pub use storage::{ReadDir, Storage};
pub use types::{Attributes, DirEntry, FileHandle, FileTimes, FsStats, InodeId, Owner};

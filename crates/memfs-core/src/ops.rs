// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Host-facing operation table
//!
//! A host integration layer (FUSE glue, a test harness) holds an
//! `Arc<dyn FilesystemOps>` and dispatches each request to one method. The
//! I/O verbs take the request's declared byte count separately from the
//! buffer, the way host callbacks receive them; a count larger than the
//! buffer is rejected as `InvalidInput`.

use libc::c_int;

use crate::error::{FsError, FsResult};
use crate::storage::{ReadDir, Storage};
use crate::types::{Attributes, FileHandle, FsStats, Owner};

pub trait FilesystemOps: Send + Sync {
    fn getattr(&self, path: &str) -> FsResult<Attributes>;
    fn fgetattr(&self, handle: FileHandle) -> FsResult<Attributes>;
    fn readdir(&self, path: &str) -> FsResult<ReadDir>;
    fn mkdir(&self, path: &str, mode: u32, owner: Owner) -> FsResult<()>;
    fn create(&self, path: &str, mode: u32, owner: Owner) -> FsResult<()>;
    fn open(&self, path: &str) -> FsResult<FileHandle>;
    fn opendir(&self, path: &str) -> FsResult<FileHandle>;
    fn read(&self, handle: FileHandle, buf: &mut [u8], size: usize, offset: u64) -> FsResult<usize>;
    fn write(&self, handle: FileHandle, data: &[u8], size: usize, offset: u64) -> FsResult<usize>;
    fn release(&self, handle: FileHandle) -> FsResult<()>;
    fn releasedir(&self, handle: FileHandle) -> FsResult<()>;
    fn unlink(&self, path: &str) -> FsResult<()>;
    fn rmdir(&self, path: &str) -> FsResult<()>;
    fn truncate(&self, path: &str, size: u64) -> FsResult<()>;
    fn ftruncate(&self, handle: FileHandle, size: u64) -> FsResult<()>;
    fn chmod(&self, path: &str, mode: u32) -> FsResult<()>;
    fn chown(&self, path: &str, owner: Owner) -> FsResult<()>;
    fn utimens(&self, path: &str, atime: i64, mtime: i64) -> FsResult<()>;
    fn statfs(&self) -> FsStats;
}

impl FilesystemOps for Storage {
    fn getattr(&self, path: &str) -> FsResult<Attributes> {
        self.stat(path)
    }

    fn fgetattr(&self, handle: FileHandle) -> FsResult<Attributes> {
        self.stat_handle(handle)
    }

    fn readdir(&self, path: &str) -> FsResult<ReadDir> {
        self.list(path)
    }

    fn mkdir(&self, path: &str, mode: u32, owner: Owner) -> FsResult<()> {
        self.make_directory_as(path, mode, owner)
    }

    fn create(&self, path: &str, mode: u32, owner: Owner) -> FsResult<()> {
        self.make_file_as(path, mode, owner)
    }

    fn open(&self, path: &str) -> FsResult<FileHandle> {
        self.open_for_io(path)
    }

    fn opendir(&self, path: &str) -> FsResult<FileHandle> {
        self.open_directory(path)
    }

    fn read(
        &self,
        handle: FileHandle,
        buf: &mut [u8],
        size: usize,
        offset: u64,
    ) -> FsResult<usize> {
        let buf = buf.get_mut(..size).ok_or(FsError::InvalidInput)?;
        self.read_at(handle, buf, offset)
    }

    fn write(&self, handle: FileHandle, data: &[u8], size: usize, offset: u64) -> FsResult<usize> {
        let data = data.get(..size).ok_or(FsError::InvalidInput)?;
        self.write_at(handle, data, offset)
    }

    fn release(&self, handle: FileHandle) -> FsResult<()> {
        self.close(handle)
    }

    fn releasedir(&self, handle: FileHandle) -> FsResult<()> {
        self.close_directory(handle)
    }

    fn unlink(&self, path: &str) -> FsResult<()> {
        Storage::unlink(self, path)
    }

    fn rmdir(&self, path: &str) -> FsResult<()> {
        self.remove_directory(path)
    }

    fn truncate(&self, path: &str, size: u64) -> FsResult<()> {
        self.set_size(path, size)
    }

    fn ftruncate(&self, handle: FileHandle, size: u64) -> FsResult<()> {
        self.truncate_handle(handle, size)
    }

    fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        self.set_mode(path, mode)
    }

    fn chown(&self, path: &str, owner: Owner) -> FsResult<()> {
        self.set_owner(path, owner)
    }

    fn utimens(&self, path: &str, atime: i64, mtime: i64) -> FsResult<()> {
        self.set_times(path, atime, mtime)
    }

    fn statfs(&self) -> FsStats {
        self.stats()
    }
}

/// Results the host reports back as a single status integer
pub trait IntoStatus {
    fn into_status(self) -> c_int;
}

impl IntoStatus for FsResult<()> {
    fn into_status(self) -> c_int {
        match self {
            Ok(()) => 0,
            Err(err) => -err.errno(),
        }
    }
}

impl IntoStatus for FsResult<usize> {
    /// Byte count on success, saturated to `c_int::MAX`.
    fn into_status(self) -> c_int {
        match self {
            Ok(n) => c_int::try_from(n).unwrap_or(c_int::MAX),
            Err(err) => -err.errno(),
        }
    }
}

/// Non-negative on success, negative errno on failure.
pub fn status(result: impl IntoStatus) -> c_int {
    result.into_status()
}

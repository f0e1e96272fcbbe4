// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Test-only helpers shared by the unit tests

use crate::config::FsConfig;
use crate::storage::Storage;
use crate::types::FileHandle;

pub(crate) fn create_test_fs() -> Storage {
    Storage::new(FsConfig::default()).unwrap()
}

/// Whole logical content of an open file.
pub(crate) fn read_all(fs: &Storage, handle: FileHandle) -> Vec<u8> {
    let size = fs.stat_handle(handle).unwrap().size as usize;
    let mut buf = vec![0u8; size];
    let n = fs.read_at(handle, &mut buf, 0).unwrap();
    buf.truncate(n);
    buf
}

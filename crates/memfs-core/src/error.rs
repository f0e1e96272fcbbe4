// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for MemFS Core

use libc::{
    c_int, EBADF, EBUSY, EEXIST, EINVAL, EISDIR, ENOENT, ENOMEM, ENOTDIR, ENOTEMPTY, EOVERFLOW,
};

/// Core filesystem error type
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("directory not empty")]
    NotEmpty,
    #[error("busy")]
    Busy,
    #[error("bad file descriptor")]
    BadDescriptor,
    #[error("offset past end of file")]
    Overflow,
    #[error("out of memory")]
    OutOfMemory,
    #[error("invalid input")]
    InvalidInput,
}

impl FsError {
    /// POSIX errno for this error kind (positive).
    pub fn errno(self) -> c_int {
        match self {
            FsError::NotFound => ENOENT,
            FsError::AlreadyExists => EEXIST,
            FsError::NotADirectory => ENOTDIR,
            FsError::IsADirectory => EISDIR,
            FsError::NotEmpty => ENOTEMPTY,
            FsError::Busy => EBUSY,
            FsError::BadDescriptor => EBADF,
            FsError::Overflow => EOVERFLOW,
            FsError::OutOfMemory => ENOMEM,
            FsError::InvalidInput => EINVAL,
        }
    }
}

impl From<std::collections::TryReserveError> for FsError {
    fn from(_: std::collections::TryReserveError) -> Self {
        FsError::OutOfMemory
    }
}

pub type FsResult<T> = Result<T, FsError>;

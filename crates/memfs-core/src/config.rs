// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Configuration for a MemFS mount

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::fault::FaultPolicy;

/// Ownership and permission defaults
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityPolicy {
    /// Owner stamped onto the root and onto entries created without an explicit owner
    pub default_uid: u32,
    pub default_gid: u32,
    /// Permission bits of the root directory
    pub root_mode: u32,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            default_uid: 0,
            default_gid: 0,
            root_mode: 0o755,
        }
    }
}

/// Resource ceilings. Exceeding either fails with `OutOfMemory`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FsLimits {
    pub max_inodes: Option<usize>,
    pub max_bytes_in_memory: Option<u64>,
}

/// What `unlink` does with a file that is still open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlinkOpenPolicy {
    /// Refuse with `Busy`, leaving the tree and inode untouched.
    #[default]
    Busy,
    /// Remove the name now; the inode is reclaimed on its last close.
    Defer,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FsConfig {
    pub security: SecurityPolicy,
    pub limits: FsLimits,
    pub unlink_open: UnlinkOpenPolicy,
    pub faults: FaultPolicy,
}

/// Errors raised while loading a configuration file
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

impl FsConfig {
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path)?;
        Ok(Self::from_json_bytes(&bytes)?)
    }
}

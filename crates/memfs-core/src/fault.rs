// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Allocation fault injection for the storage engine

use crate::FsError;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

/// Allocation sites that can be made to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultOp {
    /// Minting a new inode record
    CreateInode,
    /// Growing an inode's content buffer (write tail growth or truncate)
    GrowBuffer,
    /// Linking a new entry into the catalog
    InsertEntry,
}

/// Which allocation fails and how often. Every injected fault surfaces as
/// `FsError::OutOfMemory`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultRule {
    pub op: FaultOp,
    /// Number of leading invocations to let through before failing.
    #[serde(default)]
    pub start_after: u64,
    /// Cap on injected failures for this rule.
    #[serde(default)]
    pub max_faults: Option<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultPolicy {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub rules: Vec<FaultRule>,
}

impl FaultPolicy {
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn is_active(&self) -> bool {
        self.enabled && !self.rules.is_empty()
    }
}

#[derive(Clone, Debug, Default)]
struct RuleCounters {
    hits: u64,
    invocations: u64,
}

#[derive(Debug, Default)]
struct FaultState {
    policy: FaultPolicy,
    counters: Vec<RuleCounters>,
}

/// Runtime controller that tracks policy + hit counts.
#[derive(Debug, Default)]
pub struct FaultInjector {
    state: Mutex<FaultState>,
}

impl FaultInjector {
    pub fn new(policy: FaultPolicy) -> Self {
        let injector = Self::default();
        injector.set_policy(policy);
        injector
    }

    pub fn set_policy(&self, policy: FaultPolicy) {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        guard.counters = vec![RuleCounters::default(); policy.rules.len()];
        guard.policy = policy;
    }

    /// Returns `Err(OutOfMemory)` when a rule for `op` fires.
    pub fn check(&self, op: FaultOp) -> Result<(), FsError> {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !guard.policy.enabled {
            return Ok(());
        }
        let state = &mut *guard;
        for (rule, counters) in state.policy.rules.iter().zip(state.counters.iter_mut()) {
            if rule.op != op {
                continue;
            }
            counters.invocations = counters.invocations.saturating_add(1);
            if counters.invocations <= rule.start_after {
                continue;
            }
            if let Some(max) = rule.max_faults {
                if counters.hits >= max {
                    continue;
                }
            }
            counters.hits = counters.hits.saturating_add(1);
            tracing::debug!(
                target: "memfs::fault",
                ?op,
                hits = counters.hits,
                "injecting allocation failure"
            );
            return Err(FsError::OutOfMemory);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_fault_policy_json() {
        let json = br#"{ "enabled": true, "rules": [ { "op": "grow_buffer", "max_faults": 2 } ] }"#;
        let policy = FaultPolicy::from_json_bytes(json).expect("policy");
        assert!(policy.is_active());
        assert_eq!(policy.rules.len(), 1);
        assert_eq!(policy.rules[0].op, FaultOp::GrowBuffer);
        assert_eq!(policy.rules[0].start_after, 0);
        assert_eq!(policy.rules[0].max_faults, Some(2));
    }

    #[test]
    fn test_injector_respects_start_and_max_hits() {
        let injector = FaultInjector::new(FaultPolicy {
            enabled: true,
            rules: vec![FaultRule {
                op: FaultOp::CreateInode,
                start_after: 1,
                max_faults: Some(2),
            }],
        });

        // First call skipped due to start_after
        assert!(injector.check(FaultOp::CreateInode).is_ok());
        // Other ops never match
        assert!(injector.check(FaultOp::GrowBuffer).is_ok());
        // Next two fail
        assert_eq!(injector.check(FaultOp::CreateInode), Err(FsError::OutOfMemory));
        assert_eq!(injector.check(FaultOp::CreateInode), Err(FsError::OutOfMemory));
        // Max hits reached
        assert!(injector.check(FaultOp::CreateInode).is_ok());
    }

    #[test]
    fn test_disabled_policy_never_faults() {
        let injector = FaultInjector::new(FaultPolicy {
            enabled: false,
            rules: vec![FaultRule {
                op: FaultOp::InsertEntry,
                start_after: 0,
                max_faults: None,
            }],
        });
        for _ in 0..5 {
            assert!(injector.check(FaultOp::InsertEntry).is_ok());
        }
    }

    #[test]
    fn test_replacing_policy_resets_counters() {
        let rule = FaultRule {
            op: FaultOp::GrowBuffer,
            start_after: 0,
            max_faults: Some(1),
        };
        let policy = FaultPolicy {
            enabled: true,
            rules: vec![rule],
        };
        let injector = FaultInjector::new(policy.clone());
        assert!(injector.check(FaultOp::GrowBuffer).is_err());
        assert!(injector.check(FaultOp::GrowBuffer).is_ok());

        injector.set_policy(policy);
        assert!(injector.check(FaultOp::GrowBuffer).is_err());
    }
}

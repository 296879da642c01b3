//! Shared types for logscope
//!
//! This crate contains the data structures exchanged between the scope tree,
//! the observer collaborators and the filter rule builders.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Scope Path Constants
// ============================================================================

/// Separator between the segments of a scope path
pub const SCOPE_SEPARATOR: &str = "::";

/// Trailing marker meaning "this node and all descendants"
pub const SCOPE_ALL: char = '*';

/// Size of the fixed name buffer used by the transport for scope paths
pub const MAX_SCOPE_PATH_LEN: usize = 256;

/// Stable identifier (cookie) of a log-producing instance
pub type InstanceId = u64;

/// Scope identifier used before the producer assigns one
pub const SCOPE_ID_UNASSIGNED: u32 = 0;

// ============================================================================
// Priority Mask
// ============================================================================

bitflags! {
    /// Severity bitmask carried by every scope tree node.
    ///
    /// `NOT_SET` marks a node that was never configured. It never coexists
    /// with concrete severity bits once a mask is normalized.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct PriorityMask: u32 {
        const NOT_SET = 0x0001;
        const SCOPE   = 0x0010;
        const FATAL   = 0x0020;
        const ERROR   = 0x0040;
        const WARNING = 0x0080;
        const INFO    = 0x0100;
        const DEBUG   = 0x0200;

        /// All message severities
        const LOGS  = Self::FATAL.bits()
            | Self::ERROR.bits()
            | Self::WARNING.bits()
            | Self::INFO.bits()
            | Self::DEBUG.bits();

        /// Every concrete bit
        const VALID = Self::LOGS.bits() | Self::SCOPE.bits();
    }
}

/// Single-bit flags with their short labels, in display order
const MASK_LABELS: [(PriorityMask, &str); 6] = [
    (PriorityMask::DEBUG, "DBG"),
    (PriorityMask::INFO, "INF"),
    (PriorityMask::WARNING, "WRN"),
    (PriorityMask::ERROR, "ERR"),
    (PriorityMask::FATAL, "FTL"),
    (PriorityMask::SCOPE, "SCP"),
];

impl Default for PriorityMask {
    fn default() -> Self {
        Self::NOT_SET
    }
}

impl PriorityMask {
    /// Build a mask from raw wire bits, dropping unknown bits
    pub fn from_raw(bits: u32) -> Self {
        Self::from_bits_truncate(bits).normalized()
    }

    /// Drop the `NOT_SET` marker if any concrete bit is present
    pub fn normalized(self) -> Self {
        if self.intersects(Self::VALID) {
            self - Self::NOT_SET
        } else {
            self
        }
    }

    /// Bitwise union, keeping `NOT_SET` exclusive
    pub fn merge(self, other: Self) -> Self {
        (self | other).normalized()
    }

    /// Bitwise AND-NOT, keeping `NOT_SET` exclusive
    pub fn without(self, bits: Self) -> Self {
        (self - bits).normalized()
    }

    /// True when nothing was ever configured
    pub fn is_not_set(self) -> bool {
        self == Self::NOT_SET
    }

    /// True when at least one concrete severity bit is enabled
    pub fn has_concrete(self) -> bool {
        self.intersects(Self::VALID)
    }

    /// Short display label, e.g. `DBG|INF`
    pub fn label(self) -> String {
        if self.is_empty() {
            return "OFF".to_string();
        }
        if self.is_not_set() {
            return "NOTSET".to_string();
        }

        MASK_LABELS
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, label)| *label)
            .collect::<Vec<_>>()
            .join("|")
    }
}

impl fmt::Display for PriorityMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Error returned when a priority list cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown priority '{0}'")]
pub struct ParsePriorityError(pub String);

impl FromStr for PriorityMask {
    type Err = ParsePriorityError;

    /// Parse a comma or pipe separated list such as `debug,info` or `ERR|FTL`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut mask = Self::empty();

        for token in s.split([',', '|']).map(str::trim).filter(|t| !t.is_empty()) {
            let flag = match token.to_lowercase().as_str() {
                "debug" | "dbg" => Self::DEBUG,
                "info" | "inf" => Self::INFO,
                "warning" | "warn" | "wrn" => Self::WARNING,
                "error" | "err" => Self::ERROR,
                "fatal" | "ftl" => Self::FATAL,
                "scope" | "scp" => Self::SCOPE,
                "logs" => Self::LOGS,
                "all" => Self::VALID,
                "notset" | "not_set" => Self::NOT_SET,
                "off" | "none" => Self::empty(),
                _ => return Err(ParsePriorityError(token.to_string())),
            };
            mask |= flag;
        }

        Ok(mask.normalized())
    }
}

// ============================================================================
// Producer Metadata
// ============================================================================

/// A connected or historical log-producing instance
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceInfo {
    pub instance_id: InstanceId,
    pub name: String,
    #[serde(default)]
    pub location: String,
}

impl InstanceInfo {
    pub fn new(instance_id: InstanceId, name: impl Into<String>) -> Self {
        Self {
            instance_id,
            name: name.into(),
            location: String::new(),
        }
    }
}

/// A scope as announced by a producer or read from a store catalog
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeInfo {
    /// Full scope path, e.g. `Svc::Comp::Init`
    pub name: String,

    /// Numeric scope identifier, 0 until assigned
    #[serde(default)]
    pub scope_id: u32,

    /// Raw priority bits
    pub priority: u32,
}

impl ScopeInfo {
    pub fn new(name: impl Into<String>, scope_id: u32, priority: PriorityMask) -> Self {
        Self {
            name: name.into(),
            scope_id,
            priority: priority.bits(),
        }
    }

    /// Priority as a normalized mask
    pub fn mask(&self) -> PriorityMask {
        PriorityMask::from_raw(self.priority)
    }
}

// ============================================================================
// Live Update Wire Format
// ============================================================================

/// One `(scope, mask)` entry of a live priority update
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopePriorityRecord {
    pub scope_id: u32,
    pub priority: u32,
    pub path: String,
}

impl ScopePriorityRecord {
    pub fn new(scope_id: u32, priority: PriorityMask, path: impl Into<String>) -> Self {
        Self {
            scope_id,
            priority: priority.bits(),
            path: path.into(),
        }
    }

    /// True when the path addresses a whole subtree
    pub fn is_wildcard(&self) -> bool {
        self.path.ends_with(SCOPE_ALL)
    }
}

/// A batch of records addressed to one producer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityUpdate {
    pub target: InstanceId,
    pub count: u32,
    pub records: Vec<ScopePriorityRecord>,
}

impl PriorityUpdate {
    pub fn new(target: InstanceId, records: Vec<ScopePriorityRecord>) -> Self {
        Self {
            target,
            count: records.len() as u32,
            records,
        }
    }
}

// ============================================================================
// Discovery Feed Events
// ============================================================================

/// Events delivered by the instance-discovery feed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DiscoveryEvent {
    /// New producers became known
    InstancesConnected { instances: Vec<InstanceInfo> },

    /// Producers went away
    InstancesDisconnected { instances: Vec<InstanceId> },

    /// The connection to the log collector was lost
    ServiceDisconnected,

    /// A producer announced its scopes
    ScopesRegistered {
        instance_id: InstanceId,
        scopes: Vec<ScopeInfo>,
    },

    /// A producer reported changed scope priorities
    ScopesUpdated {
        instance_id: InstanceId,
        scopes: Vec<ScopeInfo>,
    },
}

//! Immutable stats configuration

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::ops::{BitAnd, BitOr};

use crate::router::{CidrV4, CidrV6};

/// Path intercepted when the config file sets none
pub const DEFAULT_PATH: &str = "_astats";

/// Bitmask selecting which record categories to dump
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordTypeMask(u32);

impl RecordTypeMask {
    pub const NONE: Self = Self(0x00);
    pub const CONFIG: Self = Self(0x01);
    pub const PROCESS: Self = Self(0x02);
    pub const NODE: Self = Self(0x04);
    pub const CLUSTER: Self = Self(0x08);
    pub const LOCAL: Self = Self(0x10);
    pub const PLUGIN: Self = Self(0x20);
    /// Every registry record type
    pub const ALL_RECORDS: Self = Self(0x3f);
    /// Synthetic load average, interface and reload stats
    pub const SYSTEM: Self = Self(0x100);
    /// Every bit this server understands
    pub const KNOWN: Self = Self(0x13f);
    pub const DEFAULT: Self = Self(0x100 | 0x02 | 0x20);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True if every bit of `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any bit of `other` is set
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn includes_system(self) -> bool {
        self.contains(Self::SYSTEM)
    }
}

impl Default for RecordTypeMask {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl BitOr for RecordTypeMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for RecordTypeMask {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for RecordTypeMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// A fully built stats configuration
///
/// Never mutated once published; readers share it through
/// [`ConfigStore`](super::ConfigStore).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSnapshot {
    stats_path: String,
    record_types: RecordTypeMask,
    allow_v4: Vec<CidrV4>,
    allow_v6: Vec<CidrV6>,
}

impl ConfigSnapshot {
    /// Build a snapshot, substituting loopback for an empty allow-list
    /// and the default path for an empty one.
    pub fn new(
        stats_path: impl Into<String>,
        record_types: RecordTypeMask,
        allow_v4: Vec<CidrV4>,
        allow_v6: Vec<CidrV6>,
    ) -> Self {
        let mut stats_path = stats_path.into();
        if stats_path.is_empty() {
            stats_path = DEFAULT_PATH.to_string();
        }
        let allow_v4 = if allow_v4.is_empty() {
            vec![default_v4()]
        } else {
            allow_v4
        };
        let allow_v6 = if allow_v6.is_empty() {
            vec![default_v6()]
        } else {
            allow_v6
        };

        Self {
            stats_path,
            record_types,
            allow_v4,
            allow_v6,
        }
    }

    /// Build a snapshot with allow-lists taken verbatim, empty included
    ///
    /// An empty list opens that address family to everyone.
    pub fn with_raw_allow_lists(
        stats_path: impl Into<String>,
        record_types: RecordTypeMask,
        allow_v4: Vec<CidrV4>,
        allow_v6: Vec<CidrV6>,
    ) -> Self {
        Self {
            stats_path: stats_path.into(),
            record_types,
            allow_v4,
            allow_v6,
        }
    }

    pub fn stats_path(&self) -> &str {
        &self.stats_path
    }

    pub fn record_types(&self) -> RecordTypeMask {
        self.record_types
    }

    pub fn allow_v4(&self) -> &[CidrV4] {
        &self.allow_v4
    }

    pub fn allow_v6(&self) -> &[CidrV6] {
        &self.allow_v6
    }
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self::new(DEFAULT_PATH, RecordTypeMask::DEFAULT, Vec::new(), Vec::new())
    }
}

fn default_v4() -> CidrV4 {
    CidrV4::host(Ipv4Addr::LOCALHOST)
}

fn default_v6() -> CidrV6 {
    CidrV6::host(Ipv6Addr::LOCALHOST)
}

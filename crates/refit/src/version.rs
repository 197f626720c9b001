//! Interpreter version arithmetic and the transform gate.
//!
//! Versions travel as a single integer id (major * 10000 + minor * 100 +
//! patch, e.g. `80208` for 8.2.8). Everything else is derived from it.

use std::cmp::Ordering;
use std::fmt;

/// An interpreter version, decoded from its integer id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    id: u32,
}

impl Version {
    /// Create a version from its integer id.
    pub const fn from_id(id: u32) -> Self {
        Self { id }
    }

    /// Create a version from major, minor and patch components.
    pub const fn from_parts(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            id: major * 10_000 + minor * 100 + patch,
        }
    }

    /// The raw integer id.
    pub const fn id(self) -> u32 {
        self.id
    }

    /// Major component (`8` for 80208).
    pub const fn major(self) -> u32 {
        self.id / 10_000
    }

    /// Minor component (`2` for 80208).
    pub const fn minor(self) -> u32 {
        (self.id % 10_000) / 100
    }

    /// Patch component (`8` for 80208).
    pub const fn patch(self) -> u32 {
        self.id % 100
    }

    /// Patch-insensitive major.minor fingerprint (`80200` for 80208).
    ///
    /// Two versions with equal feature levels accept the same language
    /// syntax; only their patch levels differ.
    pub const fn feature_level(self) -> u32 {
        (self.id % 100_000) / 100 * 100
    }

    /// Compact major.minor string (`"82"` for 80208), used to name the
    /// downgrade rule-set for a target version.
    pub fn major_minor(self) -> String {
        format!("{}{}", self.major(), self.minor())
    }

    /// Order by major component only.
    pub fn compare_major(self, other: Version) -> Ordering {
        self.major().cmp(&other.major())
    }

    /// Order by major, then minor component.
    pub fn compare_major_minor(self, other: Version) -> Ordering {
        self.compare_major(other)
            .then(self.minor().cmp(&other.minor()))
    }

    /// True when both versions sit on the same feature level, so source
    /// written for either runs unmodified on the other.
    pub const fn is_bidirectionally_compatible_with(self, other: Version) -> bool {
        self.feature_level() == other.feature_level()
    }

    /// True when this version can run source written for `other`: same
    /// feature level, at least the same patch.
    pub const fn is_backwards_compatible_with(self, other: Version) -> bool {
        self.is_bidirectionally_compatible_with(other) && self.patch() >= other.patch()
    }

    /// True when source written for this version runs on `other`: same
    /// feature level, at most the same patch.
    pub const fn is_forward_compatible_with(self, other: Version) -> bool {
        self.is_bidirectionally_compatible_with(other) && self.patch() <= other.patch()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major(), self.minor(), self.patch())
    }
}

/// Whether source written for `source` needs rewriting to run on `target`.
///
/// This is the gate in front of the whole pipeline: when the answer is
/// false the host skips interception entirely.
pub const fn is_transform_needed(source: Version, target: Version) -> bool {
    !source.is_bidirectionally_compatible_with(target)
}

//! Address types for the workspace model.
//!
//! `Addr` is the only way components refer to session entities: views,
//! the console and the debug adapter hold addresses and look entities up
//! on demand, never references into session-owned structures.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A virtual address inside the loaded binary.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Addr(pub u64);

impl Addr {
    /// Offset this address by `delta` bytes, saturating at the top of
    /// the address space.
    pub fn offset(self, delta: u64) -> Addr {
        Addr(self.0.saturating_add(delta))
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u64> for Addr {
    fn from(value: u64) -> Self {
        Addr(value)
    }
}

/// A half-open address range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddrRange {
    pub start: Addr,
    pub end: Addr,
}

impl AddrRange {
    /// Create a new range. `end` must not be below `start`; an empty
    /// range (`start == end`) is allowed.
    pub fn new(start: Addr, end: Addr) -> Self {
        debug_assert!(start <= end, "range end below start");
        AddrRange { start, end }
    }

    /// The one-byte range covering a single address.
    pub fn point(addr: Addr) -> Self {
        AddrRange {
            start: addr,
            end: addr.offset(1),
        }
    }

    /// Size of the range in bytes.
    pub fn size(&self) -> u64 {
        self.end.0 - self.start.0
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether `addr` falls inside the half-open range.
    pub fn contains(&self, addr: Addr) -> bool {
        addr >= self.start && addr < self.end
    }

    /// Whether this range and `other` share at least one address. An
    /// empty range shares no address with anything.
    pub fn intersects(&self, other: &AddrRange) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.start < other.end
            && other.start < self.end
    }
}

impl fmt::Display for AddrRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

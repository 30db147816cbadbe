//! Byte patches applied over the loaded image.
//!
//! Patches are additive overlays: the session records them and marks any
//! containing function stale, but never rewrites the binary on disk.

use crate::core::addr::{Addr, AddrRange};
use serde::{Deserialize, Serialize};

/// A run of replacement bytes starting at `addr`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    pub addr: Addr,
    pub bytes: Vec<u8>,
    pub comment: Option<String>,
}

impl Patch {
    pub fn new(addr: Addr, bytes: Vec<u8>, comment: Option<String>) -> Self {
        Patch {
            addr,
            bytes,
            comment,
        }
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Address range `[addr, addr + len)` covered by the patch.
    pub fn range(&self) -> AddrRange {
        AddrRange::new(self.addr, self.addr.offset(self.len()))
    }

    /// Whether `other` starts exactly where this patch ends. Only
    /// directly adjacent patches are merge candidates.
    pub fn can_merge(&self, other: &Patch) -> bool {
        other.addr == self.addr.offset(self.len())
    }

    /// Append an adjacent patch's bytes onto this one. Returns false and
    /// leaves both untouched when the patches are not adjacent. The
    /// merged patch keeps this patch's comment.
    pub fn merge(&mut self, other: &Patch) -> bool {
        if !self.can_merge(other) {
            return false;
        }
        self.bytes.extend_from_slice(&other.bytes);
        true
    }

    /// Split at an interior address, returning the tail patch. `at` must
    /// be strictly inside the range; the tail inherits the comment.
    pub fn split_at(&mut self, at: Addr) -> Option<Patch> {
        if at <= self.addr || at >= self.addr.offset(self.len()) {
            return None;
        }
        let offset = (at.0 - self.addr.0) as usize;
        let tail = self.bytes.split_off(offset);
        Some(Patch::new(at, tail, self.comment.clone()))
    }
}

//! Functions: address-keyed block graphs with cached decompilation.

use crate::core::addr::{Addr, AddrRange};
use crate::core::basic_block::BasicBlock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// How far analysis has progressed for one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnalysisStatus {
    /// Known entry point, no blocks recovered yet.
    Unanalyzed,
    /// An analysis job is in flight.
    Analyzing,
    /// Block graph reflects the latest analysis run.
    Complete,
    /// Structure was edited or invalidated since the last run.
    Stale,
}

impl AnalysisStatus {
    pub fn value(&self) -> &str {
        match self {
            AnalysisStatus::Unanalyzed => "unanalyzed",
            AnalysisStatus::Analyzing => "analyzing",
            AnalysisStatus::Complete => "complete",
            AnalysisStatus::Stale => "stale",
        }
    }
}

/// Cached decompiled text for a function.
///
/// `generation` records the structural generation the text was computed
/// against; the session flips `stale` inside the mutation gate before any
/// reader can observe a post-edit snapshot, so a non-stale artifact is
/// always consistent with the current block set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decompilation {
    pub text: String,
    pub generation: u64,
    pub stale: bool,
}

/// One function in the session model.
///
/// Blocks are keyed by start address; edges are address pairs. Consumers
/// traverse the graph with a visited set because loops are expected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    /// Entry point address; also the function's identity in the session.
    pub entry: Addr,
    pub name: String,
    /// Basic blocks keyed by start address.
    pub blocks: BTreeMap<Addr, BasicBlock>,
    /// Control-flow edges as (from block start, to block start).
    pub edges: Vec<(Addr, Addr)>,
    pub status: AnalysisStatus,
    /// Bumped on every structural change (new blocks, patched bytes,
    /// invalidation). Job results carry the generation they were computed
    /// against and are rejected at the gate when it no longer matches.
    pub generation: u64,
    pub decompilation: Option<Decompilation>,
    /// Error annotation from the most recent failed job, if any.
    pub last_error: Option<String>,
}

impl Function {
    pub fn new(entry: Addr, name: impl Into<String>) -> Self {
        Function {
            entry,
            name: name.into(),
            blocks: BTreeMap::new(),
            edges: Vec::new(),
            status: AnalysisStatus::Unanalyzed,
            generation: 0,
            decompilation: None,
            last_error: None,
        }
    }

    /// Extent of the function: from the lowest block start to the highest
    /// block end. Falls back to a one-byte range at the entry while no
    /// blocks have been recovered.
    pub fn range(&self) -> AddrRange {
        let mut start = self.entry;
        let mut end = self.entry.offset(1);
        for block in self.blocks.values() {
            if block.range.start < start {
                start = block.range.start;
            }
            if block.range.end > end {
                end = block.range.end;
            }
        }
        AddrRange::new(start, end)
    }

    /// Whether `addr` falls inside any block (or equals the entry).
    pub fn contains(&self, addr: Addr) -> bool {
        addr == self.entry || self.blocks.values().any(|b| b.contains(addr))
    }

    /// The block containing `addr`, if any.
    pub fn block_at(&self, addr: Addr) -> Option<&BasicBlock> {
        self.blocks.values().find(|b| b.contains(addr))
    }

    /// Blocks reachable from the entry, in discovery order. Uses a
    /// visited set so cyclic graphs terminate.
    pub fn reachable_blocks(&self) -> Vec<Addr> {
        let mut visited: HashSet<Addr> = HashSet::new();
        let mut order = Vec::new();
        let mut stack = vec![self.entry];
        while let Some(addr) = stack.pop() {
            if !visited.insert(addr) {
                continue;
            }
            let Some(block) = self.blocks.get(&addr) else {
                continue;
            };
            order.push(addr);
            // Reverse so the lowest successor is visited first.
            for succ in block.successors.iter().rev() {
                if !visited.contains(succ) {
                    stack.push(*succ);
                }
            }
        }
        order
    }

    /// Decompiled text, only when present and consistent with the current
    /// block set.
    pub fn fresh_decompilation(&self) -> Option<&Decompilation> {
        self.decompilation
            .as_ref()
            .filter(|d| !d.stale && d.generation == self.generation)
    }

    /// Mark the cached decompilation stale. Called from the mutation gate
    /// on every structural edit, before the edit becomes observable.
    pub fn mark_decompilation_stale(&mut self) {
        if let Some(d) = self.decompilation.as_mut() {
            d.stale = true;
        }
    }
}

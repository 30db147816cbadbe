//! Basic blocks and instructions.

use crate::core::addr::{Addr, AddrRange};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A single decoded instruction, as reported by the analysis engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub addr: Addr,
    /// Encoded length in bytes.
    pub len: u8,
    pub mnemonic: String,
    pub operands: String,
}

impl Instruction {
    pub fn new(
        addr: Addr,
        len: u8,
        mnemonic: impl Into<String>,
        operands: impl Into<String>,
    ) -> Self {
        Instruction {
            addr,
            len,
            mnemonic: mnemonic.into(),
            operands: operands.into(),
        }
    }
}

/// A straight-line run of instructions with its graph edges.
///
/// Successor/predecessor sets hold plain addresses; the containing
/// function owns the blocks, so a cyclic control-flow graph never turns
/// into cyclic ownership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicBlock {
    /// Address range `[start, end)` covered by the block.
    pub range: AddrRange,
    /// Instructions in address order.
    pub instructions: Vec<Instruction>,
    /// Start addresses of successor blocks.
    pub successors: BTreeSet<Addr>,
    /// Start addresses of predecessor blocks.
    pub predecessors: BTreeSet<Addr>,
}

impl BasicBlock {
    pub fn new(range: AddrRange) -> Self {
        BasicBlock {
            range,
            instructions: Vec::new(),
            successors: BTreeSet::new(),
            predecessors: BTreeSet::new(),
        }
    }

    pub fn start(&self) -> Addr {
        self.range.start
    }

    pub fn contains(&self, addr: Addr) -> bool {
        self.range.contains(addr)
    }

    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }
}

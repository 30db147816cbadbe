//! Core data model: addresses, blocks, functions, symbols and patches.
//!
//! These are plain value types. All ownership and mutation rules live in
//! the session; everything here is clonable snapshot material.

pub mod addr;
pub mod basic_block;
pub mod function;
pub mod patch;
pub mod symbol;

pub use addr::{Addr, AddrRange};
pub use basic_block::{BasicBlock, Instruction};
pub use function::{AnalysisStatus, Decompilation, Function};
pub use patch::Patch;
pub use symbol::{Symbol, SymbolKind};

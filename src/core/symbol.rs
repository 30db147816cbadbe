//! Symbols: named addresses in the session model.

use crate::core::addr::Addr;
use serde::{Deserialize, Serialize};

/// What a symbol names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    Function,
    Label,
    Data,
}

impl SymbolKind {
    pub fn value(&self) -> &str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Label => "label",
            SymbolKind::Data => "data",
        }
    }
}

/// A named address. The session keeps the name <-> address mapping
/// bijective: one name per address, one address per name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub addr: Addr,
    pub kind: SymbolKind,
}

impl Symbol {
    pub fn new(name: impl Into<String>, addr: Addr, kind: SymbolKind) -> Self {
        Symbol {
            name: name.into(),
            addr,
            kind,
        }
    }
}

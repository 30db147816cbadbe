//! Debug/trace adapter.
//!
//! One-directional: external debugger or trace-replay records flow in,
//! get mapped onto session addresses, and leave as `Debug`-kind events
//! on the bus. Debug activity is purely additive annotation; this module
//! never touches the session's analysis-mutating path, so breakpoints
//! and trace stops can never invalidate function data.

use crate::core::addr::Addr;
use crate::events::{Event, EventPublisher};
use crate::session::Session;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// What kind of stop or change a trace record reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceKind {
    BreakpointHit,
    Step,
    RegisterChange,
}

/// One record from the debugger/trace backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub addr: Addr,
    pub kind: TraceKind,
    /// Register snapshot at the stop, when the backend provides one.
    pub registers: Option<BTreeMap<String, u64>>,
}

impl TraceRecord {
    pub fn new(addr: Addr, kind: TraceKind) -> Self {
        TraceRecord {
            addr,
            kind,
            registers: None,
        }
    }

    pub fn with_registers(mut self, registers: BTreeMap<String, u64>) -> Self {
        self.registers = Some(registers);
        self
    }
}

/// Debug-kind event published on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DebugEvent {
    BreakpointAdded {
        addr: Addr,
    },
    BreakpointRemoved {
        addr: Addr,
    },
    /// A trace record, mapped to the containing function when the
    /// address is known to the session.
    Stop {
        record: TraceRecord,
        function: Option<Addr>,
    },
}

impl DebugEvent {
    pub fn addr(&self) -> Option<Addr> {
        match self {
            DebugEvent::BreakpointAdded { addr } | DebugEvent::BreakpointRemoved { addr } => {
                Some(*addr)
            }
            DebugEvent::Stop { record, .. } => Some(record.addr),
        }
    }
}

/// Maps external debugger/trace events onto the session and republishes
/// them on the bus.
pub struct DebugAdapter {
    session: Arc<Session>,
    publisher: EventPublisher,
    breakpoints: Mutex<BTreeSet<Addr>>,
    unmapped: AtomicU64,
}

impl DebugAdapter {
    pub fn new(session: Arc<Session>, publisher: EventPublisher) -> DebugAdapter {
        DebugAdapter {
            session,
            publisher,
            breakpoints: Mutex::new(BTreeSet::new()),
            unmapped: AtomicU64::new(0),
        }
    }

    /// Set a breakpoint. Returns false when one already exists there.
    pub fn add_breakpoint(&self, addr: Addr) -> bool {
        let inserted = self.lock().insert(addr);
        if inserted {
            info!(%addr, "breakpoint added");
            self.publisher
                .publish(Event::Debug(DebugEvent::BreakpointAdded { addr }));
        }
        inserted
    }

    /// Clear a breakpoint. Returns false when none exists there.
    pub fn remove_breakpoint(&self, addr: Addr) -> bool {
        let removed = self.lock().remove(&addr);
        if removed {
            info!(%addr, "breakpoint removed");
            self.publisher
                .publish(Event::Debug(DebugEvent::BreakpointRemoved { addr }));
        }
        removed
    }

    pub fn breakpoints(&self) -> Vec<Addr> {
        self.lock().iter().copied().collect()
    }

    /// Ingest one trace record. Records at addresses outside any known
    /// function are counted and logged, never fatal.
    pub fn ingest(&self, record: TraceRecord) {
        let function = self.session.function_at(record.addr).map(|f| f.entry);
        if function.is_none() {
            self.unmapped.fetch_add(1, Ordering::Relaxed);
            debug!(addr = %record.addr, kind = ?record.kind, "trace record at unmapped address");
        }
        self.publisher
            .publish(Event::Debug(DebugEvent::Stop { record, function }));
    }

    /// How many ingested records fell outside every known function.
    pub fn unmapped_count(&self) -> u64 {
        self.unmapped.load(Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeSet<Addr>> {
        self.breakpoints.lock().expect("breakpoint lock poisoned")
    }
}

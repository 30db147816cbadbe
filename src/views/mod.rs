//! View registry: open views, scope filtering and UI-loop dispatch.
//!
//! The registry owns a single bus subscription. The UI loop drains it
//! with [`ViewRegistry::pump_pending`] or [`ViewRegistry::pump_one`];
//! for each event the registry intersects the affected addresses with
//! every open view's scope and notifies only intersecting views, which
//! then refresh their local projection from a session snapshot. Views
//! never hold references into session state.

use crate::core::addr::{Addr, AddrRange};
use crate::error::{Result, SessionError};
use crate::events::{Event, EventBus, EventFilter, Subscription};
use crate::session::Session;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

/// The closed set of view kinds the workbench renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViewKind {
    Graph,
    Listing,
    Decompilation,
    Hex,
    Console,
    Debugger,
}

impl ViewKind {
    pub fn value(&self) -> &str {
        match self {
            ViewKind::Graph => "graph",
            ViewKind::Listing => "listing",
            ViewKind::Decompilation => "decompilation",
            ViewKind::Hex => "hex",
            ViewKind::Console => "console",
            ViewKind::Debugger => "debugger",
        }
    }

    /// Which event kinds a view of this kind subscribes to by default.
    /// Debugger views see debug churn; the console also watches jobs;
    /// everything else only cares about committed session changes.
    pub fn default_filter(&self) -> EventFilter {
        match self {
            ViewKind::Debugger => EventFilter::DEBUG | EventFilter::SESSION,
            ViewKind::Console => EventFilter::SESSION | EventFilter::JOB,
            _ => EventFilter::SESSION,
        }
    }
}

/// What part of the session a view is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewScope {
    /// One function, identified by entry address.
    Function(Addr),
    /// A fixed address range.
    Range(AddrRange),
    /// Everything; used by console and debugger views.
    Global,
}

/// Presentation state a view keeps across re-renders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Presentation {
    pub cursor: Option<Addr>,
    pub selection: Option<AddrRange>,
    pub scroll: u64,
    /// Collapsed block starts in a graph view.
    pub collapsed: BTreeSet<Addr>,
}

/// Kind-specific projection of the bound scope, rebuilt from a session
/// snapshot whenever an intersecting event arrives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    Graph { blocks: usize, edges: usize },
    Listing { instructions: usize },
    Decompilation { text: Option<String> },
    Hex { patches: usize },
    Console { updates: u64 },
    Debugger { stops: u64, last_stop: Option<Addr> },
}

/// Per-view render bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderState {
    /// Commit sequence of the last session event this view observed.
    pub last_seq: Option<u64>,
    /// Total events delivered to this view.
    pub events_seen: u64,
    pub needs_redraw: bool,
    pub projection: Projection,
}

/// Handle for one open view.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ViewId(pub Uuid);

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Clonable snapshot of one view's full state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewSnapshot {
    pub kind: ViewKind,
    pub scope: ViewScope,
    pub filter: EventFilter,
    pub presentation: Presentation,
    pub render: RenderState,
}

struct ViewState {
    snapshot: ViewSnapshot,
}

/// Tracks open views and routes events to the ones whose scope they
/// touch.
pub struct ViewRegistry {
    session: Arc<Session>,
    views: Mutex<BTreeMap<ViewId, ViewState>>,
    subscription: tokio::sync::Mutex<Subscription>,
}

impl ViewRegistry {
    pub fn new(session: Arc<Session>, bus: &EventBus) -> ViewRegistry {
        ViewRegistry {
            session,
            views: Mutex::new(BTreeMap::new()),
            subscription: tokio::sync::Mutex::new(bus.subscribe(EventFilter::ALL)),
        }
    }

    /// Open a view with its kind's default event filter.
    pub fn open(&self, kind: ViewKind, scope: ViewScope) -> ViewId {
        self.open_with_filter(kind, scope, kind.default_filter())
    }

    pub fn open_with_filter(
        &self,
        kind: ViewKind,
        scope: ViewScope,
        filter: EventFilter,
    ) -> ViewId {
        let id = ViewId(Uuid::new_v4());
        let projection = self.project(kind, &scope);
        let snapshot = ViewSnapshot {
            kind,
            scope,
            filter,
            presentation: Presentation::default(),
            render: RenderState {
                last_seq: None,
                events_seen: 0,
                needs_redraw: true,
                projection,
            },
        };
        self.lock().insert(id, ViewState { snapshot });
        debug!(view = %id, kind = kind.value(), "view opened");
        id
    }

    /// Close a view. Its registration is gone before this returns, so it
    /// receives zero further notifications.
    pub fn close(&self, id: ViewId) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            debug!(view = %id, "view closed");
        }
        removed
    }

    /// Atomically bind a view to a new scope: under the registry lock
    /// the view is always bound to exactly one scope, so no event can
    /// slip through unscoped or get double-delivered.
    pub fn rebind(&self, id: ViewId, scope: ViewScope) -> Result<()> {
        let projection = {
            // Project outside the views lock only if scope resolution
            // needed the session; cheap enough to do up front.
            let kind = self
                .view(id)
                .ok_or(SessionError::ViewNotFound(id.0))?
                .kind;
            self.project(kind, &scope)
        };
        let mut views = self.lock();
        let state = views
            .get_mut(&id)
            .ok_or(SessionError::ViewNotFound(id.0))?;
        state.snapshot.scope = scope;
        state.snapshot.render.projection = projection;
        state.snapshot.render.needs_redraw = true;
        Ok(())
    }

    pub fn view(&self, id: ViewId) -> Option<ViewSnapshot> {
        self.lock().get(&id).map(|v| v.snapshot.clone())
    }

    pub fn views(&self) -> Vec<(ViewId, ViewSnapshot)> {
        self.lock()
            .iter()
            .map(|(id, v)| (*id, v.snapshot.clone()))
            .collect()
    }

    /// Mutate a view's presentation state (cursor moves, selection,
    /// scrolling, collapsing blocks).
    pub fn update_presentation(
        &self,
        id: ViewId,
        update: impl FnOnce(&mut Presentation),
    ) -> Result<()> {
        let mut views = self.lock();
        let state = views
            .get_mut(&id)
            .ok_or(SessionError::ViewNotFound(id.0))?;
        update(&mut state.snapshot.presentation);
        Ok(())
    }

    /// Drain all already-delivered events without waiting. Returns how
    /// many events were dispatched. Call from the UI loop.
    pub async fn pump_pending(&self) -> usize {
        let mut subscription = self.subscription.lock().await;
        let mut dispatched = 0;
        while let Some(event) = subscription.try_recv() {
            self.dispatch(&event);
            dispatched += 1;
        }
        dispatched
    }

    /// Wait for the next event and dispatch it. Returns false when the
    /// bus has shut down.
    pub async fn pump_one(&self) -> bool {
        let event = {
            let mut subscription = self.subscription.lock().await;
            subscription.recv().await
        };
        match event {
            Some(event) => {
                self.dispatch(&event);
                true
            }
            None => false,
        }
    }

    fn dispatch(&self, event: &Event) {
        let kind = event.kind();
        // Resolve scope ranges against the session before taking the
        // views lock.
        let affected = affected_ranges(event);
        let mut views = self.lock();
        for (id, state) in views.iter_mut() {
            let snapshot = &mut state.snapshot;
            if !snapshot.filter.accepts(kind) {
                continue;
            }
            let scope_range = self.scope_range(&snapshot.scope);
            if !affected.iter().any(|range| range.intersects(&scope_range)) {
                continue;
            }
            snapshot.render.events_seen += 1;
            snapshot.render.needs_redraw = true;
            if let Event::Session(cs) = event {
                snapshot.render.last_seq = Some(cs.seq);
            }
            let view_kind = snapshot.kind;
            let next = match (view_kind, event) {
                (ViewKind::Debugger, Event::Debug(debug_event)) => {
                    let (stops, last) = match &snapshot.render.projection {
                        Projection::Debugger { stops, last_stop } => (*stops, *last_stop),
                        _ => (0, None),
                    };
                    Projection::Debugger {
                        stops: stops + 1,
                        last_stop: debug_event.addr().or(last),
                    }
                }
                _ => project_with_session(
                    &self.session,
                    view_kind,
                    &snapshot.scope,
                    &snapshot.render.projection,
                ),
            };
            snapshot.render.projection = next;
            debug!(view = %id, ?kind, "view notified");
        }
    }

    fn project(&self, kind: ViewKind, scope: &ViewScope) -> Projection {
        fresh_projection(&self.session, kind, scope)
    }

    fn scope_range(&self, scope: &ViewScope) -> AddrRange {
        match scope {
            ViewScope::Function(entry) => self
                .session
                .function(*entry)
                .map(|f| f.range())
                .unwrap_or_else(|| AddrRange::point(*entry)),
            ViewScope::Range(range) => *range,
            ViewScope::Global => AddrRange::new(Addr(0), Addr(u64::MAX)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<ViewId, ViewState>> {
        self.views.lock().expect("view registry lock poisoned")
    }
}

fn affected_ranges(event: &Event) -> Vec<AddrRange> {
    match event {
        Event::Session(cs) => cs.changes.iter().map(|c| c.affected()).collect(),
        Event::Job(job) => vec![AddrRange::point(job.target)],
        Event::Debug(debug_event) => vec![debug_event
            .addr()
            .map(AddrRange::point)
            .unwrap_or_else(|| AddrRange::new(Addr(0), Addr(u64::MAX)))],
    }
}

fn fresh_projection(session: &Session, kind: ViewKind, scope: &ViewScope) -> Projection {
    let function = match scope {
        ViewScope::Function(entry) => session.function(*entry),
        ViewScope::Range(range) => session.function_at(range.start),
        ViewScope::Global => None,
    };
    match kind {
        ViewKind::Graph => {
            let (blocks, edges) = function
                .as_ref()
                .map(|f| (f.blocks.len(), f.edges.len()))
                .unwrap_or((0, 0));
            Projection::Graph { blocks, edges }
        }
        ViewKind::Listing => {
            let instructions = function
                .as_ref()
                .map(|f| f.blocks.values().map(|b| b.instruction_count()).sum())
                .unwrap_or(0);
            Projection::Listing { instructions }
        }
        ViewKind::Decompilation => {
            let text = function
                .as_ref()
                .and_then(|f| f.fresh_decompilation())
                .map(|d| d.text.clone());
            Projection::Decompilation { text }
        }
        ViewKind::Hex => Projection::Hex {
            patches: session.patches().len(),
        },
        ViewKind::Console => Projection::Console { updates: 0 },
        ViewKind::Debugger => Projection::Debugger {
            stops: 0,
            last_stop: None,
        },
    }
}

fn project_with_session(
    session: &Session,
    kind: ViewKind,
    scope: &ViewScope,
    previous: &Projection,
) -> Projection {
    match (kind, previous) {
        // Counters survive re-projection.
        (ViewKind::Console, Projection::Console { updates }) => Projection::Console {
            updates: updates + 1,
        },
        (ViewKind::Debugger, Projection::Debugger { stops, last_stop }) => Projection::Debugger {
            stops: *stops,
            last_stop: *last_stop,
        },
        _ => fresh_projection(session, kind, scope),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[test]
    fn test_kind_default_filters() {
        assert!(ViewKind::Graph.default_filter().accepts(EventKind::Session));
        assert!(!ViewKind::Graph.default_filter().accepts(EventKind::Debug));
        assert!(ViewKind::Debugger.default_filter().accepts(EventKind::Debug));
        assert!(ViewKind::Console.default_filter().accepts(EventKind::Job));
    }

    #[test]
    fn test_presentation_serde_round_trip() {
        let mut p = Presentation::default();
        p.cursor = Some(Addr(0x1004));
        p.selection = Some(AddrRange::new(Addr(0x1000), Addr(0x1010)));
        p.scroll = 12;
        p.collapsed.insert(Addr(0x1020));
        let json = serde_json::to_string(&p).unwrap();
        let back: Presentation = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }
}

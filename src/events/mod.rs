//! Event bus: commit-ordered fan-out from the session to subscribers.
//!
//! Publication is non-blocking (the mutation gate publishes while the
//! session lock is held, so it must never wait). A single dispatch task
//! drains the publication queue in order and copies each event into every
//! subscriber's bounded mailbox, which gives all subscribers the same
//! relative order. Subscribers drain their mailbox on whatever thread or
//! loop they own; nothing is ever delivered directly from a worker
//! thread.
//!
//! Delivery enforcement: a subscriber that does not accept an event
//! within the configured budget has that one event dropped and logged.
//! Other subscribers are unaffected.

use crate::config::WorkspaceConfig;
use crate::debug::DebugEvent;
use crate::jobs::JobEvent;
use crate::session::ChangeSet;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TryRecvError};
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Coarse event category, used by subscriber filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A mutation committed to the session. Always corresponds to state
    /// that is already applied.
    Session,
    /// Job lifecycle: started, progress, finished. Informational.
    Job,
    /// Debugger/trace churn. Informational, additive only.
    Debug,
}

/// Subscriber interest mask over [`EventKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventFilter(u8);

impl EventFilter {
    pub const NONE: EventFilter = EventFilter(0);
    pub const SESSION: EventFilter = EventFilter(1);
    pub const JOB: EventFilter = EventFilter(2);
    pub const DEBUG: EventFilter = EventFilter(4);
    pub const ALL: EventFilter = EventFilter(7);

    pub fn accepts(&self, kind: EventKind) -> bool {
        let bit = match kind {
            EventKind::Session => 1,
            EventKind::Job => 2,
            EventKind::Debug => 4,
        };
        (self.0 & bit) != 0
    }
}

impl std::ops::BitOr for EventFilter {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        EventFilter(self.0 | rhs.0)
    }
}

/// One notification as seen by subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    Session(ChangeSet),
    Job(JobEvent),
    Debug(DebugEvent),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Session(_) => EventKind::Session,
            Event::Job(_) => EventKind::Job,
            Event::Debug(_) => EventKind::Debug,
        }
    }
}

/// Write end of the bus. Cloned into the mutation gate, the job queue and
/// the debug adapter.
#[derive(Clone)]
pub struct EventPublisher {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventPublisher {
    /// Enqueue an event for dispatch. Never blocks; events published
    /// after the bus shuts down are silently discarded.
    pub fn publish(&self, event: Event) {
        if self.tx.send(event).is_err() {
            trace!("event published after bus shutdown, discarded");
        }
    }

    /// A publisher wired to nothing. For constructing a session in unit
    /// tests without a running bus.
    pub fn detached() -> EventPublisher {
        let (tx, _rx) = mpsc::unbounded_channel();
        EventPublisher { tx }
    }

    /// Wrap an existing channel, so tests can observe raw publications.
    #[cfg(test)]
    pub(crate) fn from_raw(tx: mpsc::UnboundedSender<Event>) -> EventPublisher {
        EventPublisher { tx }
    }
}

/// Read end handed to one subscriber.
pub struct Subscription {
    pub id: Uuid,
    rx: mpsc::Receiver<Event>,
}

impl Subscription {
    /// Wait for the next event. Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Take an already-delivered event without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        match self.rx.try_recv() {
            Ok(ev) => Some(ev),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

struct SubscriberSlot {
    id: Uuid,
    filter: EventFilter,
    tx: mpsc::Sender<Event>,
}

/// Handle for creating subscriptions. Dropping the bus (and all
/// publishers) terminates the dispatch task.
pub struct EventBus {
    control_tx: mpsc::UnboundedSender<SubscriberSlot>,
    mailbox_depth: usize,
}

impl EventBus {
    /// Start the bus and its dispatch task. Must be called from within a
    /// tokio runtime.
    pub fn start(config: &WorkspaceConfig) -> (EventBus, EventPublisher) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        tokio::spawn(dispatch(event_rx, control_rx, config.delivery_budget()));
        (
            EventBus {
                control_tx,
                mailbox_depth: config.mailbox_depth,
            },
            EventPublisher { tx: event_tx },
        )
    }

    /// Register a subscriber interested in `filter` kinds. Dropping the
    /// returned subscription unsubscribes; the dispatch task prunes the
    /// slot on the next delivery attempt.
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.mailbox_depth);
        if self.control_tx.send(SubscriberSlot { id, filter, tx }).is_err() {
            debug!(subscriber = %id, "subscribe after bus shutdown");
        }
        Subscription { id, rx }
    }
}

async fn dispatch(
    mut event_rx: mpsc::UnboundedReceiver<Event>,
    mut control_rx: mpsc::UnboundedReceiver<SubscriberSlot>,
    budget: Duration,
) {
    let mut subscribers: Vec<SubscriberSlot> = Vec::new();
    let mut control_open = true;
    loop {
        tokio::select! {
            maybe_event = event_rx.recv() => {
                let Some(event) = maybe_event else { break };
                // Pick up pending subscriptions so a subscriber that
                // registered before this publication sees it.
                while let Ok(slot) = control_rx.try_recv() {
                    subscribers.push(slot);
                }
                fan_out(&mut subscribers, event, budget).await;
            }
            maybe_slot = control_rx.recv(), if control_open => {
                match maybe_slot {
                    Some(slot) => subscribers.push(slot),
                    None => control_open = false,
                }
            }
        }
    }
    debug!("event bus dispatch task stopped");
}

async fn fan_out(subscribers: &mut Vec<SubscriberSlot>, event: Event, budget: Duration) {
    let kind = event.kind();
    let mut closed: Vec<Uuid> = Vec::new();
    for slot in subscribers.iter() {
        if !slot.filter.accepts(kind) {
            continue;
        }
        match slot.tx.send_timeout(event.clone(), budget).await {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => {
                // Slow subscriber: this event is dropped for it, everyone
                // else still gets it.
                warn!(subscriber = %slot.id, ?kind, "delivery budget exceeded, event dropped");
            }
            Err(SendTimeoutError::Closed(_)) => {
                closed.push(slot.id);
            }
        }
    }
    if !closed.is_empty() {
        subscribers.retain(|s| !closed.contains(&s.id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::addr::Addr;
    use crate::session::{Change, ChangeSet};

    fn session_event(seq: u64) -> Event {
        Event::Session(ChangeSet {
            seq,
            changes: vec![Change::CommentSet { addr: Addr(0x1000) }],
        })
    }

    #[test]
    fn test_filter_bits() {
        let f = EventFilter::SESSION | EventFilter::DEBUG;
        assert!(f.accepts(EventKind::Session));
        assert!(f.accepts(EventKind::Debug));
        assert!(!f.accepts(EventKind::Job));
        assert!(!EventFilter::NONE.accepts(EventKind::Session));
        assert!(EventFilter::ALL.accepts(EventKind::Job));
    }

    #[tokio::test]
    async fn test_fan_out_preserves_order() {
        let (bus, publisher) = EventBus::start(&WorkspaceConfig::default());
        let mut a = bus.subscribe(EventFilter::ALL);
        let mut b = bus.subscribe(EventFilter::ALL);

        for seq in 1..=5 {
            publisher.publish(session_event(seq));
        }
        for seq in 1..=5u64 {
            let Event::Session(cs) = a.recv().await.unwrap() else {
                panic!("unexpected event kind")
            };
            assert_eq!(cs.seq, seq);
            let Event::Session(cs) = b.recv().await.unwrap() else {
                panic!("unexpected event kind")
            };
            assert_eq!(cs.seq, seq);
        }
    }

    #[tokio::test]
    async fn test_filter_suppresses_kinds() {
        let (bus, publisher) = EventBus::start(&WorkspaceConfig::default());
        let mut none = bus.subscribe(EventFilter::JOB);
        let mut all = bus.subscribe(EventFilter::ALL);

        publisher.publish(session_event(1));
        assert!(all.recv().await.is_some());
        assert!(none.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_dropped_subscription_pruned() {
        let (bus, publisher) = EventBus::start(&WorkspaceConfig::default());
        let sub = bus.subscribe(EventFilter::ALL);
        let mut live = bus.subscribe(EventFilter::ALL);
        drop(sub);

        publisher.publish(session_event(1));
        publisher.publish(session_event(2));
        assert!(live.recv().await.is_some());
        assert!(live.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_slow_subscriber_does_not_stall_others() {
        let cfg = WorkspaceConfig {
            mailbox_depth: 1,
            delivery_budget_ms: 20,
            ..Default::default()
        };
        let (bus, publisher) = EventBus::start(&cfg);
        // Never drained: its one-slot mailbox fills after one event.
        let _stuck = bus.subscribe(EventFilter::ALL);
        let mut live = bus.subscribe(EventFilter::ALL);

        for seq in 1..=4 {
            publisher.publish(session_event(seq));
        }
        // The live subscriber still observes every event in order.
        for seq in 1..=4u64 {
            let Event::Session(cs) = live.recv().await.unwrap() else {
                panic!("unexpected event kind")
            };
            assert_eq!(cs.seq, seq);
        }
    }
}

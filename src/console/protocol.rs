//! Headless console protocol.
//!
//! Mirrors [`super::ConsoleBridge::evaluate`] over a request/response
//! channel and forwards bus events as push notifications, so an external
//! front-end (or a kernel-style client) can drive the session without
//! the GUI. The server task is the console's cooperative execution slot:
//! requests evaluate one at a time, and a request awaiting a job
//! suspends only this slot.

use super::{ConsoleBridge, ConsoleOutcome};
use crate::error::{Result, SessionError};
use crate::events::{EventBus, EventFilter};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

/// One evaluation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalRequest {
    pub code: String,
}

/// A bus event mirrored to protocol clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEvent {
    pub kind: String,
    pub payload: serde_json::Value,
}

struct Request {
    eval: EvalRequest,
    reply: oneshot::Sender<ConsoleOutcome>,
}

/// Client half: evaluate code and receive pushed session notifications.
pub struct ConsoleClient {
    requests: mpsc::Sender<Request>,
    pushes: mpsc::Receiver<PushEvent>,
}

impl ConsoleClient {
    /// Evaluate one line on the remote console slot.
    pub async fn evaluate(&self, code: impl Into<String>) -> Result<ConsoleOutcome> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(Request {
                eval: EvalRequest { code: code.into() },
                reply: reply_tx,
            })
            .await
            .map_err(|_| SessionError::InvalidInput("console server is gone".into()))?;
        reply_rx
            .await
            .map_err(|_| SessionError::InvalidInput("console server dropped the request".into()))
    }

    /// Next pushed notification, or `None` once the server is gone.
    pub async fn next_push(&mut self) -> Option<PushEvent> {
        self.pushes.recv().await
    }
}

/// Spawn the server task around a bridge and hand back the client half.
/// Must be called from within a tokio runtime.
pub fn serve(bridge: ConsoleBridge, bus: &EventBus, push_depth: usize) -> ConsoleClient {
    let (request_tx, mut request_rx) = mpsc::channel::<Request>(16);
    let (push_tx, push_rx) = mpsc::channel::<PushEvent>(push_depth.max(1));
    let mut subscription = bus.subscribe(EventFilter::ALL);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                maybe_request = request_rx.recv() => {
                    let Some(request) = maybe_request else { break };
                    let outcome = bridge.evaluate(&request.eval.code).await;
                    if request.reply.send(outcome).is_err() {
                        debug!("console client went away before its reply");
                    }
                }
                maybe_event = subscription.recv() => {
                    let Some(event) = maybe_event else { break };
                    let push = PushEvent {
                        kind: format!("{:?}", event.kind()).to_lowercase(),
                        payload: serde_json::to_value(&event).unwrap_or_default(),
                    };
                    // A slow client loses pushes, never stalls the slot.
                    if push_tx.try_send(push).is_err() {
                        trace!("push mailbox full, notification dropped");
                    }
                }
            }
        }
        debug!("console protocol server stopped");
    });

    ConsoleClient {
        requests: request_tx,
        pushes: push_rx,
    }
}

//! Workspace facade: one session plus everything synchronized around it.
//!
//! Construction wires the bus, job queue, view registry, console bridge
//! and debug adapter around a single explicitly-passed session handle.
//! There is no process-wide singleton; two workspaces in one process
//! stay fully independent.

pub mod persist;

use crate::config::WorkspaceConfig;
use crate::console::{protocol, ConsoleBridge};
use crate::debug::DebugAdapter;
use crate::engine::AnalysisEngine;
use crate::error::Result;
use crate::events::{EventBus, EventFilter, Subscription};
use crate::session::Session;
use crate::views::ViewRegistry;
use crate::jobs::JobQueue;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub use persist::WorkspaceLayout;

/// An open workbench: session, bus, jobs, views, console and debugger.
pub struct Workspace {
    config: WorkspaceConfig,
    session: Arc<Session>,
    bus: EventBus,
    jobs: Arc<JobQueue>,
    views: ViewRegistry,
    debug: Arc<DebugAdapter>,
    console: ConsoleBridge,
}

impl Workspace {
    /// Load `path` through `engine` and assemble the workspace. Must be
    /// called from within a tokio runtime; workers and the bus dispatch
    /// task are spawned here.
    pub fn open(
        engine: Arc<dyn AnalysisEngine>,
        path: &Path,
        config: WorkspaceConfig,
    ) -> Result<Workspace> {
        let config = config.normalized();
        let (bus, publisher) = EventBus::start(&config);
        let session = Arc::new(Session::load(engine, path, publisher.clone())?);
        let jobs = JobQueue::start(Arc::clone(&session), publisher.clone(), &config);
        let views = ViewRegistry::new(Arc::clone(&session), &bus);
        let debug = Arc::new(DebugAdapter::new(Arc::clone(&session), publisher));
        let console = ConsoleBridge::new(
            Arc::clone(&session),
            Arc::clone(&jobs),
            Arc::clone(&debug),
        );
        info!(session = %session.id(), "workspace open");
        Ok(Workspace {
            config,
            session,
            bus,
            jobs,
            views,
            debug,
            console,
        })
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn jobs(&self) -> &Arc<JobQueue> {
        &self.jobs
    }

    pub fn views(&self) -> &ViewRegistry {
        &self.views
    }

    pub fn debug(&self) -> &Arc<DebugAdapter> {
        &self.debug
    }

    /// The in-process console bridge.
    pub fn console(&self) -> &ConsoleBridge {
        &self.console
    }

    /// Subscribe directly to the bus, e.g. for a custom front-end.
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        self.bus.subscribe(filter)
    }

    /// Start a headless console protocol server bound to this workspace
    /// and return the client half.
    pub fn serve_console(&self) -> protocol::ConsoleClient {
        let bridge = ConsoleBridge::new(
            Arc::clone(&self.session),
            Arc::clone(&self.jobs),
            Arc::clone(&self.debug),
        );
        protocol::serve(bridge, &self.bus, self.config.mailbox_depth)
    }

    /// Wait for the job queue to drain (see [`JobQueue::join_all`]).
    pub async fn join_all_jobs(&self) {
        self.jobs.join_all(self.config.join_grace()).await;
    }
}

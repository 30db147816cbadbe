//! osanwe: workspace synchronization core for an interactive
//! binary-analysis workbench.
//!
//! One mutable [`session::Session`] per loaded binary is the single
//! source of truth; every change goes through its mutation gate and is
//! fanned out in commit order on the [`events`] bus. Long-running
//! analysis runs on the [`jobs`] queue with per-function mutual
//! exclusion, open [`views`] re-render only when an event touches their
//! scope, the [`console`] bridge exposes the same gate to an interactive
//! interpreter, and the [`debug`] adapter maps debugger/trace records
//! onto session addresses as a separate event kind.
//!
//! The analysis engine itself (disassembly, lifting, decompilation) is
//! external, behind the [`engine::AnalysisEngine`] trait.

pub mod config;
pub mod console;
pub mod core;
pub mod debug;
pub mod engine;
pub mod error;
pub mod events;
pub mod jobs;
pub mod logging;
pub mod session;
pub mod views;
pub mod workspace;

pub use crate::core::{Addr, AddrRange};
pub use config::WorkspaceConfig;
pub use error::{Result, SessionError};
pub use session::{ChangeSet, Mutation, Session};
pub use workspace::Workspace;

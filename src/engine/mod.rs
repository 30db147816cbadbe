//! Analysis engine boundary.
//!
//! The engine is an external collaborator: it produces raw control-flow
//! graphs and decompiled text, and the workspace never looks inside it.
//! Backends implement [`AnalysisEngine`]; a deterministic in-memory
//! implementation ships in [`scripted`] for tests and headless use.

pub mod scripted;

pub use scripted::ScriptedEngine;

use crate::core::addr::Addr;
use crate::core::basic_block::Instruction;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Errors raised by an engine backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineError {
    /// The image could not be loaded or parsed.
    LoadFailed(String),
    /// No code at the requested address.
    NoCodeAt(Addr),
    /// Backend-specific failure with a message.
    Backend(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::LoadFailed(msg) => write!(f, "load failed: {}", msg),
            EngineError::NoCodeAt(addr) => write!(f, "no code at {}", addr),
            EngineError::Backend(msg) => write!(f, "backend error: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// What the engine reports after loading an image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageInfo {
    pub path: PathBuf,
    /// Hex-encoded SHA-256 of the image content.
    pub sha256: String,
    /// Discovered function entry points with their initial names.
    pub entry_points: Vec<(Addr, String)>,
}

/// One basic block as recovered by the engine, before the session links
/// predecessor edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBlock {
    pub start: Addr,
    pub end: Addr,
    pub instructions: Vec<Instruction>,
    pub successors: Vec<Addr>,
}

/// A complete raw control-flow graph for one function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFunction {
    pub entry: Addr,
    pub name: String,
    pub blocks: Vec<RawBlock>,
}

/// Receiver for job progress reports from inside an engine call.
///
/// Backends report at whatever granularity they like; the job queue
/// throttles before anything reaches the event bus.
pub trait ProgressSink: Send + Sync {
    fn report(&self, fraction: f64, text: &str);
}

/// A progress sink that discards all reports.
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn report(&self, _fraction: f64, _text: &str) {}
}

/// The black-box analysis engine the workspace drives.
///
/// Implementations must be `Send + Sync`: calls run on blocking worker
/// threads while the session lock is not held.
pub trait AnalysisEngine: Send + Sync {
    /// Load an image from disk and report its identity and entry points.
    fn load(&self, path: &Path) -> EngineResult<ImageInfo>;

    /// Recover the control-flow graph for the function at `entry`.
    fn analyze(&self, entry: Addr, progress: &dyn ProgressSink) -> EngineResult<RawFunction>;

    /// Produce decompiled text for the function at `entry`.
    fn decompile(&self, entry: Addr, progress: &dyn ProgressSink) -> EngineResult<String>;
}

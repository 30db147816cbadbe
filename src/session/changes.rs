//! Mutations and the change sets they commit.
//!
//! Every state change, whether issued by the UI, the console or a
//! completing job, is expressed as a [`Mutation`] and handed to the
//! session's single gate. The gate answers with a [`ChangeSet`], which is
//! also the payload of the event published for that commit.

use crate::core::addr::{Addr, AddrRange};
use crate::engine::RawFunction;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A state change request against the session.
#[derive(Debug, Clone)]
pub enum Mutation {
    /// Register a function entry (and a function symbol for it).
    DefineFunction { entry: Addr, name: String },
    /// Flip a function to `Analyzing`. Applied by the job queue when an
    /// analysis job starts.
    BeginAnalysis { entry: Addr },
    /// Rename the symbol at `addr`. Rejected when the new name is bound
    /// to a different address.
    RenameSymbol { addr: Addr, new_name: String },
    /// Set or clear the comment at `addr`.
    SetComment { addr: Addr, text: Option<String> },
    /// Overlay bytes at `addr`. Adjacent patches are merged; any function
    /// containing a patched byte is marked stale.
    PatchBytes {
        addr: Addr,
        bytes: Vec<u8>,
        comment: Option<String>,
    },
    /// Install an analysis job's result. `generation` is the structural
    /// generation the result was computed against.
    ApplyAnalysis {
        entry: Addr,
        generation: u64,
        raw: RawFunction,
    },
    /// Install a decompilation job's result, generation-checked the same
    /// way.
    ApplyDecompilation {
        entry: Addr,
        generation: u64,
        text: String,
    },
    /// Split the patch covering `at` into two patches at that address.
    SplitPatch { at: Addr },
    /// Mark every function intersecting `range` stale.
    InvalidateRange { range: AddrRange },
    /// Annotate a function with a failed job's error. The only mutation a
    /// failed job produces; analysis state is untouched.
    RecordJobFailure {
        entry: Addr,
        job: Uuid,
        error: String,
    },
}

impl Mutation {
    /// Short operation name for logging.
    pub fn op_name(&self) -> &'static str {
        match self {
            Mutation::DefineFunction { .. } => "define_function",
            Mutation::BeginAnalysis { .. } => "begin_analysis",
            Mutation::RenameSymbol { .. } => "rename_symbol",
            Mutation::SetComment { .. } => "set_comment",
            Mutation::PatchBytes { .. } => "patch_bytes",
            Mutation::SplitPatch { .. } => "split_patch",
            Mutation::ApplyAnalysis { .. } => "apply_analysis",
            Mutation::ApplyDecompilation { .. } => "apply_decompilation",
            Mutation::InvalidateRange { .. } => "invalidate_range",
            Mutation::RecordJobFailure { .. } => "record_job_failure",
        }
    }
}

/// One committed effect inside a [`ChangeSet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Change {
    FunctionDefined {
        entry: Addr,
    },
    AnalysisStarted {
        entry: Addr,
    },
    FunctionAnalyzed {
        entry: Addr,
        /// Full extent of the analyzed function, for scope filtering.
        range: AddrRange,
    },
    FunctionDecompiled {
        entry: Addr,
        /// Full extent of the function whose text changed.
        range: AddrRange,
    },
    FunctionInvalidated {
        entry: Addr,
        /// Full extent of the function that went stale; a view scoped to
        /// any part of the body intersects it.
        range: AddrRange,
    },
    SymbolRenamed {
        addr: Addr,
        old: String,
        new: String,
    },
    CommentSet {
        addr: Addr,
    },
    BytesPatched {
        range: AddrRange,
    },
    JobFailureRecorded {
        entry: Addr,
        job: Uuid,
        error: String,
    },
}

impl Change {
    /// The address range this change touches, used for view scope
    /// intersection.
    pub fn affected(&self) -> AddrRange {
        match self {
            Change::FunctionDefined { entry }
            | Change::AnalysisStarted { entry }
            | Change::JobFailureRecorded { entry, .. } => AddrRange::point(*entry),
            Change::FunctionAnalyzed { range, .. }
            | Change::FunctionDecompiled { range, .. }
            | Change::FunctionInvalidated { range, .. } => *range,
            Change::SymbolRenamed { addr, .. } | Change::CommentSet { addr } => {
                AddrRange::point(*addr)
            }
            Change::BytesPatched { range } => *range,
        }
    }
}

/// Everything one committed mutation affected.
///
/// `seq` is the session's commit sequence number: strictly increasing,
/// one per committed mutation, and the order in which events reach every
/// subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub seq: u64,
    pub changes: Vec<Change>,
}

impl ChangeSet {
    /// Whether any contained change touches `range`.
    pub fn touches(&self, range: &AddrRange) -> bool {
        self.changes.iter().any(|c| c.affected().intersects(range))
    }
}

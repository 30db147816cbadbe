//! The analysis session: single source of truth for one loaded binary.
//!
//! Every mutation, whether issued by a view, the console or a completing
//! job, goes through [`Session::apply_mutation`]. The gate validates,
//! applies atomically (rolling back to the pre-call snapshot on any
//! failure), bumps the commit sequence and publishes exactly one event
//! per committed change set while the lock is still held, so event order
//! equals commit order.
//!
//! The lock is only ever held to apply one change set; long analysis
//! work happens on job workers before their results reach the gate.

mod changes;

pub use changes::{Change, ChangeSet, Mutation};

use crate::core::addr::{Addr, AddrRange};
use crate::core::basic_block::BasicBlock;
use crate::core::function::{AnalysisStatus, Decompilation, Function};
use crate::core::patch::Patch;
use crate::core::symbol::{Symbol, SymbolKind};
use crate::engine::{AnalysisEngine, RawFunction};
use crate::error::{Result, SessionError};
use crate::events::{Event, EventPublisher};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Which binary a session (or a persisted layout) belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryIdentity {
    pub path: PathBuf,
    /// Hex-encoded SHA-256 of the file content.
    pub sha256: String,
}

/// Entity maps behind the gate. Cloned wholesale as the rollback
/// snapshot; the model is small relative to the analyses that feed it.
#[derive(Debug, Clone, Default)]
struct SessionState {
    functions: BTreeMap<Addr, Function>,
    symbols_by_name: BTreeMap<String, Addr>,
    symbols_by_addr: BTreeMap<Addr, Symbol>,
    comments: BTreeMap<Addr, String>,
    /// Sorted by address, non-overlapping.
    patches: Vec<Patch>,
    commit_seq: u64,
}

impl SessionState {
    fn function_containing(&self, addr: Addr) -> Option<&Function> {
        self.functions.values().find(|f| f.contains(addr))
    }
}

/// One loaded binary's mutable analysis model.
pub struct Session {
    id: Uuid,
    identity: BinaryIdentity,
    engine: Arc<dyn AnalysisEngine>,
    state: Mutex<SessionState>,
    publisher: EventPublisher,
}

impl Session {
    /// Load a binary through the engine and build the initial model:
    /// function stubs and symbols for every reported entry point.
    pub fn load(
        engine: Arc<dyn AnalysisEngine>,
        path: &Path,
        publisher: EventPublisher,
    ) -> Result<Session> {
        let info = engine
            .load(path)
            .map_err(|e| SessionError::EngineFailure(e.to_string()))?;

        let mut state = SessionState::default();
        for (entry, name) in &info.entry_points {
            state.functions.insert(*entry, Function::new(*entry, name));
            state.symbols_by_name.insert(name.clone(), *entry);
            state
                .symbols_by_addr
                .insert(*entry, Symbol::new(name, *entry, SymbolKind::Function));
        }

        let session = Session {
            id: Uuid::new_v4(),
            identity: BinaryIdentity {
                path: info.path,
                sha256: info.sha256,
            },
            engine,
            state: Mutex::new(state),
            publisher,
        };
        info!(
            session = %session.id,
            path = %session.identity.path.display(),
            functions = info.entry_points.len(),
            "session loaded"
        );
        Ok(session)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn identity(&self) -> &BinaryIdentity {
        &self.identity
    }

    /// The engine handle, for job workers. The session owns the only
    /// long-lived reference.
    pub fn engine(&self) -> Arc<dyn AnalysisEngine> {
        Arc::clone(&self.engine)
    }

    pub fn commit_seq(&self) -> u64 {
        self.lock().commit_seq
    }

    /// Snapshot of the function whose entry is exactly `addr`.
    pub fn function(&self, entry: Addr) -> Option<Function> {
        self.lock().functions.get(&entry).cloned()
    }

    /// Snapshot of the function containing `addr`, if any.
    pub fn function_at(&self, addr: Addr) -> Option<Function> {
        self.lock().function_containing(addr).cloned()
    }

    /// All function snapshots, in address order.
    pub fn functions(&self) -> Vec<Function> {
        self.lock().functions.values().cloned().collect()
    }

    pub fn symbol_addr(&self, name: &str) -> Option<Addr> {
        self.lock().symbols_by_name.get(name).copied()
    }

    pub fn symbol_at(&self, addr: Addr) -> Option<Symbol> {
        self.lock().symbols_by_addr.get(&addr).cloned()
    }

    pub fn symbols(&self) -> Vec<Symbol> {
        self.lock().symbols_by_addr.values().cloned().collect()
    }

    pub fn comment(&self, addr: Addr) -> Option<String> {
        self.lock().comments.get(&addr).cloned()
    }

    pub fn patches(&self) -> Vec<Patch> {
        self.lock().patches.clone()
    }

    /// Decompiled text for the function at `entry`, only when consistent
    /// with its current block set.
    pub fn decompilation(&self, entry: Addr) -> Option<Decompilation> {
        self.lock()
            .functions
            .get(&entry)
            .and_then(|f| f.fresh_decompilation().cloned())
    }

    /// The single mutation gate.
    ///
    /// Commits atomically: on any validation failure the pre-call state
    /// is restored and the error returned; on success the commit
    /// sequence advances and the change set is published before the
    /// lock is released.
    pub fn apply_mutation(&self, mutation: Mutation) -> Result<ChangeSet> {
        let mut state = self.lock();
        let snapshot = state.clone();
        match Self::apply(&mut state, &mutation) {
            Ok(changes) => {
                state.commit_seq += 1;
                let change_set = ChangeSet {
                    seq: state.commit_seq,
                    changes,
                };
                debug!(
                    op = mutation.op_name(),
                    seq = change_set.seq,
                    changes = change_set.changes.len(),
                    "mutation committed"
                );
                self.publisher.publish(Event::Session(change_set.clone()));
                Ok(change_set)
            }
            Err(err) => {
                *state = snapshot;
                warn!(op = mutation.op_name(), error = %err, "mutation rejected");
                Err(err)
            }
        }
    }

    /// Mark every function intersecting `range` stale.
    pub fn invalidate(&self, range: AddrRange) -> Result<ChangeSet> {
        self.apply_mutation(Mutation::InvalidateRange { range })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().expect("session state lock poisoned")
    }

    fn apply(state: &mut SessionState, mutation: &Mutation) -> Result<Vec<Change>> {
        match mutation {
            Mutation::DefineFunction { entry, name } => {
                if state.functions.contains_key(entry) {
                    return Err(SessionError::InvalidInput(format!(
                        "function already defined at {}",
                        entry
                    )));
                }
                if let Some(bound) = state.symbols_by_name.get(name) {
                    return Err(SessionError::SymbolInUse {
                        name: name.clone(),
                        bound_to: *bound,
                    });
                }
                state.functions.insert(*entry, Function::new(*entry, name));
                state.symbols_by_name.insert(name.clone(), *entry);
                state
                    .symbols_by_addr
                    .insert(*entry, Symbol::new(name, *entry, SymbolKind::Function));
                Ok(vec![Change::FunctionDefined { entry: *entry }])
            }

            Mutation::BeginAnalysis { entry } => {
                let f = state
                    .functions
                    .get_mut(entry)
                    .ok_or(SessionError::InvalidAddress(*entry))?;
                f.status = AnalysisStatus::Analyzing;
                Ok(vec![Change::AnalysisStarted { entry: *entry }])
            }

            Mutation::RenameSymbol { addr, new_name } => {
                if let Some(bound) = state.symbols_by_name.get(new_name) {
                    if bound != addr {
                        return Err(SessionError::SymbolInUse {
                            name: new_name.clone(),
                            bound_to: *bound,
                        });
                    }
                }
                let symbol = state
                    .symbols_by_addr
                    .get_mut(addr)
                    .ok_or(SessionError::InvalidAddress(*addr))?;
                let old = symbol.name.clone();
                symbol.name = new_name.clone();
                state.symbols_by_name.remove(&old);
                state.symbols_by_name.insert(new_name.clone(), *addr);
                if let Some(f) = state.functions.get_mut(addr) {
                    f.name = new_name.clone();
                }
                Ok(vec![Change::SymbolRenamed {
                    addr: *addr,
                    old,
                    new: new_name.clone(),
                }])
            }

            Mutation::SetComment { addr, text } => {
                if state.function_containing(*addr).is_none() {
                    return Err(SessionError::InvalidAddress(*addr));
                }
                match text {
                    Some(text) => {
                        state.comments.insert(*addr, text.clone());
                    }
                    None => {
                        state.comments.remove(addr);
                    }
                }
                Ok(vec![Change::CommentSet { addr: *addr }])
            }

            Mutation::PatchBytes {
                addr,
                bytes,
                comment,
            } => {
                if bytes.is_empty() {
                    return Err(SessionError::InvalidInput("empty patch".into()));
                }
                let patch = Patch::new(*addr, bytes.clone(), comment.clone());
                let range = patch.range();
                if state.patches.iter().any(|p| p.range().intersects(&range)) {
                    return Err(SessionError::InvalidInput(format!(
                        "patch overlaps an existing patch at {}",
                        addr
                    )));
                }
                insert_patch(&mut state.patches, patch);

                // Staleness must be visible before anyone can read the
                // patched function again; both happen under the gate
                // lock, inside the same commit.
                let mut changes = vec![Change::BytesPatched { range }];
                for f in state.functions.values_mut() {
                    if f.range().intersects(&range) {
                        f.status = AnalysisStatus::Stale;
                        f.generation += 1;
                        f.mark_decompilation_stale();
                        changes.push(Change::FunctionInvalidated {
                            entry: f.entry,
                            range: f.range(),
                        });
                    }
                }
                Ok(changes)
            }

            Mutation::SplitPatch { at } => {
                let idx = state
                    .patches
                    .iter()
                    .position(|p| p.range().contains(*at))
                    .ok_or_else(|| {
                        SessionError::InvalidInput(format!("no patch covers {}", at))
                    })?;
                let range = state.patches[idx].range();
                let tail = state.patches[idx].split_at(*at).ok_or_else(|| {
                    SessionError::InvalidInput(format!(
                        "cannot split a patch at its own start {}",
                        at
                    ))
                })?;
                // Inserted directly, not through `insert_patch`: the
                // adjacency merge there would immediately re-join the
                // halves.
                state.patches.insert(idx + 1, tail);
                Ok(vec![Change::BytesPatched { range }])
            }

            Mutation::ApplyAnalysis {
                entry,
                generation,
                raw,
            } => {
                let current = state
                    .functions
                    .get(entry)
                    .ok_or(SessionError::InvalidAddress(*entry))?
                    .generation;
                if current != *generation {
                    return Err(SessionError::AnalysisConflict {
                        addr: *entry,
                        expected: *generation,
                        found: current,
                    });
                }
                let (blocks, edges) = link_blocks(raw);
                let f = state
                    .functions
                    .get_mut(entry)
                    .ok_or(SessionError::InvalidAddress(*entry))?;
                f.blocks = blocks;
                f.edges = edges;
                f.status = AnalysisStatus::Complete;
                f.generation += 1;
                f.mark_decompilation_stale();
                f.last_error = None;
                // The function keeps its session name: a rename that
                // raced this analysis is not overwritten.
                let range = f.range();
                // Invariant: an address resolves to at most one function.
                // A result that has grown into a neighbour loses the race;
                // the gate rolls the install back on this error.
                if let Some(other) = state
                    .functions
                    .values()
                    .find(|f| f.entry != *entry && f.range().intersects(&range))
                {
                    return Err(SessionError::AnalysisConflict {
                        addr: other.entry,
                        expected: *generation,
                        found: other.generation,
                    });
                }
                Ok(vec![Change::FunctionAnalyzed {
                    entry: *entry,
                    range,
                }])
            }

            Mutation::ApplyDecompilation {
                entry,
                generation,
                text,
            } => {
                let f = state
                    .functions
                    .get_mut(entry)
                    .ok_or(SessionError::InvalidAddress(*entry))?;
                if f.generation != *generation {
                    return Err(SessionError::AnalysisConflict {
                        addr: *entry,
                        expected: *generation,
                        found: f.generation,
                    });
                }
                f.decompilation = Some(Decompilation {
                    text: text.clone(),
                    generation: f.generation,
                    stale: false,
                });
                Ok(vec![Change::FunctionDecompiled {
                    entry: *entry,
                    range: f.range(),
                }])
            }

            Mutation::InvalidateRange { range } => {
                let mut changes = Vec::new();
                for f in state.functions.values_mut() {
                    if f.range().intersects(range) {
                        f.status = AnalysisStatus::Stale;
                        f.generation += 1;
                        f.mark_decompilation_stale();
                        changes.push(Change::FunctionInvalidated {
                            entry: f.entry,
                            range: f.range(),
                        });
                    }
                }
                Ok(changes)
            }

            Mutation::RecordJobFailure { entry, job, error } => {
                let f = state
                    .functions
                    .get_mut(entry)
                    .ok_or(SessionError::InvalidAddress(*entry))?;
                f.last_error = Some(error.clone());
                if f.status == AnalysisStatus::Analyzing {
                    f.status = if f.blocks.is_empty() {
                        AnalysisStatus::Unanalyzed
                    } else {
                        AnalysisStatus::Stale
                    };
                }
                Ok(vec![Change::JobFailureRecorded {
                    entry: *entry,
                    job: *job,
                    error: error.clone(),
                }])
            }
        }
    }
}

/// Build the block map from a raw graph and derive predecessor edges
/// from the reported successors.
fn link_blocks(raw: &RawFunction) -> (BTreeMap<Addr, BasicBlock>, Vec<(Addr, Addr)>) {
    let mut blocks: BTreeMap<Addr, BasicBlock> = BTreeMap::new();
    for rb in &raw.blocks {
        let mut block = BasicBlock::new(AddrRange::new(rb.start, rb.end));
        block.instructions = rb.instructions.clone();
        block.successors = rb.successors.iter().copied().collect();
        blocks.insert(rb.start, block);
    }
    let mut edges = Vec::new();
    let starts: Vec<Addr> = blocks.keys().copied().collect();
    for from in starts {
        let succs: Vec<Addr> = blocks[&from].successors.iter().copied().collect();
        for to in succs {
            edges.push((from, to));
            if let Some(target) = blocks.get_mut(&to) {
                target.predecessors.insert(from);
            }
        }
    }
    (blocks, edges)
}

/// Insert keeping address order, merging with a directly adjacent
/// neighbour on either side.
fn insert_patch(patches: &mut Vec<Patch>, patch: Patch) {
    let idx = patches.partition_point(|p| p.addr < patch.addr);
    patches.insert(idx, patch);
    // Merge forward first so a patch bridging two neighbours collapses
    // into one.
    if idx + 1 < patches.len() && patches[idx].can_merge(&patches[idx + 1]) {
        let next = patches.remove(idx + 1);
        patches[idx].merge(&next);
    }
    if idx > 0 && patches[idx - 1].can_merge(&patches[idx]) {
        let cur = patches.remove(idx);
        patches[idx - 1].merge(&cur);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ScriptedEngine;

    fn test_session() -> (Session, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("two-funcs.bin");
        std::fs::write(&path, b"two functions").unwrap();
        let engine = ScriptedEngine::new()
            .with_linear_function(Addr(0x1000), "f1", 0x40)
            .with_linear_function(Addr(0x2000), "f2", 0x40);
        let session =
            Session::load(Arc::new(engine), &path, EventPublisher::detached()).unwrap();
        (session, dir)
    }

    fn analyzed(session: &Session, entry: Addr) -> ChangeSet {
        let f = session.function(entry).unwrap();
        let raw = session
            .engine()
            .analyze(entry, &crate::engine::NullProgress)
            .unwrap();
        session
            .apply_mutation(Mutation::ApplyAnalysis {
                entry,
                generation: f.generation,
                raw,
            })
            .unwrap()
    }

    #[test]
    fn test_load_builds_stubs_and_symbols() {
        let (session, _dir) = test_session();
        let f1 = session.function(Addr(0x1000)).unwrap();
        assert_eq!(f1.name, "f1");
        assert_eq!(f1.status, AnalysisStatus::Unanalyzed);
        assert_eq!(session.symbol_addr("f2"), Some(Addr(0x2000)));
        assert_eq!(session.commit_seq(), 0);
    }

    #[test]
    fn test_apply_analysis_links_predecessors() {
        let (session, _dir) = test_session();
        analyzed(&session, Addr(0x1000));
        let f = session.function(Addr(0x1000)).unwrap();
        assert_eq!(f.status, AnalysisStatus::Complete);
        assert_eq!(f.generation, 1);
        let second = f.blocks.get(&Addr(0x1020)).unwrap();
        assert!(second.predecessors.contains(&Addr(0x1000)));
    }

    #[test]
    fn test_stale_generation_rejected() {
        let (session, _dir) = test_session();
        let raw = session
            .engine()
            .analyze(Addr(0x1000), &crate::engine::NullProgress)
            .unwrap();
        analyzed(&session, Addr(0x1000)); // bumps generation to 1
        let err = session
            .apply_mutation(Mutation::ApplyAnalysis {
                entry: Addr(0x1000),
                generation: 0,
                raw,
            })
            .unwrap_err();
        assert!(matches!(err, SessionError::AnalysisConflict { .. }));
        // Earlier committer's result is kept.
        let f = session.function(Addr(0x1000)).unwrap();
        assert_eq!(f.generation, 1);
    }

    #[test]
    fn test_define_function_registers_symbol() {
        let (session, _dir) = test_session();
        session
            .apply_mutation(Mutation::DefineFunction {
                entry: Addr(0x3000),
                name: "helper".into(),
            })
            .unwrap();
        let f = session.function(Addr(0x3000)).unwrap();
        assert_eq!(f.status, AnalysisStatus::Unanalyzed);
        assert_eq!(session.symbol_addr("helper"), Some(Addr(0x3000)));

        // Entry and name collisions are both rejected.
        let err = session
            .apply_mutation(Mutation::DefineFunction {
                entry: Addr(0x3000),
                name: "other".into(),
            })
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidInput(_)));
        let err = session
            .apply_mutation(Mutation::DefineFunction {
                entry: Addr(0x4000),
                name: "helper".into(),
            })
            .unwrap_err();
        assert!(matches!(err, SessionError::SymbolInUse { .. }));
    }

    #[test]
    fn test_rename_is_bijective() {
        let (session, _dir) = test_session();
        session
            .apply_mutation(Mutation::RenameSymbol {
                addr: Addr(0x1000),
                new_name: "entry_main".into(),
            })
            .unwrap();
        assert_eq!(session.symbol_addr("entry_main"), Some(Addr(0x1000)));
        assert_eq!(session.symbol_addr("f1"), None);
        assert_eq!(session.function(Addr(0x1000)).unwrap().name, "entry_main");

        let err = session
            .apply_mutation(Mutation::RenameSymbol {
                addr: Addr(0x2000),
                new_name: "entry_main".into(),
            })
            .unwrap_err();
        assert!(matches!(err, SessionError::SymbolInUse { .. }));
        assert_eq!(session.symbol_addr("f2"), Some(Addr(0x2000)));
    }

    #[test]
    fn test_rejected_mutation_rolls_back() {
        let (session, _dir) = test_session();
        let before = session.commit_seq();
        let err = session
            .apply_mutation(Mutation::SetComment {
                addr: Addr(0x9000),
                text: Some("nowhere".into()),
            })
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidAddress(_)));
        assert_eq!(session.commit_seq(), before);
        assert!(session.comment(Addr(0x9000)).is_none());
    }

    #[test]
    fn test_patch_marks_decompilation_stale() {
        let (session, _dir) = test_session();
        analyzed(&session, Addr(0x1000));
        let generation = session.function(Addr(0x1000)).unwrap().generation;
        session
            .apply_mutation(Mutation::ApplyDecompilation {
                entry: Addr(0x1000),
                generation,
                text: "int f1(void) { return 0; }".into(),
            })
            .unwrap();
        assert!(session.decompilation(Addr(0x1000)).is_some());

        let cs = session
            .apply_mutation(Mutation::PatchBytes {
                addr: Addr(0x1010),
                bytes: vec![0x90, 0x90],
                comment: None,
            })
            .unwrap();
        assert!(cs
            .changes
            .iter()
            .any(|c| matches!(c, Change::FunctionInvalidated { entry, .. } if *entry == Addr(0x1000))));
        // No reader observes a decompilation inconsistent with blocks.
        assert!(session.decompilation(Addr(0x1000)).is_none());
        assert_eq!(
            session.function(Addr(0x1000)).unwrap().status,
            AnalysisStatus::Stale
        );
    }

    #[test]
    fn test_adjacent_patches_merge() {
        let (session, _dir) = test_session();
        analyzed(&session, Addr(0x1000));
        session
            .apply_mutation(Mutation::PatchBytes {
                addr: Addr(0x1000),
                bytes: vec![0x90],
                comment: None,
            })
            .unwrap();
        session
            .apply_mutation(Mutation::PatchBytes {
                addr: Addr(0x1001),
                bytes: vec![0x90],
                comment: None,
            })
            .unwrap();
        let patches = session.patches();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].bytes, vec![0x90, 0x90]);
    }

    #[test]
    fn test_split_patch_yields_two_halves() {
        let (session, _dir) = test_session();
        session
            .apply_mutation(Mutation::PatchBytes {
                addr: Addr(0x1000),
                bytes: vec![1, 2, 3, 4],
                comment: Some("nop sled".into()),
            })
            .unwrap();
        let cs = session
            .apply_mutation(Mutation::SplitPatch { at: Addr(0x1002) })
            .unwrap();
        assert!(cs
            .changes
            .iter()
            .any(|c| matches!(c, Change::BytesPatched { range }
                if *range == AddrRange::new(Addr(0x1000), Addr(0x1004)))));

        let patches = session.patches();
        assert_eq!(patches.len(), 2);
        assert_eq!(patches[0].addr, Addr(0x1000));
        assert_eq!(patches[0].bytes, vec![1, 2]);
        assert_eq!(patches[1].addr, Addr(0x1002));
        assert_eq!(patches[1].bytes, vec![3, 4]);
        assert_eq!(patches[1].comment.as_deref(), Some("nop sled"));

        // Splitting at a patch boundary or outside any patch is refused.
        let err = session
            .apply_mutation(Mutation::SplitPatch { at: Addr(0x1000) })
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidInput(_)));
        let err = session
            .apply_mutation(Mutation::SplitPatch { at: Addr(0x5000) })
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidInput(_)));
        assert_eq!(session.patches().len(), 2);
    }

    #[test]
    fn test_overlapping_patch_rejected() {
        let (session, _dir) = test_session();
        analyzed(&session, Addr(0x1000));
        session
            .apply_mutation(Mutation::PatchBytes {
                addr: Addr(0x1000),
                bytes: vec![1, 2, 3, 4],
                comment: None,
            })
            .unwrap();
        let err = session
            .apply_mutation(Mutation::PatchBytes {
                addr: Addr(0x1002),
                bytes: vec![9],
                comment: None,
            })
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidInput(_)));
        assert_eq!(session.patches().len(), 1);
    }

    #[test]
    fn test_invalidate_range_scoped() {
        let (session, _dir) = test_session();
        analyzed(&session, Addr(0x1000));
        analyzed(&session, Addr(0x2000));
        let cs = session
            .invalidate(AddrRange::new(Addr(0x1000), Addr(0x1040)))
            .unwrap();
        assert_eq!(cs.changes.len(), 1);
        assert_eq!(
            session.function(Addr(0x1000)).unwrap().status,
            AnalysisStatus::Stale
        );
        assert_eq!(
            session.function(Addr(0x2000)).unwrap().status,
            AnalysisStatus::Complete
        );
    }

    #[test]
    fn test_job_failure_annotates_function() {
        let (session, _dir) = test_session();
        session
            .apply_mutation(Mutation::BeginAnalysis { entry: Addr(0x1000) })
            .unwrap();
        assert_eq!(
            session.function(Addr(0x1000)).unwrap().status,
            AnalysisStatus::Analyzing
        );
        session
            .apply_mutation(Mutation::RecordJobFailure {
                entry: Addr(0x1000),
                job: Uuid::new_v4(),
                error: "backend error: lifter crashed".into(),
            })
            .unwrap();
        let f = session.function(Addr(0x1000)).unwrap();
        assert_eq!(f.status, AnalysisStatus::Unanalyzed);
        assert!(f.last_error.as_deref().unwrap().contains("lifter crashed"));
    }

    #[test]
    fn test_commit_seq_total_order() {
        let (session, _dir) = test_session();
        let a = analyzed(&session, Addr(0x1000));
        let b = analyzed(&session, Addr(0x2000));
        assert_eq!(a.seq + 1, b.seq);
    }
}

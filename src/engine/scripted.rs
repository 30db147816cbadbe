//! A deterministic scripted engine.
//!
//! Serves tests and headless demos: functions, block graphs and
//! decompiled text are declared up front, and failures or artificial
//! latency can be injected per address.

use super::{
    AnalysisEngine, EngineError, EngineResult, ImageInfo, ProgressSink, RawBlock, RawFunction,
};
use crate::core::addr::Addr;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
struct ScriptedFunction {
    name: String,
    blocks: Vec<RawBlock>,
    decompiled: String,
}

/// In-memory engine with scripted results.
#[derive(Default)]
pub struct ScriptedEngine {
    functions: BTreeMap<Addr, ScriptedFunction>,
    fail_analyze: HashSet<Addr>,
    fail_decompile: HashSet<Addr>,
    latency: Option<Duration>,
    /// Addresses analyzed so far, in call order. Lets tests assert on
    /// same-key job ordering.
    calls: Mutex<Vec<Addr>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a function with a linear two-block body starting at
    /// `entry`, `size` bytes long.
    pub fn with_linear_function(mut self, entry: Addr, name: &str, size: u64) -> Self {
        let half = size / 2;
        let mid = entry.offset(half);
        let end = entry.offset(size);
        let blocks = vec![
            RawBlock {
                start: entry,
                end: mid,
                instructions: vec![crate::core::Instruction::new(entry, half as u8, "push", "rbp")],
                successors: vec![mid],
            },
            RawBlock {
                start: mid,
                end,
                instructions: vec![crate::core::Instruction::new(mid, half as u8, "ret", "")],
                successors: vec![],
            },
        ];
        self.functions.insert(
            entry,
            ScriptedFunction {
                name: name.to_string(),
                blocks,
                decompiled: format!("int {}(void) {{ return 0; }}", name),
            },
        );
        self
    }

    /// Declare a function with an explicit block graph.
    pub fn with_function(
        mut self,
        entry: Addr,
        name: &str,
        blocks: Vec<RawBlock>,
        decompiled: &str,
    ) -> Self {
        self.functions.insert(
            entry,
            ScriptedFunction {
                name: name.to_string(),
                blocks,
                decompiled: decompiled.to_string(),
            },
        );
        self
    }

    /// Make `analyze(entry)` fail with a backend error.
    pub fn failing_analyze(mut self, entry: Addr) -> Self {
        self.fail_analyze.insert(entry);
        self
    }

    /// Make `decompile(entry)` fail with a backend error.
    pub fn failing_decompile(mut self, entry: Addr) -> Self {
        self.fail_decompile.insert(entry);
        self
    }

    /// Sleep this long inside every analyze/decompile call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Addresses passed to `analyze`, in call order.
    pub fn analyze_calls(&self) -> Vec<Addr> {
        self.calls.lock().expect("calls lock poisoned").clone()
    }

    fn pause(&self) {
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }
    }
}

impl AnalysisEngine for ScriptedEngine {
    fn load(&self, path: &Path) -> EngineResult<ImageInfo> {
        let bytes =
            std::fs::read(path).map_err(|e| EngineError::LoadFailed(format!("{}: {}", path.display(), e)))?;
        let sha256 = hex::encode(Sha256::digest(&bytes));
        Ok(ImageInfo {
            path: path.to_path_buf(),
            sha256,
            entry_points: self
                .functions
                .iter()
                .map(|(addr, f)| (*addr, f.name.clone()))
                .collect(),
        })
    }

    fn analyze(&self, entry: Addr, progress: &dyn ProgressSink) -> EngineResult<RawFunction> {
        self.calls.lock().expect("calls lock poisoned").push(entry);
        progress.report(0.1, "decoding");
        self.pause();
        if self.fail_analyze.contains(&entry) {
            return Err(EngineError::Backend(format!(
                "scripted analysis failure at {}",
                entry
            )));
        }
        let f = self
            .functions
            .get(&entry)
            .ok_or(EngineError::NoCodeAt(entry))?;
        progress.report(0.9, "linking blocks");
        Ok(RawFunction {
            entry,
            name: f.name.clone(),
            blocks: f.blocks.clone(),
        })
    }

    fn decompile(&self, entry: Addr, progress: &dyn ProgressSink) -> EngineResult<String> {
        progress.report(0.5, "lifting");
        self.pause();
        if self.fail_decompile.contains(&entry) {
            return Err(EngineError::Backend(format!(
                "scripted decompilation failure at {}",
                entry
            )));
        }
        let f = self
            .functions
            .get(&entry)
            .ok_or(EngineError::NoCodeAt(entry))?;
        Ok(f.decompiled.clone())
    }
}

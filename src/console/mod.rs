//! Console bridge: the embedded interactive interpreter's window onto
//! the session.
//!
//! Commands read session snapshots, submit jobs and mutate through the
//! same gate as the UI, so interpreter-issued changes obey the same
//! total order and invalidation rules. `await` suspends on the job's
//! handle rather than polling or re-entering the event bus. The bridge
//! runs on the caller's own execution context (in the workbench, a
//! dedicated task; see [`protocol`]), never on job-queue workers, so a
//! long script cannot starve job processing.

pub mod protocol;

use crate::core::addr::{Addr, AddrRange};
use crate::debug::DebugAdapter;
use crate::error::{Result, SessionError};
use crate::jobs::{JobOutcome, JobQueue, JobSpec};
use crate::session::{Mutation, Session};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Result of evaluating one console line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsoleOutcome {
    /// Human-readable output.
    pub stdout: String,
    /// Structured result for programmatic front-ends.
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl ConsoleOutcome {
    fn ok(stdout: impl Into<String>, result: Option<serde_json::Value>) -> Self {
        ConsoleOutcome {
            stdout: stdout.into(),
            result,
            error: None,
        }
    }

    fn fail(error: impl ToString) -> Self {
        ConsoleOutcome {
            stdout: String::new(),
            result: None,
            error: Some(error.to_string()),
        }
    }
}

struct CommandDef {
    name: &'static str,
    usage: &'static str,
    help: &'static str,
}

static COMMANDS: Lazy<Vec<CommandDef>> = Lazy::new(|| {
    vec![
        CommandDef {
            name: "help",
            usage: "help",
            help: "list available commands",
        },
        CommandDef {
            name: "functions",
            usage: "functions",
            help: "list functions with status and generation",
        },
        CommandDef {
            name: "fn",
            usage: "fn <addr>",
            help: "show one function in detail",
        },
        CommandDef {
            name: "rename",
            usage: "rename <addr> <name>",
            help: "rename the symbol at an address",
        },
        CommandDef {
            name: "comment",
            usage: "comment <addr> [text]",
            help: "set (or with no text, clear) the comment at an address",
        },
        CommandDef {
            name: "patch",
            usage: "patch <addr> <hexbytes>",
            help: "overlay bytes at an address",
        },
        CommandDef {
            name: "analyze",
            usage: "analyze <addr>",
            help: "submit an analysis job, printing its id",
        },
        CommandDef {
            name: "decompile",
            usage: "decompile <addr>",
            help: "submit a decompilation job, printing its id",
        },
        CommandDef {
            name: "await",
            usage: "await <job-id>",
            help: "suspend until a job finishes",
        },
        CommandDef {
            name: "jobs",
            usage: "jobs",
            help: "list known jobs",
        },
        CommandDef {
            name: "cancel",
            usage: "cancel <job-id>",
            help: "cancel a job (best effort)",
        },
        CommandDef {
            name: "invalidate",
            usage: "invalidate <start> <end>",
            help: "mark functions in [start, end) stale",
        },
        CommandDef {
            name: "bp",
            usage: "bp add|remove|list [addr]",
            help: "manage breakpoints",
        },
    ]
});

/// The bridge itself: session reads, gate writes, job submission and
/// suspension.
pub struct ConsoleBridge {
    session: Arc<Session>,
    jobs: Arc<JobQueue>,
    debug: Arc<DebugAdapter>,
}

impl ConsoleBridge {
    pub fn new(
        session: Arc<Session>,
        jobs: Arc<JobQueue>,
        debug: Arc<DebugAdapter>,
    ) -> ConsoleBridge {
        ConsoleBridge {
            session,
            jobs,
            debug,
        }
    }

    /// Evaluate one line. Mutating commands return the committed change
    /// details; errors come back in `error` and never crash the
    /// workspace.
    pub async fn evaluate(&self, line: &str) -> ConsoleOutcome {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((&command, args)) = tokens.split_first() else {
            return ConsoleOutcome::ok("", None);
        };
        debug!(command, "console command");
        match self.dispatch(command, args).await {
            Ok(outcome) => outcome,
            Err(err) => ConsoleOutcome::fail(err),
        }
    }

    async fn dispatch(&self, command: &str, args: &[&str]) -> Result<ConsoleOutcome> {
        match command {
            "help" => Ok(self.help()),
            "functions" => Ok(self.functions()),
            "fn" => self.function_detail(args),
            "rename" => self.rename(args),
            "comment" => self.comment(args),
            "patch" => self.patch(args),
            "analyze" => self.submit(args, JobSpec::analyze),
            "decompile" => self.submit(args, JobSpec::decompile),
            "await" => self.await_job(args).await,
            "jobs" => Ok(self.jobs_list()),
            "cancel" => self.cancel(args),
            "invalidate" => self.invalidate(args),
            "bp" => self.breakpoint(args),
            other => Err(SessionError::InvalidInput(format!(
                "unknown command `{}` (try `help`)",
                other
            ))),
        }
    }

    fn help(&self) -> ConsoleOutcome {
        let mut out = String::new();
        for def in COMMANDS.iter() {
            let _ = writeln!(out, "{:28} {}", def.usage, def.help);
        }
        ConsoleOutcome::ok(out, None)
    }

    fn functions(&self) -> ConsoleOutcome {
        let functions = self.session.functions();
        let mut out = String::new();
        let mut items = Vec::new();
        for f in &functions {
            let _ = writeln!(
                out,
                "{}  {:12}  gen {}  {}",
                f.entry,
                f.status.value(),
                f.generation,
                f.name
            );
            items.push(json!({
                "entry": f.entry,
                "name": f.name,
                "status": f.status.value(),
                "generation": f.generation,
            }));
        }
        ConsoleOutcome::ok(out, Some(json!(items)))
    }

    fn function_detail(&self, args: &[&str]) -> Result<ConsoleOutcome> {
        let addr = parse_addr(args.first(), "fn <addr>")?;
        let f = self
            .session
            .function_at(addr)
            .ok_or(SessionError::InvalidAddress(addr))?;
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} {} ({}, gen {})",
            f.entry,
            f.name,
            f.status.value(),
            f.generation
        );
        for block in f.blocks.values() {
            let _ = writeln!(
                out,
                "  block {}  {} instrs  -> {:?}",
                block.range,
                block.instruction_count(),
                block.successors.iter().map(|a| a.to_string()).collect::<Vec<_>>()
            );
        }
        if let Some(d) = f.fresh_decompilation() {
            let _ = writeln!(out, "  decompiled:\n{}", d.text);
        }
        if let Some(err) = &f.last_error {
            let _ = writeln!(out, "  last error: {}", err);
        }
        let result = serde_json::to_value(&f)?;
        Ok(ConsoleOutcome::ok(out, Some(result)))
    }

    fn rename(&self, args: &[&str]) -> Result<ConsoleOutcome> {
        let addr = parse_addr(args.first(), "rename <addr> <name>")?;
        let name = args
            .get(1)
            .ok_or_else(|| SessionError::InvalidInput("rename <addr> <name>".into()))?;
        let cs = self.session.apply_mutation(Mutation::RenameSymbol {
            addr,
            new_name: name.to_string(),
        })?;
        Ok(ConsoleOutcome::ok(
            format!("renamed {} to {}", addr, name),
            Some(serde_json::to_value(&cs)?),
        ))
    }

    fn comment(&self, args: &[&str]) -> Result<ConsoleOutcome> {
        let addr = parse_addr(args.first(), "comment <addr> [text]")?;
        let text = if args.len() > 1 {
            Some(args[1..].join(" "))
        } else {
            None
        };
        let cleared = text.is_none();
        let cs = self
            .session
            .apply_mutation(Mutation::SetComment { addr, text })?;
        let verb = if cleared { "cleared" } else { "set" };
        Ok(ConsoleOutcome::ok(
            format!("comment {} at {}", verb, addr),
            Some(serde_json::to_value(&cs)?),
        ))
    }

    fn patch(&self, args: &[&str]) -> Result<ConsoleOutcome> {
        let addr = parse_addr(args.first(), "patch <addr> <hexbytes>")?;
        let hex_str = args
            .get(1)
            .ok_or_else(|| SessionError::InvalidInput("patch <addr> <hexbytes>".into()))?;
        let bytes = hex::decode(hex_str)
            .map_err(|e| SessionError::InvalidInput(format!("bad hex bytes: {}", e)))?;
        let count = bytes.len();
        let cs = self.session.apply_mutation(Mutation::PatchBytes {
            addr,
            bytes,
            comment: None,
        })?;
        Ok(ConsoleOutcome::ok(
            format!("patched {} bytes at {}", count, addr),
            Some(serde_json::to_value(&cs)?),
        ))
    }

    fn submit(&self, args: &[&str], make: fn(Addr) -> JobSpec) -> Result<ConsoleOutcome> {
        let addr = parse_addr(args.first(), "<command> <addr>")?;
        if self.session.function(addr).is_none() {
            return Err(SessionError::InvalidAddress(addr));
        }
        let handle = self.jobs.submit(make(addr));
        Ok(ConsoleOutcome::ok(
            format!("job {} submitted", handle.id),
            Some(json!({ "job": handle.id })),
        ))
    }

    async fn await_job(&self, args: &[&str]) -> Result<ConsoleOutcome> {
        let id = parse_job_id(args.first(), "await <job-id>")?;
        let handle = self
            .jobs
            .handle(id)
            .ok_or(SessionError::JobNotFound(id))?;
        // Suspends this console's execution slot only; workers and other
        // components keep running.
        let outcome = handle.wait().await;
        let text = match &outcome {
            JobOutcome::Done => format!("job {} done", id),
            JobOutcome::Failed(err) => format!("job {} failed: {}", id, err),
            JobOutcome::Cancelled => format!("job {} cancelled, result discarded", id),
        };
        Ok(ConsoleOutcome::ok(text, Some(serde_json::to_value(&outcome)?)))
    }

    fn jobs_list(&self) -> ConsoleOutcome {
        let records = self.jobs.jobs();
        let mut out = String::new();
        for r in &records {
            let _ = writeln!(
                out,
                "{}  {:9}  {} {}",
                r.id,
                format!("{:?}", r.state).to_lowercase(),
                r.spec.op.value(),
                r.spec.target
            );
        }
        let result = serde_json::to_value(&records).unwrap_or_default();
        ConsoleOutcome::ok(out, Some(result))
    }

    fn cancel(&self, args: &[&str]) -> Result<ConsoleOutcome> {
        let id = parse_job_id(args.first(), "cancel <job-id>")?;
        let cancelled = self.jobs.cancel(id);
        Ok(ConsoleOutcome::ok(
            if cancelled {
                format!("job {} cancelled", id)
            } else {
                format!("job {} not cancellable", id)
            },
            Some(json!({ "cancelled": cancelled })),
        ))
    }

    fn invalidate(&self, args: &[&str]) -> Result<ConsoleOutcome> {
        let start = parse_addr(args.first(), "invalidate <start> <end>")?;
        let end = parse_addr(args.get(1), "invalidate <start> <end>")?;
        if end < start {
            return Err(SessionError::InvalidInput(
                "invalidate: end below start".into(),
            ));
        }
        let cs = self.session.invalidate(AddrRange::new(start, end))?;
        Ok(ConsoleOutcome::ok(
            format!("{} function(s) invalidated", cs.changes.len()),
            Some(serde_json::to_value(&cs)?),
        ))
    }

    fn breakpoint(&self, args: &[&str]) -> Result<ConsoleOutcome> {
        match args.first().copied() {
            Some("add") => {
                let addr = parse_addr(args.get(1), "bp add <addr>")?;
                let added = self.debug.add_breakpoint(addr);
                Ok(ConsoleOutcome::ok(
                    format!("breakpoint at {}: {}", addr, if added { "added" } else { "exists" }),
                    Some(json!({ "added": added })),
                ))
            }
            Some("remove") => {
                let addr = parse_addr(args.get(1), "bp remove <addr>")?;
                let removed = self.debug.remove_breakpoint(addr);
                Ok(ConsoleOutcome::ok(
                    format!(
                        "breakpoint at {}: {}",
                        addr,
                        if removed { "removed" } else { "not set" }
                    ),
                    Some(json!({ "removed": removed })),
                ))
            }
            Some("list") | None => {
                let bps = self.debug.breakpoints();
                let mut out = String::new();
                for addr in &bps {
                    let _ = writeln!(out, "{}", addr);
                }
                Ok(ConsoleOutcome::ok(out, Some(serde_json::to_value(&bps)?)))
            }
            Some(other) => Err(SessionError::InvalidInput(format!(
                "bp: unknown subcommand `{}`",
                other
            ))),
        }
    }
}

fn parse_addr(token: Option<&&str>, usage: &str) -> Result<Addr> {
    let token = token.ok_or_else(|| SessionError::InvalidInput(usage.to_string()))?;
    let value = if let Some(hex_digits) = token.strip_prefix("0x") {
        u64::from_str_radix(hex_digits, 16)
    } else {
        token.parse::<u64>()
    };
    value
        .map(Addr)
        .map_err(|_| SessionError::InvalidInput(format!("bad address `{}`", token)))
}

fn parse_job_id(token: Option<&&str>, usage: &str) -> Result<Uuid> {
    let token = token.ok_or_else(|| SessionError::InvalidInput(usage.to_string()))?;
    Uuid::parse_str(token)
        .map_err(|_| SessionError::InvalidInput(format!("bad job id `{}`", token)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_addr_formats() {
        assert_eq!(parse_addr(Some(&"0x1000"), "u").unwrap(), Addr(0x1000));
        assert_eq!(parse_addr(Some(&"4096"), "u").unwrap(), Addr(4096));
        assert!(parse_addr(Some(&"0xzz"), "u").is_err());
        assert!(parse_addr(None, "u").is_err());
    }

    #[test]
    fn test_command_table_has_no_duplicates() {
        let mut names: Vec<&str> = COMMANDS.iter().map(|c| c.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), COMMANDS.len());
    }
}

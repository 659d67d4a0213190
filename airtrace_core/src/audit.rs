//! Append-only audit log (component K).
//!
//! Each entry is chained to the previous one by `entry_hash =
//! sha256(event|message|detail|ts|build_id|config_id|role|prev_hash)`, so
//! a tampered or reordered log is detectable by recomputing the chain.
//! Where the source kept a process-wide singleton behind a global mutex,
//! `AuditLog` is an explicit handle a composition root constructs once
//! and shares; the single mutex is now `AuditLog`'s own interior
//! `Mutex<ChainState>` rather than a file-scope static.

use std::sync::Mutex;

use serde::Serialize;

use crate::hash::sha256_hex;

const MAX_AUDIT_BYTES: u64 = 5 * 1024 * 1024;

/// The append-only destination `AuditLog` writes JSONL records to. A
/// host provides the concrete sink (file, socket, in-memory buffer);
/// the core only ever calls `write_line`/`current_size`.
pub trait AuditSink: Send {
    fn write_line(&mut self, line: &str) -> Result<(), String>;
    fn current_size(&self) -> u64;
}

#[derive(Debug, Default)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn write_line(&mut self, _line: &str) -> Result<(), String> {
        Ok(())
    }

    fn current_size(&self) -> u64 {
        0
    }
}

/// An in-memory sink useful for tests and for hosts that buffer before
/// flushing elsewhere.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    pub lines: Vec<String>,
}

impl AuditSink for MemoryAuditSink {
    fn write_line(&mut self, line: &str) -> Result<(), String> {
        self.lines.push(line.to_string());
        Ok(())
    }

    fn current_size(&self) -> u64 {
        self.lines.iter().map(|l| l.len() as u64).sum()
    }
}

#[derive(Debug, Clone, Serialize)]
struct AuditRecord<'a> {
    ts: &'a str,
    event: &'a str,
    message: &'a str,
    detail: &'a str,
    build_id: &'a str,
    config_id: &'a str,
    role: &'a str,
    prev_hash: &'a str,
    entry_hash: &'a str,
}

struct ChainState {
    prev_hash: String,
    status: String,
    healthy: bool,
}

/// Status returned from a single `log` call. Mirrors the JSONL
/// `logging_status` surface rather than a thrown error: a failed audit
/// write never blocks tick processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditWriteStatus {
    pub ok: bool,
    pub status: String,
}

pub struct AuditLog<S: AuditSink> {
    sink: Mutex<S>,
    state: Mutex<ChainState>,
    build_id: String,
    config_id: String,
    role: String,
}

impl<S: AuditSink> AuditLog<S> {
    pub fn new(sink: S, build_id: impl Into<String>, config_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            sink: Mutex::new(sink),
            state: Mutex::new(ChainState { prev_hash: String::new(), status: "ok".to_string(), healthy: true }),
            build_id: build_id.into(),
            config_id: config_id.into(),
            role: role.into(),
        }
    }

    pub fn status(&self) -> String {
        self.state.lock().expect("audit chain mutex poisoned").status.clone()
    }

    pub fn healthy(&self) -> bool {
        self.state.lock().expect("audit chain mutex poisoned").healthy
    }

    fn entry_hash(&self, event: &str, message: &str, detail: &str, ts: &str, prev_hash: &str) -> String {
        let payload = format!("{event}|{message}|{detail}|{ts}|{}|{}|{}|{prev_hash}", self.build_id, self.config_id, self.role);
        sha256_hex(payload.as_bytes())
    }

    /// Appends one entry. `ts` is supplied by the caller (an RFC 3339
    /// UTC timestamp) rather than sampled internally, since this core
    /// never reads the wall clock directly.
    pub fn log(&self, event: &str, message: &str, detail: &str, ts: &str) -> AuditWriteStatus {
        let mut state = self.state.lock().expect("audit chain mutex poisoned");
        if !state.healthy {
            return AuditWriteStatus { ok: false, status: state.status.clone() };
        }

        let mut sink = self.sink.lock().expect("audit sink mutex poisoned");
        if sink.current_size() >= MAX_AUDIT_BYTES {
            state.healthy = false;
            state.status = "retention_exceeded".to_string();
            return AuditWriteStatus { ok: false, status: state.status.clone() };
        }

        let entry_hash = self.entry_hash(event, message, detail, ts, &state.prev_hash);
        let record = AuditRecord {
            ts,
            event,
            message,
            detail,
            build_id: &self.build_id,
            config_id: &self.config_id,
            role: &self.role,
            prev_hash: &state.prev_hash,
            entry_hash: &entry_hash,
        };
        let line = serde_json::to_string(&record).expect("AuditRecord always serializes");

        match sink.write_line(&line) {
            Ok(()) => {
                state.prev_hash = entry_hash;
                state.status = "ok".to_string();
                AuditWriteStatus { ok: true, status: "ok".to_string() }
            }
            Err(_) => {
                state.healthy = false;
                state.status = "write_failed".to_string();
                AuditWriteStatus { ok: false, status: state.status.clone() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_entry_chains_from_an_empty_prev_hash() {
        let log = AuditLog::new(MemoryAuditSink::default(), "build-1", "config-1", "operator");
        let status = log.log("mode_change", "switched to gps", "{}", "2026-01-01T00:00:00Z");
        assert!(status.ok);
        assert_eq!(status.status, "ok");
    }

    #[test]
    fn successive_entries_chain_to_the_previous_hash() {
        let log = AuditLog::new(MemoryAuditSink::default(), "build-1", "config-1", "operator");
        log.log("a", "first", "", "2026-01-01T00:00:00Z");
        log.log("b", "second", "", "2026-01-01T00:00:01Z");

        let sink = log.sink.lock().unwrap();
        let first: serde_json::Value = serde_json::from_str(&sink.lines[0]).unwrap();
        let second: serde_json::Value = serde_json::from_str(&sink.lines[1]).unwrap();
        assert_eq!(first["prev_hash"], "");
        assert_eq!(second["prev_hash"], first["entry_hash"]);
    }

    #[derive(Default)]
    struct FailingSink;

    impl AuditSink for FailingSink {
        fn write_line(&mut self, _line: &str) -> Result<(), String> {
            Err("disk full".to_string())
        }

        fn current_size(&self) -> u64 {
            0
        }
    }

    #[test]
    fn write_failure_marks_the_log_unhealthy_and_stops_further_writes() {
        let log = AuditLog::new(FailingSink, "build-1", "config-1", "operator");
        let first = log.log("a", "first", "", "2026-01-01T00:00:00Z");
        assert!(!first.ok);
        assert_eq!(first.status, "write_failed");
        assert!(!log.healthy());

        let second = log.log("b", "second", "", "2026-01-01T00:00:01Z");
        assert!(!second.ok);
        assert_eq!(second.status, "write_failed");
    }
}

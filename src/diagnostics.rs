//! Diagnostic sink for component lifecycles (v0.1)
//!
//! Thread-safe, append-only log of lifecycle observations. Background setup
//! failures land here so they are never lost even when no consumer ever
//! awaits an output.
//!
//! - `Diagnostic`: envelope with id + timestamp + kind
//! - `DiagnosticKind`: registration, dispatch, success, failure, omission
//! - `DiagnosticLog`: thread-safe, append-only log

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Single entry in the lifecycle diagnostic log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Monotonic sequence ID (for ordering)
    pub id: u64,
    /// Time since the log was created (ms)
    pub timestamp_ms: u64,
    /// What happened
    pub kind: DiagnosticKind,
}

/// How a setup routine is dispatched
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SetupMode {
    Sync,
    Async,
}

/// All diagnostic kinds.
///
/// Uses `Arc<str>` for urn fields to enable zero-cost cloning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiagnosticKind {
    ComponentRegistered {
        urn: Arc<str>,
    },
    SetupDispatched {
        urn: Arc<str>,
        mode: SetupMode,
    },
    SetupSucceeded {
        urn: Arc<str>,
        /// Declared outputs bound from the setup result
        bound: usize,
    },
    /// A background setup routine failed; recorded exactly once per failure.
    SetupFailed {
        urn: Arc<str>,
        error: String,
    },
    /// Setup succeeded but did not produce this declared output.
    OutputOmitted {
        urn: Arc<str>,
        output: String,
    },
}

impl DiagnosticKind {
    pub fn urn(&self) -> &str {
        match self {
            Self::ComponentRegistered { urn }
            | Self::SetupDispatched { urn, .. }
            | Self::SetupSucceeded { urn, .. }
            | Self::SetupFailed { urn, .. }
            | Self::OutputOmitted { urn, .. } => urn,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::SetupFailed { .. })
    }
}

/// Thread-safe, append-only diagnostic log
#[derive(Clone)]
pub struct DiagnosticLog {
    entries: Arc<RwLock<Vec<Diagnostic>>>,
    start: Instant,
    next_id: Arc<AtomicU64>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            start: Instant::now(),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Record a diagnostic (thread-safe, returns entry ID)
    pub fn record(&self, kind: DiagnosticKind) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let entry = Diagnostic {
            id,
            timestamp_ms: self.start.elapsed().as_millis() as u64,
            kind,
        };

        self.entries.write().push(entry);
        id
    }

    /// All entries (cloned)
    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries.read().clone()
    }

    /// Entries for one entity
    pub fn for_entity(&self, urn: &str) -> Vec<Diagnostic> {
        self.entries()
            .into_iter()
            .filter(|d| d.kind.urn() == urn)
            .collect()
    }

    /// Setup failures only
    pub fn failures(&self) -> Vec<Diagnostic> {
        self.entries()
            .into_iter()
            .filter(|d| d.kind.is_failure())
            .collect()
    }

    /// Serialize to JSON for persistence/debugging
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self.entries()).unwrap_or(Value::Null)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DiagnosticLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosticLog")
            .field("len", &self.len())
            .finish()
    }
}

use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use thiserror::Error;

/// Severity levels honored by the pipeline logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured events the pipeline logs. An enum rather than free-form
/// strings so every operational event carries its identifying context.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineLogEvent {
    Startup {
        config_path: String,
        partitions: u32,
        ttl_seconds: u64,
    },
    ValidationSkip {
        partition_id: String,
        offset: u64,
        detail: String,
    },
    DuplicateSkip {
        partition_id: String,
        offset: u64,
        event_id: String,
    },
    FetchRetry {
        partition_id: String,
        attempt: u32,
        delay_ms: u64,
        detail: String,
    },
    ConflictExhausted {
        partition_id: String,
        entity_id: String,
        attempted_version: u64,
    },
    IngestHalt {
        partition_id: String,
        detail: String,
    },
    StopRequested {
        partition_id: String,
        last_committed_offset: Option<u64>,
    },
}

impl PipelineLogEvent {
    fn level(&self) -> LogLevel {
        match self {
            PipelineLogEvent::Startup { .. } | PipelineLogEvent::StopRequested { .. } => {
                LogLevel::Info
            }
            PipelineLogEvent::ValidationSkip { .. }
            | PipelineLogEvent::DuplicateSkip { .. }
            | PipelineLogEvent::FetchRetry { .. } => LogLevel::Warn,
            PipelineLogEvent::ConflictExhausted { .. } | PipelineLogEvent::IngestHalt { .. } => {
                LogLevel::Error
            }
        }
    }
}

/// Rotation policy (default 64 MiB x 8 segments).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRotationPolicy {
    pub max_bytes: usize,
    pub max_segments: usize,
}

impl Default for LogRotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: 64 << 20,
            max_segments: 8,
        }
    }
}

/// Lines accumulated in one rotated segment.
#[derive(Debug, Default, Clone)]
pub struct LogSegment {
    lines: Vec<String>,
    bytes_written: usize,
}

impl LogSegment {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }
}

/// JSON-line logger with deterministic size-based rotation. The ingest
/// loop records skip, retry, and halt events through it.
#[derive(Debug, Clone)]
pub struct JsonLineLogger {
    policy: LogRotationPolicy,
    min_level: LogLevel,
    rotated: VecDeque<LogSegment>,
    active: LogSegment,
}

impl Default for JsonLineLogger {
    fn default() -> Self {
        Self::new(LogRotationPolicy::default())
    }
}

impl JsonLineLogger {
    pub fn new(policy: LogRotationPolicy) -> Self {
        Self {
            policy,
            min_level: LogLevel::Info,
            rotated: VecDeque::new(),
            active: LogSegment::default(),
        }
    }

    pub fn min_level(&self) -> LogLevel {
        self.min_level
    }

    /// Applies a dynamic log-level override.
    pub fn set_min_level(&mut self, level: LogLevel) {
        self.min_level = level;
    }

    /// Serializes and records one pipeline event.
    pub fn record(&mut self, ts_ms: u64, event: &PipelineLogEvent) -> Result<(), LoggingError> {
        let level = event.level();
        if level < self.min_level {
            return Ok(());
        }
        let line = serde_json::to_string(&Envelope {
            ts: ts_ms,
            level: level.as_str(),
            body: event,
        })
        .map_err(LoggingError::Serialize)?;
        self.rotate_if_needed(line.len());
        self.active.bytes_written = self.active.bytes_written.saturating_add(line.len());
        self.active.lines.push(line);
        Ok(())
    }

    /// Rotated history followed by the active segment.
    pub fn segments(&self) -> impl Iterator<Item = &LogSegment> {
        self.rotated.iter().chain(std::iter::once(&self.active))
    }

    fn rotate_if_needed(&mut self, next_line_len: usize) {
        if self.active.bytes_written + next_line_len <= self.policy.max_bytes {
            return;
        }
        if !self.active.lines.is_empty() {
            self.rotated.push_back(std::mem::take(&mut self.active));
            while self.rotated.len() > self.policy.max_segments {
                self.rotated.pop_front();
            }
        }
        self.active = LogSegment::default();
    }
}

/// Errors surfaced while serializing JSON-line logs.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to serialize log record: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct Envelope<'a> {
    ts: u64,
    level: &'a str,
    #[serde(flatten)]
    body: &'a PipelineLogEvent,
}

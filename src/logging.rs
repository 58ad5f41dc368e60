//! Structured engine events, delivered through an injected sink rather than
//! a process-wide mutable logger. `LogEvent`/`LogLevel`/`EventLog` carry
//! pool, volume, and logical-path context instead of extent/inode fields.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sink::LogSink;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub component: String,
    pub message: String,
    pub context: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl LogEvent {
    pub fn new(component: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        LogEvent {
            timestamp: Utc::now(),
            level,
            component: component.into(),
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn to_text(&self) -> String {
        let mut output = format!(
            "[{}] {} {}: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.level,
            self.component,
            self.message
        );
        if let Some(context) = &self.context {
            output.push_str(&format!(" context={}", context));
        }
        output
    }
}

/// A bounded ring buffer of events — a ready-made [`LogSink`] for callers
/// who want to inspect engine activity without wiring up the `log` facade.
pub struct EventLogSink {
    events: Mutex<Vec<LogEvent>>,
    max_size: usize,
}

impl EventLogSink {
    pub fn new(max_size: usize) -> Self {
        EventLogSink {
            events: Mutex::new(Vec::new()),
            max_size,
        }
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl LogSink for EventLogSink {
    fn emit(&self, event: LogEvent) {
        let mut events = self.events.lock().unwrap();
        events.push(event);
        if events.len() > self.max_size {
            events.remove(0);
        }
    }
}

/// Bridges engine events onto the `log` facade (`log::info!`/`warn!`/etc.),
/// for callers that already have a `log`-compatible subscriber installed
/// (e.g. `env_logger`).
pub struct LogCrateSink;

impl LogSink for LogCrateSink {
    fn emit(&self, event: LogEvent) {
        let target = event.component.clone();
        match event.level {
            LogLevel::Debug => log::debug!(target: "pool_engine", "[{target}] {}", event.message),
            LogLevel::Info => log::info!(target: "pool_engine", "[{target}] {}", event.message),
            LogLevel::Warn => log::warn!(target: "pool_engine", "[{target}] {}", event.message),
            LogLevel::Error => log::error!(target: "pool_engine", "[{target}] {}", event.message),
        }
    }
}

//! Structured event sink the orchestrator logs through.

use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

/// Receives orchestrator events as a message plus key/value fields.
pub trait EventSink: Send + Sync {
    fn log(&self, level: Level, message: &str, fields: &[(&str, String)]);
}

/// Forwards events to `tracing`, fields rendered as `key=value`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn log(&self, level: Level, message: &str, fields: &[(&str, String)]) {
        let fields = render_fields(fields);
        match level {
            Level::Debug => tracing::debug!(%fields, "{message}"),
            Level::Info => tracing::info!(%fields, "{message}"),
            Level::Warn => tracing::warn!(%fields, "{message}"),
            Level::Error => tracing::error!(%fields, "{message}"),
        }
    }
}

fn render_fields(fields: &[(&str, String)]) -> String {
    fields
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// A recorded event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub level: Level,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

impl Event {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl EventSink for MemorySink {
    fn log(&self, level: Level, message: &str, fields: &[(&str, String)]) {
        if let Ok(mut events) = self.events.lock() {
            events.push(Event {
                level,
                message: message.to_string(),
                fields: fields.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            });
        }
    }
}

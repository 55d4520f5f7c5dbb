//! Append-only log of one pipeline run.
//!
//! Every prompt, response, informational note and error of a run lands here
//! as a [`LogEntry`]. Entries are never mutated after they are appended;
//! observers receive each one through [`Event::Log`](crate::events::Event::Log)
//! at the moment it is appended, so they always see a prefix of the final
//! sequence.

use crate::backend::{ProviderId, TokenUsage};
use crate::events::{emit, Event, EventHandler};
use crate::stage::Stage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// What a log entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Prompt,
    Response,
    Info,
    Error,
}

/// One entry in a run's log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub stage: Stage,
    pub kind: LogKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,

    /// Round-trip time, for response entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Token accounting, for response entries whose provider reported it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,

    /// Provider the request went to, for prompt and response entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderId>,

    /// Model the request went to, for prompt and response entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl LogEntry {
    pub fn new(stage: Stage, kind: LogKind, content: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            content: content.into(),
            timestamp: Utc::now(),
            duration_ms: None,
            usage: None,
            provider: None,
            model: None,
        }
    }

    /// Tag the entry with the request target.
    pub fn with_target(mut self, provider: ProviderId, model: impl Into<String>) -> Self {
        self.provider = Some(provider);
        self.model = Some(model.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = Some(duration.as_millis() as u64);
        self
    }

    pub fn with_usage(mut self, usage: Option<TokenUsage>) -> Self {
        self.usage = usage;
        self
    }
}

/// The ordered log sequence of one run, forwarding appends to an observer.
#[derive(Default)]
pub struct RunLog {
    entries: Vec<LogEntry>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl RunLog {
    pub fn new(event_handler: Option<Arc<dyn EventHandler>>) -> Self {
        Self {
            entries: Vec::new(),
            event_handler,
        }
    }

    /// Append an entry and forward a copy to the observer.
    pub fn append(&mut self, entry: LogEntry) {
        emit(&self.event_handler, Event::Log(entry.clone()));
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries of one kind, in append order.
    pub fn of_kind(&self, kind: LogKind) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(move |e| e.kind == kind)
    }

    pub(crate) fn event_handler(&self) -> &Option<Arc<dyn EventHandler>> {
        &self.event_handler
    }
}

impl std::fmt::Debug for RunLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLog")
            .field("entries", &self.entries.len())
            .field("has_event_handler", &self.event_handler.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::FnEventHandler;
    use parking_lot::Mutex;

    #[test]
    fn test_append_forwards_to_observer_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler = Arc::new(FnEventHandler(move |event: Event| {
            if let Event::Log(entry) = event {
                sink.lock().push(entry.content);
            }
        }));

        let mut log = RunLog::new(Some(handler));
        log.append(LogEntry::new(Stage::Analyst, LogKind::Prompt, "p"));
        log.append(LogEntry::new(Stage::Analyst, LogKind::Response, "r"));

        assert_eq!(log.len(), 2);
        assert_eq!(*seen.lock(), vec!["p".to_string(), "r".to_string()]);
    }

    #[test]
    fn test_entry_builders() {
        let entry = LogEntry::new(Stage::Coder, LogKind::Response, "ok")
            .with_target(ProviderId::Gemini, "gemini-2.5-pro")
            .with_duration(Duration::from_millis(1500))
            .with_usage(Some(TokenUsage::new(10, 20, 30)));
        assert_eq!(entry.duration_ms, Some(1500));
        assert_eq!(entry.usage.map(|u| u.total), Some(30));
        assert_eq!(entry.model.as_deref(), Some("gemini-2.5-pro"));

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["kind"], "response");
        assert_eq!(json["stage"], "coder");
        assert_eq!(json["provider"], "gemini");
    }

    #[test]
    fn test_of_kind_filters() {
        let mut log = RunLog::default();
        log.append(LogEntry::new(Stage::Coder, LogKind::Info, "a"));
        log.append(LogEntry::new(Stage::Coder, LogKind::Error, "b"));
        log.append(LogEntry::new(Stage::Auditor, LogKind::Info, "c"));
        assert_eq!(log.of_kind(LogKind::Info).count(), 2);
        assert_eq!(log.of_kind(LogKind::Error).count(), 1);
    }
}

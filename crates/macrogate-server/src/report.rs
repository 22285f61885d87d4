//! In-memory report log served by `get_report`.
//!
//! [`ReportLayer`] is a `tracing-subscriber` layer that formats every event
//! into one line and appends it to a bounded [`ReportLog`]. The oldest lines
//! fall off once the log is full.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Bounded, shareable buffer of recent log lines.
#[derive(Debug, Clone)]
pub struct ReportLog {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl Default for ReportLog {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl ReportLog {
    /// Lines kept when no capacity is configured.
    pub const DEFAULT_CAPACITY: usize = 100;

    /// A log keeping at most `capacity` lines (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Maximum number of lines kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a line, dropping the oldest if full.
    pub fn push(&self, line: impl Into<String>) {
        let mut lines = self.lock();
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line.into());
    }

    /// Copy of the current lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }

    /// The current lines joined with newlines.
    pub fn snapshot(&self) -> String {
        let lines = self.lock();
        let mut out = String::new();
        for (i, line) in lines.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(line);
        }
        out
    }

    /// Number of lines held.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every line.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<String>> {
        match self.lines.lock() {
            Ok(lines) => lines,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Mirrors formatted events into a [`ReportLog`].
#[derive(Debug, Clone)]
pub struct ReportLayer {
    log: ReportLog,
}

impl ReportLayer {
    /// Write into `log`.
    pub fn new(log: ReportLog) -> Self {
        Self { log }
    }
}

impl<S> Layer<S> for ReportLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);

        let mut line = format!(
            "{} {} {}: {}",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            meta.level(),
            meta.target(),
            visitor.message
        );
        for (name, value) in &visitor.fields {
            let _ = write!(line, " {name}={value}");
        }
        self.log.push(line);
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: Vec<(&'static str, String)>,
}

impl Visit for LineVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields.push((field.name(), format!("{value:?}")));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push((field.name(), value.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn keeps_only_the_newest_lines() {
        let log = ReportLog::new(3);
        for i in 0..5 {
            log.push(format!("line {i}"));
        }
        assert_eq!(log.lines(), vec!["line 2", "line 3", "line 4"]);
        assert_eq!(log.snapshot(), "line 2\nline 3\nline 4");
    }

    #[test]
    fn zero_capacity_keeps_one_line() {
        let log = ReportLog::new(0);
        log.push("a");
        log.push("b");
        assert_eq!(log.capacity(), 1);
        assert_eq!(log.snapshot(), "b");
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn layer_records_message_and_fields() {
        let log = ReportLog::new(10);
        let subscriber = tracing_subscriber::registry().with(ReportLayer::new(log.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(peer = "127.0.0.1:5000", bytes = 12, "connection accepted");
            tracing::warn!("limit reached");
        });

        let lines = log.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("INFO"), "{}", lines[0]);
        assert!(lines[0].contains("connection accepted"), "{}", lines[0]);
        assert!(lines[0].contains("peer=127.0.0.1:5000"), "{}", lines[0]);
        assert!(lines[0].contains("bytes=12"), "{}", lines[0]);
        assert!(lines[1].contains("WARN"), "{}", lines[1]);
        assert!(lines[1].ends_with("limit reached"), "{}", lines[1]);
    }
}

//! `tracing` bridge.
//!
//! [`CglogLayer`] forwards events from the host application's `tracing`
//! subscriber into a [`Logger`], so libraries that speak `tracing` end up in
//! the same leveled files as direct calls.

use std::fmt::Write as FmtWrite;

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use crate::format::Body;
use crate::logger::Logger;
use crate::severity::Severity;

/// Events from this crate are the engine's own diagnostics, emitted while
/// the write lock may be held.
const ENGINE_TARGET: &str = "cglog_core";

/// A tracing Layer that writes events through a [`Logger`].
#[derive(Debug, Clone)]
pub struct CglogLayer {
    logger: Logger,
}

impl CglogLayer {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }

    /// Layer writing to the process-wide default logger.
    pub fn for_default() -> Self {
        Self::new(crate::default_logger().clone())
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }
}

/// Map a tracing level onto a severity. Debug and trace have no lower tier
/// to go to and land in INFO.
pub fn severity_for(level: &Level) -> Severity {
    match *level {
        Level::ERROR => Severity::Error,
        Level::WARN => Severity::Warning,
        _ => Severity::Info,
    }
}

fn is_engine_target(target: &str) -> bool {
    target
        .strip_prefix(ENGINE_TARGET)
        .map(|rest| rest.is_empty() || rest.starts_with("::"))
        .unwrap_or(false)
}

impl<S> Layer<S> for CglogLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if is_engine_target(metadata.target()) {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let mut text = String::new();
        if let Some(scope) = ctx.event_scope(event) {
            let spans: Vec<&str> = scope.from_root().map(|span| span.name()).collect();
            if !spans.is_empty() {
                let _ = write!(text, "[{}] ", spans.join(" > "));
            }
        }
        text.push_str(visitor.message.as_deref().unwrap_or_default());
        for (name, value) in &visitor.fields {
            if !text.is_empty() {
                text.push(' ');
            }
            let _ = write!(text, "{name}={value}");
        }

        let file = metadata.file().unwrap_or(metadata.target());
        let line = metadata.line().unwrap_or(0);
        self.logger
            .log_at(severity_for(metadata.level()), file, line, Body::Text(&text));
    }
}

/// Collects the message and the remaining fields in declaration order.
#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Vec<(&'static str, String)>,
}

impl FieldVisitor {
    fn push(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields.push((field.name(), value));
        }
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.push(field, format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.push(field, value.to_string());
        } else {
            self.push(field, format!("{value:?}"));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, value.to_string());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.push(field, value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::hooks::Hooks;
    use tempfile::TempDir;
    use tracing_subscriber::prelude::*;

    fn read(logger: &Logger, severity: Severity) -> String {
        logger.flush();
        logger
            .current_file(severity)
            .map(|p| std::fs::read_to_string(p).unwrap())
            .unwrap_or_default()
    }

    #[test]
    fn test_level_mapping() {
        assert_eq!(severity_for(&Level::ERROR), Severity::Error);
        assert_eq!(severity_for(&Level::WARN), Severity::Warning);
        assert_eq!(severity_for(&Level::INFO), Severity::Info);
        assert_eq!(severity_for(&Level::DEBUG), Severity::Info);
        assert_eq!(severity_for(&Level::TRACE), Severity::Info);
    }

    #[test]
    fn test_engine_targets_are_recognized() {
        assert!(is_engine_target("cglog_core"));
        assert!(is_engine_target("cglog_core::sink::file"));
        assert!(!is_engine_target("cglog_core_ext"));
        assert!(!is_engine_target("app::net"));
    }

    #[test]
    fn test_layer_forwards_events() {
        let temp = TempDir::new().unwrap();
        let hooks = Hooks::default().with_console(std::io::sink());
        let logger = Logger::with_hooks(Config::in_dir(temp.path()), hooks).unwrap();

        let subscriber = tracing_subscriber::registry().with(CglogLayer::new(logger.clone()));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "app", "plain message");
            tracing::warn!(target: "app", count = 42, peer = "alpha", "with fields");
            let span = tracing::info_span!(target: "app", "sync");
            let _entered = span.enter();
            tracing::error!(target: "app", "inside span");
            tracing::warn!(target: "cglog_core::sink", "engine diagnostic");
        });

        let info = read(&logger, Severity::Info);
        assert!(info.contains("bridge.rs:"));
        assert!(info.contains("] plain message\n"));
        assert!(info.contains("] with fields count=42 peer=\"alpha\"\n"));
        assert!(info.contains("] [sync] inside span\n"));
        assert!(!info.contains("engine diagnostic"));

        let warning = read(&logger, Severity::Warning);
        assert!(warning.contains("with fields"));
        assert!(!warning.contains("plain message"));

        let error = read(&logger, Severity::Error);
        assert!(error.contains("inside span"));
        assert!(!error.contains("with fields"));
    }
}

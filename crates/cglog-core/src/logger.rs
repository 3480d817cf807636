//! Dispatch core.
//!
//! Every public logging call funnels into [`Logger::log_at`]:
//!
//! 1. V-gated calls are decided first by [`Logger::v`]; a suppressed call
//!    never formats its arguments.
//! 2. The message body is rendered outside any lock, so `Display` impls that
//!    themselves log cannot deadlock. A panicking `Display` is replaced by a
//!    marker, so the record is still written and a fatal call still exits.
//! 3. Under the write lock the timestamp is taken, the line prefix rendered,
//!    and the record routed to the console and cascaded through the files,
//!    rotating as needed. One record is one critical section, so lines are
//!    never interleaved and a cascade is never split by a rotation.
//! 4. Fatal records additionally dump stacks into the files, flush every
//!    sink and terminate the process with [`FATAL_EXIT_CODE`].

use std::fmt;
use std::panic::{self, AssertUnwindSafe, Location};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::config::Config;
use crate::daemon::{Flush, FlushDaemon};
use crate::error::LogResult;
use crate::format::{Body, LogRecord, Operand};
use crate::hooks::{Clock, Hooks, ProcessIdentity, StackDumper, Terminator};
use crate::severity::Severity;
use crate::sink::SinkManager;
use crate::verbosity::{TraceLocation, Verbosity, VerbosityState};

/// Exit status of the process after a fatal record.
pub const FATAL_EXIT_CODE: i32 = 255;

/// Lines and bytes written at one severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputStats {
    pub lines: u64,
    pub bytes: u64,
}

#[derive(Default)]
struct StatCounter {
    lines: AtomicU64,
    bytes: AtomicU64,
}

impl StatCounter {
    fn add(&self, bytes: usize) {
        self.lines.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn snapshot(&self) -> OutputStats {
        OutputStats {
            lines: self.lines.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

/// Where records go besides the files.
#[derive(Debug, Clone, Copy)]
struct Routing {
    to_console: bool,
    also_to_console: bool,
    stderr_threshold: Severity,
}

impl Routing {
    fn from_config(config: &Config) -> Self {
        Self {
            to_console: config.to_console,
            also_to_console: config.also_to_console,
            stderr_threshold: config.stderr_threshold,
        }
    }
}

/// State guarded by the write lock.
struct Output {
    sinks: SinkManager,
    routing: Routing,
}

impl Output {
    fn emit(&mut self, severity: Severity, bytes: &[u8], identity: &ProcessIdentity, record: &LogRecord<'_>) {
        if self.routing.to_console {
            self.sinks.write_console(bytes);
            return;
        }

        let echoed = self.routing.also_to_console || severity >= self.routing.stderr_threshold;
        if echoed {
            self.sinks.write_console(bytes);
        }
        if self
            .sinks
            .write_files(severity, bytes, identity, &record.timestamp)
            .is_err()
            && !echoed
        {
            self.sinks.write_console(bytes);
        }
    }
}

struct Inner {
    verbosity: Verbosity,
    output: Mutex<Output>,
    stats: [StatCounter; Severity::COUNT],
    clock: Arc<dyn Clock>,
    stacks: Arc<dyn StackDumper>,
    terminator: Arc<dyn Terminator>,
    identity: ProcessIdentity,
    flush_interval: Mutex<std::time::Duration>,
    daemon: Mutex<Option<FlushDaemon>>,
}

impl Flush for Inner {
    fn flush(&self) {
        let result = self.output.lock().sinks.flush();
        if let Err(e) = result {
            tracing::warn!(error = %e, "log flush failed");
        }
    }
}

/// A logging engine: verbosity state, sinks, flush daemon.
///
/// Cloning is cheap and yields a handle to the same engine. The process-wide
/// default instance is reachable through the crate-level functions; tests
/// and embedding applications can build independent instances.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<Inner>,
}

impl Logger {
    /// Build an engine and start its flush daemon.
    pub fn new(config: Config) -> LogResult<Self> {
        Self::with_hooks(config, Hooks::default())
    }

    /// Like [`Logger::new`], with injected collaborators.
    pub fn with_hooks(config: Config, hooks: Hooks) -> LogResult<Self> {
        let logger = Self::build(&config, hooks);
        logger.start_flush_daemon()?;
        Ok(logger)
    }

    /// An engine with default settings and no flush daemon.
    pub fn unconfigured() -> Self {
        Self::build(&Config::default(), Hooks::default())
    }

    fn build(config: &Config, hooks: Hooks) -> Self {
        let Hooks {
            clock,
            stacks,
            terminator,
            console,
            identity,
        } = hooks;

        Self {
            inner: Arc::new(Inner {
                verbosity: Verbosity::new(config.verbosity_state()),
                output: Mutex::new(Output {
                    sinks: SinkManager::new(config.log_dirs.clone(), config.max_size, console),
                    routing: Routing::from_config(config),
                }),
                stats: Default::default(),
                clock,
                stacks,
                terminator,
                identity,
                flush_interval: Mutex::new(config.flush_interval),
                daemon: Mutex::new(None),
            }),
        }
    }

    /// Replace the whole configuration. Open files are flushed and closed;
    /// the next record opens files under the new settings. A running flush
    /// daemon is restarted when the interval changes.
    pub fn apply(&self, config: Config) {
        self.inner.verbosity.replace(config.verbosity_state());
        {
            let mut output = self.inner.output.lock();
            output.routing = Routing::from_config(&config);
            output.sinks.reconfigure(config.log_dirs.clone(), config.max_size);
        }
        let previous = std::mem::replace(&mut *self.inner.flush_interval.lock(), config.flush_interval);
        if previous != config.flush_interval {
            self.restart_flush_daemon();
        }
    }

    fn restart_flush_daemon(&self) {
        let mut daemon = self.inner.daemon.lock();
        if !daemon.as_ref().map(FlushDaemon::is_running).unwrap_or(false) {
            return;
        }
        // Joins the old thread before the new one starts.
        drop(daemon.take());
        let interval = *self.inner.flush_interval.lock();
        match FlushDaemon::spawn(interval, Arc::downgrade(&self.inner)) {
            Ok(started) => *daemon = Some(started),
            Err(e) => tracing::warn!(error = %e, "cannot restart flush daemon"),
        }
    }

    /// Period of the running flush daemon, if any.
    pub fn flush_daemon_interval(&self) -> Option<std::time::Duration> {
        self.inner
            .daemon
            .lock()
            .as_ref()
            .filter(|d| d.is_running())
            .map(FlushDaemon::interval)
    }

    /// Flush unless the write lock is busy. For contexts such as a panic
    /// hook, where the panicking thread may already hold it.
    pub fn try_flush(&self) -> bool {
        match self.inner.output.try_lock() {
            Some(mut output) => output.sinks.flush().is_ok(),
            None => false,
        }
    }

    /// Start the periodic flush if it is not already running.
    pub fn start_flush_daemon(&self) -> LogResult<()> {
        let mut daemon = self.inner.daemon.lock();
        if daemon.as_ref().map(FlushDaemon::is_running).unwrap_or(false) {
            return Ok(());
        }
        let interval = *self.inner.flush_interval.lock();
        *daemon = Some(FlushDaemon::spawn(interval, Arc::downgrade(&self.inner))?);
        Ok(())
    }

    pub fn is_flush_daemon_running(&self) -> bool {
        self.inner
            .daemon
            .lock()
            .as_ref()
            .map(FlushDaemon::is_running)
            .unwrap_or(false)
    }

    /// Stop the flush daemon, flush and close every file.
    pub fn shutdown(&self) {
        let daemon = self.inner.daemon.lock().take();
        drop(daemon);
        self.inner.output.lock().sinks.close();
    }

    /// Force buffered records to durable storage.
    pub fn flush(&self) {
        Flush::flush(&*self.inner);
    }

    /// Lines and bytes logged at `severity`.
    pub fn stats(&self, severity: Severity) -> OutputStats {
        self.inner.stats[severity.index()].snapshot()
    }

    /// Current file backing `severity`, if one is open.
    pub fn current_file(&self, severity: Severity) -> Option<PathBuf> {
        self.inner.output.lock().sinks.current_path(severity)
    }

    pub fn identity(&self) -> &ProcessIdentity {
        &self.inner.identity
    }

    // ---- verbosity ----

    /// Set the global V level.
    pub fn set_verbosity(&self, level: u32) {
        self.inner.verbosity.set_level(level);
    }

    pub fn verbosity(&self) -> u32 {
        self.inner.verbosity.level()
    }

    /// Replace the per-file override table from a `pattern=N,...` spec.
    /// A malformed list leaves the previous table in place.
    pub fn set_vmodule(&self, spec: &str) -> LogResult<()> {
        self.inner.verbosity.set_vmodule(spec)
    }

    pub fn set_trace_location(&self, location: Option<TraceLocation>) {
        self.inner.verbosity.set_trace_location(location);
    }

    pub fn verbosity_state(&self) -> VerbosityState {
        self.inner.verbosity.snapshot()
    }

    /// Whether a V-`level` call from `file` would be emitted.
    pub fn should_log(&self, file: &str, level: u32) -> bool {
        self.inner.verbosity.should_log(file, level)
    }

    /// Gate for V-leveled records from the calling source file.
    #[track_caller]
    pub fn v(&self, level: u32) -> Verbose<'_> {
        let enabled = self.should_log(Location::caller().file(), level);
        Verbose {
            logger: enabled.then_some(self),
        }
    }

    // ---- dispatch ----

    /// Log a record attributed to `file:line`.
    pub fn log_at(&self, severity: Severity, file: &str, line: u32, body: Body<'_>) {
        if severity == Severity::Fatal {
            self.fatal_at(file, line, body);
        }
        let _output = self.write_record(severity, file, line, body);
    }

    /// Log a fatal record, dump stacks, flush and terminate.
    pub fn fatal_at(&self, file: &str, line: u32, body: Body<'_>) -> ! {
        let mut output = self.write_record(Severity::Fatal, file, line, body);

        let dump = panic::catch_unwind(AssertUnwindSafe(|| self.inner.stacks.all())).unwrap_or_default();
        if !dump.is_empty() {
            if output.routing.to_console {
                output.sinks.write_console(dump.as_bytes());
            } else {
                let now = self.inner.clock.now();
                let _ = output
                    .sinks
                    .write_files(Severity::Fatal, dump.as_bytes(), &self.inner.identity, &now);
            }
        }
        let _ = output.sinks.flush();

        // The write lock stays held: nothing may be logged after this record.
        self.inner.terminator.terminate(FATAL_EXIT_CODE)
    }

    fn write_record(&self, severity: Severity, file: &str, line: u32, body: Body<'_>) -> MutexGuard<'_, Output> {
        let mut message = body.to_message_caught();
        if self.inner.verbosity.is_trace_point(file, line) {
            if !message.ends_with('\n') {
                message.push('\n');
            }
            if let Ok(trace) = panic::catch_unwind(AssertUnwindSafe(|| self.inner.stacks.current())) {
                message.push_str(&trace);
            }
        }

        let mut output = self.inner.output.lock();
        let record = LogRecord {
            severity,
            timestamp: self.inner.clock.now(),
            file,
            line,
            pid: self.inner.identity.pid,
            message: &message,
        };
        let bytes = record.render();
        output.emit(severity, &bytes, &self.inner.identity, &record);
        self.inner.stats[severity.index()].add(bytes.len());
        output
    }

    #[track_caller]
    fn dispatch(&self, severity: Severity, body: Body<'_>) {
        let caller = Location::caller();
        self.log_at(severity, caller.file(), caller.line(), body);
    }

    #[track_caller]
    fn dispatch_fatal(&self, body: Body<'_>) -> ! {
        let caller = Location::caller();
        self.fatal_at(caller.file(), caller.line(), body)
    }

    // ---- entry points ----

    /// Logs to the INFO log. Operands are joined print-style.
    #[track_caller]
    pub fn info(&self, args: &[&dyn Operand]) {
        self.dispatch(Severity::Info, Body::Print(args));
    }

    /// Logs to the INFO log. Operands are space separated.
    #[track_caller]
    pub fn infoln(&self, args: &[&dyn Operand]) {
        self.dispatch(Severity::Info, Body::Println(args));
    }

    /// Logs to the INFO log from a `format_args!` template.
    #[track_caller]
    pub fn infof(&self, args: fmt::Arguments<'_>) {
        self.dispatch(Severity::Info, Body::Printf(args));
    }

    /// Logs to the WARNING and INFO logs.
    #[track_caller]
    pub fn warning(&self, args: &[&dyn Operand]) {
        self.dispatch(Severity::Warning, Body::Print(args));
    }

    #[track_caller]
    pub fn warningln(&self, args: &[&dyn Operand]) {
        self.dispatch(Severity::Warning, Body::Println(args));
    }

    #[track_caller]
    pub fn warningf(&self, args: fmt::Arguments<'_>) {
        self.dispatch(Severity::Warning, Body::Printf(args));
    }

    /// Logs to the ERROR, WARNING and INFO logs.
    #[track_caller]
    pub fn error(&self, args: &[&dyn Operand]) {
        self.dispatch(Severity::Error, Body::Print(args));
    }

    #[track_caller]
    pub fn errorln(&self, args: &[&dyn Operand]) {
        self.dispatch(Severity::Error, Body::Println(args));
    }

    #[track_caller]
    pub fn errorf(&self, args: fmt::Arguments<'_>) {
        self.dispatch(Severity::Error, Body::Printf(args));
    }

    /// Logs to every log, including a stack dump, then exits with
    /// [`FATAL_EXIT_CODE`].
    #[track_caller]
    pub fn fatal(&self, args: &[&dyn Operand]) -> ! {
        self.dispatch_fatal(Body::Print(args))
    }

    #[track_caller]
    pub fn fatalln(&self, args: &[&dyn Operand]) -> ! {
        self.dispatch_fatal(Body::Println(args))
    }

    #[track_caller]
    pub fn fatalf(&self, args: fmt::Arguments<'_>) -> ! {
        self.dispatch_fatal(Body::Printf(args))
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("identity", &self.inner.identity)
            .field("verbosity", &self.inner.verbosity.level())
            .finish_non_exhaustive()
    }
}

/// Result of a V-level check. Logging through a disabled `Verbose` is a
/// no-op that never looks at its arguments.
#[derive(Debug, Clone, Copy)]
pub struct Verbose<'a> {
    logger: Option<&'a Logger>,
}

impl Verbose<'_> {
    pub fn enabled(&self) -> bool {
        self.logger.is_some()
    }

    #[track_caller]
    pub fn info(&self, args: &[&dyn Operand]) {
        if let Some(logger) = self.logger {
            logger.dispatch(Severity::Info, Body::Print(args));
        }
    }

    #[track_caller]
    pub fn infoln(&self, args: &[&dyn Operand]) {
        if let Some(logger) = self.logger {
            logger.dispatch(Severity::Info, Body::Println(args));
        }
    }

    #[track_caller]
    pub fn infof(&self, args: fmt::Arguments<'_>) {
        if let Some(logger) = self.logger {
            logger.dispatch(Severity::Info, Body::Printf(args));
        }
    }
}

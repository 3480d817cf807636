//! The process-wide default engine and the free functions that log through it.
//!
//! The default engine exists from the first call and logs with default
//! settings (files in the temp directory, errors echoed to stderr) until
//! [`init`] configures it. [`init`] succeeds at most once per process.

use std::fmt;
use std::panic::{self, Location};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use crate::config::Options;
use crate::error::{LogError, LogResult};
use crate::format::{Body, Operand};
use crate::logger::{Logger, OutputStats, Verbose};
use crate::severity::Severity;
use crate::verbosity::TraceLocation;

static INITIALIZED: AtomicBool = AtomicBool::new(false);
static DEFAULT: OnceLock<Logger> = OnceLock::new();

/// The process-wide engine.
pub fn default_logger() -> &'static Logger {
    DEFAULT.get_or_init(Logger::unconfigured)
}

/// Configure the process-wide engine and start its flush daemon.
///
/// Options are validated before anything changes, so a malformed first call
/// leaves the engine exactly as it was. Only the first successful call
/// configures; every later call returns [`LogError::AlreadyInitialized`],
/// whatever its options.
///
/// The engine lives in a static and is never dropped, so records still
/// buffered when `main` returns are lost. Call [`shutdown`] (or [`flush`])
/// before exiting. A panic anywhere in the process flushes the engine
/// before the previous panic hook runs.
pub fn init(options: Options) -> LogResult<()> {
    let config = match options.validate() {
        Ok(config) => config,
        Err(_) if is_initialized() => return Err(LogError::AlreadyInitialized),
        Err(e) => return Err(e),
    };
    if INITIALIZED
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return Err(LogError::AlreadyInitialized);
    }

    let logger = default_logger();
    logger.apply(config);
    logger.start_flush_daemon()?;
    install_panic_flush();
    tracing::debug!(identity = ?logger.identity(), "logging initialized");
    Ok(())
}

/// Chain a panic hook that flushes the default engine. The panicking thread
/// may hold the write lock, so the flush is skipped rather than awaited.
fn install_panic_flush() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        default_logger().try_flush();
        previous(info);
    }));
}

pub fn is_initialized() -> bool {
    INITIALIZED.load(Ordering::Acquire)
}

/// Gate for V-leveled records from the calling source file.
#[track_caller]
pub fn v(level: u32) -> Verbose<'static> {
    default_logger().v(level)
}

pub fn set_verbosity(level: u32) {
    default_logger().set_verbosity(level);
}

pub fn set_vmodule(spec: &str) -> LogResult<()> {
    default_logger().set_vmodule(spec)
}

pub fn set_trace_location(location: Option<TraceLocation>) {
    default_logger().set_trace_location(location);
}

pub fn should_log(file: &str, level: u32) -> bool {
    default_logger().should_log(file, level)
}

pub fn flush() {
    default_logger().flush();
}

pub fn shutdown() {
    default_logger().shutdown();
}

pub fn stats(severity: Severity) -> OutputStats {
    default_logger().stats(severity)
}

#[track_caller]
fn dispatch(severity: Severity, body: Body<'_>) {
    let caller = Location::caller();
    default_logger().log_at(severity, caller.file(), caller.line(), body);
}

#[track_caller]
fn dispatch_fatal(body: Body<'_>) -> ! {
    let caller = Location::caller();
    default_logger().fatal_at(caller.file(), caller.line(), body)
}

#[track_caller]
pub fn info(args: &[&dyn Operand]) {
    dispatch(Severity::Info, Body::Print(args));
}

#[track_caller]
pub fn infoln(args: &[&dyn Operand]) {
    dispatch(Severity::Info, Body::Println(args));
}

#[track_caller]
pub fn infof(args: fmt::Arguments<'_>) {
    dispatch(Severity::Info, Body::Printf(args));
}

#[track_caller]
pub fn warning(args: &[&dyn Operand]) {
    dispatch(Severity::Warning, Body::Print(args));
}

#[track_caller]
pub fn warningln(args: &[&dyn Operand]) {
    dispatch(Severity::Warning, Body::Println(args));
}

#[track_caller]
pub fn warningf(args: fmt::Arguments<'_>) {
    dispatch(Severity::Warning, Body::Printf(args));
}

#[track_caller]
pub fn error(args: &[&dyn Operand]) {
    dispatch(Severity::Error, Body::Print(args));
}

#[track_caller]
pub fn errorln(args: &[&dyn Operand]) {
    dispatch(Severity::Error, Body::Println(args));
}

#[track_caller]
pub fn errorf(args: fmt::Arguments<'_>) {
    dispatch(Severity::Error, Body::Printf(args));
}

#[track_caller]
pub fn fatal(args: &[&dyn Operand]) -> ! {
    dispatch_fatal(Body::Print(args))
}

#[track_caller]
pub fn fatalln(args: &[&dyn Operand]) -> ! {
    dispatch_fatal(Body::Println(args))
}

#[track_caller]
pub fn fatalf(args: fmt::Arguments<'_>) -> ! {
    dispatch_fatal(Body::Printf(args))
}

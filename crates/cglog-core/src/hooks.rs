//! Seams for the collaborators the engine depends on but does not own:
//! the wall clock, stack capture, process termination, the console stream
//! and the identity used to name log files.

use std::backtrace::Backtrace;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Local};

/// Source of record timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Captures stack traces for trace locations and fatal dumps.
pub trait StackDumper: Send + Sync {
    /// Stack of the calling thread.
    fn current(&self) -> String;

    /// Stacks of every running thread the platform lets us see.
    fn all(&self) -> String;
}

/// `std::backtrace` capture.
///
/// The standard library can only walk the calling thread, so `all` reports
/// that thread, labelled with its name.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadBacktrace;

impl StackDumper for ThreadBacktrace {
    fn current(&self) -> String {
        Backtrace::force_capture().to_string()
    }

    fn all(&self) -> String {
        let thread = std::thread::current();
        let name = thread.name().unwrap_or("<unnamed>");
        format!("thread '{}' ({:?}):\n{}\n", name, thread.id(), self.current())
    }
}

/// Ends the process on the fatal path.
pub trait Terminator: Send + Sync {
    fn terminate(&self, code: i32) -> !;
}

/// `std::process::exit`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExit;

impl Terminator for ProcessExit {
    fn terminate(&self, code: i32) -> ! {
        std::process::exit(code)
    }
}

/// Who is logging: feeds file names and the file header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessIdentity {
    pub program: String,
    pub host: String,
    pub user: String,
    pub pid: u32,
    pub command_line: String,
}

impl ProcessIdentity {
    /// Identity of the running process.
    pub fn current() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let program = args
            .first()
            .and_then(|arg0| Path::new(arg0).file_stem())
            .map(|stem| stem.to_string_lossy().into_owned())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "unknown".to_string());

        Self {
            program,
            host: short_hostname(),
            user: user_name(),
            pid: std::process::id(),
            command_line: args.join(" "),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

/// Host name up to the first dot.
fn short_hostname() -> String {
    let host = raw_hostname().unwrap_or_else(|| "unknownhost".to_string());
    match host.split_once('.') {
        Some((short, _)) if !short.is_empty() => short.to_string(),
        _ => host,
    }
}

#[cfg(unix)]
fn raw_hostname() -> Option<String> {
    nix::unistd::gethostname()
        .ok()
        .map(|h| h.to_string_lossy().into_owned())
        .filter(|h| !h.is_empty())
}

#[cfg(not(unix))]
fn raw_hostname() -> Option<String> {
    std::env::var("COMPUTERNAME").ok().filter(|h| !h.is_empty())
}

/// Login name, safe for use inside a file name.
fn user_name() -> String {
    let name = raw_user_name().unwrap_or_else(|| "unknownuser".to_string());
    name.replace(['/', '\\'], "_")
}

#[cfg(unix)]
fn raw_user_name() -> Option<String> {
    use nix::unistd::{Uid, User};

    User::from_uid(Uid::current())
        .ok()
        .flatten()
        .map(|user| user.name)
        .or_else(|| std::env::var("USER").ok())
        .filter(|name| !name.is_empty())
}

#[cfg(not(unix))]
fn raw_user_name() -> Option<String> {
    std::env::var("USERNAME").ok().filter(|name| !name.is_empty())
}

/// Collaborators injected into a [`Logger`](crate::Logger).
pub struct Hooks {
    pub clock: Arc<dyn Clock>,
    pub stacks: Arc<dyn StackDumper>,
    pub terminator: Arc<dyn Terminator>,
    pub console: Box<dyn Write + Send>,
    pub identity: ProcessIdentity,
}

impl Hooks {
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_stacks(mut self, stacks: impl StackDumper + 'static) -> Self {
        self.stacks = Arc::new(stacks);
        self
    }

    pub fn with_terminator(mut self, terminator: impl Terminator + 'static) -> Self {
        self.terminator = Arc::new(terminator);
        self
    }

    pub fn with_console(mut self, console: impl Write + Send + 'static) -> Self {
        self.console = Box::new(console);
        self
    }

    pub fn with_identity(mut self, identity: ProcessIdentity) -> Self {
        self.identity = identity;
        self
    }
}

impl Default for Hooks {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            stacks: Arc::new(ThreadBacktrace),
            terminator: Arc::new(ProcessExit),
            console: Box::new(io::stderr()),
            identity: ProcessIdentity::current(),
        }
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

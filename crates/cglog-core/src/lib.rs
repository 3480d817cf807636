//! cglog Core Library
//!
//! Leveled, severity-tiered logging with rotating per-severity files.
//!
//! ## Overview
//!
//! Records carry one of four severities (INFO, WARNING, ERROR, FATAL). Each
//! severity has its own log file, and a record is written to the file of its
//! own severity and every lower one, so the INFO file is the complete log.
//! Errors (configurable) are echoed to stderr. A FATAL record dumps stacks,
//! flushes everything and exits the process with status 255.
//!
//! Verbose diagnostics go through V-levels: `v(n)` is enabled when `n` is at
//! most the global level, or the level of the first `--vmodule` pattern
//! matching the calling source file. A closed gate never formats anything.
//!
//! ## Quick Start
//!
//! ```ignore
//! use cglog_core::{init, infof, Options};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init(Options {
//!         verbosity: 1,
//!         vmodule: "gossip*=3".into(),
//!         ..Options::default()
//!     })?;
//!
//!     infof!("serving on {}", 8080);
//!     cglog_core::v(2).infof(format_args!("not shown at level 1"));
//!     cglog_core::error(&[&"disk ", &"full"]);
//!
//!     cglog_core::shutdown();
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod config;
pub mod daemon;
pub mod error;
pub mod format;
pub mod global;
pub mod hooks;
pub mod logger;
mod macros;
pub mod severity;
pub mod sink;
pub mod verbosity;

// Re-exports
pub use bridge::CglogLayer;
pub use config::{Config, Options, DEFAULT_FLUSH_INTERVAL, DEFAULT_MAX_SIZE};
pub use error::{LogError, LogResult};
pub use format::{Body, LogRecord, Operand, Shown, LINE_FORMAT};
pub use global::{
    default_logger, error, errorf, errorln, fatal, fatalf, fatalln, flush, info, infof, infoln,
    init, is_initialized, set_trace_location, set_verbosity, set_vmodule, should_log, shutdown,
    stats, v, warning, warningf, warningln,
};
pub use hooks::{Clock, Hooks, ProcessExit, ProcessIdentity, StackDumper, SystemClock, Terminator, ThreadBacktrace};
pub use logger::{Logger, OutputStats, Verbose, FATAL_EXIT_CODE};
pub use severity::Severity;
pub use verbosity::{TraceLocation, VModule};

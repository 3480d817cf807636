//! Engine configuration.
//!
//! [`Options`] is the raw, serde-friendly object an application fills in
//! (from flags, a JSON file, or code). [`Options::validate`] parses its
//! textual fields into a [`Config`]; nothing is applied to a running engine
//! until validation has fully succeeded.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LogResult;
use crate::severity::Severity;
use crate::verbosity::{TraceLocation, VModule, VerbosityState};

/// Rotation threshold used when none is configured.
pub const DEFAULT_MAX_SIZE: u64 = 10_000_000;

/// Period of the background flush.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// User-facing configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Options {
    /// Log to the console instead of files.
    #[serde(alias = "toStdErr")]
    pub to_console: bool,

    /// Log to the console as well as files.
    #[serde(alias = "alsoToStdErr")]
    pub also_to_console: bool,

    /// Global V level.
    pub verbosity: u32,

    /// Lowest severity echoed to the console: info, warning, error (default)
    /// or fatal.
    #[serde(alias = "stdErrThreshold", skip_serializing_if = "Option::is_none")]
    pub stderr_threshold: Option<String>,

    /// Per-file V levels, e.g. `gossip*=3,engine=1`.
    pub vmodule: String,

    /// `file:line` at which records get a stack trace attached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_location: Option<String>,

    /// Directory for log files (default: the platform temp directory).
    #[serde(alias = "logdir", skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// File size in bytes that triggers rotation; 0 selects the default.
    pub max_size: u64,

    /// Seconds between background flushes; 0 selects the default.
    pub flush_interval_secs: u64,
}

impl Options {
    /// Parse every textual option. Pure: touches no engine state.
    pub fn validate(&self) -> LogResult<Config> {
        let stderr_threshold = match self.stderr_threshold.as_deref() {
            Some(name) if !name.trim().is_empty() => name.parse::<Severity>()?,
            _ => Severity::Error,
        };
        let vmodule = self.vmodule.parse::<VModule>()?;
        let trace_location = match self.trace_location.as_deref() {
            Some(value) if !value.is_empty() => Some(value.parse::<TraceLocation>()?),
            _ => None,
        };

        let mut log_dirs = Vec::with_capacity(2);
        if let Some(dir) = self.log_dir.as_ref().filter(|d| !d.as_os_str().is_empty()) {
            log_dirs.push(dir.clone());
        }
        log_dirs.push(std::env::temp_dir());

        Ok(Config {
            to_console: self.to_console,
            also_to_console: self.also_to_console,
            stderr_threshold,
            verbosity: self.verbosity,
            vmodule,
            trace_location,
            log_dirs,
            max_size: if self.max_size == 0 {
                DEFAULT_MAX_SIZE
            } else {
                self.max_size
            },
            flush_interval: if self.flush_interval_secs == 0 {
                DEFAULT_FLUSH_INTERVAL
            } else {
                Duration::from_secs(self.flush_interval_secs)
            },
        })
    }
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub to_console: bool,
    pub also_to_console: bool,
    pub stderr_threshold: Severity,
    pub verbosity: u32,
    pub vmodule: VModule,
    pub trace_location: Option<TraceLocation>,
    /// Candidate directories, tried in order until a file can be created.
    pub log_dirs: Vec<PathBuf>,
    pub max_size: u64,
    pub flush_interval: Duration,
}

impl Config {
    /// Defaults, writing files into `dir` first.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.log_dirs.insert(0, dir.into());
        config
    }

    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_verbosity(mut self, verbosity: u32) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub(crate) fn verbosity_state(&self) -> VerbosityState {
        VerbosityState {
            level: self.verbosity,
            vmodule: self.vmodule.clone(),
            trace_location: self.trace_location.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            to_console: false,
            also_to_console: false,
            stderr_threshold: Severity::Error,
            verbosity: 0,
            vmodule: VModule::default(),
            trace_location: None,
            log_dirs: vec![std::env::temp_dir()],
            max_size: DEFAULT_MAX_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

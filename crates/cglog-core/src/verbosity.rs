//! V-level verbosity: a global level plus per-source-file overrides.
//!
//! The override table comes from a `pattern=N[,pattern=N...]` spec. Each
//! pattern is a glob over the caller's source file name without extension
//! (`gossip*=3`). A pattern containing `/` is matched against the trailing
//! components of the source path instead (`net/*=2`). Patterns are consulted
//! in the order given and the first match wins; a file matching no pattern
//! uses the global level.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use globset::{GlobBuilder, GlobMatcher};
use parking_lot::RwLock;

use crate::error::{LogError, LogResult};

/// One `pattern=N` entry of a vmodule spec.
#[derive(Debug, Clone)]
pub struct ModulePattern {
    pattern: String,
    level: u32,
    matcher: GlobMatcher,
    full_path: bool,
}

impl ModulePattern {
    fn compile(spec: &str, pattern: &str, level: u32) -> LogResult<Self> {
        let full_path = pattern.contains('/');
        let glob_source = if full_path && !pattern.starts_with('/') {
            format!("**/{pattern}")
        } else {
            pattern.to_string()
        };
        let glob = GlobBuilder::new(&glob_source)
            .literal_separator(true)
            .build()
            .map_err(|e| LogError::InvalidVModule {
                spec: spec.to_string(),
                reason: format!("bad pattern {pattern:?}: {e}"),
            })?;
        Ok(Self {
            pattern: pattern.to_string(),
            level,
            matcher: glob.compile_matcher(),
            full_path,
        })
    }

    /// The pattern as written.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The verbosity level applied to matching files.
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Whether the source file at `file` is covered by this pattern.
    pub fn matches(&self, file: &str) -> bool {
        let path = Path::new(file);
        if self.full_path {
            self.matcher.is_match(path.with_extension(""))
        } else {
            path.file_stem()
                .map(|stem| self.matcher.is_match(stem))
                .unwrap_or(false)
        }
    }
}

/// Ordered table of per-file verbosity overrides.
#[derive(Debug, Clone, Default)]
pub struct VModule {
    patterns: Vec<ModulePattern>,
}

impl VModule {
    /// Level of the first pattern matching `file`.
    pub fn level_for(&self, file: &str) -> Option<u32> {
        self.patterns
            .iter()
            .find(|p| p.matches(file))
            .map(ModulePattern::level)
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> &[ModulePattern] {
        &self.patterns
    }
}

impl FromStr for VModule {
    type Err = LogError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| LogError::InvalidVModule {
            spec: spec.to_string(),
            reason,
        };

        let mut patterns = Vec::new();
        for entry in spec.split(',').map(str::trim) {
            // Tolerate "a=1,,b=2" and a trailing comma.
            if entry.is_empty() {
                continue;
            }
            let (pattern, level) = entry
                .split_once('=')
                .ok_or_else(|| invalid(format!("{entry:?} is not pattern=N")))?;
            let (pattern, level) = (pattern.trim(), level.trim());
            if pattern.is_empty() {
                return Err(invalid(format!("{entry:?} has an empty pattern")));
            }
            let level = level
                .parse::<u32>()
                .map_err(|_| invalid(format!("{entry:?} has a non-numeric level")))?;
            patterns.push(ModulePattern::compile(spec, pattern, level)?);
        }
        Ok(Self { patterns })
    }
}

impl fmt::Display for VModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, p) in self.patterns.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", p.pattern, p.level)?;
        }
        Ok(())
    }
}

/// A `file:line` call site at which records get a stack trace attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceLocation {
    file: String,
    line: u32,
}

impl TraceLocation {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    /// Compares against the base name of `file`.
    pub fn matches(&self, file: &str, line: u32) -> bool {
        line == self.line
            && Path::new(file)
                .file_name()
                .map(|name| name == self.file.as_str())
                .unwrap_or(false)
    }
}

impl FromStr for TraceLocation {
    type Err = LogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| LogError::InvalidTraceLocation {
            value: value.to_string(),
            reason: reason.to_string(),
        };

        let (file, line) = value.split_once(':').ok_or_else(|| invalid("expected file:line"))?;
        if line.contains(':') {
            return Err(invalid("expected exactly one ':'"));
        }
        if file.is_empty() || !file.contains('.') {
            return Err(invalid("file must be a base name with an extension"));
        }
        let line = line
            .parse::<u32>()
            .map_err(|_| invalid("line must be a positive integer"))?;
        if line == 0 {
            return Err(invalid("line must be a positive integer"));
        }
        Ok(Self::new(file, line))
    }
}

impl fmt::Display for TraceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Snapshot of the verbosity configuration.
#[derive(Debug, Clone, Default)]
pub struct VerbosityState {
    pub level: u32,
    pub vmodule: VModule,
    pub trace_location: Option<TraceLocation>,
}

impl VerbosityState {
    /// Pattern level if any pattern matches, else the global level.
    pub fn effective_level(&self, file: &str) -> u32 {
        self.vmodule.level_for(file).unwrap_or(self.level)
    }
}

/// Process-wide verbosity configuration behind its own reader/writer lock.
///
/// Gate checks only ever take the read side, so V-leveled calls never contend
/// with the sink write lock. Updates replace whole fields under the write
/// side: readers see the old or the new configuration, never a mix.
#[derive(Debug, Default)]
pub struct Verbosity {
    state: RwLock<VerbosityState>,
}

impl Verbosity {
    pub fn new(state: VerbosityState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    /// True if a V-leveled call at `level` from `file` should be emitted.
    pub fn should_log(&self, file: &str, level: u32) -> bool {
        let state = self.state.read();
        if state.vmodule.is_empty() {
            return level <= state.level;
        }
        level <= state.effective_level(file)
    }

    pub fn level(&self) -> u32 {
        self.state.read().level
    }

    pub fn set_level(&self, level: u32) {
        self.state.write().level = level;
    }

    /// Parse and install a new override table; on error the old one stays.
    pub fn set_vmodule(&self, spec: &str) -> LogResult<()> {
        let vmodule = spec.parse::<VModule>()?;
        self.state.write().vmodule = vmodule;
        Ok(())
    }

    pub fn set_trace_location(&self, location: Option<TraceLocation>) {
        self.state.write().trace_location = location;
    }

    /// Whether the call site `file:line` is the configured trace location.
    pub fn is_trace_point(&self, file: &str, line: u32) -> bool {
        self.state
            .read()
            .trace_location
            .as_ref()
            .map(|t| t.matches(file, line))
            .unwrap_or(false)
    }

    /// Replace the whole configuration at once.
    pub fn replace(&self, state: VerbosityState) {
        *self.state.write() = state;
    }

    pub fn snapshot(&self) -> VerbosityState {
        self.state.read().clone()
    }
}

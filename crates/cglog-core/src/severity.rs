//! Severity tiers.
//!
//! Severities are totally ordered `Info < Warning < Error < Fatal`. A record
//! written at severity `S` is cascaded to every sink whose severity is `<= S`,
//! so the INFO file is a superset of everything ever logged.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LogError;

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info = 0,
    Warning = 1,
    Error = 2,
    Fatal = 3,
}

impl Severity {
    /// Number of severities, one sink each.
    pub const COUNT: usize = 4;

    /// All severities in ascending order.
    pub const ALL: [Severity; Self::COUNT] = [
        Severity::Info,
        Severity::Warning,
        Severity::Error,
        Severity::Fatal,
    ];

    /// Ordinal of this severity (`Info == 0`).
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Severity for an ordinal, if in range.
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Severity::Info),
            1 => Some(Severity::Warning),
            2 => Some(Severity::Error),
            3 => Some(Severity::Fatal),
            _ => None,
        }
    }

    /// Upper-case name used in file names and symlinks.
    pub const fn name(self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }

    /// Single-letter tag that opens every formatted line.
    pub const fn letter(self) -> char {
        match self {
            Severity::Info => 'I',
            Severity::Warning => 'W',
            Severity::Error => 'E',
            Severity::Fatal => 'F',
        }
    }

    /// Severities a record at `self` is written to, highest first.
    pub fn cascade(self) -> impl Iterator<Item = Severity> {
        (0..=self.index()).rev().filter_map(Severity::from_index)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Severity {
    type Err = LogError;

    /// Accepts the names case-insensitively, or the ordinal digit.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(index) = trimmed.parse::<usize>() {
            return Self::from_index(index).ok_or_else(|| LogError::InvalidThreshold(s.to_string()));
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "fatal" => Ok(Severity::Fatal),
            _ => Err(LogError::InvalidThreshold(s.to_string())),
        }
    }
}

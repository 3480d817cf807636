//! Sink manager: one rotating file per severity plus the console stream.
//!
//! A record at severity `S` is appended to the file for `S` and to every
//! file of lower severity ("cascading write"). Files are opened lazily on
//! the first record that needs them; opening the file for `S` also opens any
//! missing lower-severity files so a cascade never targets a closed sink.
//!
//! The manager itself is not synchronized. The dispatch core keeps it behind
//! its write lock, which makes one record's whole cascade (including any
//! rotation it triggers) a single critical section.

pub mod file;

use std::io::{self, Write};
use std::path::PathBuf;

use chrono::{DateTime, Local};

pub use file::{link_name, log_file_name, RotatingFile};

use crate::hooks::ProcessIdentity;
use crate::severity::Severity;

/// Owner of every file handle and the console stream.
pub struct SinkManager {
    files: [Option<RotatingFile>; Severity::COUNT],
    console: Box<dyn Write + Send>,
    log_dirs: Vec<PathBuf>,
    max_size: u64,
}

impl SinkManager {
    pub fn new(log_dirs: Vec<PathBuf>, max_size: u64, console: Box<dyn Write + Send>) -> Self {
        Self {
            files: Default::default(),
            console,
            log_dirs,
            max_size,
        }
    }

    /// Cascade `bytes` into the files for `severity` and below.
    ///
    /// Every reachable sink gets the record even if another one fails; the
    /// first error is returned so the caller can fall back to the console.
    pub fn write_files(
        &mut self,
        severity: Severity,
        bytes: &[u8],
        identity: &ProcessIdentity,
        now: &DateTime<Local>,
    ) -> io::Result<()> {
        let mut first_error = self.open_missing(severity, identity, now).err();

        for target in severity.cascade() {
            if let Some(file) = self.files[target.index()].as_mut() {
                if let Err(e) = file.write(bytes, self.max_size, identity, now) {
                    tracing::warn!(severity = %target, path = %file.path().display(), error = %e, "log write failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Append `bytes` to the console stream. Console errors are dropped.
    pub fn write_console(&mut self, bytes: &[u8]) {
        let _ = self.console.write_all(bytes);
    }

    fn open_missing(
        &mut self,
        severity: Severity,
        identity: &ProcessIdentity,
        now: &DateTime<Local>,
    ) -> io::Result<()> {
        let mut first_error = None;
        for target in severity.cascade() {
            let slot = &mut self.files[target.index()];
            if slot.is_some() {
                continue;
            }
            match RotatingFile::create(&self.log_dirs, target, identity, now) {
                Ok(file) => {
                    tracing::debug!(severity = %target, path = %file.path().display(), "opened log file");
                    *slot = Some(file);
                }
                Err(e) => {
                    tracing::warn!(severity = %target, error = %e, "cannot create log file");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Flush every open file and the console.
    pub fn flush(&mut self) -> io::Result<()> {
        let mut first_error = None;
        for file in self.files.iter_mut().flatten() {
            if let Err(e) = file.flush() {
                first_error.get_or_insert(e);
            }
        }
        if let Err(e) = self.console.flush() {
            first_error.get_or_insert(e);
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Flush and close every file. The next record reopens fresh files.
    pub fn close(&mut self) {
        let _ = self.flush();
        for slot in self.files.iter_mut() {
            *slot = None;
        }
    }

    /// Close open files and adopt new placement and rotation settings.
    pub fn reconfigure(&mut self, log_dirs: Vec<PathBuf>, max_size: u64) {
        self.close();
        self.log_dirs = log_dirs;
        self.max_size = max_size;
    }

    /// Path of the current file for `severity`, if open.
    pub fn current_path(&self, severity: Severity) -> Option<PathBuf> {
        self.files[severity.index()]
            .as_ref()
            .map(|f| f.path().to_path_buf())
    }
}

impl Drop for SinkManager {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

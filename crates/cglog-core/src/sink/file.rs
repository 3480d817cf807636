//! Rotating per-severity log files.
//!
//! Files are named
//! `<program>.<host>.<user>.log.<SEVERITY>.<yyyymmdd-hhmmss>.<pid>` and a
//! `<program>.<SEVERITY>` symlink in the same directory always points at the
//! newest one. A second file opened within the same second gets a `.N`
//! suffix rather than truncating its predecessor.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::format::LINE_FORMAT;
use crate::hooks::ProcessIdentity;
use crate::severity::Severity;

/// Size of the in-memory buffer in front of each file.
const BUFFER_SIZE: usize = 256 * 1024;

/// Upper bound on `.N` suffixes tried before giving up on a name.
const MAX_NAME_COLLISIONS: u32 = 1000;

/// File name for a new log file, without collision suffix.
pub fn log_file_name(severity: Severity, identity: &ProcessIdentity, now: &DateTime<Local>) -> String {
    format!(
        "{}.{}.{}.log.{}.{}.{}",
        identity.program,
        identity.host,
        identity.user,
        severity.name(),
        now.format("%Y%m%d-%H%M%S"),
        identity.pid
    )
}

/// Name of the "latest" symlink for a severity.
pub fn link_name(severity: Severity, identity: &ProcessIdentity) -> String {
    format!("{}.{}", identity.program, severity.name())
}

/// An open, buffered log file for one severity.
pub struct RotatingFile {
    severity: Severity,
    dir: PathBuf,
    path: PathBuf,
    writer: BufWriter<File>,
    /// Record bytes written since this file was opened (header excluded).
    nbytes: u64,
}

impl RotatingFile {
    /// Open a fresh file in the first of `dirs` that accepts one.
    pub fn create(
        dirs: &[PathBuf],
        severity: Severity,
        identity: &ProcessIdentity,
        now: &DateTime<Local>,
    ) -> io::Result<Self> {
        let mut last_error = None;
        for dir in dirs {
            match open_in_dir(dir, severity, identity, now) {
                Ok((path, writer)) => {
                    return Ok(Self {
                        severity,
                        dir: dir.clone(),
                        path,
                        writer,
                        nbytes: 0,
                    })
                }
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "no log directory configured")
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_since_rotation(&self) -> u64 {
        self.nbytes
    }

    /// Append one rendered record, rotating first if it would push the file
    /// past `max_size`.
    ///
    /// A file that holds no records yet is never rotated, so a single record
    /// larger than `max_size` still lands in one file. If opening the next
    /// file fails, the record goes to the current one.
    pub fn write(
        &mut self,
        bytes: &[u8],
        max_size: u64,
        identity: &ProcessIdentity,
        now: &DateTime<Local>,
    ) -> io::Result<()> {
        if self.nbytes > 0 && self.nbytes + bytes.len() as u64 > max_size {
            if let Err(e) = self.rotate(identity, now) {
                tracing::warn!(
                    severity = %self.severity,
                    path = %self.path.display(),
                    error = %e,
                    "log rotation failed, continuing in current file"
                );
            }
        }
        self.writer.write_all(bytes)?;
        self.nbytes += bytes.len() as u64;
        Ok(())
    }

    /// Close the current file and continue in a new one.
    pub fn rotate(&mut self, identity: &ProcessIdentity, now: &DateTime<Local>) -> io::Result<()> {
        let (path, writer) = open_in_dir(&self.dir, self.severity, identity, now)?;
        let previous = std::mem::replace(&mut self.writer, writer);
        let previous_path = std::mem::replace(&mut self.path, path);
        self.nbytes = 0;

        if let Err(e) = finish(previous) {
            tracing::warn!(path = %previous_path.display(), error = %e, "failed to flush rotated log file");
        }
        tracing::debug!(
            severity = %self.severity,
            from = %previous_path.display(),
            to = %self.path.display(),
            "rotated log file"
        );
        Ok(())
    }

    /// Push buffered bytes to the OS and ask it to persist them.
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()
    }
}

impl Drop for RotatingFile {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

fn finish(mut writer: BufWriter<File>) -> io::Result<()> {
    writer.flush()?;
    writer.get_ref().sync_data()
}

/// Create the directory if needed, open a uniquely named file, write the
/// header and repoint the severity's symlink at it.
fn open_in_dir(
    dir: &Path,
    severity: Severity,
    identity: &ProcessIdentity,
    now: &DateTime<Local>,
) -> io::Result<(PathBuf, BufWriter<File>)> {
    fs::create_dir_all(dir)?;

    let base = log_file_name(severity, identity, now);
    let (name, file) = create_unique(dir, &base)?;
    let path = dir.join(&name);

    let mut writer = BufWriter::with_capacity(BUFFER_SIZE, file);
    write_header(&mut writer, identity, now)?;
    // The symlink must never point at an empty file.
    writer.flush()?;

    if let Err(e) = update_symlink(dir, &link_name(severity, identity), &name) {
        tracing::debug!(dir = %dir.display(), error = %e, "could not update latest-log symlink");
    }

    Ok((path, writer))
}

fn create_unique(dir: &Path, base: &str) -> io::Result<(String, File)> {
    for n in 0..MAX_NAME_COLLISIONS {
        let name = if n == 0 {
            base.to_string()
        } else {
            format!("{base}.{n}")
        };
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dir.join(&name))
        {
            Ok(file) => return Ok((name, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("too many log files named {base}"),
    ))
}

fn write_header(
    writer: &mut impl Write,
    identity: &ProcessIdentity,
    now: &DateTime<Local>,
) -> io::Result<()> {
    writeln!(writer, "Log file created at: {}", now.format("%Y/%m/%d %H:%M:%S"))?;
    writeln!(writer, "Running on machine: {}", identity.host)?;
    writeln!(
        writer,
        "Binary: {} (pid {}) for {}/{}",
        identity.program,
        identity.pid,
        std::env::consts::OS,
        std::env::consts::ARCH
    )?;
    writeln!(writer, "Command line: {}", identity.command_line)?;
    writeln!(writer, "Log line format: {}", LINE_FORMAT)
}

/// Repoint `dir/link` at `target` by renaming a fresh symlink over it, so a
/// reader following the link never finds it missing.
#[cfg(unix)]
fn update_symlink(dir: &Path, link: &str, target: &str) -> io::Result<()> {
    let staging = dir.join(format!(".{link}.{}.tmp", std::process::id()));
    let _ = fs::remove_file(&staging);
    std::os::unix::fs::symlink(target, &staging)?;
    fs::rename(&staging, dir.join(link))
}

#[cfg(not(unix))]
fn update_symlink(_dir: &Path, _link: &str, _target: &str) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn identity() -> ProcessIdentity {
        ProcessIdentity {
            program: "app".into(),
            host: "box".into(),
            user: "ops".into(),
            pid: 77,
            command_line: "app --serve".into(),
        }
    }

    fn at(second: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 1, 21, 14, 30, second).unwrap()
    }

    #[test]
    fn test_file_name_layout() {
        let name = log_file_name(Severity::Warning, &identity(), &at(5));
        assert_eq!(name, "app.box.ops.log.WARNING.20260121-143005.77");
        assert_eq!(link_name(Severity::Warning, &identity()), "app.WARNING");
    }

    #[test]
    fn test_create_writes_header() {
        let temp = TempDir::new().unwrap();
        let dirs = vec![temp.path().join("logs")];

        let file = RotatingFile::create(&dirs, Severity::Info, &identity(), &at(0)).unwrap();
        assert!(file.path().starts_with(&dirs[0]));
        assert_eq!(file.bytes_since_rotation(), 0);

        let content = fs::read_to_string(file.path()).unwrap();
        assert!(content.starts_with("Log file created at: 2026/01/21 14:30:00\n"));
        assert!(content.contains("Running on machine: box\n"));
        assert!(content.contains("Command line: app --serve\n"));
        assert!(content.ends_with(&format!("Log line format: {LINE_FORMAT}\n")));
    }

    #[test]
    fn test_create_falls_back_to_next_dir() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("not-a-dir");
        fs::write(&blocker, b"x").unwrap();
        let dirs = vec![blocker.join("logs"), temp.path().to_path_buf()];

        let file = RotatingFile::create(&dirs, Severity::Info, &identity(), &at(0)).unwrap();
        assert_eq!(file.path().parent(), Some(temp.path()));
    }

    #[test]
    fn test_rotation_on_threshold() {
        let temp = TempDir::new().unwrap();
        let dirs = vec![temp.path().to_path_buf()];
        let mut file = RotatingFile::create(&dirs, Severity::Info, &identity(), &at(0)).unwrap();
        let first = file.path().to_path_buf();

        file.write(&[b'a'; 60], 100, &identity(), &at(1)).unwrap();
        file.write(&[b'b'; 40], 100, &identity(), &at(1)).unwrap();
        assert_eq!(file.path(), first, "exactly at the threshold stays put");

        file.write(&[b'c'; 10], 100, &identity(), &at(2)).unwrap();
        assert_ne!(file.path(), first);
        assert_eq!(file.bytes_since_rotation(), 10);
        file.flush().unwrap();

        let old = fs::read(&first).unwrap();
        assert!(old.ends_with(&[b'b'; 40]));
        let new = fs::read(file.path()).unwrap();
        assert!(new.ends_with(&[b'c'; 10]));
    }

    #[test]
    fn test_oversized_record_does_not_rotate_empty_file() {
        let temp = TempDir::new().unwrap();
        let dirs = vec![temp.path().to_path_buf()];
        let mut file = RotatingFile::create(&dirs, Severity::Info, &identity(), &at(0)).unwrap();
        let first = file.path().to_path_buf();

        file.write(&[b'x'; 500], 100, &identity(), &at(0)).unwrap();
        assert_eq!(file.path(), first);
    }

    #[test]
    fn test_same_second_rotation_gets_suffix() {
        let temp = TempDir::new().unwrap();
        let dirs = vec![temp.path().to_path_buf()];
        let mut file = RotatingFile::create(&dirs, Severity::Error, &identity(), &at(9)).unwrap();
        let first = file.path().to_path_buf();

        file.rotate(&identity(), &at(9)).unwrap();
        assert_eq!(
            file.path().file_name().unwrap().to_string_lossy(),
            "app.box.ops.log.ERROR.20260121-143009.77.1"
        );
        assert!(first.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_tracks_latest_file() {
        let temp = TempDir::new().unwrap();
        let dirs = vec![temp.path().to_path_buf()];
        let mut file = RotatingFile::create(&dirs, Severity::Info, &identity(), &at(0)).unwrap();
        let link = temp.path().join("app.INFO");

        assert_eq!(fs::canonicalize(&link).unwrap(), fs::canonicalize(file.path()).unwrap());

        file.rotate(&identity(), &at(3)).unwrap();
        assert_eq!(fs::canonicalize(&link).unwrap(), fs::canonicalize(file.path()).unwrap());
        assert!(!fs::read(&link).unwrap().is_empty());
    }
}

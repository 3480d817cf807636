//! End-to-end dispatch scenarios
//!
//! Each test builds an independent `Logger` over a temp directory with an
//! in-memory console and a terminator that panics instead of exiting, then
//! inspects the files the engine produced.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use cglog_core::{
    Config, Hooks, Logger, OutputStats, ProcessIdentity, Severity, Shown, StackDumper, Terminator,
    TraceLocation, FATAL_EXIT_CODE,
};
use tempfile::TempDir;

// ============================================================================
// Fakes
// ============================================================================

#[derive(Clone, Default)]
struct Console(Arc<Mutex<Vec<u8>>>);

impl Console {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for Console {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct PanickingExit;

impl Terminator for PanickingExit {
    fn terminate(&self, code: i32) -> ! {
        panic::panic_any(code)
    }
}

struct CannedStacks;

impl StackDumper for CannedStacks {
    fn current(&self) -> String {
        "goroutine-like trace of caller\n".to_string()
    }

    fn all(&self) -> String {
        "dump of every thread\n".to_string()
    }
}

struct FailingStacks;

impl StackDumper for FailingStacks {
    fn current(&self) -> String {
        panic!("no unwinder")
    }

    fn all(&self) -> String {
        panic!("no unwinder")
    }
}

/// Counts how often it is formatted.
struct Counted<'a>(&'a AtomicUsize, &'static str);

impl fmt::Display for Counted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fetch_add(1, Ordering::SeqCst);
        f.write_str(self.1)
    }
}

fn identity() -> ProcessIdentity {
    ProcessIdentity {
        program: "scenario".into(),
        host: "testhost".into(),
        user: "tester".into(),
        pid: 4242,
        command_line: "scenario --run".into(),
    }
}

fn hooks(console: &Console) -> Hooks {
    Hooks::default()
        .with_console(console.clone())
        .with_terminator(PanickingExit)
        .with_stacks(CannedStacks)
        .with_identity(identity())
}

fn build(dir: &Path, config: Config) -> (Logger, Console) {
    let console = Console::default();
    let config = Config {
        log_dirs: vec![dir.to_path_buf()],
        ..config
    };
    let logger = Logger::with_hooks(config, hooks(&console)).unwrap();
    (logger, console)
}

fn contents(logger: &Logger, severity: Severity) -> Option<String> {
    logger.flush();
    logger
        .current_file(severity)
        .map(|path| fs::read_to_string(path).unwrap())
}

fn records(content: &str) -> Vec<&str> {
    content
        .lines()
        .filter(|line| line.starts_with(['I', 'W', 'E', 'F']) && line.contains("] "))
        .collect()
}

// ============================================================================
// Verbosity gating
// ============================================================================

/// V(3) at verbosity 2 is suppressed without formatting; V(1) is written.
#[test]
fn test_v_gate_suppresses_without_formatting() {
    let temp = TempDir::new().unwrap();
    let (logger, _) = build(temp.path(), Config::default().with_verbosity(2));
    let formatted = AtomicUsize::new(0);

    logger.v(3).info(&[&Shown(Counted(&formatted, "x"))]);
    logger.v(3).infof(format_args!("{}", Counted(&formatted, "x")));
    assert_eq!(formatted.load(Ordering::SeqCst), 0, "suppressed call must not format");
    assert_eq!(logger.stats(Severity::Info), OutputStats::default());
    assert!(logger.current_file(Severity::Info).is_none(), "no file for a suppressed call");

    logger.v(1).info(&[&Shown(Counted(&formatted, "y"))]);
    assert_eq!(formatted.load(Ordering::SeqCst), 1);

    let info = contents(&logger, Severity::Info).unwrap();
    let lines = records(&info);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].ends_with("] y"));
    assert_eq!(logger.stats(Severity::Info).lines, 1);
}

/// Raising the verbosity at runtime opens the gate for later calls.
#[test]
fn test_runtime_verbosity_change() {
    let temp = TempDir::new().unwrap();
    let (logger, _) = build(temp.path(), Config::default());

    logger.v(2).infof(format_args!("before"));
    logger.set_verbosity(2);
    logger.v(2).infof(format_args!("after"));

    let info = contents(&logger, Severity::Info).unwrap();
    assert!(!info.contains("before"));
    assert!(info.contains("] after\n"));
}

/// A vmodule override for this file wins over the global level in both
/// directions.
#[test]
fn test_vmodule_override_replaces_global_level() {
    let temp = TempDir::new().unwrap();
    let (logger, _) = build(temp.path(), Config::default().with_verbosity(5));

    logger.set_vmodule("dispatch_*=1").unwrap();
    assert!(logger.v(1).enabled());
    assert!(!logger.v(2).enabled(), "override lowers this file's level");
    assert!(logger.should_log("src/elsewhere.rs", 5), "other files keep the global level");

    assert!(logger.set_vmodule("dispatch_*").is_err());
    assert!(!logger.v(2).enabled(), "failed update keeps the previous table");
}

// ============================================================================
// Cascade and console routing
// ============================================================================

/// Error("boom") lands in ERROR, WARNING and INFO files and on the console.
#[test]
fn test_error_cascades_and_echoes() {
    let temp = TempDir::new().unwrap();
    let (logger, console) = build(temp.path(), Config::default());

    logger.error(&[&"boom"]);

    for severity in [Severity::Info, Severity::Warning, Severity::Error] {
        let content = contents(&logger, severity).unwrap();
        let lines = records(&content);
        assert_eq!(lines.len(), 1, "{severity} file");
        assert!(lines[0].starts_with('E'));
        assert!(lines[0].ends_with("] boom"));
    }
    assert!(logger.current_file(Severity::Fatal).is_none());

    let echoed = console.text();
    assert_eq!(records(&echoed).len(), 1);
    assert!(echoed.contains("] boom\n"));
}

/// Records never reach files above their own severity.
#[test]
fn test_records_stay_at_or_below_their_severity() {
    let temp = TempDir::new().unwrap();
    let (logger, console) = build(temp.path(), Config::default());

    logger.infof(format_args!("i"));
    logger.warningf(format_args!("w"));
    logger.errorf(format_args!("e"));

    let bodies = |severity| -> Vec<String> {
        let content = contents(&logger, severity).unwrap();
        records(&content)
            .iter()
            .map(|l| l.rsplit("] ").next().unwrap().to_string())
            .collect()
    };
    assert_eq!(bodies(Severity::Info), ["i", "w", "e"]);
    assert_eq!(bodies(Severity::Warning), ["w", "e"]);
    assert_eq!(bodies(Severity::Error), ["e"]);

    // Default threshold echoes only errors.
    let echoed = console.text();
    assert!(!echoed.contains("] i\n"));
    assert!(!echoed.contains("] w\n"));
    assert!(echoed.contains("] e\n"));
}

/// Lowering the threshold echoes warnings too.
#[test]
fn test_stderr_threshold_controls_echo() {
    let temp = TempDir::new().unwrap();
    let (logger, console) = build(
        temp.path(),
        Config {
            stderr_threshold: Severity::Warning,
            ..Config::default()
        },
    );

    logger.infof(format_args!("quiet"));
    logger.warningf(format_args!("loud"));

    let echoed = console.text();
    assert!(!echoed.contains("quiet"));
    assert!(echoed.contains("] loud\n"));
}

/// Console-only mode never creates a file.
#[test]
fn test_console_only_mode() {
    let temp = TempDir::new().unwrap();
    let (logger, console) = build(
        temp.path(),
        Config {
            to_console: true,
            ..Config::default()
        },
    );

    logger.infof(format_args!("one"));
    logger.errorf(format_args!("two"));
    logger.flush();

    let echoed = console.text();
    assert_eq!(records(&echoed).len(), 2, "each record printed once");
    assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
}

/// Also-to-console duplicates records below the threshold too, once each.
#[test]
fn test_also_to_console_mode() {
    let temp = TempDir::new().unwrap();
    let (logger, console) = build(
        temp.path(),
        Config {
            also_to_console: true,
            ..Config::default()
        },
    );

    logger.infof(format_args!("info line"));
    logger.errorf(format_args!("error line"));

    let echoed = console.text();
    assert_eq!(records(&echoed).len(), 2);
    let info = contents(&logger, Severity::Info).unwrap();
    assert_eq!(records(&info).len(), 2);
}

// ============================================================================
// Formatting contracts
// ============================================================================

#[test]
fn test_print_modes_and_newline_guarantee() {
    let temp = TempDir::new().unwrap();
    let (logger, _) = build(temp.path(), Config::default());

    logger.info(&[&"id:", &7, &8, &"!"]);
    logger.infoln(&[&"id:", &7, &8]);
    logger.infof(format_args!("{}{}", 7, 8));
    logger.infof(format_args!("already terminated\n"));

    let info = contents(&logger, Severity::Info).unwrap();
    let bodies: Vec<&str> = records(&info)
        .iter()
        .map(|l| l.split_once("] ").unwrap().1)
        .collect();
    assert_eq!(bodies, ["id:7 8!", "id: 7 8", "78", "already terminated"]);
    assert!(!info.contains("\n\n"), "no double newline");
}

#[test]
fn test_prefix_layout() {
    let temp = TempDir::new().unwrap();
    let (logger, _) = build(temp.path(), Config::default());

    let line = line!() + 1;
    logger.warningf(format_args!("shape"));

    let warning = contents(&logger, Severity::Warning).unwrap();
    let record = records(&warning)[0];
    // Wmmdd hh:mm:ss.uuuuuu    4242 file:line] msg
    let (prefix, body) = record.split_once("] ").unwrap();
    assert_eq!(body, "shape");
    assert!(prefix.starts_with('W'));
    assert_eq!(&prefix[5..6], " ");
    assert_eq!(&prefix[14..15], ".");
    assert!(prefix[15..21].chars().all(|c| c.is_ascii_digit()));
    assert!(prefix.contains("    4242 "));
    assert!(prefix.ends_with(&format!(" dispatch_scenarios.rs:{line}")));
}

// ============================================================================
// Files on disk
// ============================================================================

#[test]
fn test_file_names_header_and_link() {
    let temp = TempDir::new().unwrap();
    let (logger, _) = build(temp.path(), Config::default());

    logger.errorf(format_args!("named"));
    let path = logger.current_file(Severity::Error).unwrap();
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("scenario.testhost.tester.log.ERROR."), "{name}");
    assert!(name.ends_with(".4242"), "{name}");

    let content = contents(&logger, Severity::Error).unwrap();
    assert!(content.starts_with("Log file created at: "));
    assert!(content.contains("Command line: scenario --run\n"));

    #[cfg(unix)]
    {
        let link = temp.path().join("scenario.ERROR");
        assert_eq!(fs::canonicalize(link).unwrap(), fs::canonicalize(&path).unwrap());
    }
}

#[test]
fn test_unwritable_directory_redirects_to_console() {
    let temp = TempDir::new().unwrap();
    let blocker = temp.path().join("plain-file");
    fs::write(&blocker, b"not a directory").unwrap();
    let (logger, console) = build(&blocker.join("logs"), Config::default());

    logger.infof(format_args!("rescued"));
    logger.errorf(format_args!("echoed once"));

    let echoed = console.text();
    assert!(echoed.contains("] rescued\n"));
    assert_eq!(echoed.matches("echoed once").count(), 1);
}

// ============================================================================
// Trace location
// ============================================================================

#[test]
fn test_trace_location_attaches_stack() {
    let temp = TempDir::new().unwrap();
    let (logger, _) = build(temp.path(), Config::default());

    let traced_line = line!() + 2;
    logger.set_trace_location(Some(TraceLocation::new("dispatch_scenarios.rs", traced_line)));
    logger.infof(format_args!("here"));
    logger.infof(format_args!("not here"));

    let info = contents(&logger, Severity::Info).unwrap();
    assert!(info.contains("] here\ngoroutine-like trace of caller\n"));
    assert_eq!(info.matches("goroutine-like trace").count(), 1);
}

// ============================================================================
// Fatal path
// ============================================================================

/// Fatal("die") reaches every file with a stack dump, is echoed, flushes and
/// terminates with 255; nothing after the call runs.
#[test]
fn test_fatal_terminates_after_cascade() {
    let temp = TempDir::new().unwrap();
    let (logger, console) = build(temp.path(), Config::default());
    let after = AtomicBool::new(false);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        if std::hint::black_box(true) {
            logger.fatal(&[&"die"]);
        }
        after.store(true, Ordering::SeqCst);
    }));

    let code = *outcome.unwrap_err().downcast::<i32>().unwrap();
    assert_eq!(code, FATAL_EXIT_CODE);
    assert_eq!(code, 255);
    assert!(!after.load(Ordering::SeqCst), "no code after Fatal executes");

    for severity in Severity::ALL {
        let content = contents(&logger, severity).unwrap();
        assert!(content.contains("] die\n"), "{severity}");
        assert!(content.contains("dump of every thread"), "{severity}");
    }
    assert!(console.text().contains("] die\n"));
    assert_eq!(logger.stats(Severity::Fatal).lines, 1);
}

/// Formats by panicking.
struct Boom;

impl fmt::Display for Boom {
    fn fmt(&self, _: &mut fmt::Formatter<'_>) -> fmt::Result {
        panic!("display panicked")
    }
}

/// A panicking operand cannot stop a fatal call from terminating, and
/// nothing is logged afterwards.
#[test]
fn test_fatal_with_panicking_operand_still_terminates() {
    let temp = TempDir::new().unwrap();
    let (logger, _) = build(temp.path(), Config::default());

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| logger.fatal(&[&"lost ", &Shown(Boom)])));
    assert_eq!(*outcome.unwrap_err().downcast::<i32>().unwrap(), FATAL_EXIT_CODE);

    let fatal = contents(&logger, Severity::Fatal).unwrap();
    assert!(fatal.contains("] %!v(PANIC=display panicked)\n"), "{fatal}");
    assert!(fatal.contains("dump of every thread"));
    assert_eq!(logger.stats(Severity::Fatal).lines, 1);
}

/// At other severities the record is written with the marker and the
/// caller carries on.
#[test]
fn test_panicking_operand_does_not_unwind_into_caller() {
    let temp = TempDir::new().unwrap();
    let (logger, console) = build(temp.path(), Config::default());

    logger.error(&[&Shown(Boom)]);
    logger.infof(format_args!("still logging"));

    let info = contents(&logger, Severity::Info).unwrap();
    assert!(info.contains("] %!v(PANIC=display panicked)\n"));
    assert!(info.contains("] still logging\n"));
    assert!(console.text().contains("%!v(PANIC=display panicked)"));
    assert_eq!(logger.stats(Severity::Error).lines, 1);
}

/// A failing stack capture is swallowed; termination still happens.
#[test]
fn test_fatal_survives_failing_dump() {
    let temp = TempDir::new().unwrap();
    let console = Console::default();
    let hooks = hooks(&console).with_stacks(FailingStacks);
    let logger = Logger::with_hooks(Config::in_dir(temp.path()), hooks).unwrap();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| logger.fatalf(format_args!("no dump"))));
    assert_eq!(*outcome.unwrap_err().downcast::<i32>().unwrap(), FATAL_EXIT_CODE);
    assert!(contents(&logger, Severity::Fatal).unwrap().contains("] no dump\n"));
}

/// In console-only mode the fatal record and dump go to the console.
#[test]
fn test_fatal_console_only() {
    let temp = TempDir::new().unwrap();
    let (logger, console) = build(
        temp.path(),
        Config {
            to_console: true,
            ..Config::default()
        },
    );

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| logger.fatalln(&[&"bye"])));
    assert!(outcome.is_err());

    let echoed = console.text();
    assert_eq!(echoed.matches("] bye\n").count(), 1);
    assert!(echoed.contains("dump of every thread"));
    assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
}

//! Record rendering.
//!
//! Every record becomes one self-contained line:
//!
//! ```text
//! Lmmdd hh:mm:ss.uuuuuu threadid file:line] msg
//! E1019 14:03:05.123456   41207 engine.rs:88] peer unreachable
//! ```
//!
//! `L` is the severity letter, `threadid` is the process id right-aligned in
//! seven columns and `file` is the base name of the calling source file. The
//! message always ends in exactly one newline added by the renderer when the
//! caller did not supply one.
//!
//! Message bodies come in three flavours:
//!
//! - **print**: operands are concatenated, with a single space inserted
//!   between two adjacent operands only when neither of them is a string.
//!   `("retry", 3, 4, "s")` renders as `retry3 4s`.
//! - **println**: operands are always separated by one space and a newline
//!   is appended.
//! - **printf**: a `format_args!` template; no spaces are ever inserted.

use std::borrow::Cow;
use std::fmt::{self, Write as _};
use std::io::Write as _;
use std::panic::{self, AssertUnwindSafe};

use chrono::{DateTime, Local};

use crate::severity::Severity;

/// Legend written into every file header.
pub const LINE_FORMAT: &str = "[IWEF]mmdd hh:mm:ss.uuuuuu threadid file:line] msg";

/// A print-style operand.
///
/// `is_string` drives the print spacing rule; it is true only for string
/// types. Wrap any other `Display` value in [`Shown`].
pub trait Operand: fmt::Display {
    fn is_string(&self) -> bool {
        false
    }
}

impl Operand for str {
    fn is_string(&self) -> bool {
        true
    }
}

impl Operand for String {
    fn is_string(&self) -> bool {
        true
    }
}

impl Operand for Cow<'_, str> {
    fn is_string(&self) -> bool {
        true
    }
}

impl<T: Operand + ?Sized> Operand for &T {
    fn is_string(&self) -> bool {
        (**self).is_string()
    }
}

macro_rules! non_string_operand {
    ($($t:ty),* $(,)?) => {
        $(impl Operand for $t {})*
    };
}

non_string_operand!(
    i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, bool, char
);

impl Operand for fmt::Arguments<'_> {}

/// Adapter making any `Display` value a non-string operand.
#[derive(Debug, Clone, Copy)]
pub struct Shown<T>(pub T);

impl<T: fmt::Display> fmt::Display for Shown<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<T: fmt::Display> Operand for Shown<T> {}

/// Caller-supplied message in one of the three formatting modes.
#[derive(Clone, Copy)]
pub enum Body<'a> {
    Print(&'a [&'a dyn Operand]),
    Println(&'a [&'a dyn Operand]),
    Printf(fmt::Arguments<'a>),
    /// Already-rendered text, used by bridges from other logging systems.
    Text(&'a str),
}

impl Body<'_> {
    /// Render the message text (without the line prefix) into `out`.
    pub fn render(&self, out: &mut String) {
        match *self {
            Body::Print(args) => sprint(out, args),
            Body::Println(args) => sprintln(out, args),
            Body::Printf(args) => {
                let _ = out.write_fmt(args);
            }
            Body::Text(text) => out.push_str(text),
        }
    }

    pub fn to_message(&self) -> String {
        let mut out = String::new();
        self.render(&mut out);
        out
    }

    /// Like [`Body::to_message`], but an operand whose `Display` panics
    /// yields a `%!v(PANIC=reason)` marker instead of unwinding into the
    /// caller.
    pub fn to_message_caught(&self) -> String {
        panic::catch_unwind(AssertUnwindSafe(|| self.to_message())).unwrap_or_else(|payload| {
            let reason = payload
                .downcast_ref::<&str>()
                .copied()
                .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
                .unwrap_or("unknown");
            format!("%!v(PANIC={reason})")
        })
    }
}

impl fmt::Debug for Body<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self {
            Body::Print(_) => "Print",
            Body::Println(_) => "Println",
            Body::Printf(_) => "Printf",
            Body::Text(_) => "Text",
        };
        f.debug_tuple(mode).field(&self.to_message()).finish()
    }
}

/// Print-style concatenation.
pub fn sprint(out: &mut String, args: &[&dyn Operand]) {
    let mut previous_is_string = true;
    for (i, arg) in args.iter().enumerate() {
        let is_string = arg.is_string();
        if i > 0 && !is_string && !previous_is_string {
            out.push(' ');
        }
        let _ = write!(out, "{arg}");
        previous_is_string = is_string;
    }
}

/// Println-style concatenation: always space separated, newline terminated.
pub fn sprintln(out: &mut String, args: &[&dyn Operand]) {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{arg}");
    }
    out.push('\n');
}

/// One record on its way to the sinks. Never retained past one call.
#[derive(Debug, Clone)]
pub struct LogRecord<'a> {
    pub severity: Severity,
    pub timestamp: DateTime<Local>,
    pub file: &'a str,
    pub line: u32,
    pub pid: u32,
    pub message: &'a str,
}

impl LogRecord<'_> {
    /// Append the rendered line to `buf`.
    pub fn render_into(&self, buf: &mut Vec<u8>) {
        let _ = write!(
            buf,
            "{}{} {:>7} {}:{}] ",
            self.severity.letter(),
            self.timestamp.format("%m%d %H:%M:%S%.6f"),
            self.pid,
            base_name(self.file),
            self.line
        );
        buf.extend_from_slice(self.message.as_bytes());
        if !self.message.ends_with('\n') {
            buf.push(b'\n');
        }
    }

    pub fn render(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(40 + self.file.len() + self.message.len());
        self.render_into(&mut buf);
        buf
    }
}

/// Final path component of a source file, `???` if there is none.
pub fn base_name(file: &str) -> &str {
    let name = file.rsplit(['/', '\\']).next().unwrap_or(file);
    if name.is_empty() {
        "???"
    } else {
        name
    }
}

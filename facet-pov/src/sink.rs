//! Output destinations.

use core::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, IsTerminal, LineWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

/// Where emitted lines go.
#[derive(Default)]
pub enum Sink {
    /// Standard error
    #[default]
    Stderr,
    /// Standard output
    Stdout,
    /// A file, flushed after every line
    File(LineWriter<File>),
    /// Any other writer (a socket, a pipe, a test double)
    Writer(Box<dyn Write + Send>),
    /// An in-memory buffer shared with a [`Capture`] handle
    Capture(Capture),
    /// Discard everything
    Null,
}

impl Sink {
    /// Open (append to, or create) a file sink.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Sink::File(LineWriter::new(file)))
    }

    /// A sink over an arbitrary writer.
    pub fn writer(writer: impl Write + Send + 'static) -> Self {
        Sink::Writer(Box::new(writer))
    }

    /// A capturing sink plus the handle to read it back.
    pub fn capture() -> (Self, Capture) {
        let capture = Capture::default();
        (Sink::Capture(capture.clone()), capture)
    }

    /// Write one line (a trailing newline is added).
    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        match self {
            Sink::Stderr => writeln!(io::stderr().lock(), "{line}"),
            Sink::Stdout => writeln!(io::stdout().lock(), "{line}"),
            Sink::File(file) => writeln!(file, "{line}"),
            Sink::Writer(writer) => writeln!(writer, "{line}").and_then(|()| writer.flush()),
            Sink::Capture(capture) => {
                capture.push(line);
                Ok(())
            }
            Sink::Null => Ok(()),
        }
    }

    /// Whether lines should carry ANSI colours: only for a console that is a
    /// terminal, and only when `NO_COLOR` is unset.
    pub fn supports_color(&self) -> bool {
        let tty = match self {
            Sink::Stderr => io::stderr().is_terminal(),
            Sink::Stdout => io::stdout().is_terminal(),
            _ => false,
        };
        tty && std::env::var_os("NO_COLOR").is_none()
    }

    /// Whether this sink discards everything.
    pub fn is_null(&self) -> bool {
        matches!(self, Sink::Null)
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sink::Stderr => f.write_str("Stderr"),
            Sink::Stdout => f.write_str("Stdout"),
            Sink::File(file) => f.debug_tuple("File").field(file.get_ref()).finish(),
            Sink::Writer(_) => f.write_str("Writer(..)"),
            Sink::Capture(capture) => f.debug_tuple("Capture").field(capture).finish(),
            Sink::Null => f.write_str("Null"),
        }
    }
}

/// Shared handle to the lines written to a [`Sink::Capture`].
#[derive(Clone, Debug, Default)]
pub struct Capture {
    lines: Arc<Mutex<Vec<String>>>,
}

impl Capture {
    fn push(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_owned());
    }

    /// A copy of every line captured so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Take the captured lines, leaving the buffer empty.
    pub fn take(&self) -> Vec<String> {
        core::mem::take(&mut *self.lines.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Everything captured, joined with newlines.
    pub fn contents(&self) -> String {
        self.lines().join("\n")
    }
}

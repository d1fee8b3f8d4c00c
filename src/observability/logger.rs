//! Structured JSON logger
//!
//! One log line = one event. Fields are emitted in deterministic order
//! (event and level first, then alphabetical by key) so log output is
//! directly diffable in tests and deterministic across runs. Writes are
//! synchronous and unbuffered.

use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU8, Ordering};

/// Log levels, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Fine-grained engine detail
    Debug = 0,
    /// Normal operations (commits, queue lifecycle)
    Info = 1,
    /// Recoverable issues (retries, backpressure timeouts)
    Warn = 2,
    /// Failures (dead letters, backend errors)
    Error = 3,
}

impl Level {
    /// String form used in the log line
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// Events below this level are dropped. Defaults to Info.
static MIN_LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);

/// Synchronous structured logger
pub struct Logger;

impl Logger {
    /// Set the global minimum level
    pub fn set_min_level(level: Level) {
        MIN_LEVEL.store(level as u8, Ordering::Relaxed);
    }

    /// Log an event with key/value fields
    pub fn log(level: Level, event: &str, fields: &[(&str, &str)]) {
        if (level as u8) < MIN_LEVEL.load(Ordering::Relaxed) {
            return;
        }
        if level >= Level::Error {
            Self::write_line(level, event, fields, &mut io::stderr());
        } else {
            Self::write_line(level, event, fields, &mut io::stdout());
        }
    }

    /// Log at DEBUG level
    pub fn debug(event: &str, fields: &[(&str, &str)]) {
        Self::log(Level::Debug, event, fields);
    }

    /// Log at INFO level
    pub fn info(event: &str, fields: &[(&str, &str)]) {
        Self::log(Level::Info, event, fields);
    }

    /// Log at WARN level
    pub fn warn(event: &str, fields: &[(&str, &str)]) {
        Self::log(Level::Warn, event, fields);
    }

    /// Log at ERROR level
    pub fn error(event: &str, fields: &[(&str, &str)]) {
        Self::log(Level::Error, event, fields);
    }

    fn write_line<W: Write>(level: Level, event: &str, fields: &[(&str, &str)], writer: &mut W) {
        let mut line = String::with_capacity(128);
        line.push_str("{\"event\":\"");
        Self::escape(&mut line, event);
        line.push_str("\",\"level\":\"");
        line.push_str(level.as_str());
        line.push('"');

        let mut sorted: Vec<_> = fields.iter().collect();
        sorted.sort_by_key(|(k, _)| *k);
        for (key, value) in sorted {
            line.push_str(",\"");
            Self::escape(&mut line, key);
            line.push_str("\":\"");
            Self::escape(&mut line, value);
            line.push('"');
        }

        line.push_str("}\n");
        // One write_all per line keeps lines whole under concurrency
        let _ = writer.write_all(line.as_bytes());
        let _ = writer.flush();
    }

    fn escape(out: &mut String, s: &str) {
        for c in s.chars() {
            match c {
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if c.is_control() => {
                    out.push_str(&format!("\\u{:04x}", c as u32));
                }
                c => out.push(c),
            }
        }
    }
}

#[cfg(test)]
fn render(level: Level, event: &str, fields: &[(&str, &str)]) -> String {
    let mut buffer = Vec::new();
    Logger::write_line(level, event, fields, &mut buffer);
    String::from_utf8(buffer).unwrap()
}

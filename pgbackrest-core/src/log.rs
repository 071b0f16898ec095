//LICENSE Portions Copyright 2019-2021 ZomboDB, LLC.
//LICENSE
//LICENSE Portions Copyright 2021-2023 Technology Concepts & Design, Inc.
//LICENSE
//LICENSE Portions Copyright 2023-2023 PgCentral Foundation, Inc. <contact@pgcentral.org>
//LICENSE
//LICENSE All rights reserved.
//LICENSE
//LICENSE Use of this source code is governed by the MIT license that can be found in the LICENSE file.
//! Component F: leveled diagnostics.
//!
//! Grounded in `pgrx-pg-sys/src/submodules/elog.rs`'s `PgLogLevel` enum and its
//! `ereport!`/`debug1!`/`warning!` macro family, simplified for a crate with no
//! Postgres server process to report into: there is one terminal sink (standard
//! error), no GUC-driven `client_min_messages` filtering, and `ereport!` at
//! [`LogLevel::Error`] or above unwinds through [`crate::throw`] rather than
//! returning -- exactly mirroring the split `pgrx-pg-sys::panic::ErrorReportWithLevel`
//! draws between side-effecting log levels and the one that panics.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU8, Ordering};

/// A log level, ordered from least to most severe. Distinct from [`crate::error::ErrorType`]:
/// a level gates whether a line prints at all, a type classifies *why* something
/// failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

impl LogLevel {
    fn as_label(self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

static MIN_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

/// Sets the minimum level that [`do_log`]/the `ereport!` family will print.
/// `Error`-level calls always unwind regardless of this setting -- it only gates
/// whether the line is printed, not whether a throw happens.
pub fn set_min_level(level: LogLevel) {
    MIN_LEVEL.store(level as u8, Ordering::Relaxed);
}

fn min_level() -> LogLevel {
    match MIN_LEVEL.load(Ordering::Relaxed) {
        0 => LogLevel::Trace,
        1 => LogLevel::Debug,
        2 => LogLevel::Info,
        3 => LogLevel::Warn,
        _ => LogLevel::Error,
    }
}

thread_local! {
    static SINK: RefCell<Option<Box<dyn FnMut(&str)>>> = const { RefCell::new(None) };
}

/// Installs a per-thread sink for log lines, overriding the default (standard
/// error). Collaborators' test harnesses use this to capture output instead of
/// scraping stderr.
pub fn set_sink(sink: impl FnMut(&str) + 'static) {
    SINK.with(|s| *s.borrow_mut() = Some(Box::new(sink)));
}

pub fn clear_sink() {
    SINK.with(|s| *s.borrow_mut() = None);
}

/// Formats and emits one log line at `level`, from the call site `location`, if
/// `level >= ` the configured minimum. Called by the [`crate::ereport`] family;
/// collaborators should use those macros so the call site is captured.
#[track_caller]
pub fn do_log(level: LogLevel, location: &std::panic::Location<'_>, message: &str) {
    if level < min_level() {
        return;
    }

    let line = format!("{:<5} {}:{}: {}\n", level.as_label(), location.file(), location.line(), message);

    let printed = SINK.with(|s| {
        if let Some(sink) = s.borrow_mut().as_mut() {
            sink(&line);
            true
        } else {
            false
        }
    });

    if !printed {
        eprint!("{line}");
    }
}

/// Logs at a given [`LogLevel`], unwinding via [`crate::throw`] with an
/// [`crate::error::types::UNHANDLED_ERROR`] if `level` is [`LogLevel::Error`] or above.
/// Below `Error` this is purely a side-effecting print, distinct from `throw!`'s
/// nonlocal jump.
#[macro_export]
macro_rules! ereport {
    ($level:expr, $($arg:tt)*) => {{
        let level = $level;
        let location = std::panic::Location::caller();
        let message = format!($($arg)*);

        if level >= $crate::log::LogLevel::Error {
            $crate::error::do_throw(
                &$crate::error::types::UNHANDLED_ERROR,
                location.file(),
                $crate::function_name!(),
                location.line(),
                message,
            );
        } else {
            $crate::log::do_log(level, location, &message);
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn below_min_level_is_suppressed() {
        set_min_level(LogLevel::Warn);
        let captured: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let c = captured.clone();
        set_sink(move |line: &str| c.borrow_mut().push(line.to_string()));

        ereport!(LogLevel::Debug, "should not appear");
        ereport!(LogLevel::Warn, "should appear");

        assert_eq!(captured.borrow().len(), 1);
        assert!(captured.borrow()[0].contains("should appear"));

        clear_sink();
        set_min_level(LogLevel::Info);
    }

    #[test]
    #[should_panic]
    fn error_level_unwinds_instead_of_printing() {
        ereport!(LogLevel::Error, "fatal-ish diagnostic");
    }
}

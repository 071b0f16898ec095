//LICENSE Portions Copyright 2019-2021 ZomboDB, LLC.
//LICENSE
//LICENSE Portions Copyright 2021-2023 Technology Concepts & Design, Inc.
//LICENSE
//LICENSE Portions Copyright 2023-2023 PgCentral Foundation, Inc. <contact@pgcentral.org>
//LICENSE
//LICENSE All rights reserved.
//LICENSE
//LICENSE Use of this source code is governed by the MIT license that can be found in the LICENSE file.
//! The caught/reported side of a throw: [`ErrorReport`], [`CaughtError`], the
//! thread-local "last error" record, and the terminal diagnostic printed for an
//! error that reaches the top of the stack uncaught.
//!
//! Grounded in `pgrx-pg-sys/src/submodules/panic.rs`'s `ErrorReport` /
//! `CaughtError` split, simplified: this crate has no foreign (Postgres) error
//! variant to carry, so `CaughtError` only distinguishes a proper `throw!` from an
//! arbitrary Rust panic that was never meant to unwind through `PgTryBuilder`.

use std::any::Any;
use std::cell::RefCell;
use std::panic::Location;

use super::types::{ErrorType, UNHANDLED_ERROR};

/// A fully-formed error report, built at the point of `throw!` and carried inside
/// the panic payload until some frame catches it.
#[derive(Debug)]
pub struct ErrorReport {
    pub error_type: &'static ErrorType,
    pub file: String,
    pub function: String,
    pub line: u32,
    pub message: String,
    pub backtrace: Option<std::backtrace::Backtrace>,
}

impl ErrorReport {
    pub fn is_fatal(&self) -> bool {
        self.error_type.fatal
    }
}

/// What a `PgTryBuilder` catch handler receives.
///
/// `Thrown` is a proper `throw!`/`throw_sys!`. `ForeignPanic` is any other Rust
/// panic that unwound into a `PgTryBuilder::execute()` call; it is reported as an
/// [`UNHANDLED_ERROR`] so it can still be matched by `catch_others`, carrying the
/// original payload for a handler that wants to re-inspect or re-panic with it.
pub enum CaughtError {
    Thrown(ErrorReport),
    ForeignPanic { report: ErrorReport, payload: Box<dyn Any + Send> },
}

impl CaughtError {
    pub fn report(&self) -> &ErrorReport {
        match self {
            CaughtError::Thrown(r) => r,
            CaughtError::ForeignPanic { report, .. } => report,
        }
    }

    pub fn error_type(&self) -> &'static ErrorType {
        self.report().error_type
    }

    pub fn message(&self) -> &str {
        &self.report().message
    }
}

/// Builds a [`CaughtError`] from whatever `std::panic::catch_unwind` handed back.
pub(crate) fn caught_from_panic_payload(payload: Box<dyn Any + Send>) -> CaughtError {
    match payload.downcast::<ErrorReport>() {
        Ok(report) => CaughtError::Thrown(*report),
        Err(payload) => {
            let message = if let Some(s) = payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "non-string panic payload".to_string()
            };

            let report = ErrorReport {
                error_type: &UNHANDLED_ERROR,
                file: String::from("<unknown>"),
                function: String::from("<unknown>"),
                line: 0,
                message,
                backtrace: None,
            };

            CaughtError::ForeignPanic { report, payload }
        }
    }
}

thread_local! {
    static LAST_ERROR: RefCell<Option<LastError>> = const { RefCell::new(None) };
}

struct LastError {
    error_type: &'static ErrorType,
    file: String,
    function: String,
    line: u32,
    message: String,
}

pub(crate) fn record_last_error(report: &ErrorReport) {
    LAST_ERROR.with(|slot| {
        *slot.borrow_mut() = Some(LastError {
            error_type: report.error_type,
            file: report.file.clone(),
            function: report.function.clone(),
            line: report.line,
            message: report.message.clone(),
        });
    });
}

/// Clears the thread's last-error record. Not required by any collaborator, but
/// kept for test isolation and symmetry with the C `errorInternalPropagate` reset.
pub fn clear_last_error() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}

/// The type of the most recently thrown error on this thread, if any.
///
/// Meaningful inside a catch handler; outside one it reflects whatever was last
/// thrown (or `None` if nothing has been thrown yet on this thread), mirroring the
/// non-enforced contract the C implementation documents for its own globals.
pub fn last_error_type() -> Option<&'static ErrorType> {
    LAST_ERROR.with(|slot| slot.borrow().as_ref().map(|e| e.error_type))
}

pub fn last_error_message() -> Option<String> {
    LAST_ERROR.with(|slot| slot.borrow().as_ref().map(|e| e.message.clone()))
}

pub fn last_error_file() -> Option<String> {
    LAST_ERROR.with(|slot| slot.borrow().as_ref().map(|e| e.file.clone()))
}

pub fn last_error_function() -> Option<String> {
    LAST_ERROR.with(|slot| slot.borrow().as_ref().map(|e| e.function.clone()))
}

pub fn last_error_line() -> Option<u32> {
    LAST_ERROR.with(|slot| slot.borrow().as_ref().map(|e| e.line))
}

/// True if the most recently thrown error on this thread is, or descends from,
/// `ancestor`.
pub fn last_error_instance_of(ancestor: &'static ErrorType) -> bool {
    last_error_type().is_some_and(|t| t.is_a(ancestor))
}

/// The `#[track_caller]` location a `throw!` site was invoked from, formatted the
/// way the crate's panic hook wants it (`file:line`).
pub(crate) fn location_string(location: &Location<'_>) -> String {
    format!("{}:{}", location.file(), location.line())
}

/// Formats the terminal diagnostic for an error that reached the top of the stack
/// uncaught, per the external contract: `"Uncaught <name>: <message>\n    thrown at
/// <file>:<line>\n"`.
pub fn uncaught_diagnostic(report: &ErrorReport) -> String {
    format!(
        "Uncaught {}: {}\n    thrown at {}:{}\n",
        report.error_type.name, report.message, report.file, report.line
    )
}

/// Installs a panic hook that prints the [`uncaught_diagnostic`] for an
/// [`ErrorReport`] payload instead of Rust's default panic banner, and falls back
/// to the default hook for any other panic payload.
///
/// Collaborators call this once during process start-up (there is no `ctor`-style
/// automatic registration, matching this crate's dependency stack, which carries no
/// constructor-injection crate).
pub fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if let Some(report) = info.payload().downcast_ref::<ErrorReport>() {
            eprint!("{}", uncaught_diagnostic(report));
        } else {
            default_hook(info);
        }
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::types::FORMAT_ERROR;

    #[test]
    fn uncaught_diagnostic_matches_external_contract() {
        let report = ErrorReport {
            error_type: &FORMAT_ERROR,
            file: "src/main.rs".to_string(),
            function: "main".to_string(),
            line: 42,
            message: "bad input".to_string(),
            backtrace: None,
        };

        assert_eq!(
            uncaught_diagnostic(&report),
            "Uncaught FormatError: bad input\n    thrown at src/main.rs:42\n"
        );
    }

    #[test]
    fn last_error_round_trips_through_thread_local() {
        clear_last_error();
        assert!(last_error_type().is_none());

        let report = ErrorReport {
            error_type: &FORMAT_ERROR,
            file: "a.rs".to_string(),
            function: "f".to_string(),
            line: 7,
            message: "m".to_string(),
            backtrace: None,
        };
        record_last_error(&report);

        assert!(std::ptr::eq(last_error_type().unwrap(), &FORMAT_ERROR));
        assert_eq!(last_error_message().unwrap(), "m");
        assert_eq!(last_error_line().unwrap(), 7);
        assert!(last_error_instance_of(&crate::error::types::RUNTIME_ERROR));
        clear_last_error();
    }
}

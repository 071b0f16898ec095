//LICENSE Portions Copyright 2019-2021 ZomboDB, LLC.
//LICENSE
//LICENSE Portions Copyright 2021-2023 Technology Concepts & Design, Inc.
//LICENSE
//LICENSE Portions Copyright 2023-2023 PgCentral Foundation, Inc. <contact@pgcentral.org>
//LICENSE
//LICENSE All rights reserved.
//LICENSE
//LICENSE Use of this source code is governed by the MIT license that can be found in the LICENSE file.
//! Component A: the scoped try/catch/finally error unwinder.
//!
//! The C implementation's `setjmp`/`longjmp` frame stack is reimplemented on top of
//! `std::panic::catch_unwind`/`panic_any`, per `spec.md` §9's own recommendation and
//! grounded in `pgx-pg-sys/src/submodules/pg_try.rs` (`PgTryBuilder`) and
//! `pgrx-pg-sys/src/submodules/panic.rs` (`CaughtError`/`ErrorReport`). Callers never
//! see the panic machinery directly; they build a [`PgTryBuilder`].

mod frame;
pub mod report;
pub mod retry;
pub mod try_builder;
pub mod types;

pub use report::{
    clear_last_error, install_panic_hook, last_error_file, last_error_function,
    last_error_instance_of, last_error_line, last_error_message, last_error_type,
    uncaught_diagnostic, CaughtError, ErrorReport,
};
pub use try_builder::PgTryBuilder;
pub use types::ErrorType;

use crate::config::MESSAGE_BUFFER_SIZE;

fn truncate_message(message: String) -> String {
    if message.len() <= MESSAGE_BUFFER_SIZE {
        message
    } else {
        let mut truncated: String = message.chars().take(MESSAGE_BUFFER_SIZE.saturating_sub(3)).collect();
        truncated.push_str("...");
        truncated
    }
}

/// Throws `error_type` with `message`, recording it as this thread's last error and
/// panicking with an [`ErrorReport`] payload. Never returns.
///
/// Called by the [`crate::throw`] macro; collaborators should use that macro rather
/// than calling this directly, since it captures `file!()`/`line!()`/the calling
/// function name at the right call site.
#[track_caller]
pub fn do_throw(error_type: &'static ErrorType, file: &str, function: &str, line: u32, message: String) -> ! {
    let message = truncate_message(message);

    let report = ErrorReport {
        error_type,
        file: file.to_string(),
        function: function.to_string(),
        line,
        message,
        backtrace: Some(std::backtrace::Backtrace::capture()),
    };

    report::record_last_error(&report);
    std::panic::panic_any(report)
}

/// Like [`do_throw`], but appends `": [{errno}] {strerror(errno)}"` to `message`,
/// mirroring `errorInternalThrowSys`/`THROW_ON_SYS_ERROR`.
#[track_caller]
pub fn do_throw_sys(
    error_type: &'static ErrorType,
    file: &str,
    function: &str,
    line: u32,
    errno: i32,
    message: String,
) -> ! {
    // SAFETY: `libc::strerror` returns a pointer to a thread-local (glibc) or
    // process-static buffer that is valid to read immediately; it is never null.
    let description = unsafe {
        let ptr = libc::strerror(errno);
        std::ffi::CStr::from_ptr(ptr).to_string_lossy().into_owned()
    };

    do_throw(error_type, file, function, line, format!("{message}: [{errno}] {description}"))
}

/// Captures the enclosing function's name the way `#[track_caller]` captures a
/// call site: via a local zero-sized type's `std::any::type_name`.
#[macro_export]
macro_rules! function_name {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        let name = type_name_of(f);
        &name[..name.len() - 3]
    }};
}

/// Throws a typed error, panicking with a captured [`ErrorReport`].
///
/// ```
/// use pgbackrest_core::prelude::*;
///
/// let result = PgTryBuilder::new(|| -> u32 { throw!(FORMAT_ERROR, "bad value {}", 7) })
///     .catch_when(&FORMAT_ERROR, |_| 0)
///     .execute();
/// assert_eq!(result, 0);
/// ```
#[macro_export]
macro_rules! throw {
    ($error_type:expr, $($arg:tt)*) => {{
        $crate::error::do_throw(&$error_type, file!(), $crate::function_name!(), line!(), format!($($arg)*))
    }};
}

/// Alias for [`throw`], kept distinct to mirror the original `THROW`/`THROW_FMT`
/// split -- in Rust both forms are the same macro since `format!` already accepts a
/// plain string.
#[macro_export]
macro_rules! throw_fmt {
    ($error_type:expr, $($arg:tt)*) => {
        $crate::throw!($error_type, $($arg)*)
    };
}

/// Throws a typed error with an OS errno appended, mirroring `THROW_ON_SYS_ERROR`.
#[macro_export]
macro_rules! throw_sys {
    ($error_type:expr, $errno:expr, $($arg:tt)*) => {{
        $crate::error::do_throw_sys(
            &$error_type,
            file!(),
            $crate::function_name!(),
            line!(),
            $errno,
            format!($($arg)*),
        )
    }};
}

#[cfg(test)]
mod tests {
    use super::types::{ASSERT_ERROR, FORMAT_ERROR, KERNEL_ERROR, RUNTIME_ERROR};
    use super::*;

    #[test]
    fn catch_when_matches_a_proper_ancestor_of_the_thrown_type() {
        // spec.md §4.A: "catch(expected) -- true iff ... the current error is-an
        // expected". A clause registered for the root type must catch any
        // descendant, not just an exact code match.
        let result = PgTryBuilder::new(|| -> u32 { throw!(FORMAT_ERROR, "bad: {}", "x") })
            .catch_when(&RUNTIME_ERROR, |caught| {
                assert!(std::ptr::eq(caught.error_type(), &FORMAT_ERROR));
                7
            })
            .execute();
        assert_eq!(result, 7);
    }

    #[test]
    fn catch_when_matches_specific_type() {
        let result = PgTryBuilder::new(|| -> u32 { throw!(FORMAT_ERROR, "bad: {}", "x") })
            .catch_when(&FORMAT_ERROR, |caught| {
                assert_eq!(caught.message(), "bad: x");
                1
            })
            .execute();
        assert_eq!(result, 1);
    }

    #[test]
    fn catch_others_matches_when_no_specific_handler() {
        let result = PgTryBuilder::new(|| -> u32 { throw!(KERNEL_ERROR, "oops") })
            .catch_when(&FORMAT_ERROR, |_| 1)
            .catch_others(|caught| {
                assert!(std::ptr::eq(caught.error_type(), &KERNEL_ERROR));
                2
            })
            .execute();
        assert_eq!(result, 2);
    }

    #[test]
    fn finally_runs_on_success_and_on_catch() {
        let mut ran = 0;
        let result = PgTryBuilder::new(|| -> u32 { 5 })
            .finally(|| ran += 1)
            .execute();
        assert_eq!(result, 5);
        assert_eq!(ran, 1);

        let mut ran2 = 0;
        let _ = PgTryBuilder::new(|| -> u32 { throw!(FORMAT_ERROR, "x") })
            .catch_when(&FORMAT_ERROR, |_| 0)
            .finally(|| ran2 += 1)
            .execute();
        assert_eq!(ran2, 1);
    }

    #[test]
    #[should_panic]
    fn fatal_error_is_not_caught_by_catch_others() {
        PgTryBuilder::new(|| -> u32 { throw!(ASSERT_ERROR, "fatal") })
            .catch_others(|_| 0)
            .execute();
    }

    #[test]
    fn fatal_error_caught_by_catch_fatal_suppresses_finally() {
        let mut finally_ran = false;
        let result = PgTryBuilder::new(|| -> u32 { throw!(ASSERT_ERROR, "fatal") })
            .catch_fatal(|_| 9)
            .finally(|| finally_ran = true)
            .execute();
        assert_eq!(result, 9);
        assert!(!finally_ran, "finally must not run when catch_fatal handles the error");
    }

    #[test]
    fn uncaught_error_propagates_as_a_panic() {
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            PgTryBuilder::new(|| -> u32 { throw!(FORMAT_ERROR, "unmatched") })
                .catch_when(&KERNEL_ERROR, |_| 0)
                .execute()
        }));
        assert!(outcome.is_err());
    }
}

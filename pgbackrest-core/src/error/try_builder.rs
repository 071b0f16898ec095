//LICENSE Portions Copyright 2019-2021 ZomboDB, LLC.
//LICENSE
//LICENSE Portions Copyright 2021-2023 Technology Concepts & Design, Inc.
//LICENSE
//LICENSE Portions Copyright 2023-2023 PgCentral Foundation, Inc. <contact@pgcentral.org>
//LICENSE
//LICENSE All rights reserved.
//LICENSE
//LICENSE Use of this source code is governed by the MIT license that can be found in the LICENSE file.
//! `PgTryBuilder`: the public, ergonomic surface over the scoped try/catch/finally
//! state machine.
//!
//! Grounded in `pgx-pg-sys/src/submodules/pg_try.rs`'s `PgTryBuilder`: a builder
//! collecting a body closure, zero or more typed `catch_when` handlers, an optional
//! `catch_others`, and an optional `finally`, consumed by `execute()`. The dispatch
//! rule (fatal errors only reachable through `catch_fatal`, never through
//! `catch_when`/`catch_others`) and the finally-suppression-on-fatal-catch policy
//! come from `spec.md` §4.A / §9 and are not present in the teacher, which has no
//! fatal/non-fatal split.

use std::panic::{self, AssertUnwindSafe, UnwindSafe};

use super::frame::FrameGuard;
use super::report::{caught_from_panic_payload, CaughtError};
use super::types::ErrorType;
use crate::config::ErrorConfig;

type Handler<'a, R> = Box<dyn FnMut(CaughtError) -> R + 'a>;

/// Builds and executes one scoped try/catch/finally frame.
///
/// ```
/// use pgbackrest_core::prelude::*;
///
/// let result = PgTryBuilder::new(|| -> u32 {
///     throw!(FORMAT_ERROR, "could not parse '{}'", "abc");
/// })
/// .catch_when(&FORMAT_ERROR, |_caught| 0)
/// .execute();
///
/// assert_eq!(result, 0);
/// ```
pub struct PgTryBuilder<'a, R, F: FnOnce() -> R + UnwindSafe> {
    func: F,
    config: ErrorConfig,
    when: Vec<(&'static ErrorType, Handler<'a, R>)>,
    catch_fatal: Option<Handler<'a, R>>,
    catch_others: Option<Handler<'a, R>>,
    finally: Option<Box<dyn FnMut() + 'a>>,
}

impl<'a, R, F: FnOnce() -> R + UnwindSafe> PgTryBuilder<'a, R, F> {
    pub fn new(func: F) -> Self {
        Self {
            func,
            config: ErrorConfig::default(),
            when: Vec::new(),
            catch_fatal: None,
            catch_others: None,
            finally: None,
        }
    }

    /// Overrides the try-depth limit and message buffer size used for this frame.
    pub fn with_config(mut self, config: ErrorConfig) -> Self {
        self.config = config;
        self
    }

    /// Catches `error_type` or any error whose type descends from it (per
    /// `spec.md` §4.A: "catch by error type or by any proper ancestor"). When
    /// several registered clauses match, the one registered first (i.e. the most
    /// specific, by convention -- callers should register narrower types first)
    /// wins. Fatal types are never matched here; use `catch_fatal`.
    pub fn catch_when(mut self, error_type: &'static ErrorType, handler: impl FnMut(CaughtError) -> R + 'a) -> Self {
        self.when.push((error_type, Box::new(handler)));
        self
    }

    /// Catches any fatal error (`AssertError`, `MemoryError`, or a descendant).
    /// This is the only way a fatal error can be caught at all.
    pub fn catch_fatal(mut self, handler: impl FnMut(CaughtError) -> R + 'a) -> Self {
        self.catch_fatal = Some(Box::new(handler));
        self
    }

    /// Catches any non-fatal error not matched by a more specific `catch_when`.
    pub fn catch_others(mut self, handler: impl FnMut(CaughtError) -> R + 'a) -> Self {
        self.catch_others = Some(Box::new(handler));
        self
    }

    /// Registers a block that always runs exactly once, whether the body returned
    /// normally, was caught, or is about to propagate uncaught.
    pub fn finally(mut self, finally: impl FnMut() + 'a) -> Self {
        self.finally = Some(Box::new(finally));
        self
    }

    /// Runs the body, dispatches a caught error (if any) to the matching handler,
    /// always runs `finally` except in the fatal-catch-suppresses-finally case
    /// documented on [`catch_fatal`](Self::catch_fatal), and returns the result.
    ///
    /// If no registered handler matches, the error is resumed (re-panicked) after
    /// `finally` runs, so an enclosing frame (or the process-level panic hook) sees
    /// it next.
    pub fn execute(mut self) -> R {
        let _frame = FrameGuard::enter(self.config.try_max);
        let saved_context = crate::memcx::current_handle();

        let outcome = panic::catch_unwind(AssertUnwindSafe(self.func));

        // The body may have switched the current memory context without switching
        // back (e.g. it threw partway through a scoped block); every try frame,
        // successful or not, restores its entry context before catch/finally run.
        crate::memcx::switch_to(saved_context);

        match outcome {
            Ok(value) => {
                if let Some(mut finally) = self.finally {
                    finally();
                }
                value
            }
            Err(payload) => {
                let caught = caught_from_panic_payload(payload);
                let fatal = caught.error_type().fatal;

                if fatal {
                    match self.catch_fatal {
                        Some(mut handler) => handler(caught),
                        None => {
                            if let Some(mut finally) = self.finally {
                                finally();
                            }
                            panic::resume_unwind(Box::new(caught));
                        }
                    }
                } else {
                    let caught_type = caught.error_type();
                    let matched = self.when.iter().position(|(expected, _)| caught_type.is_a(expected));

                    if let Some(index) = matched {
                        let (_, mut handler) = self.when.remove(index);
                        let value = handler(caught);
                        if let Some(mut finally) = self.finally {
                            finally();
                        }
                        value
                    } else if let Some(mut handler) = self.catch_others.take() {
                        let value = handler(caught);
                        if let Some(mut finally) = self.finally {
                            finally();
                        }
                        value
                    } else {
                        if let Some(mut finally) = self.finally {
                            finally();
                        }
                        panic::resume_unwind(Box::new(caught));
                    }
                }
            }
        }
    }
}

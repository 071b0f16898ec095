//LICENSE Portions Copyright 2019-2021 ZomboDB, LLC.
//LICENSE
//LICENSE Portions Copyright 2021-2023 Technology Concepts & Design, Inc.
//LICENSE
//LICENSE Portions Copyright 2023-2023 PgCentral Foundation, Inc. <contact@pgcentral.org>
//LICENSE
//LICENSE All rights reserved.
//LICENSE
//LICENSE Use of this source code is governed by the MIT license that can be found in the LICENSE file.
//! The retry collector: accumulates a run of caught errors from repeated attempts
//! at the same operation and synthesizes one summary error from them.
//!
//! Grounded in `examples/original_source/test/src/module/common/errorRetryTest.c`.
//! That test fixed a grouping rule that isn't the obvious "consecutive run of the
//! same type": attempts after the first are grouped by *exact message text*, in
//! order of first occurrence, and a group's label is the type of its first member.
//! In the fixture, `FormatError/"message1"` at t=50ms and `ServiceError/"message1"`
//! at t=150ms merge into one `FormatError` group spanning 50-150ms even though a
//! `KernelError/"message2"` attempt at t=75ms falls between them.

use super::types::ErrorType;

/// Millisecond-resolution clock, injectable so tests can control elapsed time
/// deterministically instead of depending on the wall clock.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// The real wall clock, used by collaborators outside of tests.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

struct Attempt {
    error_type: &'static ErrorType,
    message: String,
    time_ms: u64,
}

/// Collects repeated failures of the same logical operation and renders a single
/// summarized error from them.
pub struct ErrorRetry {
    attempts: Vec<Attempt>,
    detail: bool,
}

impl Default for ErrorRetry {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorRetry {
    /// Detail collection starts disabled, matching the fixture's default
    /// (`errRetryNew()` with no explicit `hrnErrorRetryDetailEnable()` call).
    pub fn new() -> Self {
        Self { attempts: Vec::new(), detail: false }
    }

    /// Enables the per-group detail summary instead of the omitted-detail marker.
    pub fn enable_detail(&mut self) {
        self.detail = true;
    }

    /// Records one failed attempt.
    pub fn add(&mut self, error_type: &'static ErrorType, message: impl Into<String>, time_ms: u64) {
        self.attempts.push(Attempt { error_type, message: message.into(), time_ms });
    }

    /// Convenience: records the thread's current last-thrown error at `clock`'s
    /// current time.
    pub fn add_current(&mut self, clock: &dyn Clock) {
        if let (Some(error_type), Some(message)) =
            (super::report::last_error_type(), super::report::last_error_message())
        {
            self.add(error_type, message, clock.now_ms());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    /// The type of the first recorded attempt, or `None` if nothing was recorded.
    pub fn retry_type(&self) -> Option<&'static ErrorType> {
        self.attempts.first().map(|a| a.error_type)
    }

    /// The synthesized summary message.
    pub fn retry_message(&self) -> String {
        let Some(first) = self.attempts.first() else {
            return String::new();
        };

        let mut out = first.message.clone();

        if self.attempts.len() > 1 {
            if self.detail {
                for group in group_by_message(&self.attempts[1..]) {
                    out.push('\n');
                    out.push_str("    ");
                    out.push_str(&group.render());
                }
            } else {
                out.push('\n');
                out.push_str("[RETRY DETAIL OMITTED]");
            }
        }

        out
    }
}

struct Group<'a> {
    error_type: &'static ErrorType,
    message: &'a str,
    count: usize,
    min_ms: u64,
    max_ms: u64,
}

impl Group<'_> {
    fn render(&self) -> String {
        if self.count == 1 {
            format!("[{}] on retry at {}ms: {}", self.error_type.name, self.min_ms, self.message)
        } else {
            format!(
                "[{}] on {} retries from {}-{}ms: {}",
                self.error_type.name, self.count, self.min_ms, self.max_ms, self.message
            )
        }
    }
}

fn group_by_message(attempts: &[Attempt]) -> Vec<Group<'_>> {
    let mut groups: Vec<Group<'_>> = Vec::new();

    for attempt in attempts {
        if let Some(group) = groups.iter_mut().find(|g| g.message == attempt.message) {
            group.count += 1;
            group.min_ms = group.min_ms.min(attempt.time_ms);
            group.max_ms = group.max_ms.max(attempt.time_ms);
        } else {
            groups.push(Group {
                error_type: attempt.error_type,
                message: &attempt.message,
                count: 1,
                min_ms: attempt.time_ms,
                max_ms: attempt.time_ms,
            });
        }
    }

    groups
}

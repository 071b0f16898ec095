//LICENSE Portions Copyright 2019-2021 ZomboDB, LLC.
//LICENSE
//LICENSE Portions Copyright 2021-2023 Technology Concepts & Design, Inc.
//LICENSE
//LICENSE Portions Copyright 2023-2023 PgCentral Foundation, Inc. <contact@pgcentral.org>
//LICENSE
//LICENSE All rights reserved.
//LICENSE
//LICENSE Use of this source code is governed by the MIT license that can be found in the LICENSE file.
//! The try-frame depth counter.
//!
//! There is no `jmp_buf` stack to maintain here -- `std::panic::catch_unwind`
//! already gives each `PgTryBuilder::execute()` call its own unwind boundary. What
//! the C implementation's fixed-size `ERROR_TRY_MAX` frame array guarded against
//! (runaway recursive try-nesting) is reproduced as a simple thread-local depth
//! counter, checked on entry.

use std::cell::Cell;

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Current try-nesting depth on this thread.
pub fn depth() -> usize {
    DEPTH.with(|d| d.get())
}

/// RAII guard held for the lifetime of one `PgTryBuilder::execute()` call.
///
/// Constructing it past the configured limit throws a fatal `AssertError` (the
/// Rust analogue of the C implementation's `errorTryMax` assertion), which
/// propagates as an ordinary panic to whatever frame, if any, encloses this one.
pub(crate) struct FrameGuard;

impl FrameGuard {
    pub(crate) fn enter(try_max: usize) -> Self {
        let current = DEPTH.with(|d| d.get());

        if current >= try_max {
            super::do_throw(
                &super::types::ASSERT_ERROR,
                file!(),
                "FrameGuard::enter",
                line!(),
                format!("too many nested try frames (limit is {try_max})"),
            );
        }

        DEPTH.with(|d| d.set(current + 1));
        FrameGuard
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

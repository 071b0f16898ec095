//LICENSE Portions Copyright 2019-2021 ZomboDB, LLC.
//LICENSE
//LICENSE Portions Copyright 2021-2023 Technology Concepts & Design, Inc.
//LICENSE
//LICENSE Portions Copyright 2023-2023 PgCentral Foundation, Inc. <contact@pgcentral.org>
//LICENSE
//LICENSE All rights reserved.
//LICENSE
//LICENSE Use of this source code is governed by the MIT license that can be found in the LICENSE file.
//! Typed tunables for the core. Not a CLI surface -- collaborators that need a
//! non-default value construct one of these directly, the way a Postgres extension
//! picks a non-default `BLCKSZ` at compile time.

/// Depth limit for nested `PgTryBuilder::execute()` frames on one thread.
///
/// Mirrors `ERROR_TRY_MAX` in the original C implementation.
pub const TRY_MAX: usize = 32;

/// Scratch buffer size a thrown message is truncated to.
///
/// Mirrors `ERROR_MESSAGE_BUFFER_SIZE`. Unlike the C implementation (which truncates
/// mid-`vsnprintf`), a message longer than this is cut and given a trailing `"..."`
/// marker.
pub const MESSAGE_BUFFER_SIZE: usize = 8192;

/// Configuration for the error unwinder.
///
/// The defaults match [`TRY_MAX`] / [`MESSAGE_BUFFER_SIZE`]; this struct exists so a
/// collaborator embedding the core in an environment with tighter stack budgets can
/// lower `try_max` without touching the crate's source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorConfig {
    pub try_max: usize,
    pub message_buffer_size: usize,
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self { try_max: TRY_MAX, message_buffer_size: MESSAGE_BUFFER_SIZE }
    }
}

/// Configuration for the page checksum codec.
///
/// `page_size` must be a multiple of 128 bytes (the checksum block-compression
/// factor) for [`crate::checksum::page_checksum`] to accept it; the Postgres default
/// of 8192 is the common case but clusters built with a non-default `BLCKSZ` need a
/// different value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageChecksumConfig {
    pub page_size: u32,
}

impl Default for PageChecksumConfig {
    fn default() -> Self {
        Self { page_size: 8192 }
    }
}

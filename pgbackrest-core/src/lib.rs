//LICENSE Portions Copyright 2019-2021 ZomboDB, LLC.
//LICENSE
//LICENSE Portions Copyright 2021-2023 Technology Concepts & Design, Inc.
//LICENSE
//LICENSE Portions Copyright 2023-2023 PgCentral Foundation, Inc. <contact@pgcentral.org>
//LICENSE
//LICENSE All rights reserved.
//LICENSE
//LICENSE Use of this source code is governed by the MIT license that can be found in the LICENSE file.
//! `pgbackrest-core` is the runtime substrate a backup/restore tool is built on: a
//! scoped try/catch/finally error handler, a hierarchical memory-context arena, and
//! two bit-exact binary codecs (PostgreSQL page checksums, USTAR tar headers).
//!
//! ## Example
//!
//! ```rust
//! use pgbackrest_core::prelude::*;
//!
//! let result = PgTryBuilder::new(|| -> u32 {
//!     throw!(FORMAT_ERROR, "could not parse '{}'", "abc");
//! })
//! .catch_when(&FORMAT_ERROR, |_caught| 0)
//! .execute();
//!
//! assert_eq!(result, 0);
//! ```
#![allow(clippy::missing_safety_doc)]

pub mod checksum;
pub mod config;
pub mod error;
pub mod log;
pub mod memcx;
pub mod tar;
pub mod types;

/// Convenience re-exports for collaborators building on top of the core.
pub mod prelude {
    pub use crate::checksum::{page_checksum, page_valid, pages_valid};
    pub use crate::config::{ErrorConfig, PageChecksumConfig};
    pub use crate::error::{
        retry::ErrorRetry, CaughtError, ErrorReport, ErrorType, PgTryBuilder,
    };
    pub use crate::error::types::*;
    pub use crate::memcx::{MemContext, MemContextHandle};
    pub use crate::tar::{TarHeader, TarHeaderNewParam};
    pub use crate::types::{Buffer, ByteString, KeyValue, List, StringList};
    pub use crate::{ereport, throw};
}

//LICENSE Portions Copyright 2019-2021 ZomboDB, LLC.
//LICENSE
//LICENSE Portions Copyright 2021-2023 Technology Concepts & Design, Inc.
//LICENSE
//LICENSE Portions Copyright 2023-2023 PgCentral Foundation, Inc. <contact@pgcentral.org>
//LICENSE
//LICENSE All rights reserved.
//LICENSE
//LICENSE Use of this source code is governed by the MIT license that can be found in the LICENSE file.
//! Component C: the PostgreSQL data-page checksum, bit-exact against
//! `src/include/storage/checksum_impl.h` in the PostgreSQL project (as vendored at
//! `examples/original_source/src/postgres/pageChecksum.c`).
//!
//! The page is treated as a 32-column array of little-endian `u32` words. Each
//! column accumulates its own FNV-1a-derived running hash, seeded from one of 32
//! fixed offset constants; two extra zero-rounds mix the last word in, the 32
//! partial sums fold together with XOR, the block number is mixed in, and the
//! result is reduced to a nonzero `u16`. The constant table, the FNV prime, the
//! column count (32), the zero-mixing round count (2), and the final `% 65535 + 1`
//! reduction are all part of the on-disk contract -- changing any of them changes
//! every checksum ever computed.

use crate::error::types::FORMAT_ERROR;
use crate::throw;

/// Number of parallel FNV accumulators (and page columns). Part of the on-disk
/// contract; see module docs.
const N_SUMS: usize = 32;

/// FNV-1a prime multiplier.
const FNV_PRIME: u32 = 0x0100_0193;

/// Base offsets seeding each of the 32 parallel accumulators, reproduced
/// byte-for-byte from `checksumBaseOffsets` in the upstream C source.
const CHECKSUM_BASE_OFFSETS: [u32; N_SUMS] = [
    0x5B1F36E9, 0xB8525960, 0x02AB50AA, 0x1DE66D2A, 0x79FF467A, 0x9BB9F8A3, 0x217E7CD2, 0x83E13D2C,
    0xF8D4474F, 0xE39EB970, 0x42C6AE16, 0x993216FA, 0x7B093B5D, 0x98DAFF3C, 0xF718902A, 0x0B1C9CDB,
    0xE58F764B, 0x187636BC, 0x5D7B3BB1, 0xE73DE7DE, 0x92BEC979, 0xCCA6C0B2, 0x304A0979, 0x85AA43D4,
    0x783125BB, 0x6CA8EAA2, 0xE407EAC6, 0x4B5CFC3E, 0x9FBF8C76, 0x15CA20BE, 0xF2CA9FD3, 0x959BD756,
];

/// Byte offset of the 16-bit checksum field within a page header.
const PD_CHECKSUM_OFFSET: usize = 8;
/// Byte offset of the 16-bit `pd_upper` field within a page header.
const PD_UPPER_OFFSET: usize = 14;
/// Byte offset of the high (`walid`) half of the page LSN.
const PD_LSN_WALID_OFFSET: usize = 0;
/// Byte offset of the low (`xrecoff`) half of the page LSN.
const PD_LSN_XRECOFF_OFFSET: usize = 4;

#[inline]
fn checksum_comp(acc: u32, value: u32) -> u32 {
    let temp = acc ^ value;
    temp.wrapping_mul(FNV_PRIME) ^ (temp >> 17)
}

fn page_checksum_block(page: &[u8]) -> u32 {
    let mut sums = CHECKSUM_BASE_OFFSETS;

    for word_chunk in page.chunks_exact(4 * N_SUMS) {
        for (col, sum) in sums.iter_mut().enumerate() {
            let bytes = &word_chunk[col * 4..col * 4 + 4];
            let word = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            *sum = checksum_comp(*sum, word);
        }
    }

    for sum in sums.iter_mut() {
        *sum = checksum_comp(*sum, 0);
        *sum = checksum_comp(*sum, 0);
    }

    sums.iter().fold(0u32, |acc, s| acc ^ s)
}

fn check_page_size(page_size: u32) {
    if page_size == 0 || page_size % 128 != 0 {
        throw!(FORMAT_ERROR, "page size {} is not a positive multiple of 128", page_size);
    }
}

/// Computes the 16-bit checksum of one page. `page` must be exactly `page_size`
/// bytes; `page_size` must be a multiple of 128. The checksum field inside `page`
/// is treated as zero for the purpose of this computation -- the caller's buffer
/// is never mutated.
pub fn page_checksum(page: &[u8], block_no: u32, page_size: u32) -> u16 {
    check_page_size(page_size);

    if page.len() != page_size as usize {
        throw!(FORMAT_ERROR, "page buffer is {} bytes, expected {}", page.len(), page_size);
    }

    let checksum = if page[PD_CHECKSUM_OFFSET] == 0 && page[PD_CHECKSUM_OFFSET + 1] == 0 {
        page_checksum_block(page)
    } else {
        let mut owned = page.to_vec();
        owned[PD_CHECKSUM_OFFSET] = 0;
        owned[PD_CHECKSUM_OFFSET + 1] = 0;
        page_checksum_block(&owned)
    };

    let checksum = checksum ^ block_no;
    ((checksum % 65535) + 1) as u16
}

/// True if `page` is valid: either it is a new/empty page (`pd_upper == 0`), its
/// LSN is at or after `(ignore_wal_id, ignore_wal_offset)` (it may be torn and
/// validation is skipped), or its stored checksum matches [`page_checksum`].
pub fn page_valid(page: &[u8], block_no: u32, page_size: u32, ignore_wal_id: u32, ignore_wal_offset: u32) -> bool {
    check_page_size(page_size);

    if page.len() != page_size as usize {
        throw!(FORMAT_ERROR, "page buffer is {} bytes, expected {}", page.len(), page_size);
    }

    let pd_upper = u16::from_le_bytes([page[PD_UPPER_OFFSET], page[PD_UPPER_OFFSET + 1]]);
    if pd_upper == 0 {
        return true;
    }

    let wal_id = u32::from_le_bytes([
        page[PD_LSN_WALID_OFFSET],
        page[PD_LSN_WALID_OFFSET + 1],
        page[PD_LSN_WALID_OFFSET + 2],
        page[PD_LSN_WALID_OFFSET + 3],
    ]);
    let wal_offset = u32::from_le_bytes([
        page[PD_LSN_XRECOFF_OFFSET],
        page[PD_LSN_XRECOFF_OFFSET + 1],
        page[PD_LSN_XRECOFF_OFFSET + 2],
        page[PD_LSN_XRECOFF_OFFSET + 3],
    ]);

    if wal_id >= ignore_wal_id && wal_offset >= ignore_wal_offset {
        return true;
    }

    let stored = u16::from_le_bytes([page[PD_CHECKSUM_OFFSET], page[PD_CHECKSUM_OFFSET + 1]]);
    stored == page_checksum(page, block_no, page_size)
}

/// Validates every page in `buffer`, treating it as `buffer.len() / page_size`
/// consecutive pages starting at `block_no_start`. Throws a format error if
/// `buffer.len()` is not a positive multiple of `page_size`; otherwise returns
/// `false` on the first invalid page.
pub fn pages_valid(
    buffer: &[u8],
    block_no_start: u32,
    page_size: u32,
    ignore_wal_id: u32,
    ignore_wal_offset: u32,
) -> bool {
    check_page_size(page_size);

    let page_size_usize = page_size as usize;
    if buffer.is_empty() || buffer.len() % page_size_usize != 0 {
        throw!(
            FORMAT_ERROR,
            "buffer size {} is not a positive multiple of page size {}",
            buffer.len(),
            page_size
        );
    }

    for (i, page) in buffer.chunks_exact(page_size_usize).enumerate() {
        if !page_valid(page, block_no_start + i as u32, page_size, ignore_wal_id, ignore_wal_offset) {
            return false;
        }
    }

    true
}

//! On-disk and in-memory layout of one L2P index file (§6): logical
//! `(revision, item_index)` to physical offset.
//!
//! A finished index file is `[page bodies...][header blob][header_len: u32]
//! [magic: u32]`, header last so the builder can stream page bodies straight
//! through without knowing the final page table's size up front. A reader
//! opens the file, seeks to `file_len - 8` to read the footer, then seeks
//! back `8 + header_len` bytes to read the header blob — which is exactly
//! what the header cache stores, so a cache hit skips the footer read
//! entirely. Page bodies are addressed from the start of the file by a
//! prefix sum over the page table's byte sizes, computed once when the
//! header is parsed.
//!
//! Header blob, built with [`crate::serializer::BlobWriter`]:
//!
//! ```text
//! root (28 bytes):
//!   first_revision            u64
//!   page_size                 u32   (P, items per page)
//!   revision_count            u32
//!   total_page_count          u32
//!   page_table_index_offset   u32   -> page_table_index array
//!   page_table_offset         u32   -> page_table array
//! page_table_index: (revision_count + 1) x u32, prefix sums.
//!   revision r (0-based, relative to first_revision) owns pages
//!   [page_table_index[r], page_table_index[r + 1]).
//! page_table: total_page_count x (page_byte_size: u32, entry_count: u32)
//! ```
//!
//! A page body is `entry_count` back-to-back zig-zag varints (§4.3's ivarint
//! codec), one per item slot in the page; `ABSENT_OFFSET` marks an item slot
//! with no known physical offset yet (a padding slot past the revision's
//! real item count, or an item not yet committed).

use crate::error::{IndexError, Result};
use crate::serializer::{resolve_offset, BlobWriter};
use crate::varint::{read_ivarint, write_ivarint, Decoded};

pub const L2P_MAGIC: u32 = 0x4c32_5058; // "L2PX"

/// Size of the trailing footer: `header_len: u32` followed by `magic: u32`.
pub const FOOTER_LEN: u64 = 8;

/// Sentinel for "no physical offset recorded for this item slot".
pub const ABSENT_OFFSET: i64 = -1;

const ROOT_LEN: usize = 28;
const PAGE_TABLE_INDEX_FIELD: usize = 20;
const PAGE_TABLE_FIELD: usize = 24;

/// One entry in the page table: the page's encoded byte length in the file,
/// and how many item slots it covers (equal to `page_size` except for a
/// revision's final page, which may be shorter).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTableEntry {
    pub byte_size: u32,
    pub entry_count: u32,
}

/// Parsed view over a header blob, re-derived on every call from the raw
/// bytes rather than held as a separate owned struct — the blob itself is
/// what the header cache stores, so there is exactly one copy of this data
/// in memory per cache entry.
pub struct L2pHeader<'a> {
    blob: &'a [u8],
}

impl<'a> L2pHeader<'a> {
    pub fn parse(blob: &'a [u8]) -> Result<Self> {
        if blob.len() < ROOT_LEN {
            return Err(IndexError::corruption(
                "l2p-header",
                0,
                "header blob shorter than fixed root",
            ));
        }
        Ok(L2pHeader { blob })
    }

    fn u64_at(&self, pos: usize) -> u64 {
        u64::from_le_bytes(self.blob[pos..pos + 8].try_into().unwrap())
    }

    fn u32_at(&self, pos: usize) -> u32 {
        u32::from_le_bytes(self.blob[pos..pos + 4].try_into().unwrap())
    }

    pub fn first_revision(&self) -> u64 {
        self.u64_at(0)
    }

    pub fn page_size(&self) -> u32 {
        self.u32_at(8)
    }

    pub fn revision_count(&self) -> u32 {
        self.u32_at(12)
    }

    pub fn total_page_count(&self) -> u32 {
        self.u32_at(16)
    }

    /// Partial get: the `[start_page, end_page)` range owned by `revision`,
    /// relative to `first_revision`. Touches only the two neighboring
    /// prefix-sum entries, never the whole page table.
    pub fn page_range_for_revision(&self, revision_index: u32) -> Result<(u32, u32)> {
        let revision_count = self.revision_count();
        if revision_index >= revision_count {
            return Err(IndexError::revision(
                self.first_revision() + revision_index as u64,
                self.first_revision(),
                revision_count as u64,
            ));
        }
        let table = resolve_offset(self.blob, PAGE_TABLE_INDEX_FIELD).ok_or_else(|| {
            IndexError::corruption("l2p-header", 0, "missing page_table_index array")
        })?;
        let start = read_u32_entry(table, revision_index as usize)?;
        let end = read_u32_entry(table, revision_index as usize + 1)?;
        Ok((start, end))
    }

    /// Partial get: the page table entry for absolute page number `page_no`.
    pub fn page_table_entry(&self, page_no: u32) -> Result<PageTableEntry> {
        if page_no >= self.total_page_count() {
            return Err(IndexError::corruption(
                "l2p-header",
                0,
                "page number out of range",
            ));
        }
        let table = resolve_offset(self.blob, PAGE_TABLE_FIELD)
            .ok_or_else(|| IndexError::corruption("l2p-header", 0, "missing page_table array"))?;
        let pos = page_no as usize * 8;
        let byte_size = u32::from_le_bytes(table[pos..pos + 4].try_into().unwrap());
        let entry_count = u32::from_le_bytes(table[pos + 4..pos + 8].try_into().unwrap());
        Ok(PageTableEntry {
            byte_size,
            entry_count,
        })
    }

    /// Byte offset of page `page_no`'s body relative to the start of the
    /// page-bodies region, computed as a prefix sum over preceding pages'
    /// `byte_size`. O(page_no); callers on a hot path should cache this
    /// alongside the decoded page itself rather than recomputing per lookup.
    pub fn page_body_offset(&self, page_no: u32) -> Result<u64> {
        let mut offset = 0u64;
        for p in 0..page_no {
            offset += self.page_table_entry(p)?.byte_size as u64;
        }
        Ok(offset)
    }
}

fn read_u32_entry(table: &[u8], index: usize) -> Result<u32> {
    let pos = index * 4;
    table
        .get(pos..pos + 4)
        .map(|s| u32::from_le_bytes(s.try_into().unwrap()))
        .ok_or_else(|| IndexError::corruption("l2p-header", pos as u64, "page_table_index truncated"))
}

/// Build a header blob for a finished L2P index shard.
///
/// `page_table_index` has `revision_count + 1` entries (prefix sums);
/// `page_table` has `page_table_index[revision_count]` entries.
pub fn build_header_blob(
    first_revision: u64,
    page_size: u32,
    page_table_index: &[u32],
    page_table: &[PageTableEntry],
) -> Vec<u8> {
    let revision_count = (page_table_index.len() - 1) as u32;
    let total_page_count = page_table.len() as u32;

    let mut root = [0u8; ROOT_LEN];
    root[0..8].copy_from_slice(&first_revision.to_le_bytes());
    root[8..12].copy_from_slice(&page_size.to_le_bytes());
    root[12..16].copy_from_slice(&revision_count.to_le_bytes());
    root[16..20].copy_from_slice(&total_page_count.to_le_bytes());
    // page_table_index_offset / page_table_offset fields (at 20, 24) are
    // patched in by BlobWriter below; PAGE_TABLE_INDEX_FIELD/PAGE_TABLE_FIELD
    // must match those positions.
    let mut w = BlobWriter::init(&root, 1024 + page_table.len() * 8);

    let mut index_bytes = Vec::with_capacity(page_table_index.len() * 4);
    for &v in page_table_index {
        index_bytes.extend_from_slice(&v.to_le_bytes());
    }
    w.push_leaf(PAGE_TABLE_INDEX_FIELD, &index_bytes);

    let mut table_bytes = Vec::with_capacity(page_table.len() * 8);
    for entry in page_table {
        table_bytes.extend_from_slice(&entry.byte_size.to_le_bytes());
        table_bytes.extend_from_slice(&entry.entry_count.to_le_bytes());
    }
    w.push_leaf(PAGE_TABLE_FIELD, &table_bytes);

    w.finish()
}

/// Encode one page body: `offsets` in item-slot order, `ABSENT_OFFSET` for
/// slots with no physical location yet. Per §4.4/§6, each slot is stored as
/// `offset + 1` (0 meaning unused) and delta-encoded against the previous
/// slot's `offset + 1` value, starting from an implicit `last = 0` — this is
/// what makes a page of mostly-contiguous offsets compact: each delta is
/// usually a handful of bytes instead of a full 10-byte varint.
pub fn encode_page(offsets: &[i64]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(offsets.len() * 2);
    let mut last: i64 = 0;
    for &offset in offsets {
        let plus_one = if offset == ABSENT_OFFSET { 0 } else { offset + 1 };
        write_ivarint(plus_one - last, &mut buf);
        last = plus_one;
    }
    buf
}

/// Decode a page body back into per-slot offsets. `expected_entries` is the
/// page table's `entry_count` for this page, used only to preallocate and to
/// detect a short/corrupt page.
pub fn decode_page(body: &[u8], expected_entries: u32) -> Result<Vec<i64>> {
    let mut out = Vec::with_capacity(expected_entries as usize);
    let mut pos = 0usize;
    let mut last: i64 = 0;
    while pos < body.len() {
        let Decoded { value, consumed } = read_ivarint(&body[pos..]).map_err(|_| {
            IndexError::corruption("l2p-page", pos as u64, "malformed varint in page body")
        })?;
        let plus_one = last + value;
        last = plus_one;
        out.push(if plus_one == 0 { ABSENT_OFFSET } else { plus_one - 1 });
        pos += consumed;
    }
    if out.len() != expected_entries as usize {
        return Err(IndexError::corruption(
            "l2p-page",
            0,
            "page entry count does not match page table",
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_blob_roundtrip() {
        let page_table_index = vec![0u32, 2, 3];
        let page_table = vec![
            PageTableEntry {
                byte_size: 10,
                entry_count: 4,
            },
            PageTableEntry {
                byte_size: 12,
                entry_count: 4,
            },
            PageTableEntry {
                byte_size: 5,
                entry_count: 2,
            },
        ];
        let blob = build_header_blob(100, 4, &page_table_index, &page_table);
        let header = L2pHeader::parse(&blob).unwrap();
        assert_eq!(header.first_revision(), 100);
        assert_eq!(header.page_size(), 4);
        assert_eq!(header.revision_count(), 2);
        assert_eq!(header.total_page_count(), 3);

        assert_eq!(header.page_range_for_revision(0).unwrap(), (0, 2));
        assert_eq!(header.page_range_for_revision(1).unwrap(), (2, 3));

        let entry = header.page_table_entry(1).unwrap();
        assert_eq!(entry.byte_size, 12);
        assert_eq!(entry.entry_count, 4);

        assert_eq!(header.page_body_offset(0).unwrap(), 0);
        assert_eq!(header.page_body_offset(1).unwrap(), 10);
        assert_eq!(header.page_body_offset(2).unwrap(), 22);
    }

    #[test]
    fn page_body_roundtrip_with_absent_slots() {
        let offsets = vec![0, 128, ABSENT_OFFSET, 99999];
        let body = encode_page(&offsets);
        let decoded = decode_page(&body, offsets.len() as u32).unwrap();
        assert_eq!(decoded, offsets);
    }
}

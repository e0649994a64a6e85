//! On-disk and in-memory layout of one P2L index file (§6): physical offset
//! to the logical item occupying it.
//!
//! Mirrors `l2p::format`'s footer-last file shape: `[page bodies...]
//! [header blob][header_len: u32][magic: u32]`. Unlike an L2P page (a fixed
//! number of item slots), a P2L page covers a fixed `cluster_size` (`Q`)
//! *byte range* of the physical file and holds however many entries happen
//! to start in that range — so the page table carries an explicit
//! `entry_count` per page rather than assuming `page_size` holds everywhere,
//! and a page's entries are delta-encoded against the page's nominal start
//! (first entry) or the previous entry's end (every entry after).
//!
//! Header blob:
//!
//! ```text
//! root (28 bytes):
//!   first_revision    u64
//!   file_size         u64
//!   cluster_size      u32   (Q, bytes per page)
//!   page_count        u32
//!   page_table_offset u32   -> page_table array
//! page_table: page_count x (byte_size: u32, entry_count: u32)
//! ```
//!
//! Physical coverage is total: every byte in `[0, file_size)` belongs to
//! exactly one entry, real or a synthetic [`P2lEntry::item_type`] ==
//! [`crate::proto::P2lProtoEntry::TYPE_UNUSED`] padding entry the builder
//! inserts over any gap.

use crate::error::{IndexError, Result};
use crate::serializer::{resolve_offset, BlobWriter};
use crate::varint::{read_ivarint, read_uvarint, write_ivarint, write_uvarint, Decoded};

pub const P2L_MAGIC: u32 = 0x4c32_5058 ^ 0x0101_0101; // "P2LX"-ish, distinct from L2P's
pub const FOOTER_LEN: u64 = 8;

const ROOT_LEN: usize = 28;
const PAGE_TABLE_FIELD: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTableEntry {
    pub byte_size: u32,
    pub entry_count: u32,
}

/// One decoded P2L entry: physical offset, size, owning revision, item
/// number within that revision, an FNV-1 checksum over the item's bytes, and
/// the stored item-type byte (`TYPE_UNUSED` for a synthetic coverage-filling
/// entry).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct P2lEntry {
    pub offset: i64,
    pub size: u64,
    pub revision: u64,
    pub item_number: u64,
    pub fnv1_checksum: u32,
    pub item_type: u8,
}

impl P2lEntry {
    pub fn end(&self) -> i64 {
        self.offset + self.size as i64
    }
}

pub struct P2lHeader<'a> {
    blob: &'a [u8],
}

impl<'a> P2lHeader<'a> {
    pub fn parse(blob: &'a [u8]) -> Result<Self> {
        if blob.len() < ROOT_LEN {
            return Err(IndexError::corruption(
                "p2l-header",
                0,
                "header blob shorter than fixed root",
            ));
        }
        Ok(P2lHeader { blob })
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

    pub fn file_size(&self) -> u64 {
        self.u64_at(8)
    }

    pub fn cluster_size(&self) -> u32 {
        self.u32_at(16)
    }

    pub fn page_count(&self) -> u32 {
        self.u32_at(20)
    }

    pub fn page_table_entry(&self, page_no: u32) -> Result<PageTableEntry> {
        if page_no >= self.page_count() {
            return Err(IndexError::corruption(
                "p2l-header",
                0,
                "page number out of range",
            ));
        }
        let table = resolve_offset(self.blob, PAGE_TABLE_FIELD)
            .ok_or_else(|| IndexError::corruption("p2l-header", 0, "missing page_table array"))?;
        let pos = page_no as usize * 8;
        let byte_size = u32::from_le_bytes(table[pos..pos + 4].try_into().unwrap());
        let entry_count = u32::from_le_bytes(table[pos + 4..pos + 8].try_into().unwrap());
        Ok(PageTableEntry {
            byte_size,
            entry_count,
        })
    }

    /// Byte offset of page `page_no`'s body relative to the start of the
    /// page-bodies region.
    pub fn page_body_offset(&self, page_no: u32) -> Result<u64> {
        let mut offset = 0u64;
        for p in 0..page_no {
            offset += self.page_table_entry(p)?.byte_size as u64;
        }
        Ok(offset)
    }

    /// Which page covers physical offset `phys_offset`, clamped to the last
    /// page if `phys_offset` is at or past `file_size` (the usual query for
    /// "where does the file currently end").
    pub fn page_for_offset(&self, phys_offset: u64) -> u32 {
        let cluster_size = self.cluster_size().max(1) as u64;
        let page_count = self.page_count();
        if page_count == 0 {
            return 0;
        }
        ((phys_offset / cluster_size) as u32).min(page_count - 1)
    }
}

pub fn build_header_blob(
    first_revision: u64,
    file_size: u64,
    cluster_size: u32,
    page_table: &[PageTableEntry],
) -> Vec<u8> {
    let page_count = page_table.len() as u32;
    let mut root = [0u8; ROOT_LEN];
    root[0..8].copy_from_slice(&first_revision.to_le_bytes());
    root[8..16].copy_from_slice(&file_size.to_le_bytes());
    root[16..20].copy_from_slice(&cluster_size.to_le_bytes());
    root[20..24].copy_from_slice(&page_count.to_le_bytes());

    let mut w = BlobWriter::init(&root, 1024 + page_table.len() * 8);
    let mut table_bytes = Vec::with_capacity(page_table.len() * 8);
    for entry in page_table {
        table_bytes.extend_from_slice(&entry.byte_size.to_le_bytes());
        table_bytes.extend_from_slice(&entry.entry_count.to_le_bytes());
    }
    w.push_leaf(PAGE_TABLE_FIELD, &table_bytes);
    w.finish()
}

/// `compound = item_number * 8 + item_type` (§3, §4.5): a 3-bit type field
/// packed below a dense item-number, so the two can be delta-encoded
/// together as one zig-zag varint instead of two.
fn compound_of(item_number: u64, item_type: u8) -> i64 {
    (item_number as i64) * 8 + item_type as i64
}

fn split_compound(compound: i64) -> (u64, u8) {
    ((compound / 8) as u64, (compound % 8) as u8)
}

/// Encode one page body. `entries` must be sorted by `offset` and must
/// already cover the page's byte range with no gaps (the builder's job, not
/// this function's). Starting a new page resets the running revision to
/// `first_revision` and the running compound to 0 (§4.5 point 2).
pub fn encode_page(entries: &[P2lEntry], first_revision: u64, page_start: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(entries.len() * 12);
    let mut prev_end = page_start as i64;
    let mut prev_revision = first_revision;
    let mut prev_compound = 0i64;
    for entry in entries {
        let compound = compound_of(entry.item_number, entry.item_type);
        write_ivarint(entry.offset - prev_end, &mut buf);
        write_uvarint(entry.size, &mut buf);
        write_ivarint(compound - prev_compound, &mut buf);
        write_ivarint(entry.revision as i64 - prev_revision as i64, &mut buf);
        buf.extend_from_slice(&entry.fnv1_checksum.to_le_bytes());
        prev_end = entry.end();
        prev_revision = entry.revision;
        prev_compound = compound;
    }
    buf
}

/// Decode a page body back into its entries.
pub fn decode_page(
    body: &[u8],
    expected_entries: u32,
    first_revision: u64,
    page_start: u64,
) -> Result<Vec<P2lEntry>> {
    let mut out = Vec::with_capacity(expected_entries as usize);
    let mut pos = 0usize;
    let mut prev_end = page_start as i64;
    let mut prev_revision = first_revision;
    let mut prev_compound = 0i64;
    while pos < body.len() {
        let Decoded {
            value: offset_delta,
            consumed,
        } = read_ivarint(&body[pos..]).map_err(|_| {
            IndexError::corruption("p2l-page", pos as u64, "malformed offset delta")
        })?;
        pos += consumed;
        let Decoded {
            value: size,
            consumed,
        } = read_uvarint(&body[pos..])
            .map_err(|_| IndexError::corruption("p2l-page", pos as u64, "malformed size"))?;
        pos += consumed;
        let Decoded {
            value: compound_delta,
            consumed,
        } = read_ivarint(&body[pos..]).map_err(|_| {
            IndexError::corruption("p2l-page", pos as u64, "malformed compound delta")
        })?;
        pos += consumed;
        let Decoded {
            value: revision_delta,
            consumed,
        } = read_ivarint(&body[pos..]).map_err(|_| {
            IndexError::corruption("p2l-page", pos as u64, "malformed revision delta")
        })?;
        pos += consumed;
        let checksum_bytes: [u8; 4] = body
            .get(pos..pos + 4)
            .ok_or_else(|| IndexError::corruption("p2l-page", pos as u64, "truncated checksum"))?
            .try_into()
            .unwrap();
        pos += 4;

        let compound = prev_compound + compound_delta;
        let (item_number, item_type) = split_compound(compound);
        prev_compound = compound;

        let offset = prev_end + offset_delta;
        let revision = (prev_revision as i64 + revision_delta) as u64;
        let entry = P2lEntry {
            offset,
            size,
            revision,
            item_number,
            fnv1_checksum: u32::from_le_bytes(checksum_bytes),
            item_type,
        };
        prev_end = entry.end();
        prev_revision = entry.revision;
        out.push(entry);
    }
    if out.len() != expected_entries as usize {
        return Err(IndexError::corruption(
            "p2l-page",
            0,
            "page entry count does not match page table",
        ));
    }
    Ok(out)
}

//! Builds a finished P2L index file from one revision's (or one packed
//! shard's) proto log (§4.1, §6).
//!
//! Unlike the L2P builder, a P2L index needs the *whole* revision's entries
//! before it can assign any of them to a page, because an entry belongs to
//! the page matching its own physical offset and entries can arrive out of
//! offset order (items are appended to the proto log in the order they are
//! written, not in file-offset order, once a transaction touches more than
//! one node). So entries are buffered in memory up to
//! `Config::spill_threshold`; past that the builder still holds them (this
//! crate does not implement the teacher's spill-to-temp-file path — see
//! `DESIGN.md` for why that's out of scope here) but logs a warning via
//! `tracing`, since a revision that large is itself unusual.
//!
//! Two invariants the builder enforces that the proto log does not:
//! - **Revision rewriting**: a proto entry recorded before its revision was
//!   finalized carries [`crate::proto::INVALID_REVISION`]; the builder
//!   rewrites every such entry to `finalize_revision` before emitting pages.
//! - **Total physical coverage**: every byte of `[0, file_size)` must belong
//!   to exactly one entry. Gaps between sorted entries (and before the
//!   first / after the last) are filled with a synthetic entry of
//!   `P2lProtoEntry::TYPE_UNUSED`.
//!
//! Once the footer is flushed, the sink seals itself read-only via
//! [`crate::sink::FinalizeSink`], mirroring the L2P builder.

use std::io::Write;

use crate::config::Config;
use crate::error::{IndexError, Result};
use crate::p2l::format::{build_header_blob, encode_page, P2lEntry, PageTableEntry, FOOTER_LEN, P2L_MAGIC};
use crate::proto::{ProtoReader, P2lProtoEntry, INVALID_REVISION};
use crate::sink::FinalizeSink;

pub struct P2lBuilder<W> {
    sink: W,
    config: Config,
    first_revision: u64,
}

impl<W: Write + FinalizeSink> P2lBuilder<W> {
    pub fn new(sink: W, config: Config, first_revision: u64) -> Self {
        P2lBuilder {
            sink,
            config,
            first_revision,
        }
    }

    /// Drain `proto`, rewrite any [`INVALID_REVISION`] sentinel to
    /// `finalize_revision`, and write the finished index (page bodies,
    /// header, footer) to the sink.
    pub fn build_from_proto<R: std::io::Read>(
        mut self,
        proto: &mut ProtoReader<R>,
        finalize_revision: u64,
        file_size: u64,
    ) -> Result<W> {
        let mut entries = Vec::new();
        while let Some(raw) = proto.next_p2l()? {
            entries.push(to_entry(raw, finalize_revision));
        }
        if entries.len() > self.config.spill_threshold {
            tracing::warn!(
                entry_count = entries.len(),
                spill_threshold = self.config.spill_threshold,
                "P2L proto log exceeds the in-memory spill threshold; buffering anyway"
            );
        }
        entries.sort_by_key(|e| e.offset);

        let entries = fill_gaps(entries, file_size, finalize_revision);

        let cluster_size = self.config.p2l_cluster_size as u32;
        let page_count = if file_size == 0 {
            1
        } else {
            ((file_size + cluster_size as u64 - 1) / cluster_size as u64) as u32
        };

        let mut page_table = Vec::with_capacity(page_count as usize);
        let mut bytes_written = 0u64;
        let mut entry_cursor = 0usize;
        for page_no in 0..page_count {
            let page_start = page_no as u64 * cluster_size as u64;
            let page_end = (page_start + cluster_size as u64).min(file_size).max(page_start);

            let mut page_entries = Vec::new();
            while entry_cursor < entries.len() {
                let e = &entries[entry_cursor];
                if (e.offset as u64) >= page_start && (e.offset as u64) < page_end {
                    page_entries.push(*e);
                    entry_cursor += 1;
                } else {
                    break;
                }
            }

            let body = encode_page(&page_entries, self.first_revision, page_start);
            self.sink
                .write_all(&body)
                .map_err(|e| IndexError::io("p2l-index", bytes_written, e))?;
            bytes_written += body.len() as u64;
            page_table.push(PageTableEntry {
                byte_size: body.len() as u32,
                entry_count: page_entries.len() as u32,
            });
        }

        let header = build_header_blob(self.first_revision, file_size, cluster_size, &page_table);
        self.sink
            .write_all(&header)
            .map_err(|e| IndexError::io("p2l-index", bytes_written, e))?;
        self.sink
            .write_all(&(header.len() as u32).to_le_bytes())
            .map_err(|e| IndexError::io("p2l-index", bytes_written, e))?;
        self.sink
            .write_all(&P2L_MAGIC.to_le_bytes())
            .map_err(|e| IndexError::io("p2l-index", bytes_written, e))?;
        let total_bytes = bytes_written + header.len() as u64 + FOOTER_LEN;
        self.sink
            .flush()
            .map_err(|e| IndexError::io("p2l-index", total_bytes, e))?;
        self.sink
            .finalize()
            .map_err(|e| IndexError::io("p2l-index", total_bytes, e))?;
        Ok(self.sink)
    }
}

fn to_entry(raw: P2lProtoEntry, finalize_revision: u64) -> P2lEntry {
    let revision = if raw.revision == INVALID_REVISION {
        finalize_revision
    } else {
        raw.revision
    };
    P2lEntry {
        offset: raw.offset,
        size: raw.size,
        revision,
        item_number: raw.item_number,
        fnv1_checksum: raw.fnv1_checksum,
        item_type: raw.item_type,
    }
}

/// Insert a synthetic `TYPE_UNUSED` entry over every gap in `entries` so the
/// whole `[0, file_size)` range is covered. `entries` must already be sorted
/// by offset.
fn fill_gaps(entries: Vec<P2lEntry>, file_size: u64, revision: u64) -> Vec<P2lEntry> {
    let mut out = Vec::with_capacity(entries.len() + 4);
    let mut cursor = 0i64;
    for entry in entries {
        if entry.offset > cursor {
            out.push(padding_entry(cursor, entry.offset - cursor, revision));
        }
        cursor = cursor.max(entry.end());
        out.push(entry);
    }
    if (cursor as u64) < file_size {
        out.push(padding_entry(cursor, file_size as i64 - cursor, revision));
    }
    out
}

fn padding_entry(offset: i64, size: i64, revision: u64) -> P2lEntry {
    P2lEntry {
        offset,
        size: size as u64,
        revision,
        item_number: 0,
        fnv1_checksum: 0,
        item_type: P2lProtoEntry::TYPE_UNUSED,
    }
}

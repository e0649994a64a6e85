//! Builds a finished L2P index file from one revision's (or one packed
//! shard's) proto log (§4.1, §6).
//!
//! The proto log is a flat stream of `(offset, item_index)` pairs
//! terminated per revision by [`L2pProtoRecord::END_OF_REVISION`]. The
//! builder groups each revision's records into fixed-size pages (`page_size`
//! item slots each), fills any slot with no corresponding record with
//! [`ABSENT_OFFSET`], and streams each page body to the output file as soon
//! as it fills — so memory held at any time is at most one page, not one
//! whole revision, which matters once a packed shard spans hundreds of
//! revisions. The header (whose size depends on the total page count) is
//! only known once every page has been written, so it goes last, capped by
//! a small fixed footer a reader can find by seeking from the end of the
//! file (`Config::spill_threshold` governs the analogous spill-to-disk
//! decision in the P2L builder, where entries arrive less predictably
//! ordered). Once the footer is flushed, the sink seals itself read-only via
//! [`crate::sink::FinalizeSink`] — a no-op for the in-memory sinks the tests
//! use, a `set_permissions` call for a real `std::fs::File`.

use std::io::Write;

use crate::config::Config;
use crate::error::{IndexError, Result};
use crate::l2p::format::{
    build_header_blob, encode_page, PageTableEntry, ABSENT_OFFSET, FOOTER_LEN, L2P_MAGIC,
};
use crate::proto::{L2pProtoRecord, ProtoReader};
use crate::sink::FinalizeSink;

/// Accumulates one revision's item slots until a page boundary.
///
/// `slots` is indexed relative to `base` — the absolute item-index of
/// `slots[0]` — not by the raw item-index itself. `take_page` advances
/// `base` by however many slots it removes, so a later `set` for an
/// item-index past an already-flushed page lands at the right relative
/// position instead of re-padding from slot 0.
struct PageAccumulator {
    base: usize,
    slots: Vec<i64>,
}

impl PageAccumulator {
    fn new() -> Self {
        PageAccumulator {
            base: 0,
            slots: Vec::new(),
        }
    }

    fn set(&mut self, item_index: usize, offset: i64) {
        let rel = item_index - self.base;
        if self.slots.len() <= rel {
            self.slots.resize(rel + 1, ABSENT_OFFSET);
        }
        self.slots[rel] = offset;
    }

    fn take_page(&mut self, count: usize) -> Vec<i64> {
        let tail = self.slots.split_off(count.min(self.slots.len()));
        let page = std::mem::replace(&mut self.slots, tail);
        self.base += page.len();
        page
    }
}

/// Builds one L2P index file by draining an entire proto log into `sink`.
pub struct L2pBuilder<W> {
    sink: W,
    config: Config,
    first_revision: u64,
    page_table_index: Vec<u32>,
    page_table: Vec<PageTableEntry>,
    bytes_written: u64,
}

impl<W: Write + FinalizeSink> L2pBuilder<W> {
    pub fn new(sink: W, config: Config, first_revision: u64) -> Self {
        L2pBuilder {
            sink,
            config,
            first_revision,
            page_table_index: vec![0],
            page_table: Vec::new(),
            bytes_written: 0,
        }
    }

    fn flush_page(&mut self, accumulator: &mut PageAccumulator, take: usize) -> Result<()> {
        let page = accumulator.take_page(take);
        let entry_count = page.len() as u32;
        let body = encode_page(&page);
        self.sink
            .write_all(&body)
            .map_err(|e| IndexError::io("l2p-index", self.bytes_written, e))?;
        self.bytes_written += body.len() as u64;
        self.page_table.push(PageTableEntry {
            byte_size: body.len() as u32,
            entry_count,
        });
        Ok(())
    }

    /// Consume every record in `proto`, writing page bodies to the sink as
    /// they fill, then append the header blob and footer. Returns the
    /// finished sink (the file handle, or an in-memory buffer in tests).
    pub fn build_from_proto<R: std::io::Read>(mut self, proto: &mut ProtoReader<R>) -> Result<W> {
        let page_size = self.config.l2p_page_size as usize;
        let mut accumulator = PageAccumulator::new();

        while let Some(record) = proto.next_l2p()? {
            if record.is_end_of_revision() {
                while !accumulator.slots.is_empty() {
                    let take = accumulator.slots.len().min(page_size);
                    self.flush_page(&mut accumulator, take)?;
                }
                self.page_table_index.push(self.page_table.len() as u32);
                accumulator.base = 0;
                continue;
            }
            accumulator.set(record.item_index as usize, record.offset());
            if accumulator.slots.len() >= page_size {
                self.flush_page(&mut accumulator, page_size)?;
            }
        }
        // A revision still open at the end of the proto log (no trailing
        // END_OF_REVISION marker) still needs its partial page flushed and
        // its page-table-index boundary recorded.
        while !accumulator.slots.is_empty() {
            let take = accumulator.slots.len().min(page_size.max(1));
            self.flush_page(&mut accumulator, take)?;
        }
        if self.page_table.len() as u32 != *self.page_table_index.last().unwrap() {
            self.page_table_index.push(self.page_table.len() as u32);
        }

        let header = build_header_blob(
            self.first_revision,
            self.config.l2p_page_size as u32,
            &self.page_table_index,
            &self.page_table,
        );
        self.sink
            .write_all(&header)
            .map_err(|e| IndexError::io("l2p-index", self.bytes_written, e))?;
        self.sink
            .write_all(&(header.len() as u32).to_le_bytes())
            .map_err(|e| IndexError::io("l2p-index", self.bytes_written, e))?;
        self.sink
            .write_all(&L2P_MAGIC.to_le_bytes())
            .map_err(|e| IndexError::io("l2p-index", self.bytes_written, e))?;
        self.bytes_written += header.len() as u64 + FOOTER_LEN;
        self.sink
            .flush()
            .map_err(|e| IndexError::io("l2p-index", self.bytes_written, e))?;
        self.sink
            .finalize()
            .map_err(|e| IndexError::io("l2p-index", self.bytes_written, e))?;
        Ok(self.sink)
    }
}

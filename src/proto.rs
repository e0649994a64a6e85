//! Proto-index writer and reader: the fixed-record append logs kept during a
//! transaction, consumed exactly once by the respective final-index builder,
//! then deleted with the transaction (deletion itself is the surrounding
//! transaction layer's job, not this crate's).
//!
//! Both proto formats are fixed-size binary records in (repository-local)
//! little-endian byte order — see `DESIGN.md` for why this crate picks a
//! concrete byte order rather than leaving it "native", as the distilled
//! spec's §6 does.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{IndexError, Result};

/// Sentinel meaning "this proto entry's revision was not yet known when it
/// was appended" — rewritten to the finalized revision by the P2L builder.
pub const INVALID_REVISION: u64 = u64::MAX;

/// One L2P proto record: `(offset + 1, item_index)`. A record with both
/// fields zero marks the end of one revision's contribution and the start
/// of the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct L2pProtoRecord {
    pub offset_plus_one: u64,
    pub item_index: u64,
}

pub const L2P_PROTO_RECORD_SIZE: usize = 16;

impl L2pProtoRecord {
    pub const END_OF_REVISION: L2pProtoRecord = L2pProtoRecord {
        offset_plus_one: 0,
        item_index: 0,
    };

    pub fn entry(offset: i64, item_index: u64) -> Self {
        debug_assert!(
            item_index < u64::MAX / 2,
            "item_index must stay below UINT_MAX/2"
        );
        L2pProtoRecord {
            offset_plus_one: (offset + 1) as u64,
            item_index,
        }
    }

    pub fn is_end_of_revision(&self) -> bool {
        self.offset_plus_one == 0 && self.item_index == 0
    }

    pub fn offset(&self) -> i64 {
        self.offset_plus_one as i64 - 1
    }

    fn write<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_u64::<LittleEndian>(self.offset_plus_one)?;
        w.write_u64::<LittleEndian>(self.item_index)?;
        Ok(())
    }

    fn read<R: Read>(r: &mut R) -> std::io::Result<Self> {
        let offset_plus_one = r.read_u64::<LittleEndian>()?;
        let item_index = r.read_u64::<LittleEndian>()?;
        Ok(L2pProtoRecord {
            offset_plus_one,
            item_index,
        })
    }
}

/// One P2L proto entry, in fixed layout: `offset(i64) size(u64)
/// revision(u64) item_number(u64) fnv1_checksum(u32) type(u8) + 3 pad bytes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct P2lProtoEntry {
    pub offset: i64,
    pub size: u64,
    pub revision: u64,
    pub item_number: u64,
    pub fnv1_checksum: u32,
    pub item_type: u8,
}

pub const P2L_PROTO_RECORD_SIZE: usize = 40;

impl P2lProtoEntry {
    /// Type value reserved for the synthetic end-of-page padding entry.
    pub const TYPE_UNUSED: u8 = 0;

    fn write<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_i64::<LittleEndian>(self.offset)?;
        w.write_u64::<LittleEndian>(self.size)?;
        w.write_u64::<LittleEndian>(self.revision)?;
        w.write_u64::<LittleEndian>(self.item_number)?;
        w.write_u32::<LittleEndian>(self.fnv1_checksum)?;
        w.write_u8(self.item_type)?;
        w.write_all(&[0u8; 3])?;
        Ok(())
    }

    fn read<R: Read>(r: &mut R) -> std::io::Result<Self> {
        let offset = r.read_i64::<LittleEndian>()?;
        let size = r.read_u64::<LittleEndian>()?;
        let revision = r.read_u64::<LittleEndian>()?;
        let item_number = r.read_u64::<LittleEndian>()?;
        let fnv1_checksum = r.read_u32::<LittleEndian>()?;
        let item_type = r.read_u8()?;
        let mut pad = [0u8; 3];
        r.read_exact(&mut pad)?;
        Ok(P2lProtoEntry {
            offset,
            size,
            revision,
            item_number,
            fnv1_checksum,
            item_type,
        })
    }

    pub fn end(&self) -> i64 {
        self.offset + self.size as i64
    }
}

/// Append-only writer shared by both proto logs. No reordering, no
/// deduplication — the caller flushes on transaction commit.
pub struct ProtoWriter<W> {
    inner: W,
}

impl<W: Write> ProtoWriter<W> {
    pub fn new(inner: W) -> Self {
        ProtoWriter { inner }
    }

    pub fn write_l2p(&mut self, record: &L2pProtoRecord) -> std::io::Result<()> {
        record.write(&mut self.inner)
    }

    pub fn write_p2l(&mut self, entry: &P2lProtoEntry) -> std::io::Result<()> {
        entry.write(&mut self.inner)
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Sequential reader over one of the two proto logs.
pub struct ProtoReader<R> {
    inner: R,
    file_name: std::path::PathBuf,
    offset: u64,
}

impl<R: Read> ProtoReader<R> {
    pub fn new(inner: R, file_name: impl AsRef<std::path::Path>) -> Self {
        ProtoReader {
            inner,
            file_name: file_name.as_ref().to_path_buf(),
            offset: 0,
        }
    }

    /// Read the next L2P proto record, or `Ok(None)` at a clean EOF (i.e. no
    /// partial record).
    pub fn next_l2p(&mut self) -> Result<Option<L2pProtoRecord>> {
        match L2pProtoRecord::read(&mut self.inner) {
            Ok(r) => {
                self.offset += L2P_PROTO_RECORD_SIZE as u64;
                Ok(Some(r))
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(IndexError::io(self.file_name.clone(), self.offset, e)),
        }
    }

    /// Read the next P2L proto entry, or `Ok(None)` at a clean EOF.
    pub fn next_p2l(&mut self) -> Result<Option<P2lProtoEntry>> {
        match P2lProtoEntry::read(&mut self.inner) {
            Ok(r) => {
                self.offset += P2L_PROTO_RECORD_SIZE as u64;
                Ok(Some(r))
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(IndexError::io(self.file_name.clone(), self.offset, e)),
        }
    }
}

//! Packed-integer codec.
//!
//! Two independent encodings live here:
//!
//! - The main codec (`write_uvarint`/`read_uvarint`, `write_ivarint`/
//!   `read_ivarint`): 7 bits per byte, least-significant group first,
//!   continuation bit set in all but the final byte. This is what every
//!   on-disk index file and proto log uses for its integer fields. Signed
//!   values are zig-zag mapped onto unsigned ones first.
//! - A much narrower, older encoding (`encode_cache_key_component`/
//!   `decode_cache_key_component`) used nowhere in the on-disk formats — it
//!   exists only so a cache key can be rendered as a short, printable,
//!   space-joinable string. `cache::Key` does not use it (a typed Rust key
//!   is the idiomatic choice for a hash-map key), but it is kept as a
//!   faithful, independently testable translation of that historical corner
//!   of the format.
//!
//! Also: [`PackedIntReader`], a prefetching stream reader over an
//! append-only file that exposes `get()`/`seek()` random access on top of
//! the main codec.

use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{IndexError, Result};

/// Maximum encoded length of one unsigned 64-bit varint.
pub const MAX_VARINT_BYTES: usize = 10;

const CONTINUATION: u8 = 0x80;
const PAYLOAD_MASK: u8 = 0x7f;

/// Encode `v` as an unsigned varint, appending to `buf`. Returns the number
/// of bytes written.
pub fn write_uvarint(mut v: u64, buf: &mut Vec<u8>) -> usize {
    let start = buf.len();
    loop {
        let byte = (v & PAYLOAD_MASK as u64) as u8;
        v >>= 7;
        if v != 0 {
            buf.push(byte | CONTINUATION);
        } else {
            buf.push(byte);
            break;
        }
    }
    buf.len() - start
}

/// Zig-zag map a signed value onto an unsigned one: `v < 0 ? -1-2v : 2v`.
#[inline]
pub fn zigzag_encode(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

/// Inverse of [`zigzag_encode`].
#[inline]
pub fn zigzag_decode(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

/// Encode a signed value as a zig-zag varint.
pub fn write_ivarint(v: i64, buf: &mut Vec<u8>) -> usize {
    write_uvarint(zigzag_encode(v), buf)
}

/// Result of decoding one varint from a byte slice: the value, and how many
/// bytes of `buf` it consumed.
#[derive(Debug, PartialEq, Eq)]
pub struct Decoded<T> {
    pub value: T,
    pub consumed: usize,
}

#[derive(Debug, PartialEq, Eq)]
pub enum VarintDecodeError {
    /// Ran out of bytes before the continuation bit cleared.
    Truncated,
    /// More than 10 bytes, or the final byte's bits would shift out of a
    /// 64-bit value. ("number too large" in the distilled spec's failure
    /// modes.)
    Overflow,
}

/// Decode one unsigned varint from the front of `buf`.
pub fn read_uvarint(buf: &[u8]) -> std::result::Result<Decoded<u64>, VarintDecodeError> {
    let mut result: u64 = 0;
    let mut shift: u32 = 0;
    for (i, &byte) in buf.iter().enumerate() {
        if i >= MAX_VARINT_BYTES {
            return Err(VarintDecodeError::Overflow);
        }
        let payload = (byte & PAYLOAD_MASK) as u64;
        if shift >= 64 || (shift == 63 && payload > 1) {
            return Err(VarintDecodeError::Overflow);
        }
        result |= payload << shift;
        if byte & CONTINUATION == 0 {
            return Ok(Decoded {
                value: result,
                consumed: i + 1,
            });
        }
        shift += 7;
    }
    Err(VarintDecodeError::Truncated)
}

/// Decode one signed (zig-zag) varint from the front of `buf`.
pub fn read_ivarint(buf: &[u8]) -> std::result::Result<Decoded<i64>, VarintDecodeError> {
    let Decoded { value, consumed } = read_uvarint(buf)?;
    Ok(Decoded {
        value: zigzag_decode(value),
        consumed,
    })
}

// ── Legacy cache-key component encoding (not used on any on-disk path) ──────

const KEY_DIGIT_BASE: u8 = b'0';
const KEY_DIGIT_BITS: u32 = 5;
const KEY_DIGIT_CONT: u8 = 0x20;
const KEY_DIGIT_MASK: u8 = 0x1f;

/// Render a signed integer as a short printable token suitable for joining
/// several of them into a space-separated cache-key string. See the module
/// doc comment: this format is historical and is not used by [`crate::cache`].
pub fn encode_cache_key_component(v: i64) -> String {
    let mut s = String::with_capacity(4);
    s.push(if v.is_negative() { '-' } else { '+' });
    let mut mag = v.unsigned_abs();
    loop {
        let group = (mag & KEY_DIGIT_MASK as u64) as u8;
        mag >>= KEY_DIGIT_BITS;
        let cont = mag != 0;
        let byte = KEY_DIGIT_BASE + group + if cont { KEY_DIGIT_CONT } else { 0 };
        s.push(byte as char);
        if !cont {
            break;
        }
    }
    s
}

/// Inverse of [`encode_cache_key_component`].
pub fn decode_cache_key_component(s: &str) -> Option<i64> {
    let mut chars = s.chars();
    let sign = match chars.next()? {
        '+' => 1i64,
        '-' => -1i64,
        _ => return None,
    };
    let mut mag: u64 = 0;
    let mut shift: u32 = 0;
    for c in chars {
        let raw = u32::try_from(c).ok()?;
        let base = KEY_DIGIT_BASE as u32;
        if raw < base || raw > base + 0x3f {
            return None;
        }
        let byte = (raw - base) as u8;
        let cont = byte & KEY_DIGIT_CONT != 0;
        let group = (byte & KEY_DIGIT_MASK) as u64;
        mag |= group << shift;
        shift += KEY_DIGIT_BITS;
        if !cont {
            break;
        }
    }
    Some(sign * mag as i64)
}

// ── Prefetching stream reader ───────────────────────────────────────────────

/// How many bytes a single refill reads from disk before re-decoding.
/// The distilled spec calls this `K`; as written it conflates a count of
/// prefetched values with a byte budget. This crate resolves `K` as a byte
/// budget (see `DESIGN.md`): a refill reads at most this many bytes, clipped
/// to the end of the current `block_size`-aligned block, and decodes
/// whatever whole values fall out of that window.
pub const PREFETCH_CHUNK_BYTES: u64 = 64;

struct PrefetchEntry {
    value: u64,
    /// Cumulative bytes consumed since `start_offset`, *through* this entry.
    total_len: u64,
}

/// A prefetching, randomly-seekable reader of unsigned varints over an
/// append-only file.
pub struct PackedIntReader<R> {
    inner: R,
    file_name: PathBuf,
    block_size: u64,
    /// File offset at which `buffer[0]` begins.
    start_offset: u64,
    buffer: Vec<PrefetchEntry>,
    /// Index of the next unread entry in `buffer`.
    cursor: usize,
}

impl<R: Read + Seek> PackedIntReader<R> {
    pub fn new(inner: R, file_name: impl AsRef<Path>, block_size: u64) -> Self {
        PackedIntReader {
            inner,
            file_name: file_name.as_ref().to_path_buf(),
            block_size: block_size.max(1),
            start_offset: 0,
            buffer: Vec::new(),
            cursor: 0,
        }
    }

    /// The file offset the next `get()` will read from.
    pub fn current_offset(&self) -> u64 {
        if self.cursor == 0 {
            self.start_offset
        } else {
            self.start_offset + self.buffer[self.cursor - 1].total_len
        }
    }

    fn entry_start(&self, i: usize) -> u64 {
        if i == 0 {
            0
        } else {
            self.buffer[i - 1].total_len
        }
    }

    /// Reposition the stream at `offset`. If `offset` falls inside the
    /// currently buffered range the cursor is simply moved; otherwise the
    /// buffer is invalidated and the next `get()` triggers a refill.
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        if offset >= self.start_offset {
            let rel = offset - self.start_offset;
            for i in 0..self.buffer.len() {
                let start = self.entry_start(i);
                if start == rel {
                    self.cursor = i;
                    return Ok(());
                }
                if start > rel {
                    break;
                }
            }
        }
        self.buffer.clear();
        self.cursor = 0;
        self.start_offset = offset;
        Ok(())
    }

    /// Read the next unsigned integer, refilling from disk if necessary.
    pub fn get(&mut self) -> Result<u64> {
        if self.cursor >= self.buffer.len() {
            self.refill()?;
        }
        if self.cursor >= self.buffer.len() {
            return Err(IndexError::corruption(
                self.file_name.clone(),
                self.current_offset(),
                "unexpected EOF while reading packed integer stream",
            ));
        }
        let v = self.buffer[self.cursor].value;
        self.cursor += 1;
        Ok(v)
    }

    fn refill(&mut self) -> Result<()> {
        let read_from = self.current_offset();
        self.start_offset = read_from;
        self.buffer.clear();
        self.cursor = 0;

        let block_end = (read_from / self.block_size + 1) * self.block_size;
        let window = (block_end - read_from).min(PREFETCH_CHUNK_BYTES);
        if window == 0 {
            return Ok(());
        }

        let mut chunk = vec![0u8; window as usize];
        self.inner
            .seek(SeekFrom::Start(read_from))
            .map_err(|e| IndexError::io(self.file_name.clone(), read_from, e))?;
        let mut filled = 0usize;
        loop {
            match self.inner.read(&mut chunk[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(IndexError::io(self.file_name.clone(), read_from, e)),
            }
            if filled == chunk.len() {
                break;
            }
        }
        let hit_real_eof = filled < chunk.len();
        let chunk = &chunk[..filled];

        let mut pos = 0usize;
        let mut cumulative = 0u64;
        while pos < chunk.len() {
            match read_uvarint(&chunk[pos..]) {
                Ok(Decoded { value, consumed }) => {
                    pos += consumed;
                    cumulative += consumed as u64;
                    self.buffer.push(PrefetchEntry {
                        value,
                        total_len: cumulative,
                    });
                }
                Err(VarintDecodeError::Overflow) => {
                    return Err(IndexError::corruption(
                        self.file_name.clone(),
                        read_from + pos as u64,
                        "packed integer exceeds 64 bits",
                    ));
                }
                Err(VarintDecodeError::Truncated) => {
                    if hit_real_eof {
                        return Err(IndexError::corruption(
                            self.file_name.clone(),
                            read_from + pos as u64,
                            "unexpected EOF mid-value",
                        ));
                    }
                    // Clipped at the block boundary with more file beyond:
                    // leave the incomplete trailing bytes for the next refill.
                    break;
                }
            }
        }
        Ok(())
    }
}

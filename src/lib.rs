//! # revidx — logical/physical item-index engine
//!
//! Format guarantees:
//! - All on-disk integers are packed varints (§4.3) or fixed little-endian
//!   fields in the proto logs (§6); never negotiated, never native-endian
//! - Every index file ends in a small fixed footer a reader locates by
//!   seeking from EOF, pointing back at the header blob that precedes it
//! - A header blob is a self-contained, offset-addressed structure
//!   (`serializer`) cacheable as opaque bytes and readable with a partial
//!   getter that never decodes more than the field asked for
//! - L2P pages are sized in item-slot counts (`P`); P2L pages are sized in
//!   physical byte ranges (`Q`) — every byte of a P2L-covered file belongs
//!   to exactly one entry, real or synthetic padding
//! - Every cache value is copy-out: a `get` returns an owned value, never a
//!   pinned borrow, so callers never race an eviction

pub mod cache;
pub mod config;
pub mod error;
pub mod fnv;
pub mod l2p;
pub mod p2l;
pub mod proto;
pub mod serializer;
pub mod sink;
pub mod varint;

// Flat re-exports for the most common types.
pub use cache::{BoundedCache, Cache, HeaderKey, PageKey, PartialCache};
pub use config::Config;
pub use error::{IndexError, Result};
pub use l2p::{L2pBuilder, L2pReader};
pub use p2l::{P2lBuilder, P2lEntry, P2lReader};
pub use proto::{L2pProtoRecord, P2lProtoEntry, ProtoReader, ProtoWriter, INVALID_REVISION};
pub use sink::FinalizeSink;
pub use varint::{read_ivarint, read_uvarint, write_ivarint, write_uvarint, PackedIntReader};

/// A cheap, derived summary of an index file's cached header: which
/// revisions it covers and whether it addresses a packed shard. Not itself
/// an on-disk structure — both readers derive it from fields their header
/// already carries, so asking for it costs no extra I/O on a warm reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevisionMeta {
    pub first_revision: u64,
    pub revision_count: u64,
    pub is_packed: bool,
}

//! Error taxonomy for the item-index engine.
//!
//! Every fallible operation in this crate returns [`IndexError`]. The four
//! kinds mirror the distilled specification's error design: a lookup can be
//! rejected because the revision isn't covered by the index, because the
//! item-index (or file-offset) runs past the revision's content, because the
//! on-disk bytes don't decode, or because the underlying filesystem failed.
//! Corruption and I/O variants always carry the file name and the byte
//! offset at which the failure was observed.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    /// `revision` is not covered by the index: it is below `first_revision`
    /// or at/beyond `first_revision + revision_count`.
    #[error("revision {revision} not covered by index (covers [{first_revision}, {first_revision}+{revision_count}))")]
    Revision {
        revision: u64,
        first_revision: u64,
        revision_count: u64,
    },

    /// `item_index` (L2P) or `offset` (P2L) is past the content recorded
    /// for `revision`.
    #[error("item-index/offset {item_index} exceeds bound {max} for revision {revision}")]
    Overflow {
        revision: u64,
        item_index: u64,
        max: u64,
    },

    /// The on-disk bytes don't decode: truncated varint, overflowing shift,
    /// bad page-table accounting, and the like.
    #[error("corrupt index: {detail} (file={file:?}, offset={offset})")]
    Corruption {
        file: PathBuf,
        offset: u64,
        detail: String,
    },

    /// The underlying filesystem failed.
    #[error("I/O error on {file:?} at offset {offset}: {source}")]
    Io {
        file: PathBuf,
        offset: u64,
        #[source]
        source: std::io::Error,
    },
}

impl IndexError {
    pub fn revision(revision: u64, first_revision: u64, revision_count: u64) -> Self {
        IndexError::Revision {
            revision,
            first_revision,
            revision_count,
        }
    }

    pub fn overflow(revision: u64, item_index: u64, max: u64) -> Self {
        IndexError::Overflow {
            revision,
            item_index,
            max,
        }
    }

    pub fn corruption(file: impl Into<PathBuf>, offset: u64, detail: impl Into<String>) -> Self {
        IndexError::Corruption {
            file: file.into(),
            offset,
            detail: detail.into(),
        }
    }

    pub fn io(file: impl Into<PathBuf>, offset: u64, source: std::io::Error) -> Self {
        IndexError::Io {
            file: file.into(),
            offset,
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;

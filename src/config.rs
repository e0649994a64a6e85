//! Process-wide tuning knobs, passed explicitly rather than read from a
//! module-level singleton (Design Notes §9: "avoid module-level
//! singletons"). A real deployment loads these once from its own
//! configuration layer and threads the resulting [`Config`] into every
//! builder and reader constructor in this crate.

/// Tuning knobs for the item-index engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Maximum L2P entries per page (`P`).
    pub l2p_page_size: u64,
    /// P2L cluster size in bytes (`Q`).
    pub p2l_cluster_size: u64,
    /// Number of revisions per shard (`S`).
    pub shard_size: u64,
    /// Alignment used by the prefetching stream reader and by the
    /// prefetch-window calculations in both readers.
    pub stream_block_size: u64,
    /// Bytes of scratch accumulated in memory by a builder before spilling
    /// the proto-to-final page buffer to a temporary file.
    pub spill_threshold: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            l2p_page_size: 8192,
            p2l_cluster_size: 64 * 1024,
            shard_size: 1000,
            stream_block_size: 64 * 1024,
            spill_threshold: 16 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Base revision of the shard containing `revision`, and whether that
    /// shard has been packed (combined into one pack file with the other
    /// `shard_size - 1` revisions alongside it).
    ///
    /// This crate has no notion of *which* shards are actually packed — that
    /// is a fact about the surrounding repository, not the index format —
    /// so callers pass `is_packed` in directly wherever it matters. This
    /// helper only implements the arithmetic relationship from §3: "the
    /// base revision is `R − (R mod S)`".
    pub fn base_revision(&self, revision: u64) -> u64 {
        revision - (revision % self.shard_size)
    }
}

//! Random-access P2L lookups (§4.7): "what item occupies physical offset
//! X", backed by a header cache and a page cache.
//!
//! An item that straddles a cluster boundary is recorded only in the page
//! matching its *start* offset (the builder's doing); a query for an offset
//! inside the tail of such an item, in a later page, walks backward through
//! however many pages the item spans until it finds the entry that actually
//! covers the query. A full scan (`svnadmin verify`-style) triggers read-
//! ahead: this reader throttles that read-ahead with a leaking-bucket token
//! count rather than prefetching unconditionally, so a workload doing
//! scattered random lookups (not a scan) doesn't pay for pages it will never
//! use.

use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::cache::{Cache, HeaderKey, PageKey};
use crate::error::{IndexError, Result};
use crate::p2l::format::{decode_page, P2lEntry, P2lHeader, FOOTER_LEN, P2L_MAGIC};
use crate::RevisionMeta;

/// How many pages of backward straddle-walk to tolerate before treating the
/// index as corrupt. A legitimate item can span at most a handful of
/// clusters; anything past this points at a miscomputed page table instead.
const MAX_STRADDLE_WALK: u32 = 64;

struct LeakyBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last: Instant,
}

impl LeakyBucket {
    fn new(capacity: f64, refill_per_sec: f64) -> Self {
        LeakyBucket {
            capacity,
            tokens: capacity,
            refill_per_sec,
            last: Instant::now(),
        }
    }

    fn try_take(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

pub struct P2lReader<R> {
    inner: R,
    file_name: PathBuf,
    is_packed: bool,
    header_cache: Arc<dyn Cache<HeaderKey, Arc<Vec<u8>>>>,
    page_cache: Arc<dyn Cache<PageKey, Arc<Vec<P2lEntry>>>>,
    prefetch_throttle: LeakyBucket,
}

impl<R: Read + Seek> P2lReader<R> {
    pub fn new(
        inner: R,
        file_name: impl AsRef<Path>,
        is_packed: bool,
        header_cache: Arc<dyn Cache<HeaderKey, Arc<Vec<u8>>>>,
        page_cache: Arc<dyn Cache<PageKey, Arc<Vec<P2lEntry>>>>,
    ) -> Self {
        P2lReader {
            inner,
            file_name: file_name.as_ref().to_path_buf(),
            is_packed,
            header_cache,
            page_cache,
            // 8 pages of burst read-ahead, refilling at 4 pages/sec: enough
            // to ride through one sequential scan's warm-up without letting
            // a pure-random workload prefetch on every miss.
            prefetch_throttle: LeakyBucket::new(8.0, 4.0),
        }
    }

    fn header_key(&self, base_revision: u64) -> HeaderKey {
        HeaderKey {
            base_revision,
            is_packed: self.is_packed,
        }
    }

    fn header(&mut self, base_revision: u64) -> Result<Arc<Vec<u8>>> {
        let key = self.header_key(base_revision);
        if let Some(blob) = self.header_cache.get(&key) {
            return Ok(blob);
        }

        let file_len = self
            .inner
            .seek(SeekFrom::End(0))
            .map_err(|e| IndexError::io(self.file_name.clone(), 0, e))?;
        if file_len < FOOTER_LEN {
            return Err(IndexError::corruption(
                self.file_name.clone(),
                file_len,
                "index file shorter than trailing footer",
            ));
        }

        let mut footer = [0u8; FOOTER_LEN as usize];
        self.inner
            .seek(SeekFrom::Start(file_len - FOOTER_LEN))
            .map_err(|e| IndexError::io(self.file_name.clone(), file_len - FOOTER_LEN, e))?;
        self.inner
            .read_exact(&mut footer)
            .map_err(|e| IndexError::io(self.file_name.clone(), file_len - FOOTER_LEN, e))?;
        let header_len = u32::from_le_bytes(footer[0..4].try_into().unwrap()) as u64;
        let magic = u32::from_le_bytes(footer[4..8].try_into().unwrap());
        if magic != P2L_MAGIC {
            return Err(IndexError::corruption(
                self.file_name.clone(),
                file_len - 4,
                "bad P2L magic in footer",
            ));
        }

        let header_start = file_len
            .checked_sub(FOOTER_LEN + header_len)
            .ok_or_else(|| {
                IndexError::corruption(self.file_name.clone(), file_len, "header_len exceeds file size")
            })?;
        let mut blob = vec![0u8; header_len as usize];
        self.inner
            .seek(SeekFrom::Start(header_start))
            .map_err(|e| IndexError::io(self.file_name.clone(), header_start, e))?;
        self.inner
            .read_exact(&mut blob)
            .map_err(|e| IndexError::io(self.file_name.clone(), header_start, e))?;

        let blob = Arc::new(blob);
        self.header_cache.set(key, blob.clone());
        Ok(blob)
    }

    fn load_page(&mut self, base_revision: u64, page_no: u32) -> Result<Arc<Vec<P2lEntry>>> {
        let key = PageKey {
            first_revision: base_revision,
            is_packed: self.is_packed,
            page_no: page_no as u64,
        };
        if let Some(page) = self.page_cache.get(&key) {
            return Ok(page);
        }

        let header_blob = self.header(base_revision)?;
        let header = P2lHeader::parse(&header_blob)?;
        let entry = header.page_table_entry(page_no)?;
        let body_offset = header.page_body_offset(page_no)?;
        let page_start = page_no as u64 * header.cluster_size().max(1) as u64;

        let mut body = vec![0u8; entry.byte_size as usize];
        self.inner
            .seek(SeekFrom::Start(body_offset))
            .map_err(|e| IndexError::io(self.file_name.clone(), body_offset, e))?;
        self.inner
            .read_exact(&mut body)
            .map_err(|e| IndexError::io(self.file_name.clone(), body_offset, e))?;

        let entries = decode_page(&body, entry.entry_count, header.first_revision(), page_start)?;
        let page = Arc::new(entries);
        self.page_cache.set(key, page.clone());
        Ok(page)
    }

    fn maybe_prefetch(&mut self, base_revision: u64, page_no: u32, page_count: u32) {
        if page_no + 1 < page_count && self.prefetch_throttle.try_take() {
            let _ = self.load_page(base_revision, page_no + 1);
        }
    }

    /// `p2l_index_lookup` (§4.7): every entry this index records as starting
    /// within the cluster containing `phys_offset` — not necessarily every
    /// entry whose byte range *overlaps* that cluster, since an item that
    /// straddles into a later cluster is recorded only in the page matching
    /// its own start offset (the later page legitimately returns none of
    /// it). Scanning `p2l_index_lookup` forward, cluster by cluster, from
    /// offset 0 to `file_size` therefore reconstructs the whole sequence of
    /// entries in offset order exactly once each, including the synthetic
    /// padding entries — that's the "P2L round-trip" testable property.
    pub fn p2l_index_lookup(&mut self, base_revision: u64, phys_offset: u64) -> Result<Vec<P2lEntry>> {
        let header_blob = self.header(base_revision)?;
        let header = P2lHeader::parse(&header_blob)?;
        if phys_offset >= header.file_size() {
            return Err(IndexError::overflow(
                header.first_revision(),
                phys_offset,
                header.file_size(),
            ));
        }
        let page_no = header.page_for_offset(phys_offset);
        let page_count = header.page_count();
        let page = self.load_page(base_revision, page_no)?;
        self.maybe_prefetch(base_revision, page_no, page_count);
        Ok((*page).clone())
    }

    /// `p2l_entry_lookup` (§4.7): the entry that starts at exactly
    /// `phys_offset`, found by binary search over the cached (or freshly
    /// decoded) page — `None` ("not a start offset") if `phys_offset` falls
    /// strictly inside some entry's range instead of at its boundary, or
    /// inside a straddling item recorded in an earlier page.
    pub fn p2l_entry_lookup(&mut self, base_revision: u64, phys_offset: u64) -> Result<Option<P2lEntry>> {
        let header_blob = self.header(base_revision)?;
        let header = P2lHeader::parse(&header_blob)?;
        if phys_offset >= header.file_size() {
            return Err(IndexError::overflow(
                header.first_revision(),
                phys_offset,
                header.file_size(),
            ));
        }
        let page_no = header.page_for_offset(phys_offset);
        let page = self.load_page(base_revision, page_no)?;
        let found = page
            .binary_search_by_key(&(phys_offset as i64), |e| e.offset)
            .ok()
            .map(|i| page[i]);
        Ok(found)
    }

    /// Convenience beyond §4.7's two named operations: the entry covering
    /// `phys_offset` regardless of whether `phys_offset` is itself an entry
    /// boundary, walking backward through preceding pages when `phys_offset`
    /// falls inside an item that straddled in from an earlier cluster. This
    /// is what a caller wanting "what item owns this byte" (rather than
    /// "what starts here" or "what's in this cluster") reaches for — the CLI's
    /// `LookupP2l` subcommand uses it.
    pub fn find_item_at(&mut self, base_revision: u64, phys_offset: u64) -> Result<P2lEntry> {
        let header_blob = self.header(base_revision)?;
        let header = P2lHeader::parse(&header_blob)?;
        if phys_offset >= header.file_size() {
            return Err(IndexError::overflow(
                header.first_revision(),
                phys_offset,
                header.file_size(),
            ));
        }
        let start_page = header.page_for_offset(phys_offset);
        let page_count = header.page_count();

        let mut page_no = start_page;
        let mut walked = 0u32;
        loop {
            let page = self.load_page(base_revision, page_no)?;
            if let Some(found) = page
                .iter()
                .find(|e| (e.offset as u64) <= phys_offset && phys_offset < e.end() as u64)
            {
                if page_no == start_page {
                    self.maybe_prefetch(base_revision, page_no, page_count);
                }
                return Ok(*found);
            }
            if page_no == 0 || walked >= MAX_STRADDLE_WALK {
                return Err(IndexError::corruption(
                    self.file_name.clone(),
                    phys_offset,
                    "no P2L entry covers this physical offset",
                ));
            }
            page_no -= 1;
            walked += 1;
        }
    }

    /// The total physical size this index describes.
    pub fn p2l_get_max_offset(&mut self, base_revision: u64) -> Result<u64> {
        let header_blob = self.header(base_revision)?;
        Ok(P2lHeader::parse(&header_blob)?.file_size())
    }

    /// Cheap derived summary of the cached header, mirroring
    /// [`crate::l2p::L2pReader::revision_meta`]. Unlike the L2P header, a
    /// P2L header does not itself record how many revisions its entries
    /// span (a packed shard's entries each carry their own `revision`
    /// field instead) — `revision_count` here is always `1`; a caller that
    /// needs the exact shard span should consult the L2P index for the
    /// same base revision.
    pub fn revision_meta(&mut self, base_revision: u64) -> Result<RevisionMeta> {
        let header_blob = self.header(base_revision)?;
        let header = P2lHeader::parse(&header_blob)?;
        Ok(RevisionMeta {
            first_revision: header.first_revision(),
            revision_count: 1,
            is_packed: self.is_packed,
        })
    }
}

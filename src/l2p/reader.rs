//! Random-access L2P lookups (§4.6): `(revision, item_index) -> physical
//! offset`, backed by a header cache and a page cache so a warm reader never
//! touches disk for a repeated lookup.
//!
//! On a page miss this also prefetches the page immediately following the
//! one just decoded, within the same revision's range — lookups during a
//! revision walk (diffing, `svnadmin dump`-style full scans) are
//! overwhelmingly sequential, so the next page is very likely to be needed
//! next.

use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::{Cache, HeaderKey, PageKey};
use crate::error::{IndexError, Result};
use crate::l2p::format::{decode_page, L2pHeader, ABSENT_OFFSET, FOOTER_LEN, L2P_MAGIC};
use crate::RevisionMeta;

pub struct L2pReader<R> {
    inner: R,
    file_name: PathBuf,
    is_packed: bool,
    header_cache: Arc<dyn Cache<HeaderKey, Arc<Vec<u8>>>>,
    page_cache: Arc<dyn Cache<PageKey, Arc<Vec<i64>>>>,
}

impl<R: Read + Seek> L2pReader<R> {
    pub fn new(
        inner: R,
        file_name: impl AsRef<Path>,
        is_packed: bool,
        header_cache: Arc<dyn Cache<HeaderKey, Arc<Vec<u8>>>>,
        page_cache: Arc<dyn Cache<PageKey, Arc<Vec<i64>>>>,
    ) -> Self {
        L2pReader {
            inner,
            file_name: file_name.as_ref().to_path_buf(),
            is_packed,
            header_cache,
            page_cache,
        }
    }

    fn header_key(&self, base_revision: u64) -> HeaderKey {
        HeaderKey {
            base_revision,
            is_packed: self.is_packed,
        }
    }

    /// Fetch the header blob, reading the file's trailing footer only on a
    /// cache miss. `base_revision` is only used as the cache key — the file
    /// itself carries its own `first_revision` in the blob, checked against
    /// the caller's expectation once read.
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
        if magic != L2P_MAGIC {
            return Err(IndexError::corruption(
                self.file_name.clone(),
                file_len - 4,
                "bad L2P magic in footer",
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

    fn load_page(&mut self, first_revision: u64, page_no: u32) -> Result<Arc<Vec<i64>>> {
        let key = PageKey {
            first_revision,
            is_packed: self.is_packed,
            page_no: page_no as u64,
        };
        if let Some(page) = self.page_cache.get(&key) {
            return Ok(page);
        }
        self.decode_and_cache_page(first_revision, page_no, &key)
    }

    fn decode_and_cache_page(
        &mut self,
        base_revision: u64,
        page_no: u32,
        key: &PageKey,
    ) -> Result<Arc<Vec<i64>>> {
        let header_blob = self.header(base_revision)?;
        let header = L2pHeader::parse(&header_blob)?;
        let entry = header.page_table_entry(page_no)?;
        let body_offset = header.page_body_offset(page_no)?;

        let mut body = vec![0u8; entry.byte_size as usize];
        self.inner
            .seek(SeekFrom::Start(body_offset))
            .map_err(|e| IndexError::io(self.file_name.clone(), body_offset, e))?;
        self.inner
            .read_exact(&mut body)
            .map_err(|e| IndexError::io(self.file_name.clone(), body_offset, e))?;

        let slots = decode_page(&body, entry.entry_count)?;
        let page = Arc::new(slots);
        self.page_cache.set(key.clone(), page.clone());
        Ok(page)
    }

    /// Look up the physical offset of `item_index` within `revision` via
    /// the L2P index (§4.6 "L2P-lookup"). `base_revision` identifies which
    /// header/page caches to consult (the packed shard's first revision, or
    /// the revision itself if unpacked).
    ///
    /// §4.6 also describes this as one branch of a wider `item_offset`
    /// dispatcher: a revision still open in an in-progress transaction is
    /// served by linearly scanning that transaction's (uncommitted) L2P
    /// proto log instead, and a revision using *physical* addressing (no
    /// index file at all — `offset = item_index`, or `offset =
    /// packed_rev_base_offset + item_index` once packed) never calls into
    /// this index in the first place. Deciding which branch applies needs
    /// the revision-file reader/writer and the transaction layer's own
    /// bookkeeping, both named in §1 as external collaborators this crate
    /// does not own; a caller that already knows it's looking up a
    /// logically-addressed, committed revision calls this directly, and one
    /// that doesn't yet know should make that determination from those
    /// external layers before reaching here.
    pub fn item_offset(&mut self, base_revision: u64, revision: u64, item_index: u64) -> Result<i64> {
        let header_blob = self.header(base_revision)?;
        let header = L2pHeader::parse(&header_blob)?;
        let first_revision = header.first_revision();
        let revision_count = header.revision_count() as u64;
        if revision < first_revision || revision >= first_revision + revision_count {
            return Err(IndexError::revision(revision, first_revision, revision_count));
        }
        let revision_index = (revision - first_revision) as u32;
        let (start_page, end_page) = header.page_range_for_revision(revision_index)?;
        let page_size = header.page_size() as u64;
        let page_offset_in_revision = item_index / page_size;
        let page_no = start_page as u64 + page_offset_in_revision;
        if page_no >= end_page as u64 {
            return Err(IndexError::overflow(revision, item_index, u64::MAX));
        }
        let page_no = page_no as u32;
        let slot = (item_index % page_size) as usize;

        let page = self.load_page(base_revision, page_no)?;
        let offset = *page.get(slot).ok_or_else(|| {
            IndexError::overflow(revision, item_index, page.len() as u64)
        })?;
        if offset == ABSENT_OFFSET {
            return Err(IndexError::overflow(revision, item_index, page.len() as u64));
        }

        if page_no + 1 < end_page {
            let _ = self.load_page(base_revision, page_no + 1);
        }
        Ok(offset)
    }

    /// The highest `item_index` with a recorded offset in `revision` — the
    /// item count of its final non-padding page.
    pub fn max_item_index(&mut self, base_revision: u64, revision: u64) -> Result<u64> {
        let header_blob = self.header(base_revision)?;
        let header = L2pHeader::parse(&header_blob)?;
        let first_revision = header.first_revision();
        let revision_count = header.revision_count() as u64;
        if revision < first_revision || revision >= first_revision + revision_count {
            return Err(IndexError::revision(revision, first_revision, revision_count));
        }
        let revision_index = (revision - first_revision) as u32;
        let (start_page, end_page) = header.page_range_for_revision(revision_index)?;
        if start_page == end_page {
            return Ok(0);
        }
        let page_size = header.page_size() as u64;
        let last_page_entry = header.page_table_entry(end_page - 1)?;
        let full_pages = (end_page - start_page - 1) as u64;
        Ok(full_pages * page_size + last_page_entry.entry_count as u64)
    }

    /// `[item_count for rev in start_rev..start_rev+count]` (§4.6): the item
    /// count of each revision's final page, derived from the same cached
    /// header every other lookup on this file uses. All of `start_rev..
    /// start_rev+count` must be covered by `base_revision`'s index file —
    /// a range spanning more than one shard/header needs one call per
    /// header, since one `L2pReader` is bound to a single open file.
    pub fn get_max_ids(&mut self, base_revision: u64, start_rev: u64, count: u64) -> Result<Vec<u64>> {
        let mut out = Vec::with_capacity(count as usize);
        for i in 0..count {
            out.push(self.max_item_index(base_revision, start_rev + i)?);
        }
        Ok(out)
    }

    /// Cheap derived summary of the cached header: which revisions this
    /// index file covers, and whether it addresses a packed shard. Reads
    /// through the same header cache as every other lookup — no extra I/O
    /// on a warm reader.
    pub fn revision_meta(&mut self, base_revision: u64) -> Result<RevisionMeta> {
        let header_blob = self.header(base_revision)?;
        let header = L2pHeader::parse(&header_blob)?;
        Ok(RevisionMeta {
            first_revision: header.first_revision(),
            revision_count: header.revision_count() as u64,
            is_packed: self.is_packed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::BoundedCache;
    use crate::config::Config;
    use crate::l2p::builder::L2pBuilder;
    use crate::proto::{L2pProtoRecord, ProtoWriter};
    use std::io::Cursor;

    fn build_test_file(page_size: u32, entries: &[(i64, u64)]) -> Vec<u8> {
        let mut config = Config::default();
        config.l2p_page_size = page_size;

        let mut proto_buf = Vec::new();
        {
            let mut w = ProtoWriter::new(&mut proto_buf);
            for &(offset, item_index) in entries {
                w.write_l2p(&L2pProtoRecord::entry(offset, item_index))
                    .unwrap();
            }
            w.write_l2p(&L2pProtoRecord::END_OF_REVISION).unwrap();
        }
        let mut proto_reader = crate::proto::ProtoReader::new(Cursor::new(proto_buf), "l2p.proto");
        let builder = L2pBuilder::new(Vec::new(), config, 42);
        builder.build_from_proto(&mut proto_reader).unwrap()
    }

    #[test]
    fn item_offset_round_trips_through_cache() {
        let file = build_test_file(2, &[(100, 0), (200, 1), (300, 2)]);
        let header_cache = Arc::new(BoundedCache::new(4));
        let page_cache = Arc::new(BoundedCache::new(4));
        let mut reader = L2pReader::new(Cursor::new(file), "l2p.idx", false, header_cache, page_cache);

        assert_eq!(reader.item_offset(42, 42, 0).unwrap(), 100);
        assert_eq!(reader.item_offset(42, 42, 1).unwrap(), 200);
        assert_eq!(reader.item_offset(42, 42, 2).unwrap(), 300);
        assert_eq!(reader.max_item_index(42, 42).unwrap(), 3);
        assert_eq!(reader.get_max_ids(42, 42, 1).unwrap(), vec![3]);
    }

    #[test]
    fn revision_meta_reflects_header_without_extra_io() {
        let file = build_test_file(2, &[(1, 0)]);
        let header_cache = Arc::new(BoundedCache::new(4));
        let page_cache = Arc::new(BoundedCache::new(4));
        let mut reader = L2pReader::new(Cursor::new(file), "l2p.idx", false, header_cache, page_cache);
        let meta = reader.revision_meta(42).unwrap();
        assert_eq!(meta.first_revision, 42);
        assert_eq!(meta.revision_count, 1);
        assert!(!meta.is_packed);
    }

    #[test]
    fn out_of_range_revision_is_rejected() {
        let file = build_test_file(2, &[(1, 0)]);
        let header_cache = Arc::new(BoundedCache::new(4));
        let page_cache = Arc::new(BoundedCache::new(4));
        let mut reader = L2pReader::new(Cursor::new(file), "l2p.idx", false, header_cache, page_cache);
        assert!(reader.item_offset(42, 99, 0).is_err());
    }
}

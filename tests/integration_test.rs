//! On-disk round-trip tests for the L2P/P2L index engine, covering the
//! concrete end-to-end scenarios and boundary behaviors.

use std::fs::File;
use std::io::Seek;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use revidx::cache::BoundedCache;
use revidx::config::Config;
use revidx::l2p::{L2pBuilder, L2pReader};
use revidx::p2l::{P2lBuilder, P2lReader};
use revidx::proto::{L2pProtoRecord, P2lProtoEntry, ProtoReader, ProtoWriter, INVALID_REVISION};

fn build_l2p(
    dir: &tempfile::TempDir,
    page_size: u64,
    first_revision: u64,
    records: &[L2pProtoRecord],
) -> PathBuf {
    let proto_path = dir.path().join(format!("{first_revision}.l2p.proto"));
    {
        let mut w = ProtoWriter::new(File::create(&proto_path).unwrap());
        for r in records {
            w.write_l2p(r).unwrap();
        }
        w.flush().unwrap();
    }
    let mut config = Config::default();
    config.l2p_page_size = page_size;

    let mut proto_reader = ProtoReader::new(File::open(&proto_path).unwrap(), &proto_path);
    let out_path = dir.path().join(format!("{first_revision}.l2p.idx"));
    let builder = L2pBuilder::new(File::create(&out_path).unwrap(), config, first_revision);
    builder.build_from_proto(&mut proto_reader).unwrap();
    out_path
}

fn l2p_reader(path: &Path) -> L2pReader<File> {
    let file = File::open(path).unwrap();
    L2pReader::new(
        file,
        path,
        false,
        Arc::new(BoundedCache::new(8)),
        Arc::new(BoundedCache::new(64)),
    )
}

#[test]
fn scenario_single_revision_l2p() {
    // P=4, rev 0: items 0 -> offset 9, 1 -> offset 19.
    let dir = tempfile::tempdir().unwrap();
    let path = build_l2p(
        &dir,
        4,
        0,
        &[
            L2pProtoRecord::entry(9, 0),
            L2pProtoRecord::entry(19, 1),
            L2pProtoRecord::END_OF_REVISION,
        ],
    );
    let mut reader = l2p_reader(&path);
    assert_eq!(reader.item_offset(0, 0, 0).unwrap(), 9);
    assert_eq!(reader.item_offset(0, 0, 1).unwrap(), 19);
    assert!(reader.item_offset(0, 0, 2).is_err());
    assert_eq!(reader.max_item_index(0, 0).unwrap(), 2);
}

#[test]
fn scenario_sparse_l2p() {
    // item-indexes 0 and 3 only; 1 and 2 must read back as "absent".
    let dir = tempfile::tempdir().unwrap();
    let path = build_l2p(
        &dir,
        4,
        0,
        &[
            L2pProtoRecord::entry(99, 0),
            L2pProtoRecord::entry(399, 3),
            L2pProtoRecord::END_OF_REVISION,
        ],
    );
    let mut reader = l2p_reader(&path);
    assert_eq!(reader.item_offset(0, 0, 0).unwrap(), 99);
    assert!(reader.item_offset(0, 0, 1).is_err());
    assert!(reader.item_offset(0, 0, 2).is_err());
    assert_eq!(reader.item_offset(0, 0, 3).unwrap(), 399);
}

#[test]
fn scenario_multi_page_l2p() {
    // Five items with P=4 -> two pages (4, 1).
    let dir = tempfile::tempdir().unwrap();
    let records: Vec<_> = (0..5)
        .map(|i| L2pProtoRecord::entry(i as i64 * 10, i))
        .chain(std::iter::once(L2pProtoRecord::END_OF_REVISION))
        .collect();
    let path = build_l2p(&dir, 4, 0, &records);
    let mut reader = l2p_reader(&path);
    for i in 0..5u64 {
        assert_eq!(reader.item_offset(0, 0, i).unwrap(), i as i64 * 10);
    }
    assert_eq!(reader.max_item_index(0, 0).unwrap(), 5);
    assert_eq!(reader.get_max_ids(0, 0, 1).unwrap(), vec![5]);
}

#[test]
fn exactly_page_size_items_produce_one_full_page() {
    let dir = tempfile::tempdir().unwrap();
    let records: Vec<_> = (0..4)
        .map(|i| L2pProtoRecord::entry(i as i64, i))
        .chain(std::iter::once(L2pProtoRecord::END_OF_REVISION))
        .collect();
    let path = build_l2p(&dir, 4, 0, &records);
    let mut reader = l2p_reader(&path);
    assert_eq!(reader.max_item_index(0, 0).unwrap(), 4);

    // One item over a full page boundary: two pages, (4, 1).
    let records: Vec<_> = (0..5)
        .map(|i| L2pProtoRecord::entry(i as i64, i))
        .chain(std::iter::once(L2pProtoRecord::END_OF_REVISION))
        .collect();
    let path2 = build_l2p(&dir, 4, 1, &records);
    let mut reader2 = l2p_reader(&path2);
    assert_eq!(reader2.max_item_index(1, 1).unwrap(), 5);
}

#[test]
fn out_of_range_revision_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = build_l2p(
        &dir,
        4,
        10,
        &[L2pProtoRecord::entry(1, 0), L2pProtoRecord::END_OF_REVISION],
    );
    let mut reader = l2p_reader(&path);
    assert!(reader.item_offset(10, 9, 0).is_err());
    assert!(reader.item_offset(10, 11, 0).is_err());
}

fn build_p2l(
    dir: &tempfile::TempDir,
    cluster_size: u64,
    first_revision: u64,
    finalize_revision: u64,
    file_size: u64,
    entries: &[P2lProtoEntry],
) -> PathBuf {
    let proto_path = dir.path().join(format!("{first_revision}.p2l.proto"));
    {
        let mut w = ProtoWriter::new(File::create(&proto_path).unwrap());
        for e in entries {
            w.write_p2l(e).unwrap();
        }
        w.flush().unwrap();
    }
    let mut config = Config::default();
    config.p2l_cluster_size = cluster_size;

    let mut proto_reader = ProtoReader::new(File::open(&proto_path).unwrap(), &proto_path);
    let out_path = dir.path().join(format!("{first_revision}.p2l.idx"));
    let builder = P2lBuilder::new(File::create(&out_path).unwrap(), config, first_revision);
    builder
        .build_from_proto(&mut proto_reader, finalize_revision, file_size)
        .unwrap();
    out_path
}

fn p2l_reader(path: &Path) -> P2lReader<File> {
    let file = File::open(path).unwrap();
    P2lReader::new(
        file,
        path,
        false,
        Arc::new(BoundedCache::new(8)),
        Arc::new(BoundedCache::new(64)),
    )
}

#[test]
fn scenario_p2l_single_cluster_with_padding() {
    let dir = tempfile::tempdir().unwrap();
    let entries = [
        P2lProtoEntry {
            offset: 0,
            size: 20,
            revision: 0,
            item_number: 1,
            fnv1_checksum: 0xAA,
            item_type: 1,
        },
        P2lProtoEntry {
            offset: 20,
            size: 30,
            revision: 0,
            item_number: 2,
            fnv1_checksum: 0xBB,
            item_type: 1,
        },
    ];
    let path = build_p2l(&dir, 64, 0, 0, 64, &entries);
    let mut reader = p2l_reader(&path);

    let a = reader.find_item_at(0, 5).unwrap();
    assert_eq!((a.offset, a.size, a.item_number), (0, 20, 1));

    let b = reader.find_item_at(0, 25).unwrap();
    assert_eq!((b.offset, b.size, b.item_number), (20, 30, 2));

    // Synthetic padding entry covers [50, 64).
    let padding = reader.find_item_at(0, 55).unwrap();
    assert_eq!(padding.offset, 50);
    assert_eq!(padding.size, 14);
    assert_eq!(padding.item_type, P2lProtoEntry::TYPE_UNUSED);

    assert_eq!(reader.p2l_get_max_offset(0).unwrap(), 64);

    // The cluster's full entry set, via p2l_index_lookup, includes both
    // real entries and the synthetic padding entry in offset order.
    let cluster = reader.p2l_index_lookup(0, 0).unwrap();
    assert_eq!(cluster.len(), 3);
    assert_eq!(cluster[0].offset, 0);
    assert_eq!(cluster[1].offset, 20);
    assert_eq!(cluster[2].offset, 50);
    assert_eq!(cluster[2].item_type, P2lProtoEntry::TYPE_UNUSED);

    // p2l_entry_lookup only matches exact start offsets.
    assert_eq!(reader.p2l_entry_lookup(0, 0).unwrap().unwrap().item_number, 1);
    assert_eq!(reader.p2l_entry_lookup(0, 20).unwrap().unwrap().item_number, 2);
    assert!(reader.p2l_entry_lookup(0, 5).unwrap().is_none());
}

#[test]
fn scenario_p2l_straddling_item() {
    // Q=64, one entry {off=60, size=20}: covers page 0's tail and page 1's head.
    let dir = tempfile::tempdir().unwrap();
    let entries = [P2lProtoEntry {
        offset: 60,
        size: 20,
        revision: 0,
        item_number: 1,
        fnv1_checksum: 0xCC,
        item_type: 1,
    }];
    let path = build_p2l(&dir, 64, 0, 0, 128, &entries);
    let mut reader = p2l_reader(&path);

    // Looked up from its start offset (page 0) and from its straddling tail
    // (page 1, found by walking back), both resolve to the same entry.
    let from_start = reader.find_item_at(0, 60).unwrap();
    let from_tail = reader.find_item_at(0, 75).unwrap();
    assert_eq!(from_start.offset, 60);
    assert_eq!(from_start, from_tail);

    // p2l_index_lookup on page 1 does not repeat the straddling item — it
    // belongs only to page 0, where it starts.
    let page1_entries = reader.p2l_index_lookup(0, 75).unwrap();
    assert!(page1_entries.iter().all(|e| e.offset != 60));
}

#[test]
fn p2l_offset_continuity_across_a_revision() {
    let dir = tempfile::tempdir().unwrap();
    let entries = [
        P2lProtoEntry {
            offset: 0,
            size: 10,
            revision: 3,
            item_number: 0,
            fnv1_checksum: 1,
            item_type: 1,
        },
        P2lProtoEntry {
            offset: 10,
            size: 15,
            revision: 3,
            item_number: 1,
            fnv1_checksum: 2,
            item_type: 1,
        },
        P2lProtoEntry {
            offset: 25,
            size: 5,
            revision: 3,
            item_number: 2,
            fnv1_checksum: 3,
            item_type: 1,
        },
    ];
    let path = build_p2l(&dir, 64, 3, 3, 30, &entries);
    let mut reader = p2l_reader(&path);

    let mut offset = 0u64;
    loop {
        let entry = reader.find_item_at(3, offset).unwrap();
        assert_eq!(entry.offset as u64, offset);
        offset = entry.end() as u64;
        if offset >= 30 {
            break;
        }
    }
    assert_eq!(offset, 30);
}

#[test]
fn p2l_index_lookup_round_trip_reconstructs_input_entries() {
    // Two clusters' worth of entries, including one straddling item, plus
    // trailing padding: scanning p2l_index_lookup cluster by cluster across
    // [0, file_size) must reconstruct exactly this sequence, in offset
    // order, each entry exactly once.
    let dir = tempfile::tempdir().unwrap();
    let entries = [
        P2lProtoEntry {
            offset: 0,
            size: 20,
            revision: 5,
            item_number: 0,
            fnv1_checksum: 1,
            item_type: 1,
        },
        P2lProtoEntry {
            offset: 20,
            size: 30,
            revision: 5,
            item_number: 1,
            fnv1_checksum: 2,
            item_type: 1,
        },
        P2lProtoEntry {
            offset: 50,
            size: 10,
            revision: 5,
            item_number: 2,
            fnv1_checksum: 3,
            item_type: 1,
        },
    ];
    let path = build_p2l(&dir, 32, 5, 5, 64, &entries);
    let mut reader = p2l_reader(&path);

    let mut reconstructed = Vec::new();
    let file_size = reader.p2l_get_max_offset(5).unwrap();
    let mut offset = 0u64;
    while offset < file_size {
        let cluster = reader.p2l_index_lookup(5, offset).unwrap();
        let cluster_end = cluster.last().map(|e| e.end() as u64).unwrap_or(offset);
        reconstructed.extend(cluster);
        offset = cluster_end.max(offset + 1);
    }

    assert_eq!(reconstructed.len(), 4);
    assert_eq!(reconstructed[0].offset, 0);
    assert_eq!(reconstructed[1].offset, 20);
    assert_eq!(reconstructed[2].offset, 50);
    assert_eq!(reconstructed[3].offset, 60);
    assert_eq!(reconstructed[3].item_type, P2lProtoEntry::TYPE_UNUSED);
    for pair in reconstructed.windows(2) {
        assert_eq!(pair[0].offset + pair[0].size as i64, pair[1].offset);
    }
}

#[test]
fn p2l_rewrites_invalid_revision_sentinel_to_finalized_revision() {
    let dir = tempfile::tempdir().unwrap();
    let entries = [P2lProtoEntry {
        offset: 0,
        size: 10,
        revision: INVALID_REVISION,
        item_number: 0,
        fnv1_checksum: 7,
        item_type: 1,
    }];
    let path = build_p2l(&dir, 64, 9, 9, 10, &entries);
    let mut reader = p2l_reader(&path);
    let entry = reader.p2l_entry_lookup(9, 0).unwrap().unwrap();
    assert_eq!(entry.revision, 9);
}

#[test]
fn file_handle_offset_is_restored_after_header_read() {
    // Reading the header seeks to EOF and back; a fresh, independent handle
    // on the same path must still start from offset 0.
    let dir = tempfile::tempdir().unwrap();
    let path = build_l2p(
        &dir,
        4,
        0,
        &[L2pProtoRecord::entry(1, 0), L2pProtoRecord::END_OF_REVISION],
    );
    let mut reader = l2p_reader(&path);
    let _ = reader.item_offset(0, 0, 0).unwrap();

    let mut file = File::open(&path).unwrap();
    assert_eq!(file.stream_position().unwrap(), 0);
}

#[test]
fn builders_seal_their_output_file_read_only() {
    let dir = tempfile::tempdir().unwrap();
    let l2p_path = build_l2p(
        &dir,
        4,
        0,
        &[L2pProtoRecord::entry(1, 0), L2pProtoRecord::END_OF_REVISION],
    );
    assert!(std::fs::metadata(&l2p_path).unwrap().permissions().readonly());

    let p2l_path = build_p2l(
        &dir,
        64,
        0,
        0,
        10,
        &[P2lProtoEntry {
            offset: 0,
            size: 10,
            revision: 0,
            item_number: 0,
            fnv1_checksum: 1,
            item_type: 1,
        }],
    );
    assert!(std::fs::metadata(&p2l_path).unwrap().permissions().readonly());
}

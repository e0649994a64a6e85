//! Algebraic properties of the packed-integer codec (§4.1, §8): these are
//! exactly the "for all u64 v" / "for all i64 v" properties the distilled
//! spec's Testable Properties section calls out, so they're proptest
//! properties rather than a handful of example-based unit tests.

use std::io::Cursor;

use proptest::prelude::*;
use revidx::varint::{
    read_ivarint, read_uvarint, write_ivarint, write_uvarint, zigzag_decode, zigzag_encode,
    PackedIntReader,
};

proptest! {
    #[test]
    fn uvarint_roundtrips(v: u64) {
        let mut buf = Vec::new();
        write_uvarint(v, &mut buf);
        let decoded = read_uvarint(&buf).unwrap();
        prop_assert_eq!(decoded.value, v);
        prop_assert_eq!(decoded.consumed, buf.len());
    }

    #[test]
    fn ivarint_roundtrips(v: i64) {
        let mut buf = Vec::new();
        write_ivarint(v, &mut buf);
        let decoded = read_ivarint(&buf).unwrap();
        prop_assert_eq!(decoded.value, v);
    }

    #[test]
    fn zigzag_roundtrips(v: i64) {
        prop_assert_eq!(zigzag_decode(zigzag_encode(v)), v);
    }

    /// `seek(off); get()` is idempotent: re-seeking to the same offset and
    /// reading again returns the same value, regardless of where in the
    /// stream (and its prefetch buffer) the cursor previously sat.
    #[test]
    fn stream_seek_then_get_is_idempotent(values in prop::collection::vec(0u64..1_000_000, 1..64)) {
        let mut buf = Vec::new();
        let mut offsets = Vec::with_capacity(values.len());
        for &v in &values {
            offsets.push(buf.len() as u64);
            write_uvarint(v, &mut buf);
        }

        let mut reader = PackedIntReader::new(Cursor::new(buf), "proptest-stream", 37);
        for (i, &v) in values.iter().enumerate() {
            reader.seek(offsets[i]).unwrap();
            let a = reader.get().unwrap();
            reader.seek(offsets[i]).unwrap();
            let b = reader.get().unwrap();
            prop_assert_eq!(a, v);
            prop_assert_eq!(b, v);
        }
    }
}

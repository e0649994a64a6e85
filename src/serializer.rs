//! Structural serializer: builds a single self-contained blob for a
//! composite record — a fixed root plus one or more variable-length inner
//! arrays — so the result can be cached as opaque bytes and read back with a
//! *partial getter* that resolves one field without decoding the whole
//! value.
//!
//! The distilled spec's source represents this with raw C pointers rewritten
//! to base-relative offsets, fixed up in place on load. That isn't a sound
//! model in safe Rust, so this crate takes the re-architecture Design Notes
//! §9 recommends: offsets are plain `u32` fields (never raw pointers, never
//! fixed up), and a partial getter resolves one via index arithmetic —
//! `buf[offset..]` — instead of pointer-chasing. `NULL_OFFSET` plays the role
//! the spec's all-bits-zero sentinel plays, except the root here sits at
//! offset 0 by construction (same reasoning as the spec: offset 0 can never
//! collide with a real substructure because the root always owns it), so an
//! all-bits-zero offset is unambiguous as the conventional "absent" value for
//! a field whose type makes offset 0 impossible for it to legitimately hold.
//!
//! Only the two header cache values (§3: L2P header + revision/page tables,
//! P2L header + page tables) go through this; the page cache values are
//! flat arrays of primitive data and are cached directly as owned `Vec<T>`,
//! which needs no offset indirection at all (Design Notes §9, option (a)).

/// Sentinel recorded in an offset field that has no substructure.
pub const NULL_OFFSET: u32 = u32::MAX;

/// Appends substructures to a growing blob, patching offset fields in
/// already-written bytes as each substructure's final position becomes
/// known. `push`/`pop` in the distilled spec's contract become `push_*`
/// calls here that both append and patch in one step, since there is no
/// pointer to fix up later — the offset is known the instant we decide
/// where the new bytes start.
pub struct BlobWriter {
    buf: Vec<u8>,
}

impl BlobWriter {
    /// `init`: start a blob with `root` as the bytes at offset 0.
    /// `estimated_final_size` is a capacity hint, not a hard limit.
    pub fn init(root: &[u8], estimated_final_size: usize) -> Self {
        let mut buf = Vec::with_capacity(estimated_final_size.max(root.len()));
        buf.extend_from_slice(root);
        BlobWriter { buf }
    }

    /// Current length of the blob — the offset the next `push_*` call would
    /// assign.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// `add_leaf`: append `bytes` as a substructure with no inner pointers of
    /// its own, and patch the 4-byte offset field at `field_pos` (an offset
    /// into bytes already written) to point at it.
    pub fn push_leaf(&mut self, field_pos: usize, bytes: &[u8]) {
        let offset = self.buf.len() as u32;
        self.buf.extend_from_slice(bytes);
        self.patch_offset(field_pos, offset);
    }

    /// `add_string`: append `s` plus a terminating NUL, patching the offset
    /// field at `field_pos`.
    pub fn push_string(&mut self, field_pos: usize, s: &str) {
        let offset = self.buf.len() as u32;
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
        self.patch_offset(field_pos, offset);
    }

    /// Record that the pointer field at `field_pos` is absent.
    pub fn push_null(&mut self, field_pos: usize) {
        self.patch_offset(field_pos, NULL_OFFSET);
    }

    fn patch_offset(&mut self, field_pos: usize, offset: u32) {
        self.buf[field_pos..field_pos + 4].copy_from_slice(&offset.to_le_bytes());
    }

    /// `get`: the finished, self-contained blob.
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// `push`+`pop` for a parent pointer field that itself spawns a
/// sub-serialization: same as `push_leaf`, but exposed separately to mirror
/// the spec's naming for the non-leaf case (the child bytes here are
/// themselves produced by a nested `BlobWriter`, not a flat slice).
impl BlobWriter {
    pub fn push_substructure(&mut self, field_pos: usize, child: Vec<u8>) {
        self.push_leaf(field_pos, &child);
    }
}

/// Partial-get helper: resolve the offset stored at `field_pos` in `buf` to
/// a byte slice starting at that offset, or `None` if the field is
/// `NULL_OFFSET`. Does not mutate `buf` — this is exactly the "helper that
/// returns `buffer_base + (*stored_offset_field)` without mutating the
/// buffer" the spec's partial-getter contract describes.
pub fn resolve_offset<'a>(buf: &'a [u8], field_pos: usize) -> Option<&'a [u8]> {
    let raw = u32::from_le_bytes(buf[field_pos..field_pos + 4].try_into().ok()?);
    if raw == NULL_OFFSET {
        None
    } else {
        buf.get(raw as usize..)
    }
}

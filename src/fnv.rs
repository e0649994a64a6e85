//! 32-bit FNV-1 checksum, used per P2L entry for integrity checking (§3,
//! §4.5). Note this is FNV-1 (multiply, then xor), not the more commonly
//! seen FNV-1a (xor, then multiply) — the distilled spec calls it "fnv1"
//! specifically.

const FNV1_32_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV1_32_PRIME: u32 = 0x0100_0193;

pub fn fnv1_32(data: &[u8]) -> u32 {
    let mut hash = FNV1_32_OFFSET_BASIS;
    for &byte in data {
        hash = hash.wrapping_mul(FNV1_32_PRIME);
        hash ^= byte as u32;
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_offset_basis() {
        assert_eq!(fnv1_32(&[]), FNV1_32_OFFSET_BASIS);
    }

    #[test]
    fn deterministic_and_sensitive_to_every_byte() {
        let a = fnv1_32(b"hello world");
        let b = fnv1_32(b"hello world");
        let c = fnv1_32(b"hello worle");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}

/// Key-to-bucket hashing.
///
/// Any universal byte hash is a valid choice per the spec; it affects
/// distribution, not correctness. `crc32fast` is already a dependency of
/// this crate's teacher (used there for stripe selection in
/// `memory_lsm.rs`); reusing it here avoids pulling in a second hashing
/// crate for an interchangeable concern.
///
/// Reopening a region that was built with a different hash function is
/// silent corruption: the header does not record which hash produced
/// its chains. See `DESIGN.md` for why we did not add a hash-id field.
pub fn bucket(key: &[u8], index_size: u32) -> u32 {
    crc32fast::hash(key) % index_size
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_is_deterministic() {
        assert_eq!(bucket(b"alpha", 16), bucket(b"alpha", 16));
    }

    #[test]
    fn bucket_is_always_in_range() {
        for key in [&b""[..], b"a", b"a much longer key than the others"] {
            for index_size in [1u32, 2, 16, 4096] {
                assert!(bucket(key, index_size) < index_size);
            }
        }
    }
}

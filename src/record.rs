/// Packed, unaligned record layout.
///
/// ```text
/// [next(4)] [flags(5): is_dead(1) | key_length(12) | value_length(27)]
/// [key(key_length)] [value(value_length)] [padding to a multiple of 4]
/// ```
///
/// Records are variable length and not aligned within the region, so
/// fields are read/written through explicit byte accessors rather than a
/// `#[repr(packed)]` struct: taking a reference into a packed struct at
/// an arbitrary byte offset is unaligned-access UB in Rust.
use crate::error::{Error, Result};
use crate::layout::{self, MAX_KEY_LENGTH, MAX_VALUE_LENGTH, NULL_OFFSET, OFFSET_SIZE};

/// `next` field width (4) + bit-packed flags field width (5).
const RECORD_HEADER_SIZE: u32 = 9;

const NEXT_OFFSET: u32 = 0;
const FLAGS_OFFSET: u32 = 4;
const FLAGS_SIZE: usize = 5;

const IS_DEAD_BITS: u32 = 1;
const KEY_LENGTH_BITS: u32 = 12;
const VALUE_LENGTH_BITS: u32 = 27;

const KEY_LENGTH_SHIFT: u32 = IS_DEAD_BITS;
const VALUE_LENGTH_SHIFT: u32 = IS_DEAD_BITS + KEY_LENGTH_BITS;

const KEY_LENGTH_MASK: u64 = (1u64 << KEY_LENGTH_BITS) - 1;
const VALUE_LENGTH_MASK: u64 = (1u64 << VALUE_LENGTH_BITS) - 1;

/// Total bytes a record with the given key/value lengths occupies,
/// including header and alignment padding.
pub fn allocated_size(key_length: u32, value_length: u32) -> u32 {
    layout::align_up(RECORD_HEADER_SIZE + key_length + value_length, OFFSET_SIZE)
}

/// Validate that `key_length`/`value_length` fit in their packed fields.
pub fn check_bounds(key_length: usize, value_length: usize) -> Result<()> {
    if key_length as u32 >= MAX_KEY_LENGTH {
        return Err(Error::CapacityExceeded(format!(
            "key length {key_length} exceeds maximum of {}",
            MAX_KEY_LENGTH - 1
        )));
    }
    if value_length as u32 >= MAX_VALUE_LENGTH {
        return Err(Error::CapacityExceeded(format!(
            "value length {value_length} exceeds maximum of {}",
            MAX_VALUE_LENGTH - 1
        )));
    }
    Ok(())
}

fn flags_bytes(region: &[u8], record_offset: u32) -> [u8; FLAGS_SIZE] {
    let start = (record_offset + FLAGS_OFFSET) as usize;
    let mut buf = [0u8; FLAGS_SIZE];
    buf.copy_from_slice(&region[start..start + FLAGS_SIZE]);
    buf
}

fn flags_to_u64(bytes: [u8; FLAGS_SIZE]) -> u64 {
    let mut widened = [0u8; 8];
    widened[..FLAGS_SIZE].copy_from_slice(&bytes);
    u64::from_le_bytes(widened)
}

fn u64_to_flags(value: u64) -> [u8; FLAGS_SIZE] {
    let widened = value.to_le_bytes();
    let mut bytes = [0u8; FLAGS_SIZE];
    bytes.copy_from_slice(&widened[..FLAGS_SIZE]);
    bytes
}

fn write_flags(region: &mut [u8], record_offset: u32, value: u64) {
    let start = (record_offset + FLAGS_OFFSET) as usize;
    let bytes = u64_to_flags(value);
    region[start..start + FLAGS_SIZE].copy_from_slice(&bytes);
}

/// Read the `next` chain link stored in the record at `record_offset`.
pub fn next(region: &[u8], record_offset: u32) -> u32 {
    let start = (record_offset + NEXT_OFFSET) as usize;
    u32::from_le_bytes(region[start..start + 4].try_into().unwrap())
}

pub fn set_next(region: &mut [u8], record_offset: u32, value: u32) {
    let start = (record_offset + NEXT_OFFSET) as usize;
    region[start..start + 4].copy_from_slice(&value.to_le_bytes());
}

pub fn is_dead(region: &[u8], record_offset: u32) -> bool {
    let packed = flags_to_u64(flags_bytes(region, record_offset));
    (packed & 1) != 0
}

pub fn set_dead(region: &mut [u8], record_offset: u32, dead: bool) {
    let mut packed = flags_to_u64(flags_bytes(region, record_offset));
    if dead {
        packed |= 1;
    } else {
        packed &= !1u64;
    }
    write_flags(region, record_offset, packed);
}

pub fn key_length(region: &[u8], record_offset: u32) -> u32 {
    let packed = flags_to_u64(flags_bytes(region, record_offset));
    ((packed >> KEY_LENGTH_SHIFT) & KEY_LENGTH_MASK) as u32
}

pub fn value_length(region: &[u8], record_offset: u32) -> u32 {
    let packed = flags_to_u64(flags_bytes(region, record_offset));
    ((packed >> VALUE_LENGTH_SHIFT) & VALUE_LENGTH_MASK) as u32
}

/// Byte offset, relative to the region start, of the key within the
/// record at `record_offset`.
pub fn key_offset(record_offset: u32) -> u32 {
    record_offset + RECORD_HEADER_SIZE
}

/// Byte offset, relative to the region start, of the value within the
/// record at `record_offset`.
pub fn value_offset(region: &[u8], record_offset: u32) -> u32 {
    key_offset(record_offset) + key_length(region, record_offset)
}

/// Initialize a new record header + key at `record_offset`, with
/// `next = NULL_OFFSET` and `is_dead = false`. The value bytes are left
/// uninitialized (zeroed, since every region starts zeroed) for the
/// caller to fill in via the returned value byte range.
pub fn init(region: &mut [u8], record_offset: u32, key: &[u8], value_length: u32) {
    set_next(region, record_offset, NULL_OFFSET);

    let packed = ((value_length as u64 & VALUE_LENGTH_MASK) << VALUE_LENGTH_SHIFT)
        | ((key.len() as u64 & KEY_LENGTH_MASK) << KEY_LENGTH_SHIFT);
    write_flags(region, record_offset, packed);

    let key_start = key_offset(record_offset) as usize;
    region[key_start..key_start + key.len()].copy_from_slice(key);
}

/// Copy a whole record (header, key, value, padding) from `src` to `dst`
/// within the region. Used by `rotate_head`, where source and
/// destination byte ranges can overlap; the copy is forward (low-to-high
/// in source) so it is correct even when it is self-overlapping, since
/// `rotate_head` only ever copies toward a higher (or wrapped, freshly
/// zero) destination that trails the source by at least one full prior
/// record's worth of reclaimed space.
pub fn copy_record(region: &mut [u8], src: u32, dst: u32, len: u32) {
    let (src, dst, len) = (src as usize, dst as usize, len as usize);
    if src == dst {
        return;
    }
    // `copy_within` performs a forward, overlap-safe copy internally.
    region.copy_within(src..src + len, dst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn allocated_size_aligns_to_four_bytes() {
        assert_eq!(allocated_size(0, 0), 12); // 9 rounds up to 12
        assert_eq!(allocated_size(3, 3), 16); // 9+3+3=15 -> 16
        assert_eq!(allocated_size(0, 3), 12); // 9+3=12, already aligned
    }

    #[test]
    fn bounds_reject_at_max_and_allow_one_below() {
        assert!(check_bounds((MAX_KEY_LENGTH - 1) as usize, 0).is_ok());
        assert!(check_bounds(MAX_KEY_LENGTH as usize, 0).is_err());
        assert!(check_bounds(0, (MAX_VALUE_LENGTH - 1) as usize).is_ok());
        assert!(check_bounds(0, MAX_VALUE_LENGTH as usize).is_err());
    }

    #[test]
    fn init_and_accessors_round_trip() {
        let mut region = vec![0u8; 64];
        let offset = 0;
        init(&mut region, offset, b"hello", 3);

        assert_eq!(next(&region, offset), NULL_OFFSET);
        assert!(!is_dead(&region, offset));
        assert_eq!(key_length(&region, offset), 5);
        assert_eq!(value_length(&region, offset), 3);

        set_dead(&mut region, offset, true);
        assert!(is_dead(&region, offset));
        // Setting dead must not disturb lengths.
        assert_eq!(key_length(&region, offset), 5);
        assert_eq!(value_length(&region, offset), 3);

        set_next(&mut region, offset, 999);
        assert_eq!(next(&region, offset), 999);
    }

    #[test]
    fn copy_record_handles_forward_overlap() {
        // Simulate a rotate_head style overlapping forward copy.
        let mut region = vec![0u8; 32];
        init(&mut region, 0, b"ab", 2);
        let value_start = value_offset(&region, 0) as usize;
        region[value_start..value_start + 2].copy_from_slice(b"XY");

        let len = allocated_size(2, 2);
        // Destination overlaps the source, shifted forward by less than len.
        copy_record(&mut region, 0, 4, len);

        assert_eq!(key_length(&region, 4), 2);
        assert_eq!(value_length(&region, 4), 2);
        let new_value_start = value_offset(&region, 4) as usize;
        assert_eq!(&region[new_value_start..new_value_start + 2], b"XY");
    }

    proptest! {
        #[test]
        fn flags_round_trip_for_any_valid_lengths(
            dead in any::<bool>(),
            key_len in 0u32..MAX_KEY_LENGTH,
            value_len in 0u32..MAX_VALUE_LENGTH,
        ) {
            let mut region = vec![0u8; (RECORD_HEADER_SIZE + key_len) as usize];
            let key = vec![0xABu8; key_len as usize];
            init(&mut region, 0, &key, value_len);
            set_dead(&mut region, 0, dead);

            prop_assert_eq!(is_dead(&region, 0), dead);
            prop_assert_eq!(key_length(&region, 0), key_len);
            prop_assert_eq!(value_length(&region, 0), value_len);
        }
    }
}

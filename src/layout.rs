/// Region byte layout for the rolling-hash record store.
///
/// ```text
/// offset 0                                             region_size
/// +-------------------------------------------------------------+
/// | header |  index[index_size] of offset_t  |  records bytes   |
/// +-------------------------------------------------------------+
/// ```
///
/// `offset_t` is a fixed-width `u32`. Offset `0` is reserved to mean
/// "null"; it always lies inside the header and is never the start of
/// a record. All header fields are little-endian; this is an
/// implementation choice (spec leaves endianness to the implementer).
use crate::error::{Error, Result};

/// Width of an `offset_t` in bytes.
pub const OFFSET_SIZE: u32 = 4;

/// The distinguished "absent" offset.
pub const NULL_OFFSET: u32 = 0;

/// 12-bit key length field: valid keys are strictly shorter than this.
pub const MAX_KEY_LENGTH: u32 = (1 << 12) - 1;

/// 27-bit value length field: valid values are strictly shorter than this.
pub const MAX_VALUE_LENGTH: u32 = (1 << 27) - 1;

/// Persisted table state cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Cleanly closed; safe to reopen and reuse.
    Frozen,
    /// In use, or abandoned without a clean close.
    Active,
}

const FROZEN_MAGIC: u32 = 0xf0f0_f0f0;
const ACTIVE_MAGIC: u32 = 0xf0f0_f0f1;

impl State {
    fn to_magic(self) -> u32 {
        match self {
            State::Frozen => FROZEN_MAGIC,
            State::Active => ACTIVE_MAGIC,
        }
    }

    fn from_magic(magic: u32) -> Option<State> {
        match magic {
            FROZEN_MAGIC => Some(State::Frozen),
            ACTIVE_MAGIC => Some(State::Active),
            _ => None,
        }
    }
}

// Header field offsets (all u32, little-endian).
const STATE: u32 = 0;
const OFFSET_BYTE_SIZE: u32 = 4;
const REGION_SIZE: u32 = 8;
const INDEX_SIZE: u32 = 12;
const TOTAL_RECORD_COUNT: u32 = 16;
const LIVE_RECORD_COUNT: u32 = 20;
const BEGIN: u32 = 24;
const END: u32 = 28;
const WRAP: u32 = 32;

/// Fixed prefix of the region holding the persisted table header.
pub const HEADER_SIZE: u32 = 36;

fn get_u32(region: &[u8], offset: u32) -> u32 {
    let offset = offset as usize;
    u32::from_le_bytes(region[offset..offset + 4].try_into().unwrap())
}

fn set_u32(region: &mut [u8], offset: u32, value: u32) {
    let offset = offset as usize;
    region[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Offset of the first index bucket slot.
pub fn index_offset() -> u32 {
    HEADER_SIZE
}

/// Offset of bucket `i`'s slot within the index.
pub fn index_entry_offset(bucket: u32) -> u32 {
    index_offset() + bucket * OFFSET_SIZE
}

/// Offset one past the index, where record storage begins.
pub fn records_offset(index_size: u32) -> u32 {
    index_offset() + index_size * OFFSET_SIZE
}

/// Round `n` up to the next multiple of `align` (`align` a power of two).
pub fn align_up(n: u32, align: u32) -> u32 {
    (n + align - 1) & !(align - 1)
}

pub fn state(region: &[u8]) -> Option<State> {
    State::from_magic(get_u32(region, STATE))
}

pub fn set_state(region: &mut [u8], state: State) {
    set_u32(region, STATE, state.to_magic());
}

pub fn offset_byte_size(region: &[u8]) -> u32 {
    get_u32(region, OFFSET_BYTE_SIZE)
}

pub fn set_offset_byte_size(region: &mut [u8], value: u32) {
    set_u32(region, OFFSET_BYTE_SIZE, value);
}

pub fn region_size(region: &[u8]) -> u32 {
    get_u32(region, REGION_SIZE)
}

pub fn set_region_size(region: &mut [u8], value: u32) {
    set_u32(region, REGION_SIZE, value);
}

pub fn index_size(region: &[u8]) -> u32 {
    get_u32(region, INDEX_SIZE)
}

pub fn set_index_size(region: &mut [u8], value: u32) {
    set_u32(region, INDEX_SIZE, value);
}

pub fn total_record_count(region: &[u8]) -> u32 {
    get_u32(region, TOTAL_RECORD_COUNT)
}

pub fn set_total_record_count(region: &mut [u8], value: u32) {
    set_u32(region, TOTAL_RECORD_COUNT, value);
}

pub fn live_record_count(region: &[u8]) -> u32 {
    get_u32(region, LIVE_RECORD_COUNT)
}

pub fn set_live_record_count(region: &mut [u8], value: u32) {
    set_u32(region, LIVE_RECORD_COUNT, value);
}

pub fn begin(region: &[u8]) -> u32 {
    get_u32(region, BEGIN)
}

pub fn set_begin(region: &mut [u8], value: u32) {
    set_u32(region, BEGIN, value);
}

pub fn end(region: &[u8]) -> u32 {
    get_u32(region, END)
}

pub fn set_end(region: &mut [u8], value: u32) {
    set_u32(region, END, value);
}

pub fn wrap(region: &[u8]) -> u32 {
    get_u32(region, WRAP)
}

pub fn set_wrap(region: &mut [u8], value: u32) {
    set_u32(region, WRAP, value);
}

/// Read the offset stored at `ptr`: either an index bucket slot or a
/// record's `next` field; both are plain little-endian `u32`s.
pub fn read_offset(region: &[u8], ptr: u32) -> u32 {
    get_u32(region, ptr)
}

/// Write the offset stored at `ptr` (see [`read_offset`]).
pub fn write_offset(region: &mut [u8], ptr: u32, value: u32) {
    set_u32(region, ptr, value);
}

/// Validate that `region_size` is large enough to hold the header and
/// index, as required by `HashRing::new`'s construction precondition.
pub fn check_region_capacity(region_size: u32, index_size: u32) -> Result<()> {
    let required = records_offset(index_size);
    if region_size < required {
        return Err(Error::IntegrityViolation(format!(
            "region_size {region_size} too small for header + index of size {index_size} (need at least {required})"
        )));
    }
    Ok(())
}

/// The hash ring: a fixed-size hash index over a bounded region, combined
/// with an implicit FIFO log of records carved out of the same region.
///
/// `HashRing<S>` is generic over any backing that can hand out a byte
/// slice both ways (`AsRef<[u8]> + AsMut<[u8]>`): a `Vec<u8>` for the
/// heap backing, or a memory-mapped file for the mapped backing. The ring
/// itself never allocates or owns file descriptors; all of that lives in
/// `heap`/`mapped`. This mirrors the "arena + offset" discipline spec.md
/// §9 recommends in place of a graph of owned pointers.
use bytes::Bytes;

use crate::error::{Error, Result};
use crate::hash;
use crate::layout::{self, State, NULL_OFFSET, OFFSET_SIZE};
use crate::record;

/// Offset of the offset that links to a record: either an index bucket
/// slot, or the `next` field of a predecessor record. Returned by `get`
/// so that `commit`/`drop_key` can splice in place without re-walking
/// the chain. Fragile across compaction; see [`HashRing::head_invalidates`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hint(u32);

impl Hint {
    pub fn offset(self) -> u32 {
        self.0
    }
}

/// A located record: the byte offset of its header within the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHandle(u32);

impl RecordHandle {
    pub fn offset(self) -> u32 {
        self.0
    }
}

/// A record laid down at the ring tail but not yet spliced into its
/// chain. `end` has not advanced and `total_record_count` has not been
/// bumped, so preparing a different record abandons this one.
#[derive(Debug, Clone, Copy)]
pub struct PreparedRecord {
    offset: u32,
    key_length: u32,
    value_length: u32,
}

pub struct HashRing<S> {
    region: S,
    index_size: u32,
}

fn key_matches(region: &[u8], record_offset: u32, key: &[u8]) -> bool {
    let len = record::key_length(region, record_offset) as usize;
    if len != key.len() {
        return false;
    }
    let start = record::key_offset(record_offset) as usize;
    &region[start..start + len] == key
}

impl<S: AsRef<[u8]> + AsMut<[u8]>> HashRing<S> {
    /// Construct a hash ring over `region`, with `index_size` buckets.
    ///
    /// If the region is already `FROZEN` (a cleanly closed, persisted
    /// table) its contents are reused after integrity checks; otherwise
    /// the region, including one left `ACTIVE` by an unclean shutdown,
    /// is treated as uninitialized and reset to empty.
    pub fn new(mut region: S, index_size: u32) -> Result<Self> {
        if index_size == 0 {
            return Err(Error::IntegrityViolation(
                "index_size must be greater than zero".to_string(),
            ));
        }

        let region_size = region.as_ref().len() as u32;
        layout::check_region_capacity(region_size, index_size)?;

        match layout::state(region.as_ref()) {
            Some(State::Frozen) => {
                let existing = region.as_ref();
                if layout::offset_byte_size(existing) != OFFSET_SIZE {
                    return Err(Error::IntegrityViolation(format!(
                        "stored offset_byte_size {} != {OFFSET_SIZE}",
                        layout::offset_byte_size(existing)
                    )));
                }
                if layout::region_size(existing) != region_size {
                    return Err(Error::IntegrityViolation(format!(
                        "stored region_size {} != caller's region_size {region_size}",
                        layout::region_size(existing)
                    )));
                }
                if layout::index_size(existing) != index_size {
                    return Err(Error::IntegrityViolation(format!(
                        "stored index_size {} != caller's index_size {index_size}",
                        layout::index_size(existing)
                    )));
                }
                tracing::debug!(region_size, index_size, "reopening frozen rolling-hash region");
            }
            Some(State::Active) => {
                tracing::warn!(
                    "rolling-hash region was left ACTIVE (unclean shutdown); reinitializing as empty"
                );
                Self::initialize(region.as_mut(), region_size, index_size);
            }
            None => {
                tracing::debug!(region_size, index_size, "initializing new rolling-hash region");
                Self::initialize(region.as_mut(), region_size, index_size);
            }
        }

        layout::set_state(region.as_mut(), State::Active);
        Ok(Self { region, index_size })
    }

    fn initialize(region: &mut [u8], region_size: u32, index_size: u32) {
        layout::set_offset_byte_size(region, OFFSET_SIZE);
        layout::set_region_size(region, region_size);
        layout::set_index_size(region, index_size);
        layout::set_total_record_count(region, 0);
        layout::set_live_record_count(region, 0);

        let records_off = layout::records_offset(index_size);
        layout::set_begin(region, records_off);
        layout::set_end(region, records_off);
        layout::set_wrap(region, 0);

        let index_start = layout::index_offset() as usize;
        let index_end = records_off as usize;
        for slot in &mut region[index_start..index_end] {
            *slot = 0;
        }
    }

    /// Mark the region cleanly closed. Used by the mapped backing before
    /// flushing; has no effect on the heap backing beyond the bit itself.
    pub(crate) fn freeze(&mut self) {
        layout::set_state(self.region.as_mut(), State::Frozen);
    }

    /// Consume the ring, returning ownership of its backing region.
    pub fn into_inner(self) -> S {
        self.region
    }

    /// Direct access to the backing region, for backings (e.g. `mapped`)
    /// that expose lifecycle operations, like `flush`, beyond the
    /// `AsRef`/`AsMut` byte-slice view the ring itself needs.
    pub(crate) fn region_mut(&mut self) -> &mut S {
        &mut self.region
    }

    // --- lookup -----------------------------------------------------

    pub fn get(&self, key: &[u8]) -> Option<RecordHandle> {
        self.get_hinted(key).0
    }

    /// Look up `key`, returning both the record (if found) and a chain
    /// hint usable by a subsequent `commit`/`drop_key` to splice without
    /// re-walking the chain.
    pub fn get_hinted(&self, key: &[u8]) -> (Option<RecordHandle>, Hint) {
        let region = self.region.as_ref();
        let bucket = hash::bucket(key, self.index_size);
        let mut ptr_ptr = layout::index_entry_offset(bucket);
        let mut ptr = layout::read_offset(region, ptr_ptr);

        while ptr != NULL_OFFSET {
            if key_matches(region, ptr, key) {
                return (Some(RecordHandle(ptr)), Hint(ptr_ptr));
            }
            // A record's `next` field lives at its own base offset, so
            // the offset of this link is simply the record's offset.
            ptr_ptr = ptr;
            ptr = record::next(region, ptr);
        }

        (None, Hint(ptr_ptr))
    }

    fn validate_hint(&self, hint: Hint) -> Result<u32> {
        let region = self.region.as_ref();
        let region_size = layout::region_size(region);
        let records_off = layout::records_offset(self.index_size);
        let ptr_ptr = hint.0;

        let in_index = ptr_ptr >= layout::index_offset()
            && ptr_ptr < records_off
            && (ptr_ptr - layout::index_offset()) % OFFSET_SIZE == 0;
        let in_records = ptr_ptr >= records_off && ptr_ptr < region_size;

        if !in_index && !in_records {
            return Err(Error::InvalidHint(format!(
                "hint offset {ptr_ptr} is out of bounds"
            )));
        }

        Ok(layout::read_offset(region, ptr_ptr))
    }

    // --- space accounting --------------------------------------------

    /// True iff an immediate `put(key_length, value_length)` would
    /// succeed. Performs no writes.
    pub fn would_fit(&self, key_length: usize, value_length: usize) -> bool {
        let l = record::allocated_size(key_length as u32, value_length as u32);
        let region = self.region.as_ref();
        let end = layout::end(region);
        let begin = layout::begin(region);
        let wrap = layout::wrap(region);
        let region_size = layout::region_size(region);
        let records_off = layout::records_offset(self.index_size);

        if end + l > region_size {
            records_off + l <= begin
        } else if wrap != 0 && end + l > begin {
            false
        } else {
            true
        }
    }

    // --- insertion ----------------------------------------------------

    /// Prepare a new record at the ring tail. The record is not yet part
    /// of any chain and `end` has not advanced; a subsequent `put` for a
    /// different key silently abandons this one. Call [`Self::value_mut`]
    /// to write the value bytes, then [`Self::commit`] to splice it in.
    pub fn put(
        &mut self,
        key: &[u8],
        value_length: usize,
        _hint: Option<Hint>,
    ) -> Result<PreparedRecord> {
        record::check_bounds(key.len(), value_length)?;
        if !self.would_fit(key.len(), value_length) {
            return Err(Error::CapacityExceeded(format!(
                "record of {} key bytes + {value_length} value bytes does not fit",
                key.len()
            )));
        }

        let l = record::allocated_size(key.len() as u32, value_length as u32);
        let region_size = layout::region_size(self.region.as_ref());
        let mut end = layout::end(self.region.as_ref());

        if end + l > region_size {
            layout::set_wrap(self.region.as_mut(), end);
            end = layout::records_offset(self.index_size);
        }

        record::init(self.region.as_mut(), end, key, value_length as u32);

        Ok(PreparedRecord {
            offset: end,
            key_length: key.len() as u32,
            value_length: value_length as u32,
        })
    }

    /// Mutable access to a prepared record's (uninitialized) value bytes.
    pub fn value_mut(&mut self, prepared: &PreparedRecord) -> &mut [u8] {
        let region = self.region.as_mut();
        let start = record::value_offset(region, prepared.offset) as usize;
        let end = start + prepared.value_length as usize;
        &mut region[start..end]
    }

    /// Splice a prepared record into its chain, advancing the ring tail.
    pub fn commit(&mut self, prepared: PreparedRecord, hint: Option<Hint>) -> Result<()> {
        let hint = match hint {
            Some(h) => h,
            None => {
                let key_start = record::key_offset(prepared.offset) as usize;
                let key_end = key_start + prepared.key_length as usize;
                let key = self.region.as_ref()[key_start..key_end].to_vec();
                self.get_hinted(&key).1
            }
        };

        let pointed = self.validate_hint(hint)?;
        let old_offset = if pointed == NULL_OFFSET {
            None
        } else {
            Some(pointed)
        };

        if let Some(old_offset) = old_offset {
            let region = self.region.as_ref();
            if record::key_length(region, old_offset) != prepared.key_length {
                return Err(Error::InvalidHint(
                    "hint points to a record with a different key".to_string(),
                ));
            }
            let old_key_start = record::key_offset(old_offset) as usize;
            let new_key_start = record::key_offset(prepared.offset) as usize;
            let len = prepared.key_length as usize;
            if region[old_key_start..old_key_start + len] != region[new_key_start..new_key_start + len]
            {
                return Err(Error::InvalidHint(
                    "hint points to a record with a different key".to_string(),
                ));
            }
        }

        let l = record::allocated_size(prepared.key_length, prepared.value_length);
        let region = self.region.as_mut();

        if let Some(old_offset) = old_offset {
            let old_next = record::next(region, old_offset);
            record::set_next(region, prepared.offset, old_next);
            record::set_dead(region, old_offset, true);
            tracing::debug!(offset = prepared.offset, old_offset, "commit replaced a live record");
        } else {
            let live = layout::live_record_count(region);
            layout::set_live_record_count(region, live + 1);
        }

        layout::write_offset(region, hint.0, prepared.offset);

        let new_end = prepared.offset + l;
        layout::set_end(region, new_end);

        let total = layout::total_record_count(region);
        layout::set_total_record_count(region, total + 1);

        Ok(())
    }

    /// Fused `put` + write + `commit`, for callers who already have the
    /// whole value in hand.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let prepared = self.put(key, value.len(), None)?;
        self.value_mut(&prepared).copy_from_slice(value);
        self.commit(prepared, None)
    }

    // --- removal --------------------------------------------------------

    /// Mark `key`'s record dead and unlink it from its chain. Its bytes
    /// remain in the ring until compaction (`reclaim_head`) reaches them.
    pub fn drop_key(&mut self, key: &[u8], hint: Option<Hint>) -> Result<bool> {
        let hint = match hint {
            Some(h) => h,
            None => self.get_hinted(key).1,
        };

        let pointed = self.validate_hint(hint)?;
        if pointed == NULL_OFFSET {
            return Ok(false);
        }

        if !key_matches(self.region.as_ref(), pointed, key) {
            return Err(Error::InvalidHint(
                "hint points to a record with a different key".to_string(),
            ));
        }

        let region = self.region.as_mut();
        let next = record::next(region, pointed);
        layout::write_offset(region, hint.0, next);
        record::set_dead(region, pointed, true);

        let live = layout::live_record_count(region);
        layout::set_live_record_count(region, live - 1);

        tracing::debug!(offset = pointed, "dropped record");
        Ok(true)
    }

    // --- ring iteration ---------------------------------------------

    fn is_empty(&self) -> bool {
        let region = self.region.as_ref();
        layout::wrap(region) == 0 && layout::begin(region) == layout::end(region)
    }

    /// The oldest record in the ring, live or dead, or `None` if empty.
    pub fn head(&self) -> Option<RecordHandle> {
        if self.is_empty() {
            None
        } else {
            Some(RecordHandle(layout::begin(self.region.as_ref())))
        }
    }

    /// The record written immediately after `cur` in ring order, or
    /// `None` if `cur` is the newest record.
    pub fn step(&self, cur: RecordHandle) -> Option<RecordHandle> {
        let region = self.region.as_ref();
        let l = record::allocated_size(
            record::key_length(region, cur.0),
            record::value_length(region, cur.0),
        );
        let mut next_off = cur.0 + l;

        let wrap = layout::wrap(region);
        if wrap != 0 && next_off == wrap {
            next_off = layout::records_offset(self.index_size);
        }

        if next_off == layout::end(region) {
            None
        } else {
            Some(RecordHandle(next_off))
        }
    }

    /// Reclaim the ring head, which must be dead. Invalidates any
    /// previously held `step(head)` result.
    pub fn reclaim_head(&mut self) -> Result<()> {
        {
            let region = self.region.as_ref();
            if self.is_empty() || !record::is_dead(region, layout::begin(region)) {
                return Err(Error::Empty);
            }
        }

        let begin0 = layout::begin(self.region.as_ref());
        let rec_len = record::allocated_size(
            record::key_length(self.region.as_ref(), begin0),
            record::value_length(self.region.as_ref(), begin0),
        );

        let mut begin = begin0 + rec_len;
        if begin == layout::wrap(self.region.as_ref()) {
            layout::set_wrap(self.region.as_mut(), 0);
            begin = layout::records_offset(self.index_size);
        }
        layout::set_begin(self.region.as_mut(), begin);

        let total = layout::total_record_count(self.region.as_ref());
        layout::set_total_record_count(self.region.as_mut(), total - 1);

        tracing::debug!(begin, "reclaimed ring head");
        Ok(())
    }

    /// Move the live ring head to the ring tail, preserving chain
    /// membership. The compaction primitive: repeated `rotate_head`
    /// calls circulate live records past a following `reclaim_head`,
    /// which then frees the dead ones left behind.
    pub fn rotate_head(&mut self) -> Result<()> {
        {
            let region = self.region.as_ref();
            if self.is_empty() || record::is_dead(region, layout::begin(region)) {
                return Err(Error::Empty);
            }
        }

        let begin0 = layout::begin(self.region.as_ref());
        let key_len = record::key_length(self.region.as_ref(), begin0);
        let value_len = record::value_length(self.region.as_ref(), begin0);
        let rec_len = record::allocated_size(key_len, value_len);

        let key: Vec<u8> = {
            let region = self.region.as_ref();
            let start = record::key_offset(begin0) as usize;
            region[start..start + key_len as usize].to_vec()
        };

        // Locate the chain-update hint before we move anything.
        let (_, hint) = self.get_hinted(&key);

        // Drop the head from the ring (mirrors reclaim_head's bookkeeping).
        let mut begin = begin0 + rec_len;
        if begin == layout::wrap(self.region.as_ref()) {
            layout::set_wrap(self.region.as_mut(), 0);
            begin = layout::records_offset(self.index_size);
        }
        layout::set_begin(self.region.as_mut(), begin);

        // Re-allocate it at the ring tail.
        let mut end = layout::end(self.region.as_ref());
        let region_size = layout::region_size(self.region.as_ref());
        if end + rec_len > region_size {
            layout::set_wrap(self.region.as_mut(), end);
            end = layout::records_offset(self.index_size);
        }

        // Copy direction is strictly low-to-high in source: on a nearly
        // full ring source and destination can overlap, and this is the
        // only direction that never reads an already-overwritten byte.
        record::copy_record(self.region.as_mut(), begin0, end, rec_len);

        layout::write_offset(self.region.as_mut(), hint.0, end);
        layout::set_end(self.region.as_mut(), end + rec_len);

        tracing::debug!(from = begin0, to = end, "rotated ring head to tail");
        Ok(())
    }

    /// True iff reclaiming or rotating the current head would invalidate
    /// `hint`, i.e. `hint` points at the head record's own chain link.
    pub fn head_invalidates(&self, hint: Hint) -> bool {
        match self.head() {
            Some(head) => hint.0 == head.0,
            None => false,
        }
    }

    // --- record accessors ---------------------------------------------

    pub fn key_of(&self, rec: RecordHandle) -> Bytes {
        let region = self.region.as_ref();
        let len = record::key_length(region, rec.0) as usize;
        let start = record::key_offset(rec.0) as usize;
        Bytes::copy_from_slice(&region[start..start + len])
    }

    pub fn value_of(&self, rec: RecordHandle) -> Bytes {
        let region = self.region.as_ref();
        let len = record::value_length(region, rec.0) as usize;
        let start = record::value_offset(region, rec.0) as usize;
        Bytes::copy_from_slice(&region[start..start + len])
    }

    pub fn is_dead(&self, rec: RecordHandle) -> bool {
        record::is_dead(self.region.as_ref(), rec.0)
    }

    // --- metrics --------------------------------------------------------

    pub fn region_size(&self) -> u32 {
        layout::region_size(self.region.as_ref())
    }

    pub fn index_size(&self) -> u32 {
        self.index_size
    }

    pub fn total_record_count(&self) -> u32 {
        layout::total_record_count(self.region.as_ref())
    }

    pub fn live_record_count(&self) -> u32 {
        layout::live_record_count(self.region.as_ref())
    }

    pub fn used_index_size(&self) -> u32 {
        let region = self.region.as_ref();
        (0..self.index_size)
            .filter(|&bucket| layout::read_offset(region, layout::index_entry_offset(bucket)) != NULL_OFFSET)
            .count() as u32
    }
}

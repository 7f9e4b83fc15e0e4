//! Lock-free slot rings over region memory.
//!
//! A [`Ring`] is one arena: `rows` independent rings of `entries` slots,
//! each row with its own claim counter. The counter holds the sequence
//! number of the last claimed slot and starts at `u32::MAX`, so the first
//! claim wraps it to 0 and lands in slot 0.
//!
//! ```text
//! counter:  MAX ->  0  ->  1  -> ... -> entries-1 -> entries -> ...
//! slot:             0      1            entries-1    0 (overwrite)
//! ```
//!
//! # Memory Layout
//!
//! Rows sit back to back in the arena; a slot is exactly one record.
//!
//! ```text
//! +---------------------------------------------+ arena offset
//! | row 0: slot 0 | slot 1 | ... | slot n-1     |
//! +---------------------------------------------+ + n * record_size
//! | row 1: slot 0 | slot 1 | ... | slot n-1     |
//! +---------------------------------------------+
//! | ...                                         |
//! ```
//!
//! Counters are kept on the heap, not in the arena: a dump tool orders
//! records by their timestamps and never needs them.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::marker::PhantomData;
use core::mem::size_of;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicU32, Ordering};

use super::records::EventRecord;
use super::ArenaLayout;
use crate::region::MemoryRegion;

/// Counter value before the first claim.
const UNCLAIMED: u32 = u32::MAX;

/// One arena of fixed-size slots.
///
/// # Thread Safety
///
/// - **Many writers**: any core may claim on any row; `fetch_add` hands each
///   claim a distinct sequence number
/// - **Lossy rewind**: `unclaim` may give back a concurrent writer's slot
/// - **Readers**: iteration copies slots out without locking; a slot being
///   written at the same time can read back torn
pub struct Ring {
    /// First byte of the arena inside the region.
    base: NonNull<u8>,

    /// Bytes per slot, equal to `size_of` the record kind.
    record_size: usize,

    /// Slots per row. Always a power of two.
    entries: usize,

    /// `entries - 1`, to turn a sequence number into a slot index.
    mask: usize,

    /// Sequence number of the last claim, one counter per row.
    counters: Box<[AtomicU32]>,
}

// Slots are only written by the thread that claimed them through the
// atomic counter; the memory itself is owned by the region.
unsafe impl Send for Ring {}
unsafe impl Sync for Ring {}

impl Ring {
    /// Bind a ring to its arena. The arena must lie inside `region`.
    pub(crate) fn new(region: &MemoryRegion, layout: &ArenaLayout) -> Self {
        debug_assert!(layout.entries.is_power_of_two());
        debug_assert!(layout.offset + layout.size() <= region.total_size());
        let base = match NonNull::new(region.ptr_at(layout.offset)) {
            Some(base) => base,
            None => NonNull::dangling(),
        };
        Self {
            base,
            record_size: layout.record_size,
            entries: layout.entries,
            mask: layout.entries - 1,
            counters: (0..layout.rows)
                .map(|_| AtomicU32::new(UNCLAIMED))
                .collect::<Vec<_>>()
                .into_boxed_slice(),
        }
    }

    /// Number of independent rows (cores, or 1 for a global kind).
    pub fn rows(&self) -> usize {
        self.counters.len()
    }

    /// Slots in each row.
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Claim the next slot of `row`, returning its index.
    ///
    /// Returns `None` if the row does not exist.
    #[inline(always)]
    pub fn claim(&self, row: usize) -> Option<usize> {
        self.claim_seq(row).map(|seq| self.slot_of(seq))
    }

    /// Claim the next slot of `row`, returning its sequence number.
    ///
    /// Sequence numbers keep counting past `entries`; use
    /// [`slot_of`](Ring::slot_of) for the index.
    #[inline(always)]
    pub fn claim_seq(&self, row: usize) -> Option<u32> {
        let counter = self.counters.get(row)?;
        Some(counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1))
    }

    /// Slot index a sequence number maps to.
    #[inline(always)]
    pub fn slot_of(&self, seq: u32) -> usize {
        seq as usize & self.mask
    }

    /// Give back the most recent claim on `row`.
    ///
    /// If another writer claimed in between, its slot is the one given back
    /// and will be overwritten by the next claim. Callers accept that loss.
    #[inline(always)]
    pub fn unclaim(&self, row: usize) {
        if let Some(counter) = self.counters.get(row) {
            counter.fetch_sub(1, Ordering::Relaxed);
        }
    }

    #[inline(always)]
    fn slot_ptr(&self, row: usize, idx: usize) -> *mut u8 {
        debug_assert!(row < self.rows() && idx < self.entries);
        // SAFETY: row and idx are within the arena laid out for this ring.
        unsafe {
            self.base
                .as_ptr()
                .add((row * self.entries + idx) * self.record_size)
        }
    }

    /// Store `record` in a slot previously returned by [`claim`](Ring::claim).
    #[inline(always)]
    pub fn write<R: EventRecord>(&self, row: usize, idx: usize, record: R) {
        debug_assert_eq!(size_of::<R>(), self.record_size);
        // SAFETY: the slot is in the arena and aligned (arenas are 64-byte
        // aligned and record sizes are multiples of their alignment). The
        // caller claimed it, so no other writer targets it.
        unsafe { ptr::write_volatile(self.slot_ptr(row, idx) as *mut R, record) }
    }

    /// Update a claimed slot in place.
    #[inline(always)]
    pub fn update<R: EventRecord>(&self, row: usize, idx: usize, f: impl FnOnce(&mut R)) {
        let mut record = self.read::<R>(row, idx);
        f(&mut record);
        self.write(row, idx, record);
    }

    /// Copy slot `idx` of `row` out of the arena.
    pub fn read<R: EventRecord>(&self, row: usize, idx: usize) -> R {
        debug_assert_eq!(size_of::<R>(), self.record_size);
        // SAFETY: as `write`. Records are plain data, so any bit pattern is
        // a valid value.
        unsafe { ptr::read_volatile(self.slot_ptr(row, idx) as *const R) }
    }

    /// Number of claims made on `row` since the last reset.
    pub fn claimed(&self, row: usize) -> u32 {
        self.counters
            .get(row)
            .map_or(0, |c| c.load(Ordering::Relaxed).wrapping_add(1))
    }

    /// Forget every claim on `row`. The slots keep their bytes.
    pub fn reset_row(&self, row: usize) {
        if let Some(counter) = self.counters.get(row) {
            counter.store(UNCLAIMED, Ordering::Relaxed);
        }
    }

    /// Records of `row` still in the ring, oldest first.
    pub fn iter<R: EventRecord>(&self, row: usize) -> RingIter<'_, R> {
        let claimed = self.claimed(row) as usize;
        let live = claimed.min(self.entries);
        RingIter {
            ring: self,
            row,
            next: claimed - live,
            end: claimed,
            _record: PhantomData,
        }
    }
}

/// Iterator over the live records of one ring row.
///
/// The claim count is sampled once when the iterator is made; claims made
/// while iterating are not followed, and a slot they overwrite reads back as
/// the newer record.
pub struct RingIter<'a, R> {
    ring: &'a Ring,
    row: usize,

    /// Sequence number of the next record to yield.
    next: usize,

    /// One past the newest sequence number at creation.
    end: usize,

    _record: PhantomData<R>,
}

impl<R: EventRecord> Iterator for RingIter<'_, R> {
    type Item = R;

    fn next(&mut self) -> Option<R> {
        if self.next >= self.end {
            return None;
        }
        let idx = self.next & self.ring.mask;
        self.next += 1;
        Some(self.ring.read(self.row, idx))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.end - self.next;
        (n, Some(n))
    }
}

impl<R: EventRecord> ExactSizeIterator for RingIter<'_, R> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kevents::{ClockeventRecord, EventKind};
    use crate::region::MemoryBank;

    fn arena(rows: usize, entries: usize) -> ArenaLayout {
        ArenaLayout {
            kind: EventKind::Clockevent,
            offset: 0,
            rows,
            entries,
            record_size: size_of::<ClockeventRecord>(),
        }
    }

    fn event(n: u64) -> ClockeventRecord {
        ClockeventRecord {
            time: n,
            clc: n * 2,
            delta: n as i64,
            next_event: -(n as i64),
        }
    }

    #[test]
    fn first_claim_lands_in_slot_zero() {
        let bank = MemoryBank::new(0, 0x1000);
        let region = MemoryRegion::reserve(&bank, 0, 0x1000).expect("reserve");
        let ring = Ring::new(&region, &arena(2, 8));
        assert_eq!(ring.claim(0), Some(0));
        assert_eq!(ring.claim(0), Some(1));
        assert_eq!(ring.claim(1), Some(0));
        assert_eq!(ring.claim(2), None);
    }

    #[test]
    fn rows_are_independent() {
        let bank = MemoryBank::new(0, 0x1000);
        let region = MemoryRegion::reserve(&bank, 0, 0x1000).expect("reserve");
        let ring = Ring::new(&region, &arena(2, 8));
        for n in 0..3 {
            let idx = ring.claim(0).expect("row 0");
            ring.write(0, idx, event(n));
        }
        let idx = ring.claim(1).expect("row 1");
        ring.write(1, idx, event(100));

        let row0: Vec<u64> = ring.iter::<ClockeventRecord>(0).map(|e| e.time).collect();
        let row1: Vec<u64> = ring.iter::<ClockeventRecord>(1).map(|e| e.time).collect();
        assert_eq!(row0, [0, 1, 2]);
        assert_eq!(row1, [100]);
    }

    #[test]
    fn wraparound_keeps_newest_entries() {
        let bank = MemoryBank::new(0, 0x1000);
        let region = MemoryRegion::reserve(&bank, 0, 0x1000).expect("reserve");
        let ring = Ring::new(&region, &arena(1, 4));
        for n in 0..11 {
            let idx = ring.claim(0).expect("row 0");
            ring.write(0, idx, event(n));
        }
        let times: Vec<u64> = ring.iter::<ClockeventRecord>(0).map(|e| e.time).collect();
        assert_eq!(times, [7, 8, 9, 10]);
    }

    #[test]
    fn unclaim_rewinds_counter() {
        let bank = MemoryBank::new(0, 0x1000);
        let region = MemoryRegion::reserve(&bank, 0, 0x1000).expect("reserve");
        let ring = Ring::new(&region, &arena(1, 4));
        let idx = ring.claim(0).expect("row 0");
        ring.write(0, idx, event(1));
        ring.claim(0).expect("row 0");
        ring.unclaim(0);
        assert_eq!(ring.claimed(0), 1);
        assert_eq!(ring.claim(0), Some(1));

        ring.reset_row(0);
        assert_eq!(ring.iter::<ClockeventRecord>(0).len(), 0);
    }
}

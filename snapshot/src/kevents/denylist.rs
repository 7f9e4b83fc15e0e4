//! Fixed-size exclusion lists for irq and task ids.
//!
//! Checked on the hot path before a slot is claimed, so lookups are a
//! linear scan of a few relaxed atomic loads.

use core::sync::atomic::{AtomicI32, Ordering};

use crate::error::{Result, SnapshotError};

/// Entries per list.
pub const DENYLIST_LEN: usize = 8;

const EMPTY: i32 = i32::MIN;

pub struct Denylist {
    ids: [AtomicI32; DENYLIST_LEN],
}

impl Denylist {
    pub const fn new() -> Self {
        Self {
            ids: [const { AtomicI32::new(EMPTY) }; DENYLIST_LEN],
        }
    }

    /// Build a list pre-filled with `ids`; extra ids are ignored.
    pub fn with(ids: &[i32]) -> Self {
        let list = Self::new();
        for &id in ids {
            let _ = list.add(id);
        }
        list
    }

    #[inline(always)]
    pub fn contains(&self, id: i32) -> bool {
        id != EMPTY && self.ids.iter().any(|slot| slot.load(Ordering::Relaxed) == id)
    }

    /// Add `id`. Adding an id already present is a no-op.
    pub fn add(&self, id: i32) -> Result<()> {
        if id == EMPTY {
            return Err(SnapshotError::InvalidArgument);
        }
        if self.contains(id) {
            return Ok(());
        }
        for slot in &self.ids {
            if slot
                .compare_exchange(EMPTY, id, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return Ok(());
            }
        }
        Err(SnapshotError::ListFull)
    }

    pub fn remove(&self, id: i32) -> Result<()> {
        for slot in &self.ids {
            if slot
                .compare_exchange(id, EMPTY, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return Ok(());
            }
        }
        Err(SnapshotError::NotFound)
    }

    /// Copy the current ids into `out`, returning how many were copied.
    pub fn list(&self, out: &mut [i32]) -> usize {
        let mut n = 0;
        for id in self.ids.iter().map(|slot| slot.load(Ordering::Relaxed)) {
            if id != EMPTY && n < out.len() {
                out[n] = id;
                n += 1;
            }
        }
        n
    }
}

impl Default for Denylist {
    fn default() -> Self {
        Self::new()
    }
}

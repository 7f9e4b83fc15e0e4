//! Reserved memory region and its fixed header layout.
//!
//! The whole engine lives inside one physically contiguous block reserved at
//! boot. Its first bytes are a header read by offline tools after a reboot,
//! so every offset below is part of the persisted format.
//!
//! ```text
//! region base (primary category head)
//! +---------------------------+ 0x0000
//! | vaddr | paddr | size | magic|
//! | ...                       |
//! | liveness signature        | 0x0100
//! | last kernel-log pointer   | 0x0200
//! | crash/reboot reason       | 0x0300  <- cleared from here on boot
//! | core power state          | 0x0400
//! +---------------------------+ 0x1000
//! | MMU registers, 512 B/core |
//! +---------------------------+ 0x2000
//! | core registers, 512 B/core|
//! +---------------------------+ 0x3000
//! | spare                     |
//! +---------------------------+ 0x4000
//! | event arenas ...          |
//! +---------------------------+ primary capacity
//! | other categories ...      |
//! +---------------------------+
//! ```

use alloc::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use alloc::vec::Vec;
use core::mem::size_of;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicU32, AtomicU64};

use spin::Mutex;

use crate::error::{Result, SnapshotError};

// =============================================================================
// Layout constants
// =============================================================================

pub const HEADER_SIZE: usize = 0x1000;
pub const MMU_REG_SIZE: usize = 0x1000;
pub const CORE_REG_SIZE: usize = 0x1000;
pub const SPARE_SIZE: usize = 0x1000;

/// Bytes reserved per core inside the MMU and core register blocks.
pub const REG_SLOT_SIZE: usize = 0x200;

/// Number of cores the register blocks have slots for.
pub const MAX_CPUS: usize = CORE_REG_SIZE / REG_SLOT_SIZE;

/// Header plus register slots plus spare; event arenas start here.
pub const HEADER_TOTAL_SIZE: usize = HEADER_SIZE + MMU_REG_SIZE + CORE_REG_SIZE + SPARE_SIZE;

/// Allocation given to the primary category when it only hosts the header.
pub const HEADER_ALLOC_SIZE: usize = 2 * 1024 * 1024;

/// Leading header bytes that survive the boot-time clear.
pub const KEEP_HEADER_SIZE: usize = 0x300;

/// Written at [`offset::MAGIC`] once the header describes this region.
pub const HEADER_MAGIC: u32 = 0xDBDB_DBDB;

/// Byte offsets from the region base.
pub mod offset {
    use super::*;

    pub const VADDR: usize = 0x00;
    pub const PADDR: usize = 0x08;
    pub const SIZE: usize = 0x10;
    pub const MAGIC: usize = 0x18;
    pub const SIGNATURE: usize = 0x100;
    pub const LAST_KERNEL_LOG: usize = 0x200;
    pub const REASON: usize = 0x300;
    pub const CORE_POWER: usize = 0x400;
    pub const MMU_REGS: usize = HEADER_SIZE;
    pub const CORE_REGS: usize = HEADER_SIZE + MMU_REG_SIZE;
    pub const SPARE: usize = HEADER_SIZE + MMU_REG_SIZE + CORE_REG_SIZE;
    pub const EVENTS: usize = HEADER_TOTAL_SIZE;
}

const _: () = assert!(KEEP_HEADER_SIZE > offset::LAST_KERNEL_LOG + 8);
const _: () = assert!(offset::REASON >= KEEP_HEADER_SIZE);
const _: () = assert!(HEADER_TOTAL_SIZE <= HEADER_ALLOC_SIZE);

// =============================================================================
// Physical memory
// =============================================================================

/// Source of physically addressed memory that survives a warm reset.
pub trait PhysicalMemory: Send + Sync {
    /// Reserve `[base, base + size)` exclusively and map it.
    ///
    /// Fails if any part of the range is outside the memory or already
    /// reserved. The returned pointer stays valid until [`release`] is
    /// called for the same range.
    ///
    /// [`release`]: PhysicalMemory::release
    fn reserve(&self, base: u64, size: usize) -> Result<NonNull<u8>>;

    /// Give back a range obtained from [`reserve`](PhysicalMemory::reserve).
    fn release(&self, base: u64, size: usize);
}

/// A bank of simulated DRAM at a fixed physical address.
///
/// The contents outlive any engine using it, which is how a warm reboot is
/// modelled: shut one engine down and boot another over the same bank.
pub struct MemoryBank {
    phys_start: u64,
    ptr: NonNull<u8>,
    layout: Layout,
    reserved: Mutex<Vec<(u64, usize)>>,
}

// The bank owns its allocation. Concurrent access to the bytes is governed
// by the reservation protocol and by the engine's own atomics.
unsafe impl Send for MemoryBank {}
unsafe impl Sync for MemoryBank {}

impl MemoryBank {
    /// Allocate a zeroed bank of `size` bytes located at `phys_start`.
    pub fn new(phys_start: u64, size: usize) -> Self {
        let layout = match Layout::from_size_align(size.max(1), 4096) {
            Ok(layout) => layout,
            Err(_) => panic!("invalid memory bank size {:#x}", size),
        };
        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = match NonNull::new(raw) {
            Some(ptr) => ptr,
            None => handle_alloc_error(layout),
        };
        Self {
            phys_start,
            ptr,
            layout,
            reserved: Mutex::new(Vec::new()),
        }
    }

    pub fn phys_start(&self) -> u64 {
        self.phys_start
    }

    pub fn size(&self) -> usize {
        self.layout.size()
    }

    fn bank_offset(&self, phys: u64, len: usize) -> Result<usize> {
        let off = phys
            .checked_sub(self.phys_start)
            .ok_or(SnapshotError::AllocationFailure { base: phys, size: len })? as usize;
        match off.checked_add(len) {
            Some(end) if end <= self.size() => Ok(off),
            _ => Err(SnapshotError::AllocationFailure { base: phys, size: len }),
        }
    }

    /// Copy bank contents at `phys` into `buf`, as a post-reboot dump would.
    pub fn read(&self, phys: u64, buf: &mut [u8]) -> Result<()> {
        let off = self.bank_offset(phys, buf.len())?;
        // SAFETY: range checked against the allocation above.
        unsafe { ptr::copy(self.ptr.as_ptr().add(off), buf.as_mut_ptr(), buf.len()) };
        Ok(())
    }

    /// Overwrite bank contents at `phys`.
    pub fn write(&self, phys: u64, data: &[u8]) -> Result<()> {
        let off = self.bank_offset(phys, data.len())?;
        // SAFETY: range checked against the allocation above.
        unsafe { ptr::copy(data.as_ptr(), self.ptr.as_ptr().add(off), data.len()) };
        Ok(())
    }

    /// Fill the whole bank with `byte`, modelling DRAM after power loss.
    pub fn fill(&self, byte: u8) {
        // SAFETY: the allocation is `size()` bytes long.
        unsafe { ptr::write_bytes(self.ptr.as_ptr(), byte, self.size()) };
    }

    /// Copy of `len` bytes starting at `phys`.
    pub fn image(&self, phys: u64, len: usize) -> Result<Vec<u8>> {
        let mut out = alloc::vec![0u8; len];
        self.read(phys, &mut out)?;
        Ok(out)
    }
}

impl PhysicalMemory for MemoryBank {
    fn reserve(&self, base: u64, size: usize) -> Result<NonNull<u8>> {
        let off = self.bank_offset(base, size)?;
        let mut reserved = self.reserved.lock();
        let end = base + size as u64;
        if reserved
            .iter()
            .any(|&(b, s)| base < b + s as u64 && b < end)
        {
            return Err(SnapshotError::RegionOverlap { base, size });
        }
        reserved.push((base, size));
        // SAFETY: offset checked against the allocation.
        Ok(unsafe { NonNull::new_unchecked(self.ptr.as_ptr().add(off)) })
    }

    fn release(&self, base: u64, size: usize) {
        self.reserved.lock().retain(|&(b, s)| !(b == base && s == size));
    }
}

impl Drop for MemoryBank {
    fn drop(&mut self) {
        // SAFETY: allocated in `new` with the same layout.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

// =============================================================================
// MemoryRegion
// =============================================================================

/// The reserved and mapped block backing the header and every category.
pub struct MemoryRegion {
    physical_base: u64,
    virtual_base: NonNull<u8>,
    total_size: usize,
}

// The region is plain memory. Writers coordinate through atomics held
// elsewhere (ring counters, category cursors) and never share a byte range.
unsafe impl Send for MemoryRegion {}
unsafe impl Sync for MemoryRegion {}

impl MemoryRegion {
    /// Reserve and map `size` bytes at physical `base`.
    pub fn reserve(memory: &dyn PhysicalMemory, base: u64, size: usize) -> Result<Self> {
        let virtual_base = memory.reserve(base, size).map_err(|e| match e {
            SnapshotError::RegionOverlap { .. } => e,
            _ => SnapshotError::AllocationFailure { base, size },
        })?;
        Ok(Self {
            physical_base: base,
            virtual_base,
            total_size: size,
        })
    }

    /// Give the range back to `memory`. The region must not be used again.
    pub(crate) fn release(&self, memory: &dyn PhysicalMemory) {
        memory.release(self.physical_base, self.total_size);
    }

    pub fn physical_base(&self) -> u64 {
        self.physical_base
    }

    pub fn virtual_base(&self) -> usize {
        self.virtual_base.as_ptr() as usize
    }

    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Virtual address of the spare area plus `off`.
    pub fn spare_vaddr(&self, off: usize) -> usize {
        self.virtual_base() + offset::SPARE + off
    }

    /// Physical address of the spare area plus `off`.
    pub fn spare_paddr(&self, off: usize) -> u64 {
        self.physical_base + (offset::SPARE + off) as u64
    }

    /// Pointer to byte `off` of the region.
    #[inline(always)]
    pub(crate) fn ptr_at(&self, off: usize) -> *mut u8 {
        debug_assert!(off <= self.total_size);
        // SAFETY: callers stay within the mapped range.
        unsafe { self.virtual_base.as_ptr().add(off) }
    }

    pub(crate) fn read_u32(&self, off: usize) -> u32 {
        debug_assert!(off + 4 <= self.total_size);
        // SAFETY: in range and 4-byte aligned (all header offsets are).
        unsafe { ptr::read_volatile(self.ptr_at(off) as *const u32) }
    }

    pub(crate) fn write_u32(&self, off: usize, val: u32) {
        debug_assert!(off + 4 <= self.total_size);
        // SAFETY: as read_u32.
        unsafe { ptr::write_volatile(self.ptr_at(off) as *mut u32, val) }
    }

    pub(crate) fn read_u64(&self, off: usize) -> u64 {
        debug_assert!(off + 8 <= self.total_size);
        // SAFETY: in range and 8-byte aligned.
        unsafe { ptr::read_volatile(self.ptr_at(off) as *const u64) }
    }

    pub(crate) fn write_u64(&self, off: usize, val: u64) {
        debug_assert!(off + 8 <= self.total_size);
        // SAFETY: as read_u64.
        unsafe { ptr::write_volatile(self.ptr_at(off) as *mut u64, val) }
    }

    /// Atomic view of the word at `off`, for header fields several cores
    /// update at once.
    pub(crate) fn atomic_u32(&self, off: usize) -> &AtomicU32 {
        debug_assert!(off % 4 == 0 && off + 4 <= self.total_size);
        // SAFETY: in range, 4-byte aligned, and the region outlives `&self`.
        unsafe { &*(self.ptr_at(off) as *const AtomicU32) }
    }

    pub(crate) fn atomic_u64(&self, off: usize) -> &AtomicU64 {
        debug_assert!(off % 8 == 0 && off + 8 <= self.total_size);
        // SAFETY: in range, 8-byte aligned, and the region outlives `&self`.
        unsafe { &*(self.ptr_at(off) as *const AtomicU64) }
    }

    /// Store a plain-data value (register snapshots) at `off`.
    pub(crate) fn write_value<T: Copy>(&self, off: usize, val: &T) {
        debug_assert!(off + size_of::<T>() <= self.total_size);
        // SAFETY: in range; unaligned store.
        unsafe { ptr::write_unaligned(self.ptr_at(off) as *mut T, *val) }
    }

    pub(crate) fn zero(&self, off: usize, len: usize) {
        debug_assert!(off + len <= self.total_size);
        // SAFETY: in range.
        unsafe { ptr::write_bytes(self.ptr_at(off), 0, len) }
    }

    /// Copy `bytes` into the region at `off`.
    ///
    /// Callers must own `[off, off + bytes.len())` exclusively.
    pub(crate) fn copy_in(&self, off: usize, bytes: &[u8]) {
        debug_assert!(off + bytes.len() <= self.total_size);
        // SAFETY: in range; exclusivity is the caller's contract.
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr_at(off), bytes.len()) }
    }

    pub(crate) fn copy_out(&self, off: usize, buf: &mut [u8]) {
        debug_assert!(off + buf.len() <= self.total_size);
        // SAFETY: in range.
        unsafe { ptr::copy(self.ptr_at(off), buf.as_mut_ptr(), buf.len()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: u64 = 0x9000_0000;

    #[test]
    fn reservation_is_exclusive() {
        let bank = MemoryBank::new(BASE, 0x10000);
        let region = MemoryRegion::reserve(&bank, BASE, 0x8000).expect("first reservation");
        assert!(matches!(
            MemoryRegion::reserve(&bank, BASE + 0x4000, 0x1000),
            Err(SnapshotError::RegionOverlap { .. })
        ));
        region.release(&bank);
        assert!(MemoryRegion::reserve(&bank, BASE + 0x4000, 0x1000).is_ok());
    }

    #[test]
    fn out_of_bank_ranges_fail() {
        let bank = MemoryBank::new(BASE, 0x10000);
        assert_eq!(
            MemoryRegion::reserve(&bank, BASE + 0xF000, 0x2000).err(),
            Some(SnapshotError::AllocationFailure {
                base: BASE + 0xF000,
                size: 0x2000
            })
        );
        assert!(MemoryRegion::reserve(&bank, BASE - 0x1000, 0x1000).is_err());
    }

    #[test]
    fn header_words_land_at_fixed_physical_offsets() {
        let bank = MemoryBank::new(BASE, 0x10000);
        let region = MemoryRegion::reserve(&bank, BASE, 0x10000).expect("reserve");
        region.write_u32(offset::SIGNATURE, 0xFACE);
        region.write_u64(offset::LAST_KERNEL_LOG, 0x1234_5678_9abc);

        let mut word = [0u8; 4];
        bank.read(BASE + 0x100, &mut word).expect("read");
        assert_eq!(u32::from_le_bytes(word), 0xFACE);
        let mut dword = [0u8; 8];
        bank.read(BASE + 0x200, &mut dword).expect("read");
        assert_eq!(u64::from_le_bytes(dword), 0x1234_5678_9abc);
    }

    #[test]
    fn spare_helpers_agree() {
        let bank = MemoryBank::new(BASE, 0x10000);
        let region = MemoryRegion::reserve(&bank, BASE, 0x10000).expect("reserve");
        assert_eq!(region.spare_paddr(0x10), BASE + 0x3010);
        assert_eq!(region.spare_vaddr(0x10), region.virtual_base() + 0x3010);
    }
}

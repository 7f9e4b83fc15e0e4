//! Offline reading of a region image.
//!
//! After a reset the region is dumped as raw bytes, starting at its
//! physical base. [`SnapshotImage`] reads such a dump without an engine:
//! the header, the saved registers, the kernel log in write order and the
//! event arenas. The layout is recomputed from the same [`SnapshotConfig`]
//! the dumped system booted with.

use alloc::vec::Vec;
use core::mem::size_of;
use core::ptr;

use crate::category::{
    CategoryRegistry, WRAP_END_OFFSET, WRAP_MAGIC, WRAP_MAGIC_OFFSET, WRAP_TRAILER_SIZE,
};
use crate::config::SnapshotConfig;
use crate::error::{Result, SnapshotError};
use crate::kevents::{EventRecord, KeventsLayout};
use crate::lifecycle::{HeaderSnapshot, LifecycleState};
use crate::platform::{CoreRegisters, MmuRegisters};
use crate::region::{offset, HEADER_TOTAL_SIZE, MAX_CPUS, REG_SLOT_SIZE, SPARE_SIZE};

pub struct SnapshotImage<'a> {
    bytes: &'a [u8],
    header: HeaderSnapshot,
}

impl<'a> SnapshotImage<'a> {
    /// Check that `bytes` starts with a stamped header.
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < HEADER_TOTAL_SIZE {
            return Err(SnapshotError::InvalidArgument);
        }
        let header = HeaderSnapshot::from_bytes(bytes).ok_or(SnapshotError::InvalidArgument)?;
        if !header.has_magic() {
            return Err(SnapshotError::NotFound);
        }
        Ok(Self { bytes, header })
    }

    pub fn header(&self) -> &HeaderSnapshot {
        &self.header
    }

    /// How the dumped session ended.
    pub fn outcome(&self) -> LifecycleState {
        self.header.outcome()
    }

    fn value_at<T: Copy>(&self, off: usize) -> Option<T> {
        let bytes = self.bytes.get(off..off.checked_add(size_of::<T>())?)?;
        // SAFETY: in bounds; only called with plain integer structs, for
        // which every bit pattern is valid.
        Some(unsafe { ptr::read_unaligned(bytes.as_ptr() as *const T) })
    }

    pub fn core_registers(&self, cpu: usize) -> Option<CoreRegisters> {
        (cpu < MAX_CPUS).then_some(())?;
        self.value_at(offset::CORE_REGS + cpu * REG_SLOT_SIZE)
    }

    pub fn mmu_registers(&self, cpu: usize) -> Option<MmuRegisters> {
        (cpu < MAX_CPUS).then_some(())?;
        self.value_at(offset::MMU_REGS + cpu * REG_SLOT_SIZE)
    }

    pub fn spare(&self) -> &'a [u8] {
        &self.bytes[offset::SPARE..offset::SPARE + SPARE_SIZE]
    }

    /// The resumable text category, oldest byte first.
    ///
    /// `None` if the configuration has no such category or the saved write
    /// position does not point into it.
    pub fn kernel_log(&self, config: &SnapshotConfig) -> Option<Vec<u8>> {
        let registry = CategoryRegistry::new(config.categories());
        let text = registry.resumable()?;
        let (head, size) = registry.planned_placement(text.name())?;
        let area = self.bytes.get(head..head + size)?;
        let limit = size.checked_sub(WRAP_TRAILER_SIZE)?;

        let start = self.header.paddr + head as u64;
        let cursor = self.header.last_kernel_log.checked_sub(start)? as usize;
        if cursor >= limit {
            return None;
        }
        let trailer = &area[limit..];
        let word = |at: usize| -> Option<u64> {
            Some(u64::from_le_bytes(trailer.get(at..at + 8)?.try_into().ok()?))
        };

        let mut out = Vec::with_capacity(limit);
        if word(WRAP_MAGIC_OFFSET)? == WRAP_MAGIC {
            let wrap_end = (word(WRAP_END_OFFSET)? as usize).min(limit);
            if cursor < wrap_end {
                out.extend_from_slice(&area[cursor..wrap_end]);
            }
        }
        out.extend_from_slice(&area[..cursor]);
        Some(out)
    }

    /// Records of kind `R` in `row`, ordered by timestamp.
    ///
    /// Slots never written read back as zeroes and are skipped.
    pub fn events<R: EventRecord>(&self, config: &SnapshotConfig, row: usize) -> Option<Vec<R>> {
        let registry = CategoryRegistry::new(config.categories());
        let primary = registry.primary()?;
        if !primary.enabled_at_init() {
            return None;
        }
        let (_, capacity) = registry.planned_placement(primary.name())?;
        let layout =
            KeventsLayout::compute(&config.rings, config.nr_cpus, offset::EVENTS, capacity).ok()?;
        let arena = layout.arena(R::KIND);
        if row >= arena.rows {
            return None;
        }

        let first = arena.offset + row * arena.entries * arena.record_size;
        let mut records: Vec<R> = (0..arena.entries)
            .filter_map(|i| self.value_at::<R>(first + i * arena.record_size))
            .filter(|r| r.time() != 0)
            .collect();
        records.sort_unstable_by_key(|r| r.time());
        Some(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CategoryDescriptor, CategoryKind, RingConfig};
    use crate::engine::Engine;
    use crate::kevents::TaskRecord;
    use crate::platform::{ManualPlatform, TaskInfo};
    use crate::region::MemoryBank;
    use alloc::sync::Arc;

    const BASE: u64 = 0x9000_0000;

    fn config() -> SnapshotConfig {
        SnapshotConfig::new(BASE)
            .with_cpus(2)
            .with_rings(RingConfig::uniform(4))
            .with_categories(&[
                CategoryDescriptor::new("log_kevents", 0x20000, CategoryKind::Events),
                CategoryDescriptor::new("log_kernel", 0x40, CategoryKind::ResumableText),
                CategoryDescriptor::new("log_platform", 0x100, CategoryKind::Text),
            ])
    }

    #[test]
    fn rejects_short_or_unstamped_images() {
        assert!(SnapshotImage::parse(&[0u8; 16]).is_err());
        let blank = alloc::vec![0u8; HEADER_TOTAL_SIZE];
        assert_eq!(SnapshotImage::parse(&blank).err(), Some(SnapshotError::NotFound));
    }

    #[test]
    fn reads_back_a_crashed_session() {
        let bank = Arc::new(MemoryBank::new(BASE, 0x40000));
        let platform = Arc::new(ManualPlatform::new(2));
        platform.set_time(1_000);
        let engine = Engine::new(config(), bank.clone(), platform.clone());

        // 0x30 usable bytes: the third line wraps.
        engine.hook_kernel_log(b"<6>booting cpu1......\n");
        engine.hook_kernel_log(b"<6>cpu1 online.......\n");
        engine.hook_kernel_log(b"<0>oops: bad\n");
        let k = engine.kevents().expect("live");
        for pid in 1..=6 {
            k.task(1, &TaskInfo::new(pid, "t"));
        }
        let mut regs = CoreRegisters::zeroed();
        regs.sp = 0xffff_8000_1234_0000;
        platform.set_registers(regs);
        engine.on_panic(1);

        let dump = bank.image(BASE, engine.total_size()).expect("dump");
        let image = SnapshotImage::parse(&dump).expect("stamped");
        assert_eq!(image.outcome(), LifecycleState::Crashed);
        assert_eq!(image.header().paddr, BASE);
        assert_eq!(
            image.core_registers(1).map(|r| r.sp),
            Some(0xffff_8000_1234_0000)
        );
        assert_eq!(image.core_registers(MAX_CPUS), None);

        let log = image.kernel_log(&config()).expect("log");
        // The tail of the first line survives; nothing past the second does.
        assert_eq!(log, b"u1......\n<6>cpu1 online.......\n<0>oops: bad\n");

        let tasks: Vec<TaskRecord> = image.events(&config(), 1).expect("arena");
        let pids: Vec<i32> = tasks.iter().map(|t| t.pid).collect();
        assert_eq!(pids, [3, 4, 5, 6]);
        assert_eq!(image.events::<TaskRecord>(&config(), 2), None);
    }
}

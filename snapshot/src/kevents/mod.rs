//! Structured kernel event recording.
//!
//! Every event kind gets one arena inside the primary category. Per-core
//! kinds have one row of slots per core; global kinds have a single row.
//! Arenas are laid out once at boot from [`KIND_TABLE`], so the offset of
//! every slot is fixed for the whole session and can be recomputed by an
//! offline tool from the same table.
//!
//! # Design Principles
//!
//! 1. **Zero allocation on the hot path**: arenas and counters exist before
//!    the first event is recorded.
//! 2. **Lock-free**: a slot is claimed with one `fetch_add` on the row's
//!    counter; the claimant is the only writer of that slot until the row
//!    wraps around.
//! 3. **Lossy**: a full row overwrites its oldest slot.
//!
//! ```text
//! primary category
//! +--------+------------------+------------------+-----+
//! | header | task[cpu][slots] | work[cpu][slots] | ... |
//! +--------+------------------+------------------+-----+
//!          ^ offset::EVENTS
//! ```

pub mod denylist;
pub mod records;
pub mod recorder;
pub mod ring;

use core::mem::{align_of, size_of};

use crate::config::RingConfig;
use crate::error::{Result, SnapshotError};

pub use denylist::Denylist;
pub use records::*;
pub use recorder::Kevents;
pub use ring::{Ring, RingIter};

/// Arenas start on this boundary.
pub const ARENA_ALIGN: usize = 64;

/// Every event kind the engine records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventKind {
    Task = 0,
    Work,
    Cpuidle,
    Suspend,
    Irq,
    IrqExit,
    Spinlock,
    IrqsDisabled,
    Clk,
    Freq,
    Hrtimer,
    Thermal,
    Mailbox,
    Clockevent,
    Printk,
    Printkl,
    I2cClk,
}

impl EventKind {
    pub const COUNT: usize = 17;

    pub fn descriptor(self) -> &'static KindDescriptor {
        &KIND_TABLE[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.descriptor().name
    }
}

/// Whether a kind keeps one row per core or one shared row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    PerCore,
    Global,
}

/// Which [`RingConfig`] field sizes a kind's rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryClass {
    Log,
    Irq,
    Api,
    IrqsDisabled,
}

impl EntryClass {
    fn entries(self, rings: &RingConfig) -> usize {
        match self {
            EntryClass::Log => rings.log_entries,
            EntryClass::Irq => rings.irq_entries,
            EntryClass::Api => rings.api_entries,
            EntryClass::IrqsDisabled => rings.irqs_disabled_entries,
        }
    }
}

/// Static description of one event kind.
#[derive(Debug, Clone, Copy)]
pub struct KindDescriptor {
    pub kind: EventKind,
    pub name: &'static str,
    pub scope: Scope,
    pub class: EntryClass,
    pub record_size: usize,
    pub record_align: usize,
}

const fn kind<R: EventRecord>(name: &'static str, scope: Scope, class: EntryClass) -> KindDescriptor {
    KindDescriptor {
        kind: R::KIND,
        name,
        scope,
        class,
        record_size: size_of::<R>(),
        record_align: align_of::<R>(),
    }
}

/// Arena descriptors, indexed by `EventKind as usize`.
pub static KIND_TABLE: [KindDescriptor; EventKind::COUNT] = [
    kind::<TaskRecord>("task", Scope::PerCore, EntryClass::Log),
    kind::<WorkRecord>("work", Scope::PerCore, EntryClass::Log),
    kind::<CpuidleRecord>("cpuidle", Scope::PerCore, EntryClass::Log),
    kind::<SuspendRecord>("suspend", Scope::PerCore, EntryClass::Log),
    kind::<IrqRecord>("irq", Scope::PerCore, EntryClass::Irq),
    kind::<IrqExitRecord>("irq_exit", Scope::PerCore, EntryClass::Log),
    kind::<SpinlockRecord>("spinlock", Scope::PerCore, EntryClass::Log),
    kind::<IrqsDisabledRecord>("irqs_disabled", Scope::PerCore, EntryClass::IrqsDisabled),
    kind::<ClkRecord>("clk", Scope::Global, EntryClass::Log),
    kind::<FreqRecord>("freq", Scope::Global, EntryClass::Log),
    kind::<HrtimerRecord>("hrtimer", Scope::PerCore, EntryClass::Log),
    kind::<ThermalRecord>("thermal", Scope::Global, EntryClass::Log),
    kind::<MailboxRecord>("mailbox", Scope::Global, EntryClass::Log),
    kind::<ClockeventRecord>("clockevent", Scope::PerCore, EntryClass::Log),
    kind::<PrintkRecord>("printk", Scope::Global, EntryClass::Api),
    kind::<PrintklRecord>("printkl", Scope::Global, EntryClass::Api),
    kind::<I2cClkRecord>("i2c_clk", Scope::Global, EntryClass::Log),
];

/// Placement of one arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaLayout {
    pub kind: EventKind,
    /// Offset of the first slot from the region base.
    pub offset: usize,
    pub rows: usize,
    pub entries: usize,
    pub record_size: usize,
}

impl ArenaLayout {
    pub fn size(&self) -> usize {
        self.rows * self.entries * self.record_size
    }
}

/// Placement of every arena.
#[derive(Debug, Clone)]
pub struct KeventsLayout {
    arenas: [ArenaLayout; EventKind::COUNT],
    end: usize,
}

impl KeventsLayout {
    /// Lay the arenas out from `start`, failing if they pass `limit`.
    pub fn compute(rings: &RingConfig, nr_cpus: usize, start: usize, limit: usize) -> Result<Self> {
        let mut next = start;
        let arenas = core::array::from_fn(|i| {
            let desc = &KIND_TABLE[i];
            debug_assert_eq!(desc.kind as usize, i);
            debug_assert!(desc.record_align <= ARENA_ALIGN);
            let arena = ArenaLayout {
                kind: desc.kind,
                offset: next.next_multiple_of(ARENA_ALIGN),
                rows: match desc.scope {
                    Scope::PerCore => nr_cpus,
                    Scope::Global => 1,
                },
                entries: desc.class.entries(rings),
                record_size: desc.record_size,
            };
            next = arena.offset + arena.size();
            arena
        });
        if next > limit {
            return Err(SnapshotError::LayoutOverflow {
                needed: next - start,
                available: limit.saturating_sub(start),
            });
        }
        Ok(Self { arenas, end: next })
    }

    pub fn arena(&self, kind: EventKind) -> &ArenaLayout {
        &self.arenas[kind as usize]
    }

    pub fn arenas(&self) -> &[ArenaLayout] {
        &self.arenas
    }

    /// First byte past the last arena.
    pub fn end(&self) -> usize {
        self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::{HEADER_TOTAL_SIZE, MAX_CPUS};

    #[test]
    fn table_is_indexed_by_kind() {
        for (i, desc) in KIND_TABLE.iter().enumerate() {
            assert_eq!(desc.kind as usize, i, "{} is out of place", desc.name);
        }
    }

    #[test]
    fn default_layout_fits_default_primary() {
        let layout = KeventsLayout::compute(
            &RingConfig::default(),
            MAX_CPUS,
            HEADER_TOTAL_SIZE,
            8 * 1024 * 1024,
        )
        .expect("default arenas fit in 8 MiB");
        for pair in layout.arenas().windows(2) {
            assert!(pair[0].offset + pair[0].size() <= pair[1].offset);
            assert_eq!(pair[1].offset % ARENA_ALIGN, 0);
        }
        let irq = layout.arena(EventKind::Irq);
        assert_eq!((irq.rows, irq.entries), (MAX_CPUS, 2048));
        let printk = layout.arena(EventKind::Printk);
        assert_eq!((printk.rows, printk.entries), (1, 2048));
    }

    #[test]
    fn overflow_is_reported() {
        let err = KeventsLayout::compute(&RingConfig::default(), 8, HEADER_TOTAL_SIZE, 0x10000)
            .expect_err("default arenas cannot fit in 64 KiB");
        assert!(matches!(err, SnapshotError::LayoutOverflow { .. }));
    }
}

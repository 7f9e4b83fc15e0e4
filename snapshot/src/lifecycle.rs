//! Boot classification and liveness stamping.
//!
//! The header at the start of the region tells an offline tool how the
//! previous session ended. Two words carry that state:
//!
//! ```text
//! 0x100 signature   Reset -> Scratch -> Alive -> Reset (clean reboot)
//! 0x300 reason      0 -> NormalReboot | ForcedReboot | Dead | SafeFault
//! ```
//!
//! A session that dies without reaching a reboot notification leaves
//! `Alive` behind; a crash path writes a reason before the reset.
//!
//! # Boot
//!
//! ```text
//! snapshot previous header
//!        |
//!  magic, paddr, size ok?  -- no --> ColdStart
//!  signature known?        -- no --> ColdStart
//!  last log ptr in range?  -- no --> ColdStart
//!        |
//!      Active: the resumable text category continues at the saved cursor
//! ```
//!
//! Either way the header is restamped, everything from `KEEP_HEADER_SIZE`
//! on in the primary category is zeroed and every non-persistent category
//! other than a resumed one is reset.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::mem::size_of;
use core::sync::atomic::{AtomicU8, Ordering};

use spin::Mutex;

use crate::category::CategoryRegistry;
use crate::platform::{CoreRegisters, MmuRegisters, Platform};
use crate::region::{offset, MemoryRegion, HEADER_MAGIC, KEEP_HEADER_SIZE, MAX_CPUS, REG_SLOT_SIZE};

const _: () = assert!(size_of::<CoreRegisters>() <= REG_SLOT_SIZE);
const _: () = assert!(size_of::<MmuRegisters>() <= REG_SLOT_SIZE);

/// Values written to the signature and reason words.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    Reset = 0x0,
    /// Header written, engine not yet live.
    Scratch = 0xD,
    Alive = 0xFACE,
    Dead = 0xDEAD,
    SafeFault = 0xFAFA,
    NormalReboot = 0xCAFE,
    ForcedReboot = 0xDAFE,
}

impl Signature {
    pub fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0x0 => Self::Reset,
            0xD => Self::Scratch,
            0xFACE => Self::Alive,
            0xDEAD => Self::Dead,
            0xFAFA => Self::SafeFault,
            0xCAFE => Self::NormalReboot,
            0xDAFE => Self::ForcedReboot,
            _ => return None,
        })
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized = 0,
    /// No usable previous session; buffers were cleared.
    ColdStart = 1,
    /// The previous session's kernel log position was recovered.
    Active = 2,
    NormalReboot = 3,
    Crashed = 4,
    Unknown = 5,
}

impl LifecycleState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::ColdStart,
            2 => Self::Active,
            3 => Self::NormalReboot,
            4 => Self::Crashed,
            5 => Self::Unknown,
            _ => Self::Uninitialized,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebootKind {
    Normal,
    Forced,
}

impl RebootKind {
    fn reason(self) -> Signature {
        match self {
            RebootKind::Normal => Signature::NormalReboot,
            RebootKind::Forced => Signature::ForcedReboot,
        }
    }
}

/// Called on a reboot notification, before the cache flush.
pub type RebootCallback = Box<dyn Fn(RebootKind) + Send + Sync>;

// =============================================================================
// Header snapshot
// =============================================================================

/// The persisted header words, as found at boot or in a dump.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeaderSnapshot {
    pub vaddr: u64,
    pub paddr: u64,
    pub size: u64,
    pub magic: u32,
    pub signature: u32,
    /// Physical address one past the last kernel log byte written.
    pub last_kernel_log: u64,
    pub reason: u32,
    /// Bit `n` set while core `n` is online.
    pub core_power: u32,
}

impl HeaderSnapshot {
    pub(crate) fn read(region: &MemoryRegion) -> Self {
        Self {
            vaddr: region.read_u64(offset::VADDR),
            paddr: region.read_u64(offset::PADDR),
            size: region.read_u64(offset::SIZE),
            magic: region.read_u32(offset::MAGIC),
            signature: region.read_u32(offset::SIGNATURE),
            last_kernel_log: region.read_u64(offset::LAST_KERNEL_LOG),
            reason: region.read_u32(offset::REASON),
            core_power: region.read_u32(offset::CORE_POWER),
        }
    }

    /// Parse the header from the first bytes of a region image.
    pub fn from_bytes(image: &[u8]) -> Option<Self> {
        let u32_at = |off: usize| -> Option<u32> {
            Some(u32::from_le_bytes(image.get(off..off + 4)?.try_into().ok()?))
        };
        let u64_at = |off: usize| -> Option<u64> {
            Some(u64::from_le_bytes(image.get(off..off + 8)?.try_into().ok()?))
        };
        Some(Self {
            vaddr: u64_at(offset::VADDR)?,
            paddr: u64_at(offset::PADDR)?,
            size: u64_at(offset::SIZE)?,
            magic: u32_at(offset::MAGIC)?,
            signature: u32_at(offset::SIGNATURE)?,
            last_kernel_log: u64_at(offset::LAST_KERNEL_LOG)?,
            reason: u32_at(offset::REASON)?,
            core_power: u32_at(offset::CORE_POWER)?,
        })
    }

    pub fn has_magic(&self) -> bool {
        self.magic == HEADER_MAGIC
    }

    /// How the session that wrote this header ended.
    pub fn outcome(&self) -> LifecycleState {
        if !self.has_magic() {
            return LifecycleState::Unknown;
        }
        match Signature::from_raw(self.reason) {
            Some(Signature::NormalReboot) => return LifecycleState::NormalReboot,
            Some(Signature::Dead | Signature::SafeFault | Signature::ForcedReboot) => {
                return LifecycleState::Crashed
            }
            _ => {}
        }
        if self.signature == Signature::Alive as u32 {
            LifecycleState::Crashed
        } else {
            LifecycleState::Unknown
        }
    }
}

// =============================================================================
// Lifecycle
// =============================================================================

pub struct Lifecycle {
    state: AtomicU8,
    previous: HeaderSnapshot,
    callbacks: Mutex<Vec<RebootCallback>>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Uninitialized as u8),
            previous: HeaderSnapshot::default(),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_raw(self.state.load(Ordering::Relaxed))
    }

    fn set_state(&self, state: LifecycleState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    /// Header of the previous session as found at boot.
    pub fn previous(&self) -> &HeaderSnapshot {
        &self.previous
    }

    fn classify(prev: &HeaderSnapshot, region: &MemoryRegion, registry: &CategoryRegistry) -> LifecycleState {
        if !prev.has_magic()
            || prev.paddr != region.physical_base()
            || prev.size != region.total_size() as u64
            || Signature::from_raw(prev.signature).is_none()
        {
            return LifecycleState::ColdStart;
        }
        let Some(text) = registry.resumable() else {
            return LifecycleState::Active;
        };
        let Some(head) = text.head_offset() else {
            return LifecycleState::Active;
        };
        let start = region.physical_base() + head as u64;
        let end = start + text.capacity() as u64;
        if (start..end).contains(&prev.last_kernel_log) {
            LifecycleState::Active
        } else {
            LifecycleState::ColdStart
        }
    }

    /// Classify the previous session, restamp the header and clear what
    /// does not carry over.
    pub(crate) fn boot(&mut self, region: &MemoryRegion, registry: &CategoryRegistry) -> LifecycleState {
        self.previous = HeaderSnapshot::read(region);
        let state = Self::classify(&self.previous, region, registry);

        if let Some(primary) = registry.primary() {
            region.zero(KEEP_HEADER_SIZE, primary.capacity().saturating_sub(KEEP_HEADER_SIZE));
        }

        let resumable = registry.resumable().map(|c| c.name());
        let mut last_kernel_log = 0;
        for category in registry.iter().skip(1) {
            let Some(head) = category.head_offset() else { continue };
            let paddr = region.physical_base() + head as u64;
            if Some(category.name()) == resumable {
                let resumed = state == LifecycleState::Active
                    && category.resume(region, (self.previous.last_kernel_log - paddr) as usize);
                if !resumed {
                    if state == LifecycleState::Active {
                        log::warn!(
                            "{}: saved position {:#x} is not usable, starting over",
                            category.name(),
                            self.previous.last_kernel_log
                        );
                    }
                    category.reset(region);
                }
                last_kernel_log = paddr + category.cursor() as u64;
            } else if !category.persist() {
                category.reset(region);
            }
        }

        region.write_u64(offset::VADDR, region.virtual_base() as u64);
        region.write_u64(offset::PADDR, region.physical_base());
        region.write_u64(offset::SIZE, region.total_size() as u64);
        region.write_u32(offset::MAGIC, HEADER_MAGIC);
        region.write_u64(offset::LAST_KERNEL_LOG, last_kernel_log);
        region.write_u32(offset::SIGNATURE, Signature::Scratch as u32);

        log::info!(
            "previous session: signature {:#x}, reason {:#x}; booting as {:?}",
            self.previous.signature,
            self.previous.reason,
            state
        );
        self.set_state(state);
        state
    }

    /// Mark the session live once recording is on.
    pub(crate) fn mark_alive(&self, region: &MemoryRegion) {
        region.write_u32(offset::SIGNATURE, Signature::Alive as u32);
    }

    pub(crate) fn register_reboot_callback(&self, callback: RebootCallback) {
        self.callbacks.lock().push(callback);
    }

    /// Stamp a reboot, run the callbacks and push the region to memory.
    ///
    /// Callbacks run with the callback list locked and must not register
    /// further callbacks.
    pub(crate) fn notify_reboot(&self, region: &MemoryRegion, platform: &dyn Platform, kind: RebootKind) {
        log::info!("{:?} reboot", kind);
        region.write_u32(offset::REASON, kind.reason() as u32);
        region.write_u32(offset::SIGNATURE, Signature::Reset as u32);
        for callback in self.callbacks.lock().iter() {
            callback(kind);
        }
        platform.flush_cache_all();
        self.set_state(match kind {
            RebootKind::Normal => LifecycleState::NormalReboot,
            RebootKind::Forced => LifecycleState::Crashed,
        });
    }

    /// Save the registers of `cpu` into its slots and mark the session dead.
    pub(crate) fn on_panic(&self, region: &MemoryRegion, platform: &dyn Platform, cpu: usize) {
        if cpu < MAX_CPUS {
            region.write_value(
                offset::CORE_REGS + cpu * REG_SLOT_SIZE,
                &platform.capture_core_registers(),
            );
            region.write_value(
                offset::MMU_REGS + cpu * REG_SLOT_SIZE,
                &platform.capture_mmu_registers(),
            );
        }
        if let Some((cpu_syndrome, l2_syndrome)) = platform.memory_error_syndrome() {
            log::error!(
                "core {} memory error syndrome: cpu {:#018x}, l2 {:#018x}",
                cpu,
                cpu_syndrome,
                l2_syndrome
            );
        }
        region.write_u32(offset::REASON, Signature::Dead as u32);
        platform.flush_cache_all();
        self.set_state(LifecycleState::Crashed);
    }

    pub(crate) fn on_safe_fault(&self, region: &MemoryRegion, platform: &dyn Platform) {
        region.write_u32(offset::REASON, Signature::SafeFault as u32);
        platform.flush_cache_all();
        self.set_state(LifecycleState::Crashed);
    }

    pub(crate) fn set_core_power(&self, region: &MemoryRegion, cpu: usize, online: bool) {
        if cpu >= u32::BITS as usize {
            return;
        }
        let word = region.atomic_u32(offset::CORE_POWER);
        if online {
            word.fetch_or(1 << cpu, Ordering::Relaxed);
        } else {
            word.fetch_and(!(1 << cpu), Ordering::Relaxed);
        }
    }
}

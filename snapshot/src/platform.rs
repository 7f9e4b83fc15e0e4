//! Platform services the engine consumes.
//!
//! The engine never reads a clock, a core id or a register on its own; it
//! asks a [`Platform`]. A kernel port implements this over its per-CPU data
//! and architecture registers. [`ManualPlatform`] is a deterministic
//! implementation driven entirely by atomics, used by hosts without real
//! hardware and by the test suite.

use core::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

use spin::Mutex;

/// Length of a task command name, including the terminating NUL.
pub const TASK_COMM_LEN: usize = 16;

/// Copy `src` into a fixed, NUL-padded byte array, truncating if needed.
pub(crate) fn fixed_name<const N: usize>(src: &str) -> [u8; N] {
    let mut out = [0u8; N];
    let len = src.len().min(N.saturating_sub(1));
    out[..len].copy_from_slice(&src.as_bytes()[..len]);
    out
}

/// View a NUL-padded byte array as a string, stopping at the first NUL.
pub fn name_str(bytes: &[u8]) -> &str {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    match core::str::from_utf8(&bytes[..end]) {
        Ok(s) => s,
        Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or(""),
    }
}

/// Identity of a task as recorded in events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskInfo {
    pub pid: i32,
    /// Opaque task handle (the kernel's task pointer).
    pub handle: u64,
    pub comm: [u8; TASK_COMM_LEN],
}

impl TaskInfo {
    pub fn new(pid: i32, comm: &str) -> Self {
        Self {
            pid,
            handle: 0,
            comm: fixed_name(comm),
        }
    }

    pub fn with_handle(mut self, handle: u64) -> Self {
        self.handle = handle;
        self
    }

    pub fn comm_str(&self) -> &str {
        name_str(&self.comm)
    }
}

/// General purpose register state of one core, as saved on the panic path.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreRegisters {
    pub x: [u64; 31],
    pub sp: u64,
    pub pc: u64,
    pub pstate: u64,
}

impl CoreRegisters {
    pub const fn zeroed() -> Self {
        Self {
            x: [0; 31],
            sp: 0,
            pc: 0,
            pstate: 0,
        }
    }
}

/// System control registers of one core.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmuRegisters {
    pub sctlr: u64,
    pub ttbr0: u64,
    pub ttbr1: u64,
    pub tcr: u64,
    pub esr: u64,
    pub far: u64,
    pub contextidr: u64,
    pub tpidr_el0: u64,
    pub tpidrro_el0: u64,
    pub tpidr_el1: u64,
    pub mair: u64,
    pub amair: u64,
}

impl MmuRegisters {
    pub const fn zeroed() -> Self {
        Self {
            sctlr: 0,
            ttbr0: 0,
            ttbr1: 0,
            tcr: 0,
            esr: 0,
            far: 0,
            contextidr: 0,
            tpidr_el0: 0,
            tpidrro_el0: 0,
            tpidr_el1: 0,
            mair: 0,
            amair: 0,
        }
    }
}

/// Services the engine needs from the system it observes.
///
/// Every method may be called from interrupt context, so implementations
/// must not block or allocate.
pub trait Platform: Send + Sync {
    /// Index of the core executing the caller.
    fn current_cpu(&self) -> usize;

    /// Monotonic clock of `cpu`, in nanoseconds.
    fn cpu_clock(&self, cpu: usize) -> u64;

    /// Monotonic clock of the current core.
    fn local_clock(&self) -> u64 {
        self.cpu_clock(self.current_cpu())
    }

    fn num_online_cpus(&self) -> u32;

    fn preempt_count(&self) -> u32 {
        0
    }

    fn jiffies(&self) -> u64 {
        0
    }

    /// The task running on the current core.
    fn current_task(&self) -> TaskInfo;

    /// Return address `level` frames above the recording call, 0 if unknown.
    fn return_address(&self, level: usize) -> u64 {
        let _ = level;
        0
    }

    fn capture_core_registers(&self) -> CoreRegisters {
        CoreRegisters::zeroed()
    }

    fn capture_mmu_registers(&self) -> MmuRegisters {
        MmuRegisters::zeroed()
    }

    /// Memory error syndrome registers (CPU, L2) if the core has them.
    fn memory_error_syndrome(&self) -> Option<(u64, u64)> {
        None
    }

    /// Write back data caches so the region reaches memory before a reset.
    fn flush_cache_all(&self) {}
}

// =============================================================================
// ManualPlatform
// =============================================================================

/// A platform whose every observable is set explicitly.
///
/// Each clock read returns the current time and then advances it by `step`
/// nanoseconds, so successive events get distinct, increasing timestamps.
pub struct ManualPlatform {
    now: AtomicU64,
    step: AtomicU64,
    cpu: AtomicUsize,
    online: AtomicU32,
    preempt: AtomicU32,
    jiffies: AtomicU64,
    caller_base: AtomicU64,
    task: Mutex<TaskInfo>,
    registers: Mutex<CoreRegisters>,
    flushes: AtomicUsize,
}

impl ManualPlatform {
    pub fn new(online_cpus: u32) -> Self {
        Self {
            now: AtomicU64::new(0),
            step: AtomicU64::new(1),
            cpu: AtomicUsize::new(0),
            online: AtomicU32::new(online_cpus),
            preempt: AtomicU32::new(0),
            jiffies: AtomicU64::new(0),
            caller_base: AtomicU64::new(0),
            task: Mutex::new(TaskInfo::new(0, "swapper")),
            registers: Mutex::new(CoreRegisters::zeroed()),
            flushes: AtomicUsize::new(0),
        }
    }

    pub fn set_time(&self, ns: u64) {
        self.now.store(ns, Ordering::Relaxed);
    }

    pub fn advance(&self, ns: u64) {
        self.now.fetch_add(ns, Ordering::Relaxed);
    }

    /// Time the next clock read will return.
    pub fn time(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }

    /// Amount each clock read advances the clock by (0 freezes it).
    pub fn set_step(&self, ns: u64) {
        self.step.store(ns, Ordering::Relaxed);
    }

    pub fn set_cpu(&self, cpu: usize) {
        self.cpu.store(cpu, Ordering::Relaxed);
    }

    pub fn set_preempt_count(&self, count: u32) {
        self.preempt.store(count, Ordering::Relaxed);
    }

    pub fn set_jiffies(&self, jiffies: u64) {
        self.jiffies.store(jiffies, Ordering::Relaxed);
    }

    /// Make `return_address(level)` report `base + level`.
    pub fn set_caller_base(&self, base: u64) {
        self.caller_base.store(base, Ordering::Relaxed);
    }

    pub fn set_task(&self, task: TaskInfo) {
        *self.task.lock() = task;
    }

    pub fn set_registers(&self, regs: CoreRegisters) {
        *self.registers.lock() = regs;
    }

    /// Number of cache flushes requested so far.
    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::Relaxed)
    }
}

impl Platform for ManualPlatform {
    fn current_cpu(&self) -> usize {
        self.cpu.load(Ordering::Relaxed)
    }

    fn cpu_clock(&self, _cpu: usize) -> u64 {
        let step = self.step.load(Ordering::Relaxed);
        self.now.fetch_add(step, Ordering::Relaxed)
    }

    fn num_online_cpus(&self) -> u32 {
        self.online.load(Ordering::Relaxed)
    }

    fn preempt_count(&self) -> u32 {
        self.preempt.load(Ordering::Relaxed)
    }

    fn jiffies(&self) -> u64 {
        self.jiffies.load(Ordering::Relaxed)
    }

    fn current_task(&self) -> TaskInfo {
        *self.task.lock()
    }

    fn return_address(&self, level: usize) -> u64 {
        match self.caller_base.load(Ordering::Relaxed) {
            0 => 0,
            base => base + level as u64,
        }
    }

    fn capture_core_registers(&self) -> CoreRegisters {
        *self.registers.lock()
    }

    fn flush_cache_all(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }
}

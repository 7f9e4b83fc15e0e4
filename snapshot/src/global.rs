//! The installed engine and the kernel-facing recording API.
//!
//! A kernel boots one [`Engine`] and installs it here. The free functions
//! below record on the current core, as reported by the engine's platform,
//! and do nothing until an engine is installed or while it is disabled.
//!
//! ```rust,ignore
//! let engine = Engine::new(SnapshotConfig::from_cmdline(cmdline)?, memory, platform);
//! snapshot::global::install(engine)?;
//!
//! // scheduler
//! snapshot::global::task(&next);
//! // interrupt entry / exit
//! snapshot::global::irq(irq, handler, irqs_off, Phase::Entry);
//! snapshot::global::irq_exit(irq, start);
//! // formatted text
//! snapshot::snapshot_printk!("cpu{} up", cpu);
//! ```

use conquer_once::spin::OnceCell;
use core::fmt;

use crate::engine::Engine;
use crate::error::{Result, SnapshotError};
use crate::kevents::{FreqDomain, Kevents, MailboxVolts, Phase};
use crate::lifecycle::RebootKind;
use crate::platform::TaskInfo;

/// Always `Some` once set; the option lets a losing install take its
/// engine back.
static ENGINE: OnceCell<Option<Engine>> = OnceCell::uninit();

/// Make `engine` the one the free functions record into.
///
/// A second install fails with `AlreadyInstalled`; the rejected engine is
/// shut down so its region is given back. Two installs racing each other
/// end the same way: exactly one wins and the other's engine is released.
pub fn install(engine: Engine) -> Result<&'static Engine> {
    let mut slot = Some(engine);
    let _ = ENGINE.try_init_once(|| slot.take());
    if let Some(rejected) = slot {
        rejected.shutdown();
        return Err(SnapshotError::AlreadyInstalled);
    }
    self::engine().ok_or(SnapshotError::AlreadyInstalled)
}

/// The installed engine, if any.
#[inline(always)]
pub fn engine() -> Option<&'static Engine> {
    ENGINE.try_get().ok()?.as_ref()
}

/// Run `f` with the recorder and the current core, if recording is on.
#[inline(always)]
fn with_kevents(f: impl FnOnce(&Kevents, usize)) {
    if let Some(engine) = engine() {
        if let Some(kevents) = engine.kevents() {
            f(kevents, engine.platform().current_cpu());
        }
    }
}

// =============================================================================
// Recording API
// =============================================================================

pub fn task(task: &TaskInfo) {
    with_kevents(|k, cpu| k.task(cpu, task));
}

pub fn work(worker: u64, work: u64, func: u64, phase: Phase) {
    with_kevents(|k, cpu| k.work(cpu, worker, work, func, phase));
}

pub fn cpuidle(index: i32, state: u32, delta: i32, phase: Phase) {
    with_kevents(|k, cpu| k.cpuidle(cpu, index, state, delta, phase));
}

pub fn suspend(func: u64, device: u64, phase: Phase) {
    with_kevents(|k, cpu| k.suspend(cpu, func, device, phase));
}

pub fn irq(irq: i32, func: u64, irqs_disabled: bool, phase: Phase) {
    with_kevents(|k, cpu| k.irq(cpu, irq, func, irqs_disabled, phase));
}

/// Handler of `irq` finished; `start_time` is its entry timestamp.
pub fn irq_exit(irq: i32, start_time: u64) {
    with_kevents(|k, cpu| k.irq_exit(cpu, irq, start_time));
}

pub fn spinlock(owner: &TaskInfo, owner_cpu: u32, phase: Phase) {
    with_kevents(|k, cpu| k.spinlock(cpu, owner, owner_cpu, phase));
}

pub fn irqs_disabled(flags: u64) {
    with_kevents(|k, cpu| k.irqs_disabled(cpu, flags));
}

pub fn clk(clk: u64, func_name: &str, mode: i32) {
    with_kevents(|k, cpu| k.clk(cpu, clk, func_name, mode));
}

pub fn freq(domain: FreqDomain, old_freq: u64, target_freq: u64, phase: Phase) {
    with_kevents(|k, cpu| k.freq(cpu, domain, old_freq, target_freq, phase));
}

pub fn hrtimer(now: i64, timer: u64, func: u64, phase: Phase) {
    with_kevents(|k, cpu| k.hrtimer(cpu, now, timer, func, phase));
}

pub fn thermal(data: u64, temp: u32, cooling_device: &str, cooling_state: u32) {
    with_kevents(|k, cpu| k.thermal(cpu, data, temp, cooling_device, cooling_state));
}

pub fn mailbox(msg: [u32; 4], mode: i32, name: &str, volts: MailboxVolts) {
    with_kevents(|k, cpu| k.mailbox(cpu, msg, mode, name, volts));
}

pub fn clockevent(clc: u64, delta: i64, next_event: i64) {
    with_kevents(|k, cpu| k.clockevent(cpu, clc, delta, next_event));
}

/// Backs [`snapshot_printk!`](crate::snapshot_printk).
pub fn printk(args: fmt::Arguments<'_>) {
    with_kevents(|k, cpu| k.printk(cpu, args));
}

pub fn printkl(msg: u64, val: u64) {
    with_kevents(|k, cpu| k.printkl(cpu, msg, val));
}

pub fn i2c_clk(bus_id: i32, clk_enable: bool, phase: Phase) {
    with_kevents(|k, cpu| k.i2c_clk(cpu, bus_id, clk_enable, phase));
}

/// Record a formatted line in the printk event log.
///
/// Formatting happens into a fixed buffer on the stack; lines longer than
/// the record are cut.
#[macro_export]
macro_rules! snapshot_printk {
    ($($arg:tt)*) => {
        $crate::global::printk(format_args!($($arg)*))
    };
}

// =============================================================================
// Hooks
// =============================================================================

pub fn hook_kernel_log(line: &[u8]) {
    if let Some(engine) = engine() {
        engine.hook_kernel_log(line);
    }
}

pub fn hook_pmsg(record: &[u8]) {
    if let Some(engine) = engine() {
        engine.hook_pmsg(record);
    }
}

pub fn notify_reboot(kind: RebootKind) {
    if let Some(engine) = engine() {
        engine.notify_reboot(kind);
    }
}

/// Panic path of the current core.
pub fn on_panic() {
    if let Some(engine) = engine() {
        engine.on_panic(engine.platform().current_cpu());
    }
}

pub fn on_safe_fault() {
    if let Some(engine) = engine() {
        engine.on_safe_fault();
    }
}

/// Hotplug notification for the current core.
pub fn set_core_power(online: bool) {
    if let Some(engine) = engine() {
        engine.set_core_power(engine.platform().current_cpu(), online);
    }
}

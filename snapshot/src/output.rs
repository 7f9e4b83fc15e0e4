//! Text reports of the layout and of recent events.
//!
//! Everything writes to a caller-supplied [`fmt::Write`], so the same code
//! serves a panic console, a debug shell and the tests. Nothing here takes
//! a lock or allocates.
//!
//! # Output Format
//!
//! ```text
//! [SNAPSHOT] base paddr=0x88000000 vaddr=0xffffff8000000000 size=0xe08000
//! [SNAPSHOT] log_kevents paddr=0x88000000 size=0x800000 enabled=1 persist=0
//! [ARENA] task offset=0x4000 rows=8 entries=1024 record=40
//! [PREVIOUS] signature=0xface reason=0x0 outcome=Crashed
//! [KEVENT] cpu0 task ts=1200 pid=1 comm=init
//! [KEVENT] cpu0 irq ts=1300 irq=33 func=0xffffff80081234 phase=1
//! [KEVENT] all printk ts=1400 cpu=2 text=hello
//! ```

use core::fmt;

use crate::engine::Engine;
use crate::kevents::*;

/// Write the region and category layout, then the arena layout.
pub fn write_layout<W: fmt::Write>(engine: &Engine, out: &mut W) -> fmt::Result {
    let Some(region) = engine.region() else {
        return writeln!(out, "[SNAPSHOT] disabled");
    };
    writeln!(
        out,
        "[SNAPSHOT] base paddr={:#x} vaddr={:#x} size={:#x}",
        region.physical_base(),
        region.virtual_base(),
        region.total_size()
    )?;
    let registry = engine.registry();
    for category in registry.iter() {
        let Some(paddr) = registry.category_paddr(category.name()) else {
            continue;
        };
        writeln!(
            out,
            "[SNAPSHOT] {} paddr={:#x} size={:#x} enabled={} persist={}",
            category.name(),
            paddr,
            category.capacity(),
            category.is_enabled() as u8,
            category.persist() as u8
        )?;
    }
    if let Some(kevents) = engine.kevents() {
        for arena in kevents.layout().arenas() {
            writeln!(
                out,
                "[ARENA] {} offset={:#x} rows={} entries={} record={}",
                arena.kind.name(),
                arena.offset,
                arena.rows,
                arena.entries,
                arena.record_size
            )?;
        }
    }
    Ok(())
}

/// Write what the previous session left in the header.
pub fn write_previous<W: fmt::Write>(engine: &Engine, out: &mut W) -> fmt::Result {
    let previous = engine.previous_session();
    writeln!(
        out,
        "[PREVIOUS] signature={:#x} reason={:#x} outcome={:?}",
        previous.signature,
        previous.reason,
        previous.outcome()
    )
}

/// The newest `count` records of kind `R` for `cpu`, oldest first.
fn newest<R: EventRecord>(kevents: &Kevents, cpu: usize, count: usize) -> impl Iterator<Item = R> + '_ {
    let records = kevents.read_back::<R>(cpu);
    let skip = records.len().saturating_sub(count);
    records.skip(skip)
}

/// Write the newest `count` records of each per-core kind on `cpu`, then
/// the newest printk lines.
pub fn dump_recent<W: fmt::Write>(engine: &Engine, cpu: usize, count: usize, out: &mut W) -> fmt::Result {
    let Some(k) = engine.kevents() else {
        return Ok(());
    };
    for r in newest::<TaskRecord>(k, cpu, count) {
        writeln!(out, "[KEVENT] cpu{} task ts={} pid={} comm={}", cpu, r.time, r.pid, r.comm())?;
    }
    for r in newest::<WorkRecord>(k, cpu, count) {
        writeln!(
            out,
            "[KEVENT] cpu{} work ts={} worker={:#x} func={:#x} phase={}",
            cpu, r.time, r.worker, r.func, r.phase
        )?;
    }
    for r in newest::<CpuidleRecord>(k, cpu, count) {
        writeln!(
            out,
            "[KEVENT] cpu{} cpuidle ts={} index={} state={} delta={} phase={}",
            cpu, r.time, r.index, r.state, r.delta, r.phase
        )?;
    }
    for r in newest::<IrqRecord>(k, cpu, count) {
        writeln!(
            out,
            "[KEVENT] cpu{} irq ts={} irq={} func={:#x} phase={}",
            cpu, r.time, r.irq, r.func, r.phase
        )?;
    }
    for r in newest::<IrqExitRecord>(k, cpu, count) {
        writeln!(
            out,
            "[KEVENT] cpu{} irq_exit ts={} irq={} latency={}",
            cpu, r.time, r.irq, r.latency
        )?;
    }
    for r in newest::<SpinlockRecord>(k, cpu, count) {
        writeln!(
            out,
            "[KEVENT] cpu{} spinlock ts={} owner={} owner_cpu={} phase={} caller={:#x}",
            cpu,
            r.time,
            r.owner_comm(),
            r.owner_cpu,
            r.phase,
            r.caller[0]
        )?;
    }
    for r in newest::<HrtimerRecord>(k, cpu, count) {
        writeln!(
            out,
            "[KEVENT] cpu{} hrtimer ts={} timer={:#x} func={:#x} phase={}",
            cpu, r.time, r.timer, r.func, r.phase
        )?;
    }
    for r in newest::<PrintkRecord>(k, 0, count) {
        writeln!(out, "[KEVENT] all printk ts={} cpu={} text={}", r.time, r.cpu, r.text())?;
    }
    Ok(())
}

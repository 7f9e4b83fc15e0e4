//! Per-kind recording functions.
//!
//! Every function here assumes the engine-wide and primary-category gates
//! were already checked by the caller (see `Engine::kevents`). What remains
//! is the per-kind policy: exclusion lists, the irq-exit latency filter and
//! callstack capture.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use super::denylist::Denylist;
use super::records::*;
use super::ring::{Ring, RingIter};
use super::{EventKind, KeventsLayout, Scope};
use crate::config::{SnapshotConfig, CALLSTACK_MAX};
use crate::error::{Result, SnapshotError};
use crate::platform::{fixed_name, Platform, TaskInfo};
use crate::region::MemoryRegion;
use crate::text::format_into;

/// The event arenas plus their runtime policy knobs.
pub struct Kevents {
    platform: Arc<dyn Platform>,
    layout: KeventsLayout,
    rings: Vec<Ring>,
    callstack_depth: AtomicUsize,
    irq_exit_threshold_us: AtomicU32,
    irq_denylist: Denylist,
    irq_exit_denylist: Denylist,
    task_denylist: Denylist,
}

impl Kevents {
    pub(crate) fn new(
        region: &MemoryRegion,
        layout: KeventsLayout,
        platform: Arc<dyn Platform>,
        config: &SnapshotConfig,
    ) -> Self {
        let rings = layout
            .arenas()
            .iter()
            .map(|arena| Ring::new(region, arena))
            .collect();
        Self {
            platform,
            layout,
            rings,
            callstack_depth: AtomicUsize::new(config.callstack_depth),
            irq_exit_threshold_us: AtomicU32::new(config.irq_exit_threshold_us),
            irq_denylist: Denylist::new(),
            irq_exit_denylist: Denylist::new(),
            task_denylist: Denylist::new(),
        }
    }

    pub fn layout(&self) -> &KeventsLayout {
        &self.layout
    }

    pub fn ring(&self, kind: EventKind) -> &Ring {
        &self.rings[kind as usize]
    }

    /// Records of kind `R` for `cpu`, oldest first. `cpu` is ignored for
    /// global kinds.
    pub fn read_back<R: EventRecord>(&self, cpu: usize) -> RingIter<'_, R> {
        self.ring(R::KIND).iter(Self::row::<R>(cpu))
    }

    // =========================================================================
    // Policy knobs
    // =========================================================================

    pub fn callstack_depth(&self) -> usize {
        self.callstack_depth.load(Ordering::Relaxed)
    }

    pub fn set_callstack_depth(&self, depth: usize) -> Result<()> {
        if !(1..=CALLSTACK_MAX).contains(&depth) {
            return Err(SnapshotError::InvalidArgument);
        }
        self.callstack_depth.store(depth, Ordering::Relaxed);
        Ok(())
    }

    pub fn irq_exit_threshold_us(&self) -> u32 {
        self.irq_exit_threshold_us.load(Ordering::Relaxed)
    }

    pub fn set_irq_exit_threshold_us(&self, us: u32) {
        self.irq_exit_threshold_us.store(us, Ordering::Relaxed);
    }

    /// Irq ids never recorded on entry.
    pub fn irq_denylist(&self) -> &Denylist {
        &self.irq_denylist
    }

    /// Irq ids never recorded on exit.
    pub fn irq_exit_denylist(&self) -> &Denylist {
        &self.irq_exit_denylist
    }

    /// Task pids never recorded on switch.
    pub fn task_denylist(&self) -> &Denylist {
        &self.task_denylist
    }

    // =========================================================================
    // Recording
    // =========================================================================

    #[inline(always)]
    fn row<R: EventRecord>(cpu: usize) -> usize {
        match R::KIND.descriptor().scope {
            Scope::PerCore => cpu,
            Scope::Global => 0,
        }
    }

    /// Claim a slot, then timestamp and build the record into it.
    #[inline(always)]
    fn push<R: EventRecord>(&self, cpu: usize, build: impl FnOnce(u64) -> R) {
        let ring = self.ring(R::KIND);
        let row = Self::row::<R>(cpu);
        if let Some(idx) = ring.claim(row) {
            let time = self.clock::<R>(cpu);
            ring.write(row, idx, build(time));
        }
    }

    #[inline(always)]
    fn clock<R: EventRecord>(&self, cpu: usize) -> u64 {
        match R::KIND.descriptor().scope {
            Scope::PerCore => self.platform.cpu_clock(cpu),
            Scope::Global => self.platform.local_clock(),
        }
    }

    fn callers(&self) -> [u64; CALLSTACK_MAX] {
        let mut out = [0; CALLSTACK_MAX];
        let depth = self.callstack_depth().min(CALLSTACK_MAX);
        for (level, slot) in out.iter_mut().take(depth).enumerate() {
            *slot = self.platform.return_address(level + 1);
        }
        out
    }

    /// A context switch to `task`.
    pub fn task(&self, cpu: usize, task: &TaskInfo) {
        if self.task_denylist.contains(task.pid) {
            return;
        }
        self.push(cpu, |time| TaskRecord {
            time,
            task: task.handle,
            pid: task.pid,
            comm: task.comm,
            _pad: 0,
        });
    }

    pub fn work(&self, cpu: usize, worker: u64, work: u64, func: u64, phase: Phase) {
        self.push(cpu, |time| WorkRecord {
            time,
            worker,
            work,
            func,
            phase: phase as i32,
            _pad: 0,
        });
    }

    pub fn cpuidle(&self, cpu: usize, index: i32, state: u32, delta: i32, phase: Phase) {
        let num_online_cpus = self.platform.num_online_cpus();
        self.push(cpu, |time| CpuidleRecord {
            time,
            index,
            state,
            num_online_cpus,
            delta,
            phase: phase as i32,
            _pad: 0,
        });
    }

    pub fn suspend(&self, cpu: usize, func: u64, device: u64, phase: Phase) {
        self.push(cpu, |time| SuspendRecord {
            time,
            func,
            device,
            phase: phase as i32,
            _pad: 0,
        });
    }

    pub fn irq(&self, cpu: usize, irq: i32, func: u64, irqs_disabled: bool, phase: Phase) {
        if self.irq_denylist.contains(irq) {
            return;
        }
        let preempt = self.platform.preempt_count();
        self.push(cpu, |time| IrqRecord {
            time,
            irq,
            _pad0: 0,
            func,
            preempt,
            irqs_disabled: irqs_disabled as u32,
            phase: phase as i32,
            _pad1: 0,
        });
    }

    /// A handler for `irq` that started at `start_time` returned.
    ///
    /// Only handlers slower than the latency threshold are kept. A fast one
    /// gives its slot back, which can drop a concurrent writer's record.
    pub fn irq_exit(&self, cpu: usize, irq: i32, start_time: u64) {
        if irq == 0 || self.irq_exit_denylist.contains(irq) {
            return;
        }
        let ring = self.ring(EventKind::IrqExit);
        let Some(idx) = ring.claim(cpu) else { return };
        let end_time = self.platform.cpu_clock(cpu);
        let latency = end_time.wrapping_sub(start_time);
        if latency > self.irq_exit_threshold_us() as u64 * 1000 {
            ring.write(
                cpu,
                idx,
                IrqExitRecord {
                    time: start_time,
                    end_time,
                    latency,
                    irq,
                    _pad: 0,
                },
            );
        } else {
            ring.unclaim(cpu);
        }
    }

    /// `owner` took (or released) a spinlock on `owner_cpu`.
    pub fn spinlock(&self, cpu: usize, owner: &TaskInfo, owner_cpu: u32, phase: Phase) {
        let jiffies = self.platform.jiffies();
        let caller = self.callers();
        self.push(cpu, |time| SpinlockRecord {
            time,
            jiffies,
            owner: owner.handle,
            owner_comm: owner.comm,
            owner_cpu,
            phase: phase as i32,
            caller,
        });
    }

    /// One step of an interrupts-disabled section on `cpu`.
    ///
    /// A non-zero `flags` means interrupts are enabled again: the history of
    /// the finished section is dropped. Zero records the current task and
    /// call chain as the next step.
    pub fn irqs_disabled(&self, cpu: usize, flags: u64) {
        let ring = self.ring(EventKind::IrqsDisabled);
        if cpu >= ring.rows() {
            return;
        }
        if flags != 0 {
            ring.reset_row(cpu);
            ring.write(
                cpu,
                0,
                IrqsDisabledRecord {
                    time: 0,
                    index: 0,
                    task: 0,
                    task_comm: [0; 16],
                    caller: [0; CALLSTACK_MAX],
                },
            );
            return;
        }
        let Some(seq) = ring.claim_seq(cpu) else { return };
        let task = self.platform.current_task();
        ring.write(
            cpu,
            ring.slot_of(seq),
            IrqsDisabledRecord {
                time: self.platform.jiffies(),
                index: seq as u64,
                task: task.handle,
                task_comm: task.comm,
                caller: self.callers(),
            },
        );
    }

    pub fn clk(&self, cpu: usize, clk: u64, func_name: &str, mode: i32) {
        self.push(cpu, |time| ClkRecord {
            time,
            clk,
            func_name: fixed_name(func_name),
            mode,
            _pad: 0,
        });
    }

    pub fn freq(&self, cpu: usize, domain: FreqDomain, old_freq: u64, target_freq: u64, phase: Phase) {
        self.push(cpu, |time| FreqRecord {
            time,
            cpu: cpu as i32,
            domain: fixed_name(domain.name()),
            _pad0: 0,
            old_freq,
            target_freq,
            phase: phase as i32,
            _pad1: 0,
        });
    }

    pub fn hrtimer(&self, cpu: usize, now: i64, timer: u64, func: u64, phase: Phase) {
        self.push(cpu, |time| HrtimerRecord {
            time,
            now,
            timer,
            func,
            phase: phase as i32,
            _pad: 0,
        });
    }

    pub fn thermal(&self, cpu: usize, data: u64, temp: u32, cooling_device: &str, cooling_state: u32) {
        self.push(cpu, |time| ThermalRecord {
            time,
            cpu: cpu as i32,
            _pad: 0,
            data,
            temp,
            cooling_device: fixed_name(cooling_device),
            cooling_state,
        });
    }

    pub fn mailbox(&self, cpu: usize, msg: [u32; 4], mode: i32, name: &str, volts: MailboxVolts) {
        self.push(cpu, |time| MailboxRecord {
            time,
            buf: msg,
            mode,
            cpu: cpu as i32,
            name: fixed_name(name),
            atl_vol: volts.atl,
            apo_vol: volts.apo,
            g3d_vol: volts.g3d,
            mif_vol: volts.mif,
        });
    }

    pub fn clockevent(&self, cpu: usize, clc: u64, delta: i64, next_event: i64) {
        self.push(cpu, |time| ClockeventRecord {
            time,
            clc,
            delta,
            next_event,
        });
    }

    /// A formatted line, truncated to [`PRINTK_LEN`] - 1 bytes.
    pub fn printk(&self, cpu: usize, args: fmt::Arguments<'_>) {
        let mut log = [0u8; PRINTK_LEN];
        let _ = format_into(&mut log[..PRINTK_LEN - 1], args);
        let caller = self.callers();
        self.push(cpu, |time| PrintkRecord {
            time,
            cpu: cpu as i32,
            log,
            _pad: 0,
            caller,
        });
    }

    pub fn printkl(&self, cpu: usize, msg: u64, val: u64) {
        let caller = self.callers();
        self.push(cpu, |time| PrintklRecord {
            time,
            cpu: cpu as i32,
            _pad: 0,
            msg,
            val,
            caller,
        });
    }

    /// An i2c clock gate change. Only bus 0 is tracked.
    pub fn i2c_clk(&self, cpu: usize, bus_id: i32, clk_enable: bool, phase: Phase) {
        if bus_id != 0 {
            return;
        }
        self.push(cpu, |time| I2cClkRecord {
            time,
            bus_id,
            clk_enable: clk_enable as i32,
            phase: phase as i32,
            _pad: 0,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RingConfig;
    use crate::platform::ManualPlatform;
    use crate::region::{MemoryBank, HEADER_TOTAL_SIZE};

    const SIZE: usize = 0x40000;

    struct Fixture {
        kevents: Kevents,
        platform: Arc<ManualPlatform>,
        _region: MemoryRegion,
        _bank: MemoryBank,
    }

    fn fixture() -> Fixture {
        let bank = MemoryBank::new(0, SIZE);
        let region = MemoryRegion::reserve(&bank, 0, SIZE).expect("reserve");
        let config = SnapshotConfig::new(0)
            .with_cpus(2)
            .with_rings(RingConfig::uniform(8));
        let layout = KeventsLayout::compute(&config.rings, 2, HEADER_TOTAL_SIZE, SIZE)
            .expect("fits");
        let platform = Arc::new(ManualPlatform::new(2));
        let kevents = Kevents::new(&region, layout, platform.clone(), &config);
        Fixture {
            kevents,
            platform,
            _region: region,
            _bank: bank,
        }
    }

    #[test]
    fn task_records_are_per_core_and_filtered() {
        let f = fixture();
        f.kevents.task(0, &TaskInfo::new(1, "init"));
        f.kevents.task(1, &TaskInfo::new(2, "kthreadd"));
        f.kevents.task_denylist().add(3).expect("room");
        f.kevents.task(0, &TaskInfo::new(3, "noisy"));

        let cpu0: Vec<TaskRecord> = f.kevents.read_back(0).collect();
        assert_eq!(cpu0.len(), 1);
        assert_eq!(cpu0[0].comm(), "init");
        let cpu1: Vec<TaskRecord> = f.kevents.read_back(1).collect();
        assert_eq!(cpu1[0].pid, 2);
    }

    #[test]
    fn out_of_range_core_is_dropped() {
        let f = fixture();
        f.kevents.task(7, &TaskInfo::new(1, "init"));
        f.kevents.hrtimer(7, 0, 0, 0, Phase::Entry);
        assert_eq!(f.kevents.ring(EventKind::Task).claimed(0), 0);
    }

    #[test]
    fn gap_bytes_are_written_as_zero() {
        let f = fixture();
        f._bank.fill(0xa5);
        f.kevents.irq(0, 33, 0x1000, false, Phase::Entry);
        f.kevents.freq(0, FreqDomain::Mif, 400, 800, Phase::Exit);
        f.kevents.printk(0, format_args!("hi"));

        let irq: Vec<IrqRecord> = f.kevents.read_back(0).collect();
        assert_eq!((irq[0]._pad0, irq[0]._pad1), (0, 0));
        let freq: Vec<FreqRecord> = f.kevents.read_back(0).collect();
        assert_eq!((freq[0]._pad0, freq[0]._pad1), (0, 0));
        assert_eq!(freq[0].domain(), "MIF");
        let printk: Vec<PrintkRecord> = f.kevents.read_back(0).collect();
        assert_eq!(printk[0]._pad, 0);
        assert_eq!(printk[0].text(), "hi");
    }

    #[test]
    fn irq_exit_keeps_only_slow_handlers() {
        let f = fixture();
        f.kevents.set_irq_exit_threshold_us(10);
        f.platform.set_time(5_000);
        f.kevents.irq_exit(0, 40, 0);
        f.platform.set_time(50_000);
        f.kevents.irq_exit(0, 41, 20_000);
        f.kevents.irq_exit(0, 0, 0);

        let kept: Vec<IrqExitRecord> = f.kevents.read_back(0).collect();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].irq, 41);
        assert_eq!(kept[0].latency, 30_000);
        assert_eq!(kept[0].time, 20_000);
    }

    #[test]
    fn irq_denylist_drops_before_claim() {
        let f = fixture();
        f.kevents.irq_denylist().add(33).expect("room");
        f.kevents.irq(0, 33, 0xdead, false, Phase::Entry);
        f.kevents.irq(0, 34, 0xbeef, true, Phase::Exit);
        let irqs: Vec<IrqRecord> = f.kevents.read_back(0).collect();
        assert_eq!(irqs.len(), 1);
        assert_eq!((irqs[0].irq, irqs[0].irqs_disabled), (34, 1));
        assert_eq!(Phase::from_raw(irqs[0].phase), Some(Phase::Exit));
    }

    #[test]
    fn callstack_depth_limits_captured_callers() {
        let f = fixture();
        f.platform.set_caller_base(0x1000);
        f.kevents.set_callstack_depth(2).expect("in range");
        assert_eq!(f.kevents.set_callstack_depth(5), Err(SnapshotError::InvalidArgument));
        f.kevents.printkl(0, 1, 2);
        let rec: Vec<PrintklRecord> = f.kevents.read_back(0).collect();
        assert_eq!(rec[0].caller, [0x1001, 0x1002, 0, 0]);
    }

    #[test]
    fn printk_lines_are_truncated_and_terminated() {
        let f = fixture();
        f.kevents.printk(1, format_args!("{:->200}", "x"));
        let rec: Vec<PrintkRecord> = f.kevents.read_back(0).collect();
        assert_eq!(rec[0].cpu, 1);
        assert_eq!(rec[0].text().len(), PRINTK_LEN - 1);
        assert_eq!(rec[0].log[PRINTK_LEN - 1], 0);
    }

    #[test]
    fn irqs_disabled_history_resets_on_enable() {
        let f = fixture();
        f.platform.set_jiffies(77);
        f.kevents.irqs_disabled(0, 0);
        f.kevents.irqs_disabled(0, 0);
        let steps: Vec<IrqsDisabledRecord> = f.kevents.read_back(0).collect();
        assert_eq!(steps.iter().map(|s| s.index).collect::<Vec<_>>(), [0, 1]);
        assert_eq!(steps[0].time, 77);

        f.kevents.irqs_disabled(0, 1);
        assert_eq!(f.kevents.read_back::<IrqsDisabledRecord>(0).len(), 0);
    }

    #[test]
    fn global_kinds_share_one_row() {
        let f = fixture();
        f.kevents.freq(0, FreqDomain::Mif, 1, 2, Phase::Entry);
        f.kevents.freq(1, FreqDomain::Disp, 2, 3, Phase::Exit);
        f.kevents.i2c_clk(1, 1, true, Phase::Entry);
        f.kevents.i2c_clk(1, 0, true, Phase::Entry);
        let freqs: Vec<FreqRecord> = f.kevents.read_back(5).collect();
        assert_eq!(freqs.len(), 2);
        assert_eq!(freqs[1].domain(), "DISP");
        assert_eq!(freqs[1].cpu, 1);
        assert_eq!(f.kevents.read_back::<I2cClkRecord>(0).len(), 1);
    }

    #[test]
    fn timestamps_follow_claim_order() {
        let f = fixture();
        for i in 0..5 {
            f.kevents.clockevent(0, i, 0, 0);
        }
        let times: Vec<u64> = f
            .kevents
            .read_back::<ClockeventRecord>(0)
            .map(|r| r.time())
            .collect();
        assert!(times.windows(2).all(|w| w[0] < w[1]));
    }
}

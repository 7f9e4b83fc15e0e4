//! Fixed-layout event records.
//!
//! Records are `#[repr(C)]` plain data: they are written into reserved
//! memory and read back by tools that only know the layout. Pointers from
//! the observed system are stored as opaque `u64` handles, names are copied
//! inline and NUL-padded, and entry/exit markers are stored as raw `i32`
//! values (see [`Phase`]) so any bit pattern read back is valid.
//!
//! No record has implicit padding: gaps the C layout would leave are named
//! `_pad` fields, written as zero, so every byte of a slot is defined.

use core::mem::size_of;

use super::EventKind;
use crate::config::CALLSTACK_MAX;
use crate::platform::name_str;

/// Length of an inline printk line.
pub const PRINTK_LEN: usize = 128;

/// Length of inline names (clock functions, cooling devices, mailboxes).
pub const NAME_LEN: usize = 16;

/// Where in an operation an event was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Phase {
    Entry = 1,
    During = 2,
    Exit = 3,
}

impl Phase {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            1 => Some(Phase::Entry),
            2 => Some(Phase::During),
            3 => Some(Phase::Exit),
            _ => None,
        }
    }
}

/// Frequency domains named in frequency records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreqDomain {
    Apl,
    Atl,
    Int,
    Mif,
    Isp,
    Disp,
}

impl FreqDomain {
    pub fn name(self) -> &'static str {
        match self {
            FreqDomain::Apl => "APL",
            FreqDomain::Atl => "ATL",
            FreqDomain::Int => "INT",
            FreqDomain::Mif => "MIF",
            FreqDomain::Isp => "ISP",
            FreqDomain::Disp => "DISP",
        }
    }
}

/// Voltages reported alongside a mailbox message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MailboxVolts {
    pub atl: u32,
    pub apo: u32,
    pub g3d: u32,
    pub mif: u32,
}

/// A record type stored in one of the event arenas.
pub trait EventRecord: Copy + 'static {
    const KIND: EventKind;

    /// Timestamp the record was taken at.
    fn time(&self) -> u64;
}

macro_rules! event_record {
    ($ty:ident, $kind:ident) => {
        impl EventRecord for $ty {
            const KIND: EventKind = EventKind::$kind;

            #[inline(always)]
            fn time(&self) -> u64 {
                self.time
            }
        }
    };
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskRecord {
    pub time: u64,
    pub task: u64,
    pub pid: i32,
    pub comm: [u8; 16],
    pub(crate) _pad: u32,
}

impl TaskRecord {
    pub fn comm(&self) -> &str {
        name_str(&self.comm)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkRecord {
    pub time: u64,
    pub worker: u64,
    pub work: u64,
    pub func: u64,
    pub phase: i32,
    pub(crate) _pad: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuidleRecord {
    pub time: u64,
    pub index: i32,
    pub state: u32,
    pub num_online_cpus: u32,
    pub delta: i32,
    pub phase: i32,
    pub(crate) _pad: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuspendRecord {
    pub time: u64,
    pub func: u64,
    pub device: u64,
    pub phase: i32,
    pub(crate) _pad: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqRecord {
    pub time: u64,
    pub irq: i32,
    pub(crate) _pad0: u32,
    pub func: u64,
    pub preempt: u32,
    pub irqs_disabled: u32,
    pub phase: i32,
    pub(crate) _pad1: u32,
}

/// A handler that ran longer than the latency threshold.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqExitRecord {
    /// Handler entry time.
    pub time: u64,
    pub end_time: u64,
    pub latency: u64,
    pub irq: i32,
    pub(crate) _pad: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpinlockRecord {
    pub time: u64,
    pub jiffies: u64,
    pub owner: u64,
    pub owner_comm: [u8; 16],
    pub owner_cpu: u32,
    pub phase: i32,
    pub caller: [u64; CALLSTACK_MAX],
}

impl SpinlockRecord {
    pub fn owner_comm(&self) -> &str {
        name_str(&self.owner_comm)
    }
}

/// One step of an interrupts-disabled section.
///
/// `time` is the jiffies value when the step was taken; `index` counts the
/// steps since the section began.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqsDisabledRecord {
    pub time: u64,
    pub index: u64,
    pub task: u64,
    pub task_comm: [u8; 16],
    pub caller: [u64; CALLSTACK_MAX],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClkRecord {
    pub time: u64,
    pub clk: u64,
    pub func_name: [u8; NAME_LEN],
    pub mode: i32,
    pub(crate) _pad: u32,
}

impl ClkRecord {
    pub fn func_name(&self) -> &str {
        name_str(&self.func_name)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreqRecord {
    pub time: u64,
    pub cpu: i32,
    pub domain: [u8; 8],
    pub(crate) _pad0: u32,
    pub old_freq: u64,
    pub target_freq: u64,
    pub phase: i32,
    pub(crate) _pad1: u32,
}

impl FreqRecord {
    pub fn domain(&self) -> &str {
        name_str(&self.domain)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HrtimerRecord {
    pub time: u64,
    pub now: i64,
    pub timer: u64,
    pub func: u64,
    pub phase: i32,
    pub(crate) _pad: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThermalRecord {
    pub time: u64,
    pub cpu: i32,
    pub(crate) _pad: u32,
    pub data: u64,
    pub temp: u32,
    pub cooling_device: [u8; NAME_LEN],
    pub cooling_state: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxRecord {
    pub time: u64,
    pub buf: [u32; 4],
    pub mode: i32,
    pub cpu: i32,
    pub name: [u8; NAME_LEN],
    pub atl_vol: u32,
    pub apo_vol: u32,
    pub g3d_vol: u32,
    pub mif_vol: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockeventRecord {
    pub time: u64,
    pub clc: u64,
    pub delta: i64,
    pub next_event: i64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrintkRecord {
    pub time: u64,
    pub cpu: i32,
    pub log: [u8; PRINTK_LEN],
    pub(crate) _pad: u32,
    pub caller: [u64; CALLSTACK_MAX],
}

impl PrintkRecord {
    pub fn text(&self) -> &str {
        name_str(&self.log)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrintklRecord {
    pub time: u64,
    pub cpu: i32,
    pub(crate) _pad: u32,
    pub msg: u64,
    pub val: u64,
    pub caller: [u64; CALLSTACK_MAX],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct I2cClkRecord {
    pub time: u64,
    pub bus_id: i32,
    pub clk_enable: i32,
    pub phase: i32,
    pub(crate) _pad: u32,
}

event_record!(TaskRecord, Task);
event_record!(WorkRecord, Work);
event_record!(CpuidleRecord, Cpuidle);
event_record!(SuspendRecord, Suspend);
event_record!(IrqRecord, Irq);
event_record!(IrqExitRecord, IrqExit);
event_record!(SpinlockRecord, Spinlock);
event_record!(IrqsDisabledRecord, IrqsDisabled);
event_record!(ClkRecord, Clk);
event_record!(FreqRecord, Freq);
event_record!(HrtimerRecord, Hrtimer);
event_record!(ThermalRecord, Thermal);
event_record!(MailboxRecord, Mailbox);
event_record!(ClockeventRecord, Clockevent);
event_record!(PrintkRecord, Printk);
event_record!(PrintklRecord, Printkl);
event_record!(I2cClkRecord, I2cClk);

// Offline tools hard-code these sizes.
const _: () = assert!(size_of::<TaskRecord>() == 40);
const _: () = assert!(size_of::<IrqExitRecord>() == 32);
const _: () = assert!(size_of::<SpinlockRecord>() == 80);
const _: () = assert!(size_of::<PrintkRecord>() == 176);

/// Fails to compile if `$ty` is larger than its fields, i.e. if the C
/// layout inserted padding nobody writes.
macro_rules! assert_no_padding {
    ($ty:ty: $($field:ty),+ $(,)?) => {
        const _: () = assert!(size_of::<$ty>() == 0 $(+ size_of::<$field>())+);
    };
}

assert_no_padding!(TaskRecord: u64, u64, i32, [u8; 16], u32);
assert_no_padding!(WorkRecord: u64, u64, u64, u64, i32, u32);
assert_no_padding!(CpuidleRecord: u64, i32, u32, u32, i32, i32, u32);
assert_no_padding!(SuspendRecord: u64, u64, u64, i32, u32);
assert_no_padding!(IrqRecord: u64, i32, u32, u64, u32, u32, i32, u32);
assert_no_padding!(IrqExitRecord: u64, u64, u64, i32, u32);
assert_no_padding!(SpinlockRecord: u64, u64, u64, [u8; 16], u32, i32, [u64; CALLSTACK_MAX]);
assert_no_padding!(IrqsDisabledRecord: u64, u64, u64, [u8; 16], [u64; CALLSTACK_MAX]);
assert_no_padding!(ClkRecord: u64, u64, [u8; NAME_LEN], i32, u32);
assert_no_padding!(FreqRecord: u64, i32, [u8; 8], u32, u64, u64, i32, u32);
assert_no_padding!(HrtimerRecord: u64, i64, u64, u64, i32, u32);
assert_no_padding!(ThermalRecord: u64, i32, u32, u64, u32, [u8; NAME_LEN], u32);
assert_no_padding!(
    MailboxRecord: u64, [u32; 4], i32, i32, [u8; NAME_LEN], u32, u32, u32, u32
);
assert_no_padding!(ClockeventRecord: u64, u64, i64, i64);
assert_no_padding!(PrintkRecord: u64, i32, [u8; PRINTK_LEN], u32, [u64; CALLSTACK_MAX]);
assert_no_padding!(PrintklRecord: u64, i32, u32, u64, u64, [u64; CALLSTACK_MAX]);
assert_no_padding!(I2cClkRecord: u64, i32, i32, i32, u32);

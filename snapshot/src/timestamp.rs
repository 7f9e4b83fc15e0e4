//! Architecture cycle counter and a platform built on it.
//!
//! - x86-64: RDTSC
//! - ARM64: CNTVCT_EL0
//!
//! Raw counter ticks are used as the clock; converting to nanoseconds needs
//! the counter frequency and is left to offline tools.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::platform::{Platform, TaskInfo};

/// Read the current core's cycle counter.
///
/// Safe to call from any context: no locks, no allocation.
#[inline(always)]
pub fn cycle_counter() -> u64 {
    #[cfg(target_arch = "x86_64")]
    {
        let low: u32;
        let high: u32;
        unsafe {
            core::arch::asm!(
                "rdtsc",
                out("eax") low,
                out("edx") high,
                options(nostack, nomem, preserves_flags)
            );
        }
        ((high as u64) << 32) | (low as u64)
    }

    #[cfg(target_arch = "aarch64")]
    {
        let val: u64;
        unsafe {
            core::arch::asm!(
                "mrs {}, cntvct_el0",
                out(reg) val,
                options(nomem, nostack)
            );
        }
        val
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        static FALLBACK: AtomicU64 = AtomicU64::new(0);
        FALLBACK.fetch_add(1, Ordering::Relaxed)
    }
}

/// Single-core platform clocked by [`cycle_counter`].
///
/// Useful for bringing the engine up before per-CPU data exists. It never
/// goes backwards: every read is at least one tick after the previous one.
pub struct CycleCounterPlatform {
    last: AtomicU64,
}

impl CycleCounterPlatform {
    pub const fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }
}

impl Default for CycleCounterPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for CycleCounterPlatform {
    fn current_cpu(&self) -> usize {
        0
    }

    fn cpu_clock(&self, _cpu: usize) -> u64 {
        let now = cycle_counter();
        let prev = self.last.fetch_max(now, Ordering::Relaxed);
        if now > prev {
            now
        } else {
            self.last.fetch_add(1, Ordering::Relaxed) + 1
        }
    }

    fn num_online_cpus(&self) -> u32 {
        1
    }

    fn current_task(&self) -> TaskInfo {
        TaskInfo::new(0, "swapper")
    }
}

//! Always-on event recorder and crash diagnostics.
//!
//! A fixed physical region survives warm resets. While the kernel runs, the
//! engine records structured events into per-core rings inside that region
//! and appends text streams to named categories. After a reset, the next
//! boot reads the region header to learn how the previous session ended,
//! and an offline tool can parse a raw dump with [`SnapshotImage`].
//!
//! # Design Principles
//!
//! 1. **Never fail the host**: configuration or reservation problems leave
//!    the engine disabled, never the boot broken.
//! 2. **No locks on the event path**: rings are claimed with atomics and
//!    written in place.
//! 3. **Stable layout**: every byte of the region sits at an offset that can
//!    be recomputed from the configuration alone.
//!
//! ```text
//! +--------+-----+-----------+-------+---------------------+-----------+
//! | header | MMU | core regs | spare | event arenas ...    | text cats |
//! +--------+-----+-----------+-------+---------------------+-----------+
//! 0x0      0x1000 0x2000     0x3000  0x4000
//! \_______________ primary category ________________________/
//! ```

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod capture;
pub mod category;
pub mod config;
pub mod engine;
pub mod error;
pub mod global;
pub mod image;
pub mod kevents;
pub mod lifecycle;
pub mod output;
pub mod platform;
pub mod region;
pub mod tags;
pub mod text;
pub mod timestamp;

pub use category::{EnableState, TryEnableStatus};
pub use config::{CategoryDescriptor, CategoryKind, RingConfig, SnapshotConfig};
pub use engine::{DenylistKind, Engine};
pub use error::{Result, SnapshotError};
pub use image::SnapshotImage;
pub use kevents::{EventKind, EventRecord, FreqDomain, MailboxVolts, Phase};
pub use lifecycle::{HeaderSnapshot, LifecycleState, RebootKind, Signature};
pub use platform::{CoreRegisters, ManualPlatform, MmuRegisters, Platform, TaskInfo};
pub use region::{MemoryBank, MemoryRegion, PhysicalMemory};
pub use timestamp::CycleCounterPlatform;

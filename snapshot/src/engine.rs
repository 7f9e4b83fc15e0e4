//! The engine value.
//!
//! One [`Engine`] owns the region, the category registry, the event arenas,
//! the capture decoder and the lifecycle controller. It is built once at
//! boot and shared by reference afterwards.
//!
//! # Boot
//!
//! ```text
//! validate config
//!   -> reserve region (sum of category allocations)
//!   -> assign category addresses
//!   -> lay out event arenas in the primary category
//!   -> classify previous session, stamp header, clear buffers
//!   -> enable "base", signature Alive
//! ```
//!
//! Any failure leaves the engine permanently disabled: every recording and
//! capture call becomes a no-op and [`Engine::boot_error`] reports why. The
//! host's boot is never failed.

use alloc::sync::Arc;

use crate::capture::bootstat::BootMilestone;
use crate::capture::ByteStreamCapture;
use crate::category::{CategoryRegistry, EnableState, TryEnableStatus};
use crate::config::{CategoryKind, SnapshotConfig, BASE_NAME};
use crate::error::{Result, SnapshotError};
use crate::kevents::{Denylist, Kevents, KeventsLayout};
use crate::lifecycle::{HeaderSnapshot, Lifecycle, LifecycleState, RebootCallback, RebootKind};
use crate::platform::Platform;
use crate::region::{offset, MemoryRegion, PhysicalMemory};

/// Which exclusion list a control call addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenylistKind {
    /// Irq ids dropped on entry.
    Irq,
    /// Irq ids dropped on exit.
    IrqExit,
    /// Task pids dropped on context switch.
    Task,
}

pub struct Engine {
    memory: Arc<dyn PhysicalMemory>,
    platform: Arc<dyn Platform>,
    registry: CategoryRegistry,
    region: Option<MemoryRegion>,
    kevents: Option<Kevents>,
    lifecycle: Lifecycle,
    capture: ByteStreamCapture,
    capture_category: Option<&'static str>,
    boot_error: Option<SnapshotError>,
}

impl Engine {
    /// Boot an engine over `memory`. Never fails; see [`Engine::boot_error`].
    pub fn new(
        config: SnapshotConfig,
        memory: Arc<dyn PhysicalMemory>,
        platform: Arc<dyn Platform>,
    ) -> Self {
        let mut engine = Self {
            memory,
            platform,
            registry: CategoryRegistry::new(config.categories()),
            region: None,
            kevents: None,
            lifecycle: Lifecycle::new(),
            capture: ByteStreamCapture::new(),
            capture_category: config.capture_category,
            boot_error: None,
        };
        if let Err(err) = engine.boot(&config) {
            log::error!("snapshot engine disabled: {}", err);
            engine.boot_error = Some(err);
        }
        engine
    }

    fn boot(&mut self, config: &SnapshotConfig) -> Result<()> {
        config.validate()?;

        let size = self.registry.required_size();
        let region = MemoryRegion::reserve(&*self.memory, config.physical_base, size)?;
        self.registry.assign_addresses(&region);

        let kevents = match self.registry.primary() {
            Some(primary) if primary.enabled_at_init() => {
                let layout = KeventsLayout::compute(
                    &config.rings,
                    config.nr_cpus,
                    offset::EVENTS,
                    primary.capacity(),
                );
                match layout {
                    Ok(layout) => Some(Kevents::new(&region, layout, self.platform.clone(), config)),
                    Err(err) => {
                        region.release(&*self.memory);
                        return Err(err);
                    }
                }
            }
            _ => None,
        };

        log::info!(
            "reserved {:#x} bytes at {:#x} (virtual {:#x})",
            size,
            region.physical_base(),
            region.virtual_base()
        );
        for category in self.registry.iter().filter(|c| c.head_offset().is_some()) {
            log::info!(
                "{:>16}: {:#x} bytes at {:#x}",
                category.name(),
                category.capacity(),
                self.registry.category_paddr(category.name()).unwrap_or(0)
            );
        }

        self.lifecycle.boot(&region, &self.registry);
        self.kevents = kevents;
        self.registry
            .set_enabled(BASE_NAME, true, self.platform.local_clock())?;
        self.lifecycle.mark_alive(&region);
        self.region = Some(region);
        Ok(())
    }

    /// Why the engine is disabled, if boot failed.
    pub fn boot_error(&self) -> Option<SnapshotError> {
        self.boot_error
    }

    pub fn platform(&self) -> &dyn Platform {
        &*self.platform
    }

    pub fn registry(&self) -> &CategoryRegistry {
        &self.registry
    }

    pub fn region(&self) -> Option<&MemoryRegion> {
        self.region.as_ref()
    }

    // =========================================================================
    // Recording
    // =========================================================================

    /// The event recorder, if recording is currently allowed.
    ///
    /// This is the hot-path gate: engine on, primary category on, arenas
    /// laid out.
    #[inline(always)]
    pub fn kevents(&self) -> Option<&Kevents> {
        if !self.registry.base_enabled() {
            return None;
        }
        let kevents = self.kevents.as_ref()?;
        match self.registry.primary() {
            Some(primary) if primary.is_enabled() => Some(kevents),
            _ => None,
        }
    }

    /// Append `bytes` to the text category `name`.
    ///
    /// No-op when the engine or the category is off. Writes to the
    /// resumable category also update the persisted write position.
    pub fn record_to_category(&self, name: &str, bytes: &[u8]) {
        let Some(region) = &self.region else { return };
        if !self.registry.base_enabled() {
            return;
        }
        let Some(category) = self.registry.get(name) else { return };
        if !category.is_enabled() || category.kind() == CategoryKind::Events {
            return;
        }
        if category.kind() == CategoryKind::ResumableText {
            category.append_published(region, bytes, offset::LAST_KERNEL_LOG);
        } else {
            category.append(region, bytes);
        }
    }

    /// Kernel log hook: `line` goes to the resumable text category.
    pub fn hook_kernel_log(&self, line: &[u8]) {
        if let Some(category) = self.registry.resumable() {
            self.record_to_category(category.name(), line);
        }
    }

    /// Userspace log hook: decode one record into the capture category.
    pub fn hook_pmsg(&self, record: &[u8]) {
        let Some(name) = self.capture_category else { return };
        if self.region.is_none() || !self.registry.base_enabled() {
            return;
        }
        if self.registry.get_enabled(name, false) != EnableState::Enabled {
            return;
        }
        self.capture
            .ingest(record, &*self.platform, &mut |bytes| self.record_to_category(name, bytes));
    }

    /// Copy the text of category `name` into `out`, oldest byte first.
    pub fn read_text(&self, name: &str, out: &mut [u8]) -> usize {
        match (&self.region, self.registry.get(name)) {
            (Some(region), Some(category)) => category.read_text(region, out),
            _ => 0,
        }
    }

    /// Copy the captured boot milestones into `out`.
    pub fn boot_milestones(&self, out: &mut [BootMilestone]) -> usize {
        self.capture.milestones(out)
    }

    // =========================================================================
    // Control surface
    // =========================================================================

    fn live(&self) -> Result<()> {
        match self.region {
            Some(_) => Ok(()),
            None => Err(SnapshotError::EngineDisabled),
        }
    }

    /// Recorder regardless of the runtime switches, for policy changes.
    fn knobs(&self) -> Result<&Kevents> {
        self.kevents.as_ref().ok_or(SnapshotError::EngineDisabled)
    }

    /// Turn category `name`, or the whole engine for `"base"`, on or off.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        self.live()?;
        self.registry
            .set_enabled(name, enabled, self.platform.local_clock())
    }

    pub fn get_enabled(&self, name: &str, init: bool) -> EnableState {
        self.registry.get_enabled(name, init)
    }

    /// Re-enable `name` if it has been off for at least `duration_ns`.
    pub fn try_enable_after_quiet(&self, name: &str, duration_ns: u64) -> Result<TryEnableStatus> {
        self.live()?;
        self.registry
            .try_enable_after_quiet(name, duration_ns, self.platform.local_clock())
    }

    pub fn callstack_depth(&self) -> Result<usize> {
        Ok(self.knobs()?.callstack_depth())
    }

    pub fn set_callstack_depth(&self, depth: usize) -> Result<()> {
        self.knobs()?.set_callstack_depth(depth)
    }

    pub fn irq_exit_threshold_us(&self) -> Result<u32> {
        Ok(self.knobs()?.irq_exit_threshold_us())
    }

    pub fn set_irq_exit_threshold_us(&self, us: u32) -> Result<()> {
        self.knobs()?.set_irq_exit_threshold_us(us);
        Ok(())
    }

    fn denylist(&self, kind: DenylistKind) -> Result<&Denylist> {
        let kevents = self.knobs()?;
        Ok(match kind {
            DenylistKind::Irq => kevents.irq_denylist(),
            DenylistKind::IrqExit => kevents.irq_exit_denylist(),
            DenylistKind::Task => kevents.task_denylist(),
        })
    }

    pub fn deny(&self, kind: DenylistKind, id: i32) -> Result<()> {
        self.denylist(kind)?.add(id)
    }

    pub fn allow(&self, kind: DenylistKind, id: i32) -> Result<()> {
        self.denylist(kind)?.remove(id)
    }

    /// Copy the ids on list `kind` into `out`, returning how many there are.
    pub fn denied(&self, kind: DenylistKind, out: &mut [i32]) -> Result<usize> {
        Ok(self.denylist(kind)?.list(out))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn category_size(&self, name: &str) -> Option<usize> {
        self.registry.category_size(name)
    }

    pub fn category_paddr(&self, name: &str) -> Option<u64> {
        self.region.as_ref()?;
        self.registry.category_paddr(name)
    }

    pub fn category_vaddr(&self, name: &str) -> Option<usize> {
        self.region.as_ref()?;
        self.registry.category_vaddr(name)
    }

    pub fn base_vaddr(&self) -> Option<usize> {
        self.region.as_ref().map(MemoryRegion::virtual_base)
    }

    pub fn base_paddr(&self) -> Option<u64> {
        self.region.as_ref().map(MemoryRegion::physical_base)
    }

    pub fn total_size(&self) -> usize {
        self.region.as_ref().map_or(0, MemoryRegion::total_size)
    }

    pub fn spare_vaddr(&self, off: usize) -> Option<usize> {
        self.region.as_ref().map(|r| r.spare_vaddr(off))
    }

    pub fn spare_paddr(&self, off: usize) -> Option<u64> {
        self.region.as_ref().map(|r| r.spare_paddr(off))
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// The previous session's header as found at boot.
    pub fn previous_session(&self) -> &HeaderSnapshot {
        self.lifecycle.previous()
    }

    /// How the previous session ended.
    pub fn previous_outcome(&self) -> LifecycleState {
        self.lifecycle.previous().outcome()
    }

    pub fn register_reboot_callback(&self, callback: RebootCallback) {
        self.lifecycle.register_reboot_callback(callback);
    }

    pub fn notify_reboot(&self, kind: RebootKind) {
        if let Some(region) = &self.region {
            self.lifecycle.notify_reboot(region, &*self.platform, kind);
        }
    }

    /// Crash path of `cpu`: save its registers and mark the session dead.
    pub fn on_panic(&self, cpu: usize) {
        if let Some(region) = &self.region {
            self.lifecycle.on_panic(region, &*self.platform, cpu);
        }
    }

    pub fn on_safe_fault(&self) {
        if let Some(region) = &self.region {
            self.lifecycle.on_safe_fault(region, &*self.platform);
        }
    }

    /// Track `cpu` coming online or going offline in the header.
    pub fn set_core_power(&self, cpu: usize, online: bool) {
        if let Some(region) = &self.region {
            self.lifecycle.set_core_power(region, cpu, online);
        }
    }

    /// Stop recording and give the region back. Its contents stay in
    /// memory for the next engine booted over it.
    pub fn shutdown(self) {
        let Self {
            memory,
            registry,
            region,
            kevents,
            ..
        } = self;
        let _ = registry.set_enabled(BASE_NAME, false, 0);
        drop(kevents);
        if let Some(region) = region {
            region.release(&*memory);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CategoryDescriptor, RingConfig};
    use crate::kevents::TaskRecord;
    use crate::platform::{ManualPlatform, TaskInfo};
    use crate::region::MemoryBank;
    use std::vec::Vec;

    const BASE: u64 = 0x8800_0000;

    fn config() -> SnapshotConfig {
        SnapshotConfig::new(BASE)
            .with_cpus(2)
            .with_rings(RingConfig::uniform(16))
            .with_categories(&[
                CategoryDescriptor::new("log_kevents", 0x40000, CategoryKind::Events),
                CategoryDescriptor::new("log_kernel", 0x1000, CategoryKind::ResumableText),
                CategoryDescriptor::new("log_platform", 0x1000, CategoryKind::Text),
                CategoryDescriptor::new("log_pstore", 0x200, CategoryKind::Raw).persistent(),
            ])
    }

    fn engine() -> (Engine, Arc<MemoryBank>, Arc<ManualPlatform>) {
        let bank = Arc::new(MemoryBank::new(BASE, 0x100000));
        let platform = Arc::new(ManualPlatform::new(2));
        let engine = Engine::new(config(), bank.clone(), platform.clone());
        (engine, bank, platform)
    }

    #[test]
    fn boots_live() {
        let (engine, _bank, _platform) = engine();
        assert_eq!(engine.boot_error(), None);
        assert_eq!(engine.get_enabled("base", false), EnableState::Enabled);
        assert_eq!(engine.lifecycle_state(), LifecycleState::ColdStart);
        assert_eq!(engine.base_paddr(), Some(BASE));
        assert_eq!(engine.category_paddr("log_kernel"), Some(BASE + 0x40000));
        assert_eq!(engine.spare_paddr(8), Some(BASE + 0x3008));
        assert_eq!(engine.total_size(), 0x42200);
        assert!(engine.kevents().is_some());
    }

    #[test]
    fn reservation_failure_disables_everything() {
        let bank = Arc::new(MemoryBank::new(BASE, 0x1000));
        let platform = Arc::new(ManualPlatform::new(2));
        let engine = Engine::new(config(), bank, platform);
        assert!(matches!(
            engine.boot_error(),
            Some(SnapshotError::AllocationFailure { .. })
        ));
        assert!(engine.kevents().is_none());
        assert_eq!(engine.base_vaddr(), None);
        assert_eq!(engine.set_enabled("base", true), Err(SnapshotError::EngineDisabled));
        assert_eq!(engine.get_enabled("base", false), EnableState::Disabled);
        engine.record_to_category("log_platform", b"dropped");
        engine.hook_pmsg(b"dropped\0");
        engine.notify_reboot(RebootKind::Normal);
        assert_eq!(engine.read_text("log_platform", &mut [0u8; 16]), 0);
    }

    #[test]
    fn oversized_arenas_disable_the_engine() {
        let bank = Arc::new(MemoryBank::new(BASE, 0x100000));
        let platform = Arc::new(ManualPlatform::new(2));
        let engine = Engine::new(
            config().with_rings(RingConfig::uniform(1 << 16)),
            bank.clone(),
            platform,
        );
        assert!(matches!(
            engine.boot_error(),
            Some(SnapshotError::LayoutOverflow { .. })
        ));
        // The reservation was given back.
        assert!(MemoryRegion::reserve(&*bank, BASE, 0x1000).is_ok());
    }

    #[test]
    fn kernel_log_moves_persisted_pointer() {
        let (engine, bank, _platform) = engine();
        engine.hook_kernel_log(b"<6>hello\n");
        let head = BASE + 0x40000;
        let header = HeaderSnapshot::from_bytes(&bank.image(BASE, 0x1000).expect("image"))
            .expect("header");
        assert_eq!(header.last_kernel_log, head + 9);
    }

    #[test]
    fn gates_follow_switches() {
        let (engine, _bank, _platform) = engine();
        let task = TaskInfo::new(5, "worker");
        engine.set_enabled("log_kevents", false).expect("known");
        assert!(engine.kevents().is_none());
        engine.set_enabled("log_kevents", true).expect("known");
        engine.set_enabled("base", false).expect("base");
        assert!(engine.kevents().is_none());
        engine.set_enabled("base", true).expect("base");
        engine.kevents().expect("live").task(0, &task);
        let seen: Vec<TaskRecord> = engine.kevents().expect("live").read_back(0).collect();
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn control_surface_reports_unknown_names() {
        let (engine, _bank, _platform) = engine();
        assert_eq!(engine.set_enabled("log_nope", true), Err(SnapshotError::UnknownCategory));
        assert_eq!(engine.get_enabled("log_nope", false), EnableState::Unknown);
        assert_eq!(engine.category_size("log_nope"), None);
        assert_eq!(engine.set_callstack_depth(0), Err(SnapshotError::InvalidArgument));
        engine.set_callstack_depth(2).expect("in range");
        assert_eq!(engine.callstack_depth(), Ok(2));
        engine.set_irq_exit_threshold_us(300).expect("live");
        assert_eq!(engine.irq_exit_threshold_us(), Ok(300));
    }

    #[test]
    fn denylists_round_trip_through_engine() {
        let (engine, _bank, _platform) = engine();
        engine.deny(DenylistKind::Irq, 33).expect("room");
        engine.deny(DenylistKind::Irq, 34).expect("room");
        let mut ids = [0; 8];
        assert_eq!(engine.denied(DenylistKind::Irq, &mut ids), Ok(2));
        assert_eq!(&ids[..2], &[33, 34]);
        engine.allow(DenylistKind::Irq, 33).expect("present");
        assert_eq!(engine.allow(DenylistKind::Irq, 33), Err(SnapshotError::NotFound));
        assert_eq!(engine.denied(DenylistKind::Task, &mut ids), Ok(0));
    }

    #[test]
    fn shutdown_releases_region() {
        let (engine, bank, _platform) = engine();
        engine.shutdown();
        assert!(MemoryRegion::reserve(&*bank, BASE, 0x1000).is_ok());
    }
}

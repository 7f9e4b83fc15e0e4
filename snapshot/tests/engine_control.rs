//! Runtime switches and the userspace log path of a booted engine.

use std::sync::Arc;

use snapshot::capture::bootstat::BootMilestone;
use snapshot::capture::event_log::{EVENT_TYPE_INT, EVENT_TYPE_LONG};
use snapshot::capture::{log_id, LOG_HEADER_LEN};
use snapshot::kevents::{IrqRecord, TaskRecord};
use snapshot::{
    CategoryDescriptor, CategoryKind, EnableState, Engine, ManualPlatform, MemoryBank, Phase,
    RingConfig, SnapshotConfig, SnapshotError, TryEnableStatus,
};

const BASE: u64 = 0x8000_0000;

fn engine() -> (Engine, Arc<ManualPlatform>) {
    let config = SnapshotConfig::new(BASE)
        .with_cpus(2)
        .with_rings(RingConfig::uniform(16))
        .with_categories(&[
            CategoryDescriptor::new("log_kevents", 0x40000, CategoryKind::Events),
            CategoryDescriptor::new("log_kernel", 0x1000, CategoryKind::ResumableText),
            CategoryDescriptor::new("log_platform", 0x1000, CategoryKind::Text),
        ]);
    let platform = Arc::new(ManualPlatform::new(2));
    let engine = Engine::new(config, Arc::new(MemoryBank::new(BASE, 0x80000)), platform.clone());
    assert_eq!(engine.boot_error(), None);
    (engine, platform)
}

fn platform_text(engine: &Engine) -> String {
    let mut out = vec![0u8; 0x1000];
    let len = engine.read_text("log_platform", &mut out);
    String::from_utf8_lossy(&out[..len]).into_owned()
}

fn log_header(stream: u8) -> [u8; LOG_HEADER_LEN] {
    let mut record = [0u8; LOG_HEADER_LEN];
    record[0] = stream;
    record
}

#[test]
fn disabled_engine_records_nothing() {
    let (engine, _platform) = engine();
    engine.set_enabled("base", false).expect("base");
    assert!(engine.kevents().is_none());
    engine.hook_kernel_log(b"<6>lost\n");
    engine.record_to_category("log_platform", b"lost");

    engine.set_enabled("base", true).expect("base");
    let k = engine.kevents().expect("live");
    assert_eq!(k.read_back::<TaskRecord>(0).count(), 0);
    assert_eq!(engine.read_text("log_kernel", &mut [0u8; 64]), 0);
    assert_eq!(platform_text(&engine), "");

    k.irq(1, 33, 0xffff_0000_0800_1000, true, Phase::Entry);
    let irqs: Vec<IrqRecord> = k.read_back(1).collect();
    assert_eq!(irqs.len(), 1);
    assert_eq!(irqs[0].irq, 33);
}

#[test]
fn disabled_category_skips_only_itself() {
    let (engine, _platform) = engine();
    engine.set_enabled("log_platform", false).expect("known");
    assert_eq!(engine.get_enabled("log_platform", false), EnableState::Disabled);
    assert_eq!(engine.get_enabled("log_platform", true), EnableState::Enabled);
    engine.record_to_category("log_platform", b"lost");
    engine.hook_kernel_log(b"<6>kept\n");
    assert_eq!(platform_text(&engine), "");
    assert_eq!(engine.read_text("log_kernel", &mut [0u8; 64]), 8);
}

#[test]
fn quiet_period_gates_rearming() {
    let (engine, platform) = engine();
    platform.set_step(0);
    platform.set_time(1_000);
    engine.set_enabled("log_platform", false).expect("known");

    platform.set_time(1_500);
    assert_eq!(
        engine.try_enable_after_quiet("log_platform", 1_000),
        Ok(TryEnableStatus::StillQuiet)
    );
    assert_eq!(engine.get_enabled("log_platform", false), EnableState::Disabled);

    platform.set_time(2_000);
    assert_eq!(
        engine.try_enable_after_quiet("log_platform", 1_000),
        Ok(TryEnableStatus::Rearmed)
    );
    assert_eq!(
        engine.try_enable_after_quiet("log_platform", 1_000),
        Ok(TryEnableStatus::AlreadyEnabled)
    );
    assert_eq!(
        engine.try_enable_after_quiet("log_nope", 0),
        Err(SnapshotError::UnknownCategory)
    );

    engine.set_enabled("base", false).expect("base");
    assert_eq!(
        engine.try_enable_after_quiet("log_platform", 0),
        Err(SnapshotError::EngineDisabled)
    );
}

#[test]
fn event_stream_decodes_into_capture_category() {
    let (engine, _platform) = engine();
    engine.hook_pmsg(&[b'l', 0x20, 0, 0xe8, 0x03, 0x39, 0x05]);
    engine.hook_pmsg(&log_header(log_id::EVENTS));
    let header = platform_text(&engine);
    assert!(header.starts_with("\n["), "header line {header:?}");
    assert!(header.contains(" 1337 "), "header line {header:?}");

    engine.hook_pmsg(&[EVENT_TYPE_INT]);
    engine.hook_pmsg(&42i32.to_le_bytes());
    engine.hook_pmsg(&314u32.to_le_bytes());
    assert!(platform_text(&engine).ends_with("42# pi "));

    // Payloads that carry their own type byte need no marker.
    engine.hook_pmsg(&[EVENT_TYPE_INT, 5, 0, 0, 0]);
    let mut long = vec![EVENT_TYPE_LONG];
    long.extend_from_slice(&(-9i64).to_le_bytes());
    engine.hook_pmsg(&long);
    assert!(platform_text(&engine).ends_with("42# pi 5-9"));
}

#[test]
fn main_stream_lines_and_boot_milestones() {
    let (engine, platform) = engine();
    engine.hook_pmsg(&log_header(log_id::MAIN));
    engine.hook_pmsg(&[4]);
    platform.set_time(7_000);
    engine.hook_pmsg(b"!@Boot: bootanim end\0");
    assert!(platform_text(&engine).ends_with("I !@Boot: bootanim end"));

    let mut seen = [BootMilestone::EMPTY; 2];
    assert_eq!(engine.boot_milestones(&mut seen), 1);
    assert_eq!(seen[0].text(), "!@Boot: bootanim end");
}

#[test]
fn capture_stops_with_its_category() {
    let (engine, _platform) = engine();
    engine.set_enabled("log_platform", false).expect("known");
    engine.hook_pmsg(&log_header(log_id::MAIN));
    engine.hook_pmsg(b"dropped\0");
    engine.set_enabled("log_platform", true).expect("known");
    assert_eq!(platform_text(&engine), "");
}

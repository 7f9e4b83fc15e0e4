//! Boot-time configuration.
//!
//! Everything here is fixed before the engine starts: the physical base comes
//! from the `ess_setup=` kernel parameter, the rest are build-time constants
//! collected in a [`SnapshotConfig`].

use alloc::vec::Vec;

use crate::error::{Result, SnapshotError};
use crate::region::{HEADER_TOTAL_SIZE, MAX_CPUS};

const KIB: usize = 1024;
const MIB: usize = 1024 * KIB;

/// Name that addresses the whole engine in the control surface.
pub const BASE_NAME: &str = "base";

/// Kernel command line key carrying the physical base.
pub const SETUP_PARAM: &str = "ess_setup";

/// Deepest call chain captured by lock and printk records.
pub const CALLSTACK_MAX: usize = 4;

/// How a category's bytes are used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryKind {
    /// Hosts the header and the structured event arenas. Must be first.
    Events,
    /// Byte stream whose write position is mirrored into the header and
    /// picked up again by the next boot.
    ResumableText,
    /// Byte stream restarted on every boot.
    Text,
    /// Memory handed out through accessors only.
    Raw,
}

/// Static description of one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryDescriptor {
    pub name: &'static str,
    pub capacity: usize,
    pub persist: bool,
    pub enabled_at_init: bool,
    pub kind: CategoryKind,
}

impl CategoryDescriptor {
    pub const fn new(name: &'static str, capacity: usize, kind: CategoryKind) -> Self {
        Self {
            name,
            capacity,
            persist: false,
            enabled_at_init: true,
            kind,
        }
    }

    /// Keep the contents across reboots.
    pub const fn persistent(mut self) -> Self {
        self.persist = true;
        self
    }

    /// Leave the category out of the layout.
    pub const fn disabled_at_init(mut self) -> Self {
        self.enabled_at_init = false;
        self
    }
}

/// Categories of a full build.
pub const DEFAULT_CATEGORIES: [CategoryDescriptor; 4] = [
    CategoryDescriptor::new("log_kevents", 8 * MIB, CategoryKind::Events),
    CategoryDescriptor::new("log_kernel", 2 * MIB, CategoryKind::ResumableText),
    CategoryDescriptor::new("log_platform", 4 * MIB, CategoryKind::Text),
    CategoryDescriptor::new("log_pstore", 32 * KIB, CategoryKind::Raw).persistent(),
];

/// Categories of a minimized build.
pub const MINIMIZED_CATEGORIES: [CategoryDescriptor; 4] = [
    CategoryDescriptor::new("log_kevents", 8 * MIB, CategoryKind::Events),
    CategoryDescriptor::new("log_kernel", 2 * MIB, CategoryKind::ResumableText),
    CategoryDescriptor::new("log_platform", 2 * MIB, CategoryKind::Text),
    CategoryDescriptor::new("log_pstore", 32 * KIB, CategoryKind::Raw).persistent(),
];

/// Entry counts of the event arenas. All must be powers of two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingConfig {
    /// Most per-core kinds and the clock/frequency/thermal/mailbox logs.
    pub log_entries: usize,
    /// Per-core interrupt entry log.
    pub irq_entries: usize,
    /// printk and printkl logs.
    pub api_entries: usize,
    /// Per-core interrupts-disabled history.
    pub irqs_disabled_entries: usize,
}

impl RingConfig {
    /// Same entry count for every arena.
    pub const fn uniform(entries: usize) -> Self {
        Self {
            log_entries: entries,
            irq_entries: entries,
            api_entries: entries,
            irqs_disabled_entries: entries,
        }
    }

    fn validate(&self) -> Result<()> {
        for entries in [
            self.log_entries,
            self.irq_entries,
            self.api_entries,
            self.irqs_disabled_entries,
        ] {
            if !entries.is_power_of_two() || entries > u32::MAX as usize {
                return Err(SnapshotError::InvalidConfig(
                    "ring entries must be a power of two",
                ));
            }
        }
        Ok(())
    }
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            log_entries: 1024,
            irq_entries: 2048,
            api_entries: 2048,
            irqs_disabled_entries: 32,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    pub physical_base: u64,
    pub nr_cpus: usize,
    pub rings: RingConfig,
    pub callstack_depth: usize,
    pub irq_exit_threshold_us: u32,
    /// Category receiving decoded byte-stream output, if any.
    pub capture_category: Option<&'static str>,
    categories: Vec<CategoryDescriptor>,
}

impl SnapshotConfig {
    pub fn new(physical_base: u64) -> Self {
        Self {
            physical_base,
            nr_cpus: MAX_CPUS,
            rings: RingConfig::default(),
            callstack_depth: CALLSTACK_MAX,
            irq_exit_threshold_us: 0,
            capture_category: Some("log_platform"),
            categories: DEFAULT_CATEGORIES.to_vec(),
        }
    }

    pub fn minimized(physical_base: u64) -> Self {
        Self {
            categories: MINIMIZED_CATEGORIES.to_vec(),
            ..Self::new(physical_base)
        }
    }

    /// Build a configuration from a kernel command line.
    pub fn from_cmdline(cmdline: &str) -> Result<Self> {
        let value = cmdline
            .split_ascii_whitespace()
            .find_map(|arg| {
                arg.split_once('=')
                    .filter(|(key, _)| *key == SETUP_PARAM)
                    .map(|(_, value)| value)
            })
            .ok_or(SnapshotError::InvalidBootParam)?;
        Ok(Self::new(parse_setup_param(value)?))
    }

    pub fn with_cpus(mut self, nr_cpus: usize) -> Self {
        self.nr_cpus = nr_cpus;
        self
    }

    pub fn with_rings(mut self, rings: RingConfig) -> Self {
        self.rings = rings;
        self
    }

    pub fn with_categories(mut self, categories: &[CategoryDescriptor]) -> Self {
        self.categories = categories.to_vec();
        self
    }

    pub fn with_capture_category(mut self, name: Option<&'static str>) -> Self {
        self.capture_category = name;
        self
    }

    pub fn with_irq_exit_threshold(mut self, us: u32) -> Self {
        self.irq_exit_threshold_us = us;
        self
    }

    /// Append a category after the existing ones.
    pub fn register(
        &mut self,
        name: &'static str,
        capacity: usize,
        persist: bool,
        enabled_at_init: bool,
        kind: CategoryKind,
    ) -> Result<()> {
        if self.categories.iter().any(|c| c.name == name) || name == BASE_NAME {
            return Err(SnapshotError::InvalidConfig("duplicate category name"));
        }
        self.categories.push(CategoryDescriptor {
            name,
            capacity,
            persist,
            enabled_at_init,
            kind,
        });
        Ok(())
    }

    pub fn categories(&self) -> &[CategoryDescriptor] {
        &self.categories
    }

    pub fn validate(&self) -> Result<()> {
        if self.nr_cpus == 0 || self.nr_cpus > MAX_CPUS {
            return Err(SnapshotError::InvalidConfig("core count out of range"));
        }
        if !(1..=CALLSTACK_MAX).contains(&self.callstack_depth) {
            return Err(SnapshotError::InvalidConfig("callstack depth out of range"));
        }
        self.rings.validate()?;

        let first = self
            .categories
            .first()
            .ok_or(SnapshotError::InvalidConfig("no categories"))?;
        if first.kind != CategoryKind::Events || first.capacity < HEADER_TOTAL_SIZE {
            return Err(SnapshotError::InvalidConfig(
                "first category must be a large enough event category",
            ));
        }
        let mut resumable = 0;
        for (i, desc) in self.categories.iter().enumerate() {
            if desc.name == BASE_NAME
                || self.categories[..i].iter().any(|c| c.name == desc.name)
            {
                return Err(SnapshotError::InvalidConfig("duplicate category name"));
            }
            if i > 0 && desc.kind == CategoryKind::Events {
                return Err(SnapshotError::InvalidConfig("only one event category"));
            }
            if desc.kind == CategoryKind::ResumableText {
                resumable += 1;
            }
            if desc.capacity < 64 || desc.capacity % 8 != 0 {
                return Err(SnapshotError::InvalidConfig("category capacity"));
            }
        }
        if resumable > 1 {
            return Err(SnapshotError::InvalidConfig("only one resumable text category"));
        }
        if let Some(name) = self.capture_category {
            match self.categories.iter().find(|c| c.name == name) {
                Some(c) if matches!(c.kind, CategoryKind::Text | CategoryKind::ResumableText) => {}
                _ => return Err(SnapshotError::InvalidConfig("capture category")),
            }
        }
        Ok(())
    }
}

/// Parse the `ess_setup=` value.
///
/// Accepts `0x`-prefixed hex, `0`-prefixed octal and plain decimal, with
/// optional `_` separators.
pub fn parse_setup_param(value: &str) -> Result<u64> {
    let value = value.trim();
    let (digits, radix) = if let Some(hex) = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        (hex, 16)
    } else if value.len() > 1 && value.starts_with('0') {
        (&value[1..], 8)
    } else {
        (value, 10)
    };

    let mut acc: u64 = 0;
    let mut seen = false;
    for c in digits.chars() {
        if c == '_' {
            continue;
        }
        let digit = c.to_digit(radix).ok_or(SnapshotError::InvalidBootParam)?;
        acc = acc
            .checked_mul(radix as u64)
            .and_then(|v| v.checked_add(digit as u64))
            .ok_or(SnapshotError::InvalidBootParam)?;
        seen = true;
    }
    if !seen {
        return Err(SnapshotError::InvalidBootParam);
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_param_radixes() {
        assert_eq!(parse_setup_param("0x90000000"), Ok(0x9000_0000));
        assert_eq!(parse_setup_param("0X9000_0000"), Ok(0x9000_0000));
        assert_eq!(parse_setup_param("0777"), Ok(0o777));
        assert_eq!(parse_setup_param("4096"), Ok(4096));
        assert_eq!(parse_setup_param("0"), Ok(0));
    }

    #[test]
    fn setup_param_rejects_garbage() {
        assert_eq!(parse_setup_param(""), Err(SnapshotError::InvalidBootParam));
        assert_eq!(parse_setup_param("0x"), Err(SnapshotError::InvalidBootParam));
        assert_eq!(parse_setup_param("09"), Err(SnapshotError::InvalidBootParam));
        assert_eq!(
            parse_setup_param("0x1_0000_0000_0000_0000"),
            Err(SnapshotError::InvalidBootParam)
        );
    }

    #[test]
    fn cmdline_lookup() {
        let config =
            SnapshotConfig::from_cmdline("console=ttySAC2 ess_setup=0x9f000000 rootwait")
                .expect("parameter present");
        assert_eq!(config.physical_base, 0x9f00_0000);
        assert!(SnapshotConfig::from_cmdline("console=ttySAC2").is_err());
    }

    #[test]
    fn default_config_is_valid() {
        assert_eq!(SnapshotConfig::new(0).validate(), Ok(()));
        assert_eq!(SnapshotConfig::minimized(0).validate(), Ok(()));
    }

    #[test]
    fn register_rejects_duplicates() {
        let mut config = SnapshotConfig::new(0);
        assert!(config
            .register("log_kernel", 4096, false, true, CategoryKind::Text)
            .is_err());
        assert!(config
            .register("base", 4096, false, true, CategoryKind::Text)
            .is_err());
        assert!(config
            .register("log_extra", 4096, true, false, CategoryKind::Raw)
            .is_ok());
        assert_eq!(config.categories().len(), 5);
    }

    #[test]
    fn validation_catches_bad_layouts() {
        let bad_rings = SnapshotConfig::new(0).with_rings(RingConfig::uniform(24));
        assert!(bad_rings.validate().is_err());

        let no_events = SnapshotConfig::new(0).with_categories(&DEFAULT_CATEGORIES[1..]);
        assert!(no_events.validate().is_err());

        let too_many_cpus = SnapshotConfig::new(0).with_cpus(MAX_CPUS + 1);
        assert!(too_many_cpus.validate().is_err());

        let bad_capture = SnapshotConfig::new(0).with_capture_category(Some("log_pstore"));
        assert!(bad_capture.validate().is_err());
    }
}

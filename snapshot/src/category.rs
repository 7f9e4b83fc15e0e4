//! Category registry.
//!
//! Categories are fixed at configuration time. At boot they are laid out
//! back to back inside the region, in declared order, skipping the ones not
//! enabled at init. The primary (event) category always comes first because
//! the region header lives in its first bytes.
//!
//! Runtime enable flags are plain atomic stores with relaxed ordering. A
//! recorder that sees a stale flag writes (or skips) one extra event.
//!
//! Text categories are appended to with a compare-exchange reservation of
//! `[cursor, cursor + len)`, so concurrent writers get disjoint byte ranges
//! without a lock. A record that does not fit before the end restarts at the
//! head; the cursor therefore always stays below the capacity, and the
//! point where the previous pass stopped is remembered so a reader never
//! sees the stale bytes past it.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crate::config::{CategoryDescriptor, CategoryKind, BASE_NAME};
use crate::error::{Result, SnapshotError};
use crate::region::{MemoryRegion, HEADER_ALLOC_SIZE};

/// Written in the last 8 bytes of a resumable text category once it wraps.
pub const WRAP_MAGIC: u64 = 0x4b4d_5347_5752_4150;

/// Bytes at the end of a resumable text category kept out of the text.
///
/// ```text
/// ... text ... | wrap end (u64) | WRAP_MAGIC (u64) |
///              ^ allocation - 16                   ^ allocation
/// ```
///
/// The wrap end is the offset one past the last byte written before the
/// most recent wrap; bytes beyond it were never part of that pass.
pub const WRAP_TRAILER_SIZE: usize = 16;

/// Offset of the saved wrap end inside the trailer.
pub const WRAP_END_OFFSET: usize = 0;

/// Offset of [`WRAP_MAGIC`] inside the trailer.
pub const WRAP_MAGIC_OFFSET: usize = 8;

/// Write positions pack the pass number above the byte offset, so later
/// writes always compare greater.
const LAP_SHIFT: u32 = 32;

fn pack(lap: u32, offset: usize) -> u64 {
    ((lap as u64) << LAP_SHIFT) | offset as u64
}

fn lap_of(position: u64) -> u32 {
    (position >> LAP_SHIFT) as u32
}

fn offset_of(position: u64) -> usize {
    (position & u32::MAX as u64) as usize
}

/// Answer of [`CategoryRegistry::get_enabled`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableState {
    Enabled,
    Disabled,
    /// No category has that name.
    Unknown,
}

impl From<bool> for EnableState {
    fn from(enabled: bool) -> Self {
        if enabled {
            EnableState::Enabled
        } else {
            EnableState::Disabled
        }
    }
}

/// Outcome of [`CategoryRegistry::try_enable_after_quiet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryEnableStatus {
    AlreadyEnabled,
    /// The category was off long enough and is on again.
    Rearmed,
    /// The category was switched off too recently.
    StillQuiet,
}

// =============================================================================
// LogCategory
// =============================================================================

/// One named destination inside the region.
///
/// # Thread Safety
///
/// Every field touched after layout is atomic. Text writers reserve byte
/// ranges with a compare-exchange on `position`, so appends from any number
/// of cores never overlap. Readers see a best-effort view: a range reserved
/// but not yet copied in reads back as whatever the bytes held before.
pub struct LogCategory {
    desc: CategoryDescriptor,
    /// Runtime switch, checked by every recorder.
    enabled: AtomicBool,
    /// Time of the last switch, for the quiet-period rearm.
    last_toggle: AtomicU64,
    /// Offset of the head from the region base, once laid out.
    head: Option<usize>,
    /// Bytes assigned by the layout.
    allocation: usize,
    /// Next write position: pass number in the high half, byte offset from
    /// the head in the low half. Pass 0 means the text never wrapped.
    position: AtomicU64,
    /// Offset one past the last byte of the pass before the current one.
    wrap_end: AtomicUsize,
    /// Newest position mirrored into the region header.
    published: AtomicU64,
}

impl LogCategory {
    fn new(desc: CategoryDescriptor) -> Self {
        Self {
            desc,
            enabled: AtomicBool::new(desc.enabled_at_init),
            last_toggle: AtomicU64::new(0),
            head: None,
            allocation: 0,
            position: AtomicU64::new(0),
            wrap_end: AtomicUsize::new(0),
            published: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.desc.name
    }

    pub fn kind(&self) -> CategoryKind {
        self.desc.kind
    }

    pub fn persist(&self) -> bool {
        self.desc.persist
    }

    pub fn enabled_at_init(&self) -> bool {
        self.desc.enabled_at_init
    }

    /// Bytes assigned to this category (0 when not laid out).
    pub fn capacity(&self) -> usize {
        self.allocation
    }

    #[inline(always)]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Offset of the head from the region base.
    pub fn head_offset(&self) -> Option<usize> {
        self.head
    }

    /// Current write offset relative to the head.
    pub fn cursor(&self) -> usize {
        offset_of(self.position.load(Ordering::Relaxed))
    }

    /// Whether a write ever restarted at the head.
    pub fn has_wrapped(&self) -> bool {
        lap_of(self.position.load(Ordering::Relaxed)) != 0
    }

    /// Offset where the text stopped before the most recent wrap.
    pub fn wrap_end(&self) -> usize {
        self.wrap_end.load(Ordering::Acquire)
    }

    pub fn last_toggle(&self) -> u64 {
        self.last_toggle.load(Ordering::Relaxed)
    }

    fn set_enabled(&self, enabled: bool, now: u64) {
        self.enabled.store(enabled, Ordering::Relaxed);
        self.last_toggle.store(now, Ordering::Relaxed);
    }

    /// Bytes usable for text; the wrap trailer is kept out of reach.
    fn text_limit(&self) -> usize {
        match self.desc.kind {
            CategoryKind::ResumableText => self.allocation.saturating_sub(WRAP_TRAILER_SIZE),
            _ => self.allocation,
        }
    }

    fn trailer(&self, head: usize) -> usize {
        head + self.allocation - WRAP_TRAILER_SIZE
    }

    /// Append `bytes`, restarting at the head if they do not fit.
    ///
    /// Records longer than the category are truncated. Returns the cursor
    /// after this write, or `None` if nothing was written.
    pub(crate) fn append(&self, region: &MemoryRegion, bytes: &[u8]) -> Option<usize> {
        self.write(region, bytes).map(offset_of)
    }

    /// Append `bytes`, then store the physical address one past them in the
    /// header word at `slot`.
    ///
    /// The word only ever moves forward in write order: a writer that
    /// finishes after a later one leaves the later address in place.
    pub(crate) fn append_published(
        &self,
        region: &MemoryRegion,
        bytes: &[u8],
        slot: usize,
    ) -> Option<usize> {
        let position = self.write(region, bytes)?;
        self.publish(region, slot, position);
        Some(offset_of(position))
    }

    /// Reserve and fill a range, returning the packed position after it.
    pub(crate) fn write(&self, region: &MemoryRegion, bytes: &[u8]) -> Option<u64> {
        let head = self.head?;
        let limit = self.text_limit();
        if bytes.is_empty() || limit < 2 {
            return None;
        }
        let len = bytes.len().min(limit - 1);

        let mut current = self.position.load(Ordering::Relaxed);
        loop {
            let (lap, cur) = (lap_of(current), offset_of(current));
            let wraps = cur + len >= limit;
            let next = if wraps {
                // Pass 0 is reserved for "never wrapped".
                pack(lap.wrapping_add(1).max(1), len)
            } else {
                pack(lap, cur + len)
            };
            match self.position.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    let start = offset_of(next) - len;
                    if wraps {
                        self.mark_wrapped(region, head, cur);
                    }
                    region.copy_in(head + start, &bytes[..len]);
                    return Some(next);
                }
                Err(actual) => current = actual,
            }
        }
    }

    fn mark_wrapped(&self, region: &MemoryRegion, head: usize, end: usize) {
        self.wrap_end.store(end, Ordering::Release);
        if self.desc.kind == CategoryKind::ResumableText {
            let trailer = self.trailer(head);
            region.write_u64(trailer + WRAP_END_OFFSET, end as u64);
            region.write_u64(trailer + WRAP_MAGIC_OFFSET, WRAP_MAGIC);
        }
    }

    /// Advance the header word at `slot` to `position` unless a later write
    /// already got there.
    pub(crate) fn publish(&self, region: &MemoryRegion, slot: usize, position: u64) {
        let Some(head) = self.head else { return };
        let mut seen = self.published.load(Ordering::SeqCst);
        while seen < position {
            match self.published.compare_exchange_weak(
                seen,
                position,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(actual) => seen = actual,
            }
        }

        // Rewrite until the stored address matches the newest position, so
        // the last store to the word always carries the latest write.
        let word = region.atomic_u64(slot);
        loop {
            let newest = self.published.load(Ordering::SeqCst);
            word.store(
                region.physical_base() + (head + offset_of(newest)) as u64,
                Ordering::SeqCst,
            );
            if self.published.load(Ordering::SeqCst) == newest {
                break;
            }
        }
    }

    /// Copy the text written so far into `out`, oldest byte first.
    ///
    /// After a wrap that is the tail of the previous pass, from the cursor up
    /// to where that pass stopped, followed by the current pass. Returns the
    /// number of bytes copied; stops early if `out` is full.
    pub fn read_text(&self, region: &MemoryRegion, out: &mut [u8]) -> usize {
        let Some(head) = self.head else { return 0 };
        if !matches!(self.desc.kind, CategoryKind::Text | CategoryKind::ResumableText) {
            return 0;
        }
        let position = self.position.load(Ordering::Acquire);
        let cursor = offset_of(position);
        let mut copied = 0;
        let mut copy = |from: usize, to: usize, copied: &mut usize| {
            let n = to.saturating_sub(from).min(out.len() - *copied);
            region.copy_out(head + from, &mut out[*copied..*copied + n]);
            *copied += n;
        };
        if lap_of(position) != 0 {
            copy(cursor, self.wrap_end().min(self.text_limit()), &mut copied);
        }
        copy(0, cursor, &mut copied);
        copied
    }

    /// Zero the category and rewind its cursor.
    pub(crate) fn reset(&self, region: &MemoryRegion) {
        if let Some(head) = self.head {
            region.zero(head, self.allocation);
        }
        self.position.store(0, Ordering::Relaxed);
        self.wrap_end.store(0, Ordering::Relaxed);
        self.published.store(0, Ordering::Relaxed);
    }

    /// Continue a previous session's stream at `cursor`.
    ///
    /// Returns `false`, leaving the category untouched, if `cursor` is not a
    /// valid write position.
    pub(crate) fn resume(&self, region: &MemoryRegion, cursor: usize) -> bool {
        let Some(head) = self.head else { return false };
        let limit = self.text_limit();
        if cursor >= limit {
            return false;
        }
        let mut lap = 0;
        let mut wrap_end = 0;
        if self.desc.kind == CategoryKind::ResumableText {
            let trailer = self.trailer(head);
            if region.read_u64(trailer + WRAP_MAGIC_OFFSET) == WRAP_MAGIC {
                lap = 1;
                wrap_end = (region.read_u64(trailer + WRAP_END_OFFSET) as usize).min(limit);
            }
        }
        let position = pack(lap, cursor);
        self.wrap_end.store(wrap_end, Ordering::Relaxed);
        self.position.store(position, Ordering::Relaxed);
        self.published.store(position, Ordering::Relaxed);
        true
    }
}

// =============================================================================
// CategoryRegistry
// =============================================================================

/// All categories plus the engine-wide ("base") switch.
///
/// # Thread Safety
///
/// Layout happens once, through `&mut self`, before the registry is shared.
/// After that only the enable flags and the text cursors change, all of
/// them atomics, so lookups and switches work from any core.
pub struct CategoryRegistry {
    /// In declared order; the primary category is first.
    categories: Vec<LogCategory>,

    /// Engine-wide switch, named [`BASE_NAME`].
    base_enabled: AtomicBool,

    /// Time the engine-wide switch last changed.
    base_toggle: AtomicU64,

    /// Where the region starts, for address queries. Zero until laid out.
    physical_base: u64,
    virtual_base: usize,
}

impl CategoryRegistry {
    /// Build the registry. The engine-wide switch starts off.
    pub fn new(descriptors: &[CategoryDescriptor]) -> Self {
        Self {
            categories: descriptors.iter().copied().map(LogCategory::new).collect(),
            base_enabled: AtomicBool::new(false),
            base_toggle: AtomicU64::new(0),
            physical_base: 0,
            virtual_base: 0,
        }
    }

    /// Bytes the region must have for this registry's layout.
    ///
    /// The primary category is always present. When it is not enabled at
    /// init it still gets [`HEADER_ALLOC_SIZE`] bytes for the header.
    pub fn required_size(&self) -> usize {
        self.categories
            .iter()
            .enumerate()
            .map(|(i, c)| Self::allocation_for(i, c))
            .sum()
    }

    fn allocation_for(index: usize, category: &LogCategory) -> usize {
        match (index, category.enabled_at_init()) {
            (0, true) => category.desc.capacity,
            (0, false) => HEADER_ALLOC_SIZE,
            (_, true) => category.desc.capacity,
            (_, false) => 0,
        }
    }

    /// Offset and allocation of every laid-out category, in layout order.
    fn plan(&self) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        let mut next = 0;
        self.categories
            .iter()
            .enumerate()
            .filter_map(move |(i, category)| {
                let size = Self::allocation_for(i, category);
                if size == 0 {
                    return None;
                }
                let head = next;
                next += size;
                Some((i, head, size))
            })
    }

    /// Where `name` will be placed, as (offset from region base, bytes),
    /// whether or not addresses were assigned yet.
    pub fn planned_placement(&self, name: &str) -> Option<(usize, usize)> {
        self.plan()
            .find(|&(i, _, _)| self.categories[i].desc.name == name)
            .map(|(_, head, size)| (head, size))
    }

    /// Give every laid-out category its contiguous slice of `region`.
    ///
    /// Must run once, before the registry is shared.
    pub fn assign_addresses(&mut self, region: &MemoryRegion) {
        self.physical_base = region.physical_base();
        self.virtual_base = region.virtual_base();
        let plan: Vec<_> = self.plan().collect();
        for (i, head, size) in plan {
            let category = &mut self.categories[i];
            category.head = Some(head);
            category.allocation = size;
        }
        debug_assert!(self.required_size() <= region.total_size());
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogCategory> {
        self.categories.iter()
    }

    pub fn get(&self, name: &str) -> Option<&LogCategory> {
        self.categories.iter().find(|c| c.desc.name == name)
    }

    /// The category holding the header and the event arenas.
    pub fn primary(&self) -> Option<&LogCategory> {
        self.categories.first()
    }

    /// The category whose write position survives a warm reboot.
    pub fn resumable(&self) -> Option<&LogCategory> {
        self.categories
            .iter()
            .find(|c| c.kind() == CategoryKind::ResumableText)
    }

    #[inline(always)]
    pub fn base_enabled(&self) -> bool {
        self.base_enabled.load(Ordering::Relaxed)
    }

    /// Turn `name` (or the whole engine, for `"base"`) on or off.
    pub fn set_enabled(&self, name: &str, enabled: bool, now: u64) -> Result<()> {
        if name == BASE_NAME {
            self.base_enabled.store(enabled, Ordering::Relaxed);
            self.base_toggle.store(now, Ordering::Relaxed);
        } else {
            self.get(name)
                .ok_or(SnapshotError::UnknownCategory)?
                .set_enabled(enabled, now);
        }
        log::info!("{} is {}", name, if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    /// Runtime flag of `name`, or its enabled-at-init flag when `init`.
    pub fn get_enabled(&self, name: &str, init: bool) -> EnableState {
        if name == BASE_NAME {
            return self.base_enabled().into();
        }
        match self.get(name) {
            Some(c) if init => c.enabled_at_init().into(),
            Some(c) => c.is_enabled().into(),
            None => EnableState::Unknown,
        }
    }

    /// Re-enable `name` if it has been off for at least `duration`.
    pub fn try_enable_after_quiet(
        &self,
        name: &str,
        duration: u64,
        now: u64,
    ) -> Result<TryEnableStatus> {
        if !self.base_enabled() {
            return Err(SnapshotError::EngineDisabled);
        }
        let category = self.get(name).ok_or(SnapshotError::UnknownCategory)?;
        if category.is_enabled() {
            return Ok(TryEnableStatus::AlreadyEnabled);
        }
        let quiet = now.saturating_sub(category.last_toggle());
        if quiet >= duration {
            category.set_enabled(true, now);
            log::info!("{} re-armed after {} ns", name, quiet);
            Ok(TryEnableStatus::Rearmed)
        } else {
            Ok(TryEnableStatus::StillQuiet)
        }
    }

    /// Bytes assigned to `name`.
    pub fn category_size(&self, name: &str) -> Option<usize> {
        self.get(name).map(LogCategory::capacity)
    }

    /// Physical address of the head of `name`.
    pub fn category_paddr(&self, name: &str) -> Option<u64> {
        let head = self.get(name)?.head?;
        Some(self.physical_base + head as u64)
    }

    /// Virtual address of the head of `name`.
    pub fn category_vaddr(&self, name: &str) -> Option<usize> {
        let head = self.get(name)?.head?;
        Some(self.virtual_base + head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_CATEGORIES;
    use crate::region::{offset, MemoryBank};

    const BASE: u64 = 0x8000_0000;

    fn small() -> [CategoryDescriptor; 4] {
        [
            CategoryDescriptor::new("log_kevents", 0x8000, CategoryKind::Events),
            CategoryDescriptor::new("log_kernel", 0x100, CategoryKind::ResumableText),
            CategoryDescriptor::new("log_sfr", 0x1000, CategoryKind::Raw).disabled_at_init(),
            CategoryDescriptor::new("log_platform", 0x80, CategoryKind::Text),
        ]
    }

    fn laid_out(bank: &MemoryBank) -> (CategoryRegistry, MemoryRegion) {
        let mut registry = CategoryRegistry::new(&small());
        let region =
            MemoryRegion::reserve(bank, BASE, registry.required_size()).expect("reserve");
        registry.assign_addresses(&region);
        (registry, region)
    }

    #[test]
    fn addresses_are_contiguous_and_skip_disabled() {
        let bank = MemoryBank::new(BASE, 0x10000);
        let (registry, _region) = laid_out(&bank);
        assert_eq!(registry.required_size(), 0x8000 + 0x100 + 0x80);
        assert_eq!(registry.category_paddr("log_kevents"), Some(BASE));
        assert_eq!(registry.category_paddr("log_kernel"), Some(BASE + 0x8000));
        assert_eq!(registry.category_paddr("log_sfr"), None);
        assert_eq!(registry.category_paddr("log_platform"), Some(BASE + 0x8100));
        assert_eq!(registry.category_size("log_sfr"), Some(0));
        assert_eq!(registry.category_size("nope"), None);
        assert_eq!(registry.planned_placement("log_kernel"), Some((0x8000, 0x100)));
        assert_eq!(registry.planned_placement("log_sfr"), None);
    }

    #[test]
    fn primary_without_events_keeps_header_allocation() {
        let mut descs = DEFAULT_CATEGORIES;
        descs[0] = descs[0].disabled_at_init();
        let registry = CategoryRegistry::new(&descs);
        let others: usize = descs[1..].iter().map(|d| d.capacity).sum();
        assert_eq!(registry.required_size(), HEADER_ALLOC_SIZE + others);
    }

    #[test]
    fn enable_flags_are_tri_state() {
        let bank = MemoryBank::new(BASE, 0x10000);
        let (registry, _region) = laid_out(&bank);
        assert_eq!(registry.get_enabled("base", false), EnableState::Disabled);
        registry.set_enabled("base", true, 5).expect("base");
        assert_eq!(registry.get_enabled("base", true), EnableState::Enabled);

        registry.set_enabled("log_kernel", false, 10).expect("known");
        assert_eq!(registry.get_enabled("log_kernel", false), EnableState::Disabled);
        assert_eq!(registry.get_enabled("log_kernel", true), EnableState::Enabled);
        assert_eq!(registry.get_enabled("log_sfr", true), EnableState::Disabled);
        assert_eq!(registry.get_enabled("log_k", false), EnableState::Unknown);
        assert_eq!(
            registry.set_enabled("log_k", true, 0),
            Err(SnapshotError::UnknownCategory)
        );
    }

    #[test]
    fn quiet_period_gates_rearm() {
        let bank = MemoryBank::new(BASE, 0x10000);
        let (registry, _region) = laid_out(&bank);
        assert_eq!(
            registry.try_enable_after_quiet("log_kernel", 100, 0),
            Err(SnapshotError::EngineDisabled)
        );
        registry.set_enabled("base", true, 0).expect("base");
        assert_eq!(
            registry.try_enable_after_quiet("log_kernel", 100, 0),
            Ok(TryEnableStatus::AlreadyEnabled)
        );
        registry.set_enabled("log_kernel", false, 1_000).expect("known");
        assert_eq!(
            registry.try_enable_after_quiet("log_kernel", 100, 1_099),
            Ok(TryEnableStatus::StillQuiet)
        );
        assert_eq!(
            registry.try_enable_after_quiet("log_kernel", 100, 1_100),
            Ok(TryEnableStatus::Rearmed)
        );
        assert_eq!(registry.get_enabled("log_kernel", false), EnableState::Enabled);
    }

    #[test]
    fn append_wraps_and_keeps_cursor_in_range() {
        let bank = MemoryBank::new(BASE, 0x10000);
        let (registry, region) = laid_out(&bank);
        let text = registry.get("log_platform").expect("present");
        let line = [b'x'; 30];
        for _ in 0..10 {
            let cursor = text.append(&region, &line).expect("written");
            assert!(cursor < text.capacity(), "cursor {} escaped", cursor);
        }
        assert!(text.has_wrapped());

        let huge = [b'y'; 0x200];
        assert_eq!(text.append(&region, &huge), Some(0x7f));
        assert_eq!(text.append(&region, &[]), None);
    }

    #[test]
    fn resumable_text_marks_wraps() {
        let bank = MemoryBank::new(BASE, 0x10000);
        let (registry, region) = laid_out(&bank);
        let kernel = registry.get("log_kernel").expect("present");
        let head = kernel.head_offset().expect("laid out");
        kernel.append(&region, &[b'a'; 0xe0]).expect("written");
        assert_eq!(region.read_u64(head + 0xf8), 0);
        kernel.append(&region, &[b'b'; 0x10]).expect("written");
        assert_eq!(region.read_u64(head + 0xf0), 0xe0);
        assert_eq!(region.read_u64(head + 0xf8), WRAP_MAGIC);
        assert_eq!(kernel.cursor(), 0x10);
        assert_eq!(kernel.wrap_end(), 0xe0);

        let mut out = [0u8; 0x100];
        let n = kernel.read_text(&region, &mut out);
        assert_eq!(n, 0xe0);
        assert!(out[..0xd0].iter().all(|&b| b == b'a'));
        assert!(out[0xd0..n].iter().all(|&b| b == b'b'));
    }

    #[test]
    fn read_text_after_wrap_skips_unwritten_tail() {
        let bank = MemoryBank::new(BASE, 0x10000);
        let (registry, region) = laid_out(&bank);
        let text = registry.get("log_platform").expect("present");
        let lines: [&[u8; 30]; 5] = [&[b'a'; 30], &[b'b'; 30], &[b'c'; 30], &[b'd'; 30], &[b'e'; 30]];
        for line in lines {
            text.append(&region, line).expect("written");
        }
        assert_eq!(text.cursor(), 30);
        assert_eq!(text.wrap_end(), 120);

        let mut out = [0u8; 0x80];
        let n = text.read_text(&region, &mut out);
        let expected: std::vec::Vec<u8> = lines[1..].iter().flat_map(|l| l.iter().copied()).collect();
        assert_eq!(&out[..n], &expected[..]);
    }

    #[test]
    fn published_pointer_never_moves_back() {
        let bank = MemoryBank::new(BASE, 0x10000);
        let (registry, region) = laid_out(&bank);
        let kernel = registry.get("log_kernel").expect("present");
        let head = BASE + kernel.head_offset().expect("laid out") as u64;
        let slot = offset::LAST_KERNEL_LOG;

        let early = kernel.write(&region, b"early ").expect("written");
        let late = kernel.write(&region, b"late ").expect("written");
        kernel.publish(&region, slot, late);
        kernel.publish(&region, slot, early);
        assert_eq!(region.read_u64(slot), head + 11);

        // A write that restarts at the head is newer than anything before it.
        kernel.write(&region, &[b'x'; 0xd8]).expect("written");
        let wrapped = kernel.write(&region, &[b'y'; 0x10]).expect("written");
        assert!(kernel.has_wrapped());
        kernel.publish(&region, slot, wrapped);
        kernel.publish(&region, slot, late);
        assert_eq!(region.read_u64(slot), head + 0x10);

        assert_eq!(kernel.append_published(&region, b"z", slot), Some(0x11));
        assert_eq!(region.read_u64(slot), head + 0x11);
    }

    #[test]
    fn read_text_is_chronological() {
        let bank = MemoryBank::new(BASE, 0x10000);
        let (registry, region) = laid_out(&bank);
        let text = registry.get("log_platform").expect("present");
        text.append(&region, b"hello ").expect("written");
        text.append(&region, b"world").expect("written");
        let mut out = [0u8; 0x80];
        let n = text.read_text(&region, &mut out);
        assert_eq!(&out[..n], b"hello world");
    }

    #[test]
    fn resume_validates_cursor() {
        let bank = MemoryBank::new(BASE, 0x10000);
        let (registry, region) = laid_out(&bank);
        let kernel = registry.get("log_kernel").expect("present");
        assert!(!kernel.resume(&region, 0xf8));
        assert!(kernel.resume(&region, 0x40));
        assert_eq!(kernel.cursor(), 0x40);
        kernel.reset(&region);
        assert_eq!(kernel.cursor(), 0);
    }
}

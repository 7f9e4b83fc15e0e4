//! Boot milestone store.
//!
//! Userspace marks boot progress with lines starting `!@Boot`. They are
//! kept here with the kernel time they arrived at so boot timing can be
//! read without parsing the whole platform log.

use crate::platform::name_str;

/// Milestones kept; later ones are dropped.
pub const BOOT_MILESTONES_MAX: usize = 64;

/// Bytes of milestone text kept, terminator included.
pub const BOOT_MILESTONE_LEN: usize = 64;

/// One `!@Boot` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootMilestone {
    pub time: u64,
    pub text: [u8; BOOT_MILESTONE_LEN],
}

impl BootMilestone {
    pub const EMPTY: Self = Self {
        time: 0,
        text: [0; BOOT_MILESTONE_LEN],
    };

    pub fn text(&self) -> &str {
        name_str(&self.text)
    }
}

pub(super) struct BootStat {
    entries: [BootMilestone; BOOT_MILESTONES_MAX],
    len: usize,
}

impl BootStat {
    pub(super) const fn new() -> Self {
        Self {
            entries: [BootMilestone::EMPTY; BOOT_MILESTONES_MAX],
            len: 0,
        }
    }

    /// Store `line` (up to its first NUL) taken at `time`.
    pub(super) fn add(&mut self, time: u64, line: &[u8]) -> bool {
        let Some(slot) = self.entries.get_mut(self.len) else {
            return false;
        };
        let end = line.iter().position(|&b| b == 0).unwrap_or(line.len());
        let n = end.min(BOOT_MILESTONE_LEN - 1);
        slot.time = time;
        slot.text = [0; BOOT_MILESTONE_LEN];
        slot.text[..n].copy_from_slice(&line[..n]);
        self.len += 1;
        true
    }

    pub(super) fn as_slice(&self) -> &[BootMilestone] {
        &self.entries[..self.len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_first_milestones_only() {
        let mut stat = BootStat::new();
        for i in 0..BOOT_MILESTONES_MAX as u64 {
            assert!(stat.add(i, b"!@Boot: step\0garbage"));
        }
        assert!(!stat.add(999, b"!@Boot: late"));
        assert_eq!(stat.as_slice().len(), BOOT_MILESTONES_MAX);
        assert_eq!(stat.as_slice()[3].time, 3);
        assert_eq!(stat.as_slice()[3].text(), "!@Boot: step");
    }

    #[test]
    fn long_lines_are_cut() {
        let mut stat = BootStat::new();
        stat.add(1, &[b'x'; 200]);
        assert_eq!(stat.as_slice()[0].text().len(), BOOT_MILESTONE_LEN - 1);
    }
}

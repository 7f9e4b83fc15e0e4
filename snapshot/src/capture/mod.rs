//! Capture of the userspace log stream.
//!
//! A userspace logger writes each log entry as a short sequence of records.
//! The record's length alone tells what it is:
//!
//! | length | record                                              |
//! |--------|-----------------------------------------------------|
//! | 7      | transport header: magic `'l'`, len, uid, pid        |
//! | 11     | log header: stream id, tid, tv_sec, tv_nsec         |
//! | 1      | priority (text streams) or value type (event stream)|
//! | other  | payload                                             |
//!
//! Fields from the headers are kept in a small decode state between calls.
//! The state spans several calls, so it sits behind a spin lock; the lock is
//! held only while one record is decoded and its text appended.

pub mod bootstat;
pub mod event_log;
pub mod header;

use spin::Mutex;

use self::bootstat::{BootMilestone, BootStat};
use self::event_log::NO_MARKER;
use self::header::HeaderFields;
use crate::platform::{name_str, Platform};
use crate::text::FixedWriter;

/// Stream ids carried by the log header.
pub mod log_id {
    pub const MAIN: u8 = 0;
    pub const RADIO: u8 = 1;
    pub const EVENTS: u8 = 2;
    pub const SYSTEM: u8 = 3;
    pub const CRASH: u8 = 4;
    pub const KERNEL: u8 = 5;

    /// Ids above this are not headers; the record is treated as text.
    pub const MAX: u8 = 7;
}

pub const PMSG_MAGIC: u8 = b'l';
pub const PMSG_HEADER_LEN: usize = 7;
pub const LOG_HEADER_LEN: usize = 11;

/// A text record of this length whose last byte is not NUL is dropped.
const SKIP_COUNT: usize = 4;

/// Priority characters indexed by priority value.
const PRIO_CHARS: &[u8] = b"!.VDIWEFS";

/// Largest rendered event line.
const EVENT_LINE_MAX: usize = 256;

/// Prefix of lines mirrored to the kernel log.
const MIRROR_PREFIX: &[u8] = b"!@";

/// Prefix of boot milestone lines.
const BOOT_PREFIX: &[u8] = b"!@Boot";

struct CaptureState {
    len: u16,
    uid: u16,
    header: HeaderFields,
    stream_id: u8,
    /// Pending value type on the event stream.
    marker: u8,
    boot: BootStat,
}

/// Decoder for the userspace log stream.
pub struct ByteStreamCapture {
    state: Mutex<CaptureState>,
}

impl ByteStreamCapture {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(CaptureState {
                len: 0,
                uid: 0,
                header: HeaderFields {
                    tv_sec: 0,
                    tv_nsec: 0,
                    pid: 0,
                    tid: 0,
                },
                stream_id: log_id::MAIN,
                marker: NO_MARKER,
                boot: BootStat::new(),
            }),
        }
    }

    /// Decode one record, passing any text it produces to `sink`.
    pub fn ingest(&self, record: &[u8], platform: &dyn Platform, sink: &mut dyn FnMut(&[u8])) {
        let mut state = self.state.lock();
        match record.len() {
            0 => {}
            PMSG_HEADER_LEN if record[0] == PMSG_MAGIC => {
                state.len = u16::from_le_bytes([record[1], record[2]]);
                state.uid = u16::from_le_bytes([record[3], record[4]]);
                state.header.pid = u16::from_le_bytes([record[5], record[6]]);
            }
            LOG_HEADER_LEN => {
                state.stream_id = record[0];
                state.header.tid = u16::from_le_bytes([record[1], record[2]]);
                state.header.tv_sec =
                    u32::from_le_bytes([record[3], record[4], record[5], record[6]]);
                state.header.tv_nsec =
                    u32::from_le_bytes([record[7], record[8], record[9], record[10]]);
                state.marker = NO_MARKER;
                if state.stream_id > log_id::MAX {
                    state.text(record, platform, sink);
                } else {
                    let mut line = [0u8; 96];
                    sink(header::render(&mut line, &state.header, platform));
                }
            }
            1 => state.prefix(record[0], sink),
            _ => state.text(record, platform, sink),
        }
    }

    /// Copy the boot milestones seen so far into `out`.
    pub fn milestones(&self, out: &mut [BootMilestone]) -> usize {
        let state = self.state.lock();
        let seen = state.boot.as_slice();
        let n = seen.len().min(out.len());
        out[..n].copy_from_slice(&seen[..n]);
        n
    }

    /// Length, uid and pid from the last transport header.
    pub fn transport(&self) -> (u16, u16, u16) {
        let state = self.state.lock();
        (state.len, state.uid, state.header.pid)
    }
}

impl Default for ByteStreamCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureState {
    fn prefix(&mut self, prio: u8, sink: &mut dyn FnMut(&[u8])) {
        self.marker = prio;
        if self.stream_id == log_id::EVENTS {
            return;
        }
        let c = PRIO_CHARS.get(prio as usize).copied().unwrap_or(b'?');
        self.marker = NO_MARKER;
        sink(&[c, b' ']);
    }

    fn text(&mut self, record: &[u8], platform: &dyn Platform, sink: &mut dyn FnMut(&[u8])) {
        if self.stream_id == log_id::EVENTS {
            let mut line = [0u8; EVENT_LINE_MAX];
            let mut out = FixedWriter::new(&mut line);
            event_log::render(record, self.marker, &mut out);
            if !out.is_empty() {
                sink(out.as_bytes());
            }
            self.marker = NO_MARKER;
            return;
        }

        if record.len() == SKIP_COUNT && record[SKIP_COUNT - 1] != 0 {
            return;
        }
        let body = &record[..record.len() - 1];
        sink(body);
        if body.starts_with(MIRROR_PREFIX) {
            log::info!("{}", name_str(body));
            if body.starts_with(BOOT_PREFIX) {
                self.boot.add(platform.local_clock(), body);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{ManualPlatform, TaskInfo};
    use std::vec::Vec;

    struct Harness {
        capture: ByteStreamCapture,
        platform: ManualPlatform,
        out: Vec<u8>,
    }

    impl Harness {
        fn new() -> Self {
            let platform = ManualPlatform::new(1);
            platform.set_task(TaskInfo::new(1, "init"));
            Self {
                capture: ByteStreamCapture::new(),
                platform,
                out: Vec::new(),
            }
        }

        fn feed(&mut self, record: &[u8]) {
            let out = &mut self.out;
            self.capture
                .ingest(record, &self.platform, &mut |bytes| out.extend_from_slice(bytes));
        }

        fn log_header(&mut self, stream: u8) {
            let mut record = [0u8; LOG_HEADER_LEN];
            record[0] = stream;
            self.feed(&record);
            self.out.clear();
        }
    }

    #[test]
    fn transport_header_is_remembered() {
        let mut h = Harness::new();
        h.feed(&[b'l', 0x10, 0, 0xe8, 0x03, 0x39, 0x05]);
        assert_eq!(h.capture.transport(), (16, 1000, 1337));
        assert!(h.out.is_empty());
    }

    #[test]
    fn non_magic_short_record_is_text() {
        let mut h = Harness::new();
        h.log_header(log_id::MAIN);
        h.feed(b"hello!\0");
        assert_eq!(h.out, b"hello!");
    }

    #[test]
    fn priority_prefix_renders_character() {
        let mut h = Harness::new();
        h.log_header(log_id::SYSTEM);
        h.feed(&[4]);
        h.feed(&[42]);
        assert_eq!(h.out, b"I ? ");
    }

    #[test]
    fn event_stream_prefix_is_silent() {
        let mut h = Harness::new();
        h.log_header(log_id::EVENTS);
        h.feed(&[event_log::EVENT_TYPE_INT]);
        assert!(h.out.is_empty());
        h.feed(&42i32.to_le_bytes());
        assert_eq!(h.out, b"42");
    }

    #[test]
    fn short_unterminated_text_is_skipped() {
        let mut h = Harness::new();
        h.log_header(log_id::MAIN);
        h.feed(b"abcd");
        assert!(h.out.is_empty());
        h.feed(b"abc\0");
        assert_eq!(h.out, b"abc");
    }

    #[test]
    fn header_with_large_id_is_text() {
        let mut h = Harness::new();
        let mut record = [b'x'; LOG_HEADER_LEN];
        record[0] = 9;
        h.feed(&record);
        assert_eq!(h.out.len(), LOG_HEADER_LEN - 1);
    }

    #[test]
    fn boot_milestones_are_stored() {
        let mut h = Harness::new();
        h.log_header(log_id::MAIN);
        h.platform.set_time(42_000);
        h.feed(b"!@Boot: start zygote\0");
        h.feed(b"!@other marker\0");
        let mut seen = [BootMilestone::EMPTY; 4];
        assert_eq!(h.capture.milestones(&mut seen), 1);
        assert_eq!(seen[0].text(), "!@Boot: start zygote");
        assert_eq!(seen[0].time, 42_000);
    }
}

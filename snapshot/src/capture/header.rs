//! Rendering of the per-record header line.
//!
//! ```text
//! \n[  123.456789][2:     surfaceflinger] 03-14 15:09:26.535  1234  1240
//! ```
//!
//! Kernel uptime, core and current task come from the platform; the wall
//! clock time, pid and tid come from the producer's headers.

use core::fmt::Write;

use crate::platform::Platform;
use crate::text::FixedWriter;

/// Size of the header render buffer, terminator included. The line is cut
/// to one byte less, which also drops the second trailing space.
pub const HEADER_LINE_SIZE: usize = 68;

/// Broken-down UTC time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CivilTime {
    pub year: i64,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl CivilTime {
    /// Convert seconds since the Unix epoch.
    pub fn from_unix(secs: i64) -> Self {
        let days = secs.div_euclid(86_400);
        let rem = secs.rem_euclid(86_400) as u32;

        // Days-to-civil over 400-year eras, epoch shifted to 0000-03-01.
        let z = days + 719_468;
        let era = z.div_euclid(146_097);
        let doe = z.rem_euclid(146_097);
        let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
        let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
        let mp = (5 * doy + 2) / 153;
        let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
        let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
        let year = yoe + era * 400 + i64::from(month <= 2);

        Self {
            year,
            month,
            day,
            hour: rem / 3_600,
            minute: rem % 3_600 / 60,
            second: rem % 60,
        }
    }
}

/// Producer-side fields of the header line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeaderFields {
    pub tv_sec: u32,
    pub tv_nsec: u32,
    pub pid: u16,
    pub tid: u16,
}

/// Render the header line into `out`, returning the bytes to store.
pub fn render<'a>(
    out: &'a mut [u8; 96],
    fields: &HeaderFields,
    platform: &dyn Platform,
) -> &'a [u8] {
    let uptime = platform.local_clock();
    let cpu = platform.current_cpu();
    let task = platform.current_task();
    let tm = CivilTime::from_unix(i64::from(fields.tv_sec));

    let mut w = FixedWriter::new(out);
    let _ = write!(
        w,
        "\n[{:5}.{:06}][{}:{:>16}] {:02}-{:02} {:02}:{:02}:{:02}.{:03} {:5} {:5}  ",
        uptime / 1_000_000_000,
        uptime % 1_000_000_000 / 1_000,
        cpu,
        task.comm_str(),
        tm.month,
        tm.day,
        tm.hour,
        tm.minute,
        tm.second,
        fields.tv_nsec / 1_000_000,
        fields.pid,
        fields.tid,
    );
    let len = w.len().saturating_sub(1).min(HEADER_LINE_SIZE - 1);
    &out[..len]
}

//! Decoding of tag-encoded binary event records.
//!
//! Payloads on the event stream are either a bare 4-byte tag id or a
//! type-prefixed value:
//!
//! ```text
//! int     : 0x00 | i32 le
//! long    : 0x01 | i64 le
//! string  : 0x02 | u32 le length | bytes
//! list    : 0x03 | u8 count | (type | value) * count
//! float   : 0x04 | f32 le
//! ```
//!
//! The type byte of a single scalar arrives in its own one-byte record
//! before the payload; it is passed in as `marker`.

use core::fmt::Write;

use crate::tags;
use crate::text::FixedWriter;

pub const EVENT_TYPE_INT: u8 = 0;
pub const EVENT_TYPE_LONG: u8 = 1;
pub const EVENT_TYPE_STRING: u8 = 2;
pub const EVENT_TYPE_LIST: u8 = 3;
pub const EVENT_TYPE_FLOAT: u8 = 4;

/// Marker value meaning no type byte is pending.
pub const NO_MARKER: u8 = 0xff;

/// Longest string value rendered.
pub const STRING_MAX: usize = 63;

/// Deepest list nesting rendered.
const LIST_DEPTH_MAX: usize = 4;

fn take<const N: usize>(payload: &[u8]) -> Option<([u8; N], &[u8])> {
    let (head, rest) = payload.split_first_chunk::<N>()?;
    Some((*head, rest))
}

/// Render one value of type `ty`, returning the bytes after it.
///
/// Returns `None` when the payload is too short or the type unknown; any
/// text rendered so far stays in `out`.
fn render_value<'a>(ty: u8, payload: &'a [u8], out: &mut FixedWriter<'_>, depth: usize) -> Option<&'a [u8]> {
    match ty {
        EVENT_TYPE_INT => {
            let (raw, rest) = take::<4>(payload)?;
            let _ = write!(out, "{}", i32::from_le_bytes(raw));
            Some(rest)
        }
        EVENT_TYPE_LONG => {
            let (raw, rest) = take::<8>(payload)?;
            let _ = write!(out, "{}", i64::from_le_bytes(raw));
            Some(rest)
        }
        EVENT_TYPE_FLOAT => {
            let (raw, rest) = take::<4>(payload)?;
            let _ = write!(out, "{}", f32::from_le_bytes(raw));
            Some(rest)
        }
        EVENT_TYPE_STRING => {
            let (raw, rest) = take::<4>(payload)?;
            let len = (u32::from_le_bytes(raw) as usize).min(rest.len());
            out.push_bytes(&rest[..len.min(STRING_MAX)]);
            Some(&rest[len..])
        }
        EVENT_TYPE_LIST if depth < LIST_DEPTH_MAX => {
            let (&count, mut rest) = payload.split_first()?;
            out.push(b'[');
            for _ in 0..count {
                let (&item_ty, item) = rest.split_first()?;
                rest = render_value(item_ty, item, out, depth + 1)?;
                out.push(b':');
            }
            out.push(b']');
            Some(rest)
        }
        _ => None,
    }
}

/// Render an event-stream text payload into `out`.
///
/// A pending scalar `marker` wins over tag lookup, so a 4-byte int payload
/// is printed as a number even when it collides with a known tag id.
pub fn render(payload: &[u8], marker: u8, out: &mut FixedWriter<'_>) {
    match marker {
        EVENT_TYPE_INT | EVENT_TYPE_LONG | EVENT_TYPE_FLOAT => {
            let _ = render_value(marker, payload, out, 0);
            return;
        }
        _ => {}
    }

    if let Ok(raw) = <[u8; 4]>::try_from(payload) {
        if let Some(name) = tags::lookup(u32::from_le_bytes(raw)) {
            let _ = write!(out, "# {} ", name);
            return;
        }
    }

    // Anything longer carries its own type byte.
    if payload.len() > 4 {
        let _ = render_value(payload[0], &payload[1..], out, 0);
    }
}

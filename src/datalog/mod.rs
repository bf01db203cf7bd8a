//! Circular datalog: typed records in retained memory, formatted lazily.
//!
//! ```text
//!   append ──> GroupBuilder ──finalize──> Ring ──format_next──> JSON
//!                 (open)                (committed)             text
//! ```
//!
//! The log stores encoded records, never text; groups are rendered to
//! JSON only when the upload session asks for them, and expired only
//! when the broker acknowledges delivery (or under write pressure).

pub mod record;
pub mod ring;

use core::fmt::{self, Write};

use log::debug;

pub use record::{GroupBuilder, Record, RecordKind};
pub use ring::{Ring, MAX_FRAME, RING_CAPACITY};

// ── Read cursor ───────────────────────────────────────────────

/// Walks the committed groups oldest-to-newest.  Only ever moves
/// forward, so concurrent expiry of already-visited groups is safe.
#[derive(Debug, Clone, Copy)]
pub struct ReadCursor {
    pos: u16,
}

// ── Format outcome ────────────────────────────────────────────

/// Result of formatting one group.  A too-small output buffer is its own
/// variant rather than an error: the cursor has already skipped the
/// group and the caller decides what delivery-wise that means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatOutcome {
    /// One group rendered; `0..len` of the output buffer is valid JSON.
    Group(usize),
    /// The group exists but did not fit the output buffer.  The cursor
    /// has moved past it.
    BufferTooSmall,
    /// No groups remain after the cursor.
    Exhausted,
}

// ── Datalog controller ────────────────────────────────────────

/// Owns the retained ring for the duration of a wake cycle plus the one
/// open group being built for that cycle.
pub struct Datalog<'r> {
    ring: &'r mut Ring,
    open: GroupBuilder,
    wake_time_us: u64,
}

impl<'r> Datalog<'r> {
    /// Open a fresh group for this cycle.  `wake_time_us` tags the
    /// `"latest"` wake report during formatting.
    pub fn new(ring: &'r mut Ring, wake_time_us: u64) -> Self {
        Self {
            ring,
            open: GroupBuilder::new(),
            wake_time_us,
        }
    }

    /// Add a record to the open group.  An oversized group refuses the
    /// record; it is dropped without error.
    pub fn append(&mut self, record: Record) {
        if !self.open.push(&record) {
            debug!("datalog: group full, dropping {:?} record", record.kind());
        }
    }

    /// Commit the open group to the ring and start a new one.  An empty
    /// cycle still commits its 1-byte frame so the group sequence stays
    /// unbroken.
    pub fn finalize(&mut self) {
        let frame = core::mem::take(&mut self.open).finish();
        self.ring.push_group(&frame);
    }

    /// Discard the oldest committed group.  Called on confirmed delivery.
    pub fn expire_oldest(&mut self) {
        self.ring.expire_oldest();
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn wake_time_us(&self) -> u64 {
        self.wake_time_us
    }

    /// Cursor at the oldest committed group.
    pub fn cursor(&self) -> ReadCursor {
        ReadCursor {
            pos: self.ring.first(),
        }
    }

    /// Render the group under the cursor as a flat JSON object and
    /// advance the cursor.  The cursor advances even on
    /// [`FormatOutcome::BufferTooSmall`] (skip semantics): a group that
    /// cannot be rendered now will not render any better later.
    pub fn format_next(&self, cursor: &mut ReadCursor, out: &mut [u8]) -> FormatOutcome {
        if cursor.pos == self.ring.end() {
            return FormatOutcome::Exhausted;
        }
        let len = self.ring.frame_len_at(cursor.pos);
        let start = cursor.pos;
        cursor.pos = ring::wrap_add(cursor.pos, len);

        let mut frame = [0u8; MAX_FRAME];
        let frame = &mut frame[..usize::from(len)];
        self.ring.read(start, frame);

        let mut w = SliceWriter::new(out);
        let mut body = &frame[1..];
        let mut first = true;
        let mut ok = w.write_char('{').is_ok();
        while ok && !body.is_empty() {
            let Some((record, consumed)) = Record::decode(body) else {
                // Unknown tag means the rest of the frame is garbage;
                // render what decoded cleanly.
                debug!("datalog: undecodable record in group, truncating");
                break;
            };
            body = &body[consumed..];
            if !first {
                ok = w.write_char(',').is_ok();
            }
            first = false;
            ok = ok && record.format(&mut w, self.wake_time_us).is_ok();
        }
        ok = ok && w.write_char('}').is_ok();
        if ok {
            FormatOutcome::Group(w.written())
        } else {
            FormatOutcome::BufferTooSmall
        }
    }
}

// ── Slice writer ──────────────────────────────────────────────

/// `fmt::Write` over a byte slice; errors instead of truncating.
struct SliceWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> SliceWriter<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn written(&self) -> usize {
        self.pos
    }
}

impl Write for SliceWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        let Some(dest) = self.buf.get_mut(self.pos..self.pos + bytes.len()) else {
            return Err(fmt::Error);
        };
        dest.copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }
}

//! Retained-memory circular byte store.
//!
//! A fixed 3600-byte ring addressed by two `u16` cursors.  `first` points
//! at the oldest committed group, `end` one past the newest.  Occupancy
//! uses a signed cursor difference so a full ring is distinguishable from
//! an empty one; when the write position has wrapped behind the read
//! position, one byte of capacity is sacrificed to keep the distinction.
//!
//! The struct is `#[repr(C)]` with no pointers or padding surprises so it
//! can live bit-exact inside the retained low-power region and survive
//! deep sleep.
//!
//! ```text
//!          first                end
//!            v                   v
//!   +--------+----+----+----+----+---------+
//!   |        | g0 | g1 | g2 | g3 |         |
//!   +--------+----+----+----+----+---------+
//!            |<-- committed groups -->|
//! ```
//!
//! Each group frame is `[len:1][payload]` where `len` counts itself, so a
//! frame is at most 255 bytes and expiry needs only the first byte.

/// Ring capacity in bytes.  Sized so roughly two days of readings at the
/// default measure interval survive an unreachable broker.
pub const RING_CAPACITY: usize = 3600;

/// Largest group frame, bounded by the single length byte.
pub const MAX_FRAME: usize = 255;

/// Advance a ring position by `len`, wrapping at capacity.
pub(crate) fn wrap_add(pos: u16, len: u8) -> u16 {
    let next = usize::from(pos) + usize::from(len);
    if next < RING_CAPACITY {
        next as u16
    } else {
        (next - RING_CAPACITY) as u16
    }
}

#[repr(C)]
pub struct Ring {
    first: u16,
    end: u16,
    buf: [u8; RING_CAPACITY],
}

impl Ring {
    /// An empty ring.  `const` so it can initialise a retained static.
    pub const fn new() -> Self {
        Self {
            first: 0,
            end: 0,
            buf: [0; RING_CAPACITY],
        }
    }

    /// Drop all content.  Called on cold boot when the retained region is
    /// garbage.
    pub fn reset(&mut self) {
        self.first = 0;
        self.end = 0;
    }

    /// Free bytes.  Signed cursor difference: non-negative means the data
    /// sits in one run (`capacity - used` free), negative means the write
    /// position has wrapped behind the read position and one byte is
    /// sacrificed.
    pub fn avail(&self) -> usize {
        let used = i32::from(self.end) - i32::from(self.first);
        if used >= 0 {
            RING_CAPACITY - used as usize
        } else {
            (-(used + 1)) as usize
        }
    }

    /// Bytes occupied by committed groups.
    pub fn used(&self) -> usize {
        RING_CAPACITY - self.avail()
    }

    pub fn is_empty(&self) -> bool {
        self.first == self.end
    }

    /// Commit one group frame, evicting oldest groups until it fits.
    /// Commit is what makes a group visible to readers and to expiry.
    pub fn push_group(&mut self, frame: &[u8]) {
        debug_assert!(!frame.is_empty() && frame.len() <= MAX_FRAME);
        debug_assert_eq!(usize::from(frame[0]), frame.len());
        // Never let `end` land exactly on `first`: that state reads as
        // empty and would silently discard the whole committed backlog.
        while self.avail() < frame.len()
            || (!self.is_empty() && wrap_add(self.end, frame.len() as u8) == self.first)
        {
            if self.is_empty() {
                // Frame larger than capacity can never fit; callers cap
                // frames at MAX_FRAME so this is unreachable.
                return;
            }
            self.expire_oldest();
        }
        let dest = usize::from(self.end);
        let seq_space = RING_CAPACITY - dest;
        if frame.len() > seq_space {
            self.buf[dest..].copy_from_slice(&frame[..seq_space]);
            self.buf[..frame.len() - seq_space].copy_from_slice(&frame[seq_space..]);
        } else {
            self.buf[dest..dest + frame.len()].copy_from_slice(frame);
        }
        self.end = wrap_add(self.end, frame.len() as u8);
    }

    /// Discard the oldest group by skipping its length byte.  No-op on an
    /// empty ring.
    pub fn expire_oldest(&mut self) {
        if self.first != self.end {
            self.first = wrap_add(self.first, self.buf[usize::from(self.first)]);
        }
    }

    /// Copy `dest.len()` bytes starting at `pos`, wrapping at capacity.
    /// `pos` must lie inside the committed region.
    pub fn read(&self, pos: u16, dest: &mut [u8]) {
        let src = usize::from(pos);
        let seq_space = RING_CAPACITY - src;
        if dest.len() > seq_space {
            let tail = dest.len() - seq_space;
            dest[..seq_space].copy_from_slice(&self.buf[src..]);
            dest[seq_space..].copy_from_slice(&self.buf[..tail]);
        } else {
            dest.copy_from_slice(&self.buf[src..src + dest.len()]);
        }
    }

    /// Length byte of the group starting at `pos`.
    pub(crate) fn frame_len_at(&self, pos: u16) -> u8 {
        self.buf[usize::from(pos)]
    }

    pub(crate) fn first(&self) -> u16 {
        self.first
    }

    pub(crate) fn end(&self) -> u16 {
        self.end
    }
}

impl Default for Ring {
    fn default() -> Self {
        Self::new()
    }
}

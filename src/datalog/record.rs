//! Typed log records and the open-group builder.
//!
//! Records are a closed sum type: a 1-byte kind tag followed by a
//! fixed-size little-endian payload.  Decoding and formatting are pattern
//! matches over the tag, so every record kind the ring can contain is
//! visible here.
//!
//! A `GroupBuilder` accumulates one wake cycle's records and is committed
//! to the ring as a single immutable frame; nothing is visible to readers
//! until then.

use core::fmt::{self, Write};

use super::ring::MAX_FRAME;

// ── Record kinds ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    /// Wake/sleep time report.
    Wake = 1,
    /// Battery voltage.
    Battery = 2,
    /// BME280 environmental reading.
    Environment = 3,
}

impl RecordKind {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Wake),
            2 => Some(Self::Battery),
            3 => Some(Self::Environment),
            _ => None,
        }
    }

    /// Payload size after the kind byte.
    pub const fn payload_len(self) -> usize {
        match self {
            Self::Wake => 16,
            Self::Battery => 4,
            Self::Environment => 12,
        }
    }
}

// ── Record sum type ───────────────────────────────────────────

/// One datalog entry.  Timestamps are microseconds since cold boot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Record {
    /// When this cycle woke and when the previous cycle went to sleep.
    /// A zero `last_sleep_us` marks a cold boot.
    Wake { wake_time_us: u64, last_sleep_us: u64 },
    Battery { volts: f32 },
    Environment {
        temperature_c: f32,
        pressure_hpa: f32,
        humidity_pct: f32,
    },
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Wake { .. } => RecordKind::Wake,
            Self::Battery { .. } => RecordKind::Battery,
            Self::Environment { .. } => RecordKind::Environment,
        }
    }

    /// Encoded size: kind byte plus payload.
    pub fn encoded_len(&self) -> usize {
        1 + self.kind().payload_len()
    }

    /// Append the encoded record to `out`.  Returns `false` (leaving
    /// `out` untouched) when there is no room.
    pub fn encode_into(&self, out: &mut heapless::Vec<u8, MAX_FRAME>) -> bool {
        if out.len() + self.encoded_len() > out.capacity() {
            return false;
        }
        // Capacity checked above; pushes cannot fail.
        let _ = out.push(self.kind() as u8);
        match self {
            Self::Wake {
                wake_time_us,
                last_sleep_us,
            } => {
                let _ = out.extend_from_slice(&wake_time_us.to_le_bytes());
                let _ = out.extend_from_slice(&last_sleep_us.to_le_bytes());
            }
            Self::Battery { volts } => {
                let _ = out.extend_from_slice(&volts.to_le_bytes());
            }
            Self::Environment {
                temperature_c,
                pressure_hpa,
                humidity_pct,
            } => {
                let _ = out.extend_from_slice(&temperature_c.to_le_bytes());
                let _ = out.extend_from_slice(&pressure_hpa.to_le_bytes());
                let _ = out.extend_from_slice(&humidity_pct.to_le_bytes());
            }
        }
        true
    }

    /// Decode one record from the front of `bytes`.  Returns the record
    /// and the number of bytes consumed, or `None` on an unknown tag or
    /// truncated payload.
    pub fn decode(bytes: &[u8]) -> Option<(Self, usize)> {
        let (&tag, rest) = bytes.split_first()?;
        let kind = RecordKind::from_u8(tag)?;
        let payload = rest.get(..kind.payload_len())?;
        let record = match kind {
            RecordKind::Wake => Self::Wake {
                wake_time_us: u64::from_le_bytes(payload[..8].try_into().ok()?),
                last_sleep_us: u64::from_le_bytes(payload[8..16].try_into().ok()?),
            },
            RecordKind::Battery => Self::Battery {
                volts: f32::from_le_bytes(payload.try_into().ok()?),
            },
            RecordKind::Environment => Self::Environment {
                temperature_c: f32::from_le_bytes(payload[..4].try_into().ok()?),
                pressure_hpa: f32::from_le_bytes(payload[4..8].try_into().ok()?),
                humidity_pct: f32::from_le_bytes(payload[8..12].try_into().ok()?),
            },
        };
        Some((record, 1 + kind.payload_len()))
    }

    /// Write this record's JSON fragment (no surrounding braces).
    /// `latest_wake_us` is the current cycle's wake time; the wake report
    /// matching it is tagged `"latest":1` so the server can spot the most
    /// recent entry in a backlog.
    pub fn format<W: Write>(&self, w: &mut W, latest_wake_us: u64) -> fmt::Result {
        match self {
            Self::Wake {
                wake_time_us,
                last_sleep_us,
            } => {
                if *last_sleep_us == 0 {
                    write!(w, "\"boot_time\":{wake_time_us}")?;
                } else {
                    write!(
                        w,
                        "\"wake_time\":{wake_time_us},\"last_sleep_time\":{last_sleep_us}"
                    )?;
                }
                if *wake_time_us == latest_wake_us {
                    write!(w, ",\"latest\":1")?;
                }
                Ok(())
            }
            Self::Battery { volts } => write!(w, "\"battery\":{volts:.3}"),
            Self::Environment {
                temperature_c,
                pressure_hpa,
                humidity_pct,
            } => write!(
                w,
                "\"temperature\":{temperature_c:.2},\"pressure\":{pressure_hpa:.1},\"humidity\":{humidity_pct:.1}"
            ),
        }
    }
}

// ── Group builder ─────────────────────────────────────────────

/// Accumulates one wake cycle's records into a frame.
///
/// The first byte is the frame length (counting itself), patched in by
/// [`GroupBuilder::finish`].  A push that would grow the frame past
/// [`MAX_FRAME`] is refused and leaves the builder unchanged.
pub struct GroupBuilder {
    buf: heapless::Vec<u8, MAX_FRAME>,
}

impl GroupBuilder {
    pub fn new() -> Self {
        let mut buf = heapless::Vec::new();
        // Length placeholder.
        let _ = buf.push(0);
        Self { buf }
    }

    pub fn push(&mut self, record: &Record) -> bool {
        record.encode_into(&mut self.buf)
    }

    /// True when no record has been pushed yet.
    pub fn is_empty(&self) -> bool {
        self.buf.len() == 1
    }

    /// Frame length so far, including the length byte.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Seal the frame: writes the length byte and hands back the bytes.
    pub fn finish(mut self) -> heapless::Vec<u8, MAX_FRAME> {
        self.buf[0] = self.buf.len() as u8;
        self.buf
    }
}

impl Default for GroupBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags_are_stable() {
        assert_eq!(RecordKind::Wake as u8, 1);
        assert_eq!(RecordKind::Battery as u8, 2);
        assert_eq!(RecordKind::Environment as u8, 3);
        assert_eq!(RecordKind::from_u8(4), None);
        assert_eq!(RecordKind::from_u8(0), None);
    }

    #[test]
    fn encode_decode_roundtrip() {
        let records = [
            Record::Wake {
                wake_time_us: 12_345_678,
                last_sleep_us: 12_000_000,
            },
            Record::Battery { volts: 3.7 },
            Record::Environment {
                temperature_c: 21.5,
                pressure_hpa: 1013.25,
                humidity_pct: 44.0,
            },
        ];
        for r in &records {
            let mut buf = heapless::Vec::new();
            assert!(r.encode_into(&mut buf));
            assert_eq!(buf.len(), r.encoded_len());
            let (decoded, consumed) = Record::decode(&buf).unwrap();
            assert_eq!(&decoded, r);
            assert_eq!(consumed, buf.len());
        }
    }

    #[test]
    fn decode_rejects_unknown_tag_and_truncation() {
        assert!(Record::decode(&[]).is_none());
        assert!(Record::decode(&[9, 0, 0, 0, 0]).is_none());
        // Battery tag with only 2 payload bytes.
        assert!(Record::decode(&[2, 0, 0]).is_none());
    }

    #[test]
    fn battery_formats_three_decimals() {
        let r = Record::Battery { volts: 3.7 };
        let mut s = String::new();
        r.format(&mut s, 0).unwrap();
        assert_eq!(s, "\"battery\":3.700");
    }

    #[test]
    fn environment_format_precision() {
        let r = Record::Environment {
            temperature_c: 21.456,
            pressure_hpa: 1013.25,
            humidity_pct: 44.04,
        };
        let mut s = String::new();
        r.format(&mut s, 0).unwrap();
        assert_eq!(s, "\"temperature\":21.46,\"pressure\":1013.2,\"humidity\":44.0");
    }

    #[test]
    fn wake_report_variants() {
        let cold = Record::Wake {
            wake_time_us: 100,
            last_sleep_us: 0,
        };
        let mut s = String::new();
        cold.format(&mut s, 100).unwrap();
        assert_eq!(s, "\"boot_time\":100,\"latest\":1");

        let warm = Record::Wake {
            wake_time_us: 900,
            last_sleep_us: 850,
        };
        let mut s = String::new();
        warm.format(&mut s, 1000).unwrap();
        assert_eq!(s, "\"wake_time\":900,\"last_sleep_time\":850");
    }

    #[test]
    fn builder_starts_with_length_placeholder() {
        let b = GroupBuilder::new();
        assert!(b.is_empty());
        assert_eq!(b.len(), 1);
        let frame = b.finish();
        assert_eq!(frame.as_slice(), &[1]);
    }

    #[test]
    fn builder_frame_layout() {
        let mut b = GroupBuilder::new();
        assert!(b.push(&Record::Battery { volts: 4.1 }));
        let frame = b.finish();
        assert_eq!(frame.len(), 1 + 1 + 4);
        assert_eq!(usize::from(frame[0]), frame.len());
        assert_eq!(frame[1], RecordKind::Battery as u8);
        let (r, _) = Record::decode(&frame[1..]).unwrap();
        assert_eq!(r, Record::Battery { volts: 4.1 });
    }

    #[test]
    fn oversize_push_refused_and_builder_unchanged() {
        let mut b = GroupBuilder::new();
        // 14 environment records: 1 + 14*13 = 183 bytes; a wake record
        // (17) brings it to 200, three more environments to 239.
        for _ in 0..14 {
            assert!(b.push(&Record::Environment {
                temperature_c: 0.0,
                pressure_hpa: 0.0,
                humidity_pct: 0.0,
            }));
        }
        assert!(b.push(&Record::Wake {
            wake_time_us: 1,
            last_sleep_us: 1,
        }));
        for _ in 0..3 {
            assert!(b.push(&Record::Environment {
                temperature_c: 0.0,
                pressure_hpa: 0.0,
                humidity_pct: 0.0,
            }));
        }
        let len_before = b.len();
        assert_eq!(len_before, 239);
        assert!(b.push(&Record::Battery { volts: 0.0 })); // 244
        assert!(b.push(&Record::Battery { volts: 0.0 })); // 249
        assert!(b.push(&Record::Battery { volts: 0.0 })); // 254
        assert!(!b.push(&Record::Battery { volts: 0.0 })); // would be 259
        assert!(!b.push(&Record::Environment {
            temperature_c: 0.0,
            pressure_hpa: 0.0,
            humidity_pct: 0.0,
        }));
        assert_eq!(b.len(), 254, "refused pushes leave the frame unchanged");
    }
}

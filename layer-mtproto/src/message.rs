//! Message identifiers (C6): MTProto's time-derived, strictly increasing
//! 64-bit message IDs, plus the plaintext frame used before a key exists.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// A 64-bit MTProto message identifier.
///
/// Roughly equal to `unix_time * 2^32`, with 12 bits of randomness folded
/// into the low end before the final left-shift, so the low two bits are
/// always zero for a client-originated message.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct MessageId(pub i64);

/// Generates message IDs for one connection.
///
/// Not just a clock read: each call is guaranteed to return a value
/// strictly greater than the last one it returned, even across calls that
/// land in the same instant or a clock that moves backwards.
pub struct MessageIdClock {
    last: Mutex<i64>,
}

impl MessageIdClock {
    /// A fresh clock with no prior history.
    pub fn new() -> Self {
        Self { last: Mutex::new(0) }
    }

    /// Allocate the next message ID.
    pub fn next(&self) -> MessageId {
        let mut rnd = [0u8; 2];
        getrandom::getrandom(&mut rnd).expect("getrandom");
        self.next_with(now_scaled(), u16::from_le_bytes(rnd))
    }

    fn next_with(&self, scaled_now: u64, random: u16) -> MessageId {
        let random_12 = (random & 0x0fff) as u64;
        let candidate = ((scaled_now | random_12) as i64).wrapping_mul(4);

        let mut last = self.last.lock().unwrap();
        let id = if candidate <= *last { *last + 4 } else { candidate };
        *last = id;
        MessageId(id)
    }

    /// A non-mutating estimate of "the message id we'd generate right
    /// now" — purely a function of the wall clock, with no randomness and
    /// without touching `last`. Used to bound clock skew on inbound
    /// messages; unlike [`next`](Self::next) it never advances state, so
    /// calling it before any real message has been sent still reflects
    /// the current time rather than a stale `0`.
    pub fn current_estimate(&self) -> i64 {
        (now_scaled() as i64).wrapping_mul(4)
    }
}

impl Default for MessageIdClock {
    fn default() -> Self {
        Self::new()
    }
}

/// `floor(unix_time * 2^30)`, the scaled clock value message IDs are built from.
fn now_scaled() -> u64 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();
    (secs * (1u64 << 30) as f64).floor() as u64
}

/// An unencrypted MTProto frame, used only during the handshake before an
/// authorization key exists.
///
/// ```text
/// auth_key_id:long  (always 0)
/// message_id:long
/// message_data_length:int
/// message_data:bytes
/// ```
#[derive(Debug)]
pub struct PlaintextFrame {
    /// Identifier of this message.
    pub id: MessageId,
    /// TL-serialized body (constructor ID + fields).
    pub body: Vec<u8>,
}

impl PlaintextFrame {
    /// Serialize to wire bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + 8 + 4 + self.body.len());
        buf.extend(0i64.to_le_bytes());
        buf.extend(self.id.0.to_le_bytes());
        buf.extend((self.body.len() as u32).to_le_bytes());
        buf.extend(&self.body);
        buf
    }

    /// Parse the fixed 20-byte header; caller reads `length` more bytes for the body.
    pub fn parse_header(header: &[u8; 20]) -> Result<(i64, MessageId, u32), HeaderError> {
        let auth_key_id = i64::from_le_bytes(header[..8].try_into().unwrap());
        if auth_key_id != 0 {
            return Err(HeaderError::NotPlaintext);
        }
        let id = MessageId(i64::from_le_bytes(header[8..16].try_into().unwrap()));
        let len = u32::from_le_bytes(header[16..20].try_into().unwrap());
        Ok((auth_key_id, id, len))
    }
}

/// Errors parsing a plaintext frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderError {
    /// `auth_key_id` was nonzero where a plaintext frame was expected.
    NotPlaintext,
}

impl std::fmt::Display for HeaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotPlaintext => write!(f, "expected auth_key_id=0 in plaintext frame"),
        }
    }
}
impl std::error::Error for HeaderError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_two_bits_are_always_zero() {
        let clock = MessageIdClock::new();
        for _ in 0..50 {
            assert_eq!(clock.next().0 & 0b11, 0);
        }
    }

    #[test]
    fn strictly_increasing_even_with_identical_clock_reads() {
        let clock = MessageIdClock::new();
        let a = clock.next_with(1_000_000, 5);
        let b = clock.next_with(1_000_000, 5);
        let c = clock.next_with(1_000_000, 5);
        assert!(a.0 < b.0);
        assert!(b.0 < c.0);
        assert_eq!(b.0 - a.0, 4);
    }

    #[test]
    fn monotonic_even_if_clock_jumps_backwards() {
        let clock = MessageIdClock::new();
        let a = clock.next_with(2_000_000, 0);
        let b = clock.next_with(1_000_000, 0); // clock went backwards
        assert!(b.0 > a.0);
    }

    #[test]
    fn plaintext_frame_roundtrips_header() {
        let frame = PlaintextFrame { id: MessageId(12345 * 4), body: vec![1, 2, 3] };
        let bytes = frame.to_bytes();
        let header: [u8; 20] = bytes[..20].try_into().unwrap();
        let (auth_key_id, id, len) = PlaintextFrame::parse_header(&header).unwrap();
        assert_eq!(auth_key_id, 0);
        assert_eq!(id, frame.id);
        assert_eq!(len, 3);
    }
}

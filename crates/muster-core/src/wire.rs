//! muster wire format — the on-wire frame for rendezvous traffic.
//!
//! One frame type IS the protocol: a kind byte plus two big-endian
//! counters, 9 bytes total, no variable-length fields. Every datagram
//! must be exactly this size; anything else is malformed and dropped by
//! the receiver. Multi-byte fields are network byte order so the format
//! is identical across architectures.
//!
//! The frame is #[repr(C, packed)] with zerocopy derives for
//! allocation-free serialization. There is no unsafe code in this module.

use static_assertions::assert_eq_size;
use zerocopy::byteorder::{NetworkEndian, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// Process id — 1-based position among non-blank hostfile lines.
pub type ProcessId = u32;

// ── Frame ─────────────────────────────────────────────────────────────────────

/// Raw wire layout of a rendezvous datagram.
///
/// Wire size: 9 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct Frame {
    /// Discriminant byte — see [`MessageKind`].
    pub kind: u8,

    /// ProcessId of the sender, in [1, N].
    pub sender: U32<NetworkEndian>,

    /// Per-sender send counter. Diagnostic only — never consulted for
    /// ordering or deduplication.
    pub seq: U32<NetworkEndian>,
}

// Compile-time size guard. If this fails, the wire format has silently changed.
assert_eq_size!(Frame, [u8; 9]);

/// Exact length of every valid datagram.
pub const FRAME_LEN: usize = std::mem::size_of::<Frame>();

// ── Messages ──────────────────────────────────────────────────────────────────

/// The two datagram kinds in the rendezvous exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    /// Liveness announcement, retried until acknowledged.
    Hello = 0x01,

    /// Acknowledgment, sent in response to every HELLO received.
    Ack = 0x02,
}

impl TryFrom<u8> for MessageKind {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(MessageKind::Hello),
            0x02 => Ok(MessageKind::Ack),
            other => Err(WireError::UnknownKind(other)),
        }
    }
}

impl From<MessageKind> for u8 {
    fn from(k: MessageKind) -> u8 {
        k as u8
    }
}

/// A decoded, validated frame. Created per send and discarded after
/// processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub sender: ProcessId,
    pub seq: u32,
}

impl Message {
    pub fn hello(sender: ProcessId, seq: u32) -> Self {
        Self { kind: MessageKind::Hello, sender, seq }
    }

    pub fn ack(sender: ProcessId, seq: u32) -> Self {
        Self { kind: MessageKind::Ack, sender, seq }
    }

    /// Encode into the fixed wire layout. Total for every valid message.
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let frame = Frame {
            kind: self.kind.into(),
            sender: U32::new(self.sender),
            seq: U32::new(self.seq),
        };
        let mut buf = [0u8; FRAME_LEN];
        buf.copy_from_slice(frame.as_bytes());
        buf
    }

    /// Decode a received datagram.
    ///
    /// Any length other than [`FRAME_LEN`], or an unknown kind byte,
    /// fails. The transport's own checksum is the only integrity check
    /// below this.
    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        let frame = Frame::read_from(data).ok_or(WireError::BadLength(data.len()))?;
        Ok(Self {
            kind: MessageKind::try_from(frame.kind)?,
            sender: frame.sender.get(),
            seq: frame.seq.get(),
        })
    }
}

// ── Constants ─────────────────────────────────────────────────────────────────

/// UDP port every process listens on, unless a hostfile entry overrides it.
pub const DEFAULT_PORT: u16 = 8080;

/// Maximum HELLO broadcast rounds before the run is declared a timeout.
pub const MAX_ROUNDS: u32 = 50;

/// Delay between broadcast rounds in milliseconds.
pub const ROUND_INTERVAL_MS: u64 = 500;

/// Delay before the first broadcast, giving peers time to start their
/// own receive loops.
pub const SETTLE_DELAY_MS: u64 = 2000;

/// Hostname resolution attempts per peer.
pub const RESOLVE_ATTEMPTS: u32 = 5;

/// Delay between resolution attempts in milliseconds.
pub const RESOLVE_RETRY_MS: u64 = 500;

/// How long the receive loop keeps answering HELLOs after readiness,
/// so stragglers' retransmissions still get ACKs.
pub const READY_GRACE_MS: u64 = 100;

/// A status snapshot is logged every this-many broadcast rounds.
pub const STATUS_EVERY_ROUNDS: u32 = 10;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("datagram length {0} is not a frame (expected {} bytes)", FRAME_LEN)]
    BadLength(usize),

    #[error("unknown frame kind byte: 0x{0:02x}")]
    UnknownKind(u8),
}

// ── Tests ─────────────────────────────────────────────────────────────────────

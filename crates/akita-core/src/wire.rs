//! Akita wire format: mesh packet types and the mesh link frame.
//!
//! The mesh link frame is what the daemon exchanges with the radio host over
//! UDP. Every field, every size, every reserved byte is part of the wire
//! format. All multi-byte integers are little-endian and the header is
//! decoded with zerocopy, so there is no unsafe code in this module.

use bytes::Bytes;
use static_assertions::assert_eq_size;
use zerocopy::byteorder::{LittleEndian, U16, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

// ── Mesh constants ───────────────────────────────────────────────────────────

/// Mesh node identifier as assigned by the radio firmware.
pub type NodeId = u32;

/// Mesh application port number.
pub type PortNumber = u16;

/// Reserved mesh port carrying bridge traffic. Everything else is ignored.
pub const IPFS_PORT: PortNumber = 200;

/// Exact byte length of a content identifier.
pub const CID_LENGTH: usize = 46;

/// Largest payload the bridge puts into a single outbound mesh packet.
pub const MAX_MESH_PAYLOAD: usize = 256;

/// Current mesh frame version.
pub const FRAME_VERSION: u8 = 0x01;

// ── Packets ──────────────────────────────────────────────────────────────────

/// A packet delivered by the mesh transport. Immutable once received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshPacket {
    pub sender: NodeId,
    pub port: PortNumber,
    pub payload: Bytes,
}

impl MeshPacket {
    pub fn new(sender: NodeId, port: PortNumber, payload: impl Into<Bytes>) -> Self {
        Self {
            sender,
            port,
            payload: payload.into(),
        }
    }
}

/// A packet the bridge hands to the mesh transport for delivery.
/// No acknowledgment is expected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPacket {
    pub destination: NodeId,
    pub port: PortNumber,
    pub payload: Bytes,
}

impl OutboundPacket {
    /// Build a bridge reply on [`IPFS_PORT`], truncating the payload to
    /// [`MAX_MESH_PAYLOAD`] on a UTF-8 character boundary.
    pub fn reply(destination: NodeId, text: &str) -> Self {
        let mut end = text.len().min(MAX_MESH_PAYLOAD);
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        if end < text.len() {
            tracing::warn!(
                destination,
                original = text.len(),
                kept = end,
                "reply exceeds mesh payload budget, truncating"
            );
        }
        Self {
            destination,
            port: IPFS_PORT,
            payload: Bytes::copy_from_slice(&text.as_bytes()[..end]),
        }
    }
}

// ── Mesh link frame ──────────────────────────────────────────────────────────

/// Header preceding every packet on the mesh link.
///
/// Inbound, `node` is the sender. Outbound, `node` is the destination.
///
/// Wire size: 10 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct MeshFrameHeader {
    /// Sender (inbound) or destination (outbound) node id.
    pub node: U32<LittleEndian>,
    /// Mesh application port.
    pub port: U16<LittleEndian>,
    /// Payload length in bytes, not including this header.
    pub length: U16<LittleEndian>,
    /// Frame version. A receiver seeing an unknown version drops the frame.
    pub version: u8,
    /// Reserved, must be zero.
    pub flags: u8,
}

// Compile-time size guard. If this fails, the wire format has silently changed.
assert_eq_size!(MeshFrameHeader, [u8; 10]);

pub const FRAME_HEADER_LEN: usize = std::mem::size_of::<MeshFrameHeader>();

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WireError {
    #[error("frame too short: {0} bytes")]
    Truncated(usize),
    #[error("unsupported frame version {0:#04x}")]
    UnknownVersion(u8),
    #[error("frame declares {declared} payload bytes but carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("payload of {0} bytes does not fit in a frame")]
    PayloadTooLarge(usize),
}

/// Encode an outbound packet as a mesh link frame.
pub fn encode_frame(packet: &OutboundPacket) -> Result<Vec<u8>, WireError> {
    let length = u16::try_from(packet.payload.len())
        .map_err(|_| WireError::PayloadTooLarge(packet.payload.len()))?;
    let header = MeshFrameHeader {
        node: U32::new(packet.destination),
        port: U16::new(packet.port),
        length: U16::new(length),
        version: FRAME_VERSION,
        flags: 0,
    };
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + packet.payload.len());
    frame.extend_from_slice(header.as_bytes());
    frame.extend_from_slice(&packet.payload);
    Ok(frame)
}

/// Decode an inbound mesh link frame into a packet.
pub fn decode_frame(buf: &[u8]) -> Result<MeshPacket, WireError> {
    let header = MeshFrameHeader::read_from_prefix(buf).ok_or(WireError::Truncated(buf.len()))?;
    if header.version != FRAME_VERSION {
        return Err(WireError::UnknownVersion(header.version));
    }
    let declared = header.length.get() as usize;
    let payload = &buf[FRAME_HEADER_LEN..];
    if payload.len() != declared {
        return Err(WireError::LengthMismatch {
            declared,
            actual: payload.len(),
        });
    }
    Ok(MeshPacket {
        sender: header.node.get(),
        port: header.port.get(),
        payload: Bytes::copy_from_slice(payload),
    })
}

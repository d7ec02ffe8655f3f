//! Mesh transport seam.
//!
//! The relay hands outbound packets to whatever owns the radio link. Delivery
//! is best-effort and unacknowledged, like the mesh itself.

use tokio::sync::mpsc;

use akita_core::OutboundPacket;

/// Outbound side of the mesh radio link.
pub trait MeshTransport {
    /// Queue a packet for transmission. Returns false if the link is gone.
    fn send_packet(&self, packet: OutboundPacket) -> bool;
}

/// The daemon's mesh link drains this channel and writes frames to the radio.
impl MeshTransport for mpsc::UnboundedSender<OutboundPacket> {
    fn send_packet(&self, packet: OutboundPacket) -> bool {
        self.send(packet).is_ok()
    }
}

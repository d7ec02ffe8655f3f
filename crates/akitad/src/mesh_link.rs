//! UDP link to the radio host.
//!
//! The radio host forwards every mesh packet it hears as one datagram (a
//! [`MeshFrameHeader`](akita_core::wire::MeshFrameHeader) plus payload) and
//! transmits whatever frames we send back. Bridge-port filtering happens in
//! the relay, so this link forwards everything it can decode.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use akita_core::wire::{decode_frame, encode_frame, FRAME_HEADER_LEN};
use akita_core::{MeshPacket, OutboundPacket};

/// Largest datagram accepted from the radio host.
const MAX_DATAGRAM: usize = FRAME_HEADER_LEN + u16::MAX as usize;

/// Bind the link socket.
pub fn bind(bind_addr: SocketAddr) -> Result<Arc<UdpSocket>> {
    let domain = if bind_addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)).context("socket()")?;
    socket.set_reuse_address(true).context("SO_REUSEADDR")?;
    socket.set_nonblocking(true).context("set_nonblocking")?;
    socket.bind(&bind_addr.into()).context("bind()")?;

    let socket = UdpSocket::from_std(socket.into()).context("failed to convert to tokio UdpSocket")?;
    Ok(Arc::new(socket))
}

/// Receive frames from the radio host and hand packets to the relay.
///
/// Returns when the relay side of the channel is dropped.
pub async fn receive_loop(
    socket: Arc<UdpSocket>,
    radio_addr: SocketAddr,
    inbound: mpsc::UnboundedSender<MeshPacket>,
) -> Result<()> {
    let mut buf = vec![0u8; MAX_DATAGRAM];

    tracing::info!(local = %socket.local_addr()?, radio = %radio_addr, "mesh link receiving");

    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "mesh recv_from failed");
                continue;
            }
        };

        if from != radio_addr {
            tracing::trace!(from = %from, "ignoring datagram from unknown host");
            continue;
        }

        match decode_frame(&buf[..len]) {
            Ok(packet) => {
                tracing::trace!(
                    sender = packet.sender,
                    port = packet.port,
                    bytes = packet.payload.len(),
                    "mesh packet received"
                );
                if inbound.send(packet).is_err() {
                    tracing::info!("relay gone, mesh receive loop exiting");
                    return Ok(());
                }
            }
            Err(e) => tracing::debug!(error = %e, "dropping undecodable mesh frame"),
        }
    }
}

/// Transmit packets queued by the relay.
///
/// Returns when every sender of the outbound channel is dropped.
pub async fn send_loop(
    socket: Arc<UdpSocket>,
    radio_addr: SocketAddr,
    mut outbound: mpsc::UnboundedReceiver<OutboundPacket>,
) -> Result<()> {
    while let Some(packet) = outbound.recv().await {
        let frame = match encode_frame(&packet) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(error = %e, "cannot frame outbound packet");
                continue;
            }
        };
        match socket.send_to(&frame, radio_addr).await {
            Ok(n) => tracing::trace!(
                destination = packet.destination,
                bytes = n,
                "mesh packet sent"
            ),
            Err(e) => tracing::warn!(error = %e, "mesh send_to failed"),
        }
    }
    Ok(())
}

//! Relay engine: the bridge between mesh packets and the content store.
//!
//! Two triggers, always called from one task so they never overlap:
//!
//! - [`RelayEngine::on_mesh_packet`]: classify an inbound packet on the
//!   bridge port and submit a store or retrieve request.
//! - [`RelayEngine::on_tick`]: take at most one pending reply and turn it
//!   into one outbound mesh packet addressed to the node named in the reply.
//!
//! Failures end the cycle: they are logged and counted, the packet is not
//! re-queued, and the bridge config is untouched.

use akita_core::envelope::{DecodeError, GatewayEnvelope};
use akita_core::prefs::PrefsError;
use akita_core::{
    classify, BridgeConfig, Classification, ContentId, MeshPacket, NodeId, OutboundPacket,
    PortNumber, Prefs, IPFS_PORT,
};

use crate::error::RelayError;
use crate::mesh::MeshTransport;
use crate::store::ContentStore;

/// Counters reported by the status heartbeat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Requests accepted by the content store.
    pub forwarded: u64,
    /// Requests the content store refused or could not reach.
    pub failed: u64,
    /// Replies handed to the mesh.
    pub delivered: u64,
    /// Replies thrown away.
    pub dropped: u64,
}

/// Result of one mesh-receive cycle.
#[derive(Debug)]
pub enum RelayOutcome {
    Disabled,
    OtherPort(PortNumber),
    StoreRequested,
    RetrieveRequested(ContentId),
    Failed(RelayError),
}

/// Result of one tick.
#[derive(Debug)]
pub enum TickOutcome {
    Disabled,
    Idle,
    Delivered(OutboundPacket),
    Dropped(DropReason),
}

#[derive(Debug)]
pub enum DropReason {
    Undecodable(DecodeError),
    /// Decoded, but not a `cid` or `data` reply.
    Unrecognized,
    /// The mesh link is gone.
    LinkClosed,
}

pub struct RelayEngine<S, M> {
    config: BridgeConfig,
    store: S,
    mesh: M,
    stats: RelayStats,
}

impl<S: ContentStore, M: MeshTransport> RelayEngine<S, M> {
    pub fn new(config: BridgeConfig, store: S, mesh: M) -> Self {
        Self {
            config,
            store,
            mesh,
            stats: RelayStats::default(),
        }
    }

    // ── Triggers ─────────────────────────────────────────────────────────────

    /// Handle a packet delivered by the mesh.
    pub async fn on_mesh_packet(&mut self, packet: &MeshPacket) -> RelayOutcome {
        if !self.config.enabled {
            return RelayOutcome::Disabled;
        }
        if packet.port != IPFS_PORT {
            tracing::trace!(port = packet.port, "ignoring packet on foreign port");
            return RelayOutcome::OtherPort(packet.port);
        }

        let sender = packet.sender;
        let result = match classify(&packet.payload) {
            Classification::Cid(cid) => {
                tracing::info!(sender, cid = %cid, "received CID, requesting content");
                let sent = self.store.retrieve(&cid, sender).await;
                sent.map(|()| RelayOutcome::RetrieveRequested(cid))
            }
            Classification::Raw(text) => {
                tracing::info!(sender, bytes = text.len(), "received data, requesting storage");
                self.store
                    .store(&text, sender)
                    .await
                    .map(|()| RelayOutcome::StoreRequested)
            }
        };

        match result {
            Ok(outcome) => {
                self.stats.forwarded += 1;
                outcome
            }
            Err(e) => {
                self.stats.failed += 1;
                tracing::warn!(sender, error = %e, "relay to content store failed");
                RelayOutcome::Failed(e)
            }
        }
    }

    /// Dispatch at most one pending reply to the mesh.
    pub fn on_tick(&mut self) -> TickOutcome {
        if !self.config.enabled {
            return TickOutcome::Disabled;
        }
        let Some(reply) = self.store.poll_reply() else {
            return TickOutcome::Idle;
        };

        match reply {
            Ok(GatewayEnvelope::CidResponse { cid, sender }) => {
                tracing::info!(destination = sender, cid = %cid, "relaying CID to mesh");
                self.deliver(sender, cid.as_str())
            }
            Ok(GatewayEnvelope::DataResponse { data, sender }) => {
                tracing::info!(destination = sender, bytes = data.len(), "relaying data to mesh");
                self.deliver(sender, &data)
            }
            Ok(other) => {
                tracing::warn!(reply = ?other, "unknown response type from gateway, dropping");
                self.drop_reply(DropReason::Unrecognized)
            }
            Err(e) => {
                tracing::warn!(error = %e, "undecodable gateway reply, dropping");
                self.drop_reply(DropReason::Undecodable(e))
            }
        }
    }

    fn deliver(&mut self, destination: NodeId, text: &str) -> TickOutcome {
        let packet = OutboundPacket::reply(destination, text);
        if self.mesh.send_packet(packet.clone()) {
            self.stats.delivered += 1;
            TickOutcome::Delivered(packet)
        } else {
            tracing::warn!(destination, "mesh link closed, reply lost");
            self.drop_reply(DropReason::LinkClosed)
        }
    }

    fn drop_reply(&mut self, reason: DropReason) -> TickOutcome {
        self.stats.dropped += 1;
        TickOutcome::Dropped(reason)
    }

    // ── Configuration ────────────────────────────────────────────────────────

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Takes effect on the next trigger. An in-flight request is not aborted.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.config.enabled != enabled {
            tracing::info!(enabled, "bridge enabled flag changed");
        }
        self.config.enabled = enabled;
    }

    pub fn set_gateway(&mut self, address: impl Into<String>, port: u16) {
        self.config.gateway_address = address.into();
        self.config.gateway_port = port;
        self.store.reconfigure(&self.config);
    }

    pub fn save_config(&self, prefs: &mut dyn Prefs) -> Result<(), PrefsError> {
        self.config.save(prefs)
    }

    // ── Introspection ────────────────────────────────────────────────────────

    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Periodic "still alive" line.
    pub fn log_status(&self) {
        if !self.config.enabled {
            return;
        }
        tracing::info!(
            forwarded = self.stats.forwarded,
            failed = self.stats.failed,
            delivered = self.stats.delivered,
            dropped = self.stats.dropped,
            "bridge active"
        );
    }
}

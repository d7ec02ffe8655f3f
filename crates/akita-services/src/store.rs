//! Content stores: where relayed requests actually go.
//!
//! The relay engine only sees [`ContentStore`]. Requests are submitted with
//! `store`/`retrieve`; answers come back later through `poll_reply`, because
//! a remote gateway answers on its own schedule. Two implementations:
//!
//! - [`GatewayStore`]: encodes envelopes and relays them to a remote gateway.
//! - [`LocalStore`]: an embedded in-memory store for running without a gateway.

use std::collections::{HashMap, VecDeque};

use akita_core::config::GatewayTuning;
use akita_core::envelope::{self, DecodeError, GatewayEnvelope};
use akita_core::{BridgeConfig, ContentId, NodeId};

use crate::error::RelayError;
use crate::gateway::{GatewayClient, GatewayEndpoint};

/// A content-addressed backend the relay can submit requests to.
#[allow(async_fn_in_trait)]
pub trait ContentStore {
    /// Submit `data` for storage. The resulting CID is delivered through
    /// [`ContentStore::poll_reply`] addressed to `sender`.
    async fn store(&mut self, data: &str, sender: NodeId) -> Result<(), RelayError>;

    /// Ask for the content named by `cid`. The data is delivered through
    /// [`ContentStore::poll_reply`] addressed to `sender`.
    async fn retrieve(&mut self, cid: &ContentId, sender: NodeId) -> Result<(), RelayError>;

    /// Next reply, if one is ready. Must not block.
    fn poll_reply(&mut self) -> Option<Result<GatewayEnvelope, DecodeError>>;

    /// Apply a changed bridge config.
    fn reconfigure(&mut self, _config: &BridgeConfig) {}
}

// ── Remote gateway ───────────────────────────────────────────────────────────

/// Relays requests to a remote gateway over the JSON line protocol.
pub struct GatewayStore {
    client: GatewayClient,
}

impl GatewayStore {
    pub fn new(config: &BridgeConfig, tuning: GatewayTuning) -> Self {
        Self {
            client: GatewayClient::new(GatewayEndpoint::from_config(config), tuning),
        }
    }

    pub fn client(&self) -> &GatewayClient {
        &self.client
    }
}

impl ContentStore for GatewayStore {
    async fn store(&mut self, data: &str, sender: NodeId) -> Result<(), RelayError> {
        let line = envelope::encode_store(data, sender);
        self.client.send(&line).await
    }

    async fn retrieve(&mut self, cid: &ContentId, sender: NodeId) -> Result<(), RelayError> {
        let line = envelope::encode_retrieve(cid, sender);
        self.client.send(&line).await
    }

    fn poll_reply(&mut self) -> Option<Result<GatewayEnvelope, DecodeError>> {
        let line = self.client.poll_response()?;
        tracing::debug!(line = %line, "gateway reply");
        Some(envelope::decode(&line))
    }

    fn reconfigure(&mut self, config: &BridgeConfig) {
        let endpoint = GatewayEndpoint::from_config(config);
        if &endpoint != self.client.endpoint() {
            tracing::info!(gateway = %endpoint, "gateway endpoint changed");
            self.client.set_endpoint(endpoint);
        }
    }
}

// ── Embedded store ───────────────────────────────────────────────────────────

/// In-memory content store.
///
/// Content is addressed by the first 46 hex characters of its
/// BLAKE3 digest, so identifiers it hands out are recognised as CIDs when
/// they come back over the mesh. Capacity counts stored payload bytes.
pub struct LocalStore {
    blocks: HashMap<ContentId, String>,
    capacity: usize,
    used: usize,
    replies: VecDeque<GatewayEnvelope>,
}

impl LocalStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            blocks: HashMap::new(),
            capacity,
            used: 0,
            replies: VecDeque::new(),
        }
    }

    /// Identifier this store assigns to `data`.
    pub fn cid_for(data: &str) -> ContentId {
        ContentId::from_digest(blake3::hash(data.as_bytes()).as_bytes())
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn used_bytes(&self) -> usize {
        self.used
    }
}

impl ContentStore for LocalStore {
    async fn store(&mut self, data: &str, sender: NodeId) -> Result<(), RelayError> {
        let cid = Self::cid_for(data);
        if !self.blocks.contains_key(&cid) {
            let available = self.capacity.saturating_sub(self.used);
            if data.len() > available {
                return Err(RelayError::ResourceExhausted {
                    needed: data.len(),
                    available,
                });
            }
            self.blocks.insert(cid.clone(), data.to_string());
            self.used += data.len();
            tracing::debug!(cid = %cid, bytes = data.len(), "stored locally");
        }
        self.replies
            .push_back(GatewayEnvelope::CidResponse { cid, sender });
        Ok(())
    }

    async fn retrieve(&mut self, cid: &ContentId, sender: NodeId) -> Result<(), RelayError> {
        let data = self
            .blocks
            .get(cid)
            .ok_or_else(|| RelayError::NotFound(cid.clone()))?;
        self.replies.push_back(GatewayEnvelope::DataResponse {
            data: data.clone(),
            sender,
        });
        Ok(())
    }

    fn poll_reply(&mut self) -> Option<Result<GatewayEnvelope, DecodeError>> {
        self.replies.pop_front().map(Ok)
    }
}

//! Relay failures. All of them are local to one relay cycle: they are
//! logged and counted, never propagated to the mesh or the host.

use std::time::Duration;

use akita_core::ContentId;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("gateway address not configured")]
    NotConfigured,
    #[error("failed to connect to gateway {addr}: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("connect to gateway {addr} timed out after {after:?}")]
    ConnectTimeout { addr: String, after: Duration },
    #[error("failed to write to gateway: {0}")]
    SendFailed(#[source] std::io::Error),
    #[error("{needed} bytes needed, only {available} available")]
    ResourceExhausted { needed: usize, available: usize },
    #[error("content {0} not found")]
    NotFound(ContentId),
}

impl RelayError {
    /// True for failures where the gateway could not be reached at all.
    pub fn is_connect_failure(&self) -> bool {
        matches!(
            self,
            Self::NotConfigured | Self::ConnectFailed { .. } | Self::ConnectTimeout { .. }
        )
    }
}

//! Gateway client: one short-lived TCP exchange per request.
//!
//! Per send: connect (bounded by `connect_timeout`, retried with backoff),
//! write the envelope line plus a blank line, read any reply lines until a
//! blank line, EOF, or `read_timeout`, then close. Replies are queued and
//! handed out one at a time by [`GatewayClient::poll_response`], which never
//! touches the network. No connection outlives the call that opened it.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{self, Instant};

use akita_core::config::GatewayTuning;
use akita_core::envelope::MAX_ENVELOPE_BYTES;
use akita_core::BridgeConfig;

use crate::error::RelayError;

/// Replies held between polls. Oldest are dropped beyond this.
const MAX_PENDING_REPLIES: usize = 32;

/// Where the gateway listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayEndpoint {
    pub address: String,
    pub port: u16,
}

impl GatewayEndpoint {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.gateway_address.trim(), config.gateway_port)
    }

    pub fn is_configured(&self) -> bool {
        !self.address.is_empty()
    }
}

impl fmt::Display for GatewayEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// An open gateway connection. Dropping it closes the socket and releases
/// the slot in the client's open-connection count.
struct ConnectionHandle {
    stream: TcpStream,
    open: Arc<AtomicUsize>,
}

impl ConnectionHandle {
    fn new(stream: TcpStream, open: Arc<AtomicUsize>) -> Self {
        open.fetch_add(1, Ordering::SeqCst);
        Self { stream, open }
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct GatewayClient {
    endpoint: GatewayEndpoint,
    tuning: GatewayTuning,
    pending: VecDeque<String>,
    open: Arc<AtomicUsize>,
}

impl GatewayClient {
    pub fn new(endpoint: GatewayEndpoint, tuning: GatewayTuning) -> Self {
        Self {
            endpoint,
            tuning,
            pending: VecDeque::new(),
            open: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn endpoint(&self) -> &GatewayEndpoint {
        &self.endpoint
    }

    /// Point the client at a different gateway. Takes effect on the next send.
    pub fn set_endpoint(&mut self, endpoint: GatewayEndpoint) {
        self.endpoint = endpoint;
    }

    /// Connections currently open. Zero whenever no `send` is in flight.
    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Replies waiting to be polled.
    pub fn pending_replies(&self) -> usize {
        self.pending.len()
    }

    /// Deliver one envelope to the gateway.
    ///
    /// The size budget is checked before any I/O. Connect failures are
    /// returned, not retried beyond `connect_attempts`.
    pub async fn send(&mut self, envelope: &str) -> Result<(), RelayError> {
        let needed = envelope.len() + 2;
        if needed > MAX_ENVELOPE_BYTES {
            return Err(RelayError::ResourceExhausted {
                needed,
                available: MAX_ENVELOPE_BYTES,
            });
        }
        if !self.endpoint.is_configured() {
            return Err(RelayError::NotConfigured);
        }

        let mut handle = self.connect().await?;

        // One JSON line, then an empty line as the end-of-message marker.
        let mut message = String::with_capacity(needed);
        message.push_str(envelope);
        message.push_str("\n\n");
        handle
            .stream
            .write_all(message.as_bytes())
            .await
            .map_err(RelayError::SendFailed)?;
        handle.stream.flush().await.map_err(RelayError::SendFailed)?;
        tracing::debug!(gateway = %self.endpoint, bytes = message.len(), "sent envelope to gateway");

        if !self.tuning.read_timeout().is_zero() {
            self.collect_replies(&mut handle.stream).await;
        }

        if let Err(e) = handle.stream.shutdown().await {
            tracing::debug!(error = %e, "gateway shutdown failed");
        }
        Ok(())
    }

    /// Next reply line received from the gateway, if any. Never blocks.
    pub fn poll_response(&mut self) -> Option<String> {
        self.pending.pop_front()
    }

    async fn connect(&self) -> Result<ConnectionHandle, RelayError> {
        let attempts = self.tuning.connect_attempts.max(1);
        let after = self.tuning.connect_timeout();
        let mut attempt = 1;

        loop {
            let target = (self.endpoint.address.as_str(), self.endpoint.port);
            let err = match time::timeout(after, TcpStream::connect(target)).await {
                Ok(Ok(stream)) => return Ok(ConnectionHandle::new(stream, self.open.clone())),
                Ok(Err(source)) => RelayError::ConnectFailed {
                    addr: self.endpoint.to_string(),
                    source,
                },
                Err(_) => RelayError::ConnectTimeout {
                    addr: self.endpoint.to_string(),
                    after,
                },
            };

            if attempt >= attempts {
                return Err(err);
            }
            let delay = backoff_delay(self.tuning.backoff(), attempt);
            tracing::warn!(
                attempt,
                attempts,
                retry_in_ms = delay.as_millis() as u64,
                error = %err,
                "gateway connect failed, retrying"
            );
            time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn collect_replies(&mut self, stream: &mut TcpStream) {
        let deadline = Instant::now() + self.tuning.read_timeout();
        let mut reader = BufReader::new(stream);
        // One envelope plus its newline.
        let limit = MAX_ENVELOPE_BYTES as u64 + 1;

        loop {
            let mut line = String::new();
            let mut limited = (&mut reader).take(limit);
            let read = limited.read_line(&mut line);
            match time::timeout_at(deadline, read).await {
                Err(_) => {
                    tracing::debug!(gateway = %self.endpoint, "no further reply before read timeout");
                    break;
                }
                Ok(Ok(0)) => break,
                Ok(Ok(n)) if n as u64 == limit && !line.ends_with('\n') => {
                    tracing::warn!(
                        gateway = %self.endpoint,
                        limit = MAX_ENVELOPE_BYTES,
                        "gateway reply over envelope budget, dropping rest of exchange"
                    );
                    break;
                }
                Ok(Ok(_)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        break;
                    }
                    self.queue_reply(line.to_string());
                }
                Ok(Err(e)) => {
                    tracing::warn!(gateway = %self.endpoint, error = %e, "gateway reply read failed");
                    break;
                }
            }
        }
    }

    fn queue_reply(&mut self, line: String) {
        if self.pending.len() >= MAX_PENDING_REPLIES {
            tracing::warn!(limit = MAX_PENDING_REPLIES, "reply queue full, dropping oldest");
            self.pending.pop_front();
        }
        self.pending.push_back(line);
    }
}

/// Exponential backoff with up to 25% jitter.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = base.saturating_mul(1 << (attempt - 1).min(10));
    let jitter_ms = (exp.as_millis() as u64) / 4;
    let jitter = if jitter_ms == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=jitter_ms)
    };
    exp + Duration::from_millis(jitter)
}

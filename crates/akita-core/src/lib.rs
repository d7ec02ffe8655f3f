//! akita-core: shared types, wire formats, and configuration for the
//! mesh ⇄ content-gateway bridge. All other Akita crates depend on this one.

pub mod classify;
pub mod config;
pub mod envelope;
pub mod prefs;
pub mod wire;

pub use classify::{classify, Classification, ContentId};
pub use envelope::{DecodeError, GatewayEnvelope};
pub use prefs::{BridgeConfig, FilePrefs, MemoryPrefs, Prefs};
pub use wire::{MeshPacket, NodeId, OutboundPacket, PortNumber, CID_LENGTH, IPFS_PORT};

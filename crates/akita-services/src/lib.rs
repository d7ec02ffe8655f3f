//! akita-services: the gateway relay. Gateway client, content stores,
//! mesh transport seam, and the relay engine that ties them together.

pub mod error;
pub mod gateway;
pub mod mesh;
pub mod relay;
pub mod store;

pub use error::RelayError;
pub use gateway::{GatewayClient, GatewayEndpoint};
pub use mesh::MeshTransport;
pub use relay::{DropReason, RelayEngine, RelayOutcome, RelayStats, TickOutcome};
pub use store::{ContentStore, GatewayStore, LocalStore};

//! Gateway envelope: the JSON wire format between bridge and gateway.
//!
//! Each message is one JSON object on one line, followed by a blank line.
//! Requests carry the originating mesh node in `sender` and the gateway
//! echoes it back, so replies route without a correlation table.
//!
//! | direction       | type       | fields                              |
//! |-----------------|------------|-------------------------------------|
//! | bridge→gateway  | `store`    | `data`, `sender`                    |
//! | bridge→gateway  | `retrieve` | `cid`, `sender`                     |
//! | gateway→bridge  | `cid`      | `cid`, `sender` (optional, 0)       |
//! | gateway→bridge  | `data`     | `data`, `sender` (optional, 0)      |

use serde::Serialize;
use serde_json::Value;

use crate::classify::{ContentId, InvalidCidLength};
use crate::wire::NodeId;

/// Largest envelope the bridge will build, in bytes.
pub const MAX_ENVELOPE_BYTES: usize = 1024;

/// `type` strings of gateway replies.
pub mod msg_types {
    pub const CID: &str = "cid";
    pub const DATA: &str = "data";
}

/// Every message the bridge and gateway exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEnvelope {
    StoreRequest { data: String, sender: NodeId },
    RetrieveRequest { cid: ContentId, sender: NodeId },
    CidResponse { cid: ContentId, sender: NodeId },
    DataResponse { data: String, sender: NodeId },
    /// Valid JSON with a `type` the bridge does not handle. Kept verbatim.
    Unrecognized { raw: String },
}

/// Serialized shape of outbound requests. Field order is the wire order.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Request<'a> {
    Store { data: &'a str, sender: NodeId },
    Retrieve { cid: &'a str, sender: NodeId },
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed gateway response: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("gateway `{msg_type}` response is missing `{field}`")]
    MissingField {
        msg_type: &'static str,
        field: &'static str,
    },
    #[error("gateway returned an invalid content id: {0}")]
    InvalidCid(#[from] InvalidCidLength),
}

/// `{"type":"store","data":…,"sender":…}`
pub fn encode_store(data: &str, sender: NodeId) -> String {
    encode(&Request::Store { data, sender })
}

/// `{"type":"retrieve","cid":…,"sender":…}`
pub fn encode_retrieve(cid: &ContentId, sender: NodeId) -> String {
    encode(&Request::Retrieve {
        cid: cid.as_str(),
        sender,
    })
}

fn encode(request: &Request<'_>) -> String {
    // A struct of &str and integers always serializes.
    serde_json::to_string(request).unwrap_or_default()
}

/// Decode one line received from the gateway.
///
/// Invalid JSON, or a `cid`/`data` response missing its payload field,
/// is an error. A missing `sender` resolves to 0. Any other `type`,
/// including none at all, is [`GatewayEnvelope::Unrecognized`].
///
/// A `cid` reply whose identifier is not exactly [`CID_LENGTH`] bytes, such
/// as a 59-character base32 CIDv1, is rejected with
/// [`DecodeError::InvalidCid`] and never reaches the mesh.
///
/// [`CID_LENGTH`]: crate::wire::CID_LENGTH
pub fn decode(line: &str) -> Result<GatewayEnvelope, DecodeError> {
    let doc: Value = serde_json::from_str(line.trim())?;

    let sender = doc
        .get("sender")
        .and_then(Value::as_u64)
        .and_then(|s| NodeId::try_from(s).ok())
        .unwrap_or(0);

    match doc.get("type").and_then(Value::as_str) {
        Some(msg_types::CID) => {
            let cid = required_str(&doc, msg_types::CID, "cid")?;
            Ok(GatewayEnvelope::CidResponse {
                cid: ContentId::new(cid)?,
                sender,
            })
        }
        Some(msg_types::DATA) => {
            let data = required_str(&doc, msg_types::DATA, "data")?;
            Ok(GatewayEnvelope::DataResponse {
                data: data.to_string(),
                sender,
            })
        }
        _ => Ok(GatewayEnvelope::Unrecognized {
            raw: line.to_string(),
        }),
    }
}

fn required_str<'a>(
    doc: &'a Value,
    msg_type: &'static str,
    field: &'static str,
) -> Result<&'a str, DecodeError> {
    doc.get(field)
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingField { msg_type, field })
}

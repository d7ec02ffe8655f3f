//! Packet classification: CID reference or raw data to store.
//!
//! A payload is treated as a CID when it is exactly [`CID_LENGTH`] bytes and
//! every byte is an ASCII hex digit. Real content identifiers are usually
//! base58 or base32, so this is a compatibility heuristic: a 46-byte all-hex
//! text message is indistinguishable from a CID and will be fetched, not
//! stored.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::wire::CID_LENGTH;

/// Content identifier. Always exactly [`CID_LENGTH`] bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentId(String);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("content id must be {CID_LENGTH} bytes, got {0}")]
pub struct InvalidCidLength(pub usize);

impl ContentId {
    /// Wrap a string as a CID. Only the length is checked.
    pub fn new(value: impl Into<String>) -> Result<Self, InvalidCidLength> {
        let value = value.into();
        if value.len() != CID_LENGTH {
            return Err(InvalidCidLength(value.len()));
        }
        Ok(Self(value))
    }

    /// Identifier for content with this 32-byte digest: the first
    /// [`CID_LENGTH`] lowercase hex characters of the digest.
    pub fn from_digest(digest: &[u8; 32]) -> Self {
        let mut hex = hex::encode(digest);
        hex.truncate(CID_LENGTH);
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ContentId {
    type Error = InvalidCidLength;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ContentId> for String {
    fn from(cid: ContentId) -> Self {
        cid.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What an inbound bridge payload is asking for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Fetch the content named by this CID.
    Cid(ContentId),
    /// Store this text.
    Raw(String),
}

/// Classify a mesh payload. Pure and deterministic.
pub fn classify(payload: &[u8]) -> Classification {
    // Length first: content is never inspected for any other size.
    if payload.len() == CID_LENGTH && payload.iter().all(u8::is_ascii_hexdigit) {
        // All-hex is ASCII, so the conversion cannot be lossy.
        let text = String::from_utf8_lossy(payload).into_owned();
        return Classification::Cid(ContentId(text));
    }
    Classification::Raw(String::from_utf8_lossy(payload).into_owned())
}

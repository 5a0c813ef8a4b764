//! Content identifiers.
//!
//! New documents get CIDv1 identifiers (json codec, sha2-256 multihash).
//! Identifiers minted elsewhere, such as CIDv0 `Qm…` hashes from an IPFS
//! pinning service, are carried through as opaque strings.

use cid::Cid;
use multihash_codetable::{Code, MultihashDigest};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Multicodec code for JSON documents.
pub const JSON_CODEC: u64 = 0x0200;

/// Address of an immutable document in a content store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    /// Wrap an identifier without validating it.
    pub fn new(cid: impl Into<String>) -> Self {
        Self(cid.into())
    }

    /// Derive the identifier of `data`.
    pub fn for_bytes(data: &[u8]) -> Self {
        let hash = Code::Sha2_256.digest(data);
        Self(Cid::new_v1(JSON_CODEC, hash).to_string())
    }

    /// Parse and validate a CID string.
    pub fn parse(cid: &str) -> Result<Self, cid::Error> {
        let parsed = Cid::try_from(cid)?;
        Ok(Self(parsed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `data` hashes to this identifier.
    ///
    /// Only meaningful for identifiers minted by [`ContentId::for_bytes`].
    pub fn matches(&self, data: &[u8]) -> bool {
        *self == Self::for_bytes(data)
    }

    /// Safe to use as a single path component.
    pub(crate) fn is_path_safe(&self) -> bool {
        !self.0.is_empty() && self.0.chars().all(|c| c.is_ascii_alphanumeric())
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentId {
    fn from(cid: &str) -> Self {
        Self::new(cid)
    }
}

impl From<String> for ContentId {
    fn from(cid: String) -> Self {
        Self(cid)
    }
}

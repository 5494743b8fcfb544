//! The error kinds the bridge surfaces to its CardDAV caller
//!
//! No operation is retried internally: the WebDAV layer decides how to map
//! each kind to an HTTP status.

use thiserror::Error;

use crate::crypto::CryptoError;
use crate::vcard::CodecError;

/// Boxed error type used at the collaborator seams (upstream API, mocks)
pub type ApiError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
    /// The path does not address the single collection, or the id is absent
    /// while the cache is known-complete
    #[error("not found")]
    NotFound,

    /// The upstream contacts API failed; `op` names the CardDAV operation for diagnosis
    #[error("{op}: upstream: {source}")]
    Upstream {
        op: &'static str,
        #[source]
        source: ApiError,
    },

    /// Decryption, signature verification or signing failed. Fatal for the
    /// enclosing operation: stale-but-authenticated beats unauthenticated.
    #[error("crypto: {0}")]
    Crypto(#[from] CryptoError),

    /// vCard decode/encode failure
    #[error("vcard: {0}")]
    Codec(#[from] CodecError),

    /// The upstream returned a different number of responses than requests
    #[error("{op}: expected exactly one response from upstream")]
    ProtocolInvariant { op: &'static str },
}

impl Error {
    pub(crate) fn upstream(op: &'static str, source: ApiError) -> Self {
        Error::Upstream { op, source }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }
}

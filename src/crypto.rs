//! The OpenPGP seam: signing, encrypting and opening card bodies
//!
//! The crypto primitives themselves live behind the [`CardCrypto`] trait; the
//! bridge only relies on the contract. The one subtlety the contract pins down
//! is *when* a signature verdict is valid: an OpenPGP verifier can only settle
//! the verdict once the whole payload has been consumed, so [`OpenedCard`]
//! hands out an unverified body stream and defers the verdict to
//! [`OpenedCard::finish`], which callers must only trust after draining the
//! stream to EOF.

use std::io::Read;

use thiserror::Error;

use crate::contact::Card;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("no private key can open this card")]
    NoMatchingKey,
    #[error("signing failed: {0}")]
    Sign(String),
    #[error("encryption failed: {0}")]
    Encrypt(String),
    #[error("decryption failed: {0}")]
    Decrypt(String),
    #[error("the card carries no signature")]
    MissingSignature,
    #[error("signature verification failed: {0}")]
    BadSignature(String),
}

/// Signing/encryption capability bound to one user's key material.
///
/// `sign_cleartext` and `encrypt_and_sign` produce ready-to-upload upstream
/// cards; `open` is the reverse direction.
pub trait CardCrypto: Send + Sync {
    /// Produce a cleartext-signed card over `body`
    fn sign_cleartext(&self, body: &str) -> Result<Card, CryptoError>;

    /// Produce a card encrypted to the owner and signed by the owner
    fn encrypt_and_sign(&self, body: &str) -> Result<Card, CryptoError>;

    /// Open a stored card for reading
    fn open(&self, card: &Card) -> Result<OpenedCard, CryptoError>;
}

/// A card body in the process of being read.
///
/// The signature verdict is only meaningful once `unverified_body` has been
/// drained to EOF; consult it through [`Self::finish`] and nowhere else.
pub struct OpenedCard {
    pub unverified_body: Box<dyn Read + Send>,
    verify: Box<dyn FnOnce() -> Result<(), CryptoError> + Send>,
}

impl OpenedCard {
    pub fn new(
        unverified_body: Box<dyn Read + Send>,
        verify: Box<dyn FnOnce() -> Result<(), CryptoError> + Send>,
    ) -> Self {
        Self {
            unverified_body,
            verify,
        }
    }

    /// The signature verdict. Invalid (and failing, for the mock engine) when
    /// the body has not been fully consumed.
    pub fn finish(self) -> Result<(), CryptoError> {
        (self.verify)()
    }
}

#[cfg(any(test, feature = "mock_remote_api"))]
pub use mock::MockKeyring;

/// A deterministic stand-in for an OpenPGP engine, for tests.
///
/// "Signatures" are SHA-256 digests prefixed by the key id, "ciphertext" is
/// base64 prefixed by the key id. It faithfully enforces the one contract
/// detail the bridge depends on: the verdict fails if it is consulted before
/// the body stream has been drained.
#[cfg(any(test, feature = "mock_remote_api"))]
mod mock {
    use std::io::{Cursor, Read};
    use std::sync::{Arc, Mutex};

    use sha2::{Digest, Sha256};

    use super::{CardCrypto, CryptoError, OpenedCard};
    use crate::contact::{Card, CardKind};

    #[derive(Clone, Debug)]
    pub struct MockKeyring {
        key_id: String,
    }

    impl MockKeyring {
        pub fn new<S: ToString>(key_id: S) -> Self {
            Self {
                key_id: key_id.to_string(),
            }
        }

        fn signature_over(&self, body: &str) -> String {
            format!("{}:{}", self.key_id, hex::encode(Sha256::digest(body.as_bytes())))
        }
    }

    /// Reader sharing its cursor with the verdict closure, so the closure can
    /// tell whether the body was actually drained
    struct SharedBody(Arc<Mutex<Cursor<Vec<u8>>>>);

    impl Read for SharedBody {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().read(buf)
        }
    }

    impl CardCrypto for MockKeyring {
        fn sign_cleartext(&self, body: &str) -> Result<Card, CryptoError> {
            Ok(Card {
                kind: CardKind::Signed,
                data: body.to_string(),
                signature: Some(self.signature_over(body)),
            })
        }

        fn encrypt_and_sign(&self, body: &str) -> Result<Card, CryptoError> {
            Ok(Card {
                kind: CardKind::EncryptedAndSigned,
                data: format!("{}${}", self.key_id, base64::encode(body)),
                signature: Some(self.signature_over(body)),
            })
        }

        fn open(&self, card: &Card) -> Result<OpenedCard, CryptoError> {
            let plaintext = match card.kind {
                CardKind::Signed => card.data.clone(),
                CardKind::EncryptedAndSigned => {
                    let (key_id, ciphertext) = card
                        .data
                        .split_once('$')
                        .ok_or_else(|| CryptoError::Decrypt("malformed ciphertext".to_string()))?;
                    if key_id != self.key_id {
                        return Err(CryptoError::NoMatchingKey);
                    }
                    let decoded = base64::decode(ciphertext)
                        .map_err(|err| CryptoError::Decrypt(err.to_string()))?;
                    String::from_utf8(decoded)
                        .map_err(|err| CryptoError::Decrypt(err.to_string()))?
                }
                other => {
                    return Err(CryptoError::Decrypt(format!(
                        "unsupported card type {:?}",
                        other
                    )))
                }
            };

            let expected = self.signature_over(&plaintext);
            let signature = card.signature.clone();

            let total = plaintext.len() as u64;
            let cursor = Arc::new(Mutex::new(Cursor::new(plaintext.into_bytes())));
            let cursor_for_verdict = Arc::clone(&cursor);

            let verify = move || -> Result<(), CryptoError> {
                if cursor_for_verdict.lock().unwrap().position() < total {
                    return Err(CryptoError::BadSignature(
                        "verdict consulted before the body was drained".to_string(),
                    ));
                }
                let signature = signature.ok_or(CryptoError::MissingSignature)?;
                if signature != expected {
                    return Err(CryptoError::BadSignature("digest mismatch".to_string()));
                }
                Ok(())
            };

            Ok(OpenedCard::new(
                Box::new(SharedBody(cursor)),
                Box::new(verify),
            ))
        }
    }

}

//! Session key seam.
//!
//! The handshake only needs two operations from the key store: seal an
//! outbound plaintext and open an inbound datagram. [`SessionCipher`] is
//! that seam. [`KeyedDigestCipher`] is the bundled implementation: it
//! authenticates with a SHA-256 digest keyed by the shared secret and
//! leaves the payload in the clear. Deployments that need
//! confidentiality plug in their own primitive.

use std::fmt::{Display, Formatter};

use sha2::{Digest, Sha256};

/// Length of the keyed digest prefix.
pub const TAG_LEN: usize = 32;

/// Why an inbound datagram was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    /// Shorter than the authentication tag.
    Truncated(usize),
    /// Tag does not match the payload under the shared key.
    BadTag,
    /// Payload is not valid UTF-8.
    Malformed,
    /// No key is registered for the sender id.
    UnknownSender(u32),
}

impl Display for AuthFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated(len) => write!(f, "datagram too short ({len} bytes)"),
            Self::BadTag => write!(f, "authentication tag mismatch"),
            Self::Malformed => write!(f, "payload is not valid utf-8"),
            Self::UnknownSender(id) => write!(f, "no key for sender id {id}"),
        }
    }
}

impl std::error::Error for AuthFailure {}

/// Seals and opens session messages under the pre-shared key.
pub trait SessionCipher: Send + Sync {
    /// Seal `plaintext` for sending to the collector.
    fn encrypt_for_send(&self, plaintext: &str) -> Vec<u8>;

    /// Authenticate and open a received datagram.
    ///
    /// `sender_id_hint` selects the key; agents hold exactly one, id `0`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthFailure`] for anything that does not verify.
    fn authenticate_and_decrypt(
        &self,
        cipher: &[u8],
        sender_id_hint: u32,
    ) -> std::result::Result<String, AuthFailure>;
}

/// SHA-256 keyed-digest framing: `digest(key ‖ plaintext) ‖ plaintext`.
pub struct KeyedDigestCipher {
    key: Vec<u8>,
}

impl KeyedDigestCipher {
    /// Cipher bound to `key`.
    #[must_use]
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    fn tag(&self, payload: &[u8]) -> [u8; TAG_LEN] {
        let mut hasher = Sha256::new();
        hasher.update(&self.key);
        hasher.update(payload);
        hasher.finalize().into()
    }
}

impl std::fmt::Debug for KeyedDigestCipher {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedDigestCipher")
            .field("key", &"<redacted>")
            .finish()
    }
}

impl SessionCipher for KeyedDigestCipher {
    fn encrypt_for_send(&self, plaintext: &str) -> Vec<u8> {
        let payload = plaintext.as_bytes();
        let mut out = Vec::with_capacity(TAG_LEN + payload.len());
        out.extend_from_slice(&self.tag(payload));
        out.extend_from_slice(payload);
        out
    }

    fn authenticate_and_decrypt(
        &self,
        cipher: &[u8],
        sender_id_hint: u32,
    ) -> std::result::Result<String, AuthFailure> {
        if sender_id_hint != 0 {
            return Err(AuthFailure::UnknownSender(sender_id_hint));
        }
        if cipher.len() < TAG_LEN {
            return Err(AuthFailure::Truncated(cipher.len()));
        }

        let (tag, payload) = cipher.split_at(TAG_LEN);
        let expected = self.tag(payload);
        let diff = tag
            .iter()
            .zip(expected.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));
        if diff != 0 {
            return Err(AuthFailure::BadTag);
        }

        String::from_utf8(payload.to_vec()).map_err(|_| AuthFailure::Malformed)
    }
}

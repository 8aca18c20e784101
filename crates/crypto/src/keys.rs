use std::fmt;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use crypto_box::SalsaBox;
use rand::rngs::OsRng;
use thiserror::Error;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

/// Length of every key handled by this crate
pub const KEY_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid key length: expected 32 bytes, got {0}")]
    InvalidLength(usize),
    #[error("Invalid key encoding: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),
    #[error("Backend public key produces a non-contributory shared secret")]
    WeakSharedSecret,
}

/// The relay's X25519 key pair
pub struct RelayKeypair {
    secret: StaticSecret,
    public: X25519PublicKey,
}

impl Clone for RelayKeypair {
    fn clone(&self) -> Self {
        Self::from_secret_bytes(self.secret.as_bytes())
    }
}

impl fmt::Debug for RelayKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayKeypair")
            .field("public", &encode_key(&self.public_key_bytes()))
            .finish_non_exhaustive()
    }
}

impl RelayKeypair {
    /// Generate a new random key pair from the OS random source
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Create from raw secret key bytes
    pub fn from_secret_bytes(secret: &[u8; KEY_LEN]) -> Self {
        let secret = StaticSecret::from(*secret);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Get the public key as bytes
    pub fn public_key_bytes(&self) -> [u8; KEY_LEN] {
        self.public.to_bytes()
    }

    /// Get the secret key as bytes
    pub fn secret_key_bytes(&self) -> [u8; KEY_LEN] {
        *self.secret.as_bytes()
    }

    /// Derive the key shared with a peer
    pub fn shared_key(&self, their_public: &[u8; KEY_LEN]) -> Result<SharedKey, KeyError> {
        SharedKey::precompute(self.secret.as_bytes(), their_public)
    }
}

/// Precomputed NaCl box between the relay and the backend.
///
/// X25519 followed by the HSalsa20 derivation, done once at startup and
/// reused for every sealed request. Never serialized, never logged.
#[derive(Clone)]
pub struct SharedKey(Arc<SalsaBox>);

impl SharedKey {
    /// Precompute the box for `our_secret` and `their_public`
    pub fn precompute(
        our_secret: &[u8; KEY_LEN],
        their_public: &[u8; KEY_LEN],
    ) -> Result<Self, KeyError> {
        let shared = StaticSecret::from(*our_secret)
            .diffie_hellman(&X25519PublicKey::from(*their_public));
        if !shared.was_contributory() {
            return Err(KeyError::WeakSharedSecret);
        }

        let salsa_box = SalsaBox::new(
            &crypto_box::PublicKey::from(*their_public),
            &crypto_box::SecretKey::from(*our_secret),
        );
        Ok(Self(Arc::new(salsa_box)))
    }

    pub(crate) fn salsa_box(&self) -> &SalsaBox {
        &self.0
    }
}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedKey(<redacted>)")
    }
}

/// Decode a standard base64 key into 32 bytes
pub fn decode_key(encoded: &str) -> Result<[u8; KEY_LEN], KeyError> {
    let bytes = STANDARD.decode(encoded.trim())?;
    key_from_slice(&bytes)
}

/// Encode a key as standard base64
pub fn encode_key(key: &[u8; KEY_LEN]) -> String {
    STANDARD.encode(key)
}

/// Copy a 32-byte key out of a slice
pub fn key_from_slice(bytes: &[u8]) -> Result<[u8; KEY_LEN], KeyError> {
    bytes
        .try_into()
        .map_err(|_| KeyError::InvalidLength(bytes.len()))
}

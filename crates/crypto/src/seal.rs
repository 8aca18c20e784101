//! Sealed request envelope
//!
//! The request fields are serialized as `application/x-www-form-urlencoded`
//! and sealed with NaCl box (XSalsa20-Poly1305) under the precomputed
//! [`SharedKey`], so any NaCl box implementation holding the backend's secret
//! opens it. The Poly1305 tag covers the whole serialized field set, so the
//! backend rejects any modified envelope.
//!
//! Nonces are 24 bytes: 16 fresh bytes from the OS random source followed by
//! an 8-byte big-endian counter owned by the sealer. The counter alone rules
//! out reuse within one sealer; the random prefix separates sealers sharing
//! a key.

use std::sync::atomic::{AtomicU64, Ordering};

use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use crypto_box::aead::{generic_array::GenericArray, Aead};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

use crate::keys::SharedKey;

/// NaCl box nonce length
pub const NONCE_LEN: usize = 24;

/// Poly1305 authentication tag length
pub const TAG_LEN: usize = 16;

const RANDOM_PREFIX_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum SealError {
    #[error("Secure random source failed: {0}")]
    Rng(rand::Error),
    #[error("Nonce counter exhausted")]
    NonceExhausted,
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed")]
    DecryptionFailed,
    #[error("Invalid nonce length: {0}")]
    InvalidNonce(usize),
    #[error("Invalid envelope encoding: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),
}

/// An encrypted request, ready to be posted as form data
#[derive(Debug, Clone)]
pub struct SealedRequest {
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
}

impl SealedRequest {
    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }

    /// Ciphertext with the authentication tag appended
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Form fields posted to the backend: `nonce`, `msg` and the relay's `id`
    pub fn to_form(&self, server_id: i64) -> Vec<(&'static str, String)> {
        vec![
            ("nonce", URL_SAFE.encode(self.nonce)),
            ("msg", URL_SAFE.encode(&self.ciphertext)),
            ("id", server_id.to_string()),
        ]
    }
}

/// Seals request fields under a precomputed [`SharedKey`]
pub struct RequestSealer {
    key: SharedKey,
    counter: AtomicU64,
}

impl RequestSealer {
    pub fn new(key: &SharedKey) -> Self {
        Self::with_counter(key, 0)
    }

    fn with_counter(key: &SharedKey, start: u64) -> Self {
        Self {
            key: key.clone(),
            counter: AtomicU64::new(start),
        }
    }

    /// Encrypt and authenticate an ordered set of form fields
    pub fn seal<I, K, V>(&self, fields: I) -> Result<SealedRequest, SealError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let plaintext = encode_form(fields);
        let nonce = self.next_nonce()?;

        let ciphertext = self
            .key
            .salsa_box()
            .encrypt(GenericArray::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| SealError::EncryptionFailed)?;

        Ok(SealedRequest { nonce, ciphertext })
    }

    /// Open an envelope from its `nonce` and `msg` form values.
    ///
    /// This is what the backend does with a sealed request.
    pub fn open(&self, nonce: &str, msg: &str) -> Result<Vec<(String, String)>, SealError> {
        let nonce = URL_SAFE.decode(nonce)?;
        if nonce.len() != NONCE_LEN {
            return Err(SealError::InvalidNonce(nonce.len()));
        }
        let ciphertext = URL_SAFE.decode(msg)?;

        let plaintext = self
            .key
            .salsa_box()
            .decrypt(GenericArray::from_slice(&nonce), ciphertext.as_slice())
            .map_err(|_| SealError::DecryptionFailed)?;

        Ok(url::form_urlencoded::parse(&plaintext)
            .into_owned()
            .collect())
    }

    fn next_nonce(&self) -> Result<[u8; NONCE_LEN], SealError> {
        let count = self
            .counter
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| c.checked_add(1))
            .map_err(|_| SealError::NonceExhausted)?;

        let mut nonce = [0u8; NONCE_LEN];
        OsRng
            .try_fill_bytes(&mut nonce[..RANDOM_PREFIX_LEN])
            .map_err(SealError::Rng)?;
        nonce[RANDOM_PREFIX_LEN..].copy_from_slice(&count.to_be_bytes());
        Ok(nonce)
    }
}

/// Serialize fields as `application/x-www-form-urlencoded`, keeping order
pub fn encode_form<I, K, V>(fields: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in fields {
        serializer.append_pair(key.as_ref(), value.as_ref());
    }
    serializer.finish()
}

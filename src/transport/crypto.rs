use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use crypto_box::aead::{Aead, AeadCore, OsRng};
use crypto_box::{Nonce, PublicKey, SalsaBox, SecretKey};

use super::TransportError;

pub const NONCE_LEN: usize = 24;
pub const TAG_LEN: usize = 16;

/// Fresh Curve25519 keypair for this process.
pub fn generate_keypair() -> (SecretKey, PublicKey) {
    let secret = SecretKey::generate(&mut OsRng);
    let public = secret.public_key();
    (secret, public)
}

pub fn parse_public_key(hex_key: &str) -> Result<PublicKey, TransportError> {
    let bytes = hex::decode(hex_key.trim())
        .map_err(|e| TransportError::InvalidConfig(format!("public_key: {e}")))?;
    PublicKey::from_slice(&bytes)
        .map_err(|_| TransportError::InvalidConfig("public_key must be 32 bytes".into()))
}

pub fn public_key_hex(key: &PublicKey) -> String {
    hex::encode_upper(key.as_bytes())
}

/// Authenticated box between us and one peer. Frames are
/// `base64(nonce || ciphertext)`.
#[derive(Clone)]
pub struct Mailbox {
    sbox: Arc<SalsaBox>,
}

impl Mailbox {
    pub fn new(secret: &SecretKey, peer: &PublicKey) -> Self {
        Self {
            sbox: Arc::new(SalsaBox::new(peer, secret)),
        }
    }

    /// Encrypt under a fresh random nonce.
    pub fn seal(&self, plaintext: &[u8]) -> Result<String, TransportError> {
        let nonce = SalsaBox::generate_nonce(&mut OsRng);
        let cipher = self
            .sbox
            .encrypt(&nonce, plaintext)
            .map_err(|_| TransportError::Crypto)?;

        let mut packed = Vec::with_capacity(NONCE_LEN + cipher.len());
        packed.extend_from_slice(&nonce);
        packed.extend_from_slice(&cipher);
        Ok(STANDARD.encode(packed))
    }

    /// Raw frame bytes are the UTF-8 text of the base64 payload.
    pub fn open(&self, frame: &[u8]) -> Result<Vec<u8>, TransportError> {
        let text = std::str::from_utf8(frame).map_err(|_| TransportError::Frame("not utf-8"))?;
        let packed = STANDARD
            .decode(text.trim())
            .map_err(|_| TransportError::Frame("not base64"))?;
        if packed.len() < NONCE_LEN + TAG_LEN {
            return Err(TransportError::Frame("too short"));
        }

        let (nonce, cipher) = packed.split_at(NONCE_LEN);
        self.sbox
            .decrypt(Nonce::from_slice(nonce), cipher)
            .map_err(|_| TransportError::Crypto)
    }
}

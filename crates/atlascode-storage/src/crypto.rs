//! Value encryption for the secret file.
//!
//! AES-256-GCM with a random nonce per value. The storage key is bound as
//! associated data, so a ciphertext copied under another key fails to open.

use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};

/// Size of the encryption key (32 bytes = 256 bits).
pub const KEY_SIZE: usize = 32;

/// Size of the nonce (12 bytes for AES-GCM).
const NONCE_SIZE: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("invalid encryption key")]
    InvalidKey,

    #[error("random number generator failure")]
    Rng,

    #[error("encryption failed")]
    Seal,

    #[error("decryption failed - wrong key or corrupted data")]
    Open,

    #[error("malformed ciphertext: {0}")]
    Malformed(String),
}

pub struct SecretCipher {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl SecretCipher {
    pub fn new(master_key: &[u8; KEY_SIZE]) -> Result<Self, CipherError> {
        let unbound_key =
            UnboundKey::new(&AES_256_GCM, master_key).map_err(|_| CipherError::InvalidKey)?;
        Ok(Self {
            key: LessSafeKey::new(unbound_key),
            rng: SystemRandom::new(),
        })
    }

    /// Encrypt `plaintext` bound to `context`.
    ///
    /// Returns hex(nonce + ciphertext + tag).
    pub fn encrypt(&self, plaintext: &str, context: &str) -> Result<String, CipherError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| CipherError::Rng)?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(nonce, Aad::from(context.as_bytes()), &mut in_out)
            .map_err(|_| CipherError::Seal)?;

        let mut result = nonce_bytes.to_vec();
        result.extend_from_slice(&in_out);
        Ok(hex::encode(result))
    }

    pub fn decrypt(&self, ciphertext_hex: &str, context: &str) -> Result<String, CipherError> {
        let ciphertext =
            hex::decode(ciphertext_hex).map_err(|e| CipherError::Malformed(e.to_string()))?;
        if ciphertext.len() < NONCE_SIZE + AES_256_GCM.tag_len() {
            return Err(CipherError::Malformed("too short".to_string()));
        }

        let (nonce_bytes, encrypted) = ciphertext.split_at(NONCE_SIZE);
        let nonce_array: [u8; NONCE_SIZE] = nonce_bytes
            .try_into()
            .map_err(|_| CipherError::Malformed("invalid nonce".to_string()))?;
        let nonce = Nonce::assume_unique_for_key(nonce_array);

        let mut in_out = encrypted.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::from(context.as_bytes()), &mut in_out)
            .map_err(|_| CipherError::Open)?;

        String::from_utf8(plaintext.to_vec()).map_err(|e| CipherError::Malformed(e.to_string()))
    }
}

/// Generate a random master key.
pub fn generate_master_key() -> Result<[u8; KEY_SIZE], CipherError> {
    let mut key = [0u8; KEY_SIZE];
    SystemRandom::new()
        .fill(&mut key)
        .map_err(|_| CipherError::Rng)?;
    Ok(key)
}

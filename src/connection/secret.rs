//! Stored connection-string secrets.
//!
//! External connection strings are stored either as plaintext URIs (legacy
//! rows) or as `ivHex:cipherHex`, AES-256-GCM with a 12-byte IV and the
//! authentication tag appended to the ciphertext. The format is decided once,
//! when the row is read, by [`StoredSecret::classify`]; nothing downstream
//! inspects the raw text again.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};

use crate::error::{AgentError, AgentResult};

const IV_LEN: usize = 12;
const PLAINTEXT_PREFIXES: &[&str] = &["postgres://", "postgresql://"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredSecret {
    Plaintext(String),
    Encrypted { iv: [u8; IV_LEN], ciphertext: Vec<u8> },
}

impl StoredSecret {
    pub fn classify(raw: &str) -> AgentResult<StoredSecret> {
        let raw = raw.trim();
        if PLAINTEXT_PREFIXES.iter().any(|p| raw.starts_with(p)) {
            return Ok(StoredSecret::Plaintext(raw.to_string()));
        }
        let unreadable =
            || AgentError::Configuration("Stored connection string has an unrecognized format".into());
        let (iv_hex, cipher_hex) = raw.split_once(':').ok_or_else(unreadable)?;
        let iv_bytes = hex::decode(iv_hex).map_err(|_| unreadable())?;
        let iv: [u8; IV_LEN] = iv_bytes.try_into().map_err(|_| unreadable())?;
        let ciphertext = hex::decode(cipher_hex).map_err(|_| unreadable())?;
        if ciphertext.is_empty() {
            return Err(unreadable());
        }
        Ok(StoredSecret::Encrypted { iv, ciphertext })
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, StoredSecret::Encrypted { .. })
    }

    /// Produce the plaintext connection string, decrypting when needed.
    pub fn reveal(self, key_hex: Option<&str>) -> AgentResult<String> {
        match self {
            StoredSecret::Plaintext(s) => Ok(s),
            StoredSecret::Encrypted { iv, ciphertext } => {
                let cipher = cipher_from_key(key_hex)?;
                let plaintext = cipher
                    .decrypt(Nonce::from_slice(&iv), ciphertext.as_slice())
                    .map_err(|_| {
                        AgentError::Configuration(
                            "Failed to decrypt stored connection string (wrong key?)".into(),
                        )
                    })?;
                String::from_utf8(plaintext).map_err(|_| {
                    AgentError::Configuration("Decrypted connection string is not UTF-8".into())
                })
            }
        }
    }
}

fn cipher_from_key(key_hex: Option<&str>) -> AgentResult<Aes256Gcm> {
    let key_hex = key_hex.ok_or_else(|| {
        AgentError::Configuration("CONNECTION_ENCRYPTION_KEY is not configured".into())
    })?;
    let key = hex::decode(key_hex.trim())
        .ok()
        .filter(|k| k.len() == 32)
        .ok_or_else(|| {
            AgentError::Configuration(
                "CONNECTION_ENCRYPTION_KEY must be 64 hex characters (32 bytes)".into(),
            )
        })?;
    Aes256Gcm::new_from_slice(&key)
        .map_err(|_| AgentError::Configuration("Invalid encryption key length".into()))
}

/// Encrypt a connection string into the stored `ivHex:cipherHex` form.
pub fn encrypt_secret(plaintext: &str, key_hex: Option<&str>) -> AgentResult<String> {
    let cipher = cipher_from_key(key_hex)?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|e| AgentError::Internal(anyhow::anyhow!("Encryption failed: {}", e)))?;
    Ok(format!("{}:{}", hex::encode(nonce), hex::encode(ciphertext)))
}

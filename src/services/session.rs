// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session storage for the signed-in user's tokens.
//!
//! The file-backed store seals the session JSON with ChaCha20-Poly1305. The
//! key is derived from the configured secret with HKDF-SHA256. On disk the
//! file holds base64 of `nonce || ciphertext`.

use crate::models::AuthInfo;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hkdf::Hkdf;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, CHACHA20_POLY1305, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::Sha256;
use std::path::PathBuf;
use tokio::sync::RwLock;

const HKDF_SALT: &[u8] = b"run-tracker-session-v1";
const HKDF_INFO: &[u8] = b"session-file-key";

/// Failure persisting the session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Encryption error")]
    Crypto,
}

/// Where the signed-in user's [`AuthInfo`] lives.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn get(&self) -> Option<AuthInfo>;

    /// Store a session, or clear it with `None`.
    async fn set(&self, info: Option<AuthInfo>) -> Result<(), SessionError>;
}

/// Session kept only in memory (tests, and hosts with their own keystore).
#[derive(Default)]
pub struct InMemorySessionStorage {
    info: RwLock<Option<AuthInfo>>,
}

impl InMemorySessionStorage {
    pub fn new(info: Option<AuthInfo>) -> Self {
        Self {
            info: RwLock::new(info),
        }
    }
}

#[async_trait]
impl SessionStorage for InMemorySessionStorage {
    async fn get(&self) -> Option<AuthInfo> {
        self.info.read().await.clone()
    }

    async fn set(&self, info: Option<AuthInfo>) -> Result<(), SessionError> {
        *self.info.write().await = info;
        Ok(())
    }
}

/// Session sealed in a file, cached in memory after the first read.
pub struct EncryptedSessionStorage {
    path: PathBuf,
    key: LessSafeKey,
    rng: SystemRandom,
    cached: RwLock<Option<AuthInfo>>,
}

impl EncryptedSessionStorage {
    /// Open the session file at `path`, decrypting any existing session.
    ///
    /// A missing or undecryptable file means "signed out".
    pub async fn open(path: impl Into<PathBuf>, secret: &[u8]) -> Result<Self, SessionError> {
        let path = path.into();
        let key = derive_key(secret)?;

        let cached = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => match decrypt(&key, contents.trim()) {
                Some(info) => Some(info),
                None => {
                    tracing::warn!(path = %path.display(), "Session file unreadable, treating as signed out");
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            key,
            rng: SystemRandom::new(),
            cached: RwLock::new(cached),
        })
    }

    fn encrypt(&self, info: &AuthInfo) -> Result<String, SessionError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| SessionError::Crypto)?;

        let mut in_out = serde_json::to_vec(info)?;
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut in_out,
            )
            .map_err(|_| SessionError::Crypto)?;

        let mut sealed = nonce_bytes.to_vec();
        sealed.extend_from_slice(&in_out);
        Ok(BASE64.encode(sealed))
    }
}

#[async_trait]
impl SessionStorage for EncryptedSessionStorage {
    async fn get(&self) -> Option<AuthInfo> {
        self.cached.read().await.clone()
    }

    async fn set(&self, info: Option<AuthInfo>) -> Result<(), SessionError> {
        let mut cached = self.cached.write().await;
        match &info {
            Some(info) => {
                let contents = self.encrypt(info)?;
                tokio::fs::write(&self.path, contents).await?;
                tracing::debug!(user_id = %info.user_id, "Session stored");
            }
            None => match tokio::fs::remove_file(&self.path).await {
                Ok(()) => tracing::debug!("Session cleared"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            },
        }
        *cached = info;
        Ok(())
    }
}

fn derive_key(secret: &[u8]) -> Result<LessSafeKey, SessionError> {
    let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), secret);
    let mut okm = [0u8; 32];
    hk.expand(HKDF_INFO, &mut okm)
        .map_err(|_| SessionError::Crypto)?;
    let unbound = UnboundKey::new(&CHACHA20_POLY1305, &okm).map_err(|_| SessionError::Crypto)?;
    Ok(LessSafeKey::new(unbound))
}

fn decrypt(key: &LessSafeKey, encoded: &str) -> Option<AuthInfo> {
    let sealed = BASE64.decode(encoded).ok()?;
    if sealed.len() < NONCE_LEN {
        return None;
    }
    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
    let nonce = Nonce::try_assume_unique_for_key(nonce_bytes).ok()?;

    let mut in_out = ciphertext.to_vec();
    let plaintext = key.open_in_place(nonce, Aad::empty(), &mut in_out).ok()?;
    serde_json::from_slice(plaintext).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth_info() -> AuthInfo {
        AuthInfo {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            user_id: "user-1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.enc");

        let storage = EncryptedSessionStorage::open(&path, b"secret").await.unwrap();
        assert_eq!(storage.get().await, None);
        storage.set(Some(auth_info())).await.unwrap();

        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert!(!on_disk.contains("access"));

        let reopened = EncryptedSessionStorage::open(&path, b"secret").await.unwrap();
        assert_eq!(reopened.get().await, Some(auth_info()));
    }

    #[tokio::test]
    async fn test_wrong_secret_means_signed_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.enc");

        let storage = EncryptedSessionStorage::open(&path, b"secret").await.unwrap();
        storage.set(Some(auth_info())).await.unwrap();

        let other = EncryptedSessionStorage::open(&path, b"other secret").await.unwrap();
        assert_eq!(other.get().await, None);
    }

    #[tokio::test]
    async fn test_clear_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.enc");

        let storage = EncryptedSessionStorage::open(&path, b"secret").await.unwrap();
        storage.set(Some(auth_info())).await.unwrap();
        storage.set(None).await.unwrap();

        assert!(!path.exists());
        assert_eq!(storage.get().await, None);
        // Clearing twice is fine
        storage.set(None).await.unwrap();
    }

    #[tokio::test]
    async fn test_garbage_file_means_signed_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.enc");
        std::fs::write(&path, "not base64 at all!").unwrap();

        let storage = EncryptedSessionStorage::open(&path, b"secret").await.unwrap();
        assert_eq!(storage.get().await, None);
    }
}

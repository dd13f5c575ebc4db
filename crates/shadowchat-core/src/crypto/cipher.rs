// ============================================
// File: crates/shadowchat-core/src/crypto/cipher.rs
// ============================================
//! # Message Cipher
//!
//! ## Creation Reason
//! Provides authenticated encryption of chat payloads with AES-GCM,
//! keyed by the per-peer session key.
//!
//! ## Main Functionality
//! - `SymmetricKey`: 16/24/32-byte session key, zeroed on drop
//! - `CipherEngine`: AES-GCM bound to one key, safe to share across threads
//! - `generate`, `encrypt`, `decrypt`: one-shot convenience functions
//!
//! ## Ciphertext Format
//! ```text
//! ┌──────────────────┬─────────────────────────────┬──────────────┐
//! │ Nonce (12 bytes) │ Encrypted payload (n bytes) │ Tag (16)     │
//! └──────────────────┴─────────────────────────────┴──────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - A fresh random nonce is drawn for every call; never pass one in
//! - Decryption either returns the whole plaintext or an error
//!
//! ## Last Modified
//! v0.1.0 - Initial AES-GCM implementation

use std::fmt;

use aes_gcm::aead::consts::U12;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes192;
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{AES_GCM_NONCE_SIZE, AES_GCM_TAG_SIZE, VALID_KEY_SIZES};
use crate::error::{CoreError, Result};

/// AES-192 in GCM mode with the standard 96-bit nonce.
type Aes192Gcm = AesGcm<Aes192, U12>;

/// Bytes added to every plaintext by `encrypt`.
pub const CIPHERTEXT_OVERHEAD: usize = AES_GCM_NONCE_SIZE + AES_GCM_TAG_SIZE;

fn validate_key_size(size: usize) -> Result<()> {
    if VALID_KEY_SIZES.contains(&size) {
        Ok(())
    } else {
        Err(CoreError::InvalidKeySize { size })
    }
}

// ============================================
// SymmetricKey
// ============================================

/// Symmetric session key shared by two peers.
///
/// # Security
/// - Zeroed on drop
/// - Never logged (`Debug` is redacted)
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey(Vec<u8>);

impl SymmetricKey {
    /// Generates a key of `size` bytes from the OS random source.
    ///
    /// # Errors
    /// - `InvalidKeySize` unless `size` is 16, 24 or 32
    /// - `RandomSource` if the OS random source fails
    pub fn generate(size: usize) -> Result<Self> {
        Self::generate_with(size, &mut OsRng)
    }

    /// Generates a key of `size` bytes from the given random source.
    ///
    /// # Errors
    /// Same as [`SymmetricKey::generate`].
    pub fn generate_with<R: RngCore + CryptoRng>(size: usize, rng: &mut R) -> Result<Self> {
        validate_key_size(size)?;

        let mut bytes = vec![0u8; size];
        rng.try_fill_bytes(&mut bytes)
            .map_err(CoreError::random_source)?;
        Ok(Self(bytes))
    }

    /// Creates a key from raw bytes.
    ///
    /// # Errors
    /// Returns `InvalidKeySize` unless `bytes` is 16, 24 or 32 bytes long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        validate_key_size(bytes.len())?;
        Ok(Self(bytes.to_vec()))
    }

    /// Returns the raw key bytes.
    ///
    /// # Security Warning
    /// Do not log or persist the returned bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the key size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymmetricKey({} bytes, [REDACTED])", self.0.len())
    }
}

impl PartialEq for SymmetricKey {
    fn eq(&self, other: &Self) -> bool {
        if self.0.len() != other.0.len() {
            return false;
        }
        // Fold without early exit
        self.0
            .iter()
            .zip(other.0.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl Eq for SymmetricKey {}

// ============================================
// CipherEngine
// ============================================

enum AesVariant {
    Aes128(Aes128Gcm),
    Aes192(Aes192Gcm),
    Aes256(Aes256Gcm),
}

/// AES-GCM engine bound to a single session key.
///
/// The engine holds no per-call state, so one instance can be shared
/// between tasks without locking.
///
/// # Example
/// ```
/// use shadowchat_core::crypto::{CipherEngine, SymmetricKey};
///
/// let key = SymmetricKey::generate(32).unwrap();
/// let engine = CipherEngine::new(&key).unwrap();
///
/// let sealed = engine.encrypt(b"hello").unwrap();
/// assert_eq!(engine.decrypt(&sealed).unwrap(), b"hello");
/// ```
pub struct CipherEngine {
    aead: AesVariant,
}

impl CipherEngine {
    /// Creates an engine for the given key.
    ///
    /// # Errors
    /// Returns `InvalidKeySize` if the key length is not supported.
    pub fn new(key: &SymmetricKey) -> Result<Self> {
        let bytes = key.as_bytes();
        let aead = match bytes.len() {
            16 => AesVariant::Aes128(
                Aes128Gcm::new_from_slice(bytes)
                    .map_err(|_| CoreError::InvalidKeySize { size: 16 })?,
            ),
            24 => AesVariant::Aes192(
                Aes192Gcm::new_from_slice(bytes)
                    .map_err(|_| CoreError::InvalidKeySize { size: 24 })?,
            ),
            32 => AesVariant::Aes256(
                Aes256Gcm::new_from_slice(bytes)
                    .map_err(|_| CoreError::InvalidKeySize { size: 32 })?,
            ),
            size => return Err(CoreError::InvalidKeySize { size }),
        };
        Ok(Self { aead })
    }

    /// Encrypts `plaintext`, returning `nonce ‖ sealed`.
    ///
    /// # Errors
    /// - `RandomSource` if no nonce could be drawn
    /// - `Encryption` if the AEAD seal fails
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.encrypt_with(plaintext, &mut OsRng)
    }

    /// Encrypts `plaintext` drawing the nonce from `rng`.
    ///
    /// # Errors
    /// Same as [`CipherEngine::encrypt`].
    pub fn encrypt_with<R: RngCore + CryptoRng>(
        &self,
        plaintext: &[u8],
        rng: &mut R,
    ) -> Result<Vec<u8>> {
        let mut nonce = [0u8; AES_GCM_NONCE_SIZE];
        rng.try_fill_bytes(&mut nonce)
            .map_err(CoreError::random_source)?;
        let nonce_ref = GenericArray::from_slice(&nonce);

        let sealed = match &self.aead {
            AesVariant::Aes128(c) => c.encrypt(nonce_ref, plaintext),
            AesVariant::Aes192(c) => c.encrypt(nonce_ref, plaintext),
            AesVariant::Aes256(c) => c.encrypt(nonce_ref, plaintext),
        }
        .map_err(|_| CoreError::encryption("AES-GCM seal failed"))?;

        let mut output = Vec::with_capacity(AES_GCM_NONCE_SIZE + sealed.len());
        output.extend_from_slice(&nonce);
        output.extend_from_slice(&sealed);
        Ok(output)
    }

    /// Decrypts `nonce ‖ sealed` produced by [`CipherEngine::encrypt`].
    ///
    /// # Errors
    /// - `MalformedCiphertext` if the input is shorter than a nonce
    /// - `AuthenticationFailed` if the tag does not verify
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < AES_GCM_NONCE_SIZE {
            return Err(CoreError::MalformedCiphertext {
                len: ciphertext.len(),
            });
        }

        let (nonce, body) = ciphertext.split_at(AES_GCM_NONCE_SIZE);
        let nonce_ref = GenericArray::from_slice(nonce);

        match &self.aead {
            AesVariant::Aes128(c) => c.decrypt(nonce_ref, body),
            AesVariant::Aes192(c) => c.decrypt(nonce_ref, body),
            AesVariant::Aes256(c) => c.decrypt(nonce_ref, body),
        }
        .map_err(|_| CoreError::AuthenticationFailed)
    }

    /// Returns the size in bytes of the bound key.
    #[must_use]
    pub const fn key_size(&self) -> usize {
        match self.aead {
            AesVariant::Aes128(_) => 16,
            AesVariant::Aes192(_) => 24,
            AesVariant::Aes256(_) => 32,
        }
    }
}

impl fmt::Debug for CipherEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherEngine")
            .field("key_size", &self.key_size())
            .finish()
    }
}

// ============================================
// Convenience Functions
// ============================================

/// Generates a new session key of `size` bytes.
///
/// # Errors
/// See [`SymmetricKey::generate`].
pub fn generate(size: usize) -> Result<SymmetricKey> {
    SymmetricKey::generate(size)
}

/// Encrypts `plaintext` under `key`.
///
/// # Errors
/// See [`CipherEngine::encrypt`].
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    CipherEngine::new(key)?.encrypt(plaintext)
}

/// Decrypts `ciphertext` under `key`.
///
/// # Errors
/// See [`CipherEngine::decrypt`].
pub fn decrypt(key: &SymmetricKey, ciphertext: &[u8]) -> Result<Vec<u8>> {
    CipherEngine::new(key)?.decrypt(ciphertext)
}

// ============================================
// Tests
// ============================================

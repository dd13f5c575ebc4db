// ============================================
// File: crates/shadowchat-core/src/crypto/exchange.rs
// ============================================
//! # Session Key Exchange
//!
//! ## Creation Reason
//! Bootstraps per-peer session keys: each participant owns one RSA key
//! pair, publishes its public half, and receives session keys wrapped
//! under it with RSA-OAEP (SHA-256).
//!
//! ## Main Functionality
//! - `KeyPair`: Long-lived RSA key pair, PKCS#8 import/export
//! - `KeyExchange`: Generate, export, wrap and unwrap operations
//! - Public key fingerprints for logging
//!
//! ## Public Key Encoding
//! Public keys travel as DER-encoded SubjectPublicKeyInfo, which is
//! deterministic and readable by any X.509 toolkit.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Only wrap session keys; OAEP cannot carry arbitrary messages
//! - Maximum wrap size is `modulus_bytes - 66`
//! - Key generation is slow in debug builds (see workspace profile)
//!
//! ## Last Modified
//! v0.1.0 - Initial RSA-OAEP implementation

use std::fmt;

use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::cipher::SymmetricKey;
use super::{MAX_RSA_BITS, MIN_RSA_BITS};
use crate::error::{CoreError, Result};

/// OAEP padding overhead with SHA-256 (2 * hash length + 2).
pub const OAEP_SHA256_OVERHEAD: usize = 2 * 32 + 2;

fn oaep() -> Oaep {
    Oaep::new::<Sha256>()
}

// ============================================
// KeyPair
// ============================================

/// Long-lived RSA key pair of one participant.
///
/// # Security
/// - The private half is zeroed on drop by the `rsa` crate
/// - `Debug` shows only the public fingerprint
#[derive(Clone)]
pub struct KeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl KeyPair {
    /// Generates a new key pair with a `bits`-bit modulus.
    ///
    /// # Errors
    /// Returns `KeyGeneration` if `bits` is outside
    /// `MIN_RSA_BITS..=MAX_RSA_BITS`, not a multiple of 8, or if the
    /// underlying generator fails.
    pub fn generate(bits: usize) -> Result<Self> {
        if !(MIN_RSA_BITS..=MAX_RSA_BITS).contains(&bits) {
            return Err(CoreError::key_generation(format!(
                "RSA modulus of {bits} bits is outside {MIN_RSA_BITS}..={MAX_RSA_BITS}"
            )));
        }
        if bits % 8 != 0 {
            return Err(CoreError::key_generation(format!(
                "RSA modulus of {bits} bits is not a whole number of bytes"
            )));
        }

        let private = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| CoreError::key_generation(format!("RSA-{bits}: {e}")))?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    /// Restores a key pair from a PKCS#8 DER private key.
    ///
    /// # Errors
    /// Returns `KeyGeneration` if the document is not a valid RSA key.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let private = RsaPrivateKey::from_pkcs8_der(der)
            .map_err(|e| CoreError::key_generation(format!("invalid PKCS#8 key: {e}")))?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    /// Exports the private key as PKCS#8 DER.
    ///
    /// # Errors
    /// Returns `Encryption` if encoding fails.
    pub fn to_pkcs8_der(&self) -> Result<Zeroizing<Vec<u8>>> {
        let doc = self
            .private
            .to_pkcs8_der()
            .map_err(|e| CoreError::encryption(format!("PKCS#8 encoding: {e}")))?;
        Ok(Zeroizing::new(doc.as_bytes().to_vec()))
    }

    /// Returns the public key as SPKI DER.
    ///
    /// # Errors
    /// Returns `Encryption` if encoding fails.
    pub fn public_key_der(&self) -> Result<Vec<u8>> {
        let doc = self
            .public
            .to_public_key_der()
            .map_err(|e| CoreError::encryption(format!("SPKI encoding: {e}")))?;
        Ok(doc.as_bytes().to_vec())
    }

    /// Returns the modulus size in bits.
    #[must_use]
    pub fn modulus_bits(&self) -> usize {
        self.public.size() * 8
    }

    /// Decrypts a secret that was wrapped under this key pair's public key.
    ///
    /// # Errors
    /// Returns `Decryption` if the ciphertext is corrupt or was wrapped
    /// for a different key.
    pub fn unwrap_secret(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        self.private
            .decrypt(oaep(), ciphertext)
            .map(Zeroizing::new)
            .map_err(|_| CoreError::decryption("RSA-OAEP unwrap failed"))
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fingerprint = self
            .public_key_der()
            .map(|der| KeyExchange::fingerprint(&der))
            .unwrap_or_else(|_| "?".into());
        f.debug_struct("KeyPair")
            .field("bits", &self.modulus_bits())
            .field("fingerprint", &fingerprint)
            .field("private", &"[REDACTED]")
            .finish()
    }
}

// ============================================
// KeyExchange
// ============================================

/// Asymmetric operations used to hand session keys to peers.
///
/// # Example
/// ```no_run
/// use shadowchat_core::crypto::{KeyExchange, SymmetricKey};
///
/// let bob = KeyExchange::generate_key_pair(2048).unwrap();
/// let bob_public = KeyExchange::export_public_key(&bob).unwrap();
///
/// let session_key = SymmetricKey::generate(32).unwrap();
/// let wrapped = KeyExchange::wrap_session_key(&bob_public, &session_key).unwrap();
/// let unwrapped = KeyExchange::unwrap_session_key(&bob, &wrapped).unwrap();
/// assert_eq!(session_key, unwrapped);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyExchange;

impl KeyExchange {
    /// Generates a key pair. See [`KeyPair::generate`].
    ///
    /// # Errors
    /// Returns `KeyGeneration` for unsupported modulus sizes.
    pub fn generate_key_pair(bits: usize) -> Result<KeyPair> {
        KeyPair::generate(bits)
    }

    /// Exports the public half of `key_pair` as SPKI DER.
    ///
    /// # Errors
    /// Returns `Encryption` if encoding fails.
    pub fn export_public_key(key_pair: &KeyPair) -> Result<Vec<u8>> {
        key_pair.public_key_der()
    }

    /// Parses an SPKI DER public key received from a peer.
    ///
    /// # Errors
    /// Returns `InvalidPublicKey` if the bytes are not an RSA SPKI document.
    pub fn parse_public_key(der: &[u8]) -> Result<RsaPublicKey> {
        RsaPublicKey::from_public_key_der(der).map_err(CoreError::invalid_public_key)
    }

    /// Largest secret that can be wrapped for the given public key.
    ///
    /// # Errors
    /// Returns `InvalidPublicKey` if the key cannot be parsed.
    pub fn max_wrap_len(their_public_key: &[u8]) -> Result<usize> {
        let public = Self::parse_public_key(their_public_key)?;
        Ok(public.size().saturating_sub(OAEP_SHA256_OVERHEAD))
    }

    /// Encrypts `secret` for the holder of `their_public_key`.
    ///
    /// # Errors
    /// - `InvalidPublicKey` if the key cannot be parsed
    /// - `Encryption` if `secret` exceeds the OAEP block size
    pub fn wrap(their_public_key: &[u8], secret: &[u8]) -> Result<Vec<u8>> {
        let public = Self::parse_public_key(their_public_key)?;

        let max = public.size().saturating_sub(OAEP_SHA256_OVERHEAD);
        if secret.len() > max {
            return Err(CoreError::encryption(format!(
                "secret of {} bytes exceeds the {max}-byte OAEP limit",
                secret.len()
            )));
        }

        public
            .encrypt(&mut OsRng, oaep(), secret)
            .map_err(|e| CoreError::encryption(format!("RSA-OAEP wrap failed: {e}")))
    }

    /// Decrypts a secret wrapped for `key_pair`.
    ///
    /// # Errors
    /// Returns `Decryption` on corrupt or foreign ciphertext.
    pub fn unwrap(key_pair: &KeyPair, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        key_pair.unwrap_secret(ciphertext)
    }

    /// Wraps a session key for the holder of `their_public_key`.
    ///
    /// # Errors
    /// See [`KeyExchange::wrap`].
    pub fn wrap_session_key(their_public_key: &[u8], key: &SymmetricKey) -> Result<Vec<u8>> {
        Self::wrap(their_public_key, key.as_bytes())
    }

    /// Unwraps a session key and checks its size.
    ///
    /// # Errors
    /// - `Decryption` on corrupt or foreign ciphertext
    /// - `InvalidKeySize` if the recovered secret is not a valid AES key
    pub fn unwrap_session_key(key_pair: &KeyPair, ciphertext: &[u8]) -> Result<SymmetricKey> {
        let secret = Self::unwrap(key_pair, ciphertext)?;
        SymmetricKey::from_bytes(&secret)
    }

    /// Short hex fingerprint of a public key, safe to log.
    #[must_use]
    pub fn fingerprint(public_key: &[u8]) -> String {
        let digest = Sha256::digest(public_key);
        hex::encode(&digest[..8])
    }
}

// ============================================
// Tests
// ============================================

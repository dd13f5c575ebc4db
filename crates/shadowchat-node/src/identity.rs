// ============================================
// File: crates/shadowchat-node/src/identity.rs
// ============================================
//! # Client Identity Key File
//!
//! ## Creation Reason
//! Lets a client keep the same RSA key pair across runs so peers see a
//! stable fingerprint.
//!
//! ## File Format
//! ```json
//! {
//!   "version": "1.0",
//!   "key_type": "rsa-oaep-sha256",
//!   "modulus_bits": 2048,
//!   "public_key": "<base64 SPKI DER>",
//!   "private_key": "<base64 PKCS#8 DER>",
//!   "fingerprint": "sha256:…",
//!   "created_at": "1760832000Z"
//! }
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The file holds the private key; it is written with mode 0600 on Unix
//! - `public_key` and `fingerprint` are informational; the private key
//!   is the source of truth on load
//!
//! ## Last Modified
//! v0.1.0 - Initial key file support

use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use shadowchat_core::{KeyExchange, KeyPair};

use crate::error::{NodeError, Result};

/// Key file format version.
const KEY_FILE_VERSION: &str = "1.0";

/// Key type label written to the file.
const KEY_TYPE: &str = "rsa-oaep-sha256";

/// On-disk key file.
#[derive(Debug, Serialize, Deserialize)]
struct KeyFile {
    version: String,
    key_type: String,
    modulus_bits: usize,
    public_key: String,
    private_key: String,
    fingerprint: String,
    created_at: String,
}

/// Writes `identity` to `path`, creating parent directories.
///
/// # Errors
/// Returns `KeyFile` if the key cannot be encoded or written.
pub async fn save(identity: &KeyPair, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let shown = path.display().to_string();

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| NodeError::key_file(&shown, e))?;
        }
    }

    let public_key = identity.public_key_der()?;
    let private_key = identity.to_pkcs8_der()?;
    let key_data = KeyFile {
        version: KEY_FILE_VERSION.to_string(),
        key_type: KEY_TYPE.to_string(),
        modulus_bits: identity.modulus_bits(),
        fingerprint: KeyExchange::fingerprint(&public_key),
        public_key: BASE64.encode(&public_key),
        private_key: BASE64.encode(private_key.as_slice()),
        created_at: unix_timestamp(),
    };

    let content = serde_json::to_string_pretty(&key_data).map_err(|e| NodeError::key_file(&shown, e))?;
    tokio::fs::write(path, content)
        .await
        .map_err(|e| NodeError::key_file(&shown, e))?;

    // Set restrictive permissions on Unix
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(|e| NodeError::key_file(&shown, e))?;
    }

    info!(path = %shown, fingerprint = %key_data.fingerprint, "Identity key saved");
    Ok(())
}

/// Reads an identity from `path`.
///
/// # Errors
/// Returns `KeyFile` if the file is missing, malformed, or holds an
/// unusable key.
pub async fn load(path: impl AsRef<Path>) -> Result<KeyPair> {
    let path = path.as_ref();
    let shown = path.display().to_string();

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| NodeError::key_file(&shown, e))?;
    let key_data: KeyFile = serde_json::from_str(&content).map_err(|e| NodeError::key_file(&shown, e))?;

    if key_data.key_type != KEY_TYPE {
        return Err(NodeError::key_file(
            &shown,
            format!("unsupported key type '{}'", key_data.key_type),
        ));
    }

    let der = zeroize::Zeroizing::new(
        BASE64
            .decode(key_data.private_key.as_bytes())
            .map_err(|e| NodeError::key_file(&shown, e))?,
    );
    let identity = KeyPair::from_pkcs8_der(&der).map_err(|e| NodeError::key_file(&shown, e))?;

    debug!(path = %shown, bits = identity.modulus_bits(), "Identity key loaded");
    Ok(identity)
}

/// Loads the identity at `path`, or generates one with `bits` and saves it.
///
/// # Errors
/// Returns an error if an existing file is unreadable or the new key
/// cannot be generated or written.
pub async fn load_or_generate(path: impl AsRef<Path>, bits: usize) -> Result<KeyPair> {
    let path = path.as_ref();
    let exists = tokio::fs::try_exists(path)
        .await
        .map_err(|e| NodeError::key_file(path.display().to_string(), e))?;
    if exists {
        return load(path).await;
    }

    let identity = generate(bits).await?;
    save(&identity, path).await?;
    Ok(identity)
}

/// Generates a key pair off the async runtime.
///
/// # Errors
/// Returns an error if key generation fails.
pub async fn generate(bits: usize) -> Result<KeyPair> {
    info!(bits, "Generating identity key");
    tokio::task::spawn_blocking(move || KeyExchange::generate_key_pair(bits))
        .await
        .map_err(|e| NodeError::internal(format!("key generation task failed: {e}")))?
        .map_err(NodeError::from)
}

/// Returns the current Unix time as `<seconds>Z`.
fn unix_timestamp() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let duration = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    format!("{}Z", duration.as_secs())
}

// ============================================
// Tests
// ============================================

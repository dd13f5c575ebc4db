// ============================================
// File: crates/shadowchat-core/src/crypto/keystore.rs
// ============================================
//! # Key Store
//!
//! ## Creation Reason
//! Holds what a participant knows about its peers: their public keys
//! and the session keys agreed with them. Replaces any process-wide key
//! registry; one store is built at startup and handed to each session.
//!
//! ## Main Functionality
//! - Public key map: `UserId → SPKI DER`
//! - Session key map: `UserId → SymmetricKey`
//! - Atomic removal of both entries for a departing user
//!
//! ## Thread Safety
//! Both maps sit behind a single `parking_lot::RwLock`, so a reader
//! never sees one map updated and the other not.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Install a session key only after a completed exchange
//! - Never hold the lock across an await point
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use shadowchat_common::UserId;

use super::cipher::SymmetricKey;
use crate::error::Result;

#[derive(Default)]
struct Entries {
    public_keys: HashMap<UserId, Vec<u8>>,
    symmetric_keys: HashMap<UserId, SymmetricKey>,
}

/// Thread-safe store of peer public keys and session keys.
///
/// # Example
/// ```
/// use shadowchat_common::UserId;
/// use shadowchat_core::crypto::{KeyStore, SymmetricKey};
///
/// let store = KeyStore::new();
/// let bob = UserId::new("bob").unwrap();
///
/// assert!(store.symmetric_key(&bob).is_none());
/// store.put_symmetric_key(bob.clone(), SymmetricKey::generate(32).unwrap());
/// assert!(store.has_symmetric_key(&bob));
/// ```
#[derive(Default)]
pub struct KeyStore {
    entries: RwLock<Entries>,
}

impl KeyStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================
    // Public Keys
    // ========================================

    /// Records the public key of `user`, replacing any previous one.
    pub fn put_public_key(&self, user: UserId, public_key: Vec<u8>) {
        debug!(user_id = %user, "Storing public key");
        self.entries.write().public_keys.insert(user, public_key);
    }

    /// Returns the public key of `user`, if known.
    #[must_use]
    pub fn public_key(&self, user: &UserId) -> Option<Vec<u8>> {
        self.entries.read().public_keys.get(user).cloned()
    }

    /// Removes and returns the public key of `user`.
    pub fn remove_public_key(&self, user: &UserId) -> Option<Vec<u8>> {
        self.entries.write().public_keys.remove(user)
    }

    // ========================================
    // Session Keys
    // ========================================

    /// Installs the session key shared with `user`, replacing any previous one.
    pub fn put_symmetric_key(&self, user: UserId, key: SymmetricKey) {
        debug!(user_id = %user, key_size = key.size(), "Installing session key");
        self.entries.write().symmetric_keys.insert(user, key);
    }

    /// Returns the session key shared with `user`, if one was agreed.
    #[must_use]
    pub fn symmetric_key(&self, user: &UserId) -> Option<SymmetricKey> {
        self.entries.read().symmetric_keys.get(user).cloned()
    }

    /// Returns `true` if a session key exists for `user`.
    #[must_use]
    pub fn has_symmetric_key(&self, user: &UserId) -> bool {
        self.entries.read().symmetric_keys.contains_key(user)
    }

    /// Removes and returns the session key shared with `user`.
    pub fn remove_symmetric_key(&self, user: &UserId) -> Option<SymmetricKey> {
        self.entries.write().symmetric_keys.remove(user)
    }

    /// Returns the existing session key for `user` or installs a new one
    /// of `size` bytes. The boolean is `true` when the key was created.
    ///
    /// Check and insert happen under one write lock, so two concurrent
    /// callers agree on the same key.
    ///
    /// # Errors
    /// Propagates key generation errors; nothing is installed on failure.
    pub fn symmetric_key_or_generate(
        &self,
        user: &UserId,
        size: usize,
    ) -> Result<(SymmetricKey, bool)> {
        let mut entries = self.entries.write();
        if let Some(existing) = entries.symmetric_keys.get(user) {
            return Ok((existing.clone(), false));
        }

        let key = SymmetricKey::generate(size)?;
        entries.symmetric_keys.insert(user.clone(), key.clone());
        drop(entries);

        debug!(user_id = %user, key_size = size, "Generated session key");
        Ok((key, true))
    }

    /// Users with an agreed session key.
    #[must_use]
    pub fn keyed_users(&self) -> Vec<UserId> {
        let mut users: Vec<_> = self.entries.read().symmetric_keys.keys().cloned().collect();
        users.sort();
        users
    }

    // ========================================
    // Bulk Operations
    // ========================================

    /// Forgets everything known about `user`.
    pub fn remove_user(&self, user: &UserId) {
        let mut entries = self.entries.write();
        let had_public = entries.public_keys.remove(user).is_some();
        let had_session = entries.symmetric_keys.remove(user).is_some();
        drop(entries);

        if had_public || had_session {
            debug!(user_id = %user, "Removed keys for user");
        }
    }

    /// Number of known public keys.
    #[must_use]
    pub fn public_key_count(&self) -> usize {
        self.entries.read().public_keys.len()
    }

    /// Number of agreed session keys.
    #[must_use]
    pub fn symmetric_key_count(&self) -> usize {
        self.entries.read().symmetric_keys.len()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        entries.public_keys.clear();
        entries.symmetric_keys.clear();
    }
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.entries.read();
        f.debug_struct("KeyStore")
            .field("public_keys", &entries.public_keys.len())
            .field("symmetric_keys", &entries.symmetric_keys.len())
            .finish()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn user(name: &str) -> UserId {
        UserId::new(name).unwrap()
    }

    #[test]
    fn test_missing_entries_are_absent() {
        let store = KeyStore::new();
        assert!(store.public_key(&user("nobody")).is_none());
        assert!(store.symmetric_key(&user("nobody")).is_none());
        assert!(!store.has_symmetric_key(&user("nobody")));
    }

    #[test]
    fn test_put_get_remove_public_key() {
        let store = KeyStore::new();
        store.put_public_key(user("alice"), vec![1, 2, 3]);
        assert_eq!(store.public_key(&user("alice")), Some(vec![1, 2, 3]));
        assert_eq!(store.public_key_count(), 1);

        assert_eq!(store.remove_public_key(&user("alice")), Some(vec![1, 2, 3]));
        assert!(store.public_key(&user("alice")).is_none());
        assert!(store.remove_public_key(&user("alice")).is_none());
    }

    #[test]
    fn test_put_get_remove_symmetric_key() {
        let store = KeyStore::new();
        let key = SymmetricKey::generate(16).unwrap();
        store.put_symmetric_key(user("bob"), key.clone());

        assert_eq!(store.symmetric_key(&user("bob")), Some(key.clone()));
        assert_eq!(store.keyed_users(), vec![user("bob")]);
        assert_eq!(store.remove_symmetric_key(&user("bob")), Some(key));
        assert_eq!(store.symmetric_key_count(), 0);
    }

    #[test]
    fn test_remove_user_clears_both_maps() {
        let store = KeyStore::new();
        store.put_public_key(user("carol"), vec![9]);
        store.put_symmetric_key(user("carol"), SymmetricKey::generate(32).unwrap());
        store.put_public_key(user("dave"), vec![8]);

        store.remove_user(&user("carol"));
        assert!(store.public_key(&user("carol")).is_none());
        assert!(store.symmetric_key(&user("carol")).is_none());
        assert_eq!(store.public_key_count(), 1);

        store.clear();
        assert_eq!(store.public_key_count(), 0);
    }

    #[test]
    fn test_symmetric_key_or_generate() {
        let store = KeyStore::new();
        let (first, created) = store.symmetric_key_or_generate(&user("eve"), 24).unwrap();
        assert!(created);
        assert_eq!(first.size(), 24);

        let (second, created) = store.symmetric_key_or_generate(&user("eve"), 32).unwrap();
        assert!(!created);
        assert_eq!(first, second);

        assert!(store
            .symmetric_key_or_generate(&user("frank"), 17)
            .is_err());
        assert!(!store.has_symmetric_key(&user("frank")));
    }

    #[test]
    fn test_concurrent_generate_agrees() {
        let store = Arc::new(KeyStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store.symmetric_key_or_generate(&user("grace"), 32).unwrap().0
                })
            })
            .collect();

        let keys: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(keys.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(store.symmetric_key_count(), 1);
    }

    #[test]
    fn test_debug_hides_keys() {
        let store = KeyStore::new();
        store.put_symmetric_key(user("heidi"), SymmetricKey::from_bytes(&[0x55; 16]).unwrap());
        let debug = format!("{:?}", store);
        assert!(debug.contains("symmetric_keys: 1"));
        assert!(!debug.contains("heidi"));
    }
}

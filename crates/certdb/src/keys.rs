//! Private key presence checks.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::cert::CertificateHandle;

/// A key storage slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeySlot {
    /// Token name, used as the nickname prefix for non-internal slots
    pub token_name: String,
    /// True for the built-in software store
    pub internal: bool,
}

impl KeySlot {
    /// The built-in software slot.
    #[must_use]
    pub fn internal() -> Self {
        Self {
            token_name: String::from("Software Security Device"),
            internal: true,
        }
    }

    /// A hardware token.
    #[must_use]
    pub fn token(name: impl Into<String>) -> Self {
        Self {
            token_name: name.into(),
            internal: false,
        }
    }
}

/// Answers whether a private key exists for a certificate.
pub trait KeyStoreProbe: Send + Sync {
    /// Slot holding the private key matching `cert`'s public key.
    fn key_slot_for(&self, cert: &CertificateHandle) -> Option<KeySlot>;

    fn has_private_key_for(&self, cert: &CertificateHandle) -> bool {
        self.key_slot_for(cert).is_some()
    }
}

/// Key registry indexed by SHA-256 of the subject public key info.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    keys: RwLock<HashMap<String, KeySlot>>,
}

impl MemoryKeyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `slot` holds the private key for `cert`.
    pub fn register(&self, cert: &CertificateHandle, slot: KeySlot) {
        self.register_spki(cert.spki_fingerprint(), slot);
    }

    /// Record a key by public key fingerprint (lowercase hex SHA-256).
    pub fn register_spki(&self, spki_fingerprint: &str, slot: KeySlot) {
        self.keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(spki_fingerprint.to_ascii_lowercase(), slot);
    }
}

impl KeyStoreProbe for MemoryKeyStore {
    fn key_slot_for(&self, cert: &CertificateHandle) -> Option<KeySlot> {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(cert.spki_fingerprint())
            .cloned()
    }
}

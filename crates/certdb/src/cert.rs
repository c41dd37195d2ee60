//! Parsed certificate handles.
//!
//! A [`CertificateHandle`] is cheap to clone: the parsed fields live behind
//! an `Arc` and only the persistence state is per-handle. Handles start out
//! temporary; a store commit hands back a permanent one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use certdb_core::{CertUsage, DbKey, NamedCert};

/// Extended key usage purposes carried by a certificate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct KeyPurposes {
    /// anyExtendedKeyUsage
    pub any: bool,
    /// id-kp-serverAuth
    pub server_auth: bool,
    /// id-kp-clientAuth
    pub client_auth: bool,
    /// id-kp-emailProtection
    pub email_protection: bool,
    /// id-kp-codeSigning
    pub code_signing: bool,
}

impl KeyPurposes {
    /// Whether these purposes allow the certificate to be used for `usage`.
    ///
    /// CA usages are not restricted by extended key usage.
    #[must_use]
    pub const fn permits(&self, usage: CertUsage) -> bool {
        if self.any {
            return true;
        }
        match usage {
            CertUsage::SslClient => self.client_auth,
            CertUsage::SslServer => self.server_auth,
            CertUsage::EmailSigner | CertUsage::EmailRecipient => self.email_protection,
            CertUsage::ObjectSigner => self.code_signing,
            CertUsage::SslCa | CertUsage::VerifyCa => true,
        }
    }
}

/// Where a handle lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Persistence {
    /// Decoded or staged, never committed
    Temporary,
    /// Committed under a nickname, optionally on a hardware token
    Permanent {
        /// Label unique within its trust domain
        nickname: String,
        /// Token holding the certificate, `None` for the internal store
        token: Option<String>,
    },
}

/// Everything a decoder extracts from one certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertFields {
    /// Raw DER
    pub der: Vec<u8>,
    /// Subject distinguished name, display form
    pub subject: String,
    /// DER-encoded subject name
    pub subject_raw: Vec<u8>,
    /// Issuer distinguished name, display form
    pub issuer: String,
    /// DER-encoded issuer name
    pub issuer_raw: Vec<u8>,
    /// Serial number bytes
    pub serial: Vec<u8>,
    /// First subject common name
    pub common_name: Option<String>,
    /// First subject organization
    pub organization: Option<String>,
    /// First subject organizational unit
    pub organizational_unit: Option<String>,
    /// First issuer organization
    pub issuer_organization: Option<String>,
    /// Addresses from the subject and the alternative name extension
    pub emails: Vec<String>,
    /// DNS names from the alternative name extension
    pub dns_names: Vec<String>,
    /// Basic constraints CA flag
    pub is_ca: bool,
    /// Basic constraints path length limit
    pub path_len_constraint: Option<u32>,
    /// Extended key usage, `None` when the extension is absent
    pub key_purposes: Option<KeyPurposes>,
    /// Start of validity
    pub not_before: DateTime<Utc>,
    /// End of validity
    pub not_after: DateTime<Utc>,
    /// DER of the subject public key info
    pub spki: Vec<u8>,
}

struct CertInner {
    fields: CertFields,
    fingerprint: String,
    spki_fingerprint: String,
}

/// Owned reference to a parsed certificate.
#[derive(Clone)]
pub struct CertificateHandle {
    inner: Arc<CertInner>,
    persistence: Persistence,
}

impl CertificateHandle {
    /// Wrap decoded fields in a temporary handle.
    #[must_use]
    pub fn new(fields: CertFields) -> Self {
        let fingerprint = sha256_hex(&fields.der);
        let spki_fingerprint = sha256_hex(&fields.spki);
        Self {
            inner: Arc::new(CertInner {
                fields,
                fingerprint,
                spki_fingerprint,
            }),
            persistence: Persistence::Temporary,
        }
    }

    /// Promote to a permanent handle. The parsed data is shared, not copied.
    #[must_use]
    pub fn into_permanent(self, nickname: impl Into<String>, token: Option<String>) -> Self {
        Self {
            inner: self.inner,
            persistence: Persistence::Permanent {
                nickname: nickname.into(),
                token,
            },
        }
    }

    /// A temporary handle sharing this certificate's data.
    #[must_use]
    pub fn to_temporary(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            persistence: Persistence::Temporary,
        }
    }

    /// Raw DER
    pub fn der(&self) -> &[u8] {
        &self.inner.fields.der
    }

    /// Lowercase hex SHA-256 of the DER
    pub fn fingerprint(&self) -> &str {
        &self.inner.fingerprint
    }

    /// Lowercase hex SHA-256 of the subject public key info
    pub fn spki_fingerprint(&self) -> &str {
        &self.inner.spki_fingerprint
    }

    /// Subject name, display form
    pub fn subject(&self) -> &str {
        &self.inner.fields.subject
    }

    /// DER subject name
    pub fn subject_raw(&self) -> &[u8] {
        &self.inner.fields.subject_raw
    }

    /// Issuer name, display form
    pub fn issuer(&self) -> &str {
        &self.inner.fields.issuer
    }

    /// DER issuer name
    pub fn issuer_raw(&self) -> &[u8] {
        &self.inner.fields.issuer_raw
    }

    /// Serial number bytes
    pub fn serial(&self) -> &[u8] {
        &self.inner.fields.serial
    }

    pub fn common_name(&self) -> Option<&str> {
        self.inner.fields.common_name.as_deref()
    }

    pub fn organization(&self) -> Option<&str> {
        self.inner.fields.organization.as_deref()
    }

    pub fn organizational_unit(&self) -> Option<&str> {
        self.inner.fields.organizational_unit.as_deref()
    }

    pub fn issuer_organization(&self) -> Option<&str> {
        self.inner.fields.issuer_organization.as_deref()
    }

    pub fn emails(&self) -> &[String] {
        &self.inner.fields.emails
    }

    /// Case-insensitive address match.
    pub fn has_email(&self, address: &str) -> bool {
        self.emails().iter().any(|e| e.eq_ignore_ascii_case(address))
    }

    pub fn dns_names(&self) -> &[String] {
        &self.inner.fields.dns_names
    }

    pub fn is_ca(&self) -> bool {
        self.inner.fields.is_ca
    }

    pub fn path_len_constraint(&self) -> Option<u32> {
        self.inner.fields.path_len_constraint
    }

    pub fn key_purposes(&self) -> Option<&KeyPurposes> {
        self.inner.fields.key_purposes.as_ref()
    }

    pub fn not_before(&self) -> DateTime<Utc> {
        self.inner.fields.not_before
    }

    pub fn not_after(&self) -> DateTime<Utc> {
        self.inner.fields.not_after
    }

    /// Subject and issuer names are identical.
    pub fn is_self_issued(&self) -> bool {
        self.subject_raw() == self.issuer_raw()
    }

    pub const fn persistence(&self) -> &Persistence {
        &self.persistence
    }

    pub const fn is_permanent(&self) -> bool {
        matches!(self.persistence, Persistence::Permanent { .. })
    }

    /// Nickname of a permanent handle
    pub fn nickname(&self) -> Option<&str> {
        match &self.persistence {
            Persistence::Permanent { nickname, .. } => Some(nickname),
            Persistence::Temporary => None,
        }
    }

    /// Token of a permanent handle stored outside the internal store
    pub fn token(&self) -> Option<&str> {
        match &self.persistence {
            Persistence::Permanent { token, .. } => token.as_deref(),
            Persistence::Temporary => None,
        }
    }

    /// Issuer and serial lookup key
    #[must_use]
    pub fn db_key(&self) -> DbKey {
        DbKey::new(self.serial(), self.issuer_raw())
    }

    /// Same certificate bytes, regardless of persistence.
    pub fn same_cert(&self, other: &Self) -> bool {
        self.fingerprint() == other.fingerprint()
    }
}

impl NamedCert for CertificateHandle {
    fn subject_name(&self) -> &str {
        self.subject()
    }

    fn issuer_name(&self) -> &str {
        self.issuer()
    }
}

impl fmt::Debug for CertificateHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateHandle")
            .field("subject", &self.subject())
            .field("issuer", &self.issuer())
            .field("fingerprint", &self.fingerprint())
            .field("persistence", &self.persistence)
            .finish()
    }
}

fn sha256_hex(data: &[u8]) -> String {
    let digest = ring::digest::digest(&ring::digest::SHA256, data);
    hex::encode(digest.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fields(der: &[u8]) -> CertFields {
        CertFields {
            der: der.to_vec(),
            subject: "CN=Leaf".into(),
            subject_raw: vec![1],
            issuer: "CN=Root".into(),
            issuer_raw: vec![2],
            serial: vec![0x10],
            common_name: Some("Leaf".into()),
            organization: None,
            organizational_unit: None,
            issuer_organization: Some("Root Org".into()),
            emails: vec!["Leaf@Example.com".into()],
            dns_names: Vec::new(),
            is_ca: false,
            path_len_constraint: None,
            key_purposes: None,
            not_before: Utc.timestamp_opt(0, 0).unwrap(),
            not_after: Utc.timestamp_opt(4_000_000_000, 0).unwrap(),
            spki: vec![3, 4],
        }
    }

    #[test]
    fn fingerprint_is_sha256_of_der() {
        let handle = CertificateHandle::new(fields(b"hello world"));
        assert_eq!(
            handle.fingerprint(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn promotion_shares_data() {
        let temp = CertificateHandle::new(fields(b"der"));
        assert!(!temp.is_permanent());
        assert_eq!(temp.nickname(), None);

        let perm = temp.clone().into_permanent("Leaf", Some("Token".into()));
        assert!(perm.is_permanent());
        assert_eq!(perm.nickname(), Some("Leaf"));
        assert_eq!(perm.token(), Some("Token"));
        assert!(perm.same_cert(&temp));
        assert!(!perm.to_temporary().is_permanent());
    }

    #[test]
    fn db_key_uses_issuer_and_serial() {
        let handle = CertificateHandle::new(fields(b"der"));
        let key = handle.db_key();
        assert_eq!(key.serial, vec![0x10]);
        assert_eq!(key.issuer, vec![2]);
    }

    #[test]
    fn email_match_ignores_case() {
        let handle = CertificateHandle::new(fields(b"der"));
        assert!(handle.has_email("leaf@example.com"));
        assert!(!handle.has_email("other@example.com"));
    }

    #[test]
    fn key_purposes_gate_usages() {
        let email_only = KeyPurposes {
            email_protection: true,
            ..KeyPurposes::default()
        };
        assert!(email_only.permits(CertUsage::EmailRecipient));
        assert!(!email_only.permits(CertUsage::SslServer));
        assert!(email_only.permits(CertUsage::VerifyCa));

        let any = KeyPurposes {
            any: true,
            ..KeyPurposes::default()
        };
        assert!(any.permits(CertUsage::ObjectSigner));
    }
}

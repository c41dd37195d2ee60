//! Trust bit management for stored certificates.

use std::sync::Arc;
use tracing::{debug, info};

use certdb_core::{CertDbError, CertType, Result, TrustBits, TrustKind, TrustRecord};

use crate::cert::CertificateHandle;
use crate::store::TrustStore;

/// Reads and writes trust records through a [`TrustStore`].
pub struct TrustManager {
    store: Arc<dyn TrustStore>,
}

impl TrustManager {
    pub fn new(store: Arc<dyn TrustStore>) -> Self {
        Self { store }
    }

    /// Replace the certificate's record with one built for `cert_type`.
    ///
    /// User certificates keep whatever they have.
    pub fn set_trust(
        &self,
        cert: &CertificateHandle,
        cert_type: CertType,
        requested: TrustBits,
    ) -> Result<()> {
        let Some(record) = TrustRecord::for_cert_type(cert_type, requested) else {
            debug!(subject = cert.subject(), "user certificate trust left unchanged");
            return Ok(());
        };
        self.store.authenticate()?;
        self.store.set_trust(cert, &record)?;
        info!(subject = cert.subject(), %cert_type, trust = %record, "trust updated");
        Ok(())
    }

    /// Write a trust string such as `"CT,C,c"` verbatim.
    pub fn set_trust_from_string(&self, cert: &CertificateHandle, trust: &str) -> Result<()> {
        let record: TrustRecord = trust.parse()?;
        self.store.authenticate()?;
        self.store.set_trust(cert, &record)?;
        info!(subject = cert.subject(), trust = %record, "trust updated from string");
        Ok(())
    }

    pub fn is_trusted(
        &self,
        cert: &CertificateHandle,
        cert_type: CertType,
        kind: TrustKind,
    ) -> Result<bool> {
        let record = self
            .store
            .get_trust(cert)?
            .ok_or_else(|| CertDbError::MissingTrust {
                subject: cert.subject().to_string(),
            })?;
        Ok(match cert_type {
            CertType::Ca => record.has_trusted_ca(kind),
            CertType::Server | CertType::Email => record.has_trusted_peer(kind),
            CertType::User => false,
        })
    }

    /// Delete a certificate.
    ///
    /// Identity certificates are removed from the store. Anything else is
    /// kept with an all-clear record, so it stays known but untrusted.
    /// Both require an authenticated store.
    pub fn delete(&self, cert: &CertificateHandle) -> Result<()> {
        let record = self.store.get_trust(cert)?;
        let cert_type = CertType::classify(cert.is_ca(), !cert.emails().is_empty(), record.as_ref());
        self.store.authenticate()?;
        if cert_type == CertType::User {
            self.store.remove(cert)?;
            info!(subject = cert.subject(), "removed user certificate");
        } else {
            self.store.set_trust(cert, &TrustRecord::untrusted())?;
            info!(subject = cert.subject(), %cert_type, "certificate distrusted");
        }
        Ok(())
    }
}

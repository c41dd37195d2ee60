//! The persistent trust store seam.

use certdb_core::{Result, TrustRecord};

use crate::cert::CertificateHandle;

/// Storage for certificates and their trust records.
///
/// Lookups that can miss return `Ok(None)` or an empty list; `Err` is kept
/// for store failures. Handles returned for permanent entries carry their
/// nickname and token.
pub trait TrustStore: Send + Sync {
    /// Permanent certificate with this issuer name and serial number.
    fn find_by_issuer_serial(&self, issuer: &[u8], serial: &[u8])
        -> Result<Option<CertificateHandle>>;

    /// Permanent certificate carrying this nickname in any domain.
    fn find_by_nickname(&self, nickname: &str) -> Result<Option<CertificateHandle>>;

    /// Permanent certificates on `token` carrying this nickname.
    fn find_on_token(&self, token: &str, nickname: &str) -> Result<Vec<CertificateHandle>>;

    /// Certificate with identical DER, permanent copy preferred over a staged one.
    fn find_by_der(&self, der: &[u8]) -> Result<Option<CertificateHandle>>;

    /// Certificates with this DER subject name, staged ones included.
    fn find_by_subject(&self, subject: &[u8]) -> Result<Vec<CertificateHandle>>;

    /// Permanent certificates carrying this e-mail address.
    fn find_by_email(&self, email: &str) -> Result<Vec<CertificateHandle>>;

    /// Every permanent certificate.
    fn list(&self) -> Result<Vec<CertificateHandle>>;

    /// Place a certificate in the temporary area so path building can see it.
    fn stage_temporary(&self, cert: &CertificateHandle) -> Result<()>;

    /// Drop whichever of `certs` are still temporary.
    fn discard_temporary(&self, certs: &[CertificateHandle]) -> Result<()>;

    /// Write a certificate to permanent storage with `trust`.
    ///
    /// Committing a certificate that is already permanent replaces its
    /// trust record and placement.
    fn commit_permanent(
        &self,
        cert: &CertificateHandle,
        nickname: &str,
        token: Option<&str>,
        trust: &TrustRecord,
    ) -> Result<CertificateHandle>;

    /// Replace the trust record of a stored certificate.
    fn set_trust(&self, cert: &CertificateHandle, trust: &TrustRecord) -> Result<()>;

    /// Trust record of a stored certificate, `None` if it has none.
    fn get_trust(&self, cert: &CertificateHandle) -> Result<Option<TrustRecord>>;

    /// Physically remove a certificate.
    fn remove(&self, cert: &CertificateHandle) -> Result<()>;

    /// Log in before trust mutation. Stores without a login always succeed.
    fn authenticate(&self) -> Result<()> {
        Ok(())
    }
}

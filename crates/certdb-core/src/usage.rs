//! Verification usages and verifier error codes.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::trust::TrustKind;

/// Purpose a certificate is verified for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertUsage {
    /// TLS client authentication
    SslClient,
    /// TLS server authentication
    SslServer,
    /// Issuing CA for TLS
    SslCa,
    /// S/MIME signer
    EmailSigner,
    /// S/MIME recipient
    EmailRecipient,
    /// Code or object signer
    ObjectSigner,
    /// Any CA, used when importing CA material
    VerifyCa,
}

impl CertUsage {
    /// Trust kind an anchor must be trusted for. `None` accepts any kind.
    #[must_use]
    pub const fn trust_kind(self) -> Option<TrustKind> {
        match self {
            Self::SslClient | Self::SslServer | Self::SslCa => Some(TrustKind::Ssl),
            Self::EmailSigner | Self::EmailRecipient => Some(TrustKind::Email),
            Self::ObjectSigner => Some(TrustKind::ObjectSigning),
            Self::VerifyCa => None,
        }
    }

    /// Whether the certificate under test must itself be a CA.
    #[must_use]
    pub const fn requires_ca(self) -> bool {
        matches!(self, Self::SslCa | Self::VerifyCa)
    }
}

impl fmt::Display for CertUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SslClient => "ssl-client",
            Self::SslServer => "ssl-server",
            Self::SslCa => "ssl-ca",
            Self::EmailSigner => "email-signer",
            Self::EmailRecipient => "email-recipient",
            Self::ObjectSigner => "object-signer",
            Self::VerifyCa => "verify-ca",
        };
        f.write_str(name)
    }
}

/// Why a verifier rejected a certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyErrorCode {
    /// No issuer could be found
    UnknownIssuer,
    /// The path ends at an issuer nobody trusts
    UntrustedIssuer,
    /// The certificate itself is explicitly distrusted
    UntrustedCert,
    /// Past its validity window
    Expired,
    /// Before its validity window
    NotYetValid,
    /// Issuer signature does not verify
    BadSignature,
    /// Extended key usage does not permit the usage
    InadequateKeyUsage,
    /// A CA was required, or an issuer is not a CA
    InadequateCertType,
    /// Hostname does not match the certificate
    BadCertDomain,
    /// Path longer than the configured limit
    PathLengthExceeded,
    /// Extended validation was required but not established
    NotEv,
}

impl fmt::Display for VerifyErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::UnknownIssuer => "issuer certificate is unknown",
            Self::UntrustedIssuer => "issuer certificate is not trusted",
            Self::UntrustedCert => "certificate is explicitly distrusted",
            Self::Expired => "certificate has expired",
            Self::NotYetValid => "certificate is not yet valid",
            Self::BadSignature => "signature does not verify",
            Self::InadequateKeyUsage => "key usage does not permit this use",
            Self::InadequateCertType => "certificate type does not permit this use",
            Self::BadCertDomain => "certificate is not valid for the requested host",
            Self::PathLengthExceeded => "certification path is too long",
            Self::NotEv => "extended validation not established",
        };
        f.write_str(msg)
    }
}

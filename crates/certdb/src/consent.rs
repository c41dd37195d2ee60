//! User interaction seam: CA download consent and import alerts.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

use certdb_core::{Result, TrustBits};

use crate::cert::CertificateHandle;

/// The user's answer to a CA download prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentDecision {
    /// Whether to import at all
    pub allowed: bool,
    /// Usages the CA is trusted for
    pub trust: TrustBits,
}

impl ConsentDecision {
    /// Refuse the import.
    pub const DECLINED: Self = Self {
        allowed: false,
        trust: TrustBits::NONE,
    };

    /// Import and trust for `trust`.
    #[must_use]
    pub const fn allow(trust: TrustBits) -> Self {
        Self {
            allowed: true,
            trust,
        }
    }
}

/// Notices shown to the user during imports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Alert {
    /// The presented certificate is not a CA
    NotACaCert,
    /// The presented CA is already stored
    CaCertExists,
    /// A bundle member failed verification and was left out
    NotImportingUnverifiedCert,
    /// No private key matches the identity certificate
    UserCertIgnoredNoPrivateKey,
    /// The identity certificate was stored
    UserCertImported,
}

impl Alert {
    /// Stable key for looking up localized text.
    #[must_use]
    pub const fn message_key(self) -> &'static str {
        match self {
            Self::NotACaCert => "NotACACert",
            Self::CaCertExists => "CaCertExists",
            Self::NotImportingUnverifiedCert => "NotImportingUnverifiedCert",
            Self::UserCertIgnoredNoPrivateKey => "UserCertIgnoredNoPrivateKey",
            Self::UserCertImported => "UserCertImported",
        }
    }

    /// Whether the alert reports a problem rather than a success.
    #[must_use]
    pub const fn is_problem(self) -> bool {
        !matches!(self, Self::UserCertImported)
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message_key())
    }
}

/// Asks the user and tells the user.
pub trait UserConsent: Send + Sync {
    /// Ask whether to import `cert` as a CA and for which usages.
    fn confirm_ca_download(&self, cert: &CertificateHandle) -> Result<ConsentDecision>;

    /// Show a notice, optionally about a specific certificate.
    fn alert(&self, alert: Alert, cert: Option<&CertificateHandle>);
}

/// Non-interactive consent.
///
/// Declines every CA download unless built with [`HeadlessConsent::approving`].
/// Alerts are written to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessConsent {
    approve: Option<TrustBits>,
}

impl HeadlessConsent {
    /// Decline every download.
    #[must_use]
    pub const fn new() -> Self {
        Self { approve: None }
    }

    /// Approve every download with `trust`.
    #[must_use]
    pub const fn approving(trust: TrustBits) -> Self {
        Self {
            approve: Some(trust),
        }
    }
}

impl UserConsent for HeadlessConsent {
    fn confirm_ca_download(&self, cert: &CertificateHandle) -> Result<ConsentDecision> {
        let decision = self
            .approve
            .map_or(ConsentDecision::DECLINED, ConsentDecision::allow);
        info!(
            subject = cert.subject(),
            allowed = decision.allowed,
            "answered CA download without a user"
        );
        Ok(decision)
    }

    fn alert(&self, alert: Alert, cert: Option<&CertificateHandle>) {
        let subject = cert.map(CertificateHandle::subject);
        if alert.is_problem() {
            warn!(alert = %alert, subject, "certificate import alert");
        } else {
            info!(alert = %alert, subject, "certificate import notice");
        }
    }
}

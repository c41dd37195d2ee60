//! Certificate verification seam.

use chrono::{DateTime, Utc};

use certdb_core::{CertUsage, Result, VerifyErrorCode};

use crate::cert::CertificateHandle;

/// Options for one verification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyFlags {
    /// Never fetch anything from the network.
    ///
    /// [`PathVerifier`](crate::PathVerifier) only consults its store, so it
    /// behaves the same either way. Verifiers that fetch issuers or
    /// revocation data must honor it.
    pub local_only: bool,
    /// Only accept extended validation
    pub must_be_ev: bool,
}

/// A successful verification.
#[derive(Debug, Clone)]
pub struct VerifiedChain {
    /// Leaf first, anchor last
    pub chain: Vec<CertificateHandle>,
    /// Extended validation was established
    pub ev: bool,
}

/// What a verifier concluded about a certificate.
#[derive(Debug, Clone)]
pub enum Verdict {
    Trusted(VerifiedChain),
    Rejected(VerifyErrorCode),
}

impl Verdict {
    pub const fn is_trusted(&self) -> bool {
        matches!(self, Self::Trusted(_))
    }
}

/// Builds and checks certification paths.
///
/// A rejection is a normal verdict. `Err` means the verifier itself could
/// not run, which callers treat as fatal.
pub trait Verifier: Send + Sync {
    fn verify(
        &self,
        cert: &CertificateHandle,
        usage: CertUsage,
        time: DateTime<Utc>,
        hostname: Option<&str>,
        flags: VerifyFlags,
    ) -> Result<Verdict>;

    /// Forget anything remembered between verifications.
    fn clear_cache(&self);
}

/// Verification result in reporting form.
#[derive(Debug, Clone, Default)]
pub struct VerificationOutcome {
    /// Verified chain, leaf first; empty on failure
    pub chain: Vec<CertificateHandle>,
    pub has_ev_policy: bool,
    /// Why verification failed, `None` on success
    pub error: Option<VerifyErrorCode>,
}

impl VerificationOutcome {
    pub const fn is_verified(&self) -> bool {
        self.error.is_none()
    }
}

impl From<Verdict> for VerificationOutcome {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Trusted(v) => Self {
                chain: v.chain,
                has_ev_policy: v.ev,
                error: None,
            },
            Verdict::Rejected(code) => Self {
                chain: Vec::new(),
                has_ev_policy: false,
                error: Some(code),
            },
        }
    }
}

//! Import outcome reporting.

use serde::{Deserialize, Serialize};

use certdb_core::{CertDbError, CertType, Result, RootSelection, TrustRecord, VerifyErrorCode};

use crate::cert::CertificateHandle;

/// A certificate written to permanent storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedCert {
    pub nickname: String,
    /// Base64 issuer+serial lookup key
    pub db_key: String,
    /// Hex SHA-256 of the DER
    pub fingerprint: String,
    /// Trust string, e.g. `"CT,c,c"`
    pub trust: String,
}

/// Why a certificate was left out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "code")]
pub enum SkipReason {
    /// Verification rejected it
    Unverified(VerifyErrorCode),
    /// Not a candidate for this kind of import
    FilteredByUsage,
    /// Already in permanent storage
    AlreadyPresent,
}

/// A bundle member that was not committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedCert {
    pub subject: String,
    pub fingerprint: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

/// What an import did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    /// Kind of import
    pub kind: CertType,
    /// The certificate shown for consent, for CA bundles
    pub presented: Option<RootSelection>,
    /// Commits in order
    pub committed: Vec<CommittedCert>,
    pub skipped: Vec<SkippedCert>,
}

impl ImportReport {
    #[must_use]
    pub const fn new(kind: CertType) -> Self {
        Self {
            kind,
            presented: None,
            committed: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub(crate) fn record_commit(
        &mut self,
        cert: &CertificateHandle,
        trust: &TrustRecord,
    ) -> Result<()> {
        self.committed.push(CommittedCert {
            nickname: cert.nickname().unwrap_or_default().to_string(),
            db_key: cert.db_key().encode()?,
            fingerprint: cert.fingerprint().to_string(),
            trust: trust.to_string(),
        });
        Ok(())
    }

    pub(crate) fn record_skip(&mut self, cert: &CertificateHandle, reason: SkipReason) {
        self.skipped.push(SkippedCert {
            subject: cert.subject().to_string(),
            fingerprint: cert.fingerprint().to_string(),
            reason,
        });
    }

    /// Members rejected by verification.
    pub fn unverified(&self) -> impl Iterator<Item = &SkippedCert> {
        self.skipped
            .iter()
            .filter(|s| matches!(s.reason, SkipReason::Unverified(_)))
    }

    /// True when the import committed something and rejected nothing.
    pub fn is_clean(&self) -> bool {
        !self.committed.is_empty() && self.unverified().next().is_none()
    }

    /// Fail with the first verification rejection, if there was one.
    ///
    /// Imports skip unverifiable members and carry on. Callers that treat
    /// any rejection as fatal can chain this onto the report.
    pub fn require_verified(self) -> Result<Self> {
        match self.skipped.iter().find_map(|s| match s.reason {
            SkipReason::Unverified(code) => Some((s.subject.clone(), code)),
            _ => None,
        }) {
            Some((subject, code)) => Err(CertDbError::VerificationFailed { subject, code }),
            None => Ok(self),
        }
    }

    /// Serialize as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| CertDbError::Store(e.to_string()))
    }
}

use thiserror::Error;

use crate::trust::CertType;
use crate::usage::VerifyErrorCode;

/// Result type alias for certificate database operations
pub type Result<T> = std::result::Result<T, CertDbError>;

/// Broad classes of failure, used to decide how far an error propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Bad key encoding, bad base64, empty or undecodable packages
    InputMalformed,
    /// Not a CA where one is required, user declined, duplicate present
    PolicyRejected,
    /// A candidate did not verify
    VerificationFailed,
    /// The trust store refused or failed an operation
    StoreFailed,
    /// Wrong thread, missing private key, shut down, not authenticated
    PreconditionFailed,
}

/// Errors that can occur when managing the certificate database
#[derive(Error, Debug)]
pub enum CertDbError {
    /// DB key could not be decoded
    #[error("malformed certificate key: {0}")]
    MalformedKey(String),

    /// Base64 input could not be decoded
    #[error("invalid base64 input: {0}")]
    InvalidBase64(String),

    /// Certificate package or DER blob could not be decoded
    #[error("certificate decode failed: {0}")]
    DecodeFailed(String),

    /// The certificate presented for CA trust is not a CA
    #[error("not a CA certificate: {subject}")]
    NotACaCert {
        /// Subject of the rejected certificate
        subject: String,
    },

    /// The certificate is already permanently stored
    #[error("certificate already exists: {subject}")]
    AlreadyExists {
        /// Subject of the duplicate certificate
        subject: String,
    },

    /// The user refused the download
    #[error("user declined to trust the certificate")]
    UserDeclined,

    /// No private key matches the identity certificate
    #[error("no private key found for {subject}")]
    NoPrivateKey {
        /// Subject of the identity certificate
        subject: String,
    },

    /// A candidate certificate did not verify
    ///
    /// Imports record rejections in their report instead of failing;
    /// `ImportReport::require_verified` turns the first one into this error.
    #[error("verification failed for {subject}: {code}")]
    VerificationFailed {
        /// Subject of the candidate
        subject: String,
        /// Why the verifier rejected it
        code: VerifyErrorCode,
    },

    /// Writing a certificate into permanent storage failed
    #[error("failed to commit {nickname}: {reason}")]
    StoreCommitFailed {
        /// Nickname the certificate was being committed under
        nickname: String,
        /// Store-provided reason
        reason: String,
    },

    /// Any other trust store failure
    #[error("trust store error: {0}")]
    Store(String),

    /// The certificate has no trust record to read
    #[error("no trust record for {subject}")]
    MissingTrust {
        /// Subject of the certificate
        subject: String,
    },

    /// Trust mutation requires authenticating to the store first
    #[error("trust store authentication failed: {0}")]
    NotAuthenticated(String),

    /// The database has been shut down
    #[error("certificate database is shut down")]
    NotAvailable,

    /// Called away from the thread that owns user interaction
    #[error("{operation} must run on the owner thread")]
    NotSameThread {
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Trust string could not be parsed
    #[error("invalid trust string: {0}")]
    InvalidTrustString(String),

    /// Trust kind is not ssl, email or objsign
    #[error("invalid trust kind: {0}")]
    InvalidTrustKind(String),

    /// Arguments do not make sense together
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Nickname template is malformed
    #[error("invalid nickname template: {0}")]
    InvalidNicknameTemplate(String),

    /// Nickname counter ran out
    #[error("no free nickname for {base}")]
    NicknameExhausted {
        /// Base label being probed
        base: String,
    },

    /// Import kind is not handled
    #[error("importing {0} certificates is not supported")]
    UnsupportedImport(CertType),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CertDbError {
    /// Classify this error.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::MalformedKey(_)
            | Self::InvalidBase64(_)
            | Self::DecodeFailed(_)
            | Self::InvalidTrustString(_)
            | Self::InvalidTrustKind(_)
            | Self::InvalidNicknameTemplate(_)
            | Self::InvalidArgument(_)
            | Self::Config(_) => ErrorCategory::InputMalformed,
            Self::NotACaCert { .. }
            | Self::AlreadyExists { .. }
            | Self::UserDeclined
            | Self::UnsupportedImport(_) => ErrorCategory::PolicyRejected,
            Self::VerificationFailed { .. } => ErrorCategory::VerificationFailed,
            Self::StoreCommitFailed { .. }
            | Self::Store(_)
            | Self::MissingTrust { .. }
            | Self::NicknameExhausted { .. }
            | Self::Io(_) => ErrorCategory::StoreFailed,
            Self::NoPrivateKey { .. }
            | Self::NotAuthenticated(_)
            | Self::NotAvailable
            | Self::NotSameThread { .. } => ErrorCategory::PreconditionFailed,
        }
    }

    /// Returns true if the import was refused by policy rather than failing
    #[must_use]
    pub const fn is_policy_rejection(&self) -> bool {
        matches!(self.category(), ErrorCategory::PolicyRejected)
    }

    /// Returns true if the error stops the rest of an import batch.
    ///
    /// Only per-candidate verification failures let siblings continue.
    #[must_use]
    pub const fn is_fatal_to_batch(&self) -> bool {
        !matches!(self, Self::VerificationFailed { .. })
    }
}

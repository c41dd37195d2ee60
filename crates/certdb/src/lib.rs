//! Certificate store manager.
//!
//! [`CertDb`] imports certificate bundles, looks certificates up, manages
//! their trust and verifies them. Collaborators sit behind traits so a
//! different store, verifier or user interface can be plugged in:
//!
//! - [`TrustStore`] holds certificates and trust records ([`MemoryTrustStore`])
//! - [`Verifier`] builds certification paths ([`PathVerifier`])
//! - [`CertDecoder`] turns bytes into certificates ([`X509Decoder`])
//! - [`UserConsent`] asks about CA downloads and shows alerts ([`HeadlessConsent`])
//! - [`KeyStoreProbe`] finds private keys ([`MemoryKeyStore`])
//!
//! Bundle members are only ever committed after they verify.
//!
//! # Example
//!
//! ```rust,ignore
//! use certdb::{CertDb, CertType, HeadlessConsent, TrustBits};
//! use std::sync::Arc;
//!
//! let db = CertDb::builder()
//!     .consent(Arc::new(HeadlessConsent::approving(TrustBits::SSL)))
//!     .build()?;
//! let report = db.import_certificates(&std::fs::read("bundle.pem")?, CertType::Ca)?;
//! println!("{}", report.to_json()?);
//! ```

pub mod cert;
pub mod config;
pub mod consent;
mod db;
pub mod decoder;
pub mod keys;
pub mod memory;
pub mod nickname;
pub mod path;
pub mod pipeline;
pub mod report;
pub mod store;
pub mod trust_manager;
pub mod verifier;

#[cfg(test)]
mod testutil;

pub use cert::{CertFields, CertificateHandle, KeyPurposes, Persistence};
pub use config::{CertDbConfig, VerifierConfig};
pub use consent::{Alert, ConsentDecision, HeadlessConsent, UserConsent};
pub use db::{CertDb, CertDbBuilder};
pub use decoder::{CertDecoder, X509Decoder};
pub use keys::{KeySlot, KeyStoreProbe, MemoryKeyStore};
pub use memory::MemoryTrustStore;
pub use nickname::{NicknameAllocator, NicknameDomain, NicknameTemplate};
pub use path::PathVerifier;
pub use report::{CommittedCert, ImportReport, SkipReason, SkippedCert};
pub use store::TrustStore;
pub use trust_manager::TrustManager;
pub use verifier::{VerificationOutcome, VerifiedChain, Verdict, Verifier, VerifyFlags};

pub use certdb_core::{
    CertDbError, CertType, CertUsage, DbKey, ErrorCategory, Result, TrustBits, TrustKind,
    TrustRecord, VerifyErrorCode,
};

//! Core types for the certdb certificate store manager.
//!
//! This crate holds the pieces that need no collaborators:
//!
//! - **DB keys**: the issuer+serial lookup key codec in [`dbkey`]
//! - **Root selection**: which certificate of a bundle to present, in [`chain`]
//! - **Trust model**: certificate types and per-usage trust flags in [`trust`]
//! - **Usages**: verification usages and verifier error codes in [`usage`]
//! - **Errors**: the shared [`CertDbError`] taxonomy
//!
//! # Example
//!
//! ```rust,ignore
//! use certdb_core::{DbKey, Result};
//!
//! fn relocate(key: &str) -> Result<()> {
//!     let key = DbKey::decode(key)?;
//!     println!("serial {:02x?}", key.serial);
//!     Ok(())
//! }
//! ```

pub mod chain;
pub mod dbkey;
mod error;
pub mod trust;
pub mod usage;

pub use chain::{select_presented, NamedCert, Presentation, RootSelection};
pub use dbkey::DbKey;
pub use error::{CertDbError, ErrorCategory, Result};
pub use trust::{CertType, TrustBits, TrustKind, TrustRecord, UsageTrust};
pub use usage::{CertUsage, VerifyErrorCode};

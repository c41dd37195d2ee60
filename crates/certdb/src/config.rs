//! Configuration for a certificate database instance.

use serde::{Deserialize, Serialize};
use std::path::Path;

use certdb_core::{CertDbError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertDbConfig {
    /// printf-style template for user certificate nicknames.
    ///
    /// `%1$s` is the subject common name, `%2$s` the issuer organization.
    #[serde(default = "default_nickname_template")]
    pub nickname_template: String,

    /// Reject interactive imports made off the constructing thread.
    #[serde(default = "default_enforce_owner_thread")]
    pub enforce_owner_thread: bool,

    /// Settings for the built-in path verifier.
    #[serde(default)]
    pub verifier: VerifierConfig,
}

/// Path verifier settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Longest path accepted, leaf and anchor included (default: 8).
    #[serde(default = "default_max_path_length")]
    pub max_path_length: usize,

    /// Remember signature checks between verifications.
    #[serde(default = "default_cache_signatures")]
    pub cache_signatures: bool,
}

impl Default for CertDbConfig {
    fn default() -> Self {
        Self {
            nickname_template: default_nickname_template(),
            enforce_owner_thread: default_enforce_owner_thread(),
            verifier: VerifierConfig::default(),
        }
    }
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            max_path_length: default_max_path_length(),
            cache_signatures: default_cache_signatures(),
        }
    }
}

impl CertDbConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml_str(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| CertDbError::Config(e.to_string()))?;
        if config.verifier.max_path_length < 1 {
            return Err(CertDbError::Config(
                "verifier.max_path_length must be at least 1".into(),
            ));
        }
        Ok(config)
    }
}

// Default value functions for serde.
fn default_nickname_template() -> String {
    String::from("%1$s's %2$s ID")
}

const fn default_enforce_owner_thread() -> bool {
    true
}

const fn default_max_path_length() -> usize {
    8
}

const fn default_cache_signatures() -> bool {
    true
}

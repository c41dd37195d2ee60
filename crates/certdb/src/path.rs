//! Path-building verifier over a [`TrustStore`].
//!
//! Issuers are found by subject name in the store, staged certificates
//! included, so a bundle being imported can vouch for its own members. A
//! path ends at an anchor: a certificate whose stored record grants
//! trusted-CA for the usage's trust kind.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, trace};
use x509_parser::parse_x509_certificate;

use certdb_core::{CertUsage, Result, TrustRecord, VerifyErrorCode};

use crate::cert::CertificateHandle;
use crate::config::VerifierConfig;
use crate::store::TrustStore;
use crate::verifier::{VerifiedChain, Verdict, Verifier, VerifyFlags};

/// Reference [`Verifier`] that builds paths from the trust store.
pub struct PathVerifier {
    store: Arc<dyn TrustStore>,
    config: VerifierConfig,
    // (child fingerprint, issuer fingerprint) -> signature verified
    signatures: Mutex<HashMap<(String, String), bool>>,
}

impl PathVerifier {
    #[must_use]
    pub fn new(store: Arc<dyn TrustStore>, config: VerifierConfig) -> Self {
        Self {
            store,
            config,
            signatures: Mutex::new(HashMap::new()),
        }
    }

    /// Number of remembered signature checks.
    pub fn cached_signatures(&self) -> usize {
        self.signatures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn is_anchor(&self, cert: &CertificateHandle, usage: CertUsage) -> Result<bool> {
        Ok(self
            .store
            .get_trust(cert)?
            .is_some_and(|t| grants_anchor(&t, usage)))
    }

    fn signature_ok(&self, child: &CertificateHandle, issuer: &CertificateHandle) -> bool {
        let key = (
            child.fingerprint().to_string(),
            issuer.fingerprint().to_string(),
        );
        if self.config.cache_signatures {
            let cache = self.signatures.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(&ok) = cache.get(&key) {
                return ok;
            }
        }

        let ok = check_signature(child, issuer);
        if self.config.cache_signatures {
            self.signatures
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(key, ok);
        }
        ok
    }

    /// Check one leaf-level certificate before any path is built.
    fn check_leaf(
        &self,
        cert: &CertificateHandle,
        usage: CertUsage,
        time: DateTime<Utc>,
        hostname: Option<&str>,
        trust: Option<&TrustRecord>,
    ) -> Option<VerifyErrorCode> {
        if trust.is_some_and(TrustRecord::is_untrusted) {
            return Some(VerifyErrorCode::UntrustedCert);
        }
        if let Some(code) = validity_error(cert, time) {
            return Some(code);
        }
        if usage.requires_ca() && !cert.is_ca() {
            return Some(VerifyErrorCode::InadequateCertType);
        }
        if cert.key_purposes().is_some_and(|k| !k.permits(usage)) {
            return Some(VerifyErrorCode::InadequateKeyUsage);
        }
        if let (CertUsage::SslServer, Some(host)) = (usage, hostname) {
            if !matches_hostname(cert, host) {
                return Some(VerifyErrorCode::BadCertDomain);
            }
        }
        None
    }

    /// Pick the issuer of `current`, preferring anchors.
    ///
    /// Returns the issuer and whether it is an anchor, or the most relevant
    /// reason every candidate was unusable.
    fn next_issuer(
        &self,
        current: &CertificateHandle,
        chain: &[CertificateHandle],
        usage: CertUsage,
        time: DateTime<Utc>,
    ) -> Result<std::result::Result<(CertificateHandle, bool), VerifyErrorCode>> {
        let intermediates_below = u32::try_from(chain.len().saturating_sub(1)).unwrap_or(u32::MAX);
        let mut fallback = None;
        let mut rejection = None;

        for candidate in self.store.find_by_subject(current.issuer_raw())? {
            if chain.iter().any(|c| c.same_cert(&candidate)) {
                continue;
            }

            let trust = self.store.get_trust(&candidate)?;
            let problem = if trust.is_some_and(|t| t.is_untrusted()) {
                Some(VerifyErrorCode::UntrustedIssuer)
            } else if !candidate.is_ca() {
                Some(VerifyErrorCode::InadequateCertType)
            } else if let Some(code) = validity_error(&candidate, time) {
                Some(code)
            } else if candidate
                .path_len_constraint()
                .is_some_and(|limit| intermediates_below > limit)
            {
                Some(VerifyErrorCode::PathLengthExceeded)
            } else if !self.signature_ok(current, &candidate) {
                Some(VerifyErrorCode::BadSignature)
            } else {
                None
            };

            if let Some(code) = problem {
                trace!(issuer = candidate.subject(), %code, "issuer candidate rejected");
                rejection.get_or_insert(code);
                continue;
            }

            if trust.is_some_and(|t| grants_anchor(&t, usage)) {
                return Ok(Ok((candidate, true)));
            }
            fallback.get_or_insert(candidate);
        }

        Ok(match fallback {
            Some(issuer) => Ok((issuer, false)),
            None if current.is_self_issued() => Err(VerifyErrorCode::UntrustedIssuer),
            None => Err(rejection.unwrap_or(VerifyErrorCode::UnknownIssuer)),
        })
    }
}

impl Verifier for PathVerifier {
    fn verify(
        &self,
        cert: &CertificateHandle,
        usage: CertUsage,
        time: DateTime<Utc>,
        hostname: Option<&str>,
        flags: VerifyFlags,
    ) -> Result<Verdict> {
        trace!(subject = cert.subject(), %usage, local_only = flags.local_only, "verifying");
        if flags.must_be_ev {
            // No EV policy data is available to this verifier.
            return Ok(Verdict::Rejected(VerifyErrorCode::NotEv));
        }

        let trust = self.store.get_trust(cert)?;
        if let Some(code) = self.check_leaf(cert, usage, time, hostname, trust.as_ref()) {
            debug!(subject = cert.subject(), %usage, %code, "leaf rejected");
            return Ok(Verdict::Rejected(code));
        }

        let trusted_peer = usage
            .trust_kind()
            .is_some_and(|kind| trust.is_some_and(|t| t.has_trusted_peer(kind)));
        if trusted_peer || self.is_anchor(cert, usage)? {
            return Ok(Verdict::Trusted(VerifiedChain {
                chain: vec![cert.clone()],
                ev: false,
            }));
        }

        let mut chain = vec![cert.clone()];
        loop {
            if chain.len() >= self.config.max_path_length {
                return Ok(Verdict::Rejected(VerifyErrorCode::PathLengthExceeded));
            }
            let current = chain[chain.len() - 1].clone();
            match self.next_issuer(&current, &chain, usage, time)? {
                Ok((issuer, anchor)) => {
                    chain.push(issuer);
                    if anchor {
                        debug!(subject = cert.subject(), %usage, length = chain.len(), "verified");
                        return Ok(Verdict::Trusted(VerifiedChain { chain, ev: false }));
                    }
                }
                Err(code) => {
                    debug!(subject = cert.subject(), %usage, %code, "no path to an anchor");
                    return Ok(Verdict::Rejected(code));
                }
            }
        }
    }

    fn clear_cache(&self) {
        self.signatures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// `T` anchors client certificates only, `C` anchors everything else in its kind.
fn grants_anchor(trust: &TrustRecord, usage: CertUsage) -> bool {
    match usage {
        CertUsage::SslClient => trust.ssl.trusted_client_ca,
        CertUsage::SslServer | CertUsage::SslCa => trust.ssl.trusted_ca,
        _ => usage
            .trust_kind()
            .map_or_else(|| trust.has_any_trusted_ca(), |kind| trust.usage(kind).trusted_ca),
    }
}

fn validity_error(cert: &CertificateHandle, time: DateTime<Utc>) -> Option<VerifyErrorCode> {
    if time < cert.not_before() {
        Some(VerifyErrorCode::NotYetValid)
    } else if time > cert.not_after() {
        Some(VerifyErrorCode::Expired)
    } else {
        None
    }
}

fn check_signature(child: &CertificateHandle, issuer: &CertificateHandle) -> bool {
    let Ok((_, child_x509)) = parse_x509_certificate(child.der()) else {
        return false;
    };
    let Ok((_, issuer_x509)) = parse_x509_certificate(issuer.der()) else {
        return false;
    };
    child_x509
        .verify_signature(Some(issuer_x509.public_key()))
        .is_ok()
}

/// Match `host` against the certificate's DNS names.
///
/// Falls back to the common name only when no DNS names are present. A
/// leading `*.` matches exactly one label.
fn matches_hostname(cert: &CertificateHandle, host: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let names: Vec<&str> = if cert.dns_names().is_empty() {
        cert.common_name().into_iter().collect()
    } else {
        cert.dns_names().iter().map(String::as_str).collect()
    };
    names.iter().any(|name| {
        let pattern = name.trim_end_matches('.').to_ascii_lowercase();
        pattern.strip_prefix("*.").map_or_else(
            || pattern == host,
            |suffix| {
                host.split_once('.')
                    .is_some_and(|(label, rest)| !label.is_empty() && rest == suffix)
            },
        )
    })
}

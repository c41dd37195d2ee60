//! Certificate factories and scripted collaborators for tests.

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose, SanType, SerialNumber,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use certdb_core::{CertUsage, Result, TrustRecord, VerifyErrorCode};
use chrono::{DateTime, Utc};

use crate::cert::CertificateHandle;
use crate::consent::{Alert, ConsentDecision, UserConsent};
use crate::decoder::parse_der;
use crate::store::TrustStore;
use crate::verifier::{VerifiedChain, Verdict, Verifier, VerifyFlags};

static SERIAL: AtomicU64 = AtomicU64::new(1000);

/// A generated certificate with its key.
pub struct Issued {
    pub key: KeyPair,
    pub cert: Certificate,
    pub der: Vec<u8>,
}

fn params(cn: &str) -> CertificateParams {
    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, cn);
    dn.push(DnType::OrganizationName, "Test Org");
    params.distinguished_name = dn;
    params.serial_number = Some(SerialNumber::from(SERIAL.fetch_add(1, Ordering::SeqCst)));
    params
}

fn ca_params(cn: &str) -> CertificateParams {
    let mut params = params(cn);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
    params
}

fn self_signed(params: &CertificateParams) -> Issued {
    let key = KeyPair::generate().unwrap();
    let cert = params.clone().self_signed(&key).unwrap();
    let der = cert.der().to_vec();
    Issued { key, cert, der }
}

fn signed(params: &CertificateParams, parent: &Issued) -> Issued {
    let key = KeyPair::generate().unwrap();
    let cert = params.clone().signed_by(&key, &parent.cert, &parent.key).unwrap();
    let der = cert.der().to_vec();
    Issued { key, cert, der }
}

/// Self-signed root CA, `CN=<cn>, O=Test Org`.
pub fn ca(cn: &str) -> Issued {
    self_signed(&ca_params(cn))
}

/// Root CA whose validity ended in 2001.
pub fn expired_ca(cn: &str) -> Issued {
    let mut params = ca_params(cn);
    params.not_before = rcgen::date_time_ymd(2000, 1, 1);
    params.not_after = rcgen::date_time_ymd(2001, 1, 1);
    self_signed(&params)
}

/// Self-signed root without an organization.
pub fn bare_ca(cn: &str) -> Issued {
    let mut params = ca_params(cn);
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, cn);
    params.distinguished_name = dn;
    self_signed(&params)
}

pub fn intermediate(cn: &str, parent: &Issued) -> Issued {
    signed(&ca_params(cn), parent)
}

/// TLS server certificate for `host`.
pub fn server_leaf(host: &str, parent: &Issued) -> Issued {
    let mut params = params(host);
    params.subject_alt_names = vec![SanType::DnsName(host.to_string().try_into().unwrap())];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
    signed(&params, parent)
}

/// S/MIME certificate for `email`.
pub fn email_leaf(cn: &str, email: &str, parent: &Issued) -> Issued {
    let mut params = params(cn);
    params.subject_alt_names = vec![SanType::Rfc822Name(email.to_string().try_into().unwrap())];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::EmailProtection];
    signed(&params, parent)
}

/// Client identity certificate without extended key usage.
pub fn user_leaf(cn: &str, parent: &Issued) -> Issued {
    signed(&params(cn), parent)
}

pub fn handle(issued: &Issued) -> CertificateHandle {
    parse_der(&issued.der).unwrap()
}

/// Concatenated PEM of `certs`, in order.
pub fn pem_bundle(certs: &[&Issued]) -> Vec<u8> {
    certs
        .iter()
        .map(|c| c.cert.pem())
        .collect::<String>()
        .into_bytes()
}

/// Something that happened, in order, across scripted collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Verify(String),
    Commit(String),
}

pub type EventLog = Arc<Mutex<Vec<Event>>>;

/// Verifier that trusts everything except the listed common names.
pub struct ScriptedVerifier {
    reject: HashSet<String>,
    chains: Mutex<Vec<Vec<CertificateHandle>>>,
    log: EventLog,
    pub usages: Mutex<Vec<CertUsage>>,
}

impl ScriptedVerifier {
    pub fn new(reject: &[&str], log: EventLog) -> Self {
        Self {
            reject: reject.iter().map(|s| (*s).to_string()).collect(),
            chains: Mutex::new(Vec::new()),
            log,
            usages: Mutex::new(Vec::new()),
        }
    }

    /// Return `chain` (leaf first) the next time its leaf is verified.
    pub fn with_chain(self, chain: Vec<CertificateHandle>) -> Self {
        self.chains.lock().unwrap().push(chain);
        self
    }
}

impl Verifier for ScriptedVerifier {
    fn verify(
        &self,
        cert: &CertificateHandle,
        usage: CertUsage,
        _time: DateTime<Utc>,
        _hostname: Option<&str>,
        _flags: VerifyFlags,
    ) -> Result<Verdict> {
        let cn = cert.common_name().unwrap_or_default().to_string();
        self.log.lock().unwrap().push(Event::Verify(cn.clone()));
        self.usages.lock().unwrap().push(usage);
        if self.reject.contains(&cn) {
            return Ok(Verdict::Rejected(VerifyErrorCode::UnknownIssuer));
        }
        let chain = self
            .chains
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.first().is_some_and(|leaf| leaf.same_cert(cert)))
            .cloned()
            .unwrap_or_else(|| vec![cert.clone()]);
        Ok(Verdict::Trusted(VerifiedChain { chain, ev: false }))
    }

    fn clear_cache(&self) {}
}

/// Store wrapper that logs commits into the shared event log.
pub struct LoggingStore<S> {
    inner: Arc<S>,
    log: EventLog,
}

impl<S> LoggingStore<S> {
    pub fn new(inner: Arc<S>, log: EventLog) -> Self {
        Self { inner, log }
    }
}

impl<S: TrustStore> TrustStore for LoggingStore<S> {
    fn find_by_issuer_serial(
        &self,
        issuer: &[u8],
        serial: &[u8],
    ) -> Result<Option<CertificateHandle>> {
        self.inner.find_by_issuer_serial(issuer, serial)
    }

    fn find_by_nickname(&self, nickname: &str) -> Result<Option<CertificateHandle>> {
        self.inner.find_by_nickname(nickname)
    }

    fn find_on_token(&self, token: &str, nickname: &str) -> Result<Vec<CertificateHandle>> {
        self.inner.find_on_token(token, nickname)
    }

    fn find_by_der(&self, der: &[u8]) -> Result<Option<CertificateHandle>> {
        self.inner.find_by_der(der)
    }

    fn find_by_subject(&self, subject: &[u8]) -> Result<Vec<CertificateHandle>> {
        self.inner.find_by_subject(subject)
    }

    fn find_by_email(&self, email: &str) -> Result<Vec<CertificateHandle>> {
        self.inner.find_by_email(email)
    }

    fn list(&self) -> Result<Vec<CertificateHandle>> {
        self.inner.list()
    }

    fn stage_temporary(&self, cert: &CertificateHandle) -> Result<()> {
        self.inner.stage_temporary(cert)
    }

    fn discard_temporary(&self, certs: &[CertificateHandle]) -> Result<()> {
        self.inner.discard_temporary(certs)
    }

    fn commit_permanent(
        &self,
        cert: &CertificateHandle,
        nickname: &str,
        token: Option<&str>,
        trust: &TrustRecord,
    ) -> Result<CertificateHandle> {
        let cn = cert.common_name().unwrap_or_default().to_string();
        self.log.lock().unwrap().push(Event::Commit(cn));
        self.inner.commit_permanent(cert, nickname, token, trust)
    }

    fn set_trust(&self, cert: &CertificateHandle, trust: &TrustRecord) -> Result<()> {
        self.inner.set_trust(cert, trust)
    }

    fn get_trust(&self, cert: &CertificateHandle) -> Result<Option<TrustRecord>> {
        self.inner.get_trust(cert)
    }

    fn remove(&self, cert: &CertificateHandle) -> Result<()> {
        self.inner.remove(cert)
    }

    fn authenticate(&self) -> Result<()> {
        self.inner.authenticate()
    }
}

/// Consent with a fixed answer that records every alert.
pub struct ScriptedConsent {
    decision: ConsentDecision,
    pub prompts: Mutex<Vec<String>>,
    pub alerts: Mutex<Vec<Alert>>,
}

impl ScriptedConsent {
    pub fn new(decision: ConsentDecision) -> Self {
        Self {
            decision,
            prompts: Mutex::new(Vec::new()),
            alerts: Mutex::new(Vec::new()),
        }
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }
}

impl UserConsent for ScriptedConsent {
    fn confirm_ca_download(&self, cert: &CertificateHandle) -> Result<ConsentDecision> {
        self.prompts.lock().unwrap().push(cert.subject().to_string());
        Ok(self.decision)
    }

    fn alert(&self, alert: Alert, _cert: Option<&CertificateHandle>) {
        self.alerts.lock().unwrap().push(alert);
    }
}

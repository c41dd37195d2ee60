//! The certificate database facade.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use certdb_core::{
    CertDbError, CertType, CertUsage, DbKey, Result, TrustBits, TrustKind, TrustRecord,
};

use crate::cert::CertificateHandle;
use crate::config::CertDbConfig;
use crate::consent::{HeadlessConsent, UserConsent};
use crate::decoder::{der_from_base64, CertDecoder, X509Decoder};
use crate::keys::{KeyStoreProbe, MemoryKeyStore};
use crate::memory::MemoryTrustStore;
use crate::nickname::{NicknameAllocator, NicknameTemplate};
use crate::path::PathVerifier;
use crate::pipeline::{ImportPipeline, OwnerThread};
use crate::report::ImportReport;
use crate::store::TrustStore;
use crate::trust_manager::TrustManager;
use crate::verifier::{VerificationOutcome, Verifier, VerifyFlags};

/// Certificate database: imports, lookups, trust and verification.
///
/// Cheap to clone; clones share state. Interactive imports must run on the
/// thread that called [`CertDbBuilder::build`] unless the configuration
/// turns that check off.
#[derive(Clone)]
pub struct CertDb {
    inner: Arc<CertDbInner>,
}

struct CertDbInner {
    store: Arc<dyn TrustStore>,
    decoder: Arc<dyn CertDecoder>,
    verifier: Arc<dyn Verifier>,
    pipeline: ImportPipeline,
    trust: TrustManager,
    nicknames: NicknameAllocator,
    shut_down: AtomicBool,
}

impl CertDb {
    /// In-memory database with default collaborators.
    pub fn new() -> Result<Self> {
        CertDbBuilder::new().build()
    }

    #[must_use]
    pub fn builder() -> CertDbBuilder {
        CertDbBuilder::new()
    }

    fn ensure_available(&self) -> Result<()> {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            Err(CertDbError::NotAvailable)
        } else {
            Ok(())
        }
    }

    // Imports

    /// Import a bundle of the given kind.
    pub fn import_certificates(&self, bytes: &[u8], kind: CertType) -> Result<ImportReport> {
        self.ensure_available()?;
        match kind {
            CertType::Ca => self.inner.pipeline.import_ca_bundle(bytes),
            CertType::Email => self.inner.pipeline.import_email_bundle(bytes),
            CertType::User => self.inner.pipeline.import_user_bundle(bytes),
            CertType::Server => Err(CertDbError::UnsupportedImport(kind)),
        }
    }

    pub fn import_email_certificate(&self, bytes: &[u8]) -> Result<ImportReport> {
        self.ensure_available()?;
        self.inner.pipeline.import_email_bundle(bytes)
    }

    pub fn import_user_certificate(&self, bytes: &[u8]) -> Result<ImportReport> {
        self.ensure_available()?;
        self.inner.pipeline.import_user_bundle(bytes)
    }

    // Lookups

    /// Find a stored certificate by its base64 issuer+serial key.
    pub fn find_cert_by_db_key(&self, db_key: &str) -> Result<Option<CertificateHandle>> {
        self.ensure_available()?;
        let key = DbKey::decode(db_key)?;
        self.inner.store.find_by_issuer_serial(&key.issuer, &key.serial)
    }

    pub fn find_cert_by_nickname(&self, nickname: &str) -> Result<Option<CertificateHandle>> {
        self.ensure_available()?;
        self.inner.store.find_by_nickname(nickname)
    }

    /// Every permanent certificate.
    pub fn get_certs(&self) -> Result<Vec<CertificateHandle>> {
        self.ensure_available()?;
        self.inner.store.list()
    }

    /// First stored certificate for `email` that verifies for encryption.
    pub fn find_cert_by_email_address(&self, email: &str) -> Result<Option<CertificateHandle>> {
        self.ensure_available()?;
        for cert in self.inner.store.find_by_email(email)? {
            if self.verifies_now(&cert, CertUsage::EmailRecipient)? {
                return Ok(Some(cert));
            }
        }
        debug!(email, "no usable certificate for address");
        Ok(None)
    }

    /// Our own certificate under `nickname`, if it can receive encrypted mail.
    pub fn find_email_encryption_cert(&self, nickname: &str) -> Result<Option<CertificateHandle>> {
        self.find_user_cert(nickname, CertUsage::EmailRecipient)
    }

    /// Our own certificate under `nickname`, if it can sign mail.
    pub fn find_email_signing_cert(&self, nickname: &str) -> Result<Option<CertificateHandle>> {
        self.find_user_cert(nickname, CertUsage::EmailSigner)
    }

    fn find_user_cert(&self, nickname: &str, usage: CertUsage) -> Result<Option<CertificateHandle>> {
        self.ensure_available()?;
        if nickname.is_empty() {
            return Ok(None);
        }
        let Some(cert) = self.inner.store.find_by_nickname(nickname)? else {
            return Ok(None);
        };
        let is_user = self
            .inner
            .store
            .get_trust(&cert)?
            .is_some_and(|t| t.is_user());
        if is_user && self.verifies_now(&cert, usage)? {
            Ok(Some(cert))
        } else {
            Ok(None)
        }
    }

    fn verifies_now(&self, cert: &CertificateHandle, usage: CertUsage) -> Result<bool> {
        Ok(self
            .inner
            .verifier
            .verify(cert, usage, Utc::now(), None, VerifyFlags::default())?
            .is_trusted())
    }

    // Trust

    pub fn set_cert_trust(
        &self,
        cert: &CertificateHandle,
        cert_type: CertType,
        trust: TrustBits,
    ) -> Result<()> {
        self.ensure_available()?;
        self.inner.trust.set_trust(cert, cert_type, trust)
    }

    /// Set trust from a string such as `"CT,C,c"`.
    pub fn set_cert_trust_from_string(&self, cert: &CertificateHandle, trust: &str) -> Result<()> {
        self.ensure_available()?;
        self.inner.trust.set_trust_from_string(cert, trust)
    }

    pub fn is_cert_trusted(
        &self,
        cert: &CertificateHandle,
        cert_type: CertType,
        kind: TrustKind,
    ) -> Result<bool> {
        self.ensure_available()?;
        self.inner.trust.is_trusted(cert, cert_type, kind)
    }

    /// Like [`is_cert_trusted`](Self::is_cert_trusted) with the kind given as
    /// `"ssl"`, `"email"` or `"objsign"`.
    pub fn is_cert_trusted_for(
        &self,
        cert: &CertificateHandle,
        cert_type: CertType,
        kind: &str,
    ) -> Result<bool> {
        self.is_cert_trusted(cert, cert_type, kind.parse()?)
    }

    pub fn delete_certificate(&self, cert: &CertificateHandle) -> Result<()> {
        self.ensure_available()?;
        self.inner.trust.delete(cert)
    }

    // Construction

    /// Decode one DER certificate, returning the stored copy when there is one.
    pub fn construct_x509(&self, der: &[u8]) -> Result<CertificateHandle> {
        self.ensure_available()?;
        if let Some(stored) = self.inner.store.find_by_der(der)? {
            return Ok(stored);
        }
        self.inner.decoder.decode_certificate(der)
    }

    pub fn construct_x509_from_base64(&self, base64: &str) -> Result<CertificateHandle> {
        self.construct_x509(&der_from_base64(base64)?)
    }

    /// Store a certificate with an explicit trust string.
    ///
    /// A certificate that is already stored only has its trust replaced.
    pub fn add_cert(&self, der: &[u8], trust: &str) -> Result<CertificateHandle> {
        self.ensure_available()?;
        let record: TrustRecord = trust.parse()?;
        let cert = self.construct_x509(der)?;
        if cert.is_permanent() {
            self.inner.store.authenticate()?;
            self.inner.store.set_trust(&cert, &record)?;
            debug!(subject = cert.subject(), trust = %record, "replaced trust of stored certificate");
            return Ok(cert);
        }

        let nickname = self.inner.nicknames.ca_nickname(&cert)?;
        self.inner.store.authenticate()?;
        let committed = self
            .inner
            .store
            .commit_permanent(&cert, &nickname, None, &record)?;
        info!(nickname = %nickname, trust = %record, "added certificate");
        Ok(committed)
    }

    pub fn add_cert_from_base64(&self, base64: &str, trust: &str) -> Result<CertificateHandle> {
        self.ensure_available()?;
        // Reject a bad trust string before decoding anything.
        trust.parse::<TrustRecord>()?;
        self.add_cert(&der_from_base64(base64)?, trust)
    }

    // Verification

    pub fn verify_cert_now(
        &self,
        cert: &CertificateHandle,
        usage: CertUsage,
        flags: VerifyFlags,
        hostname: Option<&str>,
    ) -> Result<VerificationOutcome> {
        self.verify_cert_at_time(cert, usage, flags, hostname, Utc::now())
    }

    /// Verify `cert` for `usage` as of `time`.
    ///
    /// A hostname is only meaningful for [`CertUsage::SslServer`].
    pub fn verify_cert_at_time(
        &self,
        cert: &CertificateHandle,
        usage: CertUsage,
        flags: VerifyFlags,
        hostname: Option<&str>,
        time: DateTime<Utc>,
    ) -> Result<VerificationOutcome> {
        self.ensure_available()?;
        if hostname.is_some() && usage != CertUsage::SslServer {
            return Err(CertDbError::InvalidArgument(format!(
                "hostname given for {usage} verification"
            )));
        }
        let verdict = self.inner.verifier.verify(cert, usage, time, hostname, flags)?;
        Ok(verdict.into())
    }

    pub fn clear_verification_cache(&self) -> Result<()> {
        self.ensure_available()?;
        self.inner.verifier.clear_cache();
        Ok(())
    }

    // Lifecycle

    /// Stop serving requests. Every later call fails with `NotAvailable`.
    pub fn shutdown(&self) {
        if !self.inner.shut_down.swap(true, Ordering::SeqCst) {
            self.inner.verifier.clear_cache();
            info!("certificate database shut down");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }
}

/// Builder for [`CertDb`].
///
/// Anything not supplied falls back to the in-memory reference
/// collaborators.
#[derive(Default)]
pub struct CertDbBuilder {
    config: CertDbConfig,
    store: Option<Arc<dyn TrustStore>>,
    decoder: Option<Arc<dyn CertDecoder>>,
    verifier: Option<Arc<dyn Verifier>>,
    consent: Option<Arc<dyn UserConsent>>,
    keys: Option<Arc<dyn KeyStoreProbe>>,
}

impl CertDbBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn config(mut self, config: CertDbConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn store(mut self, store: Arc<dyn TrustStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn decoder(mut self, decoder: Arc<dyn CertDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Set the verifier (default: a [`PathVerifier`] over the store)
    #[must_use]
    pub fn verifier(mut self, verifier: Arc<dyn Verifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Set the consent handler (default: [`HeadlessConsent`], which declines)
    #[must_use]
    pub fn consent(mut self, consent: Arc<dyn UserConsent>) -> Self {
        self.consent = Some(consent);
        self
    }

    #[must_use]
    pub fn keys(mut self, keys: Arc<dyn KeyStoreProbe>) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Build the database. The calling thread becomes the owner thread.
    pub fn build(self) -> Result<CertDb> {
        let template = NicknameTemplate::parse(&self.config.nickname_template)?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryTrustStore::new()));
        let decoder = self.decoder.unwrap_or_else(|| Arc::new(X509Decoder::new()));
        let verifier = self.verifier.unwrap_or_else(|| {
            Arc::new(PathVerifier::new(store.clone(), self.config.verifier.clone()))
        });
        let consent = self
            .consent
            .unwrap_or_else(|| Arc::new(HeadlessConsent::new()));
        let keys = self.keys.unwrap_or_else(|| Arc::new(MemoryKeyStore::new()));

        let pipeline = ImportPipeline::new(
            decoder.clone(),
            verifier.clone(),
            store.clone(),
            consent,
            keys,
            NicknameAllocator::new(store.clone(), template.clone()),
            OwnerThread::current(self.config.enforce_owner_thread),
        );

        Ok(CertDb {
            inner: Arc::new(CertDbInner {
                trust: TrustManager::new(store.clone()),
                nicknames: NicknameAllocator::new(store.clone(), template),
                store,
                decoder,
                verifier,
                pipeline,
                shut_down: AtomicBool::new(false),
            }),
        })
    }
}

//! Two-phase certificate import.
//!
//! Every bundle member is staged in the store's temporary area first so the
//! verifier can build paths through its siblings. A candidate reaches
//! permanent storage only after the verifier returns a trusted chain for it;
//! a rejected candidate is reported and the rest of the batch continues.
//! Whatever is still temporary when an import returns is discarded, on
//! success and failure alike.

use chrono::Utc;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::{debug, info, instrument, warn};

use certdb_core::{
    select_presented, CertDbError, CertType, CertUsage, Result, TrustRecord,
};

use crate::cert::CertificateHandle;
use crate::consent::{Alert, UserConsent};
use crate::decoder::CertDecoder;
use crate::keys::KeyStoreProbe;
use crate::nickname::{NicknameAllocator, NicknameDomain};
use crate::report::{ImportReport, SkipReason};
use crate::store::TrustStore;
use crate::verifier::{Verdict, Verifier, VerifyFlags};

/// The thread allowed to run interactive operations.
#[derive(Debug, Clone, Copy)]
pub struct OwnerThread {
    id: ThreadId,
    enforce: bool,
}

impl OwnerThread {
    /// Record the calling thread as owner.
    #[must_use]
    pub fn current(enforce: bool) -> Self {
        Self {
            id: thread::current().id(),
            enforce,
        }
    }

    /// Whether the calling thread may interact with the user.
    pub fn is_current(&self) -> bool {
        !self.enforce || thread::current().id() == self.id
    }

    pub fn check(&self, operation: &'static str) -> Result<()> {
        if self.is_current() {
            Ok(())
        } else {
            Err(CertDbError::NotSameThread { operation })
        }
    }
}

/// Which staged members are verified and committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateFilter {
    /// Every member
    All,
    /// CA certificates only
    CaOnly,
    /// End-entity certificates usable for e-mail protection
    Email,
}

impl CandidateFilter {
    fn accepts(self, cert: &CertificateHandle) -> bool {
        match self {
            Self::All => true,
            Self::CaOnly => cert.is_ca(),
            Self::Email => {
                !cert.is_ca()
                    && cert
                        .key_purposes()
                        .map_or(true, |k| k.permits(CertUsage::EmailRecipient))
            }
        }
    }
}

/// Temporary-area lease released on drop.
struct Staging<'a> {
    store: &'a dyn TrustStore,
    staged: Vec<CertificateHandle>,
}

impl<'a> Staging<'a> {
    fn new(store: &'a dyn TrustStore) -> Self {
        Self {
            store,
            staged: Vec::new(),
        }
    }

    fn stage(&mut self, cert: &CertificateHandle) -> Result<()> {
        self.store.stage_temporary(cert)?;
        self.staged.push(cert.clone());
        Ok(())
    }
}

impl Drop for Staging<'_> {
    fn drop(&mut self) {
        if self.staged.is_empty() {
            return;
        }
        if let Err(e) = self.store.discard_temporary(&self.staged) {
            warn!(error = %e, count = self.staged.len(), "failed to release temporary certificates");
        }
    }
}

/// Orchestrates decoding, consent, verification and commit.
pub struct ImportPipeline {
    decoder: Arc<dyn CertDecoder>,
    verifier: Arc<dyn Verifier>,
    store: Arc<dyn TrustStore>,
    consent: Arc<dyn UserConsent>,
    keys: Arc<dyn KeyStoreProbe>,
    nicknames: NicknameAllocator,
    owner: OwnerThread,
}

impl ImportPipeline {
    pub fn new(
        decoder: Arc<dyn CertDecoder>,
        verifier: Arc<dyn Verifier>,
        store: Arc<dyn TrustStore>,
        consent: Arc<dyn UserConsent>,
        keys: Arc<dyn KeyStoreProbe>,
        nicknames: NicknameAllocator,
        owner: OwnerThread,
    ) -> Self {
        Self {
            decoder,
            verifier,
            store,
            consent,
            keys,
            nicknames,
            owner,
        }
    }

    /// Decode every certificate in `bytes`. Any undecodable member fails the whole blob.
    pub fn decode_batch(&self, bytes: &[u8]) -> Result<Vec<CertificateHandle>> {
        self.decoder
            .decode_package(bytes)?
            .iter()
            .map(|der| self.decoder.decode_certificate(der))
            .collect()
    }

    /// Import a CA bundle.
    ///
    /// The presented certificate is confirmed by the user and committed with
    /// the consented trust. Every other member must then verify as a CA
    /// before it is committed.
    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    pub fn import_ca_bundle(&self, bytes: &[u8]) -> Result<ImportReport> {
        self.owner.check("CA certificate import")?;
        let certs = self.decode_batch(bytes)?;
        let mut report = ImportReport::new(CertType::Ca);

        let Some(selection) = select_presented(&certs) else {
            debug!("CA bundle contained no certificates");
            return Ok(report);
        };
        report.presented = Some(selection);

        let decoded = &certs[selection.index];
        let selected = self
            .store
            .find_by_der(decoded.der())?
            .unwrap_or_else(|| decoded.clone());
        debug!(
            subject = selected.subject(),
            presentation = ?selection.presentation,
            "presenting CA certificate"
        );

        if !selected.is_ca() {
            self.alert(Alert::NotACaCert, Some(&selected));
            return Err(CertDbError::NotACaCert {
                subject: selected.subject().to_string(),
            });
        }
        if selected.is_permanent() {
            self.alert(Alert::CaCertExists, Some(&selected));
            return Err(CertDbError::AlreadyExists {
                subject: selected.subject().to_string(),
            });
        }

        let decision = self.consent.confirm_ca_download(&selected)?;
        if !decision.allowed {
            info!(subject = selected.subject(), "user declined CA download");
            return Err(CertDbError::UserDeclined);
        }

        let nickname = self.nicknames.ca_nickname(&selected)?;
        let trust = TrustRecord::valid_ca().with_ca_trust(decision.trust);
        self.store.authenticate()?;
        let committed = self.commit(&selected, &nickname, None, &trust)?;
        report.record_commit(&committed, &trust)?;
        info!(nickname = %nickname, trust = %trust, "imported CA certificate");

        let rest: Vec<CertificateHandle> = certs
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != selection.index)
            .map(|(_, c)| c.clone())
            .collect();
        self.verify_and_commit(&rest, CertUsage::VerifyCa, CandidateFilter::All, &mut report)?;
        Ok(report)
    }

    /// Import other people's e-mail certificates and their chains.
    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    pub fn import_email_bundle(&self, bytes: &[u8]) -> Result<ImportReport> {
        let certs = self.decode_batch(bytes)?;
        if certs.is_empty() {
            return Err(CertDbError::DecodeFailed("no certificates in e-mail package".into()));
        }
        let mut report = ImportReport::new(CertType::Email);
        self.verify_and_commit(
            &certs,
            CertUsage::EmailRecipient,
            CandidateFilter::Email,
            &mut report,
        )?;
        Ok(report)
    }

    /// Import our own identity certificate, followed by its CA certificates.
    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    pub fn import_user_bundle(&self, bytes: &[u8]) -> Result<ImportReport> {
        self.owner.check("user certificate import")?;
        let certs = self.decode_batch(bytes)?;
        let Some((lead, rest)) = certs.split_first() else {
            return Err(CertDbError::DecodeFailed("no certificates in user package".into()));
        };

        let Some(slot) = self.keys.key_slot_for(lead) else {
            self.alert(Alert::UserCertIgnoredNoPrivateKey, Some(lead));
            return Err(CertDbError::NoPrivateKey {
                subject: lead.subject().to_string(),
            });
        };

        let existing = self
            .store
            .find_by_der(lead.der())?
            .filter(CertificateHandle::is_permanent);
        let token = (!slot.internal).then(|| slot.token_name.clone());
        let nickname = match existing.as_ref().and_then(CertificateHandle::nickname) {
            Some(nickname) => nickname.to_string(),
            None => {
                let domain = token
                    .clone()
                    .map_or(NicknameDomain::Internal, NicknameDomain::Token);
                self.nicknames.allocate(lead, &domain)?
            }
        };

        let mut report = ImportReport::new(CertType::User);
        let trust = TrustRecord::user();
        self.store.authenticate()?;
        let committed = self.commit(lead, &nickname, token.as_deref(), &trust)?;
        report.record_commit(&committed, &trust)?;
        self.alert(Alert::UserCertImported, Some(&committed));
        info!(nickname = %nickname, token = ?token, "imported user certificate");

        self.verify_and_commit(rest, CertUsage::VerifyCa, CandidateFilter::CaOnly, &mut report)?;
        Ok(report)
    }

    /// Stage `members`, then verify and commit each candidate in order.
    ///
    /// Verification failures are recorded and skipped. Store failures and
    /// verifier errors end the batch; commits already made stay.
    pub fn verify_and_commit(
        &self,
        members: &[CertificateHandle],
        usage: CertUsage,
        filter: CandidateFilter,
        report: &mut ImportReport,
    ) -> Result<()> {
        let mut staging = Staging::new(self.store.as_ref());
        let mut candidates = Vec::new();
        for member in members {
            if let Some(stored) = self.store.find_by_der(member.der())? {
                if stored.is_permanent() {
                    report.record_skip(member, SkipReason::AlreadyPresent);
                    continue;
                }
            }
            staging.stage(member)?;
            if filter.accepts(member) {
                candidates.push(member.clone());
            } else {
                report.record_skip(member, SkipReason::FilteredByUsage);
            }
        }

        let mut authenticated = false;
        for candidate in &candidates {
            // An earlier candidate's chain may already have committed this one.
            if self
                .store
                .find_by_der(candidate.der())?
                .is_some_and(|c| c.is_permanent())
            {
                continue;
            }

            let verdict = self.verifier.verify(
                candidate,
                usage,
                Utc::now(),
                None,
                VerifyFlags::default(),
            )?;
            let mut chain = match verdict {
                Verdict::Trusted(verified) => verified.chain,
                Verdict::Rejected(code) => {
                    warn!(subject = candidate.subject(), %usage, %code, "not importing unverified certificate");
                    self.alert(Alert::NotImportingUnverifiedCert, Some(candidate));
                    report.record_skip(candidate, SkipReason::Unverified(code));
                    continue;
                }
            };
            if !chain.first().is_some_and(|c| c.same_cert(candidate)) {
                chain.insert(0, candidate.clone());
            }

            for member in &chain {
                if self
                    .store
                    .find_by_der(member.der())?
                    .is_some_and(|c| c.is_permanent())
                {
                    continue;
                }
                if !authenticated {
                    self.store.authenticate()?;
                    authenticated = true;
                }
                let (nickname, trust) = if member.is_ca() {
                    (self.nicknames.ca_nickname(member)?, TrustRecord::valid_ca())
                } else {
                    (self.nicknames.peer_nickname(member)?, TrustRecord::valid_peer())
                };
                let committed = self.commit(member, &nickname, None, &trust)?;
                report.record_commit(&committed, &trust)?;
                debug!(nickname = %nickname, trust = %trust, "committed verified certificate");
            }
        }
        Ok(())
    }

    fn commit(
        &self,
        cert: &CertificateHandle,
        nickname: &str,
        token: Option<&str>,
        trust: &TrustRecord,
    ) -> Result<CertificateHandle> {
        self.store
            .commit_permanent(cert, nickname, token, trust)
            .map_err(|e| match e {
                e @ CertDbError::StoreCommitFailed { .. } => e,
                other => CertDbError::StoreCommitFailed {
                    nickname: nickname.to_string(),
                    reason: other.to_string(),
                },
            })
    }

    fn alert(&self, alert: Alert, cert: Option<&CertificateHandle>) {
        if self.owner.is_current() {
            self.consent.alert(alert, cert);
        } else {
            warn!(alert = %alert, "dropping alert raised off the owner thread");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VerifierConfig;
    use crate::consent::ConsentDecision;
    use crate::decoder::X509Decoder;
    use crate::keys::{KeySlot, MemoryKeyStore};
    use crate::memory::MemoryTrustStore;
    use crate::nickname::NicknameTemplate;
    use crate::path::PathVerifier;
    use crate::testutil::{
        ca, email_leaf, handle, intermediate, pem_bundle, server_leaf, user_leaf, Event,
        EventLog, LoggingStore, ScriptedConsent, ScriptedVerifier,
    };
    use certdb_core::{Presentation, TrustBits, TrustKind, VerifyErrorCode};
    use std::sync::Mutex;

    struct Harness {
        store: Arc<MemoryTrustStore>,
        consent: Arc<ScriptedConsent>,
        keys: Arc<MemoryKeyStore>,
        pipeline: ImportPipeline,
    }

    fn harness(decision: ConsentDecision) -> Harness {
        let store = Arc::new(MemoryTrustStore::new());
        let consent = Arc::new(ScriptedConsent::new(decision));
        let keys = Arc::new(MemoryKeyStore::new());
        let verifier = Arc::new(PathVerifier::new(store.clone(), VerifierConfig::default()));
        let pipeline = ImportPipeline::new(
            Arc::new(X509Decoder),
            verifier,
            store.clone(),
            consent.clone(),
            keys.clone(),
            NicknameAllocator::new(store.clone(), NicknameTemplate::parse("%1$s's %2$s ID").unwrap()),
            OwnerThread::current(true),
        );
        Harness {
            store,
            consent,
            keys,
            pipeline,
        }
    }

    fn scripted(reject: &[&str]) -> (Arc<MemoryTrustStore>, EventLog, ImportPipeline) {
        let log: EventLog = Arc::new(Mutex::new(Vec::new()));
        let memory = Arc::new(MemoryTrustStore::new());
        let store: Arc<dyn TrustStore> = Arc::new(LoggingStore::new(memory.clone(), log.clone()));
        let pipeline = ImportPipeline::new(
            Arc::new(X509Decoder),
            Arc::new(ScriptedVerifier::new(reject, log.clone())),
            store.clone(),
            Arc::new(ScriptedConsent::new(ConsentDecision::allow(TrustBits::SSL))),
            Arc::new(MemoryKeyStore::new()),
            NicknameAllocator::new(store, NicknameTemplate::parse("%1$s").unwrap()),
            OwnerThread::current(true),
        );
        (memory, log, pipeline)
    }

    #[test]
    fn ca_bundle_commits_root_then_verified_intermediate() {
        let h = harness(ConsentDecision::allow(TrustBits::SSL));
        let root = ca("Bundle Root");
        let inter = intermediate("Bundle Inter", &root);

        let report = h
            .pipeline
            .import_ca_bundle(&pem_bundle(&[&root, &inter]))
            .unwrap();

        let presented = report.presented.unwrap();
        assert_eq!(presented.index, 0);
        assert_eq!(presented.presentation, Presentation::RootFirst);
        assert_eq!(report.committed.len(), 2);
        assert_eq!(report.committed[0].nickname, "Bundle Root - Test Org");
        assert_eq!(report.committed[0].trust, "CT,c,c");
        assert_eq!(report.committed[1].nickname, "Bundle Inter - Test Org");
        assert_eq!(report.committed[1].trust, "c,c,c");
        assert!(report.skipped.is_empty());

        let root_trust = h.store.get_trust(&handle(&root)).unwrap().unwrap();
        assert!(root_trust.has_trusted_ca(TrustKind::Ssl));
        assert!(!root_trust.has_trusted_ca(TrustKind::Email));
        assert_eq!(h.store.temporary_count(), 0);
        assert_eq!(h.consent.prompts.lock().unwrap().len(), 1);
    }

    #[test]
    fn ca_bundle_skips_member_that_does_not_verify() {
        let h = harness(ConsentDecision::allow(TrustBits::SSL));
        let root = ca("Skip Root");
        let stranger_root = ca("Stranger Root");
        let inter = intermediate("Skip Inter", &root);
        let orphan = intermediate("Orphan Inter", &stranger_root);

        let report = h
            .pipeline
            .import_ca_bundle(&pem_bundle(&[&root, &inter, &orphan]))
            .unwrap();

        assert_eq!(report.committed.len(), 2);
        let unverified: Vec<_> = report.unverified().collect();
        assert_eq!(unverified.len(), 1);
        assert_eq!(
            unverified[0].reason,
            SkipReason::Unverified(VerifyErrorCode::UnknownIssuer)
        );
        assert!(h.consent.alerts().contains(&Alert::NotImportingUnverifiedCert));
        assert!(h.store.find_by_der(&orphan.der).unwrap().is_none());
        assert_eq!(h.store.temporary_count(), 0);
    }

    #[test]
    fn root_last_bundle_presents_last_member() {
        let h = harness(ConsentDecision::allow(TrustBits::ALL));
        let root = ca("Last Root");
        let inter = intermediate("Last Inter", &root);

        let report = h
            .pipeline
            .import_ca_bundle(&pem_bundle(&[&inter, &root]))
            .unwrap();
        assert_eq!(report.presented.unwrap().index, 1);
        assert_eq!(report.committed[0].trust, "CT,C,C");
        assert_eq!(report.committed.len(), 2);
    }

    #[test]
    fn declined_ca_commits_nothing() {
        let h = harness(ConsentDecision::DECLINED);
        let root = ca("Declined Root");
        let err = h.pipeline.import_ca_bundle(&root.der).unwrap_err();
        assert!(matches!(err, CertDbError::UserDeclined));
        assert!(h.store.list().unwrap().is_empty());
    }

    #[test]
    fn presented_end_entity_is_refused() {
        let h = harness(ConsentDecision::allow(TrustBits::SSL));
        let root = ca("EE Bundle Root");
        let leaf = server_leaf("leaf.example.com", &root);
        let err = h.pipeline.import_ca_bundle(&leaf.der).unwrap_err();
        assert!(matches!(err, CertDbError::NotACaCert { .. }));
        assert_eq!(h.consent.alerts(), vec![Alert::NotACaCert]);
        assert!(h.consent.prompts.lock().unwrap().is_empty());
    }

    #[test]
    fn existing_ca_is_reported() {
        let h = harness(ConsentDecision::allow(TrustBits::SSL));
        let root = ca("Existing Root");
        h.pipeline.import_ca_bundle(&root.der).unwrap();

        let err = h.pipeline.import_ca_bundle(&root.der).unwrap_err();
        assert!(matches!(err, CertDbError::AlreadyExists { .. }));
        assert_eq!(h.consent.alerts(), vec![Alert::CaCertExists]);
    }

    #[test]
    fn empty_ca_bundle_is_a_no_op() {
        let h = harness(ConsentDecision::allow(TrustBits::SSL));
        let key = pem::encode(&pem::Pem::new("PRIVATE KEY", vec![1, 2, 3]));
        let report = h.pipeline.import_ca_bundle(key.as_bytes()).unwrap();
        assert!(report.presented.is_none());
        assert!(report.committed.is_empty());
    }

    #[test]
    fn undecodable_member_fails_before_any_mutation() {
        let h = harness(ConsentDecision::allow(TrustBits::SSL));
        let root = ca("Decode Root");
        let mut bundle = pem_bundle(&[&root]);
        bundle.extend_from_slice(pem::encode(&pem::Pem::new("CERTIFICATE", vec![0x30, 0x00])).as_bytes());

        let err = h.pipeline.import_ca_bundle(&bundle).unwrap_err();
        assert!(matches!(err, CertDbError::DecodeFailed(_)));
        assert!(h.store.list().unwrap().is_empty());
        assert_eq!(h.store.temporary_count(), 0);
    }

    #[test]
    fn ca_import_requires_owner_thread() {
        let h = harness(ConsentDecision::allow(TrustBits::SSL));
        let root = ca("Thread Root");
        let pipeline = &h.pipeline;
        let result = std::thread::scope(|s| {
            s.spawn(|| pipeline.import_ca_bundle(&root.der))
                .join()
                .unwrap()
        });
        assert!(matches!(result, Err(CertDbError::NotSameThread { .. })));
    }

    #[test]
    fn failing_candidate_costs_one_commit() {
        let (store, log, pipeline) = scripted(&["B"]);
        let a = ca("A");
        let b = ca("B");
        let c = ca("C");
        let mut report = ImportReport::new(CertType::Ca);
        let members: Vec<_> = [&a, &b, &c].iter().map(|i| handle(i)).collect();

        pipeline
            .verify_and_commit(&members, CertUsage::VerifyCa, CandidateFilter::CaOnly, &mut report)
            .unwrap();

        assert_eq!(report.committed.len(), 2);
        assert_eq!(report.unverified().count(), 1);
        assert_eq!(store.list().unwrap().len(), 2);

        // Every commit is preceded by the verification of the same certificate.
        let events = log.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                Event::Verify("A".into()),
                Event::Commit("A".into()),
                Event::Verify("B".into()),
                Event::Verify("C".into()),
                Event::Commit("C".into()),
            ]
        );
    }

    #[test]
    fn verified_chain_members_are_committed_once() {
        let log: EventLog = Arc::new(Mutex::new(Vec::new()));
        let memory = Arc::new(MemoryTrustStore::new());
        let store: Arc<dyn TrustStore> = Arc::new(LoggingStore::new(memory.clone(), log.clone()));
        let root = ca("Chain Root");
        let inter = intermediate("Chain Inter", &root);
        let leaf = email_leaf("Dana", "dana@example.com", &inter);
        let verifier = Arc::new(
            ScriptedVerifier::new(&[], log.clone())
                .with_chain(vec![handle(&leaf), handle(&inter), handle(&root)]),
        );
        let pipeline = ImportPipeline::new(
            Arc::new(X509Decoder),
            verifier.clone(),
            store.clone(),
            Arc::new(ScriptedConsent::new(ConsentDecision::DECLINED)),
            Arc::new(MemoryKeyStore::new()),
            NicknameAllocator::new(store, NicknameTemplate::parse("%1$s").unwrap()),
            OwnerThread::current(true),
        );

        let report = pipeline
            .import_email_bundle(&pem_bundle(&[&leaf, &inter]))
            .unwrap();

        let names: Vec<_> = report.committed.iter().map(|c| c.nickname.as_str()).collect();
        assert_eq!(
            names,
            vec!["dana@example.com", "Chain Inter - Test Org", "Chain Root - Test Org"]
        );
        assert_eq!(report.committed[0].trust, "p,p,p");
        assert_eq!(report.committed[1].trust, "c,c,c");
        // The intermediate is not an e-mail candidate.
        assert_eq!(report.skipped[0].reason, SkipReason::FilteredByUsage);
        assert_eq!(memory.list().unwrap().len(), 3);
        assert_eq!(*verifier.usages.lock().unwrap(), vec![CertUsage::EmailRecipient]);
    }

    #[test]
    fn email_import_verifies_against_trusted_root() {
        let h = harness(ConsentDecision::DECLINED);
        let root = ca("Mail Root");
        h.store
            .commit_permanent(
                &handle(&root),
                "Mail Root",
                None,
                &TrustRecord::valid_ca().with_ca_trust(TrustBits::EMAIL),
            )
            .unwrap();
        let alice = email_leaf("Alice", "alice@example.com", &root);
        let web = server_leaf("web.example.com", &root);

        let report = h
            .pipeline
            .import_email_bundle(&pem_bundle(&[&alice, &web]))
            .unwrap();

        assert_eq!(report.committed.len(), 1);
        assert_eq!(report.committed[0].nickname, "alice@example.com");
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].reason, SkipReason::FilteredByUsage);
        assert_eq!(h.store.find_by_email("alice@example.com").unwrap().len(), 1);
    }

    #[test]
    fn empty_email_package_is_decode_failure() {
        let h = harness(ConsentDecision::DECLINED);
        let key = pem::encode(&pem::Pem::new("PRIVATE KEY", vec![1]));
        assert!(matches!(
            h.pipeline.import_email_bundle(key.as_bytes()),
            Err(CertDbError::DecodeFailed(_))
        ));
    }

    #[test]
    fn user_import_requires_private_key() {
        let h = harness(ConsentDecision::DECLINED);
        let root = ca("User Root");
        let me = user_leaf("Me", &root);

        let err = h.pipeline.import_user_bundle(&me.der).unwrap_err();
        assert!(matches!(err, CertDbError::NoPrivateKey { .. }));
        assert_eq!(h.consent.alerts(), vec![Alert::UserCertIgnoredNoPrivateKey]);
    }

    #[test]
    fn user_import_commits_identity_and_ca_members() {
        let h = harness(ConsentDecision::DECLINED);
        let root = ca("Identity Root");
        h.store
            .commit_permanent(
                &handle(&root),
                "Identity Root",
                None,
                &TrustRecord::valid_ca().with_ca_trust(TrustBits::SSL),
            )
            .unwrap();
        let inter = intermediate("Identity Inter", &root);
        let me = user_leaf("Me", &inter);
        let stray = server_leaf("stray.example.com", &root);
        h.keys.register(&handle(&me), KeySlot::token("Smart Card"));

        let report = h
            .pipeline
            .import_user_bundle(&pem_bundle(&[&me, &inter, &stray]))
            .unwrap();

        assert_eq!(report.committed[0].nickname, "Smart Card:Me's Test Org ID");
        assert_eq!(report.committed[0].trust, "u,u,u");
        assert_eq!(report.committed[1].nickname, "Identity Inter - Test Org");
        assert_eq!(report.committed.len(), 2);
        assert_eq!(report.skipped[0].reason, SkipReason::FilteredByUsage);

        let stored = h.store.find_by_der(&me.der).unwrap().unwrap();
        assert_eq!(stored.token(), Some("Smart Card"));
        assert_eq!(h.consent.alerts(), vec![Alert::UserCertImported]);
    }

    #[test]
    fn user_import_keeps_existing_nickname() {
        let h = harness(ConsentDecision::DECLINED);
        let root = ca("Keep Root");
        let me = user_leaf("Keeper", &root);
        let me_h = handle(&me);
        h.keys.register(&me_h, KeySlot::internal());
        h.store
            .commit_permanent(&me_h, "my old name", None, &TrustRecord::valid_peer())
            .unwrap();

        let report = h.pipeline.import_user_bundle(&me.der).unwrap();
        assert_eq!(report.committed[0].nickname, "my old name");
        assert!(h.store.get_trust(&me_h).unwrap().unwrap().is_user());
    }

    #[test]
    fn user_import_requires_owner_thread() {
        let h = harness(ConsentDecision::DECLINED);
        let root = ca("Thread User Root");
        let me = user_leaf("Thread Me", &root);
        h.keys.register(&handle(&me), KeySlot::internal());

        let pipeline = &h.pipeline;
        let result = std::thread::scope(|s| {
            s.spawn(|| pipeline.import_user_bundle(&me.der))
                .join()
                .unwrap()
        });
        assert!(matches!(result, Err(CertDbError::NotSameThread { .. })));
        assert!(h.store.list().unwrap().is_empty());
        assert!(h.consent.alerts().is_empty());
    }

    #[test]
    fn store_failure_is_fatal_to_the_batch() {
        let h = harness(ConsentDecision::allow(TrustBits::SSL));
        let root = ca("Fatal Root");
        h.store.set_read_only(true);
        let err = h.pipeline.import_ca_bundle(&root.der).unwrap_err();
        assert!(matches!(err, CertDbError::StoreCommitFailed { .. }));
        assert!(err.is_fatal_to_batch());
        assert_eq!(h.store.temporary_count(), 0);
    }

    #[test]
    fn alerts_off_the_owner_thread_are_dropped() {
        let consent = Arc::new(ScriptedConsent::new(ConsentDecision::DECLINED));
        let store = Arc::new(MemoryTrustStore::new());
        let pipeline = ImportPipeline::new(
            Arc::new(X509Decoder),
            Arc::new(PathVerifier::new(store.clone(), VerifierConfig::default())),
            store.clone(),
            consent.clone(),
            Arc::new(MemoryKeyStore::new()),
            NicknameAllocator::new(store, NicknameTemplate::parse("%s").unwrap()),
            OwnerThread::current(true),
        );
        let unknown_root = ca("Far Root");
        let stranger = email_leaf("Far", "far@example.com", &unknown_root);
        let bundle = stranger.der.clone();

        let report = std::thread::scope(|s| {
            s.spawn(|| pipeline.import_email_bundle(&bundle)).join().unwrap()
        })
        .unwrap();
        assert_eq!(report.unverified().count(), 1);
        assert!(consent.alerts().is_empty());
    }
}

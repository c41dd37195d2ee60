//! In-process trust store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use certdb_core::{CertDbError, Result, TrustRecord};

use crate::cert::CertificateHandle;
use crate::store::TrustStore;

struct Entry {
    cert: CertificateHandle,
    placement: Option<Placement>,
    trust: Option<TrustRecord>,
}

struct Placement {
    nickname: String,
    token: Option<String>,
}

impl Entry {
    fn handle(&self) -> CertificateHandle {
        let temp = self.cert.to_temporary();
        match &self.placement {
            Some(p) => temp.into_permanent(p.nickname.clone(), p.token.clone()),
            None => temp,
        }
    }

    const fn is_permanent(&self) -> bool {
        self.placement.is_some()
    }
}

/// Trust store kept entirely in memory.
///
/// Entries keep insertion order, so lookups returning several certificates
/// list older entries first. Each certificate has a single entry, staged or
/// permanent. A store created with [`with_password`] refuses
/// trust mutation until [`login`] succeeds; an empty password is logged in
/// automatically on first use.
///
/// [`with_password`]: MemoryTrustStore::with_password
/// [`login`]: MemoryTrustStore::login
#[derive(Default)]
pub struct MemoryTrustStore {
    entries: RwLock<Vec<Entry>>,
    password: Option<String>,
    logged_in: AtomicBool,
    read_only: AtomicBool,
}

impl MemoryTrustStore {
    /// An empty store without a login requirement.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty store protected by `password`.
    #[must_use]
    pub fn with_password(password: impl Into<String>) -> Self {
        Self {
            password: Some(password.into()),
            ..Self::default()
        }
    }

    /// Log in with `password`.
    pub fn login(&self, password: &str) -> Result<()> {
        match &self.password {
            Some(expected) if expected != password => {
                Err(CertDbError::NotAuthenticated("incorrect password".into()))
            }
            _ => {
                self.logged_in.store(true, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    pub fn logout(&self) {
        self.logged_in.store(false, Ordering::SeqCst);
    }

    /// Refuse every write while set.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Number of staged, uncommitted certificates.
    pub fn temporary_count(&self) -> usize {
        self.read().iter().filter(|e| !e.is_permanent()).count()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Entry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Entry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_writable(&self) -> Result<()> {
        if self.read_only.load(Ordering::SeqCst) {
            Err(CertDbError::Store("store is read-only".into()))
        } else {
            Ok(())
        }
    }

    fn permanent_where(&self, pred: impl Fn(&Entry) -> bool) -> Vec<CertificateHandle> {
        self.read()
            .iter()
            .filter(|e| e.is_permanent() && pred(e))
            .map(Entry::handle)
            .collect()
    }
}

impl TrustStore for MemoryTrustStore {
    fn find_by_issuer_serial(
        &self,
        issuer: &[u8],
        serial: &[u8],
    ) -> Result<Option<CertificateHandle>> {
        Ok(self
            .permanent_where(|e| e.cert.issuer_raw() == issuer && e.cert.serial() == serial)
            .into_iter()
            .next())
    }

    fn find_by_nickname(&self, nickname: &str) -> Result<Option<CertificateHandle>> {
        Ok(self
            .permanent_where(|e| e.placement.as_ref().is_some_and(|p| p.nickname == nickname))
            .into_iter()
            .next())
    }

    fn find_on_token(&self, token: &str, nickname: &str) -> Result<Vec<CertificateHandle>> {
        Ok(self.permanent_where(|e| {
            e.placement
                .as_ref()
                .is_some_and(|p| p.nickname == nickname && p.token.as_deref() == Some(token))
        }))
    }

    fn find_by_der(&self, der: &[u8]) -> Result<Option<CertificateHandle>> {
        Ok(self
            .read()
            .iter()
            .find(|e| e.cert.der() == der)
            .map(Entry::handle))
    }

    fn find_by_subject(&self, subject: &[u8]) -> Result<Vec<CertificateHandle>> {
        Ok(self
            .read()
            .iter()
            .filter(|e| e.cert.subject_raw() == subject)
            .map(Entry::handle)
            .collect())
    }

    fn find_by_email(&self, email: &str) -> Result<Vec<CertificateHandle>> {
        Ok(self.permanent_where(|e| e.cert.has_email(email)))
    }

    fn list(&self) -> Result<Vec<CertificateHandle>> {
        Ok(self.permanent_where(|_| true))
    }

    fn stage_temporary(&self, cert: &CertificateHandle) -> Result<()> {
        let mut entries = self.write();
        if entries.iter().any(|e| e.cert.same_cert(cert)) {
            return Ok(());
        }
        entries.push(Entry {
            cert: cert.to_temporary(),
            placement: None,
            trust: None,
        });
        Ok(())
    }

    fn discard_temporary(&self, certs: &[CertificateHandle]) -> Result<()> {
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|e| e.is_permanent() || !certs.iter().any(|c| c.same_cert(&e.cert)));
        debug!(discarded = before - entries.len(), "released temporary certificates");
        Ok(())
    }

    fn commit_permanent(
        &self,
        cert: &CertificateHandle,
        nickname: &str,
        token: Option<&str>,
        trust: &TrustRecord,
    ) -> Result<CertificateHandle> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(CertDbError::StoreCommitFailed {
                nickname: nickname.to_string(),
                reason: "store is read-only".into(),
            });
        }

        let mut entries = self.write();
        // Token labels may repeat; internal nicknames are unique per subject.
        let clash = token.is_none()
            && entries.iter().any(|e| {
                !e.cert.same_cert(cert)
                    && e.cert.subject_raw() != cert.subject_raw()
                    && e.placement
                        .as_ref()
                        .is_some_and(|p| p.token.is_none() && p.nickname == nickname)
            });
        if clash {
            return Err(CertDbError::StoreCommitFailed {
                nickname: nickname.to_string(),
                reason: "nickname is held by a different subject".into(),
            });
        }

        let placement = Placement {
            nickname: nickname.to_string(),
            token: token.map(str::to_string),
        };
        let index = match entries.iter().position(|e| e.cert.same_cert(cert)) {
            Some(i) => {
                entries[i].placement = Some(placement);
                entries[i].trust = Some(*trust);
                i
            }
            None => {
                entries.push(Entry {
                    cert: cert.to_temporary(),
                    placement: Some(placement),
                    trust: Some(*trust),
                });
                entries.len() - 1
            }
        };
        debug!(nickname, token, trust = %trust, "committed certificate");
        Ok(entries[index].handle())
    }

    fn set_trust(&self, cert: &CertificateHandle, trust: &TrustRecord) -> Result<()> {
        self.check_writable()?;
        let mut entries = self.write();
        let entry = entries
            .iter_mut()
            .find(|e| e.cert.same_cert(cert))
            .ok_or_else(|| CertDbError::Store(format!("{} is not in the store", cert.subject())))?;
        entry.trust = Some(*trust);
        Ok(())
    }

    fn get_trust(&self, cert: &CertificateHandle) -> Result<Option<TrustRecord>> {
        Ok(self
            .read()
            .iter()
            .find(|e| e.cert.same_cert(cert))
            .and_then(|e| e.trust))
    }

    fn remove(&self, cert: &CertificateHandle) -> Result<()> {
        self.check_writable()?;
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|e| !e.cert.same_cert(cert));
        if entries.len() == before {
            return Err(CertDbError::Store(format!(
                "{} is not in the store",
                cert.subject()
            )));
        }
        Ok(())
    }

    fn authenticate(&self) -> Result<()> {
        let Some(password) = &self.password else {
            return Ok(());
        };
        if self.logged_in.load(Ordering::SeqCst) {
            return Ok(());
        }
        if password.is_empty() {
            debug!("logging in with the default empty password");
            self.logged_in.store(true, Ordering::SeqCst);
            return Ok(());
        }
        Err(CertDbError::NotAuthenticated("store requires login".into()))
    }
}

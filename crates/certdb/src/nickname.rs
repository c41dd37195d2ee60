//! Nickname generation.
//!
//! A nickname is rendered from a template, prefixed with the token name for
//! certificates stored on a hardware token, then probed as `base`,
//! `base #2`, `base #3`, ... until the domain's collision rule accepts it.

use std::sync::Arc;
use tracing::debug;

use certdb_core::{CertDbError, Result};

use crate::cert::CertificateHandle;
use crate::store::TrustStore;

const UNKNOWN_CA: &str = "Unknown CA";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Arg(usize),
}

/// A parsed printf-style nickname template.
///
/// Supports `%s` (next argument), `%1$s`, `%2$s` and `%%`. The first
/// argument is the subject common name, the second the issuer organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NicknameTemplate {
    pieces: Vec<Piece>,
}

impl NicknameTemplate {
    /// Number of arguments a template may reference.
    pub const MAX_ARGS: usize = 2;

    pub fn parse(template: &str) -> Result<Self> {
        let invalid =
            |why: &str| CertDbError::InvalidNicknameTemplate(format!("{why} in \"{template}\""));

        let mut pieces = Vec::new();
        let mut literal = String::new();
        let mut next_arg = 0usize;
        let mut chars = template.chars();

        while let Some(c) = chars.next() {
            if c != '%' {
                literal.push(c);
                continue;
            }
            let index = match chars.next() {
                Some('%') => {
                    literal.push('%');
                    continue;
                }
                Some('s') => {
                    next_arg += 1;
                    next_arg - 1
                }
                Some(d @ '1'..='9') => {
                    if chars.next() != Some('$') || chars.next() != Some('s') {
                        return Err(invalid("expected positional %N$s"));
                    }
                    (u32::from(d) - u32::from('1')) as usize
                }
                Some(other) => return Err(invalid(&format!("unsupported directive %{other}"))),
                None => return Err(invalid("dangling %")),
            };
            if index >= Self::MAX_ARGS {
                return Err(invalid("more than two arguments"));
            }
            if !literal.is_empty() {
                pieces.push(Piece::Literal(std::mem::take(&mut literal)));
            }
            pieces.push(Piece::Arg(index));
        }
        if !literal.is_empty() {
            pieces.push(Piece::Literal(literal));
        }
        Ok(Self { pieces })
    }

    /// Render with the subject common name and issuer organization.
    pub fn render(&self, common_name: &str, issuer_org: &str) -> String {
        let args = [common_name, issuer_org];
        self.pieces
            .iter()
            .map(|p| match p {
                Piece::Literal(s) => s.as_str(),
                Piece::Arg(i) => args[*i],
            })
            .collect()
    }
}

/// Where a nickname must be unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NicknameDomain {
    /// The built-in store
    Internal,
    /// A named hardware token
    Token(String),
}

/// Collision rule for one domain.
pub trait CollisionRule {
    fn collides(&self, candidate: &str, cert: &CertificateHandle) -> Result<bool>;
}

/// Internal store: any certificate carrying the label collides.
pub struct InternalCollision<'a> {
    store: &'a dyn TrustStore,
}

impl<'a> InternalCollision<'a> {
    pub const fn new(store: &'a dyn TrustStore) -> Self {
        Self { store }
    }
}

impl CollisionRule for InternalCollision<'_> {
    fn collides(&self, candidate: &str, _cert: &CertificateHandle) -> Result<bool> {
        Ok(self.store.find_by_nickname(candidate)?.is_some())
    }
}

/// Token: only a certificate with the same label and the same subject
/// collides. A label held by a different subject is reused.
pub struct TokenCollision<'a> {
    store: &'a dyn TrustStore,
    token: &'a str,
}

impl<'a> TokenCollision<'a> {
    pub const fn new(store: &'a dyn TrustStore, token: &'a str) -> Self {
        Self { store, token }
    }
}

impl CollisionRule for TokenCollision<'_> {
    fn collides(&self, candidate: &str, cert: &CertificateHandle) -> Result<bool> {
        Ok(self
            .store
            .find_on_token(self.token, candidate)?
            .iter()
            .any(|held| held.subject_raw() == cert.subject_raw()))
    }
}

/// Probe `base`, `base #2`, ... against `rule`.
pub fn probe(base: &str, cert: &CertificateHandle, rule: &dyn CollisionRule) -> Result<String> {
    if !rule.collides(base, cert)? {
        return Ok(base.to_string());
    }
    let mut count: u32 = 2;
    loop {
        let candidate = format!("{base} #{count}");
        if !rule.collides(&candidate, cert)? {
            return Ok(candidate);
        }
        count = count.checked_add(1).ok_or_else(|| CertDbError::NicknameExhausted {
            base: base.to_string(),
        })?;
    }
}

/// Allocates nicknames against a trust store.
pub struct NicknameAllocator {
    store: Arc<dyn TrustStore>,
    template: NicknameTemplate,
}

impl NicknameAllocator {
    pub fn new(store: Arc<dyn TrustStore>, template: NicknameTemplate) -> Self {
        Self { store, template }
    }

    /// Nickname for a user certificate in `domain`, rendered from the template.
    pub fn allocate(&self, cert: &CertificateHandle, domain: &NicknameDomain) -> Result<String> {
        let rendered = self.template.render(
            cert.common_name().unwrap_or_default(),
            cert.issuer_organization().unwrap_or_default(),
        );
        let nickname = match domain {
            NicknameDomain::Internal => {
                probe(&rendered, cert, &InternalCollision::new(self.store.as_ref()))?
            }
            NicknameDomain::Token(token) => probe(
                &format!("{token}:{rendered}"),
                cert,
                &TokenCollision::new(self.store.as_ref(), token),
            )?,
        };
        debug!(nickname = %nickname, ?domain, "allocated nickname");
        Ok(nickname)
    }

    /// Nickname for a CA, from its subject name, in the internal store.
    pub fn ca_nickname(&self, cert: &CertificateHandle) -> Result<String> {
        let base = subject_label(cert).unwrap_or_else(|| UNKNOWN_CA.to_string());
        probe(&base, cert, &InternalCollision::new(self.store.as_ref()))
    }

    /// Nickname for an end-entity certificate committed alongside a chain.
    ///
    /// Uses the first e-mail address when there is one, otherwise the
    /// subject label.
    pub fn peer_nickname(&self, cert: &CertificateHandle) -> Result<String> {
        let base = cert
            .emails()
            .first()
            .cloned()
            .or_else(|| subject_label(cert))
            .unwrap_or_else(|| cert.subject().to_string());
        probe(&base, cert, &InternalCollision::new(self.store.as_ref()))
    }
}

/// `"<CN or OU> - <O>"`, or whichever part exists.
fn subject_label(cert: &CertificateHandle) -> Option<String> {
    let name = cert.common_name().or_else(|| cert.organizational_unit());
    match (name, cert.organization()) {
        (Some(n), Some(o)) => Some(format!("{n} - {o}")),
        (Some(part), None) | (None, Some(part)) => Some(part.to_string()),
        (None, None) => None,
    }
}

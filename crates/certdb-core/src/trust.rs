//! Trust model: certificate types, usage kinds and trust records.
//!
//! A [`TrustRecord`] holds one [`UsageTrust`] flag set per usage kind
//! (SSL, e-mail, object signing). Records are always built from scratch
//! and then raised; nothing here ORs new bits onto an existing record.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CertDbError;

/// What role a certificate plays in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertType {
    /// Certificate authority
    Ca,
    /// TLS server or peer
    Server,
    /// Someone else's e-mail certificate
    Email,
    /// Our own identity certificate, backed by a private key
    User,
}

impl CertType {
    /// Infer the type of a stored certificate.
    ///
    /// User trust wins, then CA-ness, then the presence of an e-mail address.
    #[must_use]
    pub fn classify(is_ca: bool, has_email: bool, trust: Option<&TrustRecord>) -> Self {
        if trust.is_some_and(TrustRecord::is_user) {
            Self::User
        } else if is_ca {
            Self::Ca
        } else if has_email {
            Self::Email
        } else {
            Self::Server
        }
    }
}

impl fmt::Display for CertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ca => write!(f, "CA"),
            Self::Server => write!(f, "server"),
            Self::Email => write!(f, "email"),
            Self::User => write!(f, "user"),
        }
    }
}

/// The three usages trust is tracked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustKind {
    /// TLS client and server authentication
    Ssl,
    /// S/MIME
    Email,
    /// Code and object signing
    ObjectSigning,
}

impl TrustKind {
    /// Every kind, in record order.
    pub const ALL: [Self; 3] = [Self::Ssl, Self::Email, Self::ObjectSigning];
}

impl fmt::Display for TrustKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ssl => write!(f, "ssl"),
            Self::Email => write!(f, "email"),
            Self::ObjectSigning => write!(f, "objsign"),
        }
    }
}

impl FromStr for TrustKind {
    type Err = CertDbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ssl" => Ok(Self::Ssl),
            "email" => Ok(Self::Email),
            "objsign" | "object_signing" => Ok(Self::ObjectSigning),
            other => Err(CertDbError::InvalidTrustKind(other.to_string())),
        }
    }
}

/// Usages a user or caller asks to trust.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrustBits {
    /// Trust for TLS
    pub ssl: bool,
    /// Trust for e-mail
    pub email: bool,
    /// Trust for object signing
    pub object_signing: bool,
}

impl TrustBits {
    /// Nothing requested.
    pub const NONE: Self = Self {
        ssl: false,
        email: false,
        object_signing: false,
    };

    /// Every usage requested.
    pub const ALL: Self = Self {
        ssl: true,
        email: true,
        object_signing: true,
    };

    /// Only TLS.
    pub const SSL: Self = Self {
        ssl: true,
        email: false,
        object_signing: false,
    };

    /// Only e-mail.
    pub const EMAIL: Self = Self {
        ssl: false,
        email: true,
        object_signing: false,
    };

    /// Only object signing.
    pub const OBJECT_SIGNING: Self = Self {
        ssl: false,
        email: false,
        object_signing: true,
    };

    /// Whether `kind` is requested.
    #[must_use]
    pub const fn contains(self, kind: TrustKind) -> bool {
        match kind {
            TrustKind::Ssl => self.ssl,
            TrustKind::Email => self.email,
            TrustKind::ObjectSigning => self.object_signing,
        }
    }

    /// True when no usage is requested.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        !self.ssl && !self.email && !self.object_signing
    }
}

/// Trust flags for one usage kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct UsageTrust {
    /// `p`: a terminal record, valid as a peer
    pub terminal_record: bool,
    /// `P`: trusted peer
    pub trusted_peer: bool,
    /// `c`: valid CA
    pub valid_ca: bool,
    /// `C`: trusted CA for issuing server certificates
    pub trusted_ca: bool,
    /// `T`: trusted CA for issuing client certificates
    pub trusted_client_ca: bool,
    /// `u`: certificate has a matching private key
    pub user: bool,
    /// `w`: warn when sending
    pub send_warn: bool,
    /// `i`: CA hidden from UI
    pub invisible_ca: bool,
}

impl UsageTrust {
    const fn valid_ca() -> Self {
        Self {
            terminal_record: false,
            trusted_peer: false,
            valid_ca: true,
            trusted_ca: false,
            trusted_client_ca: false,
            user: false,
            send_warn: false,
            invisible_ca: false,
        }
    }

    const fn valid_peer() -> Self {
        Self {
            terminal_record: true,
            trusted_peer: false,
            valid_ca: false,
            trusted_ca: false,
            trusted_client_ca: false,
            user: false,
            send_warn: false,
            invisible_ca: false,
        }
    }

    /// True when no flag is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        !self.terminal_record
            && !self.trusted_peer
            && !self.valid_ca
            && !self.trusted_ca
            && !self.trusted_client_ca
            && !self.user
            && !self.send_warn
            && !self.invisible_ca
    }

    fn parse(field: &str) -> Result<Self, CertDbError> {
        let mut t = Self::default();
        for c in field.chars() {
            match c {
                'p' => t.terminal_record = true,
                'P' => {
                    t.trusted_peer = true;
                    t.terminal_record = true;
                }
                'c' => t.valid_ca = true,
                'C' => {
                    t.trusted_ca = true;
                    t.valid_ca = true;
                }
                'T' => {
                    t.trusted_client_ca = true;
                    t.valid_ca = true;
                }
                'u' => t.user = true,
                'w' => t.send_warn = true,
                'i' => t.invisible_ca = true,
                other => {
                    return Err(CertDbError::InvalidTrustString(format!(
                        "unknown trust flag '{other}' in \"{field}\""
                    )))
                }
            }
        }
        Ok(t)
    }

    fn write_flags(&self, out: &mut String) {
        if self.terminal_record && !self.trusted_peer {
            out.push('p');
        }
        if self.trusted_peer {
            out.push('P');
        }
        if self.valid_ca && !self.trusted_ca && !self.trusted_client_ca {
            out.push('c');
        }
        if self.trusted_ca {
            out.push('C');
        }
        if self.trusted_client_ca {
            out.push('T');
        }
        if self.user {
            out.push('u');
        }
        if self.send_warn {
            out.push('w');
        }
        if self.invisible_ca {
            out.push('i');
        }
    }
}

/// Complete trust state of one certificate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrustRecord {
    /// TLS trust
    pub ssl: UsageTrust,
    /// E-mail trust
    pub email: UsageTrust,
    /// Object signing trust
    pub object_signing: UsageTrust,
}

impl TrustRecord {
    /// No flag set on any usage.
    ///
    /// Stored against a certificate this marks it explicitly untrusted.
    #[must_use]
    pub fn untrusted() -> Self {
        Self::default()
    }

    /// Valid CA for every usage, trusted for none.
    #[must_use]
    pub const fn valid_ca() -> Self {
        Self {
            ssl: UsageTrust::valid_ca(),
            email: UsageTrust::valid_ca(),
            object_signing: UsageTrust::valid_ca(),
        }
    }

    /// Valid peer for every usage, trusted for none.
    #[must_use]
    pub const fn valid_peer() -> Self {
        Self {
            ssl: UsageTrust::valid_peer(),
            email: UsageTrust::valid_peer(),
            object_signing: UsageTrust::valid_peer(),
        }
    }

    /// Identity certificate backed by a private key.
    #[must_use]
    pub fn user() -> Self {
        let mut record = Self::default();
        for kind in TrustKind::ALL {
            record.usage_mut(kind).user = true;
        }
        record
    }

    /// Raise CA trust for the requested usages.
    #[must_use]
    pub fn with_ca_trust(mut self, bits: TrustBits) -> Self {
        for kind in TrustKind::ALL {
            if bits.contains(kind) {
                let usage = self.usage_mut(kind);
                usage.valid_ca = true;
                usage.trusted_ca = true;
                if kind == TrustKind::Ssl {
                    usage.trusted_client_ca = true;
                }
            }
        }
        self
    }

    /// Raise peer trust for the requested usages.
    #[must_use]
    pub fn with_peer_trust(mut self, bits: TrustBits) -> Self {
        for kind in TrustKind::ALL {
            if bits.contains(kind) {
                let usage = self.usage_mut(kind);
                usage.terminal_record = true;
                usage.trusted_peer = true;
            }
        }
        self
    }

    /// Compute a fresh record for `cert_type` from the requested bits.
    ///
    /// Server certificates only honor SSL and e-mail certificates only
    /// honor e-mail. Returns `None` for user certificates, whose trust
    /// is not independently settable.
    #[must_use]
    pub fn for_cert_type(cert_type: CertType, requested: TrustBits) -> Option<Self> {
        match cert_type {
            CertType::Ca => Some(Self::valid_ca().with_ca_trust(requested)),
            CertType::Server => Some(Self::valid_peer().with_peer_trust(TrustBits {
                ssl: requested.ssl,
                ..TrustBits::NONE
            })),
            CertType::Email => Some(Self::valid_peer().with_peer_trust(TrustBits {
                email: requested.email,
                ..TrustBits::NONE
            })),
            CertType::User => None,
        }
    }

    /// Flags for one usage.
    #[must_use]
    pub const fn usage(&self, kind: TrustKind) -> &UsageTrust {
        match kind {
            TrustKind::Ssl => &self.ssl,
            TrustKind::Email => &self.email,
            TrustKind::ObjectSigning => &self.object_signing,
        }
    }

    fn usage_mut(&mut self, kind: TrustKind) -> &mut UsageTrust {
        match kind {
            TrustKind::Ssl => &mut self.ssl,
            TrustKind::Email => &mut self.email,
            TrustKind::ObjectSigning => &mut self.object_signing,
        }
    }

    /// Trusted as an issuing CA for `kind`, for server or client certificates.
    #[must_use]
    pub const fn has_trusted_ca(&self, kind: TrustKind) -> bool {
        let usage = self.usage(kind);
        usage.trusted_ca || usage.trusted_client_ca
    }

    /// Trusted as an end-entity peer for `kind`.
    #[must_use]
    pub const fn has_trusted_peer(&self, kind: TrustKind) -> bool {
        self.usage(kind).trusted_peer
    }

    /// Trusted as an issuing CA for any usage.
    #[must_use]
    pub fn has_any_trusted_ca(&self) -> bool {
        TrustKind::ALL.iter().any(|&k| self.has_trusted_ca(k))
    }

    /// Carries user (private key) trust on any usage.
    #[must_use]
    pub fn is_user(&self) -> bool {
        TrustKind::ALL.iter().any(|&k| self.usage(k).user)
    }

    /// True when every usage is empty.
    #[must_use]
    pub const fn is_untrusted(&self) -> bool {
        self.ssl.is_empty() && self.email.is_empty() && self.object_signing.is_empty()
    }
}

impl FromStr for TrustRecord {
    type Err = CertDbError;

    /// Parse `ssl,email,objsign`, e.g. `"CT,C,c"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split(',').collect();
        if fields.len() > 3 {
            return Err(CertDbError::InvalidTrustString(format!(
                "expected at most 3 fields, got {}",
                fields.len()
            )));
        }

        let mut record = Self::default();
        for (kind, field) in TrustKind::ALL.iter().zip(fields) {
            *record.usage_mut(*kind) = UsageTrust::parse(field.trim())?;
        }
        Ok(record)
    }
}

impl fmt::Display for TrustRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.ssl.write_flags(&mut out);
        out.push(',');
        self.email.write_flags(&mut out);
        out.push(',');
        self.object_signing.write_flags(&mut out);
        f.write_str(&out)
    }
}

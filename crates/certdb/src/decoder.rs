//! Turning certificate packages into handles.

use base64::{engine::general_purpose::STANDARD as B64, Engine};
use chrono::{DateTime, TimeZone, Utc};
use tracing::debug;
use x509_parser::extensions::GeneralName;
use x509_parser::parse_x509_certificate;
use x509_parser::time::ASN1Time;
use x509_parser::x509::AttributeTypeAndValue;

use certdb_core::{CertDbError, Result};

use crate::cert::{CertFields, CertificateHandle, KeyPurposes};

/// Decodes raw certificate material.
pub trait CertDecoder: Send + Sync {
    /// Split a package into the DER blobs it carries.
    fn decode_package(&self, bytes: &[u8]) -> Result<Vec<Vec<u8>>>;

    /// Parse one DER certificate into a temporary handle.
    fn decode_certificate(&self, der: &[u8]) -> Result<CertificateHandle>;
}

/// Decoder for PEM bundles, single DER certificates and base64 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct X509Decoder;

impl X509Decoder {
    pub const fn new() -> Self {
        Self
    }
}

impl CertDecoder for X509Decoder {
    fn decode_package(&self, bytes: &[u8]) -> Result<Vec<Vec<u8>>> {
        decode_package_inner(bytes, true)
    }

    fn decode_certificate(&self, der: &[u8]) -> Result<CertificateHandle> {
        parse_der(der)
    }
}

const PEM_MARKER: &[u8] = b"-----BEGIN";

fn decode_package_inner(bytes: &[u8], allow_base64: bool) -> Result<Vec<Vec<u8>>> {
    // DER SEQUENCE, taken as-is since trailing bytes may be significant
    if bytes.first() == Some(&0x30) {
        return Ok(vec![bytes.to_vec()]);
    }

    let trimmed = trim_whitespace(bytes);
    if trimmed.is_empty() {
        return Err(CertDbError::DecodeFailed("empty certificate package".into()));
    }

    if trimmed.starts_with(PEM_MARKER) {
        let blocks =
            pem::parse_many(trimmed).map_err(|e| CertDbError::DecodeFailed(e.to_string()))?;
        let ders: Vec<Vec<u8>> = blocks
            .into_iter()
            .filter(|p| p.tag() == "CERTIFICATE")
            .map(pem::Pem::into_contents)
            .collect();
        debug!(count = ders.len(), "decoded PEM package");
        return Ok(ders);
    }

    if allow_base64 {
        let compact: Vec<u8> = trimmed
            .iter()
            .copied()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        if let Ok(decoded) = B64.decode(&compact) {
            return decode_package_inner(&decoded, false);
        }
    }

    Err(CertDbError::DecodeFailed(
        "not PEM, DER or base64 certificate data".into(),
    ))
}

/// Parse a DER certificate with `x509-parser`.
pub fn parse_der(der: &[u8]) -> Result<CertificateHandle> {
    let (rest, cert) =
        parse_x509_certificate(der).map_err(|e| CertDbError::DecodeFailed(e.to_string()))?;
    if !rest.is_empty() {
        return Err(CertDbError::DecodeFailed(format!(
            "{} trailing bytes after certificate",
            rest.len()
        )));
    }

    let subject = cert.subject();
    let issuer = cert.issuer();

    let mut emails: Vec<String> = subject
        .iter_email()
        .filter_map(|a| a.as_str().ok())
        .map(str::to_string)
        .collect();
    let mut dns_names = Vec::new();
    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            match name {
                GeneralName::RFC822Name(addr) => {
                    if !emails.iter().any(|e| e.eq_ignore_ascii_case(addr)) {
                        emails.push((*addr).to_string());
                    }
                }
                GeneralName::DNSName(dns) => dns_names.push((*dns).to_string()),
                _ => {}
            }
        }
    }

    let path_len_constraint = cert
        .basic_constraints()
        .ok()
        .flatten()
        .and_then(|bc| bc.value.path_len_constraint);

    let key_purposes = cert
        .extended_key_usage()
        .map_err(|e| CertDbError::DecodeFailed(e.to_string()))?
        .map(|eku| KeyPurposes {
            any: eku.value.any,
            server_auth: eku.value.server_auth,
            client_auth: eku.value.client_auth,
            email_protection: eku.value.email_protection,
            code_signing: eku.value.code_signing,
        });

    let fields = CertFields {
        der: der.to_vec(),
        subject: subject.to_string(),
        subject_raw: subject.as_raw().to_vec(),
        issuer: issuer.to_string(),
        issuer_raw: issuer.as_raw().to_vec(),
        serial: cert.raw_serial().to_vec(),
        common_name: first_str(subject.iter_common_name()),
        organization: first_str(subject.iter_organization()),
        organizational_unit: first_str(subject.iter_organizational_unit()),
        issuer_organization: first_str(issuer.iter_organization()),
        emails,
        dns_names,
        is_ca: cert.is_ca(),
        path_len_constraint,
        key_purposes,
        not_before: asn1_to_utc(cert.validity().not_before)?,
        not_after: asn1_to_utc(cert.validity().not_after)?,
        spki: cert.public_key().raw.to_vec(),
    };

    Ok(CertificateHandle::new(fields))
}

/// Decode a base64 DER certificate, ignoring whitespace.
pub fn der_from_base64(text: &str) -> Result<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.is_empty() {
        return Err(CertDbError::InvalidBase64("empty input".into()));
    }
    B64.decode(compact.as_bytes())
        .map_err(|e| CertDbError::InvalidBase64(e.to_string()))
}

fn trim_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}

fn first_str<'a, 'b: 'a>(
    mut values: impl Iterator<Item = &'a AttributeTypeAndValue<'b>>,
) -> Option<String> {
    values
        .next()
        .and_then(|v| v.as_str().ok())
        .map(str::to_string)
}

fn asn1_to_utc(t: ASN1Time) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(t.timestamp(), 0)
        .single()
        .ok_or_else(|| CertDbError::DecodeFailed(format!("validity time out of range: {t}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{ca, email_leaf, intermediate};

    #[test]
    fn decodes_single_der() {
        let root = ca("Decoder Root");
        let ders = X509Decoder.decode_package(&root.der).unwrap();
        assert_eq!(ders, vec![root.der.clone()]);

        let handle = X509Decoder.decode_certificate(&ders[0]).unwrap();
        assert!(handle.is_ca());
        assert!(handle.is_self_issued());
        assert_eq!(handle.common_name(), Some("Decoder Root"));
        assert_eq!(handle.organization(), Some("Test Org"));
        assert!(!handle.is_permanent());
    }

    #[test]
    fn decodes_pem_bundle_and_skips_other_blocks() {
        let root = ca("PEM Root");
        let inter = intermediate("PEM Inter", &root);
        let key = pem::Pem::new("PRIVATE KEY", vec![1, 2, 3]);
        let bundle = format!(
            "{}{}{}",
            root.cert.pem(),
            pem::encode(&key),
            inter.cert.pem()
        );

        let ders = X509Decoder.decode_package(bundle.as_bytes()).unwrap();
        assert_eq!(ders, vec![root.der.clone(), inter.der.clone()]);
    }

    #[test]
    fn decodes_base64_der() {
        let root = ca("B64 Root");
        let text = B64.encode(&root.der);
        let ders = X509Decoder.decode_package(text.as_bytes()).unwrap();
        assert_eq!(ders, vec![root.der.clone()]);
    }

    #[test]
    fn pem_without_certificates_is_empty() {
        let key = pem::encode(&pem::Pem::new("PRIVATE KEY", vec![1, 2, 3]));
        assert!(X509Decoder.decode_package(key.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn rejects_empty_and_garbage() {
        assert!(matches!(
            X509Decoder.decode_package(b""),
            Err(CertDbError::DecodeFailed(_))
        ));
        assert!(matches!(
            X509Decoder.decode_package(b"  \n"),
            Err(CertDbError::DecodeFailed(_))
        ));
        assert!(matches!(
            X509Decoder.decode_package(b"!!not a cert!!"),
            Err(CertDbError::DecodeFailed(_))
        ));
        assert!(matches!(
            X509Decoder.decode_certificate(&[0x30, 0x03, 0x02, 0x01, 0x01]),
            Err(CertDbError::DecodeFailed(_))
        ));
    }

    #[test]
    fn extracts_email_and_key_purposes() {
        let root = ca("Mail Root");
        let leaf = email_leaf("Alice", "alice@example.com", &root);
        let handle = parse_der(&leaf.der).unwrap();

        assert!(!handle.is_ca());
        assert!(handle.has_email("alice@example.com"));
        assert_eq!(handle.issuer_organization(), Some("Test Org"));
        assert_eq!(handle.issuer_raw(), parse_der(&root.der).unwrap().subject_raw());
        let purposes = handle.key_purposes().unwrap();
        assert!(purposes.email_protection);
        assert!(!purposes.server_auth);
    }

    #[test]
    fn base64_helper_rejects_bad_input() {
        assert!(matches!(der_from_base64(""), Err(CertDbError::InvalidBase64(_))));
        assert!(matches!(der_from_base64("@@@"), Err(CertDbError::InvalidBase64(_))));
        assert_eq!(der_from_base64("AQID\n").unwrap(), vec![1, 2, 3]);
    }
}

//! Certificate lookup keys.
//!
//! A DB key re-locates a stored certificate by issuer and serial number.
//! Wire layout, base64-encoded for external use:
//!
//! ```text
//! 4 bytes  reserved (module id, never implemented)   must be zero
//! 4 bytes  reserved (slot id, never implemented)     must be zero
//! 4 bytes  serial number length                      big-endian
//! 4 bytes  DER issuer name length                    big-endian
//! n bytes  serial number
//! m bytes  DER-encoded issuer distinguished name
//! ```

use base64::{engine::general_purpose::STANDARD as B64, Engine};
use serde::{Deserialize, Serialize};

use crate::error::{CertDbError, Result};

/// Size of the fixed header preceding the serial and issuer bytes.
pub const HEADER_LEN: usize = 16;

/// An (issuer, serial) pair identifying one certificate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DbKey {
    /// Raw serial number bytes
    pub serial: Vec<u8>,
    /// DER-encoded issuer distinguished name
    pub issuer: Vec<u8>,
}

impl DbKey {
    /// Build a key from its parts.
    pub fn new(serial: impl Into<Vec<u8>>, issuer: impl Into<Vec<u8>>) -> Self {
        Self {
            serial: serial.into(),
            issuer: issuer.into(),
        }
    }

    /// Serialize to the base64 external form.
    pub fn encode(&self) -> Result<String> {
        encode(&self.issuer, &self.serial)
    }

    /// Parse the base64 external form.
    pub fn decode(key: &str) -> Result<Self> {
        let (serial, issuer) = decode(key)?;
        Ok(Self { serial, issuer })
    }
}

/// Encode an issuer name and serial number as a DB key.
///
/// Fails only if a field does not fit the 32-bit length prefix.
pub fn encode(issuer: &[u8], serial: &[u8]) -> Result<String> {
    let serial_len = u32::try_from(serial.len())
        .map_err(|_| CertDbError::MalformedKey("serial number too long".into()))?;
    let issuer_len = u32::try_from(issuer.len())
        .map_err(|_| CertDbError::MalformedKey("issuer name too long".into()))?;

    let mut raw = Vec::with_capacity(HEADER_LEN + serial.len() + issuer.len());
    raw.extend_from_slice(&[0u8; 8]);
    raw.extend_from_slice(&serial_len.to_be_bytes());
    raw.extend_from_slice(&issuer_len.to_be_bytes());
    raw.extend_from_slice(serial);
    raw.extend_from_slice(issuer);

    Ok(B64.encode(raw))
}

/// Decode a DB key into `(serial, issuer)`.
///
/// Whitespace anywhere in the key is ignored for compatibility with keys
/// that were line-wrapped when stored.
pub fn decode(key: &str) -> Result<(Vec<u8>, Vec<u8>)> {
    let compact: String = key.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.is_empty() {
        return Err(CertDbError::MalformedKey("empty key".into()));
    }

    let raw = B64
        .decode(compact.as_bytes())
        .map_err(|e| CertDbError::MalformedKey(format!("bad base64: {e}")))?;

    if raw.len() < HEADER_LEN {
        return Err(CertDbError::MalformedKey(format!(
            "decoded length {} shorter than header",
            raw.len()
        )));
    }

    if raw[..8].iter().any(|&b| b != 0) {
        return Err(CertDbError::MalformedKey("reserved bytes are not zero".into()));
    }

    let serial_len = read_u32(&raw[8..12]);
    let issuer_len = read_u32(&raw[12..16]);

    // u64 keeps the sum from overflowing on hostile lengths.
    let expected = HEADER_LEN as u64 + u64::from(serial_len) + u64::from(issuer_len);
    if raw.len() as u64 != expected {
        return Err(CertDbError::MalformedKey(format!(
            "length mismatch: declared {expected}, decoded {}",
            raw.len()
        )));
    }

    let serial_end = HEADER_LEN + serial_len as usize;
    let serial = raw[HEADER_LEN..serial_end].to_vec();
    let issuer = raw[serial_end..].to_vec();
    Ok((serial, issuer))
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_be_bytes(buf)
}

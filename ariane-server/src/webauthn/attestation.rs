//! CBOR attestation object and authenticator data parsing.
//!
//! Layout of `authData` (WebAuthn §6.1):
//!
//! | bytes | field |
//! |---|---|
//! | 32 | SHA-256 of the RP ID |
//! | 1 | flags |
//! | 4 | signature counter, big endian |
//! | var | attested credential data, present when `AT` is set |

use ciborium::Value;

use ariane_core::ArianeError;

/// User present
pub const FLAG_UP: u8 = 0x01;
/// User verified
pub const FLAG_UV: u8 = 0x04;
/// Attested credential data included
pub const FLAG_AT: u8 = 0x40;

const HEADER_LEN: usize = 37;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredential {
    pub aaguid: [u8; 16],
    pub credential_id: Vec<u8>,
    /// Raw COSE_Key bytes
    pub public_key: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; 32],
    pub flags: u8,
    pub sign_count: u32,
    pub attested: Option<AttestedCredential>,
}

fn malformed(detail: impl std::fmt::Display) -> ArianeError {
    ArianeError::CeremonyRejected(format!("malformed authenticator data: {detail}"))
}

impl AuthenticatorData {
    pub fn parse(bytes: &[u8]) -> Result<Self, ArianeError> {
        if bytes.len() < HEADER_LEN {
            return Err(malformed(format!("{} bytes, need at least {HEADER_LEN}", bytes.len())));
        }

        let mut rp_id_hash = [0u8; 32];
        rp_id_hash.copy_from_slice(&bytes[..32]);
        let flags = bytes[32];
        let sign_count = u32::from_be_bytes([bytes[33], bytes[34], bytes[35], bytes[36]]);

        let attested = if flags & FLAG_AT != 0 {
            Some(parse_attested(&bytes[HEADER_LEN..])?)
        } else {
            None
        };

        Ok(Self {
            rp_id_hash,
            flags,
            sign_count,
            attested,
        })
    }

    pub fn user_present(&self) -> bool {
        self.flags & FLAG_UP != 0
    }

    pub fn user_verified(&self) -> bool {
        self.flags & FLAG_UV != 0
    }

    /// Serialize back to the wire layout. Extensions are not supported.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + 128);
        out.extend_from_slice(&self.rp_id_hash);
        out.push(self.flags);
        out.extend_from_slice(&self.sign_count.to_be_bytes());
        if let Some(cred) = &self.attested {
            out.extend_from_slice(&cred.aaguid);
            out.extend_from_slice(&(cred.credential_id.len() as u16).to_be_bytes());
            out.extend_from_slice(&cred.credential_id);
            out.extend_from_slice(&cred.public_key);
        }
        out
    }
}

fn parse_attested(rest: &[u8]) -> Result<AttestedCredential, ArianeError> {
    if rest.len() < 18 {
        return Err(malformed("truncated attested credential data"));
    }

    let mut aaguid = [0u8; 16];
    aaguid.copy_from_slice(&rest[..16]);
    let id_len = u16::from_be_bytes([rest[16], rest[17]]) as usize;
    let id_end = 18 + id_len;
    if rest.len() < id_end {
        return Err(malformed("credential id runs past the end"));
    }
    let credential_id = rest[18..id_end].to_vec();

    // The COSE key is self-delimiting; measure it by decoding
    let key_bytes = &rest[id_end..];
    let mut reader = key_bytes;
    let key: Value = ciborium::from_reader(&mut reader).map_err(malformed)?;
    if !matches!(key, Value::Map(_)) {
        return Err(malformed("credential public key is not a CBOR map"));
    }
    let consumed = key_bytes.len() - reader.len();

    Ok(AttestedCredential {
        aaguid,
        credential_id,
        public_key: key_bytes[..consumed].to_vec(),
    })
}

/// Extract and parse `authData` from a CBOR attestation object.
pub fn parse_attestation_object(bytes: &[u8]) -> Result<AuthenticatorData, ArianeError> {
    let object: Value = ciborium::from_reader(bytes).map_err(malformed)?;
    let entries = match object {
        Value::Map(entries) => entries,
        _ => return Err(malformed("attestation object is not a CBOR map")),
    };

    let auth_data = entries
        .into_iter()
        .find_map(|(k, v)| match (k, v) {
            (Value::Text(name), Value::Bytes(data)) if name == "authData" => Some(data),
            _ => None,
        })
        .ok_or_else(|| malformed("attestation object has no authData"))?;

    AuthenticatorData::parse(&auth_data)
}

/// Wrap authenticator data in a `none`-format attestation object.
pub fn encode_attestation_object(auth_data: &[u8]) -> Result<Vec<u8>, ArianeError> {
    let object = Value::Map(vec![
        (Value::Text("fmt".into()), Value::Text("none".into())),
        (Value::Text("attStmt".into()), Value::Map(vec![])),
        (Value::Text("authData".into()), Value::Bytes(auth_data.to_vec())),
    ]);
    let mut out = Vec::new();
    ciborium::into_writer(&object, &mut out)
        .map_err(|e| ArianeError::Serialization(e.to_string()))?;
    Ok(out)
}

/// COSE_Key for an EC2 P-256 public key (ES256).
pub fn cose_es256_key(x: &[u8; 32], y: &[u8; 32]) -> Result<Vec<u8>, ArianeError> {
    let key = Value::Map(vec![
        (Value::Integer(1.into()), Value::Integer(2.into())),
        (Value::Integer(3.into()), Value::Integer((-7).into())),
        (Value::Integer((-1).into()), Value::Integer(1.into())),
        (Value::Integer((-2).into()), Value::Bytes(x.to_vec())),
        (Value::Integer((-3).into()), Value::Bytes(y.to_vec())),
    ]);
    let mut out = Vec::new();
    ciborium::into_writer(&key, &mut out).map_err(|e| ArianeError::Serialization(e.to_string()))?;
    Ok(out)
}

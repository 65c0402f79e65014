//! Local validation of certificate and private key PEM
//!
//! Every deployment parses the material before calling a vendor: the chain
//! must contain at least one well-formed certificate (leaf first), the key
//! must be a PKCS#8, PKCS#1 (RSA) or SEC1 (EC) private key, and the key's
//! public half must equal the leaf's subject public key.
//!
//! PKCS#1 and SEC1 keys are rewrapped as PKCS#8 before loading; the PEM
//! handed to deploy targets is left as given.

use chrono::{DateTime, Utc};
use pem::Pem;
use rcgen::KeyPair;
use sha2::{Digest, Sha256};
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::X509Certificate;

use super::provider::DeployError;

const CERTIFICATE_TAG: &str = "CERTIFICATE";
const PKCS8_TAG: &str = "PRIVATE KEY";
const PKCS1_RSA_TAG: &str = "RSA PRIVATE KEY";
const SEC1_EC_TAG: &str = "EC PRIVATE KEY";

/// AlgorithmIdentifier contents for rsaEncryption with NULL parameters
const RSA_ALGORITHM: &[u8] = &[
    0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01, 0x05, 0x00,
];
/// id-ecPublicKey
const EC_PUBLIC_KEY_OID: &[u8] = &[0x06, 0x07, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01];
/// prime256v1 and secp384r1
const EC_CURVE_OIDS: [&[u8]; 2] = [
    &[0x06, 0x08, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07],
    &[0x06, 0x05, 0x2b, 0x81, 0x04, 0x00, 0x22],
];

/// Parsed, consistency-checked certificate material
#[derive(Clone)]
pub struct CertificateMaterial {
    certificate_pem: String,
    private_key_pem: String,
    chain_len: usize,
    common_name: Option<String>,
    subject_alt_names: Vec<String>,
    serial: String,
    not_after: DateTime<Utc>,
    fingerprint: String,
}

impl CertificateMaterial {
    /// Parse and cross-check a PEM chain and its private key
    pub fn parse(certificate_pem: &str, private_key_pem: &str) -> Result<Self, DeployError> {
        let blocks = pem::parse_many(certificate_pem)
            .map_err(|e| invalid(format!("certificate PEM is malformed: {}", e)))?;

        let certificates: Vec<_> = blocks
            .iter()
            .filter(|block| block.tag() == CERTIFICATE_TAG)
            .collect();

        let Some(leaf_block) = certificates.first() else {
            return Err(invalid("no CERTIFICATE block found"));
        };

        for (index, block) in certificates.iter().enumerate().skip(1) {
            x509_parser::parse_x509_certificate(block.contents())
                .map_err(|e| invalid(format!("chain certificate {} is malformed: {}", index, e)))?;
        }

        let (_, leaf) = x509_parser::parse_x509_certificate(leaf_block.contents())
            .map_err(|e| invalid(format!("leaf certificate is malformed: {}", e)))?;

        let key_blocks = pem::parse_many(private_key_pem)
            .map_err(|e| invalid(format!("private key PEM is malformed: {}", e)))?;
        let key_block = key_blocks
            .iter()
            .find(|b| b.tag().ends_with("PRIVATE KEY"))
            .ok_or_else(|| invalid("no PRIVATE KEY block found"))?;

        let key_pair = load_key_pair(key_block)?;

        if key_pair.public_key_raw() != leaf.public_key().subject_public_key.data.as_ref() {
            return Err(invalid("private key does not match the certificate"));
        }

        let not_after = DateTime::<Utc>::from_timestamp(leaf.validity().not_after.timestamp(), 0)
            .ok_or_else(|| invalid("certificate expiry is out of range"))?;

        Ok(Self {
            certificate_pem: certificate_pem.trim().to_string(),
            private_key_pem: private_key_pem.trim().to_string(),
            chain_len: certificates.len(),
            common_name: common_name(&leaf),
            subject_alt_names: subject_alt_names(&leaf),
            serial: leaf.raw_serial_as_string(),
            not_after,
            fingerprint: hex::encode(Sha256::digest(leaf_block.contents())),
        })
    }

    /// The full chain, leaf first
    pub fn certificate_pem(&self) -> &str {
        &self.certificate_pem
    }

    pub fn private_key_pem(&self) -> &str {
        &self.private_key_pem
    }

    /// Number of certificates in the chain
    pub fn chain_len(&self) -> usize {
        self.chain_len
    }

    pub fn common_name(&self) -> Option<&str> {
        self.common_name.as_deref()
    }

    /// DNS names from the subjectAltName extension
    pub fn subject_alt_names(&self) -> &[String] {
        &self.subject_alt_names
    }

    /// Serial number, colon-separated hex
    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// Lowercase hex SHA-256 of the leaf DER
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Stable resource name derived from the leaf fingerprint
    pub fn resource_name(&self) -> String {
        format!("certkeeper-{}", &self.fingerprint[..16])
    }

    /// Primary name: the common name, else the first DNS SAN
    pub fn primary_name(&self) -> Option<&str> {
        self.common_name()
            .or_else(|| self.subject_alt_names.first().map(String::as_str))
    }

    pub fn is_expired(&self) -> bool {
        self.not_after <= Utc::now()
    }
}

impl std::fmt::Debug for CertificateMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateMaterial")
            .field("common_name", &self.common_name)
            .field("subject_alt_names", &self.subject_alt_names)
            .field("serial", &self.serial)
            .field("not_after", &self.not_after)
            .field("fingerprint", &self.fingerprint)
            .field("chain_len", &self.chain_len)
            .finish_non_exhaustive()
    }
}

fn invalid(message: impl Into<String>) -> DeployError {
    DeployError::InvalidCertificateMaterial(message.into())
}

/// Load a PKCS#8, PKCS#1 or SEC1 private key
fn load_key_pair(block: &Pem) -> Result<KeyPair, DeployError> {
    let unusable = |e: rcgen::Error| invalid(format!("private key is unusable: {}", e));

    match block.tag() {
        PKCS8_TAG => pkcs8_key_pair(block.contents().to_vec()).map_err(unusable),
        PKCS1_RSA_TAG => {
            pkcs8_key_pair(pkcs8_wrap(RSA_ALGORITHM, block.contents())).map_err(unusable)
        }
        SEC1_EC_TAG => {
            // The curve is not known up front; the loader rejects a mismatched one
            let mut last_error = None;
            for curve in EC_CURVE_OIDS {
                let algorithm = [EC_PUBLIC_KEY_OID, curve].concat();
                match pkcs8_key_pair(pkcs8_wrap(&algorithm, block.contents())) {
                    Ok(key_pair) => return Ok(key_pair),
                    Err(e) => last_error = Some(e),
                }
            }
            Err(match last_error {
                Some(e) => unusable(e),
                None => invalid("EC private key uses an unsupported curve"),
            })
        }
        other => Err(invalid(format!("unsupported private key format '{}'", other))),
    }
}

fn pkcs8_key_pair(der: Vec<u8>) -> Result<KeyPair, rcgen::Error> {
    KeyPair::from_pem(&pem::encode(&Pem::new(PKCS8_TAG, der)))
}

/// PrivateKeyInfo (RFC 5208) around a PKCS#1 or SEC1 key
fn pkcs8_wrap(algorithm: &[u8], private_key: &[u8]) -> Vec<u8> {
    let version = der_tlv(0x02, &[0x00]);
    let algorithm = der_tlv(0x30, algorithm);
    let key = der_tlv(0x04, private_key);
    der_tlv(0x30, &[version, algorithm, key].concat())
}

fn der_tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = len.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        out.push(0x80 | (bytes.len() - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
    }
    out.extend_from_slice(content);
    out
}

fn common_name(cert: &X509Certificate<'_>) -> Option<String> {
    cert.subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_string)
}

fn subject_alt_names(cert: &X509Certificate<'_>) -> Vec<String> {
    match cert.subject_alternative_name() {
        Ok(Some(san)) => san
            .value
            .general_names
            .iter()
            .filter_map(|name| match name {
                GeneralName::DNSName(dns) => Some(dns.to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

use super::ProbeError;
use chrono::{DateTime, Utc};
use std::fmt;
use x509_parser::{
    certificate::X509Certificate,
    extensions::KeyUsage as X509KeyUsage,
    prelude::FromDer,
    time::ASN1Time,
    x509::X509Name,
};

/// One certificate from the presented chain, leaf at position 0
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRecord {
    pub position: usize,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// Issuer common name, empty when absent
    pub issuer_common_name: String,
    /// Subject common name, empty when absent
    pub subject_common_name: String,
    /// Serial number in decimal
    pub serial_number: String,
    pub key_usage: Vec<KeyUsage>,
}

/// Named bits of the X.509 key usage extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyUsage {
    DigitalSignature,
    ContentCommitment,
    KeyEncipherment,
    DataEncipherment,
    KeyAgreement,
    CertSign,
    CrlSign,
    EncipherOnly,
    DecipherOnly,
}

impl KeyUsage {
    pub const ALL: [Self; 9] = [
        Self::DigitalSignature,
        Self::ContentCommitment,
        Self::KeyEncipherment,
        Self::DataEncipherment,
        Self::KeyAgreement,
        Self::CertSign,
        Self::CrlSign,
        Self::EncipherOnly,
        Self::DecipherOnly,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DigitalSignature => "digital_signature",
            Self::ContentCommitment => "content_commitment",
            Self::KeyEncipherment => "key_encipherment",
            Self::DataEncipherment => "data_encipherment",
            Self::KeyAgreement => "key_agreement",
            Self::CertSign => "cert_sign",
            Self::CrlSign => "crl_sign",
            Self::EncipherOnly => "encipher_only",
            Self::DecipherOnly => "decipher_only",
        }
    }

    fn is_set(self, ku: &X509KeyUsage) -> bool {
        match self {
            Self::DigitalSignature => ku.digital_signature(),
            Self::ContentCommitment => ku.non_repudiation(),
            Self::KeyEncipherment => ku.key_encipherment(),
            Self::DataEncipherment => ku.data_encipherment(),
            Self::KeyAgreement => ku.key_agreement(),
            Self::CertSign => ku.key_cert_sign(),
            Self::CrlSign => ku.crl_sign(),
            Self::EncipherOnly => ku.encipher_only(),
            Self::DecipherOnly => ku.decipher_only(),
        }
    }

    /// Decode the declared usages, in bit order
    #[must_use]
    pub fn decode(ku: &X509KeyUsage) -> Vec<Self> {
        Self::ALL
            .into_iter()
            .filter(|usage| usage.is_set(ku))
            .collect()
    }
}

impl fmt::Display for KeyUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse every DER certificate of a chain, failing on the first one that does not decode
///
/// # Errors
///
/// Returns `ProbeError::Decode` with the position of the offending certificate
pub fn parse_chain<'a, C>(chain: &'a [C]) -> Result<Vec<X509Certificate<'a>>, ProbeError>
where
    C: AsRef<[u8]>,
{
    chain
        .iter()
        .enumerate()
        .map(|(position, der)| {
            let (rest, cert) =
                X509Certificate::from_der(der.as_ref()).map_err(|e| ProbeError::Decode {
                    position,
                    reason: e.to_string(),
                })?;
            if rest.is_empty() {
                Ok(cert)
            } else {
                Err(ProbeError::Decode {
                    position,
                    reason: format!("{} trailing bytes after certificate", rest.len()),
                })
            }
        })
        .collect()
}

/// Require each certificate to be issued by the one that follows it
///
/// Names are compared on their DER encoding.
///
/// # Errors
///
/// Returns `ProbeError::ChainValidation` for the first broken link
pub fn verify_issuer_links(chain: &[X509Certificate<'_>]) -> Result<(), ProbeError> {
    for (position, pair) in chain.windows(2).enumerate() {
        let [cert, next] = pair else { continue };
        if cert.issuer().as_raw() != next.subject().as_raw() {
            return Err(ProbeError::ChainValidation {
                position,
                issuer: cert.issuer().to_string(),
                next_subject: next.subject().to_string(),
            });
        }
    }
    Ok(())
}

/// Build the record for the certificate at `position`
///
/// # Errors
///
/// Returns `ProbeError::Decode` if the validity window or key usage extension is malformed
pub fn certificate_record(
    position: usize,
    cert: &X509Certificate<'_>,
) -> Result<CertificateRecord, ProbeError> {
    let decode_error = |reason: String| ProbeError::Decode { position, reason };

    let validity = cert.validity();
    let not_before = to_utc(&validity.not_before)
        .ok_or_else(|| decode_error("invalid notBefore timestamp".to_string()))?;
    let not_after = to_utc(&validity.not_after)
        .ok_or_else(|| decode_error("invalid notAfter timestamp".to_string()))?;

    let key_usage = cert
        .key_usage()
        .map_err(|e| decode_error(format!("invalid key usage extension: {e}")))?
        .map(|ext| KeyUsage::decode(ext.value))
        .unwrap_or_default();

    Ok(CertificateRecord {
        position,
        not_before,
        not_after,
        issuer_common_name: common_name(cert.issuer()),
        subject_common_name: common_name(cert.subject()),
        serial_number: cert.serial.to_string(),
        key_usage,
    })
}

fn common_name(name: &X509Name<'_>) -> String {
    name.iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn to_utc(time: &ASN1Time) -> Option<DateTime<Utc>> {
    let raw = time.to_datetime();
    DateTime::<Utc>::from_timestamp(raw.unix_timestamp(), raw.nanosecond())
}

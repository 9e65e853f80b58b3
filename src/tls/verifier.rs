use anyhow::{Context, Result, anyhow};
use rustls::{
    DigitallySignedStruct, Error as TlsError, RootCertStore, SignatureScheme,
    client::{
        WebPkiServerVerifier,
        danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    },
    crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature},
    pki_types::{CertificateDer, ServerName, UnixTime},
};
use std::{path::Path, sync::Arc};

/// Build the server certificate verifier for a probe
///
/// With `insecure_skip_verify` every presented chain is accepted so it can still be
/// reported. Otherwise the chain is checked against `ca_file`, or the bundled
/// `webpki-roots` when no file is configured.
///
/// # Errors
///
/// Returns an error if the CA file cannot be loaded or the `WebPKI` verifier cannot be built
pub async fn build_verifier(
    insecure_skip_verify: bool,
    ca_file: Option<&Path>,
    provider: &Arc<CryptoProvider>,
) -> Result<Arc<dyn ServerCertVerifier>> {
    if insecure_skip_verify {
        return Ok(Arc::new(AcceptAnyServerCert::new(provider.clone())));
    }

    let roots = match ca_file {
        Some(path) => {
            let mut roots = RootCertStore::empty();
            for cert in super::probe::load_cert_chain(path).await? {
                roots
                    .add(cert)
                    .with_context(|| format!("invalid CA certificate in {}", path.display()))?;
            }
            roots
        }
        None => webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect(),
    };

    let verifier: Arc<dyn ServerCertVerifier> =
        WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider.clone())
            .build()
            .map_err(|e| anyhow!("failed to build WebPKI verifier: {e}"))?;
    Ok(verifier)
}

/// Certificate verifier that accepts any server certificate.
///
/// Handshake signatures are still checked with the crypto provider so the
/// peer has to own the key of the certificate it presented.
#[derive(Debug)]
pub struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl AcceptAnyServerCert {
    #[must_use]
    pub const fn new(provider: Arc<CryptoProvider>) -> Self {
        Self { provider }
    }
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use rustls::crypto::ring::default_provider;

    fn provider() -> Arc<CryptoProvider> {
        Arc::new(default_provider())
    }

    #[tokio::test]
    async fn test_insecure_verifier_accepts_anything() {
        let verifier = build_verifier(true, None, &provider()).await.unwrap();
        let name = ServerName::try_from("example.com").unwrap();
        let result = verifier.verify_server_cert(
            &CertificateDer::from(vec![0u8; 4]),
            &[],
            &name,
            &[],
            UnixTime::now(),
        );
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_webpki_verifier_rejects_garbage() {
        let verifier = build_verifier(false, None, &provider()).await.unwrap();
        let name = ServerName::try_from("example.com").unwrap();
        let result = verifier.verify_server_cert(
            &CertificateDer::from(vec![0u8; 4]),
            &[],
            &name,
            &[],
            UnixTime::now(),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_missing_ca_file() {
        let result = build_verifier(
            false,
            Some(Path::new("/nonexistent/ca.pem")),
            &provider(),
        )
        .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_supported_schemes() {
        let verifier = AcceptAnyServerCert::new(provider());
        let schemes = verifier.supported_verify_schemes();
        assert!(!schemes.is_empty());
        assert!(schemes.contains(&SignatureScheme::RSA_PKCS1_SHA256));
        assert!(schemes.contains(&SignatureScheme::ECDSA_NISTP256_SHA256));
    }
}

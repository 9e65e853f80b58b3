use super::{
    ProbeError, ProbeFailure, ProbeResult, ProbeSuccess, ProbeTarget, certificate, proxy,
    verifier::build_verifier,
};
use crate::config::{Module, ProberKind};
use anyhow::{Context, Result, anyhow};
use rustls::{
    ClientConfig,
    crypto::CryptoProvider,
    pki_types::{CertificateDer, PrivateKeyDer},
};
use rustls_pemfile::{certs, private_key};
use std::{
    io::Cursor,
    path::Path,
    sync::{Arc, OnceLock},
    time::Instant,
};
use tokio::{fs, net::TcpStream};
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

static CRYPTO_PROVIDER: OnceLock<Arc<CryptoProvider>> = OnceLock::new();

/// Ensure the rustls crypto provider is initialized and return it
///
/// The ring provider is installed as the process default on first use. It's safe
/// to call multiple times as initialization only happens once.
pub fn ensure_crypto_provider() -> Arc<CryptoProvider> {
    CRYPTO_PROVIDER
        .get_or_init(|| {
            if rustls::crypto::ring::default_provider()
                .install_default()
                .is_err()
            {
                debug!("a rustls crypto provider was already installed");
            }
            Arc::new(rustls::crypto::ring::default_provider())
        })
        .clone()
}

/// Probe `target` under `module` and never fail
///
/// Every error is folded into `ProbeResult::Failure` carrying the target as given.
pub async fn run(target: &str, module: &Module) -> ProbeResult {
    let started = Instant::now();
    match probe(target, module).await {
        Ok(success) => {
            debug!(
                target,
                chain_length = success.chain_length(),
                elapsed_ms = started.elapsed().as_millis(),
                "probe succeeded"
            );
            ProbeResult::Success(success)
        }
        Err(err) => {
            warn!(
                target,
                kind = err.kind(),
                elapsed_ms = started.elapsed().as_millis(),
                "probe failed: {err}"
            );
            ProbeResult::Failure(ProbeFailure::new(target, err))
        }
    }
}

/// Connect to `target`, complete a TLS handshake and decode the presented chain
///
/// Dialing, proxy negotiation and the handshake share one deadline, the module's
/// effective timeout. The connection is closed before the chain is decoded.
///
/// # Errors
///
/// Returns a `ProbeError` describing the first step that failed
pub async fn probe(target: &str, module: &Module) -> Result<ProbeSuccess, ProbeError> {
    if module.prober != ProberKind::Tcp {
        return Err(ProbeError::Configuration(format!(
            "prober {} is not supported, only tcp",
            module.prober
        )));
    }

    let target = ProbeTarget::parse(target, module.effective_port())?;
    let timeout = module.effective_timeout();
    let proxy = module
        .proxy()
        .map_err(|e| ProbeError::configuration(&e))?;
    let connector = build_tls_connector(module).await?;
    let server_name = target.server_name()?;
    let addr = target.authority();

    let handshake = async {
        let stream = match &proxy {
            Some(url) => proxy::connect(url, &target).await?,
            None => TcpStream::connect(addr.as_str())
                .await
                .map_err(|source| ProbeError::Connect {
                    addr: addr.clone(),
                    source,
                })?,
        };
        connector
            .connect(server_name, stream)
            .await
            .map_err(|source| ProbeError::Handshake {
                addr: addr.clone(),
                source,
            })
    };

    let tls_stream = tokio::time::timeout(timeout, handshake)
        .await
        .map_err(|_| ProbeError::Timeout {
            addr: addr.clone(),
            timeout,
        })??;

    let chain: Vec<CertificateDer<'static>> = tls_stream
        .get_ref()
        .1
        .peer_certificates()
        .map(|presented| presented.iter().map(|c| c.clone().into_owned()).collect())
        .unwrap_or_default();
    drop(tls_stream);

    if chain.is_empty() {
        return Err(ProbeError::NoCertificates { addr });
    }

    let parsed = certificate::parse_chain(&chain)?;
    if module.validate_chain {
        certificate::verify_issuer_links(&parsed)?;
    }

    let records = parsed
        .iter()
        .enumerate()
        .map(|(position, cert)| certificate::certificate_record(position, cert))
        .collect::<Result<Vec<_>, _>>()?;

    ProbeSuccess::new(&addr, records)
}

async fn build_tls_connector(module: &Module) -> Result<TlsConnector, ProbeError> {
    let provider = ensure_crypto_provider();

    let verifier = build_verifier(
        module.insecure_skip_verify,
        module.ca_file.as_deref(),
        &provider,
    )
    .await
    .map_err(|e| ProbeError::configuration(&e))?;

    let builder = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ProbeError::Configuration(format!("unsupported TLS versions: {e}")))?
        .dangerous()
        .with_custom_certificate_verifier(verifier);

    let config = match &module.client_cert {
        Some(client_cert) => {
            let identity = async {
                let certs = load_cert_chain(&client_cert.cert_file).await?;
                let key = load_private_key(&client_cert.key_file).await?;
                builder
                    .with_client_auth_cert(certs, key)
                    .context("client certificate does not match its key")
            };
            identity
                .await
                .map_err(|e| ProbeError::configuration(&e))?
        }
        None => builder.with_no_client_auth(),
    };

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Read every PEM certificate in `path`
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not PEM, or holds no certificate
pub(crate) async fn load_cert_chain(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let data = fs::read(path)
        .await
        .with_context(|| format!("failed to read certificate {}", path.display()))?;
    let mut reader = Cursor::new(data);
    let parsed = certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| anyhow!("invalid certificate PEM in {}: {e}", path.display()))?;

    if parsed.is_empty() {
        anyhow::bail!("no certificates found in {}", path.display());
    }

    Ok(parsed)
}

async fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let data = fs::read(path)
        .await
        .with_context(|| format!("failed to read private key {}", path.display()))?;

    let mut reader = Cursor::new(data);
    private_key(&mut reader)
        .map_err(|e| anyhow!("invalid private key PEM in {}: {e}", path.display()))?
        .ok_or_else(|| anyhow!("no private key found in {}", path.display()))
}

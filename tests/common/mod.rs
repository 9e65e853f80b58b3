#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use prometheus::proto::MetricFamily;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType, IsCa, Issuer,
    KeyPair, KeyUsagePurpose, SerialNumber,
};
use remote_cert_exporter::{
    config::{Config, DEFAULT_MODULE, Module},
    server::{AppState, router},
    tls::ensure_crypto_provider,
};
use rustls::{
    RootCertStore, ServerConfig,
    pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer},
    server::WebPkiClientVerifier,
};
use std::{
    collections::HashMap,
    io::Write,
    net::SocketAddr,
    sync::{Arc, Mutex},
};
use tempfile::NamedTempFile;
use time::{Duration, OffsetDateTime};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt;

/// A certificate and its key, in both DER and PEM form
pub struct Identity {
    pub cert: CertificateDer<'static>,
    pub cert_pem: String,
    pub key: KeyPair,
}

impl Identity {
    pub fn private_key(&self) -> PrivateKeyDer<'static> {
        PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(self.key.serialize_der()))
    }

    pub fn key_pem(&self) -> String {
        self.key.serialize_pem()
    }
}

/// A certificate authority able to sign leaves
pub struct TestCa {
    pub identity: Identity,
    issuer: Issuer<'static, KeyPair>,
}

fn identity(cert: &Certificate, key: KeyPair) -> Identity {
    Identity {
        cert: cert.der().clone(),
        cert_pem: cert.pem(),
        key,
    }
}

/// Server certificate parameters: serial 1, valid until `now + valid_for`
pub fn leaf_params(common_name: &str, valid_for: Duration) -> CertificateParams {
    let mut params =
        CertificateParams::new(vec!["127.0.0.1".to_string(), "localhost".to_string()]).unwrap();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    params.distinguished_name = dn;
    params.serial_number = Some(SerialNumber::from(1u64));
    let now = OffsetDateTime::now_utc();
    params.not_before = now - Duration::hours(1);
    params.not_after = now + valid_for;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params
}

/// Self-signed server certificate valid for the next 24 hours
pub fn self_signed(common_name: &str) -> Identity {
    let key = KeyPair::generate().unwrap();
    let cert = leaf_params(common_name, Duration::hours(24))
        .self_signed(&key)
        .unwrap();
    identity(&cert, key)
}

impl TestCa {
    pub fn new(common_name: &str) -> Self {
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, common_name);
        params.distinguished_name = dn;
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];

        let key = KeyPair::generate().unwrap();
        let cert = params.clone().self_signed(&key).unwrap();
        let signing_key = KeyPair::from_pem(&key.serialize_pem()).unwrap();

        Self {
            identity: identity(&cert, key),
            issuer: Issuer::new(params, signing_key),
        }
    }

    /// Leaf signed by this CA, valid for the next 24 hours
    pub fn leaf(&self, common_name: &str) -> Identity {
        let key = KeyPair::generate().unwrap();
        let cert = leaf_params(common_name, Duration::hours(24))
            .signed_by(&key, &self.issuer)
            .unwrap();
        identity(&cert, key)
    }
}

fn server_config(
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    client_ca: Option<&CertificateDer<'static>>,
) -> ServerConfig {
    let provider = ensure_crypto_provider();
    let builder = ServerConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .unwrap();

    let builder = match client_ca {
        Some(ca) => {
            let mut roots = RootCertStore::empty();
            roots.add(ca.clone()).unwrap();
            let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider)
                .build()
                .unwrap();
            builder.with_client_cert_verifier(verifier)
        }
        None => builder.with_no_client_auth(),
    };

    builder.with_single_cert(chain, key).unwrap()
}

async fn serve_tls(config: ServerConfig) -> SocketAddr {
    let acceptor = TlsAcceptor::from(Arc::new(config));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                if let Ok(mut tls) = acceptor.accept(stream).await {
                    let _ = tls.shutdown().await;
                }
            });
        }
    });

    addr
}

/// TLS server on 127.0.0.1 presenting `chain`, signed with `key`
pub async fn spawn_tls_server(
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> SocketAddr {
    serve_tls(server_config(chain, key, None)).await
}

/// TLS server that requires a client certificate issued by `client_ca`
pub async fn spawn_mtls_server(
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    client_ca: &CertificateDer<'static>,
) -> SocketAddr {
    serve_tls(server_config(chain, key, Some(client_ca))).await
}

/// Address on 127.0.0.1 where nothing listens
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// HTTP CONNECT proxy that records every request head it receives
pub async fn spawn_connect_proxy() -> (SocketAddr, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let heads = Arc::clone(&seen);

    tokio::spawn(async move {
        while let Ok((mut client, _)) = listener.accept().await {
            let heads = Arc::clone(&heads);
            tokio::spawn(async move {
                let head = read_head(&mut client).await;
                heads.lock().unwrap().push(head.clone());

                let upstream = head
                    .lines()
                    .next()
                    .and_then(|line| line.strip_prefix("CONNECT "))
                    .and_then(|rest| rest.split_whitespace().next())
                    .map(str::to_string);
                let Some(upstream) = upstream else {
                    let _ = client.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await;
                    return;
                };
                let Ok(mut server) = TcpStream::connect(upstream.as_str()).await else {
                    let _ = client.write_all(b"HTTP/1.1 502 Bad Gateway\r\n\r\n").await;
                    return;
                };
                client
                    .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
                    .await
                    .unwrap();
                let _ = tokio::io::copy_bidirectional(&mut client, &mut server).await;
            });
        }
    });

    (addr, seen)
}

async fn read_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if stream.read(&mut byte).await.unwrap() == 0 {
            break;
        }
        head.extend_from_slice(&byte);
    }
    String::from_utf8_lossy(&head).into_owned()
}

/// Write `contents` to a temporary file kept alive by the returned handle
pub fn temp_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

/// Configuration with a single `default` module
pub fn config_with(module: Module, targets: Vec<String>) -> Config {
    Config {
        modules: HashMap::from([(DEFAULT_MODULE.to_string(), module)]),
        targets,
    }
}

/// Module that reports any presented chain
pub fn insecure_module() -> Module {
    Module {
        insecure_skip_verify: true,
        timeout: std::time::Duration::from_secs(5),
        ..Module::default()
    }
}

/// Exporter routes with `/metrics` as the metrics path
pub fn app(config: Config) -> (Router, AppState) {
    let state = AppState::new(config).unwrap();
    (router(state.clone(), "/metrics"), state)
}

/// Send a GET through the router, returning the status and body
pub async fn get(app: &Router, uri: &str) -> (StatusCode, String) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

/// Value of the gauge in `family` whose labels include every pair in `labels`
pub fn gauge_value(families: &[MetricFamily], family: &str, labels: &[(&str, &str)]) -> Option<f64> {
    find_metric(families, family, labels).map(|metric| metric.get_gauge().value())
}

/// Value of the counter in `family` whose labels include every pair in `labels`
pub fn counter_value(
    families: &[MetricFamily],
    family: &str,
    labels: &[(&str, &str)],
) -> Option<f64> {
    find_metric(families, family, labels).map(|metric| metric.get_counter().value())
}

fn find_metric<'a>(
    families: &'a [MetricFamily],
    family: &str,
    labels: &[(&str, &str)],
) -> Option<&'a prometheus::proto::Metric> {
    families
        .iter()
        .find(|f| f.name() == family)?
        .get_metric()
        .iter()
        .find(|metric| {
            labels.iter().all(|(name, value)| {
                metric
                    .get_label()
                    .iter()
                    .any(|lp| lp.name() == *name && lp.value() == *value)
            })
        })
}

/// Number of series in `family`
pub fn series_count(families: &[MetricFamily], family: &str) -> usize {
    families
        .iter()
        .find(|f| f.name() == family)
        .map_or(0, |f| f.get_metric().len())
}

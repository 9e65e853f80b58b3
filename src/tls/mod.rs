//! Certificate probe engine
//!
//! Opens a TLS connection to a target under a [`Module`](crate::config::Module)
//! policy and decodes the chain the server presents.
//!
//! # Module Organization
//!
//! - `target` - Target parsing and SNI
//! - `proxy` - HTTP CONNECT tunnelling
//! - `verifier` - Server certificate verifiers
//! - `certificate` - Chain decoding and issuer linkage
//! - `probe` - Dial, handshake and chain extraction
//! - `result` - Probe outcome types
//! - `error` - Probe failure causes
//!
//! # Example
//!
//! ```rust,ignore
//! use remote_cert_exporter::{config::Module, tls};
//!
//! let module = Module {
//!     validate_chain: true,
//!     ..Default::default()
//! };
//!
//! match tls::run("example.com", &module).await {
//!     tls::ProbeResult::Success(success) => println!("{} certificates", success.chain_length()),
//!     tls::ProbeResult::Failure(failure) => eprintln!("{}", failure.message()),
//! }
//! ```

pub mod certificate;
pub mod error;
pub mod probe;
pub mod proxy;
pub mod result;
pub mod target;
pub mod verifier;

pub use certificate::{CertificateRecord, KeyUsage};
pub use error::ProbeError;
pub use probe::{ensure_crypto_provider, probe, run};
pub use result::{ProbeFailure, ProbeResult, ProbeSuccess};
pub use target::ProbeTarget;
pub use verifier::AcceptAnyServerCert;

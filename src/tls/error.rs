use std::{io, time::Duration};
use thiserror::Error;

/// Why a single certificate probe failed
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid target {target:?}: {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("proxy {proxy} failed to open tunnel to {addr}: {reason}")]
    Proxy {
        proxy: String,
        addr: String,
        reason: String,
    },

    #[error("TLS handshake with {addr} failed: {source}")]
    Handshake {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("connection to {addr} timed out after {timeout:?}")]
    Timeout { addr: String, timeout: Duration },

    #[error("{addr} presented no certificates")]
    NoCertificates { addr: String },

    #[error(
        "chain validation failed: certificate {position} issuer {issuer:?} does not match next certificate subject {next_subject:?}"
    )]
    ChainValidation {
        position: usize,
        issuer: String,
        next_subject: String,
    },

    #[error("failed to decode certificate at position {position}: {reason}")]
    Decode { position: usize, reason: String },

    #[error("probe of {target} did not complete")]
    Interrupted { target: String },
}

impl ProbeError {
    /// Coarse classification used in logs
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidTarget { .. } | Self::Configuration(_) => "configuration",
            Self::Connect { .. } | Self::Proxy { .. } | Self::NoCertificates { .. } => "connect",
            Self::Handshake { .. } => "handshake",
            Self::Timeout { .. } => "timeout",
            Self::ChainValidation { .. } => "chain_validation",
            Self::Decode { .. } => "decode",
            Self::Interrupted { .. } => "internal",
        }
    }

    pub(crate) fn configuration(error: &anyhow::Error) -> Self {
        Self::Configuration(format!("{error:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_message_includes_address_and_cause() {
        let err = ProbeError::Connect {
            addr: "127.0.0.1:1".to_string(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("failed to connect to 127.0.0.1:1: "));
        assert_eq!(err.kind(), "connect");
    }

    #[test]
    fn test_chain_validation_message() {
        let err = ProbeError::ChainValidation {
            position: 0,
            issuer: "CN=Intermediate A".to_string(),
            next_subject: "CN=Intermediate B".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("certificate 0"));
        assert!(msg.contains("Intermediate B"));
        assert_eq!(err.kind(), "chain_validation");
    }

    #[test]
    fn test_kinds() {
        assert_eq!(
            ProbeError::Configuration("bad".into()).kind(),
            "configuration"
        );
        assert_eq!(
            ProbeError::Timeout {
                addr: "example.com:443".into(),
                timeout: Duration::from_secs(1),
            }
            .kind(),
            "timeout"
        );
        assert_eq!(
            ProbeError::Decode {
                position: 1,
                reason: "truncated".into(),
            }
            .kind(),
            "decode"
        );
        assert_eq!(
            ProbeError::NoCertificates {
                addr: "example.com:443".into(),
            }
            .kind(),
            "connect"
        );
    }

    #[test]
    fn test_configuration_from_anyhow_keeps_context_chain() {
        let err = anyhow::anyhow!("no such file").context("failed to read certificate client.pem");
        let probe_err = ProbeError::configuration(&err);
        assert_eq!(
            probe_err.to_string(),
            "configuration error: failed to read certificate client.pem: no such file"
        );
    }
}

use super::{CertificateRecord, ProbeError};
use std::sync::Arc;

/// Outcome of one probe, built fresh for every call
#[derive(Debug, Clone)]
pub enum ProbeResult {
    Success(ProbeSuccess),
    Failure(ProbeFailure),
}

/// Presented chain, leaf first. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSuccess {
    records: Vec<CertificateRecord>,
}

#[derive(Debug, Clone)]
pub struct ProbeFailure {
    pub target: String,
    pub error: Arc<ProbeError>,
}

impl ProbeSuccess {
    /// Wrap a decoded chain
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::NoCertificates` when `records` is empty
    pub fn new(addr: &str, records: Vec<CertificateRecord>) -> Result<Self, ProbeError> {
        if records.is_empty() {
            return Err(ProbeError::NoCertificates {
                addr: addr.to_string(),
            });
        }
        Ok(Self { records })
    }

    #[must_use]
    pub fn records(&self) -> &[CertificateRecord] {
        &self.records
    }

    #[must_use]
    pub fn chain_length(&self) -> usize {
        self.records.len()
    }
}

impl ProbeFailure {
    #[must_use]
    pub fn new(target: &str, error: ProbeError) -> Self {
        Self {
            target: target.to_string(),
            error: Arc::new(error),
        }
    }

    /// Display text of the underlying error
    #[must_use]
    pub fn message(&self) -> String {
        self.error.to_string()
    }
}

impl ProbeResult {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Number of presented certificates, zero on failure
    #[must_use]
    pub fn chain_length(&self) -> usize {
        match self {
            Self::Success(success) => success.chain_length(),
            Self::Failure(_) => 0,
        }
    }

    #[must_use]
    pub const fn failure(&self) -> Option<&ProbeFailure> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(failure),
        }
    }
}

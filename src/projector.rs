//! Turns a [`ProbeResult`] into metric samples
//!
//! Pure functions only; publication is the coordinator's job.

use crate::tls::{CertificateRecord, ProbeResult};
use chrono::{DateTime, Utc};

/// Per-probe metric families, replaced on every scrape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    ExpirySeconds,
    NotAfterTimestamp,
    ChainLength,
    SerialNumber,
    KeyUsage,
    Error,
}

/// Cumulative counter, never reset
pub const SCRAPE_ERRORS_TOTAL: &str = "ssl_certificate_scrape_errors_total";
pub const SCRAPE_ERRORS_HELP: &str = "Total number of scrape errors";

const CERT_LABELS: &[&str] = &["host", "issuer", "subject", "serial", "position"];
const HOST_LABELS: &[&str] = &["host"];
const SERIAL_LABELS: &[&str] = &["host", "issuer", "subject", "serial"];
const KEY_USAGE_LABELS: &[&str] = &["host", "issuer", "subject", "serial", "usage"];
const ERROR_LABELS: &[&str] = &["host", "error"];

impl Family {
    pub const PER_PROBE: [Self; 6] = [
        Self::ExpirySeconds,
        Self::NotAfterTimestamp,
        Self::ChainLength,
        Self::SerialNumber,
        Self::KeyUsage,
        Self::Error,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ExpirySeconds => "ssl_certificate_expiry_seconds",
            Self::NotAfterTimestamp => "ssl_certificate_not_after_timestamp",
            Self::ChainLength => "ssl_certificate_chain_length",
            Self::SerialNumber => "ssl_certificate_serial_number",
            Self::KeyUsage => "ssl_certificate_key_usage",
            Self::Error => "ssl_certificate_error",
        }
    }

    #[must_use]
    pub const fn help(self) -> &'static str {
        match self {
            Self::ExpirySeconds => "Number of seconds until the SSL certificate expires",
            Self::NotAfterTimestamp => "Timestamp when the SSL certificate expires",
            Self::ChainLength => "Number of certificates presented by the server",
            Self::SerialNumber => "SSL certificate serial number (value is always 1)",
            Self::KeyUsage => "Key usage declared by the SSL certificate (value is always 1)",
            Self::Error => "Error encountered while probing the target (value is always 1)",
        }
    }

    #[must_use]
    pub const fn label_names(self) -> &'static [&'static str] {
        match self {
            Self::ExpirySeconds | Self::NotAfterTimestamp => CERT_LABELS,
            Self::ChainLength => HOST_LABELS,
            Self::SerialNumber => SERIAL_LABELS,
            Self::KeyUsage => KEY_USAGE_LABELS,
            Self::Error => ERROR_LABELS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertLabels {
    pub host: String,
    pub issuer: String,
    pub subject: String,
    pub serial: String,
    pub position: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostLabels {
    pub host: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialLabels {
    pub host: String,
    pub issuer: String,
    pub subject: String,
    pub serial: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyUsageLabels {
    pub certificate: SerialLabels,
    pub usage: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorLabels {
    pub host: String,
    pub error: String,
}

/// One labelled value of a per-probe family
#[derive(Debug, Clone, PartialEq)]
pub enum MetricSample {
    ExpirySeconds(CertLabels, f64),
    NotAfterTimestamp(CertLabels, f64),
    ChainLength(HostLabels, f64),
    SerialNumber(SerialLabels),
    KeyUsage(KeyUsageLabels),
    Error(ErrorLabels),
}

impl MetricSample {
    #[must_use]
    pub const fn family(&self) -> Family {
        match self {
            Self::ExpirySeconds(..) => Family::ExpirySeconds,
            Self::NotAfterTimestamp(..) => Family::NotAfterTimestamp,
            Self::ChainLength(..) => Family::ChainLength,
            Self::SerialNumber(_) => Family::SerialNumber,
            Self::KeyUsage(_) => Family::KeyUsage,
            Self::Error(_) => Family::Error,
        }
    }

    #[must_use]
    pub const fn value(&self) -> f64 {
        match self {
            Self::ExpirySeconds(_, value)
            | Self::NotAfterTimestamp(_, value)
            | Self::ChainLength(_, value) => *value,
            Self::SerialNumber(_) | Self::KeyUsage(_) | Self::Error(_) => 1.0,
        }
    }

    /// Label values in the order of [`Family::label_names`]
    #[must_use]
    pub fn label_values(&self) -> Vec<&str> {
        match self {
            Self::ExpirySeconds(labels, _) | Self::NotAfterTimestamp(labels, _) => vec![
                labels.host.as_str(),
                labels.issuer.as_str(),
                labels.subject.as_str(),
                labels.serial.as_str(),
                labels.position.as_str(),
            ],
            Self::ChainLength(labels, _) => vec![labels.host.as_str()],
            Self::SerialNumber(labels) => vec![
                labels.host.as_str(),
                labels.issuer.as_str(),
                labels.subject.as_str(),
                labels.serial.as_str(),
            ],
            Self::KeyUsage(labels) => vec![
                labels.certificate.host.as_str(),
                labels.certificate.issuer.as_str(),
                labels.certificate.subject.as_str(),
                labels.certificate.serial.as_str(),
                labels.usage.as_str(),
            ],
            Self::Error(labels) => vec![labels.host.as_str(), labels.error.as_str()],
        }
    }

    /// Value of the `host` label
    #[must_use]
    pub fn host(&self) -> &str {
        match self {
            Self::ExpirySeconds(labels, _) | Self::NotAfterTimestamp(labels, _) => &labels.host,
            Self::ChainLength(labels, _) => &labels.host,
            Self::SerialNumber(labels) => &labels.host,
            Self::KeyUsage(labels) => &labels.certificate.host,
            Self::Error(labels) => &labels.host,
        }
    }
}

/// Render `result` for `target` against the current time
#[must_use]
pub fn render(result: &ProbeResult, target: &str) -> Vec<MetricSample> {
    render_at(result, target, Utc::now())
}

/// Render `result` for `target`, computing expiry relative to `now`
#[must_use]
pub fn render_at(result: &ProbeResult, target: &str, now: DateTime<Utc>) -> Vec<MetricSample> {
    match result {
        ProbeResult::Failure(failure) => vec![MetricSample::Error(ErrorLabels {
            host: target.to_string(),
            error: failure.message(),
        })],
        ProbeResult::Success(success) => {
            let records = success.records();
            let mut samples = Vec::with_capacity(records.len() * 4 + 1);
            for record in records {
                render_record(&mut samples, record, target, now);
            }
            #[allow(clippy::cast_precision_loss)]
            samples.push(MetricSample::ChainLength(
                HostLabels {
                    host: target.to_string(),
                },
                records.len() as f64,
            ));
            samples
        }
    }
}

fn render_record(
    samples: &mut Vec<MetricSample>,
    record: &CertificateRecord,
    target: &str,
    now: DateTime<Utc>,
) {
    let certificate = SerialLabels {
        host: target.to_string(),
        issuer: record.issuer_common_name.clone(),
        subject: record.subject_common_name.clone(),
        serial: record.serial_number.clone(),
    };
    let labels = CertLabels {
        host: certificate.host.clone(),
        issuer: certificate.issuer.clone(),
        subject: certificate.subject.clone(),
        serial: certificate.serial.clone(),
        position: record.position.to_string(),
    };

    #[allow(clippy::cast_precision_loss)]
    let expiry = (record.not_after - now).num_milliseconds() as f64 / 1000.0;
    #[allow(clippy::cast_precision_loss)]
    let not_after = record.not_after.timestamp() as f64;

    samples.push(MetricSample::ExpirySeconds(labels.clone(), expiry));
    samples.push(MetricSample::NotAfterTimestamp(labels, not_after));
    for usage in &record.key_usage {
        samples.push(MetricSample::KeyUsage(KeyUsageLabels {
            certificate: certificate.clone(),
            usage: usage.to_string(),
        }));
    }
    samples.push(MetricSample::SerialNumber(certificate));
}

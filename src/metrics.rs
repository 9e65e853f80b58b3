use crate::projector::{Family, MetricSample, SCRAPE_ERRORS_HELP, SCRAPE_ERRORS_TOTAL};
use prometheus::{
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Registry,
    proto::MetricFamily, opts, register_gauge_vec_with_registry,
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry,
};
use std::sync::LazyLock;

/// Process level registry: HTTP instrumentation, recovered panics and process stats
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(|| {
    let registry = Registry::new();
    #[cfg(target_os = "linux")]
    {
        let collector = prometheus::process_collector::ProcessCollector::for_self();
        if let Err(err) = registry.register(Box::new(collector)) {
            tracing::warn!("failed to register process collector: {err}");
        }
    }
    registry
});

trait ResultExt<T> {
    fn or_exit(self, context: &str) -> T;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: std::fmt::Display,
{
    fn or_exit(self, context: &str) -> T {
        match self {
            Ok(value) => value,
            Err(err) => {
                eprintln!("failed to initialize metric ({context}): {err}");
                std::process::exit(1);
            }
        }
    }
}

pub static REQUEST_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec_with_registry!(
        HistogramOpts::new(
            "cert_exporter_request_duration_seconds",
            "Duration of HTTP requests in seconds"
        ),
        &["path", "status"],
        &REGISTRY
    )
    .or_exit("metric can be created")
});

pub static REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec_with_registry!(
        opts!(
            "cert_exporter_requests_total",
            "Total number of HTTP requests"
        ),
        &["path", "status"],
        &REGISTRY
    )
    .or_exit("metric can be created")
});

pub static PANICS_RECOVERED: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter_with_registry!(
        opts!(
            "cert_exporter_panics_recovered_total",
            "Total panics recovered from"
        ),
        &REGISTRY
    )
    .or_exit("metric can be created")
});

/// Storage for the certificate series
///
/// Publication of samples goes through [`MetricSink`]; the coordinator that owns
/// the sink decides when families are reset.
pub trait MetricSink: Send + Sync {
    /// Drop every series of `family`
    fn reset(&self, family: Family);

    /// Set the series named by the sample's labels
    ///
    /// # Errors
    ///
    /// Returns an error if the label values do not fit the family
    fn publish(&self, sample: &MetricSample) -> prometheus::Result<()>;

    /// Bump the cumulative scrape error counter for `host`
    fn record_scrape_error(&self, host: &str);

    fn gather(&self) -> Vec<MetricFamily>;
}

/// Certificate series held in their own registry
#[derive(Clone)]
pub struct CertMetrics {
    registry: Registry,
    expiry_seconds: GaugeVec,
    not_after_timestamp: GaugeVec,
    chain_length: GaugeVec,
    serial_number: GaugeVec,
    key_usage: GaugeVec,
    error: GaugeVec,
    scrape_errors: IntCounterVec,
}

impl CertMetrics {
    /// Create and register every certificate family in a fresh registry
    ///
    /// # Errors
    ///
    /// Returns an error if a family cannot be registered
    pub fn new() -> prometheus::Result<Self> {
        let scrape_errors =
            IntCounterVec::new(opts!(SCRAPE_ERRORS_TOTAL, SCRAPE_ERRORS_HELP), &["host"])?;
        Self::with_scrape_errors(scrape_errors)
    }

    /// Fresh per-probe families in their own registry, counting scrape errors
    /// into the same cumulative counter as `self`
    ///
    /// # Errors
    ///
    /// Returns an error if a family cannot be registered
    pub fn sibling(&self) -> prometheus::Result<Self> {
        Self::with_scrape_errors(self.scrape_errors.clone())
    }

    fn with_scrape_errors(scrape_errors: IntCounterVec) -> prometheus::Result<Self> {
        let registry = Registry::new();
        let gauge = |family: Family| {
            register_gauge_vec_with_registry!(
                opts!(family.name(), family.help()),
                family.label_names(),
                registry
            )
        };

        registry.register(Box::new(scrape_errors.clone()))?;

        Ok(Self {
            expiry_seconds: gauge(Family::ExpirySeconds)?,
            not_after_timestamp: gauge(Family::NotAfterTimestamp)?,
            chain_length: gauge(Family::ChainLength)?,
            serial_number: gauge(Family::SerialNumber)?,
            key_usage: gauge(Family::KeyUsage)?,
            error: gauge(Family::Error)?,
            scrape_errors,
            registry,
        })
    }

    const fn gauge(&self, family: Family) -> &GaugeVec {
        match family {
            Family::ExpirySeconds => &self.expiry_seconds,
            Family::NotAfterTimestamp => &self.not_after_timestamp,
            Family::ChainLength => &self.chain_length,
            Family::SerialNumber => &self.serial_number,
            Family::KeyUsage => &self.key_usage,
            Family::Error => &self.error,
        }
    }
}

impl MetricSink for CertMetrics {
    fn reset(&self, family: Family) {
        self.gauge(family).reset();
    }

    fn publish(&self, sample: &MetricSample) -> prometheus::Result<()> {
        let values = sample.label_values();
        self.gauge(sample.family())
            .get_metric_with_label_values(values.as_slice())?
            .set(sample.value());
        Ok(())
    }

    fn record_scrape_error(&self, host: &str) {
        self.scrape_errors.with_label_values(&[host]).inc();
    }

    fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }
}

/// Encode metric families in the text exposition format
///
/// # Errors
///
/// Returns an error if metrics encoding fails
pub fn encode_metrics(families: &[MetricFamily]) -> Result<Vec<u8>, String> {
    let mut buffer = Vec::new();
    let encoder = prometheus::TextEncoder::new();

    encoder
        .encode(families, &mut buffer)
        .map_err(|e| format!("could not encode metrics: {e}"))?;

    Ok(buffer)
}

//! Replace-not-merge publication of probe results
//!
//! A [`Coordinator`] owns one [`MetricSink`]. Every publication resets all
//! per-probe families, renders the new results and encodes the sink's
//! registry, all while holding a single mutex, so a reader never observes a
//! half-updated scrape. Probing itself happens outside the lock.

use crate::{
    config::Module,
    metrics::{CertMetrics, MetricSink, PANICS_RECOVERED, encode_metrics},
    projector::{self, Family},
    tls::{self, ProbeError, ProbeFailure, ProbeResult},
};
use prometheus::proto::MetricFamily;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::{sync::Mutex, task::JoinSet};
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The probe failed; its error series and counter were still published
    #[error("{}", .0.message())]
    Probe(ProbeFailure),

    #[error("failed to publish sample: {0}")]
    Publish(#[from] prometheus::Error),

    #[error("{0}")]
    Encode(String),
}

/// Outcome of a multi-target sweep
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SweepSummary {
    pub targets: usize,
    pub succeeded: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_targets: Vec<String>,
}

pub struct Coordinator<S = CertMetrics> {
    sink: Arc<S>,
    lock: Mutex<()>,
}

impl<S: MetricSink> Coordinator<S> {
    #[must_use]
    pub fn new(sink: Arc<S>) -> Self {
        Self {
            sink,
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub const fn sink(&self) -> &Arc<S> {
        &self.sink
    }

    /// Probe one target and replace the published series with its result
    ///
    /// # Errors
    ///
    /// Returns `ScrapeError::Probe` when the probe failed, after its error series
    /// has been published and the scrape error counter incremented
    pub async fn scrape(&self, target: &str, module: &Module) -> Result<Vec<u8>, ScrapeError> {
        let result = tls::run(target, module).await;
        let body = self.publish(&[(target.to_string(), result.clone())]).await?;
        match result {
            ProbeResult::Success(_) => Ok(body),
            ProbeResult::Failure(failure) => Err(ScrapeError::Probe(failure)),
        }
    }

    /// Probe every target concurrently, then publish all results in one critical section
    ///
    /// # Errors
    ///
    /// Returns an error only if publication or encoding fails; probe failures are
    /// counted in the summary
    pub async fn scrape_all(
        &self,
        targets: &[String],
        module: Arc<Module>,
    ) -> Result<SweepSummary, ScrapeError> {
        let mut probes = JoinSet::new();
        for (index, target) in targets.iter().enumerate() {
            let target = target.clone();
            let module = Arc::clone(&module);
            probes.spawn(async move { (index, tls::run(&target, &module).await) });
        }

        let mut slots: Vec<Option<ProbeResult>> = vec![None; targets.len()];
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok((index, result)) => {
                    if let Some(slot) = slots.get_mut(index) {
                        *slot = Some(result);
                    }
                }
                Err(err) if err.is_panic() => {
                    error!("probe task panicked: {err}");
                    PANICS_RECOVERED.inc();
                }
                Err(err) => warn!("probe task cancelled: {err}"),
            }
        }

        let results = attribute_results(targets, slots);
        let succeeded = results.iter().filter(|(_, r)| r.is_success()).count();
        let summary = SweepSummary {
            targets: targets.len(),
            succeeded,
            failed: targets.len() - succeeded,
            failed_targets: results
                .iter()
                .filter(|(_, r)| !r.is_success())
                .map(|(target, _)| target.clone())
                .collect(),
        };

        self.publish(&results).await?;

        Ok(summary)
    }

    /// Replace every per-probe series with `results` and return the encoded registry
    ///
    /// # Errors
    ///
    /// Returns an error if a sample does not fit its family or encoding fails
    pub async fn publish(&self, results: &[(String, ProbeResult)]) -> Result<Vec<u8>, ScrapeError> {
        let _guard = self.lock.lock().await;

        for family in Family::PER_PROBE {
            self.sink.reset(family);
        }

        for (target, result) in results {
            for sample in projector::render(result, target) {
                self.sink.publish(&sample)?;
            }
            if !result.is_success() {
                self.sink.record_scrape_error(target);
            }
        }

        encode_metrics(&self.sink.gather()).map_err(ScrapeError::Encode)
    }

    /// Snapshot of the sink, consistent with the last publication
    pub async fn gather(&self) -> Vec<MetricFamily> {
        let _guard = self.lock.lock().await;
        self.sink.gather()
    }
}

/// Pair every target with its result, in target order
///
/// A target whose task never reported back (panicked or cancelled) becomes a
/// failure so it is still published and counted.
fn attribute_results(
    targets: &[String],
    slots: Vec<Option<ProbeResult>>,
) -> Vec<(String, ProbeResult)> {
    targets
        .iter()
        .zip(slots)
        .map(|(target, slot)| {
            let result = slot.unwrap_or_else(|| {
                ProbeResult::Failure(ProbeFailure::new(
                    target,
                    ProbeError::Interrupted {
                        target: target.clone(),
                    },
                ))
            });
            (target.clone(), result)
        })
        .collect()
}

use crate::{config::Module, metrics::PANICS_RECOVERED, scrape::Coordinator};
use chrono::{Duration, Utc};
use futures::FutureExt;
use serde::Serialize;
use std::sync::Arc;
use tokio::time;
use tracing::{error, info};

#[derive(Serialize, Debug, Default)]
struct Sweep {
    time: String,
    runtime_ms: i64,
    targets: usize,
    succeeded: usize,
    failed: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failed_targets: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[inline]
fn remaining_sleep_duration(wait_time: Duration, runtime: Duration) -> Option<time::Duration> {
    wait_time
        .checked_sub(&runtime)
        .and_then(|remaining| remaining.to_std().ok())
        .filter(|duration| !duration.is_zero())
}

/// Sweep `targets` every `every` seconds, forever
///
/// Each sweep replaces the coordinator's series as a whole. A panicking sweep is
/// counted and the loop keeps going after a full interval.
pub async fn run_loop(
    coordinator: Arc<Coordinator>,
    targets: Arc<[String]>,
    module: Arc<Module>,
    every: u16,
) {
    loop {
        // Catch panics in individual iterations to keep loop alive
        let iteration_result = std::panic::AssertUnwindSafe(async {
            let now = Utc::now();
            let wait_time = Duration::seconds(every.into());

            let mut sweep = Sweep {
                time: now.to_rfc3339(),
                targets: targets.len(),
                ..Sweep::default()
            };

            match coordinator.scrape_all(&targets, Arc::clone(&module)).await {
                Ok(summary) => {
                    sweep.succeeded = summary.succeeded;
                    sweep.failed = summary.failed;
                    sweep.failed_targets = summary.failed_targets;
                }
                Err(e) => {
                    error!("failed to publish sweep: {e}");
                    sweep.error = Some(e.to_string());
                }
            }

            let runtime = Utc::now().signed_duration_since(now);
            sweep.runtime_ms = runtime.num_milliseconds();

            if let Ok(serialized) = serde_json::to_string(&sweep) {
                info!("{serialized}");
            }

            // Sleep for remaining interval time to maintain fixed interval
            if let Some(remaining) = remaining_sleep_duration(wait_time, runtime) {
                time::sleep(remaining).await;
            }
        })
        .catch_unwind()
        .await;

        if let Err(panic_info) = iteration_result {
            error!("Panic in collector sweep: {panic_info:?}");
            PANICS_RECOVERED.inc();
            time::sleep(time::Duration::from_secs(every.into())).await;
        }
    }
}

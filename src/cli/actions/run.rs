use super::Action;
use crate::{
    metrics::CertMetrics,
    scrape::Coordinator,
    server::{self, ServerOptions},
};
use anyhow::{Context, anyhow};
use std::{io::Write, sync::Arc};

/// Execute the action's business logic by delegating to the appropriate module
pub async fn execute(action: Action) -> anyhow::Result<()> {
    match action {
        Action::Serve {
            config,
            listen,
            port,
            metrics_path,
            interval,
        } => {
            server::start(
                config,
                ServerOptions {
                    listen,
                    port,
                    metrics_path,
                    interval,
                },
            )
            .await
        }
        Action::Probe {
            target,
            module_name,
            module,
        } => {
            let coordinator = Coordinator::new(Arc::new(CertMetrics::new()?));
            let body = coordinator
                .scrape(&target, &module)
                .await
                .map_err(|e| anyhow!("Error scraping target {target} (module {module_name}): {e}"))?;
            std::io::stdout()
                .write_all(&body)
                .context("failed to write metrics to stdout")
        }
    }
}

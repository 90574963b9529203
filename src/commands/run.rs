use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::client::build_http_client;
use crate::config::{Config, Settings};
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::output;
use crate::retry::RetryingDelivery;
use crate::sink::HttpSink;
use crate::source::HttpSource;
use crate::types::RunResult;

pub async fn run(config: &Config, args: &RunArgs) -> Result<()> {
    let settings = config.resolve(args)?;
    let Settings {
        source_url,
        target_url,
        policy,
        request_timeout,
        suffix,
        deadline,
    } = settings;

    info!(
        source = %source_url,
        target = %target_url,
        max_attempts = policy.max_attempts(),
        backoff = ?policy.backoff(),
        suffix = %suffix,
        "Starting dispatch"
    );

    let http = build_http_client(request_timeout)?;
    let dispatcher = Dispatcher::new(
        HttpSource::new(http.clone(), source_url),
        RetryingDelivery::new(HttpSink::new(http, target_url), policy),
    )
    .with_suffix(suffix);

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));
    if let Some(deadline) = deadline {
        tokio::spawn(cancel_after(cancel.clone(), deadline));
    }

    let result = dispatcher.process(&cancel).await?;
    warn_if_cancelled(&cancel, &result);
    cancel.cancel();

    output::print_summary(&result);
    Ok(())
}

/// A cancelled run still exits 0; say so, since its unsent users count as failed.
fn warn_if_cancelled(cancel: &CancellationToken, result: &RunResult) -> bool {
    if !cancel.is_cancelled() {
        return false;
    }
    warn!(
        failed = result.failed,
        "Run was cancelled before completion; undelivered users are counted as failed"
    );
    true
}

/// Cancel the run on Ctrl+C or SIGTERM.
async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    warn!("Received shutdown signal, cancelling run");
    cancel.cancel();
}

async fn cancel_after(cancel: CancellationToken, deadline: Duration) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(deadline) => {
            warn!(deadline_secs = deadline.as_secs(), "Run deadline reached, cancelling");
            cancel.cancel();
        }
    }
}

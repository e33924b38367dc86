//! Signal-driven run loop for the HTTP server.

use std::future::Future;

use anyhow::anyhow;
use tracing::{error, info, warn};

use super::module::NetworkModule;

/// Resolves on the first SIGINT (Ctrl-C) or SIGTERM.
///
/// If a handler cannot be installed the failure is logged and that signal
/// is ignored; the other one still works.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

/// Serves on a separate task until `signal` resolves, then shuts down
/// within the configured grace period.
///
/// In-flight requests that finish within the grace period complete
/// normally. When it expires, open connections are closed without a reply
/// and the server task is aborted.
///
/// # Errors
///
/// Returns an error if the server exits before `signal` resolves, which
/// includes failing to serve at all.
pub async fn run_until_signal(
    module: NetworkModule,
    signal: impl Future<Output = ()> + Send,
) -> anyhow::Result<()> {
    let controller = module.shutdown_controller();
    let grace = module.config().shutdown_grace;

    let mut shutdown_rx = controller.shutdown_receiver();
    let graceful = async move {
        let _ = shutdown_rx.wait_for(|down| *down).await;
    };
    let mut server = tokio::spawn(module.serve(graceful));

    tokio::select! {
        () = signal => {}
        result = &mut server => {
            controller.mark_stopped();
            return Err(match result {
                Ok(Ok(())) => anyhow!("server stopped before a termination signal"),
                Ok(Err(e)) => e.context("server failed"),
                Err(e) => anyhow!(e).context("server task failed"),
            });
        }
    }

    info!("Shutting down server...");
    controller.trigger_shutdown();

    match tokio::time::timeout(grace, &mut server).await {
        Ok(Ok(Ok(()))) => info!("Server gracefully stopped"),
        Ok(Ok(Err(e))) => error!(error = format!("{e:#}"), "server failed during shutdown"),
        Ok(Err(e)) => error!(error = %e, "server task failed during shutdown"),
        Err(_) => {
            warn!(
                in_flight = controller.in_flight_count(),
                grace_secs = grace.as_secs_f64(),
                "shutdown grace period expired, closing remaining connections"
            );
            controller.force_close();
            server.abort();
            let _ = server.await;
        }
    }

    controller.mark_stopped();
    Ok(())
}

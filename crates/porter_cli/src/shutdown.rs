use console::Term;
use porter::StopSignal;

/// Set up the Ctrl+C handler for graceful shutdown.
///
/// The first Ctrl+C asks the running stage to flush its ledger and stop after
/// the current record; the second one exits immediately.
pub(crate) fn setup_shutdown_handler(stop: StopSignal) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {}", e);
            return;
        }

        let is_tty = Term::stdout().is_term();
        if is_tty {
            eprintln!("\n\nStop requested, saving progress after the current record...");
            eprintln!("Press Ctrl+C again to force quit.");
        } else {
            tracing::warn!("Stop requested, saving progress after the current record");
        }

        stop.request();

        // Second Ctrl+C skips the final flush.
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }

        if is_tty {
            eprintln!("Force quit!");
        }
        std::process::exit(130);
    });
}

use console::Term;
use synclone::CancelToken;

/// Install the Ctrl+C handler for a running session.
///
/// The first press cancels the session, which then drains in-flight work and
/// writes a final checkpoint. A second press exits immediately with 130.
pub(crate) fn install(cancel: CancelToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::warn!("Failed to install Ctrl+C handler");
            return;
        }

        let is_tty = Term::stdout().is_term();
        if is_tty {
            eprintln!("\n\nCancelling, waiting for running operations to finish...");
            eprintln!("Press Ctrl+C again to force quit.");
        } else {
            tracing::warn!("Shutdown requested, finishing current operations");
        }

        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        if is_tty {
            eprintln!("Force quit!");
        }
        std::process::exit(130);
    });
}

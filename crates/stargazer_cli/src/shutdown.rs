use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use console::Term;

/// Exit status used when the user forces a quit.
const FORCE_QUIT_STATUS: i32 = 130;

/// Set up the Ctrl+C handler for graceful shutdown.
///
/// The returned flag is set on the first Ctrl+C; the collector checks it
/// before each request and saves what it has. A second Ctrl+C exits at once,
/// leaving the previous snapshot as the latest one.
pub(crate) fn setup_shutdown_handler() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");

        let is_tty = Term::stdout().is_term();
        if is_tty {
            eprintln!("\n\nShutdown requested, saving stargazers collected so far...");
            eprintln!("Press Ctrl+C again to force quit.");
        } else {
            tracing::warn!("Shutdown requested, saving stargazers collected so far");
        }

        handler_flag.store(true, Ordering::SeqCst);

        // Wait for second Ctrl+C for force quit
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install second Ctrl+C handler");

        if is_tty {
            eprintln!("Force quit!");
        }
        std::process::exit(FORCE_QUIT_STATUS);
    });

    flag
}

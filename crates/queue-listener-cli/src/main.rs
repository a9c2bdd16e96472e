use queue_listener_cli::run_cli;
use tracing::error;

#[tokio::main]
async fn main() {
    if let Err(e) = run_cli().await {
        error!(error = %e, "CLI error");

        // Logging may not be initialized, e.g. when the subscriber failed to install.
        eprintln!("Error: {}", e);

        std::process::exit(e.exit_code());
    }
}

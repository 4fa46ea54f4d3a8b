use sqs_broker_cli::run_cli;
use tracing::error;

#[tokio::main]
async fn main() {
    if let Err(e) = run_cli().await {
        error!("CLI error: {}", e);

        // Logging may not be set up yet when configuration fails
        eprintln!("Error: {}", e);

        std::process::exit(e.exit_code());
    }
}

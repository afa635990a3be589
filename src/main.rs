//! copyforge - Closed-loop website copy generation
//!
//! Generates short copy components that clear AI-likeness detection,
//! learning from every attempt.

use copyforge::error::GenerationError;

#[tokio::main]
async fn main() {
    // Initialize logging (WARN level by default, use RUST_LOG=info for more)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    if let Err(e) = copyforge::cli::run().await {
        eprintln!("Error: {e:#}");
        // Distinct exit codes let wrapping pipelines tell "keep retrying
        // later" apart from "fix your configuration"
        let code = e
            .downcast_ref::<GenerationError>()
            .map(|g| g.exit_code())
            .unwrap_or(1);
        std::process::exit(code);
    }
}

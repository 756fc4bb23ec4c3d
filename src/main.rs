//! Path Engine - learner progress evaluation CLI

use std::process::ExitCode;

use path_engine::cli;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Initialize logging (WARN level by default, use RUST_LOG=info for more)
    // Logs go to stderr so --json output stays clean.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into())
        )
        .init();

    cli::run().await
}

use miette::Result;
use tracing_subscriber::EnvFilter;

mod cli;
use cli::Invocation;

#[tokio::main]
async fn main() -> Result<()> {
    let invocation = Invocation::parse()?;

    // Logs go to stderr; stdout carries XML, diffs and status lines
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(invocation.log_level())),
        )
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .init();

    invocation.run().await
}

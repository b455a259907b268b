//! Parley CLI binary entry point.

use parley::cli::commands::App;
use parley::cli::Cli;
use parley::config::ParleyConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse_args();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = ParleyConfig::load(cli.config.as_deref())?;
    let app = App::open(&config)?;
    let mut stdout = std::io::stdout().lock();
    app.run(cli.command, &mut stdout).await
}

use clap::Parser;
use toolforge::cli::{Cli, run};
use toolforge::config::AppConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Configuration is discovered before logging init so the file can set the
    // default filter; RUST_LOG still wins.
    let app = match AppConfig::discover(cli.config.as_deref()) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&app.log_filter)),
        )
        .init();

    if let Err(e) = run(cli, app).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

//! npmi command-line entry point.

use anyhow::Result;
use clap::Parser;
use npmi_cli::cli::{self, CliConfig};
use npmi_cli::core::user_friendly_error;
use tracing_subscriber::EnvFilter;

/// Log to stderr, honoring `RUST_LOG` when set and the CLI level otherwise.
fn init_logging(config: &CliConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,npmi={}", config.log_level)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(config.verbose)
        .without_time()
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let config = cli.build_config();
    init_logging(&config);

    match cli.execute_with_config(config).await {
        Ok(()) => Ok(()),
        Err(e) => {
            let error_ctx = user_friendly_error(e);
            error_ctx.display();
            std::process::exit(1);
        }
    }
}

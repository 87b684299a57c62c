mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use fetchzip::config::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server(args) => {
            let mut config = Config::load_with_override(args.config)?;
            if let Some(address) = args.address {
                config.server.bind_addr = address;
            }
            fetchzip::api::run(config).await?
        }
        Commands::Config(args) => {
            let config = Config::load_with_override(args.config)?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

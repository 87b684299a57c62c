use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fetchzip")]
#[command(about = "Download files in batches and serve them as zip archives", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server and the download workers
    Server(ServerArgs),
    /// Print the resolved configuration as TOML
    Config(ConfigArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServerArgs {
    /// Address to bind the HTTP server to (overrides configuration)
    #[arg(long)]
    pub address: Option<SocketAddr>,

    /// Configuration file (default: config/fetchzip.toml or $FETCHZIP_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct ConfigArgs {
    /// Configuration file (default: config/fetchzip.toml or $FETCHZIP_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_args() {
        let cli = Cli::parse_from(["fetchzip", "server", "--address", "127.0.0.1:3000"]);
        match cli.command {
            Commands::Server(args) => {
                assert_eq!(args.address, Some("127.0.0.1:3000".parse().unwrap()));
                assert!(args.config.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_config_args() {
        let cli = Cli::parse_from(["fetchzip", "config", "--config", "custom.toml"]);
        assert!(matches!(
            cli.command,
            Commands::Config(ConfigArgs { config: Some(path) }) if path == PathBuf::from("custom.toml")
        ));
    }
}

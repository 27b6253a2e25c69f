use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tls_echo::config::{ServerConfig, load_config};
use tls_echo::crypto::suite;
use tls_echo::{Error, Server, logging};

#[derive(Parser)]
#[command(name = "tls-echo")]
#[command(about = "TLS echo server that answers one request per connection", long_about = None)]
struct Cli {
    /// Ciphersuite id to force, decimal or 0x-prefixed hex
    #[arg(value_parser = suite::parse_id)]
    ciphersuite: u16,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep accepting after the first served connection
    #[arg(long)]
    keep_serving: bool,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(&cli.log);

    match run(cli) {
        Ok(()) => {
            tracing::info!("Terminating server...");
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("Last error was: {} - {}", e.code(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    config.ciphersuite = Some(cli.ciphersuite);
    if cli.keep_serving {
        config.serve_once = false;
    }
    tracing::info!(id = cli.ciphersuite, "Chosen ciphersuite id");

    let server = Server::bind(config)?;
    tracing::info!(address = %server.local_addr()?, "listening");
    server.run()
}

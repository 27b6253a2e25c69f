//! Connects to the echo server, sends one request and prints the answer.
//!
//! With `--listing`, every suite in a `ciphersuite-list` output file gets a
//! timed round of its own, offering only that suite, and the run ends with a
//! `Total / Measured / Skipped` summary. `--local-server` starts a loopback
//! server forced to each suite instead of using `--host`/`--port`.

use std::fs;
use std::net::ToSocketAddrs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tls_echo::client::connect;
use tls_echo::config::DEFAULT_PORT;
use tls_echo::crypto::random::OsRandom;
use tls_echo::crypto::suite;
use tls_echo::handshake::HandshakeClient;
use tls_echo::lister::parse_listing;
use tls_echo::profile::{measure, measure_with_local_server, run_listing};
use tls_echo::transport::TcpTransport;
use tls_echo::{Error, logging};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "tls-echo-client")]
#[command(about = "Drive the TLS echo server", long_about = None)]
struct Cli {
    /// Ciphersuite ids to offer, decimal or 0x-prefixed hex; all enabled suites when empty
    #[arg(value_parser = suite::parse_id)]
    ids: Vec<u16>,

    /// Run one timed round per suite listed in this file
    #[arg(long)]
    listing: Option<PathBuf>,

    /// With --listing, serve each round from a loopback server forced to that suite
    #[arg(long, requires = "listing")]
    local_server: bool,

    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value = "GET / HTTP/1.0\r\n\r\n")]
    request: String,

    /// Handshake timeout in seconds
    #[arg(long, default_value_t = 10)]
    timeout: u64,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(&cli.log);

    match &cli.listing {
        Some(path) => profile(&cli, path),
        None => {
            let offered = if cli.ids.is_empty() {
                suite::enabled().iter().map(|s| s.id).collect()
            } else {
                cli.ids.clone()
            };
            match exchange(&cli, offered.clone()) {
                Ok(response) => {
                    info!(?offered, response = %response, "exchange complete");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    warn!(?offered, code = e.code(), "Last error was: {} - {}", e.code(), e);
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn profile(cli: &Cli, path: &Path) -> ExitCode {
    let entries = match fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|text| parse_listing(&text).map_err(|e| e.to_string()))
    {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("{}: {e}", path.display());
            return ExitCode::FAILURE;
        }
    };

    let timeout = Duration::from_secs(cli.timeout);
    let request = cli.request.as_bytes();
    let (_, summary) = run_listing(&entries, |entry| {
        if cli.local_server {
            return measure_with_local_server(entry, request, timeout);
        }
        let addr = (cli.host.as_str(), cli.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::Transport(std::io::ErrorKind::AddrNotAvailable.into()))?;
        measure(addr, entry, request, Arc::new(OsRandom), timeout)
    });

    println!("--- STATISTICS ---");
    println!("{summary}");
    if summary.skipped == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

fn exchange(cli: &Cli, offered: Vec<u16>) -> Result<String, Error> {
    let transport = TcpTransport::connect((cli.host.as_str(), cli.port))?;
    let machine = HandshakeClient::builder()
        .offered_suites(offered)
        .random(Arc::new(OsRandom))
        .build();
    let mut session = connect(transport, machine, Some(Duration::from_secs(cli.timeout)))?;
    info!(suite = session.suite().name, "handshake complete");

    session.write(cli.request.as_bytes())?;
    let mut response = Vec::new();
    loop {
        match session.read(4096) {
            Ok(chunk) => response.extend_from_slice(&chunk),
            Err(Error::PeerClosed) => break,
            Err(e) => return Err(e),
        }
    }
    session.close()?;
    Ok(String::from_utf8_lossy(&response).into_owned())
}

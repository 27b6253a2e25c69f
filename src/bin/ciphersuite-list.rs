//! Prints `<id> <name> <flags>` for every enabled ciphersuite.

use std::io::{self, Write};
use std::process::ExitCode;

use clap::Parser;
use tls_echo::crypto::suite;
use tls_echo::lister::write_listing;

#[derive(Parser)]
#[command(name = "ciphersuite-list")]
#[command(about = "List the enabled ciphersuites, one per line", long_about = None)]
struct Cli {}

fn main() -> ExitCode {
    Cli::parse();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match write_listing(&mut out, suite::enabled()).and_then(|()| out.flush()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ciphersuite-list: {e}");
            ExitCode::FAILURE
        }
    }
}

//! Per-suite measurement runs over a ciphersuite listing.
//!
//! Each listed suite gets its own round: a server that permits only that
//! suite, one client offering only that suite, the handshake and the echo
//! exchange timed separately. A round that fails on either side is skipped,
//! and the run ends with a `Total / Measured / Skipped` summary.
//!
//! 按密码套件列表逐个测量：每个套件单独启动只允许该套件的服务器，客户端只提供
//! 该套件，分别计时握手与回显交换。任一端失败的套件会被跳过，最后输出汇总。

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::client::connect;
use crate::config::ServerConfig;
use crate::credential::CredentialStore;
use crate::crypto::random::{Drbg, OsRandom, RandomSource};
use crate::error::{Error, Result};
use crate::handshake::HandshakeClient;
use crate::lister::ListingEntry;
use crate::server::Server;
use crate::transport::{self, TcpTransport};

/// Timings for one suite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measurement {
    pub id: u16,
    pub name: String,
    pub handshake: Duration,
    pub exchange: Duration,
    pub response: Vec<u8>,
}

#[derive(Debug)]
pub enum Outcome {
    Measured(Measurement),
    Skipped { entry: ListingEntry, error: Error },
}

impl Outcome {
    pub fn is_measured(&self) -> bool {
        matches!(self, Outcome::Measured(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Summary {
    pub total: usize,
    pub measured: usize,
    pub skipped: usize,
}

impl Summary {
    pub fn from_outcomes(outcomes: &[Outcome]) -> Self {
        let measured = outcomes.iter().filter(|o| o.is_measured()).count();
        Self {
            total: outcomes.len(),
            measured,
            skipped: outcomes.len() - measured,
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total CipherSuites: {}", self.total)?;
        writeln!(f, "Measured: {}", self.measured)?;
        write!(f, "Skipped: {}", self.skipped)
    }
}

/// Runs `round` for every entry, in listing order.
///
/// 按列表顺序对每个条目执行 `round`。
pub fn run_listing<F>(entries: &[ListingEntry], mut round: F) -> (Vec<Outcome>, Summary)
where
    F: FnMut(&ListingEntry) -> Result<Measurement>,
{
    let mut outcomes = Vec::with_capacity(entries.len());
    for entry in entries {
        let outcome = match round(entry) {
            Ok(measurement) => {
                info!(
                    id = measurement.id,
                    name = %measurement.name,
                    handshake_us = measurement.handshake.as_micros() as u64,
                    exchange_us = measurement.exchange.as_micros() as u64,
                    "measured"
                );
                Outcome::Measured(measurement)
            }
            Err(error) => {
                warn!(
                    id = entry.id,
                    name = %entry.name,
                    flags = %entry.flags,
                    code = error.code(),
                    error = %error,
                    "skipping ciphersuite"
                );
                Outcome::Skipped {
                    entry: entry.clone(),
                    error,
                }
            }
        };
        outcomes.push(outcome);
    }
    let summary = Summary::from_outcomes(&outcomes);
    (outcomes, summary)
}

/// Connects to `addr` offering only `entry`'s suite, sends `request` and
/// reads until the server closes. The handshake and the exchange are timed
/// separately.
pub fn measure(
    addr: SocketAddr,
    entry: &ListingEntry,
    request: &[u8],
    random: Arc<dyn RandomSource>,
    timeout: Duration,
) -> Result<Measurement> {
    let transport = TcpTransport::connect(addr)?;
    let machine = HandshakeClient::builder()
        .offered_suites(vec![entry.id])
        .random(random)
        .build();

    let started = Instant::now();
    let mut session = connect(transport, machine, Some(timeout))?;
    let handshake = started.elapsed();

    let started = Instant::now();
    session.write(request)?;
    let mut response = Vec::new();
    loop {
        match session.read(4096) {
            Ok(chunk) => response.extend_from_slice(&chunk),
            Err(Error::PeerClosed) => break,
            Err(e) => return Err(e),
        }
    }
    session.close()?;
    let exchange = started.elapsed();

    Ok(Measurement {
        id: entry.id,
        name: entry.name.clone(),
        handshake,
        exchange,
        response,
    })
}

/// One full round: a loopback server forced to `entry`'s suite serves a
/// single connection while [`measure`] drives it. A failure on either side
/// fails the round; the client's error wins when both fail.
///
/// 完整的一轮：在回环地址上启动只允许该套件的服务器并服务一个连接。
pub fn measure_with_local_server(
    entry: &ListingEntry,
    request: &[u8],
    timeout: Duration,
) -> Result<Measurement> {
    let config = ServerConfig {
        bind_address: "127.0.0.1".into(),
        port: 0,
        ciphersuite: Some(entry.id),
        handshake_timeout_secs: timeout.as_secs().max(1),
        ..Default::default()
    };
    let listener = transport::bind(config.listen_address())?;
    let server = Server::new(
        listener,
        config,
        CredentialStore::builtin()?,
        Arc::new(Drbg::seed(b"tls-echo profile")?),
    )?;
    let addr = server.local_addr()?;
    let served = thread::spawn(move || server.accept_one());

    let measured = measure(addr, entry, request, Arc::new(OsRandom), timeout);
    let served = served
        .join()
        .map_err(|_| Error::Transport(io::Error::other("server thread panicked")))?;
    let measurement = measured?;
    served?;
    Ok(measurement)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u16) -> ListingEntry {
        ListingEntry {
            id,
            name: format!("SUITE-{id}"),
            flags: "NONE".into(),
        }
    }

    #[test]
    fn summary_counts_skipped_rounds() {
        let entries = [entry(1), entry(2), entry(3)];
        let (outcomes, summary) = run_listing(&entries, |e| {
            if e.id == 2 {
                return Err(Error::NoCommonCiphersuite);
            }
            Ok(Measurement {
                id: e.id,
                name: e.name.clone(),
                handshake: Duration::from_millis(1),
                exchange: Duration::from_millis(1),
                response: b"pong".to_vec(),
            })
        });

        assert_eq!(
            summary,
            Summary {
                total: 3,
                measured: 2,
                skipped: 1
            }
        );
        assert!(matches!(
            &outcomes[1],
            Outcome::Skipped { entry, error: Error::NoCommonCiphersuite } if entry.id == 2
        ));
    }

    #[test]
    fn summary_text() {
        let summary = Summary {
            total: 9,
            measured: 8,
            skipped: 1,
        };
        assert_eq!(
            summary.to_string(),
            "Total CipherSuites: 9\nMeasured: 8\nSkipped: 1"
        );
    }
}

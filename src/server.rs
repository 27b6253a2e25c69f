//! The echo server loop.
//!
//! One connection is served to completion per accepted stream. Errors that
//! only concern that connection are logged with their code and the loop goes
//! back to accepting; listener failures end the loop.
//!
//! 回显服务器循环。每个接受的连接都会被完整处理；仅影响单个连接的错误会被
//! 记录下来，然后继续接受下一个连接。

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, info_span, warn};

use crate::config::{ConfigError, ServerConfig, validate_config};
use crate::connection::Connection;
use crate::credential::CredentialStore;
use crate::crypto::random::{Drbg, RandomSource};
use crate::crypto::suite::{self, Ciphersuite};
use crate::error::{Error, Result};
use crate::handshake::server::HandshakeServer;
use crate::protocol::state::{ServerStart, Start};
use crate::session::Session;
use crate::transport::{self, Listener, TcpTransportListener, Transport};

const DRBG_PERSONALIZATION: &[u8] = b"tls-echo server";

pub struct Server<L: Listener> {
    listener: L,
    config: ServerConfig,
    permitted: Vec<&'static Ciphersuite>,
    credentials: Arc<CredentialStore>,
    random: Arc<dyn RandomSource>,
}

impl Server<TcpTransportListener> {
    /// Loads credentials, seeds the generator and binds the configured address.
    ///
    /// 加载凭据、初始化随机数生成器并绑定配置的地址。
    pub fn bind(config: ServerConfig) -> Result<Self> {
        info!("  . Loading the server cert. and key...");
        let credentials = CredentialStore::from_config(&config.credentials)?;

        info!(address = %config.listen_address(), "  . Bind on the listening address...");
        let listener = transport::bind(config.listen_address())?;

        info!("  . Seeding the random number generator...");
        let random = Arc::new(Drbg::seed(DRBG_PERSONALIZATION)?);

        Server::new(listener, config, credentials, random)
    }
}

impl<L: Listener> Server<L> {
    /// Builds a server around an already bound listener.
    ///
    /// The configuration is validated, and at least one permitted suite must
    /// have a credential of the kind it needs.
    ///
    /// 基于已绑定的监听器构建服务器。
    pub fn new(
        listener: L,
        config: ServerConfig,
        credentials: CredentialStore,
        random: Arc<dyn RandomSource>,
    ) -> Result<Self> {
        validate_config(&config).map_err(|errors| Error::Config(ConfigError::Validation(errors)))?;

        let permitted: Vec<&'static Ciphersuite> = match config.ciphersuite {
            Some(id) => vec![suite::lookup(id).ok_or(Error::UnknownCiphersuite(id))?],
            None => suite::enabled().iter().collect(),
        };
        if let Some(first) = permitted.first() {
            if !permitted
                .iter()
                .any(|s| credentials.contains(s.key_exchange.credential_kind()))
            {
                return Err(Error::MissingCredential(first.key_exchange));
            }
        }
        for suite in &permitted {
            info!(id = suite.id, name = suite.name, "permitted ciphersuite");
        }

        Ok(Self {
            listener,
            config,
            permitted,
            credentials: Arc::new(credentials),
            random,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn handshake_machine(&self) -> HandshakeServer<Start, ServerStart> {
        HandshakeServer::builder()
            .permitted_suites(self.permitted.clone())
            .credentials(Arc::clone(&self.credentials))
            .random(Arc::clone(&self.random))
            .build()
    }

    /// Handshakes, answers one request with the configured response, and closes.
    ///
    /// 完成握手，用配置的响应回答一个请求，然后关闭连接。
    pub fn serve_connection(&self, transport: L::Stream) -> Result<()> {
        let mut connection = Connection::new(transport, self.handshake_machine());
        connection.set_handshake_timeout(Some(self.config.handshake_timeout()));

        info!("  . Performing the SSL/TLS handshake...");
        if let Err(e) = connection.handshake() {
            if let Err(close) = connection.close() {
                warn!(error = %close, "transport close after failed handshake");
            }
            return Err(e);
        }
        let mut session = connection.into_session()?;
        info!(suite = session.suite().name, "   Negotiated Ciphersuite");
        session.set_close_notify_timeout(self.config.close_notify_timeout());

        let exchanged = self.exchange(&mut session);
        info!("  . Closing the connection...");
        match (exchanged, session.close()) {
            (Err(e), Err(close)) => {
                warn!(error = %close, "close after failed exchange");
                Err(e)
            }
            (exchanged, closed) => exchanged.and(closed),
        }
    }

    fn exchange<T: Transport>(&self, session: &mut Session<T>) -> Result<()> {
        let request = session.read(self.config.read_buffer_size)?;
        info!(
            bytes = request.len(),
            request = %String::from_utf8_lossy(&request),
            "  < Read from client"
        );

        let written = session.write(self.config.response.as_bytes())?;
        info!(bytes = written, response = %self.config.response, "  > Write to client");
        Ok(())
    }

    /// Accepts and serves exactly one connection.
    pub fn accept_one(&self) -> Result<()> {
        let (transport, peer) = self.listener.accept()?;
        let _span = info_span!("connection", %peer).entered();
        self.serve_connection(transport)
    }

    /// Serves connections until one is served successfully with `serve_once`
    /// set, or until the listener fails.
    ///
    /// 持续服务连接，直到（在 `serve_once` 模式下）成功服务一个连接，或监听器出错。
    pub fn run(&self) -> Result<()> {
        loop {
            info!("  . Waiting for a remote connection ...");
            let (transport, peer) = self.listener.accept()?;
            let _span = info_span!("connection", %peer).entered();

            match self.serve_connection(transport) {
                Ok(()) if self.config.serve_once => return Ok(()),
                Ok(()) => {}
                Err(Error::PeerClosed) => info!("connection was closed gracefully"),
                Err(Error::ConnectionReset) => info!("connection was reset by peer"),
                Err(e) if e.is_connection_scoped() => {
                    warn!(code = e.code(), error = %e, "Last error was: {} - {}", e.code(), e);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl<L: Listener> std::fmt::Debug for Server<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("permitted", &self.permitted.iter().map(|s| s.id).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

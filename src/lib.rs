pub mod client;
pub mod config;
pub mod connection;
pub mod credential;
pub mod crypto;
pub mod error;
pub mod handshake;
pub mod lister;
pub mod logging;
pub mod profile;
pub mod protocol;
pub mod record;
pub mod server;
pub mod session;
pub mod stream;
pub mod transport;

pub use connection::Connection;
pub use crypto::suite::Ciphersuite;
pub use error::{Error, Result};
pub use server::Server;
pub use session::Session;

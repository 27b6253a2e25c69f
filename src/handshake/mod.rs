//! Sans-io handshake state machines.
//!
//! The machines consume and produce [`HandshakeMessage`](crate::protocol::message::HandshakeMessage)s
//! and never touch a transport; [`Connection`](crate::connection::Connection)
//! and [`client::connect`](crate::client::connect) drive them over the record layer.
//!
//! 无 I/O 的握手状态机，由连接层驱动。

pub mod client;
pub mod server;

pub use client::{ClientFlight, HandshakeClient, HandshakeClientBuilder};
pub use server::{HandshakeServer, HandshakeServerBuilder};

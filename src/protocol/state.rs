//! Defines the various states of the handshake protocol state machine.
//!
//! These are typically zero-sized types (marker structs) used to enforce
//! the protocol flow at compile time. Each state represents a specific point
//! in the handshake process, and only valid transitions are exposed in the API.
//! [`HandshakeState`] mirrors the server markers at runtime, for logging and
//! inspection by the connection driver.

use std::fmt;
use std::sync::Arc;

use crate::credential::Credential;
use crate::crypto::keys::{MasterSecret, SessionKeys};
use crate::crypto::kx::KeyAgreementEngine;
use crate::crypto::suite::Ciphersuite;

// --- Server States (Markers) ---
/// Nothing received yet.
#[derive(Debug)]
pub struct Start;

/// A ClientHello was accepted and intersects the permitted suites.
#[derive(Debug)]
pub struct ReceivedClientGreeting;

/// The suite and credential are fixed.
#[derive(Debug)]
pub struct NegotiatedParameters;

/// The server flight has been produced.
#[derive(Debug)]
pub struct KeyExchangeSent;

/// The server flight is on the wire; waiting for ClientKeyExchange.
#[derive(Debug)]
pub struct AwaitingPeerKeyMaterial;

/// Session keys are derived; waiting for the client's Finished.
#[derive(Debug)]
pub struct KeysDerived;

/// Both Finished messages verified.
#[derive(Debug)]
pub struct HandshakeComplete;

// --- Client States (Markers) ---
/// The initial state of a client handshake.
#[derive(Debug)]
pub struct Ready;

/// A client state indicating that it is awaiting the server's first flight.
#[derive(Debug)]
pub struct AwaitingServerFlight;

/// A client state indicating that it is awaiting the server's Finished.
#[derive(Debug)]
pub struct AwaitingServerFinished;

/// The final state of a successful client handshake.
#[derive(Debug)]
pub struct Established;

// --- Role-Specific State Data ---

// --- Server States ---
/// Data held by the server in the `Start` state.
#[derive(Debug, Default)]
pub struct ServerStart {
    // This state is currently empty for the server, but defined for consistency.
}

/// Data held by the server in the `ReceivedClientGreeting` state.
#[derive(Debug)]
pub struct ServerReceivedGreeting {
    pub client_random: [u8; 32],
    /// Permitted suites the client also offered, in server preference order.
    pub shared_suites: Vec<&'static Ciphersuite>,
}

/// Data held by the server in the `NegotiatedParameters` state.
#[derive(Debug)]
pub struct ServerNegotiated {
    pub client_random: [u8; 32],
    pub suite: &'static Ciphersuite,
    pub credential: Arc<Credential>,
}

/// Data held by the server in the `KeyExchangeSent` and
/// `AwaitingPeerKeyMaterial` states.
#[derive(Debug)]
pub struct ServerAwaitingKeyExchange {
    pub client_random: [u8; 32],
    pub server_random: [u8; 32],
    pub suite: &'static Ciphersuite,
    pub credential: Arc<Credential>,
    /// Present for ephemeral key exchanges only.
    pub key_agreement_engine: Option<KeyAgreementEngine>,
}

/// Data held by the server in the `KeysDerived` state.
#[derive(Debug)]
pub struct ServerKeysDerived {
    pub suite: &'static Ciphersuite,
    pub master_secret: MasterSecret,
    pub session_keys: SessionKeys,
}

/// Data held by the server in the `HandshakeComplete` state.
#[derive(Debug)]
pub struct ServerComplete {
    pub suite: &'static Ciphersuite,
    pub session_keys: SessionKeys,
}

// --- Client States ---
/// Data held by the client in the `Ready` state.
#[derive(Debug, Default)]
pub struct ClientReady {}

/// Data held by the client in the `AwaitingServerFlight` state.
#[derive(Debug)]
pub struct ClientAwaitingFlight {
    pub client_random: [u8; 32],
}

/// Data held by the client in the `AwaitingServerFinished` state.
#[derive(Debug)]
pub struct ClientAwaitingFinished {
    pub suite: &'static Ciphersuite,
    pub master_secret: MasterSecret,
    pub session_keys: SessionKeys,
}

/// Data held by the client in the `Established` state.
#[derive(Debug)]
pub struct ClientEstablished {
    pub suite: &'static Ciphersuite,
    pub session_keys: SessionKeys,
}

/// Runtime view of where a server connection is in its handshake.
///
/// 服务器连接握手进度的运行时视图。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Start,
    ReceivedClientGreeting,
    NegotiatedParameters,
    KeyExchangeSent,
    AwaitingPeerKeyMaterial,
    KeysDerived,
    HandshakeComplete,
    Failed,
}

impl HandshakeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, HandshakeState::HandshakeComplete | HandshakeState::Failed)
    }
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

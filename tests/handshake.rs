//! Integration test for the complete handshake protocol, with no network.
//! 对完整握手协议的集成测试（不经过网络）。

use std::sync::Arc;

use tls_echo::credential::CredentialStore;
use tls_echo::crypto::keys::Role;
use tls_echo::crypto::random::Drbg;
use tls_echo::crypto::suite::{self, Ciphersuite, lookup};
use tls_echo::error::{Error, Result};
use tls_echo::handshake::{HandshakeClient, HandshakeServer};
use tls_echo::protocol::message::HandshakeMessage;
use tls_echo::protocol::state::{ServerStart, Start};
use tls_echo::record::{ContentType, RecordLayer};

fn server_for(permitted: Vec<&'static Ciphersuite>, seed: u8) -> Result<HandshakeServer<Start, ServerStart>> {
    Ok(HandshakeServer::builder()
        .permitted_suites(permitted)
        .credentials(Arc::new(CredentialStore::builtin()?))
        .random(Arc::new(Drbg::from_seed([seed; 32])))
        .build())
}

fn run_handshake(id: u16) -> Result<()> {
    println!("--- Handshake for {id:#06x} ---");
    let suite = lookup(id).ok_or(Error::UnknownCiphersuite(id))?;
    let server = server_for(suite::enabled().iter().collect(), 1)?;
    let client = HandshakeClient::builder()
        .offered_suites(vec![id])
        .random(Arc::new(Drbg::from_seed([2; 32])))
        .build();

    // C -> S: ClientHello
    let (client_hello, client) = client.start_handshake()?;

    // S: negotiate and produce the flight
    let server = server.process_client_hello(client_hello)?.negotiate()?;
    let (flight, server) = server.send_key_exchange()?;
    let expected_len = if suite.key_exchange.is_ephemeral() { 4 } else { 3 };
    assert_eq!(flight.len(), expected_len);
    let server = server.await_peer();

    // C: verify the flight, answer with ClientKeyExchange + Finished
    let (reply, client) = client.process_server_flight(flight)?;
    assert_eq!(client.suite().id, id);

    // S: derive keys, verify the client's Finished, answer with its own
    let server = server.process_client_key_exchange(reply.key_exchange)?;
    let (server_finished, server) = server.process_client_finished(reply.finished)?;

    // C: verify the server's Finished
    let client = client.process_server_finished(server_finished)?;

    let (server_suite, server_keys) = server.into_session_parts();
    let (client_suite, client_keys) = client.into_session_parts();
    assert_eq!(server_suite.id, client_suite.id);

    // Both ends derived the same keys: records sealed by one open at the other.
    let (cw, cr) = client_keys.for_role(Role::Client);
    let (sw, sr) = server_keys.for_role(Role::Server);
    let mut client_layer = RecordLayer::new();
    client_layer.install_write_keys(client_suite, cw)?;
    client_layer.install_read_keys(client_suite, cr)?;
    let mut server_layer = RecordLayer::new();
    server_layer.install_write_keys(server_suite, sw)?;
    server_layer.install_read_keys(server_suite, sr)?;

    let request = client_layer.seal(ContentType::ApplicationData, b"GET / HTTP/1.0\r\n\r\n")?;
    let (content_type, plaintext) = server_layer.open(&request)?;
    assert_eq!(content_type, ContentType::ApplicationData);
    assert_eq!(plaintext, b"GET / HTTP/1.0\r\n\r\n");

    let response = server_layer.seal(ContentType::ApplicationData, b"pong")?;
    assert_eq!(client_layer.open(&response)?.1, b"pong");
    Ok(())
}

#[test]
fn test_every_enabled_suite_completes() -> Result<()> {
    for suite in suite::enabled() {
        run_handshake(suite.id)?;
    }
    Ok(())
}

#[test]
fn test_no_common_ciphersuite() -> Result<()> {
    let server = server_for(vec![lookup(0x009C).ok_or(Error::UnknownCiphersuite(0x009C))?], 1)?;
    let client = HandshakeClient::builder().offered_suites(vec![0xC02F, 0xCCA8]).build();

    let (client_hello, _client) = client.start_handshake()?;
    let err = server.process_client_hello(client_hello).unwrap_err();
    assert!(matches!(err, Error::NoCommonCiphersuite));
    Ok(())
}

#[test]
fn test_server_preference_wins() -> Result<()> {
    let server = server_for(suite::enabled().iter().collect(), 3)?;
    let client = HandshakeClient::builder()
        .offered_suites(vec![0x009C, 0xC02F, 0xC02C])
        .build();

    let (client_hello, client) = client.start_handshake()?;
    let server = server.process_client_hello(client_hello)?.negotiate()?;
    let (flight, _server) = server.send_key_exchange()?;
    let (_reply, client) = client.process_server_flight(flight)?;
    assert_eq!(client.suite().id, 0xC02C);
    Ok(())
}

#[test]
fn test_tampered_key_exchange_signature() -> Result<()> {
    let server = server_for(suite::enabled().iter().collect(), 4)?;
    let client = HandshakeClient::builder().offered_suites(vec![0xC030]).build();

    let (client_hello, client) = client.start_handshake()?;
    let server = server.process_client_hello(client_hello)?.negotiate()?;
    let (mut flight, _server) = server.send_key_exchange()?;
    for message in &mut flight {
        if let HandshakeMessage::ServerKeyExchange(params) = message {
            params.public[10] ^= 0x01;
        }
    }

    let err = client.process_server_flight(flight).unwrap_err();
    assert!(matches!(err, Error::HandshakeVerificationFailed(_)));
    Ok(())
}

#[test]
fn test_tampered_client_finished() -> Result<()> {
    let server = server_for(suite::enabled().iter().collect(), 5)?;
    let client = HandshakeClient::builder().offered_suites(vec![0xCCA9]).build();

    let (client_hello, client) = client.start_handshake()?;
    let server = server.process_client_hello(client_hello)?.negotiate()?;
    let (flight, server) = server.send_key_exchange()?;
    let (mut reply, _client) = client.process_server_flight(flight)?;
    if let HandshakeMessage::Finished(finished) = &mut reply.finished {
        finished.verify_data[0] ^= 0xFF;
    }

    let server = server.await_peer().process_client_key_exchange(reply.key_exchange)?;
    let err = server.process_client_finished(reply.finished).unwrap_err();
    assert!(matches!(err, Error::TranscriptMismatch));
    Ok(())
}

#[test]
fn test_corrupted_rsa_premaster_surfaces_at_finished() -> Result<()> {
    let server = server_for(suite::enabled().iter().collect(), 6)?;
    let client = HandshakeClient::builder().offered_suites(vec![0x009C]).build();

    let (client_hello, client) = client.start_handshake()?;
    let server = server.process_client_hello(client_hello)?.negotiate()?;
    let (flight, server) = server.send_key_exchange()?;
    let (mut reply, _client) = client.process_server_flight(flight)?;
    if let HandshakeMessage::ClientKeyExchange(cke) = &mut reply.key_exchange {
        cke.exchange[0] ^= 0x80;
    }

    // The bad premaster is not reported here...
    let server = server.await_peer().process_client_key_exchange(reply.key_exchange)?;
    // ...only as a Finished mismatch.
    let err = server.process_client_finished(reply.finished).unwrap_err();
    assert!(matches!(err, Error::TranscriptMismatch));
    Ok(())
}

#[test]
fn test_out_of_order_message() -> Result<()> {
    let server = server_for(suite::enabled().iter().collect(), 7)?;
    let err = server
        .process_client_hello(HandshakeMessage::ServerHelloDone)
        .unwrap_err();
    assert!(matches!(err, Error::UnexpectedMessage(_)));
    Ok(())
}

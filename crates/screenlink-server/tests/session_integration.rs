//! Integration tests for the session supervisor over real TCP.
//!
//! Each test binds an ephemeral port, connects as a protocol-speaking fake
//! client, and asserts on the exact frames exchanged: greeting and version
//! negotiation, the info handshake, rejection replies (`EICV`, `EBSY`,
//! `EUNK`, `EBAD`), and teardown behavior.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;

use screenlink_core::domain::config::Direction;
use screenlink_core::protocol::codec::{
    encode_hello_reply, read_frame, read_message, write_frame, write_frame_payload,
};
use screenlink_core::protocol::messages::{
    Message, MAX_HELLO_LENGTH, MAX_MESSAGE_LENGTH, PROTOCOL_MAJOR, PROTOCOL_MINOR,
};
use screenlink_core::{ScreenConfig, ScreenShape};

use screenlink_server::platform::mock::MockScreen;
use screenlink_server::platform::PlatformScreen;
use screenlink_server::{Server, SessionSupervisor};

// ── Fixtures ──────────────────────────────────────────────────────────────────

fn test_config() -> ScreenConfig {
    let mut config = ScreenConfig::new();
    config.add_screen("desk").unwrap();
    config.add_screen("laptop").unwrap();
    config.add_screen("tablet").unwrap();
    config.add_alias("portable", "laptop").unwrap();
    config.add_link("desk", Direction::Right, "laptop").unwrap();
    config.add_link("laptop", Direction::Left, "desk").unwrap();
    config.set_address("127.0.0.1:0");
    config
}

/// Starts a full server on an ephemeral port.
async fn start_server() -> (Arc<Server>, SessionSupervisor, SocketAddr) {
    let server = Arc::new(Server::new("desk", test_config()).with_bind_timeout(Duration::from_secs(1)));
    let platform = Arc::new(MockScreen::new(ScreenShape::new(0, 0, 1000, 800), 1));
    server
        .open_primary(platform as Arc<dyn PlatformScreen>)
        .expect("open primary");

    let supervisor = SessionSupervisor::new(Arc::clone(&server));
    let addr = supervisor.start().await.expect("bind");
    (server, supervisor, addr)
}

/// Reads the server greeting and answers with `major.minor` as `name`.
async fn answer_hello(stream: &mut TcpStream, major: i16, minor: i16, name: &str) {
    let greeting = read_frame(stream, MAX_HELLO_LENGTH).await.expect("greeting");
    assert_eq!(&greeting[..7], b"Synergy", "server must greet first");
    write_frame_payload(stream, &encode_hello_reply(major, minor, name))
        .await
        .expect("hello reply");
}

/// Completes the whole handshake: greeting, info request, options.
async fn full_handshake(stream: &mut TcpStream, name: &str) {
    answer_hello(stream, PROTOCOL_MAJOR, PROTOCOL_MINOR, name).await;

    assert_eq!(
        read_message(stream, MAX_MESSAGE_LENGTH).await.expect("qinf"),
        Message::QueryInfo
    );
    write_frame(
        stream,
        &Message::Info {
            x: 0,
            y: 0,
            w: 800,
            h: 600,
            zone: 1,
            mx: 400,
            my: 300,
        },
    )
    .await
    .expect("dinf");

    assert_eq!(
        read_message(stream, MAX_MESSAGE_LENGTH).await.expect("ciak"),
        Message::InfoAck
    );
    assert_eq!(
        read_message(stream, MAX_MESSAGE_LENGTH).await.expect("crop"),
        Message::ResetOptions
    );
}

/// Polls `predicate` until it holds or the deadline passes.
async fn wait_until<F: Fn() -> bool>(predicate: F) {
    for _ in 0..200 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

// ── Scenarios ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_happy_path_handshake_registers_client() {
    let (server, _supervisor, addr) = start_server().await;
    let mut stream = TcpStream::connect(addr).await.expect("connect");

    full_handshake(&mut stream, "laptop").await;

    wait_until(|| server.connected_screens().contains(&"laptop".to_string())).await;
}

#[tokio::test]
async fn test_alias_is_canonicalized_at_registration() {
    let (server, _supervisor, addr) = start_server().await;
    let mut stream = TcpStream::connect(addr).await.expect("connect");

    full_handshake(&mut stream, "portable").await;

    wait_until(|| server.connected_screens().contains(&"laptop".to_string())).await;
    assert!(!server
        .connected_screens()
        .contains(&"portable".to_string()));
}

#[tokio::test]
async fn test_newer_client_version_is_rejected_with_eicv() {
    let (server, _supervisor, addr) = start_server().await;
    let mut stream = TcpStream::connect(addr).await.expect("connect");

    // a 2.0 client against a 1.3 server
    answer_hello(&mut stream, 2, 0, "laptop").await;

    let reply = read_message(&mut stream, MAX_MESSAGE_LENGTH)
        .await
        .expect("eicv");
    assert_eq!(
        reply,
        Message::Incompatible {
            major: PROTOCOL_MAJOR,
            minor: PROTOCOL_MINOR
        }
    );
    // no proxy may have been registered
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(server.connected_screens(), vec!["desk".to_string()]);
}

#[tokio::test]
async fn test_test_build_client_is_rejected_with_eicv() {
    let (_server, _supervisor, addr) = start_server().await;
    let mut stream = TcpStream::connect(addr).await.expect("connect");

    answer_hello(&mut stream, 0, 9, "laptop").await;

    let reply = read_message(&mut stream, MAX_MESSAGE_LENGTH)
        .await
        .expect("eicv");
    assert!(matches!(reply, Message::Incompatible { .. }));
}

#[tokio::test]
async fn test_negative_version_is_rejected_with_ebad() {
    let (_server, _supervisor, addr) = start_server().await;
    let mut stream = TcpStream::connect(addr).await.expect("connect");

    answer_hello(&mut stream, -1, 0, "laptop").await;

    let reply = read_message(&mut stream, MAX_MESSAGE_LENGTH)
        .await
        .expect("ebad");
    assert_eq!(reply, Message::Bad);
}

#[tokio::test]
async fn test_duplicate_name_is_rejected_with_ebsy() {
    let (server, _supervisor, addr) = start_server().await;

    let mut first = TcpStream::connect(addr).await.expect("connect first");
    full_handshake(&mut first, "laptop").await;
    wait_until(|| server.connected_screens().contains(&"laptop".to_string())).await;

    // a second client claims the same name; it survives the handshake and
    // is turned away at registration
    let mut second = TcpStream::connect(addr).await.expect("connect second");
    full_handshake(&mut second, "laptop").await;

    let reply = read_message(&mut second, MAX_MESSAGE_LENGTH)
        .await
        .expect("ebsy");
    assert_eq!(reply, Message::Busy);

    // the first client is unaffected
    assert!(server.connected_screens().contains(&"laptop".to_string()));
    first.writable().await.expect("first still open");
}

#[tokio::test]
async fn test_unknown_name_is_rejected_with_eunk() {
    let (server, _supervisor, addr) = start_server().await;
    let mut stream = TcpStream::connect(addr).await.expect("connect");

    full_handshake(&mut stream, "ghost").await;

    let reply = read_message(&mut stream, MAX_MESSAGE_LENGTH)
        .await
        .expect("eunk");
    assert_eq!(reply, Message::UnknownName);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(server.connected_screens(), vec!["desk".to_string()]);
}

#[tokio::test]
async fn test_bye_unregisters_the_client() {
    let (server, _supervisor, addr) = start_server().await;
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    full_handshake(&mut stream, "laptop").await;
    wait_until(|| server.connected_screens().contains(&"laptop".to_string())).await;

    write_frame(&mut stream, &Message::Bye).await.expect("bye");

    wait_until(|| !server.connected_screens().contains(&"laptop".to_string())).await;
}

#[tokio::test]
async fn test_abrupt_disconnect_unregisters_the_client() {
    let (server, _supervisor, addr) = start_server().await;
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    full_handshake(&mut stream, "laptop").await;
    wait_until(|| server.connected_screens().contains(&"laptop".to_string())).await;

    drop(stream);

    wait_until(|| !server.connected_screens().contains(&"laptop".to_string())).await;
}

#[tokio::test]
async fn test_client_sending_server_command_gets_ebad() {
    let (server, _supervisor, addr) = start_server().await;
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    full_handshake(&mut stream, "laptop").await;
    wait_until(|| server.connected_screens().contains(&"laptop".to_string())).await;

    // QINF is a server-to-client command; from a client it is a violation
    write_frame(&mut stream, &Message::QueryInfo)
        .await
        .expect("bad command");

    let reply = read_message(&mut stream, MAX_MESSAGE_LENGTH)
        .await
        .expect("ebad");
    assert_eq!(reply, Message::Bad);
    wait_until(|| !server.connected_screens().contains(&"laptop".to_string())).await;
}

#[tokio::test]
async fn test_keepalive_is_echoed() {
    let (server, _supervisor, addr) = start_server().await;
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    full_handshake(&mut stream, "laptop").await;
    wait_until(|| server.connected_screens().contains(&"laptop".to_string())).await;

    write_frame(&mut stream, &Message::KeepAlive)
        .await
        .expect("calv");
    let reply = read_message(&mut stream, MAX_MESSAGE_LENGTH)
        .await
        .expect("calv echo");
    assert_eq!(reply, Message::KeepAlive);
}

#[tokio::test]
async fn test_clipboard_grab_propagates_to_other_client() {
    let (server, _supervisor, addr) = start_server().await;

    let mut laptop = TcpStream::connect(addr).await.expect("connect laptop");
    full_handshake(&mut laptop, "laptop").await;
    let mut tablet = TcpStream::connect(addr).await.expect("connect tablet");
    full_handshake(&mut tablet, "tablet").await;
    wait_until(|| server.connected_screens().len() == 3).await;

    // laptop takes the clipboard; the tablet must be told to give it up
    write_frame(
        &mut laptop,
        &Message::ClipboardGrab {
            id: screenlink_core::ClipboardId::Clipboard,
            seq: 0,
        },
    )
    .await
    .expect("grab");

    let heard = read_message(&mut tablet, MAX_MESSAGE_LENGTH)
        .await
        .expect("propagated grab");
    assert_eq!(
        heard,
        Message::ClipboardGrab {
            id: screenlink_core::ClipboardId::Clipboard,
            seq: 0
        }
    );
    assert_eq!(
        server.clipboard_owner(screenlink_core::ClipboardId::Clipboard).0,
        "laptop"
    );
}

#[tokio::test]
async fn test_shutdown_closes_sessions_and_primary() {
    let (server, supervisor, addr) = start_server().await;
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    full_handshake(&mut stream, "laptop").await;
    wait_until(|| server.connected_screens().contains(&"laptop".to_string())).await;

    server.request_shutdown();
    supervisor.wait().await;

    // every screen, the primary included, is gone
    assert!(server.connected_screens().is_empty());
    // the peer observes EOF
    let mut buf = [0u8; 4];
    use tokio::io::AsyncReadExt;
    let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
        .await
        .expect("read should not hang")
        .unwrap_or(0);
    assert_eq!(n, 0, "server must close the connection on shutdown");
}

#[tokio::test]
async fn test_late_joiner_hears_active_screensaver() {
    use screenlink_server::platform::PrimaryReceiver;

    let (server, _supervisor, addr) = start_server().await;
    server.on_screensaver(true);

    let mut stream = TcpStream::connect(addr).await.expect("connect");
    full_handshake(&mut stream, "laptop").await;

    let heard = read_message(&mut stream, MAX_MESSAGE_LENGTH)
        .await
        .expect("saver notice");
    assert_eq!(heard, Message::Screensaver { on: true });
}

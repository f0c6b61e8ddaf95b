//! End-to-end server tests over real TCP connections.
//!
//! Each test boots a server on an ephemeral port, drives it with raw JSON
//! frames, and asserts on the exact frames that come back.

use std::time::Duration;

use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use parley::protocol::frame::{FrameReader, FrameWriter};
use parley::{Config, Hub, TcpServer};

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

struct TestServer {
    addr: std::net::SocketAddr,
    cancel: CancellationToken,
}

impl TestServer {
    async fn start() -> Self {
        let cfg = Config::default();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();

        let (hub, handle) = Hub::new();
        tokio::spawn(hub.run(cancel.clone()));

        let server = TcpServer::new(cfg, handle);
        let serve_cancel = cancel.clone();
        tokio::spawn(async move { server.serve(listener, serve_cancel).await });

        Self { addr, cancel }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct TestClient {
    reader: FrameReader<tokio::net::tcp::OwnedReadHalf>,
    writer: FrameWriter<tokio::net::tcp::OwnedWriteHalf>,
    cancel: CancellationToken,
}

impl TestClient {
    async fn connect(server: &TestServer) -> Self {
        let stream = TcpStream::connect(server.addr).await.unwrap();
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: FrameReader::new(read_half, 64 * 1024),
            writer: FrameWriter::new(write_half),
            cancel: CancellationToken::new(),
        }
    }

    async fn send(&mut self, json: &str) {
        self.writer
            .write_frame(&self.cancel, json.as_bytes())
            .await
            .unwrap();
    }

    async fn recv(&mut self) -> Value {
        let frame = timeout(RECV_TIMEOUT, self.reader.read_frame())
            .await
            .expect("timed out waiting for a frame")
            .expect("read failed")
            .expect("connection closed while a frame was expected");
        serde_json::from_slice(&frame).expect("server sent invalid json")
    }

    /// The server must close this connection without sending anything else.
    async fn expect_close(&mut self) {
        let result = timeout(RECV_TIMEOUT, self.reader.read_frame())
            .await
            .expect("timed out waiting for close");
        match result {
            Ok(None) => {}
            Ok(Some(frame)) => panic!(
                "expected close, got frame: {}",
                String::from_utf8_lossy(&frame)
            ),
            // A reset counts as closed too.
            Err(_) => {}
        }
    }

    async fn identify(&mut self, username: &str) {
        self.send(&format!(
            r#"{{"type":"IDENTIFY","username":"{}"}}"#,
            username
        ))
        .await;
        let response = self.recv().await;
        assert_eq!(response["result"], "SUCCESS", "identify {username}: {response}");
    }
}

#[tokio::test]
async fn identify_happy_path() {
    let server = TestServer::start().await;
    let mut c1 = TestClient::connect(&server).await;

    c1.send(r#"{"type":"IDENTIFY","username":"alice"}"#).await;

    let response = c1.recv().await;
    assert_eq!(response["type"], "RESPONSE");
    assert_eq!(response["operation"], "IDENTIFY");
    assert_eq!(response["result"], "SUCCESS");
    assert_eq!(response["extra"], "alice");
}

#[tokio::test]
async fn duplicate_username_is_refused_but_keeps_the_connection() {
    let server = TestServer::start().await;
    let mut c1 = TestClient::connect(&server).await;
    c1.identify("alice").await;

    let mut c2 = TestClient::connect(&server).await;
    c2.send(r#"{"type":"IDENTIFY","username":"alice"}"#).await;

    let response = c2.recv().await;
    assert_eq!(response["operation"], "IDENTIFY");
    assert_eq!(response["result"], "USER_ALREADY_EXISTS");
    assert_eq!(response["extra"], "alice");

    // Still connected: a second attempt with a free name succeeds.
    c2.send(r#"{"type":"IDENTIFY","username":"bob"}"#).await;
    let response = c2.recv().await;
    assert_eq!(response["result"], "SUCCESS");
}

#[tokio::test]
async fn unidentified_commands_are_rejected_and_the_socket_closes() {
    let server = TestServer::start().await;
    let mut c3 = TestClient::connect(&server).await;

    c3.send(r#"{"type":"USERS"}"#).await;

    let response = c3.recv().await;
    assert_eq!(response["type"], "RESPONSE");
    assert_eq!(response["operation"], "INVALID");
    assert_eq!(response["result"], "NOT_IDENTIFIED");
    c3.expect_close().await;
}

#[tokio::test]
async fn room_invitation_and_join() {
    let server = TestServer::start().await;
    let mut alice = TestClient::connect(&server).await;
    alice.identify("alice").await;

    let mut bob = TestClient::connect(&server).await;
    bob.identify("bob").await;
    // alice hears about bob identifying.
    let new_user = alice.recv().await;
    assert_eq!(new_user["type"], "NEW_USER");

    alice.send(r#"{"type":"NEW_ROOM","roomname":"r1"}"#).await;
    let response = alice.recv().await;
    assert_eq!(response["operation"], "NEW_ROOM");
    assert_eq!(response["result"], "SUCCESS");

    alice
        .send(r#"{"type":"INVITE","roomname":"r1","usernames":["bob"]}"#)
        .await;
    let invitation = bob.recv().await;
    assert_eq!(invitation["type"], "INVITATION");
    assert_eq!(invitation["roomname"], "r1");
    assert_eq!(invitation["username"], "alice");

    bob.send(r#"{"type":"JOIN_ROOM","roomname":"r1"}"#).await;

    let response = bob.recv().await;
    assert_eq!(response["operation"], "JOIN_ROOM");
    assert_eq!(response["result"], "SUCCESS");
    assert_eq!(response["extra"], "r1");

    let joined = bob.recv().await;
    assert_eq!(joined["type"], "JOINED_ROOM");
    assert_eq!(joined["roomname"], "r1");
    assert_eq!(joined["username"], "bob");

    let joined = alice.recv().await;
    assert_eq!(joined["type"], "JOINED_ROOM");
    assert_eq!(joined["roomname"], "r1");
    assert_eq!(joined["username"], "bob");
}

#[tokio::test]
async fn invite_by_non_member_is_a_protocol_violation() {
    let server = TestServer::start().await;
    let mut alice = TestClient::connect(&server).await;
    alice.identify("alice").await;
    alice.send(r#"{"type":"NEW_ROOM","roomname":"r1"}"#).await;
    let _ = alice.recv().await;

    let mut carol = TestClient::connect(&server).await;
    carol.identify("carol").await;
    let mut dave = TestClient::connect(&server).await;
    dave.identify("dave").await;

    carol
        .send(r#"{"type":"INVITE","roomname":"r1","usernames":["dave"]}"#)
        .await;

    // carol sees NEW_USER for dave first, then her violation.
    let new_user = carol.recv().await;
    assert_eq!(new_user["type"], "NEW_USER");
    let response = carol.recv().await;
    assert_eq!(response["operation"], "INVALID");
    assert_eq!(response["result"], "INVALID");
    carol.expect_close().await;
}

#[tokio::test]
async fn dropped_member_triggers_left_room_then_disconnected() {
    let server = TestServer::start().await;
    let mut alice = TestClient::connect(&server).await;
    alice.identify("alice").await;

    let mut bob = TestClient::connect(&server).await;
    bob.identify("bob").await;
    let _ = alice.recv().await; // NEW_USER bob

    alice.send(r#"{"type":"NEW_ROOM","roomname":"r1"}"#).await;
    let _ = alice.recv().await;
    alice
        .send(r#"{"type":"INVITE","roomname":"r1","usernames":["bob"]}"#)
        .await;
    let _ = bob.recv().await; // INVITATION
    bob.send(r#"{"type":"JOIN_ROOM","roomname":"r1"}"#).await;
    let _ = bob.recv().await; // SUCCESS
    let _ = bob.recv().await; // JOINED_ROOM
    let _ = alice.recv().await; // JOINED_ROOM

    // bob's socket drops.
    drop(bob);

    let left = alice.recv().await;
    assert_eq!(left["type"], "LEFT_ROOM");
    assert_eq!(left["roomname"], "r1");
    assert_eq!(left["username"], "bob");

    let disconnected = alice.recv().await;
    assert_eq!(disconnected["type"], "DISCONNECTED");
    assert_eq!(disconnected["username"], "bob");

    // The username is free again.
    let mut bob2 = TestClient::connect(&server).await;
    bob2.identify("bob").await;
}

#[tokio::test]
async fn public_text_reaches_the_other_client() {
    let server = TestServer::start().await;
    let mut alice = TestClient::connect(&server).await;
    alice.identify("alice").await;
    let mut bob = TestClient::connect(&server).await;
    bob.identify("bob").await;
    let _ = alice.recv().await; // NEW_USER bob

    alice
        .send(r#"{"type":"PUBLIC_TEXT","text":"hello everyone"}"#)
        .await;

    let broadcast = bob.recv().await;
    assert_eq!(broadcast["type"], "PUBLIC_TEXT_FROM");
    assert_eq!(broadcast["username"], "alice");
    assert_eq!(broadcast["text"], "hello everyone");
}

#[tokio::test]
async fn private_text_is_routed_to_the_named_user() {
    let server = TestServer::start().await;
    let mut alice = TestClient::connect(&server).await;
    alice.identify("alice").await;
    let mut bob = TestClient::connect(&server).await;
    bob.identify("bob").await;
    let _ = alice.recv().await; // NEW_USER bob

    alice
        .send(r#"{"type":"TEXT","username":"bob","text":"just for you"}"#)
        .await;

    let message = bob.recv().await;
    assert_eq!(message["type"], "TEXT_FROM");
    assert_eq!(message["username"], "alice");
    assert_eq!(message["text"], "just for you");
}

#[tokio::test]
async fn malformed_json_disconnects_the_sender() {
    let server = TestServer::start().await;
    let mut client = TestClient::connect(&server).await;

    client.send("this is not json").await;

    let response = client.recv().await;
    assert_eq!(response["operation"], "INVALID");
    assert_eq!(response["result"], "INVALID");
    client.expect_close().await;
}

#[tokio::test]
async fn oversized_frames_disconnect_the_sender() {
    let server = TestServer::start().await;
    let mut client = TestClient::connect(&server).await;
    client.identify("alice").await;

    // Larger than the default 64 KiB cap, in one frame. The server may
    // close mid-write, so the write itself is best-effort.
    let huge = vec![b'x'; 70 * 1024];
    let _ = client.writer.write_frame(&client.cancel, &huge).await;

    client.expect_close().await;
}

#[tokio::test]
async fn shutdown_closes_client_sockets() {
    let server = TestServer::start().await;
    let mut alice = TestClient::connect(&server).await;
    alice.identify("alice").await;

    server.cancel.cancel();

    // Whatever is in flight, the socket must end.
    let ended = timeout(RECV_TIMEOUT, async {
        loop {
            match alice.reader.read_frame().await {
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => break,
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "socket still open after shutdown");
}

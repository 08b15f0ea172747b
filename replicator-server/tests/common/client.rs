//! WebSocket test client for protocol testing
//!
//! Provides both low-level WsConnection and high-level TestClient.
//!
//! Note: Some methods may appear unused because they're only used in specific
//! test files and clippy checks each test independently.

use std::net::SocketAddr;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Low-level WebSocket connection
pub struct WsConnection {
    sink: SplitSink<WsStream, Message>,
    stream: SplitStream<WsStream>,
}

impl WsConnection {
    /// Connect to WebSocket endpoint
    pub async fn connect(addr: SocketAddr) -> Self {
        let url = format!("ws://{}/ws", addr);
        let (ws, _) = tokio_tungstenite::connect_async(&url)
            .await
            .expect("Failed to connect");
        let (sink, stream) = ws.split();
        Self { sink, stream }
    }

    /// Send raw text message
    pub async fn send_raw(&mut self, msg: &str) {
        self.sink
            .send(Message::Text(msg.to_string().into()))
            .await
            .unwrap();
    }

    /// Send JSON message
    pub async fn send_json<T: Serialize>(&mut self, msg: &T) {
        let json = serde_json::to_string(msg).unwrap();
        self.send_raw(&json).await;
    }

    /// Receive raw text message
    pub async fn recv_raw(&mut self) -> String {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return text.to_string(),
                Some(Ok(_)) => continue,
                Some(Err(e)) => panic!("WebSocket error: {}", e),
                None => panic!("WebSocket closed"),
            }
        }
    }

    /// Receive and deserialize JSON message
    pub async fn recv_json<T: DeserializeOwned>(&mut self) -> T {
        let text = tokio::time::timeout(Duration::from_secs(5), self.recv_raw())
            .await
            .expect("Timed out waiting for message");
        serde_json::from_str(&text).expect("Failed to parse JSON")
    }

    /// Receive with timeout, returns None if timeout
    pub async fn recv_timeout(&mut self, duration: Duration) -> Option<String> {
        tokio::time::timeout(duration, self.recv_raw()).await.ok()
    }

    /// Close the connection
    pub async fn close(mut self) {
        let _ = self.sink.send(Message::Close(None)).await;
    }
}

/// High-level test client with helper methods
pub struct TestClient {
    pub conn: WsConnection,
}

impl TestClient {
    #[allow(dead_code)]
    pub async fn connect(addr: SocketAddr) -> Self {
        Self {
            conn: WsConnection::connect(addr).await,
        }
    }

    /// Send an `{event, data}` frame
    #[allow(dead_code)]
    pub async fn emit(&mut self, event: &str, data: Value) {
        self.conn
            .send_json(&json!({"event": event, "data": data}))
            .await;
    }

    /// Join a room with the given role (`sensor` or `viewer`)
    #[allow(dead_code)]
    pub async fn join(&mut self, room: &str, role: &str) {
        self.emit("join_session", json!({"sessionId": room, "type": role}))
            .await;
    }

    #[allow(dead_code)]
    pub async fn send_frame(&mut self, room: &str, image: &str) {
        self.emit("send_frame", json!({"roomId": room, "image": image}))
            .await;
    }

    #[allow(dead_code)]
    pub async fn process_3d(&mut self, room: &str) {
        self.emit("process_3d", json!({"sessionId": room})).await;
    }

    /// Receive next message
    #[allow(dead_code)]
    pub async fn recv(&mut self) -> Value {
        self.conn.recv_json().await
    }

    /// Receive the next message and assert its event name
    #[allow(dead_code)]
    pub async fn expect_event(&mut self, event: &str) -> Value {
        let msg = self.recv().await;
        assert_eq!(msg["event"], event, "Expected {} but got: {}", event, msg);
        msg["data"].clone()
    }

    /// Assert no message received within duration
    #[allow(dead_code)]
    pub async fn expect_no_message(&mut self, duration: Duration) {
        let msg = self.conn.recv_timeout(duration).await;
        assert!(msg.is_none(), "Expected no message but received: {:?}", msg);
    }
}

//! Shared mock gateway for end-to-end tests.
//!
//! A scripted OpenWebNet gateway on a loopback listener: each helper
//! drives one server-side handshake variant, reusing the crate's own
//! frame codec and auth primitives so both sides agree on the wire
//! format.

#![allow(dead_code)]

use std::sync::Arc;

use own::auth::{self, HashMethod};
use own::frame::{read_frame, Frame};
use own::{Gateway, GatewayDescriptor};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

/// Password used by the authenticated-handshake fixtures.
pub const PASSWORD: &str = "abcdef";

/// Server nonce issued by the scripted gateway.
pub const RA: &str = "123456";

/// Bind a mock gateway listener on an ephemeral loopback port.
pub async fn bind() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// Gateway value pointing at the mock listener.
pub fn gateway(port: u16, password: Option<&str>) -> Arc<Gateway> {
    Arc::new(Gateway::new(GatewayDescriptor {
        address: Some("127.0.0.1".to_string()),
        port: Some(port),
        password: password.map(str::to_owned),
        model_name: Some("MockF454".to_string()),
        ..GatewayDescriptor::default()
    }))
}

/// One accepted connection on the mock gateway side.
pub struct ServerConn {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl ServerConn {
    pub async fn accept(listener: &TcpListener) -> Self {
        let (stream, _) = listener.accept().await.unwrap();
        Self::from_stream(stream)
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        }
    }

    /// Read one client frame, panicking on a malformed stream.
    pub async fn recv(&mut self) -> Frame {
        read_frame(&mut self.reader).await.unwrap()
    }

    /// Read one client frame, returning None at EOF.
    pub async fn try_recv(&mut self) -> Option<Frame> {
        read_frame(&mut self.reader).await.ok()
    }

    pub async fn send(&mut self, payload: &str) {
        self.writer.write_all(payload.as_bytes()).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Read the session-type-select frame and acknowledge it.
    pub async fn accept_type_select(&mut self) -> Frame {
        let select = self.recv().await;
        self.send("*#*1##").await;
        select
    }

    /// Serve the password-less path: plain ACK as the negotiation reply.
    pub async fn serve_open_handshake(&mut self) -> Frame {
        let select = self.accept_type_select().await;
        self.send("*#*1##").await;
        select
    }

    /// Serve a full SHA challenge-response handshake, returning the
    /// client's `(Rb, proof)` once the final ACK arrived.
    pub async fn serve_sha_handshake(
        &mut self,
        method: HashMethod,
        password: &str,
    ) -> (String, String) {
        self.accept_type_select().await;
        let code = match method {
            HashMethod::Sha1 => "*98*1##",
            HashMethod::Sha256 => "*98*2##",
        };
        self.send(code).await;

        let accept = self.recv().await;
        assert_eq!(accept.as_str(), "*#*1##", "client must accept the challenge");

        self.send(&format!("*#{RA}##")).await;

        let proof_frame = self.recv().await;
        let (rb, proof) = parse_proof_frame(&proof_frame);
        assert_eq!(
            proof,
            auth::client_proof(method, password, RA, &rb),
            "client proof mismatch"
        );

        self.send(&format!("*#{}##", auth::server_proof(method, password, RA, &rb)))
            .await;

        let final_ack = self.recv().await;
        assert_eq!(final_ack.as_str(), "*#*1##", "client must confirm the server proof");

        (rb, proof)
    }

    /// Echo loop for a command session: every inbound frame is answered
    /// with its payload wrapped in a reply marker.
    pub async fn serve_command_echo(&mut self) {
        while let Some(frame) = self.try_recv().await {
            let reply = format!("*reply{}##", frame.payload());
            self.send(&reply).await;
        }
    }
}

/// Split a `*#<Rb>*<proof>##` frame into its parts.
pub fn parse_proof_frame(frame: &Frame) -> (String, String) {
    let interior = frame
        .as_str()
        .strip_prefix("*#")
        .and_then(|r| r.strip_suffix("##"))
        .expect("proof frame shape");
    let (rb, proof) = interior.split_once('*').expect("proof frame separator");
    (rb.to_string(), proof.to_string())
}

/// Accept loop serving both event and command sessions password-less;
/// event sessions receive `event_frames`, command sessions echo.
pub async fn serve_open_gateway(listener: TcpListener, event_frames: Vec<String>) {
    loop {
        let (stream, _) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(_) => return,
        };
        let frames = event_frames.clone();
        tokio::spawn(async move {
            let mut conn = ServerConn::from_stream(stream);
            let select = conn.serve_open_handshake().await;
            if select.as_str() == "*99*1##" {
                for frame in frames {
                    conn.send(&frame).await;
                }
                // Hold the event session open until the client goes away.
                while conn.try_recv().await.is_some() {}
            } else {
                conn.serve_command_echo().await;
            }
        });
    }
}

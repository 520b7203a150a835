//! # own-core - OpenWebNet gateway client
//!
//! Async client for the OpenWebNet home-automation bus protocol spoken
//! over a long-lived TCP connection to a gateway device. The crate covers
//! the session layer - connection lifecycle, session-type negotiation,
//! the challenge-response authentication handshake, and frame transport -
//! plus a handler that keeps an event-listening session alive and drains
//! an outbound command queue through a bounded worker pool.
//!
//! ## Features
//!
//! - **Frame codec**: `*<fields>##` ASCII frames with ACK/NACK/challenge/
//!   nonce classification
//! - **Three authentication methods**: legacy numeric password transform,
//!   HMAC-SHA1 and HMAC-SHA256 challenge-response with mutual
//!   authentication
//! - **Bounded retries**: per-operation refused budgets with backoff, 60 s
//!   reset pauses on persistent sessions
//! - **Session pool**: one event listener plus 1-10 command workers fed
//!   by a FIFO queue
//!
//! ## Protocol Overview
//!
//! ```text
//! Client                                Gateway
//!    |                                     |
//!    |------------ *99*1## --------------->|  select session type
//!    |<----------- *#*1## -----------------|  type acknowledged
//!    |<----------- *98*2## ----------------|  SHA-256 challenge
//!    |------------ *#*1## ---------------->|  challenge accepted
//!    |<----------- *#<Ra>## ---------------|  server nonce
//!    |------------ *#<Rb>*<proof>## ------>|  client proof
//!    |<----------- *#<proof'>## -----------|  server proof
//!    |------------ *#*1## ---------------->|  identities confirmed
//!    |                                     |
//!    |<=========== event frames ==========>|
//! ```
//!
//! ### State Machine
//!
//! ```text
//!  Idle ──> Connecting ──> AwaitingTypeAck ──> AwaitingNegotiationAck
//!                                                  │        │
//!                             AwaitingShaChallenge <┘        └> AwaitingNonce
//!                                      │                            │
//!                             AwaitingServerProof ──> Authenticated <┘
//! ```
//!
//! `Failed(reason)` is reachable from every state, with exactly one
//! reason from the closed [`SessionFailure`] set per failed attempt.
//!
//! ### Wire Signaling
//!
//! | Frame           | Meaning                          |
//! |-----------------|----------------------------------|
//! | `*99*0##`       | Open a command session           |
//! | `*99*1##`       | Open an event session            |
//! | `*#*1##`        | ACK                              |
//! | `*#*0##`        | NACK                             |
//! | `*98*1##`       | SHA-1 challenge follows          |
//! | `*98*2##`       | SHA-256 challenge follows        |
//! | `*#<Rb>*<p>##`  | Client nonce and proof           |
//! | `*#<digits>##`  | Nonce / proof / legacy password  |
//!
//! ## Quick Start
//!
//! ### One-shot connectivity test
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use own::{Gateway, GatewayDescriptor, GatewaySession};
//!
//! let mut gateway = Gateway::new(GatewayDescriptor {
//!     address: Some("192.168.1.35".into()),
//!     port: Some(20000),
//!     ..GatewayDescriptor::default()
//! });
//! gateway.set_password("12345");
//!
//! let outcome = GatewaySession::test(Arc::new(gateway)).await;
//! if let Some(reason) = outcome.failure() {
//!     eprintln!("gateway refused: {}", reason.as_code());
//! }
//! ```
//!
//! ### Event stream plus commands
//!
//! ```rust,ignore
//! use own::{Config, Gateway, GatewayEvent, GatewayHandler, RawDecoder};
//! use own::frame::Frame;
//!
//! let config = Config::from_env();
//! let gateway = Gateway::new(config.gateway_descriptor());
//! let mut handler = GatewayHandler::new(gateway, RawDecoder, config.handler);
//!
//! let mut events = handler.subscribe();
//! handler.start()?;
//!
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         if let GatewayEvent::Message(frame) = event {
//!             println!("bus: {frame}");
//!         }
//!     }
//! });
//!
//! let reply = handler.enqueue_command(Frame::from_payload("*1*1*12")).await?;
//! handler.stop().await;
//! ```
//!
//! ## Modules
//!
//! - [`frame`]: frame codec and signaling classification
//! - [`auth`]: credential-proof algorithms (pure)
//! - [`gateway`]: gateway identity
//! - [`discovery`]: discovery collaborator boundary
//! - [`session`]: connection lifecycle and negotiation state machine
//! - [`handler`]: event listener and command worker pool
//! - [`decode`]: message-decoding collaborator boundary
//! - [`config`]: configuration management
//! - [`error`]: error types and result aliases

pub mod auth;
pub mod config;
pub mod decode;
pub mod discovery;
pub mod error;
pub mod frame;
pub mod gateway;
pub mod handler;
pub mod session;

// Re-exports for convenience
pub use config::{Config, GatewayConfig, HandlerConfig};
pub use decode::{DecodeError, FrameDecoder, RawDecoder};
pub use discovery::{Discovery, GatewayDescriptor};
pub use error::{OwnError, Result, SessionFailure};
pub use frame::{classify, Frame, SignalingMessage};
pub use gateway::Gateway;
pub use handler::{GatewayEvent, GatewayHandler};
pub use session::{GatewaySession, SessionKind, SessionState, TestOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

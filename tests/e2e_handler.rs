//! End-to-end handler tests: event stream supervision and the command
//! worker pool, against a scripted gateway serving both session kinds.

mod common;

use std::time::Duration;

use common::{bind, ServerConn};
use futures::future::join_all;
use own::decode::{DecodeError, FrameDecoder};
use own::frame::Frame;
use own::{Gateway, GatewayEvent, GatewayHandler, HandlerConfig, OwnError, RawDecoder};
use tokio::time::timeout;

const RECV_DEADLINE: Duration = Duration::from_secs(5);

fn handler_config(workers: usize) -> HandlerConfig {
    HandlerConfig {
        worker_count: workers,
        command_timeout_secs: 1,
        event_buffer: 64,
    }
}

fn gateway(port: u16) -> Gateway {
    Gateway::new(own::GatewayDescriptor {
        address: Some("127.0.0.1".to_string()),
        port: Some(port),
        model_name: Some("MockF454".to_string()),
        ..own::GatewayDescriptor::default()
    })
}

async fn next_event<E: Clone + Send + std::fmt::Debug>(
    events: &mut tokio::sync::broadcast::Receiver<GatewayEvent<E>>,
) -> GatewayEvent<E> {
    timeout(RECV_DEADLINE, events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

/// Five commands through a pool of two workers all complete, each
/// serviced by exactly one session.
#[tokio::test]
async fn test_command_pool_completes_queued_commands() {
    let (listener, port) = bind().await;
    tokio::spawn(common::serve_open_gateway(listener, Vec::new()));

    let mut handler = GatewayHandler::new(gateway(port), RawDecoder, handler_config(2));
    handler.start().unwrap();

    let commands: Vec<_> = (0..5)
        .map(|i| handler.enqueue_command(Frame::from_payload(&format!("*1*1*{i}"))))
        .collect();
    let replies = join_all(commands).await;

    for (i, reply) in replies.into_iter().enumerate() {
        let reply = reply.unwrap();
        assert_eq!(reply.as_str(), format!("*reply*1*1*{i}##"));
    }

    handler.stop().await;
}

#[tokio::test]
async fn test_single_worker_preserves_fifo_completion() {
    let (listener, port) = bind().await;
    tokio::spawn(common::serve_open_gateway(listener, Vec::new()));

    let mut handler = GatewayHandler::new(gateway(port), RawDecoder, handler_config(1));
    handler.start().unwrap();

    for i in 0..3 {
        let reply = handler
            .enqueue_command(Frame::from_payload(&format!("*2*{i}*31")))
            .await
            .unwrap();
        assert_eq!(reply.as_str(), format!("*reply*2*{i}*31##"));
    }

    handler.stop().await;
}

/// Subscribers see Connected, the decoded frames, Disconnected on
/// connection loss, and Reconnected once the listener is back.
#[tokio::test]
async fn test_event_stream_reconnects_after_drop() {
    let (listener, port) = bind().await;

    let server = tokio::spawn(async move {
        // First event session: two frames, then an orderly hang-up.
        let mut conn = ServerConn::accept(&listener).await;
        conn.serve_open_handshake().await;
        conn.send("*1*1*11##").await;
        conn.send("*1*0*12##").await;
        drop(conn);

        // The handler reconnects immediately; serve one more frame.
        let mut conn = ServerConn::accept(&listener).await;
        conn.serve_open_handshake().await;
        conn.send("*1*1*13##").await;
        // Hold the session open until the test is done with it.
        while conn.try_recv().await.is_some() {}
    });

    let mut handler = GatewayHandler::new(gateway(port), RawDecoder, handler_config(1));
    let mut events = handler.subscribe();
    handler.start().unwrap();

    assert_eq!(next_event(&mut events).await, GatewayEvent::Connected);
    assert_eq!(
        next_event(&mut events).await,
        GatewayEvent::Message(Frame::from_payload("*1*1*11"))
    );
    assert_eq!(
        next_event(&mut events).await,
        GatewayEvent::Message(Frame::from_payload("*1*0*12"))
    );
    assert_eq!(next_event(&mut events).await, GatewayEvent::Disconnected);
    assert_eq!(next_event(&mut events).await, GatewayEvent::Reconnected);
    assert_eq!(
        next_event(&mut events).await,
        GatewayEvent::Message(Frame::from_payload("*1*1*13"))
    );

    handler.stop().await;
    server.abort();
}

/// Frames the decoder rejects are logged and skipped, never forwarded
/// and never fatal to the listening task.
#[tokio::test]
async fn test_unsupported_frames_are_skipped() {
    struct LightingOnly;

    impl FrameDecoder for LightingOnly {
        type Event = String;

        fn decode(&self, frame: &Frame) -> Result<Self::Event, DecodeError> {
            if frame.payload().starts_with("*1*") {
                Ok(frame.payload().to_string())
            } else {
                Err(DecodeError::UnsupportedFrame(frame.to_string()))
            }
        }
    }

    let (listener, port) = bind().await;
    tokio::spawn(common::serve_open_gateway(
        listener,
        vec![
            "*13*22*99##".to_string(),
            "*1*1*12##".to_string(),
        ],
    ));

    let mut handler = GatewayHandler::new(gateway(port), LightingOnly, handler_config(1));
    let mut events = handler.subscribe();
    handler.start().unwrap();

    assert_eq!(next_event(&mut events).await, GatewayEvent::Connected);
    // The unsupported energy frame is dropped; the lighting frame
    // arrives next.
    assert_eq!(
        next_event(&mut events).await,
        GatewayEvent::Message("*1*1*12".to_string())
    );

    handler.stop().await;
}

/// A command against a gateway that never answers resolves with the
/// per-command deadline, not a hang, and shutdown stays bounded.
#[tokio::test]
async fn test_unanswered_command_times_out() {
    let (listener, port) = bind().await;

    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => return,
            };
            tokio::spawn(async move {
                let mut conn = ServerConn::from_stream(stream);
                conn.serve_open_handshake().await;
                // Swallow commands without replying.
                while conn.try_recv().await.is_some() {}
            });
        }
    });

    let mut handler = GatewayHandler::new(gateway(port), RawDecoder, handler_config(1));
    handler.start().unwrap();

    let err = handler
        .enqueue_command(Frame::from_payload("*1*1*12"))
        .await
        .unwrap_err();
    assert!(matches!(err, OwnError::Timeout(_)));

    handler.stop().await;
}

/// Commands queued behind a shutdown resolve with an error instead of
/// hanging.
#[tokio::test]
async fn test_pending_commands_resolve_on_stop() {
    // Nothing listening: the worker spends its refused budget first, so
    // the request is still queued when stop() lands.
    let (listener, port) = bind().await;
    drop(listener);

    let mut handler = GatewayHandler::new(gateway(port), RawDecoder, handler_config(1));
    handler.start().unwrap();

    let pending = handler.enqueue_command(Frame::from_payload("*1*1*12"));
    let stopper = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        handler.stop().await;
    };

    let (result, ()) = tokio::join!(pending, stopper);
    assert!(result.is_err());
}

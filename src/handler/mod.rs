//! Gateway handler: event listener plus command worker pool.
//!
//! A [`GatewayHandler`] supervises everything long-lived about one
//! gateway:
//!
//! - one `Event` session in a dedicated listening task, decoding inbound
//!   frames through the [`FrameDecoder`] collaborator and republishing
//!   them to subscribers;
//! - a FIFO queue of outbound command frames drained by a bounded pool of
//!   `Command` session workers (pool size 1-10, one request in flight per
//!   worker);
//! - reconnection of the event session under the 60 s-pause/unbounded
//!   retry policy, with `Disconnected`/`Reconnected` signals to
//!   subscribers. Frames in flight during an outage are lost; the gateway
//!   keeps no replay buffer.
//!
//! Shutdown is cooperative: a termination flag is checked at every
//! suspension point, so latency is bounded by one in-flight read.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::config::HandlerConfig;
use crate::decode::FrameDecoder;
use crate::error::{OwnError, Result};
use crate::frame::Frame;
use crate::gateway::Gateway;
use crate::session::{GatewaySession, SessionKind, RESET_PAUSE};

/// Lifecycle and message events republished to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent<E> {
    /// The event session is up for the first time.
    Connected,
    /// The event session dropped; frames may be lost until reconnection.
    Disconnected,
    /// The event session is up again after an outage.
    Reconnected,
    /// One decoded inbound event.
    Message(E),
}

/// One queued outbound command with its completion channel.
struct CommandRequest {
    frame: Frame,
    reply: oneshot::Sender<Result<Frame>>,
}

type CommandQueue = Arc<Mutex<mpsc::UnboundedReceiver<CommandRequest>>>;

/// Supervises one event session and a pool of command workers for a
/// gateway.
pub struct GatewayHandler<D: FrameDecoder> {
    gateway: Arc<Gateway>,
    decoder: Arc<D>,
    config: HandlerConfig,
    events: broadcast::Sender<GatewayEvent<D::Event>>,
    command_tx: mpsc::UnboundedSender<CommandRequest>,
    command_rx: Option<mpsc::UnboundedReceiver<CommandRequest>>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl<D: FrameDecoder> GatewayHandler<D> {
    /// Build a handler for a gateway. Nothing runs until
    /// [`start`](Self::start).
    pub fn new(gateway: Gateway, decoder: D, config: HandlerConfig) -> Self {
        let (events, _) = broadcast::channel(config.effective_event_buffer());
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);
        Self {
            gateway: Arc::new(gateway),
            decoder: Arc::new(decoder),
            config,
            events,
            command_tx,
            command_rx: Some(command_rx),
            shutdown,
            tasks: Vec::new(),
        }
    }

    /// The gateway this handler supervises.
    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Subscribe to lifecycle and message events. Fire-and-forget: a
    /// lagging subscriber loses the oldest events, never blocks the
    /// listener.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent<D::Event>> {
        self.events.subscribe()
    }

    /// Spawn the listening task and the command worker pool.
    pub fn start(&mut self) -> Result<()> {
        let command_rx = self
            .command_rx
            .take()
            .ok_or_else(|| OwnError::Config("handler already started".into()))?;

        debug!("{} creating listening worker", self.gateway.log_id());
        self.tasks.push(tokio::spawn(listening_loop::<D>(
            Arc::clone(&self.gateway),
            Arc::clone(&self.decoder),
            self.events.clone(),
            self.shutdown.subscribe(),
        )));

        let queue: CommandQueue = Arc::new(Mutex::new(command_rx));
        let workers = self.config.effective_worker_count();
        debug!("{} creating {} sending workers", self.gateway.log_id(), workers);
        for worker in 0..workers {
            self.tasks.push(tokio::spawn(command_worker(
                worker,
                Arc::clone(&self.gateway),
                Arc::clone(&queue),
                self.config,
                self.shutdown.subscribe(),
            )));
        }
        Ok(())
    }

    /// Queue one opaque command frame and return a future resolving to
    /// its response.
    ///
    /// Enqueueing never blocks and never silently drops; the returned
    /// future is detached from the handler borrow and resolves when a
    /// worker has relayed the gateway's reply, the per-command deadline
    /// elapsed, or the handler shut down.
    pub fn enqueue_command(
        &self,
        frame: Frame,
    ) -> impl std::future::Future<Output = Result<Frame>> + Send + 'static {
        let sender = self.command_tx.clone();
        async move {
            let (reply, response) = oneshot::channel();
            sender
                .send(CommandRequest { frame, reply })
                .map_err(|_| OwnError::ChannelClosed)?;
            response.await.map_err(|_| OwnError::ChannelClosed)?
        }
    }

    /// Request cooperative shutdown and wait for every task to exit.
    ///
    /// Each task notices the flag at its next loop iteration; in-flight
    /// command requests resolve with an error rather than hanging.
    pub async fn stop(&mut self) {
        if self.tasks.is_empty() {
            return;
        }
        debug!("{} stopping gateway handler", self.gateway.log_id());
        let _ = self.shutdown.send(true);
        join_all(std::mem::take(&mut self.tasks)).await;
        debug!("{} gateway handler stopped", self.gateway.log_id());
    }
}

/// Event listening task: keeps one event session alive for the handler's
/// lifetime, republishing every decodable frame.
async fn listening_loop<D: FrameDecoder>(
    gateway: Arc<Gateway>,
    decoder: Arc<D>,
    events: broadcast::Sender<GatewayEvent<D::Event>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut connected_before = false;

    'supervise: loop {
        // (Re)connect under the 60s-pause/unbounded supervision policy;
        // connect() itself applies the bounded refused budget per entry.
        let mut session = loop {
            let attempt = tokio::select! {
                biased;
                _ = shutdown.changed() => break 'supervise,
                attempt = GatewaySession::connect(Arc::clone(&gateway), SessionKind::Event) => attempt,
            };
            match attempt {
                Ok(session) => break session,
                Err(err) => {
                    error!(
                        "{} event session connection failed ({err}), retrying in {}s",
                        gateway.log_id(),
                        RESET_PAUSE.as_secs()
                    );
                    tokio::select! {
                        biased;
                        _ = shutdown.changed() => break 'supervise,
                        () = tokio::time::sleep(RESET_PAUSE) => {}
                    }
                }
            }
        };

        let signal = if connected_before {
            GatewayEvent::Reconnected
        } else {
            GatewayEvent::Connected
        };
        connected_before = true;
        let _ = events.send(signal);

        loop {
            let received = tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    session.close().await;
                    break 'supervise;
                }
                received = session.receive_frame() => received,
            };
            match received {
                Ok(frame) => match decoder.decode(&frame) {
                    Ok(event) => {
                        let _ = events.send(GatewayEvent::Message(event));
                    }
                    Err(err) => {
                        warn!("{} dropping frame `{frame}`: {err}", gateway.log_id());
                    }
                },
                Err(err) => {
                    warn!("{} event session lost: {err}", gateway.log_id());
                    session.close().await;
                    let _ = events.send(GatewayEvent::Disconnected);
                    continue 'supervise;
                }
            }
        }
    }

    debug!("{} listening worker terminated", gateway.log_id());
}

/// Command worker: drains the shared queue one request at a time over a
/// lazily (re)opened command session.
async fn command_worker(
    worker: usize,
    gateway: Arc<Gateway>,
    queue: CommandQueue,
    config: HandlerConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut session: Option<GatewaySession> = None;

    loop {
        let request = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            request = async { queue.lock().await.recv().await } => match request {
                Some(request) => request,
                None => break,
            },
        };

        let frame = request.frame.clone();
        let outcome = tokio::select! {
            biased;
            _ = shutdown.changed() => None,
            result = dispatch(&gateway, &mut session, &frame, &config) => Some(result),
        };
        let Some(result) = outcome else {
            // Shutting down mid-dispatch: resolve the request instead of
            // leaving the caller hanging.
            let _ = request.reply.send(Err(OwnError::ChannelClosed));
            break;
        };
        if result.is_err() {
            // The session is suspect after any failure; open fresh next time.
            if let Some(mut stale) = session.take() {
                stale.close().await;
            }
        }
        if request.reply.send(result).is_err() {
            debug!(
                "{} sending worker {worker}: requester went away",
                gateway.log_id()
            );
        }
    }

    if let Some(mut open) = session.take() {
        open.close().await;
    }
    debug!("{} sending worker {worker} terminated", gateway.log_id());
}

/// Send one command frame, reconnecting the worker's session when it is
/// not authenticated, and await a single response frame.
async fn dispatch(
    gateway: &Arc<Gateway>,
    slot: &mut Option<GatewaySession>,
    frame: &Frame,
    config: &HandlerConfig,
) -> Result<Frame> {
    let mut session = match slot.take() {
        Some(session) if session.is_authenticated() => session,
        _ => GatewaySession::connect(Arc::clone(gateway), SessionKind::Command).await?,
    };
    let result = async {
        session.send_frame(frame).await?;
        session.receive_frame_timeout(config.command_timeout()).await
    }
    .await;
    *slot = Some(session);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::RawDecoder;
    use crate::discovery::GatewayDescriptor;

    fn gateway() -> Gateway {
        Gateway::new(GatewayDescriptor {
            address: Some("127.0.0.1".to_string()),
            port: Some(1),
            ..GatewayDescriptor::default()
        })
    }

    #[tokio::test]
    async fn test_start_twice_is_an_error() {
        let mut handler = GatewayHandler::new(gateway(), RawDecoder, HandlerConfig::default());
        handler.start().unwrap();
        assert!(handler.start().is_err());
        handler.stop().await;
    }

    #[tokio::test]
    async fn test_stop_without_start_is_a_noop() {
        let mut handler = GatewayHandler::new(gateway(), RawDecoder, HandlerConfig::default());
        handler.stop().await;
    }

    #[tokio::test]
    async fn test_enqueue_after_stop_fails() {
        let mut handler = GatewayHandler::new(gateway(), RawDecoder, HandlerConfig::default());
        handler.start().unwrap();
        handler.stop().await;
        let err = handler
            .enqueue_command(Frame::from_payload("*1*1*12"))
            .await
            .unwrap_err();
        assert!(matches!(err, OwnError::ChannelClosed));
    }
}

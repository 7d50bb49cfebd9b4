//! Link lifecycle: connect, split reader/writer tasks, loss detection,
//! reconnection with backoff, and close.
//!
//! All transitions (connect, close, link loss, reconnect) serialize on one
//! async mutex. The current link lives in a small sync slot so the request
//! path can enqueue frames without awaiting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::{SinkExt, StreamExt};
use labnode_frame::{Frame, LabnodeCodec, Response};
use labnode_transport::{open, LabnodeStream, TransportError};
use tokio::io::{ReadHalf, WriteHalf};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::backoff::Backoff;
use crate::config::ClientConfig;
use crate::dispatcher::{FrameSink, LinkHandler};
use crate::error::{ClientError, Result};
use crate::event::{ClientEvent, DisconnectReason};

/// Observable link state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

/// A managed link to one device.
///
/// Cheap to clone; clones share the link.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

struct Shared {
    config: ClientConfig,
    handler: Arc<dyn LinkHandler>,
    events: broadcast::Sender<ClientEvent>,
    transition: tokio::sync::Mutex<()>,
    link: Mutex<Option<Link>>,
    state: watch::Sender<ConnectionState>,
    /// Cancelled by `close()`; every link token is a child of it.
    session: Mutex<CancellationToken>,
    generation: AtomicU64,
}

struct Link {
    generation: u64,
    outbound: mpsc::UnboundedSender<Frame>,
    cancel: CancellationToken,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

enum ReconnectOutcome {
    Installed,
    /// Someone else connected or closed while we waited.
    Superseded,
}

impl Connection {
    pub fn new(
        config: ClientConfig,
        handler: Arc<dyn LinkHandler>,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                config,
                handler,
                events,
                transition: tokio::sync::Mutex::new(()),
                link: Mutex::new(None),
                state,
                session: Mutex::new(CancellationToken::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Open the link. A no-op when already connected.
    pub async fn connect(&self) -> Result<()> {
        let shared = &self.shared;
        let _transition = shared.transition.lock().await;
        if shared.lock_link().is_some() {
            debug!("connect called on an open link");
            return Ok(());
        }

        let session = shared.renew_session();
        let mut connecting = ConnectingGuard::new(&shared.state);
        let endpoint = &shared.config.endpoint;
        debug!(%endpoint, timeout = ?shared.config.connect_timeout, "connecting");

        let stream = open(endpoint, shared.config.connect_timeout)
            .await
            .map_err(|err| {
                warn!(%endpoint, error = %err, "connect failed");
                ClientError::Connect(err)
            })?;

        shared.install(stream, &session);
        connecting.disarm();
        info!(%endpoint, "connected");
        let _ = shared.events.send(ClientEvent::Connected {
            endpoint: endpoint.to_string(),
        });
        Ok(())
    }

    /// Close the link and stop any reconnection. Safe to call repeatedly.
    pub async fn close(&self) {
        let shared = &self.shared;
        shared.session().cancel();

        let _transition = shared.transition.lock().await;
        let Some(link) = shared.lock_link().take() else {
            shared.state.send_replace(ConnectionState::Disconnected);
            return;
        };

        shared.state.send_replace(ConnectionState::Closing);
        link.cancel.cancel();
        // A task may be parked on the transition lock we hold; abort rather than wait.
        link.reader.abort();
        link.writer.abort();
        let _ = link.reader.await;
        let _ = link.writer.await;

        shared.state.send_replace(ConnectionState::Disconnected);
        let reason = DisconnectReason::Closed;
        shared.handler.on_disconnect(&reason);
        info!(endpoint = %shared.config.endpoint, "connection closed");
        let _ = shared.events.send(ClientEvent::Disconnected { reason });
    }

    /// Synchronous teardown for `Drop`.
    pub(crate) fn shutdown_now(&self) {
        let shared = &self.shared;
        shared.session().cancel();

        let link = shared.lock_link().take();
        if let Some(link) = link {
            link.cancel.cancel();
            link.reader.abort();
            link.writer.abort();
            let reason = DisconnectReason::Closed;
            shared.handler.on_disconnect(&reason);
            let _ = shared.events.send(ClientEvent::Disconnected { reason });
        }
        shared.state.send_replace(ConnectionState::Disconnected);
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.lock_link().is_some()
    }
}

impl FrameSink for Connection {
    fn send_frame(&self, frame: Frame) -> Result<()> {
        match self.shared.lock_link().as_ref() {
            Some(link) => link
                .outbound
                .send(frame)
                .map_err(|_| ClientError::NotConnected),
            None => Err(ClientError::NotConnected),
        }
    }
}

impl Shared {
    fn lock_link(&self) -> MutexGuard<'_, Option<Link>> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn session(&self) -> CancellationToken {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current session token, replaced first if a previous `close()` cancelled it.
    fn renew_session(&self) -> CancellationToken {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if session.is_cancelled() {
            *session = CancellationToken::new();
        }
        session.clone()
    }

    /// Split the stream, spawn its tasks and publish it. Caller holds the transition lock.
    fn install(self: &Arc<Self>, stream: LabnodeStream, session: &CancellationToken) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let max_payload = self.config.max_payload_size;
        let (read_half, write_half) = tokio::io::split(stream);
        let (outbound, queue) = mpsc::unbounded_channel();
        let cancel = session.child_token();

        let reader = tokio::spawn(read_loop(
            Arc::clone(self),
            generation,
            read_half,
            max_payload,
            cancel.clone(),
        ));
        let writer = tokio::spawn(write_loop(
            Arc::clone(self),
            generation,
            write_half,
            queue,
            max_payload,
            cancel.clone(),
        ));

        *self.lock_link() = Some(Link {
            generation,
            outbound,
            cancel,
            reader,
            writer,
        });
        self.state.send_replace(ConnectionState::Connected);
        trace!(generation, "link installed");
    }

    /// Tear down link `generation` after a read or write failure.
    async fn link_lost(self: &Arc<Self>, generation: u64, reason: DisconnectReason) {
        let _transition = self.transition.lock().await;
        let link = {
            let mut slot = self.lock_link();
            match slot.as_ref() {
                Some(link) if link.generation == generation => slot.take(),
                _ => None,
            }
        };
        // Stale: already replaced or closed.
        let Some(link) = link else {
            return;
        };

        // The calling task is one of the pair; the other exits on cancel.
        link.cancel.cancel();
        self.state.send_replace(ConnectionState::Disconnected);
        warn!(endpoint = %self.config.endpoint, %reason, "link lost");
        self.handler.on_disconnect(&reason);
        let _ = self.events.send(ClientEvent::Disconnected { reason });

        let session = self.session();
        if self.config.reconnect.enabled && !session.is_cancelled() {
            tokio::spawn(reconnect_loop(Arc::clone(self), session));
        }
    }

    async fn try_reconnect(
        self: &Arc<Self>,
        session: &CancellationToken,
    ) -> std::result::Result<ReconnectOutcome, TransportError> {
        let _transition = self.transition.lock().await;
        if session.is_cancelled() || self.lock_link().is_some() {
            return Ok(ReconnectOutcome::Superseded);
        }

        let mut connecting = ConnectingGuard::new(&self.state);
        let opened = tokio::select! {
            _ = session.cancelled() => return Ok(ReconnectOutcome::Superseded),
            opened = open(&self.config.endpoint, self.config.connect_timeout) => opened,
        };
        let stream = opened?;

        // Fail leftovers before the new link can carry fresh requests.
        self.handler.on_reconnect();
        self.install(stream, session);
        connecting.disarm();
        Ok(ReconnectOutcome::Installed)
    }
}

async fn read_loop(
    shared: Arc<Shared>,
    generation: u64,
    reader: ReadHalf<LabnodeStream>,
    max_payload: usize,
    cancel: CancellationToken,
) {
    let mut frames = FramedRead::new(reader, LabnodeCodec::new(max_payload));
    let reason = loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            next = frames.next() => match next {
                Some(Ok(frame)) => {
                    trace!(sequence = frame.sequence, function = frame.function, status = frame.status, "frame received");
                    shared.handler.on_response(Response::from(frame));
                }
                Some(Err(err)) if err.is_framing() => {
                    error!(error = %err, "corrupted frame; dropping link");
                    break DisconnectReason::Framing(err.to_string());
                }
                Some(Err(err)) => break DisconnectReason::Io(err.to_string()),
                None => break DisconnectReason::RemoteClosed,
            },
        }
    };
    shared.link_lost(generation, reason).await;
}

async fn write_loop(
    shared: Arc<Shared>,
    generation: u64,
    writer: WriteHalf<LabnodeStream>,
    mut queue: mpsc::UnboundedReceiver<Frame>,
    max_payload: usize,
    cancel: CancellationToken,
) {
    let mut sink = FramedWrite::new(writer, LabnodeCodec::new(max_payload));
    let reason = loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            next = queue.recv() => match next {
                Some(frame) => {
                    trace!(sequence = frame.sequence, function = frame.function, "frame sent");
                    if let Err(err) = sink.send(frame).await {
                        break DisconnectReason::Io(err.to_string());
                    }
                }
                None => return,
            },
        }
    };
    shared.link_lost(generation, reason).await;
}

async fn reconnect_loop(shared: Arc<Shared>, session: CancellationToken) {
    let mut backoff = Backoff::new(&shared.config.reconnect);
    let mut delay = backoff.next_delay();

    while let Some(wait) = delay {
        let attempt = backoff.attempt();
        tokio::select! {
            _ = session.cancelled() => return,
            _ = tokio::time::sleep(wait) => {}
        }

        match shared.try_reconnect(&session).await {
            Ok(ReconnectOutcome::Installed) => {
                info!(endpoint = %shared.config.endpoint, attempt, "reconnected");
                let _ = shared.events.send(ClientEvent::Reconnected { attempt });
                return;
            }
            Ok(ReconnectOutcome::Superseded) => return,
            Err(err) => {
                delay = delay_after_failure(&mut backoff, &err);
                warn!(attempt, error = %err, next_delay = ?delay, "reconnect attempt failed");
                let _ = shared.events.send(ClientEvent::ReconnectFailed {
                    attempt,
                    error: err.to_string(),
                    next_delay: delay,
                });
            }
        }
    }
    error!(
        endpoint = %shared.config.endpoint,
        attempts = backoff.attempt(),
        "giving up on reconnection"
    );
}

/// Next reconnect delay, or `None` when the policy is spent or the endpoint
/// cannot work no matter how often it is retried.
fn delay_after_failure(backoff: &mut Backoff, err: &TransportError) -> Option<std::time::Duration> {
    if !err.is_retryable() {
        return None;
    }
    backoff.next_delay()
}

/// Publishes `Connecting`, and `Disconnected` again unless disarmed.
struct ConnectingGuard<'a> {
    state: &'a watch::Sender<ConnectionState>,
    armed: bool,
}

impl<'a> ConnectingGuard<'a> {
    fn new(state: &'a watch::Sender<ConnectionState>) -> Self {
        state.send_replace(ConnectionState::Connecting);
        Self { state, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.send_replace(ConnectionState::Disconnected);
        }
    }
}

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use labnode_frame::Response;
use labnode_transport::Endpoint;
use tokio::sync::{broadcast, watch};

use crate::config::ClientConfig;
use crate::connection::{Connection, ConnectionState};
use crate::dispatcher::Dispatcher;
use crate::error::{ClientError, Result};
use crate::event::ClientEvent;

/// Shared handle to one device link.
///
/// Clones share the connection and the pending-call table, so any number of
/// tasks may call [`execute`](Self::execute) concurrently. Dropping the last
/// clone tears the link down and fails whatever is still outstanding.
#[derive(Clone)]
pub struct LabnodeClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    connection: Connection,
    dispatcher: Arc<Dispatcher>,
    events: broadcast::Sender<ClientEvent>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.connection.shutdown_now();
    }
}

impl LabnodeClient {
    /// Create a disconnected client. Fails on invalid configuration.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.event_capacity);
        let dispatcher = Arc::new(Dispatcher::new(
            config.sequence_space,
            config.max_payload_size,
            config.request_timeout,
            events.clone(),
        ));
        let connection = Connection::new(config.clone(), dispatcher.clone(), events.clone());

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                connection,
                dispatcher,
                events,
            }),
        })
    }

    /// Create a client and connect it.
    pub async fn connect_with(config: ClientConfig) -> Result<Self> {
        let client = Self::new(config)?;
        client.connect().await?;
        Ok(client)
    }

    /// Run `f` with a connected client, closing it on every exit path.
    ///
    /// The link is closed whether `f` returns `Ok` or `Err`; if the future is
    /// dropped midway, dropping the client releases the link instead.
    pub async fn scoped<F, Fut, T, E>(config: ClientConfig, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(LabnodeClient) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<ClientError>,
    {
        let client = Self::connect_with(config).await?;
        let result = f(client.clone()).await;
        client.close().await;
        result
    }

    /// Open the link. A no-op when already connected.
    pub async fn connect(&self) -> Result<()> {
        self.inner.connection.connect().await
    }

    /// Close the link, fail outstanding calls and stop reconnecting.
    pub async fn close(&self) {
        self.inner.connection.close().await;
    }

    /// Send one request and wait for its response.
    ///
    /// `timeout` overrides the configured default. Device error statuses
    /// surface as [`ClientError::Device`].
    pub async fn execute(
        &self,
        function: impl Into<u8>,
        payload: impl Into<Bytes>,
        timeout: Option<Duration>,
    ) -> Result<Response> {
        if !self.inner.connection.is_connected() {
            return Err(ClientError::NotConnected);
        }
        self.inner
            .dispatcher
            .execute(
                &self.inner.connection,
                function.into(),
                payload.into(),
                timeout,
            )
            .await
    }

    /// [`execute`](Self::execute) with the default timeout.
    pub async fn request(
        &self,
        function: impl Into<u8>,
        payload: impl Into<Bytes>,
    ) -> Result<Response> {
        self.execute(function, payload, None).await
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection.watch_state()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connection.is_connected()
    }

    /// Subscribe to lifecycle events. Only events sent after this call are seen.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    /// Calls currently awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.inner.dispatcher.pending()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.config.endpoint
    }
}

impl std::fmt::Debug for LabnodeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabnodeClient")
            .field("endpoint", &self.inner.config.endpoint)
            .field("state", &self.state())
            .field("pending", &self.pending_requests())
            .finish()
    }
}

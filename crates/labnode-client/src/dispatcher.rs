//! Request/response correlation.
//!
//! The dispatcher owns the pending-call table. Callers go through
//! [`Dispatcher::execute`]; the connection's read loop feeds responses back
//! through [`LinkHandler`].

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use labnode_frame::{check_payload_len, Frame, Request, Response};
use tokio::sync::{broadcast, oneshot, Semaphore};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::error::{ClientError, Result};
use crate::event::{ClientEvent, DisconnectReason};
use crate::pending::{PendingCall, PendingTable};

/// Outbound side of a link, as seen by the dispatcher.
pub trait FrameSink: Send + Sync {
    /// Queue a frame for writing. Fails with `NotConnected` when there is no link.
    fn send_frame(&self, frame: Frame) -> Result<()>;
}

/// Callbacks from a connection's read loop and lifecycle.
///
/// Implementations must not block: they run on the read loop.
pub trait LinkHandler: Send + Sync + 'static {
    /// A well-formed frame arrived.
    fn on_response(&self, response: Response);
    /// The link went down.
    fn on_disconnect(&self, reason: &DisconnectReason);
    /// A new link replaced a lost one.
    fn on_reconnect(&self);
}

pub struct Dispatcher {
    table: Mutex<PendingTable>,
    /// One permit per sequence number; bounds the calls in flight.
    slots: Semaphore,
    max_payload: usize,
    default_timeout: Duration,
    events: broadcast::Sender<ClientEvent>,
}

impl Dispatcher {
    pub fn new(
        sequence_space: u16,
        max_payload: usize,
        default_timeout: Duration,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        Self {
            table: Mutex::new(PendingTable::new(sequence_space)),
            slots: Semaphore::new(sequence_space.max(1) as usize),
            max_payload,
            default_timeout,
            events,
        }
    }

    /// Issue one request and wait for its outcome.
    ///
    /// Resolves exactly once: with the response, `Timeout`, or `ConnectionLost`.
    /// A non-success device status becomes `ClientError::Device`. Dropping the
    /// returned future removes the pending call; a late response is discarded.
    pub async fn execute(
        &self,
        sink: &dyn FrameSink,
        function: u8,
        payload: Bytes,
        timeout: Option<Duration>,
    ) -> Result<Response> {
        check_payload_len(payload.len(), self.max_payload).map_err(ClientError::Encoding)?;

        let timeout = timeout.unwrap_or(self.default_timeout);
        let deadline = deadline_after(timeout);

        // Waits while every sequence number is in use.
        let _permit = tokio::time::timeout_at(deadline, self.slots.acquire())
            .await
            .map_err(|_| ClientError::Timeout(timeout))?
            .map_err(|_| ClientError::NotConnected)?;

        let (slot, mut rx) = oneshot::channel();
        let (sequence, id) = {
            let mut table = self.lock_table();
            let sequence = table.allocate().ok_or(ClientError::NotConnected)?;
            let id = table.next_call_id();
            // Enqueue under the table lock so write order matches issue order.
            sink.send_frame(Request::new(sequence, function, payload).into_frame())?;
            table.insert(
                sequence,
                PendingCall {
                    id,
                    function,
                    deadline,
                    slot,
                },
            );
            (sequence, id)
        };
        let _guard = PendingGuard {
            dispatcher: self,
            sequence,
            id,
        };
        trace!(sequence, function, ?timeout, "request issued");

        let outcome = match tokio::time::timeout_at(deadline, &mut rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ClientError::ConnectionLost),
            Err(_) => {
                if self.lock_table().take_call(sequence, id).is_some() {
                    debug!(sequence, function, ?timeout, "request timed out");
                    Err(ClientError::Timeout(timeout))
                } else {
                    // Whoever took the call out of the table is about to resolve it.
                    rx.await.unwrap_or(Err(ClientError::ConnectionLost))
                }
            }
        };

        let response = outcome?;
        if !response.status.is_success() {
            return Err(ClientError::Device {
                code: response.status.0,
            });
        }
        Ok(response)
    }

    /// Number of calls currently awaiting a response.
    pub fn pending(&self) -> usize {
        self.lock_table().len()
    }

    /// Fail every outstanding call with `ConnectionLost`, clearing the table atomically.
    pub fn fail_all(&self) -> usize {
        let calls = self.lock_table().drain();
        let failed = calls.len();
        for (_, call) in calls {
            let _ = call.slot.send(Err(ClientError::ConnectionLost));
        }
        failed
    }

    fn lock_table(&self) -> MutexGuard<'_, PendingTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LinkHandler for Dispatcher {
    fn on_response(&self, response: Response) {
        let call = self.lock_table().take(response.sequence);
        match call {
            Some(call) => {
                if call.function != response.function {
                    warn!(
                        sequence = response.sequence,
                        expected = call.function,
                        received = response.function,
                        "response function differs from request"
                    );
                }
                if Instant::now() > call.deadline {
                    trace!(sequence = response.sequence, "response arrived past its deadline");
                }
                if call.slot.send(Ok(response)).is_err() {
                    debug!("caller stopped waiting before its response arrived");
                }
            }
            None => {
                warn!(
                    sequence = response.sequence,
                    function = response.function,
                    "discarding response with no pending request"
                );
                let _ = self.events.send(ClientEvent::UnmatchedResponse {
                    sequence: response.sequence,
                    function: response.function,
                });
            }
        }
    }

    fn on_disconnect(&self, reason: &DisconnectReason) {
        let failed = self.fail_all();
        if failed > 0 {
            debug!(failed, %reason, "failed outstanding requests");
        }
    }

    fn on_reconnect(&self) {
        // Nothing issued on the old link may be answered on the new one.
        self.fail_all();
    }
}

/// Stand-in deadline for timeouts too large to add to an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + FAR_FUTURE)
}

/// Removes the call from the table however `execute` exits.
struct PendingGuard<'a> {
    dispatcher: &'a Dispatcher,
    sequence: u8,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self
            .dispatcher
            .lock_table()
            .take_call(self.sequence, self.id)
            .is_some()
        {
            trace!(sequence = self.sequence, "pending request abandoned");
        }
    }
}

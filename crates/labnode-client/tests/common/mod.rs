//! Scripted fake device on a loopback TCP listener.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::BytesMut;
use futures_util::StreamExt;
use labnode_client::{ClientConfig, ReconnectConfig};
use labnode_frame::{encode_frame, Frame, LabnodeCodec, DEFAULT_MAX_PAYLOAD};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::codec::FramedRead;

/// What the device does with one request.
#[derive(Debug, Clone)]
pub enum Action {
    Reply {
        status: u8,
        payload: Vec<u8>,
        delay: Duration,
    },
    /// Reply with one checksum bit flipped.
    Corrupt,
    Ignore,
    /// Close the connection without replying.
    Hangup,
}

impl Action {
    pub fn ok(payload: impl Into<Vec<u8>>) -> Self {
        Action::Reply {
            status: 0,
            payload: payload.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn status(status: u8) -> Self {
        Action::Reply {
            status,
            payload: Vec::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn after(self, delay: Duration) -> Self {
        match self {
            Action::Reply {
                status, payload, ..
            } => Action::Reply {
                status,
                payload,
                delay,
            },
            other => other,
        }
    }
}

/// Decides the action for a request; the second argument is the connection index.
pub type Script = Arc<dyn Fn(&Frame, usize) -> Action + Send + Sync>;

struct DeviceState {
    connections: AtomicUsize,
    received: Mutex<Vec<Frame>>,
    kill: watch::Sender<u64>,
}

pub struct FakeDevice {
    addr: SocketAddr,
    state: Arc<DeviceState>,
    task: JoinHandle<()>,
}

impl FakeDevice {
    pub async fn start(script: impl Fn(&Frame, usize) -> Action + Send + Sync + 'static) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("fake device should bind");
        let addr = listener.local_addr().expect("listener has an address");
        let (kill, _) = watch::channel(0);
        let state = Arc::new(DeviceState {
            connections: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
            kill,
        });
        let task = tokio::spawn(serve(listener, Arc::new(script), Arc::clone(&state)));
        Self { addr, state, task }
    }

    /// Replies OK, echoing the request payload.
    pub async fn echo() -> Self {
        Self::start(|frame, _| Action::ok(frame.payload.to_vec())).await
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::tcp("127.0.0.1", self.port())
    }

    /// Config with fast reconnection.
    pub fn reconnecting_config(&self, max_attempts: u32) -> ClientConfig {
        self.config().with_reconnect(ReconnectConfig {
            enabled: true,
            base_delay: Duration::from_millis(20),
            multiplier: 2.0,
            max_delay: Duration::from_millis(200),
            max_attempts,
        })
    }

    /// Drop every open connection; the listener keeps accepting.
    pub fn hang_up_all(&self) {
        self.state.kill.send_modify(|generation| *generation += 1);
    }

    /// Stop listening and drop every connection.
    pub fn shutdown(&self) {
        self.task.abort();
    }

    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<Frame> {
        self.state.received.lock().expect("received lock").clone()
    }

    /// Wait until `count` requests have arrived.
    pub async fn wait_for_requests(&self, count: usize) -> Vec<Frame> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let received = self.received();
                if received.len() >= count {
                    return received;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("requests should arrive")
    }
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(listener: TcpListener, script: Script, state: Arc<DeviceState>) {
    let mut connections = JoinSet::new();
    loop {
        let Ok((socket, _)) = listener.accept().await else {
            return;
        };
        let index = state.connections.fetch_add(1, Ordering::SeqCst);
        connections.spawn(serve_connection(
            socket,
            index,
            Arc::clone(&script),
            Arc::clone(&state),
        ));
    }
}

async fn serve_connection(socket: TcpStream, index: usize, script: Script, state: Arc<DeviceState>) {
    let (read_half, mut write_half) = socket.into_split();
    let mut frames = FramedRead::new(read_half, LabnodeCodec::default());
    let mut kill = state.kill.subscribe();
    let (outbound, mut queue) = mpsc::unbounded_channel::<BytesMut>();
    let mut tasks = JoinSet::new();

    tasks.spawn(async move {
        while let Some(wire) = queue.recv().await {
            if write_half.write_all(&wire).await.is_err() {
                return;
            }
        }
    });

    loop {
        tokio::select! {
            _ = kill.changed() => return,
            next = frames.next() => {
                let Some(Ok(frame)) = next else {
                    return;
                };
                state.received.lock().expect("received lock").push(frame.clone());

                match script(&frame, index) {
                    Action::Reply { status, payload, delay } => {
                        let wire = encode(&Frame::new(frame.sequence, frame.function, status, payload));
                        if delay.is_zero() {
                            let _ = outbound.send(wire);
                        } else {
                            let outbound = outbound.clone();
                            tasks.spawn(async move {
                                tokio::time::sleep(delay).await;
                                let _ = outbound.send(wire);
                            });
                        }
                    }
                    Action::Corrupt => {
                        let mut wire = encode(&Frame::new(frame.sequence, frame.function, 0, frame.payload.clone()));
                        let last = wire.len() - 1;
                        wire[last] ^= 0x01;
                        let _ = outbound.send(wire);
                    }
                    Action::Ignore => {}
                    Action::Hangup => return,
                }
            }
        }
    }
}

fn encode(frame: &Frame) -> BytesMut {
    let mut wire = BytesMut::new();
    encode_frame(frame, DEFAULT_MAX_PAYLOAD, &mut wire).expect("reply should encode");
    wire
}

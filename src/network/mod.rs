//! Node runtime and the world around it
//!
//! A [`NanNode`] owns the protocol state and runs it on one tokio task. The
//! receive path and the timer both feed that task, so dispatch and scheduler
//! never run concurrently. Callers talk to it through a [`NodeHandle`]; the
//! radio driver pushes captured frames through a [`FrameSender`].

pub mod discovery;
pub mod medium;
pub mod radio;

pub use self::discovery::{OutboundMessage, PeerRecord, PeerSummary, PeerTable};
pub use self::medium::UdpMedium;
pub use self::radio::{Delivery, LogSink, MessageSink, Radio, RecordingRadio, RxMetadata};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::core::{Config, Error, MacAddr, Result};
use crate::protocol::{Dispatcher, LocalNodeState, NodeContext};
use crate::sync::{StatsSnapshot, SyncScheduler};
use crate::time::{Clock, MonotonicClock};

/// Work items for the node task
pub(crate) enum Command {
    Frame {
        frame: Bytes,
        meta: RxMetadata,
    },
    Queue {
        mac: MacAddr,
        payload: Bytes,
        reply: oneshot::Sender<Result<()>>,
    },
    Broadcast {
        payload: Bytes,
        reply: oneshot::Sender<Result<usize>>,
    },
    Snapshot(oneshot::Sender<StatsSnapshot>),
    Peers(oneshot::Sender<Vec<PeerSummary>>),
    SetDump(bool),
    Stop,
}

/// Entry point for captured frames
///
/// Never blocks: when the node's queue is full the frame is dropped and
/// counted.
#[derive(Clone)]
pub struct FrameSender {
    tx: mpsc::Sender<Command>,
    dropped: Arc<AtomicU64>,
}

impl FrameSender {
    pub(crate) fn new(tx: mpsc::Sender<Command>, dropped: Arc<AtomicU64>) -> Self {
        FrameSender { tx, dropped }
    }

    /// Queues a captured frame, returning false if it was not accepted
    pub fn on_frame(&self, frame: Bytes, meta: RxMetadata) -> bool {
        match self.tx.try_send(Command::Frame { frame, meta }) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Whether the node has stopped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Frames dropped because the node's queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Handle for talking to a running node
#[derive(Clone)]
pub struct NodeHandle {
    tx: mpsc::Sender<Command>,
}

impl NodeHandle {
    /// Queues `payload` for delivery at the peer's next sync beacon
    pub async fn queue_message(&self, mac: MacAddr, payload: impl Into<Bytes>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Queue {
            mac,
            payload: payload.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| stopped())?
    }

    /// Queues `payload` for every known peer, returning how many accepted it
    pub async fn broadcast(&self, payload: impl Into<Bytes>) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Broadcast {
            payload: payload.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| stopped())?
    }

    pub async fn snapshot(&self) -> Result<StatsSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot(reply)).await?;
        rx.await.map_err(|_| stopped())
    }

    pub async fn peers(&self) -> Result<Vec<PeerSummary>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Peers(reply)).await?;
        rx.await.map_err(|_| stopped())
    }

    /// Turns hex dumps of every frame on or off
    pub async fn set_dump(&self, dump: bool) -> Result<()> {
        self.send(Command::SetDump(dump)).await
    }

    /// Stops the node; the timer is not re-armed after this
    pub async fn stop(&self) -> Result<()> {
        self.send(Command::Stop).await
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.tx.send(command).await.map_err(|_| stopped())
    }
}

fn stopped() -> Error {
    Error::invalid_state("node is not running")
}

/// A NAN node: protocol state plus the task that drives it
pub struct NanNode {
    worker: Worker,
    tx: mpsc::Sender<Command>,
}

struct Worker {
    state: LocalNodeState,
    peers: PeerTable,
    dispatcher: Dispatcher,
    scheduler: SyncScheduler,
    radio: Arc<dyn Radio>,
    sink: Arc<dyn MessageSink>,
    clock: Arc<dyn Clock>,
    rx: mpsc::Receiver<Command>,
    dropped: Arc<AtomicU64>,
    startup_delay: std::time::Duration,
}

impl NanNode {
    pub fn new(config: Config, radio: Arc<dyn Radio>, sink: Arc<dyn MessageSink>) -> Result<Self> {
        Self::with_clock(config, radio, sink, Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(
        config: Config,
        radio: Arc<dyn Radio>,
        sink: Arc<dyn MessageSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let (tx, rx) = mpsc::channel(config.command_buffer);
        let state = LocalNodeState::from_config(&config);
        info!(
            mac = %state.mac,
            instance = state.instance_id.0,
            preference = state.master_preference,
            "NAN node created"
        );

        let worker = Worker {
            state,
            peers: PeerTable::new(config.peer_capacity, config.queue_capacity),
            dispatcher: Dispatcher::from_config(&config),
            scheduler: SyncScheduler::new(&config, clock.now()),
            radio,
            sink,
            clock,
            rx,
            dropped: Arc::new(AtomicU64::new(0)),
            startup_delay: config.startup_delay,
        };
        Ok(NanNode { worker, tx })
    }

    pub fn mac(&self) -> MacAddr {
        self.worker.state.mac
    }

    pub fn handle(&self) -> NodeHandle {
        NodeHandle { tx: self.tx.clone() }
    }

    pub fn frame_sender(&self) -> FrameSender {
        FrameSender::new(self.tx.clone(), self.worker.dropped.clone())
    }

    /// Runs until stopped or until every handle and frame sender is gone
    pub async fn run(self) -> Result<()> {
        let NanNode { worker, tx } = self;
        drop(tx);
        worker.run().await
    }
}

impl Worker {
    async fn run(mut self) -> Result<()> {
        info!(
            mac = %self.state.mac,
            delay_ms = self.startup_delay.as_millis() as u64,
            "NAN node running"
        );
        // Listen before the first tick so an existing cluster can be joined.
        let timer = sleep(self.startup_delay);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(Command::Stop) | None => break,
                    Some(command) => self.handle_command(command),
                },
                () = &mut timer => {
                    let delay = self.tick();
                    timer.as_mut().reset(Instant::now() + delay);
                }
            }
        }

        info!(mac = %self.state.mac, "NAN node stopped");
        Ok(())
    }

    fn tick(&mut self) -> std::time::Duration {
        self.state.counters.rx_dropped = self.dropped.load(Ordering::Relaxed);
        let mut ctx = NodeContext {
            node: &mut self.state,
            peers: &mut self.peers,
            radio: self.radio.as_ref(),
            sink: self.sink.as_ref(),
            clock: self.clock.as_ref(),
        };
        self.scheduler.tick(&mut ctx).delay
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Frame { frame, meta } => {
                let mut ctx = NodeContext {
                    node: &mut self.state,
                    peers: &mut self.peers,
                    radio: self.radio.as_ref(),
                    sink: self.sink.as_ref(),
                    clock: self.clock.as_ref(),
                };
                let disposition = self.dispatcher.handle_frame(&mut ctx, &frame, &meta);
                debug!(?disposition, len = frame.len(), "Frame handled");
            }
            Command::Queue { mac, payload, reply } => {
                let result = self.peers.enqueue(mac, payload, self.clock.now());
                if let Err(ref e) = result {
                    debug!(peer = %mac, "Message not queued: {}", e);
                }
                let _ = reply.send(result);
            }
            Command::Broadcast { payload, reply } => {
                let _ = reply.send(self.peers.enqueue_all(payload, self.clock.now()));
            }
            Command::Snapshot(reply) => {
                self.state.counters.rx_dropped = self.dropped.load(Ordering::Relaxed);
                let snapshot = self.scheduler.snapshot(&self.state, &self.peers, self.clock.now());
                let _ = reply.send(snapshot);
            }
            Command::Peers(reply) => {
                let _ = reply.send(self.peers.summaries());
            }
            Command::SetDump(dump) => {
                info!(dump, "Frame dump toggled");
                self.state.dump = dump;
            }
            Command::Stop => {}
        }
    }
}

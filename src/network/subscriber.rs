//! Channel subscription
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TcpSubscriber                            │
//! │  • Resolves the channel through a ChannelDirectory          │
//! │  • Receives frames on a background thread, reconnecting     │
//! │  • Keeps only the newest frame for the render thread        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;

use super::wire::{FrameReader, DEFAULT_MAX_FRAME_BYTES};
use super::{transport, ChannelDirectory, PipeFrame};
use crate::runtime::RuntimeFlag;

const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);
const READ_TIMEOUT: Duration = Duration::from_millis(100);
const RECONNECT_DELAY: Duration = Duration::from_millis(250);

/// Errors from binding a subscription
#[derive(Debug, Clone, Error)]
pub enum BindError {
    #[error("channel name is empty")]
    EmptyName,
    #[error("unknown channel '{0}'")]
    UnknownChannel(String),
    #[error("failed to resolve channel '{channel}': {reason}")]
    Resolve { channel: String, reason: String },
    #[error("transport runtime is not initialized")]
    TransportInactive,
    #[error("failed to start receive thread: {0}")]
    Spawn(String),
}

/// Source of frames for one channel at a time.
///
/// `receive` never blocks; it hands back the most recent frame that arrived
/// since the previous call, if any.
pub trait FrameSubscriber {
    /// Subscribe to `channel`, dropping any current subscription first.
    fn bind(&mut self, channel: &str) -> Result<(), BindError>;
    fn unbind(&mut self);
    fn is_bound(&self) -> bool;
    fn receive(&mut self) -> Option<PipeFrame>;
}

// =============================================================================
// TcpSubscriber
// =============================================================================

/// Shared state between receive thread and render thread.
struct SubscriberState {
    /// Newest undelivered frame.
    latest: Mutex<Option<PipeFrame>>,
    /// Whether the receive thread should keep running.
    running: AtomicBool,
    /// Whether a publisher connection is open.
    connected: AtomicBool,
    frames_received: AtomicU64,
    /// Frames overwritten before they were picked up.
    frames_dropped: AtomicU64,
    /// Frames discarded for inconsistent headers.
    frames_rejected: AtomicU64,
}

impl SubscriberState {
    fn new() -> Self {
        Self {
            latest: Mutex::new(None),
            running: AtomicBool::new(true),
            connected: AtomicBool::new(false),
            frames_received: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            frames_rejected: AtomicU64::new(0),
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn store(&self, frame: PipeFrame) {
        if let Ok(mut latest) = self.latest.lock() {
            if latest.replace(frame).is_some() {
                self.frames_dropped.fetch_add(1, Ordering::Relaxed);
            }
            self.frames_received.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Sleep for `duration`, waking early when asked to stop.
    fn pause(&self, duration: Duration) {
        let step = Duration::from_millis(25);
        let mut remaining = duration;
        while self.is_running() && !remaining.is_zero() {
            let slice = remaining.min(step);
            thread::sleep(slice);
            remaining -= slice;
        }
    }
}

/// Subscribes to a channel published over TCP.
///
/// Counters restart from zero on every bind.
pub struct TcpSubscriber {
    directory: ChannelDirectory,
    max_frame_bytes: usize,
    /// Must be active for `bind` to succeed
    runtime: &'static RuntimeFlag,
    state: Arc<SubscriberState>,
    thread_handle: Option<JoinHandle<()>>,
    channel: Option<String>,
}

impl TcpSubscriber {
    pub fn new(directory: ChannelDirectory) -> Self {
        Self::with_max_frame_bytes(directory, DEFAULT_MAX_FRAME_BYTES)
    }

    pub fn with_max_frame_bytes(directory: ChannelDirectory, max_frame_bytes: usize) -> Self {
        Self {
            directory,
            max_frame_bytes,
            runtime: transport::runtime(),
            state: Arc::new(SubscriberState::new()),
            thread_handle: None,
            channel: None,
        }
    }

    /// Gate binding on `runtime` instead of the process-wide transport.
    pub fn with_runtime(mut self, runtime: &'static RuntimeFlag) -> Self {
        self.runtime = runtime;
        self
    }

    /// Name of the bound channel.
    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    pub fn frames_received(&self) -> u64 {
        self.state.frames_received.load(Ordering::Acquire)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.state.frames_dropped.load(Ordering::Acquire)
    }

    pub fn frames_rejected(&self) -> u64 {
        self.state.frames_rejected.load(Ordering::Acquire)
    }

    /// Background receive loop.
    fn receive_loop(state: Arc<SubscriberState>, channel: &str, addr: SocketAddr, max_frame_bytes: usize) {
        let mut failures: u64 = 0;

        while state.is_running() {
            let stream = match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
                Ok(stream) => stream,
                Err(e) => {
                    if failures == 0 {
                        tracing::warn!("Pipe '{}': Cannot reach {}: {}", channel, addr, e);
                    }
                    failures += 1;
                    state.pause(RECONNECT_DELAY);
                    continue;
                }
            };

            if let Err(e) = stream.set_read_timeout(Some(READ_TIMEOUT)) {
                tracing::error!("Pipe '{}': Failed to set read timeout: {}", channel, e);
                state.pause(RECONNECT_DELAY);
                continue;
            }
            let _ = stream.set_nodelay(true);

            failures = 0;
            state.connected.store(true, Ordering::Release);
            tracing::info!("Pipe '{}': Connected to {}", channel, addr);

            let mut reader = FrameReader::new(stream, max_frame_bytes);
            let keep_going = || state.is_running();
            let mut first_frame_logged = false;

            loop {
                match reader.read_frame(&keep_going) {
                    Ok(Some(frame)) => {
                        if !first_frame_logged {
                            tracing::info!(
                                "Pipe '{}': First frame {}x{} ({:?})",
                                channel,
                                frame.width,
                                frame.height,
                                frame.encoding
                            );
                            first_frame_logged = true;
                        }
                        state.store(frame);

                        let received = state.frames_received.load(Ordering::Relaxed);
                        if received % 300 == 0 {
                            tracing::debug!(
                                "Pipe '{}': {} frames received, {} dropped, {} rejected",
                                channel,
                                received,
                                state.frames_dropped.load(Ordering::Relaxed),
                                state.frames_rejected.load(Ordering::Relaxed)
                            );
                        }
                    }
                    Ok(None) => break,
                    Err(e) if e.is_recoverable() => {
                        state.frames_rejected.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!("Pipe '{}': Discarding frame: {}", channel, e);
                    }
                    Err(e) => {
                        tracing::warn!("Pipe '{}': Connection lost: {}", channel, e);
                        break;
                    }
                }
            }

            state.connected.store(false, Ordering::Release);
            state.pause(RECONNECT_DELAY);
        }

        tracing::info!("Pipe '{}': Stopped receiving", channel);
    }
}

impl FrameSubscriber for TcpSubscriber {
    fn bind(&mut self, channel: &str) -> Result<(), BindError> {
        self.unbind();

        if !self.runtime.is_active() {
            return Err(BindError::TransportInactive);
        }
        let addr = self.directory.resolve(channel)?;

        let state = Arc::new(SubscriberState::new());
        let state_clone = Arc::clone(&state);
        let name_clone = channel.to_string();
        let max_frame_bytes = self.max_frame_bytes;

        let thread_handle = thread::Builder::new()
            .name(format!("pipe-recv-{}", channel))
            .spawn(move || {
                Self::receive_loop(state_clone, &name_clone, addr, max_frame_bytes);
            })
            .map_err(|e| BindError::Spawn(e.to_string()))?;

        tracing::info!("Pipe Subscriber: Bound to '{}' at {}", channel, addr);

        self.state = state;
        self.thread_handle = Some(thread_handle);
        self.channel = Some(channel.to_string());
        Ok(())
    }

    fn unbind(&mut self) {
        // Signal thread to stop
        self.state.running.store(false, Ordering::Release);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }

        if let Some(channel) = self.channel.take() {
            tracing::info!("Pipe Subscriber: Unbound from '{}'", channel);
        }
    }

    fn is_bound(&self) -> bool {
        self.thread_handle.is_some()
    }

    fn receive(&mut self) -> Option<PipeFrame> {
        self.state.latest.lock().ok()?.take()
    }
}

impl Drop for TcpSubscriber {
    fn drop(&mut self) {
        self.unbind();
    }
}

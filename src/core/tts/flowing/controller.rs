//! Session controller for flowing synthesis.
//!
//! All protocol state lives inside a single dispatch task; the public
//! [`FlowingSynthesizer`] handle only sends commands into it. That keeps
//! the state machine single-writer: channel events, sink completion
//! signals, and user commands are serialized through one `select!` loop,
//! so there is no window where an interruption races a queue pop.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until, timeout};
use tracing::{debug, info, warn};

use super::config::FlowingTtsConfig;
use super::messages::{
    RunSynthesisMessage, ServerEvent, StartSynthesisMessage, StopSynthesisMessage, fresh_id,
};
use super::transport::{ChannelEvent, ChannelSender, SynthChannel, SynthTransport, WsTransport};
use crate::audio::playback::{OutputConfig, PcmPlayer, PlaybackSurface};
use crate::audio::sink::{SampleSink, decode_pcm16le};
use crate::core::tts::base::{PlaybackCompleteCallback, TtsError, TtsResult};

/// Protocol state of the session currently driven on the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    /// No session in flight; the channel itself may still be open
    Idle,
    /// StartSynthesis sent, waiting for SynthesisStarted
    AwaitingStart,
    /// RunSynthesis sent, audio streaming in until SentenceEnd
    Synthesizing,
    /// StopSynthesis sent, waiting for SynthesisCompleted
    AwaitingCompleted,
}

enum Command {
    Enqueue(Vec<String>),
    Stop,
    Reset,
}

enum Input {
    Command(Option<Command>),
    Channel(Option<ChannelEvent>),
    SinkDrained,
    HandshakeTimeout,
}

/// Streaming synthesizer handle.
///
/// One handle drives one dispatch task; dropping the handle shuts the
/// task down along with any open channel.
pub struct FlowingSynthesizer {
    cmd_tx: mpsc::Sender<Command>,
    connected: Arc<AtomicBool>,
    interrupted: Arc<AtomicBool>,
    on_complete: Arc<Mutex<Option<PlaybackCompleteCallback>>>,
}

impl FlowingSynthesizer {
    /// Creates a synthesizer over an explicit transport, sink, and playback
    /// surface. Must be called from within a Tokio runtime.
    pub fn new(
        config: FlowingTtsConfig,
        transport: Arc<dyn SynthTransport>,
        sink: Arc<SampleSink>,
        completion_rx: mpsc::Receiver<()>,
        playback: Arc<dyn PlaybackSurface>,
    ) -> TtsResult<Self> {
        config.validate().map_err(TtsError::InvalidConfiguration)?;

        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let connected = Arc::new(AtomicBool::new(false));
        let interrupted = Arc::new(AtomicBool::new(false));
        let on_complete: Arc<Mutex<Option<PlaybackCompleteCallback>>> = Arc::new(Mutex::new(None));

        let task = ControllerTask {
            config,
            transport,
            sink,
            playback,
            connected: Arc::clone(&connected),
            interrupted: Arc::clone(&interrupted),
            on_complete: Arc::clone(&on_complete),
            queue: VecDeque::new(),
            state: SessionState::Idle,
            task_id: String::new(),
            sender: None,
            events: None,
            handshake_deadline: None,
            notified: false,
        };
        tokio::spawn(task.run(cmd_rx, completion_rx));

        Ok(Self {
            cmd_tx,
            connected,
            interrupted,
            on_complete,
        })
    }

    /// Creates a synthesizer with the production websocket transport and a
    /// cpal output stream on the default audio device.
    pub fn with_default_output(config: FlowingTtsConfig) -> TtsResult<Self> {
        let (sink, completion_rx) = SampleSink::new(config.sink_capacity());
        let player = PcmPlayer::spawn(
            Arc::clone(&sink),
            OutputConfig {
                sample_rate: config.base.sample_rate,
                channels: config.channels,
            },
        )?;
        Self::new(
            config,
            Arc::new(WsTransport),
            sink,
            completion_rx,
            Arc::new(player),
        )
    }

    /// Replaces the pending queue with `segments` and begins synthesizing.
    ///
    /// Empty and whitespace-only segments are discarded; if nothing usable
    /// remains this is a no-op. Any audio still buffered from a previous
    /// batch is flushed first.
    pub async fn enqueue(&self, segments: Vec<String>) {
        // clear the suppression flag up front so audio frames racing ahead
        // of the command are not thrown away
        self.interrupted.store(false, Ordering::Release);
        if self.cmd_tx.send(Command::Enqueue(segments)).await.is_err() {
            warn!("synthesizer task is gone, dropping enqueue");
        }
    }

    /// Interrupts playback and network activity immediately.
    ///
    /// The suppression flag is raised before the command is queued, so
    /// in-flight audio stops being accepted right away. A no-op when no
    /// channel is open.
    pub async fn stop(&self) {
        self.interrupted.store(true, Ordering::Release);
        if self.cmd_tx.send(Command::Stop).await.is_err() {
            warn!("synthesizer task is gone, dropping stop");
        }
    }

    /// Clears all client-side state without sending a network stop.
    /// Used when abandoning the current output to start a new request.
    pub async fn reset(&self) {
        if self.cmd_tx.send(Command::Reset).await.is_err() {
            warn!("synthesizer task is gone, dropping reset");
        }
    }

    /// Whether a channel to the gateway is currently open.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Registers the callback fired when an enqueued batch has been fully
    /// rendered by the audio clock. Replaces any previous callback.
    pub fn on_playback_complete(&self, callback: impl Fn() + Send + Sync + 'static) {
        *self.on_complete.lock() = Some(Box::new(callback));
    }
}

struct ControllerTask {
    config: FlowingTtsConfig,
    transport: Arc<dyn SynthTransport>,
    sink: Arc<SampleSink>,
    playback: Arc<dyn PlaybackSurface>,
    connected: Arc<AtomicBool>,
    interrupted: Arc<AtomicBool>,
    on_complete: Arc<Mutex<Option<PlaybackCompleteCallback>>>,
    queue: VecDeque<String>,
    state: SessionState,
    /// Task id of the live session; empty when no session is in flight
    task_id: String,
    sender: Option<ChannelSender>,
    events: Option<mpsc::Receiver<ChannelEvent>>,
    handshake_deadline: Option<Instant>,
    notified: bool,
}

impl ControllerTask {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<Command>,
        mut completion_rx: mpsc::Receiver<()>,
    ) {
        let mut sink_alive = true;
        loop {
            let deadline = self.handshake_deadline;
            let events = &mut self.events;
            let input = tokio::select! {
                command = cmd_rx.recv() => Input::Command(command),
                event = async {
                    match events.as_mut() {
                        Some(rx) => rx.recv().await,
                        None => std::future::pending().await,
                    }
                } => Input::Channel(event),
                signal = completion_rx.recv(), if sink_alive => {
                    match signal {
                        Some(()) => Input::SinkDrained,
                        // sink gone; nothing left to report
                        None => {
                            sink_alive = false;
                            continue;
                        }
                    }
                }
                _ = async {
                    match deadline {
                        Some(at) => sleep_until(at).await,
                        None => std::future::pending().await,
                    }
                } => Input::HandshakeTimeout,
            };

            match input {
                Input::Command(Some(Command::Enqueue(segments))) => {
                    self.handle_enqueue(segments).await;
                }
                Input::Command(Some(Command::Stop)) => self.handle_stop(),
                Input::Command(Some(Command::Reset)) => self.handle_reset(),
                Input::Command(None) => break,
                Input::Channel(Some(event)) => self.handle_channel_event(event).await,
                Input::Channel(None) => self.handle_channel_closed().await,
                Input::SinkDrained => self.handle_sink_drained(),
                Input::HandshakeTimeout => self.handle_handshake_timeout(),
            }
        }
        // handle dropped: tear the channel down like a stop would
        self.detach_channel();
        debug!("synthesizer task finished");
    }

    async fn handle_enqueue(&mut self, segments: Vec<String>) {
        let segments: Vec<String> = segments
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if segments.is_empty() {
            debug!("enqueue with no usable segments, ignoring");
            return;
        }

        info!(count = segments.len(), "enqueueing segments");
        self.interrupted.store(false, Ordering::Release);
        self.notified = false;
        self.queue = segments.into();
        self.sink.clear();
        self.playback.reset();

        if self.sender.is_some() {
            self.start_session();
        } else {
            self.open_channel().await;
        }
    }

    fn handle_stop(&mut self) {
        if self.sender.is_none() {
            debug!("stop with no open channel, ignoring");
            return;
        }
        info!("stopping synthesis");
        self.interrupted.store(true, Ordering::Release);
        self.queue.clear();
        if !self.task_id.is_empty() {
            // best effort; the channel is closed right after
            self.send_message(&StopSynthesisMessage::new(
                &self.task_id,
                &self.config.base.app_key,
            ));
        }
        self.sink.clear();
        self.playback.pause();
        self.detach_channel();
    }

    fn handle_reset(&mut self) {
        debug!("resetting synthesizer state");
        self.interrupted.store(false, Ordering::Release);
        self.queue.clear();
        self.notified = false;
        self.sink.clear();
        self.detach_channel();
    }

    async fn handle_channel_event(&mut self, event: ChannelEvent) {
        // everything inbound is suppressed between stop and the next enqueue
        if self.interrupted.load(Ordering::Acquire) {
            return;
        }
        match event {
            ChannelEvent::Text(text) => self.handle_server_event(&text).await,
            ChannelEvent::Binary(data) => {
                // binary frames carry no task id, so state is the only
                // filter: before RunSynthesis has been sent, any audio on
                // the wire belongs to a superseded session
                let streaming = matches!(
                    self.state,
                    SessionState::Synthesizing | SessionState::AwaitingCompleted
                );
                if data.is_empty() || !streaming {
                    return;
                }
                let samples = decode_pcm16le(&data);
                self.sink.push(&samples);
            }
            ChannelEvent::Closed => self.handle_channel_closed().await,
        }
    }

    async fn handle_server_event(&mut self, text: &str) {
        let event = match ServerEvent::parse(text) {
            Ok(event) => event,
            Err(e) => {
                warn!("unparseable server event: {e}");
                return;
            }
        };

        // a replaced or abandoned session keeps producing events for a
        // short while; drop anything not addressed to the live task
        if let Some(id) = event.task_id()
            && !self.task_id.is_empty()
            && id != self.task_id
        {
            debug!(stale = id, "ignoring event for stale task");
            return;
        }

        match event {
            ServerEvent::SynthesisStarted(_) => {
                if self.state != SessionState::AwaitingStart {
                    debug!(state = ?self.state, "unexpected SynthesisStarted, ignoring");
                    return;
                }
                self.handshake_deadline = None;
                self.state = SessionState::Synthesizing;
                match self.queue.pop_front() {
                    Some(text) => {
                        debug!(task_id = %self.task_id, "submitting segment");
                        self.send_message(&RunSynthesisMessage::new(
                            &self.task_id,
                            &self.config.base.app_key,
                            text,
                        ));
                    }
                    // session started with nothing to say; it idles until
                    // the next enqueue replaces it
                    None => debug!("session started with empty queue"),
                }
            }
            ServerEvent::SentenceEnd(_) => {
                if self.state != SessionState::Synthesizing {
                    return;
                }
                self.state = SessionState::AwaitingCompleted;
                self.send_message(&StopSynthesisMessage::new(
                    &self.task_id,
                    &self.config.base.app_key,
                ));
            }
            ServerEvent::SynthesisCompleted(_) => {
                debug!(task_id = %self.task_id, "session completed");
                self.state = SessionState::Idle;
                self.task_id.clear();
                self.handshake_deadline = None;
                if !self.queue.is_empty() {
                    // next segment, fresh session, same channel
                    self.start_session();
                } else if !self.sink.is_awaiting() {
                    // the clock already drained everything we pushed, so
                    // no further sink signal is coming
                    self.notify_playback_complete();
                }
            }
            ServerEvent::TaskFailed(header) => {
                warn!(
                    status = ?header.status,
                    status_text = ?header.status_text,
                    "synthesis task failed"
                );
                // the old channel is unusable; if segments remain, come
                // back with a fresh connection and session
                self.detach_channel();
                if !self.queue.is_empty() {
                    self.open_channel().await;
                }
            }
            ServerEvent::Unknown(raw) => debug!("ignoring unknown server event: {raw}"),
        }
    }

    async fn handle_channel_closed(&mut self) {
        info!("gateway channel closed");
        self.detach_channel();
        if self.interrupted.load(Ordering::Acquire) {
            return;
        }
        if !self.queue.is_empty() {
            // segments remain; reconnect and resume from the queue head.
            // the segment that was in flight is not replayed.
            self.open_channel().await;
        }
    }

    fn handle_sink_drained(&mut self) {
        if self.interrupted.load(Ordering::Acquire) {
            return;
        }
        // the signal can be stale by the time it is consumed: the clock may
        // have caught up between two frames, with more audio pushed since.
        // Trust the sink's current view, and require the protocol side to
        // have nothing further to deliver.
        if self.state == SessionState::Idle
            && self.queue.is_empty()
            && !self.sink.is_awaiting()
        {
            self.notify_playback_complete();
        }
    }

    fn handle_handshake_timeout(&mut self) {
        warn!(task_id = %self.task_id, "handshake timed out, forcing channel closed");
        self.queue.clear();
        self.detach_channel();
    }

    async fn open_channel(&mut self) {
        let url = self.config.build_websocket_url();
        let connect_timeout = Duration::from_secs(self.config.base.connect_timeout_secs);
        match timeout(connect_timeout, self.transport.open(&url)).await {
            Ok(Ok(SynthChannel { sender, events })) => {
                self.sender = Some(sender);
                self.events = Some(events);
                self.connected.store(true, Ordering::Release);
                self.start_session();
            }
            Ok(Err(e)) => {
                warn!("channel open failed: {e}");
                self.queue.clear();
            }
            Err(_) => {
                warn!("channel open timed out after {connect_timeout:?}");
                self.queue.clear();
            }
        }
    }

    /// Opens a new session on the already-open channel: fresh task id,
    /// StartSynthesis, and a handshake deadline.
    fn start_session(&mut self) {
        self.task_id = fresh_id();
        self.state = SessionState::AwaitingStart;
        self.handshake_deadline = Some(
            Instant::now() + Duration::from_secs(self.config.base.handshake_timeout_secs),
        );
        debug!(task_id = %self.task_id, "starting session");
        self.send_message(&StartSynthesisMessage::new(
            &self.task_id,
            &self.config.base.app_key,
            self.config.start_payload(),
        ));
    }

    fn send_message<T: Serialize>(&self, message: &T) {
        let Some(sender) = &self.sender else {
            return;
        };
        match serde_json::to_string(message) {
            Ok(json) => sender.send(json),
            Err(e) => warn!("failed to serialize control message: {e}"),
        }
    }

    /// Drops the channel halves and resets session state. Dropping the
    /// sender closes the websocket.
    fn detach_channel(&mut self) {
        self.handshake_deadline = None;
        self.state = SessionState::Idle;
        self.task_id.clear();
        self.events = None;
        if let Some(sender) = self.sender.take() {
            sender.close();
        }
        self.connected.store(false, Ordering::Release);
    }

    fn notify_playback_complete(&mut self) {
        if self.notified {
            return;
        }
        self.notified = true;
        info!("playback complete");
        if let Some(callback) = self.on_complete.lock().as_ref() {
            callback();
        }
    }
}

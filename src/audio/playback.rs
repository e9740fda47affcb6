//! cpal-backed output stream that drains the sample sink in real time.
//!
//! `cpal::Stream` is not `Send`, so the stream lives on a dedicated thread
//! that is driven over a command channel. The controller only ever talks to
//! the thread through [`PlaybackSurface`].

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, error, warn};

use crate::audio::sink::SampleSink;
use crate::core::tts::base::{TtsError, TtsResult};

/// Control interface over the playback clock.
///
/// `reset` tears the output stream down and rebuilds it in the playing
/// state; it is the way back to a running clock after `pause`.
pub trait PlaybackSurface: Send + Sync {
    fn pause(&self);
    fn resume(&self);
    fn reset(&self);
}

/// Output stream parameters.
#[derive(Debug, Clone, Copy)]
pub struct OutputConfig {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            sample_rate: crate::core::tts::flowing::DEFAULT_SAMPLE_RATE,
            channels: 1,
        }
    }
}

enum PlayerCommand {
    Pause,
    Resume,
    Reset,
    Shutdown,
}

/// Owns the audio thread; dropping it stops playback.
pub struct PcmPlayer {
    control_tx: mpsc::Sender<PlayerCommand>,
    thread: Option<thread::JoinHandle<()>>,
}

impl PcmPlayer {
    /// Spawns the playback thread and opens the default output device.
    /// Fails if no device is available or the stream cannot be built.
    pub fn spawn(sink: Arc<SampleSink>, config: OutputConfig) -> TtsResult<Self> {
        let (control_tx, control_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread = thread::Builder::new()
            .name("flowtts-playback".to_string())
            .spawn(move || run_player(sink, config, control_rx, ready_tx))
            .map_err(|e| TtsError::AudioDevice(format!("Failed to spawn playback thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                control_tx,
                thread: Some(thread),
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(TtsError::AudioDevice(
                    "Playback thread exited before reporting readiness".to_string(),
                ))
            }
        }
    }

    fn send(&self, command: PlayerCommand) {
        if self.control_tx.send(command).is_err() {
            warn!("playback thread is gone, dropping command");
        }
    }
}

impl PlaybackSurface for PcmPlayer {
    fn pause(&self) {
        self.send(PlayerCommand::Pause);
    }

    fn resume(&self) {
        self.send(PlayerCommand::Resume);
    }

    fn reset(&self) {
        self.send(PlayerCommand::Reset);
    }
}

impl Drop for PcmPlayer {
    fn drop(&mut self) {
        let _ = self.control_tx.send(PlayerCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn build_stream(sink: &Arc<SampleSink>, config: &OutputConfig) -> TtsResult<cpal::Stream> {
    let device = cpal::default_host()
        .default_output_device()
        .ok_or_else(|| TtsError::AudioDevice("No audio output device available".to_string()))?;

    let stream_config = cpal::StreamConfig {
        channels: config.channels,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let render_sink = Arc::clone(sink);
    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                render_sink.render(data);
            },
            |err| error!("audio output stream error: {err}"),
            None,
        )
        .map_err(|e| TtsError::AudioDevice(format!("Failed to build output stream: {e}")))?;

    stream
        .play()
        .map_err(|e| TtsError::AudioDevice(format!("Failed to start output stream: {e}")))?;

    Ok(stream)
}

fn run_player(
    sink: Arc<SampleSink>,
    config: OutputConfig,
    control_rx: mpsc::Receiver<PlayerCommand>,
    ready_tx: mpsc::Sender<TtsResult<()>>,
) {
    let mut stream = match build_stream(&sink, &config) {
        Ok(stream) => {
            let _ = ready_tx.send(Ok(()));
            Some(stream)
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    while let Ok(command) = control_rx.recv() {
        match command {
            PlayerCommand::Pause => {
                if let Some(stream) = &stream
                    && let Err(e) = stream.pause()
                {
                    warn!("failed to pause output stream: {e}");
                }
            }
            PlayerCommand::Resume => {
                if let Some(stream) = &stream
                    && let Err(e) = stream.play()
                {
                    warn!("failed to resume output stream: {e}");
                }
            }
            PlayerCommand::Reset => {
                // rebuild from scratch so a paused or errored stream comes
                // back in the playing state
                drop(stream.take());
                match build_stream(&sink, &config) {
                    Ok(rebuilt) => stream = Some(rebuilt),
                    Err(e) => error!("failed to rebuild output stream: {e}"),
                }
            }
            PlayerCommand::Shutdown => break,
        }
    }
    debug!("playback thread finished");
}

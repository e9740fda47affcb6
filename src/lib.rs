//! flowtts - streaming text-to-speech client with real-time playback.
//!
//! Drives flowing speech synthesis over a persistent websocket channel and
//! plays the returned PCM audio gaplessly through the default output
//! device. Segments are enqueued in batches; playback completion is
//! reported from the audio clock's side, once every delivered sample has
//! actually been rendered.
//!
//! # Example
//!
//! ```rust,ignore
//! use flowtts::{FlowingSynthesizer, FlowingTtsConfig, TtsConfig};
//!
//! let config = FlowingTtsConfig::from_base(TtsConfig {
//!     app_key: std::env::var("NLS_APP_KEY")?,
//!     token: std::env::var("NLS_TOKEN")?,
//!     ..Default::default()
//! });
//!
//! let synth = FlowingSynthesizer::with_default_output(config)?;
//! synth.on_playback_complete(|| println!("done speaking"));
//! synth.enqueue(vec![
//!     "First sentence to speak.".to_string(),
//!     "And a second one.".to_string(),
//! ]).await;
//! ```

pub mod audio;
pub mod core;

// Re-export commonly used items for convenience
pub use audio::{OutputConfig, PcmPlayer, PlaybackSurface, SampleSink};
pub use core::tts::{
    FlowingSynthesizer, FlowingTtsConfig, PlaybackCompleteCallback, TtsConfig, TtsError, TtsResult,
};

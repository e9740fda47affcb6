//! Real-time audio output: the shared sample sink and the cpal playback
//! surface that drains it.

pub mod playback;
pub mod sink;

pub use playback::{OutputConfig, PcmPlayer, PlaybackSurface};
pub use sink::{SampleSink, decode_pcm16le};

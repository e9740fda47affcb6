pub mod tts;

// Re-export commonly used types for convenience
pub use tts::{
    FlowingSynthesizer, FlowingTtsConfig, PlaybackCompleteCallback, TtsConfig, TtsError, TtsResult,
};

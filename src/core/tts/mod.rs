pub(crate) mod base;
pub mod flowing;

pub use base::{PlaybackCompleteCallback, TtsConfig, TtsError, TtsResult};
pub use flowing::{FlowingSynthesizer, FlowingTtsConfig};

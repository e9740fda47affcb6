//! Shared TTS types: errors, results, and the base configuration that
//! concrete synthesizer configurations build on.

use thiserror::Error;

/// Errors that can occur during TTS operations
#[derive(Error, Debug)]
pub enum TtsError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for TTS operations
pub type TtsResult<T> = Result<T, TtsError>;

/// Callback invoked once per enqueued batch when the audio clock has
/// rendered every sample the batch produced.
pub type PlaybackCompleteCallback = Box<dyn Fn() + Send + Sync>;

/// Base configuration shared by synthesizer providers.
#[derive(Debug, Clone)]
pub struct TtsConfig {
    /// Project credential sent in every control message header
    pub app_key: String,
    /// Access token appended to the websocket URL
    pub token: String,
    /// Gateway endpoint override; the provider default is used when `None`
    pub gateway_url: Option<String>,
    /// Requested voice; the provider default is used when `None`
    pub voice_id: Option<String>,
    /// PCM sample rate in Hz
    pub sample_rate: u32,
    /// Deadline for the websocket connect itself
    pub connect_timeout_secs: u64,
    /// Deadline for the session handshake (StartSynthesis round trip)
    pub handshake_timeout_secs: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            app_key: String::new(),
            token: String::new(),
            gateway_url: None,
            voice_id: None,
            sample_rate: super::flowing::DEFAULT_SAMPLE_RATE,
            connect_timeout_secs: 10,
            handshake_timeout_secs: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TtsConfig::default();
        assert!(config.app_key.is_empty());
        assert!(config.voice_id.is_none());
        assert_eq!(config.sample_rate, 24000);
        assert_eq!(config.connect_timeout_secs, 10);
    }

    #[test]
    fn test_error_display() {
        let err = TtsError::InvalidConfiguration("token is required".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid configuration: token is required"
        );
    }
}

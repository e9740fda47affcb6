//! Configuration for the flowing speech synthesizer.

use super::messages::StartSynthesisPayload;
use super::{
    DEFAULT_GATEWAY_URL, DEFAULT_PLATFORM, DEFAULT_VOICE, DEFAULT_VOLUME, MAX_BUFFER_SECS,
    MAX_SAMPLE_RATE, MIN_SAMPLE_RATE,
};
use crate::core::tts::base::TtsConfig;

/// Flowing synthesizer configuration.
#[derive(Debug, Clone)]
pub struct FlowingTtsConfig {
    /// Base TTS configuration (credentials, endpoint, sample rate)
    pub base: TtsConfig,
    /// Voice name
    pub voice: String,
    /// Volume, 0-100
    pub volume: u32,
    /// Speech rate adjustment, -500 to 500
    pub speech_rate: i32,
    /// Pitch adjustment, -500 to 500
    pub pitch_rate: i32,
    /// Whether the server should emit subtitle timing events
    pub enable_subtitle: bool,
    /// Platform tag reported to the gateway
    pub platform: String,
    /// Output channel count for the local playback stream
    pub channels: u16,
    /// Local buffer bound in seconds of audio
    pub max_buffer_secs: u32,
}

impl Default for FlowingTtsConfig {
    fn default() -> Self {
        Self::from_base(TtsConfig::default())
    }
}

impl FlowingTtsConfig {
    /// Creates a flowing configuration from a base TTS configuration.
    pub fn from_base(base: TtsConfig) -> Self {
        let voice = base
            .voice_id
            .clone()
            .unwrap_or_else(|| DEFAULT_VOICE.to_string());
        Self {
            base,
            voice,
            volume: DEFAULT_VOLUME,
            speech_rate: 0,
            pitch_rate: 0,
            enable_subtitle: false,
            platform: DEFAULT_PLATFORM.to_string(),
            channels: 1,
            max_buffer_secs: MAX_BUFFER_SECS,
        }
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    /// Sets the volume, clamped to the 0-100 range the gateway accepts.
    pub fn with_volume(mut self, volume: u32) -> Self {
        self.volume = volume.min(100);
        self
    }

    /// Sets the speech rate, clamped to -500..=500.
    pub fn with_speech_rate(mut self, speech_rate: i32) -> Self {
        self.speech_rate = speech_rate.clamp(-500, 500);
        self
    }

    /// Sets the pitch adjustment, clamped to -500..=500.
    pub fn with_pitch_rate(mut self, pitch_rate: i32) -> Self {
        self.pitch_rate = pitch_rate.clamp(-500, 500);
        self
    }

    pub fn with_subtitle(mut self, enable_subtitle: bool) -> Self {
        self.enable_subtitle = enable_subtitle;
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    /// Validates the configuration before any connection is attempted.
    pub fn validate(&self) -> Result<(), String> {
        if self.base.app_key.trim().is_empty() {
            return Err("app_key is required".to_string());
        }
        if self.base.token.trim().is_empty() {
            return Err("token is required".to_string());
        }
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.base.sample_rate) {
            return Err(format!(
                "sample_rate must be between {MIN_SAMPLE_RATE} and {MAX_SAMPLE_RATE}, got {}",
                self.base.sample_rate
            ));
        }
        if self.voice.trim().is_empty() {
            return Err("voice must not be empty".to_string());
        }
        if self.channels == 0 {
            return Err("channels must be at least 1".to_string());
        }
        if self.max_buffer_secs == 0 {
            return Err("max_buffer_secs must be at least 1".to_string());
        }
        Ok(())
    }

    /// Builds the websocket URL with the access token as a query parameter.
    pub fn build_websocket_url(&self) -> String {
        let base_url = self
            .base
            .gateway_url
            .as_deref()
            .unwrap_or(DEFAULT_GATEWAY_URL);

        let mut url = String::with_capacity(128);
        url.push_str(base_url);
        url.push_str("?token=");
        url.push_str(&self.base.token);
        url
    }

    /// StartSynthesis payload for a new session.
    pub fn start_payload(&self) -> StartSynthesisPayload {
        StartSynthesisPayload {
            voice: self.voice.clone(),
            format: "PCM",
            sample_rate: self.base.sample_rate,
            volume: self.volume,
            speech_rate: self.speech_rate,
            pitch_rate: self.pitch_rate,
            enable_subtitle: self.enable_subtitle,
            platform: self.platform.clone(),
        }
    }

    /// Sample capacity for the local sink given the configured bound.
    pub fn sink_capacity(&self) -> usize {
        self.base.sample_rate as usize * self.channels as usize * self.max_buffer_secs as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> FlowingTtsConfig {
        FlowingTtsConfig::from_base(TtsConfig {
            app_key: "test_app_key".to_string(),
            token: "test_token".to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_defaults() {
        let config = valid_config();
        assert_eq!(config.voice, "zhixiaoxia");
        assert_eq!(config.volume, 100);
        assert_eq!(config.speech_rate, 0);
        assert_eq!(config.pitch_rate, 0);
        assert!(!config.enable_subtitle);
        assert_eq!(config.base.sample_rate, 24000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_voice_id_from_base_wins_over_default() {
        let config = FlowingTtsConfig::from_base(TtsConfig {
            app_key: "k".to_string(),
            token: "t".to_string(),
            voice_id: Some("xiaoyun".to_string()),
            ..Default::default()
        });
        assert_eq!(config.voice, "xiaoyun");
    }

    #[test]
    fn test_builders_clamp() {
        let config = valid_config()
            .with_volume(500)
            .with_speech_rate(-9000)
            .with_pitch_rate(9000);
        assert_eq!(config.volume, 100);
        assert_eq!(config.speech_rate, -500);
        assert_eq!(config.pitch_rate, 500);
    }

    #[test]
    fn test_validate_missing_credentials() {
        let mut config = valid_config();
        config.base.token = String::new();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.base.app_key = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_sample_rate_bounds() {
        let mut config = valid_config();
        config.base.sample_rate = 4000;
        assert!(config.validate().is_err());
        config.base.sample_rate = 48000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_build_websocket_url_default_endpoint() {
        let config = valid_config();
        assert_eq!(
            config.build_websocket_url(),
            "wss://nls-gateway-cn-beijing.aliyuncs.com/ws/v1?token=test_token"
        );
    }

    #[test]
    fn test_build_websocket_url_override() {
        let mut config = valid_config();
        config.base.gateway_url = Some("wss://example.com/ws".to_string());
        assert_eq!(
            config.build_websocket_url(),
            "wss://example.com/ws?token=test_token"
        );
    }

    #[test]
    fn test_sink_capacity_scales_with_rate() {
        let mut config = valid_config();
        config.max_buffer_secs = 2;
        assert_eq!(config.sink_capacity(), 48000);
        config.channels = 2;
        assert_eq!(config.sink_capacity(), 96000);
    }
}

//! Flowing speech synthesis over a persistent websocket channel.
//!
//! The gateway exposes a `FlowingSpeechSynthesizer` namespace: the client
//! opens one websocket, then drives any number of synthesis sessions over
//! it, each identified by a fresh task id. Control messages are JSON text
//! frames; audio arrives as binary frames of raw mono s16le PCM.
//!
//! # Session flow
//!
//! ```text
//! client                     server
//!   | -- StartSynthesis -->    |
//!   | <-- SynthesisStarted --  |
//!   | -- RunSynthesis ------>  |
//!   | <== PCM binary frames == |
//!   | <-- SentenceEnd -------  |
//!   | -- StopSynthesis ----->  |
//!   | <-- SynthesisCompleted - |
//! ```
//!
//! [`FlowingSynthesizer`] walks its segment queue through that flow one
//! segment at a time and reports completion only once the audio clock has
//! rendered everything, not when the network goes quiet.

pub mod config;
pub mod controller;
pub mod messages;
pub mod transport;


pub use config::FlowingTtsConfig;
pub use controller::FlowingSynthesizer;
pub use messages::ServerEvent;
pub use transport::{ChannelEvent, ChannelSender, SynthChannel, SynthTransport, WsTransport};

/// Default gateway endpoint for flowing synthesis
pub const DEFAULT_GATEWAY_URL: &str = "wss://nls-gateway-cn-beijing.aliyuncs.com/ws/v1";

/// Protocol namespace carried in every control message header
pub const SYNTHESIZER_NAMESPACE: &str = "FlowingSpeechSynthesizer";

/// Default voice
pub const DEFAULT_VOICE: &str = "zhixiaoxia";

/// Default PCM sample rate in Hz
pub const DEFAULT_SAMPLE_RATE: u32 = 24000;

/// Default volume (0-100)
pub const DEFAULT_VOLUME: u32 = 100;

/// Platform tag reported in the StartSynthesis payload
pub const DEFAULT_PLATFORM: &str = "rust";

/// Upper bound on buffered audio, in seconds of playback
pub const MAX_BUFFER_SECS: u32 = 300;

/// Sample-rate bounds accepted by the gateway
pub const MIN_SAMPLE_RATE: u32 = 8000;
pub const MAX_SAMPLE_RATE: u32 = 48000;

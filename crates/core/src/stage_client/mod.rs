//! Typed clients for the three external processing services.
//!
//! Each service sits behind a trait so the orchestrator can be driven by the
//! HTTP implementations in production and by `crate::testing` mocks in tests:
//! - [`Transcriber`]: speech transcription + translation (`/translate`)
//! - [`Synthesizer`]: voice-cloned speech synthesis (`/synthesize_segments`)
//! - [`LipSyncer`]: lip synchronization (`/lipsync`)
//!
//! Calls are retried on transient failures only (see [`RetryPolicy`]).

mod asr;
mod error;
mod health;
mod http;
mod lipsync;
mod retry;
mod traits;
mod tts;
mod types;

pub use asr::HttpTranscriber;
pub use error::StageError;
pub use health::{check_services, AggregateHealth, HealthState, ServiceHealth};
pub use http::ServiceClient;
pub use lipsync::HttpLipSyncer;
pub use retry::{with_retry, RetryPolicy};
pub use traits::{LipSyncer, StageProgress, Synthesizer, Transcriber};
pub use tts::HttpSynthesizer;
pub use types::{
    LipSyncRequest, LipSyncedVideo, SynthesisRequest, SynthesizedAudio, Transcription,
    TranscriptionRequest, VoiceReference,
};

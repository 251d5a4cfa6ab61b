//! Request and result types for stage calls.

use std::path::PathBuf;

use crate::job::Segment;

/// Input to the transcription stage.
#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    pub job_id: String,
    /// Uploaded video (or audio) file.
    pub input: PathBuf,
    /// Source language hint, e.g. "en".
    pub source_language: String,
}

/// Output of the transcription stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcription {
    /// Translated segments in chronological order. Never empty.
    pub segments: Vec<Segment>,
    /// Full translated text, if the service returned it.
    pub text: String,
    /// Audio the service extracted from the input, usable as a voice reference.
    pub reference_audio: Option<PathBuf>,
}

/// Where the synthesizer gets the speaker's voice from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceReference {
    /// A ready-to-use WAV file.
    Audio(PathBuf),
    /// Extract a reference clip from the original input first.
    ExtractFrom(PathBuf),
}

/// Input to the synthesis stage.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub job_id: String,
    pub segments: Vec<Segment>,
    pub voice: VoiceReference,
    /// Where the dubbed audio track is written.
    pub output: PathBuf,
}

/// Output of the synthesis stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedAudio {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Input to the lip-sync stage.
#[derive(Debug, Clone)]
pub struct LipSyncRequest {
    pub job_id: String,
    pub video: PathBuf,
    pub audio: PathBuf,
    pub use_high_quality: bool,
    /// Where the final video is written.
    pub output: PathBuf,
}

/// Output of the lip-sync stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LipSyncedVideo {
    pub path: PathBuf,
    pub size_bytes: u64,
}

//! Core job data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Overall job status. Only moves forward: queued -> processing -> terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub const ALL: [JobStatus; 4] = [
        JobStatus::Queued,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
    ];
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage. Ordered: asr < tts < lipsync < done.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Asr,
    Tts,
    #[serde(rename = "lipsync")]
    LipSync,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Asr => "asr",
            Stage::Tts => "tts",
            Stage::LipSync => "lipsync",
            Stage::Done => "done",
        }
    }

    /// Progress band `[start, end]` this stage owns, in percent.
    ///
    /// The three processing stages split the bar in thirds.
    pub fn band(&self) -> (u8, u8) {
        match self {
            Stage::Asr => (0, 33),
            Stage::Tts => (33, 66),
            Stage::LipSync => (66, 100),
            Stage::Done => (100, 100),
        }
    }

    /// Scale a stage-local fraction (0.0 - 1.0) into the overall percentage.
    pub fn scale(&self, fraction: f32) -> u8 {
        let (start, end) = self.band();
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let span = f32::from(end - start);
        start + (span * fraction).floor() as u8
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One transcribed, translated line with its timing in seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl Segment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }
}

/// A dubbing job and its tracked state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub filename: String,
    pub size_bytes: u64,
    /// Use the higher-quality lip-sync model variant. Fixed at creation.
    pub use_high_quality: bool,
    pub status: JobStatus,
    /// `None` until the job leaves the queue.
    pub current_stage: Option<Stage>,
    pub progress_percent: u8,
    pub message: String,
    /// Chronological; written once by the transcription stage.
    pub segments: Vec<Segment>,
    /// Full translated text, written alongside the segments.
    pub transcript: String,
    pub error_reason: Option<String>,
    pub input_artifact: PathBuf,
    /// Intermediate dubbed audio, once synthesized.
    pub synthesized_audio: Option<PathBuf>,
    pub output_artifact: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Incremented on every committed update.
    pub revision: u64,
}

impl Job {
    /// File size in megabytes, rounded to two decimals.
    pub fn size_mb(&self) -> f64 {
        let mb = self.size_bytes as f64 / (1024.0 * 1024.0);
        (mb * 100.0).round() / 100.0
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_ordering() {
        assert!(Stage::Asr < Stage::Tts);
        assert!(Stage::Tts < Stage::LipSync);
        assert!(Stage::LipSync < Stage::Done);
    }

    #[test]
    fn test_stage_scale_within_band() {
        assert_eq!(Stage::Asr.scale(0.0), 0);
        assert_eq!(Stage::Asr.scale(1.0), 33);
        assert_eq!(Stage::Tts.scale(0.5), 49);
        assert_eq!(Stage::LipSync.scale(1.0), 100);
        // Out-of-range reports are clamped into the band
        assert_eq!(Stage::Tts.scale(7.0), 66);
        assert_eq!(Stage::Tts.scale(-1.0), 33);
        assert_eq!(Stage::Tts.scale(f32::NAN), 33);
    }

    #[test]
    fn test_stage_serialization() {
        assert_eq!(serde_json::to_string(&Stage::LipSync).unwrap(), "\"lipsync\"");
        assert_eq!(serde_json::to_string(&Stage::Done).unwrap(), "\"done\"");
        assert_eq!(
            serde_json::to_string(&JobStatus::Processing).unwrap(),
            "\"processing\""
        );
    }

    #[test]
    fn test_size_mb_rounding() {
        let job = Job {
            id: "a".into(),
            filename: "clip.mp4".into(),
            size_bytes: 5 * 1024 * 1024 + 123_456,
            use_high_quality: false,
            status: JobStatus::Queued,
            current_stage: None,
            progress_percent: 0,
            message: String::new(),
            segments: vec![],
            transcript: String::new(),
            error_reason: None,
            input_artifact: PathBuf::from("/tmp/a"),
            synthesized_audio: None,
            output_artifact: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            revision: 0,
        };
        assert_eq!(job.size_mb(), 5.12);
    }
}

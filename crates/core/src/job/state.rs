//! The job state machine.
//!
//! ```text
//! Queued -> Asr -> Tts -> LipSync -> Completed
//!    \        \      \       \
//!     +--------+------+-------+--> Failed
//! ```

use std::path::PathBuf;

use super::store::JobError;
use super::types::{Job, JobStatus, Segment, Stage};

/// A requested change to a job. Applied through [`Job::apply`].
#[derive(Debug, Clone)]
pub enum JobTransition {
    /// Enter a processing stage (asr, tts or lipsync).
    EnterStage { stage: Stage, message: String },
    /// Finer-grained progress reported by the current stage (0.0 - 1.0).
    StageProgress { fraction: f32, message: String },
    /// Transcription finished.
    SegmentsTranscribed {
        segments: Vec<Segment>,
        transcript: String,
    },
    /// Synthesis finished.
    AudioSynthesized { audio: PathBuf },
    /// Lip sync finished; the job is done.
    Completed { output: PathBuf },
    /// Terminal failure from any non-terminal state.
    Failed { reason: String },
}

impl JobTransition {
    pub fn name(&self) -> &'static str {
        match self {
            JobTransition::EnterStage { .. } => "enter_stage",
            JobTransition::StageProgress { .. } => "stage_progress",
            JobTransition::SegmentsTranscribed { .. } => "segments_transcribed",
            JobTransition::AudioSynthesized { .. } => "audio_synthesized",
            JobTransition::Completed { .. } => "completed",
            JobTransition::Failed { .. } => "failed",
        }
    }
}

impl Job {
    /// Apply a transition, or leave the job untouched and return
    /// [`JobError::InvalidTransition`].
    pub fn apply(&mut self, transition: &JobTransition) -> Result<(), JobError> {
        match transition {
            JobTransition::EnterStage { stage, message } => {
                let allowed = match stage {
                    Stage::Asr => self.status == JobStatus::Queued,
                    Stage::Tts => self.in_stage(Stage::Asr) && !self.segments.is_empty(),
                    Stage::LipSync => {
                        self.in_stage(Stage::Tts) && self.synthesized_audio.is_some()
                    }
                    Stage::Done => false,
                };
                if !allowed {
                    return Err(self.invalid(transition));
                }
                self.status = JobStatus::Processing;
                self.current_stage = Some(*stage);
                self.raise_progress(stage.band().0);
                self.message = message.clone();
            }
            JobTransition::StageProgress { fraction, message } => {
                let stage = match self.current_stage {
                    Some(stage) if self.status == JobStatus::Processing && stage != Stage::Done => {
                        stage
                    }
                    _ => return Err(self.invalid(transition)),
                };
                self.raise_progress(stage.scale(*fraction));
                self.message = message.clone();
            }
            JobTransition::SegmentsTranscribed {
                segments,
                transcript,
            } => {
                if !self.in_stage(Stage::Asr) || !self.segments.is_empty() {
                    return Err(self.invalid(transition));
                }
                self.segments = segments.clone();
                self.transcript = transcript.clone();
                self.raise_progress(Stage::Asr.band().1);
                self.message = format!("Transcribed {} segments", segments.len());
            }
            JobTransition::AudioSynthesized { audio } => {
                if !self.in_stage(Stage::Tts) {
                    return Err(self.invalid(transition));
                }
                self.synthesized_audio = Some(audio.clone());
                self.raise_progress(Stage::Tts.band().1);
                self.message = "Synthesized dubbed audio".to_string();
            }
            JobTransition::Completed { output } => {
                if !self.in_stage(Stage::LipSync) {
                    return Err(self.invalid(transition));
                }
                self.status = JobStatus::Completed;
                self.current_stage = Some(Stage::Done);
                self.output_artifact = Some(output.clone());
                self.progress_percent = 100;
                self.message = "Pipeline complete!".to_string();
            }
            JobTransition::Failed { reason } => {
                if self.is_terminal() {
                    return Err(self.invalid(transition));
                }
                self.status = JobStatus::Failed;
                self.error_reason = Some(reason.clone());
                self.message = format!("Pipeline failed: {}", reason);
            }
        }
        Ok(())
    }

    fn in_stage(&self, stage: Stage) -> bool {
        self.status == JobStatus::Processing && self.current_stage == Some(stage)
    }

    fn raise_progress(&mut self, percent: u8) {
        self.progress_percent = self.progress_percent.max(percent.min(100));
    }

    fn invalid(&self, transition: &JobTransition) -> JobError {
        JobError::InvalidTransition {
            job_id: self.id.clone(),
            from: match self.current_stage {
                Some(stage) => format!("{}/{}", self.status, stage),
                None => self.status.to_string(),
            },
            transition: transition.name(),
        }
    }
}

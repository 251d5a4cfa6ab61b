//! Pipeline integration tests.
//!
//! These tests drive complete jobs through the orchestrator with mock stage
//! clients: queued -> asr -> tts -> lipsync -> done, plus failure,
//! cancellation and progress streaming.

mod common;

use std::collections::HashSet;
use std::time::Duration;

use futures::StreamExt;

use common::TestHarness;
use dubbing_core::testing::fixtures;
use dubbing_core::{JobStatus, JobStore, Segment, Stage, StageError};

#[tokio::test]
async fn test_end_to_end_two_segments() {
    let harness = TestHarness::new();
    let orchestrator = harness.create_orchestrator(2);
    orchestrator.start().await;

    let job = harness.upload(&orchestrator, "talk.mp4", false).await;
    assert_eq!(job.status, JobStatus::Queued);
    assert!(job.current_stage.is_none());

    let job = harness.wait_for_terminal(&job.id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.current_stage, Some(Stage::Done));
    assert_eq!(job.progress_percent, 100);
    assert_eq!(
        job.segments,
        vec![
            Segment::new(0.0, 2.0, "hello"),
            Segment::new(2.0, 5.0, "world"),
        ]
    );
    assert_eq!(job.transcript, "hello world");
    assert!(job.error_reason.is_none());

    let output = job.output_artifact.clone().expect("completed job has output");
    assert_eq!(output, harness.artifacts.output_path(&job.id));
    assert!(output.exists());

    // The input was moved to its final location and passed to every stage.
    assert_eq!(job.input_artifact, harness.artifacts.input_path(&job.id, "talk.mp4"));
    let asr_calls = harness.transcriber.recorded_calls().await;
    assert_eq!(asr_calls.len(), 1);
    assert_eq!(asr_calls[0].input, job.input_artifact);
    assert_eq!(asr_calls[0].source_language, "en");

    let tts_calls = harness.synthesizer.recorded_calls().await;
    assert_eq!(tts_calls.len(), 1);
    assert_eq!(tts_calls[0].segments, fixtures::two_segments());

    let lipsync_calls = harness.lipsyncer.recorded_calls().await;
    assert_eq!(lipsync_calls.len(), 1);
    assert!(!lipsync_calls[0].use_high_quality);
    assert_eq!(lipsync_calls[0].video, job.input_artifact);
    assert_eq!(lipsync_calls[0].audio, harness.artifacts.audio_path(&job.id));

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_stage_order_and_progress_are_monotonic() {
    let harness = TestHarness::new();
    let orchestrator = harness.create_orchestrator(2);
    orchestrator.start().await;

    let job = harness.upload(&orchestrator, "talk.mp4", true).await;
    harness.wait_for_terminal(&job.id).await;

    let updates = harness.updates_for(&job.id);
    assert!(!updates.is_empty());

    let mut stages: Vec<Stage> = updates.iter().filter_map(|j| j.current_stage).collect();
    stages.dedup();
    assert_eq!(stages, vec![Stage::Asr, Stage::Tts, Stage::LipSync, Stage::Done]);

    for pair in updates.windows(2) {
        assert!(pair[0].revision < pair[1].revision);
        assert!(pair[0].progress_percent <= pair[1].progress_percent);
        assert!(pair[0].current_stage <= pair[1].current_stage);
    }

    // Stage entry lands on the band boundaries.
    let entered = |stage: Stage| {
        updates
            .iter()
            .find(|j| j.current_stage == Some(stage))
            .map(|j| j.progress_percent)
    };
    assert_eq!(entered(Stage::Asr), Some(0));
    assert_eq!(entered(Stage::Tts), Some(33));
    assert_eq!(entered(Stage::LipSync), Some(66));

    assert!(harness.lipsyncer.recorded_calls().await[0].use_high_quality);
    orchestrator.stop().await;
}

#[tokio::test]
async fn test_asr_failure_marks_job_failed() {
    let harness = TestHarness::new();
    harness
        .transcriber
        .set_next_error(StageError::malformed("transcription has no segments field"))
        .await;
    let orchestrator = harness.create_orchestrator(2);
    orchestrator.start().await;

    let job = harness.upload(&orchestrator, "talk.mp4", false).await;
    let job = harness.wait_for_terminal(&job.id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(
        job.error_reason.as_deref(),
        Some("asr_failed: malformed response: transcription has no segments field")
    );
    assert_eq!(job.current_stage, Some(Stage::Asr));
    assert!(job.segments.is_empty());
    assert!(job.output_artifact.is_none());
    assert!(harness.synthesizer.recorded_calls().await.is_empty());

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_empty_transcription_is_a_failure() {
    let harness = TestHarness::new();
    harness.transcriber.set_segments(Vec::new()).await;
    let orchestrator = harness.create_orchestrator(2);
    orchestrator.start().await;

    let job = harness.upload(&orchestrator, "silent.mp4", false).await;
    let job = harness.wait_for_terminal(&job.id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error_reason.unwrap().starts_with("asr_failed:"));
    assert!(harness.synthesizer.recorded_calls().await.is_empty());

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_tts_failure_keeps_segments() {
    let harness = TestHarness::new();
    harness
        .synthesizer
        .set_next_error(StageError::Rejected {
            status: 422,
            body: "reference audio too short".to_string(),
        })
        .await;
    let orchestrator = harness.create_orchestrator(2);
    orchestrator.start().await;

    let job = harness.upload(&orchestrator, "talk.mp4", false).await;
    let job = harness.wait_for_terminal(&job.id).await;

    assert_eq!(job.status, JobStatus::Failed);
    let reason = job.error_reason.clone().unwrap();
    assert!(reason.starts_with("tts_failed:"), "reason was {}", reason);
    assert!(reason.contains("422"));
    assert_eq!(job.current_stage, Some(Stage::Tts));
    assert_eq!(job.segments, fixtures::two_segments());
    assert!(job.output_artifact.is_none());
    assert!(harness.lipsyncer.recorded_calls().await.is_empty());

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_lipsync_failure_keeps_audio() {
    let harness = TestHarness::new();
    harness
        .lipsyncer
        .set_next_error(StageError::RetriesExhausted {
            attempts: 3,
            last: Box::new(StageError::ServerError {
                status: 503,
                body: "GPU busy".to_string(),
            }),
        })
        .await;
    let orchestrator = harness.create_orchestrator(2);
    orchestrator.start().await;

    let job = harness.upload(&orchestrator, "talk.mp4", false).await;
    let job = harness.wait_for_terminal(&job.id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error_reason.unwrap().starts_with("lipsync_failed:"));
    assert_eq!(job.segments.len(), 2);
    let audio = job.synthesized_audio.expect("tts output retained");
    assert!(audio.exists());
    assert!(job.output_artifact.is_none());

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_delete_processing_job_stops_further_stages() {
    let harness = TestHarness::new();
    harness.synthesizer.set_latency(Duration::from_secs(30)).await;
    let orchestrator = harness.create_orchestrator(2);
    orchestrator.start().await;

    let job = harness.upload(&orchestrator, "talk.mp4", false).await;
    let running = harness.wait_for_stage(&job.id, Stage::Tts).await;
    assert_eq!(running.status, JobStatus::Processing);

    let started = std::time::Instant::now();
    let deleted = orchestrator.delete_job(&job.id).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(deleted.status, JobStatus::Failed);
    assert_eq!(deleted.error_reason.as_deref(), Some("cancelled"));

    assert!(!orchestrator.is_active(&job.id));
    assert!(harness.store.get(&job.id).is_err());
    assert!(harness.store.list().unwrap().iter().all(|j| j.id != job.id));
    assert!(!running.input_artifact.exists());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.lipsyncer.calls_for(&job.id).await, 0);

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_delete_unknown_job() {
    let harness = TestHarness::new();
    let orchestrator = harness.create_orchestrator(2);
    orchestrator.start().await;

    let result = orchestrator.delete_job("does-not-exist").await;
    assert!(matches!(
        result,
        Err(dubbing_core::OrchestratorError::JobNotFound(_))
    ));

    // The orchestrator keeps working afterwards.
    let job = harness.upload(&orchestrator, "talk.mp4", false).await;
    let job = harness.wait_for_terminal(&job.id).await;
    assert_eq!(job.status, JobStatus::Completed);

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_delete_completed_job_removes_artifacts() {
    let harness = TestHarness::new();
    let orchestrator = harness.create_orchestrator(2);
    orchestrator.start().await;

    let job = harness.upload(&orchestrator, "talk.mp4", false).await;
    let job = harness.wait_for_terminal(&job.id).await;
    let output = job.output_artifact.clone().unwrap();
    assert!(output.exists());

    orchestrator.delete_job(&job.id).await.unwrap();
    assert!(!output.exists());
    assert!(!job.input_artifact.exists());
    assert!(!harness.artifacts.job_work_dir(&job.id).exists());

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_late_subscriber_gets_current_snapshot() {
    let harness = TestHarness::new();
    harness.lipsyncer.set_latency(Duration::from_secs(30)).await;
    let orchestrator = harness.create_orchestrator(2);
    orchestrator.start().await;

    let job = harness.upload(&orchestrator, "talk.mp4", false).await;
    harness.wait_for_stage(&job.id, Stage::LipSync).await;

    let mut subscription = harness.broadcaster.subscribe(&job.id).unwrap();
    let first = subscription.next().await.unwrap();
    assert_eq!(first.status, JobStatus::Processing);
    assert_eq!(first.stage, Some(Stage::LipSync));
    assert!(first.progress >= 66);

    // Deleting closes the stream after the cancellation event.
    orchestrator.delete_job(&job.id).await.unwrap();
    let rest: Vec<_> = subscription.into_stream().collect().await;
    assert!(rest.iter().all(|e| e.seq > first.seq));
    if let Some(last) = rest.last() {
        assert_eq!(last.status, JobStatus::Failed);
    }

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_subscriber_receives_live_events_until_terminal() {
    let harness = TestHarness::new();
    harness.transcriber.set_latency(Duration::from_millis(50)).await;
    let orchestrator = harness.create_orchestrator(2);
    orchestrator.start().await;

    let job = harness.upload(&orchestrator, "talk.mp4", false).await;
    let subscription = harness.broadcaster.subscribe(&job.id).unwrap();

    let events: Vec<_> = tokio::time::timeout(
        Duration::from_secs(10),
        subscription.into_stream().collect::<Vec<_>>(),
    )
    .await
    .expect("stream should end once the job completes");

    assert!(events.len() >= 2);
    assert!(events.windows(2).all(|w| w[0].seq < w[1].seq));
    assert!(events.windows(2).all(|w| w[0].progress <= w[1].progress));
    let last = events.last().unwrap();
    assert_eq!(last.status, JobStatus::Completed);
    assert_eq!(last.stage, Some(Stage::Done));
    assert_eq!(last.progress, 100);
    assert!(events[..events.len() - 1].iter().all(|e| !e.is_terminal()));

    // Terminal jobs release their channel.
    assert_eq!(harness.broadcaster.channel_count(), 0);
    orchestrator.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fifty_concurrent_jobs_stay_isolated() {
    let harness = TestHarness::new();
    let (min, max) = (Duration::from_millis(1), Duration::from_millis(30));
    harness.transcriber.set_random_latency(min, max).await;
    harness.synthesizer.set_random_latency(min, max).await;
    harness.lipsyncer.set_random_latency(min, max).await;
    harness
        .transcriber
        .set_segments_fn(|request| {
            vec![
                Segment::new(0.0, 1.0, format!("first line of {}", request.job_id)),
                Segment::new(1.0, 2.5, format!("second line of {}", request.job_id)),
            ]
        })
        .await;

    let orchestrator = harness.create_orchestrator(0);
    orchestrator.start().await;

    let mut ids = Vec::new();
    for i in 0..50 {
        let job = harness
            .upload(&orchestrator, &format!("clip-{}.mp4", i), i % 2 == 0)
            .await;
        ids.push(job.id);
    }
    assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 50);

    for id in &ids {
        let job = harness.wait_for_terminal(id).await;
        assert_eq!(job.status, JobStatus::Completed, "job {} failed: {:?}", id, job.error_reason);
        assert_eq!(job.segments.len(), 2);
        assert!(job.segments.iter().all(|s| s.text.ends_with(id.as_str())));

        let output = std::fs::read_to_string(job.output_artifact.unwrap()).unwrap();
        assert!(output.contains(&format!("job={}", id)));
        assert!(output.contains(&format!("mock-audio job={}", id)));
        assert!(output.contains(&format!("hd={}", job.use_high_quality)));
    }

    let status = orchestrator.status().await;
    assert_eq!(status.completed, 50);
    assert_eq!(status.processing, 0);

    orchestrator.stop().await;
}

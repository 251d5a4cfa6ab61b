//! In-memory job registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::Utc;

use super::store::{CreateJobRequest, JobError, JobStore};
use super::types::{Job, JobStatus};

/// One registry slot. The mutex serializes updates for this job only.
#[derive(Debug)]
struct Entry {
    /// Insertion order, used to break `created_at` ties in listings.
    seq: u64,
    job: Mutex<Job>,
}

/// Job store backed by a map of individually locked entries.
///
/// The map lock is only held to look up, insert or remove entries; updates
/// to different jobs proceed in parallel.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, Arc<Entry>>>,
    next_seq: AtomicU64,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, id: &str) -> Result<Arc<Entry>, JobError> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        jobs.get(id)
            .cloned()
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }
}

impl JobStore for InMemoryJobStore {
    fn create(&self, request: CreateJobRequest) -> Result<Job, JobError> {
        let now = Utc::now();
        let job = Job {
            id: uuid::Uuid::new_v4().to_string(),
            filename: request.filename,
            size_bytes: request.size_bytes,
            use_high_quality: request.use_high_quality,
            status: JobStatus::Queued,
            current_stage: None,
            progress_percent: 0,
            message: "Queued".to_string(),
            segments: Vec::new(),
            transcript: String::new(),
            error_reason: None,
            input_artifact: request.input_artifact,
            synthesized_audio: None,
            output_artifact: None,
            created_at: now,
            updated_at: now,
            revision: 0,
        };

        let entry = Arc::new(Entry {
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            job: Mutex::new(job.clone()),
        });

        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        if jobs.contains_key(&job.id) {
            return Err(JobError::Storage(format!("duplicate job id {}", job.id)));
        }
        jobs.insert(job.id.clone(), entry);
        Ok(job)
    }

    fn get(&self, id: &str) -> Result<Job, JobError> {
        let entry = self.entry(id)?;
        let job = entry.job.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(job.clone())
    }

    fn list(&self) -> Result<Vec<Job>, JobError> {
        let entries: Vec<Arc<Entry>> = {
            let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
            jobs.values().cloned().collect()
        };

        let mut snapshot: Vec<(u64, Job)> = entries
            .iter()
            .map(|entry| {
                let job = entry.job.lock().unwrap_or_else(PoisonError::into_inner);
                (entry.seq, job.clone())
            })
            .collect();

        snapshot.sort_by(|(seq_a, a), (seq_b, b)| {
            b.created_at.cmp(&a.created_at).then(seq_b.cmp(seq_a))
        });

        Ok(snapshot.into_iter().map(|(_, job)| job).collect())
    }

    fn update(
        &self,
        id: &str,
        mutator: &mut dyn FnMut(&mut Job) -> Result<(), JobError>,
    ) -> Result<Job, JobError> {
        let entry = self.entry(id)?;
        let mut job = entry.job.lock().unwrap_or_else(PoisonError::into_inner);

        let mut working = job.clone();
        mutator(&mut working)?;
        working.revision = job.revision + 1;
        working.updated_at = Utc::now();

        *job = working.clone();
        Ok(working)
    }

    fn delete(&self, id: &str) -> Result<Job, JobError> {
        let entry = {
            let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
            jobs.remove(id)
                .ok_or_else(|| JobError::NotFound(id.to_string()))?
        };
        let job = entry.job.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(job.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobTransition, Stage};
    use std::path::PathBuf;
    use std::thread;

    fn request(name: &str) -> CreateJobRequest {
        CreateJobRequest {
            filename: name.to_string(),
            size_bytes: 2048,
            use_high_quality: false,
            input_artifact: PathBuf::from(format!("/uploads/{}", name)),
        }
    }

    #[test]
    fn test_create_and_get() {
        let store = InMemoryJobStore::new();
        let job = store.create(request("a.mp4")).unwrap();

        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.current_stage.is_none());
        assert_eq!(job.progress_percent, 0);

        let fetched = store.get(&job.id).unwrap();
        assert_eq!(fetched.id, job.id);
        assert_eq!(fetched.filename, "a.mp4");
    }

    #[test]
    fn test_ids_are_unique() {
        let store = InMemoryJobStore::new();
        let a = store.create(request("a.mp4")).unwrap();
        let b = store.create(request("a.mp4")).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_get_unknown_is_not_found() {
        let store = InMemoryJobStore::new();
        assert!(matches!(store.get("nope"), Err(JobError::NotFound(_))));
        assert!(matches!(store.delete("nope"), Err(JobError::NotFound(_))));
        assert!(matches!(
            store.update("nope", &mut |_| Ok(())),
            Err(JobError::NotFound(_))
        ));
    }

    #[test]
    fn test_list_most_recent_first() {
        let store = InMemoryJobStore::new();
        let first = store.create(request("1.mp4")).unwrap();
        let second = store.create(request("2.mp4")).unwrap();
        let third = store.create(request("3.mp4")).unwrap();

        let ids: Vec<String> = store.list().unwrap().into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![third.id, second.id, first.id]);
    }

    #[test]
    fn test_update_bumps_revision() {
        let store = InMemoryJobStore::new();
        let job = store.create(request("a.mp4")).unwrap();
        let updated = store
            .update(&job.id, &mut |j| {
                j.message = "hello".into();
                Ok(())
            })
            .unwrap();
        assert_eq!(updated.revision, 1);
        assert_eq!(store.get(&job.id).unwrap().message, "hello");
    }

    #[test]
    fn test_failed_mutator_commits_nothing() {
        let store = InMemoryJobStore::new();
        let job = store.create(request("a.mp4")).unwrap();
        let result = store.update(&job.id, &mut |j| {
            j.message = "half-written".into();
            Err(JobError::Storage("nope".into()))
        });
        assert!(result.is_err());

        let fetched = store.get(&job.id).unwrap();
        assert_eq!(fetched.message, "Queued");
        assert_eq!(fetched.revision, 0);
    }

    #[test]
    fn test_transition_goes_through_state_machine() {
        let store = InMemoryJobStore::new();
        let job = store.create(request("a.mp4")).unwrap();
        let err = store
            .transition(
                &job.id,
                &JobTransition::EnterStage {
                    stage: Stage::Tts,
                    message: "skip".into(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, JobError::InvalidTransition { .. }));

        let job = store
            .transition(
                &job.id,
                &JobTransition::EnterStage {
                    stage: Stage::Asr,
                    message: "go".into(),
                },
            )
            .unwrap();
        assert_eq!(job.status, JobStatus::Processing);
    }

    #[test]
    fn test_delete_removes_from_list() {
        let store = InMemoryJobStore::new();
        let keep = store.create(request("keep.mp4")).unwrap();
        let gone = store.create(request("gone.mp4")).unwrap();

        let deleted = store.delete(&gone.id).unwrap();
        assert_eq!(deleted.filename, "gone.mp4");

        let jobs = store.list().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, keep.id);
        assert_eq!(store.count(None).unwrap(), 1);
    }

    #[test]
    fn test_concurrent_updates_are_serialized() {
        let store = Arc::new(InMemoryJobStore::new());
        let job = store.create(request("a.mp4")).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let id = job.id.clone();
                thread::spawn(move || {
                    for _ in 0..250 {
                        store
                            .update(&id, &mut |j| {
                                j.size_bytes += 1;
                                Ok(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let job = store.get(&job.id).unwrap();
        assert_eq!(job.size_bytes, 2048 + 8 * 250);
        assert_eq!(job.revision, 8 * 250);
    }

    #[test]
    fn test_count_by_status() {
        let store = InMemoryJobStore::new();
        let a = store.create(request("a.mp4")).unwrap();
        store.create(request("b.mp4")).unwrap();
        store
            .transition(
                &a.id,
                &JobTransition::Failed {
                    reason: "cancelled".into(),
                },
            )
            .unwrap();

        assert_eq!(store.count(Some(JobStatus::Queued)).unwrap(), 1);
        assert_eq!(store.count(Some(JobStatus::Failed)).unwrap(), 1);
        assert_eq!(store.count(None).unwrap(), 2);
    }
}

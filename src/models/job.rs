use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::document::DocumentStatus;

/// `Job` status mirrors `DocumentStatus` (spec §3) but is tracked
/// independently by the job manager, which owns no document rows.
pub type JobStatus = DocumentStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub document_id: Uuid,
    pub owner_id: String,
    pub options: JobOptions,
    pub status: JobStatus,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobOptions {
    pub mode: Option<super::document::ProcessingMode>,
}

impl Job {
    /// Job id deterministically derived from (timestamp, content hash) so
    /// identical submissions within the dedup window are idempotent
    /// (spec §4.9, §8 "submit idempotence").
    pub fn derive_id(owner_id: &str, file_hash: &str, window_start: DateTime<Utc>) -> String {
        use sha2::{Digest, Sha256};
        let bucket = window_start.timestamp() / 60;
        let mut hasher = Sha256::new();
        hasher.update(owner_id.as_bytes());
        hasher.update(file_hash.as_bytes());
        hasher.update(bucket.to_be_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn new(document_id: Uuid, owner_id: impl Into<String>, options: JobOptions, id: String) -> Self {
        Self {
            id,
            document_id,
            owner_id: owner_id.into(),
            options,
            status: JobStatus::Queued,
            progress: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            retry_count: 0,
        }
    }

    /// Progress contract from spec §4.8: monotonic, never decreases.
    pub fn set_progress(&mut self, value: u8) {
        if value as i16 >= self.progress as i16 {
            self.progress = value.min(100);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_id_is_stable_within_the_same_minute_bucket() {
        let t = Utc::now();
        let a = Job::derive_id("owner-1", "hash-abc", t);
        let b = Job::derive_id("owner-1", "hash-abc", t);
        assert_eq!(a, b);
    }

    #[test]
    fn progress_never_decreases() {
        let mut job = Job::new(Uuid::new_v4(), "owner-1", JobOptions::default(), "job-1".into());
        job.set_progress(50);
        job.set_progress(20);
        assert_eq!(job.progress, 50);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Document processing state machine (spec §4.8):
/// `queued -> processing -> (completed | failed | cancelled)`, plus any
/// state -> `cancelled` for explicit cancel requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl DocumentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled
        )
    }

    /// Whether `next` is a legal transition from `self` per §4.8.
    pub fn can_transition_to(&self, next: DocumentStatus) -> bool {
        use DocumentStatus::*;
        match (self, next) {
            (_, Cancelled) => !self.is_terminal(),
            (Queued, Processing) => true,
            (Processing, Completed) | (Processing, Failed) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    AccuracyFirst,
    CostEffective,
    SpeedFirst,
}

impl Default for ProcessingMode {
    fn default() -> Self {
        Self::CostEffective
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub owner_id: String,
    pub filename: String,
    pub media_type: String,
    pub byte_size: u64,
    pub file_hash: String,
    pub status: DocumentStatus,
    pub mode: ProcessingMode,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub dedup_fingerprint: Option<String>,
}

impl Document {
    pub fn new(
        owner_id: impl Into<String>,
        filename: impl Into<String>,
        media_type: impl Into<String>,
        byte_size: u64,
        file_hash: impl Into<String>,
        mode: ProcessingMode,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            filename: filename.into(),
            media_type: media_type.into(),
            byte_size,
            file_hash: file_hash.into(),
            status: DocumentStatus::Queued,
            mode,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_kind: None,
            error_message: None,
            dedup_fingerprint: None,
        }
    }

    pub fn mark_started(&mut self) {
        self.status = DocumentStatus::Processing;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self, fingerprint: String) {
        self.status = DocumentStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.dedup_fingerprint = Some(fingerprint);
    }

    pub fn mark_failed(&mut self, error_kind: impl Into<String>, error_message: impl Into<String>) {
        self.status = DocumentStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error_kind = Some(error_kind.into());
        self.error_message = Some(error_message.into());
    }

    pub fn mark_cancelled(&mut self) {
        self.status = DocumentStatus::Cancelled;
        self.completed_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_disallowed_from_terminal_states() {
        assert!(DocumentStatus::Processing.can_transition_to(DocumentStatus::Cancelled));
        assert!(!DocumentStatus::Completed.can_transition_to(DocumentStatus::Cancelled));
        assert!(!DocumentStatus::Failed.can_transition_to(DocumentStatus::Cancelled));
    }

    #[test]
    fn new_document_starts_queued() {
        let doc = Document::new("owner-1", "invoice.pdf", "application/pdf", 1024, "abc", ProcessingMode::CostEffective);
        assert_eq!(doc.status, DocumentStatus::Queued);
        assert!(doc.started_at.is_none());
    }
}

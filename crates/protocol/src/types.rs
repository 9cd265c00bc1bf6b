use serde::{Deserialize, Serialize};

/// Lifecycle of a batch transaction.
///
/// `Completed` means the transaction is closed, not that every file
/// succeeded; check the failed count separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "in_progress")]
    InProgress,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
}

impl TransactionStatus {
    /// Returns `true` once the transaction can no longer change.
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Lifecycle of a single file upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    #[serde(rename = "queued")]
    Queued,
    #[serde(rename = "uploading")]
    Uploading,
    #[serde(rename = "done")]
    Done,
    #[serde(rename = "failed")]
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Which size thresholds apply to a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    /// A user is present and can confirm large uploads.
    #[default]
    Interactive,
    /// Retries and background imports: never prompt, only hard-reject.
    Unattended,
}

/// Snapshot of a transaction's progress for progress sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionProgress {
    pub transaction_id: String,
    pub status: TransactionStatus,
    pub total_files: usize,
    pub completed_files: usize,
    pub failed_files: usize,
    pub total_bytes: u64,
    pub transferred_bytes: u64,
    #[serde(default)]
    pub bytes_per_second: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<f64>,
}

impl TransactionProgress {
    /// Returns the byte progress as a percentage (0-100).
    pub fn percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.transferred_bytes as f64 / self.total_bytes as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(total: u64, transferred: u64) -> TransactionProgress {
        TransactionProgress {
            transaction_id: "t1".into(),
            status: TransactionStatus::InProgress,
            total_files: 2,
            completed_files: 1,
            failed_files: 0,
            total_bytes: total,
            transferred_bytes: transferred,
            bytes_per_second: 0.0,
            eta_seconds: None,
        }
    }

    #[test]
    fn status_serialization() {
        assert_eq!(
            serde_json::to_string(&TransactionStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(
            serde_json::to_string(&TaskState::Uploading).unwrap(),
            "\"uploading\""
        );
        assert_eq!(
            serde_json::from_str::<UploadMode>("\"unattended\"").unwrap(),
            UploadMode::Unattended
        );
    }

    #[test]
    fn closed_statuses() {
        assert!(!TransactionStatus::Pending.is_closed());
        assert!(!TransactionStatus::InProgress.is_closed());
        assert!(TransactionStatus::Completed.is_closed());
        assert!(TransactionStatus::Failed.is_closed());
        assert!(TaskState::Failed.is_terminal());
        assert!(!TaskState::Queued.is_terminal());
    }

    #[test]
    fn progress_percentage() {
        assert!((progress(1000, 250).percentage() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn progress_percentage_zero_total() {
        assert_eq!(progress(0, 0).percentage(), 0.0);
    }

    #[test]
    fn progress_omits_missing_eta() {
        let json = serde_json::to_string(&progress(10, 5)).unwrap();
        assert!(!json.contains("etaSeconds"));
        assert!(json.contains("\"transferredBytes\":5"));
    }
}

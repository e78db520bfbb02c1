//! Task types: progress snapshots, status machine, and partial updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::TaskId;

/// Task lifecycle status. Completed/Failed/Cancelled are terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// Point-in-time snapshot of a long-running task.
///
/// `progress` is clamped to 0..=100 but deliberately not monotonic: owners
/// may report regressions (e.g. a retried phase) and subscribers must cope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskProgress {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub progress: u8,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskProgress {
    pub fn new(task_id: TaskId) -> Self {
        let now = Utc::now();
        Self {
            task_id,
            status: TaskStatus::Pending,
            progress: 0,
            message: String::new(),
            current_step: None,
            total_steps: None,
            data: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a partial update in place, bumping `updated_at`.
    pub fn apply(&mut self, update: TaskUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(progress) = update.progress {
            self.progress = progress.min(100);
        }
        if let Some(message) = update.message {
            self.message = message;
        }
        if let Some(current_step) = update.current_step {
            self.current_step = Some(current_step);
        }
        if let Some(total_steps) = update.total_steps {
            self.total_steps = Some(total_steps);
        }
        if let Some(data) = update.data {
            self.data = Some(data);
        }
        if let Some(error) = update.error {
            self.error = Some(error);
        }
        self.updated_at = Utc::now();
    }
}

/// Partial mutation of a task — any subset of fields may be supplied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskUpdate {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn progress(progress: u8, message: impl Into<String>) -> Self {
        Self {
            progress: Some(progress),
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn completed(data: Option<Value>) -> Self {
        Self {
            status: Some(TaskStatus::Completed),
            progress: Some(100),
            data,
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(TaskStatus::Failed),
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn terminal_states() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn apply_merges_partial_fields() {
        let mut snapshot = TaskProgress::new(TaskId::from_string("t1"));
        snapshot.apply(TaskUpdate::progress(50, "halfway"));
        assert_eq!(snapshot.progress, 50);
        assert_eq!(snapshot.message, "halfway");
        assert_eq!(snapshot.status, TaskStatus::Pending);

        snapshot.apply(TaskUpdate {
            status: Some(TaskStatus::Running),
            current_step: Some(2),
            total_steps: Some(4),
            ..TaskUpdate::default()
        });
        assert_eq!(snapshot.status, TaskStatus::Running);
        assert_eq!(snapshot.current_step, Some(2));
        // Earlier fields survive a sparse update.
        assert_eq!(snapshot.progress, 50);
        assert_eq!(snapshot.message, "halfway");
    }

    #[test]
    fn apply_clamps_progress() {
        let mut snapshot = TaskProgress::new(TaskId::default());
        snapshot.apply(TaskUpdate {
            progress: Some(250),
            ..TaskUpdate::default()
        });
        assert_eq!(snapshot.progress, 100);
    }

    #[test]
    fn progress_may_regress() {
        let mut snapshot = TaskProgress::new(TaskId::default());
        snapshot.apply(TaskUpdate::progress(80, "almost"));
        snapshot.apply(TaskUpdate::progress(30, "retrying phase"));
        assert_eq!(snapshot.progress, 30);
    }

    #[test]
    fn snapshot_serde_roundtrip() {
        let mut snapshot = TaskProgress::new(TaskId::from_string("t9"));
        snapshot.apply(TaskUpdate::completed(Some(json!({"rows": 12}))));
        let encoded = serde_json::to_string(&snapshot).unwrap();
        let back: TaskProgress = serde_json::from_str(&encoded).unwrap();
        assert_eq!(back.status, TaskStatus::Completed);
        assert_eq!(back.progress, 100);
        assert_eq!(back.data.unwrap()["rows"], 12);
    }
}

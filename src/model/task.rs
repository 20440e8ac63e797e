use std::fmt;

use serde::{Deserialize, Serialize};

/// Task lifecycle state.
///
/// Status advances only along pending < in_progress < completed; cancelled
/// is reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    /// Position in the forward ordering. Cancelled sits outside it.
    fn rank(&self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::InProgress => 1,
            TaskStatus::Completed => 2,
            TaskStatus::Cancelled => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }

    /// Whether a transition from `self` to `next` is legal.
    ///
    /// Same-status updates are accepted as no-ops so owner-only updates may
    /// carry a redundant status.
    pub fn can_transition(&self, next: TaskStatus) -> bool {
        if *self == next {
            return true;
        }
        match next {
            TaskStatus::Cancelled => !self.is_terminal(),
            TaskStatus::Pending => false,
            TaskStatus::InProgress | TaskStatus::Completed => {
                !self.is_terminal() && next.rank() > self.rank()
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A team-scoped task (`tasks/<team>/<id>.json`).
///
/// `blocks` and `blocked_by` are kept bidirectional: `a ∈ b.blocked_by` iff
/// `b ∈ a.blocks`. The engine maintains the mirror on every edge mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: u64,
    pub subject: String,
    pub description: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default)]
    pub blocks: Vec<u64>,
    #[serde(default)]
    pub blocked_by: Vec<u64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Task {
    pub fn new(id: u64, subject: &str, description: &str, blocked_by: Vec<u64>) -> Self {
        let now = crate::model::now_ms();
        Self {
            id,
            subject: subject.to_string(),
            description: description.to_string(),
            status: TaskStatus::Pending,
            owner: None,
            blocks: Vec::new(),
            blocked_by,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        assert!(TaskStatus::Pending.can_transition(TaskStatus::InProgress));
        assert!(TaskStatus::Pending.can_transition(TaskStatus::Completed));
        assert!(TaskStatus::InProgress.can_transition(TaskStatus::Completed));
    }

    #[test]
    fn test_backward_transitions_rejected() {
        assert!(!TaskStatus::InProgress.can_transition(TaskStatus::Pending));
        assert!(!TaskStatus::Completed.can_transition(TaskStatus::Pending));
        assert!(!TaskStatus::Completed.can_transition(TaskStatus::InProgress));
    }

    #[test]
    fn test_cancelled_from_non_terminal_only() {
        assert!(TaskStatus::Pending.can_transition(TaskStatus::Cancelled));
        assert!(TaskStatus::InProgress.can_transition(TaskStatus::Cancelled));
        assert!(!TaskStatus::Completed.can_transition(TaskStatus::Cancelled));
        assert!(!TaskStatus::Cancelled.can_transition(TaskStatus::Completed));
    }

    #[test]
    fn test_same_status_is_noop() {
        assert!(TaskStatus::Pending.can_transition(TaskStatus::Pending));
        assert!(TaskStatus::Completed.can_transition(TaskStatus::Completed));
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_value(TaskStatus::InProgress).unwrap(),
            serde_json::json!("in_progress")
        );
        let back: TaskStatus = serde_json::from_value(serde_json::json!("cancelled")).unwrap();
        assert_eq!(back, TaskStatus::Cancelled);
    }

    #[test]
    fn test_task_camel_case_keys() {
        let task = Task::new(7, "map modules", "walk the tree", vec![3]);
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["blockedBy"], serde_json::json!([3]));
        assert!(json.get("createdAt").is_some());
        assert!(json.get("updatedAt").is_some());
        // No owner yet: the key must be absent, not null.
        assert!(json.get("owner").is_none());
    }
}

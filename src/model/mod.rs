//! Value types for teams, tasks, inbox messages, and health probes.

pub mod health;
pub mod message;
pub mod task;
pub mod team;

pub use health::{AgentHealth, HealthState, HealthStatus, ProbeRecord};
pub use message::{InboxMessage, MessageType};
pub use task::{Task, TaskStatus};
pub use team::{
    agent_id, validate_name, Backend, LeadMember, Member, TeamConfig, TeammateMember,
    COLOR_PALETTE, RESERVED_LEAD_NAME,
};

/// Current wall-clock time as integer milliseconds since the epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

//! Coordination server for teams of OpenCode agents.
//!
//! Mediates team membership, shared task state with dependency ordering,
//! per-agent message inboxes with long-poll delivery, and the
//! spawn/kill/health lifecycle of agent processes running in tmux panes or
//! as desktop-app subprocesses. All shared state lives on disk under
//! `~/.opencode-teams/`, guarded by per-directory advisory locks and atomic
//! writes.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod inbox;
pub mod model;
pub mod server;
pub mod spawner;
pub mod store;
pub mod tasks;
pub mod teams;

pub use coordinator::Coordinator;
pub use error::{Result, TeamsError};

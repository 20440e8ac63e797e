//! Per-agent inboxes: append, read, and bounded long-poll.
//!
//! An inbox is a single JSON array scoped to one recipient. Appends and
//! read-marks take the team's inbox lock; unmarked reads are lock-free
//! best-effort snapshots (atomic writes keep them well-formed).

use std::time::Duration;

use crate::error::{Result, TeamsError};
use crate::model::{now_ms, InboxMessage};
use crate::store::{atomic, ScopedLock, StorePaths};
use crate::teams;

/// Ceiling for `poll` timeouts; larger requests are clamped.
pub const MAX_POLL_TIMEOUT_MS: u64 = 30_000;

/// Sleep-and-recheck step of the poll loop.
pub const POLL_STEP_MS: u64 = 500;

/// Create an empty inbox file for a new member.
pub fn create_inbox(paths: &StorePaths, team: &str, agent: &str) -> Result<()> {
    atomic::write_json(
        &paths.inbox_file(team, agent),
        &Vec::<InboxMessage>::new(),
    )
}

/// Delete an agent's inbox file under the inbox lock. Missing files are
/// ignored (idempotent cleanup).
pub fn delete_inbox(paths: &StorePaths, team: &str, agent: &str) -> Result<()> {
    let _lock = ScopedLock::acquire(&paths.inbox_lock(team))?;
    match std::fs::remove_file(paths.inbox_file(team, agent)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Append a message to a member's inbox under the inbox lock.
pub fn append(
    paths: &StorePaths,
    team: &str,
    recipient: &str,
    message: InboxMessage,
) -> Result<InboxMessage> {
    let config = teams::read_team(paths, team)?;
    if !config.has_member(recipient) {
        return Err(TeamsError::NotFound(format!(
            "recipient '{}' is not a member of team '{}'",
            recipient, team
        )));
    }

    let _lock = ScopedLock::acquire(&paths.inbox_lock(team))?;
    let mut messages = load(paths, team, recipient)?;
    messages.push(message.clone());
    atomic::write_json(&paths.inbox_file(team, recipient), &messages)?;
    Ok(message)
}

/// Read an agent's inbox. With `mark_as_read`, every returned message gets
/// `readAtMs` stamped and the file is rewritten under the lock; otherwise a
/// best-effort snapshot is returned without locking.
pub fn read(
    paths: &StorePaths,
    team: &str,
    agent: &str,
    mark_as_read: bool,
) -> Result<Vec<InboxMessage>> {
    let config = teams::read_team(paths, team)?;
    if !config.has_member(agent) {
        return Err(TeamsError::NotFound(format!(
            "agent '{}' is not a member of team '{}'",
            agent, team
        )));
    }

    if !mark_as_read {
        return load(paths, team, agent);
    }

    let _lock = ScopedLock::acquire(&paths.inbox_lock(team))?;
    let mut messages = load(paths, team, agent)?;
    let now = now_ms();
    let mut dirty = false;
    for msg in &mut messages {
        if msg.read_at_ms.is_none() {
            msg.read_at_ms = Some(now);
            dirty = true;
        }
    }
    if dirty {
        atomic::write_json(&paths.inbox_file(team, agent), &messages)?;
    }
    Ok(messages)
}

/// Wait up to `timeout_ms` (clamped to 30 s) for unread messages; returns
/// them marked as read, or the empty list on timeout. Returns immediately
/// when unread messages already exist. Dropping the future cancels the wait.
pub async fn poll(
    paths: &StorePaths,
    team: &str,
    agent: &str,
    timeout_ms: u64,
) -> Result<Vec<InboxMessage>> {
    let config = teams::read_team(paths, team)?;
    if !config.has_member(agent) {
        return Err(TeamsError::NotFound(format!(
            "agent '{}' is not a member of team '{}'",
            agent, team
        )));
    }

    let timeout = timeout_ms.min(MAX_POLL_TIMEOUT_MS);
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout);
    loop {
        let unread = take_unread(paths, team, agent)?;
        if !unread.is_empty() {
            return Ok(unread);
        }
        let now = tokio::time::Instant::now();
        if now >= deadline {
            return Ok(Vec::new());
        }
        let step = Duration::from_millis(POLL_STEP_MS).min(deadline - now);
        tokio::time::sleep(step).await;
    }
}

/// Under the lock: collect unread messages, stamp `readAtMs`, rewrite, and
/// return them.
fn take_unread(paths: &StorePaths, team: &str, agent: &str) -> Result<Vec<InboxMessage>> {
    let _lock = ScopedLock::acquire(&paths.inbox_lock(team))?;
    let mut messages = load(paths, team, agent)?;
    let now = now_ms();
    let mut unread = Vec::new();
    for msg in &mut messages {
        if msg.read_at_ms.is_none() {
            msg.read_at_ms = Some(now);
            unread.push(msg.clone());
        }
    }
    if !unread.is_empty() {
        atomic::write_json(&paths.inbox_file(team, agent), &messages)?;
    }
    Ok(unread)
}

fn load(paths: &StorePaths, team: &str, agent: &str) -> Result<Vec<InboxMessage>> {
    Ok(atomic::read_json_opt(&paths.inbox_file(team, agent))?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{agent_id, Backend, MessageType, TeammateMember};
    use tempfile::TempDir;

    fn setup() -> (TempDir, StorePaths) {
        let dir = TempDir::new().unwrap();
        let paths = StorePaths::new(dir.path().to_path_buf());
        teams::create_team(&paths, "demo", "lead", "m", "s").unwrap();
        let tm = TeammateMember {
            agent_id: agent_id("r1", "demo"),
            name: "r1".into(),
            model: "m".into(),
            prompt: "p".into(),
            color: String::new(),
            plan_mode_required: false,
            joined_at: 0,
            backend: Backend::Terminal,
            pane_id: None,
            process_id: None,
            cwd: "/tmp".into(),
            subagent_type: "general-purpose".into(),
        };
        teams::add_teammate(&paths, "demo", tm).unwrap();
        create_inbox(&paths, "demo", "r1").unwrap();
        (dir, paths)
    }

    fn msg(content: &str) -> InboxMessage {
        InboxMessage::new("lead", "r1", MessageType::Message, content, None, "blue")
    }

    #[test]
    fn test_append_and_read_preserves_order() {
        let (_dir, paths) = setup();
        append(&paths, "demo", "r1", msg("first")).unwrap();
        append(&paths, "demo", "r1", msg("second")).unwrap();

        let inbox = read(&paths, "demo", "r1", false).unwrap();
        assert_eq!(inbox.len(), 2);
        assert_eq!(inbox[0].content, "first");
        assert_eq!(inbox[1].content, "second");
        assert!(inbox.iter().all(|m| m.is_unread()));
    }

    #[test]
    fn test_append_to_non_member_fails() {
        let (_dir, paths) = setup();
        let err = append(&paths, "demo", "ghost", msg("hi")).unwrap_err();
        assert_eq!(err.kind(), "ErrNotFound");
    }

    #[test]
    fn test_read_marking_sets_read_at() {
        let (_dir, paths) = setup();
        append(&paths, "demo", "r1", msg("hello")).unwrap();

        let inbox = read(&paths, "demo", "r1", true).unwrap();
        assert!(inbox[0].read_at_ms.is_some());

        // Persisted, not just in the returned copy.
        let again = read(&paths, "demo", "r1", false).unwrap();
        assert!(again[0].read_at_ms.is_some());
    }

    #[test]
    fn test_concurrent_append_and_mark_loses_nothing() {
        let (_dir, paths) = setup();
        let writer_paths = paths.clone();
        let writer = std::thread::spawn(move || {
            for i in 0..50 {
                append(&writer_paths, "demo", "r1", msg(&format!("m{}", i))).unwrap();
            }
        });
        let reader_paths = paths.clone();
        let reader = std::thread::spawn(move || {
            for _ in 0..20 {
                let _ = read(&reader_paths, "demo", "r1", true).unwrap();
            }
        });
        writer.join().unwrap();
        reader.join().unwrap();

        let inbox = read(&paths, "demo", "r1", false).unwrap();
        assert_eq!(inbox.len(), 50);
        let mut ids: Vec<_> = inbox.iter().map(|m| m.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 50, "duplicate message ids after interleaving");
    }

    #[tokio::test]
    async fn test_poll_returns_immediately_when_unread() {
        let (_dir, paths) = setup();
        append(&paths, "demo", "r1", msg("ready")).unwrap();

        let start = std::time::Instant::now();
        let got = poll(&paths, "demo", "r1", 5_000).await.unwrap();
        assert_eq!(got.len(), 1);
        assert!(got[0].read_at_ms.is_some());
        assert!(start.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_poll_zero_timeout_takes_unread_only() {
        let (_dir, paths) = setup();
        append(&paths, "demo", "r1", msg("old")).unwrap();
        read(&paths, "demo", "r1", true).unwrap();
        append(&paths, "demo", "r1", msg("new")).unwrap();

        let got = poll(&paths, "demo", "r1", 0).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].content, "new");
    }

    #[tokio::test]
    async fn test_poll_times_out_empty() {
        let (_dir, paths) = setup();
        let start = std::time::Instant::now();
        let got = poll(&paths, "demo", "r1", 600).await.unwrap();
        assert!(got.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(600));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_poll_wakes_on_delivery() {
        let (_dir, paths) = setup();
        let sender_paths = paths.clone();
        let sender = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            append(&sender_paths, "demo", "r1", msg("ping")).unwrap();
        });

        let start = std::time::Instant::now();
        let got = poll(&paths, "demo", "r1", 5_000).await.unwrap();
        sender.await.unwrap();

        assert_eq!(got.len(), 1);
        assert_eq!(got[0].content, "ping");
        // Delivered at ~300ms; one 500ms step later at the latest.
        assert!(start.elapsed() < Duration::from_millis(1_500));
    }

    #[test]
    fn test_delete_inbox_idempotent() {
        let (_dir, paths) = setup();
        delete_inbox(&paths, "demo", "r1").unwrap();
        assert!(!paths.inbox_file("demo", "r1").exists());
        delete_inbox(&paths, "demo", "r1").unwrap();
    }
}

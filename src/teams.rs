//! Team registry: create/read/delete teams and mutate membership.
//!
//! All membership mutation happens under the team-config lock and rewrites
//! `config.json` atomically.

use crate::error::{Result, TeamsError};
use crate::model::{
    validate_name, InboxMessage, Member, TeamConfig, TeammateMember,
};
use crate::store::{atomic, ScopedLock, StorePaths};

/// Create a team with a single lead member and an empty lead inbox.
pub fn create_team(
    paths: &StorePaths,
    team_name: &str,
    lead_name: &str,
    lead_model: &str,
    session_id: &str,
) -> Result<TeamConfig> {
    validate_name("team", team_name)?;
    validate_name("lead", lead_name)?;

    let team_dir = paths.team_dir(team_name);
    if team_dir.exists() {
        return Err(TeamsError::Exists(format!(
            "team '{}' already exists",
            team_name
        )));
    }

    std::fs::create_dir_all(paths.inboxes_dir(team_name))?;
    std::fs::create_dir_all(paths.tasks_dir(team_name))?;

    let config = TeamConfig::new(team_name, lead_name, lead_model, session_id);
    atomic::write_json(&paths.team_config(team_name), &config)?;
    atomic::write_json(
        &paths.inbox_file(team_name, lead_name),
        &Vec::<InboxMessage>::new(),
    )?;

    tracing::info!(team = team_name, lead = lead_name, "created team");
    Ok(config)
}

/// Read a team's config. A team exists iff its config file exists.
pub fn read_team(paths: &StorePaths, team_name: &str) -> Result<TeamConfig> {
    validate_name("team", team_name)?;
    atomic::read_json_opt(&paths.team_config(team_name))?
        .ok_or_else(|| TeamsError::NotFound(format!("team '{}'", team_name)))
}

/// Delete a team and its task directory. Fails while any teammate remains.
pub fn delete_team(paths: &StorePaths, team_name: &str) -> Result<()> {
    let team = read_team(paths, team_name)?;
    let remaining = team.teammates().count();
    if remaining > 0 {
        return Err(TeamsError::Busy(format!(
            "team '{}' still has {} teammate(s)",
            team_name, remaining
        )));
    }

    std::fs::remove_dir_all(paths.team_dir(team_name))?;
    let tasks_dir = paths.tasks_dir(team_name);
    if tasks_dir.exists() {
        std::fs::remove_dir_all(tasks_dir)?;
    }

    tracing::info!(team = team_name, "deleted team");
    Ok(())
}

/// Add a teammate under the team-config lock, assigning the next palette
/// color at insertion time. Returns the updated config and the stored member.
pub fn add_teammate(
    paths: &StorePaths,
    team_name: &str,
    mut teammate: TeammateMember,
) -> Result<(TeamConfig, TeammateMember)> {
    let _lock = ScopedLock::acquire(&paths.team_lock(team_name))?;
    let mut team = read_team(paths, team_name)?;
    if team.has_member(&teammate.name) {
        return Err(TeamsError::Exists(format!(
            "member '{}' already exists in team '{}'",
            teammate.name, team_name
        )));
    }
    teammate.color = team.next_color().to_string();
    team.members.push(Member::Teammate(teammate.clone()));
    atomic::write_json(&paths.team_config(team_name), &team)?;
    Ok((team, teammate))
}

/// Remove a member by name under the team-config lock. Returns whether a
/// member was actually removed (absent members are a no-op, for idempotent
/// kills).
pub fn remove_member(paths: &StorePaths, team_name: &str, name: &str) -> Result<bool> {
    let _lock = ScopedLock::acquire(&paths.team_lock(team_name))?;
    let mut team = read_team(paths, team_name)?;
    let before = team.members.len();
    team.members.retain(|m| m.name() != name);
    if team.members.len() == before {
        return Ok(false);
    }
    atomic::write_json(&paths.team_config(team_name), &team)?;
    Ok(true)
}

/// Mutate a teammate record in place under the team-config lock.
pub fn update_teammate<F>(
    paths: &StorePaths,
    team_name: &str,
    name: &str,
    mutate: F,
) -> Result<TeamConfig>
where
    F: FnOnce(&mut TeammateMember),
{
    let _lock = ScopedLock::acquire(&paths.team_lock(team_name))?;
    let mut team = read_team(paths, team_name)?;
    let teammate = team.teammate_mut(name).ok_or_else(|| {
        TeamsError::NotFound(format!("teammate '{}' in team '{}'", name, team_name))
    })?;
    mutate(teammate);
    atomic::write_json(&paths.team_config(team_name), &team)?;
    Ok(team)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{agent_id, Backend, COLOR_PALETTE};
    use tempfile::TempDir;

    fn test_paths() -> (TempDir, StorePaths) {
        let dir = TempDir::new().unwrap();
        let paths = StorePaths::new(dir.path().to_path_buf());
        (dir, paths)
    }

    fn make_teammate(name: &str, team: &str) -> TeammateMember {
        TeammateMember {
            agent_id: agent_id(name, team),
            name: name.to_string(),
            model: "moonshot-ai/kimi-k2.5".into(),
            prompt: format!("You are {}", name),
            color: String::new(),
            plan_mode_required: false,
            joined_at: 0,
            backend: Backend::Terminal,
            pane_id: None,
            process_id: None,
            cwd: "/tmp".into(),
            subagent_type: "general-purpose".into(),
        }
    }

    #[test]
    fn test_create_and_read_round_trip() {
        let (_dir, paths) = test_paths();
        let created = create_team(&paths, "demo", "lead", "moonshot-ai/kimi-k2.5", "s1").unwrap();
        let read = read_team(&paths, "demo").unwrap();
        assert_eq!(read, created);
        assert!(paths.inbox_file("demo", "lead").exists());
        assert!(paths.tasks_dir("demo").exists());
    }

    #[test]
    fn test_create_duplicate_fails() {
        let (_dir, paths) = test_paths();
        create_team(&paths, "demo", "lead", "m", "s1").unwrap();
        let err = create_team(&paths, "demo", "lead", "m", "s1").unwrap_err();
        assert_eq!(err.kind(), "ErrExists");
    }

    #[test]
    fn test_create_invalid_names() {
        let (_dir, paths) = test_paths();
        assert_eq!(
            create_team(&paths, "bad team", "lead", "m", "s")
                .unwrap_err()
                .kind(),
            "ErrInvalidName"
        );
        assert_eq!(
            create_team(&paths, "demo", "bad lead!", "m", "s")
                .unwrap_err()
                .kind(),
            "ErrInvalidName"
        );
    }

    #[test]
    fn test_read_missing_team() {
        let (_dir, paths) = test_paths();
        assert_eq!(
            read_team(&paths, "ghost").unwrap_err().kind(),
            "ErrNotFound"
        );
    }

    #[test]
    fn test_color_assignment_round_robin() {
        let (_dir, paths) = test_paths();
        create_team(&paths, "demo", "lead", "m", "s").unwrap();
        for i in 0..9 {
            let name = format!("agent-{}", i);
            let (_, stored) = add_teammate(&paths, "demo", make_teammate(&name, "demo")).unwrap();
            // Lead occupies index 0, so teammate i gets palette[(i + 1) % 8].
            assert_eq!(stored.color, COLOR_PALETTE[(i + 1) % COLOR_PALETTE.len()]);
        }
    }

    #[test]
    fn test_add_duplicate_member_fails() {
        let (_dir, paths) = test_paths();
        create_team(&paths, "demo", "lead", "m", "s").unwrap();
        add_teammate(&paths, "demo", make_teammate("r1", "demo")).unwrap();
        let err = add_teammate(&paths, "demo", make_teammate("r1", "demo")).unwrap_err();
        assert_eq!(err.kind(), "ErrExists");
    }

    #[test]
    fn test_delete_requires_lead_only() {
        let (_dir, paths) = test_paths();
        create_team(&paths, "demo", "lead", "m", "s").unwrap();
        add_teammate(&paths, "demo", make_teammate("r1", "demo")).unwrap();

        assert_eq!(delete_team(&paths, "demo").unwrap_err().kind(), "ErrBusy");

        assert!(remove_member(&paths, "demo", "r1").unwrap());
        delete_team(&paths, "demo").unwrap();
        assert!(!paths.team_dir("demo").exists());
        assert!(!paths.tasks_dir("demo").exists());
    }

    #[test]
    fn test_remove_member_is_idempotent() {
        let (_dir, paths) = test_paths();
        create_team(&paths, "demo", "lead", "m", "s").unwrap();
        assert!(!remove_member(&paths, "demo", "ghost").unwrap());
    }

    #[test]
    fn test_update_teammate_records_pane() {
        let (_dir, paths) = test_paths();
        create_team(&paths, "demo", "lead", "m", "s").unwrap();
        add_teammate(&paths, "demo", make_teammate("r1", "demo")).unwrap();

        update_teammate(&paths, "demo", "r1", |tm| tm.pane_id = Some("%42".into())).unwrap();
        let team = read_team(&paths, "demo").unwrap();
        assert_eq!(team.teammate("r1").unwrap().pane_id.as_deref(), Some("%42"));
    }
}

//! Agent identity files.
//!
//! Each spawned agent gets a markdown document at
//! `<project>/.opencode/agents/<name>.md` that the agent binary reads at
//! startup: YAML frontmatter with model/mode/permissions/tool allowlist,
//! followed by a prose body describing the agent's identity, the required
//! coordination workflow, and the shutdown protocol.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::model::{TeamConfig, TeammateMember};

pub fn identity_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(".opencode").join("agents")
}

pub fn identity_path(project_dir: &Path, name: &str) -> PathBuf {
    identity_dir(project_dir).join(format!("{}.md", name))
}

/// Render the complete identity document for a teammate.
pub fn render(
    member: &TeammateMember,
    team: &TeamConfig,
    role_instructions: Option<&str>,
    custom_instructions: Option<&str>,
) -> String {
    let frontmatter = format!(
        "---\n\
         description: Team agent {name} on team {team}\n\
         model: {model}\n\
         mode: primary\n\
         permission: allow\n\
         tools:\n\
        \x20 read: true\n\
        \x20 write: true\n\
        \x20 edit: true\n\
        \x20 bash: true\n\
        \x20 glob: true\n\
        \x20 grep: true\n\
        \x20 list: true\n\
        \x20 webfetch: true\n\
        \x20 websearch: true\n\
        \x20 todoread: true\n\
        \x20 todowrite: true\n\
        \x20 \"opencode-teams_*\": true\n\
         ---\n",
        name = member.name,
        team = team.name,
        model = member.model,
    );

    let mut sections: Vec<String> = Vec::new();

    sections.push(format!(
        "# Agent Identity\n\n\
         You are **{name}**, a member of team **{team}**.\n\n\
         - Agent ID: `{agent_id}`\n\
         - Color: {color}",
        name = member.name,
        team = team.name,
        agent_id = member.agent_id,
        color = member.color,
    ));

    sections.push(
        "# Available MCP Tools\n\n\
         You MUST use these `opencode-teams_*` MCP tools for all team coordination.\n\
         Do NOT invent custom workflows, scripts, or coordination frameworks.\n\n\
         **Team Coordination:**\n\
         - `opencode-teams_read_config` — read team configuration\n\n\
         **Messaging:**\n\
         - `opencode-teams_read_inbox` — check your inbox for messages\n\
         - `opencode-teams_send_message` — send a message to a teammate or the team lead\n\
         - `opencode-teams_poll_inbox` — long-poll for new messages\n\n\
         **Task Management:**\n\
         - `opencode-teams_task_list` — list all tasks for the team\n\
         - `opencode-teams_task_get` — get details of a specific task\n\
         - `opencode-teams_task_create` — create a new task\n\
         - `opencode-teams_task_update` — update task status or claim a task\n\n\
         **Lifecycle:**\n\
         - `opencode-teams_check_agent_health` — check health of a single agent\n\
         - `opencode-teams_check_all_agents_health` — check health of all agents\n\
         - `opencode-teams_process_shutdown_approved` — acknowledge shutdown"
            .to_string(),
    );

    if let Some(role) = role_instructions {
        sections.push(role.trim().to_string());
    }

    if let Some(custom) = custom_instructions {
        sections.push(format!("# Additional Instructions\n\n{}", custom.trim()));
    }

    sections.push(format!(
        "# Workflow\n\n\
         Follow this loop while working:\n\n\
         1. **Check inbox** — call `opencode-teams_read_inbox(teamName=\"{team}\", agentName=\"{name}\")` every 3-5 tool calls. Always check before starting new work.\n\
         2. **Check tasks** — call `opencode-teams_task_list(teamName=\"{team}\")` to find available tasks. Claim one with `opencode-teams_task_update(teamName=\"{team}\", id=<id>, status=\"in_progress\", owner=\"{name}\")`.\n\
         3. **Do the work** — use your tools to complete the task.\n\
         4. **Report progress** — send updates to the team lead via `opencode-teams_send_message(teamName=\"{team}\", type=\"message\", recipient=\"{lead}\", content=\"<update>\", summary=\"<short>\", sender=\"{name}\")`.\n\
         5. **Mark done** — call `opencode-teams_task_update(teamName=\"{team}\", id=<id>, status=\"completed\", owner=\"{name}\")` when finished.",
        team = team.name,
        name = member.name,
        lead = team.lead().name,
    ));

    sections.push(
        "# Important Rules\n\n\
         - Use `opencode-teams_*` MCP tools for ALL team communication and task management\n\
         - Do NOT create your own coordination systems, parallel agent frameworks, or orchestration patterns\n\
         - Do NOT use slash commands or skills from other projects for team coordination\n\
         - Focus on your assigned task — report to the team lead when done or blocked\n\
         - When uncertain, ask the team lead via `opencode-teams_send_message` rather than improvising"
            .to_string(),
    );

    sections.push(
        "# Shutdown Protocol\n\n\
         When you receive a `shutdown_request` message, finish or park your current step, \
         reply with a `shutdown_approved` message, and prepare to exit gracefully."
            .to_string(),
    );

    format!("{}\n{}\n", frontmatter, sections.join("\n\n"))
}

/// Write the identity file, creating the agents directory if needed.
/// Overwrites any previous file (re-spawn scenario).
pub fn write(project_dir: &Path, name: &str, content: &str) -> Result<PathBuf> {
    let dir = identity_dir(project_dir);
    std::fs::create_dir_all(&dir)?;
    let path = identity_path(project_dir, name);
    std::fs::write(&path, content)?;
    Ok(path)
}

/// Remove an agent's identity file. Missing files are ignored.
pub fn remove(project_dir: &Path, name: &str) {
    let _ = std::fs::remove_file(identity_path(project_dir, name));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{agent_id, Backend, TeamConfig, TeammateMember};
    use tempfile::TempDir;

    fn make_member() -> (TeamConfig, TeammateMember) {
        let team = TeamConfig::new("demo", "lead", "moonshot-ai/kimi-k2.5", "s");
        let member = TeammateMember {
            agent_id: agent_id("r1", "demo"),
            name: "r1".into(),
            model: "moonshot-ai/kimi-k2.5".into(),
            prompt: "survey the tree".into(),
            color: "blue".into(),
            plan_mode_required: false,
            joined_at: 0,
            backend: Backend::Terminal,
            pane_id: None,
            process_id: None,
            cwd: "/tmp".into(),
            subagent_type: "general-purpose".into(),
        };
        (team, member)
    }

    #[test]
    fn test_render_frontmatter() {
        let (team, member) = make_member();
        let doc = render(&member, &team, None, None);
        assert!(doc.starts_with("---\n"));
        assert!(doc.contains("mode: primary"));
        assert!(doc.contains("permission: allow"));
        assert!(doc.contains("model: moonshot-ai/kimi-k2.5"));
        assert!(doc.contains("\"opencode-teams_*\": true"));
        assert!(doc.contains("You are **r1**, a member of team **demo**."));
    }

    #[test]
    fn test_render_without_template_has_no_role_section() {
        let (team, member) = make_member();
        let doc = render(&member, &team, None, None);
        assert!(!doc.contains("# Role:"));
        assert!(!doc.contains("# Additional Instructions"));
    }

    #[test]
    fn test_render_section_order() {
        let (team, member) = make_member();
        let doc = render(
            &member,
            &team,
            Some("# Role: Tester\n\nTest everything."),
            Some("Focus on performance tests."),
        );
        let role_pos = doc.find("# Role: Tester").unwrap();
        let custom_pos = doc.find("# Additional Instructions").unwrap();
        let workflow_pos = doc.find("# Workflow").unwrap();
        assert!(role_pos < custom_pos && custom_pos < workflow_pos);
        assert!(doc.contains("Focus on performance tests."));
    }

    #[test]
    fn test_write_and_remove() {
        let dir = TempDir::new().unwrap();
        let (team, member) = make_member();
        let content = render(&member, &team, None, None);

        let path = write(dir.path(), "r1", &content).unwrap();
        assert_eq!(path, identity_path(dir.path(), "r1"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), content);

        remove(dir.path(), "r1");
        assert!(!path.exists());
        // Removing again is a no-op.
        remove(dir.path(), "r1");
    }
}

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TeamsError};

/// Fixed palette of member colors, assigned round-robin by member index.
pub const COLOR_PALETTE: [&str; 8] = [
    "red", "blue", "green", "yellow", "purple", "orange", "pink", "cyan",
];

/// Reserved alias for the team lead; teammates may never claim it.
pub const RESERVED_LEAD_NAME: &str = "team-lead";

/// Team and member names: `[A-Za-z0-9_-]{1,64}`. Also keeps names safe to
/// embed in filesystem paths and shell commands.
static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("invalid NAME_PATTERN regex"));

/// Validate a team or member name against the allowed pattern.
pub fn validate_name(what: &str, name: &str) -> Result<()> {
    if name.len() > 64 {
        return Err(TeamsError::InvalidName(format!(
            "{} name is too long ({} chars, max 64)",
            what,
            name.len()
        )));
    }
    if !NAME_PATTERN.is_match(name) {
        return Err(TeamsError::InvalidName(format!(
            "{} name '{}' must match [A-Za-z0-9_-]{{1,64}}",
            what, name
        )));
    }
    Ok(())
}

/// Fully qualified agent identifier: `<member-name>@<team-name>`.
pub fn agent_id(name: &str, team_name: &str) -> String {
    format!("{}@{}", name, team_name)
}

/// Spawn mechanism for a teammate process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Agent runs in a terminal multiplexer pane.
    #[default]
    Terminal,
    /// Agent runs as a detached desktop-app subprocess.
    Desktop,
}

impl FromStr for Backend {
    type Err = TeamsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "terminal" => Ok(Backend::Terminal),
            "desktop" => Ok(Backend::Desktop),
            other => Err(TeamsError::InvalidArg(format!(
                "unknown backend '{}' (expected terminal or desktop)",
                other
            ))),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Terminal => write!(f, "terminal"),
            Backend::Desktop => write!(f, "desktop"),
        }
    }
}

/// The lead member, created at team birth and never spawned as a process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadMember {
    pub agent_id: String,
    pub name: String,
    pub color: String,
    pub joined_at: i64,
    pub session_id: String,
}

/// A spawned teammate member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeammateMember {
    pub agent_id: String,
    pub name: String,
    pub model: String,
    pub prompt: String,
    pub color: String,
    pub plan_mode_required: bool,
    pub joined_at: i64,
    pub backend: Backend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pane_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_id: Option<u32>,
    pub cwd: String,
    pub subagent_type: String,
}

/// A team member, discriminated by the `role` field on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Member {
    Lead(LeadMember),
    Teammate(TeammateMember),
}

impl Member {
    pub fn name(&self) -> &str {
        match self {
            Member::Lead(m) => &m.name,
            Member::Teammate(m) => &m.name,
        }
    }

    pub fn agent_id(&self) -> &str {
        match self {
            Member::Lead(m) => &m.agent_id,
            Member::Teammate(m) => &m.agent_id,
        }
    }

    pub fn color(&self) -> &str {
        match self {
            Member::Lead(m) => &m.color,
            Member::Teammate(m) => &m.color,
        }
    }

    pub fn is_lead(&self) -> bool {
        matches!(self, Member::Lead(_))
    }
}

/// Persistent team configuration (`teams/<team>/config.json`).
///
/// A team exists iff this file exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamConfig {
    pub name: String,
    pub created_at: i64,
    pub session_id: String,
    pub lead_model: String,
    pub members: Vec<Member>,
}

impl TeamConfig {
    /// Build a fresh team with a single lead member.
    pub fn new(name: &str, lead_name: &str, lead_model: &str, session_id: &str) -> Self {
        let now = crate::model::now_ms();
        let lead = LeadMember {
            agent_id: agent_id(lead_name, name),
            name: lead_name.to_string(),
            color: COLOR_PALETTE[0].to_string(),
            joined_at: now,
            session_id: session_id.to_string(),
        };
        Self {
            name: name.to_string(),
            created_at: now,
            session_id: session_id.to_string(),
            lead_model: lead_model.to_string(),
            members: vec![Member::Lead(lead)],
        }
    }

    /// The team lead. Every valid config has exactly one.
    pub fn lead(&self) -> &LeadMember {
        self.members
            .iter()
            .find_map(|m| match m {
                Member::Lead(lead) => Some(lead),
                Member::Teammate(_) => None,
            })
            .expect("team config has no lead member")
    }

    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.name() == name)
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.member(name).is_some()
    }

    pub fn teammate(&self, name: &str) -> Option<&TeammateMember> {
        self.members.iter().find_map(|m| match m {
            Member::Teammate(tm) if tm.name == name => Some(tm),
            _ => None,
        })
    }

    pub fn teammate_mut(&mut self, name: &str) -> Option<&mut TeammateMember> {
        self.members.iter_mut().find_map(|m| match m {
            Member::Teammate(tm) if tm.name == name => Some(tm),
            _ => None,
        })
    }

    /// All teammate members, in insertion order.
    pub fn teammates(&self) -> impl Iterator<Item = &TeammateMember> {
        self.members.iter().filter_map(|m| match m {
            Member::Teammate(tm) => Some(tm),
            Member::Lead(_) => None,
        })
    }

    /// Color for the next member: `palette[members.len() mod 8]`.
    pub fn next_color(&self) -> &'static str {
        COLOR_PALETTE[self.members.len() % COLOR_PALETTE.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name_accepts_valid() {
        assert!(validate_name("team", "demo").is_ok());
        assert!(validate_name("team", "my-team_2").is_ok());
        assert!(validate_name("team", &"a".repeat(64)).is_ok());
    }

    #[test]
    fn test_validate_name_rejects_invalid() {
        assert!(validate_name("team", "").is_err());
        assert!(validate_name("team", "has space").is_err());
        assert!(validate_name("team", "slash/name").is_err());
        assert!(validate_name("team", "dot.name").is_err());
        assert!(validate_name("team", &"a".repeat(65)).is_err());
        assert!(validate_name("team", "../escape").is_err());
    }

    #[test]
    fn test_new_team_has_single_lead() {
        let team = TeamConfig::new("demo", "lead", "moonshot-ai/kimi-k2.5", "sess-1");
        assert_eq!(team.members.len(), 1);
        assert_eq!(team.lead().name, "lead");
        assert_eq!(team.lead().agent_id, "lead@demo");
        assert_eq!(team.lead().color, COLOR_PALETTE[0]);
    }

    #[test]
    fn test_next_color_cycles() {
        let mut team = TeamConfig::new("demo", "lead", "m", "s");
        // Lead occupies palette[0]; first teammate gets palette[1].
        assert_eq!(team.next_color(), COLOR_PALETTE[1]);
        for i in 0..COLOR_PALETTE.len() {
            let color = team.next_color().to_string();
            assert_eq!(color, COLOR_PALETTE[(i + 1) % COLOR_PALETTE.len()]);
            team.members.push(Member::Teammate(TeammateMember {
                agent_id: agent_id(&format!("agent-{}", i), "demo"),
                name: format!("agent-{}", i),
                model: "m".into(),
                prompt: "p".into(),
                color,
                plan_mode_required: false,
                joined_at: 0,
                backend: Backend::Terminal,
                pane_id: None,
                process_id: None,
                cwd: "/tmp".into(),
                subagent_type: "general-purpose".into(),
            }));
        }
        // 9 members total: wraps back to palette[1].
        assert_eq!(team.next_color(), COLOR_PALETTE[1]);
    }

    #[test]
    fn test_member_role_tagging() {
        let team = TeamConfig::new("demo", "lead", "m", "s");
        let json = serde_json::to_value(&team).unwrap();
        assert_eq!(json["members"][0]["role"], "lead");
        assert_eq!(json["members"][0]["agentId"], "lead@demo");
        assert_eq!(json["createdAt"], serde_json::json!(team.created_at));

        let back: TeamConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, team);
    }

    #[test]
    fn test_teammate_optional_fields_not_emitted_when_none() {
        let tm = TeammateMember {
            agent_id: "r1@demo".into(),
            name: "r1".into(),
            model: "kimi/k2.5".into(),
            prompt: "survey".into(),
            color: "blue".into(),
            plan_mode_required: false,
            joined_at: 1,
            backend: Backend::Terminal,
            pane_id: None,
            process_id: None,
            cwd: "/tmp".into(),
            subagent_type: "general-purpose".into(),
        };
        let json = serde_json::to_value(Member::Teammate(tm)).unwrap();
        assert_eq!(json["role"], "teammate");
        assert_eq!(json["backend"], "terminal");
        assert!(json.get("paneId").is_none());
        assert!(json.get("processId").is_none());
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!("terminal".parse::<Backend>().unwrap(), Backend::Terminal);
        assert_eq!("desktop".parse::<Backend>().unwrap(), Backend::Desktop);
        assert!("tmux".parse::<Backend>().is_err());
    }

    #[test]
    fn test_readers_ignore_unknown_fields() {
        let json = serde_json::json!({
            "name": "demo",
            "createdAt": 1,
            "sessionId": "s",
            "leadModel": "m",
            "members": [],
            "futureField": {"nested": true}
        });
        let team: TeamConfig = serde_json::from_value(json).unwrap();
        assert_eq!(team.name, "demo");
    }
}

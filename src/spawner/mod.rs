//! Spawn/kill/health lifecycle of external agent processes.
//!
//! A spawn registers the teammate in the team config, seeds its inbox with
//! the initial prompt, writes its identity file, launches the process on the
//! requested backend, and records the pane id or PID. Any failure after
//! registration rolls the team config back to its pre-spawn state.

pub mod desktop;
pub mod identity;
pub mod templates;
pub mod tmux;

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::config::Settings;
use crate::error::{Result, TeamsError};
use crate::inbox;
use crate::model::{
    agent_id, now_ms, validate_name, AgentHealth, Backend, HealthState, HealthStatus,
    InboxMessage, MessageType, ProbeRecord, TeammateMember, RESERVED_LEAD_NAME,
};
use crate::store::{atomic, StorePaths};
use crate::tasks;
use crate::teams;
use self::tmux::TmuxClient;

/// A `spawn_teammate` request, already validated at the protocol layer.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub team_name: String,
    pub name: String,
    pub prompt: String,
    pub model: String,
    pub backend: Backend,
    pub template: Option<String>,
    pub custom_instructions: Option<String>,
    pub cwd: Option<String>,
    pub auto_close: bool,
}

/// Quote a string for POSIX `sh`.
pub fn shell_quote(s: &str) -> String {
    let safe = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./=:@%+,".contains(c));
    if safe {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\\''"))
    }
}

/// Assemble the shell command run inside a pane. The agent is wrapped in a
/// wall-clock `timeout` so upstream API hangs cannot pin the pane forever.
pub fn build_run_command(
    binary: &str,
    name: &str,
    model: &str,
    prompt: &str,
    cwd: &str,
    timeout_secs: u64,
    auto_close: bool,
) -> String {
    let mut command = format!(
        "cd {cwd} && timeout {timeout}s {binary} run --agent {name} --model {model} --format json -- {prompt}",
        cwd = shell_quote(cwd),
        timeout = timeout_secs,
        binary = shell_quote(binary),
        name = shell_quote(name),
        model = shell_quote(model),
        prompt = shell_quote(prompt),
    );
    if !auto_close {
        // Keep the pane around for inspection after the agent exits.
        command.push_str("; exec \"$SHELL\"");
    }
    command
}

enum LaunchHandle {
    Pane(String),
    Process(u32),
}

/// Process lifecycle manager for one server instance.
#[derive(Debug, Clone)]
pub struct Spawner {
    paths: StorePaths,
    settings: Settings,
    tmux: TmuxClient,
}

impl Spawner {
    pub fn new(paths: StorePaths, settings: Settings) -> Self {
        let tmux = TmuxClient::new(
            settings.tmux_timeout_secs,
            settings.use_tmux_windows,
            settings.capture_lines,
        );
        Self {
            paths,
            settings,
            tmux,
        }
    }

    /// Spawn a teammate and return its final member record.
    pub async fn spawn_teammate(&self, request: SpawnRequest) -> Result<TeammateMember> {
        validate_name("teammate", &request.name)?;
        let team = teams::read_team(&self.paths, &request.team_name)?;
        if request.name == RESERVED_LEAD_NAME || request.name == team.lead().name {
            return Err(TeamsError::InvalidName(format!(
                "'{}' is reserved for the team lead",
                request.name
            )));
        }

        let role_instructions = match &request.template {
            Some(name) => Some(
                templates::get_template(name)
                    .ok_or_else(|| TeamsError::UnknownTemplate(name.clone()))?
                    .role_instructions,
            ),
            None => None,
        };

        let model = if request.model == "auto" {
            team.lead_model.clone()
        } else {
            request.model.clone()
        };
        let cwd = match &request.cwd {
            Some(cwd) => cwd.clone(),
            None => std::env::current_dir()?.to_string_lossy().into_owned(),
        };

        let teammate = TeammateMember {
            agent_id: agent_id(&request.name, &request.team_name),
            name: request.name.clone(),
            model,
            prompt: request.prompt.clone(),
            color: String::new(),
            plan_mode_required: false,
            joined_at: now_ms(),
            backend: request.backend,
            pane_id: None,
            process_id: None,
            cwd: cwd.clone(),
            subagent_type: request
                .template
                .clone()
                .unwrap_or_else(|| "general-purpose".to_string()),
        };

        let (team, teammate) = teams::add_teammate(&self.paths, &request.team_name, teammate)?;

        let launched = self
            .launch(&request, &teammate, &team, role_instructions)
            .await;
        match launched {
            Ok(handle) => {
                let updated = teams::update_teammate(
                    &self.paths,
                    &request.team_name,
                    &request.name,
                    |tm| match &handle {
                        LaunchHandle::Pane(pane_id) => tm.pane_id = Some(pane_id.clone()),
                        LaunchHandle::Process(pid) => tm.process_id = Some(*pid),
                    },
                );
                match updated {
                    Ok(team) => {
                        let member = team
                            .teammate(&request.name)
                            .expect("teammate recorded above")
                            .clone();
                        tracing::info!(
                            team = %request.team_name,
                            agent = %request.name,
                            backend = %request.backend,
                            "spawned teammate"
                        );
                        Ok(member)
                    }
                    Err(e) => {
                        self.rollback_spawn(&request.team_name, &request.name, &cwd);
                        Err(e)
                    }
                }
            }
            Err(e) => {
                self.rollback_spawn(&request.team_name, &request.name, &cwd);
                Err(e)
            }
        }
    }

    /// Steps 2b-4 of the spawn: inbox, identity file, process launch.
    async fn launch(
        &self,
        request: &SpawnRequest,
        teammate: &TeammateMember,
        team: &crate::model::TeamConfig,
        role_instructions: Option<&str>,
    ) -> Result<LaunchHandle> {
        inbox::create_inbox(&self.paths, &request.team_name, &request.name)?;
        inbox::append(
            &self.paths,
            &request.team_name,
            &request.name,
            InboxMessage::new(
                &team.lead().name,
                &request.name,
                MessageType::Message,
                &request.prompt,
                None,
                &teammate.color,
            ),
        )?;

        let document = identity::render(
            teammate,
            team,
            role_instructions,
            request.custom_instructions.as_deref(),
        );
        let identity_file = identity::write(Path::new(&teammate.cwd), &request.name, &document)?;

        match request.backend {
            Backend::Terminal => {
                let command = build_run_command(
                    &self.settings.agent_binary,
                    &request.name,
                    &teammate.model,
                    &request.prompt,
                    &teammate.cwd,
                    self.settings.spawn_timeout_secs,
                    request.auto_close,
                );
                let pane_id = self.tmux.spawn_pane(&teammate.cwd, &command).await?;
                Ok(LaunchHandle::Pane(pane_id))
            }
            Backend::Desktop => {
                let binary = desktop::discover_desktop_binary()?;
                let pid = desktop::launch_desktop(&binary, &identity_file, &teammate.cwd)?;
                Ok(LaunchHandle::Process(pid))
            }
        }
    }

    /// Undo member registration and its side files after a failed spawn.
    fn rollback_spawn(&self, team_name: &str, name: &str, cwd: &str) {
        if let Err(e) = teams::remove_member(&self.paths, team_name, name) {
            tracing::warn!(team = team_name, agent = name, error = %e, "spawn rollback: member removal failed");
        }
        if let Err(e) = inbox::delete_inbox(&self.paths, team_name, name) {
            tracing::warn!(team = team_name, agent = name, error = %e, "spawn rollback: inbox removal failed");
        }
        identity::remove(Path::new(cwd), name);
    }

    /// Kill a teammate's process and remove every trace of the member:
    /// config entry, task ownership, inbox file, identity file. Killing an
    /// already-removed member is a no-op success.
    pub async fn force_kill_teammate(&self, team_name: &str, name: &str) -> Result<bool> {
        let team = teams::read_team(&self.paths, team_name)?;
        let Some(teammate) = team.teammate(name).cloned() else {
            return Ok(false);
        };

        match teammate.backend {
            Backend::Terminal => {
                if let Some(pane_id) = &teammate.pane_id {
                    self.tmux.kill_pane(pane_id).await?;
                }
            }
            Backend::Desktop => {
                if let Some(pid) = teammate.process_id {
                    desktop::kill_process(pid);
                }
            }
        }

        self.release_teammate(team_name, name)?;
        tracing::info!(team = team_name, agent = name, "killed teammate");
        Ok(true)
    }

    /// Remove a teammate without signalling its process (shutdown consent
    /// path, and the cleanup half of a kill).
    pub fn release_teammate(&self, team_name: &str, name: &str) -> Result<bool> {
        let team = teams::read_team(&self.paths, team_name)?;
        let Some(teammate) = team.teammate(name).cloned() else {
            return Ok(false);
        };

        teams::remove_member(&self.paths, team_name, name)?;
        tasks::clear_owner(&self.paths, team_name, name)?;
        inbox::delete_inbox(&self.paths, team_name, name)?;
        identity::remove(Path::new(&teammate.cwd), name);
        Ok(true)
    }

    /// Probe one teammate, persisting the updated probe state.
    pub async fn check_agent_health(&self, team_name: &str, name: &str) -> Result<AgentHealth> {
        let team = teams::read_team(&self.paths, team_name)?;
        let teammate = team.teammate(name).ok_or_else(|| {
            TeamsError::NotFound(format!("teammate '{}' in team '{}'", name, team_name))
        })?;

        let mut state = load_health_state(&self.paths, team_name)?;
        let record = state.entry(name.to_string()).or_default();
        let health = self.probe(teammate, record).await;
        save_health_state(&self.paths, team_name, &state)?;
        Ok(health)
    }

    /// Probe every teammate, persisting the probe state once at the end.
    pub async fn check_all_agents_health(&self, team_name: &str) -> Result<Vec<AgentHealth>> {
        let team = teams::read_team(&self.paths, team_name)?;
        let mut state = load_health_state(&self.paths, team_name)?;
        let mut results = Vec::new();
        for teammate in team.teammates() {
            let record = state.entry(teammate.name.clone()).or_default();
            results.push(self.probe(teammate, record).await);
        }
        save_health_state(&self.paths, team_name, &state)?;
        Ok(results)
    }

    async fn probe(&self, teammate: &TeammateMember, record: &mut ProbeRecord) -> AgentHealth {
        let (status, detail) = match teammate.backend {
            Backend::Desktop => match teammate.process_id {
                None => (HealthStatus::Unknown, "no recorded process id".to_string()),
                Some(pid) => {
                    if desktop::process_alive(pid) {
                        (HealthStatus::Alive, format!("process {} is running", pid))
                    } else {
                        (
                            HealthStatus::Dead,
                            format!("process {} is no longer running", pid),
                        )
                    }
                }
            },
            Backend::Terminal => match &teammate.pane_id {
                None => (HealthStatus::Unknown, "no recorded pane id".to_string()),
                Some(pane_id) => self.probe_pane(teammate, pane_id, record).await,
            },
        };
        AgentHealth {
            agent_name: teammate.name.clone(),
            status,
            detail,
            pane_id: teammate.pane_id.clone(),
            process_id: teammate.process_id,
        }
    }

    async fn probe_pane(
        &self,
        teammate: &TeammateMember,
        pane_id: &str,
        record: &mut ProbeRecord,
    ) -> (HealthStatus, String) {
        match self.tmux.is_pane_alive(pane_id).await {
            Err(TeamsError::Timeout(_)) => {
                return (
                    HealthStatus::Unknown,
                    "tmux did not respond in time".to_string(),
                );
            }
            Err(e) => {
                return (HealthStatus::Unknown, format!("tmux probe failed: {}", e));
            }
            Ok(false) => {
                return (HealthStatus::Dead, format!("pane {} is dead", pane_id));
            }
            Ok(true) => {}
        }

        let content = match self.tmux.capture_pane(pane_id).await {
            Ok(content) => content,
            Err(_) => {
                return (
                    HealthStatus::Unknown,
                    "could not capture pane content".to_string(),
                );
            }
        };
        let hash = content_hash(&content);
        classify_pane_content(
            now_ms(),
            teammate.joined_at,
            &hash,
            record,
            self.settings.grace_period_ms,
            self.settings.hung_timeout_ms,
        )
    }
}

/// SHA-256 hex digest of a pane capture.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Stale-output state machine shared by every terminal probe.
///
/// Updates `record` in place when the hash changed; classification order is
/// grace period, then change detection, then the hung threshold.
pub fn classify_pane_content(
    now_ms: i64,
    joined_at_ms: i64,
    hash: &str,
    record: &mut ProbeRecord,
    grace_period_ms: i64,
    hung_timeout_ms: i64,
) -> (HealthStatus, String) {
    let changed = record.content_hash.as_deref() != Some(hash);
    if changed {
        record.content_hash = Some(hash.to_string());
        record.last_change_ms = Some(now_ms);
    }

    if now_ms - joined_at_ms < grace_period_ms {
        return (
            HealthStatus::Alive,
            "within the startup grace period".to_string(),
        );
    }
    if changed {
        return (HealthStatus::Alive, "pane content is changing".to_string());
    }
    match record.last_change_ms {
        Some(last_change) if now_ms - last_change >= hung_timeout_ms => (
            HealthStatus::Hung,
            format!(
                "pane content unchanged for {}s",
                (now_ms - last_change) / 1000
            ),
        ),
        _ => (
            HealthStatus::Alive,
            "pane content unchanged, below the hung threshold".to_string(),
        ),
    }
}

/// Load the per-team probe state; an absent file is an empty state.
pub fn load_health_state(paths: &StorePaths, team: &str) -> Result<HealthState> {
    Ok(atomic::read_json_opt(&paths.health_file(team))?.unwrap_or_default())
}

/// Persist the probe state. Single-writer within one server session, so no
/// lock is taken; the write itself is atomic.
pub fn save_health_state(paths: &StorePaths, team: &str, state: &HealthState) -> Result<()> {
    atomic::write_json(&paths.health_file(team), state)
}

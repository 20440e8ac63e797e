//! The outward command surface.
//!
//! Every transport tool maps 1:1 onto a coordinator operation: arguments are
//! validated here, dispatched to the registry/engine/inbox/spawner, and
//! domain errors bubble up for the transport to wrap in the error envelope.
//! The coordinator owns the single team binding for this server session.

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::Settings;
use crate::error::{Result, TeamsError};
use crate::inbox;
use crate::model::{Backend, InboxMessage, MessageType, TaskStatus};
use crate::spawner::{templates, SpawnRequest, Spawner};
use crate::store::StorePaths;
use crate::tasks::{self, TaskEvent, TaskPatch};
use crate::teams;

const DEFAULT_LEAD_MODEL: &str = "moonshot-ai/kimi-k2.5";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TeamCreateParams {
    team_name: String,
    lead_name: String,
    lead_model: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TeamNameParams {
    team_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpawnParams {
    team_name: String,
    name: String,
    prompt: String,
    #[serde(default = "default_model")]
    model: String,
    backend: Option<Backend>,
    template: Option<String>,
    custom_instructions: Option<String>,
    cwd: Option<String>,
    #[serde(default = "default_true")]
    auto_close: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemberParams {
    team_name: String,
    #[serde(alias = "agentName")]
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageParams {
    team_name: String,
    #[serde(rename = "type")]
    kind: MessageType,
    recipient: Option<String>,
    content: String,
    summary: Option<String>,
    sender: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadInboxParams {
    team_name: String,
    agent_name: String,
    #[serde(default = "default_true")]
    mark_as_read: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PollInboxParams {
    team_name: String,
    agent_name: String,
    #[serde(default = "default_poll_timeout")]
    timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskCreateParams {
    team_name: String,
    subject: String,
    description: String,
    #[serde(default)]
    blocked_by: Vec<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskUpdateParams {
    team_name: String,
    id: u64,
    status: Option<TaskStatus>,
    owner: Option<String>,
    subject: Option<String>,
    description: Option<String>,
    blocks: Option<Vec<u64>>,
    blocked_by: Option<Vec<u64>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskGetParams {
    team_name: String,
    id: u64,
}

fn default_model() -> String {
    "auto".to_string()
}

fn default_true() -> bool {
    true
}

fn default_poll_timeout() -> u64 {
    inbox::MAX_POLL_TIMEOUT_MS
}

fn parse<T: serde::de::DeserializeOwned>(params: Value) -> Result<T> {
    serde_json::from_value(params)
        .map_err(|e| TeamsError::InvalidArg(format!("invalid parameters: {}", e)))
}

/// One coordinator per server session; holds the session's single team
/// binding.
pub struct Coordinator {
    paths: StorePaths,
    settings: Settings,
    session_id: String,
    spawner: Spawner,
    bound_team: Mutex<Option<String>>,
}

impl Coordinator {
    pub fn new(paths: StorePaths, settings: Settings) -> Self {
        let spawner = Spawner::new(paths.clone(), settings.clone());
        Self {
            paths,
            settings,
            session_id: Uuid::new_v4().to_string(),
            spawner,
            bound_team: Mutex::new(None),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Dispatch one tool call.
    pub async fn dispatch(&self, tool: &str, params: Value) -> Result<Value> {
        match tool {
            "team_create" => self.team_create(parse(params)?),
            "team_delete" => self.team_delete(parse(params)?),
            "read_config" => self.read_config(parse(params)?),
            "spawn_teammate" => self.spawn_teammate(parse(params)?).await,
            "force_kill_teammate" => self.force_kill_teammate(parse(params)?).await,
            "process_shutdown_approved" => self.process_shutdown_approved(parse(params)?),
            "send_message" => self.send_message(parse(params)?),
            "read_inbox" => self.read_inbox(parse(params)?),
            "poll_inbox" => self.poll_inbox(parse(params)?).await,
            "task_create" => self.task_create(parse(params)?),
            "task_update" => self.task_update(parse(params)?),
            "task_list" => self.task_list(parse(params)?),
            "task_get" => self.task_get(parse(params)?),
            "list_agent_templates" => Ok(serde_json::to_value(templates::list_templates())?),
            "check_agent_health" => self.check_agent_health(parse(params)?).await,
            "check_all_agents_health" => self.check_all_agents_health(parse(params)?).await,
            other => Err(TeamsError::InvalidArg(format!("unknown tool '{}'", other))),
        }
    }

    fn team_create(&self, p: TeamCreateParams) -> Result<Value> {
        let mut bound = self.bound_team.lock();
        if let Some(existing) = bound.as_ref() {
            return Err(TeamsError::Busy(format!(
                "this session already coordinates team '{}'",
                existing
            )));
        }
        let lead_model = p.lead_model.as_deref().unwrap_or(DEFAULT_LEAD_MODEL);
        let config = teams::create_team(
            &self.paths,
            &p.team_name,
            &p.lead_name,
            lead_model,
            &self.session_id,
        )?;
        *bound = Some(p.team_name);
        Ok(serde_json::to_value(config)?)
    }

    fn team_delete(&self, p: TeamNameParams) -> Result<Value> {
        teams::delete_team(&self.paths, &p.team_name)?;
        let mut bound = self.bound_team.lock();
        if bound.as_deref() == Some(p.team_name.as_str()) {
            *bound = None;
        }
        Ok(json!({ "deleted": true }))
    }

    fn read_config(&self, p: TeamNameParams) -> Result<Value> {
        Ok(serde_json::to_value(teams::read_team(
            &self.paths,
            &p.team_name,
        )?)?)
    }

    async fn spawn_teammate(&self, p: SpawnParams) -> Result<Value> {
        let backend = p.backend.unwrap_or(self.settings.default_backend);
        let member = self
            .spawner
            .spawn_teammate(SpawnRequest {
                team_name: p.team_name,
                name: p.name,
                prompt: p.prompt,
                model: p.model,
                backend,
                template: p.template,
                custom_instructions: p.custom_instructions,
                cwd: p.cwd,
                auto_close: p.auto_close,
            })
            .await?;
        Ok(serde_json::to_value(member)?)
    }

    async fn force_kill_teammate(&self, p: MemberParams) -> Result<Value> {
        let killed = self
            .spawner
            .force_kill_teammate(&p.team_name, &p.name)
            .await?;
        Ok(json!({ "killed": killed }))
    }

    fn process_shutdown_approved(&self, p: MemberParams) -> Result<Value> {
        let removed = self.spawner.release_teammate(&p.team_name, &p.name)?;
        Ok(json!({ "removed": removed }))
    }

    fn send_message(&self, p: SendMessageParams) -> Result<Value> {
        let team = teams::read_team(&self.paths, &p.team_name)?;
        let lead_name = team.lead().name.clone();
        // Plain messages are relayed by the lead, so attribution is forced
        // to the lead; response types keep their stated sender.
        let sender = match p.kind {
            MessageType::Message | MessageType::Broadcast => lead_name.clone(),
            _ => p.sender.clone().unwrap_or_else(|| lead_name.clone()),
        };
        let color = team
            .member(&sender)
            .map(|m| m.color().to_string())
            .unwrap_or_else(|| "white".to_string());

        let broadcast = p.kind == MessageType::Broadcast || p.recipient.as_deref() == Some("*");
        if broadcast {
            let mut delivered = 0;
            for member in &team.members {
                if member.name() == sender {
                    continue;
                }
                let message = InboxMessage::new(
                    &sender,
                    member.name(),
                    MessageType::Broadcast,
                    &p.content,
                    p.summary.clone(),
                    &color,
                );
                inbox::append(&self.paths, &p.team_name, member.name(), message)?;
                delivered += 1;
            }
            return Ok(json!({ "delivered": delivered }));
        }

        let recipient = p.recipient.ok_or_else(|| {
            TeamsError::InvalidArg("recipient is required for non-broadcast messages".into())
        })?;
        let message = InboxMessage::new(&sender, &recipient, p.kind, &p.content, p.summary, &color);
        let message = inbox::append(&self.paths, &p.team_name, &recipient, message)?;
        Ok(serde_json::to_value(message)?)
    }

    fn read_inbox(&self, p: ReadInboxParams) -> Result<Value> {
        Ok(serde_json::to_value(inbox::read(
            &self.paths,
            &p.team_name,
            &p.agent_name,
            p.mark_as_read,
        )?)?)
    }

    async fn poll_inbox(&self, p: PollInboxParams) -> Result<Value> {
        Ok(serde_json::to_value(
            inbox::poll(&self.paths, &p.team_name, &p.agent_name, p.timeout_ms).await?,
        )?)
    }

    fn task_create(&self, p: TaskCreateParams) -> Result<Value> {
        let task = tasks::create_task(
            &self.paths,
            &p.team_name,
            &p.subject,
            &p.description,
            p.blocked_by,
        )?;
        Ok(serde_json::to_value(task)?)
    }

    fn task_update(&self, p: TaskUpdateParams) -> Result<Value> {
        let patch = TaskPatch {
            status: p.status,
            owner: p.owner,
            subject: p.subject,
            description: p.description,
            blocks: p.blocks,
            blocked_by: p.blocked_by,
        };
        let (task, events) = tasks::update_task(&self.paths, &p.team_name, p.id, patch)?;
        self.deliver_task_events(&p.team_name, &events);
        Ok(serde_json::to_value(task)?)
    }

    /// Enqueue assignment/completion notifications. Inbox writes happen
    /// after the tasks lock is released; a failed notification never fails
    /// the update that produced it.
    fn deliver_task_events(&self, team_name: &str, events: &[TaskEvent]) {
        let Ok(team) = teams::read_team(&self.paths, team_name) else {
            return;
        };
        let lead_name = team.lead().name.clone();
        let lead_color = team.lead().color.clone();

        for event in events {
            let (recipient, payload, summary) = match event {
                TaskEvent::Assigned {
                    owner,
                    task_id,
                    subject,
                } => {
                    if !team.has_member(owner) || *owner == lead_name {
                        continue;
                    }
                    (
                        owner.clone(),
                        json!({
                            "type": "task_assignment",
                            "taskId": task_id,
                            "subject": subject,
                            "assignedBy": lead_name,
                        }),
                        format!("Task {} assigned", task_id),
                    )
                }
                TaskEvent::Completed {
                    task_id,
                    subject,
                    by,
                } => {
                    if by.as_deref() == Some(lead_name.as_str()) {
                        continue;
                    }
                    (
                        lead_name.clone(),
                        json!({
                            "type": "task_completed",
                            "taskId": task_id,
                            "subject": subject,
                            "completedBy": by,
                        }),
                        format!("Task {} completed", task_id),
                    )
                }
            };
            let message = InboxMessage::new(
                &lead_name,
                &recipient,
                MessageType::Message,
                &payload.to_string(),
                Some(summary),
                &lead_color,
            );
            if let Err(e) = inbox::append(&self.paths, team_name, &recipient, message) {
                tracing::warn!(team = team_name, recipient = %recipient, error = %e, "task notification failed");
            }
        }
    }

    fn task_list(&self, p: TeamNameParams) -> Result<Value> {
        Ok(serde_json::to_value(tasks::list_tasks(
            &self.paths,
            &p.team_name,
        )?)?)
    }

    fn task_get(&self, p: TaskGetParams) -> Result<Value> {
        Ok(serde_json::to_value(tasks::get_task(
            &self.paths,
            &p.team_name,
            p.id,
        )?)?)
    }

    async fn check_agent_health(&self, p: MemberParams) -> Result<Value> {
        Ok(serde_json::to_value(
            self.spawner.check_agent_health(&p.team_name, &p.name).await?,
        )?)
    }

    async fn check_all_agents_health(&self, p: TeamNameParams) -> Result<Value> {
        Ok(serde_json::to_value(
            self.spawner.check_all_agents_health(&p.team_name).await?,
        )?)
    }
}

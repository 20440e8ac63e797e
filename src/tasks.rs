//! Task engine: CRUD, status machine, and dependency-graph maintenance.
//!
//! Tasks are stored one file per task (`tasks/<team>/<id>.json`) so that
//! individual updates stay atomic without a global rewrite; reads scan the
//! directory. All mutation for a team is serialized by that team's tasks
//! lock. `blocks`/`blocked_by` are kept bidirectional and the `blocks` edge
//! set acyclic at all times.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::Deserialize;

use crate::error::{Result, TeamsError};
use crate::model::{now_ms, Task, TaskStatus};
use crate::store::{atomic, ScopedLock, StorePaths};

/// Requested changes for one `update_task` call. Absent fields keep their
/// current value; `blocks`/`blocked_by` are full-set replacements.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub owner: Option<String>,
    pub subject: Option<String>,
    pub description: Option<String>,
    pub blocks: Option<Vec<u64>>,
    pub blocked_by: Option<Vec<u64>>,
}

/// Side effects of a successful update, delivered to inboxes by the caller
/// after the tasks lock is released.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    Assigned {
        owner: String,
        task_id: u64,
        subject: String,
    },
    Completed {
        task_id: u64,
        subject: String,
        by: Option<String>,
    },
}

/// Read every task of a team, sorted by id. Fails `ErrNotFound` when the
/// team's task directory does not exist.
pub fn list_tasks(paths: &StorePaths, team: &str) -> Result<Vec<Task>> {
    let dir = paths.tasks_dir(team);
    if !dir.exists() {
        return Err(TeamsError::NotFound(format!("team '{}'", team)));
    }
    let mut tasks = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let path = entry?.path();
        let is_task_file = path.extension().is_some_and(|ext| ext == "json")
            && path
                .file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|s| s.parse::<u64>().is_ok());
        if !is_task_file {
            continue;
        }
        tasks.push(atomic::read_json::<Task>(&path)?);
    }
    tasks.sort_by_key(|t| t.id);
    Ok(tasks)
}

pub fn get_task(paths: &StorePaths, team: &str, id: u64) -> Result<Task> {
    atomic::read_json_opt(&paths.task_file(team, id))?
        .ok_or_else(|| TeamsError::NotFound(format!("task {} in team '{}'", id, team)))
}

/// Create a task with the next monotonic id (max + 1, starting at 1).
///
/// Every `blocked_by` id must name an existing non-terminal task; each named
/// predecessor gains the new task in its `blocks` set.
pub fn create_task(
    paths: &StorePaths,
    team: &str,
    subject: &str,
    description: &str,
    blocked_by: Vec<u64>,
) -> Result<Task> {
    if subject.trim().is_empty() {
        return Err(TeamsError::InvalidArg("subject must not be empty".into()));
    }

    let _lock = ScopedLock::acquire(&paths.tasks_lock(team))?;
    let mut all: BTreeMap<u64, Task> = list_tasks(paths, team)?
        .into_iter()
        .map(|t| (t.id, t))
        .collect();

    let id = all.keys().next_back().map(|&max| max + 1).unwrap_or(1);
    let blocked_by = dedup(blocked_by);
    for &dep in &blocked_by {
        let pred = all
            .get(&dep)
            .ok_or_else(|| TeamsError::InvalidArg(format!("unknown predecessor task {}", dep)))?;
        if pred.status.is_terminal() {
            return Err(TeamsError::InvalidArg(format!(
                "predecessor task {} is {}",
                dep, pred.status
            )));
        }
    }

    let task = Task::new(id, subject, description, blocked_by.clone());
    atomic::write_json(&paths.task_file(team, id), &task)?;

    let now = now_ms();
    for dep in blocked_by {
        let pred = all.get_mut(&dep).expect("validated above");
        pred.blocks.push(id);
        pred.updated_at = now;
        atomic::write_json(&paths.task_file(team, dep), pred)?;
    }

    tracing::debug!(team, task_id = id, "created task");
    Ok(task)
}

/// Apply a patch to one task as a four-phase transaction under the tasks
/// lock: read, validate, mutate, write. All validation runs before the first
/// write; a mid-sequence write failure surfaces `ErrStorage` with
/// possibly-partial state (the lock serialized the caller).
pub fn update_task(
    paths: &StorePaths,
    team: &str,
    id: u64,
    patch: TaskPatch,
) -> Result<(Task, Vec<TaskEvent>)> {
    let _lock = ScopedLock::acquire(&paths.tasks_lock(team))?;

    // Phase 1: read.
    let mut all: BTreeMap<u64, Task> = list_tasks(paths, team)?
        .into_iter()
        .map(|t| (t.id, t))
        .collect();
    let current = all
        .get(&id)
        .cloned()
        .ok_or_else(|| TeamsError::NotFound(format!("task {} in team '{}'", id, team)))?;

    let new_blocked_by = dedup(patch.blocked_by.unwrap_or_else(|| current.blocked_by.clone()));
    let new_blocks = dedup(patch.blocks.unwrap_or_else(|| current.blocks.clone()));

    // Phase 2: validate.
    if new_blocked_by.contains(&id) || new_blocks.contains(&id) {
        return Err(TeamsError::InvalidArg(format!(
            "task {} may not reference itself",
            id
        )));
    }
    for edge in new_blocked_by.iter().chain(new_blocks.iter()) {
        if !all.contains_key(edge) {
            return Err(TeamsError::InvalidArg(format!("unknown task {}", edge)));
        }
    }

    let added_preds = diff(&new_blocked_by, &current.blocked_by);
    let removed_preds = diff(&current.blocked_by, &new_blocked_by);
    let added_succs = diff(&new_blocks, &current.blocks);
    let removed_succs = diff(&current.blocks, &new_blocks);

    for edge in added_preds.iter().chain(added_succs.iter()) {
        let other = &all[edge];
        if other.status.is_terminal() {
            return Err(TeamsError::InvalidArg(format!(
                "task {} is {} and cannot take new dependency edges",
                edge, other.status
            )));
        }
    }

    detect_cycle(&all, id, &new_blocked_by, &added_succs, &removed_succs)?;

    if let Some(next) = patch.status {
        if next != current.status {
            if !current.status.can_transition(next) {
                return Err(TeamsError::IllegalTransition(format!(
                    "task {} cannot move from {} to {}",
                    id, current.status, next
                )));
            }
            if next == TaskStatus::InProgress && !new_blocked_by.is_empty() {
                return Err(TeamsError::IllegalTransition(format!(
                    "task {} is still blocked by {:?}",
                    id, new_blocked_by
                )));
            }
        }
    }

    // Phase 3: mutate.
    let now = now_ms();
    let mut touched: BTreeSet<u64> = BTreeSet::new();
    touched.insert(id);

    let mut events = Vec::new();
    if let Some(owner) = &patch.owner {
        if current.owner.as_deref() != Some(owner.as_str()) {
            events.push(TaskEvent::Assigned {
                owner: owner.clone(),
                task_id: id,
                subject: patch
                    .subject
                    .clone()
                    .unwrap_or_else(|| current.subject.clone()),
            });
        }
    }

    {
        let task = all.get_mut(&id).expect("target read above");
        if let Some(subject) = patch.subject {
            task.subject = subject;
        }
        if let Some(description) = patch.description {
            task.description = description;
        }
        if let Some(owner) = patch.owner {
            task.owner = Some(owner);
        }
        if let Some(status) = patch.status {
            task.status = status;
        }
        task.blocked_by = new_blocked_by;
        task.blocks = new_blocks;
    }

    for pred in &added_preds {
        all.get_mut(pred).expect("validated").blocks.push(id);
        touched.insert(*pred);
    }
    for pred in &removed_preds {
        all.get_mut(pred)
            .expect("read above")
            .blocks
            .retain(|&b| b != id);
        touched.insert(*pred);
    }
    for succ in &added_succs {
        all.get_mut(succ).expect("validated").blocked_by.push(id);
        touched.insert(*succ);
    }
    for succ in &removed_succs {
        all.get_mut(succ)
            .expect("read above")
            .blocked_by
            .retain(|&b| b != id);
        touched.insert(*succ);
    }

    let completed_now =
        patch.status == Some(TaskStatus::Completed) && current.status != TaskStatus::Completed;
    if completed_now {
        // Completion cascade: unblock every successor and drop the mirror.
        let successors: Vec<u64> = all[&id].blocks.clone();
        for succ in successors {
            all.get_mut(&succ)
                .expect("edges are bidirectional")
                .blocked_by
                .retain(|&b| b != id);
            touched.insert(succ);
        }
        all.get_mut(&id).expect("target read above").blocks.clear();
        events.push(TaskEvent::Completed {
            task_id: id,
            subject: all[&id].subject.clone(),
            by: all[&id].owner.clone(),
        });
    }

    for t in &touched {
        all.get_mut(t).expect("touched tasks were read").updated_at = now;
    }

    // Phase 4: write every modified task.
    for t in &touched {
        atomic::write_json(&paths.task_file(team, *t), &all[t])?;
    }

    tracing::debug!(team, task_id = id, touched = touched.len(), "updated task");
    Ok((all[&id].clone(), events))
}

/// Reset `owner` to null on every task owned by `agent`, keeping task state
/// intact. Returns the affected task ids.
pub fn clear_owner(paths: &StorePaths, team: &str, agent: &str) -> Result<Vec<u64>> {
    let _lock = ScopedLock::acquire(&paths.tasks_lock(team))?;
    let mut cleared = Vec::new();
    let now = now_ms();
    for mut task in list_tasks(paths, team)? {
        if task.owner.as_deref() == Some(agent) {
            task.owner = None;
            task.updated_at = now;
            atomic::write_json(&paths.task_file(team, task.id), &task)?;
            cleared.push(task.id);
        }
    }
    Ok(cleared)
}

/// Reject the update when the proposed edge set would make `id` transitively
/// depend on itself: BFS over `blocked_by` edges from the new predecessor
/// set back toward `id`.
fn detect_cycle(
    all: &BTreeMap<u64, Task>,
    id: u64,
    new_blocked_by: &[u64],
    added_succs: &[u64],
    removed_succs: &[u64],
) -> Result<()> {
    let preds_of = |node: u64| -> Vec<u64> {
        if node == id {
            return new_blocked_by.to_vec();
        }
        let mut preds = all[&node].blocked_by.clone();
        if added_succs.contains(&node) && !preds.contains(&id) {
            preds.push(id);
        }
        if removed_succs.contains(&node) {
            preds.retain(|&p| p != id);
        }
        preds
    };

    let mut queue: VecDeque<u64> = new_blocked_by.iter().copied().collect();
    let mut visited: BTreeSet<u64> = BTreeSet::new();
    while let Some(node) = queue.pop_front() {
        if node == id {
            return Err(TeamsError::Cycle(format!(
                "edge would make task {} depend on itself",
                id
            )));
        }
        if !visited.insert(node) {
            continue;
        }
        queue.extend(preds_of(node));
    }
    Ok(())
}

fn dedup(ids: Vec<u64>) -> Vec<u64> {
    let mut seen = BTreeSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

/// Elements of `a` not present in `b`, in `a`'s order.
fn diff(a: &[u64], b: &[u64]) -> Vec<u64> {
    a.iter().filter(|x| !b.contains(x)).copied().collect()
}

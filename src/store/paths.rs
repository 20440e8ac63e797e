use std::path::{Path, PathBuf};

/// Environment variable overriding the state root directory.
pub const ROOT_DIR_ENV: &str = "OPENCODE_TEAMS_DIR";

/// Resolved locations of every persisted file.
///
/// Layout under the root:
///
/// ```text
/// teams/<team>/config.json
/// teams/<team>/.lock
/// teams/<team>/inboxes/<agent>.json
/// teams/<team>/inboxes/.lock
/// teams/<team>/health.json
/// tasks/<team>/<id>.json
/// tasks/<team>/.lock
/// ```
#[derive(Debug, Clone)]
pub struct StorePaths {
    root: PathBuf,
}

impl StorePaths {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Pick the root: explicit override, then `OPENCODE_TEAMS_DIR`, then
    /// `<home>/.opencode-teams`.
    pub fn resolve(explicit: Option<PathBuf>) -> Self {
        let root = explicit
            .or_else(|| std::env::var_os(ROOT_DIR_ENV).map(PathBuf::from))
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".opencode-teams")
            });
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn teams_dir(&self) -> PathBuf {
        self.root.join("teams")
    }

    pub fn team_dir(&self, team: &str) -> PathBuf {
        self.teams_dir().join(team)
    }

    pub fn team_config(&self, team: &str) -> PathBuf {
        self.team_dir(team).join("config.json")
    }

    pub fn team_lock(&self, team: &str) -> PathBuf {
        self.team_dir(team).join(".lock")
    }

    pub fn inboxes_dir(&self, team: &str) -> PathBuf {
        self.team_dir(team).join("inboxes")
    }

    pub fn inbox_file(&self, team: &str, agent: &str) -> PathBuf {
        self.inboxes_dir(team).join(format!("{}.json", agent))
    }

    pub fn inbox_lock(&self, team: &str) -> PathBuf {
        self.inboxes_dir(team).join(".lock")
    }

    pub fn health_file(&self, team: &str) -> PathBuf {
        self.team_dir(team).join("health.json")
    }

    pub fn tasks_dir(&self, team: &str) -> PathBuf {
        self.root.join("tasks").join(team)
    }

    pub fn task_file(&self, team: &str, id: u64) -> PathBuf {
        self.tasks_dir(team).join(format!("{}.json", id))
    }

    pub fn tasks_lock(&self, team: &str) -> PathBuf {
        self.tasks_dir(team).join(".lock")
    }
}

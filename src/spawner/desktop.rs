//! Desktop-app backend: binary discovery, detached launch, PID lifecycle.
//!
//! Discovery order: environment override, known per-OS install paths, then
//! the executable search path. The launched process is fully detached (new
//! process group on POSIX, detached process group on Windows); the
//! coordinator only keeps its PID.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::error::{Result, TeamsError};

/// Environment variable naming the desktop binary path.
pub const DESKTOP_BINARY_ENV: &str = "OPENCODE_TEAMS_DESKTOP_BIN";

const DESKTOP_BINARY_NAME: &str = "opencode-desktop";

fn known_paths() -> Vec<PathBuf> {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"));
    if cfg!(target_os = "macos") {
        vec![
            PathBuf::from("/Applications/OpenCode.app/Contents/MacOS/opencode-desktop"),
            home.join("Applications/OpenCode.app/Contents/MacOS/opencode-desktop"),
        ]
    } else if cfg!(target_os = "windows") {
        let mut paths = Vec::new();
        if let Some(local) = dirs::data_local_dir() {
            paths.push(local.join("Programs/OpenCode/opencode-desktop.exe"));
        }
        paths.push(PathBuf::from(
            "C:\\Program Files\\OpenCode\\opencode-desktop.exe",
        ));
        paths
    } else {
        vec![
            PathBuf::from("/usr/local/bin/opencode-desktop"),
            PathBuf::from("/opt/opencode-desktop/opencode-desktop"),
            home.join(".local/bin/opencode-desktop"),
        ]
    }
}

/// Locate the desktop binary.
pub fn discover_desktop_binary() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(DESKTOP_BINARY_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(path);
        }
        return Err(TeamsError::Spawn(format!(
            "{} points at {}, which does not exist",
            DESKTOP_BINARY_ENV,
            path.display()
        )));
    }

    for candidate in known_paths() {
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    if let Some(found) = find_in_path(DESKTOP_BINARY_NAME) {
        return Ok(found);
    }

    Err(TeamsError::Spawn(
        "could not find the OpenCode desktop binary (set OPENCODE_TEAMS_DESKTOP_BIN)".into(),
    ))
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = if cfg!(target_os = "windows") {
            dir.join(format!("{}.exe", name))
        } else {
            dir.join(name)
        };
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// Launch the desktop app detached, passing the identity-file path on the
/// command line. Returns the child PID; the coordinator never reads its
/// stdout.
pub fn launch_desktop(binary: &Path, identity_file: &Path, cwd: &str) -> Result<u32> {
    let mut command = std::process::Command::new(binary);
    command
        .arg(identity_file)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        const DETACHED_PROCESS: u32 = 0x0000_0008;
        command.creation_flags(CREATE_NEW_PROCESS_GROUP | DETACHED_PROCESS);
    }

    let child = command.spawn().map_err(|e| {
        TeamsError::Spawn(format!("failed to launch {}: {}", binary.display(), e))
    })?;
    Ok(child.id())
}

/// PID liveness test. On POSIX this is a signal-0 probe.
pub fn process_alive(pid: u32) -> bool {
    if pid == 0 || pid > i32::MAX as u32 {
        return false;
    }
    #[cfg(unix)]
    {
        nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok()
    }
    #[cfg(not(unix))]
    {
        std::process::Command::new("tasklist")
            .args(["/FI", &format!("PID eq {}", pid), "/NH"])
            .output()
            .map(|o| String::from_utf8_lossy(&o.stdout).contains(&pid.to_string()))
            .unwrap_or(false)
    }
}

/// Terminate a desktop process. Already-dead processes are swallowed.
pub fn kill_process(pid: u32) {
    if pid == 0 || pid > i32::MAX as u32 {
        return;
    }
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        if let Err(e) = kill(nix::unistd::Pid::from_raw(pid as i32), Signal::SIGTERM) {
            tracing::debug!(pid, error = %e, "SIGTERM to desktop process failed");
        }
    }
    #[cfg(not(unix))]
    {
        let _ = std::process::Command::new("taskkill")
            .args(["/PID", &pid.to_string()])
            .output();
    }
}

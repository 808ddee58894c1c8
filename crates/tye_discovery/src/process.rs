//! OS process enumeration.
//!
//! Enumeration fails soft: an error reads as "no processes", which callers
//! already treat as a valid transient state.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::ffi::OsStr;
use std::path::Path;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub command_line: String,
}

#[async_trait]
pub trait ProcessEnumerator: Send + Sync {
    /// Processes running `executable`, by bare name or full path.
    async fn list_processes(&self, executable: &Path) -> Vec<ProcessInfo>;

    /// Descendants of `pid` paired with their depth below it (children are depth 1).
    async fn descendants(&self, pid: u32) -> Vec<(ProcessInfo, usize)>;
}

fn strip_exe(name: &str) -> &str {
    match name.len().checked_sub(4).and_then(|stem| name.get(stem..).map(|suffix| (stem, suffix))) {
        Some((stem, suffix)) if stem > 0 && suffix.eq_ignore_ascii_case(".exe") => &name[..stem],
        _ => name,
    }
}

fn same_image(a: &str, b: &str) -> bool {
    if cfg!(windows) {
        strip_exe(a).eq_ignore_ascii_case(strip_exe(b))
    } else {
        strip_exe(a) == strip_exe(b)
    }
}

fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Whether a process was started from `executable`.
///
/// Matches the image name, a command line invoking the bare name or the full
/// path, a command line whose first token is some path ending in the name (a
/// global tool shim), and a shell wrapper (`sh -c "tye run"`) whose script
/// starts with either form.
pub fn matches_executable(
    process: &ProcessInfo,
    executable: &Path,
    is_file: impl Fn(&Path) -> bool,
) -> bool {
    let file_path = executable.to_string_lossy();
    let Some(file_name) = executable.file_name().map(OsStr::to_string_lossy) else {
        return false;
    };

    if same_image(&process.name, &file_name) {
        return true;
    }

    let invokes = |command: &str| {
        command.starts_with(&format!("{file_name} ")) || command.starts_with(&format!("{file_path} "))
    };

    let cmd = process.command_line.as_str();
    if invokes(cmd) {
        return true;
    }

    if let Some((first, _)) = cmd.split_once(' ') {
        if first.contains(['/', '\\']) && same_image(basename(first), &file_name) && is_file(Path::new(first)) {
            return true;
        }
    }

    if let Some((_, script)) = cmd.split_once(" -c ") {
        let script = script.trim_matches(|c| c == '"' || c == '\'');
        if invokes(script) {
            return true;
        }
    }

    false
}

/// Picks the deepest descendant matching the highest-priority image pattern.
pub fn select_attach_target(descendants: &[(ProcessInfo, usize)], patterns: &[String]) -> Option<u32> {
    patterns.iter().find_map(|pattern| {
        descendants
            .iter()
            .filter(|(process, _)| strip_exe(&process.name).eq_ignore_ascii_case(strip_exe(pattern)))
            .max_by_key(|(_, depth)| *depth)
            .map(|(process, _)| process.pid)
    })
}

/// Enumerates through `sysinfo`; each refresh runs on the blocking pool.
#[derive(Debug, Default, Clone)]
pub struct SystemProcessEnumerator;

impl SystemProcessEnumerator {
    pub fn new() -> Self {
        Self
    }

    fn snapshot() -> System {
        let mut system = System::new();
        system.refresh_processes_specifics(ProcessesToUpdate::All, true, ProcessRefreshKind::everything());
        system
    }

    fn info(pid: sysinfo::Pid, process: &sysinfo::Process) -> ProcessInfo {
        let command_line = process
            .cmd()
            .iter()
            .map(|arg| arg.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");

        ProcessInfo {
            pid: pid.as_u32(),
            name: process.name().to_string_lossy().to_string(),
            command_line,
        }
    }
}

#[async_trait]
impl ProcessEnumerator for SystemProcessEnumerator {
    async fn list_processes(&self, executable: &Path) -> Vec<ProcessInfo> {
        let executable = executable.to_path_buf();

        let listed = tokio::task::spawn_blocking(move || {
            let system = Self::snapshot();
            system
                .processes()
                .iter()
                .map(|(pid, process)| Self::info(*pid, process))
                .filter(|info| matches_executable(info, &executable, Path::is_file))
                .collect::<Vec<_>>()
        })
        .await;

        match listed {
            Ok(processes) => processes,
            Err(e) => {
                tracing::debug!("Process enumeration failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn descendants(&self, root: u32) -> Vec<(ProcessInfo, usize)> {
        let walked = tokio::task::spawn_blocking(move || {
            let system = Self::snapshot();

            let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
            for (pid, process) in system.processes() {
                if let Some(parent) = process.parent() {
                    children.entry(parent.as_u32()).or_default().push(pid.as_u32());
                }
            }

            let mut found = Vec::new();
            let mut queue = VecDeque::from([(root, 0usize)]);
            while let Some((current, depth)) = queue.pop_front() {
                for &child in children.get(&current).map(Vec::as_slice).unwrap_or_default() {
                    // Guards against pid reuse forming a cycle.
                    if child == root || found.iter().any(|(info, _): &(ProcessInfo, usize)| info.pid == child) {
                        continue;
                    }
                    if let Some(process) = system.process(sysinfo::Pid::from_u32(child)) {
                        found.push((Self::info(sysinfo::Pid::from_u32(child), process), depth + 1));
                        queue.push_back((child, depth + 1));
                    }
                }
            }
            found
        })
        .await;

        walked.unwrap_or_else(|e| {
            tracing::debug!("Process tree walk failed: {}", e);
            Vec::new()
        })
    }
}

//! Scanning the process table for the ACL process group.

use log::debug;
use procfs::process::{ProcState, all_processes_with_root};
use std::fs;
use std::path::{Path, PathBuf};

/// The command-line fragments that identify the ACL process group.
#[derive(Debug, Clone, Copy)]
pub struct TargetSpec {
    pub patterns: [&'static str; 3],
}

/// Service manager, proxy and agent of the Android compatibility layer.
pub const ACL_TARGETS: TargetSpec = TargetSpec {
    patterns: ["omww-service-mngr", "omww-proxy", "vfb-agent"],
};

impl TargetSpec {
    /// Plain, case-sensitive substring match against any argument.
    pub fn matches(&self, cmdline: &[u8]) -> bool {
        self.patterns
            .iter()
            .any(|pattern| contains(cmdline, pattern.as_bytes()))
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Stopped,
    /// The status line was missing or malformed. Counts as running.
    Unknown,
}

impl RunState {
    pub fn is_running(self) -> bool {
        self != RunState::Stopped
    }
}

#[derive(Debug, Clone)]
pub struct ProcessRecord {
    pub pid: i32,
    pub cmdline: Vec<u8>,
    pub state: RunState,
    /// Raw state character from the stat line, if one could be read.
    pub state_char: Option<char>,
}

impl ProcessRecord {
    /// Basename of the first argument, for display.
    pub fn program(&self) -> String {
        let argv0 = self.cmdline.split(|b| *b == 0).next().unwrap_or_default();
        let argv0 = String::from_utf8_lossy(argv0);
        argv0.rsplit('/').next().unwrap_or_default().to_string()
    }

    /// Whole command line with NULs shown as spaces.
    pub fn command(&self) -> String {
        let args: Vec<String> = self
            .cmdline
            .split(|b| *b == 0)
            .filter(|arg| !arg.is_empty())
            .map(|arg| String::from_utf8_lossy(arg).into_owned())
            .collect();
        args.join(" ")
    }

    /// Kernel state name, e.g. "sleeping" or "stopped".
    pub fn state_name(&self) -> String {
        match self.state_char.and_then(ProcState::from_char) {
            Some(state) => format!("{:?}", state).to_lowercase(),
            None => "unknown".to_string(),
        }
    }
}

/// Extracts the state character from a `/proc/<pid>/stat` line.
///
/// The command name may itself contain parentheses or bytes that are not
/// UTF-8, so the state is found relative to the last `)` in the raw line.
pub fn parse_stat_state(line: &[u8]) -> Option<char> {
    let close = line.iter().rposition(|b| *b == b')')?;
    match line.get(close + 1..close + 3)? {
        [b' ', state] => Some(char::from(*state)),
        _ => None,
    }
}

/// `T` (stopped) and `t` (tracing stop) are the only suspended states.
pub fn classify(state: Option<char>) -> RunState {
    match state {
        Some('T') | Some('t') => RunState::Stopped,
        Some(_) => RunState::Running,
        None => RunState::Unknown,
    }
}

/// Anything that can tell whether the ACL group is alive.
pub trait TargetProbe {
    fn any_target_running(&self) -> bool;
}

pub struct ProcessScanner {
    root: PathBuf,
    targets: TargetSpec,
}

impl ProcessScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_targets(root, ACL_TARGETS)
    }

    pub fn with_targets(root: impl Into<PathBuf>, targets: TargetSpec) -> Self {
        ProcessScanner {
            root: root.into(),
            targets,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lazily walks the process table, yielding matching processes.
    ///
    /// Processes that vanish or deny access mid-walk are skipped. If the
    /// root itself cannot be read, nothing is yielded. Calling this again
    /// starts a fresh walk.
    pub fn targets(&self) -> impl Iterator<Item = ProcessRecord> + '_ {
        let processes = match all_processes_with_root(&self.root) {
            Ok(iter) => Some(iter),
            Err(e) => {
                debug!("cannot enumerate {}: {}", self.root.display(), e);
                None
            }
        };

        processes
            .into_iter()
            .flatten()
            .filter_map(|process| process.ok())
            .filter_map(move |process| {
                let pid = process.pid();
                let cmdline = fs::read(self.pid_path(pid, "cmdline")).ok()?;
                if !self.targets.matches(&cmdline) {
                    return None;
                }
                let state_char = self.read_state(pid);
                Some(ProcessRecord {
                    pid,
                    cmdline,
                    state: classify(state_char),
                    state_char,
                })
            })
    }

    pub fn scan(&self) -> Vec<ProcessRecord> {
        self.targets().collect()
    }

    /// False only when the kernel reports the process stopped or traced.
    pub fn is_state_running(&self, pid: i32) -> bool {
        classify(self.read_state(pid)).is_running()
    }

    fn read_state(&self, pid: i32) -> Option<char> {
        let line = fs::read(self.pid_path(pid, "stat")).ok()?;
        parse_stat_state(&line)
    }

    fn pid_path(&self, pid: i32, file: &str) -> PathBuf {
        self.root.join(pid.to_string()).join(file)
    }
}

impl TargetProbe for ProcessScanner {
    fn any_target_running(&self) -> bool {
        let found = self.targets().find(|record| self.is_state_running(record.pid));
        if let Some(record) = &found {
            debug!("ACL member {} ({}) is running", record.pid, record.program());
        }
        found.is_some()
    }
}

//! The one-way command channel to the privileged helper daemon.
//!
//! The daemon lives outside the app jail and watches a shared file. Each
//! write replaces whatever command was pending; nothing is ever read back.

use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_CONTROL_FILE: &str = "/media/internal/.acl-control";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleCommand {
    Stop,
    Start,
}

impl ToggleCommand {
    pub fn token(self) -> &'static str {
        match self {
            ToggleCommand::Stop => "stop",
            ToggleCommand::Start => "start",
        }
    }

    /// Whether the group should be running once the daemon has acted.
    pub fn wants_running(self) -> bool {
        self == ToggleCommand::Start
    }
}

impl fmt::Display for ToggleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("failed to write control file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub trait CommandSink {
    fn send(&mut self, command: ToggleCommand) -> Result<(), ControlError>;
}

pub struct ControlFile {
    path: PathBuf,
}

impl ControlFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ControlFile { path: path.into() }
    }
}

impl CommandSink for ControlFile {
    fn send(&mut self, command: ToggleCommand) -> Result<(), ControlError> {
        fs::write(&self.path, format!("{}\n", command.token())).map_err(|source| {
            ControlError::Write {
                path: self.path.clone(),
                source,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_replaces_pending_command() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".acl-control");
        fs::write(&path, "some much longer stale content\n").unwrap();

        let mut sink = ControlFile::new(&path);
        sink.send(ToggleCommand::Stop).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "stop\n");

        sink.send(ToggleCommand::Start).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "start\n");
    }

    #[test]
    fn test_write_failure_names_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("no-such-dir").join(".acl-control");

        let err = ControlFile::new(&path).send(ToggleCommand::Stop).unwrap_err();
        assert!(err.to_string().contains("no-such-dir"));
    }

    #[test]
    fn test_tokens() {
        assert_eq!(ToggleCommand::Stop.to_string(), "stop");
        assert_eq!(ToggleCommand::Start.to_string(), "start");
        assert!(ToggleCommand::Start.wants_running());
        assert!(!ToggleCommand::Stop.wants_running());
    }
}

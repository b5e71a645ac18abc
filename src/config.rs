//! Configuration for the ACL manager.

use crate::control::DEFAULT_CONTROL_FILE;
use crate::toggle::DEFAULT_SETTLE_INTERVAL;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// File watched by the privileged helper daemon
    pub control_file: PathBuf,

    /// Root of the process table
    pub proc_root: PathBuf,

    /// Wait after each command before re-checking (in milliseconds)
    pub settle_interval_ms: u64,

    /// Log level when RUST_LOG is not set
    pub log_level: String,

    /// Where the terminal UI sends its log output
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            control_file: PathBuf::from(DEFAULT_CONTROL_FILE),
            proc_root: PathBuf::from("/proc"),
            settle_interval_ms: DEFAULT_SETTLE_INTERVAL.as_millis() as u64,
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl Config {
    /// Load from a TOML file, or use defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;
    use std::io::Write;

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.control_file, PathBuf::from("/media/internal/.acl-control"));
        assert_eq!(config.proc_root, PathBuf::from("/proc"));
        assert_eq!(config.settle_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_partial_override() {
        let config = Config::parse("settle_interval_ms = 250\nlog_file = \"/tmp/acl.log\"\n").unwrap();
        assert_eq!(config.settle_interval_ms, 250);
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/acl.log")));
        assert_eq!(config.proc_root, PathBuf::from("/proc"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "control_file = \"/tmp/ctl\"").unwrap();
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.control_file, PathBuf::from("/tmp/ctl"));
    }

    #[test]
    fn test_load_errors() {
        assert!(Config::load(Some(Path::new("/nonexistent/acl.toml"))).is_err());
        assert!(Config::parse("settle_interval_ms = \"soon\"").is_err());
        assert_eq!(Config::load(None).unwrap(), Config::default());
    }
}

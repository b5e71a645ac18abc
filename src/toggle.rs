//! Stop/start coordination for the ACL process group.

use crate::control::{CommandSink, ToggleCommand};
use crate::process::TargetProbe;
use chrono::{DateTime, Local};
use log::{info, warn};
use std::thread;
use std::time::Duration;

pub const DEFAULT_SETTLE_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclState {
    Unknown,
    Running,
    Stopped,
}

/// What the presentation layer shows after every call.
#[derive(Debug, Clone)]
pub struct SystemStatus {
    pub running: bool,
    pub message: String,
    pub state: AclState,
    pub updated_at: DateTime<Local>,
}

impl SystemStatus {
    fn new() -> Self {
        SystemStatus {
            running: false,
            message: "Ready".to_string(),
            state: AclState::Unknown,
            updated_at: Local::now(),
        }
    }

    fn set(&mut self, running: bool, message: &str) {
        self.running = running;
        self.message = message.to_string();
        self.updated_at = Local::now();
    }
}

pub struct Coordinator<P, S> {
    probe: P,
    sink: S,
    settle: Duration,
    status: SystemStatus,
}

impl<P: TargetProbe, S: CommandSink> Coordinator<P, S> {
    pub fn new(probe: P, sink: S, settle: Duration) -> Self {
        Coordinator {
            probe,
            sink,
            settle,
            status: SystemStatus::new(),
        }
    }

    pub fn status(&self) -> &SystemStatus {
        &self.status
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Startup scan. Leaves the state machine alone.
    pub fn detect(&mut self) -> &SystemStatus {
        if self.probe.any_target_running() {
            self.status.set(true, "ACL Running");
        } else {
            self.status.set(false, "ACL Not Detected");
        }
        &self.status
    }

    pub fn request_stop(&mut self) -> &SystemStatus {
        self.request(ToggleCommand::Stop)
    }

    pub fn request_start(&mut self) -> &SystemStatus {
        self.request(ToggleCommand::Start)
    }

    /// Sends `command`, then waits for the daemon to act.
    ///
    /// The daemon never acknowledges, so after two settle intervals the
    /// requested end state is reported whether or not it was observed.
    /// Blocks the caller for one or two settle intervals.
    fn request(&mut self, command: ToggleCommand) -> &SystemStatus {
        info!("requesting ACL {}", command);
        if let Err(e) = self.sink.send(command) {
            warn!("{}; request dropped", e);
        }

        let wanted = command.wants_running();
        thread::sleep(self.settle);
        if self.probe.any_target_running() != wanted {
            thread::sleep(self.settle);
            if self.probe.any_target_running() != wanted {
                info!("ACL {} not observed yet, assuming the daemon will converge", command);
            }
        }

        match command {
            ToggleCommand::Stop => {
                self.status.state = AclState::Stopped;
                self.status.set(false, "ACL Stopped");
            }
            ToggleCommand::Start => {
                self.status.state = AclState::Running;
                self.status.set(true, "ACL Resumed");
            }
        }
        &self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{ControlError, ControlFile};
    use crate::process::tests::FakeProc;
    use std::cell::{Cell, RefCell};
    use std::fs;
    use std::io;
    use std::path::PathBuf;

    /// Replays canned scan results and counts the scans.
    struct ScriptedProbe {
        readings: RefCell<Vec<bool>>,
        scans: Cell<usize>,
    }

    impl ScriptedProbe {
        fn new(readings: &[bool]) -> Self {
            ScriptedProbe {
                readings: RefCell::new(readings.iter().rev().copied().collect()),
                scans: Cell::new(0),
            }
        }
    }

    impl TargetProbe for ScriptedProbe {
        fn any_target_running(&self) -> bool {
            self.scans.set(self.scans.get() + 1);
            self.readings.borrow_mut().pop().unwrap_or(false)
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        sent: Vec<ToggleCommand>,
        fail: bool,
    }

    impl CommandSink for RecordingSink {
        fn send(&mut self, command: ToggleCommand) -> Result<(), ControlError> {
            self.sent.push(command);
            if self.fail {
                return Err(ControlError::Write {
                    path: PathBuf::from("/media/internal/.acl-control"),
                    source: io::Error::from(io::ErrorKind::PermissionDenied),
                });
            }
            Ok(())
        }
    }

    fn coordinator(readings: &[bool]) -> Coordinator<ScriptedProbe, RecordingSink> {
        Coordinator::new(ScriptedProbe::new(readings), RecordingSink::default(), Duration::ZERO)
    }

    #[test]
    fn test_initial_status() {
        let coordinator = coordinator(&[]);
        assert_eq!(coordinator.status().message, "Ready");
        assert_eq!(coordinator.status().state, AclState::Unknown);
    }

    #[test]
    fn test_detect() {
        let mut coordinator = coordinator(&[true, false]);
        let status = coordinator.detect();
        assert!(status.running);
        assert_eq!(status.message, "ACL Running");

        let status = coordinator.detect();
        assert!(!status.running);
        assert_eq!(status.message, "ACL Not Detected");
        assert_eq!(status.state, AclState::Unknown);
        assert!(coordinator.sink.sent.is_empty());
    }

    #[test]
    fn test_stop_confirmed_on_first_scan() {
        let mut coordinator = coordinator(&[false]);
        let status = coordinator.request_stop();
        assert!(!status.running);
        assert_eq!(status.message, "ACL Stopped");
        assert_eq!(status.state, AclState::Stopped);
        assert_eq!(coordinator.probe.scans.get(), 1);
        assert_eq!(coordinator.sink.sent, vec![ToggleCommand::Stop]);
    }

    #[test]
    fn test_stop_reported_even_if_still_running() {
        let mut coordinator = coordinator(&[true, true]);
        let status = coordinator.request_stop();
        assert!(!status.running);
        assert_eq!(status.message, "ACL Stopped");
        assert_eq!(status.state, AclState::Stopped);
        assert_eq!(coordinator.probe.scans.get(), 2);
    }

    #[test]
    fn test_start_reported_even_if_not_observed() {
        let mut coordinator = coordinator(&[false, false]);
        let status = coordinator.request_start();
        assert!(status.running);
        assert_eq!(status.message, "ACL Resumed");
        assert_eq!(status.state, AclState::Running);
        assert_eq!(coordinator.probe.scans.get(), 2);
        assert_eq!(coordinator.sink.sent, vec![ToggleCommand::Start]);
    }

    #[test]
    fn test_start_confirmed_on_first_scan() {
        let mut coordinator = coordinator(&[true]);
        coordinator.request_start();
        assert_eq!(coordinator.probe.scans.get(), 1);
    }

    #[test]
    fn test_failed_write_still_reports_requested_state() {
        let mut coordinator = Coordinator::new(
            ScriptedProbe::new(&[true, true]),
            RecordingSink {
                fail: true,
                ..Default::default()
            },
            Duration::ZERO,
        );
        let status = coordinator.request_stop();
        assert!(!status.running);
        assert_eq!(status.message, "ACL Stopped");
    }

    #[test]
    fn test_waits_settle_interval() {
        let mut coordinator = Coordinator::new(
            ScriptedProbe::new(&[true, true]),
            RecordingSink::default(),
            Duration::from_millis(20),
        );
        let started = std::time::Instant::now();
        coordinator.request_stop();
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_round_trip_against_fake_proc() {
        let proc_fs = FakeProc::new();
        proc_fs.add(100, &["/usr/bin/omww-proxy"], 'S');
        let control_path = proc_fs.dir.path().join(".acl-control");

        let mut coordinator = Coordinator::new(
            proc_fs.scanner(),
            ControlFile::new(&control_path),
            Duration::ZERO,
        );
        assert_eq!(coordinator.detect().message, "ACL Running");

        let status = coordinator.request_stop();
        assert!(!status.running);
        assert_eq!(status.message, "ACL Stopped");
        assert_eq!(fs::read_to_string(&control_path).unwrap(), "stop\n");

        proc_fs.set_state(100, 'T');
        assert!(!coordinator.probe().any_target_running());

        let status = coordinator.request_start();
        assert!(status.running);
        assert_eq!(status.message, "ACL Resumed");
        assert_eq!(fs::read_to_string(&control_path).unwrap(), "start\n");
    }
}

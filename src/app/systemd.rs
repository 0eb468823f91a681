// Handles all interactions with the `systemctl` command and legacy init scripts.

use super::model::{DetectionOutcome, ManagedBy, ServiceDescriptor};
use super::parser::parse_output;
use crate::config::Settings;
use crate::error::ReadinessError;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Captured result of one command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Executes a shell command line. Everything the detector learns about the host goes through here.
pub trait CommandRunner {
    fn execute(&self, command_line: &str) -> io::Result<CommandOutput>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn execute(&self, command_line: &str) -> io::Result<CommandOutput> {
        (**self).execute(command_line)
    }
}

/// Runs command lines through `sh -c`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn execute(&self, command_line: &str) -> io::Result<CommandOutput> {
        let output = Command::new("sh").arg("-c").arg(command_line).output()?;

        Ok(CommandOutput {
            // Killed by a signal; treat as a plain failure.
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Exit status `sh` reports when the program itself does not exist.
const SHELL_NOT_FOUND: i32 = 127;

const IGNORED_MARKERS: [&str; 2] = ["ignoring request", "ignoring command"];

/// True when systemctl answered without any properties because it refused the request,
/// as it does inside chroots and other restricted environments.
pub fn request_was_ignored(text: &str) -> bool {
    !text.contains('=') && IGNORED_MARKERS.iter().any(|marker| text.contains(marker))
}

pub struct ServiceDetector<R> {
    runner: R,
    systemctl: String,
    init_script_dir: PathBuf,
}

impl<R: CommandRunner> ServiceDetector<R> {
    pub fn new(runner: R, systemctl: impl Into<String>, init_script_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            systemctl: systemctl.into(),
            init_script_dir: init_script_dir.into(),
        }
    }

    pub fn from_settings(runner: R, settings: &Settings) -> Self {
        Self::new(runner, settings.systemctl.clone(), settings.init_script_dir.clone())
    }

    /// Finds out whether `unit` exists and what manages it.
    /// Fails without retry when systemctl is absent or the unit file is broken.
    pub fn detect(&self, unit: &str) -> Result<DetectionOutcome, ReadinessError> {
        let quoted_unit = shlex::try_quote(unit).map_err(|_| ReadinessError::InvalidUnitName {
            unit: unit.to_string(),
        })?;
        let systemctl = shlex::try_quote(&self.systemctl).map_err(|_| ReadinessError::InvalidController {
            path: self.systemctl.clone(),
        })?;

        let show = self.run(&format!("{systemctl} show {quoted_unit}"))?;
        let mut descriptor = ServiceDescriptor::new();
        let systemd_managed;

        if request_was_ignored(&show.stdout) || request_was_ignored(&show.stderr) {
            debug!(unit, "systemctl show was ignored, falling back to list-unit-files");
            let listing = self.run(&format!("{systemctl} list-unit-files {quoted_unit}"))?;
            systemd_managed = listing.success();
        } else if show.success() {
            descriptor = parse_output(&show.stdout);
            systemd_managed = descriptor
                .load_state()
                .is_some_and(|state| state != "not-found");

            if systemd_managed {
                if let Some(message) = descriptor.load_error() {
                    return Err(ReadinessError::LoadError {
                        unit: unit.to_string(),
                        message: message.to_string(),
                    });
                }
            }
        } else {
            self.ensure_controller(&systemctl)?;
            systemd_managed = false;
        }

        let init_script = self.init_script_exists(unit)?;
        debug!(unit, systemd_managed, init_script, "detection finished");

        let managed_by = if systemd_managed {
            ManagedBy::SystemdManaged
        } else if init_script {
            ManagedBy::InitScriptOnly
        } else {
            return Ok(DetectionOutcome::NotFound);
        };

        Ok(DetectionOutcome::Found {
            descriptor,
            managed_by,
        })
    }

    fn ensure_controller(&self, systemctl: &str) -> Result<(), ReadinessError> {
        let probe = self.run(systemctl)?;
        if probe.exit_code == SHELL_NOT_FOUND || probe.stderr.contains("not found") {
            return Err(ReadinessError::ControllerMissing {
                controller: self.systemctl.clone(),
            });
        }
        Ok(())
    }

    /// Only a plain file name is looked up; anything that could leave the
    /// init-script directory counts as "no script".
    fn init_script_exists(&self, unit: &str) -> Result<bool, ReadinessError> {
        let mut components = Path::new(unit).components();
        if !matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        ) || unit.contains('/')
        {
            debug!(unit, "not a plain file name, skipping init script check");
            return Ok(false);
        }

        let path = self.init_script_dir.join(unit);
        let path = path.to_string_lossy();
        let script = shlex::try_quote(&path).map_err(|_| ReadinessError::InvalidUnitName {
            unit: unit.to_string(),
        })?;
        Ok(self.run(&format!("test -f {script}"))?.success())
    }

    fn run(&self, command_line: &str) -> Result<CommandOutput, ReadinessError> {
        self.runner
            .execute(command_line)
            .map_err(|source| ReadinessError::Command {
                command: command_line.to_string(),
                source,
            })
    }
}

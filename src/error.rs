// Error taxonomy for detection and polling.

use crate::app::model::{DesiredState, ServiceDescriptor};
use serde::Serialize;
use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReadinessError {
    #[error("{controller} could not be found on this host; is systemd installed?")]
    ControllerMissing { controller: String },

    #[error("error loading unit file '{unit}': {message}")]
    LoadError { unit: String, message: String },

    #[error("could not find the requested service {unit}")]
    ServiceMissing { unit: String },

    #[error("timed out after {}s waiting for {unit} {}", .elapsed.as_secs(), waiting_for(.target))]
    Timeout {
        unit: String,
        target: Option<DesiredState>,
        elapsed: Duration,
        last: ServiceDescriptor,
    },

    #[error("invalid unit name {unit:?}")]
    InvalidUnitName { unit: String },

    #[error("invalid service manager path {path:?}")]
    InvalidController { path: String },

    #[error("failed to execute `{command}`: {source}")]
    Command {
        command: String,
        #[source]
        source: io::Error,
    },
}

impl ReadinessError {
    /// Stable tag used in machine-readable failure reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ReadinessError::ControllerMissing { .. } => "controller_missing",
            ReadinessError::LoadError { .. } => "load_error",
            ReadinessError::ServiceMissing { .. } => "service_missing",
            ReadinessError::Timeout { .. } => "timeout",
            ReadinessError::InvalidUnitName { .. } => "invalid_unit_name",
            ReadinessError::InvalidController { .. } => "invalid_controller",
            ReadinessError::Command { .. } => "command",
        }
    }

    pub fn report<'a>(&'a self, name: &'a str) -> FailureReport<'a> {
        let (elapsed, status) = match self {
            ReadinessError::Timeout { elapsed, last, .. } => (Some(elapsed.as_secs()), Some(last)),
            _ => (None, None),
        };
        FailureReport {
            failed: true,
            name,
            kind: self.kind(),
            msg: self.to_string(),
            elapsed,
            status,
        }
    }
}

fn waiting_for(target: &Option<DesiredState>) -> String {
    match target {
        Some(state) => format!("to be {}", state.as_str()),
        None => "to report its status".to_string(),
    }
}

#[derive(Debug, Serialize)]
pub struct FailureReport<'a> {
    pub failed: bool,
    pub name: &'a str,
    pub kind: &'static str,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<&'a ServiceDescriptor>,
}

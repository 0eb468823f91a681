//! Waits for a systemd or init-script service to reach a desired activation state.
//!
//! [`app::systemd::ServiceDetector`] works out whether a unit exists and what manages it,
//! [`app::poller::ReadinessPoller`] repeats that until the unit is started or stopped.
//! Nothing here ever changes service state.

pub mod app;
pub mod cli;
pub mod config;
pub mod error;

pub use app::model::{
    DesiredState, DetectionOutcome, ManagedBy, PollRequest, PollResult, Report, ServiceDescriptor,
};
pub use app::poller::{Clock, ReadinessPoller, SystemClock};
pub use app::systemd::{CommandOutput, CommandRunner, ServiceDetector, ShellRunner};
pub use config::{ConfigError, Settings};
pub use error::ReadinessError;

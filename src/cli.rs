use crate::app::model::{DesiredState, PollRequest};
use crate::config::Settings;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "svcwait")]
#[command(about = "Wait for a service to be started or stopped, without touching it")]
pub struct Cli {
    /// Name of the service (unit) to inspect
    pub name: String,

    /// State to wait for; without it the current status is reported once
    #[arg(short, long, value_enum)]
    pub state: Option<DesiredState>,

    /// Seconds to wait for the desired state (defaults to the config value, 300)
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// JSON settings file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// systemctl program to query
    #[arg(long, value_name = "PATH")]
    pub systemctl: Option<String>,

    /// Directory holding legacy init scripts
    #[arg(long, value_name = "DIR")]
    pub init_dir: Option<PathBuf>,

    /// Check mode; accepted for compatibility, polling never changes anything
    #[arg(long)]
    pub check: bool,

    /// Show a live view of the poll
    #[arg(long)]
    pub tui: bool,

    /// Log debug output to stderr
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Command-line flags win over the settings file.
    pub fn apply(&self, mut settings: Settings) -> Settings {
        if let Some(systemctl) = &self.systemctl {
            settings.systemctl = systemctl.clone();
        }
        if let Some(dir) = &self.init_dir {
            settings.init_script_dir = dir.clone();
        }
        settings
    }

    pub fn request(&self, settings: &Settings) -> PollRequest {
        let timeout = self
            .timeout
            .map(Duration::from_secs)
            .unwrap_or_else(|| settings.default_timeout());

        PollRequest {
            service_name: self.name.clone(),
            desired_state: self.state,
            timeout,
        }
    }
}

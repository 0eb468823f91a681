// Defines the core data structures shared by the detector and the poller.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

pub const LOAD_STATE: &str = "LoadState";
pub const ACTIVE_STATE: &str = "ActiveState";
pub const LOAD_ERROR: &str = "LoadError";

/// Attributes reported by one `systemctl show` query.
/// Keys are unique; everything beyond the well-known keys is kept for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ServiceDescriptor {
    entries: BTreeMap<String, String>,
}

impl ServiceDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, replacing any earlier value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn load_state(&self) -> Option<&str> {
        self.get(LOAD_STATE)
    }

    pub fn active_state(&self) -> Option<&str> {
        self.get(ACTIVE_STATE)
    }

    pub fn load_error(&self) -> Option<&str> {
        self.get(LOAD_ERROR)
    }

    /// `active` and `activating` count as running; anything else, absent included, is stopped.
    pub fn is_running(&self) -> bool {
        matches!(self.active_state(), Some("active") | Some("activating"))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ServiceDescriptor {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut descriptor = ServiceDescriptor::new();
        for (key, value) in iter {
            descriptor.insert(key, value);
        }
        descriptor
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagedBy {
    SystemdManaged,
    InitScriptOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionOutcome {
    Found {
        descriptor: ServiceDescriptor,
        managed_by: ManagedBy,
    },
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DesiredState {
    Started,
    Stopped,
}

impl DesiredState {
    pub fn is_satisfied_by(self, descriptor: &ServiceDescriptor) -> bool {
        match self {
            DesiredState::Started => descriptor.is_running(),
            DesiredState::Stopped => !descriptor.is_running(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DesiredState::Started => "started",
            DesiredState::Stopped => "stopped",
        }
    }
}

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollRequest {
    pub service_name: String,
    pub desired_state: Option<DesiredState>,
    pub timeout: Duration,
}

impl PollRequest {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            desired_state: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_desired_state(mut self, state: DesiredState) -> Self {
        self.desired_state = Some(state);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollResult {
    pub found: bool,
    pub managed_by: Option<ManagedBy>,
    pub descriptor: ServiceDescriptor,
    pub elapsed: Duration,
    pub warnings: Vec<String>,
}

/// Snapshot handed to poll observers after every detection.
#[derive(Debug, Clone)]
pub struct PollProgress<'a> {
    pub service_name: &'a str,
    pub desired_state: Option<DesiredState>,
    pub iteration: u32,
    pub elapsed: Duration,
    pub timeout: Duration,
    pub outcome: &'a DetectionOutcome,
}

/// Success report printed for external consumers. The operation never changes anything.
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub name: &'a str,
    pub changed: bool,
    pub found: bool,
    pub managed_by: Option<ManagedBy>,
    pub elapsed: u64,
    pub status: &'a ServiceDescriptor,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: &'a Vec<String>,
}

impl<'a> Report<'a> {
    pub fn new(name: &'a str, result: &'a PollResult) -> Self {
        Self {
            name,
            changed: false,
            found: result.found,
            managed_by: result.managed_by,
            elapsed: result.elapsed.as_secs(),
            status: &result.descriptor,
            warnings: &result.warnings,
        }
    }
}

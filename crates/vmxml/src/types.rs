use std::fmt;

/// Reference to a defined or running domain on a connection.
///
/// Handles are resolved fresh on every invocation and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainHandle {
    pub name: String,
    /// Hypervisor id; `None` while the domain is shut off.
    pub id: Option<u32>,
    pub uuid: String,
}

/// Runtime state of a domain, as reported by the hypervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainState {
    NoState,
    Running,
    Blocked,
    Paused,
    ShuttingDown,
    Shutoff,
    Crashed,
    PmSuspended,
}

impl DomainState {
    /// Parse the state string printed by `virsh domstate`.
    pub fn from_virsh(s: &str) -> Self {
        match s.trim() {
            "running" => DomainState::Running,
            "idle" | "blocked" => DomainState::Blocked,
            "paused" => DomainState::Paused,
            "in shutdown" => DomainState::ShuttingDown,
            "shut off" => DomainState::Shutoff,
            "crashed" => DomainState::Crashed,
            "pmsuspended" => DomainState::PmSuspended,
            _ => DomainState::NoState,
        }
    }

    /// Anything other than shut off has a live configuration.
    pub fn is_active(self) -> bool {
        self != DomainState::Shutoff
    }
}

impl fmt::Display for DomainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DomainState::NoState => "no state",
            DomainState::Running => "running",
            DomainState::Blocked => "blocked",
            DomainState::Paused => "paused",
            DomainState::ShuttingDown => "in shutdown",
            DomainState::Shutoff => "shut off",
            DomainState::Crashed => "crashed",
            DomainState::PmSuspended => "pmsuspended",
        };
        f.write_str(s)
    }
}

/// The hypervisor-side device operation implied by an edit action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAction {
    /// `--edit`: update-device.
    Update,
    /// `--add-device`: attach-device.
    Hotplug,
    /// `--remove-device`: detach-device.
    Hotunplug,
}

impl fmt::Display for DeviceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceAction::Update => write!(f, "update"),
            DeviceAction::Hotplug => write!(f, "hotplug"),
            DeviceAction::Hotunplug => write!(f, "hotunplug"),
        }
    }
}

//! Core data model for the provisioning state machine.
//!
//! States are mutually exclusive and classified in order of precedence.
//! The state is computed fresh on every evaluation and never cached:
//! reboots and manual user action can change it outside this process.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Readiness of the virtualization subsystem.
///
/// Precedence is strict: a disabled platform feature must be fixed (and the
/// host rebooted) before a distro can exist, and a distro must exist before
/// it can be configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningState {
    /// The virtualization platform feature is disabled; remediation
    /// requires a host restart before anything else is possible.
    NeedsRestart,

    /// The engine is available but the target distro is not installed.
    NeedsDistroInstall,

    /// The distro exists but the container-engine configuration markers
    /// are not all present.
    NeedsConfiguration,

    /// Fully configured and container-capable.
    Ready,
}

impl ProvisioningState {
    /// Human-readable description of this state.
    pub fn description(&self) -> &'static str {
        match self {
            ProvisioningState::NeedsRestart => {
                "Virtualization platform feature disabled - host restart required"
            }
            ProvisioningState::NeedsDistroInstall => "Target distro not installed",
            ProvisioningState::NeedsConfiguration => "Distro present but not configured",
            ProvisioningState::Ready => "Fully configured and container-capable",
        }
    }
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisioningState::NeedsRestart => write!(f, "needs_restart"),
            ProvisioningState::NeedsDistroInstall => write!(f, "needs_distro_install"),
            ProvisioningState::NeedsConfiguration => write!(f, "needs_configuration"),
            ProvisioningState::Ready => write!(f, "ready"),
        }
    }
}

/// Name of the target Linux distribution image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistroIdentity(String);

impl DistroIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DistroIdentity {
    fn default() -> Self {
        Self("Ubuntu".to_string())
    }
}

impl fmt::Display for DistroIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw engine status as reported by the diagnostic command.
///
/// A failed or unreadable probe yields `Indeterminate` so the classifier
/// always receives a total input instead of an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineStatusSignal {
    /// Normalized (NUL-stripped, trimmed) status text.
    Text(String),
    /// The diagnostic command failed to run or produced no usable output.
    Indeterminate,
}

/// Aggregate result of the container-engine configuration marker probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigMarkerSignal {
    /// All markers present.
    Complete,
    /// Probes ran but at least one marker is missing.
    Incomplete,
    /// The marker probes could not be run.
    Indeterminate,
}

/// Everything the classifier needs, gathered in one probe pass.
#[derive(Debug, Clone)]
pub struct ProbeSignals {
    pub engine_status: EngineStatusSignal,
    pub installed_distros: BTreeSet<String>,
    pub config_markers: ConfigMarkerSignal,
}

/// Credentials for the non-root operating user created inside the distro.
///
/// Held in memory only for the duration of a provisioning call. Never
/// serialized, never persisted; the `Debug` impl redacts the password so
/// it cannot leak through logging.
#[derive(Clone)]
pub struct UserCredential {
    pub username: String,
    pub password: String,
}

impl UserCredential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for UserCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserCredential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Immutable snapshot of a single external-process invocation.
///
/// A nonzero exit code is data, not an error: callers decide whether it is
/// fatal for their particular step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Symbolic target for the fire-and-forget UI notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UiTarget {
    /// Prompt the user to restart the host.
    RestartPrompt,
    /// Show the configuration-in-progress view.
    Configuring,
    /// Provisioning verified complete; proceed to the main view.
    Main,
}

impl UiTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            UiTarget::RestartPrompt => "restart-prompt",
            UiTarget::Configuring => "configuring",
            UiTarget::Main => "main",
        }
    }
}

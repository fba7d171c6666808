//! Shared types for the podprep provisioning engine.
//!
//! Leaf crate: data model, command execution, configuration, and the
//! error taxonomy. Nothing in here talks to the WSL layer directly.

pub mod command;
pub mod config;
pub mod error;
pub mod types;

pub use command::{cancel_requested, CommandSpec, HostRunner, Runner};
pub use config::ProvisionConfig;
pub use error::ProvisionError;
pub use types::{
    CommandResult, ConfigMarkerSignal, DistroIdentity, EngineStatusSignal, ProbeSignals,
    ProvisioningState, UiTarget, UserCredential,
};

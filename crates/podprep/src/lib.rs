//! podprep - provisioning engine for a WSL-hosted container environment.
//!
//! Brings the host's lightweight virtualization layer from an unknown
//! state to a fully configured, container-capable one: probe, classify,
//! remediate, re-probe, and persist a completion flag once verified.

pub mod classifier;
pub mod flag_store;
pub mod probe;
pub mod provisioner;
pub mod watcher;

pub use classifier::classify;
pub use flag_store::FlagStore;
pub use provisioner::{ProvisionOutcome, Provisioner};
pub use watcher::{watch_until, WatchOutcome};

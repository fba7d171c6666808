//! Error taxonomy for the provisioning engine.

use thiserror::Error;

/// Failures surfaced by the provisioner.
///
/// Best-effort remediation steps never produce these; only fatal steps,
/// spawn failures, and the bounded install wait do.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The external process could not be started at all.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// A fatal remediation step exited nonzero.
    #[error("step `{step}` failed with exit code {exit_code}: {stderr}")]
    StepFailed {
        step: &'static str,
        exit_code: i32,
        stderr: String,
    },

    /// The distro never appeared within the configured install timeout.
    #[error("distro `{distro}` did not appear within {waited_secs}s")]
    InstallTimeout { distro: String, waited_secs: u64 },

    /// Reading or writing the persistent flag store failed.
    #[error("flag store: {0}")]
    FlagStore(#[from] std::io::Error),

    /// The workflow was cancelled from outside.
    #[error("provisioning cancelled")]
    Cancelled,
}

//! State classification - pure decision logic, no side effects.
//!
//! Precedence order, first match wins:
//! 1. restart marker in engine status -> needs_restart
//! 2. target distro absent            -> needs_distro_install
//! 3. config markers incomplete       -> needs_configuration
//! 4. otherwise                       -> ready
//!
//! The order reflects a strict dependency chain: a disabled platform
//! feature requires a reboot before anything else is possible, and a
//! distro must exist before it can be configured. No state is reachable
//! out of this order even when multiple conditions hold.

use crate::probe::status_requires_restart;
use podprep_common::{
    ConfigMarkerSignal, DistroIdentity, EngineStatusSignal, ProbeSignals, ProvisioningState,
};
use tracing::debug;

/// Classify the provisioning state from probe signals.
///
/// Pure and total: identical signals always yield the identical state.
/// Indeterminate engine status never matches the restart rule (the
/// marker is simply not observable); indeterminate config markers count
/// as incomplete, biasing away from a premature `Ready`.
pub fn classify(signals: &ProbeSignals, distro: &DistroIdentity) -> ProvisioningState {
    if let EngineStatusSignal::Text(status) = &signals.engine_status {
        if status_requires_restart(status) {
            debug!("Classified: needs_restart (platform feature disabled)");
            return ProvisioningState::NeedsRestart;
        }
    }

    if !signals.installed_distros.contains(distro.as_str()) {
        debug!("Classified: needs_distro_install ({} not listed)", distro);
        return ProvisioningState::NeedsDistroInstall;
    }

    if signals.config_markers != ConfigMarkerSignal::Complete {
        debug!("Classified: needs_configuration (markers {:?})", signals.config_markers);
        return ProvisioningState::NeedsConfiguration;
    }

    debug!("Classified: ready");
    ProvisioningState::Ready
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn signals(
        status: &str,
        distros: &[&str],
        markers: ConfigMarkerSignal,
    ) -> ProbeSignals {
        ProbeSignals {
            engine_status: EngineStatusSignal::Text(status.to_string()),
            installed_distros: distros.iter().map(|d| d.to_string()).collect(),
            config_markers: markers,
        }
    }

    const RESTART_STATUS: &str = "Please enable the \"Virtual Machine Platform\" optional \
        component and ensure virtualization is enabled in the BIOS.";

    #[test]
    fn restart_marker_wins_regardless_of_other_signals() {
        let distro = DistroIdentity::default();
        // Even with the distro installed and markers complete.
        let s = signals(RESTART_STATUS, &["Ubuntu"], ConfigMarkerSignal::Complete);
        assert_eq!(classify(&s, &distro), ProvisioningState::NeedsRestart);
    }

    #[test]
    fn missing_distro_without_restart_marker() {
        let distro = DistroIdentity::default();
        let s = signals("ok", &[], ConfigMarkerSignal::Incomplete);
        assert_eq!(classify(&s, &distro), ProvisioningState::NeedsDistroInstall);
    }

    #[test]
    fn present_distro_with_incomplete_markers() {
        let distro = DistroIdentity::default();
        let s = signals("ok", &["Ubuntu"], ConfigMarkerSignal::Incomplete);
        assert_eq!(classify(&s, &distro), ProvisioningState::NeedsConfiguration);
    }

    #[test]
    fn all_conditions_clear_is_ready() {
        let distro = DistroIdentity::default();
        let s = signals("ok", &["Ubuntu"], ConfigMarkerSignal::Complete);
        assert_eq!(classify(&s, &distro), ProvisioningState::Ready);
    }

    #[test]
    fn classification_is_pure() {
        let distro = DistroIdentity::default();
        let s = signals("ok", &["Ubuntu"], ConfigMarkerSignal::Complete);
        let first = classify(&s, &distro);
        for _ in 0..10 {
            assert_eq!(classify(&s, &distro), first);
        }
    }

    #[test]
    fn indeterminate_status_never_classifies_as_restart() {
        let distro = DistroIdentity::default();
        let s = ProbeSignals {
            engine_status: EngineStatusSignal::Indeterminate,
            installed_distros: BTreeSet::new(),
            config_markers: ConfigMarkerSignal::Indeterminate,
        };
        assert_eq!(classify(&s, &distro), ProvisioningState::NeedsDistroInstall);
    }

    #[test]
    fn indeterminate_markers_are_not_ready() {
        let distro = DistroIdentity::default();
        let s = signals("ok", &["Ubuntu"], ConfigMarkerSignal::Indeterminate);
        assert_eq!(classify(&s, &distro), ProvisioningState::NeedsConfiguration);
    }

    #[test]
    fn other_distros_do_not_satisfy_target() {
        let distro = DistroIdentity::default();
        let s = signals("ok", &["Debian", "Alpine"], ConfigMarkerSignal::Complete);
        assert_eq!(classify(&s, &distro), ProvisioningState::NeedsDistroInstall);
    }
}

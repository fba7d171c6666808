//! Status probes - diagnostic reads only, no writes.
//!
//! Each probe invokes one external command and returns a normalized,
//! total signal: a failed probe yields an explicit indeterminate value
//! instead of an error, so the classifier input is always complete.
//!
//! The restart heuristic matches substrings of human-readable status
//! text. That fragility is contained here; the marker phrases must not
//! leak into the classifier.

use podprep_common::{
    CommandSpec, ConfigMarkerSignal, DistroIdentity, EngineStatusSignal, ProbeSignals, Runner,
};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Phrases in `wsl.exe --status` output that indicate the virtualization
/// platform feature is disabled and a host restart will be needed.
const RESTART_MARKERS: [&str; 2] = [
    "Please enable the \"Virtual Machine Platform\" optional component and ensure virtualization is enabled in the BIOS.",
    "Enable \"Virtual Machine Platform\" by running: wsl.exe --install --no-distribution For information please visit https://aka.ms/enablevirtualization",
];

/// Marker file written by the GPU container toolkit setup.
const NVIDIA_MARKER_PATH: &str = "/etc/nvidia-container-runtime/config.toml";

/// Does this engine status text call for a host restart?
pub fn status_requires_restart(status: &str) -> bool {
    RESTART_MARKERS.iter().any(|marker| status.contains(marker))
}

/// Strip NUL bytes and surrounding whitespace.
///
/// `wsl.exe` emits UTF-16 on some hosts; after lossy conversion that
/// shows up as interleaved NULs.
fn normalize(raw: &str) -> String {
    raw.replace('\0', "").trim().to_string()
}

/// Parse `wsl.exe --list --quiet` output into a set of distro names.
fn parse_distro_list(stdout: &str) -> BTreeSet<String> {
    normalize(stdout)
        .lines()
        .map(|line| line.trim_end_matches('\r').trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Probe the engine's own status report.
pub async fn probe_engine_status<R: Runner>(runner: &R) -> EngineStatusSignal {
    let spec = CommandSpec::new("wsl.exe").arg("--status");
    match runner.run(&spec).await {
        Ok(result) if result.success() => EngineStatusSignal::Text(normalize(&result.stdout)),
        Ok(result) => {
            warn!("Engine status probe exited {}", result.exit_code);
            EngineStatusSignal::Indeterminate
        }
        Err(e) => {
            warn!("Engine status probe failed to run: {}", e);
            EngineStatusSignal::Indeterminate
        }
    }
}

/// List installed distros.
///
/// A failed listing is reported as an empty set: the workflow treats the
/// target distro as absent and re-installs, which is idempotent.
pub async fn list_installed_distros<R: Runner>(runner: &R) -> BTreeSet<String> {
    let spec = CommandSpec::new("wsl.exe").args(["--list", "--quiet"]);
    match runner.run(&spec).await {
        Ok(result) if result.success() => parse_distro_list(&result.stdout),
        Ok(result) => {
            warn!("Distro listing exited {}: {}", result.exit_code, result.stderr.trim());
            BTreeSet::new()
        }
        Err(e) => {
            warn!("Distro listing failed to run: {}", e);
            BTreeSet::new()
        }
    }
}

/// Check the container-engine configuration markers inside the distro:
/// the engine binary on the PATH and the GPU toolkit config file.
pub async fn check_config_markers<R: Runner>(
    runner: &R,
    distro: &DistroIdentity,
) -> ConfigMarkerSignal {
    let markers = [
        ("podman", "command -v podman".to_string()),
        ("nvidia-toolkit", format!("test -f {}", NVIDIA_MARKER_PATH)),
    ];

    for (name, check) in markers {
        let spec = CommandSpec::new("wsl.exe")
            .args(["-d", distro.as_str(), "--exec", "bash", "-c"])
            .arg(check);
        match runner.run(&spec).await {
            Ok(result) if result.success() => {
                debug!("Config marker present: {}", name);
            }
            Ok(_) => {
                debug!("Config marker missing: {}", name);
                return ConfigMarkerSignal::Incomplete;
            }
            Err(e) => {
                warn!("Config marker probe `{}` failed to run: {}", name, e);
                return ConfigMarkerSignal::Indeterminate;
            }
        }
    }

    ConfigMarkerSignal::Complete
}

/// Gather every signal the classifier needs in one pass.
pub async fn gather_signals<R: Runner>(runner: &R, distro: &DistroIdentity) -> ProbeSignals {
    let engine_status = probe_engine_status(runner).await;
    let installed_distros = list_installed_distros(runner).await;
    let config_markers = check_config_markers(runner, distro).await;

    ProbeSignals {
        engine_status,
        installed_distros,
        config_markers,
    }
}

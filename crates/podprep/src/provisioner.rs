//! Provisioning state machine driver.
//!
//! Orchestrates the evaluate -> remediate -> re-evaluate workflow. Each
//! non-ready state owns an ordered sequence of idempotent remediation
//! steps, executed strictly sequentially; after every sequence the state
//! is re-probed rather than assumed. The overall cycle is driven by the
//! caller - only the distro-install completion wait polls internally.
//!
//! Every step is explicitly fatal or best-effort. Fatal failures surface
//! as errors instead of silently advancing with a broken configuration.

use crate::classifier::classify;
use crate::flag_store::{FlagStore, SETUP_COMPLETED_AT_KEY, SETUP_COMPLETE_KEY};
use crate::probe;
use crate::watcher::{watch_until, WatchOutcome};
use podprep_common::{
    CommandSpec, DistroIdentity, ProvisionConfig, ProvisionError, ProvisioningState, Runner,
    UiTarget, UserCredential,
};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Whether a step's failure halts the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepPolicy {
    /// Failure aborts the sequence and surfaces to the caller.
    Fatal,
    /// Failure is logged and the sequence continues; the follow-up
    /// re-classification decides whether anything was actually fixed.
    BestEffort,
}

/// One named, idempotent unit of remediation work.
struct RemediationStep {
    name: &'static str,
    spec: CommandSpec,
    policy: StepPolicy,
}

impl RemediationStep {
    fn fatal(name: &'static str, spec: CommandSpec) -> Self {
        Self {
            name,
            spec,
            policy: StepPolicy::Fatal,
        }
    }

    fn best_effort(name: &'static str, spec: CommandSpec) -> Self {
        Self {
            name,
            spec,
            policy: StepPolicy::BestEffort,
        }
    }

    /// The command line embeds the credential. Redacting the spec keeps
    /// it out of every log site, including the runner's own.
    fn sensitive(mut self) -> Self {
        self.spec = self.spec.redact();
        self
    }
}

/// Result of one evaluate-and-advance cycle.
#[derive(Debug, Clone)]
pub struct ProvisionOutcome {
    /// State classified at the start of the cycle.
    pub state_before: ProvisioningState,
    /// State re-classified after remediation (equal to `state_before`
    /// for the terminal `Ready` state).
    pub state_after: ProvisioningState,
    /// The symbolic UI view this cycle calls for.
    pub ui_target: UiTarget,
    /// Whether this cycle wrote the completion flag.
    pub flag_written: bool,
}

/// The provisioning context: runner, config, flag store, and an optional
/// fire-and-forget UI notification channel. All state is explicit; there
/// are no process-wide globals.
pub struct Provisioner<R> {
    runner: R,
    config: ProvisionConfig,
    distro: DistroIdentity,
    flags: FlagStore,
    ui_tx: Option<mpsc::UnboundedSender<UiTarget>>,
}

impl<R> Provisioner<R>
where
    R: Runner + Clone + 'static,
{
    pub fn new(runner: R, config: ProvisionConfig, flags: FlagStore) -> Self {
        let distro = DistroIdentity::new(config.distro.clone());
        Self {
            runner,
            config,
            distro,
            flags,
            ui_tx: None,
        }
    }

    /// Attach a channel receiving the symbolic UI target at each
    /// top-level transition. No acknowledgment is expected.
    pub fn with_ui_channel(mut self, tx: mpsc::UnboundedSender<UiTarget>) -> Self {
        self.ui_tx = Some(tx);
        self
    }

    /// Classify the current state and run at most one remediation
    /// sequence. The returned outcome carries the freshly re-probed
    /// state; callers re-invoke until `Ready` (or a restart is pending).
    pub async fn evaluate_and_advance(
        &mut self,
        credential: &UserCredential,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        let signals = probe::gather_signals(&self.runner, &self.distro).await;
        let state_before = classify(&signals, &self.distro);
        info!("Provisioning state: {} - {}", state_before, state_before.description());

        let (ui_target, flag_written, state_after) = match state_before {
            ProvisioningState::NeedsRestart => {
                self.run_steps(self.restart_steps()).await?;
                let after = self.reclassify().await;
                (UiTarget::RestartPrompt, false, after)
            }
            ProvisioningState::NeedsDistroInstall => {
                self.install_distro(credential).await?;
                let after = self.reclassify().await;
                (UiTarget::Configuring, false, after)
            }
            ProvisioningState::NeedsConfiguration => {
                self.configure_distro(credential).await?;
                let after = self.reclassify().await;
                (UiTarget::Configuring, false, after)
            }
            ProvisioningState::Ready => {
                let wrote = self.mark_complete()?;
                (UiTarget::Main, wrote, ProvisioningState::Ready)
            }
        };

        self.notify(ui_target);
        Ok(ProvisionOutcome {
            state_before,
            state_after,
            ui_target,
            flag_written,
        })
    }

    /// Host feature enablement, headless engine install, kernel update.
    ///
    /// This sequence does not itself reach `Ready`: the host still has to
    /// be restarted by the user, after which a future cycle re-probes
    /// from scratch. The feature enable and kernel update are retried on
    /// every such cycle, so their individual failures are not fatal.
    fn restart_steps(&self) -> Vec<RemediationStep> {
        vec![
            RemediationStep::best_effort(
                "enable-virtual-machine-platform",
                CommandSpec::new("dism.exe").args([
                    "/online",
                    "/enable-feature",
                    "/featurename:VirtualMachinePlatform",
                    "/all",
                    "/norestart",
                ]),
            ),
            RemediationStep::fatal(
                "install-engine-headless",
                CommandSpec::new("wsl.exe").args(["--install", "--no-distribution"]),
            ),
            RemediationStep::best_effort(
                "update-engine-kernel",
                CommandSpec::new("wsl.exe").arg("--update"),
            ),
        ]
    }

    /// Start the distro install in the background, poll until the distro
    /// is listed (bounded), then create the operating user.
    async fn install_distro(&self, credential: &UserCredential) -> Result<(), ProvisionError> {
        let install_spec = CommandSpec::new("wsl.exe")
            .args(["--install", "-d"])
            .arg(self.distro.as_str());
        info!("Starting distro install: {}", install_spec);

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let runner = self.runner.clone();
        let spawned_spec = install_spec.clone();
        let spawned_cancel = cancel_rx.clone();
        let install = tokio::spawn(async move {
            runner.run_cancellable(&spawned_spec, spawned_cancel).await
        });

        let probe_runner = &self.runner;
        let target = self.distro.clone();
        let outcome = watch_until(
            move || {
                let target = target.clone();
                async move {
                    probe::list_installed_distros(probe_runner)
                        .await
                        .contains(target.as_str())
                }
            },
            Duration::from_secs(self.config.poll_interval_secs),
            Duration::from_secs(self.config.install_timeout_secs),
            cancel_rx,
        )
        .await;

        // The install handle is no longer needed once the distro is
        // visible, and must not outlive a timed-out wait.
        let _ = cancel_tx.send(true);
        match install.await {
            Ok(Ok(result)) => debug!("Install process resolved with exit {}", result.exit_code),
            Ok(Err(e)) => warn!("Install process could not be spawned: {}", e),
            Err(e) => warn!("Install task join error: {}", e),
        }

        match outcome {
            WatchOutcome::Satisfied { evaluations } => {
                info!("Distro {} listed after {} check(s)", self.distro, evaluations);
            }
            WatchOutcome::TimedOut => {
                return Err(ProvisionError::InstallTimeout {
                    distro: self.distro.as_str().to_string(),
                    waited_secs: self.config.install_timeout_secs,
                });
            }
            WatchOutcome::Cancelled => return Err(ProvisionError::Cancelled),
        }

        self.run_steps(self.user_steps(credential)).await
    }

    /// Create the non-root operating user and set its password.
    fn user_steps(&self, credential: &UserCredential) -> Vec<RemediationStep> {
        let user = &credential.username;
        vec![
            RemediationStep::fatal(
                "create-operating-user",
                self.in_distro(format!(
                    "id -u {user} >/dev/null 2>&1 || useradd -m -s /bin/bash -G sudo {user}"
                )),
            ),
            RemediationStep::fatal(
                "set-user-password",
                self.in_distro(format!("echo {}:{} | chpasswd", user, credential.password)),
            )
            .sensitive(),
        ]
    }

    /// Stage and execute the shipped setup script as the operating user.
    async fn configure_distro(&self, credential: &UserCredential) -> Result<(), ProvisionError> {
        self.run_steps(self.configure_steps(credential)).await
    }

    fn configure_steps(&self, credential: &UserCredential) -> Vec<RemediationStep> {
        let staging = &self.config.staging_dir;
        let script = &self.config.setup_script;
        let script_name = Path::new(script)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| script.clone());
        let user = &credential.username;

        vec![
            RemediationStep::best_effort(
                "make-staging-dir",
                self.in_distro_as(user, format!("mkdir -p {staging}")),
            ),
            RemediationStep::fatal(
                "copy-setup-script",
                self.in_distro_as(user, format!("cp {script} {staging}/")),
            ),
            RemediationStep::fatal(
                "run-setup-script",
                self.in_distro_as(
                    user,
                    format!(
                        "cd {staging} && echo {} | sudo -S bash {script_name}",
                        credential.password
                    ),
                ),
            )
            .sensitive(),
        ]
    }

    /// Run one sequence, strictly in order, honoring per-step fatality.
    async fn run_steps(&self, steps: Vec<RemediationStep>) -> Result<(), ProvisionError> {
        for step in steps {
            self.run_step(&step).await?;
        }
        Ok(())
    }

    async fn run_step(&self, step: &RemediationStep) -> Result<(), ProvisionError> {
        info!("Step `{}`: {}", step.name, step.spec);

        match self.runner.run(&step.spec).await {
            Ok(result) if result.success() => Ok(()),
            Ok(result) => match step.policy {
                StepPolicy::Fatal => Err(ProvisionError::StepFailed {
                    step: step.name,
                    exit_code: result.exit_code,
                    stderr: result.stderr.trim().to_string(),
                }),
                StepPolicy::BestEffort => {
                    warn!("Step `{}` exited {} (continuing)", step.name, result.exit_code);
                    Ok(())
                }
            },
            Err(e) => match step.policy {
                StepPolicy::Fatal => Err(ProvisionError::Spawn {
                    command: step.spec.to_string(),
                    source: e,
                }),
                StepPolicy::BestEffort => {
                    warn!("Step `{}` could not be spawned: {} (continuing)", step.name, e);
                    Ok(())
                }
            },
        }
    }

    /// Write the completion flag, at most once per successful run.
    fn mark_complete(&mut self) -> Result<bool, ProvisionError> {
        if self.flags.is_true(SETUP_COMPLETE_KEY) {
            debug!("Completion flag already set, leaving as-is");
            return Ok(false);
        }
        // One write: the flag must never land without its timestamp.
        self.flags.set_many([
            (SETUP_COMPLETE_KEY, Value::Bool(true)),
            (
                SETUP_COMPLETED_AT_KEY,
                Value::String(chrono::Utc::now().to_rfc3339()),
            ),
        ])?;
        info!("Setup completion flag written");
        Ok(true)
    }

    async fn reclassify(&self) -> ProvisioningState {
        let signals = probe::gather_signals(&self.runner, &self.distro).await;
        classify(&signals, &self.distro)
    }

    fn notify(&self, target: UiTarget) {
        info!("UI target: {}", target.as_str());
        if let Some(tx) = &self.ui_tx {
            let _ = tx.send(target);
        }
    }

    /// Run a shell command inside the target distro as root.
    fn in_distro(&self, command: String) -> CommandSpec {
        CommandSpec::new("wsl.exe")
            .args(["-d", self.distro.as_str(), "--exec", "bash", "-c"])
            .arg(command)
    }

    /// Run a shell command inside the target distro as a specific user.
    fn in_distro_as(&self, user: &str, command: String) -> CommandSpec {
        CommandSpec::new("wsl.exe")
            .args(["-d", self.distro.as_str(), "-u", user, "--exec", "bash", "-c"])
            .arg(command)
    }
}

//! Install/activate state machine.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};

use super::clients::ClientRegistry;
use super::generation::{ActivateReport, GenerationManager, InstallReport};
use crate::Error;
use crate::config::CacheConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Constructed, install not yet started.
    Parsed,
    Installing,
    /// Populated, waiting for activation.
    Installed,
    Activating,
    /// Serving intercepted requests.
    Active,
    /// Install failed; this instance never serves.
    Redundant,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Parsed => "parsed",
            LifecycleState::Installing => "installing",
            LifecycleState::Installed => "installed",
            LifecycleState::Activating => "activating",
            LifecycleState::Active => "active",
            LifecycleState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

/// Result of an install, including the activation it triggered when
/// skip-waiting was set.
#[derive(Debug, Clone, Serialize, schemars::JsonSchema)]
pub struct InstallOutcome {
    pub report: InstallReport,
    pub activation: Option<ActivateReport>,
}

/// Drives install and activation.
///
/// Both phases take the phase lock, so a purge never overlaps population.
/// Request handling only reads [`LifecycleController::is_serving`] and never
/// waits on the lock.
pub struct LifecycleController {
    generations: GenerationManager,
    clients: Arc<ClientRegistry>,
    config: Arc<CacheConfig>,
    state: watch::Sender<LifecycleState>,
    skip_waiting: AtomicBool,
    serving: AtomicBool,
    phase: Mutex<()>,
}

impl LifecycleController {
    pub fn new(generations: GenerationManager, clients: Arc<ClientRegistry>, config: Arc<CacheConfig>) -> Self {
        let (state, _) = watch::channel(LifecycleState::Parsed);
        Self {
            generations,
            clients,
            skip_waiting: AtomicBool::new(config.skip_waiting),
            config,
            state,
            serving: AtomicBool::new(false),
            phase: Mutex::new(()),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// True once an activation has completed.
    pub fn is_serving(&self) -> bool {
        self.serving.load(Ordering::Acquire)
    }

    fn transition(&self, next: LifecycleState) {
        let previous = self.state.send_replace(next);
        tracing::info!(from = %previous, to = %next, version = %self.config.version, "lifecycle transition");
    }

    /// Populate the current generation. With skip-waiting set, activation
    /// follows immediately under the same phase lock.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] while another install or activation
    /// is running, or the install error (the state becomes `Redundant`).
    pub async fn install(&self) -> Result<InstallOutcome, Error> {
        let _phase = self.phase.lock().await;

        match self.state() {
            LifecycleState::Installing | LifecycleState::Activating => {
                return Err(Error::InvalidState(format!("cannot install while {}", self.state())));
            }
            _ => {}
        }

        let was_active = self.state() == LifecycleState::Active;
        self.transition(LifecycleState::Installing);

        let report = match self.generations.on_install(&self.config.manifest).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(error = %e, "install failed");
                self.transition(if was_active { LifecycleState::Active } else { LifecycleState::Redundant });
                return Err(e);
            }
        };

        self.transition(LifecycleState::Installed);

        let activation = if self.skip_waiting.load(Ordering::Acquire) {
            Some(self.activate_locked().await?)
        } else {
            tracing::info!("installed, waiting for activation");
            None
        };

        Ok(InstallOutcome { report, activation })
    }

    /// Purge stale generations and start serving.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless the controller is `Installed`
    /// or already `Active`.
    pub async fn activate(&self) -> Result<ActivateReport, Error> {
        let _phase = self.phase.lock().await;
        self.activate_locked().await
    }

    async fn activate_locked(&self) -> Result<ActivateReport, Error> {
        let current = self.state();
        if !matches!(current, LifecycleState::Installed | LifecycleState::Active) {
            return Err(Error::InvalidState(format!("cannot activate while {current}")));
        }

        self.transition(LifecycleState::Activating);
        let mut report = match self.generations.on_activate().await {
            Ok(report) => report,
            Err(e) => {
                self.transition(current);
                return Err(e);
            }
        };

        if self.config.claim_clients {
            report.claimed = self.clients.claim().await;
        }

        self.serving.store(true, Ordering::Release);
        self.transition(LifecycleState::Active);
        Ok(report)
    }

    /// Request skip-waiting. Activates right away when already installed.
    ///
    /// Returns the activation report if this call activated.
    pub async fn skip_waiting(&self) -> Result<Option<ActivateReport>, Error> {
        self.skip_waiting.store(true, Ordering::Release);

        let _phase = self.phase.lock().await;
        if self.state() == LifecycleState::Installed {
            return self.activate_locked().await.map(Some);
        }
        Ok(None)
    }
}

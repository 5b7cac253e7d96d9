//! Rolling inactivity deadline for end-of-stream.
//!
//! After end-of-stream is requested with frames still outstanding, the relay
//! waits for them only as long as they keep arriving. Each qualifying event
//! restarts the timer; if it expires, the stream is force-ended.
//!
//! Expiry is delivered through the relay executor like every other event.
//! Each arming gets a fresh generation, and an expiry carrying a generation
//! other than the current one was cancelled or superseded, so it is ignored.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::utils::HostEnvironment;
use crate::WatchdogConfig;

/// End-of-stream progress of the current stream.
///
/// Propagation (normal or forced) is a single transition back to `Idle`,
/// since the relay may carry further streams.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum EosPhase {
    #[default]
    Idle,
    /// End-of-stream requested; waiting for outstanding frames.
    EndedPending,
}

impl EosPhase {
    pub fn is_pending(self) -> bool {
        self == Self::EndedPending
    }
}

/// Timeout used for this host, chosen once at relay construction.
pub fn select_timeout(config: &WatchdogConfig, environment: HostEnvironment) -> Duration {
    let ms = match (config.timeout_override_ms, environment) {
        (Some(ms), _) => ms,
        (None, HostEnvironment::Emulated) => config.emulator_timeout_ms,
        (None, HostEnvironment::Hardware) => config.timeout_ms,
    };
    Duration::from_millis(ms)
}

pub struct Watchdog {
    timeout: Duration,
    runtime: Handle,
    generation: u64,
    timer: Option<JoinHandle<()>>,
    shut_down: bool,
}

impl Watchdog {
    pub fn new(timeout: Duration, runtime: Handle) -> Self {
        Self {
            timeout,
            runtime,
            generation: 0,
            timer: None,
            shut_down: false,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    /// Whether an expiry tagged `generation` belongs to the live timer.
    pub fn is_current(&self, generation: u64) -> bool {
        self.timer.is_some() && generation == self.generation
    }

    /// Cancels any pending timer and arms a new one.
    ///
    /// `on_expiry` runs on a runtime worker with the new generation; it is
    /// expected to hand the expiry back to the executor.
    pub fn restart<F>(&mut self, on_expiry: F)
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.cancel();
        if self.shut_down {
            return;
        }
        let generation = self.generation;
        let timeout = self.timeout;
        self.timer = Some(self.runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            trace!(generation, "watchdog expired");
            on_expiry(generation);
        }));
        debug!(generation, timeout_ms = timeout.as_millis() as u64, "watchdog armed");
    }

    /// Idempotent; safe when nothing is armed.
    pub fn cancel(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// Cancels and refuses to arm again.
    pub fn shutdown(&mut self) {
        self.cancel();
        self.shut_down = true;
    }
}

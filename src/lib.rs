pub mod consumer;
pub mod error;
pub mod executor;
pub mod frame;
pub mod producer;
pub mod relay;
pub mod utils;

use std::path::Path;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

pub use error::{ExecutorClosed, ProducerError, RelayError};
pub use frame::{FrameDescriptor, HardwareFrameHandle, QueuedFrame, TextureId, TransformMatrix};
pub use relay::{ConsumerFeedback, FrameRelay, RelaySnapshot};

/// Global configuration that can be atomically swapped at runtime
pub static CONFIG: once_cell::sync::Lazy<ArcSwap<Config>> =
    once_cell::sync::Lazy::new(|| ArcSwap::from_pointee(Config::default()));

/// Environment variable prefix for configuration overrides, e.g.
/// `FRAME_RELAY__RELAY__WATCHDOG__TIMEOUT_MS=250`.
pub const ENV_PREFIX: &str = "FRAME_RELAY";

/// System configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub relay: RelayConfig,
    pub demo: DemoConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Name of the executor span in logs.
    pub executor_name: String,
    pub watchdog: WatchdogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Inactivity allowed before forcing end-of-stream on real hardware.
    pub timeout_ms: u64,
    /// Same, on emulated hosts.
    pub emulator_timeout_ms: u64,
    /// Skips host detection when set.
    pub timeout_override_ms: Option<u64>,
}

/// Synthetic decoder driven by the demo binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Frames registered per stream.
    pub frame_count: u32,
    /// Frames the decoder actually delivers; fewer than `frame_count` exercises the watchdog.
    pub delivered_count: u32,
    /// Added to capture timestamps to get presentation times.
    pub timestamp_offset_us: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            relay: RelayConfig::default(),
            demo: DemoConfig {
                width: 1280,
                height: 720,
                fps: 30,
                frame_count: 30,
                delivered_count: 28,
                timestamp_offset_us: 0,
            },
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            executor_name: "frame-relay".into(),
            watchdog: WatchdogConfig {
                timeout_ms: 500,
                emulator_timeout_ms: 10_000,
                timeout_override_ms: None,
            },
        }
    }
}

impl Config {
    /// Defaults, overlaid by an optional TOML file, overlaid by environment.
    pub fn load(path: Option<&Path>) -> Result<Self, RelayError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }
}

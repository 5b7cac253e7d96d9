use std::fs;

use tracing::{debug, info};

/// Overrides the detected device name, e.g. `FRAME_RELAY_DEVICE=generic_x86`.
pub const DEVICE_ENV: &str = "FRAME_RELAY_DEVICE";

const DMI_PRODUCT_NAME: &str = "/sys/devices/virtual/dmi/id/product_name";

/// Markers that identify emulated or virtualized hosts by device name.
const EMULATOR_MARKERS: [&str; 4] = ["emulator", "generic", "qemu", "virtual"];

/// Kind of machine the relay runs on, which decides how patient the watchdog is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEnvironment {
    Hardware,
    /// Emulators decode and render far slower than real devices.
    Emulated,
}

/// Classifies a device name.
pub fn classify_device(name: &str) -> HostEnvironment {
    let name = name.to_ascii_lowercase();
    if EMULATOR_MARKERS.iter().any(|marker| name.contains(marker)) {
        HostEnvironment::Emulated
    } else {
        HostEnvironment::Hardware
    }
}

/// Detects the host kind from the device override or the DMI product name.
pub fn detect_environment() -> HostEnvironment {
    let device = std::env::var(DEVICE_ENV)
        .ok()
        .or_else(|| fs::read_to_string(DMI_PRODUCT_NAME).ok());

    match device {
        Some(name) => {
            let environment = classify_device(name.trim());
            info!("Detected host: {} ({:?})", name.trim(), environment);
            environment
        }
        None => {
            debug!("No device name available, assuming hardware host");
            HostEnvironment::Hardware
        }
    }
}

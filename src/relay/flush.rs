//! Post-flush accounting for frames registered before a flush that arrive after it.

use tracing::debug;

/// Runs once the relay has finished flushing.
pub type FlushCallback = Box<dyn FnOnce() + Send + 'static>;

/// Late arrivals to discard after a flush.
///
/// Registered descriptors not matched by an available image are frames the
/// producer has yet to deliver. More available images than descriptors
/// (excess delivery) leaves nothing to wait for.
pub fn drop_allowance(pending: usize, available: u32) -> u32 {
    let pending = u32::try_from(pending).unwrap_or(u32::MAX);
    pending.saturating_sub(available)
}

#[derive(Default)]
pub struct FlushState {
    drop_on_arrival: u32,
    callbacks: Vec<FlushCallback>,
}

impl FlushState {
    pub fn drop_on_arrival(&self) -> u32 {
        self.drop_on_arrival
    }

    pub fn waiting_callbacks(&self) -> usize {
        self.callbacks.len()
    }

    /// Adds a flush's allowance on top of any still outstanding from an earlier flush.
    pub fn begin(&mut self, allowance: u32, on_complete: Option<FlushCallback>) {
        self.drop_on_arrival = self.drop_on_arrival.saturating_add(allowance);
        self.callbacks.extend(on_complete);
        debug!(
            allowance,
            outstanding = self.drop_on_arrival,
            "flush started"
        );
    }

    /// Consumes one unit of allowance; `false` if none was outstanding.
    pub fn absorb_arrival(&mut self) -> bool {
        if self.drop_on_arrival == 0 {
            return false;
        }
        self.drop_on_arrival -= 1;
        true
    }

    /// Callbacks that may run now, or nothing while late arrivals are outstanding.
    pub fn take_ready_callbacks(&mut self) -> Vec<FlushCallback> {
        if self.drop_on_arrival > 0 {
            return Vec::new();
        }
        std::mem::take(&mut self.callbacks)
    }
}

//! Debug trace events and counters for the relay.

use metrics::counter;
use tracing::trace;

/// Why an image was discarded instead of forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Registered before a flush, arrived after it.
    Flushed,
    /// Arrived after end-of-stream was forced.
    Rejected,
    /// Arrived with no registered descriptor left to pair with.
    Excess,
    /// Available when a flush or forced end-of-stream drained the surface.
    Drained,
}

impl DropReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flushed => "flushed",
            Self::Rejected => "rejected",
            Self::Excess => "excess",
            Self::Drained => "drained",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEvent {
    SurfaceInput,
    QueueFrame { presentation_time_us: i64 },
    Dropped(DropReason),
    SignalEndOfStream { forced: bool },
}

pub fn record(event: RelayEvent) {
    match event {
        RelayEvent::SurfaceInput => {
            trace!("surface input");
            counter!("frame_relay_surface_input_total").increment(1);
        }
        RelayEvent::QueueFrame {
            presentation_time_us,
        } => {
            trace!(presentation_time_us, "queue frame");
            counter!("frame_relay_frames_forwarded_total").increment(1);
        }
        RelayEvent::Dropped(reason) => {
            trace!(reason = reason.as_str(), "frame dropped");
            counter!("frame_relay_frames_dropped_total", "reason" => reason.as_str())
                .increment(1);
        }
        RelayEvent::SignalEndOfStream { forced } => {
            trace!(forced, "signal end of stream");
            let forced = if forced { "true" } else { "false" };
            counter!("frame_relay_eos_total", "forced" => forced).increment(1);
        }
    }
}

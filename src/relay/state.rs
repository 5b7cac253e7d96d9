//! Relay state and the event handlers that run on its executor.
//!
//! Nothing here is reachable except through tasks submitted to the relay's
//! [`ExecutorHandle`], which is what makes plain fields safe to mutate.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::counters::{AvailableCount, Capacity};
use super::flush::{self, FlushCallback, FlushState};
use super::pending::PendingQueue;
use super::telemetry::{self, DropReason, RelayEvent};
use super::watchdog::{EosPhase, Watchdog};
use crate::consumer::FrameConsumer;
use crate::executor::ExecutorHandle;
use crate::frame::{FrameDescriptor, HardwareFrameHandle, QueuedFrame, TextureId, TextureInfo};
use crate::producer::FrameProducer;

/// The frame forwarded downstream and not yet reported processed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InFlightFrame {
    pub handle: HardwareFrameHandle,
    pub descriptor: FrameDescriptor,
    pub presentation_time_us: i64,
}

/// Running totals since the relay was created.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    pub frames_forwarded: u64,
    pub frames_dropped: u64,
    /// Dispatches whose producer sequence differed from the descriptor's expectation.
    pub frames_mismatched: u64,
    pub eos_propagated: u64,
    pub eos_forced: u64,
    /// Descriptors still pending when end-of-stream was last forced.
    pub last_forced_missing: Option<usize>,
}

/// Point-in-time copy of relay state, taken on the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct RelaySnapshot {
    pub capacity: u32,
    pub available: u32,
    pub pending: usize,
    pub in_flight: Option<InFlightFrame>,
    pub eos_phase: EosPhase,
    pub reject_incoming: bool,
    pub drop_on_arrival: u32,
    pub flush_callbacks_waiting: usize,
    pub watchdog_armed: bool,
    pub stats: RelayStats,
}

pub(crate) struct RelayState {
    executor: ExecutorHandle<RelayState>,
    producer: Box<dyn FrameProducer>,
    consumer: Box<dyn FrameConsumer>,
    texture_id: TextureId,
    pending: Arc<PendingQueue>,
    capacity: Capacity,
    available: AvailableCount,
    in_flight: Option<InFlightFrame>,
    next_sequence: u64,
    eos: EosPhase,
    reject_incoming: bool,
    flush: FlushState,
    watchdog: Watchdog,
    stats: RelayStats,
    released: bool,
}

impl RelayState {
    pub(crate) fn new(
        executor: ExecutorHandle<RelayState>,
        producer: Box<dyn FrameProducer>,
        consumer: Box<dyn FrameConsumer>,
        texture_id: TextureId,
        pending: Arc<PendingQueue>,
        watchdog: Watchdog,
    ) -> Self {
        Self {
            executor,
            producer,
            consumer,
            texture_id,
            pending,
            capacity: Capacity::default(),
            available: AvailableCount::default(),
            in_flight: None,
            next_sequence: 0,
            eos: EosPhase::Idle,
            reject_incoming: false,
            flush: FlushState::default(),
            watchdog,
            stats: RelayStats::default(),
            released: false,
        }
    }

    /// A new stream registered frames; stop rejecting arrivals.
    pub(crate) fn accept_incoming(&mut self) {
        self.reject_incoming = false;
    }

    pub(crate) fn on_frame_available(&mut self) {
        telemetry::record(RelayEvent::SurfaceInput);
        if self.released {
            return;
        }
        if self.flush.absorb_arrival() {
            self.discard_next(DropReason::Flushed);
            self.run_ready_flush_callbacks();
        } else if self.reject_incoming {
            self.discard_next(DropReason::Rejected);
            warn!(
                "Dropping frame received after forcing end of stream: {}",
                self.producer.capture_timestamp_ns() / 1000
            );
        } else if self.pending.len() <= self.available.get() as usize {
            self.discard_next(DropReason::Excess);
            warn!(
                pending = self.pending.len(),
                available = self.available.get(),
                "Dropping frame with no registered descriptor"
            );
        } else {
            if self.eos.is_pending() {
                self.restart_watchdog();
            }
            self.available.increment();
            self.maybe_dispatch();
        }
    }

    pub(crate) fn on_consumer_ready(&mut self) {
        self.capacity.grant();
        self.maybe_dispatch();
    }

    pub(crate) fn on_frame_processed(&mut self, handle: HardwareFrameHandle) {
        if self.in_flight.map(|frame| frame.handle) != Some(handle) {
            debug!(
                sequence = handle.sequence,
                "Ignoring completion for a frame that is no longer in flight"
            );
            return;
        }
        self.in_flight = None;
        if self.eos.is_pending() && self.pending.is_empty() {
            self.propagate_end_of_stream(false);
        } else {
            self.maybe_dispatch();
        }
    }

    fn maybe_dispatch(&mut self) {
        if self.capacity.is_empty() || self.available.is_empty() || self.in_flight.is_some() {
            return;
        }

        if let Err(e) = self.producer.acquire_next_image() {
            error!("Failed to acquire available image: {}", e);
            return;
        }
        self.available.take();
        let Some(descriptor) = self.pending.pop() else {
            panic!("dispatching an available frame with no registered descriptor");
        };
        self.capacity.take();

        let capture_timestamp_ns = self.producer.capture_timestamp_ns();
        let transform = self.producer.transform_matrix();
        let presentation_time_us = descriptor.presentation_time_us(capture_timestamp_ns);

        if let (Some(expected), Some(actual)) =
            (descriptor.expected_sequence, self.producer.latched_sequence())
        {
            if expected != actual {
                self.stats.frames_mismatched += 1;
                warn!(
                    expected,
                    actual, "Producer delivered frames out of registration order"
                );
            }
        }

        let handle = HardwareFrameHandle {
            texture_id: self.texture_id,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        self.in_flight = Some(InFlightFrame {
            handle,
            descriptor,
            presentation_time_us,
        });
        self.stats.frames_forwarded += 1;

        debug!(
            sequence = handle.sequence,
            presentation_time_us, "Forwarding frame"
        );
        self.consumer.queue_frame(QueuedFrame {
            handle,
            texture: TextureInfo {
                id: self.texture_id,
                width: descriptor.width,
                height: descriptor.height,
            },
            transform,
            presentation_time_us,
        });
        telemetry::record(RelayEvent::QueueFrame {
            presentation_time_us,
        });
    }

    pub(crate) fn flush(&mut self, on_complete: Option<FlushCallback>) {
        let allowance = flush::drop_allowance(self.pending.len(), self.available.get());
        self.flush.begin(allowance, on_complete);
        self.drain_available();
        self.capacity.reset();
        self.in_flight = None;
        let cleared = self.pending.clear();
        info!(cleared, drop_on_arrival = self.flush.drop_on_arrival(), "Flushed relay");
        if self.eos.is_pending() {
            // Nothing is left to wait for once the queue and in-flight slot are empty.
            self.end_stream(false);
        }
        self.run_ready_flush_callbacks();
    }

    fn run_ready_flush_callbacks(&mut self) {
        let callbacks = self.flush.take_ready_callbacks();
        if callbacks.is_empty() {
            return;
        }
        let submitted = self.executor.submit_with_high_priority(move |_| {
            for callback in callbacks {
                callback();
            }
        });
        if submitted.is_err() {
            warn!("Executor closed before flush completion could be reported");
        }
    }

    pub(crate) fn signal_end_of_stream(&mut self) {
        self.end_stream(false);
    }

    fn end_stream(&mut self, forced: bool) {
        if self.pending.is_empty() && self.in_flight.is_none() {
            self.propagate_end_of_stream(forced);
        } else {
            self.eos = EosPhase::EndedPending;
            self.restart_watchdog();
        }
    }

    fn propagate_end_of_stream(&mut self, forced: bool) {
        self.eos = EosPhase::Idle;
        self.watchdog.cancel();
        self.consumer.signal_end_of_stream();
        self.stats.eos_propagated += 1;
        if forced {
            self.stats.eos_forced += 1;
        }
        telemetry::record(RelayEvent::SignalEndOfStream { forced });
        info!(forced, "Signalled end of stream");
    }

    fn restart_watchdog(&mut self) {
        let executor = self.executor.clone();
        self.watchdog.restart(move |generation| {
            // A closed executor means the relay was released; nothing left to end.
            let _ = executor.submit(move |state| state.on_watchdog_expired(generation));
        });
    }

    fn on_watchdog_expired(&mut self, generation: u64) {
        if !self.watchdog.is_current(generation) || !self.eos.is_pending() {
            debug!(generation, "Ignoring stale watchdog expiry");
            return;
        }
        let missing = self.pending.len();
        warn!(
            "Forcing end of stream after missing {} frames for {} ms, with available frame count: {}",
            missing,
            self.watchdog.timeout().as_millis(),
            self.available.get()
        );
        self.eos = EosPhase::Idle;
        self.in_flight = None;
        self.pending.clear();
        self.reject_incoming = true;
        self.drain_available();
        self.stats.last_forced_missing = Some(missing);
        self.end_stream(true);
    }

    pub(crate) fn set_default_buffer_size(&mut self, width: u32, height: u32) {
        self.producer.set_default_buffer_size(width, height);
    }

    pub(crate) fn release(&mut self) {
        if self.released {
            return;
        }
        self.watchdog.shutdown();
        self.producer.release();
        self.released = true;
        info!(texture = self.texture_id.0, "Relay released");
    }

    pub(crate) fn snapshot(&self) -> RelaySnapshot {
        RelaySnapshot {
            capacity: self.capacity.get(),
            available: self.available.get(),
            pending: self.pending.len(),
            in_flight: self.in_flight,
            eos_phase: self.eos,
            reject_incoming: self.reject_incoming,
            drop_on_arrival: self.flush.drop_on_arrival(),
            flush_callbacks_waiting: self.flush.waiting_callbacks(),
            watchdog_armed: self.watchdog.is_armed(),
            stats: self.stats,
        }
    }

    fn drain_available(&mut self) {
        while !self.available.is_empty() {
            self.available.take();
            self.discard_next(DropReason::Drained);
        }
    }

    fn discard_next(&mut self, reason: DropReason) {
        self.producer.advance();
        self.stats.frames_dropped += 1;
        telemetry::record(RelayEvent::Dropped(reason));
    }
}

//! Software surface standing in for a decoder or camera output.
//!
//! Images are pushed with [`SyntheticProducer::emit`] from any thread; the
//! registered listener fires once per pushed image, after the image is
//! queued, exactly like a hardware frame-available notification.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, trace};

use super::{FrameAvailableCallback, FrameProducer};
use crate::error::ProducerError;
use crate::frame::{TextureId, TransformMatrix};

#[derive(Debug, Clone, Copy)]
struct SyntheticImage {
    timestamp_ns: i64,
    sequence: u64,
}

/// Counters describing what happened to emitted images.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyntheticStats {
    pub emitted: u64,
    pub queued: usize,
    pub latched: u64,
    pub discarded: u64,
    pub buffer_size: Option<(u32, u32)>,
    pub released: bool,
}

struct Inner {
    texture_id: TextureId,
    allocation_failure: Option<String>,
    queue: VecDeque<SyntheticImage>,
    current: Option<SyntheticImage>,
    transform: TransformMatrix,
    listener: Option<FrameAvailableCallback>,
    next_sequence: u64,
    stats: SyntheticStats,
}

/// Shared handle to a software surface; clones refer to the same surface.
#[derive(Clone)]
pub struct SyntheticProducer {
    inner: Arc<Mutex<Inner>>,
}

impl Default for SyntheticProducer {
    fn default() -> Self {
        Self::new(TextureId(1))
    }
}

impl SyntheticProducer {
    pub fn new(texture_id: TextureId) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                texture_id,
                allocation_failure: None,
                queue: VecDeque::new(),
                current: None,
                transform: TransformMatrix::IDENTITY,
                listener: None,
                next_sequence: 0,
                stats: SyntheticStats::default(),
            })),
        }
    }

    /// A surface whose texture allocation always fails.
    pub fn failing(reason: impl Into<String>) -> Self {
        let producer = Self::default();
        producer.lock().allocation_failure = Some(reason.into());
        producer
    }

    /// Queues one image captured at `timestamp_ns` and notifies the listener.
    ///
    /// Returns the producer sequence number given to the image.
    pub fn emit(&self, timestamp_ns: i64) -> u64 {
        let (sequence, listener) = {
            let mut inner = self.lock();
            let sequence = inner.next_sequence;
            inner.next_sequence += 1;
            inner.queue.push_back(SyntheticImage {
                timestamp_ns,
                sequence,
            });
            inner.stats.emitted += 1;
            (sequence, inner.listener.clone())
        };
        trace!(sequence, timestamp_ns, "synthetic image queued");
        // Outside the lock: the listener may be invoked on any thread.
        if let Some(listener) = listener {
            listener();
        }
        sequence
    }

    pub fn stats(&self) -> SyntheticStats {
        let inner = self.lock();
        SyntheticStats {
            queued: inner.queue.len(),
            ..inner.stats
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FrameProducer for SyntheticProducer {
    fn allocate(&mut self) -> Result<TextureId, ProducerError> {
        let inner = self.lock();
        if let Some(reason) = inner.allocation_failure.clone() {
            return Err(ProducerError::Allocation { reason });
        }
        info!(texture = inner.texture_id.0, "synthetic surface allocated");
        Ok(inner.texture_id)
    }

    fn set_frame_available_listener(&mut self, listener: FrameAvailableCallback) {
        self.lock().listener = Some(listener);
    }

    fn acquire_next_image(&mut self) -> Result<(), ProducerError> {
        let mut inner = self.lock();
        if inner.stats.released {
            return Err(ProducerError::Released);
        }
        if let Some(image) = inner.queue.pop_front() {
            inner.current = Some(image);
            inner.stats.latched += 1;
        }
        // An empty queue keeps the previous image latched.
        Ok(())
    }

    fn advance(&mut self) {
        let mut inner = self.lock();
        if let Some(image) = inner.queue.pop_front() {
            inner.current = Some(image);
            inner.stats.discarded += 1;
            debug!(sequence = image.sequence, "synthetic image discarded");
        }
    }

    fn capture_timestamp_ns(&self) -> i64 {
        self.lock().current.map_or(0, |image| image.timestamp_ns)
    }

    fn transform_matrix(&self) -> TransformMatrix {
        self.lock().transform
    }

    fn latched_sequence(&self) -> Option<u64> {
        self.lock().current.map(|image| image.sequence)
    }

    fn set_default_buffer_size(&mut self, width: u32, height: u32) {
        self.lock().stats.buffer_size = Some((width, height));
    }

    fn release(&mut self) {
        let mut inner = self.lock();
        inner.listener = None;
        inner.queue.clear();
        inner.current = None;
        inner.stats.released = true;
        info!(texture = inner.texture_id.0, "synthetic surface released");
    }
}

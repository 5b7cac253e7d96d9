//! Frame relay: pairs producer images with registered metadata and forwards
//! them to a consumer one at a time.
//!
//! Every public entry point only enqueues work on the relay's serial
//! executor, so callers on any thread never block and never touch relay
//! state directly. The pending metadata queue is the one exception: it is
//! appended to in place so its length is visible immediately.

pub mod counters;
pub mod flush;
pub mod pending;
pub mod state;
pub mod telemetry;
pub mod watchdog;

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{info, trace};

use crate::consumer::FrameConsumer;
use crate::error::RelayError;
use crate::executor::{self, ExecutorHandle};
use crate::frame::{FrameDescriptor, HardwareFrameHandle, TextureId};
use crate::producer::FrameProducer;
use crate::utils;
use crate::RelayConfig;

pub use flush::FlushCallback;
pub use state::{InFlightFrame, RelaySnapshot, RelayStats};
pub use watchdog::EosPhase;

use pending::PendingQueue;
use state::RelayState;
use watchdog::Watchdog;

/// Callbacks the consumer uses to grant capacity and report completion.
///
/// Cheap to clone; usable from any thread, including after the relay was
/// released (calls are then ignored).
#[derive(Clone)]
pub struct ConsumerFeedback {
    executor: ExecutorHandle<RelayState>,
}

impl ConsumerFeedback {
    /// The consumer can accept one more frame.
    pub fn on_ready(&self) {
        if self.executor.submit(RelayState::on_consumer_ready).is_err() {
            trace!("capacity grant after relay release");
        }
    }

    /// The consumer finished with the frame behind `handle`.
    pub fn on_frame_processed(&self, handle: HardwareFrameHandle) {
        let submitted = self
            .executor
            .submit(move |state| state.on_frame_processed(handle));
        if submitted.is_err() {
            trace!("completion after relay release");
        }
    }
}

pub struct FrameRelay {
    executor: ExecutorHandle<RelayState>,
    pending: Arc<PendingQueue>,
    texture_id: TextureId,
    join: Option<JoinHandle<RelayState>>,
}

impl FrameRelay {
    /// Creates a relay on the current tokio runtime.
    pub fn new<P, C>(producer: P, consumer: C, config: &RelayConfig) -> Result<Self, RelayError>
    where
        P: FrameProducer,
        C: FrameConsumer,
    {
        let runtime = Handle::try_current().map_err(|_| RelayError::NoRuntime)?;
        Self::with_runtime(producer, consumer, config, &runtime)
    }

    /// Creates a relay whose executor and watchdog run on `runtime`.
    ///
    /// Fails without creating anything if the producer cannot allocate its
    /// texture.
    pub fn with_runtime<P, C>(
        mut producer: P,
        consumer: C,
        config: &RelayConfig,
        runtime: &Handle,
    ) -> Result<Self, RelayError>
    where
        P: FrameProducer,
        C: FrameConsumer,
    {
        let texture_id = producer.allocate().map_err(RelayError::ProducerInit)?;

        let (executor, runner) = executor::channel::<RelayState>(config.executor_name.clone());
        let listener = executor.clone();
        producer.set_frame_available_listener(Arc::new(move || {
            if listener.submit(RelayState::on_frame_available).is_err() {
                trace!("frame available after relay release");
            }
        }));

        let environment = utils::detect_environment();
        let timeout = watchdog::select_timeout(&config.watchdog, environment);
        info!(
            texture = texture_id.0,
            ?environment,
            timeout_ms = timeout.as_millis() as u64,
            "Frame relay created"
        );

        let pending = Arc::new(PendingQueue::new());
        let state = RelayState::new(
            executor.clone(),
            Box::new(producer),
            Box::new(consumer),
            texture_id,
            pending.clone(),
            Watchdog::new(timeout, runtime.clone()),
        );
        let join = runner.spawn(state, runtime);

        Ok(Self {
            executor,
            pending,
            texture_id,
            join: Some(join),
        })
    }

    /// Texture the producer latches images into.
    pub fn texture_id(&self) -> TextureId {
        self.texture_id
    }

    pub fn feedback(&self) -> ConsumerFeedback {
        ConsumerFeedback {
            executor: self.executor.clone(),
        }
    }

    /// Announces a frame the producer will make available later.
    ///
    /// Frames must be registered in the order the producer delivers them.
    pub fn register_frame(&self, descriptor: FrameDescriptor) -> Result<(), RelayError> {
        self.pending.push(descriptor);
        self.executor.submit(RelayState::accept_incoming)?;
        Ok(())
    }

    /// Registered frames not yet forwarded. Advisory: may change concurrently.
    pub fn pending_frame_count(&self) -> usize {
        self.pending.len()
    }

    /// No more frames will be registered for the current stream.
    pub fn signal_end_of_stream(&self) -> Result<(), RelayError> {
        self.executor.submit(RelayState::signal_end_of_stream)?;
        Ok(())
    }

    /// Discards all pending and in-flight frames.
    pub fn flush(&self) -> Result<(), RelayError> {
        self.executor.submit(|state| state.flush(None))?;
        Ok(())
    }

    /// Like [`flush`](Self::flush), running `on_complete` once frames
    /// registered before the flush have all come in and been discarded.
    pub fn flush_then<F>(&self, on_complete: F) -> Result<(), RelayError>
    where
        F: FnOnce() + Send + 'static,
    {
        let callback: FlushCallback = Box::new(on_complete);
        self.executor
            .submit(move |state| state.flush(Some(callback)))?;
        Ok(())
    }

    pub fn set_default_buffer_size(&self, width: u32, height: u32) -> Result<(), RelayError> {
        self.executor
            .submit(move |state| state.set_default_buffer_size(width, height))?;
        Ok(())
    }

    /// State after every previously submitted event was handled.
    pub async fn snapshot(&self) -> Result<RelaySnapshot, RelayError> {
        Ok(self.executor.call(|state| state.snapshot()).await?)
    }

    /// Releases the producer and stops the timer and executor, without waiting.
    pub fn release(self) {
        drop(self);
    }

    /// Releases and waits until the executor has stopped.
    pub async fn release_and_wait(mut self) -> Result<(), RelayError> {
        self.shutdown();
        let Some(join) = self.join.take() else {
            return Ok(());
        };
        join.await.map_err(|_| RelayError::ExecutorPanicked)?;
        Ok(())
    }

    fn shutdown(&self) {
        // Both fail only if the executor already died.
        let _ = self.executor.submit(RelayState::release);
        let _ = self.executor.shutdown();
    }
}

impl Drop for FrameRelay {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.shutdown();
        }
    }
}

//! Frame producer collaborator: the hardware-backed surface frames arrive on.

pub mod synthetic;

use std::sync::Arc;

use crate::error::ProducerError;
use crate::frame::{TextureId, TransformMatrix};

pub use synthetic::{SyntheticProducer, SyntheticStats};

/// Invoked from an arbitrary thread whenever one more image is available.
pub type FrameAvailableCallback = Arc<dyn Fn() + Send + Sync>;

/// A surface that latches externally produced images into a texture.
///
/// The relay calls every method except the listener callback from its
/// executor only, so implementations never see concurrent calls.
pub trait FrameProducer: Send + 'static {
    /// Allocates the backing texture. Called once, before anything else.
    fn allocate(&mut self) -> Result<TextureId, ProducerError>;

    fn set_frame_available_listener(&mut self, listener: FrameAvailableCallback);

    /// Latches the next available image into the texture, advancing the read position.
    fn acquire_next_image(&mut self) -> Result<(), ProducerError>;

    /// Latches the next available image without forwarding it.
    fn advance(&mut self);

    /// Capture timestamp of the most recently latched image on the producer clock.
    fn capture_timestamp_ns(&self) -> i64;

    fn transform_matrix(&self) -> TransformMatrix;

    /// Producer-side sequence number of the latched image, if the producer keeps one.
    fn latched_sequence(&self) -> Option<u64> {
        None
    }

    fn set_default_buffer_size(&mut self, width: u32, height: u32);

    fn release(&mut self);
}

//! Frame consumer collaborator: accepts one frame at a time under capacity grants.

pub mod channel;

use crate::frame::QueuedFrame;

pub use channel::{ChannelConsumer, ConsumerEvent};

/// Downstream stage fed by the relay.
///
/// Capacity is granted and completion reported back through
/// [`ConsumerFeedback`](crate::relay::ConsumerFeedback); the relay never
/// forwards a second frame before the first one is reported processed.
pub trait FrameConsumer: Send + 'static {
    fn queue_frame(&mut self, frame: QueuedFrame);

    fn signal_end_of_stream(&mut self);
}

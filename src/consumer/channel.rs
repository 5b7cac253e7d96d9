use flume::{Receiver, Sender};
use tracing::warn;

use super::FrameConsumer;
use crate::frame::QueuedFrame;

/// What the relay delivered downstream, in delivery order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConsumerEvent {
    Frame(QueuedFrame),
    EndOfStream,
}

/// Consumer that hands every delivery to a channel for processing elsewhere.
pub struct ChannelConsumer {
    tx: Sender<ConsumerEvent>,
}

impl ChannelConsumer {
    pub fn new() -> (Self, Receiver<ConsumerEvent>) {
        let (tx, rx) = flume::unbounded();
        (Self { tx }, rx)
    }

    fn deliver(&self, event: ConsumerEvent) {
        if let Err(e) = self.tx.try_send(event) {
            warn!("Consumer channel rejected delivery: {}", e);
        }
    }
}

impl FrameConsumer for ChannelConsumer {
    fn queue_frame(&mut self, frame: QueuedFrame) {
        self.deliver(ConsumerEvent::Frame(frame));
    }

    fn signal_end_of_stream(&mut self) {
        self.deliver(ConsumerEvent::EndOfStream);
    }
}

//! Descriptors registered ahead of their frames.

use crossbeam::queue::SegQueue;

use crate::frame::FrameDescriptor;

/// Lock-free FIFO of registered descriptors.
///
/// Any thread may push or read the length. Only the relay executor pops or
/// clears, so the length seen elsewhere is a hint.
#[derive(Default)]
pub struct PendingQueue {
    queue: SegQueue<FrameDescriptor>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, descriptor: FrameDescriptor) {
        self.queue.push(descriptor);
    }

    pub fn pop(&self) -> Option<FrameDescriptor> {
        self.queue.pop()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Removes every descriptor, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let mut cleared = 0;
        while self.queue.pop().is_some() {
            cleared += 1;
        }
        cleared
    }
}

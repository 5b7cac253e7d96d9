//! Capacity tokens and available-frame accounting.
//!
//! Both counters are owned by the relay executor. Taking from an empty
//! counter means dispatch ran without its precondition, which is a bug in
//! the relay, so it panics instead of wrapping.

/// Frames the consumer is currently willing to accept.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Capacity(u32);

impl Capacity {
    pub fn get(self) -> u32 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn grant(&mut self) {
        self.0 = self.0.saturating_add(1);
    }

    pub fn take(&mut self) {
        assert!(self.0 > 0, "consumer capacity taken while none was granted");
        self.0 -= 1;
    }

    pub fn reset(&mut self) {
        self.0 = 0;
    }
}

/// Producer images signalled available but not yet forwarded or discarded.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AvailableCount(u32);

impl AvailableCount {
    pub fn get(self) -> u32 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn increment(&mut self) {
        self.0 = self.0.saturating_add(1);
    }

    pub fn take(&mut self) {
        assert!(self.0 > 0, "available frame taken while none was signalled");
        self.0 -= 1;
    }
}

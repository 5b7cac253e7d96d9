use serde::{Deserialize, Serialize};

/// Identifier of the producer-owned texture frames are latched into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextureId(pub u32);

/// Column-major 4x4 texture coordinate transform reported by the producer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformMatrix(pub [f32; 16]);

impl TransformMatrix {
    pub const IDENTITY: Self = Self([
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]);
}

impl Default for TransformMatrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Metadata registered for a frame before the producer makes it available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDescriptor {
    pub width: u32,
    pub height: u32,
    /// Added to the producer timestamp so consumers only see stream-relative time.
    pub timestamp_offset_us: i64,
    /// Producer sequence number this descriptor is expected to pair with, if known.
    pub expected_sequence: Option<u64>,
}

impl FrameDescriptor {
    pub fn new(width: u32, height: u32, timestamp_offset_us: i64) -> Self {
        Self {
            width,
            height,
            timestamp_offset_us,
            expected_sequence: None,
        }
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.expected_sequence = Some(sequence);
        self
    }

    /// Presentation time for a frame captured at `capture_timestamp_ns`.
    pub fn presentation_time_us(&self, capture_timestamp_ns: i64) -> i64 {
        capture_timestamp_ns / 1000 + self.timestamp_offset_us
    }
}

/// Reference to the image currently latched for the in-flight frame.
///
/// `sequence` names the single in-flight slot; a handle from an earlier
/// dispatch never matches the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HardwareFrameHandle {
    pub texture_id: TextureId,
    pub sequence: u64,
}

/// Texture as seen by the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureInfo {
    pub id: TextureId,
    pub width: u32,
    pub height: u32,
}

/// Everything the consumer receives for one forwarded frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueuedFrame {
    pub handle: HardwareFrameHandle,
    pub texture: TextureInfo,
    pub transform: TransformMatrix,
    pub presentation_time_us: i64,
}

// Audio module - lock-free capture plumbing and input backends

pub mod buffer_pool;
pub mod source;
pub mod source_cpal;

// Re-export commonly used types for convenience
pub use buffer_pool::{
    AnalysisChannels, AudioBuffer, BufferPool, BufferPoolChannels, CaptureChannels,
};
pub use source::{AudioSource, StreamHandle};
pub use source_cpal::CpalSource;

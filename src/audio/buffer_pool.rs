// BufferPool - lock-free buffer pool with dual SPSC queues
//
// Implements an object pool using two lock-free SPSC (Single Producer
// Single Consumer) ring buffers so the capture callback never allocates.
//
// Architecture:
// - DATA queue: capture side pushes filled buffers, analysis thread consumes
// - POOL queue: analysis thread returns drained buffers, capture side recycles
//
// Buffer flow:
// 1. Capture side pops an empty buffer from the POOL queue
// 2. Capture side fills it with mono samples
// 3. Capture side pushes it to the DATA queue
// 4. Analysis thread pops it from the DATA queue
// 5. Analysis thread conditions and windows the samples
// 6. Analysis thread pushes the buffer back to the POOL queue

use rtrb::{Consumer, Producer};

/// Audio buffer type - pre-allocated vector of f32 samples
pub type AudioBuffer = Vec<f32>;

/// The capture side's half of the pool: recycle empties, publish fills
pub struct CaptureChannels {
    /// Consumer for retrieving empty buffers in the capture callback
    pub pool_consumer: Consumer<AudioBuffer>,
    /// Producer for sending filled buffers to the analysis thread
    pub data_producer: Producer<AudioBuffer>,
}

/// The analysis thread's half of the pool: drain fills, return empties
pub struct AnalysisChannels {
    /// Consumer for receiving filled buffers on the analysis thread
    pub data_consumer: Consumer<AudioBuffer>,
    /// Producer for returning drained buffers to the capture side
    pub pool_producer: Producer<AudioBuffer>,
}

/// All four queue endpoints, before the per-thread split
pub struct BufferPoolChannels {
    pub data_producer: Producer<AudioBuffer>,
    pub data_consumer: Consumer<AudioBuffer>,
    pub pool_producer: Producer<AudioBuffer>,
    pub pool_consumer: Consumer<AudioBuffer>,
}

impl BufferPoolChannels {
    /// Split into the two halves handed to the capture and analysis threads
    pub fn split(self) -> (CaptureChannels, AnalysisChannels) {
        (
            CaptureChannels {
                pool_consumer: self.pool_consumer,
                data_producer: self.data_producer,
            },
            AnalysisChannels {
                data_consumer: self.data_consumer,
                pool_producer: self.pool_producer,
            },
        )
    }
}

/// Lock-free buffer pool using dual SPSC ring buffers
///
/// Pre-allocates a fixed number of audio buffers and circulates them
/// through two lock-free queues. Both queues have capacity for every
/// buffer in the pool, so a push on either side can only fail if the
/// other side leaked buffers.
///
/// # Thread Safety
/// - Lock-free: no mutex in any queue operation
/// - Wait-free: push/pop have bounded execution time
pub struct BufferPool;

impl BufferPool {
    /// Create a new BufferPool with specified buffer count and size
    ///
    /// # Arguments
    /// * `buffer_count` - Number of buffers to pre-allocate (typical: 8-32)
    /// * `buffer_size` - Size of each buffer in f32 samples (typical: 1024-4096)
    ///
    /// # Panics
    /// Panics if buffer_count is 0 or buffer_size is 0
    ///
    /// All heap allocation happens here; the capture path never allocates.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(buffer_count: usize, buffer_size: usize) -> BufferPoolChannels {
        assert!(buffer_count > 0, "buffer_count must be greater than 0");
        assert!(buffer_size > 0, "buffer_size must be greater than 0");

        let (mut pool_producer, pool_consumer) = rtrb::RingBuffer::new(buffer_count);
        let (data_producer, data_consumer) = rtrb::RingBuffer::new(buffer_count);

        // Pre-allocate all buffers and fill the pool queue
        for _ in 0..buffer_count {
            let buffer = vec![0.0_f32; buffer_size];
            pool_producer
                .push(buffer)
                .expect("Failed to push buffer to pool queue during initialization");
        }

        BufferPoolChannels {
            data_producer,
            data_consumer,
            pool_producer,
            pool_consumer,
        }
    }
}

//! Audio capture abstraction.
//!
//! [`AudioSource`] is the seam between the session controller and whatever
//! produces samples - the cpal microphone backend in production, synthetic
//! fixture sources in tests. A source fills pre-allocated pool buffers with
//! mono f32 samples and hands them to the analysis thread through the
//! lock-free data queue. The returned [`StreamHandle`] owns the capture
//! thread and tears it down on stop or drop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use super::buffer_pool::CaptureChannels;
use crate::error::SessionError;

/// Provider of mono f32 capture buffers
///
/// Implementations must not block in `open`: capture runs on its own
/// thread and the handle's `running` flag is the only shutdown signal.
pub trait AudioSource: Send {
    /// Sample rate of the capture stream in Hz
    fn sample_rate(&self) -> u32;

    /// Start capture, filling pool buffers and pushing them to the data queue
    ///
    /// # Errors
    /// Returns an error if the capture device or stream cannot be opened
    fn open(&mut self, channels: CaptureChannels) -> Result<StreamHandle, SessionError>;
}

/// Handle to a running capture thread
///
/// Dropping the handle stops capture and joins the thread.
pub struct StreamHandle {
    running: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl StreamHandle {
    pub fn new(running: Arc<AtomicBool>, failed: Arc<AtomicBool>, join: JoinHandle<()>) -> Self {
        StreamHandle {
            running,
            failed,
            join: Some(join),
        }
    }

    /// Whether the capture thread is still producing buffers
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Whether the stream reported an unrecoverable error
    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// Stop capture and join the thread
    ///
    /// Idempotent: subsequent calls are no-ops.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

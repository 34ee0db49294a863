// Session event payloads and broadcast stream adapters
//
// Observers (CLI countdown display, level meters, waveform view) subscribe
// to tokio broadcast channels owned by the SessionController. The adapter
// here turns a receiver into a futures Stream for async consumers.

use futures::stream::{BoxStream, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// One tick of the recording countdown, emitted once per second
///
/// The first tick carries the full remaining duration; the final tick is
/// zero and coincides with the end of the recording phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CountdownTick {
    pub seconds_remaining: u32,
}

/// Summary of one waveform window of raw (pre-conditioning) samples
///
/// Display-only payload: the analysis path never reads these.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct WaveformFrame {
    /// RMS of the window
    pub rms: f32,
    /// Largest absolute sample value in the window
    pub peak: f32,
}

/// Adapt a broadcast receiver into a stream of its events
///
/// A subscriber that lags behind the channel buffer skips the overwritten
/// events and keeps going; the stream ends when the channel closes.
pub fn broadcast_stream<T: Clone + Send + 'static>(
    rx: broadcast::Receiver<T>,
) -> BoxStream<'static, T> {
    BroadcastStream::new(rx)
        .filter_map(|event| async move { event.ok() })
        .boxed()
}

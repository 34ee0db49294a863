use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use super::buffer_pool::CaptureChannels;
use super::source::{AudioSource, StreamHandle};
use crate::error::SessionError;

/// Microphone capture backend using the default cpal input device
///
/// `cpal::Stream` is not `Send`, so the stream is built, played, and
/// dropped entirely on a dedicated thread. `open` blocks only until that
/// thread reports whether the stream started.
pub struct CpalSource {
    sample_rate: u32,
}

impl CpalSource {
    /// Resolve the default input device and record its sample rate
    ///
    /// # Errors
    /// Returns `DeviceUnavailable` if no input device exists and
    /// `StreamOpenFailed` if its configuration cannot be read or it does
    /// not produce f32 samples.
    pub fn new() -> Result<Self, SessionError> {
        let config = default_input_config()?;
        Ok(CpalSource {
            sample_rate: config.sample_rate().0,
        })
    }
}

impl AudioSource for CpalSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn open(&mut self, channels: CaptureChannels) -> Result<StreamHandle, SessionError> {
        let running = Arc::new(AtomicBool::new(true));
        let failed = Arc::new(AtomicBool::new(false));
        let expected_rate = self.sample_rate;

        // The opener blocks on this until the stream thread reports
        // whether play() succeeded.
        let (result_tx, result_rx) = mpsc::sync_channel::<Result<(), SessionError>>(1);

        let thread_running = Arc::clone(&running);
        let thread_failed = Arc::clone(&failed);
        let join = std::thread::spawn(move || {
            let stream = match build_input_stream(expected_rate, channels, &thread_failed) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = result_tx.send(Err(e));
                    return;
                }
            };

            if let Err(e) = stream.play() {
                let _ = result_tx.send(Err(SessionError::StreamOpenFailed {
                    reason: format!("Input start failed: {}", e),
                }));
                return;
            }

            let _ = result_tx.send(Ok(()));

            // Keep the stream alive until shutdown; dropping it here
            // closes the device.
            while thread_running.load(Ordering::SeqCst) && !thread_failed.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(10));
            }
            drop(stream);
        });

        match result_rx.recv() {
            Ok(Ok(())) => Ok(StreamHandle::new(running, failed, join)),
            Ok(Err(e)) => {
                let _ = join.join();
                Err(e)
            }
            Err(_) => {
                let _ = join.join();
                Err(SessionError::StreamOpenFailed {
                    reason: "Stream thread exited before reporting status".to_string(),
                })
            }
        }
    }
}

fn default_input_config() -> Result<cpal::SupportedStreamConfig, SessionError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| SessionError::DeviceUnavailable {
            reason: "No default input device found".to_string(),
        })?;

    let config = device
        .default_input_config()
        .map_err(|e| SessionError::StreamOpenFailed {
            reason: format!("Failed to get default input config: {:?}", e),
        })?;

    if config.sample_format() != cpal::SampleFormat::F32 {
        return Err(SessionError::StreamOpenFailed {
            reason: "Only F32 sample format is currently supported for input".to_string(),
        });
    }

    Ok(config)
}

fn build_input_stream(
    expected_rate: u32,
    mut channels: CaptureChannels,
    failed: &Arc<AtomicBool>,
) -> Result<cpal::Stream, SessionError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| SessionError::DeviceUnavailable {
            reason: "No default input device found".to_string(),
        })?;

    let config = device
        .default_input_config()
        .map_err(|e| SessionError::StreamOpenFailed {
            reason: format!("Failed to get default input config: {:?}", e),
        })?;

    let stream_config: cpal::StreamConfig = config.clone().into();
    if stream_config.sample_rate.0 != expected_rate {
        return Err(SessionError::StreamOpenFailed {
            reason: format!(
                "Input sample rate changed: expected {} Hz, got {} Hz",
                expected_rate, stream_config.sample_rate.0
            ),
        });
    }
    let channels_count = stream_config.channels as usize;

    let err_failed = Arc::clone(failed);
    let err_fn = move |err| {
        log::error!("[CpalSource] Input stream error: {}", err);
        err_failed.store(true, Ordering::SeqCst);
    };

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buffer) = channels.pool_consumer.pop() {
                    buffer.clear();
                    if channels_count == 1 {
                        buffer.extend_from_slice(data);
                    } else {
                        // De-interleave: take first channel
                        for frame in data.chunks(channels_count) {
                            if !frame.is_empty() {
                                buffer.push(frame[0]);
                            } else {
                                buffer.push(0.0);
                            }
                        }
                    }
                    let _ = channels.data_producer.push(buffer);
                }
            },
            err_fn,
            None,
        ),
        _ => {
            return Err(SessionError::StreamOpenFailed {
                reason: "Only F32 sample format is currently supported for input".to_string(),
            })
        }
    }
    .map_err(|e| SessionError::StreamOpenFailed {
        reason: format!("{:?}", e),
    })?;

    Ok(stream)
}

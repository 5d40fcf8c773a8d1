//! Geräte-Backend - cpal für Audio, nokhwa für die Kamera
//!
//! Verwendet cpal für Cross-Platform Audio I/O. Die Kamera ist nur mit
//! dem Feature `camera` verfügbar.

use super::capture::{
    classify_device_error, AudioTrack, CaptureRequest, CaptureStream, MediaBackend, MediaError,
    MediaResource, SampleCallback, VideoTrack,
};
use super::pcm::{first_channel, resample_linear};
use super::playback::{EndedCallback, PlaybackContext};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, SupportedStreamConfig, SupportedStreamConfigRange};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

// ============================================================================
// BACKEND
// ============================================================================

/// Echte Geräte des Systems
#[derive(Debug, Default, Clone, Copy)]
pub struct DeviceBackend;

impl DeviceBackend {
    fn open_devices(request: CaptureRequest) -> Result<MediaResource, MediaError> {
        let audio: Option<Box<dyn AudioTrack>> = match request.audio {
            Some(constraints) => {
                let mic = CpalMicrophone::open()?;
                tracing::debug!(
                    "Microphone constraints: echo_cancellation={}, noise_suppression={}, auto_gain_control={}",
                    constraints.echo_cancellation,
                    constraints.noise_suppression,
                    constraints.auto_gain_control
                );
                Some(Box::new(mic))
            }
            None => None,
        };

        let video: Option<Box<dyn VideoTrack>> = match request.video {
            #[cfg(feature = "camera")]
            Some(constraints) => Some(Box::new(camera::NokhwaCamera::open(&constraints)?)),
            #[cfg(not(feature = "camera"))]
            Some(_) => {
                return Err(MediaError::DeviceNotFound(
                    "camera support not compiled in (enable feature `camera`)".to_string(),
                ))
            }
            None => None,
        };

        Ok(MediaResource::new(video, audio))
    }
}

#[async_trait]
impl MediaBackend for DeviceBackend {
    async fn acquire(&self, request: CaptureRequest) -> Result<MediaResource, MediaError> {
        tokio::task::spawn_blocking(move || Self::open_devices(request))
            .await
            .map_err(|e| MediaError::Acquisition(e.to_string()))?
    }

    fn open_playback(&self, sample_rate: u32) -> Result<Box<dyn PlaybackContext>, MediaError> {
        Ok(Box::new(CpalPlayback::open(sample_rate)?))
    }
}

// ============================================================================
// CONFIG SELECTION
// ============================================================================

/// Wählt die beste Konfiguration aus einer Liste
///
/// Priorität: Ziel-Rate mit F32 > F32 mit nächstbester Rate > erste verfügbare.
fn select_best_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Result<SupportedStreamConfig, MediaError> {
    let target = cpal::SampleRate(target_rate);
    let supports_target =
        |c: &SupportedStreamConfigRange| c.min_sample_rate() <= target && c.max_sample_rate() >= target;

    if let Some(config) = configs
        .iter()
        .find(|c| supports_target(c) && c.sample_format() == SampleFormat::F32)
    {
        return Ok(config.clone().with_sample_rate(target));
    }

    if let Some(config) = configs
        .iter()
        .find(|c| c.sample_format() == SampleFormat::F32)
    {
        return Ok(config.clone().with_max_sample_rate());
    }

    if let Some(config) = configs.iter().find(|c| supports_target(c)) {
        return Ok(config.clone().with_sample_rate(target));
    }

    configs
        .first()
        .map(|c| c.clone().with_max_sample_rate())
        .ok_or_else(|| MediaError::AudioSetup("No suitable audio configuration found".to_string()))
}

/// cpal-Stream, der zwischen Threads verschoben werden darf
struct SendStream(Stream);

// Stream ist auf einigen Plattformen nicht Send. Er wird nur erzeugt,
// gestartet und gedroppt, nie aus mehreren Threads gleichzeitig benutzt.
unsafe impl Send for SendStream {}

// ============================================================================
// MICROPHONE
// ============================================================================

pub struct CpalMicrophone {
    device: Device,
    label: String,
}

impl CpalMicrophone {
    fn open() -> Result<Self, MediaError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or_else(|| {
            tracing::warn!("No audio input device found");
            MediaError::DeviceNotFound("no audio input device".to_string())
        })?;
        let label = device
            .name()
            .unwrap_or_else(|_| "default microphone".to_string());

        // Konfiguration früh prüfen, damit Zugriffsfehler bei der Anforderung auffallen
        let _configs = device
            .supported_input_configs()
            .map_err(|e| classify_device_error(&e.to_string()))?;

        tracing::info!("Microphone acquired: {}", label);
        Ok(Self { device, label })
    }
}

impl AudioTrack for CpalMicrophone {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn open_stream(
        &self,
        sample_rate: u32,
        mut on_samples: SampleCallback,
    ) -> Result<Box<dyn CaptureStream>, MediaError> {
        let configs = self
            .device
            .supported_input_configs()
            .map_err(|e| MediaError::AudioSetup(e.to_string()))?;
        let supported = select_best_config(configs.collect(), sample_rate)?;
        let format = supported.sample_format();
        let config = supported.config();
        let source_rate = config.sample_rate.0;
        let channels = config.channels as usize;

        tracing::info!(
            "Starting audio capture: {} Hz, {} channels, {:?}",
            source_rate,
            channels,
            format
        );

        let err_fn = |err: cpal::StreamError| {
            tracing::error!("Audio capture error: {}", err);
        };

        let stream = match format {
            SampleFormat::F32 => self.device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mono = first_channel(data, channels);
                    on_samples(&resample_linear(&mono, source_rate, sample_rate));
                },
                err_fn,
                None,
            ),
            SampleFormat::I16 => self.device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let floats: Vec<f32> = data.iter().map(|&s| s as f32 / 32768.0).collect();
                    let mono = first_channel(&floats, channels);
                    on_samples(&resample_linear(&mono, source_rate, sample_rate));
                },
                err_fn,
                None,
            ),
            other => {
                return Err(MediaError::AudioSetup(format!(
                    "unsupported sample format {:?}",
                    other
                )))
            }
        }
        .map_err(|e| MediaError::AudioSetup(e.to_string()))?;

        stream
            .play()
            .map_err(|e| MediaError::AudioSetup(e.to_string()))?;

        Ok(Box::new(CpalCaptureStream {
            stream: Some(SendStream(stream)),
        }))
    }

    fn stop(&mut self) {
        tracing::debug!("Microphone released: {}", self.label);
    }
}

struct CpalCaptureStream {
    stream: Option<SendStream>,
}

impl CaptureStream for CpalCaptureStream {
    fn close(&mut self) {
        if self.stream.take().is_some() {
            tracing::info!("Audio capture stream stopped");
        }
    }
}

// ============================================================================
// PLAYBACK
// ============================================================================

#[derive(Default)]
struct ActiveChunk {
    samples: VecDeque<f32>,
    on_ended: Option<EndedCallback>,
}

/// Lautsprecher-Ausgabe über cpal
///
/// Der Ausgabe-Stream läuft dauerhaft und spielt Stille, solange kein Chunk
/// aktiv ist.
pub struct CpalPlayback {
    stream: Option<SendStream>,
    active: Arc<Mutex<ActiveChunk>>,
    source_rate: u32,
    device_rate: u32,
}

impl CpalPlayback {
    fn open(source_rate: u32) -> Result<Self, MediaError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| MediaError::AudioSetup("No audio output device found".to_string()))?;

        let configs = device
            .supported_output_configs()
            .map_err(|e| MediaError::AudioSetup(e.to_string()))?;
        let config = select_best_config(configs.collect(), source_rate)?.config();
        let device_rate = config.sample_rate.0;
        let channels = config.channels as usize;

        tracing::info!(
            "Starting audio playback: {} Hz, {} channels",
            device_rate,
            channels
        );

        let active = Arc::new(Mutex::new(ActiveChunk::default()));
        let shared = Arc::clone(&active);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut chunk = shared.lock();
                    for frame in data.chunks_mut(channels.max(1)) {
                        let sample = chunk.samples.pop_front().unwrap_or(0.0);
                        frame.iter_mut().for_each(|s| *s = sample);
                    }
                    if chunk.samples.is_empty() {
                        if let Some(on_ended) = chunk.on_ended.take() {
                            on_ended();
                        }
                    }
                },
                |err| {
                    tracing::error!("Audio playback error: {}", err);
                },
                None,
            )
            .map_err(|e| MediaError::AudioSetup(e.to_string()))?;

        stream
            .play()
            .map_err(|e| MediaError::AudioSetup(e.to_string()))?;

        Ok(Self {
            stream: Some(SendStream(stream)),
            active,
            source_rate,
            device_rate,
        })
    }
}

impl PlaybackContext for CpalPlayback {
    fn play(&mut self, samples: Vec<f32>, on_ended: EndedCallback) -> Result<(), MediaError> {
        if self.stream.is_none() {
            return Err(MediaError::AudioSetup("playback context closed".to_string()));
        }

        let resampled = resample_linear(&samples, self.source_rate, self.device_rate);
        let mut chunk = self.active.lock();
        chunk.samples = resampled.into();
        chunk.on_ended = Some(on_ended);
        Ok(())
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            let mut chunk = self.active.lock();
            chunk.samples.clear();
            chunk.on_ended = None;
            tracing::info!("Audio playback stream stopped");
        }
    }
}

// ============================================================================
// CAMERA
// ============================================================================

#[cfg(feature = "camera")]
mod camera {
    use super::super::capture::{classify_device_error, MediaError, VideoFrame, VideoTrack};
    use crate::config::VideoConstraints;
    use nokhwa::pixel_format::RgbFormat;
    use nokhwa::utils::{
        CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
    };
    use nokhwa::CallbackCamera;
    use parking_lot::Mutex;

    pub struct NokhwaCamera {
        camera: Mutex<CallbackCamera>,
        label: String,
        stopped: bool,
    }

    // CallbackCamera ist je nach Backend nicht Send/Sync. Zugriff läuft
    // ausschließlich über den Mutex.
    unsafe impl Send for NokhwaCamera {}
    unsafe impl Sync for NokhwaCamera {}

    impl NokhwaCamera {
        pub fn open(constraints: &VideoConstraints) -> Result<Self, MediaError> {
            let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
                CameraFormat::new(
                    Resolution::new(constraints.width, constraints.height),
                    FrameFormat::MJPEG,
                    constraints.frame_rate,
                ),
            ));

            let mut camera = CallbackCamera::new(CameraIndex::Index(0), format, |_| {})
                .map_err(|e| classify_device_error(&e.to_string()))?;
            camera
                .open_stream()
                .map_err(|e| classify_device_error(&e.to_string()))?;

            let label = camera
                .info()
                .map(|info| info.human_name())
                .unwrap_or_else(|_| "camera".to_string());
            tracing::info!(
                "Camera acquired: {} ({}x{}@{})",
                label,
                constraints.width,
                constraints.height,
                constraints.frame_rate
            );

            Ok(Self {
                camera: Mutex::new(camera),
                label,
                stopped: false,
            })
        }
    }

    impl VideoTrack for NokhwaCamera {
        fn label(&self) -> String {
            self.label.clone()
        }

        fn latest_frame(&self) -> Option<VideoFrame> {
            if self.stopped {
                return None;
            }
            let buffer = self.camera.lock().last_frame().ok()?;
            let image = buffer.decode_image::<RgbFormat>().ok()?;
            Some(VideoFrame {
                width: image.width(),
                height: image.height(),
                rgb: image.into_raw(),
            })
        }

        fn stop(&mut self) {
            if self.stopped {
                return;
            }
            self.stopped = true;
            if let Err(e) = self.camera.lock().stop_stream() {
                tracing::warn!("Failed to stop camera stream: {}", e);
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

//! Test-Doubles für Geräte und Verbindung
//!
//! Alle Fakes zählen ihre Aufrufe in einer geteilten Probe, damit Tests
//! die Freigabe-Reihenfolge und -Anzahl prüfen können.

use crate::media::{
    AudioTrack, CaptureRequest, CaptureStream, EndedCallback, MediaBackend, MediaError,
    MediaResource, PlaybackContext, SampleCallback, VideoFrame, VideoTrack,
};
use crate::session::EventSender;
use crate::transport::{Connector, Link, LinkEvent, TransportError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ============================================================================
// MEDIA PROBE
// ============================================================================

#[derive(Default)]
pub struct Probe {
    acquisitions: AtomicUsize,
    video_stops: AtomicUsize,
    audio_stops: AtomicUsize,
    graph_closes: AtomicUsize,
    playback_opens: AtomicUsize,
    playback_closes: AtomicUsize,

    frame: Mutex<Option<VideoFrame>>,
    audio_callback: Mutex<Option<SampleCallback>>,
    played: Mutex<Vec<Vec<f32>>>,
    pending: Mutex<VecDeque<EndedCallback>>,

    fail_acquire: Mutex<Option<MediaError>>,
    fail_audio_stream: Mutex<Option<MediaError>>,
    fail_playback: Mutex<Option<MediaError>>,
    fail_next_play: Mutex<Option<MediaError>>,
}

impl Probe {
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    pub fn video_stops(&self) -> usize {
        self.video_stops.load(Ordering::SeqCst)
    }

    pub fn audio_stops(&self) -> usize {
        self.audio_stops.load(Ordering::SeqCst)
    }

    pub fn graph_closes(&self) -> usize {
        self.graph_closes.load(Ordering::SeqCst)
    }

    pub fn playback_opens(&self) -> usize {
        self.playback_opens.load(Ordering::SeqCst)
    }

    pub fn playback_closes(&self) -> usize {
        self.playback_closes.load(Ordering::SeqCst)
    }

    pub fn fail_acquire(&self, error: MediaError) {
        *self.fail_acquire.lock() = Some(error);
    }

    pub fn fail_audio_stream(&self, error: MediaError) {
        *self.fail_audio_stream.lock() = Some(error);
    }

    pub fn fail_playback(&self, error: MediaError) {
        *self.fail_playback.lock() = Some(error);
    }

    pub fn fail_next_play(&self, error: MediaError) {
        *self.fail_next_play.lock() = Some(error);
    }

    pub fn set_frame(&self, frame: Option<VideoFrame>) {
        *self.frame.lock() = frame;
    }

    /// Speist Samples in den offenen Aufnahme-Graphen
    pub fn feed_samples(&self, samples: &[f32]) -> bool {
        match self.audio_callback.lock().as_mut() {
            Some(callback) => {
                callback(samples);
                true
            }
            None => false,
        }
    }

    /// Alle bisher gestarteten Chunks in Reihenfolge
    pub fn played(&self) -> Vec<Vec<f32>> {
        self.played.lock().clone()
    }

    pub fn in_flight(&self) -> usize {
        self.pending.lock().len()
    }

    /// Beendet den ältesten laufenden Chunk
    pub fn finish_playback(&self) -> bool {
        let callback = self.pending.lock().pop_front();
        match callback {
            Some(on_ended) => {
                on_ended();
                true
            }
            None => false,
        }
    }
}

// ============================================================================
// MEDIA FAKES
// ============================================================================

pub struct MockBackend {
    probe: Arc<Probe>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            probe: Arc::new(Probe::default()),
        }
    }

    pub fn probe(&self) -> Arc<Probe> {
        Arc::clone(&self.probe)
    }

    pub fn fail_acquire(&self, error: MediaError) {
        self.probe.fail_acquire(error);
    }
}

#[async_trait]
impl MediaBackend for MockBackend {
    async fn acquire(&self, request: CaptureRequest) -> Result<MediaResource, MediaError> {
        if let Some(error) = self.probe.fail_acquire.lock().take() {
            return Err(error);
        }
        self.probe.acquisitions.fetch_add(1, Ordering::SeqCst);

        let video = request.video.map(|_| {
            Box::new(MockVideoTrack {
                probe: self.probe(),
            }) as Box<dyn VideoTrack>
        });
        let audio = request.audio.map(|_| {
            Box::new(MockAudioTrack {
                probe: self.probe(),
            }) as Box<dyn AudioTrack>
        });
        Ok(MediaResource::new(video, audio))
    }

    fn open_playback(&self, _sample_rate: u32) -> Result<Box<dyn PlaybackContext>, MediaError> {
        if let Some(error) = self.probe.fail_playback.lock().take() {
            return Err(error);
        }
        self.probe.playback_opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockPlayback::new(self.probe())))
    }
}

pub struct MockVideoTrack {
    probe: Arc<Probe>,
}

impl MockVideoTrack {
    pub fn not_ready() -> Self {
        Self {
            probe: Arc::new(Probe::default()),
        }
    }

    pub fn with_frame(frame: VideoFrame) -> Self {
        let probe = Arc::new(Probe::default());
        probe.set_frame(Some(frame));
        Self { probe }
    }
}

impl VideoTrack for MockVideoTrack {
    fn label(&self) -> String {
        "mock camera".to_string()
    }

    fn latest_frame(&self) -> Option<VideoFrame> {
        self.probe.frame.lock().clone()
    }

    fn stop(&mut self) {
        self.probe.video_stops.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct MockAudioTrack {
    probe: Arc<Probe>,
}

impl MockAudioTrack {
    pub fn new() -> Self {
        Self {
            probe: Arc::new(Probe::default()),
        }
    }

    pub fn probe(&self) -> Arc<Probe> {
        Arc::clone(&self.probe)
    }
}

impl AudioTrack for MockAudioTrack {
    fn label(&self) -> String {
        "mock microphone".to_string()
    }

    fn open_stream(
        &self,
        _sample_rate: u32,
        on_samples: SampleCallback,
    ) -> Result<Box<dyn CaptureStream>, MediaError> {
        if let Some(error) = self.probe.fail_audio_stream.lock().take() {
            return Err(error);
        }
        *self.probe.audio_callback.lock() = Some(on_samples);
        Ok(Box::new(MockCaptureStream {
            probe: Arc::clone(&self.probe),
        }))
    }

    fn stop(&mut self) {
        self.probe.audio_stops.fetch_add(1, Ordering::SeqCst);
    }
}

struct MockCaptureStream {
    probe: Arc<Probe>,
}

impl CaptureStream for MockCaptureStream {
    fn close(&mut self) {
        self.probe.audio_callback.lock().take();
        self.probe.graph_closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct MockPlayback {
    probe: Arc<Probe>,
}

impl MockPlayback {
    pub fn new(probe: Arc<Probe>) -> Self {
        Self { probe }
    }
}

impl PlaybackContext for MockPlayback {
    fn play(&mut self, samples: Vec<f32>, on_ended: EndedCallback) -> Result<(), MediaError> {
        if let Some(error) = self.probe.fail_next_play.lock().take() {
            return Err(error);
        }
        self.probe.played.lock().push(samples);
        self.probe.pending.lock().push_back(on_ended);
        Ok(())
    }

    fn close(&mut self) {
        self.probe.pending.lock().clear();
        self.probe.playback_closes.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// TRANSPORT FAKES
// ============================================================================

#[derive(Default)]
pub struct LinkProbe {
    connects: AtomicUsize,
    closes: AtomicUsize,
    sent: Mutex<Vec<String>>,
    sender: Mutex<Option<EventSender>>,
}

impl LinkProbe {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn link_closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn sent_frames(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Sender der zuletzt aufgebauten Verbindung
    pub fn last_sender(&self) -> Option<EventSender> {
        self.sender.lock().clone()
    }

    /// Meldet ein Verbindungs-Event wie der WebSocket-Task
    pub fn emit(&self, event: LinkEvent) -> bool {
        match self.sender.lock().as_ref() {
            Some(sender) => {
                sender.link(event);
                true
            }
            None => false,
        }
    }
}

pub struct MockConnector {
    probe: Arc<LinkProbe>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self {
            probe: Arc::new(LinkProbe::default()),
        }
    }

    pub fn probe(&self) -> Arc<LinkProbe> {
        Arc::clone(&self.probe)
    }
}

impl Connector for MockConnector {
    fn connect(&self, _endpoint: &str, events: EventSender) -> Box<dyn Link> {
        self.probe.connects.fetch_add(1, Ordering::SeqCst);
        *self.probe.sender.lock() = Some(events);
        Box::new(MockLink {
            probe: Arc::clone(&self.probe),
        })
    }
}

struct MockLink {
    probe: Arc<LinkProbe>,
}

impl Link for MockLink {
    fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.probe.sent.lock().push(text);
        Ok(())
    }

    fn close(&mut self) {
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
    }
}

//! Session Controller - Zustandsmaschine einer Live-Session
//!
//! Der Controller läuft als einzelner Task und verarbeitet nacheinander:
//! - Befehle vom [`SessionHandle`](super::SessionHandle)
//! - Events der Verbindung, des Mikrofons und der Wiedergabe
//! - den Capture-Timer für Kamera-Frames
//! - die Deadline des Notification-Overlays
//!
//! Dadurch gibt es keinen gleichzeitigen Zugriff auf den Session-Zustand.

use super::events::{ControllerEvent, EventSender, SessionEvent};
use super::handle::Command;
use super::state::{Session, SessionError, SessionState, SessionStats, SessionView};
use crate::config::{AppConfig, SessionConfig, DEFAULT_ENDPOINT};
use crate::media::pcm::DOWNLINK_SAMPLE_RATE;
use crate::media::{
    AudioPlaybackScheduler, AudioUplinkEncoder, CaptureRequest, FrameEncoder, MediaBackend,
    MediaCaptureManager, MediaError, DEFAULT_CAPTURE_INTERVAL, DEFAULT_JPEG_QUALITY,
};
use crate::notifications::{NotificationDraft, NotificationPipeline, Severity};
use crate::transport::{
    Connector, InboundMessage, LinkEvent, OutboundMessage, ProtocolError, TransportChannel,
    TransportError, NORMAL_CLOSE,
};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use uuid::Uuid;

/// Kapazität des Event-Bus
const EVENT_BUS_CAPACITY: usize = 256;

// ============================================================================
// SETTINGS
// ============================================================================

/// Einstellungen, die für alle Sessions eines Controllers gelten
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    pub endpoint: String,
    pub capture_interval: Duration,
    pub jpeg_quality: u8,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            capture_interval: DEFAULT_CAPTURE_INTERVAL,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl From<&AppConfig> for ControllerSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            capture_interval: config.capture_interval(),
            jpeg_quality: config.jpeg_quality,
        }
    }
}

// ============================================================================
// CONTROLLER
// ============================================================================

pub struct SessionController {
    settings: ControllerSettings,
    connector: Arc<dyn Connector>,

    capture: MediaCaptureManager,
    transport: Option<TransportChannel>,
    frame_encoder: FrameEncoder,
    uplink: Option<AudioUplinkEncoder>,
    playback: AudioPlaybackScheduler,
    notifications: NotificationPipeline,
    capture_timer: Option<Interval>,

    session: Session,
    error_notice: Option<String>,
    transcript: String,
    stats: SessionStats,

    /// Sender der aktuellen Session, `None` solange keine läuft
    events: Option<EventSender>,
    events_tx: mpsc::UnboundedSender<ControllerEvent>,
    events_rx: mpsc::UnboundedReceiver<ControllerEvent>,

    view: Arc<RwLock<SessionView>>,
    bus: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    pub fn new(
        settings: ControllerSettings,
        backend: Arc<dyn MediaBackend>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (bus, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        let frame_encoder = FrameEncoder::new(settings.jpeg_quality);

        Self {
            settings,
            connector,
            capture: MediaCaptureManager::new(backend),
            transport: None,
            frame_encoder,
            uplink: None,
            playback: AudioPlaybackScheduler::new(),
            notifications: NotificationPipeline::new(),
            capture_timer: None,
            session: Session::default(),
            error_notice: None,
            transcript: String::new(),
            stats: SessionStats::default(),
            events: None,
            events_tx,
            events_rx,
            view: Arc::new(RwLock::new(SessionView::default())),
            bus,
        }
    }

    /// Geteiltes Lesemodell
    pub fn view(&self) -> Arc<RwLock<SessionView>> {
        Arc::clone(&self.view)
    }

    /// Sender des Event-Bus (für weitere Abonnenten)
    pub fn bus(&self) -> broadcast::Sender<SessionEvent> {
        self.bus.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.bus.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.session.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn notifications(&self) -> &NotificationPipeline {
        &self.notifications
    }

    pub fn error_notice(&self) -> Option<&str> {
        self.error_notice.as_deref()
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Startet eine neue Session
    ///
    /// Kehrt zurück, sobald die Geräte angefordert sind und der
    /// Verbindungsaufbau läuft. `Live` wird erst mit dem Handshake erreicht.
    pub async fn start(&mut self, config: SessionConfig) -> Result<(), SessionError> {
        if self.session.state.is_active() {
            tracing::warn!("Ignoring start while session is {}", self.session.state);
            return Err(SessionError::AlreadyActive(self.session.state));
        }

        if let Err(e) = config.validate() {
            tracing::warn!("Rejecting session config: {}", e);
            let error = SessionError::from(e);
            self.session.last_error = Some(error.clone());
            self.publish();
            return Err(error);
        }

        let id = Uuid::new_v4();
        tracing::info!(
            "Starting session {} (video: {}, audio: {})",
            id,
            config.video_enabled,
            config.audio_enabled
        );

        self.session.id = Some(id);
        self.session.video_enabled = config.video_enabled;
        self.session.audio_enabled = config.audio_enabled;
        self.session.last_error = None;
        self.error_notice = None;
        self.transcript.clear();
        self.stats = SessionStats::default();
        self.frame_encoder = FrameEncoder::new(self.settings.jpeg_quality);
        self.playback = AudioPlaybackScheduler::new();
        self.set_state(SessionState::Connecting);

        if let Err(e) = self.capture.acquire(CaptureRequest::from_config(&config)).await {
            tracing::error!("Media acquisition failed: {} ({})", e, e.detail());
            let error = SessionError::from(e);
            self.fail(error.clone(), None);
            return Err(error);
        }

        let events = EventSender::new(id, self.events_tx.clone());
        self.transport = Some(TransportChannel::connect(
            self.connector.as_ref(),
            &self.settings.endpoint,
            events.clone(),
        ));
        self.events = Some(events);

        self.publish();
        Ok(())
    }

    /// Beendet die Session (idempotent)
    ///
    /// Gibt `true` zurück, wenn eine Session beendet wurde.
    pub fn stop(&mut self) -> bool {
        if !self.session.state.is_active() {
            return false;
        }
        tracing::info!("Stopping session {:?}", self.session.id);
        self.teardown();
        true
    }

    /// Gibt alle Ressourcen in fester Reihenfolge frei
    fn teardown(&mut self) {
        self.set_state(SessionState::Stopping);

        self.capture_timer = None;
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.capture.release();
        if let Some(mut uplink) = self.uplink.take() {
            uplink.disconnect();
        }
        self.playback.close_context();
        self.playback.clear();

        self.events = None;
        self.session.id = None;
        self.set_state(SessionState::Idle);
        self.publish();
    }

    /// Fehlerpfad: Zustand `Error`, Fehler merken, dann Teardown
    fn fail(&mut self, error: SessionError, notification: Option<NotificationDraft>) {
        self.set_state(SessionState::Error);
        self.session.last_error = Some(error);
        if let Some(draft) = notification {
            self.notify(draft);
        }
        self.teardown();
    }

    fn go_live(&mut self) {
        let Some(events) = self.events.clone() else {
            return;
        };

        if let Some(transport) = self.transport.as_mut() {
            transport.mark_open();
        }
        self.set_state(SessionState::Live);

        match self.capture.backend().open_playback(DOWNLINK_SAMPLE_RATE) {
            Ok(context) => self.playback.attach(context),
            Err(e) => self.audio_setup_failed(e),
        }

        if self.session.video_enabled {
            let mut timer = tokio::time::interval(self.settings.capture_interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            self.capture_timer = Some(timer);
        }

        if self.session.audio_enabled {
            let uplink = match self.capture.audio() {
                Some(track) => AudioUplinkEncoder::connect(track, events),
                None => Err(MediaError::AudioSetup("no microphone track".to_string())),
            };
            match uplink {
                Ok(uplink) => self.uplink = Some(uplink),
                Err(e) => self.audio_setup_failed(e),
            }
        }

        tracing::info!("Session {:?} is live", self.session.id);
        self.notify(NotificationDraft::new(
            "Stream Started",
            "You are now live.",
            Severity::Success,
        ));
    }

    /// Audio-Fehler beenden die Session nicht
    fn audio_setup_failed(&mut self, error: MediaError) {
        tracing::warn!("Audio setup failed: {}", error.detail());
        self.session.last_error = Some(SessionError::from(error.clone()));
        self.notify(NotificationDraft::new(
            "Audio Setup Failed",
            error.to_string(),
            Severity::Error,
        ));
    }

    // ========================================================================
    // EVENTS
    // ========================================================================

    pub(crate) fn handle_event(&mut self, event: ControllerEvent) {
        if Some(event.session()) != self.session.id {
            tracing::debug!("Ignoring stale event for session {}", event.session());
            return;
        }

        match event {
            ControllerEvent::Link { event, .. } => self.on_link_event(event),
            ControllerEvent::AudioBlock { samples, .. } => self.on_audio_block(&samples),
            ControllerEvent::PlaybackEnded { chunk, .. } => {
                if let Some(events) = self.events.clone() {
                    self.playback.on_ended(chunk, &events);
                    self.stats.audio_chunks_played = self.playback.played();
                }
            }
        }
    }

    fn on_link_event(&mut self, event: LinkEvent) {
        let state = self.session.state;
        match (event, state) {
            (LinkEvent::Opened, SessionState::Connecting) => self.go_live(),

            (LinkEvent::Text(text), SessionState::Live) => self.on_inbound(&text),

            (LinkEvent::Closed { code }, SessionState::Connecting) => self.fail(
                TransportError::OpenFailed(format!("closed during handshake (code {:?})", code))
                    .into(),
                Some(NotificationDraft::new(
                    "Connection Failed",
                    "WebSocket connection failed.",
                    Severity::Error,
                )),
            ),

            (LinkEvent::Closed { code }, SessionState::Live) => {
                if code == Some(NORMAL_CLOSE) {
                    tracing::info!("Server closed the stream normally");
                    self.teardown();
                } else {
                    tracing::warn!("Connection lost (code {:?})", code);
                    let error = TransportError::UnexpectedClose { code };
                    let content = error.to_string();
                    self.fail(
                        error.into(),
                        Some(NotificationDraft::new(
                            "Connection Lost",
                            content,
                            Severity::Warning,
                        )),
                    );
                }
            }

            (LinkEvent::Failed(detail), SessionState::Connecting) => {
                let error = TransportError::OpenFailed(detail);
                let content = error.to_string();
                self.fail(
                    error.into(),
                    Some(NotificationDraft::new(
                        "Connection Failed",
                        content,
                        Severity::Error,
                    )),
                );
            }

            (LinkEvent::Failed(detail), SessionState::Live) => {
                let error = TransportError::Failed(detail);
                let content = error.to_string();
                self.fail(
                    error.into(),
                    Some(NotificationDraft::new(
                        "Connection Error",
                        content,
                        Severity::Error,
                    )),
                );
            }

            (event, state) => {
                tracing::debug!("Ignoring link event {:?} in state {}", event, state);
            }
        }
    }

    fn on_inbound(&mut self, text: &str) {
        let message = match TransportChannel::decode(text) {
            Ok(message) => message,
            Err(e) => {
                self.drop_inbound(e);
                return;
            }
        };

        match message {
            InboundMessage::AudioChunk(bytes) => {
                let Some(events) = self.events.clone() else {
                    return;
                };
                if let Err(e) = self.playback.enqueue(&bytes, &events) {
                    self.drop_inbound(ProtocolError::InvalidPayload {
                        kind: "audio",
                        reason: e.to_string(),
                    });
                    return;
                }
                self.stats.audio_chunks_played = self.playback.played();
                self.publish();
            }

            InboundMessage::Notification(draft) => self.notify(draft),

            InboundMessage::Error { message } => {
                tracing::warn!("Server error: {}", message);
                self.error_notice = Some(message.clone());
                let _ = self.bus.send(SessionEvent::ErrorNotice(message.clone()));
                self.notify(NotificationDraft::new("Server Error", message, Severity::Error));
            }

            InboundMessage::Text(fragment) => {
                self.transcript.push_str(&fragment);
                let _ = self
                    .bus
                    .send(SessionEvent::TranscriptUpdated(self.transcript.clone()));
                self.publish();
            }
        }
    }

    fn drop_inbound(&mut self, error: ProtocolError) {
        tracing::warn!("Dropping inbound message: {}", error);
        self.stats.messages_dropped += 1;
        self.publish();
    }

    fn on_audio_block(&mut self, samples: &[f32]) {
        if self.session.state != SessionState::Live {
            return;
        }
        let Some(uplink) = self.uplink.as_mut() else {
            return;
        };
        let message = uplink.encode(samples);
        self.send(message);
    }

    /// Capture-Tick: aktuellen Kamera-Frame senden
    pub(crate) fn on_capture_tick(&mut self) {
        if self.session.state != SessionState::Live {
            return;
        }
        let message = {
            let Some(track) = self.capture.video() else {
                return;
            };
            self.frame_encoder.capture(track)
        };
        if let Some(message) = message {
            self.send(message);
        }
    }

    fn send(&mut self, message: OutboundMessage) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        match transport.send(&message) {
            Ok(()) => match message {
                OutboundMessage::Video(_) => self.stats.video_frames_sent += 1,
                OutboundMessage::Audio(_) => self.stats.audio_blocks_sent += 1,
            },
            Err(e) => {
                tracing::warn!("Failed to send {} message: {}", message.msg_type(), e);
            }
        }
    }

    // ========================================================================
    // NOTIFICATIONS
    // ========================================================================

    fn notify(&mut self, draft: NotificationDraft) {
        let notification = self.notifications.push(draft, Instant::now());
        let _ = self.bus.send(SessionEvent::NotificationAdded(notification));
        let _ = self
            .bus
            .send(SessionEvent::OverlayUpdated(self.notifications.overlay()));
        self.publish();
    }

    /// Overlay fortschreiben, sobald seine Deadline erreicht ist
    pub(crate) fn on_overlay_tick(&mut self, now: Instant) {
        if self.notifications.advance(now) {
            let _ = self
                .bus
                .send(SessionEvent::OverlayUpdated(self.notifications.overlay()));
            self.publish();
        }
    }

    // ========================================================================
    // COMMANDS
    // ========================================================================

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start { config, reply } => {
                let result = self.start(config).await;
                let _ = reply.send(result);
            }
            Command::Stop { reply } => {
                let stopped = self.stop();
                let _ = reply.send(stopped);
            }
            Command::DismissNotification(id) => {
                if self.notifications.dismiss(id) {
                    let _ = self
                        .bus
                        .send(SessionEvent::OverlayUpdated(self.notifications.overlay()));
                    self.publish();
                }
            }
            Command::DismissOverlay => {
                if self.notifications.dismiss_overlay() {
                    let _ = self.bus.send(SessionEvent::OverlayUpdated(None));
                    self.publish();
                }
            }
            Command::SetViewerCount(count) => {
                self.session.viewer_count = count;
                self.publish();
            }
        }
    }

    /// Hauptschleife des Controller-Tasks
    ///
    /// Endet, wenn alle Handles gedroppt wurden. Eine laufende Session wird
    /// dabei regulär beendet.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        tracing::debug!("Session controller started");

        loop {
            let overlay_deadline = self.notifications.deadline();

            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event),
                _ = next_tick(&mut self.capture_timer) => self.on_capture_tick(),
                _ = wait_until(overlay_deadline) => self.on_overlay_tick(Instant::now()),
            }
        }

        self.stop();
        tracing::debug!("Session controller stopped");
    }

    // ========================================================================
    // PUBLISHING
    // ========================================================================

    fn set_state(&mut self, state: SessionState) {
        if self.session.state == state {
            return;
        }
        tracing::debug!("Session state: {} -> {}", self.session.state, state);
        self.session.state = state;
        let _ = self.bus.send(SessionEvent::StateChanged(state));
    }

    fn publish(&self) {
        let mut view = self.view.write();
        view.session = self.session.clone();
        view.notifications = self.notifications.entries();
        view.overlay = self.notifications.overlay();
        view.summary = self.notifications.summary();
        view.error_notice = self.error_notice.clone();
        view.transcript = self.transcript.clone();
        view.stats = self.stats;
    }

    /// Verarbeitet alle bereits anstehenden Events
    #[cfg(test)]
    pub(crate) fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if self.session.state.is_active() {
            self.teardown();
        }
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::pcm::pcm16_to_bytes;
    use crate::media::VideoFrame;
    use crate::session::state::ErrorKind;
    use crate::testing::{LinkProbe, MockBackend, MockConnector, Probe};
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

    struct Fixture {
        controller: SessionController,
        media: Arc<Probe>,
        link: Arc<LinkProbe>,
    }

    fn fixture() -> Fixture {
        let backend = MockBackend::new();
        let media = backend.probe();
        let connector = MockConnector::new();
        let link = connector.probe();
        let controller = SessionController::new(
            ControllerSettings::default(),
            Arc::new(backend),
            Arc::new(connector),
        );
        Fixture {
            controller,
            media,
            link,
        }
    }

    fn frame() -> VideoFrame {
        VideoFrame {
            width: 16,
            height: 16,
            rgb: vec![128; 16 * 16 * 3],
        }
    }

    async fn live(f: &mut Fixture) {
        f.controller.start(SessionConfig::default()).await.unwrap();
        f.link.emit(LinkEvent::Opened);
        f.controller.pump();
        assert_eq!(f.controller.state(), SessionState::Live);
    }

    fn assert_released_once(f: &Fixture) {
        assert_eq!(f.media.video_stops(), 1);
        assert_eq!(f.media.audio_stops(), 1);
        assert_eq!(f.media.graph_closes(), 1);
        assert_eq!(f.media.playback_closes(), 1);
        assert_eq!(f.link.link_closes(), 1);
    }

    #[tokio::test]
    async fn test_live_then_abnormal_close() {
        let mut f = fixture();
        let mut bus = f.controller.subscribe();

        f.controller.start(SessionConfig::default()).await.unwrap();
        assert_eq!(f.controller.state(), SessionState::Connecting);
        assert_eq!(f.link.connects(), 1);
        assert_eq!(f.media.acquisitions(), 1);

        f.link.emit(LinkEvent::Opened);
        f.controller.pump();
        assert_eq!(f.controller.state(), SessionState::Live);

        let entries = f.controller.notifications().entries();
        assert_eq!(entries[0].title, "Stream Started");
        assert_eq!(entries[0].severity, Severity::Success);

        f.media.set_frame(Some(frame()));
        f.controller.on_capture_tick();
        f.media.feed_samples(&vec![0.5; 4096]);
        f.controller.pump();

        let sent = f.link.sent_frames();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].contains("\"type\":\"video\""));
        assert!(sent[1].contains("\"type\":\"audio\""));
        assert_eq!(f.controller.stats().video_frames_sent, 1);
        assert_eq!(f.controller.stats().audio_blocks_sent, 1);

        f.link.emit(LinkEvent::Closed { code: Some(1006) });
        f.controller.pump();

        assert_eq!(f.controller.state(), SessionState::Idle);
        assert_eq!(f.controller.session().id, None);
        let entries = f.controller.notifications().entries();
        assert_eq!(entries[0].title, "Connection Lost");
        assert_eq!(entries[0].content, "Connection was closed unexpectedly.");
        assert_eq!(entries[0].severity, Severity::Warning);
        assert_eq!(
            f.controller.session().last_error.as_ref().map(|e| e.kind()),
            Some(ErrorKind::UnexpectedClose)
        );
        assert_released_once(&f);

        let mut states = Vec::new();
        while let Ok(event) = bus.try_recv() {
            if let SessionEvent::StateChanged(state) = event {
                states.push(state);
            }
        }
        assert_eq!(
            states,
            vec![
                SessionState::Connecting,
                SessionState::Live,
                SessionState::Error,
                SessionState::Stopping,
                SessionState::Idle,
            ]
        );
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let mut f = fixture();
        live(&mut f).await;

        assert!(f.controller.stop());
        assert!(!f.controller.stop());
        assert!(!f.controller.stop());

        assert_eq!(f.controller.state(), SessionState::Idle);
        assert_eq!(f.controller.session().last_error, None);
        assert_released_once(&f);
    }

    #[tokio::test]
    async fn test_stop_while_connecting() {
        let mut f = fixture();
        f.controller.start(SessionConfig::default()).await.unwrap();

        assert!(f.controller.stop());
        assert_eq!(f.media.video_stops(), 1);
        assert_eq!(f.link.link_closes(), 1);
        // Noch kein Audio-Graph und kein Wiedergabe-Kontext
        assert_eq!(f.media.graph_closes(), 0);
        assert_eq!(f.media.playback_opens(), 0);
    }

    #[tokio::test]
    async fn test_config_without_media_is_rejected() {
        let mut f = fixture();
        let config = SessionConfig {
            video_enabled: false,
            audio_enabled: false,
            ..SessionConfig::default()
        };

        let err = f.controller.start(config).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(f.controller.state(), SessionState::Idle);
        assert!(f.controller.session().last_error.is_some());
        assert_eq!(f.media.acquisitions(), 0);
        assert_eq!(f.link.connects(), 0);
    }

    #[tokio::test]
    async fn test_start_while_active_is_noop() {
        let mut f = fixture();
        f.controller.start(SessionConfig::default()).await.unwrap();

        let err = f.controller.start(SessionConfig::default()).await.unwrap_err();
        assert_eq!(err, SessionError::AlreadyActive(SessionState::Connecting));

        f.link.emit(LinkEvent::Opened);
        f.controller.pump();
        let err = f.controller.start(SessionConfig::default()).await.unwrap_err();
        assert_eq!(err, SessionError::AlreadyActive(SessionState::Live));

        assert_eq!(f.controller.state(), SessionState::Live);
        assert_eq!(f.controller.session().last_error, None);
        assert_eq!(f.media.acquisitions(), 1);
        assert_eq!(f.link.connects(), 1);
    }

    #[tokio::test]
    async fn test_permission_denied_ends_idle() {
        let mut f = fixture();
        f.media
            .fail_acquire(MediaError::PermissionDenied("NotAllowedError".into()));

        let err = f.controller.start(SessionConfig::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permission);
        assert_eq!(
            err.to_string(),
            "Permission denied. Please allow camera/mic access."
        );
        assert_eq!(f.controller.state(), SessionState::Idle);
        assert_eq!(f.controller.session().id, None);
        assert_eq!(f.link.connects(), 0);
        assert_eq!(
            f.controller.session().last_error.as_ref().map(|e| e.kind()),
            Some(ErrorKind::Permission)
        );
    }

    #[tokio::test]
    async fn test_connect_failure_tears_down() {
        let mut f = fixture();
        f.controller.start(SessionConfig::default()).await.unwrap();

        f.link.emit(LinkEvent::Failed("connection refused".into()));
        f.controller.pump();

        assert_eq!(f.controller.state(), SessionState::Idle);
        let entries = f.controller.notifications().entries();
        assert_eq!(entries[0].title, "Connection Failed");
        assert_eq!(entries[0].severity, Severity::Error);
        assert_eq!(
            f.controller.session().last_error.as_ref().map(|e| e.kind()),
            Some(ErrorKind::TransportOpen)
        );
        assert_eq!(f.media.video_stops(), 1);
        assert_eq!(f.media.audio_stops(), 1);
        assert_eq!(f.link.link_closes(), 1);
    }

    #[tokio::test]
    async fn test_transport_error_while_live() {
        let mut f = fixture();
        live(&mut f).await;

        f.link.emit(LinkEvent::Failed("reset by peer".into()));
        f.controller.pump();

        assert_eq!(f.controller.state(), SessionState::Idle);
        assert_eq!(
            f.controller.notifications().entries()[0].title,
            "Connection Error"
        );
        assert_eq!(
            f.controller.session().last_error.as_ref().map(|e| e.kind()),
            Some(ErrorKind::Transport)
        );
        assert_released_once(&f);
    }

    #[tokio::test]
    async fn test_normal_close_is_not_an_error() {
        let mut f = fixture();
        live(&mut f).await;

        f.link.emit(LinkEvent::Closed {
            code: Some(NORMAL_CLOSE),
        });
        f.controller.pump();

        assert_eq!(f.controller.state(), SessionState::Idle);
        assert_eq!(f.controller.session().last_error, None);
        assert_eq!(
            f.controller.notifications().entries()[0].title,
            "Stream Started"
        );
        assert_released_once(&f);
    }

    #[tokio::test]
    async fn test_audio_setup_failure_keeps_session_live() {
        let mut f = fixture();
        f.media
            .fail_audio_stream(MediaError::AudioSetup("device busy".into()));

        live(&mut f).await;

        assert!(f
            .controller
            .notifications()
            .entries()
            .iter()
            .any(|n| n.title == "Audio Setup Failed" && n.severity == Severity::Error));
        assert_eq!(
            f.controller.session().last_error.as_ref().map(|e| e.kind()),
            Some(ErrorKind::AudioSetup)
        );

        // Video läuft weiter
        f.media.set_frame(Some(frame()));
        f.controller.on_capture_tick();
        assert_eq!(f.controller.stats().video_frames_sent, 1);
    }

    #[tokio::test]
    async fn test_playback_failure_keeps_session_live() {
        let mut f = fixture();
        f.media
            .fail_playback(MediaError::AudioSetup("no output device".into()));

        live(&mut f).await;
        assert_eq!(
            f.controller.session().last_error.as_ref().map(|e| e.kind()),
            Some(ErrorKind::AudioSetup)
        );

        let chunk = BASE64.encode(pcm16_to_bytes(&[1, 2]));
        f.link
            .emit(LinkEvent::Text(format!(r#"{{"type":"audio","data":"{}"}}"#, chunk)));
        f.controller.pump();
        assert_eq!(f.controller.state(), SessionState::Live);
        assert!(f.media.played().is_empty());
    }

    #[tokio::test]
    async fn test_inbound_dispatch() {
        let mut f = fixture();
        live(&mut f).await;

        let chunk = BASE64.encode(pcm16_to_bytes(&[16384, -16384]));
        let frames = [
            r#"{"type":"notification","title":"Hi","content":"hello world","severity":"info"}"#
                .to_string(),
            format!(r#"{{"type":"audio","data":"{}"}}"#, chunk),
            r#"{"type":"text","data":"Hello "}"#.to_string(),
            r#"{"type":"text","data":"there"}"#.to_string(),
            r#"{"type":"error","error":"quota exceeded"}"#.to_string(),
            "not json".to_string(),
            r#"{"type":"mystery","data":"x"}"#.to_string(),
            r#"{"type":"audio","data":"AQID"}"#.to_string(),
        ];
        for frame in frames {
            f.link.emit(LinkEvent::Text(frame));
        }
        f.controller.pump();

        assert_eq!(f.controller.state(), SessionState::Live);
        assert_eq!(f.media.played(), vec![vec![0.5, -0.5]]);
        assert_eq!(f.controller.transcript(), "Hello there");
        assert_eq!(f.controller.error_notice(), Some("quota exceeded"));
        assert_eq!(f.controller.stats().messages_dropped, 3);

        let entries = f.controller.notifications().entries();
        assert_eq!(entries[0].title, "Server Error");
        assert_eq!(entries[0].content, "quota exceeded");
        assert_eq!(entries[1].title, "Hi");

        let view = f.controller.view();
        let view = view.read();
        assert_eq!(view.summary.as_deref(), Some("Server Error: quota exceeded"));
        assert_eq!(view.transcript, "Hello there");
    }

    #[tokio::test]
    async fn test_playback_follows_completion_signals() {
        let mut f = fixture();
        live(&mut f).await;

        for value in [8192i16, 16384] {
            let chunk = BASE64.encode(pcm16_to_bytes(&[value]));
            f.link
                .emit(LinkEvent::Text(format!(r#"{{"type":"audio","data":"{}"}}"#, chunk)));
        }
        f.controller.pump();
        assert_eq!(f.media.played(), vec![vec![0.25]]);

        assert!(f.media.finish_playback());
        f.controller.pump();
        assert_eq!(f.media.played(), vec![vec![0.25], vec![0.5]]);
        assert_eq!(f.controller.stats().audio_chunks_played, 2);
    }

    #[tokio::test]
    async fn test_stale_events_are_ignored() {
        let mut f = fixture();
        live(&mut f).await;
        let old = f.link.last_sender().unwrap();

        f.controller.stop();
        f.controller.start(SessionConfig::default()).await.unwrap();

        old.link(LinkEvent::Closed { code: Some(1006) });
        old.link(LinkEvent::Opened);
        old.playback_ended(0);
        f.controller.pump();

        assert_eq!(f.controller.state(), SessionState::Connecting);
        assert_eq!(f.controller.session().last_error, None);

        f.link.emit(LinkEvent::Opened);
        f.controller.pump();
        assert_eq!(f.controller.state(), SessionState::Live);
    }

    #[tokio::test]
    async fn test_capture_tick_without_frame_is_skipped() {
        let mut f = fixture();
        live(&mut f).await;

        f.controller.on_capture_tick();
        assert!(f.link.sent_frames().is_empty());
        assert_eq!(f.controller.stats().video_frames_sent, 0);
    }

    #[tokio::test]
    async fn test_audio_only_session_has_no_capture_timer() {
        let mut f = fixture();
        let config = SessionConfig {
            video_enabled: false,
            ..SessionConfig::default()
        };
        f.controller.start(config).await.unwrap();
        f.link.emit(LinkEvent::Opened);
        f.controller.pump();

        assert!(f.controller.capture_timer.is_none());
        assert!(f.controller.uplink.is_some());
    }

    #[tokio::test]
    async fn test_drop_tears_down() {
        let mut f = fixture();
        live(&mut f).await;
        let Fixture {
            controller,
            media,
            link,
        } = f;

        drop(controller);
        assert_eq!(media.video_stops(), 1);
        assert_eq!(media.playback_closes(), 1);
        assert_eq!(link.link_closes(), 1);
    }
}

//! Flutter-Rust bridge API for the broadcaster plugin
//!
//! The Dart side talks to two controllers:
//! - `BroadcasterController`: preview/broadcast lifecycle, capture frames in,
//!   session events out
//! - `PlayerController`: playback commands and player events, any number of
//!   players keyed by view id
//!
//! Controllers own all their state; creating two controllers yields two
//! fully independent plugin instances. The platform host claims the
//! engine/player drivers through the non-bridged `claim_*` methods and
//! drives the vendor SDKs with them.

use std::sync::Arc;

use flutter_rust_bridge::frb;
use parking_lot::Mutex;
use tracing::warn;

use super::av::{Pts, QualityPreset, SampleBuffer};
use super::capture::ZoomRange;
use super::engine::{channel_engine, EngineDriver};
use super::player::{channel_player, PlayerDriver, PlayerEvent, PlayerRegistry};
use super::session::{BroadcastConfig, BroadcastSession, SessionEvent};

/// Install the tracing subscriber. Safe to call more than once.
#[frb(sync)]
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

// ============================================================================
// BROADCASTER EVENTS
// ============================================================================

/// Session events in the shape the application layer consumes.
#[derive(Debug, Clone)]
pub enum BroadcastEvent {
    /// Connection state label: INVALID, CONNECTING, CONNECTED, DISCONNECTED, ERROR.
    State { state: String },
    /// Auto-reconnect progress, as the SDK's raw code.
    RetryState { retrystate: u32 },
    /// Periodic transmission statistics.
    Stats { quality: u32, network: u32 },
    /// Tap-to-focus landed at a normalized point.
    FocusPoint { x: f64, y: f64 },
    /// The engine refused a request mid-session.
    Fault { message: String },
}

impl From<SessionEvent> for BroadcastEvent {
    fn from(event: SessionEvent) -> Self {
        match event {
            SessionEvent::StateChanged(state) => BroadcastEvent::State {
                state: state.channel_label().to_string(),
            },
            SessionEvent::RetryStateChanged(state) => BroadcastEvent::RetryState {
                retrystate: state.code(),
            },
            SessionEvent::StatsUpdated(stats) => BroadcastEvent::Stats {
                quality: stats.broadcast_quality.code(),
                network: stats.network_health.code(),
            },
            SessionEvent::FocusPoint { x, y } => BroadcastEvent::FocusPoint { x, y },
            SessionEvent::EngineFault { message } => BroadcastEvent::Fault { message },
        }
    }
}

// ============================================================================
// BROADCASTER CONTROLLER
// ============================================================================

struct BroadcasterInner {
    session: Option<BroadcastSession>,
    /// Parked until the platform host claims it.
    driver: Option<EngineDriver>,
}

/// One broadcaster view's worth of plugin state.
pub struct BroadcasterController {
    inner: Arc<Mutex<BroadcasterInner>>,
    events: Arc<Mutex<Vec<BroadcastEvent>>>,
}

impl BroadcasterController {
    #[frb(sync)]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BroadcasterInner {
                session: None,
                driver: None,
            })),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Open a session: wires the engine, starts capture-state tracking and
    /// event collection. Replaces any previous session.
    pub async fn start_preview(
        &self,
        url: String,
        stream_key: String,
        quality: String,
        auto_reconnect: bool,
    ) -> Result<(), String> {
        let (engine, driver, engine_events) = channel_engine();
        let config = BroadcastConfig {
            ingest_endpoint: url,
            stream_key,
            preset: QualityPreset::from_channel_arg(&quality),
            auto_reconnect,
        };
        let mut session = BroadcastSession::new(config, Box::new(engine), engine_events);
        let mut event_rx = session.take_event_rx().expect("fresh session");

        let events = self.events.clone();
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                events.lock().push(event.into());
            }
        });

        let mut inner = self.inner.lock();
        if let Some(mut old) = inner.session.take() {
            warn!("replacing an active broadcast session");
            old.stop();
        }
        inner.session = Some(session);
        inner.driver = Some(driver);
        Ok(())
    }

    /// Hand the engine driver to the platform host. Not bridged to Dart.
    #[frb(ignore)]
    pub fn claim_engine_driver(&self) -> Option<EngineDriver> {
        self.inner.lock().driver.take()
    }

    #[frb(sync)]
    pub fn start_broadcast(&self) -> Result<(), String> {
        let mut inner = self.inner.lock();
        let session = inner.session.as_mut().ok_or("no active session")?;
        session.start_broadcast().map_err(|e| e.to_string())
    }

    #[frb(sync)]
    pub fn stop_broadcast(&self) -> Result<(), String> {
        let mut inner = self.inner.lock();
        match inner.session.take() {
            Some(mut session) => {
                session.stop();
                Ok(())
            }
            None => Err("no active session".to_string()),
        }
    }

    /// Video capture callback from the platform.
    #[frb(sync)]
    pub fn submit_video_frame(&self, data: Vec<u8>, pts_value: i64, pts_timescale: u32) {
        let mut inner = self.inner.lock();
        if let Some(session) = inner.session.as_mut() {
            session.submit_video_sample(SampleBuffer::video(
                Pts::new(pts_value, pts_timescale),
                data,
            ));
        }
    }

    /// Audio capture callback from the platform.
    #[frb(sync)]
    pub fn submit_audio_frame(&self, data: Vec<u8>, pts_value: i64, pts_timescale: u32) {
        let mut inner = self.inner.lock();
        if let Some(session) = inner.session.as_mut() {
            session.submit_audio_sample(SampleBuffer::audio(
                Pts::new(pts_value, pts_timescale),
                data,
            ));
        }
    }

    #[frb(sync)]
    pub fn mute(&self) {
        let mut inner = self.inner.lock();
        if let Some(session) = inner.session.as_mut() {
            let muted = !session.is_muted();
            session.set_muted(muted);
        }
    }

    #[frb(sync)]
    pub fn is_muted(&self) -> bool {
        self.inner
            .lock()
            .session
            .as_ref()
            .map(|s| s.is_muted())
            .unwrap_or(false)
    }

    /// Switch between front ("0") and back ("1") cameras.
    #[frb(sync)]
    pub fn change_camera(&self, camera_type: String) -> Result<(), String> {
        let mut inner = self.inner.lock();
        let session = inner.session.as_mut().ok_or("no active session")?;
        session
            .capture_mut()
            .set_position(&camera_type)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    /// Select a lens by its channel code; answers with the strings the
    /// method channel expects.
    #[frb(sync)]
    pub fn update_camera_lens(&self, lens: String) -> String {
        let mut inner = self.inner.lock();
        let Some(session) = inner.session.as_mut() else {
            return "Session Not Running".to_string();
        };
        match session.capture_mut().set_lens(&lens) {
            Ok(_) => "Configuration Updated".to_string(),
            Err(err) => err.to_string(),
        }
    }

    #[frb(sync)]
    pub fn get_available_camera_lens(&self) -> Vec<u32> {
        self.inner
            .lock()
            .session
            .as_ref()
            .map(|s| s.capture().available_lens_codes())
            .unwrap_or_default()
    }

    /// Apply a zoom request; returns the clamped factor actually applied.
    #[frb(sync)]
    pub fn zoom_camera(&self, zoom: f64) -> f64 {
        let mut inner = self.inner.lock();
        match inner.session.as_mut() {
            Some(session) => session.capture_mut().set_zoom_factor(zoom),
            None => 1.0,
        }
    }

    #[frb(sync)]
    pub fn get_camera_zoom_factor(&self) -> ZoomRange {
        self.inner
            .lock()
            .session
            .as_ref()
            .map(|s| s.capture().zoom_range())
            .unwrap_or_default()
    }

    /// Set focus mode by channel code; true when the mode was accepted.
    #[frb(sync)]
    pub fn set_focus_mode(&self, mode: String) -> bool {
        let mut inner = self.inner.lock();
        match inner.session.as_mut() {
            Some(session) => session.capture_mut().set_focus_mode(&mode).is_ok(),
            None => false,
        }
    }

    /// Tap-to-focus at a point normalized to the preview bounds.
    #[frb(sync)]
    pub fn set_focus_point(&self, x: f64, y: f64) -> Result<(), String> {
        let mut inner = self.inner.lock();
        let session = inner.session.as_mut().ok_or("no active session")?;
        let (x, y) = session
            .capture_mut()
            .set_focus_point(x, y)
            .map_err(|e| e.to_string())?;
        session.report_focus_point(x, y);
        Ok(())
    }

    #[frb(sync)]
    pub fn send_time_metadata(&self, metadata: String) -> Result<(), String> {
        let mut inner = self.inner.lock();
        let session = inner.session.as_mut().ok_or("no active session")?;
        session
            .send_timed_metadata(&metadata)
            .map_err(|e| e.to_string())
    }

    /// Drain collected session events, oldest first.
    #[frb(sync)]
    pub fn poll_events(&self) -> Vec<BroadcastEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Tear everything down. The view is going away.
    #[frb(sync)]
    pub fn dispose(&self) {
        let mut inner = self.inner.lock();
        if let Some(mut session) = inner.session.take() {
            session.stop();
        }
        inner.driver = None;
    }
}

impl Default for BroadcasterController {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// PLAYER EVENTS
// ============================================================================

/// A player event tagged with the view id it belongs to.
#[derive(Debug, Clone)]
pub struct TaggedPlayerEvent {
    pub player_id: String,
    pub event: PlayerEvent,
}

// ============================================================================
// PLAYER CONTROLLER
// ============================================================================

/// Playback side of the plugin: one controller, any number of players.
pub struct PlayerController {
    registry: Arc<Mutex<PlayerRegistry>>,
    drivers: Arc<Mutex<Vec<(String, PlayerDriver)>>>,
    events: Arc<Mutex<Vec<TaggedPlayerEvent>>>,
}

impl PlayerController {
    #[frb(sync)]
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(PlayerRegistry::new())),
            drivers: Arc::new(Mutex::new(Vec::new())),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a player for a platform view and start collecting its events.
    pub async fn create_player(&self, player_id: String) -> Result<(), String> {
        let (session, driver, mut event_rx) = channel_player();

        {
            let mut registry = self.registry.lock();
            if registry.get_mut(&player_id).is_some() {
                return Err(format!("player {player_id} already exists"));
            }
            registry.insert(player_id.clone(), session);
        }
        self.drivers.lock().push((player_id.clone(), driver));

        let registry = self.registry.clone();
        let events = self.events.clone();
        let id = player_id;
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                if let Some(session) = registry.lock().get_mut(&id) {
                    session.apply_event(&event);
                }
                events.lock().push(TaggedPlayerEvent {
                    player_id: id.clone(),
                    event,
                });
            }
        });
        Ok(())
    }

    /// Hand a player driver to the platform host. Not bridged to Dart.
    #[frb(ignore)]
    pub fn claim_player_driver(&self, player_id: &str) -> Option<PlayerDriver> {
        let mut drivers = self.drivers.lock();
        let index = drivers.iter().position(|(id, _)| id == player_id)?;
        Some(drivers.remove(index).1)
    }

    #[frb(sync)]
    pub fn start_player(&self, player_id: String, url: String, auto_play: bool) -> Result<(), String> {
        self.with_player(&player_id, |p| p.load(&url, auto_play).map_err(|e| e.to_string()))
    }

    #[frb(sync)]
    pub fn stop_player(&self, player_id: String) -> Result<(), String> {
        self.registry
            .lock()
            .remove(&player_id)
            .map(|_| ())
            .ok_or_else(|| format!("no player {player_id}"))
    }

    #[frb(sync)]
    pub fn mute(&self, player_id: String) -> Result<(), String> {
        self.with_player(&player_id, |p| p.toggle_mute().map_err(|e| e.to_string()))
    }

    #[frb(sync)]
    pub fn pause(&self, player_id: String) -> Result<(), String> {
        self.with_player(&player_id, |p| p.pause().map_err(|e| e.to_string()))
    }

    #[frb(sync)]
    pub fn resume(&self, player_id: String) -> Result<(), String> {
        self.with_player(&player_id, |p| p.play().map_err(|e| e.to_string()))
    }

    /// Seek to a position; the method channel sends seconds as a string.
    #[frb(sync)]
    pub fn seek(&self, player_id: String, time: String) -> Result<(), String> {
        let seconds: f64 = time.parse().map_err(|_| format!("bad seek time: {time}"))?;
        self.with_player(&player_id, |p| p.seek(seconds).map_err(|e| e.to_string()))
    }

    #[frb(sync)]
    pub fn position(&self, player_id: String) -> f64 {
        self.registry
            .lock()
            .get_mut(&player_id)
            .map(|p| p.position())
            .unwrap_or(0.0)
    }

    #[frb(sync)]
    pub fn qualities(&self, player_id: String) -> Vec<String> {
        self.registry
            .lock()
            .get_mut(&player_id)
            .map(|p| p.qualities().to_vec())
            .unwrap_or_default()
    }

    #[frb(sync)]
    pub fn set_quality(&self, player_id: String, quality: String) -> Result<(), String> {
        self.with_player(&player_id, |p| p.set_quality(&quality).map_err(|e| e.to_string()))
    }

    #[frb(sync)]
    pub fn toggle_auto_quality(&self, player_id: String) -> Result<(), String> {
        self.with_player(&player_id, |p| {
            p.toggle_auto_quality().map_err(|e| e.to_string())
        })
    }

    #[frb(sync)]
    pub fn is_auto(&self, player_id: String) -> bool {
        self.registry
            .lock()
            .get_mut(&player_id)
            .map(|p| p.is_auto_quality())
            .unwrap_or(false)
    }

    /// Drain collected player events, oldest first.
    #[frb(sync)]
    pub fn poll_events(&self) -> Vec<TaggedPlayerEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    fn with_player<T>(
        &self,
        player_id: &str,
        f: impl FnOnce(&mut super::player::PlayerSession) -> Result<T, String>,
    ) -> Result<T, String> {
        let mut registry = self.registry.lock();
        let session = registry
            .get_mut(player_id)
            .ok_or_else(|| format!("no player {player_id}"))?;
        f(session)
    }
}

impl Default for PlayerController {
    fn default() -> Self {
        Self::new()
    }
}

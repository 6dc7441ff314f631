//! Playback relay
//!
//! Playback is handled entirely by the opaque vendor player on the platform
//! side. This module provides:
//! - A command channel to the platform player driver
//! - The player's notification vocabulary as typed events
//! - `PlayerSession`, caching the state the method channel queries
//! - `PlayerRegistry`, an explicit map of live players per plugin instance

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

// ============================================================================
// PLAYER VOCABULARY
// ============================================================================

/// Player state machine, with the SDK's raw codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerState {
    Idle,
    Ready,
    Buffering,
    Playing,
    Ended,
}

impl PlayerState {
    pub fn code(&self) -> u32 {
        *self as u32
    }
}

/// Everything the application asks of the player, as data for the platform
/// driver to drain.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    Load { url: String, auto_play: bool },
    Play,
    Pause,
    SetVolume(f64),
    Seek(f64),
    SetQuality(String),
    SetAutoQuality(bool),
    Release,
}

/// Notifications from the platform player driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PlayerEvent {
    StateChanged(PlayerState),
    DurationChanged(f64),
    SyncTimeChanged(f64),
    QualityChanged(Option<String>),
    /// The renditions the stream offers, known once the player is ready.
    QualitiesChanged(Vec<String>),
    SeekedTo(f64),
    Error(String),
}

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("player is gone")]
    Detached,
    #[error("unknown quality: {0}")]
    UnknownQuality(String),
}

// ============================================================================
// PLAYER SESSION
// ============================================================================

/// The far side of a `PlayerSession`: owned by the platform glue that holds
/// the real player. It drains commands and injects player callbacks as
/// events.
pub struct PlayerDriver {
    pub commands: mpsc::UnboundedReceiver<PlayerCommand>,
    pub events: mpsc::UnboundedSender<PlayerEvent>,
}

/// One live player instance.
///
/// Relays commands over the channel and caches what the synchronous method
/// channel queries (position, qualities, auto-quality, mute) from the event
/// stream.
pub struct PlayerSession {
    cmd_tx: mpsc::UnboundedSender<PlayerCommand>,
    state: PlayerState,
    duration: f64,
    position: f64,
    qualities: Vec<String>,
    auto_quality: bool,
    volume: f64,
}

/// Build a player session along with its driver and event stream.
///
/// The event receiver goes to whoever surfaces events to the application;
/// each received event must also be applied to the session via
/// [`PlayerSession::apply_event`] to keep the cache current.
pub fn channel_player() -> (
    PlayerSession,
    PlayerDriver,
    mpsc::UnboundedReceiver<PlayerEvent>,
) {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let session = PlayerSession {
        cmd_tx,
        state: PlayerState::Idle,
        duration: 0.0,
        position: 0.0,
        qualities: Vec::new(),
        auto_quality: true,
        volume: 1.0,
    };
    let driver = PlayerDriver {
        commands: cmd_rx,
        events: event_tx,
    };
    (session, driver, event_rx)
}

impl PlayerSession {
    fn send(&self, command: PlayerCommand) -> Result<(), PlayerError> {
        self.cmd_tx.send(command).map_err(|_| PlayerError::Detached)
    }

    pub fn load(&self, url: &str, auto_play: bool) -> Result<(), PlayerError> {
        debug!(url, auto_play, "loading stream");
        self.send(PlayerCommand::Load {
            url: url.to_string(),
            auto_play,
        })
    }

    pub fn play(&self) -> Result<(), PlayerError> {
        self.send(PlayerCommand::Play)
    }

    pub fn pause(&self) -> Result<(), PlayerError> {
        self.send(PlayerCommand::Pause)
    }

    /// Toggle mute by flipping the volume between 0 and 1.
    pub fn toggle_mute(&mut self) -> Result<(), PlayerError> {
        self.volume = if self.volume == 0.0 { 1.0 } else { 0.0 };
        self.send(PlayerCommand::SetVolume(self.volume))
    }

    pub fn is_muted(&self) -> bool {
        self.volume == 0.0
    }

    pub fn seek(&self, seconds: f64) -> Result<(), PlayerError> {
        self.send(PlayerCommand::Seek(seconds))
    }

    /// Current playhead position in seconds, from the last sync-time report.
    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    /// Rendition names the stream offers.
    pub fn qualities(&self) -> &[String] {
        &self.qualities
    }

    /// Pin a rendition by name. Unknown names are refused rather than
    /// forwarded blind.
    pub fn set_quality(&self, name: &str) -> Result<(), PlayerError> {
        if !self.qualities.iter().any(|q| q == name) {
            warn!(name, "quality not offered by the stream");
            return Err(PlayerError::UnknownQuality(name.to_string()));
        }
        self.send(PlayerCommand::SetQuality(name.to_string()))
    }

    pub fn toggle_auto_quality(&mut self) -> Result<(), PlayerError> {
        self.auto_quality = !self.auto_quality;
        self.send(PlayerCommand::SetAutoQuality(self.auto_quality))
    }

    pub fn is_auto_quality(&self) -> bool {
        self.auto_quality
    }

    pub fn release(&self) -> Result<(), PlayerError> {
        self.send(PlayerCommand::Release)
    }

    /// Fold a driver event into the cached state. The caller forwards the
    /// event to the application afterwards.
    pub fn apply_event(&mut self, event: &PlayerEvent) {
        match event {
            PlayerEvent::StateChanged(state) => self.state = *state,
            PlayerEvent::DurationChanged(duration) => self.duration = *duration,
            PlayerEvent::SyncTimeChanged(position) => self.position = *position,
            PlayerEvent::SeekedTo(position) => self.position = *position,
            PlayerEvent::QualitiesChanged(qualities) => self.qualities = qualities.clone(),
            PlayerEvent::QualityChanged(_) | PlayerEvent::Error(_) => {}
        }
    }
}

// ============================================================================
// PLAYER REGISTRY
// ============================================================================

/// Live players keyed by the view id the application assigned.
///
/// Owned by the plugin instance and passed by reference; replaces the
/// process-wide player dictionaries with per-instance state.
#[derive(Default)]
pub struct PlayerRegistry {
    players: HashMap<String, PlayerSession>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, session: PlayerSession) {
        self.players.insert(id.into(), session);
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut PlayerSession> {
        self.players.get_mut(id)
    }

    /// Release and forget a player.
    pub fn remove(&mut self, id: &str) -> Option<PlayerSession> {
        let session = self.players.remove(id);
        if let Some(session) = &session {
            let _ = session.release();
        }
        session
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_relay_in_order() {
        let (session, mut driver, _events) = channel_player();
        session.load("https://playback.example/m3u8", true).unwrap();
        session.pause().unwrap();
        session.seek(42.0).unwrap();

        assert_eq!(
            driver.commands.try_recv().unwrap(),
            PlayerCommand::Load {
                url: "https://playback.example/m3u8".to_string(),
                auto_play: true
            }
        );
        assert_eq!(driver.commands.try_recv().unwrap(), PlayerCommand::Pause);
        assert_eq!(driver.commands.try_recv().unwrap(), PlayerCommand::Seek(42.0));
    }

    #[test]
    fn mute_toggles_volume_between_zero_and_one() {
        let (mut session, mut driver, _events) = channel_player();
        assert!(!session.is_muted());

        session.toggle_mute().unwrap();
        assert!(session.is_muted());
        assert_eq!(driver.commands.try_recv().unwrap(), PlayerCommand::SetVolume(0.0));

        session.toggle_mute().unwrap();
        assert!(!session.is_muted());
        assert_eq!(driver.commands.try_recv().unwrap(), PlayerCommand::SetVolume(1.0));
    }

    #[test]
    fn quality_selection_is_validated_against_the_stream() {
        let (mut session, mut driver, _events) = channel_player();
        assert!(matches!(
            session.set_quality("720p"),
            Err(PlayerError::UnknownQuality(_))
        ));

        session.apply_event(&PlayerEvent::QualitiesChanged(vec![
            "1080p".to_string(),
            "720p".to_string(),
        ]));
        session.set_quality("720p").unwrap();
        assert_eq!(
            driver.commands.try_recv().unwrap(),
            PlayerCommand::SetQuality("720p".to_string())
        );
    }

    #[test]
    fn events_update_the_cached_state() {
        let (mut session, _driver, _events) = channel_player();

        session.apply_event(&PlayerEvent::StateChanged(PlayerState::Playing));
        session.apply_event(&PlayerEvent::DurationChanged(300.0));
        session.apply_event(&PlayerEvent::SyncTimeChanged(12.5));

        assert_eq!(session.state(), PlayerState::Playing);
        assert_eq!(session.duration(), 300.0);
        assert_eq!(session.position(), 12.5);

        session.apply_event(&PlayerEvent::SeekedTo(60.0));
        assert_eq!(session.position(), 60.0);
    }

    #[test]
    fn auto_quality_toggles() {
        let (mut session, mut driver, _events) = channel_player();
        assert!(session.is_auto_quality());
        session.toggle_auto_quality().unwrap();
        assert!(!session.is_auto_quality());
        assert_eq!(
            driver.commands.try_recv().unwrap(),
            PlayerCommand::SetAutoQuality(false)
        );
    }

    #[test]
    fn registry_keeps_players_independent() {
        let mut registry = PlayerRegistry::new();
        let (first, _d1, _e1) = channel_player();
        let (second, _d2, _e2) = channel_player();
        registry.insert("player-1", first);
        registry.insert("player-2", second);

        registry
            .get_mut("player-1")
            .unwrap()
            .apply_event(&PlayerEvent::StateChanged(PlayerState::Playing));

        assert_eq!(
            registry.get_mut("player-1").unwrap().state(),
            PlayerState::Playing
        );
        assert_eq!(registry.get_mut("player-2").unwrap().state(), PlayerState::Idle);

        assert!(registry.remove("player-1").is_some());
        assert_eq!(registry.len(), 1);
        assert!(registry.get_mut("player-1").is_none());
    }

    #[test]
    fn released_driver_detaches_the_session() {
        let (session, driver, _events) = channel_player();
        drop(driver);
        assert!(matches!(session.play(), Err(PlayerError::Detached)));
    }
}

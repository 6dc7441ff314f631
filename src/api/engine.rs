//! Broadcast engine seam
//!
//! The vendor broadcast SDK (encoder + RTMP transmission) lives on the
//! platform side and is opaque to this crate. This module provides:
//! - The `BroadcastEngine` trait the session drives
//! - Engine-side notifications (connection state, retry state, statistics)
//! - `ChannelEngine`, the command-forwarding implementation the bridge layer
//!   hands to a session; whoever owns the real SDK drains its commands

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use super::av::SampleBuffer;

// ============================================================================
// ENGINE NOTIFICATIONS
// ============================================================================

/// Connection state of the outbound broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Invalid,
    Connecting,
    Connected,
    Disconnected,
    Error,
}

impl ConnectionState {
    /// Label used on the event channel, as the application layer expects it.
    pub fn channel_label(&self) -> &'static str {
        match self {
            Self::Invalid => "INVALID",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
            Self::Disconnected => "DISCONNECTED",
            Self::Error => "ERROR",
        }
    }
}

/// Auto-reconnect progress, mirroring the SDK's retry state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryState {
    NotRetrying,
    WaitingForInternet,
    WaitingForBackoffTimer,
    Retrying,
    Success,
    Failure,
}

impl RetryState {
    /// The SDK's raw code, relayed as-is on the event channel.
    pub fn code(&self) -> u32 {
        match self {
            Self::NotRetrying => 0,
            Self::WaitingForInternet => 1,
            Self::WaitingForBackoffTimer => 2,
            Self::Retrying => 3,
            Self::Success => 4,
            Self::Failure => 5,
        }
    }
}

/// Broadcast quality relative to the configured bitrate bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BroadcastQuality {
    NearMaximum,
    High,
    Medium,
    Low,
    NearMinimum,
}

impl BroadcastQuality {
    pub fn code(&self) -> u32 {
        *self as u32
    }
}

/// Health of the network carrying the broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkHealth {
    Excellent,
    High,
    Medium,
    Low,
    Bad,
}

impl NetworkHealth {
    pub fn code(&self) -> u32 {
        *self as u32
    }
}

/// Periodic transmission statistics, reported roughly twice a second while
/// broadcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransmissionStats {
    pub broadcast_quality: BroadcastQuality,
    pub network_health: NetworkHealth,
}

/// Notifications produced by the engine side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    StateChanged(ConnectionState),
    RetryStateChanged(RetryState),
    StatsUpdated(TransmissionStats),
    Error { message: String },
}

// ============================================================================
// ENGINE TRAIT
// ============================================================================

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("broadcast has not been started")]
    NotStarted,
    #[error("engine is gone")]
    Closed,
    #[error("engine rejected the request: {0}")]
    Rejected(String),
}

/// The opaque vendor broadcast engine.
///
/// `push_video`/`push_audio` are the custom image/audio source sinks; the
/// session forwards synchronized samples to them in arrival order per kind.
pub trait BroadcastEngine: Send + 'static {
    fn start(&mut self, endpoint: &str, stream_key: &str) -> Result<(), EngineError>;
    fn stop(&mut self) -> Result<(), EngineError>;
    fn push_video(&mut self, sample: SampleBuffer) -> Result<(), EngineError>;
    fn push_audio(&mut self, sample: SampleBuffer) -> Result<(), EngineError>;
    fn set_muted(&mut self, muted: bool) -> Result<(), EngineError>;
    fn send_timed_metadata(&mut self, metadata: &str) -> Result<(), EngineError>;
}

// ============================================================================
// CHANNEL ENGINE
// ============================================================================

/// Everything the session asks of the engine, as data.
#[derive(Debug)]
pub enum EngineCommand {
    Start { endpoint: String, stream_key: String },
    Stop,
    Video(SampleBuffer),
    Audio(SampleBuffer),
    SetMuted(bool),
    TimedMetadata(String),
}

/// The far side of a `ChannelEngine`: owned by whatever drives the real SDK.
/// It drains commands and injects the SDK's callbacks as events.
pub struct EngineDriver {
    pub commands: mpsc::UnboundedReceiver<EngineCommand>,
    pub events: mpsc::UnboundedSender<EngineEvent>,
}

/// A `BroadcastEngine` that forwards every call over a channel.
///
/// This is what the bridge layer hands to a session: the platform glue that
/// owns the actual SDK drains the commands from the driver end.
pub struct ChannelEngine {
    tx: mpsc::UnboundedSender<EngineCommand>,
    started: bool,
}

/// Build a channel engine along with its driver and event stream.
///
/// The returned event receiver is handed to the session, which pumps it into
/// its own event stream.
pub fn channel_engine() -> (
    ChannelEngine,
    EngineDriver,
    mpsc::UnboundedReceiver<EngineEvent>,
) {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let engine = ChannelEngine {
        tx: cmd_tx,
        started: false,
    };
    let driver = EngineDriver {
        commands: cmd_rx,
        events: event_tx,
    };
    (engine, driver, event_rx)
}

impl ChannelEngine {
    fn send(&self, command: EngineCommand) -> Result<(), EngineError> {
        self.tx.send(command).map_err(|_| EngineError::Closed)
    }
}

impl BroadcastEngine for ChannelEngine {
    fn start(&mut self, endpoint: &str, stream_key: &str) -> Result<(), EngineError> {
        debug!(endpoint, "starting broadcast engine");
        self.send(EngineCommand::Start {
            endpoint: endpoint.to_string(),
            stream_key: stream_key.to_string(),
        })?;
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        self.started = false;
        self.send(EngineCommand::Stop)
    }

    fn push_video(&mut self, sample: SampleBuffer) -> Result<(), EngineError> {
        self.send(EngineCommand::Video(sample))
    }

    fn push_audio(&mut self, sample: SampleBuffer) -> Result<(), EngineError> {
        self.send(EngineCommand::Audio(sample))
    }

    fn set_muted(&mut self, muted: bool) -> Result<(), EngineError> {
        self.send(EngineCommand::SetMuted(muted))
    }

    fn send_timed_metadata(&mut self, metadata: &str) -> Result<(), EngineError> {
        // Timed metadata only makes sense mid-broadcast; the SDK throws
        // outside of one.
        if !self.started {
            return Err(EngineError::NotStarted);
        }
        self.send(EngineCommand::TimedMetadata(metadata.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::av::{Pts, SampleBuffer};

    #[test]
    fn commands_arrive_in_call_order() {
        let (mut engine, mut driver, _events) = channel_engine();
        engine.start("rtmps://ingest.example", "key").unwrap();
        engine
            .push_video(SampleBuffer::video(Pts::from_seconds(0.1), vec![1u8; 4]))
            .unwrap();
        engine
            .push_audio(SampleBuffer::audio(Pts::from_seconds(0.1), vec![2u8; 4]))
            .unwrap();
        engine.stop().unwrap();

        assert!(matches!(
            driver.commands.try_recv().unwrap(),
            EngineCommand::Start { .. }
        ));
        assert!(matches!(
            driver.commands.try_recv().unwrap(),
            EngineCommand::Video(_)
        ));
        assert!(matches!(
            driver.commands.try_recv().unwrap(),
            EngineCommand::Audio(_)
        ));
        assert!(matches!(driver.commands.try_recv().unwrap(), EngineCommand::Stop));
    }

    #[test]
    fn timed_metadata_requires_a_running_broadcast() {
        let (mut engine, _driver, _events) = channel_engine();
        assert!(matches!(
            engine.send_timed_metadata("cue"),
            Err(EngineError::NotStarted)
        ));

        engine.start("rtmps://ingest.example", "key").unwrap();
        assert!(engine.send_timed_metadata("cue").is_ok());

        engine.stop().unwrap();
        assert!(matches!(
            engine.send_timed_metadata("cue"),
            Err(EngineError::NotStarted)
        ));
    }

    #[test]
    fn dropped_driver_surfaces_as_closed() {
        let (mut engine, driver, _events) = channel_engine();
        drop(driver);
        assert!(matches!(
            engine.push_video(SampleBuffer::video(Pts::ZERO, vec![1u8; 4])),
            Err(EngineError::Closed)
        ));
    }

    #[test]
    fn state_labels_match_the_event_channel() {
        assert_eq!(ConnectionState::Connected.channel_label(), "CONNECTED");
        assert_eq!(ConnectionState::Error.channel_label(), "ERROR");
        assert_eq!(RetryState::Failure.code(), 5);
        assert_eq!(BroadcastQuality::NearMinimum.code(), 4);
        assert_eq!(NetworkHealth::Excellent.code(), 0);
    }
}

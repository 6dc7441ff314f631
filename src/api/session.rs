//! Broadcast session lifecycle and sample routing
//!
//! One `BroadcastSession` per preview/broadcast, created when the
//! application starts a preview and destroyed when it stops. The session
//! owns the whole pipeline state for its lifetime:
//! - the timestamp synchronizer pairing the two capture streams
//! - the engine handle the paired samples are forwarded to
//! - the capture state the method channel manipulates
//! - the event stream surfaced to the application layer
//!
//! Nothing here is process-global; concurrent sessions would simply be
//! independent instances.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::av::{QualityPreset, SampleBuffer};
use super::capture::CaptureState;
use super::engine::{BroadcastEngine, ConnectionState, EngineError, EngineEvent, RetryState, TransmissionStats};
use super::sync::SampleSynchronizer;

// ============================================================================
// CONFIGURATION & EVENTS
// ============================================================================

/// Everything the application supplies when opening a session.
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    pub ingest_endpoint: String,
    pub stream_key: String,
    pub preset: QualityPreset,
    pub auto_reconnect: bool,
}

/// Events surfaced to the application layer over the session's stream.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(ConnectionState),
    RetryStateChanged(RetryState),
    StatsUpdated(TransmissionStats),
    FocusPoint { x: f64, y: f64 },
    EngineFault { message: String },
}

// ============================================================================
// BROADCAST SESSION
// ============================================================================

pub struct BroadcastSession {
    config: BroadcastConfig,
    synchronizer: SampleSynchronizer,
    engine: Box<dyn BroadcastEngine>,
    capture: CaptureState,
    muted: bool,
    broadcasting: bool,
    active: bool,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
    event_rx: Option<mpsc::UnboundedReceiver<SessionEvent>>,
    pump: Option<JoinHandle<()>>,
}

impl BroadcastSession {
    /// Open a session over the given engine.
    ///
    /// `engine_events` is the notification stream belonging to the engine;
    /// it is pumped into this session's own event stream, so it must be
    /// called from within a tokio runtime.
    pub fn new(
        config: BroadcastConfig,
        engine: Box<dyn BroadcastEngine>,
        engine_events: mpsc::UnboundedReceiver<EngineEvent>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let pump = tokio::spawn(pump_engine_events(engine_events, event_tx.clone()));

        info!(
            endpoint = %config.ingest_endpoint,
            preset = %config.preset,
            auto_reconnect = config.auto_reconnect,
            "broadcast session opened"
        );

        Self {
            config,
            synchronizer: SampleSynchronizer::new(),
            engine,
            capture: CaptureState::new(),
            muted: false,
            broadcasting: false,
            active: true,
            event_tx,
            event_rx: Some(event_rx),
            pump: Some(pump),
        }
    }

    /// Take the session's event stream. Can only be taken once; the stream
    /// ends when the session is torn down.
    pub fn take_event_rx(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.event_rx.take()
    }

    pub fn config(&self) -> &BroadcastConfig {
        &self.config
    }

    pub fn capture(&self) -> &CaptureState {
        &self.capture
    }

    pub fn capture_mut(&mut self) -> &mut CaptureState {
        &mut self.capture
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_broadcasting(&self) -> bool {
        self.broadcasting
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Video capture callback entry point.
    pub fn submit_video_sample(&mut self, sample: SampleBuffer) {
        if !self.active {
            debug!("video sample after teardown, dropping");
            return;
        }
        if let Some(pair) = self.synchronizer.submit_video(sample) {
            self.forward_pair(pair);
        }
    }

    /// Audio capture callback entry point.
    pub fn submit_audio_sample(&mut self, sample: SampleBuffer) {
        if !self.active {
            debug!("audio sample after teardown, dropping");
            return;
        }
        if let Some(pair) = self.synchronizer.submit_audio(sample) {
            self.forward_pair(pair);
        }
    }

    fn forward_pair(&mut self, pair: super::sync::SyncedPair) {
        if let Err(err) = self.engine.push_video(pair.video) {
            self.report_engine_fault("video sink", err);
            return;
        }
        if let Err(err) = self.engine.push_audio(pair.audio) {
            self.report_engine_fault("audio sink", err);
        }
    }

    fn report_engine_fault(&self, sink: &str, err: EngineError) {
        warn!(sink, %err, "engine rejected sample");
        let _ = self.event_tx.send(SessionEvent::EngineFault {
            message: err.to_string(),
        });
    }

    /// Begin transmitting to the configured ingest endpoint.
    pub fn start_broadcast(&mut self) -> Result<(), EngineError> {
        self.engine
            .start(&self.config.ingest_endpoint, &self.config.stream_key)?;
        self.broadcasting = true;
        Ok(())
    }

    /// Stop transmitting and tear the session down.
    ///
    /// Both pending queues are dropped synchronously: no sample submitted
    /// after this call reaches the engine.
    pub fn stop(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.broadcasting = false;
        self.synchronizer.clear();
        if let Err(err) = self.engine.stop() {
            warn!(%err, "engine stop failed");
        }
        let _ = self
            .event_tx
            .send(SessionEvent::StateChanged(ConnectionState::Disconnected));
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        info!("broadcast session closed");
    }

    /// Mute or unmute the outgoing audio. The engine applies the gain; the
    /// sample flow (and synchronization) is unaffected.
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        if let Err(err) = self.engine.set_muted(muted) {
            warn!(%err, "mute request failed");
        }
    }

    /// Embed timed metadata in the outgoing stream.
    pub fn send_timed_metadata(&mut self, metadata: &str) -> Result<(), EngineError> {
        self.engine.send_timed_metadata(metadata)
    }

    /// Report a successful tap-to-focus so the application layer can show
    /// its indicator.
    pub fn report_focus_point(&self, x: f64, y: f64) {
        let _ = self.event_tx.send(SessionEvent::FocusPoint { x, y });
    }

    /// Synchronizer queue depths, for diagnostics.
    pub fn pending_samples(&self) -> (usize, usize) {
        (
            self.synchronizer.video_pending(),
            self.synchronizer.audio_pending(),
        )
    }
}

impl Drop for BroadcastSession {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

async fn pump_engine_events(
    mut engine_events: mpsc::UnboundedReceiver<EngineEvent>,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
) {
    while let Some(event) = engine_events.recv().await {
        let mapped = match event {
            EngineEvent::StateChanged(state) => SessionEvent::StateChanged(state),
            EngineEvent::RetryStateChanged(state) => SessionEvent::RetryStateChanged(state),
            EngineEvent::StatsUpdated(stats) => SessionEvent::StatsUpdated(stats),
            EngineEvent::Error { message } => SessionEvent::EngineFault { message },
        };
        if event_tx.send(mapped).is_err() {
            break;
        }
    }
    debug!("engine event stream ended");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::api::av::Pts;
    use crate::api::engine::{channel_engine, BroadcastQuality, EngineCommand, NetworkHealth};

    fn test_config() -> BroadcastConfig {
        BroadcastConfig {
            ingest_endpoint: "rtmps://ingest.example:443/app".to_string(),
            stream_key: "sk_test".to_string(),
            preset: QualityPreset::P720,
            auto_reconnect: false,
        }
    }

    fn open_session() -> (BroadcastSession, crate::api::engine::EngineDriver) {
        let (engine, driver, engine_events) = channel_engine();
        let session = BroadcastSession::new(test_config(), Box::new(engine), engine_events);
        (session, driver)
    }

    #[tokio::test]
    async fn matched_samples_reach_the_engine_in_order() {
        let (mut session, mut driver) = open_session();

        session.submit_video_sample(SampleBuffer::video(Pts::from_seconds(1.000), vec![1u8; 8]));
        session.submit_audio_sample(SampleBuffer::audio(Pts::from_seconds(1.020), vec![2u8; 8]));

        let first = driver.commands.try_recv().unwrap();
        let second = driver.commands.try_recv().unwrap();
        assert!(matches!(first, EngineCommand::Video(_)));
        assert!(matches!(second, EngineCommand::Audio(_)));
        assert!(driver.commands.try_recv().is_err());
    }

    #[tokio::test]
    async fn misaligned_samples_stay_out_of_the_engine() {
        let (mut session, mut driver) = open_session();

        session.submit_video_sample(SampleBuffer::video(Pts::from_seconds(5.0), vec![1u8; 8]));
        session.submit_audio_sample(SampleBuffer::audio(Pts::from_seconds(3.0), vec![2u8; 8]));

        assert!(driver.commands.try_recv().is_err());
        assert_eq!(session.pending_samples(), (1, 0));
    }

    #[tokio::test]
    async fn stop_clears_queues_and_blocks_further_samples() {
        let (mut session, mut driver) = open_session();
        let mut events = session.take_event_rx().unwrap();

        session.submit_video_sample(SampleBuffer::video(Pts::from_seconds(1.0), vec![1u8; 8]));
        session.stop();
        assert_eq!(session.pending_samples(), (0, 0));

        // A matching audio sample arriving after teardown goes nowhere.
        session.submit_audio_sample(SampleBuffer::audio(Pts::from_seconds(1.0), vec![2u8; 8]));

        assert!(matches!(driver.commands.try_recv().unwrap(), EngineCommand::Stop));
        assert!(driver.commands.try_recv().is_err());

        let event = events.recv().await.unwrap();
        assert!(matches!(
            event,
            SessionEvent::StateChanged(ConnectionState::Disconnected)
        ));
    }

    #[tokio::test]
    async fn engine_events_are_pumped_into_the_session_stream() {
        let (mut session, driver) = open_session();
        let mut events = session.take_event_rx().unwrap();
        assert!(session.take_event_rx().is_none());

        driver
            .events
            .send(EngineEvent::StateChanged(ConnectionState::Connected))
            .unwrap();
        driver
            .events
            .send(EngineEvent::StatsUpdated(TransmissionStats {
                broadcast_quality: BroadcastQuality::High,
                network_health: NetworkHealth::Excellent,
            }))
            .unwrap();

        let first = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            first,
            SessionEvent::StateChanged(ConnectionState::Connected)
        ));

        let second = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        match second {
            SessionEvent::StatsUpdated(stats) => {
                assert_eq!(stats.broadcast_quality, BroadcastQuality::High);
                assert_eq!(stats.network_health, NetworkHealth::Excellent);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn start_broadcast_uses_the_configured_endpoint() {
        let (mut session, mut driver) = open_session();
        session.start_broadcast().unwrap();
        assert!(session.is_broadcasting());

        match driver.commands.try_recv().unwrap() {
            EngineCommand::Start { endpoint, stream_key } => {
                assert_eq!(endpoint, "rtmps://ingest.example:443/app");
                assert_eq!(stream_key, "sk_test");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn mute_relays_to_the_engine() {
        let (mut session, mut driver) = open_session();
        assert!(!session.is_muted());

        session.set_muted(true);
        assert!(session.is_muted());
        assert!(matches!(
            driver.commands.try_recv().unwrap(),
            EngineCommand::SetMuted(true)
        ));
    }
}

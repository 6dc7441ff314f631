//! Timestamp synchronization for independently-delivered capture streams
//!
//! Video and audio sample buffers arrive from separate platform capture
//! callbacks with no mutual ordering guarantee. This module pairs them by
//! presentation timestamp before they are handed to the broadcast engine's
//! custom sources, so the two outgoing streams never drift beyond a
//! configured tolerance.
//!
//! The synchronizer holds one bounded FIFO queue per stream and, after every
//! submission, looks at the two queue heads only:
//! - heads within the sync threshold are emitted as a matched pair
//! - a head more than a second behind the other stream is stale and dropped
//! - otherwise the earlier (lagging) head is dropped, since holding it
//!   longer cannot improve alignment
//!
//! Drift is not an error: both submit operations are infallible and simply
//! return `None` when no pair is ready.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::av::{MediaKind, SampleBuffer};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Tuning knobs for the synchronizer.
#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    /// Maximum timestamp distance, in seconds, for two heads to pair.
    pub sync_threshold: f64,
    /// Bound on each pending queue; the oldest entry is evicted first.
    pub max_queue_size: usize,
    /// Distance, in seconds, past which a head is considered stale and
    /// dropped outright. Acts as a per-frame staleness timeout.
    pub discard_threshold: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_threshold: 0.05,
            max_queue_size: 10,
            discard_threshold: 1.0,
        }
    }
}

// ============================================================================
// SYNCHRONIZER
// ============================================================================

/// A matched video/audio pair ready for the engine sinks.
#[derive(Debug)]
pub struct SyncedPair {
    pub video: SampleBuffer,
    pub audio: SampleBuffer,
}

struct Queues {
    video: VecDeque<SampleBuffer>,
    audio: VecDeque<SampleBuffer>,
}

/// Pairs independently-arriving video and audio samples by timestamp.
///
/// One instance per capture session; both queues are private to it. The
/// submit operations are synchronous and non-blocking, and may be called
/// from concurrent producer threads: a single lock covers both queues, so
/// every submission is atomic with respect to the pairing evaluation.
pub struct SampleSynchronizer {
    config: SyncConfig,
    queues: Mutex<Queues>,
}

impl SampleSynchronizer {
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default())
    }

    pub fn with_config(config: SyncConfig) -> Self {
        Self {
            config,
            queues: Mutex::new(Queues {
                video: VecDeque::with_capacity(config.max_queue_size),
                audio: VecDeque::with_capacity(config.max_queue_size),
            }),
        }
    }

    /// Submit a video sample from the capture callback.
    ///
    /// Returns a matched pair when this submission completes one, otherwise
    /// `None` (the sample is queued, or was dropped as invalid).
    pub fn submit_video(&self, sample: SampleBuffer) -> Option<SyncedPair> {
        self.submit(sample, MediaKind::Video)
    }

    /// Submit an audio sample from the capture callback.
    pub fn submit_audio(&self, sample: SampleBuffer) -> Option<SyncedPair> {
        self.submit(sample, MediaKind::Audio)
    }

    /// Drop everything buffered. Called on session teardown; afterwards the
    /// synchronizer starts from a clean slate.
    pub fn clear(&self) {
        let mut queues = self.queues.lock();
        let dropped = queues.video.len() + queues.audio.len();
        queues.video.clear();
        queues.audio.clear();
        if dropped > 0 {
            debug!("cleared synchronizer, dropped {dropped} pending samples");
        }
    }

    /// Number of video samples currently buffered.
    pub fn video_pending(&self) -> usize {
        self.queues.lock().video.len()
    }

    /// Number of audio samples currently buffered.
    pub fn audio_pending(&self) -> usize {
        self.queues.lock().audio.len()
    }

    fn submit(&self, sample: SampleBuffer, kind: MediaKind) -> Option<SyncedPair> {
        if sample.kind != kind {
            warn!(?kind, actual = ?sample.kind, "sample submitted to wrong stream, dropping");
            return None;
        }
        if !sample.is_valid() {
            debug!(?kind, pts = sample.pts.seconds(), "dropping invalid sample");
            return None;
        }

        let mut queues = self.queues.lock();
        let queue = match kind {
            MediaKind::Video => &mut queues.video,
            MediaKind::Audio => &mut queues.audio,
        };
        if queue.len() >= self.config.max_queue_size {
            let evicted = queue.pop_front();
            trace!(
                ?kind,
                pts = evicted.map(|s| s.pts.seconds()),
                "pending queue full, evicting oldest sample"
            );
        }
        queue.push_back(sample);

        self.try_pair(&mut queues)
    }

    /// One pairing step over the queue heads. At most one pair or one
    /// discard per call; never loops.
    fn try_pair(&self, queues: &mut Queues) -> Option<SyncedPair> {
        let delta = match (queues.video.front(), queues.audio.front()) {
            (Some(video), Some(audio)) => video.pts.seconds() - audio.pts.seconds(),
            _ => return None,
        };

        if delta.abs() < self.config.sync_threshold {
            let (Some(video), Some(audio)) =
                (queues.video.pop_front(), queues.audio.pop_front())
            else {
                unreachable!("pairing requires both queue heads");
            };
            return Some(SyncedPair { video, audio });
        }

        if delta > self.config.discard_threshold {
            // Video is far ahead; the audio head can never catch up.
            let stale = queues.audio.pop_front();
            debug!(
                delta,
                pts = stale.map(|s| s.pts.seconds()),
                "discarding stale audio sample"
            );
            return None;
        }
        if delta < -self.config.discard_threshold {
            let stale = queues.video.pop_front();
            debug!(
                delta,
                pts = stale.map(|s| s.pts.seconds()),
                "discarding stale video sample"
            );
            return None;
        }

        // Misaligned but not stale: drop whichever head is earlier, since
        // holding it cannot help alignment.
        if delta > 0.0 {
            let lagging = queues.audio.pop_front();
            trace!(delta, pts = lagging.map(|s| s.pts.seconds()), "dropping lagging audio head");
        } else {
            let lagging = queues.video.pop_front();
            trace!(delta, pts = lagging.map(|s| s.pts.seconds()), "dropping lagging video head");
        }
        None
    }
}

impl Default for SampleSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// BROADCASTER PLUGIN CORE
// ============================================================================

// Media sample types and quality presets
pub mod av;

// Timestamp synchronization between the two capture streams
pub mod sync;

// Broadcast engine seam (opaque vendor SDK)
pub mod engine;

// Capture session state (camera position, lens, focus, zoom)
pub mod capture;

// Broadcast session lifecycle and sample routing
pub mod session;

// Playback relay and player registry
pub mod player;

// Flutter API surface
pub mod bridge_api;

//! Native core of a mobile live-broadcast plugin.
//!
//! The platform side captures camera and microphone samples and owns the
//! vendor broadcast/player SDKs; this crate sits between them and the
//! application layer: it keeps per-session state, pairs the two capture
//! streams by timestamp before they reach the encoder, and relays commands
//! and events across the bridge.

pub mod api;

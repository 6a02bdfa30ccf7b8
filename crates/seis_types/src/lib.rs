//! Domain types for the seismic filter processing pipeline
//!
//! This crate defines the shared vocabulary between the pipeline and its
//! collaborators: channels and channel segments, filter definitions and
//! per-channel filter assignments, signal-detection hypotheses, and the
//! filter error taxonomy. Waveform sample payloads use `Arc<[f64]>` for
//! zero-copy sharing between the pipeline and the display layer.

pub mod channel;
pub mod detection;
pub mod error;
pub mod filter;

pub use channel::*;
pub use detection::*;
pub use error::*;
pub use filter::*;

/// Deterministic identity string for one channel segment instance.
pub type SegmentId = String;

/// Composite filter fingerprint (named-filter name + definition name).
pub type FilterId = String;

/// Name of a channel or station row in the display.
pub type ChannelName = String;

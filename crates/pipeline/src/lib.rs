//! Filter Processing Pipeline for the seismic monitoring display
//!
//! This crate schedules, deduplicates, and executes DSP filter work for the
//! continuously growing set of waveform segments shown in the display. The
//! moving parts:
//!
//! - a reprioritizable, bounded-concurrency task queue ([`queue`]),
//! - a fingerprint-keyed dedup cache and delta calculator ([`delta`]),
//! - a per-sample-rate filter design cache ([`design`]),
//! - the per-segment apply executor ([`apply`]),
//! - a fallback handler that revokes failed work for retry ([`fallback`]),
//! - the analysis-session object tying them together ([`session`]).
//!
//! The numeric design/apply engine and the application state store are
//! consumed through the [`engine::FilterEngine`] and [`store::StateStore`]
//! contracts.

pub mod apply;
pub mod channel_factory;
pub mod config;
pub mod delta;
pub mod design;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod queue;
pub mod session;
pub mod store;

pub use apply::*;
pub use channel_factory::*;
pub use config::*;
pub use delta::*;
pub use design::*;
pub use engine::*;
pub use error::*;
pub use fallback::*;
pub use queue::*;
pub use session::*;
pub use store::*;

//! Derived channel factory
//!
//! Filtered waveforms are published under a derived channel rather than the
//! raw channel, so the display can keep both. Derivation is pure: the same
//! input channel and filter definition always produce the same derived
//! channel name (a content hash keeps names from colliding across
//! definitions that share a display name).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use seis_types::{Channel, FilterDefinition};

/// Create the derived channel for `channel` filtered by `definition`.
pub fn create_filtered(channel: &Channel, definition: &FilterDefinition) -> Channel {
    let description = &definition.description;
    let mut hasher = DefaultHasher::new();
    channel.name.hash(&mut hasher);
    channel.effective_at.to_bits().hash(&mut hasher);
    definition.name.hash(&mut hasher);
    description.filter_type.hash(&mut hasher);
    description.low_frequency_hz.map(f64::to_bits).hash(&mut hasher);
    description.high_frequency_hz.map(f64::to_bits).hash(&mut hasher);
    description.order.hash(&mut hasher);
    description.zero_phase.hash(&mut hasher);
    let digest = hasher.finish();

    Channel {
        name: format!("{}/filter,{}/{digest:016x}", channel.name, definition.name),
        effective_at: channel.effective_at,
        sample_rate_hz: channel.sample_rate_hz,
    }
}

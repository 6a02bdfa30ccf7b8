//! Channel and channel segment types
//!
//! A channel segment is a contiguous span of one channel's waveform samples
//! for a given effective time and creation time. Segments are identified by
//! a deterministic fingerprint string derived from their semantically
//! significant fields, independent of any filter state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::SegmentId;

/// A version reference to a channel: just enough identity to name it at a
/// point in time without carrying the full metadata record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelVersionRef {
    pub name: String,
    /// Effective time in epoch seconds.
    pub effective_at: f64,
}

/// Channel metadata as read from the state store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    /// Effective time in epoch seconds.
    pub effective_at: f64,
    /// Nominal sample rate in Hz.
    pub sample_rate_hz: f64,
}

impl Channel {
    /// A raw channel comes straight from station metadata; derived channels
    /// carry a derivation segment (`"/filter,..."` etc.) in their name.
    pub fn is_raw(&self) -> bool {
        !self.name.contains('/')
    }

    pub fn version_ref(&self) -> ChannelVersionRef {
        ChannelVersionRef {
            name: self.name.clone(),
            effective_at: self.effective_at,
        }
    }
}

/// Identity of one channel segment: the channel version it belongs to plus
/// its time span and creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSegmentDescriptor {
    pub channel: ChannelVersionRef,
    /// Segment start in epoch seconds.
    pub start_time: f64,
    /// Segment end in epoch seconds.
    pub end_time: f64,
    /// Creation time in epoch seconds.
    pub creation_time: f64,
}

impl ChannelSegmentDescriptor {
    /// Deterministic fingerprint for this segment instance. Used as the
    /// dedup cache key, so the format must be stable.
    pub fn id(&self) -> SegmentId {
        format!(
            "{}.{}.{}.{}.{}",
            self.channel.name,
            self.channel.effective_at,
            self.start_time,
            self.end_time,
            self.creation_time
        )
    }
}

/// One channel segment with its waveform samples.
///
/// No serde here: sample payloads never cross a serialization boundary
/// inside the pipeline, and `Arc<[f64]>` keeps clones cheap.
#[derive(Debug, Clone)]
pub struct ChannelSegment {
    pub descriptor: ChannelSegmentDescriptor,
    /// Sample rate of this segment's waveform in Hz.
    pub sample_rate_hz: f64,
    pub samples: Arc<[f64]>,
}

impl ChannelSegment {
    pub fn new(
        descriptor: ChannelSegmentDescriptor,
        sample_rate_hz: f64,
        samples: Vec<f64>,
    ) -> Self {
        Self {
            descriptor,
            sample_rate_hz,
            samples: samples.into(),
        }
    }

    /// Fingerprint of this segment (see [`ChannelSegmentDescriptor::id`]).
    pub fn id(&self) -> SegmentId {
        self.descriptor.id()
    }
}

/// Filtered segments for one display row, published to the state store as a
/// single batch so the row updates atomically.
#[derive(Debug, Clone)]
pub struct FilteredSegmentBatch {
    /// The display row (station or raw channel) the segments belong to.
    pub channel_name: String,
    /// The filter name slot to store the segments under. For a named filter
    /// this is the named-filter name, not the resolved definition name.
    pub filter_name: String,
    pub segments: Vec<ChannelSegment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> ChannelSegmentDescriptor {
        ChannelSegmentDescriptor {
            channel: ChannelVersionRef {
                name: "ASAR.AS01.SHZ".to_string(),
                effective_at: 100.0,
            },
            start_time: 200.0,
            end_time: 500.0,
            creation_time: 600.0,
        }
    }

    #[test]
    fn segment_fingerprint_is_deterministic() {
        assert_eq!(descriptor().id(), descriptor().id());
        assert_eq!(descriptor().id(), "ASAR.AS01.SHZ.100.200.500.600");
    }

    #[test]
    fn fingerprint_ignores_sample_data() {
        let a = ChannelSegment::new(descriptor(), 40.0, vec![1.0, 2.0]);
        let b = ChannelSegment::new(descriptor(), 40.0, vec![3.0]);
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn raw_vs_derived_channel() {
        let raw = Channel {
            name: "ASAR.AS01.SHZ".to_string(),
            effective_at: 0.0,
            sample_rate_hz: 40.0,
        };
        let derived = Channel {
            name: "ASAR.AS01.SHZ/filter,HAM FIR BP 0.70-2.00 Hz/0123".to_string(),
            effective_at: 0.0,
            sample_rate_hz: 40.0,
        };
        assert!(raw.is_raw());
        assert!(!derived.is_raw());
    }
}

//! Filter processing error taxonomy
//!
//! Every failure in the pipeline is caught at the narrowest possible scope
//! (per segment or per sample rate) and normalized into one of these four
//! kinds. The fallback handler consumes them via [`FilterError::report`],
//! which flattens any variant into the uniform shape it needs to revoke
//! dedup claims: one or more filter fingerprints, a channel name, and an
//! optional segment fingerprint list (absence means "the whole channel").

use thiserror::Error;

use crate::{ChannelName, FilterId, SegmentId};

/// A failure scoped to filter processing work.
#[derive(Debug, Clone, Error)]
pub enum FilterError {
    /// A named filter could not be resolved to a concrete definition for a
    /// segment.
    #[error("could not resolve named filter '{filter_id}' for segment {segment_id}")]
    Resolution {
        filter_id: FilterId,
        channel: ChannelName,
        segment_id: SegmentId,
    },

    /// The engine failed to compute coefficients for a (filter, sample
    /// rate) pair. Scoped to the segments that use that rate.
    #[error("error designing filter '{filter_name}' for sample rate {sample_rate_hz} Hz: {message}")]
    Design {
        filter_name: String,
        sample_rate_hz: f64,
        message: String,
        filter_ids: Vec<FilterId>,
        channel: ChannelName,
        segment_ids: Vec<SegmentId>,
    },

    /// The engine failed to filter one specific segment.
    #[error("error filtering channel '{channel}': {message}")]
    Apply {
        message: String,
        filter_ids: Vec<FilterId>,
        channel: ChannelName,
        segment_ids: Vec<SegmentId>,
    },

    /// No channel metadata found for a segment's channel name, or an
    /// unexpected bookkeeping failure that invalidates the channel's whole
    /// current batch.
    #[error("channel lookup failed for '{channel}': {message}")]
    ChannelLookup {
        message: String,
        filter_ids: Vec<FilterId>,
        channel: ChannelName,
        /// When present, only these segments are invalidated; when absent
        /// the whole channel bucket is.
        segment_ids: Option<Vec<SegmentId>>,
    },
}

/// The uniform shape the fallback handler works with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultReport {
    pub filter_ids: Vec<FilterId>,
    pub channel: ChannelName,
    /// `None` addresses the entire channel bucket for each fingerprint.
    pub segment_ids: Option<Vec<SegmentId>>,
}

impl FilterError {
    /// Normalize any variant into the report consumed by the fallback
    /// handler.
    pub fn report(&self) -> FaultReport {
        match self {
            FilterError::Resolution {
                filter_id,
                channel,
                segment_id,
            } => FaultReport {
                filter_ids: vec![filter_id.clone()],
                channel: channel.clone(),
                segment_ids: Some(vec![segment_id.clone()]),
            },
            FilterError::Design {
                filter_ids,
                channel,
                segment_ids,
                ..
            }
            | FilterError::Apply {
                filter_ids,
                channel,
                segment_ids,
                ..
            } => FaultReport {
                filter_ids: filter_ids.clone(),
                channel: channel.clone(),
                segment_ids: Some(segment_ids.clone()),
            },
            FilterError::ChannelLookup {
                filter_ids,
                channel,
                segment_ids,
                ..
            } => FaultReport {
                filter_ids: filter_ids.clone(),
                channel: channel.clone(),
                segment_ids: segment_ids.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_report_is_segment_scoped() {
        let err = FilterError::Resolution {
            filter_id: "LP1/Butterworth-LP".to_string(),
            channel: "CH1".to_string(),
            segment_id: "seg-1".to_string(),
        };
        let report = err.report();
        assert_eq!(report.filter_ids, vec!["LP1/Butterworth-LP"]);
        assert_eq!(report.segment_ids, Some(vec!["seg-1".to_string()]));
    }

    #[test]
    fn channel_lookup_without_segments_addresses_whole_channel() {
        let err = FilterError::ChannelLookup {
            message: "no channel metadata".to_string(),
            filter_ids: vec!["F".to_string()],
            channel: "CH1".to_string(),
            segment_ids: None,
        };
        assert_eq!(err.report().segment_ids, None);
    }
}

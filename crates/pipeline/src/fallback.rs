//! Error fallback handling
//!
//! Every filter error ends here. The handler revokes the failed triples'
//! claims in the dedup cache so a later pass may retry them, and flags the
//! affected display row's assignment as errored so the surrounding
//! application can fall back to raw waveforms. The handler itself never
//! fails.

use std::collections::HashMap;

use seis_types::{ChannelName, Filter, FilterError};
use tracing::error;

use crate::delta::ProcessedItemsCache;
use crate::store::StateStore;

/// Revoke the error's claims and mark its display row errored.
pub fn handle_filter_error(
    filter_error: &FilterError,
    processed: &mut ProcessedItemsCache,
    assignments: &mut HashMap<ChannelName, Filter>,
    store: &dyn StateStore,
) {
    error!(%filter_error, "filter processing failed, reverting to raw");
    let report = filter_error.report();

    for filter_id in &report.filter_ids {
        let Some(by_channel) = processed.get_mut(filter_id) else {
            continue;
        };
        match &report.segment_ids {
            Some(segment_ids) => {
                if let Some(claimed) = by_channel.get_mut(&report.channel) {
                    for segment_id in segment_ids {
                        claimed.remove(segment_id);
                    }
                    if claimed.is_empty() {
                        by_channel.remove(&report.channel);
                    }
                }
            }
            // No segment scope: the whole channel's claims are suspect.
            None => {
                by_channel.remove(&report.channel);
            }
        }
        if by_channel.is_empty() {
            processed.remove(filter_id);
        }
    }

    if let Some(assignment) = assignments.get_mut(&report.channel) {
        if !assignment.errored {
            assignment.errored = true;
            store.set_filter_for_channel(&report.channel, assignment.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seis_types::{Channel, FilteredSegmentBatch};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingStore {
        set_filter_calls: AtomicUsize,
    }

    impl StateStore for CountingStore {
        fn add_filtered_channels(&self, _channels: Vec<Channel>) {}
        fn add_filtered_channel_segments(&self, _batches: Vec<FilteredSegmentBatch>) {}
        fn set_filter_for_channel(&self, _channel: &str, _filter: Filter) {
            self.set_filter_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn claimed(filter_id: &str, channel: &str, segment_ids: &[&str]) -> ProcessedItemsCache {
        let mut processed = ProcessedItemsCache::default();
        processed.insert(
            filter_id.to_string(),
            HashMap::from([(
                channel.to_string(),
                segment_ids.iter().map(|s| s.to_string()).collect::<HashSet<_>>(),
            )]),
        );
        processed
    }

    #[test]
    fn failed_segment_is_revoked_and_siblings_survive() {
        let mut processed = claimed("LP1/Butterworth-LP", "CH1", &["seg-1", "seg-2"]);
        let mut assignments = HashMap::from([("CH1".to_string(), Filter::named("LP1"))]);
        let store = CountingStore::default();

        let apply_error = FilterError::Apply {
            message: "engine rejected samples".to_string(),
            filter_ids: vec!["LP1/Butterworth-LP".to_string()],
            channel: "CH1".to_string(),
            segment_ids: vec!["seg-1".to_string()],
        };
        handle_filter_error(&apply_error, &mut processed, &mut assignments, &store);

        let claims = &processed["LP1/Butterworth-LP"]["CH1"];
        assert!(!claims.contains("seg-1"));
        assert!(claims.contains("seg-2"));
        assert!(assignments["CH1"].errored);
        assert_eq!(store.set_filter_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn errored_flag_is_set_only_once() {
        let mut processed = claimed("LP1/Butterworth-LP", "CH1", &["seg-1", "seg-2"]);
        let mut assignments = HashMap::from([("CH1".to_string(), Filter::named("LP1"))]);
        let store = CountingStore::default();

        for segment in ["seg-1", "seg-2"] {
            let apply_error = FilterError::Apply {
                message: "engine rejected samples".to_string(),
                filter_ids: vec!["LP1/Butterworth-LP".to_string()],
                channel: "CH1".to_string(),
                segment_ids: vec![segment.to_string()],
            };
            handle_filter_error(&apply_error, &mut processed, &mut assignments, &store);
        }

        assert_eq!(store.set_filter_calls.load(Ordering::SeqCst), 1);
        // All claims revoked, so the empty buckets are gone too.
        assert!(processed.is_empty());
    }

    #[test]
    fn channel_scoped_error_clears_every_claim_for_the_channel() {
        let mut processed = claimed("LP1/Butterworth-LP", "CH1", &["seg-1", "seg-2"]);
        processed
            .get_mut("LP1/Butterworth-LP")
            .unwrap()
            .insert("CH2".to_string(), HashSet::from(["seg-9".to_string()]));
        let mut assignments = HashMap::from([("CH1".to_string(), Filter::named("LP1"))]);
        let store = CountingStore::default();

        let lookup_error = FilterError::ChannelLookup {
            message: "channel metadata disappeared".to_string(),
            filter_ids: vec!["LP1/Butterworth-LP".to_string()],
            channel: "CH1".to_string(),
            segment_ids: None,
        };
        handle_filter_error(&lookup_error, &mut processed, &mut assignments, &store);

        let by_channel = &processed["LP1/Butterworth-LP"];
        assert!(!by_channel.contains_key("CH1"));
        assert!(by_channel.contains_key("CH2"));
    }

    #[test]
    fn unknown_channel_assignment_is_tolerated() {
        let mut processed = ProcessedItemsCache::default();
        let mut assignments = HashMap::new();
        let store = CountingStore::default();

        let resolution_error = FilterError::Resolution {
            filter_id: "LP1".to_string(),
            channel: "CH-GONE".to_string(),
            segment_id: "seg-1".to_string(),
        };
        handle_filter_error(&resolution_error, &mut processed, &mut assignments, &store);
        assert_eq!(store.set_filter_calls.load(Ordering::SeqCst), 0);
    }
}

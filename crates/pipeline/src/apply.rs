//! Filter application for one channel's claimed segments
//!
//! One apply pass handles one (filter fingerprint, channel) pair: every
//! segment is filtered independently against the design cached for its
//! sample rate, failures are collected per segment, and the survivors are
//! returned as a single publishable batch. A segment failing never blocks
//! its siblings.

use futures::future::join_all;
use seis_types::{
    Channel, ChannelSegment, FilterError, FilterId, FilteredSegmentBatch,
};
use tracing::debug;

use crate::channel_factory::create_filtered;
use crate::config::FilterParams;
use crate::delta::ResolvedFilter;
use crate::design::{cached_definition, DefinitionCache};
use crate::engine::FilterEngine;

/// Everything an apply pass needs, snapshotted before the engine awaits.
pub struct ApplyRequest<'a> {
    /// Raw channel metadata for the segments' source channel.
    pub channel: &'a Channel,
    /// Display row the results publish under.
    pub display_channel: &'a str,
    /// Filter name the batch is slotted under in the store.
    pub filter_name: &'a str,
    pub filter_id: &'a FilterId,
    pub resolved: &'a ResolvedFilter,
    pub segments: &'a [ChannelSegment],
    pub cache: &'a DefinitionCache,
}

/// Result of one apply pass, ready to publish channels-then-segments.
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    /// Derived channels created for this pass, deduplicated by name.
    pub channels: Vec<Channel>,
    /// One batch per pass; empty batches are omitted.
    pub batches: Vec<FilteredSegmentBatch>,
    /// Per-segment failures.
    pub errors: Vec<FilterError>,
}

/// Filter all of `request.segments` with the resolved filter's cached
/// designs.
pub async fn apply_to_channel(
    request: ApplyRequest<'_>,
    engine: &dyn FilterEngine,
    params: &FilterParams,
) -> ApplyOutcome {
    let ApplyRequest {
        channel,
        display_channel,
        filter_name,
        filter_id,
        resolved,
        segments,
        cache,
    } = request;
    let mut outcome = ApplyOutcome::default();

    let results = join_all(segments.iter().map(|segment| async move {
        let definition = cached_definition(
            cache,
            &resolved.definition.name,
            segment.sample_rate_hz,
            params.sample_rate_tolerance_hz,
        )
        .ok_or_else(|| {
            format!(
                "no design for '{}' at {} Hz",
                resolved.definition.name, segment.sample_rate_hz
            )
        })?;

        let filtered = engine
            .apply(
                definition,
                &segment.samples,
                params.taper,
                params.remove_group_delay,
            )
            .await
            .map_err(|error| format!("{error:#}"))?;

        let derived = create_filtered(channel, definition);
        let mut descriptor = segment.descriptor.clone();
        descriptor.channel = derived.version_ref();
        Ok::<_, String>((derived, ChannelSegment::new(descriptor, segment.sample_rate_hz, filtered)))
    }))
    .await;

    let mut filtered_segments = Vec::new();
    for (segment, result) in segments.iter().zip(results) {
        match result {
            Ok((derived, filtered)) => {
                if !outcome.channels.iter().any(|c| c.name == derived.name) {
                    outcome.channels.push(derived);
                }
                filtered_segments.push(filtered);
            }
            Err(message) => {
                outcome.errors.push(FilterError::Apply {
                    message,
                    filter_ids: vec![filter_id.clone()],
                    channel: display_channel.to_string(),
                    segment_ids: vec![segment.id()],
                });
            }
        }
    }

    debug!(
        channel = display_channel,
        filter = %filter_id,
        filtered = filtered_segments.len(),
        failed = outcome.errors.len(),
        "apply pass finished"
    );
    if !filtered_segments.is_empty() {
        outcome.batches.push(FilteredSegmentBatch {
            channel_name: display_channel.to_string(),
            filter_name: filter_name.to_string(),
            segments: filtered_segments,
        });
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::{merge_definitions, SampleRate};
    use crate::engine::BiquadEngine;
    use anyhow::Result;
    use async_trait::async_trait;
    use seis_types::{
        ChannelSegmentDescriptor, ChannelVersionRef, FilterDefinition, FilterDescription,
        FilterType,
    };
    use std::collections::HashMap;

    fn resolved() -> ResolvedFilter {
        ResolvedFilter {
            named: Some("LP1".to_string()),
            definition: FilterDefinition {
                name: "Butterworth-LP".to_string(),
                comments: None,
                description: FilterDescription {
                    filter_type: FilterType::LowPass,
                    low_frequency_hz: None,
                    high_frequency_hz: Some(4.2),
                    order: 2,
                    zero_phase: false,
                },
                parameters: None,
                coefficients: None,
            },
        }
    }

    fn channel() -> Channel {
        Channel {
            name: "ASAR.AS01.SHZ".to_string(),
            effective_at: 0.0,
            sample_rate_hz: 40.0,
        }
    }

    fn segment(start: f64) -> ChannelSegment {
        ChannelSegment::new(
            ChannelSegmentDescriptor {
                channel: ChannelVersionRef {
                    name: "ASAR.AS01.SHZ".to_string(),
                    effective_at: 0.0,
                },
                start_time: start,
                end_time: start + 300.0,
                creation_time: start + 400.0,
            },
            40.0,
            vec![1.0; 64],
        )
    }

    async fn designed_cache(filter: &ResolvedFilter) -> DefinitionCache {
        let mut definition = filter.definition.clone();
        definition.parameters = Some(seis_types::FilterParameters {
            sample_rate_hz: 40.0,
            sample_rate_tolerance_hz: 1.0,
            group_delay_sec: 0.0,
        });
        let designed = BiquadEngine.design(definition).await.unwrap();
        let mut cache = DefinitionCache::default();
        merge_definitions(
            &mut cache,
            &filter.definition.name,
            HashMap::from([(SampleRate(40.0), designed)]),
        );
        cache
    }

    /// Fails apply for segments starting at a chosen time.
    struct FlakyEngine {
        inner: BiquadEngine,
        fail_len: usize,
    }

    #[async_trait]
    impl FilterEngine for FlakyEngine {
        async fn design(&self, definition: FilterDefinition) -> Result<FilterDefinition> {
            self.inner.design(definition).await
        }

        async fn apply(
            &self,
            definition: &FilterDefinition,
            samples: &[f64],
            taper: u32,
            remove_group_delay: bool,
        ) -> Result<Vec<f64>> {
            if samples.len() == self.fail_len {
                anyhow::bail!("samples rejected");
            }
            self.inner
                .apply(definition, samples, taper, remove_group_delay)
                .await
        }
    }

    #[tokio::test]
    async fn all_segments_filter_into_one_batch() {
        let filter = resolved();
        let cache = designed_cache(&filter).await;
        let segments = vec![segment(100.0), segment(400.0)];
        let outcome = apply_to_channel(
            ApplyRequest {
                channel: &channel(),
                display_channel: "CH1",
                filter_name: "LP1",
                filter_id: &filter.id(),
                resolved: &filter,
                segments: &segments,
                cache: &cache,
            },
            &BiquadEngine,
            &FilterParams::default(),
        )
        .await;

        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.channels.len(), 1);
        assert!(!outcome.channels[0].is_raw());
        assert_eq!(outcome.batches.len(), 1);
        let batch = &outcome.batches[0];
        assert_eq!(batch.channel_name, "CH1");
        assert_eq!(batch.filter_name, "LP1");
        assert_eq!(batch.segments.len(), 2);
        // Filtered segments carry the derived channel, not the raw one.
        assert_eq!(batch.segments[0].descriptor.channel.name, outcome.channels[0].name);
    }

    #[tokio::test]
    async fn one_failing_segment_does_not_block_its_siblings() {
        let filter = resolved();
        let cache = designed_cache(&filter).await;
        let mut bad = segment(100.0);
        bad.samples = vec![1.0; 7].into();
        let good = segment(400.0);
        let segments = vec![bad.clone(), good];

        let engine = FlakyEngine { inner: BiquadEngine, fail_len: 7 };
        let outcome = apply_to_channel(
            ApplyRequest {
                channel: &channel(),
                display_channel: "CH1",
                filter_name: "LP1",
                filter_id: &filter.id(),
                resolved: &filter,
                segments: &segments,
                cache: &cache,
            },
            &engine,
            &FilterParams::default(),
        )
        .await;

        assert_eq!(outcome.batches[0].segments.len(), 1);
        assert_eq!(outcome.errors.len(), 1);
        match &outcome.errors[0] {
            FilterError::Apply { segment_ids, filter_ids, .. } => {
                assert_eq!(segment_ids, &vec![bad.id()]);
                assert_eq!(filter_ids, &vec![filter.id()]);
            }
            other => panic!("expected apply error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_design_is_a_per_segment_apply_error() {
        let filter = resolved();
        let segments = vec![segment(100.0)];
        let outcome = apply_to_channel(
            ApplyRequest {
                channel: &channel(),
                display_channel: "CH1",
                filter_name: "LP1",
                filter_id: &filter.id(),
                resolved: &filter,
                segments: &segments,
                cache: &DefinitionCache::default(),
            },
            &BiquadEngine,
            &FilterParams::default(),
        )
        .await;
        assert!(outcome.batches.is_empty());
        assert_eq!(outcome.errors.len(), 1);
    }
}

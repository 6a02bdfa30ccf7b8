//! Filter design and the per-sample-rate definition cache
//!
//! A definition is designed once per (definition name, sample rate) and the
//! resulting coefficients are cached for the rest of the session. Segments
//! whose sample rate is within tolerance of an already designed rate reuse
//! that design. Design failures are scoped to the segments whose rate
//! triggered the failed call; segments at other rates proceed.

use std::collections::HashMap;

use seis_types::{
    ChannelSegment, FilterDefinition, FilterError, FilterId, FilterParameters, SegmentId,
};
use tracing::debug;

use crate::config::FilterParams;
use crate::delta::ResolvedFilter;
use crate::engine::FilterEngine;

/// Sample rate usable as a hash key. Rates come from segment metadata and
/// are compared bit-exact; tolerance matching happens at lookup time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleRate(pub f64);

impl Eq for SampleRate {}

impl std::hash::Hash for SampleRate {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

/// Designed definitions, keyed definition name -> sample rate.
pub type DefinitionCache = HashMap<String, HashMap<SampleRate, FilterDefinition>>;

/// Find a cached design usable for `sample_rate_hz`, preferring an exact
/// rate over a within-tolerance one.
pub fn cached_definition<'a>(
    cache: &'a DefinitionCache,
    name: &str,
    sample_rate_hz: f64,
    tolerance_hz: f64,
) -> Option<&'a FilterDefinition> {
    let by_rate = cache.get(name)?;
    if let Some(exact) = by_rate.get(&SampleRate(sample_rate_hz)) {
        return Some(exact);
    }
    by_rate
        .iter()
        .find(|(rate, _)| (rate.0 - sample_rate_hz).abs() <= tolerance_hz)
        .map(|(_, definition)| definition)
}

/// Result of one design pass for a single resolved filter.
#[derive(Debug, Default)]
pub struct DesignOutcome {
    /// Freshly designed definitions to merge into the cache.
    pub new_definitions: HashMap<SampleRate, FilterDefinition>,
    /// Design failures, each scoped to the segments at the failing rate.
    pub errors: Vec<FilterError>,
}

/// Design `resolved` for every sample rate in `segments` that the cache
/// does not already cover.
pub async fn ensure_designed(
    resolved: &ResolvedFilter,
    segments: &[ChannelSegment],
    cache: &DefinitionCache,
    params: &FilterParams,
    engine: &dyn FilterEngine,
    channel: &str,
    filter_id: &FilterId,
) -> DesignOutcome {
    let mut outcome = DesignOutcome::default();

    // Distinct missing rates, with the segments that need each one.
    let mut segments_by_rate: HashMap<SampleRate, Vec<SegmentId>> = HashMap::new();
    for segment in segments {
        let rate = segment.sample_rate_hz;
        if cached_definition(
            cache,
            &resolved.definition.name,
            rate,
            params.sample_rate_tolerance_hz,
        )
        .is_some()
        {
            continue;
        }
        segments_by_rate
            .entry(SampleRate(rate))
            .or_default()
            .push(segment.id());
    }
    if segments_by_rate.is_empty() {
        return outcome;
    }
    debug!(
        filter = %resolved.definition.name,
        rates = segments_by_rate.len(),
        "designing filter for missing sample rates"
    );

    for (rate, segment_ids) in segments_by_rate {
        let mut definition = resolved.definition.clone();
        definition.parameters = Some(FilterParameters {
            sample_rate_hz: rate.0,
            sample_rate_tolerance_hz: params.sample_rate_tolerance_hz,
            group_delay_sec: params.group_delay_sec,
        });

        match engine.design(definition).await {
            Ok(designed) => {
                outcome.new_definitions.insert(rate, designed);
            }
            Err(error) => {
                outcome.errors.push(FilterError::Design {
                    filter_name: resolved.definition.name.clone(),
                    sample_rate_hz: rate.0,
                    message: format!("{error:#}"),
                    filter_ids: vec![filter_id.clone()],
                    channel: channel.to_string(),
                    segment_ids,
                });
            }
        }
    }
    outcome
}

/// Merge freshly designed definitions into the cache. Write-once: a rate
/// designed by a concurrent job is never overwritten.
pub fn merge_definitions(
    cache: &mut DefinitionCache,
    name: &str,
    new_definitions: HashMap<SampleRate, FilterDefinition>,
) {
    let by_rate = cache.entry(name.to_string()).or_default();
    for (rate, definition) in new_definitions {
        by_rate.entry(rate).or_insert(definition);
    }
}

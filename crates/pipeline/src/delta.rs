//! Delta calculation against the processed-items dedup cache
//!
//! Whenever filter assignments or visible segments change, the delta
//! calculator works out which (filter fingerprint, channel, segment)
//! triples are not yet claimed, resolving named filters to concrete
//! definitions per segment. The session merges the delta into the cache
//! before any task is enqueued, so a state change arriving mid-flight can
//! never schedule the same triple twice.

use std::collections::{HashMap, HashSet};

use seis_types::{
    combined_filter_id, Channel, ChannelName, ChannelSegment, Filter, FilterDefinition, FilterError,
    FilterId, FilterKind, SegmentId, SignalDetectionHypothesis,
};

/// Triples already filtered or claimed in flight, keyed
/// fingerprint → channel → segment ids.
pub type ProcessedItemsCache = HashMap<FilterId, HashMap<ChannelName, HashSet<SegmentId>>>;

/// Read inputs for named-filter resolution, supplied by the state store.
#[derive(Debug, Clone, Default)]
pub struct ResolutionInputs {
    /// Currently selected signal detection ids.
    pub selected_detection_ids: Vec<String>,
    /// All known hypotheses (to map a selected detection to its current
    /// hypothesis).
    pub hypotheses: Vec<SignalDetectionHypothesis>,
    /// Segment fingerprint → hypothesis id.
    pub segment_hypotheses: HashMap<SegmentId, String>,
    /// Hypothesis id → filter name → concrete definition.
    pub definitions_for_detections: HashMap<String, HashMap<String, FilterDefinition>>,
    /// Default filter-by-usage table: segment fingerprint → filter name →
    /// concrete definition.
    pub default_definitions_for_segments: HashMap<SegmentId, HashMap<String, FilterDefinition>>,
}

/// A named filter resolved to a concrete definition (or a concrete
/// assignment passed through).
#[derive(Debug, Clone)]
pub struct ResolvedFilter {
    /// The named-filter name, when the assignment was a named reference.
    pub named: Option<String>,
    pub definition: FilterDefinition,
}

impl ResolvedFilter {
    /// Composite fingerprint for the dedup cache.
    pub fn id(&self) -> FilterId {
        combined_filter_id(self.named.as_deref(), &self.definition.name)
    }
}

/// Resolve the filter to apply to one segment. `Ok(None)` means the
/// assignment is unfiltered and there is nothing to do.
///
/// Named references resolve in precedence order: the single selected
/// detection's hypothesis (raw channels only), then the
/// segment→hypothesis table, then the default filter-by-usage table keyed
/// by the segment's own fingerprint.
pub fn resolve_filter(
    segment: &ChannelSegment,
    channel_name: &str,
    assignment: &Filter,
    inputs: &ResolutionInputs,
) -> Result<Option<ResolvedFilter>, FilterError> {
    match &assignment.kind {
        FilterKind::Unfiltered => Ok(None),
        FilterKind::Concrete(definition) => Ok(Some(ResolvedFilter {
            named: None,
            definition: definition.clone(),
        })),
        FilterKind::Named(name) => {
            let segment_id = segment.id();
            let segment_is_raw = !segment.descriptor.channel.name.contains('/');

            let hypothesis_id = if inputs.selected_detection_ids.len() == 1 && segment_is_raw {
                inputs
                    .hypotheses
                    .iter()
                    .find(|h| h.detection_id == inputs.selected_detection_ids[0])
                    .map(|h| h.id.as_str())
            } else {
                inputs.segment_hypotheses.get(&segment_id).map(String::as_str)
            };

            let definition = match hypothesis_id {
                Some(hypothesis_id) => inputs
                    .definitions_for_detections
                    .get(hypothesis_id)
                    .and_then(|by_name| by_name.get(name)),
                None => inputs
                    .default_definitions_for_segments
                    .get(&segment_id)
                    .and_then(|by_name| by_name.get(name)),
            };

            match definition {
                Some(definition) => Ok(Some(ResolvedFilter {
                    named: Some(name.clone()),
                    definition: definition.clone(),
                })),
                None => Err(FilterError::Resolution {
                    filter_id: name.clone(),
                    channel: channel_name.to_string(),
                    segment_id,
                }),
            }
        }
    }
}

/// The incremental work discovered by one delta pass.
#[derive(Debug, Default)]
pub struct Delta {
    /// Shaped identically to the dedup cache, ready to merge.
    pub items: ProcessedItemsCache,
    /// Per-triple failures; the batch never aborts.
    pub errors: Vec<FilterError>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Compute the triples not yet present in `processed`.
pub fn compute_delta(
    assignments: &HashMap<ChannelName, Filter>,
    visible_segments: &HashMap<ChannelName, Vec<ChannelSegment>>,
    channels: &HashMap<ChannelName, Channel>,
    processed: &ProcessedItemsCache,
    inputs: &ResolutionInputs,
) -> Delta {
    let mut delta = Delta::default();

    for (channel_name, assignment) in assignments {
        if assignment.is_unfiltered() {
            continue;
        }
        let Some(segments) = visible_segments.get(channel_name) else {
            continue;
        };

        for segment in segments {
            let segment_id = segment.id();

            let resolved = match resolve_filter(segment, channel_name, assignment, inputs) {
                Ok(Some(resolved)) => resolved,
                Ok(None) => continue,
                Err(error) => {
                    delta.errors.push(error);
                    continue;
                }
            };
            let filter_id = resolved.id();

            if !channels.contains_key(&segment.descriptor.channel.name) {
                delta.errors.push(FilterError::ChannelLookup {
                    message: format!("no channel found for channel segment {segment_id}"),
                    filter_ids: vec![filter_id],
                    channel: channel_name.clone(),
                    segment_ids: Some(vec![segment_id]),
                });
                continue;
            }

            if processed
                .get(&filter_id)
                .and_then(|by_channel| by_channel.get(channel_name))
                .is_some_and(|ids| ids.contains(&segment_id))
            {
                continue;
            }

            delta
                .items
                .entry(filter_id)
                .or_default()
                .entry(channel_name.clone())
                .or_default()
                .insert(segment_id);
        }
    }

    delta
}

/// Mark the delta's triples claimed. Must happen before any of its work is
/// enqueued.
pub fn merge_delta(processed: &mut ProcessedItemsCache, delta: &ProcessedItemsCache) {
    for (filter_id, by_channel) in delta {
        let target = processed.entry(filter_id.clone()).or_default();
        for (channel_name, segment_ids) in by_channel {
            target
                .entry(channel_name.clone())
                .or_default()
                .extend(segment_ids.iter().cloned());
        }
    }
}

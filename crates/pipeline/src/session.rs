//! The filter session: input tracking, scheduling and job execution
//!
//! A [`FilterSession`] owns the pipeline state for one open interval: the
//! current filter assignments, visible segments, viewport order, resolution
//! inputs, the processed-items dedup cache and the design cache. Inputs
//! change only through [`FilterSession::notify`], and every notification
//! runs one scheduling pass: compute the delta, claim it, and enqueue one
//! job per (filter fingerprint, channel) pair. Jobs re-read session state
//! when they run, so a job scheduled against stale inputs still filters
//! with the freshest resolution available.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use seis_types::{Channel, ChannelName, ChannelSegment, Filter, FilterError, FilterId, SegmentId};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::apply::{apply_to_channel, ApplyRequest};
use crate::config::FilterParams;
use crate::delta::{compute_delta, merge_delta, resolve_filter, ProcessedItemsCache, ResolutionInputs};
use crate::design::{ensure_designed, merge_definitions, DefinitionCache};
use crate::engine::FilterEngine;
use crate::fallback::handle_filter_error;
use crate::queue::{OrderedPriorityQueue, QueueOptions};
use crate::store::StateStore;

/// Identity of the open interval a session is scoped to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionKey {
    pub interval_id: Uuid,
    /// Interval start in epoch seconds.
    pub start_time: f64,
}

impl SessionKey {
    pub fn new(start_time: f64) -> Self {
        Self {
            interval_id: Uuid::new_v4(),
            start_time,
        }
    }
}

/// One observed input change. The session reacts to nothing else.
#[derive(Debug, Clone)]
pub enum InputChange {
    /// The full per-channel filter assignment map.
    Assignments(HashMap<ChannelName, Filter>),
    /// The unfiltered segments currently loaded, per display row.
    VisibleSegments(HashMap<ChannelName, Vec<ChannelSegment>>),
    /// Display rows top to bottom; rows on screen are scheduled first.
    Viewport(Vec<ChannelName>),
    /// Named-filter resolution inputs.
    Resolution(ResolutionInputs),
    /// Raw channel metadata by name.
    Channels(HashMap<ChannelName, Channel>),
    /// A different interval was opened; all session-scoped state resets.
    Interval(SessionKey),
}

struct Shared {
    key: SessionKey,
    assignments: HashMap<ChannelName, Filter>,
    visible_segments: HashMap<ChannelName, Vec<ChannelSegment>>,
    viewport: Vec<ChannelName>,
    channels: HashMap<ChannelName, Channel>,
    resolution: ResolutionInputs,
    processed: ProcessedItemsCache,
    definitions: DefinitionCache,
}

/// The filter pipeline for one open interval.
pub struct FilterSession {
    shared: Arc<Mutex<Shared>>,
    queue: OrderedPriorityQueue<()>,
    engine: Arc<dyn FilterEngine>,
    store: Arc<dyn StateStore>,
    params: FilterParams,
}

/// Snapshot of one enqueued unit of work, fixed at schedule time.
struct JobSpec {
    filter_id: FilterId,
    channel_name: ChannelName,
    segment_ids: Vec<SegmentId>,
    priority: i64,
    tag: Option<String>,
}

impl FilterSession {
    pub fn new(
        key: SessionKey,
        engine: Arc<dyn FilterEngine>,
        store: Arc<dyn StateStore>,
        params: FilterParams,
    ) -> Self {
        let queue = OrderedPriorityQueue::with_concurrency(params.concurrency.max(1));
        Self {
            shared: Arc::new(Mutex::new(Shared {
                key,
                assignments: HashMap::new(),
                visible_segments: HashMap::new(),
                viewport: Vec::new(),
                channels: HashMap::new(),
                resolution: ResolutionInputs::default(),
                processed: ProcessedItemsCache::default(),
                definitions: DefinitionCache::default(),
            })),
            queue,
            engine,
            store,
            params,
        }
    }

    /// Apply one input change and run a scheduling pass.
    pub fn notify(&self, change: InputChange) {
        {
            let mut shared = self.shared.lock().unwrap();
            match change {
                InputChange::Assignments(assignments) => shared.assignments = assignments,
                InputChange::VisibleSegments(segments) => shared.visible_segments = segments,
                InputChange::Viewport(viewport) => shared.viewport = viewport,
                InputChange::Resolution(inputs) => shared.resolution = inputs,
                InputChange::Channels(channels) => shared.channels = channels,
                InputChange::Interval(key) => {
                    if key != shared.key {
                        info!(
                            interval = %key.interval_id,
                            start = key.start_time,
                            "interval changed, resetting session state"
                        );
                        shared.key = key;
                        shared.processed.clear();
                        self.queue.clear();
                    }
                }
            }
        }
        self.schedule();
    }

    /// Assign `filter` to every channel in `channel_names` and reschedule.
    pub fn set_filter_for_channels(&self, channel_names: &[ChannelName], filter: &Filter) {
        {
            let mut shared = self.shared.lock().unwrap();
            for name in channel_names {
                shared.assignments.insert(name.clone(), filter.clone());
                self.store.set_filter_for_channel(name, filter.clone());
            }
        }
        self.schedule();
    }

    /// Resolve until no scheduled work is pending or in flight.
    pub async fn settled(&self) {
        self.queue.idle().await;
    }

    /// One scheduling pass: delta, claim, enqueue.
    ///
    /// The delta is computed and merged under a single lock acquisition, so
    /// a concurrent pass can never claim the same triple.
    fn schedule(&self) {
        let (specs, boost) = {
            let mut shared = self.shared.lock().unwrap();
            let shared = &mut *shared;
            let delta = compute_delta(
                &shared.assignments,
                &shared.visible_segments,
                &shared.channels,
                &shared.processed,
                &shared.resolution,
            );
            for error in &delta.errors {
                handle_filter_error(
                    error,
                    &mut shared.processed,
                    &mut shared.assignments,
                    self.store.as_ref(),
                );
            }
            if delta.is_empty() {
                return;
            }
            merge_delta(&mut shared.processed, &delta.items);

            let mut specs = Vec::new();
            for (filter_id, by_channel) in &delta.items {
                for (channel_name, segment_ids) in by_channel {
                    let priority = shared
                        .viewport
                        .iter()
                        .position(|name| name == channel_name)
                        .map(|index| (shared.viewport.len() - index) as i64)
                        .unwrap_or(0);
                    let tag = shared
                        .assignments
                        .get(channel_name)
                        .and_then(|f| f.name())
                        .map(str::to_string);
                    specs.push(JobSpec {
                        filter_id: filter_id.clone(),
                        channel_name: channel_name.clone(),
                        segment_ids: segment_ids.iter().cloned().collect(),
                        priority,
                        tag,
                    });
                }
            }

            // The filter on the topmost visible row is what the analyst is
            // looking at; its pending work jumps the queue.
            let boost = shared
                .viewport
                .iter()
                .find_map(|name| shared.assignments.get(name).and_then(|f| f.name()))
                .map(str::to_string);
            (specs, boost)
        };

        if let Some(tag) = boost {
            self.queue.prioritize(&tag);
        }
        for spec in specs {
            let shared = Arc::clone(&self.shared);
            let engine = Arc::clone(&self.engine);
            let store = Arc::clone(&self.store);
            let params = self.params.clone();
            let options = QueueOptions {
                priority: spec.priority,
                tag: spec.tag.clone(),
            };
            debug!(
                filter = %spec.filter_id,
                channel = %spec.channel_name,
                segments = spec.segment_ids.len(),
                priority = spec.priority,
                "scheduling filter job"
            );
            let _handle = self.queue.add(
                async move {
                    run_job(spec, shared, engine.as_ref(), store.as_ref(), &params).await;
                },
                options,
            );
        }
    }
}

/// Execute one claimed (filter fingerprint, channel) unit of work.
async fn run_job(
    spec: JobSpec,
    shared: Arc<Mutex<Shared>>,
    engine: &dyn FilterEngine,
    store: &dyn StateStore,
    params: &FilterParams,
) {
    // Re-read session state: resolution inputs may have improved (or the
    // segments may have scrolled away) since the job was claimed.
    let (assignment, segments, resolution, channels) = {
        let shared = shared.lock().unwrap();
        let Some(assignment) = shared.assignments.get(&spec.channel_name).cloned() else {
            return;
        };
        let segments: Vec<ChannelSegment> = shared
            .visible_segments
            .get(&spec.channel_name)
            .map(|visible| {
                visible
                    .iter()
                    .filter(|s| spec.segment_ids.contains(&s.id()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        (
            assignment,
            segments,
            shared.resolution.clone(),
            shared.channels.clone(),
        )
    };
    if assignment.is_unfiltered() || segments.is_empty() {
        return;
    }

    // Re-resolve per segment, keeping only segments that still resolve to
    // this job's fingerprint.
    let mut resolved_filter = None;
    let mut kept = Vec::new();
    let mut errors = Vec::new();
    for segment in segments {
        match resolve_filter(&segment, &spec.channel_name, &assignment, &resolution) {
            Ok(Some(resolved)) if resolved.id() == spec.filter_id => {
                resolved_filter.get_or_insert(resolved);
                kept.push(segment);
            }
            Ok(_) => {
                // The assignment or resolution moved on; a later pass owns
                // this segment now.
                debug!(
                    filter = %spec.filter_id,
                    segment = %segment.id(),
                    "segment no longer resolves to this job"
                );
            }
            Err(error) => errors.push(error),
        }
    }
    report_errors(&errors, &shared, store);
    let Some(resolved) = resolved_filter else {
        return;
    };

    // Channel metadata for the segments' source channel.
    let source_name = kept[0].descriptor.channel.name.clone();
    let Some(channel) = channels.get(&source_name).cloned() else {
        let error = FilterError::ChannelLookup {
            message: format!("no channel found for {source_name}"),
            filter_ids: vec![spec.filter_id.clone()],
            channel: spec.channel_name.clone(),
            segment_ids: None,
        };
        report_errors(std::slice::from_ref(&error), &shared, store);
        return;
    };

    // Design any missing sample rates, then publish the new designs before
    // touching samples.
    let cache_snapshot = { shared.lock().unwrap().definitions.clone() };
    let outcome = ensure_designed(
        &resolved,
        &kept,
        &cache_snapshot,
        params,
        engine,
        &spec.channel_name,
        &spec.filter_id,
    )
    .await;
    let failed_segments: Vec<SegmentId> = outcome
        .errors
        .iter()
        .filter_map(|e| match e {
            FilterError::Design { segment_ids, .. } => Some(segment_ids.clone()),
            _ => None,
        })
        .flatten()
        .collect();
    report_errors(&outcome.errors, &shared, store);
    let cache = {
        let mut shared = shared.lock().unwrap();
        merge_definitions(
            &mut shared.definitions,
            &resolved.definition.name,
            outcome.new_definitions,
        );
        shared.definitions.clone()
    };
    let kept: Vec<ChannelSegment> = kept
        .into_iter()
        .filter(|s| !failed_segments.contains(&s.id()))
        .collect();
    if kept.is_empty() {
        return;
    }

    let filter_name = assignment.name().unwrap_or(&resolved.definition.name).to_string();
    let apply_outcome = apply_to_channel(
        ApplyRequest {
            channel: &channel,
            display_channel: &spec.channel_name,
            filter_name: &filter_name,
            filter_id: &spec.filter_id,
            resolved: &resolved,
            segments: &kept,
            cache: &cache,
        },
        engine,
        params,
    )
    .await;

    // Channels first so the segments always reference an existing derived
    // channel.
    if !apply_outcome.channels.is_empty() {
        store.add_filtered_channels(apply_outcome.channels);
    }
    if !apply_outcome.batches.is_empty() {
        store.add_filtered_channel_segments(apply_outcome.batches);
    }
    if !apply_outcome.errors.is_empty() {
        warn!(
            filter = %spec.filter_id,
            channel = %spec.channel_name,
            failed = apply_outcome.errors.len(),
            "apply pass had per-segment failures"
        );
        report_errors(&apply_outcome.errors, &shared, store);
    }
}

fn report_errors(errors: &[FilterError], shared: &Arc<Mutex<Shared>>, store: &dyn StateStore) {
    if errors.is_empty() {
        return;
    }
    let mut shared = shared.lock().unwrap();
    let shared = &mut *shared;
    for error in errors {
        handle_filter_error(error, &mut shared.processed, &mut shared.assignments, store);
    }
}

//! The application state store contract
//!
//! The pipeline never owns persisted state: successful work is published to
//! the surrounding application through [`StateStore`], and the fallback
//! handler flags errored assignments through the same surface. The
//! [`InMemoryStore`] implementation backs tests and embedding without a
//! full application around the pipeline.

use std::collections::HashMap;
use std::sync::Mutex;

use seis_types::{Channel, ChannelName, ChannelSegment, Filter, FilteredSegmentBatch};

/// Publish surface of the application state store.
pub trait StateStore: Send + Sync {
    /// Record newly created derived channels.
    fn add_filtered_channels(&self, channels: Vec<Channel>);

    /// Record newly filtered segments, slotted under their display row and
    /// filter name. Called once per apply batch, after
    /// [`StateStore::add_filtered_channels`].
    fn add_filtered_channel_segments(&self, batches: Vec<FilteredSegmentBatch>);

    /// Replace the filter assignment for a display row (used by the
    /// fallback handler to surface the errored flag).
    fn set_filter_for_channel(&self, channel: &str, filter: Filter);
}

#[derive(Default)]
struct StoreState {
    channels: HashMap<String, Channel>,
    /// (display row, filter name) -> segments.
    segments: HashMap<(ChannelName, String), Vec<ChannelSegment>>,
    assignments: HashMap<ChannelName, Filter>,
}

/// Mutex-backed store for tests and embedded use.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filtered_channel(&self, name: &str) -> Option<Channel> {
        self.state.lock().unwrap().channels.get(name).cloned()
    }

    pub fn filtered_channel_count(&self) -> usize {
        self.state.lock().unwrap().channels.len()
    }

    pub fn segments_for(&self, channel: &str, filter_name: &str) -> Vec<ChannelSegment> {
        self.state
            .lock()
            .unwrap()
            .segments
            .get(&(channel.to_string(), filter_name.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn assignment_for(&self, channel: &str) -> Option<Filter> {
        self.state.lock().unwrap().assignments.get(channel).cloned()
    }
}

impl StateStore for InMemoryStore {
    fn add_filtered_channels(&self, channels: Vec<Channel>) {
        let mut state = self.state.lock().unwrap();
        for channel in channels {
            state.channels.insert(channel.name.clone(), channel);
        }
    }

    fn add_filtered_channel_segments(&self, batches: Vec<FilteredSegmentBatch>) {
        let mut state = self.state.lock().unwrap();
        for batch in batches {
            state
                .segments
                .entry((batch.channel_name, batch.filter_name))
                .or_default()
                .extend(batch.segments);
        }
    }

    fn set_filter_for_channel(&self, channel: &str, filter: Filter) {
        self.state
            .lock()
            .unwrap()
            .assignments
            .insert(channel.to_string(), filter);
    }
}

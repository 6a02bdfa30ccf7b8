//! Filter definitions and per-channel filter assignments
//!
//! A `FilterDefinition` starts out undesigned (no parameters, no
//! coefficients) and is populated by the filter engine once per
//! (name, sample rate) pair. A `Filter` is what the analyst assigns to a
//! display row: unfiltered, a concrete definition, or a named reference
//! that is resolved to a concrete definition at use time.

use serde::{Deserialize, Serialize};

use crate::FilterId;

/// The band shape of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterType {
    LowPass,
    HighPass,
    BandPass,
    BandReject,
}

/// Design-time description of a filter, sufficient for the engine to
/// compute coefficients at any sample rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDescription {
    pub filter_type: FilterType,
    /// Low corner frequency in Hz (band filters and high pass).
    pub low_frequency_hz: Option<f64>,
    /// High corner frequency in Hz (band filters and low pass).
    pub high_frequency_hz: Option<f64>,
    pub order: u32,
    pub zero_phase: bool,
}

/// Parameters fixed when a definition is designed for a sample rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterParameters {
    pub sample_rate_hz: f64,
    pub sample_rate_tolerance_hz: f64,
    pub group_delay_sec: f64,
}

/// Designed coefficients in transfer-function form. `a[0]` is normalized
/// to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCoefficients {
    pub b: Vec<f64>,
    pub a: Vec<f64>,
}

/// A filter definition, designed or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDefinition {
    pub name: String,
    #[serde(default)]
    pub comments: Option<String>,
    pub description: FilterDescription,
    /// Populated by the engine's design operation.
    #[serde(default)]
    pub parameters: Option<FilterParameters>,
    /// Populated by the engine's design operation.
    #[serde(default)]
    pub coefficients: Option<FilterCoefficients>,
}

impl FilterDefinition {
    /// True once the engine has populated parameters and coefficients.
    pub fn is_designed(&self) -> bool {
        self.parameters.is_some() && self.coefficients.is_some()
    }
}

/// What a filter assignment points at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterKind {
    /// Show raw data; nothing to compute.
    Unfiltered,
    /// A concrete definition, usable directly.
    Concrete(FilterDefinition),
    /// A named reference resolved to a concrete definition at use time,
    /// possibly differently per segment.
    Named(String),
}

/// A per-channel filter assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub kind: FilterKind,
    /// Set (once) by the fallback handler when processing for this
    /// assignment failed; the display shows the previous data plus an
    /// error marker.
    #[serde(default)]
    pub errored: bool,
}

impl Filter {
    pub fn unfiltered() -> Self {
        Self {
            kind: FilterKind::Unfiltered,
            errored: false,
        }
    }

    pub fn concrete(definition: FilterDefinition) -> Self {
        Self {
            kind: FilterKind::Concrete(definition),
            errored: false,
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            kind: FilterKind::Named(name.into()),
            errored: false,
        }
    }

    pub fn is_unfiltered(&self) -> bool {
        matches!(self.kind, FilterKind::Unfiltered)
    }

    pub fn named_filter(&self) -> Option<&str> {
        match &self.kind {
            FilterKind::Named(name) => Some(name),
            _ => None,
        }
    }

    /// The display name of this assignment: the named-filter name if any,
    /// otherwise the concrete definition name.
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            FilterKind::Unfiltered => None,
            FilterKind::Concrete(def) => Some(&def.name),
            FilterKind::Named(name) => Some(name),
        }
    }
}

/// Composite fingerprint for a (named filter, resolved definition) pair.
///
/// Two named filters may resolve to the same definition, and one named
/// filter may resolve to different definitions per segment; keying work by
/// the combination keeps those cases distinct in the dedup cache.
pub fn combined_filter_id(named: Option<&str>, definition_name: &str) -> FilterId {
    match named {
        Some(name) => format!("{name}/{definition_name}"),
        None => definition_name.to_string(),
    }
}

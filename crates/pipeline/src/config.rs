//! Configuration for the filter processing pipeline

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// Processing parameters threaded through design and apply calls. Taper and
/// group delay are opaque to the pipeline; they are handed to the engine
/// unchanged.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FilterParams {
    /// Group delay in seconds applied at design time.
    pub group_delay_sec: f64,
    /// Allowed deviation between a segment's sample rate and the rate a
    /// definition was designed for.
    pub sample_rate_tolerance_hz: f64,
    /// Number of samples for the cosine taper at each end of a segment.
    pub taper: u32,
    /// Whether the engine should remove the filter's group delay.
    pub remove_group_delay: bool,
    /// Maximum number of in-flight filter jobs.
    pub concurrency: usize,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            group_delay_sec: 0.0,
            sample_rate_tolerance_hz: 1.0,
            taper: 0,
            remove_group_delay: false,
            concurrency: 4,
        }
    }
}

impl FilterParams {
    /// Parse and validate parameters from their JSON representation.
    pub fn from_json(json: &str) -> PipelineResult<Self> {
        let params: Self = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.concurrency == 0 {
            return Err(PipelineError::InvalidConfiguration {
                message: "concurrency must be at least 1".to_string(),
            });
        }
        if self.sample_rate_tolerance_hz < 0.0 {
            return Err(PipelineError::InvalidConfiguration {
                message: format!(
                    "sample rate tolerance must be non-negative, got {}",
                    self.sample_rate_tolerance_hz
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_from_json() {
        let json = r#"
        {
            "group_delay_sec": 0.5,
            "sample_rate_tolerance_hz": 1.0,
            "taper": 32,
            "remove_group_delay": true,
            "concurrency": 2
        }
        "#;
        let params = FilterParams::from_json(json).unwrap();
        assert_eq!(params.taper, 32);
        assert_eq!(params.concurrency, 2);
        assert!(params.remove_group_delay);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let params = FilterParams {
            concurrency: 0,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(PipelineError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn malformed_json_is_a_serialization_error() {
        assert!(matches!(
            FilterParams::from_json("{"),
            Err(PipelineError::SerializationError(_))
        ));
    }
}

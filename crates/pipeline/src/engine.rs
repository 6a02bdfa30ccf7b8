//! The native filter engine contract and a built-in biquad implementation
//!
//! The pipeline treats design and apply as pure async operations behind the
//! [`FilterEngine`] trait; these are the only suspension points in the
//! pipeline. [`BiquadEngine`] is a self-contained implementation used by
//! tests and by deployments without a native engine: cascaded Butterworth
//! biquad sections in Direct Form II Transposed.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use biquad::{
    Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type, Q_BUTTERWORTH_F64,
};
use seis_types::{FilterCoefficients, FilterDefinition, FilterType};

/// The design/apply contract consumed by the pipeline.
///
/// `design` receives a definition whose `parameters` carry the target
/// sample rate and must populate `coefficients`. `apply` filters one
/// segment's samples with an already designed definition. Both are treated
/// as pure functions of their inputs.
#[async_trait]
pub trait FilterEngine: Send + Sync {
    async fn design(&self, definition: FilterDefinition) -> Result<FilterDefinition>;

    async fn apply(
        &self,
        definition: &FilterDefinition,
        samples: &[f64],
        taper: u32,
        remove_group_delay: bool,
    ) -> Result<Vec<f64>>;
}

/// Built-in engine: Butterworth biquad cascade.
#[derive(Debug, Default, Clone)]
pub struct BiquadEngine;

impl BiquadEngine {
    /// Corner frequency and Q for a description, per band shape.
    fn corner_and_q(definition: &FilterDefinition) -> Result<(f64, f64, Type<f64>)> {
        let desc = &definition.description;
        match desc.filter_type {
            FilterType::LowPass => {
                let f0 = desc
                    .high_frequency_hz
                    .ok_or_else(|| anyhow!("low pass filter requires a high corner frequency"))?;
                Ok((f0, Q_BUTTERWORTH_F64, Type::LowPass))
            }
            FilterType::HighPass => {
                let f0 = desc
                    .low_frequency_hz
                    .ok_or_else(|| anyhow!("high pass filter requires a low corner frequency"))?;
                Ok((f0, Q_BUTTERWORTH_F64, Type::HighPass))
            }
            FilterType::BandPass | FilterType::BandReject => {
                let low = desc
                    .low_frequency_hz
                    .ok_or_else(|| anyhow!("band filter requires a low corner frequency"))?;
                let high = desc
                    .high_frequency_hz
                    .ok_or_else(|| anyhow!("band filter requires a high corner frequency"))?;
                if high <= low {
                    bail!("band filter corners are inverted: {low} >= {high}");
                }
                let f0 = (low * high).sqrt();
                let q = f0 / (high - low);
                let kind = if desc.filter_type == FilterType::BandPass {
                    Type::BandPass
                } else {
                    Type::Notch
                };
                Ok((f0, q, kind))
            }
        }
    }

    fn sections(definition: &FilterDefinition) -> usize {
        // One biquad per two poles.
        ((definition.description.order.max(1) + 1) / 2) as usize
    }

    fn run_cascade(definition: &FilterDefinition, input: &[f64]) -> Result<Vec<f64>> {
        let coefficients = definition
            .coefficients
            .as_ref()
            .ok_or_else(|| anyhow!("filter '{}' is not designed", definition.name))?;
        if coefficients.b.len() != 3 || coefficients.a.len() != 3 {
            bail!(
                "filter '{}' has malformed coefficients ({}b/{}a)",
                definition.name,
                coefficients.b.len(),
                coefficients.a.len()
            );
        }
        let biquad_coefficients = Coefficients::<f64> {
            b0: coefficients.b[0],
            b1: coefficients.b[1],
            b2: coefficients.b[2],
            a1: coefficients.a[1],
            a2: coefficients.a[2],
        };

        let mut output: Vec<f64> = input.to_vec();
        for _ in 0..Self::sections(definition) {
            let mut section = DirectForm2Transposed::<f64>::new(biquad_coefficients);
            for sample in output.iter_mut() {
                *sample = section.run(*sample);
            }
        }
        Ok(output)
    }

    fn cosine_taper(samples: &mut [f64], taper: usize) {
        let taper = taper.min(samples.len() / 2);
        let len = samples.len();
        for i in 0..taper {
            let w = 0.5 * (1.0 - (std::f64::consts::PI * i as f64 / taper as f64).cos());
            samples[i] *= w;
            samples[len - 1 - i] *= w;
        }
    }
}

#[async_trait]
impl FilterEngine for BiquadEngine {
    async fn design(&self, mut definition: FilterDefinition) -> Result<FilterDefinition> {
        let parameters = definition
            .parameters
            .as_ref()
            .ok_or_else(|| anyhow!("design called without parameters on '{}'", definition.name))?;
        let sample_rate_hz = parameters.sample_rate_hz;
        if sample_rate_hz <= 0.0 {
            bail!("invalid sample rate {sample_rate_hz} Hz for '{}'", definition.name);
        }

        let (f0, q, kind) = Self::corner_and_q(&definition)?;
        let designed = Coefficients::<f64>::from_params(kind, sample_rate_hz.hz(), f0.hz(), q)
            .map_err(|e| anyhow!("coefficient design failed: {e:?}"))
            .with_context(|| {
                format!(
                    "designing '{}' at {sample_rate_hz} Hz (corner {f0} Hz)",
                    definition.name
                )
            })?;

        definition.coefficients = Some(FilterCoefficients {
            b: vec![designed.b0, designed.b1, designed.b2],
            a: vec![1.0, designed.a1, designed.a2],
        });
        Ok(definition)
    }

    async fn apply(
        &self,
        definition: &FilterDefinition,
        samples: &[f64],
        taper: u32,
        remove_group_delay: bool,
    ) -> Result<Vec<f64>> {
        let mut input = samples.to_vec();
        Self::cosine_taper(&mut input, taper as usize);

        let mut output = Self::run_cascade(definition, &input)?;
        if definition.description.zero_phase {
            // Forward-backward pass cancels the phase response.
            output.reverse();
            output = Self::run_cascade(definition, &output)?;
            output.reverse();
        } else if remove_group_delay {
            let group_delay_sec = definition
                .parameters
                .as_ref()
                .map(|p| p.group_delay_sec)
                .unwrap_or(0.0);
            let sample_rate_hz = definition
                .parameters
                .as_ref()
                .map(|p| p.sample_rate_hz)
                .unwrap_or(0.0);
            let shift = (group_delay_sec * sample_rate_hz).round() as usize;
            if shift > 0 && shift < output.len() {
                output.rotate_left(shift);
            }
        }
        Ok(output)
    }
}

//! The compressive spatial summation forward model.
//!
//! A prediction is derived in five stages: a Gaussian receptive field weights the stimulus
//! pixels, the weighted intensities are summed per time point, the summed response is raised to
//! the compressive exponent `n`, the result is convolved with a hemodynamic kernel, and finally
//! the series is (optionally) normalised and scaled by the gain `beta`.

use std::f64::consts::PI;

use anyhow::bail;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use thiserror::Error;

use crate::fit::FitError;
use crate::hrf::HrfProvider;
use crate::params::{Parameter, ParameterVector};
use crate::stimulus::Stimulus;

/// Relative slack when comparing sigma against the pixel size, so that a sigma computed as
/// `1 / ppd` elsewhere is never rejected over rounding.
const PIXEL_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("{parameter} is not finite ({value})")]
    NonFinite { parameter: Parameter, value: f64 },

    #[error("sigma must be positive, got {0}")]
    NonPositiveSigma(f64),

    #[error("sigma {sigma} is narrower than one pixel ({pixel}°)")]
    SubPixelSigma { sigma: f64, pixel: f64 },

    #[error("compressive exponent must be positive, got {0}")]
    NonPositiveExponent(f64),

    #[error("receptive field at ({x}, {y}) with σ={sigma} lies entirely outside the stimulus")]
    OffGrid { x: f64, y: f64, sigma: f64 },

    #[error("cannot generate a hemodynamic kernel for delay {0}")]
    InvalidHrfDelay(f64),

    #[error("prediction has a zero baseline; percent signal change is undefined")]
    ZeroBaseline,
}

/// Post-convolution normalisation applied before the gain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Normalization {
    #[default]
    None,
    PercentChange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub hrf_delay: f64,
    /// Radius of the receptive field support, in multiples of sigma.
    pub support: f64,
    pub normalization: Normalization,
}
impl ModelConfig {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.hrf_delay.is_finite() {
            bail!("HRF delay must be finite");
        }
        const MIN_SUPPORT: f64 = 1.0;
        if !(self.support.is_finite() && self.support >= MIN_SUPPORT) {
            bail!("receptive field support cannot be less than {MIN_SUPPORT} sigma");
        }
        Ok(())
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            hrf_delay: 0.0,
            support: 5.0,
            normalization: Normalization::None,
        }
    }
}

/// Scratch buffers for a single prediction. Reusing a workspace across calls makes prediction
/// allocation-free.
#[derive(Debug, Clone, Default)]
pub struct Workspace {
    spatial: Vec<f64>,
    kernel: Vec<f64>,
    prediction: Vec<f64>,
}
impl Workspace {
    pub fn prediction(&self) -> &[f64] {
        &self.prediction
    }
}

/// Maps a [`ParameterVector`] to a predicted response time series for a fixed stimulus and
/// hemodynamic kernel provider.
#[derive(Debug)]
pub struct ForwardModel<'a, H: HrfProvider> {
    stimulus: &'a Stimulus,
    hrf: H,
    config: ModelConfig,
    kernel: Vec<f64>,
}
impl<'a, H: HrfProvider> ForwardModel<'a, H> {
    pub fn new(stimulus: &'a Stimulus, hrf: H, config: ModelConfig) -> Result<Self, FitError> {
        config.validate()?;
        let kernel = hrf.kernel(config.hrf_delay, stimulus.tr_length())?;
        Ok(Self {
            stimulus,
            hrf,
            config,
            kernel,
        })
    }

    pub fn stimulus(&self) -> &Stimulus {
        self.stimulus
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn kernel(&self) -> &[f64] {
        &self.kernel
    }

    pub fn timepoints(&self) -> usize {
        self.stimulus.timepoints()
    }

    pub fn workspace(&self) -> Workspace {
        let timepoints = self.timepoints();
        Workspace {
            spatial: vec![0.0; timepoints],
            kernel: Vec::with_capacity(self.kernel.len()),
            prediction: vec![0.0; timepoints],
        }
    }

    pub fn predict(&self, params: &ParameterVector) -> Result<Vec<f64>, ModelError> {
        let mut workspace = self.workspace();
        self.predict_into(params, &mut workspace)?;
        Ok(workspace.prediction)
    }

    /// Predicts into the workspace's prediction buffer, available via [`Workspace::prediction`].
    #[inline]
    pub fn predict_into(&self, params: &ParameterVector, workspace: &mut Workspace) -> Result<(), ModelError> {
        self.predict_with_delay(params, self.config.hrf_delay, workspace)
    }

    /// As [`predict_into`](Self::predict_into), but convolving with the kernel for `hrf_delay`
    /// rather than the configured one. The kernel is regenerated into the workspace unless the
    /// delay matches the configuration.
    pub fn predict_with_delay(
        &self,
        params: &ParameterVector,
        hrf_delay: f64,
        workspace: &mut Workspace,
    ) -> Result<(), ModelError> {
        let Workspace {
            spatial,
            kernel: scratch_kernel,
            prediction,
        } = workspace;
        spatial.resize(self.timepoints(), 0.0);
        prediction.resize(self.timepoints(), 0.0);

        self.spatial_into(params, spatial)?;
        let kernel = if hrf_delay.to_bits() == self.config.hrf_delay.to_bits() {
            &self.kernel
        } else {
            self.hrf
                .kernel_into(hrf_delay, self.stimulus.tr_length(), scratch_kernel)?;
            &*scratch_kernel
        };
        convolve_causal(spatial, kernel, prediction);

        if self.config.normalization == Normalization::PercentChange {
            percent_change(prediction)?;
        }
        for value in prediction.iter_mut() {
            *value *= params.beta;
        }
        Ok(())
    }

    /// The compressive spatial response, prior to hemodynamic convolution and gain.
    pub fn spatial_response(&self, params: &ParameterVector) -> Result<Vec<f64>, ModelError> {
        let mut spatial = vec![0.0; self.timepoints()];
        self.spatial_into(params, &mut spatial)?;
        Ok(spatial)
    }

    fn validate_params(&self, params: &ParameterVector) -> Result<(), ModelError> {
        for parameter in Parameter::iter() {
            let value = params[parameter];
            if !value.is_finite() {
                return Err(ModelError::NonFinite { parameter, value });
            }
        }
        if params.sigma <= 0.0 {
            return Err(ModelError::NonPositiveSigma(params.sigma));
        }
        let pixel = self.stimulus.degrees_per_pixel();
        if params.sigma < pixel * (1.0 - PIXEL_TOLERANCE) {
            return Err(ModelError::SubPixelSigma {
                sigma: params.sigma,
                pixel,
            });
        }
        if params.n <= 0.0 {
            return Err(ModelError::NonPositiveExponent(params.n));
        }
        Ok(())
    }

    fn spatial_into(&self, params: &ParameterVector, spatial: &mut [f64]) -> Result<(), ModelError> {
        self.validate_params(params)?;
        let stimulus = self.stimulus;
        let ParameterVector { x, y, sigma, n, .. } = *params;
        let off_grid = || ModelError::OffGrid { x, y, sigma };

        let radius = self.config.support * sigma;
        let (col_min, col_max) = pixel_span(
            stimulus.degrees_to_col(x - radius),
            stimulus.degrees_to_col(x + radius),
            stimulus.cols(),
        )
        .ok_or_else(off_grid)?;
        let (row_min, row_max) = pixel_span(
            stimulus.degrees_to_row(y + radius),
            stimulus.degrees_to_row(y - radius),
            stimulus.rows(),
        )
        .ok_or_else(off_grid)?;

        let variance = sigma.powi(2);
        let inv_two_variance = 1.0 / (2.0 * variance);
        let norm = 1.0 / (2.0 * PI * variance * stimulus.pixels_per_degree().powi(2));
        let radius_sq = radius.powi(2);

        spatial.fill(0.0);
        let mut covered = false;
        for row in row_min..=row_max {
            let dy = stimulus.row_to_degrees(row) - y;
            for col in col_min..=col_max {
                let dx = stimulus.col_to_degrees(col) - x;
                let distance_sq = dx * dx + dy * dy;
                if distance_sq > radius_sq {
                    continue;
                }
                covered = true;
                let weight = f64::exp(-distance_sq * inv_two_variance) * norm;
                for (response, &intensity) in spatial.iter_mut().zip(stimulus.series(row, col)) {
                    *response += weight * intensity;
                }
            }
        }
        if !covered {
            return Err(off_grid());
        }

        for response in spatial.iter_mut() {
            *response = f64::max(*response, 0.0).powf(n);
        }
        Ok(())
    }
}

/// The inclusive range of pixel indices whose centres lie within `[from, to]`, given in
/// fractional pixel coordinates, or `None` if no such pixel exists.
#[inline]
fn pixel_span(from: f64, to: f64, len: usize) -> Option<(usize, usize)> {
    let (first, last) = (from.ceil(), to.floor());
    if last < 0.0 || first > (len - 1) as f64 || first > last {
        return None;
    }
    Some((f64::max(first, 0.0) as usize, f64::min(last, (len - 1) as f64) as usize))
}

/// Convolves `signal` with `kernel`, keeping the first `output.len()` samples so that each output
/// sample depends only on the signal up to the same time point.
pub fn convolve_causal(signal: &[f64], kernel: &[f64], output: &mut [f64]) {
    debug_assert_eq!(signal.len(), output.len());
    for (t, value) in output.iter_mut().enumerate() {
        let taps = usize::min(t + 1, kernel.len());
        *value = (0..taps).map(|k| kernel[k] * signal[t - k]).sum();
    }
}

/// Rescales `series` in place to percent change about its mean.
pub fn percent_change(series: &mut [f64]) -> Result<(), ModelError> {
    let mean = series.iter().sum::<f64>() / series.len() as f64;
    if mean == 0.0 || !mean.is_finite() {
        return Err(ModelError::ZeroBaseline);
    }
    for value in series.iter_mut() {
        *value = (*value - mean) / mean * 100.0;
    }
    Ok(())
}

//! Two-stage fitting: an exhaustive coarse search yields a ballpark, which is refined locally
//! within bounds and then refined again under a second configuration as a consistency check.

use std::time::Duration;

use anyhow::bail;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use thiserror::Error;
use tracing::{debug, warn};

use crate::hrf::HrfProvider;
use crate::model::{ForwardModel, ModelError};
use crate::objective::Objective;
use crate::params::{Bound, GridAxis, GridSpec, Parameter, ParameterVector, PARAMETERS};
use crate::refine::{overloaded_fit, refine, ConvergenceError, OverloadedEstimate, RefineConfig, Refinement};
use crate::search::coarse_fit;
use crate::stimulus::Stimulus;
use crate::timed::Timed;

#[derive(Debug, Error)]
pub enum FitError {
    #[error("{0}")]
    ShapeMismatch(#[from] ShapeMismatch),

    #[error("{0}")]
    Model(#[from] ModelError),

    #[error("{0}")]
    Convergence(#[from] ConvergenceError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ValidationError),
}

impl From<anyhow::Error> for FitError {
    fn from(err: anyhow::Error) -> Self {
        FitError::InvalidConfig(err.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeMismatch {
    #[error("observed series has {actual} samples, but the stimulus has {expected} time points")]
    ObservedLength { expected: usize, actual: usize },

    #[error("search grid has {actual} axes, expected {expected}")]
    GridParameters { expected: usize, actual: usize },

    #[error("{actual} bounds supplied, expected {expected}")]
    BoundParameters { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct ValidationError(#[from] pub Box<dyn std::error::Error + Send + Sync>);

impl From<anyhow::Error> for ValidationError {
    fn from(value: anyhow::Error) -> Self {
        ValidationError(value.into())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitConfig {
    pub grid: GridSpec,
    /// Box constraints for the refinement, one per parameter in canonical order.
    pub bounds: Vec<Bound>,
    pub refine: RefineConfig,
    pub overloaded: RefineConfig,
    /// Largest elementwise difference between the refined and overloaded estimates that is not
    /// flagged as a divergence.
    pub divergence_tolerance: f64,
    /// Whether an unconverged refinement fails the fit rather than being flagged in the result.
    #[serde(default)]
    pub require_convergence: bool,
}
impl FitConfig {
    pub fn new(grid: GridSpec, bounds: Vec<Bound>) -> Self {
        Self {
            grid,
            bounds,
            refine: RefineConfig::default(),
            overloaded: RefineConfig::overloaded(),
            divergence_tolerance: 0.1,
            require_convergence: false,
        }
    }

    /// A configuration spanning the visual field of `stimulus`, with `resolution` points per axis.
    pub fn for_stimulus(stimulus: &Stimulus, resolution: usize) -> Self {
        let extent = stimulus.col_to_degrees(stimulus.cols() - 1);
        let pixel = stimulus.degrees_per_pixel();
        let grid = GridSpec {
            axes: vec![
                GridAxis::linear((-extent / 2.0, extent / 2.0)),
                GridAxis::linear((-extent / 2.0, extent / 2.0)),
                GridAxis::logarithmic((pixel, f64::max(pixel, extent / 4.0))),
                GridAxis::linear((0.1, 1.0)),
                GridAxis::logarithmic((0.01, 10.0)),
            ],
            resolution,
        };
        let bounds = vec![
            Bound::new(-extent, extent),
            Bound::new(-extent, extent),
            Bound::new(pixel, f64::max(pixel, extent)),
            Bound::new(1e-8, 1.0),
            Bound::new(1e-8, 1e5),
        ];
        Self::new(grid, bounds)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.grid.validate()?;
        for (parameter, bound) in Parameter::iter().zip(&self.bounds) {
            if let Err(err) = bound.validate() {
                bail!("bound for {parameter}: {err}");
            }
        }
        self.refine.validate()?;
        self.overloaded.validate()?;
        if self.refine == self.overloaded {
            bail!("overloaded configuration must differ from the primary refinement");
        }
        if !(self.divergence_tolerance >= 0.0) {
            bail!("divergence tolerance must be non-negative");
        }
        Ok(())
    }

    fn check_shapes(&self) -> Result<(), ShapeMismatch> {
        if self.grid.axes.len() != PARAMETERS {
            return Err(ShapeMismatch::GridParameters {
                expected: PARAMETERS,
                actual: self.grid.axes.len(),
            });
        }
        if self.bounds.len() != PARAMETERS {
            return Err(ShapeMismatch::BoundParameters {
                expected: PARAMETERS,
                actual: self.bounds.len(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageTimings {
    pub coarse: Duration,
    pub refine: Duration,
    pub overloaded: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitResult {
    pub ballpark: ParameterVector,
    pub ballpark_cost: f64,
    pub grid_evaluations: u64,
    pub refinement: Refinement,
    pub overloaded: OverloadedEstimate,
    /// The parameter at which the refined and overloaded estimates differ most, and by how much.
    pub divergence: (Parameter, f64),
    pub diverged: bool,
    /// Coefficient of determination of the refined prediction.
    pub rsquared: f64,
    pub timings: StageTimings,
}
impl FitResult {
    pub fn estimate(&self) -> &ParameterVector {
        &self.refinement.estimate
    }

    pub fn x(&self) -> f64 {
        self.refinement.estimate.x
    }

    pub fn y(&self) -> f64 {
        self.refinement.estimate.y
    }

    pub fn sigma(&self) -> f64 {
        self.refinement.estimate.sigma
    }

    pub fn n(&self) -> f64 {
        self.refinement.estimate.n
    }

    pub fn beta(&self) -> f64 {
        self.refinement.estimate.beta
    }

    pub fn cost(&self) -> f64 {
        self.refinement.cost
    }

    pub fn converged(&self) -> bool {
        self.refinement.converged
    }

    pub fn ballpark(&self) -> &ParameterVector {
        &self.ballpark
    }

    /// The overloaded estimate as `[theta, rho, sigma / √n, n, beta]`.
    pub fn overloaded_estimate(&self) -> [f64; PARAMETERS] {
        self.overloaded.to_array()
    }
}

/// Fits `observed` against `model`. Shapes are validated before any objective evaluation.
pub fn fit<H: HrfProvider>(
    model: &ForwardModel<H>,
    observed: &[f64],
    config: &FitConfig,
) -> Result<FitResult, FitError> {
    let objective = Objective::new(model, observed)?;
    config.check_shapes()?;
    config.validate()?;

    let coarse = Timed::result(|| coarse_fit(&objective, &config.grid))?;
    debug!(
        "coarse stage: ballpark {} with cost {:.6}",
        coarse.value.ballpark, coarse.value.cost
    );

    let refined = Timed::result(|| refine(&objective, &coarse.value.ballpark, &config.bounds, &config.refine))?;
    if config.require_convergence {
        refined.value.check()?;
    }
    debug!(
        "refine stage: estimate {} with cost {:.6}",
        refined.value.estimate, refined.value.cost
    );

    let overloaded = Timed::result(|| {
        overloaded_fit(&objective, &coarse.value.ballpark, &config.bounds, &config.overloaded)
    })?;

    let divergence = refined.value.estimate.max_abs_diff(&overloaded.value.cartesian());
    let diverged = divergence.1 > config.divergence_tolerance;
    if diverged {
        warn!(
            "refined and overloaded estimates diverge by {:.6} in {}",
            divergence.1, divergence.0
        );
    } else {
        debug!("estimates agree within {:.6}", divergence.1);
    }

    let rsquared = objective
        .rsquared(&refined.value.estimate)
        .unwrap_or(f64::NEG_INFINITY);

    Ok(FitResult {
        ballpark: coarse.value.ballpark,
        ballpark_cost: coarse.value.cost,
        grid_evaluations: coarse.value.evaluations,
        refinement: refined.value,
        overloaded: overloaded.value,
        divergence,
        diverged,
        rsquared,
        timings: StageTimings {
            coarse: coarse.elapsed,
            refine: refined.elapsed,
            overloaded: overloaded.elapsed,
        },
    })
}

#[cfg(test)]
mod tests;

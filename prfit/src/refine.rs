//! Bounded local refinement of a ballpark estimate, and the overloaded estimator that repeats the
//! refinement under a different parameterisation as a consistency check.

use std::f64::consts::PI;

use anyhow::bail;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::fit::{FitError, ShapeMismatch};
use crate::hrf::HrfProvider;
use crate::objective::{check_bounds, Objective, PENALTY};
use crate::opt::{coordinate_descent, nelder_mead, CoordinateDescentConfig, SimplexConfig};
use crate::params::{Bound, ParameterVector, PARAMETERS};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RefineStrategy {
    Simplex(SimplexConfig),
    Coordinate(CoordinateDescentConfig),
}
impl RefineStrategy {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        match self {
            RefineStrategy::Simplex(config) => config.validate(),
            RefineStrategy::Coordinate(config) => config.validate(),
        }
    }
}

impl Default for RefineStrategy {
    fn default() -> Self {
        Self::Simplex(SimplexConfig::default())
    }
}

/// The coordinates in which the optimiser moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Parameterization {
    /// `(x, y, sigma, n, beta)`
    #[default]
    Cartesian,
    /// `(theta, rho, sigma, n, beta)`, with `theta` in radians.
    Polar,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RefineConfig {
    pub strategy: RefineStrategy,
    pub parameterization: Parameterization,
    /// When present, the HRF delay is fitted jointly, within this bound, as a sixth parameter.
    pub hrf_delay: Option<Bound>,
}
impl RefineConfig {
    /// Nelder–Mead in polar coordinates.
    pub fn overloaded() -> Self {
        Self {
            strategy: RefineStrategy::default(),
            parameterization: Parameterization::Polar,
            hrf_delay: None,
        }
    }

    pub fn with_hrf_delay(self, bound: impl Into<Bound>) -> Self {
        Self {
            hrf_delay: Some(bound.into()),
            ..self
        }
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.strategy.validate()?;
        if let Some(bound) = &self.hrf_delay {
            bound.validate()?;
            if bound.range() == 0.0 {
                bail!("HRF delay bound {bound} must have a positive range");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("refinement did not converge within {steps} steps; best cost {cost} at {last}")]
pub struct ConvergenceError {
    pub steps: u64,
    pub cost: f64,
    pub last: ParameterVector,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Refinement {
    /// The best iterate found, always within the bounds.
    pub estimate: ParameterVector,
    /// The fitted HRF delay, if the delay was fitted jointly.
    pub hrf_delay: Option<f64>,
    pub cost: f64,
    pub steps: u64,
    pub converged: bool,
}
impl Refinement {
    pub fn check(&self) -> Result<(), ConvergenceError> {
        if self.converged {
            Ok(())
        } else {
            Err(ConvergenceError {
                steps: self.steps,
                cost: self.cost,
                last: self.estimate,
            })
        }
    }
}

/// Maps parameter vectors (and optionally the HRF delay) to and from the optimiser's coordinates.
#[derive(Debug, Clone, Copy)]
struct Encoding {
    parameterization: Parameterization,
    fit_delay: bool,
}
impl Encoding {
    fn encode(&self, params: &ParameterVector, hrf_delay: Option<f64>) -> Vec<f64> {
        let mut values = match self.parameterization {
            Parameterization::Cartesian => params.to_array().to_vec(),
            Parameterization::Polar => vec![params.theta(), params.rho(), params.sigma, params.n, params.beta],
        };
        if let Some(hrf_delay) = hrf_delay {
            values.push(hrf_delay);
        }
        values
    }

    fn decode(&self, values: &[f64]) -> (ParameterVector, Option<f64>) {
        let params = match self.parameterization {
            Parameterization::Cartesian => ParameterVector::new(values[0], values[1], values[2], values[3], values[4]),
            Parameterization::Polar => ParameterVector::from_polar(values[0], values[1], values[2], values[3], values[4]),
        };
        let hrf_delay = self.fit_delay.then(|| values[PARAMETERS]);
        (params, hrf_delay)
    }

    /// Whether `values` are acceptable coordinates, irrespective of the parameter bounds.
    fn admissible(&self, values: &[f64]) -> bool {
        match self.parameterization {
            Parameterization::Cartesian => true,
            Parameterization::Polar => values[1] >= 0.0,
        }
    }
}

/// Refines `ballpark` within the box `bounds` (one per parameter, in canonical order). The ballpark
/// is clamped into the box before the search begins.
pub fn refine<H: HrfProvider>(
    objective: &Objective<H>,
    ballpark: &ParameterVector,
    bounds: &[Bound],
    config: &RefineConfig,
) -> Result<Refinement, FitError> {
    if bounds.len() != PARAMETERS {
        return Err(ShapeMismatch::BoundParameters {
            expected: PARAMETERS,
            actual: bounds.len(),
        }
        .into());
    }
    for bound in bounds {
        bound.validate()?;
    }
    config.validate()?;

    let mut start = *ballpark;
    for (value, bound) in [&mut start.x, &mut start.y, &mut start.sigma, &mut start.n, &mut start.beta]
        .into_iter()
        .zip(bounds)
    {
        *value = bound.clamp(*value);
    }
    let start_delay = config
        .hrf_delay
        .map(|bound| bound.clamp(objective.model().config().hrf_delay));

    let encoding = Encoding {
        parameterization: config.parameterization,
        fit_delay: config.hrf_delay.is_some(),
    };
    let init_values = encoding.encode(&start, start_delay);
    let delay_admissible = |hrf_delay: Option<f64>| match (config.hrf_delay, hrf_delay) {
        (Some(bound), Some(hrf_delay)) => bound.contains(hrf_delay),
        _ => true,
    };

    let mut workspace = objective.workspace();
    let loss_f = |values: &[f64]| {
        if !encoding.admissible(values) {
            return PENALTY;
        }
        let (params, hrf_delay) = encoding.decode(values);
        if !delay_admissible(hrf_delay) {
            return PENALTY;
        }
        objective.penalised_cost(&params, hrf_delay, Some(bounds), &mut workspace)
    };
    let constraint_f = |values: &[f64]| {
        let (params, hrf_delay) = encoding.decode(values);
        encoding.admissible(values) && delay_admissible(hrf_delay) && check_bounds(&params, bounds).is_ok()
    };

    let (values, mut cost, steps, converged) = match &config.strategy {
        RefineStrategy::Simplex(simplex_config) => {
            let outcome = nelder_mead(simplex_config, &init_values, constraint_f, loss_f)?;
            (outcome.optimal_values, outcome.optimal_residual, outcome.steps, outcome.converged)
        }
        RefineStrategy::Coordinate(coordinate_config) => {
            let outcome = coordinate_descent(coordinate_config, &init_values, loss_f)?;
            (outcome.optimal_values, outcome.optimal_residual, outcome.steps, outcome.converged)
        }
    };

    let (mut estimate, mut hrf_delay) = encoding.decode(&values);
    if check_bounds(&estimate, bounds).is_err() || !delay_admissible(hrf_delay) {
        // every iterate was penalised; the clamped start is the best admissible point known
        estimate = start;
        hrf_delay = start_delay;
        cost = f64::min(cost, PENALTY);
    }

    if converged {
        debug!("refined to {estimate} with cost {cost:.6} after {steps} steps");
    } else {
        warn!("refinement stopped after {steps} steps without converging; best {estimate} with cost {cost:.6}");
    }
    Ok(Refinement {
        estimate,
        hrf_delay,
        cost,
        steps,
        converged,
    })
}

/// An estimate reported in polar form: polar angle, eccentricity, effective size under
/// compressive summation, exponent and gain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverloadedEstimate {
    pub theta: f64,
    pub rho: f64,
    pub effective_sigma: f64,
    pub n: f64,
    pub beta: f64,
    pub hrf_delay: Option<f64>,
    pub cost: f64,
    pub steps: u64,
    pub converged: bool,
}
impl OverloadedEstimate {
    pub fn to_array(&self) -> [f64; PARAMETERS] {
        [self.theta, self.rho, self.effective_sigma, self.n, self.beta]
    }

    /// The estimate in the cartesian parameterisation.
    pub fn cartesian(&self) -> ParameterVector {
        ParameterVector::from_polar(
            self.theta,
            self.rho,
            self.effective_sigma * self.n.sqrt(),
            self.n,
            self.beta,
        )
    }
}

impl From<&Refinement> for OverloadedEstimate {
    fn from(refinement: &Refinement) -> Self {
        let estimate = &refinement.estimate;
        Self {
            theta: normalise_angle(estimate.theta()),
            rho: estimate.rho(),
            effective_sigma: estimate.effective_sigma(),
            n: estimate.n,
            beta: estimate.beta,
            hrf_delay: refinement.hrf_delay,
            cost: refinement.cost,
            steps: refinement.steps,
            converged: refinement.converged,
        }
    }
}

/// Refines the same ballpark under `config`, which should differ from the primary refinement's,
/// and reports the result in polar form.
pub fn overloaded_fit<H: HrfProvider>(
    objective: &Objective<H>,
    ballpark: &ParameterVector,
    bounds: &[Bound],
    config: &RefineConfig,
) -> Result<OverloadedEstimate, FitError> {
    let refinement = refine(objective, ballpark, bounds, config)?;
    let overloaded = OverloadedEstimate::from(&refinement);
    debug!(
        "overloaded (θ: {:.3}, ρ: {:.3}, σ/√n: {:.4}, n: {:.3}, β: {:.3})",
        overloaded.theta, overloaded.rho, overloaded.effective_sigma, overloaded.n, overloaded.beta
    );
    Ok(overloaded)
}

/// Maps an angle into `(-π, π]`.
#[inline]
fn normalise_angle(theta: f64) -> f64 {
    if theta <= -PI {
        theta + 2.0 * PI
    } else {
        theta
    }
}

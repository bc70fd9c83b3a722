//! Exhaustive coarse search for a ballpark estimate.

use std::time::Instant;

use tracing::debug;

use crate::fit::{FitError, ShapeMismatch};
use crate::hrf::HrfProvider;
use crate::objective::Objective;
use crate::opt::{hypergrid_search, HypergridSearchConfig};
use crate::params::{GridSpec, ParameterVector, PARAMETERS};

#[derive(Debug, Clone, PartialEq)]
pub struct CoarseFit {
    pub ballpark: ParameterVector,
    pub cost: f64,
    pub evaluations: u64,
}

/// Evaluates the objective at every point of `grid` and returns the first point attaining the
/// least cost. Points at which the model is degenerate cost [`PENALTY`](crate::objective::PENALTY)
/// but are still enumerated.
pub fn coarse_fit<H: HrfProvider>(objective: &Objective<H>, grid: &GridSpec) -> Result<CoarseFit, FitError> {
    if grid.axes.len() != PARAMETERS {
        return Err(ShapeMismatch::GridParameters {
            expected: PARAMETERS,
            actual: grid.axes.len(),
        }
        .into());
    }
    grid.validate()?;

    let start_time = Instant::now();
    let mut workspace = objective.workspace();
    let config = HypergridSearchConfig {
        axes: &grid.axes,
        resolution: grid.resolution,
    };
    let outcome = hypergrid_search(&config, |_| true, |values| {
        let params = ParameterVector::new(values[0], values[1], values[2], values[3], values[4]);
        objective.penalised_cost(&params, None, None, &mut workspace)
    })?;

    let ballpark = ParameterVector::new(
        outcome.optimal_values[0],
        outcome.optimal_values[1],
        outcome.optimal_values[2],
        outcome.optimal_values[3],
        outcome.optimal_values[4],
    );
    debug!(
        "ballpark {ballpark} with cost {:.6} after {} evaluations, took {:?}",
        outcome.optimal_residual,
        outcome.steps,
        start_time.elapsed()
    );
    Ok(CoarseFit {
        ballpark,
        cost: outcome.optimal_residual,
        evaluations: outcome.steps,
    })
}

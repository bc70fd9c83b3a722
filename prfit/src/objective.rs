//! Squared-error objective over the forward model.

use strum::IntoEnumIterator;
use thiserror::Error;
use tracing::trace;

use crate::fit::ShapeMismatch;
use crate::hrf::HrfProvider;
use crate::model::{ForwardModel, ModelError, Workspace};
use crate::params::{Bound, Parameter, ParameterVector};

/// Cost assigned to candidates that cannot be evaluated: out-of-bounds points and points for
/// which the forward model is degenerate. Finite, so that optimisers can still rank it.
pub const PENALTY: f64 = 1e100;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{parameter} = {value} lies outside {bound}")]
pub struct BoundViolation {
    pub parameter: Parameter,
    pub value: f64,
    pub bound: Bound,
}

/// Checks every parameter against its bound, in canonical order.
pub fn check_bounds(params: &ParameterVector, bounds: &[Bound]) -> Result<(), BoundViolation> {
    debug_assert_eq!(bounds.len(), Parameter::iter().count());
    for (parameter, bound) in Parameter::iter().zip(bounds) {
        let value = params[parameter];
        if !bound.contains(value) {
            return Err(BoundViolation {
                parameter,
                value,
                bound: *bound,
            });
        }
    }
    Ok(())
}

/// Sum of squared residuals between a model prediction and an observed series.
#[derive(Debug)]
pub struct Objective<'a, H: HrfProvider> {
    model: &'a ForwardModel<'a, H>,
    observed: &'a [f64],
}
impl<'a, H: HrfProvider> Objective<'a, H> {
    pub fn new(model: &'a ForwardModel<'a, H>, observed: &'a [f64]) -> Result<Self, ShapeMismatch> {
        if observed.len() != model.timepoints() {
            return Err(ShapeMismatch::ObservedLength {
                expected: model.timepoints(),
                actual: observed.len(),
            });
        }
        Ok(Self { model, observed })
    }

    pub fn model(&self) -> &ForwardModel<'a, H> {
        self.model
    }

    pub fn observed(&self) -> &[f64] {
        self.observed
    }

    pub fn workspace(&self) -> Workspace {
        self.model.workspace()
    }

    /// The sum of squared residuals at `params`, surfacing model errors.
    pub fn cost(&self, params: &ParameterVector) -> Result<f64, ModelError> {
        let mut workspace = self.workspace();
        self.model.predict_into(params, &mut workspace)?;
        Ok(self.residual_sum_sq(workspace.prediction()))
    }

    /// The sum of squared residuals at `params`, or [`PENALTY`] if `params` violates `bounds`,
    /// the model is degenerate, or the cost is not finite. `hrf_delay` overrides the model's
    /// configured delay when present.
    pub fn penalised_cost(
        &self,
        params: &ParameterVector,
        hrf_delay: Option<f64>,
        bounds: Option<&[Bound]>,
        workspace: &mut Workspace,
    ) -> f64 {
        if let Some(bounds) = bounds {
            if let Err(violation) = check_bounds(params, bounds) {
                trace!("penalising: {violation}");
                return PENALTY;
            }
        }
        let hrf_delay = hrf_delay.unwrap_or(self.model.config().hrf_delay);
        if let Err(err) = self.model.predict_with_delay(params, hrf_delay, workspace) {
            trace!("penalising {params}: {err}");
            return PENALTY;
        }
        let cost = self.residual_sum_sq(workspace.prediction());
        if cost.is_finite() {
            f64::min(cost, PENALTY)
        } else {
            PENALTY
        }
    }

    /// Coefficient of determination of the prediction at `params`.
    pub fn rsquared(&self, params: &ParameterVector) -> Result<f64, ModelError> {
        let residual = self.cost(params)?;
        let mean = self.observed.iter().sum::<f64>() / self.observed.len() as f64;
        let total: f64 = self.observed.iter().map(|value| (value - mean).powi(2)).sum();
        Ok(if total == 0.0 {
            if residual == 0.0 {
                1.0
            } else {
                f64::NEG_INFINITY
            }
        } else {
            1.0 - residual / total
        })
    }

    #[inline]
    fn residual_sum_sq(&self, prediction: &[f64]) -> f64 {
        prediction
            .iter()
            .zip(self.observed)
            .map(|(predicted, observed)| (predicted - observed).powi(2))
            .sum()
    }
}

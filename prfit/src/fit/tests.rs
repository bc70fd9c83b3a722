use super::*;
use crate::hrf::{DoubleGamma, Impulse};
use crate::model::ModelConfig;
use crate::opt::SimplexConfig;
use crate::refine::RefineStrategy;
use crate::testing::{
    reference_bounds, reference_grid, reference_params, reference_stimulus, resampled_reference_stimulus, short_stimulus,
};
use assert_float_eq::*;
use prfit_testing::assert_slice_f64_relative;

fn reference_config() -> ModelConfig {
    ModelConfig {
        hrf_delay: 0.2,
        ..ModelConfig::default()
    }
}

#[test]
fn reference_fixture() {
    let stimulus = reference_stimulus();
    let model = ForwardModel::new(&stimulus, DoubleGamma::default(), reference_config()).unwrap();
    let observed = model.predict(&reference_params()).unwrap();
    let config = FitConfig::new(reference_grid(&stimulus), reference_bounds(&stimulus));

    let result = fit(&model, &observed, &config).unwrap();
    assert_eq!(243, result.grid_evaluations);
    assert!(result.cost() <= result.ballpark_cost);

    assert_float_absolute_eq!(-2.24, result.x(), 0.01);
    assert_float_absolute_eq!(1.58, result.y(), 0.01);
    assert_float_absolute_eq!(1.23, result.sigma(), 0.01);
    assert_float_absolute_eq!(0.90, result.n(), 0.01);
    assert_float_absolute_eq!(1.0, result.beta(), 0.01);
    assert!(result.rsquared > 0.99, "R² = {}", result.rsquared);

    assert_slice_f64_relative(&[2.527, 2.741, 1.2965, 0.9, 1.0], &result.overloaded_estimate(), 0.005);
}

#[test]
fn resampled_reference_fixture() {
    let stimulus = resampled_reference_stimulus();
    let model = ForwardModel::new(&stimulus, DoubleGamma::default(), reference_config()).unwrap();
    let observed = model.predict(&reference_params()).unwrap();
    let config = FitConfig::new(reference_grid(&stimulus), reference_bounds(&stimulus));

    let result = fit(&model, &observed, &config).unwrap();
    assert_eq!(243, result.grid_evaluations);

    // (-0.5, 2.0) and (2.0, -0.5) tie exactly, sharing the single grid cell in reach; the first
    // in enumeration order is kept
    let pixel = stimulus.degrees_per_pixel();
    assert_float_absolute_eq!(0.72833938, pixel, 1e-6);
    assert_slice_f64_relative(&[-0.5, 2.0, pixel, 0.5, 1.0], &result.ballpark().to_array(), 1e-9);
    assert!(result.ballpark_cost < 0.01, "ballpark cost {}", result.ballpark_cost);

    assert!(result.cost() <= result.ballpark_cost);
    assert!(result.sigma() >= pixel * (1.0 - 1e-9));
    for (parameter, bound) in Parameter::iter().zip(&config.bounds) {
        assert!(bound.contains(result.estimate()[parameter]), "{parameter} outside {bound}");
    }
}

#[test]
fn fit_is_deterministic() {
    let stimulus = short_stimulus();
    let model = ForwardModel::new(&stimulus, Impulse, ModelConfig::default()).unwrap();
    let observed = model.predict(&reference_params()).unwrap();
    let config = FitConfig::new(reference_grid(&stimulus), reference_bounds(&stimulus));

    let first = fit(&model, &observed, &config).unwrap();
    let second = fit(&model, &observed, &config).unwrap();
    assert_eq!(first.ballpark, second.ballpark);
    assert_eq!(first.refinement, second.refinement);
    assert_eq!(first.overloaded, second.overloaded);
    assert_eq!(first.divergence, second.divergence);
}

#[test]
fn observed_length_mismatch_is_fatal() {
    let stimulus = short_stimulus();
    let model = ForwardModel::new(&stimulus, Impulse, ModelConfig::default()).unwrap();
    let observed = vec![0.0; stimulus.timepoints() - 1];
    let config = FitConfig::new(reference_grid(&stimulus), reference_bounds(&stimulus));
    assert!(matches!(
        fit(&model, &observed, &config),
        Err(FitError::ShapeMismatch(ShapeMismatch::ObservedLength { .. }))
    ));
}

#[test]
fn config_shape_mismatch_is_fatal() {
    let stimulus = short_stimulus();
    let model = ForwardModel::new(&stimulus, Impulse, ModelConfig::default()).unwrap();
    let observed = model.predict(&reference_params()).unwrap();

    let mut config = FitConfig::new(reference_grid(&stimulus), reference_bounds(&stimulus));
    config.grid.axes.pop();
    assert!(matches!(
        fit(&model, &observed, &config),
        Err(FitError::ShapeMismatch(ShapeMismatch::GridParameters { expected: 5, actual: 4 }))
    ));

    let mut config = FitConfig::new(reference_grid(&stimulus), reference_bounds(&stimulus));
    config.bounds.push(Bound::new(0.0, 1.0));
    assert!(matches!(
        fit(&model, &observed, &config),
        Err(FitError::ShapeMismatch(ShapeMismatch::BoundParameters { expected: 5, actual: 6 }))
    ));
}

#[test]
fn invalid_config_is_fatal() {
    let stimulus = short_stimulus();
    let model = ForwardModel::new(&stimulus, Impulse, ModelConfig::default()).unwrap();
    let observed = model.predict(&reference_params()).unwrap();

    let mut config = FitConfig::new(reference_grid(&stimulus), reference_bounds(&stimulus));
    config.overloaded = config.refine.clone();
    assert!(matches!(fit(&model, &observed, &config), Err(FitError::InvalidConfig(_))));

    let mut config = FitConfig::new(reference_grid(&stimulus), reference_bounds(&stimulus));
    config.divergence_tolerance = -1.0;
    assert!(matches!(fit(&model, &observed, &config), Err(FitError::InvalidConfig(_))));
}

#[test]
fn estimate_respects_bounds() {
    let stimulus = short_stimulus();
    let model = ForwardModel::new(&stimulus, Impulse, ModelConfig::default()).unwrap();
    let truth = ParameterVector { beta: 2.0, ..reference_params() };
    let observed = model.predict(&truth).unwrap();
    let mut bounds = reference_bounds(&stimulus);
    bounds[usize::from(Parameter::Beta)] = Bound::new(1e-8, 1.0);
    let config = FitConfig::new(reference_grid(&stimulus), bounds.clone());

    let result = fit(&model, &observed, &config).unwrap();
    assert!(result.beta() <= 1.0, "{}", result.estimate());
    for (parameter, bound) in Parameter::iter().zip(&bounds) {
        assert!(bound.contains(result.estimate()[parameter]), "{parameter} outside {bound}");
    }
}

#[test]
fn non_convergence_is_flagged_or_fatal() {
    let stimulus = short_stimulus();
    let model = ForwardModel::new(&stimulus, Impulse, ModelConfig::default()).unwrap();
    let observed = model.predict(&reference_params()).unwrap();
    let mut config = FitConfig::new(reference_grid(&stimulus), reference_bounds(&stimulus));
    config.refine.strategy = RefineStrategy::Simplex(SimplexConfig {
        max_steps: 2,
        ..SimplexConfig::default()
    });

    let result = fit(&model, &observed, &config).unwrap();
    assert!(!result.converged());
    assert_eq!(2, result.refinement.steps);

    config.require_convergence = true;
    assert!(matches!(
        fit(&model, &observed, &config),
        Err(FitError::Convergence(ConvergenceError { steps: 2, .. }))
    ));
}

#[test]
fn degenerate_grid_points_are_not_fatal() {
    let stimulus = short_stimulus();
    let model = ForwardModel::new(&stimulus, Impulse, ModelConfig::default()).unwrap();
    let observed = model.predict(&reference_params()).unwrap();
    let mut grid = reference_grid(&stimulus);
    // the lowest sigma is degenerate
    grid.axes[usize::from(Parameter::Sigma)] = GridAxis::from((0.0, 2.75));
    let config = FitConfig::new(grid, reference_bounds(&stimulus));

    let result = fit(&model, &observed, &config).unwrap();
    assert!(result.ballpark_cost.is_finite());
    assert!(result.ballpark.sigma > 0.0);
    assert!(result.cost().is_finite());
}

#[test]
fn stimulus_defaults_are_valid() {
    for stimulus in [reference_stimulus(), resampled_reference_stimulus()] {
        let config = FitConfig::for_stimulus(&stimulus, 4);
        config.validate().unwrap();
        config.check_shapes().unwrap();
        for (axis, bound) in config.grid.axes.iter().zip(&config.bounds) {
            assert!(bound.encloses(&axis.bound), "{} not within {bound}", axis.bound);
        }
        let sigma = &config.grid.axes[usize::from(Parameter::Sigma)];
        assert_eq!(stimulus.degrees_per_pixel(), sigma.bound.low);
    }
}

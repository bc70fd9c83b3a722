use super::*;
use crate::params::Bound;
use assert_float_eq::*;

fn rosenbrock(values: &[f64]) -> f64 {
    (1.0 - values[0]).powi(2) + 100.0 * (values[1] - values[0].powi(2)).powi(2)
}

#[test]
fn univariate_descent_sqrt() {
    let config = UnivariateDescentConfig {
        init_value: 0.0,
        init_step: 0.1,
        min_step: 0.00001,
        max_steps: 100,
        acceptable_residual: 0.0,
    };
    let outcome = univariate_descent(&config, |value| (81.0 - value.powi(2)).powi(2)).unwrap();
    assert_float_absolute_eq!(9.0, outcome.optimal_value, config.min_step);
    assert!(outcome.converged);
}

#[test]
fn univariate_descent_rejects_zero_step() {
    let config = UnivariateDescentConfig {
        init_value: 0.0,
        init_step: 0.0,
        min_step: 0.00001,
        max_steps: 100,
        acceptable_residual: 0.0,
    };
    assert!(univariate_descent(&config, |value| value).is_err());
}

#[test]
fn hypergrid_search_poly3() {
    let axes = [
        GridAxis::from((0.0, 10.0)),
        GridAxis::from((-10.0, 10.0)),
        GridAxis::from((0.0, 10.0)),
    ];
    let config = HypergridSearchConfig {
        axes: &axes,
        resolution: 5,
    };
    let outcome = hypergrid_search(&config, |_| true, |values| {
        (values[0] - 5.0).powi(2) + (values[1] + 5.0).powi(2) + (values[2] - 10.0).powi(2)
    })
    .unwrap();
    assert_eq!(125, outcome.steps);
    assert_float_absolute_eq!(5.0, outcome.optimal_values[0], 1e-12);
    assert_float_absolute_eq!(-5.0, outcome.optimal_values[1], 1e-12);
    assert_float_absolute_eq!(10.0, outcome.optimal_values[2], 1e-12);
    assert_float_absolute_eq!(0.0, outcome.optimal_residual, 1e-12);
}

#[test]
fn hypergrid_search_visits_last_axis_fastest() {
    let axes = [GridAxis::from((0.0, 1.0)), GridAxis::from((0.0, 1.0))];
    let config = HypergridSearchConfig {
        axes: &axes,
        resolution: 2,
    };
    let mut visited = vec![];
    hypergrid_search(&config, |_| true, |values| {
        visited.push(values.to_vec());
        0.0
    })
    .unwrap();
    assert_eq!(
        vec![vec![0.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 1.0]],
        visited
    );
}

#[test]
fn hypergrid_search_ties_go_to_first_point() {
    let axes = [GridAxis::from((-1.0, 1.0)), GridAxis::from((2.0, 3.0))];
    let config = HypergridSearchConfig {
        axes: &axes,
        resolution: 3,
    };
    let outcome = hypergrid_search(&config, |_| true, |_| 7.0).unwrap();
    assert_eq!(vec![-1.0, 2.0], outcome.optimal_values);
    assert_eq!(7.0, outcome.optimal_residual);
}

#[test]
fn hypergrid_search_skips_constrained_points() {
    let axes = [GridAxis::from((0.0, 4.0))];
    let config = HypergridSearchConfig {
        axes: &axes,
        resolution: 5,
    };
    let outcome = hypergrid_search(&config, |values| values[0] >= 2.0, |values| values[0]).unwrap();
    assert_eq!(3, outcome.steps);
    assert_eq!(vec![2.0], outcome.optimal_values);
}

#[test]
fn hypergrid_search_logarithmic_axis() {
    let axes = [GridAxis::logarithmic(Bound::new(1.0, 100.0))];
    let config = HypergridSearchConfig {
        axes: &axes,
        resolution: 3,
    };
    let outcome = hypergrid_search(&config, |_| true, |values| (values[0] - 10.0).powi(2)).unwrap();
    assert_float_absolute_eq!(10.0, outcome.optimal_values[0], 1e-9);
}

#[test]
fn hypergrid_search_rejects_degenerate_config() {
    let axes = [GridAxis::from((0.0, 1.0))];
    let config = HypergridSearchConfig {
        axes: &axes,
        resolution: 1,
    };
    assert!(hypergrid_search(&config, |_| true, |_| 0.0).is_err());

    let config = HypergridSearchConfig { axes: &[], resolution: 3 };
    assert!(hypergrid_search(&config, |_| true, |_| 0.0).is_err());
}

#[test]
fn nelder_mead_rosenbrock() {
    let outcome = nelder_mead(&SimplexConfig::default(), &[-1.2, 1.0], |_| true, rosenbrock).unwrap();
    assert!(outcome.converged, "{outcome:?}");
    assert_float_absolute_eq!(1.0, outcome.optimal_values[0], 1e-3);
    assert_float_absolute_eq!(1.0, outcome.optimal_values[1], 1e-3);
    assert!(outcome.optimal_residual < 1e-6, "{outcome:?}");
}

#[test]
fn nelder_mead_is_deterministic() {
    let first = nelder_mead(&SimplexConfig::default(), &[-1.2, 1.0], |_| true, rosenbrock).unwrap();
    let second = nelder_mead(&SimplexConfig::default(), &[-1.2, 1.0], |_| true, rosenbrock).unwrap();
    assert_eq!(first.steps, second.steps);
    assert_eq!(first.optimal_values, second.optimal_values);
    assert_eq!(first.optimal_residual.to_bits(), second.optimal_residual.to_bits());
}

#[test]
fn nelder_mead_penalised_boundary() {
    const PENALTY: f64 = 1e100;
    let outcome = nelder_mead(&SimplexConfig::default(), &[0.5, 0.5], |values| values[0] <= 1.0, |values| {
        if values[0] > 1.0 {
            PENALTY
        } else {
            (values[0] - 2.0).powi(2) + values[1].powi(2)
        }
    })
    .unwrap();
    assert!(outcome.optimal_values[0] <= 1.0);
    assert_float_absolute_eq!(1.0, outcome.optimal_values[0], 1e-3);
    assert_float_absolute_eq!(0.0, outcome.optimal_values[1], 1e-3);
}

#[test]
fn nelder_mead_lays_out_simplex_inside_constraint() {
    let mut evaluated = vec![];
    nelder_mead(
        &SimplexConfig {
            max_steps: 1,
            max_restarts: 0,
            ..SimplexConfig::default()
        },
        &[1.0, 0.0],
        |values| values[0] <= 1.0,
        |values| {
            evaluated.push(values.to_vec());
            values[0].powi(2) + values[1].powi(2)
        },
    )
    .unwrap();
    // the starting point, then one vertex per axis
    assert_eq!(vec![1.0, 0.0], evaluated[0]);
    assert_float_absolute_eq!(0.95, evaluated[1][0], 1e-12);
    assert_eq!(0.0, evaluated[1][1]);
    assert_eq!(1.0, evaluated[2][0]);
    assert_eq!(0.00025, evaluated[2][1]);
}

#[test]
fn nelder_mead_reports_exhausted_budget() {
    let config = SimplexConfig {
        max_steps: 5,
        ..SimplexConfig::default()
    };
    let outcome = nelder_mead(&config, &[-1.2, 1.0], |_| true, rosenbrock).unwrap();
    assert!(!outcome.converged);
    assert_eq!(5, outcome.steps);
    assert_eq!(0, outcome.restarts);
    assert!(outcome.optimal_residual <= rosenbrock(&[-1.2, 1.0]));
}

#[test]
fn nelder_mead_rejects_empty_start() {
    assert!(nelder_mead(&SimplexConfig::default(), &[], |_| true, |_| 0.0).is_err());
}

#[test]
fn coordinate_descent_separable_quadratic() {
    let outcome = coordinate_descent(&CoordinateDescentConfig::default(), &[1.0, 1.0], |values| {
        (values[0] - 3.0).powi(2) + (values[1] + 1.0).powi(2)
    })
    .unwrap();
    assert!(outcome.converged, "{outcome:?}");
    assert_float_absolute_eq!(3.0, outcome.optimal_values[0], 1e-4);
    assert_float_absolute_eq!(-1.0, outcome.optimal_values[1], 1e-4);
}

#[test]
fn coordinate_descent_never_worsens_start() {
    let start = [0.3, -0.2];
    let outcome = coordinate_descent(&CoordinateDescentConfig::default(), &start, rosenbrock).unwrap();
    assert!(outcome.optimal_residual <= rosenbrock(&start));
}

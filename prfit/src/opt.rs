//! Derivative-free optimisers: exhaustive hypergrid search, univariate descent, cyclic
//! coordinate descent and the Nelder–Mead simplex method.
//!
//! All optimisers minimise a caller-supplied loss over `&[f64]` and are fully deterministic.
//! Box constraints are the caller's concern: the loss should return a large finite penalty for
//! inadmissible points.

use anyhow::bail;
use serde::{Deserialize, Serialize};

use crate::params::GridAxis;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnivariateDescentConfig {
    pub init_value: f64,
    pub init_step: f64,
    pub min_step: f64,
    pub max_steps: u64,
    pub acceptable_residual: f64,
}
impl UnivariateDescentConfig {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.init_value.is_finite() {
            bail!("initial value must be finite");
        }
        if self.init_step == 0.0 || !self.init_step.is_finite() {
            bail!("initial step must be non-zero");
        }
        if self.min_step <= 0.0 {
            bail!("min step must be positive")
        }
        if self.acceptable_residual < 0.0 {
            bail!("acceptable residual must be non-negative")
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct UnivariateDescentOutcome {
    pub steps: u64,
    pub optimal_value: f64,
    pub optimal_residual: f64,
    /// Whether the step shrank below the minimum (or the acceptable residual was reached) before
    /// the step budget ran out.
    pub converged: bool,
}

/// Univariate, derivative-free search. Steps in one direction until the loss worsens, then
/// reverses with half the step.
pub fn univariate_descent(
    config: &UnivariateDescentConfig,
    mut loss_f: impl FnMut(f64) -> f64,
) -> Result<UnivariateDescentOutcome, anyhow::Error> {
    config.validate()?;

    let mut steps = 0;
    let mut residual = loss_f(config.init_value);
    if residual <= config.acceptable_residual {
        return Ok(UnivariateDescentOutcome {
            steps: 0,
            optimal_value: config.init_value,
            optimal_residual: residual,
            converged: true,
        });
    }

    let (mut value, mut step) = (config.init_value, config.init_step);
    let (mut optimal_value, mut optimal_residual) = (value, residual);
    let mut converged = false;
    while steps < config.max_steps {
        steps += 1;
        let new_value = value + step;
        let new_residual = loss_f(new_value);

        if new_residual > residual {
            step = -step * 0.5;
            if step.abs() < config.min_step {
                converged = true;
                break;
            }
        } else if new_residual < optimal_residual {
            optimal_residual = new_residual;
            optimal_value = new_value;

            if optimal_residual <= config.acceptable_residual {
                converged = true;
                break;
            }
        }
        residual = new_residual;
        value = new_value;
    }
    Ok(UnivariateDescentOutcome {
        steps,
        optimal_value,
        optimal_residual,
        converged,
    })
}

#[derive(Clone, Debug)]
pub struct HypergridSearchConfig<'a> {
    pub axes: &'a [GridAxis],
    pub resolution: usize,
}
impl HypergridSearchConfig<'_> {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.axes.is_empty() {
            bail!("at least one search dimension must be specified")
        }
        const MIN_RESOLUTION: usize = 2;
        if self.resolution < MIN_RESOLUTION {
            bail!("search resolution must be at least {MIN_RESOLUTION}")
        }
        for axis in self.axes {
            axis.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct HypergridSearchOutcome {
    /// Number of lattice points evaluated.
    pub steps: u64,
    pub optimal_values: Vec<f64>,
    pub optimal_residual: f64,
}

/// Exhaustively evaluates every lattice point satisfying `constraint_f`, in row-major order (the
/// first axis varies slowest). The first point attaining the least residual is returned.
pub fn hypergrid_search(
    config: &HypergridSearchConfig,
    mut constraint_f: impl FnMut(&[f64]) -> bool,
    mut loss_f: impl FnMut(&[f64]) -> f64,
) -> Result<HypergridSearchOutcome, anyhow::Error> {
    config.validate()?;

    let dimensions = config.axes.len();
    let points = (config.resolution as u64)
        .checked_pow(dimensions as u32)
        .ok_or_else(|| anyhow::anyhow!("a {dimensions}-dimensional lattice of resolution {} is too large", config.resolution))?;

    let mut steps = 0;
    let mut ordinals = vec![0; dimensions];
    let mut values = vec![0.0; dimensions];
    let mut optimal_values = values.clone();
    let mut optimal_residual = f64::MAX;

    for point in 0..points {
        pick(config.resolution, point, &mut ordinals);
        for ((value, axis), &ordinal) in values.iter_mut().zip(config.axes).zip(&ordinals) {
            *value = axis.point(ordinal, config.resolution);
        }
        if !constraint_f(&values) {
            continue;
        }

        steps += 1;
        let residual = loss_f(&values);
        if steps == 1 || residual < optimal_residual {
            optimal_residual = residual;
            optimal_values.copy_from_slice(&values);
        }
    }

    Ok(HypergridSearchOutcome {
        steps,
        optimal_values,
        optimal_residual,
    })
}

/// Decodes the `point`-th lattice point into per-axis ordinals, the last axis varying fastest.
#[inline]
fn pick(resolution: usize, point: u64, ordinals: &mut [usize]) {
    let resolution = resolution as u64;
    let mut residual = point;
    for ordinal in ordinals.iter_mut().rev() {
        *ordinal = (residual % resolution) as usize;
        residual /= resolution;
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoordinateDescentConfig {
    /// Initial step along each axis, as a fraction of the starting value.
    pub init_scale: f64,
    /// Initial step along axes whose starting value is zero.
    pub zero_step: f64,
    /// Minimum step, as a fraction of the initial step.
    pub min_step_ratio: f64,
    pub max_axis_steps: u64,
    pub max_cycles: u64,
    /// Least improvement over a full cycle for the search to continue.
    pub residual_tolerance: f64,
}
impl CoordinateDescentConfig {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !(self.init_scale > 0.0) || !(self.zero_step > 0.0) {
            bail!("initial steps must be positive");
        }
        if !(self.min_step_ratio > 0.0 && self.min_step_ratio < 1.0) {
            bail!("min step ratio must lie in (0, 1)");
        }
        if self.max_axis_steps == 0 || self.max_cycles == 0 {
            bail!("at least one step and one cycle must be permitted");
        }
        if self.residual_tolerance < 0.0 {
            bail!("residual tolerance must be non-negative");
        }
        Ok(())
    }
}

impl Default for CoordinateDescentConfig {
    fn default() -> Self {
        Self {
            init_scale: 0.1,
            zero_step: 0.01,
            min_step_ratio: 1e-6,
            max_axis_steps: 200,
            max_cycles: 200,
            residual_tolerance: 1e-12,
        }
    }
}

#[derive(Debug)]
pub struct CoordinateDescentOutcome {
    /// Number of full cycles over the axes.
    pub steps: u64,
    pub optimal_values: Vec<f64>,
    pub optimal_residual: f64,
    pub converged: bool,
}

/// Cyclic coordinate descent: a [`univariate_descent`] along each axis in turn, repeated until a
/// full cycle fails to improve the residual by more than the tolerance.
pub fn coordinate_descent(
    config: &CoordinateDescentConfig,
    init_values: &[f64],
    mut loss_f: impl FnMut(&[f64]) -> f64,
) -> Result<CoordinateDescentOutcome, anyhow::Error> {
    config.validate()?;
    if init_values.is_empty() {
        bail!("at least one search dimension must be specified");
    }

    let mut values = init_values.to_vec();
    let mut probe = values.clone();
    let mut residual = loss_f(&values);
    let mut steps = 0;
    let mut converged = false;

    while steps < config.max_cycles {
        steps += 1;
        let cycle_start_residual = residual;
        for axis in 0..values.len() {
            let init_step = initial_step(values[axis], config.init_scale, config.zero_step);
            let outcome = univariate_descent(
                &UnivariateDescentConfig {
                    init_value: values[axis],
                    init_step,
                    min_step: init_step.abs() * config.min_step_ratio,
                    max_steps: config.max_axis_steps,
                    acceptable_residual: 0.0,
                },
                |value| {
                    probe.copy_from_slice(&values);
                    probe[axis] = value;
                    loss_f(&probe)
                },
            )?;
            if outcome.optimal_residual < residual {
                residual = outcome.optimal_residual;
                values[axis] = outcome.optimal_value;
            }
        }
        if cycle_start_residual - residual <= config.residual_tolerance {
            converged = true;
            break;
        }
    }

    Ok(CoordinateDescentOutcome {
        steps,
        optimal_values: values,
        optimal_residual: residual,
        converged,
    })
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimplexConfig {
    /// Initial simplex edge along each axis, as a fraction of the starting value.
    pub init_scale: f64,
    /// Initial simplex edge along axes whose starting value is zero.
    pub zero_step: f64,
    pub value_tolerance: f64,
    pub residual_tolerance: f64,
    /// Iteration budget, shared by the initial run and all restarts.
    pub max_steps: u64,
    /// Number of times the simplex is rebuilt around a converged optimum.
    pub max_restarts: u32,
}
impl SimplexConfig {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !(self.init_scale > 0.0) || !(self.zero_step > 0.0) {
            bail!("initial simplex edges must be positive");
        }
        if !(self.value_tolerance >= 0.0) || !(self.residual_tolerance >= 0.0) {
            bail!("tolerances must be non-negative");
        }
        if self.max_steps == 0 {
            bail!("at least one step must be permitted");
        }
        Ok(())
    }
}

impl Default for SimplexConfig {
    fn default() -> Self {
        Self {
            init_scale: 0.05,
            zero_step: 0.00025,
            value_tolerance: 1e-6,
            residual_tolerance: 1e-12,
            max_steps: 10_000,
            max_restarts: 3,
        }
    }
}

#[derive(Debug)]
pub struct SimplexOutcome {
    pub steps: u64,
    pub restarts: u32,
    pub optimal_values: Vec<f64>,
    pub optimal_residual: f64,
    pub converged: bool,
}

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINKAGE: f64 = 0.5;

#[derive(Debug, Clone)]
struct Vertex {
    values: Vec<f64>,
    residual: f64,
}

/// The Nelder–Mead downhill simplex method. `constraint_f` steers the construction of the
/// initial simplex: an edge that would leave the feasible region is laid out in the opposite
/// direction.
///
/// Once the simplex collapses within both tolerances, it is rebuilt around the best vertex and
/// the search resumes, up to `max_restarts` times or until a restart fails to improve on the
/// residual.
pub fn nelder_mead(
    config: &SimplexConfig,
    init_values: &[f64],
    mut constraint_f: impl FnMut(&[f64]) -> bool,
    mut loss_f: impl FnMut(&[f64]) -> f64,
) -> Result<SimplexOutcome, anyhow::Error> {
    config.validate()?;
    let dimensions = init_values.len();
    if dimensions == 0 {
        bail!("at least one search dimension must be specified");
    }

    let mut simplex = vec![
        Vertex {
            values: init_values.to_vec(),
            residual: loss_f(init_values),
        };
        dimensions + 1
    ];
    let mut centroid = vec![0.0; dimensions];
    let mut reflected = vec![0.0; dimensions];
    let mut candidate = vec![0.0; dimensions];
    let worst = dimensions;

    let mut steps = 0;
    let mut restarts = 0;
    let mut converged;
    loop {
        let run_start_residual = simplex[0].residual;
        lay_out_simplex(&mut simplex, config, &mut constraint_f, &mut loss_f);
        converged = false;

        loop {
            simplex.sort_by(|a, b| a.residual.total_cmp(&b.residual));
            if collapsed(&simplex, config) {
                converged = true;
                break;
            }
            if steps == config.max_steps {
                break;
            }
            steps += 1;

            centroid.fill(0.0);
            for vertex in &simplex[..dimensions] {
                for (sum, value) in centroid.iter_mut().zip(&vertex.values) {
                    *sum += value;
                }
            }
            for sum in centroid.iter_mut() {
                *sum /= dimensions as f64;
            }

            blend(&centroid, &simplex[worst].values, -REFLECTION, &mut reflected);
            let reflected_residual = loss_f(&reflected);

            if reflected_residual < simplex[0].residual {
                blend(&centroid, &simplex[worst].values, -REFLECTION * EXPANSION, &mut candidate);
                let expanded_residual = loss_f(&candidate);
                if expanded_residual < reflected_residual {
                    replace(&mut simplex[worst], &candidate, expanded_residual);
                } else {
                    replace(&mut simplex[worst], &reflected, reflected_residual);
                }
            } else if reflected_residual < simplex[dimensions - 1].residual {
                replace(&mut simplex[worst], &reflected, reflected_residual);
            } else {
                let contracted = if reflected_residual < simplex[worst].residual {
                    blend(&centroid, &simplex[worst].values, -REFLECTION * CONTRACTION, &mut candidate);
                    let contracted_residual = loss_f(&candidate);
                    (contracted_residual <= reflected_residual).then_some(contracted_residual)
                } else {
                    blend(&centroid, &simplex[worst].values, CONTRACTION, &mut candidate);
                    let contracted_residual = loss_f(&candidate);
                    (contracted_residual < simplex[worst].residual).then_some(contracted_residual)
                };
                match contracted {
                    Some(residual) => replace(&mut simplex[worst], &candidate, residual),
                    None => {
                        let (best, rest) = simplex.split_at_mut(1);
                        for vertex in rest {
                            for (value, &anchor) in vertex.values.iter_mut().zip(&best[0].values) {
                                *value = anchor + SHRINKAGE * (*value - anchor);
                            }
                            vertex.residual = loss_f(&vertex.values);
                        }
                    }
                }
            }
        }

        let improvement = run_start_residual - simplex[0].residual;
        if !converged
            || restarts == config.max_restarts
            || (restarts > 0 && improvement <= config.residual_tolerance)
        {
            break;
        }
        restarts += 1;
    }

    let best = simplex.swap_remove(0);
    Ok(SimplexOutcome {
        steps,
        restarts,
        optimal_values: best.values,
        optimal_residual: best.residual,
        converged,
    })
}

/// Rebuilds the simplex around its first vertex, which must hold the current best point.
fn lay_out_simplex(
    simplex: &mut [Vertex],
    config: &SimplexConfig,
    constraint_f: &mut impl FnMut(&[f64]) -> bool,
    loss_f: &mut impl FnMut(&[f64]) -> f64,
) {
    let (origin, rest) = simplex.split_at_mut(1);
    let origin = &origin[0];
    for (axis, vertex) in rest.iter_mut().enumerate() {
        vertex.values.copy_from_slice(&origin.values);
        let step = initial_step(origin.values[axis], config.init_scale, config.zero_step);
        vertex.values[axis] += step;
        if !constraint_f(&vertex.values) {
            vertex.values[axis] = origin.values[axis] - step;
        }
        vertex.residual = loss_f(&vertex.values);
    }
}

fn collapsed(simplex: &[Vertex], config: &SimplexConfig) -> bool {
    let best = &simplex[0];
    simplex[1..].iter().all(|vertex| {
        (vertex.residual - best.residual).abs() <= config.residual_tolerance
            && vertex
                .values
                .iter()
                .zip(&best.values)
                .all(|(value, anchor)| (value - anchor).abs() <= config.value_tolerance)
    })
}

#[inline]
fn initial_step(value: f64, scale: f64, zero_step: f64) -> f64 {
    if value != 0.0 {
        value * scale
    } else {
        zero_step
    }
}

/// `output = origin + coefficient · (towards − origin)`
#[inline]
fn blend(origin: &[f64], towards: &[f64], coefficient: f64, output: &mut [f64]) {
    for ((output, &origin), &towards) in output.iter_mut().zip(origin).zip(towards) {
        *output = origin + coefficient * (towards - origin);
    }
}

#[inline]
fn replace(vertex: &mut Vertex, values: &[f64], residual: f64) {
    vertex.values.copy_from_slice(values);
    vertex.residual = residual;
}

#[cfg(test)]
mod tests;

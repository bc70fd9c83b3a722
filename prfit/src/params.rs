//! Parameter vectors, box bounds and search grids.

use std::fmt::Formatter;
use std::ops::{Index, IndexMut, RangeInclusive};

use anyhow::bail;
use ordinalizer::Ordinal;
use serde::{Deserialize, Serialize};
use strum::{EnumCount, IntoEnumIterator};
use strum_macros::{Display, EnumCount, EnumIter};

/// The free parameters of the compressive spatial summation model, in canonical order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Ordinal, EnumCount, EnumIter, Display, Serialize, Deserialize,
)]
pub enum Parameter {
    X,
    Y,
    Sigma,
    N,
    Beta,
}

impl From<Parameter> for usize {
    fn from(parameter: Parameter) -> Self {
        parameter.ordinal()
    }
}

pub const PARAMETERS: usize = Parameter::COUNT;

/// A candidate pRF: position `(x, y)` and spread `sigma` in degrees of visual angle, the
/// compressive exponent `n` and the response gain `beta`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ParameterVector {
    pub x: f64,
    pub y: f64,
    pub sigma: f64,
    pub n: f64,
    pub beta: f64,
}
impl ParameterVector {
    pub fn new(x: f64, y: f64, sigma: f64, n: f64, beta: f64) -> Self {
        Self { x, y, sigma, n, beta }
    }

    pub fn to_array(&self) -> [f64; PARAMETERS] {
        [self.x, self.y, self.sigma, self.n, self.beta]
    }

    /// Polar angle of the pRF centre, in radians.
    pub fn theta(&self) -> f64 {
        f64::atan2(self.y, self.x)
    }

    /// Eccentricity of the pRF centre.
    pub fn rho(&self) -> f64 {
        f64::hypot(self.x, self.y)
    }

    /// Size of the pRF after compressive summation.
    pub fn effective_sigma(&self) -> f64 {
        self.sigma / self.n.sqrt()
    }

    pub fn from_polar(theta: f64, rho: f64, sigma: f64, n: f64, beta: f64) -> Self {
        Self::new(rho * theta.cos(), rho * theta.sin(), sigma, n, beta)
    }

    /// Largest absolute elementwise difference from `other`, along with the parameter at which
    /// it occurs.
    pub fn max_abs_diff(&self, other: &ParameterVector) -> (Parameter, f64) {
        Parameter::iter()
            .map(|parameter| (parameter, (self[parameter] - other[parameter]).abs()))
            .fold((Parameter::X, 0.0), |worst, current| {
                if current.1 > worst.1 {
                    current
                } else {
                    worst
                }
            })
    }
}

impl From<[f64; PARAMETERS]> for ParameterVector {
    fn from(values: [f64; PARAMETERS]) -> Self {
        let [x, y, sigma, n, beta] = values;
        Self { x, y, sigma, n, beta }
    }
}

impl From<&ParameterVector> for [f64; PARAMETERS] {
    fn from(params: &ParameterVector) -> Self {
        params.to_array()
    }
}

impl Index<Parameter> for ParameterVector {
    type Output = f64;

    fn index(&self, parameter: Parameter) -> &Self::Output {
        match parameter {
            Parameter::X => &self.x,
            Parameter::Y => &self.y,
            Parameter::Sigma => &self.sigma,
            Parameter::N => &self.n,
            Parameter::Beta => &self.beta,
        }
    }
}

impl IndexMut<Parameter> for ParameterVector {
    fn index_mut(&mut self, parameter: Parameter) -> &mut Self::Output {
        match parameter {
            Parameter::X => &mut self.x,
            Parameter::Y => &mut self.y,
            Parameter::Sigma => &mut self.sigma,
            Parameter::N => &mut self.n,
            Parameter::Beta => &mut self.beta,
        }
    }
}

impl std::fmt::Display for ParameterVector {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(x: {:.3}, y: {:.3}, σ: {:.3}, n: {:.3}, β: {:.3})",
            self.x, self.y, self.sigma, self.n, self.beta
        )
    }
}

/// A closed interval `[low, high]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub low: f64,
    pub high: f64,
}
impl Bound {
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.low.is_finite() || !self.high.is_finite() {
            bail!("bound [{}, {}] must be finite", self.low, self.high);
        }
        if self.low > self.high {
            bail!("lower bound {} exceeds upper bound {}", self.low, self.high);
        }
        Ok(())
    }

    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }

    #[inline]
    pub fn clamp(&self, value: f64) -> f64 {
        f64::max(self.low, f64::min(value, self.high))
    }

    #[inline]
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn encloses(&self, other: &Bound) -> bool {
        self.contains(other.low) && self.contains(other.high)
    }
}

impl From<(f64, f64)> for Bound {
    fn from((low, high): (f64, f64)) -> Self {
        Self { low, high }
    }
}

impl From<RangeInclusive<f64>> for Bound {
    fn from(range: RangeInclusive<f64>) -> Self {
        Self {
            low: *range.start(),
            high: *range.end(),
        }
    }
}

impl std::fmt::Display for Bound {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.low, self.high)
    }
}

/// How the points of a grid axis are distributed between its bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Spacing {
    #[default]
    Linear,
    Logarithmic,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridAxis {
    pub bound: Bound,
    #[serde(default)]
    pub spacing: Spacing,
}
impl GridAxis {
    pub fn linear(bound: impl Into<Bound>) -> Self {
        Self {
            bound: bound.into(),
            spacing: Spacing::Linear,
        }
    }

    pub fn logarithmic(bound: impl Into<Bound>) -> Self {
        Self {
            bound: bound.into(),
            spacing: Spacing::Logarithmic,
        }
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.bound.validate()?;
        if self.spacing == Spacing::Logarithmic && self.bound.low <= 0.0 {
            bail!("logarithmic axis {} must be strictly positive", self.bound);
        }
        Ok(())
    }

    /// The value of the `ordinal`-th of `resolution` points along this axis. Both bounds are
    /// always members of the axis.
    #[inline]
    pub fn point(&self, ordinal: usize, resolution: usize) -> f64 {
        debug_assert!(ordinal < resolution);
        if ordinal == 0 {
            return self.bound.low;
        }
        if ordinal == resolution - 1 {
            return self.bound.high;
        }
        let fraction = ordinal as f64 / (resolution - 1) as f64;
        match self.spacing {
            Spacing::Linear => self.bound.low + fraction * self.bound.range(),
            Spacing::Logarithmic => {
                let (log_low, log_high) = (self.bound.low.ln(), self.bound.high.ln());
                f64::exp(log_low + fraction * (log_high - log_low))
            }
        }
    }
}

impl From<(f64, f64)> for GridAxis {
    fn from(bound: (f64, f64)) -> Self {
        Self::linear(bound)
    }
}

/// A hyper-rectangular lattice of `resolution` points along every axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub axes: Vec<GridAxis>,
    pub resolution: usize,
}
impl GridSpec {
    pub fn new(axes: impl IntoIterator<Item = impl Into<GridAxis>>, resolution: usize) -> Self {
        Self {
            axes: axes.into_iter().map(Into::into).collect(),
            resolution,
        }
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        const MIN_RESOLUTION: usize = 2;
        if self.resolution < MIN_RESOLUTION {
            bail!("grid resolution must be at least {MIN_RESOLUTION}");
        }
        if self.axes.is_empty() {
            bail!("at least one grid axis must be specified");
        }
        for axis in &self.axes {
            axis.validate()?;
        }
        Ok(())
    }

    pub fn points(&self) -> u64 {
        (self.resolution as u64).saturating_pow(self.axes.len() as u32)
    }
}

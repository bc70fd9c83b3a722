//! Testing fixtures.

use crate::params::{Bound, GridAxis, GridSpec, ParameterVector};
use crate::stimulus::{simulate_bar_stimulus, BarSweep, Stimulus, ViewingGeometry};

pub const REFERENCE_GEOMETRY: ViewingGeometry = ViewingGeometry {
    viewing_distance: 38.0,
    screen_width: 25.0,
    pixels_across: 50,
};

/// 50×50 pixel bar sweep in four directions, thirty steps each, at 1s TR.
pub fn reference_stimulus() -> Stimulus {
    simulate_bar_stimulus(&REFERENCE_GEOMETRY, 50, &BarSweep::default(), 1.0).unwrap()
}

/// [`reference_stimulus`] resampled by a factor of 0.1 onto a 5×5 grid.
pub fn resampled_reference_stimulus() -> Stimulus {
    reference_stimulus().resample(0.1).unwrap()
}

/// As [`reference_stimulus`], but with fewer bar steps so that fitting runs faster.
pub fn short_stimulus() -> Stimulus {
    let sweep = BarSweep {
        bar_steps: 16,
        blank_steps: 2,
        ..BarSweep::default()
    };
    simulate_bar_stimulus(&REFERENCE_GEOMETRY, 50, &sweep, 1.0).unwrap()
}

/// A `size`×`size` stimulus that is fully lit at every one of `timepoints` time points.
pub fn uniform_stimulus(size: usize, timepoints: usize, pixels_per_degree: f64) -> Stimulus {
    Stimulus::new(
        vec![1.0; size * size * timepoints],
        size,
        size,
        timepoints,
        pixels_per_degree,
        1.0,
    )
    .unwrap()
}

pub fn reference_params() -> ParameterVector {
    ParameterVector::new(-2.24, 1.58, 1.23, 0.90, 1.0)
}

pub fn reference_grid(stimulus: &Stimulus) -> GridSpec {
    GridSpec {
        axes: vec![
            GridAxis::from((-3.0, 2.0)),
            GridAxis::from((-3.0, 2.0)),
            GridAxis::from((stimulus.degrees_per_pixel(), 2.75)),
            GridAxis::from((0.1, 0.9)),
            GridAxis::from((0.01, 1.0)),
        ],
        resolution: 3,
    }
}

pub fn reference_bounds(stimulus: &Stimulus) -> Vec<Bound> {
    vec![
        Bound::new(-10.0, 10.0),
        Bound::new(-10.0, 10.0),
        Bound::new(stimulus.degrees_per_pixel(), 10.0),
        Bound::new(1e-8, 1.0),
        Bound::new(1e-8, 1e5),
    ]
}

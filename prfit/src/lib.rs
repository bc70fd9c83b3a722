//! Population receptive field estimation under the compressive spatial summation model.
//! Fits the position, size, compressive exponent and gain of a voxel's receptive field to an
//! observed response, by exhaustive coarse search followed by bounded local refinement.

pub mod file;
pub mod fit;
pub mod hrf;
pub mod model;
pub mod objective;
pub mod opt;
pub mod params;
pub mod refine;
pub mod search;
pub mod stimulus;
pub mod timed;

#[cfg(test)]
pub(crate) mod testing;

#[doc = include_str!("../../README.md")]
#[cfg(doc)]
fn readme() {}

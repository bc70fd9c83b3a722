//! Hemodynamic response kernels.

use serde::{Deserialize, Serialize};
use statrs::function::gamma::ln_gamma;

use crate::model::ModelError;

/// Generates a finite impulse-response kernel, sampled once per TR, for a given delay.
pub trait HrfProvider {
    /// Writes the kernel for `delay` into `kernel`, replacing its contents.
    fn kernel_into(&self, delay: f64, tr_length: f64, kernel: &mut Vec<f64>) -> Result<(), ModelError>;

    fn kernel(&self, delay: f64, tr_length: f64) -> Result<Vec<f64>, ModelError> {
        let mut kernel = vec![];
        self.kernel_into(delay, tr_length, &mut kernel)?;
        Ok(kernel)
    }
}

impl<H: HrfProvider + ?Sized> HrfProvider for &H {
    fn kernel_into(&self, delay: f64, tr_length: f64, kernel: &mut Vec<f64>) -> Result<(), ModelError> {
        (**self).kernel_into(delay, tr_length, kernel)
    }
}

/// The canonical double-gamma response: a gamma-shaped peak less a scaled gamma-shaped
/// undershoot, both shifted later by the delay and normalised to unit sum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoubleGamma {
    pub peak_shape: f64,
    pub undershoot_shape: f64,
    pub undershoot_ratio: f64,
    /// Kernel duration, in seconds.
    pub length: f64,
}

impl Default for DoubleGamma {
    fn default() -> Self {
        Self {
            peak_shape: 6.0,
            undershoot_shape: 16.0,
            undershoot_ratio: 6.0,
            length: 32.0,
        }
    }
}

impl HrfProvider for DoubleGamma {
    fn kernel_into(&self, delay: f64, tr_length: f64, kernel: &mut Vec<f64>) -> Result<(), ModelError> {
        let (peak_shape, undershoot_shape) = (self.peak_shape + delay, self.undershoot_shape + delay);
        if !delay.is_finite() || peak_shape <= 1.0 || undershoot_shape <= 1.0 {
            return Err(ModelError::InvalidHrfDelay(delay));
        }
        if !(tr_length.is_finite() && tr_length > 0.0) {
            return Err(ModelError::InvalidHrfDelay(delay));
        }

        let samples = usize::max(1, (self.length / tr_length).floor() as usize);
        kernel.clear();
        kernel.extend((0..samples).map(|k| {
            let t = k as f64 * tr_length;
            gamma_density(t, peak_shape) - gamma_density(t, undershoot_shape) / self.undershoot_ratio
        }));

        let sum: f64 = kernel.iter().sum();
        if !(sum.is_finite() && sum > 0.0) {
            return Err(ModelError::InvalidHrfDelay(delay));
        }
        for weight in kernel.iter_mut() {
            *weight /= sum;
        }
        Ok(())
    }
}

/// The identity kernel; the prediction is the compressive spatial response itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Impulse;

impl HrfProvider for Impulse {
    fn kernel_into(&self, _: f64, _: f64, kernel: &mut Vec<f64>) -> Result<(), ModelError> {
        kernel.clear();
        kernel.push(1.0);
        Ok(())
    }
}

/// Unit-scale gamma density with the given shape, for `shape > 1`.
#[inline]
fn gamma_density(t: f64, shape: f64) -> f64 {
    if t <= 0.0 {
        0.0
    } else {
        f64::exp((shape - 1.0) * t.ln() - t - ln_gamma(shape))
    }
}

//! Space-time stimulus arrays and a sweeping-bar stimulus generator.

use anyhow::bail;
use serde::{Deserialize, Serialize};

/// A rows × columns × time array of stimulus intensities, with its pixel-to-degree scale.
///
/// Intensities are stored pixel-major: the full time series of a pixel is contiguous, so spatial
/// summation streams over whole series at a time.
///
/// Two scales are carried. [`pixels_per_degree`](Self::pixels_per_degree) is that of the sampling
/// grid and changes on [`resample`](Self::resample); [`display_pixels_per_degree`](Self::display_pixels_per_degree)
/// is that of the display the stimulus was rendered for, and survives resampling.
#[derive(Debug, Clone, PartialEq)]
pub struct Stimulus {
    data: Vec<f64>,
    rows: usize,
    cols: usize,
    timepoints: usize,
    pixels_per_degree: f64,
    display_pixels_per_degree: f64,
    tr_length: f64,
}
impl Stimulus {
    /// Builds a stimulus from pixel-major `data`, in which entry `(row, col, t)` resides at
    /// `(row * cols + col) * timepoints + t`.
    pub fn new(
        data: Vec<f64>,
        rows: usize,
        cols: usize,
        timepoints: usize,
        pixels_per_degree: f64,
        tr_length: f64,
    ) -> Result<Self, anyhow::Error> {
        if rows == 0 || cols == 0 || timepoints == 0 {
            bail!("stimulus dimensions {rows}x{cols}x{timepoints} must be non-zero");
        }
        let expected = rows
            .checked_mul(cols)
            .and_then(|pixels| pixels.checked_mul(timepoints));
        if expected != Some(data.len()) {
            bail!(
                "stimulus of {rows}x{cols}x{timepoints} cannot be built from {} intensities",
                data.len()
            );
        }
        if !(pixels_per_degree.is_finite() && pixels_per_degree > 0.0) {
            bail!("pixels per degree must be positive, got {pixels_per_degree}");
        }
        if !(tr_length.is_finite() && tr_length > 0.0) {
            bail!("TR length must be positive, got {tr_length}");
        }
        if data.iter().any(|intensity| !intensity.is_finite()) {
            bail!("stimulus intensities must be finite");
        }
        Ok(Self {
            data,
            rows,
            cols,
            timepoints,
            pixels_per_degree,
            display_pixels_per_degree: pixels_per_degree,
            tr_length,
        })
    }

    /// Builds a stimulus from a sequence of row-major frames, one per time point.
    pub fn from_frames(
        frames: &[Vec<f64>],
        rows: usize,
        cols: usize,
        pixels_per_degree: f64,
        tr_length: f64,
    ) -> Result<Self, anyhow::Error> {
        let timepoints = frames.len();
        let pixels = rows * cols;
        if let Some((t, frame)) = frames.iter().enumerate().find(|(_, frame)| frame.len() != pixels) {
            bail!("frame {t} has {} pixels, expected {pixels}", frame.len());
        }
        let mut data = vec![0.0; pixels * timepoints];
        for (t, frame) in frames.iter().enumerate() {
            for (pixel, &intensity) in frame.iter().enumerate() {
                data[pixel * timepoints + t] = intensity;
            }
        }
        Self::new(data, rows, cols, timepoints, pixels_per_degree, tr_length)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn timepoints(&self) -> usize {
        self.timepoints
    }

    pub fn pixels_per_degree(&self) -> f64 {
        self.pixels_per_degree
    }

    pub fn display_pixels_per_degree(&self) -> f64 {
        self.display_pixels_per_degree
    }

    /// Size of one display pixel, in degrees. This is the finest receptive field the stimulus can
    /// resolve, irrespective of any resampling.
    pub fn degrees_per_pixel(&self) -> f64 {
        1.0 / self.display_pixels_per_degree
    }

    pub fn tr_length(&self) -> f64 {
        self.tr_length
    }

    #[inline]
    pub fn series(&self, row: usize, col: usize) -> &[f64] {
        debug_assert!(row < self.rows && col < self.cols);
        let start = (row * self.cols + col) * self.timepoints;
        &self.data[start..start + self.timepoints]
    }

    #[inline]
    pub fn intensity(&self, row: usize, col: usize, t: usize) -> f64 {
        self.series(row, col)[t]
    }

    /// Horizontal position of the centre of column `col`, in degrees from the screen centre.
    #[inline]
    pub fn col_to_degrees(&self, col: usize) -> f64 {
        (col as f64 - (self.cols - 1) as f64 / 2.0) / self.pixels_per_degree
    }

    /// Vertical position of the centre of row `row`, in degrees from the screen centre. Rows grow
    /// downward while degrees grow upward.
    #[inline]
    pub fn row_to_degrees(&self, row: usize) -> f64 {
        ((self.rows - 1) as f64 / 2.0 - row as f64) / self.pixels_per_degree
    }

    /// Fractional column corresponding to a horizontal position in degrees.
    #[inline]
    pub fn degrees_to_col(&self, x: f64) -> f64 {
        x * self.pixels_per_degree + (self.cols - 1) as f64 / 2.0
    }

    /// Fractional row corresponding to a vertical position in degrees.
    #[inline]
    pub fn degrees_to_row(&self, y: f64) -> f64 {
        (self.rows - 1) as f64 / 2.0 - y * self.pixels_per_degree
    }

    /// Nearest-neighbour spatial resampling by `scale_factor`. The visual extent is preserved, so
    /// the grid's pixels-per-degree scale changes by the same factor; the display scale does not.
    pub fn resample(&self, scale_factor: f64) -> Result<Self, anyhow::Error> {
        if !(scale_factor.is_finite() && scale_factor > 0.0) {
            bail!("scale factor must be positive, got {scale_factor}");
        }
        let rows = (self.rows as f64 * scale_factor).round() as usize;
        let cols = (self.cols as f64 * scale_factor).round() as usize;
        if rows == 0 || cols == 0 {
            bail!(
                "scale factor {scale_factor} collapses a {}x{} stimulus",
                self.rows,
                self.cols
            );
        }
        let mut data = Vec::with_capacity(rows * cols * self.timepoints);
        for row in 0..rows {
            let src_row = source_index(row, rows, self.rows);
            for col in 0..cols {
                let src_col = source_index(col, cols, self.cols);
                data.extend_from_slice(self.series(src_row, src_col));
            }
        }
        let resampled = Self::new(
            data,
            rows,
            cols,
            self.timepoints,
            self.pixels_per_degree * cols as f64 / self.cols as f64,
            self.tr_length,
        )?;
        Ok(Self {
            display_pixels_per_degree: self.display_pixels_per_degree,
            ..resampled
        })
    }
}

#[inline]
fn source_index(index: usize, len: usize, src_len: usize) -> usize {
    let centre = (index as f64 + 0.5) * src_len as f64 / len as f64;
    usize::min(centre as usize, src_len - 1)
}

/// The physical arrangement of the display relative to the observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewingGeometry {
    pub viewing_distance: f64,
    pub screen_width: f64,
    pub pixels_across: usize,
}
impl ViewingGeometry {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !(self.viewing_distance > 0.0) {
            bail!("viewing distance must be positive");
        }
        if !(self.screen_width > 0.0) {
            bail!("screen width must be positive");
        }
        if self.pixels_across == 0 {
            bail!("screen must be at least one pixel across");
        }
        Ok(())
    }

    /// Horizontal field of view subtended by the screen.
    pub fn degrees_across(&self) -> f64 {
        2.0 * f64::atan(self.screen_width / 2.0 / self.viewing_distance).to_degrees()
    }

    pub fn pixels_per_degree(&self) -> f64 {
        self.pixels_across as f64 / self.degrees_across()
    }
}

/// A bar sweeping across the visual field in a sequence of directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarSweep {
    /// Sweep directions, in degrees counter-clockwise from rightward.
    pub thetas: Vec<f64>,
    pub bar_steps: usize,
    pub blank_steps: usize,
    /// Radius of the circular aperture within which the bar is visible.
    pub eccentricity: f64,
    pub bar_width: f64,
}
impl BarSweep {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.thetas.is_empty() {
            bail!("at least one sweep direction must be specified");
        }
        const MIN_BAR_STEPS: usize = 2;
        if self.bar_steps < MIN_BAR_STEPS {
            bail!("a sweep must comprise at least {MIN_BAR_STEPS} bar steps");
        }
        if !(self.eccentricity > 0.0) {
            bail!("eccentricity must be positive");
        }
        if !(self.bar_width > 0.0) {
            bail!("bar width must be positive");
        }
        Ok(())
    }

    pub fn timepoints(&self) -> usize {
        self.thetas.len() * (self.bar_steps + self.blank_steps)
    }
}

impl Default for BarSweep {
    fn default() -> Self {
        Self {
            thetas: vec![0.0, 90.0, 180.0, 270.0],
            bar_steps: 30,
            blank_steps: 0,
            eccentricity: 10.0,
            bar_width: 2.5,
        }
    }
}

/// Renders a binary sweeping-bar stimulus onto a screen of `pixels_down` rows. Each direction
/// contributes `bar_steps` frames, with the bar centre travelling from `-eccentricity` to
/// `+eccentricity` along the direction of travel, followed by `blank_steps` empty frames.
pub fn simulate_bar_stimulus(
    geometry: &ViewingGeometry,
    pixels_down: usize,
    sweep: &BarSweep,
    tr_length: f64,
) -> Result<Stimulus, anyhow::Error> {
    geometry.validate()?;
    sweep.validate()?;
    if pixels_down == 0 {
        bail!("screen must be at least one pixel down");
    }

    let (rows, cols) = (pixels_down, geometry.pixels_across);
    let ppd = geometry.pixels_per_degree();
    let timepoints = sweep.timepoints();
    let half_width = sweep.bar_width / 2.0;
    let travel = 2.0 * sweep.eccentricity / (sweep.bar_steps - 1) as f64;
    let mut data = vec![0.0; rows * cols * timepoints];

    for row in 0..rows {
        let y = ((rows - 1) as f64 / 2.0 - row as f64) / ppd;
        for col in 0..cols {
            let x = (col as f64 - (cols - 1) as f64 / 2.0) / ppd;
            if f64::hypot(x, y) > sweep.eccentricity {
                continue;
            }
            let series = &mut data[(row * cols + col) * timepoints..][..timepoints];
            for (direction, theta) in sweep.thetas.iter().enumerate() {
                let (sin, cos) = theta.to_radians().sin_cos();
                let projection = x * cos + y * sin;
                let offset = direction * (sweep.bar_steps + sweep.blank_steps);
                for step in 0..sweep.bar_steps {
                    let centre = -sweep.eccentricity + step as f64 * travel;
                    if (projection - centre).abs() <= half_width {
                        series[offset + step] = 1.0;
                    }
                }
            }
        }
    }

    Stimulus::new(data, rows, cols, timepoints, ppd, tr_length)
}

use std::env;
use std::error::Error;
use std::path::PathBuf;

use anyhow::bail;
use clap::Parser;
use stanza::renderer::console::Console;
use stanza::renderer::Renderer;
use stanza::style::{HAlign, Header, MinWidth, Styles};
use stanza::table::{Cell, Col, Row, Table};
use strum::IntoEnumIterator;
use tinyrand::{Rand, Seeded, Wyrand};
use tracing::{debug, info};

use prfit::file::{ReadJsonFile, WriteJsonFile};
use prfit::fit::{fit, FitConfig, FitResult};
use prfit::hrf::{DoubleGamma, HrfProvider, Impulse};
use prfit::model::{ForwardModel, ModelConfig};
use prfit::params::{Parameter, ParameterVector};
use prfit::stimulus::{simulate_bar_stimulus, BarSweep, Stimulus, ViewingGeometry};

const GEOMETRY: ViewingGeometry = ViewingGeometry {
    viewing_distance: 38.0,
    screen_width: 25.0,
    pixels_across: 50,
};

#[derive(Debug, clap::Parser, Clone)]
struct Args {
    /// horizontal position of the generating receptive field, in degrees
    #[clap(long, default_value_t = -2.24, allow_negative_numbers = true)]
    x: f64,

    /// vertical position of the generating receptive field, in degrees
    #[clap(long, default_value_t = 1.58, allow_negative_numbers = true)]
    y: f64,

    /// size of the generating receptive field, in degrees
    #[clap(long, default_value_t = 1.23)]
    sigma: f64,

    /// compressive exponent of the generating receptive field
    #[clap(long, default_value_t = 0.9)]
    n: f64,

    /// response gain of the generating receptive field
    #[clap(long, default_value_t = 1.0)]
    beta: f64,

    /// HRF delay, in seconds
    #[clap(long, default_value_t = 0.2, allow_negative_numbers = true)]
    hrf_delay: f64,

    /// skip hemodynamic convolution
    #[clap(long)]
    impulse: bool,

    /// spatial resampling factor applied to the stimulus
    #[clap(long, default_value_t = 1.0)]
    scale: f64,

    /// grid points per parameter, when no configuration file is given
    #[clap(short = 'r', long, default_value_t = 4)]
    resolution: usize,

    /// amplitude of uniform noise added to the synthesised response
    #[clap(long, default_value_t = 0.0)]
    noise: f64,

    /// noise seed
    #[clap(long, default_value_t = 0)]
    seed: u64,

    /// JSON fit configuration
    #[clap(short = 'c', long)]
    config: Option<PathBuf>,

    /// write the JSON fit result to this file
    #[clap(short = 'o', long)]
    out: Option<PathBuf>,
}
impl Args {
    fn validate(&self) -> anyhow::Result<()> {
        if self.noise < 0.0 {
            bail!("noise amplitude cannot be negative");
        }
        if self.scale <= 0.0 {
            bail!("scale factor must be positive");
        }
        Ok(())
    }

    fn truth(&self) -> ParameterVector {
        ParameterVector::new(self.x, self.y, self.sigma, self.n, self.beta)
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    if env::var("RUST_BACKTRACE").is_err() {
        env::set_var("RUST_BACKTRACE", "full")
    }
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info")
    }
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    args.validate()?;
    debug!("args: {args:?}");

    let mut stimulus = simulate_bar_stimulus(&GEOMETRY, GEOMETRY.pixels_across, &BarSweep::default(), 1.0)?;
    if args.scale != 1.0 {
        stimulus = stimulus.resample(args.scale)?;
    }
    info!(
        "stimulus: {}×{} pixels, {} time points, {:.4} pixels per degree",
        stimulus.rows(),
        stimulus.cols(),
        stimulus.timepoints(),
        stimulus.pixels_per_degree()
    );

    let config = match &args.config {
        Some(path) => FitConfig::read_json_file(path)?,
        None => FitConfig::for_stimulus(&stimulus, args.resolution),
    };
    let result = if args.impulse {
        run(&stimulus, Impulse, &args, &config)?
    } else {
        run(&stimulus, DoubleGamma::default(), &args, &config)?
    };

    info!(
        "fitted in {:?} (coarse: {:?}, refine: {:?}, overloaded: {:?}); {} grid points, R² = {:.6}",
        result.timings.coarse + result.timings.refine + result.timings.overloaded,
        result.timings.coarse,
        result.timings.refine,
        result.timings.overloaded,
        result.grid_evaluations,
        result.rsquared
    );
    info!("estimates:\n{}", Console::default().render(&tabulate_estimates(&args.truth(), &result)));
    info!(
        "overloaded:\n{}",
        Console::default().render(&tabulate_overloaded(&args.truth(), &result))
    );
    if !result.converged() {
        info!("refinement did not converge after {} steps", result.refinement.steps);
    }
    if result.diverged {
        info!(
            "refined and overloaded estimates diverge by {:.6} in {}",
            result.divergence.1, result.divergence.0
        );
    }

    if let Some(path) = &args.out {
        result.write_json_file(path)?;
        info!("wrote result to {}", path.display());
    }
    Ok(())
}

fn run<H: HrfProvider>(
    stimulus: &Stimulus,
    hrf: H,
    args: &Args,
    config: &FitConfig,
) -> Result<FitResult, Box<dyn Error>> {
    let model_config = ModelConfig {
        hrf_delay: args.hrf_delay,
        ..ModelConfig::default()
    };
    let model = ForwardModel::new(stimulus, hrf, model_config)?;
    let mut observed = model.predict(&args.truth())?;
    if args.noise > 0.0 {
        let mut rand = Wyrand::seed(args.seed);
        for value in observed.iter_mut() {
            let uniform = rand.next_u64() as f64 / u64::MAX as f64;
            *value += args.noise * (2.0 * uniform - 1.0);
        }
    }
    Ok(fit(&model, &observed, config)?)
}

fn tabulate_estimates(truth: &ParameterVector, result: &FitResult) -> Table {
    let mut table = Table::default()
        .with_cols(vec![
            Col::new(Styles::default().with(MinWidth(10))),
            Col::new(Styles::default().with(MinWidth(10))),
            Col::new(Styles::default().with(MinWidth(10))),
            Col::new(Styles::default().with(MinWidth(10))),
        ])
        .with_row(Row::new(
            Styles::default().with(Header(true)),
            vec!["Parameter".into(), "True".into(), "Ballpark".into(), "Estimate".into()],
        ));
    table.push_rows(Parameter::iter().map(|parameter| {
        Row::new(
            Styles::default(),
            vec![
                Cell::new(Styles::default(), format!("{parameter}").into()),
                Cell::new(
                    Styles::default().with(HAlign::Right),
                    format!("{:.6}", truth[parameter]).into(),
                ),
                Cell::new(
                    Styles::default().with(HAlign::Right),
                    format!("{:.6}", result.ballpark()[parameter]).into(),
                ),
                Cell::new(
                    Styles::default().with(HAlign::Right),
                    format!("{:.6}", result.estimate()[parameter]).into(),
                ),
            ],
        )
    }));
    table
}

fn tabulate_overloaded(truth: &ParameterVector, result: &FitResult) -> Table {
    const LABELS: [&str; 5] = ["θ", "ρ", "σ/√n", "n", "β"];
    let expected = [truth.theta(), truth.rho(), truth.effective_sigma(), truth.n, truth.beta];
    let mut table = Table::default()
        .with_cols(vec![
            Col::new(Styles::default().with(MinWidth(10))),
            Col::new(Styles::default().with(MinWidth(10))),
            Col::new(Styles::default().with(MinWidth(10))),
        ])
        .with_row(Row::new(
            Styles::default().with(Header(true)),
            vec!["Quantity".into(), "True".into(), "Overloaded".into()],
        ));
    table.push_rows(
        LABELS
            .iter()
            .zip(expected)
            .zip(result.overloaded_estimate())
            .map(|((label, expected), actual)| {
                Row::new(
                    Styles::default(),
                    vec![
                        Cell::new(Styles::default(), label.to_string().into()),
                        Cell::new(Styles::default().with(HAlign::Right), format!("{expected:.6}").into()),
                        Cell::new(Styles::default().with(HAlign::Right), format!("{actual:.6}").into()),
                    ],
                )
            }),
    );
    table
}

use criterion::{criterion_group, criterion_main, Criterion};

use prfit::fit::{fit, FitConfig};
use prfit::hrf::DoubleGamma;
use prfit::model::{ForwardModel, ModelConfig};
use prfit::params::ParameterVector;
use prfit::stimulus::{simulate_bar_stimulus, BarSweep, ViewingGeometry};

fn criterion_benchmark(c: &mut Criterion) {
    let geometry = ViewingGeometry {
        viewing_distance: 38.0,
        screen_width: 25.0,
        pixels_across: 50,
    };
    let sweep = BarSweep {
        bar_steps: 16,
        blank_steps: 2,
        ..BarSweep::default()
    };
    let stimulus = simulate_bar_stimulus(&geometry, 50, &sweep, 1.0).unwrap();
    let model = ForwardModel::new(&stimulus, DoubleGamma::default(), ModelConfig::default()).unwrap();
    let observed = model.predict(&ParameterVector::new(-2.24, 1.58, 1.23, 0.9, 1.0)).unwrap();
    let config = FitConfig::for_stimulus(&stimulus, 3);

    let mut group = c.benchmark_group("cri_fit");
    group.sample_size(10);
    group.bench_function("cri_fit_short_sweep", |b| {
        b.iter(|| fit(&model, &observed, &config).unwrap());
    });
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);

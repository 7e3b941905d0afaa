use criterion::{criterion_group, criterion_main, Criterion};
use spn_boot::{bootstrap_correlators, RawCorrelatorSet};
use spn_fit::{
    minimize_chisquare, ChannelModel, FitForm, FitMode, FitOpts, FitSpec, ParameterSpec,
    PlateauWindow,
};

fn synthetic_set(configs: usize, nt: usize) -> RawCorrelatorSet {
    let rows = (0..configs)
        .map(|c| {
            let wobble = 1.0 + 0.01 * ((c % 13) as f64 - 6.0);
            (0..nt)
                .map(|t| {
                    let jitter = 1.0 + 0.002 * (((c * 5 + t * 3) % 7) as f64 - 3.0);
                    wobble * jitter * FitForm::AmplitudeCosh.evaluate(t as f64, &[0.4, 1.0], nt)
                })
                .collect()
        })
        .collect();
    RawCorrelatorSet::new("id", rows).unwrap()
}

fn bench_fit(c: &mut Criterion) {
    let nt = 48;
    let spec = FitSpec::new(
        vec![
            ParameterSpec::new("mass", 0.01, 5.0),
            ParameterSpec::new("amplitude", 0.0, 5.0),
        ],
        vec![ChannelModel {
            correlator: "id".into(),
            form: FitForm::AmplitudeCosh,
            parameters: vec![0, 1],
        }],
    )
    .unwrap();
    let ensemble = bootstrap_correlators(&[synthetic_set(200, nt)], 50, 1).unwrap();
    let window = PlateauWindow::new(10, 20, nt).unwrap();
    let opts = FitOpts::default();

    c.bench_function("central_fit_11_points", |b| {
        b.iter(|| {
            let _ = minimize_chisquare(&ensemble, &spec, window, nt, FitMode::Central, &opts);
        });
    });
    c.bench_function("resampled_fit_50_draws", |b| {
        b.iter(|| {
            let _ = minimize_chisquare(&ensemble, &spec, window, nt, FitMode::Resampled, &opts);
        });
    });
}

criterion_group!(benches, bench_fit);
criterion_main!(benches);

use proptest::prelude::*;
use spn_boot::{bootstrap_correlators, symmetrize, RawCorrelatorSet, Symmetry};

fn ramp_set(name: &str, configs: usize, nt: usize, offset: f64) -> RawCorrelatorSet {
    let rows = (0..configs)
        .map(|c| {
            (0..nt)
                .map(|t| offset + ((c * 7 + t * 3) % 11) as f64 + 0.25 * t as f64)
                .collect()
        })
        .collect();
    RawCorrelatorSet::new(name, rows).unwrap()
}

#[test]
fn fixed_seed_reproduces_draws() {
    let sets = [ramp_set("g5", 20, 8, 1.0), ramp_set("g5_g0g5_re", 20, 8, -3.0)];
    let a = bootstrap_correlators(&sets, 50, 99).unwrap();
    let b = bootstrap_correlators(&sets, 50, 99).unwrap();
    assert_eq!(a, b);

    let c = bootstrap_correlators(&sets, 50, 100).unwrap();
    assert_ne!(a.selections, c.selections);
}

#[test]
fn bootstrap_mean_converges_to_sample_mean() {
    let set = ramp_set("g5", 40, 6, 2.0);
    let direct = set.sample_mean();
    let ensemble = bootstrap_correlators(&[set], 20_000, 5).unwrap();
    let channel = &ensemble.channels[0];
    for (t, (boot, exact)) in channel.means().iter().zip(&direct).enumerate() {
        // Standard error of the bootstrap mean is error / sqrt(B).
        let tolerance = 5.0 * channel.errors()[t] / (20_000f64).sqrt() + 1e-12;
        assert!(
            (boot - exact).abs() <= tolerance,
            "slice {t}: bootstrap {boot} vs direct {exact}"
        );
    }
}

#[test]
fn channels_share_index_draws() {
    // The second channel is an exact multiple of the first, so shared picks
    // keep every draw an exact multiple as well.
    let base = ramp_set("a", 15, 5, 0.5);
    let scaled_rows = base
        .configurations()
        .iter()
        .map(|row| row.iter().map(|v| -2.0 * v).collect())
        .collect();
    let scaled = RawCorrelatorSet::new("b", scaled_rows).unwrap();
    let ensemble = bootstrap_correlators(&[base, scaled], 30, 3).unwrap();
    for (draw_a, draw_b) in ensemble.channels[0]
        .draws
        .iter()
        .zip(&ensemble.channels[1].draws)
    {
        for (x, y) in draw_a.iter().zip(draw_b) {
            assert!((y + 2.0 * x).abs() < 1e-12);
        }
    }
}

proptest! {
    #[test]
    fn resample_shapes_hold(configs in 1usize..30, nt in 2usize..12, samples in 1usize..40, seed in any::<u64>()) {
        let set = ramp_set("g5", configs, nt, 0.0);
        let ensemble = bootstrap_correlators(&[set], samples, seed).unwrap();
        prop_assert_eq!(ensemble.draw_count(), samples);
        prop_assert_eq!(ensemble.config_count, configs);
        for picks in &ensemble.selections {
            prop_assert_eq!(picks.len(), configs);
            prop_assert!(picks.iter().all(|&idx| idx < configs));
        }
        let channel = &ensemble.channels[0];
        prop_assert_eq!(channel.draws.len(), samples);
        prop_assert!(channel.draws.iter().all(|draw| draw.len() == nt));
        prop_assert_eq!(channel.nt(), nt);
    }

    #[test]
    fn symmetrize_is_idempotent(values in prop::collection::vec(-1e3f64..1e3, 2..40), antisymmetric in any::<bool>()) {
        let symmetry = if antisymmetric { Symmetry::Antisymmetric } else { Symmetry::Symmetric };
        let once = symmetrize(&values, symmetry);
        let twice = symmetrize(&once, symmetry);
        prop_assert_eq!(once.len(), values.len());
        for (a, b) in once.iter().zip(&twice) {
            prop_assert!((a - b).abs() <= 1e-9 * (1.0 + a.abs()));
        }
    }
}

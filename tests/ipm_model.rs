use approx::assert_relative_eq;
use ipm_rs::{
    derive_all, simulate, summarize, to_record_batch, CpuLogpFunc, DrawScale, IpmLogp, IpmModel,
    IpmSettings, LogpError, Model, SimulationSettings,
};
use pretty_assertions::assert_eq;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

fn model(seed: u64) -> (IpmModel, Vec<f64>) {
    let settings = SimulationSettings::default();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let sim = simulate(&settings, &mut rng).unwrap();

    let mut truth = vec![settings.sigma_y];
    truth.extend(&sim.n1);
    truth.extend(&sim.nad);
    truth.extend([settings.sjuv, settings.sad, settings.p, settings.fec]);

    let model = IpmModel::new(sim.data, IpmSettings::default()).unwrap();
    (model, truth)
}

#[test]
fn density_at_simulated_truth() {
    let (model, truth) = model(42);
    let logp = model.logp_func().unwrap();
    assert_eq!(logp.dim(), truth.len());
    let value = logp.log_density(&truth);
    assert!(value.is_finite());

    let mut worse = truth.clone();
    let p = model.layout().mean_p();
    worse[p] = 0.05;
    assert!(logp.log_density(&worse) < value);
}

#[test]
fn unconstrained_gradient_matches_differences() {
    let (model, _) = model(7);
    let mut logp = model.logp_func().unwrap();
    let dim = logp.dim();
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let mut position = vec![0.; dim];
    model.init_position(&mut rng, &mut position).unwrap();

    let mut grad = vec![0.; dim];
    logp.logp(&position, &mut grad).unwrap();

    let h = 1e-6;
    let mut scratch = vec![0.; dim];
    for i in 0..dim {
        let mut shifted = position.clone();
        shifted[i] += h;
        let up = logp.logp(&shifted, &mut scratch).unwrap();
        shifted[i] -= 2. * h;
        let down = logp.logp(&shifted, &mut scratch).unwrap();
        let numeric = (up - down) / (2. * h);
        assert_relative_eq!(grad[i], numeric, epsilon = 1e-4, max_relative = 1e-4);
    }
}

#[test]
fn chains_evaluate_independently() {
    let (model, _) = model(3);
    let dim = model.layout().dim();

    let run = |seed: u64| {
        let mut logp: IpmLogp = model.logp_func().unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut position = vec![0.; dim];
        let mut grad = vec![0.; dim];
        (0..20)
            .map(|_| {
                model.init_position(&mut rng, &mut position).unwrap();
                logp.logp(&position, &mut grad).unwrap()
            })
            .collect::<Vec<_>>()
    };

    let parallel: Vec<_> = (0..4u64).into_par_iter().map(run).collect();
    let serial: Vec<_> = (0..4u64).map(run).collect();
    assert_eq!(parallel, serial);
}

#[test]
fn rejected_points_are_recoverable() {
    let (model, _) = model(9);
    let mut logp = model.logp_func().unwrap();
    let dim = logp.dim();
    let mut position = vec![0.; dim];
    model
        .init_position(&mut ChaCha8Rng::seed_from_u64(2), &mut position)
        .unwrap();

    // Adults in the second year far above the first year's total.
    position[model.layout().nad().start + 1] = 20.;
    let mut grad = vec![0.; dim];
    let err = logp.logp(&position, &mut grad).unwrap_err();
    assert!(err.is_recoverable());

    let mut short = vec![0.; dim - 1];
    let err = logp.logp(&position, &mut short).unwrap_err();
    assert!(!err.is_recoverable());
}

#[test]
fn posterior_growth_rates() {
    let (model, _) = model(11);
    let mut rng = ChaCha8Rng::seed_from_u64(4);
    let draws: Vec<Vec<f64>> = (0..200).map(|_| model.init_constrained(&mut rng)).collect();

    let derived = derive_all(model.layout(), &draws, DrawScale::Constrained).unwrap();
    assert_eq!(derived.len(), draws.len());
    let intervals = model.data().intervals();
    assert!(derived.iter().all(|d| d.lambda.len() == intervals));

    let summary = summarize(&derived);
    assert_eq!(summary.len(), intervals);
    for s in &summary {
        assert_eq!(s.dropped, 0);
        assert!(s.mean > 0.);
        assert!(s.q025 <= s.median && s.median <= s.q975);
    }

    let batch = to_record_batch(&derived).unwrap();
    assert_eq!(batch.num_rows(), draws.len());
    assert_eq!(batch.schema().field(0).name(), "lambda");
}

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use ipm_rs::{
    build_marray, simulate, CpuLogpFunc, IpmModel, IpmSettings, Model, SimulationSettings,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn make_model(nyears: usize) -> IpmModel {
    let settings = SimulationSettings {
        nyears,
        marked_juveniles: vec![80; nyears - 1],
        marked_adults: vec![30; nyears - 1],
        broods: vec![15; nyears - 1],
        ..Default::default()
    };
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let sim = simulate(&settings, &mut rng).unwrap();
    IpmModel::new(sim.data, IpmSettings::default()).unwrap()
}

fn criterion_benchmark(c: &mut Criterion) {
    for nyears in [10, 40] {
        let model = make_model(nyears);
        let mut logp = model.logp_func().unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut position = vec![0.; logp.dim()];
        let mut grad = vec![0.; logp.dim()];
        model.init_position(&mut rng, &mut position).unwrap();

        c.bench_function(&format!("logp + grad {nyears} years"), |b| {
            b.iter(|| logp.logp(black_box(&position), black_box(&mut grad)).unwrap())
        });

        c.bench_function(&format!("init + logp {nyears} years"), |b| {
            b.iter_batched(
                || ChaCha8Rng::seed_from_u64(1),
                |mut rng| {
                    model.init_position(&mut rng, &mut position).unwrap();
                    logp.logp(&position, &mut grad).unwrap()
                },
                BatchSize::SmallInput,
            )
        });

        let rates = vec![0.5; nyears - 1];
        c.bench_function(&format!("build marray {nyears} years"), |b| {
            b.iter(|| build_marray(black_box(nyears), &rates, &rates, &rates).unwrap())
        });
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);

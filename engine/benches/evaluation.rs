use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use curve::{Catalog, CoordinateSystem, CurveModel};
use engine::{Algorithm, Composer, Direction, EngineConfig, ExecutionEngine};
use num_bigint::BigUint;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_scalar(rng: &mut StdRng, bits: u32) -> BigUint {
    let bytes: Vec<u8> = (0..bits.div_ceil(8)).map(|_| rng.random()).collect();
    BigUint::from_bytes_le(&bytes) >> (bytes.len() as u32 * 8 - bits)
}

fn bench_evaluate(c: &mut Criterion) {
    let curve = Arc::new(CurveModel::secp256r1());
    let composer = Composer::new(Arc::new(Catalog::standard().unwrap()));
    let mut rng = StdRng::seed_from_u64(42);
    let scalar = random_scalar(&mut rng, 256);
    let point = curve.random_point(&mut rng);

    let algorithms = [
        Algorithm::DoubleAndAdd {
            direction: Direction::LeftToRight,
            always: true,
        },
        Algorithm::Ladder,
        Algorithm::SignedWindow { width: 5 },
    ];
    let mut group = c.benchmark_group("evaluate_p256");
    for algorithm in algorithms {
        let plan = composer
            .compose(&curve, CoordinateSystem::Projective, algorithm, 256)
            .unwrap();
        for (label, config) in [
            ("interpreted", EngineConfig::default()),
            ("compiled", EngineConfig::compiled()),
        ] {
            let engine = ExecutionEngine::new(config);
            engine.evaluate(&plan, &point, &scalar).unwrap();
            group.bench_with_input(BenchmarkId::new(label, algorithm), &plan, |bencher, plan| {
                bencher.iter(|| black_box(engine.evaluate(plan, black_box(&point), black_box(&scalar)).unwrap()))
            });
        }
    }
    group.finish();
}

fn bench_compose(c: &mut Criterion) {
    let curve = Arc::new(CurveModel::secp256k1());
    let catalog = Arc::new(Catalog::standard().unwrap());
    c.bench_function("compose_wnaf_256", |bencher| {
        bencher.iter(|| {
            // fresh composer so the plan cache is bypassed
            let composer = Composer::new(catalog.clone());
            black_box(
                composer
                    .compose(&curve, CoordinateSystem::Jacobian, Algorithm::SignedWindow { width: 4 }, 256)
                    .unwrap(),
            )
        })
    });
}

criterion_group!(benches, bench_evaluate, bench_compose);
criterion_main!(benches);

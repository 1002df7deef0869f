use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use partrec::energy_loss::{Material, RangeTable};
use partrec::events::event_batch::EventBatch;
use partrec::{
    Acceptance, DetectorArray, DetectorSpec, EventHits, PartRec, ReconParams, RunContext,
    TrueParticle,
};

/// Ring of `sectors` chamber/silicon/CsI telescopes, each chamber shared by two silicon pads.
fn ring_array(sectors: usize) -> DetectorArray {
    let gas: Arc<dyn RangeTable> = Arc::new(Material::c3f8());
    let si: Arc<dyn RangeTable> = Arc::new(Material::silicon());
    let csi: Arc<dyn RangeTable> = Arc::new(Material::csi());
    let width = 360.0 / sectors as f64;
    let mut builder = DetectorArray::builder("ring");

    for s in 0..sectors {
        let phi0 = s as f64 * width;
        let ci = format!("CI_{s}");
        builder = builder.detector(
            DetectorSpec::new(&ci, "CI", Acceptance::new(5.0, 45.0, phi0, phi0 + width))
                .active_layer(gas.clone(), 15.0)
                .threshold(0.05),
        );
        for half in 0..2 {
            let phi = phi0 + half as f64 * 0.5 * width;
            let acc = Acceptance::new(5.0, 45.0, phi, phi + 0.5 * width);
            let (si_name, csi_name) = (format!("SI_{s}_{half}"), format!("CSI_{s}_{half}"));
            builder = builder
                .detector(
                    DetectorSpec::new(&si_name, "SI", acc)
                        .active_layer(si.clone(), 69.9)
                        .threshold(0.1),
                )
                .detector(
                    DetectorSpec::new(&csi_name, "CSI", acc)
                        .active_layer(csi.clone(), 902.0)
                        .threshold(0.5),
                )
                .link(&ci, &si_name)
                .link(&si_name, &csi_name);
        }
    }
    builder.build().unwrap()
}

fn random_events(engine: &PartRec, ctx: &RunContext, rng: &mut StdRng, n: usize) -> Vec<EventHits> {
    let sim = engine.simulator(ctx);
    (0..n as u64)
        .map(|i| {
            let particles: Vec<TrueParticle> = (0..rng.random_range(1..=12))
                .map(|_| {
                    let z = rng.random_range(1..=6u32);
                    let a = if z == 1 { 1 } else { 2 * z };
                    TrueParticle::new(
                        z,
                        a,
                        rng.random_range(5.0..30.0) * a as f64,
                        rng.random_range(5.0..45.0),
                        rng.random_range(0.0..360.0),
                    )
                })
                .collect();
            sim.simulate_event(i, &particles).unwrap().0
        })
        .collect()
}

fn bench_sequential(c: &mut Criterion) {
    let engine = PartRec::new(ring_array(16));
    let ctx = RunContext::new(1);
    let mut rng = StdRng::seed_from_u64(0xFEEDFACE);

    c.bench_function("reconstruct_event/sequential_groups", |b| {
        b.iter_batched(
            || random_events(&engine, &ctx, &mut rng, 200),
            |events| black_box(events.reconstruct_all(&engine, &ctx)),
            BatchSize::LargeInput,
        )
    });
}

fn bench_parallel(c: &mut Criterion) {
    let params = ReconParams::builder().parallel_groups(true).build().unwrap();
    let engine = PartRec::new(ring_array(16)).with_params(params);
    let ctx = RunContext::new(1);
    let mut rng = StdRng::seed_from_u64(0xFEEDFACE);

    c.bench_function("reconstruct_event/parallel_groups", |b| {
        b.iter_batched(
            || random_events(&engine, &ctx, &mut rng, 200),
            |events| black_box(events.reconstruct_all(&engine, &ctx)),
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default().sample_size(20);
    targets = bench_sequential, bench_parallel
);
criterion_main!(benches);

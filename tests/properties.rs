mod common;

use std::collections::HashSet;
use std::sync::Arc;

use approx::assert_relative_eq;
use common::chamber_array;
use partrec::identification::IdCode;
use partrec::energy_loss::{Branch, DetectorStack, Inversion, Layer, Material, RangeTable};
use partrec::{
    Acceptance, DetectorArray, DetectorSpec, PartRec, ReconError, RunContext, TrueParticle,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Layered random array: each detector of layer `k + 1` sits behind one or two detectors of
/// layer `k`.
fn random_array(rng: &mut StdRng, layers: usize, width: usize) -> DetectorArray {
    let si: Arc<dyn RangeTable> = Arc::new(Material::silicon());
    let name = |k: usize, i: usize| format!("L{k}_{i}");
    let mut builder = DetectorArray::builder("random");
    for k in 0..layers {
        for i in 0..width {
            builder = builder.detector(
                DetectorSpec::new(name(k, i), "SI", Acceptance::ring(0.0, 180.0))
                    .active_layer(si.clone(), 50.0),
            );
        }
    }
    for k in 1..layers {
        for i in 0..width {
            let first = rng.random_range(0..width);
            builder = builder.link(name(k - 1, first), name(k, i));
            if rng.random_bool(0.5) {
                let second = rng.random_range(0..width);
                builder = builder.link(name(k - 1, second), name(k, i));
            }
        }
    }
    builder.build().unwrap()
}

#[test]
fn test_trajectories_cover_random_arrays() {
    let mut rng = StdRng::seed_from_u64(20251016);
    for _ in 0..20 {
        let array = random_array(&mut rng, 4, 5);

        let mut covered = HashSet::new();
        for traj in array.trajectories() {
            let nodes = traj.nodes();
            assert!(array.node(traj.outermost()).is_outermost());
            assert!(array.node(traj.innermost()).is_innermost());

            let unique: HashSet<_> = nodes.iter().collect();
            assert_eq!(unique.len(), nodes.len(), "trajectory is not a simple path");
            for w in nodes.windows(2) {
                assert!(array.node(w[0]).in_front().contains(&w[1]));
                assert_eq!(array.node(w[0]).group(), array.node(w[1]).group());
            }
            covered.extend(nodes.iter().copied());
        }
        assert_eq!(covered.len(), array.nodes().len());

        for node in array.nodes() {
            let stopping = node.stopping_trajectories();
            assert_eq!(stopping.is_empty(), !node.is_outermost());
        }
    }
}

fn windowed_si() -> DetectorStack {
    let myl: Arc<dyn RangeTable> = Arc::new(Material::mylar());
    let si: Arc<dyn RangeTable> = Arc::new(Material::silicon());
    DetectorStack::new(vec![Layer::new(myl, 0.2), Layer::new(si, 69.9)], 1).unwrap()
}

#[test]
fn test_high_branch_round_trip() {
    let stack = windowed_si();
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..200 {
        let z: u32 = rng.random_range(1..=20);
        let a = if z == 1 { 1 } else { 2 * z };
        let (_, e_pt) = stack.max_energy_loss(z, a).unwrap();
        let limit = Material::silicon().validity_limit(z, a);
        let e = rng.random_range(1.05 * e_pt..0.9 * limit);

        let de = stack.energy_loss(z, a, e).unwrap();
        match stack.incident_energy(z, a, de, Branch::High).unwrap() {
            Inversion::Resolved(back) => assert_relative_eq!(back, e, max_relative = 1e-6),
            other => panic!("unexpected {other:?}"),
        }
    }
}

#[test]
fn test_low_branch_round_trip() {
    let stack = windowed_si();
    for z in 1..=10u32 {
        let a = 2 * z;
        let threshold = stack.threshold_energy(z, a).unwrap();
        let (_, e_pt) = stack.max_energy_loss(z, a).unwrap();
        for k in 1..10 {
            let e = threshold + (e_pt - threshold) * k as f64 / 10.0;
            let de = stack.energy_loss(z, a, e).unwrap();
            let back = stack.incident_energy(z, a, de, Branch::Low).unwrap().energy();
            assert_relative_eq!(back, e, max_relative = 1e-9);
        }
    }
}

#[test]
fn test_punch_through_energy_grows_with_charge() {
    let stack = windowed_si();
    let mut previous = 0.0;
    for z in 1..=30u32 {
        let (de_max, e_pt) = stack.max_energy_loss(z, 2 * z).unwrap();
        assert!(e_pt > previous, "Z={z}: {e_pt} <= {previous}");
        assert!(de_max > 0.0 && de_max <= e_pt);
        previous = e_pt;
    }
}

#[test]
fn test_inversion_out_of_range_is_reported() {
    let stack = windowed_si();
    let limit = Material::silicon().validity_limit(2, 4);
    assert!(matches!(
        stack.energy_loss(2, 4, 1.5 * limit),
        Err(ReconError::InversionOutOfRange { z: 2, a: 4, .. })
    ));

    let tiny = 0.5 * stack.energy_loss(2, 4, limit).unwrap();
    assert!(matches!(
        stack.incident_energy(2, 4, tiny, Branch::High),
        Err(ReconError::InversionOutOfRange { .. })
    ));
    assert_eq!(
        stack.incident_energy(2, 4, 0.0, Branch::Low),
        Err(ReconError::NonPositiveEnergyLoss(0.0))
    );

    let (de_max, e_pt) = stack.max_energy_loss(2, 4).unwrap();
    assert_eq!(
        stack.incident_energy(2, 4, 2.0 * de_max, Branch::Low).unwrap(),
        Inversion::Saturated {
            e_at_max: e_pt,
            de_max
        }
    );
}

#[test]
fn test_random_events_seed_once_and_terminate() {
    let engine = PartRec::new(chamber_array());
    let ctx = RunContext::new(1);
    let sim = engine.simulator(&ctx);
    let mut rng = StdRng::seed_from_u64(99);

    for n in 0..100u64 {
        let particles: Vec<TrueParticle> = (0..rng.random_range(1..=4))
            .map(|_| {
                let z = rng.random_range(1..=3);
                let a = if z == 1 { 1 } else { 2 * z };
                TrueParticle::new(
                    z,
                    a,
                    rng.random_range(5.0..150.0),
                    rng.random_range(10.0..20.0),
                    rng.random_range(0.0..360.0),
                )
            })
            .collect();
        let (hits, _) = sim.simulate_event(n, &particles).unwrap();
        let event = engine.reconstruct_event(&ctx, &hits);

        let stops: HashSet<_> = event.particles.iter().map(|p| p.stopping_node()).collect();
        assert_eq!(stops.len(), event.particles.len(), "a detector seeded twice");
        for g in &event.groups {
            assert!(g.passes >= 1 && g.passes <= g.multiplicity);
        }
        for p in &event.particles {
            assert_ne!(p.id_code, IdCode::NotAttempted);
        }
    }
}

#[test]
fn test_builder_rejects_bad_geometry() {
    let si: Arc<dyn RangeTable> = Arc::new(Material::silicon());
    let det = |name: &str| {
        DetectorSpec::new(name, "SI", Acceptance::ring(0.0, 90.0)).active_layer(si.clone(), 50.0)
    };

    let err = DetectorArray::builder("cycle")
        .detector(det("A"))
        .detector(det("B"))
        .detector(det("C"))
        .link("A", "B")
        .link("B", "C")
        .link("C", "A")
        .build()
        .unwrap_err();
    assert!(matches!(err, ReconError::GeometryCycle(_)));

    let err = DetectorArray::builder("unknown")
        .detector(det("A"))
        .link("A", "Z")
        .build()
        .unwrap_err();
    assert_eq!(err, ReconError::UnknownDetector("Z".into()));

    let err = DetectorArray::builder("no active")
        .detector(
            DetectorSpec::new("A", "SI", Acceptance::ring(0.0, 90.0)).dead_layer(si.clone(), 1.0),
        )
        .build()
        .unwrap_err();
    assert_eq!(err, ReconError::ActiveLayerCount("A".into(), 0));
}

mod common;

use approx::assert_relative_eq;
use std::sync::Arc;

use common::{assert_identity, chamber_array, si_si_telescope, stopped_in, uneven_branch_array};
use partrec::calibration::CalibrationStatus;
use partrec::constants::NodeId;
use partrec::energy_loss::Material;
use partrec::identification::IdCode;
use partrec::target::SlabTarget;
use partrec::{
    DetectionOutcome, DetectorHit, EventHits, FiringMode, PartRec, ReconParams, RunContext,
    RunMode, TrueParticle,
};

#[test]
fn test_simple_stop() {
    let engine = PartRec::new(si_si_telescope());
    let ctx = RunContext::new(1);
    let (hits, outcomes) = engine
        .simulator(&ctx)
        .simulate_event(1, &[TrueParticle::new(2, 4, 50.0, 15.0, 0.0)])
        .unwrap();
    assert!(matches!(outcomes[0], DetectionOutcome::Stopped { .. }));

    let event = engine.reconstruct_event(&ctx, &hits);
    assert_eq!(event.multiplicity(), 1);
    assert_eq!(event.run_number, 1);

    let p = &event.particles[0];
    assert_identity(p, 2, 4, 50.0, 1e-6);
    assert_eq!(p.id_code, IdCode::Identified);
    assert!(p.z_measured && p.a_measured);
    assert_eq!(p.calibration, CalibrationStatus::Normal);
    assert_eq!(p.stopping_node(), engine.array().node_id("SI2").unwrap());
    assert_relative_eq!(p.theta, 15.0);

    let group = event.groups[0];
    assert_eq!((group.multiplicity, group.identified, group.unidentified), (1, 1, 0));
    assert_eq!(group.passes, 1);
}

#[test]
fn test_simple_stop_behind_target() {
    let engine = PartRec::new(si_si_telescope());
    let gold = SlabTarget::new(Arc::new(Material::gold()), 2.0).unwrap();
    let ctx = RunContext::new(1).with_target(Arc::new(gold));
    let (hits, _) = engine
        .simulator(&ctx)
        .simulate_event(12, &[TrueParticle::new(2, 4, 50.0, 15.0, 0.0)])
        .unwrap();

    // The telescope only sees what is left after half the target.
    assert!(hits.total_energy() < 50.0);

    let event = engine.reconstruct_event(&ctx, &hits);
    let p = &event.particles[0];
    assert_eq!(p.id_code, IdCode::Identified);
    assert_eq!(p.calibration, CalibrationStatus::Normal);
    assert!(p.target_correction > 0.0);
    assert_relative_eq!(hits.total_energy(), 50.0 - p.target_correction, epsilon = 1e-6);
    assert_identity(p, 2, 4, 50.0, 1e-6);
}

#[test]
fn test_punch_through() {
    let engine = PartRec::new(si_si_telescope());
    let ctx = RunContext::new(1);
    let (hits, outcomes) = engine
        .simulator(&ctx)
        .simulate_event(2, &[TrueParticle::new(2, 4, 500.0, 15.0, 0.0)])
        .unwrap();
    let DetectionOutcome::PunchThrough { residual, .. } = outcomes[0] else {
        panic!("expected punch-through, got {:?}", outcomes[0]);
    };

    let event = engine.reconstruct_event(&ctx, &hits);
    let p = &event.particles[0];
    assert_eq!(p.id_code, IdCode::PunchThrough);
    assert_eq!(p.z, 2);
    assert_eq!(p.calibration, CalibrationStatus::PunchThrough);
    assert_relative_eq!(p.energy, 500.0, epsilon = 1e-3);
    assert_relative_eq!(p.residual_energy, residual, epsilon = 1e-3);
}

#[test]
fn test_pile_up_sharing_in_chamber() {
    let engine = PartRec::new(chamber_array());
    let ctx = RunContext::new(7);
    let (hits, _) = engine
        .simulator(&ctx)
        .simulate_event(
            3,
            &[
                TrueParticle::new(2, 4, 20.0, 15.0, 90.0),
                TrueParticle::new(2, 4, 18.0, 15.0, 270.0),
            ],
        )
        .unwrap();

    let event = engine.reconstruct_event(&ctx, &hits);
    assert_eq!(event.multiplicity(), 2);
    assert_eq!(event.groups.len(), 1);
    assert_eq!(event.groups[0].passes, 2);
    assert_eq!(event.groups[0].identified, 1);
    assert_eq!(event.groups[0].unidentified, 1);

    // First trajectory of the group: settled with a lower-bound charge while the chamber was
    // still shared, chamber contribution calculated.
    let a = stopped_in(engine.array(), &event, "SI_A");
    assert_eq!(a.id_code, IdCode::MultiHitFirstStage);
    assert!(!a.z_measured);
    assert_eq!(a.calibration, CalibrationStatus::PartiallyCalculated);
    assert_identity(a, 2, 4, 20.0, 1e-6);

    // Second one: identified from what is left in the chamber.
    let b = stopped_in(engine.array(), &event, "SI_B");
    assert_eq!(b.id_code, IdCode::CoherencyReclassified);
    assert!(b.is_identified());
    assert_eq!(b.calibration, CalibrationStatus::Normal);
    assert_identity(b, 2, 4, 18.0, 1e-6);

    assert_relative_eq!(event.total_energy(), hits.total_energy(), epsilon = 1e-6);
}

#[test]
fn test_coherency_after_calibrated_sharer() {
    let engine = PartRec::new(chamber_array());
    let ctx = RunContext::new(7);
    let (hits, outcomes) = engine
        .simulator(&ctx)
        .simulate_event(
            4,
            &[
                TrueParticle::new(2, 4, 60.0, 15.0, 90.0),
                TrueParticle::new(2, 4, 18.0, 15.0, 270.0),
            ],
        )
        .unwrap();
    let csi_a = engine.array().node_id("CSI_A").unwrap();
    assert_eq!(outcomes[0], DetectionOutcome::Stopped { node: csi_a });

    let event = engine.reconstruct_event(&ctx, &hits);
    assert_eq!(event.groups[0].passes, 2);

    let fast = stopped_in(engine.array(), &event, "CSI_A");
    assert_eq!(fast.id_code, IdCode::Identified);
    assert_eq!(fast.chain.len(), 3);
    assert_eq!(fast.calibration, CalibrationStatus::PartiallyCalculated);
    assert_identity(fast, 2, 4, 60.0, 1e-6);

    let slow = stopped_in(engine.array(), &event, "SI_B");
    assert_eq!(slow.id_code, IdCode::CoherencyReclassified);
    assert_identity(slow, 2, 4, 18.0, 1e-6);
}

#[test]
fn test_geometry_incoherency() {
    let engine = PartRec::new(chamber_array());
    let ctx = RunContext::new(7);
    let mut hits = EventHits::new(5);
    hits.set_energy(engine.array(), "SI_A", 12.0).unwrap();
    hits.set_energy(engine.array(), "CSI_A", 30.0).unwrap();

    let event = engine.reconstruct_event(&ctx, &hits);
    assert_eq!(event.multiplicity(), 1);
    let p = &event.particles[0];
    assert_eq!(p.id_code, IdCode::GeometryIncoherency);
    assert!(!p.is_detected());
    assert!(!p.is_calibrated());
    assert_eq!(event.detected().count(), 0);
}

#[test]
fn test_innermost_fallback() {
    let engine = PartRec::new(chamber_array());
    let ctx = RunContext::new(7).with_firing(FiringMode::All);
    let ci = engine.array().node_id("CI").unwrap();
    let mut hits = EventHits::new(6);
    hits.insert(ci, DetectorHit::with_signals(2.0, &[true, false]));

    // Not every chamber signal fired: nothing seeds along the trajectories.
    let event = engine.reconstruct_event(&ctx, &hits);
    assert_eq!(event.multiplicity(), 1);
    let p = &event.particles[0];
    assert_eq!(p.chain.len(), 1);
    assert!(p.trajectory.is_none());
    assert_eq!(p.id_code, IdCode::StoppedInFirstStage);
    assert_eq!(p.z, 1);
    assert_relative_eq!(p.energy, 2.0, epsilon = 1e-9);

    let strict = PartRec::new(chamber_array())
        .with_params(ReconParams::builder().innermost_fallback(false).build().unwrap());
    assert_eq!(strict.reconstruct_event(&ctx, &hits).multiplicity(), 0);
}

#[test]
fn test_filter_mode_merges_particles() {
    let engine = PartRec::new(chamber_array());
    let ctx = RunContext::new(8).with_mode(RunMode::Filter);
    let (hits, _) = engine
        .simulator(&ctx)
        .simulate_event(
            9,
            &[
                TrueParticle::new(2, 4, 20.0, 15.0, 45.0),
                TrueParticle::new(1, 1, 4.0, 15.0, 135.0),
                TrueParticle::new(2, 4, 18.0, 15.0, 270.0),
            ],
        )
        .unwrap();

    let event = engine.reconstruct_event(&ctx, &hits);
    assert_eq!(event.multiplicity(), 2);

    let merged = stopped_in(engine.array(), &event, "SI_A");
    assert_eq!(merged.id_code, IdCode::FilterMerged);
    assert_identity(merged, 3, 5, 24.0, 1e-12);
    assert_eq!(merged.calibration, CalibrationStatus::Normal);

    let single = stopped_in(engine.array(), &event, "SI_B");
    assert_eq!(single.id_code, IdCode::Filter);
    assert_identity(single, 2, 4, 18.0, 1e-12);
}

#[test]
fn test_neutral_particle_leaves_no_trace() {
    let engine = PartRec::new(chamber_array());
    let ctx = RunContext::new(7);
    let (hits, outcomes) = engine
        .simulator(&ctx)
        .simulate_event(10, &[TrueParticle::new(0, 1, 14.0, 15.0, 90.0)])
        .unwrap();
    assert_eq!(outcomes, vec![DetectionOutcome::Neutral]);
    assert!(hits.is_empty());

    let event = engine.reconstruct_event(&ctx, &hits);
    assert_eq!(event.multiplicity(), 0);
    assert!(event.groups.is_empty());
}

#[test]
fn test_parallel_groups_match_sequential() {
    let array = chamber_array();
    let ctx = RunContext::new(7);
    let sequential = PartRec::new(array.clone());
    let parallel = PartRec::new(array)
        .with_params(ReconParams::builder().parallel_groups(true).build().unwrap());

    let (hits, _) = sequential
        .simulator(&ctx)
        .simulate_event(
            11,
            &[
                TrueParticle::new(2, 4, 20.0, 15.0, 90.0),
                TrueParticle::new(2, 4, 18.0, 15.0, 270.0),
            ],
        )
        .unwrap();
    assert_eq!(
        sequential.reconstruct_event(&ctx, &hits),
        parallel.reconstruct_event(&ctx, &hits)
    );
}

#[test]
fn test_uneven_branches_seed_one_particle() {
    let engine = PartRec::new(uneven_branch_array());
    let ctx = RunContext::new(7);
    let (hits, outcomes) = engine
        .simulator(&ctx)
        .simulate_event(13, &[TrueParticle::new(2, 4, 50.0, 15.0, 90.0)])
        .unwrap();
    let c = engine.array().node_id("C").unwrap();
    assert_eq!(outcomes[0], DetectionOutcome::Stopped { node: c });

    // (B, CI) is walked first: CI must not seed while A and C, behind it, are unclaimed.
    let event = engine.reconstruct_event(&ctx, &hits);
    assert_eq!(event.multiplicity(), 1);
    let p = &event.particles[0];
    assert_eq!(p.stopping_node(), c);
    assert_eq!(p.chain.len(), 3);
    assert_eq!(p.id_code, IdCode::Identified);
    assert_eq!(p.calibration, CalibrationStatus::Normal);
    assert_identity(p, 2, 4, 50.0, 1e-6);
    assert_eq!(event.groups[0].identified, 1);
    assert_eq!(event.groups[0].unidentified, 0);
}

#[test]
fn test_hit_on_unknown_detector_is_ignored() {
    let engine = PartRec::new(chamber_array());
    let ctx = RunContext::new(7);
    let (mut hits, _) = engine
        .simulator(&ctx)
        .simulate_event(14, &[TrueParticle::new(2, 4, 20.0, 15.0, 90.0)])
        .unwrap();
    hits.insert(NodeId(100), DetectorHit::fired(1.0, 1));

    let event = engine.reconstruct_event(&ctx, &hits);
    assert_eq!(event.multiplicity(), 1);
    assert_identity(stopped_in(engine.array(), &event, "SI_A"), 2, 4, 20.0, 1e-6);
    assert_eq!(engine.fired_groups(&hits).len(), 1);
}

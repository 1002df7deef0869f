//! # Energy calibration of reconstructed particles
//!
//! Converts the energy losses along a particle's detector chain into its kinetic energy at
//! emission.
//!
//! ## Sharing
//!
//! Several particles can cross the same detector (typically a gas chamber in front of a
//! segmented second stage). A [`SharingState`] tracks, per detector, how many unresolved
//! particles still claim it and how much of the measured energy is left once the
//! contributions of calibrated particles are removed.
//!
//! ## Procedure
//!
//! The chain is walked from the stopping detector towards the target:
//!
//! 1. Stopping detector: its residual energy is inverted into the energy entering it, on the
//!    low branch (the particle stopped) or the high branch (punch-through, or the configured
//!    branch for a lower-bound charge in an outermost detector). A loss above the curve
//!    maximum is a pile-up: the maximum is used and the particle flagged.
//! 2. Each detector in front:
//!    * still shared with other unresolved particles: the contribution is *calculated* from
//!      the energy-loss model,
//!    * otherwise the residual energy is used, plus the modelled loss in its dead layers.
//! 3. The target correction is added.
//!
//! Contributions are committed to the [`SharingState`] only when the whole chain succeeded.
use std::{collections::HashMap, fmt};

use ahash::RandomState;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::{
    constants::{MeV, NodeId},
    detector_array::DetectorArray,
    energy_loss::{Branch, Inversion},
    events::EventHits,
    identification::IdCode,
    reconstruction::ReconstructedParticle,
    target::TargetModel,
};

/// Outcome of the energy calibration of one particle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CalibrationStatus {
    #[default]
    NotCalibrated,
    /// Every contribution measured.
    Normal,
    /// At least one contribution calculated, or the stopping loss was saturated.
    PartiallyCalculated,
    /// The particle left the array; `residual_energy` holds what it carried away.
    PunchThrough,
    /// The energy could not be reconstructed.
    Uncalibrated,
}

impl CalibrationStatus {
    pub fn is_calibrated(&self) -> bool {
        matches!(
            self,
            CalibrationStatus::Normal
                | CalibrationStatus::PartiallyCalculated
                | CalibrationStatus::PunchThrough
        )
    }
}

impl fmt::Display for CalibrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Per-detector bookkeeping of energy shared between the particles of one group.
#[derive(Debug, Clone, Default)]
pub struct SharingState {
    outstanding: HashMap<NodeId, usize, RandomState>,
    residual: HashMap<NodeId, MeV, RandomState>,
    measured: HashMap<NodeId, MeV, RandomState>,
}

impl SharingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an unresolved particle crossing `chain`.
    pub fn add_particle(&mut self, chain: &[NodeId], hits: &EventHits) {
        for &node in chain {
            *self.outstanding.entry(node).or_insert(0) += 1;
            let e = hits.energy(node);
            self.measured.entry(node).or_insert(e);
            self.residual.entry(node).or_insert(e);
        }
    }

    /// Unresolved particles still crossing `node`.
    pub fn outstanding(&self, node: NodeId) -> usize {
        self.outstanding.get(&node).copied().unwrap_or(0)
    }

    /// More than one unresolved particle crosses `node`.
    pub fn is_shared(&self, node: NodeId) -> bool {
        self.outstanding(node) > 1
    }

    /// Energy of `node` not yet attributed to a calibrated particle.
    pub fn residual(&self, node: NodeId) -> MeV {
        self.residual.get(&node).copied().unwrap_or(0.0)
    }

    /// Energy measured in `node`.
    pub fn measured(&self, node: NodeId) -> MeV {
        self.measured.get(&node).copied().unwrap_or(0.0)
    }

    /// Whether the residual of `node` differs from its measurement by more than `tol`.
    pub fn is_corrected(&self, node: NodeId, tol: MeV) -> bool {
        (self.residual(node) - self.measured(node)).abs() > tol
    }

    /// Withdraw a particle without attributing it any energy.
    pub fn release(&mut self, chain: &[NodeId]) {
        for node in chain {
            if let Some(n) = self.outstanding.get_mut(node) {
                *n = n.saturating_sub(1);
            }
        }
    }

    /// Withdraw a particle and subtract its contributions from the residuals.
    pub fn commit(&mut self, contributions: &[(NodeId, MeV)]) {
        for &(node, de) in contributions {
            if let Some(n) = self.outstanding.get_mut(&node) {
                *n = n.saturating_sub(1);
            }
            if let Some(r) = self.residual.get_mut(&node) {
                *r = (*r - de).max(0.0);
            }
        }
    }
}

/// Energy calibration of the particles of one event.
#[derive(Debug, Clone, Copy)]
pub struct Calibrator<'a> {
    array: &'a DetectorArray,
    target: &'a dyn TargetModel,
    default_branch: Branch,
}

impl<'a> Calibrator<'a> {
    pub fn new(array: &'a DetectorArray, target: &'a dyn TargetModel, default_branch: Branch) -> Self {
        Calibrator {
            array,
            target,
            default_branch,
        }
    }

    fn fail(&self, p: &mut ReconstructedParticle, state: &mut SharingState, why: String) {
        warn!(chain = ?p.chain, z = p.z, a = p.a, reason = %why, "particle not calibrated");
        p.calibration = CalibrationStatus::Uncalibrated;
        p.comment(why);
        state.release(&p.chain);
    }

    fn stop_branch(&self, p: &ReconstructedParticle) -> Branch {
        let stop = self.array.node(p.stopping_node());
        match p.id_code {
            IdCode::PunchThrough => Branch::High,
            IdCode::MultiHitFirstStage | IdCode::BelowThreshold if stop.is_outermost() => {
                self.default_branch
            }
            _ => Branch::Low,
        }
    }

    /// Calibrate `p` and commit its contributions to `state`.
    ///
    /// Arguments
    /// -----------------
    /// * `p`: an identified particle (`z >= 1`).
    /// * `state`: sharing state of the particle's group.
    ///
    /// On failure the particle is marked [`CalibrationStatus::Uncalibrated`], released from
    /// `state`, and no energy is subtracted from any detector.
    pub fn calibrate(&self, p: &mut ReconstructedParticle, state: &mut SharingState) {
        if p.z == 0 || p.a == 0 {
            return self.fail(p, state, "no charge to calibrate with".into());
        }
        let (z, a) = (p.z, p.a);
        let stop_id = p.stopping_node();
        let stop = self.array.node(stop_id);

        if state.is_shared(stop_id) {
            return self.fail(p, state, format!("{} shared", stop.name()));
        }
        let e_stop = state.residual(stop_id);
        if !(e_stop > 0.0) {
            return self.fail(p, state, format!("no energy left in {}", stop.name()));
        }

        let branch = self.stop_branch(p);
        let mut partial = false;
        let mut contributions: SmallVec<[(NodeId, MeV); 4]> = SmallVec::new();

        let mut energy = match stop.stack().incident_energy(z, a, e_stop, branch) {
            Ok(Inversion::Resolved(e)) => e,
            Ok(Inversion::Saturated { e_at_max, de_max }) => {
                partial = true;
                p.flag_pile_up(format!(
                    "{:.3} MeV in {} above maximum {:.3} MeV for Z={z} A={a}",
                    e_stop,
                    stop.name(),
                    de_max
                ));
                e_at_max
            }
            Err(err) => return self.fail(p, state, format!("{}: {err}", stop.name())),
        };
        let punch = branch == Branch::High;
        if punch {
            p.residual_energy = stop
                .stack()
                .residual_energy(z, a, energy)
                .map_or(0.0, |r| r.energy());
        }
        contributions.push((stop_id, e_stop));

        for &node_id in &p.chain[1..] {
            let node = self.array.node(node_id);
            let stack = node.stack();
            let e_in = match stack.incident_energy_from_residual(z, a, energy) {
                Ok(e) => e,
                Err(err) => return self.fail(p, state, format!("{}: {err}", node.name())),
            };
            let active = match stack.energy_loss(z, a, e_in) {
                Ok(de) => de,
                Err(err) => return self.fail(p, state, format!("{}: {err}", node.name())),
            };

            if state.is_shared(node_id) {
                if !(active > 0.0) {
                    return self.fail(
                        p,
                        state,
                        format!("zero calculated contribution in {}", node.name()),
                    );
                }
                partial = true;
                contributions.push((node_id, active));
                energy = e_in;
            } else {
                let measured = state.residual(node_id);
                let dead = (e_in - energy - active).max(0.0);
                energy += measured + dead;
                contributions.push((node_id, measured));
            }
        }

        let correction = match self.target.correction(z, a, energy, p.theta) {
            Ok(c) => c,
            Err(err) => return self.fail(p, state, format!("target: {err}")),
        };

        p.energy = energy + correction;
        p.target_correction = correction;
        p.calibration = if punch && p.id_code == IdCode::PunchThrough {
            CalibrationStatus::PunchThrough
        } else if partial {
            CalibrationStatus::PartiallyCalculated
        } else {
            CalibrationStatus::Normal
        };
        state.commit(&contributions);

        debug!(
            z,
            a,
            energy = p.energy,
            status = %p.calibration,
            "particle calibrated"
        );
    }
}

#[cfg(test)]
mod calibration_test {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn test_sharing_bookkeeping() {
        let mut hits = EventHits::new(1);
        hits.insert(NodeId(0), crate::events::DetectorHit::fired(10.0, 1));
        hits.insert(NodeId(1), crate::events::DetectorHit::fired(4.0, 1));

        let mut state = SharingState::new();
        let a: SmallVec<[NodeId; 4]> = smallvec![NodeId(0), NodeId(1)];
        let b: SmallVec<[NodeId; 4]> = smallvec![NodeId(2), NodeId(1)];
        state.add_particle(&a, &hits);
        state.add_particle(&b, &hits);

        assert!(state.is_shared(NodeId(1)));
        assert!(!state.is_shared(NodeId(0)));
        assert_eq!(state.residual(NodeId(2)), 0.0);

        state.commit(&[(NodeId(0), 10.0), (NodeId(1), 1.5)]);
        assert!(!state.is_shared(NodeId(1)));
        assert_eq!(state.residual(NodeId(1)), 2.5);
        assert!(state.is_corrected(NodeId(1), 1e-9));
        assert_eq!(state.measured(NodeId(1)), 4.0);

        state.release(&b);
        assert_eq!(state.outstanding(NodeId(1)), 0);
        assert_eq!(state.residual(NodeId(1)), 2.5);
    }

    #[test]
    fn test_saturated_stop_is_flagged_pile_up() {
        use crate::constants::GroupId;
        use crate::detector_array::{Acceptance, DetectorSpec};
        use crate::energy_loss::Material;
        use crate::identification::IdentificationResult;
        use crate::target::NoTarget;
        use std::sync::Arc;

        let array = DetectorArray::builder("single")
            .detector(
                DetectorSpec::new("SI", "SI", Acceptance::ring(10.0, 20.0))
                    .active_layer(Arc::new(Material::silicon()), 69.9),
            )
            .build()
            .unwrap();
        let si = array.node_id("SI").unwrap();

        // An alpha cannot leave more than ~24 MeV in 300 µm of silicon.
        let mut hits = EventHits::new(1);
        hits.insert(si, crate::events::DetectorHit::fired(40.0, 1));

        let mut p = ReconstructedParticle::seeded(smallvec![si], None, GroupId(0), (15.0, 0.0));
        p.apply_identification(IdentificationResult {
            success: true,
            z: 2,
            a: 4,
            mass_identified: true,
            pid: 2.0,
            code: IdCode::Identified,
            ..IdentificationResult::attempt("SI")
        });
        let mut state = SharingState::new();
        state.add_particle(&p.chain, &hits);

        Calibrator::new(&array, &NoTarget, Branch::High).calibrate(&mut p, &mut state);

        let (de_max, e_at_max) = array.node(si).stack().max_energy_loss(2, 4).unwrap();
        assert!(de_max < 40.0);
        assert_eq!(p.id_code, IdCode::PileUp);
        assert!(!p.z_measured && !p.a_measured);
        assert_eq!((p.z, p.a), (2, 4));
        assert_eq!(p.id_results.len(), 2);
        assert_eq!(p.id_results[1].code, IdCode::PileUp);
        assert_eq!(p.id_results[1].telescope, "SI");
        assert_eq!(p.calibration, CalibrationStatus::PartiallyCalculated);
        assert!((p.energy - e_at_max).abs() < 1e-9);
    }

    #[test]
    fn test_status_classes() {
        assert!(CalibrationStatus::PunchThrough.is_calibrated());
        assert!(!CalibrationStatus::Uncalibrated.is_calibrated());
        assert!(!CalibrationStatus::default().is_calibrated());
    }
}

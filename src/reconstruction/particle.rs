use std::fmt;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::{
    calibration::CalibrationStatus,
    constants::{Degree, DetectorChain, GroupId, MeV, NodeId, TrajectoryId, RADEG},
    identification::{IdCode, IdentificationResult},
};

/// A particle reconstructed from the hits of one group.
///
/// The detector chain is stored stopping detector first, down to the detector facing the
/// target. The direction is the centre of the stopping detector's acceptance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructedParticle {
    pub chain: DetectorChain,
    pub trajectory: Option<TrajectoryId>,
    pub group: GroupId,
    pub z: u32,
    pub a: u32,
    /// `z` comes from a successful identification rather than a lower bound.
    pub z_measured: bool,
    /// `a` was identified rather than taken from the mass formula.
    pub a_measured: bool,
    pub pid: f64,
    /// Kinetic energy at emission (MeV), target correction included.
    pub energy: MeV,
    /// Energy lost in the target (MeV), included in `energy`.
    pub target_correction: MeV,
    /// Energy left after the last detector for punch-through particles (MeV).
    pub residual_energy: MeV,
    pub theta: Degree,
    pub phi: Degree,
    pub id_results: Vec<IdentificationResult>,
    pub id_code: IdCode,
    pub calibration: CalibrationStatus,
    pub comments: Vec<String>,
}

impl ReconstructedParticle {
    pub(crate) fn seeded(
        chain: DetectorChain,
        trajectory: Option<TrajectoryId>,
        group: GroupId,
        (theta, phi): (Degree, Degree),
    ) -> Self {
        ReconstructedParticle {
            chain,
            trajectory,
            group,
            z: 0,
            a: 0,
            z_measured: false,
            a_measured: false,
            pid: 0.0,
            energy: 0.0,
            target_correction: 0.0,
            residual_energy: 0.0,
            theta,
            phi,
            id_results: Vec::new(),
            id_code: IdCode::NotAttempted,
            calibration: CalibrationStatus::NotCalibrated,
            comments: Vec::new(),
        }
    }

    /// Detector in which the particle stopped.
    pub fn stopping_node(&self) -> NodeId {
        self.chain[0]
    }

    /// Detector just in front of the stopping one, if any.
    pub fn front_node(&self) -> Option<NodeId> {
        self.chain.get(1).copied()
    }

    /// Unit vector along the particle direction.
    pub fn direction(&self) -> Vector3<f64> {
        let (st, ct) = (self.theta * RADEG).sin_cos();
        let (sp, cp) = (self.phi * RADEG).sin_cos();
        Vector3::new(st * cp, st * sp, ct)
    }

    /// Momentum-like vector `energy · direction` (MeV).
    pub fn energy_vector(&self) -> Vector3<f64> {
        self.direction() * self.energy
    }

    pub fn is_identified(&self) -> bool {
        self.id_code.is_success()
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_calibrated()
    }

    /// Kept in the physical event: not rejected for geometric incoherency.
    pub fn is_detected(&self) -> bool {
        self.id_code != IdCode::GeometryIncoherency
    }

    pub(crate) fn apply_identification(&mut self, result: IdentificationResult) {
        self.z = result.z;
        self.a = result.a;
        self.z_measured = result.success;
        self.a_measured = result.success && result.mass_identified;
        self.pid = result.pid;
        self.id_code = result.code;
        if !result.comment.is_empty() {
            self.comments.push(result.comment.clone());
        }
        self.id_results.push(result);
    }

    /// Stopping loss too large for the identified `(z, a)`: the identity is kept as an
    /// estimate, no longer as a measurement.
    pub(crate) fn flag_pile_up(&mut self, comment: impl Into<String>) {
        let telescope = self
            .id_results
            .last()
            .map(|r| r.telescope.clone())
            .unwrap_or_default();
        self.apply_identification(IdentificationResult {
            z: self.z,
            a: self.a,
            pid: self.pid,
            code: IdCode::PileUp,
            comment: comment.into(),
            ..IdentificationResult::attempt(telescope)
        });
    }

    pub(crate) fn comment(&mut self, text: impl Into<String>) {
        self.comments.push(text.into());
    }
}

impl fmt::Display for ReconstructedParticle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Z={}{} A={}{} E={:.3} MeV θ={:.1} φ={:.1} [{} / {}]",
            self.z,
            if self.z_measured { "" } else { "*" },
            self.a,
            if self.a_measured { "" } else { "*" },
            self.energy,
            self.theta,
            self.phi,
            self.id_code,
            self.calibration
        )
    }
}

#[cfg(test)]
mod particle_test {
    use super::*;
    use approx::assert_relative_eq;
    use smallvec::smallvec;

    #[test]
    fn test_direction_is_unit() {
        let p = ReconstructedParticle::seeded(
            smallvec![NodeId(0)],
            None,
            GroupId(0),
            (90.0, 90.0),
        );
        let d = p.direction();
        assert_relative_eq!(d.norm(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(d.y, 1.0, epsilon = 1e-12);
        assert_eq!(p.stopping_node(), NodeId(0));
        assert_eq!(p.front_node(), None);
        assert!(!p.is_calibrated());
    }
}

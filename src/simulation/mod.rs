//! # Detection simulation
//!
//! Forward propagation of true particles through the target and the detector array, using the
//! same energy-loss model as the reconstruction.
//!
//! ## Overview
//! -----------------
//! A [`TrueParticle`] leaves the target (see [`TargetModel::exit_energy`]) and crosses the
//! detectors returned by [`DetectorArray::path_for_direction`], innermost first. In each
//! detector it deposits the active-layer loss of the stack, then continues with the energy left
//! after all layers, until it stops or leaves the last detector.
//!
//! Every particle ends with exactly one [`DetectionOutcome`]. Deposits of all particles of an
//! event are summed per detector into an [`EventHits`]; a detector fires when its summed
//! deposit exceeds its threshold. Each deposit carries a [`TruthRecord`], which is what
//! filter-mode identification reads back.
//!
//! ## Resolution
//! -----------------
//! [`DetectionSimulator::simulate_event_smeared`] multiplies every summed deposit by a Gaussian
//! factor of mean 1 and relative width `sigma_rel` (`rand_distr::Normal`).
//!
//! ## Example
//! -----------------
//! ```rust,ignore
//! let sim = partrec.simulator(&context);
//! let (hits, outcomes) = sim.simulate_event(1, &[TrueParticle::new(2, 4, 50.0, 45.0, 90.0)])?;
//! let event = partrec.reconstruct_event(&context, &hits);
//! ```
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use rand::Rng;
use rand_distr::{Distribution, Normal, NormalError};
use tracing::trace;

use crate::{
    constants::{Degree, MeV, NodeId},
    detector_array::DetectorArray,
    energy_loss::Residual,
    events::{DetectorHit, EventHits, TruthRecord},
    partrec_errors::ReconError,
    target::TargetModel,
};

/// A particle emitted by the reaction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrueParticle {
    pub z: u32,
    pub a: u32,
    /// Kinetic energy at emission (MeV).
    pub energy: MeV,
    pub theta: Degree,
    pub phi: Degree,
}

impl TrueParticle {
    pub fn new(z: u32, a: u32, energy: MeV, theta: Degree, phi: Degree) -> Self {
        TrueParticle {
            z,
            a,
            energy,
            theta,
            phi,
        }
    }
}

/// Fate of one simulated particle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DetectionOutcome {
    /// `z == 0`: the array does not see it.
    Neutral,
    StoppedInTarget,
    /// No detector covers the direction.
    DeadZone,
    /// The particle left no deposit above the threshold of any detector it reached.
    BelowThreshold,
    /// Stopped, `node` being the last detector in which it deposited energy.
    Stopped { node: NodeId },
    /// Left the array through `node` carrying `residual` MeV.
    PunchThrough { node: NodeId, residual: MeV },
}

impl DetectionOutcome {
    pub fn is_detected(&self) -> bool {
        matches!(
            self,
            DetectionOutcome::Stopped { .. } | DetectionOutcome::PunchThrough { .. }
        )
    }

    /// Detector where the particle ended, for detected particles.
    pub fn endpoint(&self) -> Option<NodeId> {
        match self {
            DetectionOutcome::Stopped { node } | DetectionOutcome::PunchThrough { node, .. } => {
                Some(*node)
            }
            _ => None,
        }
    }
}

/// Deposits of one particle along its path, with its outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Propagation {
    /// Active-layer deposits (MeV), innermost detector first. Detectors where nothing was
    /// deposited are omitted.
    pub deposits: SmallVec<[(NodeId, MeV); 6]>,
    pub outcome: DetectionOutcome,
}

/// Forward simulation of the response of a [`DetectorArray`].
#[derive(Debug, Clone, Copy)]
pub struct DetectionSimulator<'a> {
    array: &'a DetectorArray,
    target: &'a dyn TargetModel,
}

impl<'a> DetectionSimulator<'a> {
    pub fn new(array: &'a DetectorArray, target: &'a dyn TargetModel) -> Self {
        DetectionSimulator { array, target }
    }

    /// Propagate one particle.
    ///
    /// Return
    /// ----------
    /// * The deposits and outcome, or a [`ReconError`] when an energy is outside the validity
    ///   range of the energy-loss model.
    pub fn simulate(&self, particle: &TrueParticle) -> Result<Propagation, ReconError> {
        let TrueParticle {
            z,
            a,
            energy,
            theta,
            phi,
        } = *particle;
        let mut deposits = SmallVec::new();

        if z == 0 {
            return Ok(Propagation {
                deposits,
                outcome: DetectionOutcome::Neutral,
            });
        }
        let Residual::Exits(mut e) = self.target.exit_energy(z, a, energy, theta)? else {
            return Ok(Propagation {
                deposits,
                outcome: DetectionOutcome::StoppedInTarget,
            });
        };

        let path = self.array.path_for_direction(theta, phi);
        if path.is_empty() {
            return Ok(Propagation {
                deposits,
                outcome: DetectionOutcome::DeadZone,
            });
        }

        let mut exits = true;
        for &id in &path {
            let stack = self.array.node(id).stack();
            let de = stack.energy_loss(z, a, e)?;
            if de > 0.0 {
                deposits.push((id, de));
            }
            match stack.residual_energy(z, a, e)? {
                Residual::Exits(r) => e = r,
                Residual::Stopped => {
                    exits = false;
                    break;
                }
            }
        }

        let above_threshold = deposits
            .iter()
            .any(|&(id, de)| de > self.array.node(id).threshold());
        let outcome = match deposits.last() {
            Some(&(node, _)) if above_threshold => {
                if exits && path.last() == Some(&node) {
                    DetectionOutcome::PunchThrough { node, residual: e }
                } else {
                    DetectionOutcome::Stopped { node }
                }
            }
            _ => DetectionOutcome::BelowThreshold,
        };
        trace!(z, a, energy, theta, phi, ?outcome, "particle propagated");
        Ok(Propagation { deposits, outcome })
    }

    /// Propagate all particles of an event and sum their deposits per detector.
    ///
    /// Arguments
    /// -----------------
    /// * `event_number`: number given to the produced [`EventHits`].
    /// * `particles`: true particles; their index in the slice is stored in the truth records.
    ///
    /// Return
    /// ----------
    /// * The event hits and one outcome per particle, in input order.
    pub fn simulate_event(
        &self,
        event_number: u64,
        particles: &[TrueParticle],
    ) -> Result<(EventHits, Vec<DetectionOutcome>), ReconError> {
        let mut hits = EventHits::new(event_number);
        let mut outcomes = Vec::with_capacity(particles.len());

        for (index, particle) in particles.iter().enumerate() {
            let prop = self.simulate(particle)?;
            let endpoint = prop.outcome.endpoint();
            for &(node, de) in &prop.deposits {
                let hit = hits.hits.entry(node).or_insert_with(DetectorHit::default);
                hit.energy += de;
                hit.truth.push(TruthRecord {
                    particle: index,
                    z: particle.z,
                    a: particle.a,
                    energy: particle.energy,
                    endpoint: endpoint == Some(node),
                });
            }
            outcomes.push(prop.outcome);
        }

        self.fire(&mut hits);
        Ok((hits, outcomes))
    }

    /// [`simulate_event`](Self::simulate_event) with Gaussian resolution on the deposits.
    ///
    /// Arguments
    /// -----------------
    /// * `sigma_rel`: relative width of the resolution (e.g. `0.02` for 2 %).
    /// * `rng`: random source, seeded by the caller for reproducible runs.
    ///
    /// Return
    /// ----------
    /// * As [`simulate_event`](Self::simulate_event), or
    ///   [`ReconError::NoiseInjectionError`] for a negative or non-finite `sigma_rel`.
    pub fn simulate_event_smeared(
        &self,
        event_number: u64,
        particles: &[TrueParticle],
        sigma_rel: f64,
        rng: &mut impl Rng,
    ) -> Result<(EventHits, Vec<DetectionOutcome>), ReconError> {
        if !(sigma_rel.is_finite() && sigma_rel >= 0.0) {
            return Err(NormalError::BadVariance.into());
        }
        let noise = Normal::new(1.0, sigma_rel)?;
        let (mut hits, outcomes) = self.simulate_event(event_number, particles)?;
        for hit in hits.hits.values_mut() {
            hit.energy = (hit.energy * noise.sample(rng)).max(0.0);
        }
        self.fire(&mut hits);
        Ok((hits, outcomes))
    }

    fn fire(&self, hits: &mut EventHits) {
        for (&id, hit) in hits.hits.iter_mut() {
            let node = self.array.node(id);
            hit.signals = SmallVec::from_elem(hit.energy > node.threshold(), node.signals());
        }
    }
}

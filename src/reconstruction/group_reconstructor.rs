//! Seeding of reconstructed particles along the trajectories of one group.
//!
//! Each trajectory of the group is walked from its outermost detector inwards. The first
//! detector that fires and has not been claimed yet seeds a particle whose chain runs from it
//! down to the target, unless a fired detector still unclaimed sits behind it on another
//! branch; every detector of a seeded chain is then claimed. A claimed detector never
//! seeds a second particle, but it can belong to the chains of several particles (a shared
//! detector in front of a branching).
use std::collections::{HashMap, HashSet};

use ahash::RandomState;
use smallvec::SmallVec;
use tracing::trace;

use crate::{
    calibration::SharingState,
    constants::{DetectorChain, GroupId, NodeId},
    detector_array::{DetectorArray, Group},
    events::EventHits,
    identification::IdentificationRegistry,
    run_context::RunContext,
};

use super::{analysis_loop::AnalysisLoop, ReconParams, ReconstructedParticle};

/// Per-event state of the detectors of one group.
#[derive(Debug, Clone, Default)]
pub struct GroupEventState {
    /// Detectors already claimed by a seeded particle.
    pub analysed: HashSet<NodeId, RandomState>,
    /// Indices of the particles whose chain contains each detector.
    pub hit_particles: HashMap<NodeId, SmallVec<[usize; 4]>, RandomState>,
}

impl GroupEventState {
    pub fn is_analysed(&self, node: NodeId) -> bool {
        self.analysed.contains(&node)
    }

    fn claim(&mut self, chain: &[NodeId], particle: usize) {
        for &node in chain {
            self.analysed.insert(node);
            self.hit_particles.entry(node).or_default().push(particle);
        }
    }

    /// Number of particles crossing `node`.
    pub fn multiplicity(&self, node: NodeId) -> usize {
        self.hit_particles.get(&node).map_or(0, |v| v.len())
    }
}

/// Particles of one group after reconstruction.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupOutcome {
    pub group: GroupId,
    pub particles: Vec<ReconstructedParticle>,
    /// Identification/calibration passes run by the analysis loop.
    pub passes: usize,
}

/// Reconstruction of the particles of one group in one event.
#[derive(Debug, Clone, Copy)]
pub struct GroupReconstructor<'a> {
    pub(crate) array: &'a DetectorArray,
    pub(crate) registry: &'a IdentificationRegistry,
    pub(crate) params: &'a ReconParams,
    pub(crate) context: &'a RunContext,
}

impl<'a> GroupReconstructor<'a> {
    pub fn new(
        array: &'a DetectorArray,
        registry: &'a IdentificationRegistry,
        params: &'a ReconParams,
        context: &'a RunContext,
    ) -> Self {
        GroupReconstructor {
            array,
            registry,
            params,
            context,
        }
    }

    /// Seed one particle per fired, unclaimed detector met along the group's trajectories.
    ///
    /// A detector only seeds once no fired, unclaimed detector remains behind it, so a particle
    /// stopping deep in a long branch claims the shared detectors in front of it before a
    /// shorter branch can see them as a stopping point. Trajectories are swept until a sweep
    /// seeds nothing.
    ///
    /// Return
    /// ----------
    /// * The seeded particles (not identified, not calibrated) and the group event state.
    pub fn seed(
        &self,
        group: &Group,
        hits: &EventHits,
    ) -> (Vec<ReconstructedParticle>, GroupEventState) {
        let mut state = GroupEventState::default();
        let mut particles = Vec::new();

        loop {
            let before = particles.len();
            for &traj_id in group.trajectories() {
                let traj = self.array.trajectory(traj_id);
                let seed = traj
                    .nodes()
                    .iter()
                    .position(|&n| self.is_candidate(n, hits, &state));
                let Some(pos) = seed else {
                    continue;
                };
                if self.has_candidate_behind(traj.nodes()[pos], hits, &state) {
                    continue;
                }
                let chain: DetectorChain = traj.nodes()[pos..].iter().copied().collect();
                let stop = self.array.node(chain[0]);
                trace!(detector = stop.name(), trajectory = %traj_id, "seed");
                state.claim(&chain, particles.len());
                particles.push(ReconstructedParticle::seeded(
                    chain,
                    Some(traj_id),
                    group.id(),
                    stop.acceptance().centre(),
                ));
            }
            if particles.len() == before {
                break;
            }
        }

        if particles.is_empty() && self.params.innermost_fallback {
            let fallback = group.nodes().iter().copied().find(|&n| {
                self.array.node(n).is_innermost()
                    && hits.hit(n).is_some_and(|h| h.fires_any())
            });
            if let Some(node) = fallback {
                let chain: DetectorChain = std::iter::once(node).collect();
                state.claim(&chain, 0);
                particles.push(ReconstructedParticle::seeded(
                    chain,
                    None,
                    group.id(),
                    self.array.node(node).acceptance().centre(),
                ));
            }
        }
        (particles, state)
    }

    fn is_candidate(&self, node: NodeId, hits: &EventHits, state: &GroupEventState) -> bool {
        hits.fires(node, self.context.firing) && !state.is_analysed(node)
    }

    /// Whether a fired, unclaimed detector lies anywhere behind `node`.
    fn has_candidate_behind(&self, node: NodeId, hits: &EventHits, state: &GroupEventState) -> bool {
        let mut stack: SmallVec<[NodeId; 8]> = self.array.node(node).behind().iter().copied().collect();
        let mut seen: HashSet<NodeId, RandomState> = HashSet::default();
        while let Some(n) = stack.pop() {
            if !seen.insert(n) {
                continue;
            }
            if self.is_candidate(n, hits, state) {
                return true;
            }
            stack.extend(self.array.node(n).behind().iter().copied());
        }
        false
    }

    /// Seed, identify and calibrate the particles of `group`.
    pub fn reconstruct(&self, group: GroupId, hits: &EventHits) -> GroupOutcome {
        let group = self.array.group(group);
        let (mut particles, _) = self.seed(group, hits);
        if particles.is_empty() {
            return GroupOutcome {
                group: group.id(),
                particles,
                passes: 0,
            };
        }

        let mut sharing = SharingState::new();
        for p in &particles {
            sharing.add_particle(&p.chain, hits);
        }
        let passes = AnalysisLoop::new(self).run(&mut particles, hits, &mut sharing);

        GroupOutcome {
            group: group.id(),
            particles,
            passes,
        }
    }
}

//! # Event reconstruction
//!
//! Turns the hits of one event into [`ReconstructedParticle`]s, group by group.
//!
//! ## Overview
//! -----------------
//! * [`group_reconstructor`] – seeds particles along the trajectories of a group,
//! * `analysis_loop` – iterates identification and calibration until every particle of the
//!   group is settled,
//! * [`params`] – tunable policies ([`ReconParams`]),
//! * [`particle`] – the reconstructed particle record.
//!
//! Groups are independent: no detector belongs to two groups, so they can be reconstructed
//! in any order or in parallel (see [`ReconParams::parallel_groups`]).
//!
//! ## See also
//! ------------
//! * [`PartRec::reconstruct_event`](crate::partrec::PartRec::reconstruct_event) – Entry point
//!   for one event.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{GroupId, MeV};

pub(crate) mod analysis_loop;
pub mod group_reconstructor;
pub mod params;
pub mod particle;

pub use group_reconstructor::{GroupEventState, GroupOutcome, GroupReconstructor};
pub use params::{ReconParams, ReconParamsBuilder};
pub use particle::ReconstructedParticle;

/// Per-group bookkeeping of one reconstructed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub group: GroupId,
    pub multiplicity: usize,
    /// Particles whose charge was identified, not only bounded.
    pub identified: usize,
    /// `multiplicity - identified`: Zmin estimates, pile-up, failures and rejections.
    pub unidentified: usize,
    pub passes: usize,
}

impl From<&GroupOutcome> for GroupSummary {
    fn from(outcome: &GroupOutcome) -> Self {
        let identified = outcome.particles.iter().filter(|p| p.is_identified()).count();
        GroupSummary {
            group: outcome.group,
            multiplicity: outcome.particles.len(),
            identified,
            unidentified: outcome.particles.len() - identified,
            passes: outcome.passes,
        }
    }
}

/// All particles reconstructed in one event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReconstructedEvent {
    pub event_number: u64,
    pub run_number: u32,
    /// Particles of every group, groups in increasing id order.
    pub particles: Vec<ReconstructedParticle>,
    pub groups: Vec<GroupSummary>,
}

impl ReconstructedEvent {
    pub fn multiplicity(&self) -> usize {
        self.particles.len()
    }

    /// Particles not rejected for geometric incoherency.
    pub fn detected(&self) -> impl Iterator<Item = &ReconstructedParticle> {
        self.particles.iter().filter(|p| p.is_detected())
    }

    pub fn identified(&self) -> impl Iterator<Item = &ReconstructedParticle> {
        self.particles.iter().filter(|p| p.is_identified())
    }

    /// Sum of the energies of the calibrated particles (MeV).
    pub fn total_energy(&self) -> MeV {
        self.particles
            .iter()
            .filter(|p| p.is_calibrated())
            .map(|p| p.energy)
            .sum()
    }

    /// Largest number of analysis passes needed by a group of this event.
    pub fn max_passes(&self) -> usize {
        self.groups.iter().map(|g| g.passes).max().unwrap_or(0)
    }
}

impl fmt::Display for ReconstructedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Event {} (run {}): {} particle(s) in {} group(s)",
            self.event_number,
            self.run_number,
            self.particles.len(),
            self.groups.len()
        )?;
        if f.alternate() {
            for p in &self.particles {
                write!(f, "\n  {p}")?;
            }
        }
        Ok(())
    }
}

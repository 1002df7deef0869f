//! # PartRec: reconstruction engine façade
//!
//! [`PartRec`] wires together the pieces needed to reconstruct events recorded by one detector
//! array:
//!
//! 1. **Geometry** ([`DetectorArray`]) – detectors, trajectories and groups, built once.
//! 2. **Identification** ([`IdentificationRegistry`]) – telescope responses by type label.
//! 3. **Policies** ([`ReconParams`]) – branch choice, parallelism, mass formula.
//!
//! Run-level state (run number, filter mode, target) is not stored here: it is passed to every
//! call through a [`RunContext`], so one engine serves several runs.
//!
//! ## Typical usage
//!
//! ```rust,ignore
//! use partrec::{PartRec, RunContext};
//!
//! let engine = PartRec::new(array);
//! let context = RunContext::new(42);
//! for hits in &events {
//!     let event = engine.reconstruct_event(&context, hits);
//!     println!("{event:#}");
//! }
//! ```
//!
//! ## See also
//! ------------
//! * [`EventBatch`](crate::events::event_batch::EventBatch) – Reconstruction of whole batches.
//! * [`DetectionSimulator`] – Forward simulation with the same geometry.
use itertools::Itertools;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::{
    constants::GroupId,
    detector_array::DetectorArray,
    events::EventHits,
    identification::IdentificationRegistry,
    reconstruction::{GroupOutcome, GroupReconstructor, GroupSummary, ReconParams, ReconstructedEvent},
    run_context::RunContext,
    simulation::DetectionSimulator,
};

#[derive(Debug, Clone)]
pub struct PartRec {
    array: DetectorArray,
    registry: IdentificationRegistry,
    params: ReconParams,
}

impl PartRec {
    /// Engine with the default identification registry and parameters.
    pub fn new(array: DetectorArray) -> Self {
        PartRec {
            array,
            registry: IdentificationRegistry::default(),
            params: ReconParams::default(),
        }
    }

    pub fn with_registry(mut self, registry: IdentificationRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_params(mut self, params: ReconParams) -> Self {
        self.params = params;
        self
    }

    pub fn array(&self) -> &DetectorArray {
        &self.array
    }

    /// Mutable access to the geometry, e.g. to change a layer thickness between runs.
    pub fn array_mut(&mut self) -> &mut DetectorArray {
        &mut self.array
    }

    pub fn registry(&self) -> &IdentificationRegistry {
        &self.registry
    }

    pub fn params(&self) -> &ReconParams {
        &self.params
    }

    /// Groups containing at least one detector with a fired signal, in increasing id order.
    ///
    /// Hits keyed by a detector id unknown to the array are skipped.
    pub fn fired_groups(&self, hits: &EventHits) -> Vec<GroupId> {
        hits.hits
            .iter()
            .filter(|(_, h)| h.fires_any())
            .filter_map(|(&id, _)| match self.array.get(id) {
                Some(node) => Some(node.group()),
                None => {
                    warn!(event = hits.event_number, detector = %id, "hit on unknown detector ignored");
                    None
                }
            })
            .sorted()
            .dedup()
            .collect()
    }

    /// Reconstruct all particles of one event.
    ///
    /// Arguments
    /// -----------------
    /// * `context`: run-level state (mode, firing condition, target).
    /// * `hits`: calibrated hits of the event.
    ///
    /// Return
    /// ----------
    /// * The reconstructed event. Per-particle failures are reported through the particles'
    ///   identification codes and calibration status; nothing here fails as a whole.
    ///
    /// See also
    /// ------------
    /// * [`GroupReconstructor::reconstruct`] – Work done for each fired group.
    pub fn reconstruct_event(&self, context: &RunContext, hits: &EventHits) -> ReconstructedEvent {
        let groups = self.fired_groups(hits);
        let rec = GroupReconstructor::new(&self.array, &self.registry, &self.params, context);

        let outcomes: Vec<GroupOutcome> = if self.params.parallel_groups {
            groups
                .par_iter()
                .map(|&g| rec.reconstruct(g, hits))
                .collect()
        } else {
            groups.iter().map(|&g| rec.reconstruct(g, hits)).collect()
        };

        let mut event = ReconstructedEvent {
            event_number: hits.event_number,
            run_number: context.run_number,
            ..Default::default()
        };
        for outcome in outcomes {
            event.groups.push(GroupSummary::from(&outcome));
            event.particles.extend(outcome.particles);
        }
        debug!(
            event = event.event_number,
            groups = event.groups.len(),
            particles = event.particles.len(),
            "event reconstructed"
        );
        event
    }

    /// Forward simulator over the same geometry and the target of `context`.
    pub fn simulator<'a>(&'a self, context: &'a RunContext) -> DetectionSimulator<'a> {
        DetectionSimulator::new(&self.array, context.target.as_ref())
    }
}

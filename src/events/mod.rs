//! # Event input
//!
//! Calibrated detector hits of one event, as consumed by the reconstruction.
//!
//! An [`EventHits`] maps each detector that recorded something to a [`DetectorHit`]: the
//! energy (MeV) deposited in the active layer and one fired flag per read-out signal. Hits
//! produced by the [`DetectionSimulator`](crate::simulation::DetectionSimulator) also carry
//! [`TruthRecord`]s, used by filter-mode identification.
//!
//! Batches of events are processed through [`event_batch::EventBatch`].
pub mod event_batch;
#[cfg(feature = "progress")]
pub mod progress_bar;

use std::collections::HashMap;

use ahash::RandomState;
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};

use crate::{
    constants::{MeV, NodeId},
    detector_array::DetectorArray,
    partrec_errors::ReconError,
    run_context::FiringMode,
};

/// Simulation truth of one particle contributing to a hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TruthRecord {
    /// Index of the true particle in the simulated event.
    pub particle: usize,
    pub z: u32,
    pub a: u32,
    /// Kinetic energy at emission (MeV).
    pub energy: MeV,
    /// The particle stopped in, or left the array through, this detector.
    pub endpoint: bool,
}

/// Energy deposited in one detector during one event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DetectorHit {
    pub energy: MeV,
    pub signals: SmallVec<[bool; 4]>,
    pub truth: SmallVec<[TruthRecord; 2]>,
}

impl DetectorHit {
    /// Hit with `n_signals` signals, all fired.
    pub fn fired(energy: MeV, n_signals: usize) -> Self {
        DetectorHit {
            energy,
            signals: smallvec![true; n_signals.max(1)],
            truth: SmallVec::new(),
        }
    }

    /// Hit with explicit per-signal fired flags.
    pub fn with_signals(energy: MeV, signals: &[bool]) -> Self {
        DetectorHit {
            energy,
            signals: SmallVec::from_slice(signals),
            truth: SmallVec::new(),
        }
    }

    pub fn fires_any(&self) -> bool {
        self.signals.iter().any(|&s| s)
    }

    pub fn fires_all(&self) -> bool {
        !self.signals.is_empty() && self.signals.iter().all(|&s| s)
    }

    pub fn fires(&self, mode: FiringMode) -> bool {
        match mode {
            FiringMode::Any => self.fires_any(),
            FiringMode::All => self.fires_all(),
        }
    }

    /// Truth records of particles whose path ended in this detector.
    pub fn endpoints(&self) -> impl Iterator<Item = &TruthRecord> {
        self.truth.iter().filter(|t| t.endpoint)
    }
}

/// All detector hits of one event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EventHits {
    pub event_number: u64,
    pub hits: HashMap<NodeId, DetectorHit, RandomState>,
}

impl EventHits {
    pub fn new(event_number: u64) -> Self {
        EventHits {
            event_number,
            hits: HashMap::default(),
        }
    }

    pub fn insert(&mut self, node: NodeId, hit: DetectorHit) {
        self.hits.insert(node, hit);
    }

    /// Record a hit by detector name with every signal fired.
    pub fn set_energy(
        &mut self,
        array: &DetectorArray,
        detector: &str,
        energy: MeV,
    ) -> Result<(), ReconError> {
        let node = array.node_by_name(detector)?;
        self.hits
            .insert(node.id(), DetectorHit::fired(energy, node.signals()));
        Ok(())
    }

    pub fn hit(&self, node: NodeId) -> Option<&DetectorHit> {
        self.hits.get(&node)
    }

    /// Deposited energy, `0.0` for a detector without hit.
    pub fn energy(&self, node: NodeId) -> MeV {
        self.hits.get(&node).map_or(0.0, |h| h.energy)
    }

    pub fn fires(&self, node: NodeId, mode: FiringMode) -> bool {
        self.hits.get(&node).is_some_and(|h| h.fires(mode))
    }

    /// Sum of all deposited energies.
    pub fn total_energy(&self) -> MeV {
        self.hits.values().map(|h| h.energy).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }
}

#[cfg(test)]
mod events_test {
    use super::*;

    #[test]
    fn test_firing_modes() {
        let hit = DetectorHit::with_signals(3.0, &[true, false]);
        assert!(hit.fires(FiringMode::Any));
        assert!(!hit.fires(FiringMode::All));
        assert!(DetectorHit::fired(1.0, 2).fires(FiringMode::All));
        assert!(!DetectorHit::with_signals(1.0, &[]).fires(FiringMode::All));
    }

    #[test]
    fn test_missing_hit_reads_as_zero() {
        let ev = EventHits::new(7);
        assert_eq!(ev.energy(NodeId(3)), 0.0);
        assert!(!ev.fires(NodeId(3), FiringMode::Any));
        assert!(ev.is_empty());
    }
}

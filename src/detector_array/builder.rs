//! Validating builder for [`DetectorArray`].
//!
//! ```rust
//! use std::sync::Arc;
//! use partrec::detector_array::{Acceptance, DetectorArray, DetectorSpec};
//! use partrec::energy_loss::{Material, RangeTable};
//!
//! let si: Arc<dyn RangeTable> = Arc::new(Material::silicon());
//! let csi: Arc<dyn RangeTable> = Arc::new(Material::csi());
//! let acc = Acceptance::new(10.0, 20.0, 0.0, 30.0);
//!
//! let array = DetectorArray::builder("demo")
//!     .detector(DetectorSpec::new("SI_1", "SI", acc).active_layer(si, 69.9))
//!     .detector(DetectorSpec::new("CSI_1", "CSI", acc).active_layer(csi, 4510.0))
//!     .link("SI_1", "CSI_1")
//!     .build()
//!     .unwrap();
//! assert_eq!(array.trajectories().len(), 1);
//! ```
use std::{collections::HashMap, sync::Arc};

use ahash::RandomState;
use itertools::Itertools;
use tracing::debug;

use crate::{
    constants::{GroupId, MeV, MgPerCm2, NodeId},
    energy_loss::{DetectorStack, Layer, RangeTable},
    partrec_errors::ReconError,
};

use super::{
    trajectory::{build_groups, build_trajectories},
    Acceptance, DetectorArray, DetectorNode,
};

/// Description of one detector handed to [`DetectorArrayBuilder::detector`].
#[derive(Debug, Clone)]
pub struct DetectorSpec {
    name: String,
    kind: String,
    acceptance: Acceptance,
    layers: Vec<(Arc<dyn RangeTable>, MgPerCm2, bool)>,
    threshold: MeV,
    signals: usize,
}

impl DetectorSpec {
    /// New detector without layers, zero threshold and one signal.
    pub fn new(name: impl Into<String>, kind: impl Into<String>, acceptance: Acceptance) -> Self {
        DetectorSpec {
            name: name.into(),
            kind: kind.into(),
            acceptance,
            layers: Vec::new(),
            threshold: 0.0,
            signals: 1,
        }
    }

    /// Append an inactive absorber (window, dead layer, backing).
    pub fn dead_layer(mut self, table: Arc<dyn RangeTable>, thickness: MgPerCm2) -> Self {
        self.layers.push((table, thickness, false));
        self
    }

    /// Append the active layer.
    pub fn active_layer(mut self, table: Arc<dyn RangeTable>, thickness: MgPerCm2) -> Self {
        self.layers.push((table, thickness, true));
        self
    }

    /// Energy (MeV) above which the detector is considered fired.
    pub fn threshold(mut self, threshold: MeV) -> Self {
        self.threshold = threshold;
        self
    }

    /// Number of read-out signals.
    pub fn signals(mut self, signals: usize) -> Self {
        self.signals = signals;
        self
    }

    fn into_stack(self) -> Result<(DetectorStack, Self), ReconError> {
        let n_active = self.layers.iter().filter(|l| l.2).count();
        if n_active != 1 {
            return Err(ReconError::ActiveLayerCount(self.name, n_active));
        }
        if let Some(bad) = self.layers.iter().find(|l| !(l.1 > 0.0)) {
            return Err(ReconError::InvalidThickness(self.name, bad.1));
        }
        let active = self.layers.iter().position(|l| l.2).unwrap_or(0);
        let layers = self
            .layers
            .iter()
            .map(|(table, t, _)| Layer::new(table.clone(), *t))
            .collect();
        Ok((DetectorStack::new(layers, active)?, self))
    }
}

/// Collects detectors and adjacency links, then validates them and derives trajectories and
/// groups in [`DetectorArrayBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct DetectorArrayBuilder {
    name: String,
    specs: Vec<DetectorSpec>,
    links: Vec<(String, String)>,
}

impl DetectorArrayBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        DetectorArrayBuilder {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn detector(mut self, spec: DetectorSpec) -> Self {
        self.specs.push(spec);
        self
    }

    /// Declare `inner` directly in front of `outer`: a particle from the target crosses
    /// `inner` then `outer`.
    pub fn link(mut self, inner: impl Into<String>, outer: impl Into<String>) -> Self {
        self.links.push((inner.into(), outer.into()));
        self
    }

    /// Validate the geometry and build the array.
    ///
    /// Return
    /// ----------
    /// * The array, or the first validation error found:
    ///   [`ReconError::DuplicateDetector`], [`ReconError::ActiveLayerCount`],
    ///   [`ReconError::InvalidThickness`], [`ReconError::InvalidReconParameter`] (negative
    ///   threshold, no signal), [`ReconError::UnknownDetector`], [`ReconError::SelfAdjacency`]
    ///   or [`ReconError::GeometryCycle`].
    pub fn build(self) -> Result<DetectorArray, ReconError> {
        let mut index: HashMap<String, NodeId, RandomState> = HashMap::default();
        for (i, spec) in self.specs.iter().enumerate() {
            if index.insert(spec.name.clone(), NodeId(i)).is_some() {
                return Err(ReconError::DuplicateDetector(spec.name.clone()));
            }
        }

        let mut nodes = Vec::with_capacity(self.specs.len());
        for (i, spec) in self.specs.into_iter().enumerate() {
            if !(spec.threshold >= 0.0) {
                return Err(ReconError::InvalidReconParameter(format!(
                    "threshold of {} must be >= 0, got {}",
                    spec.name, spec.threshold
                )));
            }
            if spec.signals == 0 {
                return Err(ReconError::InvalidReconParameter(format!(
                    "{} must have at least one signal",
                    spec.name
                )));
            }
            let (stack, spec) = spec.into_stack()?;
            nodes.push(DetectorNode {
                id: NodeId(i),
                name: spec.name,
                kind: spec.kind,
                stack,
                acceptance: spec.acceptance,
                threshold: spec.threshold,
                signals: spec.signals,
                in_front: Default::default(),
                behind: Default::default(),
                stopping: Vec::new(),
                continuing: Vec::new(),
                group: GroupId(0),
            });
        }

        let lookup = |name: &str| {
            index
                .get(name)
                .copied()
                .ok_or_else(|| ReconError::UnknownDetector(name.to_string()))
        };
        let edges: Vec<(NodeId, NodeId)> = self
            .links
            .iter()
            .map(|(inner, outer)| {
                let (i, o) = (lookup(inner)?, lookup(outer)?);
                if i == o {
                    return Err(ReconError::SelfAdjacency(inner.clone()));
                }
                Ok((i, o))
            })
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .unique()
            .collect();

        for &(inner, outer) in &edges {
            nodes[outer.0].in_front.push(inner);
            nodes[inner.0].behind.push(outer);
        }
        check_acyclic(&nodes)?;

        let mut groups = build_groups(&mut nodes);
        let trajectories = build_trajectories(&mut nodes);
        for traj in &trajectories {
            groups[traj.group.0].trajectories.push(traj.id);
        }

        debug!(
            array = %self.name,
            detectors = nodes.len(),
            trajectories = trajectories.len(),
            groups = groups.len(),
            "detector array built"
        );

        Ok(DetectorArray {
            name: self.name,
            nodes,
            trajectories,
            groups,
            index,
        })
    }
}

/// Kahn's algorithm over the `inner → outer` edges.
fn check_acyclic(nodes: &[DetectorNode]) -> Result<(), ReconError> {
    let mut indegree: Vec<usize> = nodes.iter().map(|n| n.in_front.len()).collect();
    let mut ready: Vec<usize> = (0..nodes.len()).filter(|&i| indegree[i] == 0).collect();
    let mut seen = 0;
    while let Some(i) = ready.pop() {
        seen += 1;
        for next in &nodes[i].behind {
            indegree[next.0] -= 1;
            if indegree[next.0] == 0 {
                ready.push(next.0);
            }
        }
    }
    if seen < nodes.len() {
        let culprit = indegree
            .iter()
            .position(|&d| d > 0)
            .map(|i| nodes[i].name.clone())
            .unwrap_or_default();
        return Err(ReconError::GeometryCycle(culprit));
    }
    Ok(())
}

//! # Detector array geometry and trajectory graph
//!
//! A [`DetectorArray`] owns every [`DetectorNode`] of a multi-layer array in an arena, together
//! with the [`Trajectory`]s and [`Group`]s derived from the node adjacency. It is built once by
//! [`DetectorArrayBuilder`] and is read-only afterwards (apart from
//! [`DetectorArray::set_layer_thickness`], which needs `&mut`).
//!
//! ## Orientation
//!
//! ```text
//!  target  →  [CI]  →  [Si_a]  →  [CsI_a]
//!                 \→  [Si_b]  →  [CsI_b]
//! ```
//!
//! * `in_front` of a node: the neighbours a particle crosses just before reaching it
//!   (between the node and the target). `CI` is in front of `Si_a` and `Si_b`.
//! * `behind` a node: the neighbours further from the target. `CsI_a` is behind `Si_a`.
//!
//! Trajectories start at nodes with nothing behind them and end at nodes with nothing in front
//! of them. In the sketch above the array has two trajectories,
//! `CsI_a → Si_a → CI` and `CsI_b → Si_b → CI`, forming one group.
//!
//! ## Handles
//!
//! Nodes, trajectories and groups are referred to by [`NodeId`], [`TrajectoryId`] and
//! [`GroupId`] indices. A trajectory is a `SmallVec` of node indices; forking a trajectory at a
//! branch is a copy of that index sequence.
pub mod builder;
pub mod trajectory;

use std::{collections::HashMap, fmt};

use ahash::RandomState;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{
    constants::{Degree, GroupId, MeV, MgPerCm2, NodeId, NodePath, TrajectoryId},
    energy_loss::DetectorStack,
    partrec_errors::ReconError,
};

pub use builder::{DetectorArrayBuilder, DetectorSpec};
pub use trajectory::{Group, Trajectory};

/// Angular acceptance of a detector, in degrees.
///
/// `phi_min > phi_max` denotes a range wrapping through 0°/360°.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Acceptance {
    pub theta_min: Degree,
    pub theta_max: Degree,
    pub phi_min: Degree,
    pub phi_max: Degree,
}

impl Acceptance {
    pub fn new(theta_min: Degree, theta_max: Degree, phi_min: Degree, phi_max: Degree) -> Self {
        Acceptance {
            theta_min,
            theta_max,
            phi_min: phi_min.rem_euclid(360.0),
            phi_max: if phi_max == 360.0 {
                360.0
            } else {
                phi_max.rem_euclid(360.0)
            },
        }
    }

    /// Full azimuthal ring between two polar angles.
    pub fn ring(theta_min: Degree, theta_max: Degree) -> Self {
        Self::new(theta_min, theta_max, 0.0, 360.0)
    }

    fn phi_width(&self) -> Degree {
        if self.phi_min <= self.phi_max {
            self.phi_max - self.phi_min
        } else {
            360.0 - self.phi_min + self.phi_max
        }
    }

    /// Whether direction `(theta, phi)` falls inside the acceptance.
    ///
    /// Lower bounds are inclusive, upper bounds exclusive, so adjacent detectors sharing a
    /// boundary never both contain a direction.
    pub fn contains(&self, theta: Degree, phi: Degree) -> bool {
        if theta < self.theta_min || theta >= self.theta_max {
            return false;
        }
        let phi = phi.rem_euclid(360.0);
        if self.phi_min <= self.phi_max {
            phi >= self.phi_min && phi < self.phi_max
        } else {
            phi >= self.phi_min || phi < self.phi_max
        }
    }

    /// Centre of the acceptance `(theta, phi)`, used as the direction of particles stopping in
    /// the detector.
    pub fn centre(&self) -> (Degree, Degree) {
        let theta = 0.5 * (self.theta_min + self.theta_max);
        let phi = (self.phi_min + 0.5 * self.phi_width()).rem_euclid(360.0);
        (theta, phi)
    }
}

impl fmt::Display for Acceptance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "θ=[{:.1}, {:.1}) φ=[{:.1}, {:.1})",
            self.theta_min, self.theta_max, self.phi_min, self.phi_max
        )
    }
}

/// One physical detector of the array.
#[derive(Debug, Clone)]
pub struct DetectorNode {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) kind: String,
    pub(crate) stack: DetectorStack,
    pub(crate) acceptance: Acceptance,
    pub(crate) threshold: MeV,
    pub(crate) signals: usize,
    pub(crate) in_front: SmallVec<[NodeId; 4]>,
    pub(crate) behind: SmallVec<[NodeId; 4]>,
    pub(crate) stopping: Vec<TrajectoryId>,
    pub(crate) continuing: Vec<TrajectoryId>,
    pub(crate) group: GroupId,
}

impl DetectorNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Detector type label, e.g. `"SI"` or `"CSI"`.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn stack(&self) -> &DetectorStack {
        &self.stack
    }

    pub fn acceptance(&self) -> &Acceptance {
        &self.acceptance
    }

    /// Energy (MeV) above which the active layer is considered fired.
    pub fn threshold(&self) -> MeV {
        self.threshold
    }

    /// Number of read-out signals of the detector.
    pub fn signals(&self) -> usize {
        self.signals
    }

    /// Neighbours between this node and the target.
    pub fn in_front(&self) -> &[NodeId] {
        &self.in_front
    }

    /// Neighbours further from the target.
    pub fn behind(&self) -> &[NodeId] {
        &self.behind
    }

    /// Trajectories whose outermost node is this one.
    pub fn stopping_trajectories(&self) -> &[TrajectoryId] {
        &self.stopping
    }

    /// Trajectories passing through this node with at least one node behind it.
    pub fn continuing_trajectories(&self) -> &[TrajectoryId] {
        &self.continuing
    }

    pub fn trajectories(&self) -> impl Iterator<Item = TrajectoryId> + '_ {
        self.stopping.iter().chain(self.continuing.iter()).copied()
    }

    pub fn group(&self) -> GroupId {
        self.group
    }

    /// No detector behind this one: particles reaching its end leave the array.
    pub fn is_outermost(&self) -> bool {
        self.behind.is_empty()
    }

    /// No detector in front of this one: first detector crossed from the target.
    pub fn is_innermost(&self) -> bool {
        self.in_front.is_empty()
    }
}

/// Arena of detector nodes with the trajectories and groups derived from their adjacency.
#[derive(Debug, Clone)]
pub struct DetectorArray {
    pub(crate) name: String,
    pub(crate) nodes: Vec<DetectorNode>,
    pub(crate) trajectories: Vec<Trajectory>,
    pub(crate) groups: Vec<Group>,
    pub(crate) index: HashMap<String, NodeId, RandomState>,
}

impl DetectorArray {
    pub fn builder(name: impl Into<String>) -> DetectorArrayBuilder {
        DetectorArrayBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodes(&self) -> &[DetectorNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> &DetectorNode {
        &self.nodes[id.0]
    }

    /// `None` for an id that does not belong to this array.
    pub fn get(&self, id: NodeId) -> Option<&DetectorNode> {
        self.nodes.get(id.0)
    }

    pub fn node_by_name(&self, name: &str) -> Result<&DetectorNode, ReconError> {
        self.node_id(name).map(|id| &self.nodes[id.0])
    }

    pub fn node_id(&self, name: &str) -> Result<NodeId, ReconError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| ReconError::UnknownDetector(name.to_string()))
    }

    pub fn trajectories(&self) -> &[Trajectory] {
        &self.trajectories
    }

    pub fn trajectory(&self, id: TrajectoryId) -> &Trajectory {
        &self.trajectories[id.0]
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn group(&self, id: GroupId) -> &Group {
        &self.groups[id.0]
    }

    /// Detectors crossed, in crossing order (innermost first), by a particle flying in
    /// direction `(theta, phi)`.
    ///
    /// The path starts at the innermost detector whose acceptance contains the direction and
    /// follows, at each step, the neighbour behind whose acceptance contains it. An empty path
    /// means the direction falls in a dead zone.
    pub fn path_for_direction(&self, theta: Degree, phi: Degree) -> NodePath {
        let mut path = NodePath::new();
        let Some(first) = self
            .nodes
            .iter()
            .find(|n| n.is_innermost() && n.acceptance.contains(theta, phi))
        else {
            return path;
        };
        path.push(first.id);

        let mut current = first;
        while let Some(next) = current
            .behind
            .iter()
            .map(|id| &self.nodes[id.0])
            .find(|n| n.acceptance.contains(theta, phi))
        {
            if path.contains(&next.id) {
                break;
            }
            path.push(next.id);
            current = next;
        }
        path
    }

    /// Change the thickness of one absorber layer of a detector.
    ///
    /// The detector's cached energy-loss functions are dropped.
    pub fn set_layer_thickness(
        &mut self,
        detector: &str,
        layer: usize,
        thickness: MgPerCm2,
    ) -> Result<(), ReconError> {
        let id = self.node_id(detector)?;
        self.nodes[id.0]
            .stack
            .set_thickness(layer, thickness)
            .map_err(|err| match err {
                ReconError::InvalidThickness(_, t) => {
                    ReconError::InvalidThickness(detector.to_string(), t)
                }
                ReconError::UnknownLayer(_, l) => ReconError::UnknownLayer(detector.to_string(), l),
                other => other,
            })
    }
}

impl fmt::Display for DetectorArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} detectors, {} trajectories, {} groups",
            self.name,
            self.nodes.len(),
            self.trajectories.len(),
            self.groups.len()
        )?;
        if f.alternate() {
            for traj in &self.trajectories {
                writeln!(f)?;
                write!(f, "  {} [{}] ", traj.id, traj.group)?;
                for (i, node) in traj.nodes.iter().enumerate() {
                    if i > 0 {
                        write!(f, " -> ")?;
                    }
                    write!(f, "{}", self.nodes[node.0].name)?;
                }
            }
        }
        Ok(())
    }
}

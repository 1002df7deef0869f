//! Trajectories and groups of a detector array.
//!
//! A [`Trajectory`] is a path a particle coming from the target can follow through the array,
//! stored as node indices from the outermost detector to the detector facing the target.
//! A [`Group`] is a connected component of the adjacency graph: detectors of two different
//! groups never see the same particle, so groups are reconstructed independently.
use serde::{Deserialize, Serialize};

use crate::constants::{GroupId, NodeId, NodePath, TrajectoryId};

use super::DetectorNode;

/// Ordered simple path of detectors, furthest from the target first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trajectory {
    pub(crate) id: TrajectoryId,
    pub(crate) nodes: NodePath,
    pub(crate) group: GroupId,
}

impl Trajectory {
    pub fn id(&self) -> TrajectoryId {
        self.id
    }

    pub fn group(&self) -> GroupId {
        self.group
    }

    /// Nodes from the outermost detector to the one facing the target.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn outermost(&self) -> NodeId {
        self.nodes[0]
    }

    pub fn innermost(&self) -> NodeId {
        self.nodes[self.nodes.len() - 1]
    }

    pub fn position(&self, node: NodeId) -> Option<usize> {
        self.nodes.iter().position(|&n| n == node)
    }

    /// Part of the trajectory from `node` down to the target, `node` first.
    pub fn from_node(&self, node: NodeId) -> Option<&[NodeId]> {
        self.position(node).map(|i| &self.nodes[i..])
    }
}

/// Connected set of detectors and the trajectories running through them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub(crate) id: GroupId,
    pub(crate) nodes: Vec<NodeId>,
    pub(crate) trajectories: Vec<TrajectoryId>,
}

impl Group {
    pub fn id(&self) -> GroupId {
        self.id
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn trajectories(&self) -> &[TrajectoryId] {
        &self.trajectories
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.binary_search(&node).is_ok()
    }
}

/// Extend `open` through every node in front of its last node until the target is reached.
///
/// A node with `k` neighbours in front of it forks the open path `k - 1` times; each copy
/// continues through a distinct neighbour. Finished paths are pushed to `out`.
fn build_forward(nodes: &[DetectorNode], open: NodePath, out: &mut Vec<NodePath>) {
    let last = open[open.len() - 1];
    let front = &nodes[last.0].in_front;
    match front.split_last() {
        None => out.push(open),
        Some((&tail, rest)) => {
            for &next in rest {
                let mut fork = open.clone();
                fork.push(next);
                build_forward(nodes, fork, out);
            }
            let mut open = open;
            open.push(tail);
            build_forward(nodes, open, out);
        }
    }
}

/// Enumerate every trajectory of the array, starting from each node with nothing behind it.
///
/// Paths come out grouped by starting node, in node order. Node membership lists
/// (`stopping` / `continuing`) are filled in place.
pub(crate) fn build_trajectories(nodes: &mut [DetectorNode]) -> Vec<Trajectory> {
    let mut paths = Vec::new();
    for start in nodes.iter().filter(|n| n.behind.is_empty()).map(|n| n.id) {
        let mut open = NodePath::new();
        open.push(start);
        build_forward(nodes, open, &mut paths);
    }

    let trajectories: Vec<Trajectory> = paths
        .into_iter()
        .enumerate()
        .map(|(i, path)| Trajectory {
            id: TrajectoryId(i),
            group: nodes[path[0].0].group,
            nodes: path,
        })
        .collect();

    for traj in &trajectories {
        for (pos, node) in traj.nodes.iter().enumerate() {
            let node = &mut nodes[node.0];
            if pos == 0 {
                node.stopping.push(traj.id);
            } else {
                node.continuing.push(traj.id);
            }
        }
    }
    trajectories
}

/// Label connected components of the undirected adjacency graph and return the groups.
pub(crate) fn build_groups(nodes: &mut [DetectorNode]) -> Vec<Group> {
    let n = nodes.len();
    let mut label: Vec<Option<GroupId>> = vec![None; n];
    let mut groups = Vec::new();

    for seed in 0..n {
        if label[seed].is_some() {
            continue;
        }
        let gid = GroupId(groups.len());
        let mut members = Vec::new();
        let mut stack = vec![seed];
        label[seed] = Some(gid);
        while let Some(i) = stack.pop() {
            members.push(NodeId(i));
            for next in nodes[i].in_front.iter().chain(nodes[i].behind.iter()) {
                if label[next.0].is_none() {
                    label[next.0] = Some(gid);
                    stack.push(next.0);
                }
            }
        }
        members.sort_unstable();
        groups.push(Group {
            id: gid,
            nodes: members,
            trajectories: Vec::new(),
        });
    }

    for (node, gid) in nodes.iter_mut().zip(label) {
        node.group = gid.unwrap_or(GroupId(0));
    }
    groups
}

//! # Constants and type definitions for partrec
//!
//! This module centralizes the **unit aliases**, **numerical tolerances**, and **index handles**
//! shared by every part of the reconstruction engine.
//!
//! ## Overview
//!
//! - Unit aliases (MeV, mg/cm², degrees, micrometres)
//! - Numerical tolerances for the energy-loss inversions
//! - Arena handles ([`NodeId`], [`TrajectoryId`], [`GroupId`]) used instead of pointers
//!   between detectors, trajectories and groups
//! - Small inline containers for detector chains
//!
//! Handles are plain indices into the arenas owned by
//! [`DetectorArray`](crate::detector_array::DetectorArray). They are only meaningful for the
//! array that produced them.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

// -------------------------------------------------------------------------------------------------
// Units
// -------------------------------------------------------------------------------------------------

/// Kinetic energy or energy loss in MeV
pub type MeV = f64;
/// Areal thickness in mg/cm²
pub type MgPerCm2 = f64;
/// Angle in degrees
pub type Degree = f64;
/// Linear thickness in micrometres
pub type Micrometre = f64;

/// Degrees → radians
pub const RADEG: f64 = std::f64::consts::PI / 180.0;

// -------------------------------------------------------------------------------------------------
// Numerical tolerances
// -------------------------------------------------------------------------------------------------

/// Absolute tolerance (MeV) of the Brent searches used by the inversions
pub const INVERSION_EPS: f64 = 1e-9;

/// Maximum number of iterations of the Brent searches
pub const INVERSION_MAX_ITER: usize = 200;

/// Relative slack accepted when comparing an energy loss against the curve maximum
pub const SATURATION_SLACK: f64 = 1e-9;

/// Heaviest charge considered by the identification scans
pub const Z_MAX: u32 = 92;

// -------------------------------------------------------------------------------------------------
// Arena handles
// -------------------------------------------------------------------------------------------------

/// Index of a detector node inside its [`DetectorArray`](crate::detector_array::DetectorArray).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// Index of a trajectory inside its [`DetectorArray`](crate::detector_array::DetectorArray).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrajectoryId(pub usize);

/// Index of a detector group inside its [`DetectorArray`](crate::detector_array::DetectorArray).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub usize);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

impl std::fmt::Display for TrajectoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "traj#{}", self.0)
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "group#{}", self.0)
    }
}

// -------------------------------------------------------------------------------------------------
// Containers
// -------------------------------------------------------------------------------------------------

/// Ordered list of detectors crossed by a reconstructed particle, stopping detector first.
pub type DetectorChain = SmallVec<[NodeId; 4]>;

/// Ordered list of detectors of a trajectory, furthest from the target first.
pub type NodePath = SmallVec<[NodeId; 6]>;

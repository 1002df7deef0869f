//! # Run context
//!
//! [`RunContext`] is the explicit, per-run state handed to the reconstruction: run number,
//! processing mode, firing condition of detectors and target model. It replaces any global
//! "current run" lookup; nothing in the crate reads run-level state from elsewhere.
//!
//! ```text
//! RunContext
//! ├── run_number
//! ├── mode        (Experimental | Filter)
//! ├── firing      (Any | All signals)
//! └── target      (Arc<dyn TargetModel>)
//! ```
use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::target::{NoTarget, TargetModel};

/// How reconstructed events are identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RunMode {
    /// Measured data: identification from energy losses.
    #[default]
    Experimental,
    /// Simulated data passed through the array: identities are taken from the simulation truth.
    Filter,
}

/// Condition under which a detector counts as fired when seeding particles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FiringMode {
    /// At least one signal above threshold.
    #[default]
    Any,
    /// Every signal above threshold.
    All,
}

#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_number: u32,
    pub mode: RunMode,
    pub firing: FiringMode,
    pub target: Arc<dyn TargetModel>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new(0)
    }
}

impl RunContext {
    /// Experimental run without target, seeding on any fired signal.
    pub fn new(run_number: u32) -> Self {
        RunContext {
            run_number,
            mode: RunMode::Experimental,
            firing: FiringMode::Any,
            target: Arc::new(NoTarget),
        }
    }

    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_firing(mut self, firing: FiringMode) -> Self {
        self.firing = firing;
        self
    }

    pub fn with_target(mut self, target: Arc<dyn TargetModel>) -> Self {
        self.target = target;
        self
    }

    pub fn is_filter(&self) -> bool {
        self.mode == RunMode::Filter
    }
}

impl fmt::Display for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run {} ({:?}, firing={:?}, target={:?})",
            self.run_number, self.mode, self.firing, self.target
        )
    }
}

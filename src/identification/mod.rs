//! # Particle identification
//!
//! Assigns a charge `Z` (and when possible a mass `A`) to a reconstructed particle from the
//! energy losses measured along its detector chain.
//!
//! ## Telescopes
//!
//! The detectors used for identification form a [`Telescope`]: the stopping detector and, when
//! the chain has one, the detector just in front of it. Each telescope has a type label built
//! from the detector types, `"<front>-<stop>"` (e.g. `"SI-CSI"`) or just `"<stop>"` for a
//! particle stopped in its first detector. The [`IdentificationRegistry`] maps labels to
//! [`TelescopeResponse`] implementations:
//!
//! * [`DeltaEResidual`] – ΔE–E identification against theoretical lines computed from the
//!   energy-loss model, with mass identification for light charges and a punch-through
//!   hypothesis,
//! * [`SingleStage`] – particle stopped in its first detector: only a lower bound `Zmin`.
//!
//! Simulated data in filter mode bypass the registry: [`FilterIdentification`] copies the
//! identity from the simulation truth.
//!
//! Unknown labels fall back to [`DeltaEResidual`] with default parameters for two-detector
//! telescopes and to [`SingleStage`] otherwise.
//!
//! ## Outcome codes
//!
//! Every attempt produces an [`IdentificationResult`] carrying an [`IdCode`]. Codes never abort
//! the reconstruction of other particles; consumers filter on them.
pub mod delta_e_e;
pub mod filter;
pub mod single_stage;

use std::{collections::HashMap, fmt, sync::Arc};

use ahash::RandomState;
use serde::{Deserialize, Serialize};

use crate::{
    constants::{MeV, Z_MAX},
    detector_array::DetectorNode,
    energy_loss::{DetectorStack, MassFormula},
};

pub use delta_e_e::{DeltaEResidual, IdentificationParams};
pub use filter::FilterIdentification;
pub use single_stage::SingleStage;

/// Quality code of an identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IdCode {
    #[default]
    NotAttempted,
    /// Charge and mass identified.
    Identified,
    /// Charge identified, mass from the mass formula.
    ZOnly,
    /// Identified under the hypothesis that the particle crossed the last detector.
    PunchThrough,
    /// Identified after subtracting the contributions of other particles sharing a detector.
    CoherencyReclassified,
    /// Stopped in its first detector: `Z` is a lower bound.
    StoppedInFirstStage,
    /// Energy losses below the identification thresholds: `Z` is a lower bound.
    BelowThreshold,
    /// Detector shared with other particles that could not be resolved: `Z` is a lower bound.
    MultiHitFirstStage,
    /// Energy loss above what a single particle can deposit.
    PileUp,
    /// A detector of the chain in front of the stopping one did not fire.
    GeometryIncoherency,
    /// The telescope gave no usable answer.
    NoResponse,
    /// Energy outside the validity range of the range tables.
    OutOfRange,
    /// Identity taken from the simulation truth.
    Filter,
    /// Several simulated particles ended in the same detector and were merged.
    FilterMerged,
}

impl IdCode {
    /// Whether the charge was identified (not only bounded).
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            IdCode::Identified
                | IdCode::ZOnly
                | IdCode::PunchThrough
                | IdCode::CoherencyReclassified
                | IdCode::Filter
                | IdCode::FilterMerged
        )
    }

    /// `Z` is only a lower bound.
    pub fn is_zmin(&self) -> bool {
        matches!(
            self,
            IdCode::StoppedInFirstStage | IdCode::BelowThreshold | IdCode::MultiHitFirstStage
        )
    }
}

impl fmt::Display for IdCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Result of one identification attempt on one telescope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentificationResult {
    pub telescope: String,
    pub attempted: bool,
    pub success: bool,
    pub z: u32,
    pub a: u32,
    pub mass_identified: bool,
    pub pid: f64,
    pub code: IdCode,
    pub comment: String,
}

impl IdentificationResult {
    /// Attempted result with no identity yet.
    pub fn attempt(telescope: impl Into<String>) -> Self {
        IdentificationResult {
            telescope: telescope.into(),
            attempted: true,
            success: false,
            z: 0,
            a: 0,
            mass_identified: false,
            pid: 0.0,
            code: IdCode::NotAttempted,
            comment: String::new(),
        }
    }

    /// Failed attempt with a code and an explanation.
    pub fn failed(telescope: impl Into<String>, code: IdCode, comment: impl Into<String>) -> Self {
        IdentificationResult {
            code,
            comment: comment.into(),
            ..Self::attempt(telescope)
        }
    }

    /// Partial identification giving a lower bound on the charge.
    pub fn zmin(
        telescope: impl Into<String>,
        code: IdCode,
        z: u32,
        formula: MassFormula,
        comment: impl Into<String>,
    ) -> Self {
        IdentificationResult {
            z,
            a: formula.mass(z),
            pid: z as f64,
            code,
            comment: comment.into(),
            ..Self::attempt(telescope)
        }
    }
}

/// Detectors used to identify one particle.
#[derive(Debug, Clone, Copy)]
pub struct Telescope<'a> {
    /// Detector in front of the stopping one, `None` for a particle stopped in its first
    /// detector.
    pub front: Option<&'a DetectorNode>,
    /// Detector in which the particle stopped.
    pub stop: &'a DetectorNode,
    /// Nothing behind the stopping detector: the particle may have punched through.
    pub stop_is_outermost: bool,
    pub mass_formula: MassFormula,
}

impl Telescope<'_> {
    /// Type label used to select the response.
    pub fn label(&self) -> String {
        match self.front {
            Some(front) => format!("{}-{}", front.kind(), self.stop.kind()),
            None => self.stop.kind().to_string(),
        }
    }
}

/// Energies measured in a telescope, after subtraction of other particles' contributions.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Measurement {
    /// Loss in the front detector (MeV), `0.0` without front detector.
    pub delta_e: MeV,
    /// Loss in the stopping detector (MeV).
    pub residual: MeV,
}

/// Identification response of one telescope type.
pub trait TelescopeResponse: Send + Sync + fmt::Debug {
    fn identify(&self, telescope: &Telescope<'_>, measurement: &Measurement)
        -> IdentificationResult;
}

/// Smallest charge that can deposit `de` in the active layer of `stack`.
///
/// Return
/// ----------
/// * The smallest `Z` whose ΔE maximum reaches `de`, [`Z_MAX`] if none does.
pub fn zmin(stack: &DetectorStack, de: MeV, formula: MassFormula) -> u32 {
    (1..=Z_MAX)
        .find(|&z| {
            stack
                .max_energy_loss(z, formula.mass(z))
                .is_ok_and(|(de_max, _)| de_max >= de)
        })
        .unwrap_or(Z_MAX)
}

/// Telescope label → response.
#[derive(Debug, Clone)]
pub struct IdentificationRegistry {
    responses: HashMap<String, Arc<dyn TelescopeResponse>, RandomState>,
    pair_default: Arc<dyn TelescopeResponse>,
    single_default: Arc<dyn TelescopeResponse>,
}

impl Default for IdentificationRegistry {
    fn default() -> Self {
        IdentificationRegistry {
            responses: HashMap::default(),
            pair_default: Arc::new(DeltaEResidual::default()),
            single_default: Arc::new(SingleStage),
        }
    }
}

impl IdentificationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `response` for telescopes labelled `label`.
    pub fn register(&mut self, label: impl Into<String>, response: Arc<dyn TelescopeResponse>) {
        self.responses.insert(label.into(), response);
    }

    pub fn with(mut self, label: impl Into<String>, response: Arc<dyn TelescopeResponse>) -> Self {
        self.register(label, response);
        self
    }

    /// Response for two-detector telescopes without a registered label.
    pub fn with_pair_default(mut self, response: Arc<dyn TelescopeResponse>) -> Self {
        self.pair_default = response;
        self
    }

    pub fn response(&self, telescope: &Telescope<'_>) -> &dyn TelescopeResponse {
        match self.responses.get(&telescope.label()) {
            Some(r) => r.as_ref(),
            None if telescope.front.is_some() => self.pair_default.as_ref(),
            None => self.single_default.as_ref(),
        }
    }

    pub fn identify(
        &self,
        telescope: &Telescope<'_>,
        measurement: &Measurement,
    ) -> IdentificationResult {
        self.response(telescope).identify(telescope, measurement)
    }
}

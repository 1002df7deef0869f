//! # Reconstruction parameters
//!
//! [`ReconParams`] gathers the tunable policies of the reconstruction. It is built either with
//! [`ReconParams::default`] or through the validating [`ReconParamsBuilder`].
//!
//! ## Example
//!
//! ```rust
//! use partrec::energy_loss::{Branch, MassFormula};
//! use partrec::reconstruction::ReconParams;
//!
//! let params = ReconParams::builder()
//!     .parallel_groups(true)
//!     .mass_formula(MassFormula::TwiceZ)
//!     .default_branch(Branch::Low)
//!     .build()
//!     .unwrap();
//! println!("{params:#}");
//! ```
use std::cmp::Ordering::{Equal, Greater};
use std::fmt;

use crate::{
    constants::MeV,
    energy_loss::{Branch, MassFormula},
    partrec_errors::ReconError,
};

/// Reconstruction policies.
///
/// Fields
/// -----------------
/// * `default_branch` – ΔE-curve branch used to calibrate particles whose charge is only a
///   lower bound and that stopped in an outermost detector (they may have punched through).
/// * `parallel_groups` – reconstruct the groups of one event on `rayon` workers.
/// * `mass_formula` – mass attached to charges whose mass is not measured.
/// * `innermost_fallback` – when no particle was seeded in a group, seed one in a fired
///   innermost detector (any signal).
/// * `coherency_tolerance` – a detector residual differing from its measured energy by more
///   than this (MeV) marks the identification as coherency-reclassified.
///
/// Defaults
/// -----------------
/// * `default_branch`: [`Branch::High`]
/// * `parallel_groups`: `false`
/// * `mass_formula`: [`MassFormula::BetaStability`]
/// * `innermost_fallback`: `true`
/// * `coherency_tolerance`: 1e-6 MeV
#[derive(Debug, Clone, PartialEq)]
pub struct ReconParams {
    pub default_branch: Branch,
    pub parallel_groups: bool,
    pub mass_formula: MassFormula,
    pub innermost_fallback: bool,
    pub coherency_tolerance: MeV,
}

impl ReconParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> ReconParamsBuilder {
        ReconParamsBuilder::new()
    }
}

impl Default for ReconParams {
    fn default() -> Self {
        ReconParams {
            default_branch: Branch::High,
            parallel_groups: false,
            mass_formula: MassFormula::BetaStability,
            innermost_fallback: true,
            coherency_tolerance: 1e-6,
        }
    }
}

/// Builder for [`ReconParams`], with validation.
#[derive(Debug, Clone, Default)]
pub struct ReconParamsBuilder {
    params: ReconParams,
}

impl ReconParamsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_branch(mut self, v: Branch) -> Self {
        self.params.default_branch = v;
        self
    }

    pub fn parallel_groups(mut self, v: bool) -> Self {
        self.params.parallel_groups = v;
        self
    }

    pub fn mass_formula(mut self, v: MassFormula) -> Self {
        self.params.mass_formula = v;
        self
    }

    pub fn innermost_fallback(mut self, v: bool) -> Self {
        self.params.innermost_fallback = v;
        self
    }

    pub fn coherency_tolerance(mut self, v: MeV) -> Self {
        self.params.coherency_tolerance = v;
        self
    }

    /// Return true iff x >= 0.0 and comparable (i.e., not NaN).
    #[inline]
    fn ge0(x: f64) -> bool {
        matches!(x.partial_cmp(&0.0), Some(Greater) | Some(Equal))
    }

    /// Finalize the builder.
    ///
    /// Return
    /// ----------
    /// * The parameters, or [`ReconError::InvalidReconParameter`] when
    ///   `coherency_tolerance` is negative or NaN.
    pub fn build(self) -> Result<ReconParams, ReconError> {
        if !Self::ge0(self.params.coherency_tolerance) {
            return Err(ReconError::InvalidReconParameter(
                "coherency_tolerance must be >= 0".into(),
            ));
        }
        Ok(self.params)
    }
}

impl fmt::Display for ReconParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            const PARAM_COL: usize = 40;
            writeln!(f, "Reconstruction Parameters")?;
            writeln!(f, "-------------------------")?;

            macro_rules! line {
                ($fmt:expr, $val:expr, $comment:expr) => {{
                    let s = format!($fmt, $val);
                    let pad = if s.len() < PARAM_COL {
                        " ".repeat(PARAM_COL - s.len())
                    } else {
                        " ".to_string()
                    };
                    writeln!(f, "  {}{}# {}", s, pad, $comment)
                }};
            }

            line!(
                "default_branch      = {}",
                self.default_branch,
                "Branch for Zmin particles in outermost detectors"
            )?;
            line!(
                "parallel_groups     = {}",
                self.parallel_groups,
                "Reconstruct groups on worker threads"
            )?;
            line!(
                "mass_formula        = {}",
                self.mass_formula,
                "Mass of unmeasured isotopes"
            )?;
            line!(
                "innermost_fallback  = {}",
                self.innermost_fallback,
                "Seed in a fired innermost detector"
            )?;
            line!(
                "coherency_tolerance = {:.1e} MeV",
                self.coherency_tolerance,
                "Residual change marking a reclassification"
            )?;
            Ok(())
        } else {
            write!(
                f,
                "ReconParams(default_branch={}, parallel_groups={}, mass_formula={}, innermost_fallback={}, coherency_tolerance={:.1e})",
                self.default_branch,
                self.parallel_groups,
                self.mass_formula,
                self.innermost_fallback,
                self.coherency_tolerance
            )
        }
    }
}

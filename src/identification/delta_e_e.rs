//! ΔE–E identification from theoretical energy-loss lines.
//!
//! For a measured pair `(ΔE, E)` (loss in the front detector, energy deposited in the
//! stopping detector), the theoretical line of charge `Z` gives the ΔE expected in front for a
//! particle of charge `Z` stopping in the stopping detector with `E`:
//!
//! ```text
//!  e_in  = stop.incident_energy(Z, A, E, Low)          energy entering the stop detector
//!  e_inc = front.incident_energy_from_residual(Z, A, e_in)
//!  ΔE(Z) = front.energy_loss(Z, A, e_inc)
//! ```
//!
//! Lines increase with `Z`. The PID is the measured ΔE interpolated between the two lines
//! bracketing it, `Z = round(PID)`. Light charges get a mass by comparing the measured ΔE with
//! the lines of the neighbouring isotopes.
//!
//! A point below the lowest line in an outermost stopping detector is tested against the
//! punch-through hypothesis: the particle crossed both detectors, ΔE sits on the high branch of
//! the front curve and `E` on the high branch of the stop curve.
use std::cmp::Ordering::{Equal, Greater};
use std::fmt;

use crate::{
    constants::{MeV, Z_MAX},
    energy_loss::{Branch, Inversion, Residual},
    partrec_errors::ReconError,
};

use super::{zmin, IdCode, IdentificationResult, Measurement, Telescope, TelescopeResponse};

/// Tuning of [`DeltaEResidual`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdentificationParams {
    /// Smallest front loss (MeV) that can be identified.
    pub min_delta_e: MeV,
    /// Smallest stopping-detector energy (MeV) that can be identified.
    pub min_residual: MeV,
    /// Heaviest charge for which the mass is identified.
    pub mass_id_zmax: u32,
    /// Heaviest charge of the line grid.
    pub zmax: u32,
    /// Largest relative mismatch of the stop energy accepted by the punch-through hypothesis.
    pub punch_through_tolerance: f64,
}

impl Default for IdentificationParams {
    fn default() -> Self {
        IdentificationParams {
            min_delta_e: 0.05,
            min_residual: 0.05,
            mass_id_zmax: 4,
            zmax: Z_MAX,
            punch_through_tolerance: 0.05,
        }
    }
}

impl IdentificationParams {
    /// Check the parameters.
    ///
    /// Return
    /// ----------
    /// * `self`, or [`ReconError::InvalidIdentificationParameter`] when a threshold is negative,
    ///   `zmax` is outside `[1, Z_MAX]`, `mass_id_zmax > zmax` or the tolerance is not positive.
    pub fn validated(self) -> Result<Self, ReconError> {
        let ge0 = |x: f64| matches!(x.partial_cmp(&0.0), Some(Greater) | Some(Equal));
        if !ge0(self.min_delta_e) || !ge0(self.min_residual) {
            return Err(ReconError::InvalidIdentificationParameter(
                "thresholds must be non-negative".into(),
            ));
        }
        if self.zmax == 0 || self.zmax > Z_MAX {
            return Err(ReconError::InvalidIdentificationParameter(format!(
                "zmax must be in [1, {Z_MAX}]"
            )));
        }
        if self.mass_id_zmax > self.zmax {
            return Err(ReconError::InvalidIdentificationParameter(
                "mass_id_zmax must be <= zmax".into(),
            ));
        }
        if self.punch_through_tolerance.partial_cmp(&0.0) != Some(Greater) {
            return Err(ReconError::InvalidIdentificationParameter(
                "punch_through_tolerance must be > 0".into(),
            ));
        }
        Ok(self)
    }
}

/// ΔE–E telescope response.
#[derive(Debug, Clone, Default)]
pub struct DeltaEResidual {
    params: IdentificationParams,
}

impl DeltaEResidual {
    pub fn new(params: IdentificationParams) -> Result<Self, ReconError> {
        Ok(DeltaEResidual {
            params: params.validated()?,
        })
    }

    pub fn params(&self) -> &IdentificationParams {
        &self.params
    }

    /// Front loss expected for `(z, a)` stopping in the stop detector with `e_stop`.
    /// `None` when such a particle cannot stop there or the energies leave the tables.
    pub fn line(&self, t: &Telescope<'_>, z: u32, a: u32, e_stop: MeV) -> Option<MeV> {
        let front = t.front?;
        let e_in = match t.stop.stack().incident_energy(z, a, e_stop, Branch::Low) {
            Ok(Inversion::Resolved(e)) => e,
            _ => return None,
        };
        let e_inc = front
            .stack()
            .incident_energy_from_residual(z, a, e_in)
            .ok()?;
        front.stack().energy_loss(z, a, e_inc).ok()
    }

    /// Best mass among the isotopes around the formula mass.
    fn mass(&self, t: &Telescope<'_>, z: u32, m: &Measurement) -> Option<u32> {
        let a_f = t.mass_formula.mass(z);
        (a_f.saturating_sub(3).max(z)..=a_f + 3)
            .filter_map(|a| {
                self.line(t, z, a, m.residual)
                    .map(|th| (a, (th - m.delta_e).abs()))
            })
            .min_by(|x, y| x.1.total_cmp(&y.1))
            .map(|(a, _)| a)
    }

    /// Charge of a particle crossing both detectors that reproduces the measurement, with the
    /// relative mismatch on the stop energy.
    fn punch_through(&self, t: &Telescope<'_>, m: &Measurement) -> Option<(u32, f64)> {
        let front = t.front?;
        let mut best: Option<(u32, f64)> = None;
        for z in 1..=self.params.zmax {
            let a = t.mass_formula.mass(z);
            let e_inc = match front.stack().incident_energy(z, a, m.delta_e, Branch::High) {
                Ok(Inversion::Resolved(e)) => e,
                _ => continue,
            };
            let e_out = match front.stack().residual_energy(z, a, e_inc) {
                Ok(Residual::Exits(e)) => e,
                _ => continue,
            };
            if !matches!(
                t.stop.stack().residual_energy(z, a, e_out),
                Ok(Residual::Exits(_))
            ) {
                continue;
            }
            let Ok(expected) = t.stop.stack().energy_loss(z, a, e_out) else {
                continue;
            };
            let mismatch = (expected - m.residual).abs() / m.residual;
            if best.map_or(true, |(_, b)| mismatch < b) {
                best = Some((z, mismatch));
            }
        }
        best.filter(|&(_, mismatch)| mismatch < self.params.punch_through_tolerance)
    }
}

impl TelescopeResponse for DeltaEResidual {
    fn identify(&self, t: &Telescope<'_>, m: &Measurement) -> IdentificationResult {
        let label = t.label();
        let formula = t.mass_formula;
        let Some(front) = t.front else {
            return IdentificationResult::failed(label, IdCode::NoResponse, "no front detector");
        };

        if m.delta_e < self.params.min_delta_e || m.residual < self.params.min_residual {
            let z = if m.delta_e >= self.params.min_delta_e {
                zmin(front.stack(), m.delta_e, formula)
            } else {
                zmin(t.stop.stack(), m.residual.max(0.0), formula)
            };
            return IdentificationResult::zmin(
                label,
                IdCode::BelowThreshold,
                z,
                formula,
                format!("dE={:.3} E={:.3} below thresholds", m.delta_e, m.residual),
            );
        }

        // Walk the lines upwards until one passes above the measured ΔE.
        let mut below: Option<(u32, MeV)> = None;
        let mut above: Option<(u32, MeV)> = None;
        for z in 1..=self.params.zmax {
            let Some(th) = self.line(t, z, formula.mass(z), m.residual) else {
                continue;
            };
            if th >= m.delta_e {
                above = Some((z, th));
                break;
            }
            below = Some((z, th));
        }

        let pid = match (below, above) {
            (None, None) => {
                return IdentificationResult::failed(
                    label,
                    IdCode::OutOfRange,
                    format!("no theoretical line at E={:.3}", m.residual),
                );
            }
            (Some((z_lo, _)), None) => {
                let mut res = IdentificationResult::zmin(
                    label,
                    IdCode::PileUp,
                    z_lo,
                    formula,
                    format!("dE={:.3} above Z={z_lo} line", m.delta_e),
                );
                res.pid = z_lo as f64;
                return res;
            }
            (Some((z_lo, th_lo)), Some((z_hi, th_hi))) => {
                z_lo as f64 + (m.delta_e - th_lo) / (th_hi - th_lo) * (z_hi - z_lo) as f64
            }
            (None, Some((z0, th0))) => {
                let clearly_below =
                    m.delta_e < th0 * (1.0 - self.params.punch_through_tolerance);
                if t.stop_is_outermost && clearly_below {
                    if let Some((z, mismatch)) = self.punch_through(t, m) {
                        return IdentificationResult {
                            success: true,
                            z,
                            a: formula.mass(z),
                            pid: z as f64,
                            code: IdCode::PunchThrough,
                            comment: format!("punch-through, stop energy mismatch {mismatch:.3}"),
                            ..IdentificationResult::attempt(label)
                        };
                    }
                }
                (z0 - 1) as f64 + m.delta_e / th0
            }
        };

        let z = (pid.round() as u32).clamp(1, self.params.zmax);
        let mass = (z <= self.params.mass_id_zmax)
            .then(|| self.mass(t, z, m))
            .flatten();

        IdentificationResult {
            success: true,
            z,
            a: mass.unwrap_or_else(|| formula.mass(z)),
            mass_identified: mass.is_some(),
            pid,
            code: if mass.is_some() {
                IdCode::Identified
            } else {
                IdCode::ZOnly
            },
            ..IdentificationResult::attempt(label)
        }
    }
}

impl fmt::Display for DeltaEResidual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DeltaEResidual(min_dE={:.3}, min_E={:.3}, mass_id_zmax={}, zmax={})",
            self.params.min_delta_e,
            self.params.min_residual,
            self.params.mass_id_zmax,
            self.params.zmax
        )
    }
}

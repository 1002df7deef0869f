//! Identification of simulated events from the simulation truth.
//!
//! When several true particles end in the same detector, the array sees a single particle.
//! The identity is then the merge of all of them: charges, masses and energies are summed.
//! This is only meaningful for simulated data; measured pile-up stays flagged as
//! [`IdCode::PileUp`] by the other responses.
use crate::{constants::MeV, events::DetectorHit};

use super::{IdCode, IdentificationResult};

#[derive(Debug, Clone, Copy, Default)]
pub struct FilterIdentification;

impl FilterIdentification {
    /// Identity and energy of the particle stopping in the detector that recorded `hit`.
    ///
    /// Return
    /// ----------
    /// * The identification result and the true energy (MeV). A single true particle gives
    ///   [`IdCode::Filter`], several give [`IdCode::FilterMerged`], none gives
    ///   [`IdCode::NoResponse`] with zero energy.
    pub fn identify(&self, label: &str, hit: Option<&DetectorHit>) -> (IdentificationResult, MeV) {
        let Some(hit) = hit else {
            return (
                IdentificationResult::failed(label, IdCode::NoResponse, "no hit"),
                0.0,
            );
        };
        let (n, z, a, energy) = hit
            .endpoints()
            .fold((0usize, 0u32, 0u32, 0.0), |(n, z, a, e), t| {
                (n + 1, z + t.z, a + t.a, e + t.energy)
            });
        if n == 0 {
            return (
                IdentificationResult::failed(label, IdCode::NoResponse, "no simulated particle"),
                0.0,
            );
        }

        let code = if n > 1 {
            IdCode::FilterMerged
        } else {
            IdCode::Filter
        };
        let comment = if n > 1 {
            format!("{n} simulated particles merged")
        } else {
            String::new()
        };
        (
            IdentificationResult {
                success: true,
                z,
                a,
                mass_identified: true,
                pid: z as f64,
                code,
                comment,
                ..IdentificationResult::attempt(label)
            },
            energy,
        )
    }
}

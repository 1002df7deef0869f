//! # Ion range tables
//!
//! Range–energy relations of ions in absorber materials. Every energy-loss computation of the
//! crate goes through the [`RangeTable`] trait: the energy left after a slab of thickness `t` is
//! `E' = R⁻¹(R(E) − t)`, and the particle stops inside the slab when `R(E) ≤ t`.
//!
//! Two providers are shipped:
//!
//! * [`Material`] – a velocity-scaled power law
//!   `R(E) = (A / Z²) · r₀ · (E / A)^p`, with material constants `r₀` and `p`.
//!   Its inverse is closed-form.
//! * [`TabulatedRange`] – a sampled reduced-range table `R·Z²/A` against `E/A`, interpolated
//!   linearly in log–log space. Its inverse is found with a Brent search restricted to the
//!   validity range of the table.
//!
//! Ranges are in mg/cm², energies in MeV. Both providers report an upper validity limit per
//! projectile ([`RangeTable::validity_limit`]); inversions beyond it fail with
//! [`ReconError::InversionOutOfRange`] instead of extrapolating.
use std::{collections::HashMap, fmt};

use once_cell::sync::Lazy;
use roots::{find_root_brent, SimpleConvergency};

use crate::{
    constants::{MeV, MgPerCm2, Micrometre, INVERSION_EPS, INVERSION_MAX_ITER},
    partrec_errors::ReconError,
};

/// Range–energy relation of ions in one absorber material.
pub trait RangeTable: Send + Sync + fmt::Debug {
    /// Material name, e.g. `"Si"`.
    fn name(&self) -> &str;

    /// Mass density in g/cm³, used to convert linear thicknesses.
    fn density(&self) -> f64;

    /// Largest incident energy (MeV) for which the table is valid for projectile `(z, a)`.
    fn validity_limit(&self, z: u32, a: u32) -> MeV;

    /// Range (mg/cm²) of projectile `(z, a)` with kinetic energy `e` (MeV).
    fn range(&self, z: u32, a: u32, e: MeV) -> MgPerCm2;

    /// Kinetic energy (MeV) of projectile `(z, a)` whose range is `r` (mg/cm²).
    ///
    /// The default implementation runs a Brent search on `[0, validity_limit]`.
    ///
    /// Return
    /// ----------
    /// * The energy, or [`ReconError::InversionOutOfRange`] when `r` exceeds the range at the
    ///   validity limit.
    fn energy_from_range(&self, z: u32, a: u32, r: MgPerCm2) -> Result<MeV, ReconError> {
        if r <= 0.0 {
            return Ok(0.0);
        }
        let limit = self.validity_limit(z, a);
        let r_max = self.range(z, a, limit);
        if r > r_max {
            return Err(ReconError::InversionOutOfRange {
                z,
                a,
                energy: limit * r / r_max,
                limit,
            });
        }

        let mut convergency = SimpleConvergency {
            eps: INVERSION_EPS,
            max_iter: INVERSION_MAX_ITER,
        };
        Ok(find_root_brent(
            0.0,
            limit,
            |e: f64| self.range(z, a, e) - r,
            &mut convergency,
        )?)
    }

    /// Areal thickness (mg/cm²) of a slab `um` micrometres thick.
    fn thickness_from_micrometres(&self, um: Micrometre) -> MgPerCm2 {
        um * self.density() * 0.1
    }
}

/// Absorber material described by a velocity-scaled power-law range relation.
///
/// `R(E) = (A / Z²) · r0 · (E / A)^exponent` (mg/cm²), valid up to
/// `max_energy_per_nucleon` MeV/u.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    name: String,
    density: f64,
    r0: f64,
    exponent: f64,
    max_energy_per_nucleon: f64,
}

static MATERIALS: Lazy<HashMap<String, Material>> = Lazy::new(|| {
    [
        Material::silicon(),
        Material::csi(),
        Material::c3f8(),
        Material::mylar(),
        Material::bc400(),
        Material::gold(),
    ]
    .into_iter()
    .map(|m| (m.name.clone(), m))
    .collect()
});

impl Material {
    /// Create a custom power-law material.
    ///
    /// Arguments
    /// -----------------
    /// * `name`: material label.
    /// * `density`: g/cm³.
    /// * `r0`: range of a proton at 1 MeV, in mg/cm².
    /// * `exponent`: power of the energy per nucleon.
    /// * `max_energy_per_nucleon`: validity limit of the relation, MeV/u.
    ///
    /// Return
    /// ----------
    /// * The material, or [`ReconError::InvalidRangeTable`] if a constant is not strictly positive.
    pub fn new(
        name: &str,
        density: f64,
        r0: f64,
        exponent: f64,
        max_energy_per_nucleon: f64,
    ) -> Result<Self, ReconError> {
        let positive = |x: f64| x.partial_cmp(&0.0) == Some(std::cmp::Ordering::Greater);
        if ![density, r0, exponent, max_energy_per_nucleon]
            .into_iter()
            .all(positive)
        {
            return Err(ReconError::InvalidRangeTable(format!(
                "material {name}: constants must be > 0"
            )));
        }
        Ok(Material {
            name: name.to_string(),
            density,
            r0,
            exponent,
            max_energy_per_nucleon,
        })
    }

    fn builtin(name: &str, density: f64, r0: f64) -> Self {
        Material {
            name: name.to_string(),
            density,
            r0,
            exponent: 1.75,
            max_energy_per_nucleon: 250.0,
        }
    }

    /// Silicon (semiconductor detectors).
    pub fn silicon() -> Self {
        Self::builtin("Si", 2.33, 3.0)
    }

    /// Caesium iodide (scintillators).
    pub fn csi() -> Self {
        Self::builtin("CsI", 4.51, 5.9)
    }

    /// Octofluoropropane (ionisation chamber gas). Thicknesses are given directly in mg/cm².
    pub fn c3f8() -> Self {
        Self::builtin("C3F8", 3.3e-4, 2.6)
    }

    /// Mylar (windows, dead layers).
    pub fn mylar() -> Self {
        Self::builtin("Myl", 1.39, 2.4)
    }

    /// BC-400 plastic scintillator.
    pub fn bc400() -> Self {
        Self::builtin("BC400", 1.032, 2.2)
    }

    /// Gold (targets).
    pub fn gold() -> Self {
        Self::builtin("Au", 19.3, 7.5)
    }

    /// Look up one of the built-in materials by its label (`"Si"`, `"CsI"`, `"C3F8"`,
    /// `"Myl"`, `"BC400"`, `"Au"`).
    pub fn by_name(name: &str) -> Result<Self, ReconError> {
        MATERIALS
            .get(name)
            .cloned()
            .ok_or_else(|| ReconError::UnknownMaterial(name.to_string()))
    }
}

impl RangeTable for Material {
    fn name(&self) -> &str {
        &self.name
    }

    fn density(&self) -> f64 {
        self.density
    }

    fn validity_limit(&self, _z: u32, a: u32) -> MeV {
        self.max_energy_per_nucleon * a as f64
    }

    fn range(&self, z: u32, a: u32, e: MeV) -> MgPerCm2 {
        if e <= 0.0 {
            return 0.0;
        }
        let a = a as f64;
        let z2 = (z as f64).powi(2);
        a / z2 * self.r0 * (e / a).powf(self.exponent)
    }

    fn energy_from_range(&self, z: u32, a: u32, r: MgPerCm2) -> Result<MeV, ReconError> {
        if r <= 0.0 {
            return Ok(0.0);
        }
        let af = a as f64;
        let z2 = (z as f64).powi(2);
        let e = af * (r * z2 / (af * self.r0)).powf(1.0 / self.exponent);
        let limit = self.validity_limit(z, a);
        if e > limit * (1.0 + 1e-12) {
            return Err(ReconError::InversionOutOfRange {
                z,
                a,
                energy: e,
                limit,
            });
        }
        Ok(e)
    }
}

/// Sampled range table in reduced units.
///
/// The table stores `E/A` (MeV/u) against the reduced range `R·Z²/A` (mg/cm²), so one table
/// serves every projectile through velocity scaling. Values are interpolated linearly in
/// log–log space; below the first sample the first segment's power law is used down to zero.
#[derive(Debug, Clone, PartialEq)]
pub struct TabulatedRange {
    name: String,
    density: f64,
    log_e: Vec<f64>,
    log_r: Vec<f64>,
}

impl TabulatedRange {
    /// Build a table from samples.
    ///
    /// Arguments
    /// -----------------
    /// * `name`, `density`: material label and density (g/cm³).
    /// * `energy_per_nucleon`: strictly increasing, strictly positive MeV/u samples.
    /// * `reduced_range`: strictly increasing, strictly positive `R·Z²/A` samples (mg/cm²).
    ///
    /// Return
    /// ----------
    /// * The table, or [`ReconError::InvalidRangeTable`] when the samples are not usable.
    pub fn new(
        name: &str,
        density: f64,
        energy_per_nucleon: &[f64],
        reduced_range: &[f64],
    ) -> Result<Self, ReconError> {
        if energy_per_nucleon.len() != reduced_range.len() || energy_per_nucleon.len() < 2 {
            return Err(ReconError::InvalidRangeTable(format!(
                "{name}: need at least two (energy, range) samples of equal length"
            )));
        }
        let increasing = |v: &[f64]| v.windows(2).all(|w| w[0] < w[1]) && v[0] > 0.0;
        if !increasing(energy_per_nucleon) || !increasing(reduced_range) {
            return Err(ReconError::InvalidRangeTable(format!(
                "{name}: samples must be strictly positive and increasing"
            )));
        }
        if density <= 0.0 {
            return Err(ReconError::InvalidRangeTable(format!(
                "{name}: density must be > 0"
            )));
        }
        Ok(TabulatedRange {
            name: name.to_string(),
            density,
            log_e: energy_per_nucleon.iter().map(|e| e.ln()).collect(),
            log_r: reduced_range.iter().map(|r| r.ln()).collect(),
        })
    }

    /// Sample a power-law [`Material`] on `n` logarithmically spaced points between
    /// `0.1` MeV/u and its validity limit.
    pub fn sample(material: &Material, n: usize) -> Result<Self, ReconError> {
        let n = n.max(2);
        let lo = 0.1_f64.ln();
        let hi = material.max_energy_per_nucleon.ln();
        let energies: Vec<f64> = (0..n)
            .map(|i| (lo + (hi - lo) * i as f64 / (n - 1) as f64).exp())
            .collect();
        let ranges: Vec<f64> = energies.iter().map(|&e| material.range(1, 1, e)).collect();
        Self::new(material.name(), material.density(), &energies, &ranges)
    }

    fn reduced_range(&self, e_per_u: f64) -> f64 {
        let x = e_per_u.ln();
        let n = self.log_e.len();
        let i = match self.log_e.partition_point(|&v| v <= x) {
            0 => 0,
            p if p >= n => n - 2,
            p => p - 1,
        };
        let slope = (self.log_r[i + 1] - self.log_r[i]) / (self.log_e[i + 1] - self.log_e[i]);
        (self.log_r[i] + slope * (x - self.log_e[i])).exp()
    }
}

impl RangeTable for TabulatedRange {
    fn name(&self) -> &str {
        &self.name
    }

    fn density(&self) -> f64 {
        self.density
    }

    fn validity_limit(&self, _z: u32, a: u32) -> MeV {
        self.log_e.last().map_or(0.0, |v| v.exp()) * a as f64
    }

    fn range(&self, z: u32, a: u32, e: MeV) -> MgPerCm2 {
        if e <= 0.0 {
            return 0.0;
        }
        let af = a as f64;
        self.reduced_range(e / af) * af / (z as f64).powi(2)
    }
}

#[cfg(test)]
mod range_table_test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_power_law_inverse() {
        let si = Material::silicon();
        for &(z, a, e) in &[(1, 1, 5.0), (2, 4, 50.0), (6, 12, 300.0), (20, 40, 1500.0)] {
            let r = si.range(z, a, e);
            let back = si.energy_from_range(z, a, r).unwrap();
            assert_relative_eq!(back, e, max_relative = 1e-12);
        }
        assert_eq!(si.range(2, 4, 0.0), 0.0);
        assert_eq!(si.energy_from_range(2, 4, -1.0).unwrap(), 0.0);
    }

    #[test]
    fn test_proton_range_in_silicon() {
        // 10 MeV protons travel ~0.7 mm in silicon
        let si = Material::silicon();
        let um = si.range(1, 1, 10.0) / (si.density() * 0.1);
        assert!((650.0..780.0).contains(&um), "range = {um} um");
    }

    #[test]
    fn test_power_law_out_of_range() {
        let si = Material::silicon();
        let limit = si.validity_limit(2, 4);
        let r = si.range(2, 4, 2.0 * limit);
        match si.energy_from_range(2, 4, r) {
            Err(ReconError::InversionOutOfRange { limit: l, .. }) => assert_eq!(l, limit),
            other => panic!("expected out-of-range error, got {other:?}"),
        }
    }

    #[test]
    fn test_tabulated_matches_power_law() {
        let si = Material::silicon();
        let table = TabulatedRange::sample(&si, 200).unwrap();
        for &(z, a, e) in &[(1, 1, 3.0), (2, 4, 80.0), (8, 16, 500.0)] {
            assert_relative_eq!(table.range(z, a, e), si.range(z, a, e), max_relative = 1e-9);
            let r = si.range(z, a, e);
            let back = table.energy_from_range(z, a, r).unwrap();
            assert_relative_eq!(back, e, max_relative = 1e-6);
        }
    }

    #[test]
    fn test_tabulated_rejects_bad_samples() {
        let err = TabulatedRange::new("x", 1.0, &[1.0, 0.5], &[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, ReconError::InvalidRangeTable(_)));
        let err = TabulatedRange::new("x", 1.0, &[1.0], &[1.0]).unwrap_err();
        assert!(matches!(err, ReconError::InvalidRangeTable(_)));
    }

    #[test]
    fn test_material_lookup() {
        assert_eq!(Material::by_name("CsI").unwrap(), Material::csi());
        assert_eq!(
            Material::by_name("Unobtainium").unwrap_err(),
            ReconError::UnknownMaterial("Unobtainium".into())
        );
        assert!(Material::new("bad", 1.0, -1.0, 1.75, 100.0).is_err());
    }

    #[test]
    fn test_thickness_conversion() {
        let si = Material::silicon();
        assert_relative_eq!(si.thickness_from_micrometres(300.0), 69.9, max_relative = 1e-12);
    }
}

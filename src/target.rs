//! # Target energy-loss correction
//!
//! Reaction products are emitted inside the target and lose energy on their way out before
//! reaching the array. A [`TargetModel`] gives this loss in both directions:
//!
//! * forwards, [`TargetModel::exit_energy`]: energy with which a particle emitted with `e`
//!   leaves the target (used by the simulator),
//! * backwards, [`TargetModel::correction`]: energy to add to a particle detected with `e_out`
//!   to recover its energy at emission (used by calibration).
//!
//! [`SlabTarget`] assumes emission at mid-thickness: the effective path is half the target
//! thickness divided by `cos θ`.
use std::{fmt, sync::Arc};

use crate::{
    constants::{Degree, MeV, MgPerCm2, RADEG},
    energy_loss::{Layer, RangeTable, Residual},
    partrec_errors::ReconError,
};

/// Energy loss of reaction products in the target.
pub trait TargetModel: Send + Sync + fmt::Debug {
    /// Energy (MeV) lost in the target by particle `(z, a)` leaving it at polar angle `theta`
    /// with `e_out` MeV.
    fn correction(&self, z: u32, a: u32, e_out: MeV, theta: Degree) -> Result<MeV, ReconError>;

    /// Energy of particle `(z, a)` emitted with `e` MeV at polar angle `theta` after it leaves
    /// the target, or [`Residual::Stopped`].
    fn exit_energy(&self, z: u32, a: u32, e: MeV, theta: Degree) -> Result<Residual, ReconError>;
}

/// No target material: no correction.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTarget;

impl TargetModel for NoTarget {
    fn correction(&self, _z: u32, _a: u32, _e_out: MeV, _theta: Degree) -> Result<MeV, ReconError> {
        Ok(0.0)
    }

    fn exit_energy(&self, _z: u32, _a: u32, e: MeV, _theta: Degree) -> Result<Residual, ReconError> {
        Ok(Residual::Exits(e))
    }
}

/// Target foil normal to the beam, products emitted at mid-thickness.
#[derive(Debug, Clone)]
pub struct SlabTarget {
    table: Arc<dyn RangeTable>,
    thickness: MgPerCm2,
}

impl SlabTarget {
    pub fn new(table: Arc<dyn RangeTable>, thickness: MgPerCm2) -> Result<Self, ReconError> {
        if !(thickness > 0.0) {
            return Err(ReconError::InvalidThickness("target".into(), thickness));
        }
        Ok(SlabTarget { table, thickness })
    }

    pub fn thickness(&self) -> MgPerCm2 {
        self.thickness
    }

    /// Thickness seen by a product emitted at `theta`, capped at grazing angles.
    fn effective_layer(&self, theta: Degree) -> Layer {
        let cos = (theta * RADEG).cos().abs().max(1e-3);
        Layer::new(self.table.clone(), 0.5 * self.thickness / cos)
    }
}

impl TargetModel for SlabTarget {
    fn correction(&self, z: u32, a: u32, e_out: MeV, theta: Degree) -> Result<MeV, ReconError> {
        if z == 0 {
            return Ok(0.0);
        }
        let layer = self.effective_layer(theta);
        let r = layer.table.range(z, a, e_out) + layer.thickness;
        Ok(layer.table.energy_from_range(z, a, r)? - e_out)
    }

    fn exit_energy(&self, z: u32, a: u32, e: MeV, theta: Degree) -> Result<Residual, ReconError> {
        if z == 0 {
            return Ok(Residual::Exits(e));
        }
        self.effective_layer(theta).traverse(z, a, e)
    }
}

#[cfg(test)]
mod target_test {
    use super::*;
    use crate::energy_loss::Material;
    use approx::assert_relative_eq;

    #[test]
    fn test_correction_inverts_exit_energy() {
        let target = SlabTarget::new(Arc::new(Material::gold()), 2.0).unwrap();
        let e = 40.0;
        let out = target.exit_energy(2, 4, e, 30.0).unwrap().energy();
        assert!(out < e);
        let corr = target.correction(2, 4, out, 30.0).unwrap();
        assert_relative_eq!(out + corr, e, max_relative = 1e-10);
    }

    #[test]
    fn test_oblique_exit_loses_more() {
        let target = SlabTarget::new(Arc::new(Material::gold()), 2.0).unwrap();
        let forward = target.exit_energy(2, 4, 20.0, 0.0).unwrap().energy();
        let oblique = target.exit_energy(2, 4, 20.0, 60.0).unwrap().energy();
        assert!(oblique < forward);
    }

    #[test]
    fn test_slow_particle_stops_in_target() {
        let target = SlabTarget::new(Arc::new(Material::gold()), 20.0).unwrap();
        assert!(target.exit_energy(6, 12, 1.0, 0.0).unwrap().is_stopped());
        assert!(SlabTarget::new(Arc::new(Material::gold()), 0.0).is_err());
    }
}

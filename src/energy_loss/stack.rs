//! # Detector absorber stacks
//!
//! A [`DetectorStack`] is the ordered list of absorber [`Layer`]s of one detector, as seen by a
//! particle coming from the target, with exactly one **active** layer (the one whose energy loss
//! is measured). Layers in front of the active one are dead layers (windows, contacts); layers
//! after it are inactive backings.
//!
//! ## Operations
//!
//! For a projectile `(z, a)`:
//!
//! * [`DetectorStack::energy_loss`] – energy lost in the active layer for an incident energy,
//! * [`DetectorStack::residual_energy`] – energy left after the whole stack, or
//!   [`Residual::Stopped`],
//! * [`DetectorStack::incident_energy`] – inverse of `energy_loss` on a chosen [`Branch`],
//! * [`DetectorStack::incident_energy_from_residual`] – inverse of `residual_energy`,
//! * [`DetectorStack::max_energy_loss`] – location and value of the maximum of the ΔE curve.
//!
//! ## Shape of the ΔE curve
//!
//! ```text
//!  ΔE
//!   |          /\  <- punch-through: the particle just crosses the active layer
//!   |         /  \
//!   |        /    `-._
//!   |       /         `----.____
//!   +------+----------------------------- E_inc
//!      threshold (reaches the active layer)
//! ```
//!
//! Below the maximum the particle stops in the active layer and `ΔE` equals the energy with which
//! it entered it ([`Branch::Low`]). Above the maximum it crosses the layer and `ΔE` decreases
//! ([`Branch::High`]). Energy losses larger than the maximum cannot be produced by one particle;
//! [`DetectorStack::incident_energy`] reports them as [`Inversion::Saturated`].
//!
//! When crossing the active layer needs more energy than the range tables cover (thick
//! scintillators), the curve has no maximum inside the validity range: losses are still computed
//! for every valid incident energy, `de_max` is the loss at the validity limit, and only the
//! high-branch and saturation answers are refused.
//!
//! ## Caching
//!
//! The characteristic energies of the curve are computed once per `(z, a)` and kept in an
//! [`EnergyLossFunction`] cached inside the stack. Changing a layer thickness with
//! [`DetectorStack::set_thickness`] drops the cache.
use std::{collections::HashMap, fmt, sync::Arc, sync::RwLock};

use ahash::RandomState;
use roots::{find_root_brent, SimpleConvergency};
use serde::{Deserialize, Serialize};

use crate::{
    constants::{MeV, MgPerCm2, Micrometre, INVERSION_EPS, INVERSION_MAX_ITER, SATURATION_SLACK},
    energy_loss::range_table::RangeTable,
    partrec_errors::ReconError,
};

/// Energy left to a particle after an absorber.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Residual {
    /// The particle leaves the absorber with this kinetic energy (MeV).
    Exits(MeV),
    /// The particle stops inside the absorber.
    Stopped,
}

impl Residual {
    /// Residual energy, `0.0` when the particle stopped.
    pub fn energy(&self) -> MeV {
        match self {
            Residual::Exits(e) => *e,
            Residual::Stopped => 0.0,
        }
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, Residual::Stopped)
    }
}

/// Side of the ΔE curve maximum on which an inversion is searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Branch {
    /// Incident energy below the maximum: the particle stops in the active layer.
    Low,
    /// Incident energy above the maximum: the particle crosses the active layer.
    #[default]
    High,
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Branch::Low => write!(f, "low"),
            Branch::High => write!(f, "high"),
        }
    }
}

/// Outcome of [`DetectorStack::incident_energy`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Inversion {
    /// The incident energy producing the requested loss.
    Resolved(MeV),
    /// The requested loss exceeds the curve maximum `de_max`; `e_at_max` is the incident
    /// energy of the maximum. Treat as a pile-up or mis-identification signal.
    Saturated { e_at_max: MeV, de_max: MeV },
}

impl Inversion {
    /// Incident energy, the energy of the maximum when saturated.
    pub fn energy(&self) -> MeV {
        match self {
            Inversion::Resolved(e) => *e,
            Inversion::Saturated { e_at_max, .. } => *e_at_max,
        }
    }

    pub fn is_saturated(&self) -> bool {
        matches!(self, Inversion::Saturated { .. })
    }
}

/// One absorber slab.
#[derive(Debug, Clone)]
pub struct Layer {
    pub table: Arc<dyn RangeTable>,
    pub thickness: MgPerCm2,
}

impl Layer {
    pub fn new(table: Arc<dyn RangeTable>, thickness: MgPerCm2) -> Self {
        Layer { table, thickness }
    }

    /// Slab whose thickness is given in micrometres.
    pub fn from_micrometres(table: Arc<dyn RangeTable>, um: Micrometre) -> Self {
        let thickness = table.thickness_from_micrometres(um);
        Layer { table, thickness }
    }

    /// Propagate a particle of energy `e` through the slab.
    pub fn traverse(&self, z: u32, a: u32, e: MeV) -> Result<Residual, ReconError> {
        if e <= 0.0 {
            return Ok(Residual::Stopped);
        }
        let r = self.table.range(z, a, e);
        if r <= self.thickness {
            return Ok(Residual::Stopped);
        }
        Ok(Residual::Exits(
            self.table.energy_from_range(z, a, r - self.thickness)?,
        ))
    }

    /// Energy with which a particle entered the slab, given the energy it left with.
    fn energy_before(&self, z: u32, a: u32, e_out: MeV) -> Result<MeV, ReconError> {
        let r = self.table.range(z, a, e_out) + self.thickness;
        self.table.energy_from_range(z, a, r)
    }
}

/// Characteristic energies of the ΔE curve of one stack for one projectile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyLossFunction {
    pub z: u32,
    pub a: u32,
    /// Smallest validity limit over all layers (MeV).
    pub validity_limit: MeV,
    /// Incident energy needed to reach the active layer (MeV); the validity limit when the
    /// active layer cannot be reached.
    pub threshold: MeV,
    /// Incident energy at the ΔE maximum, i.e. to just cross the active layer (MeV). `None` when
    /// it lies beyond the validity limit.
    pub punch_through: Option<MeV>,
    /// Largest ΔE reachable within the validity range (MeV).
    pub de_max: MeV,
    /// Incident energy needed to cross the whole stack, when within the validity range.
    pub stack_punch_through: Option<MeV>,
}

/// Ordered absorber layers of one detector, with one active layer.
pub struct DetectorStack {
    layers: Vec<Layer>,
    active: usize,
    cache: RwLock<HashMap<(u32, u32), Arc<EnergyLossFunction>, RandomState>>,
}

impl Clone for DetectorStack {
    fn clone(&self) -> Self {
        DetectorStack {
            layers: self.layers.clone(),
            active: self.active,
            cache: RwLock::new(HashMap::default()),
        }
    }
}

impl fmt::Debug for DetectorStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetectorStack")
            .field("layers", &self.layers)
            .field("active", &self.active)
            .finish()
    }
}

impl fmt::Display for DetectorStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, layer) in self.layers.iter().enumerate() {
            if i > 0 {
                write!(f, " / ")?;
            }
            let mark = if i == self.active { "*" } else { "" };
            write!(
                f,
                "{mark}{:.3} mg/cm2 {}",
                layer.thickness,
                layer.table.name()
            )?;
        }
        Ok(())
    }
}

/// `Ok(None)` when `res` only failed for lying beyond the validity range.
fn within_range(res: Result<MeV, ReconError>) -> Result<Option<MeV>, ReconError> {
    match res {
        Ok(e) => Ok(Some(e)),
        Err(ReconError::InversionOutOfRange { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

fn check_projectile(z: u32, a: u32) -> Result<(), ReconError> {
    if z == 0 || a == 0 {
        return Err(ReconError::InvalidProjectile(z, a));
    }
    Ok(())
}

impl DetectorStack {
    /// Build a stack from its layers, ordered from the target outwards.
    ///
    /// Return
    /// ----------
    /// * The stack, [`ReconError::UnknownLayer`] if `active` is not a layer index, or
    ///   [`ReconError::InvalidThickness`] if a thickness is not strictly positive.
    pub fn new(layers: Vec<Layer>, active: usize) -> Result<Self, ReconError> {
        if active >= layers.len() {
            return Err(ReconError::UnknownLayer("stack".into(), active));
        }
        if let Some(bad) = layers.iter().find(|l| !(l.thickness > 0.0)) {
            return Err(ReconError::InvalidThickness("stack".into(), bad.thickness));
        }
        Ok(DetectorStack {
            layers,
            active,
            cache: RwLock::new(HashMap::default()),
        })
    }

    /// Single active layer stack.
    pub fn single(table: Arc<dyn RangeTable>, thickness: MgPerCm2) -> Result<Self, ReconError> {
        Self::new(vec![Layer::new(table, thickness)], 0)
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active_layer(&self) -> &Layer {
        &self.layers[self.active]
    }

    pub fn total_thickness(&self) -> MgPerCm2 {
        self.layers.iter().map(|l| l.thickness).sum()
    }

    /// Change the thickness of one layer. Drops every cached [`EnergyLossFunction`].
    pub fn set_thickness(&mut self, layer: usize, thickness: MgPerCm2) -> Result<(), ReconError> {
        if !(thickness > 0.0) {
            return Err(ReconError::InvalidThickness("stack".into(), thickness));
        }
        let slot = self
            .layers
            .get_mut(layer)
            .ok_or_else(|| ReconError::UnknownLayer("stack".into(), layer))?;
        slot.thickness = thickness;
        self.cache = RwLock::new(HashMap::default());
        Ok(())
    }

    /// Number of `(z, a)` functions currently cached.
    pub fn cached_functions(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }

    /// Cached characteristic energies for projectile `(z, a)`, computed on first use.
    pub fn function(&self, z: u32, a: u32) -> Result<Arc<EnergyLossFunction>, ReconError> {
        check_projectile(z, a)?;
        if let Some(f) = self
            .cache
            .read()
            .ok()
            .and_then(|cache| cache.get(&(z, a)).cloned())
        {
            return Ok(f);
        }

        let f = Arc::new(self.compute_function(z, a)?);
        if let Ok(mut cache) = self.cache.write() {
            cache.entry((z, a)).or_insert_with(|| f.clone());
        }
        Ok(f)
    }

    fn backpropagate(
        layers: &[Layer],
        z: u32,
        a: u32,
        e_out: MeV,
    ) -> Result<MeV, ReconError> {
        layers
            .iter()
            .rev()
            .try_fold(e_out, |e, layer| layer.energy_before(z, a, e))
    }

    fn compute_function(&self, z: u32, a: u32) -> Result<EnergyLossFunction, ReconError> {
        let validity_limit = self
            .layers
            .iter()
            .map(|l| l.table.validity_limit(z, a))
            .fold(f64::INFINITY, f64::min);

        let front = &self.layers[..self.active];
        let threshold =
            within_range(Self::backpropagate(front, z, a, 0.0))?.unwrap_or(validity_limit);
        let crossing = within_range(self.active_layer().energy_before(z, a, 0.0))?;
        let punch_through = match crossing {
            Some(de) => within_range(Self::backpropagate(front, z, a, de))?
                .filter(|&e| e <= validity_limit),
            None => None,
        };
        let de_max = match (crossing, punch_through) {
            (Some(de), Some(_)) => de,
            _ if threshold >= validity_limit => 0.0,
            _ => self.active_loss(z, a, validity_limit)?,
        };
        let stack_punch_through = Self::backpropagate(&self.layers, z, a, 0.0)
            .ok()
            .filter(|&e| e <= validity_limit);

        Ok(EnergyLossFunction {
            z,
            a,
            validity_limit,
            threshold,
            punch_through,
            de_max,
            stack_punch_through,
        })
    }

    fn check_validity(f: &EnergyLossFunction, e: MeV) -> Result<(), ReconError> {
        if e > f.validity_limit {
            return Err(ReconError::InversionOutOfRange {
                z: f.z,
                a: f.a,
                energy: e,
                limit: f.validity_limit,
            });
        }
        Ok(())
    }

    /// Active-layer loss without validity check or cache lookup.
    fn active_loss(&self, z: u32, a: u32, e_inc: MeV) -> Result<MeV, ReconError> {
        let mut e = e_inc;
        for layer in &self.layers[..self.active] {
            match layer.traverse(z, a, e)? {
                Residual::Exits(r) => e = r,
                Residual::Stopped => return Ok(0.0),
            }
        }
        Ok(match self.active_layer().traverse(z, a, e)? {
            Residual::Stopped => e,
            Residual::Exits(r) => e - r,
        })
    }

    /// Energy lost in the active layer by projectile `(z, a)` with incident energy `e_inc`.
    ///
    /// Arguments
    /// -----------------
    /// * `z`, `a`: projectile charge and mass number.
    /// * `e_inc`: kinetic energy (MeV) on entering the first layer of the stack.
    ///
    /// Return
    /// ----------
    /// * The loss in MeV; `0.0` if the particle stops before the active layer.
    /// * [`ReconError::InversionOutOfRange`] when `e_inc` is above the validity limit.
    pub fn energy_loss(&self, z: u32, a: u32, e_inc: MeV) -> Result<MeV, ReconError> {
        let f = self.function(z, a)?;
        Self::check_validity(&f, e_inc)?;
        if e_inc <= f.threshold {
            return Ok(0.0);
        }
        self.active_loss(z, a, e_inc)
    }

    /// Energy left after all layers, or [`Residual::Stopped`].
    pub fn residual_energy(&self, z: u32, a: u32, e_inc: MeV) -> Result<Residual, ReconError> {
        let f = self.function(z, a)?;
        Self::check_validity(&f, e_inc)?;
        let mut e = e_inc;
        for layer in &self.layers {
            match layer.traverse(z, a, e)? {
                Residual::Exits(r) => e = r,
                Residual::Stopped => return Ok(Residual::Stopped),
            }
        }
        Ok(Residual::Exits(e))
    }

    /// Energy lost in all layers (active and inactive).
    pub fn total_loss(&self, z: u32, a: u32, e_inc: MeV) -> Result<MeV, ReconError> {
        Ok(e_inc - self.residual_energy(z, a, e_inc)?.energy())
    }

    /// Incident energy needed to reach the active layer.
    pub fn threshold_energy(&self, z: u32, a: u32) -> Result<MeV, ReconError> {
        Ok(self.function(z, a)?.threshold)
    }

    /// Maximum of the ΔE curve and the incident energy at which it occurs: `(de_max, e_at_max)`.
    ///
    /// When the punch-through energy lies beyond the validity limit this is the largest loss
    /// within the range, reached at the limit.
    pub fn max_energy_loss(&self, z: u32, a: u32) -> Result<(MeV, MeV), ReconError> {
        let f = self.function(z, a)?;
        Ok((f.de_max, f.punch_through.unwrap_or(f.validity_limit)))
    }

    /// Invert [`DetectorStack::energy_loss`].
    ///
    /// The ΔE curve rises up to the punch-through energy then falls, so the caller chooses the
    /// branch. On the low branch the particle stopped in the active layer and the inversion is
    /// exact (propagation back through the dead layers). On the high branch a Brent search runs
    /// between the punch-through energy and the validity limit.
    ///
    /// Arguments
    /// -----------------
    /// * `z`, `a`: projectile.
    /// * `de`: measured active-layer loss (MeV), strictly positive.
    /// * `branch`: side of the maximum.
    ///
    /// Return
    /// ----------
    /// * [`Inversion::Resolved`] with the incident energy,
    /// * [`Inversion::Saturated`] when `de` is above the curve maximum,
    /// * [`ReconError::InversionOutOfRange`] when the high-branch solution lies beyond the
    ///   validity limit,
    /// * [`ReconError::NonPositiveEnergyLoss`] for `de <= 0`.
    ///
    /// See also
    /// ------------
    /// * [`DetectorStack::max_energy_loss`] – boundary between the two branches.
    pub fn incident_energy(
        &self,
        z: u32,
        a: u32,
        de: MeV,
        branch: Branch,
    ) -> Result<Inversion, ReconError> {
        if !(de > 0.0) {
            return Err(ReconError::NonPositiveEnergyLoss(de));
        }
        let f = self.function(z, a)?;
        let out_of_range = ReconError::InversionOutOfRange {
            z,
            a,
            energy: f.validity_limit,
            limit: f.validity_limit,
        };
        if de > f.de_max * (1.0 + SATURATION_SLACK) {
            return match f.punch_through {
                Some(e_at_max) => Ok(Inversion::Saturated {
                    e_at_max,
                    de_max: f.de_max,
                }),
                None => Err(out_of_range),
            };
        }
        let de = de.min(f.de_max);

        match branch {
            Branch::Low => {
                let e = Self::backpropagate(&self.layers[..self.active], z, a, de)?;
                Ok(Inversion::Resolved(e))
            }
            Branch::High => {
                let hi = f.validity_limit;
                let Some(lo) = f.punch_through.filter(|&lo| lo < hi) else {
                    return Err(out_of_range);
                };
                if de < self.active_loss(z, a, hi)? {
                    return Err(out_of_range);
                }
                let mut convergency = SimpleConvergency {
                    eps: INVERSION_EPS,
                    max_iter: INVERSION_MAX_ITER,
                };
                let e = find_root_brent(
                    lo,
                    hi,
                    |e: f64| self.active_loss(z, a, e).unwrap_or(f64::NAN) - de,
                    &mut convergency,
                )?;
                Ok(Inversion::Resolved(e))
            }
        }
    }

    /// Invert [`DetectorStack::residual_energy`]: incident energy of a particle leaving the
    /// stack with `e_res` MeV. `e_res <= 0` gives the energy needed to just cross the stack.
    pub fn incident_energy_from_residual(
        &self,
        z: u32,
        a: u32,
        e_res: MeV,
    ) -> Result<MeV, ReconError> {
        let f = self.function(z, a)?;
        let e = Self::backpropagate(&self.layers, z, a, e_res.max(0.0))?;
        Self::check_validity(&f, e)?;
        Ok(e)
    }
}

//! # Energy-loss model
//!
//! Forward and inverse energy-loss computations for the absorber stacks of the array.
//!
//! ## Overview
//!
//! - [`range_table`] – range–energy relations of ions in materials ([`RangeTable`] seam,
//!   power-law [`Material`]s and sampled [`TabulatedRange`]s).
//! - [`stack`] – a detector's ordered absorber layers with one active layer, the ΔE curve, its
//!   maximum and its two-branch inversion ([`DetectorStack`]).
//! - [`mass_formula`] – mass number attached to a charge when the mass is not measured.
//!
//! All energies are in MeV, thicknesses in mg/cm².
pub mod mass_formula;
pub mod range_table;
pub mod stack;

pub use mass_formula::MassFormula;
pub use range_table::{Material, RangeTable, TabulatedRange};
pub use stack::{Branch, DetectorStack, EnergyLossFunction, Inversion, Layer, Residual};

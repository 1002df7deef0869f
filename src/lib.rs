//! # partrec
//!
//! Reconstruction of charged particles detected by multi-layer detector arrays: trajectory
//! graph of the array, seeding of particles from fired detectors, ΔE–E identification, energy
//! calibration with pile-up sharing, and forward simulation of the array response.
//!
//! Start from [`DetectorArray::builder`] to describe the geometry, then use [`PartRec`] to
//! reconstruct events and [`DetectionSimulator`] to produce them.
pub mod calibration;
pub mod constants;
pub mod detector_array;
pub mod energy_loss;
pub mod events;
pub mod identification;
pub mod partrec;
pub mod partrec_errors;
pub mod reconstruction;
pub mod run_context;
pub mod simulation;
pub mod target;

pub use detector_array::{Acceptance, DetectorArray, DetectorSpec};
pub use events::{DetectorHit, EventHits};
pub use partrec::PartRec;
pub use partrec_errors::ReconError;
pub use reconstruction::{ReconParams, ReconstructedEvent, ReconstructedParticle};
pub use run_context::{FiringMode, RunContext, RunMode};
pub use simulation::{DetectionOutcome, DetectionSimulator, TrueParticle};

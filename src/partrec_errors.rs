use thiserror::Error;

use crate::constants::MeV;

#[derive(Error, Debug)]
pub enum ReconError {
    #[error("Invalid reconstruction parameter: {0}")]
    InvalidReconParameter(String),

    #[error("Invalid identification parameter: {0}")]
    InvalidIdentificationParameter(String),

    #[error("Duplicate detector name: {0}")]
    DuplicateDetector(String),

    #[error("Unknown detector: {0}")]
    UnknownDetector(String),

    #[error("Unknown material: {0}")]
    UnknownMaterial(String),

    #[error("Detector {0} cannot be placed in front of itself")]
    SelfAdjacency(String),

    #[error("Detector adjacency graph contains a cycle through {0}")]
    GeometryCycle(String),

    #[error("Detector {0} must have exactly one active layer, found {1}")]
    ActiveLayerCount(String, usize),

    #[error("Invalid layer thickness for detector {0}: {1} mg/cm2")]
    InvalidThickness(String, f64),

    #[error("Layer {1} does not exist in detector {0}")]
    UnknownLayer(String, usize),

    #[error("Invalid projectile: Z={0}, A={1}")]
    InvalidProjectile(u32, u32),

    #[error("Energy loss must be strictly positive, got {0} MeV")]
    NonPositiveEnergyLoss(MeV),

    #[error(
        "Energy {energy} MeV outside the validity range [0, {limit}] MeV for Z={z}, A={a}"
    )]
    InversionOutOfRange {
        z: u32,
        a: u32,
        energy: MeV,
        limit: MeV,
    },

    #[error("energy inversion root search failed: {0}")]
    RootFindingError(#[from] roots::SearchError),

    #[error("invalid detector resolution for smearing: {0:?}")]
    NoiseInjectionError(rand_distr::NormalError),

    #[error("Invalid range table: {0}")]
    InvalidRangeTable(String),
}

impl From<rand_distr::NormalError> for ReconError {
    fn from(err: rand_distr::NormalError) -> Self {
        ReconError::NoiseInjectionError(err)
    }
}

impl PartialEq for ReconError {
    fn eq(&self, other: &Self) -> bool {
        use ReconError::*;
        match (self, other) {
            (InvalidReconParameter(a), InvalidReconParameter(b)) => a == b,
            (InvalidIdentificationParameter(a), InvalidIdentificationParameter(b)) => a == b,
            (DuplicateDetector(a), DuplicateDetector(b)) => a == b,
            (UnknownDetector(a), UnknownDetector(b)) => a == b,
            (UnknownMaterial(a), UnknownMaterial(b)) => a == b,
            (SelfAdjacency(a), SelfAdjacency(b)) => a == b,
            (GeometryCycle(a), GeometryCycle(b)) => a == b,
            (ActiveLayerCount(a, n), ActiveLayerCount(b, m)) => a == b && n == m,
            (InvalidThickness(a, x), InvalidThickness(b, y)) => a == b && x == y,
            (UnknownLayer(a, n), UnknownLayer(b, m)) => a == b && n == m,
            (InvalidProjectile(z1, a1), InvalidProjectile(z2, a2)) => z1 == z2 && a1 == a2,
            (NonPositiveEnergyLoss(a), NonPositiveEnergyLoss(b)) => a == b,
            (
                InversionOutOfRange {
                    z: z1,
                    a: a1,
                    energy: e1,
                    limit: l1,
                },
                InversionOutOfRange {
                    z: z2,
                    a: a2,
                    energy: e2,
                    limit: l2,
                },
            ) => z1 == z2 && a1 == a2 && e1 == e2 && l1 == l2,
            (RootFindingError(a), RootFindingError(b)) => a == b,
            (NoiseInjectionError(a), NoiseInjectionError(b)) => a == b,
            (InvalidRangeTable(a), InvalidRangeTable(b)) => a == b,

            _ => false,
        }
    }
}

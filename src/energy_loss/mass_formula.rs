use serde::{Deserialize, Serialize};

/// Rule giving a mass number to a particle whose mass was not measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MassFormula {
    /// Mass along the valley of β-stability, `A ≈ 2.072·Z + 2.32e-3·Z²`,
    /// with the light exceptions `A(1) = 1` and `A(2) = 4`.
    #[default]
    BetaStability,
    /// `A = 2·Z` (`A(1) = 1`).
    TwiceZ,
}

impl MassFormula {
    /// Mass number associated with charge `z`. A neutral particle gets `A = 1`.
    pub fn mass(&self, z: u32) -> u32 {
        match (self, z) {
            (_, 0) | (_, 1) => 1,
            (MassFormula::BetaStability, 2) => 4,
            (MassFormula::BetaStability, z) => {
                let z = z as f64;
                (2.072 * z + 2.32e-3 * z * z).round() as u32
            }
            (MassFormula::TwiceZ, z) => 2 * z,
        }
    }
}

impl std::fmt::Display for MassFormula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MassFormula::BetaStability => write!(f, "beta-stability"),
            MassFormula::TwiceZ => write!(f, "A=2Z"),
        }
    }
}

#[cfg(test)]
mod mass_formula_test {
    use super::*;

    #[test]
    fn test_light_masses() {
        let f = MassFormula::default();
        assert_eq!(f.mass(0), 1);
        assert_eq!(f.mass(1), 1);
        assert_eq!(f.mass(2), 4);
        assert_eq!(f.mass(3), 6);
        assert_eq!(MassFormula::TwiceZ.mass(6), 12);
    }

    #[test]
    fn test_heavy_masses_are_neutron_rich() {
        let f = MassFormula::BetaStability;
        assert_eq!(f.mass(20), 42);
        assert!(f.mass(50) > 100);
        assert!(f.mass(82) > 2 * 82);
    }
}

use super::{zmin, IdCode, IdentificationResult, Measurement, Telescope, TelescopeResponse};

/// Response of a particle stopped in the first detector it met.
///
/// Only one energy is available, so the charge is bounded from below: `Zmin` is the smallest
/// charge able to deposit the measured energy in the detector.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleStage;

impl TelescopeResponse for SingleStage {
    fn identify(&self, t: &Telescope<'_>, m: &Measurement) -> IdentificationResult {
        let label = t.label();
        if !(m.residual > 0.0) {
            return IdentificationResult::failed(label, IdCode::NoResponse, "no energy deposited");
        }
        let z = zmin(t.stop.stack(), m.residual, t.mass_formula);
        IdentificationResult::zmin(
            label,
            IdCode::StoppedInFirstStage,
            z,
            t.mass_formula,
            format!("stopped in {}: Z >= {z}", t.stop.name()),
        )
    }
}

#[cfg(test)]
mod single_stage_test {
    use std::sync::Arc;

    use super::*;
    use crate::{
        detector_array::{Acceptance, DetectorArray, DetectorSpec},
        energy_loss::{MassFormula, Material},
    };

    #[test]
    fn test_zmin_bound() {
        let array = DetectorArray::builder("single")
            .detector(
                DetectorSpec::new("SI", "SI", Acceptance::ring(5.0, 10.0))
                    .active_layer(Arc::new(Material::silicon()), 69.9),
            )
            .build()
            .unwrap();
        let t = Telescope {
            front: None,
            stop: &array.nodes()[0],
            stop_is_outermost: true,
            mass_formula: MassFormula::default(),
        };
        let res = SingleStage.identify(
            &t,
            &Measurement {
                delta_e: 0.0,
                residual: 10.0,
            },
        );
        assert_eq!(res.code, IdCode::StoppedInFirstStage);
        assert_eq!((res.z, res.a), (2, 4));
        assert!(!res.success);

        let none = SingleStage.identify(&t, &Measurement::default());
        assert_eq!(none.code, IdCode::NoResponse);
    }
}

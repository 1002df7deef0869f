#![allow(dead_code)]

use std::sync::Arc;

use approx::assert_relative_eq;
use partrec::energy_loss::{Material, RangeTable};
use partrec::{Acceptance, DetectorArray, DetectorSpec, ReconstructedEvent, ReconstructedParticle};

/// Silicon ΔE (300 µm) in front of a thick silicon E stage (1500 µm), covering 10°–20°.
///
/// A 50 MeV alpha stops in `SI2`; a 500 MeV alpha crosses both.
pub fn si_si_telescope() -> DetectorArray {
    let si: Arc<dyn RangeTable> = Arc::new(Material::silicon());
    DetectorArray::builder("si-si")
        .detector(
            DetectorSpec::new("SI1", "SI", Acceptance::ring(10.0, 20.0))
                .active_layer(si.clone(), 69.9)
                .threshold(0.05),
        )
        .detector(
            DetectorSpec::new("SI2", "SI2", Acceptance::ring(10.0, 20.0))
                .active_layer(si, 349.5)
                .threshold(0.05),
        )
        .link("SI1", "SI2")
        .build()
        .unwrap()
}

/// Ionisation chamber shared by two silicon pads, each backed by a CsI crystal:
///
/// ```text
///  target → CI → SI_A (φ 0°–180°)   → CSI_A
///              → SI_B (φ 180°–360°) → CSI_B
/// ```
pub fn chamber_array() -> DetectorArray {
    let gas: Arc<dyn RangeTable> = Arc::new(Material::c3f8());
    let myl: Arc<dyn RangeTable> = Arc::new(Material::mylar());
    let si: Arc<dyn RangeTable> = Arc::new(Material::silicon());
    let csi: Arc<dyn RangeTable> = Arc::new(Material::csi());
    let left = Acceptance::new(10.0, 20.0, 0.0, 180.0);
    let right = Acceptance::new(10.0, 20.0, 180.0, 360.0);

    DetectorArray::builder("chamber")
        .detector(
            DetectorSpec::new("CI", "CI", Acceptance::ring(10.0, 20.0))
                .active_layer(gas, 15.0)
                .threshold(0.05)
                .signals(2),
        )
        .detector(
            DetectorSpec::new("SI_A", "SI", left)
                .active_layer(si.clone(), 69.9)
                .threshold(0.1),
        )
        .detector(
            DetectorSpec::new("SI_B", "SI", right)
                .active_layer(si, 69.9)
                .threshold(0.1),
        )
        .detector(
            DetectorSpec::new("CSI_A", "CSI", left)
                .dead_layer(myl.clone(), 0.5)
                .active_layer(csi.clone(), 902.0)
                .threshold(0.5),
        )
        .detector(
            DetectorSpec::new("CSI_B", "CSI", right)
                .dead_layer(myl, 0.5)
                .active_layer(csi, 902.0)
                .threshold(0.5),
        )
        .link("CI", "SI_A")
        .link("CI", "SI_B")
        .link("SI_A", "CSI_A")
        .link("SI_B", "CSI_B")
        .build()
        .unwrap()
}

/// Branches of different depths behind one silicon pad:
///
/// ```text
///  target → CI → A (φ 0°–180°) → C
///              → B (φ 180°–360°)
/// ```
///
/// `B` is declared before `A` and `C`, so the short trajectory is walked first.
pub fn uneven_branch_array() -> DetectorArray {
    let si: Arc<dyn RangeTable> = Arc::new(Material::silicon());
    let csi: Arc<dyn RangeTable> = Arc::new(Material::csi());
    let left = Acceptance::new(10.0, 20.0, 0.0, 180.0);
    let right = Acceptance::new(10.0, 20.0, 180.0, 360.0);

    DetectorArray::builder("uneven")
        .detector(
            DetectorSpec::new("CI", "SI", Acceptance::ring(10.0, 20.0))
                .active_layer(si.clone(), 69.9)
                .threshold(0.05),
        )
        .detector(DetectorSpec::new("B", "SI", right).active_layer(si.clone(), 69.9))
        .detector(DetectorSpec::new("A", "SI", left).active_layer(si, 69.9))
        .detector(DetectorSpec::new("C", "CSI", left).active_layer(csi, 902.0))
        .link("CI", "A")
        .link("CI", "B")
        .link("A", "C")
        .build()
        .unwrap()
}

/// The particle of `event` stopping in `detector`.
pub fn stopped_in<'e>(
    array: &DetectorArray,
    event: &'e ReconstructedEvent,
    detector: &str,
) -> &'e ReconstructedParticle {
    let id = array.node_id(detector).unwrap();
    event
        .particles
        .iter()
        .find(|p| p.stopping_node() == id)
        .unwrap_or_else(|| panic!("no particle stopped in {detector}"))
}

pub fn assert_identity(p: &ReconstructedParticle, z: u32, a: u32, energy: f64, epsilon: f64) {
    assert_eq!(p.z, z, "{p}");
    assert_eq!(p.a, a, "{p}");
    assert_relative_eq!(p.energy, energy, epsilon = epsilon);
}

//! Iterated identification and calibration of the particles of one group.
//!
//! A particle whose telescope shares a detector with other unresolved particles cannot be
//! identified from raw energies. Each pass therefore:
//!
//! 1. identifies every unsettled particle whose telescope detectors are no longer shared,
//!    using the residual energies left by already calibrated particles,
//! 2. calibrates the particles settled during the pass, which subtracts their contributions
//!    from shared detectors,
//! 3. when no particle could be settled, resolves the first pending one as
//!    [`IdCode::MultiHitFirstStage`] with a lower-bound charge.
//!
//! Every pass settles at least one particle, so the loop ends after at most as many passes as
//! the group has particles.
use tracing::{debug, trace, warn};

use crate::{
    calibration::{CalibrationStatus, Calibrator, SharingState},
    events::EventHits,
    identification::{
        zmin, FilterIdentification, IdCode, IdentificationResult, Measurement, Telescope,
    },
    run_context::FiringMode,
};

use super::{group_reconstructor::GroupReconstructor, ReconstructedParticle};

enum Step {
    Settled,
    Rejected,
    Pending,
}

pub(crate) struct AnalysisLoop<'r, 'a> {
    rec: &'r GroupReconstructor<'a>,
    calibrator: Calibrator<'a>,
}

impl<'r, 'a> AnalysisLoop<'r, 'a> {
    pub(crate) fn new(rec: &'r GroupReconstructor<'a>) -> Self {
        AnalysisLoop {
            rec,
            calibrator: Calibrator::new(
                rec.array,
                rec.context.target.as_ref(),
                rec.params.default_branch,
            ),
        }
    }

    /// Run passes until every particle is settled. Returns the number of passes.
    pub(crate) fn run(
        &self,
        particles: &mut [ReconstructedParticle],
        hits: &EventHits,
        sharing: &mut SharingState,
    ) -> usize {
        let mut settled = vec![false; particles.len()];
        let mut passes = 0;

        while settled.contains(&false) {
            passes += 1;
            let mut newly = Vec::new();
            let mut rejected = 0;

            for (i, p) in particles.iter_mut().enumerate() {
                if settled[i] {
                    continue;
                }
                match self.identify(p, hits, sharing) {
                    Step::Settled => {
                        settled[i] = true;
                        newly.push(i);
                    }
                    Step::Rejected => {
                        settled[i] = true;
                        rejected += 1;
                    }
                    Step::Pending => {}
                }
            }

            if newly.is_empty() && rejected == 0 {
                if let Some(blocked) = settled.iter().position(|s| !s) {
                    self.force_multihit(&mut particles[blocked], sharing);
                    settled[blocked] = true;
                    newly.push(blocked);
                }
            }

            for i in newly {
                self.settle_energy(&mut particles[i], sharing);
            }
            trace!(pass = passes, rejected, "analysis pass done");
        }

        debug!(particles = particles.len(), passes, "group analysed");
        passes
    }

    fn identify(
        &self,
        p: &mut ReconstructedParticle,
        hits: &EventHits,
        sharing: &mut SharingState,
    ) -> Step {
        let array = self.rec.array;

        if let Some(&missing) = p.chain[1..]
            .iter()
            .find(|&&n| !hits.fires(n, FiringMode::Any))
        {
            let name = array.node(missing).name().to_string();
            warn!(detector = %name, stop = array.node(p.stopping_node()).name(), "geometry incoherency");
            p.apply_identification(IdentificationResult::failed(
                "",
                IdCode::GeometryIncoherency,
                format!("{name} did not fire"),
            ));
            sharing.release(&p.chain);
            return Step::Rejected;
        }

        let stop = array.node(p.stopping_node());
        let front = p.front_node().map(|id| array.node(id));
        let telescope = Telescope {
            front,
            stop,
            stop_is_outermost: stop.is_outermost(),
            mass_formula: self.rec.params.mass_formula,
        };

        if self.rec.context.is_filter() {
            let (result, energy) =
                FilterIdentification.identify(&telescope.label(), hits.hit(stop.id()));
            p.apply_identification(result);
            p.energy = energy;
            return Step::Settled;
        }

        if sharing.is_shared(stop.id()) || front.is_some_and(|f| sharing.is_shared(f.id())) {
            return Step::Pending;
        }

        let measurement = Measurement {
            delta_e: front.map_or(0.0, |f| sharing.residual(f.id())),
            residual: sharing.residual(stop.id()),
        };
        let mut result = self.rec.registry.identify(&telescope, &measurement);

        let tol = self.rec.params.coherency_tolerance;
        let corrected = sharing.is_corrected(stop.id(), tol)
            || front.is_some_and(|f| sharing.is_corrected(f.id(), tol));
        if corrected && matches!(result.code, IdCode::Identified | IdCode::ZOnly) {
            result.code = IdCode::CoherencyReclassified;
            result.comment = "identified after subtracting other particles".into();
        }
        p.apply_identification(result);
        Step::Settled
    }

    /// Resolve a particle blocked by unresolved sharers with a lower-bound charge.
    fn force_multihit(&self, p: &mut ReconstructedParticle, sharing: &SharingState) {
        let array = self.rec.array;
        let stop = array.node(p.stopping_node());
        let formula = self.rec.params.mass_formula;
        let label = Telescope {
            front: p.front_node().map(|id| array.node(id)),
            stop,
            stop_is_outermost: stop.is_outermost(),
            mass_formula: formula,
        }
        .label();
        let z = zmin(stop.stack(), sharing.residual(stop.id()), formula);
        p.apply_identification(IdentificationResult::zmin(
            label,
            IdCode::MultiHitFirstStage,
            z,
            formula,
            "detector shared with unresolved particles",
        ));
    }

    fn settle_energy(&self, p: &mut ReconstructedParticle, sharing: &mut SharingState) {
        if self.rec.context.is_filter() {
            p.calibration = if p.energy > 0.0 {
                CalibrationStatus::Normal
            } else {
                CalibrationStatus::Uncalibrated
            };
            sharing.release(&p.chain);
            return;
        }
        if matches!(p.id_code, IdCode::NoResponse | IdCode::OutOfRange) || p.z == 0 {
            p.calibration = CalibrationStatus::Uncalibrated;
            sharing.release(&p.chain);
            return;
        }
        self.calibrator.calibrate(p, sharing);
    }
}

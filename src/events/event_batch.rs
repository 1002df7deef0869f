//! # Batch reconstruction over event lists
//!
//! Reconstruct every event of a list with one [`PartRec`] engine and one [`RunContext`], and
//! summarize the hit multiplicities of the batch.
//!
//! ## Overview
//! -----------------
//! [`EventBatch`] is implemented on `[EventHits]` (hence on `Vec<EventHits>`), providing:
//!
//! * `reconstruct_all` – reconstruct **every event**, in input order,
//! * `reconstruct_all_with_cancel` – same, with **cooperative cancellation**,
//! * `total_hits` / `number_of_events` – quick batch-level metrics,
//! * `multiplicity_stats` – how many detectors fire per event across the batch.
//!
//! ## Execution Modes
//! -----------------
//! ### Progress UI (feature: `progress`)
//! With the `progress` feature, the loops render a live progress bar (via `indicatif`) and
//! report per-event timing through a moving average.
//!
//! ### Cooperative cancellation
//! `reconstruct_all_with_cancel` calls `should_cancel()` on **wall-clock intervals** (not
//! event counts), so the cancellation latency stays stable when some events are slow. Events
//! reconstructed before the cancellation are returned.
//!
//! ## Examples
//! -----------------
//! ```rust,ignore
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use partrec::events::event_batch::EventBatch;
//!
//! let stop = AtomicBool::new(false);
//! let events = batch.reconstruct_all_with_cancel(&engine, &context, || stop.load(Ordering::Relaxed));
//! if let Some(stats) = batch.multiplicity_stats() {
//!     eprintln!("{stats:#}");
//! }
//! ```
use std::fmt;
use std::time::{Duration, Instant};

use itertools::Itertools;

use crate::{partrec::PartRec, reconstruction::ReconstructedEvent, run_context::RunContext};

use super::EventHits;

#[cfg(feature = "progress")]
use super::progress_bar::{event_progress_bar, EventClock};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Fired-detector multiplicity over a batch.
///
/// `median` and `p90` are nearest-rank percentiles of the sorted per-event counts, `empty`
/// counts events in which no detector fired.
///
/// Display
/// -----------------
/// * `{}`: `events=200, empty=3, mean=4.12, median=4, p90=8, max=15`
/// * `{:#}`: one quantity per line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MultiplicityStats {
    pub events: usize,
    pub empty: usize,
    pub mean: f64,
    pub median: usize,
    pub p90: usize,
    pub max: usize,
}

impl fmt::Display for MultiplicityStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !f.alternate() {
            return write!(
                f,
                "events={}, empty={}, mean={:.2}, median={}, p90={}, max={}",
                self.events, self.empty, self.mean, self.median, self.p90, self.max
            );
        }
        writeln!(f, "Fired detectors per event ({} events)", self.events)?;
        for (label, value) in [
            ("no hit", self.empty.to_string()),
            ("mean", format!("{:.2}", self.mean)),
            ("median", self.median.to_string()),
            ("90th percentile", self.p90.to_string()),
        ] {
            writeln!(f, "  {label:<16}{value}")?;
        }
        write!(f, "  {:<16}{}", "largest", self.max)
    }
}

pub trait EventBatch {
    /// Reconstruct every event of the batch.
    ///
    /// Arguments
    /// -----------------
    /// * `engine`: geometry, identification registry and parameters.
    /// * `context`: run-level state shared by all events.
    ///
    /// Return
    /// ----------
    /// * One [`ReconstructedEvent`] per input event, in input order.
    fn reconstruct_all(&self, engine: &PartRec, context: &RunContext) -> Vec<ReconstructedEvent>;

    /// As [`reconstruct_all`](EventBatch::reconstruct_all), polling `should_cancel` about every
    /// 20 ms and stopping early when it returns `true`.
    fn reconstruct_all_with_cancel<F>(
        &self,
        engine: &PartRec,
        context: &RunContext,
        should_cancel: F,
    ) -> Vec<ReconstructedEvent>
    where
        F: FnMut() -> bool;

    /// Total number of detector hits over the batch.
    fn total_hits(&self) -> usize;

    fn number_of_events(&self) -> usize;

    /// Distribution of the number of fired detectors per event, `None` for an empty batch.
    fn multiplicity_stats(&self) -> Option<MultiplicityStats>;
}

impl EventBatch for [EventHits] {
    #[cfg(not(feature = "progress"))]
    fn reconstruct_all(&self, engine: &PartRec, context: &RunContext) -> Vec<ReconstructedEvent> {
        self.iter()
            .map(|hits| engine.reconstruct_event(context, hits))
            .collect()
    }

    #[cfg(feature = "progress")]
    fn reconstruct_all(&self, engine: &PartRec, context: &RunContext) -> Vec<ReconstructedEvent> {
        let pb = event_progress_bar(self.len());
        let mut clock = EventClock::new(0.2);
        let mut events = Vec::with_capacity(self.len());

        for hits in self {
            events.push(clock.time(|| engine.reconstruct_event(context, hits)));
            pb.set_message(clock.status());
            pb.inc(1);
        }

        pb.finish_and_clear();
        events
    }

    #[cfg(not(feature = "progress"))]
    fn reconstruct_all_with_cancel<F>(
        &self,
        engine: &PartRec,
        context: &RunContext,
        mut should_cancel: F,
    ) -> Vec<ReconstructedEvent>
    where
        F: FnMut() -> bool,
    {
        let mut events = Vec::with_capacity(self.len());
        let mut last_poll = Instant::now();

        for hits in self {
            if last_poll.elapsed() >= POLL_INTERVAL {
                if should_cancel() {
                    break;
                }
                last_poll = Instant::now();
            }
            events.push(engine.reconstruct_event(context, hits));
        }
        events
    }

    #[cfg(feature = "progress")]
    fn reconstruct_all_with_cancel<F>(
        &self,
        engine: &PartRec,
        context: &RunContext,
        mut should_cancel: F,
    ) -> Vec<ReconstructedEvent>
    where
        F: FnMut() -> bool,
    {
        let pb = event_progress_bar(self.len());
        let mut clock = EventClock::new(0.2);
        let mut events = Vec::with_capacity(self.len());
        let mut last_poll = Instant::now();

        for hits in self {
            if last_poll.elapsed() >= POLL_INTERVAL {
                if should_cancel() {
                    pb.set_message("Interrupted");
                    break;
                }
                last_poll = Instant::now();
            }

            events.push(clock.time(|| engine.reconstruct_event(context, hits)));
            pb.set_message(clock.status());
            pb.inc(1);
        }

        pb.disable_steady_tick();
        pb.finish_and_clear();
        events
    }

    #[inline]
    fn total_hits(&self) -> usize {
        self.iter().map(EventHits::len).sum()
    }

    #[inline]
    fn number_of_events(&self) -> usize {
        self.len()
    }

    fn multiplicity_stats(&self) -> Option<MultiplicityStats> {
        let counts: Vec<usize> = self
            .iter()
            .map(|e| e.hits.values().filter(|h| h.fires_any()).count())
            .sorted_unstable()
            .collect();
        let n = counts.len();
        let largest = *counts.last()?;
        let rank = |q: f64| counts[((q * (n - 1) as f64).round() as usize).min(n - 1)];

        Some(MultiplicityStats {
            events: n,
            empty: counts.iter().take_while(|&&c| c == 0).count(),
            mean: counts.iter().sum::<usize>() as f64 / n as f64,
            median: rank(0.5),
            p90: rank(0.9),
            max: largest,
        })
    }
}

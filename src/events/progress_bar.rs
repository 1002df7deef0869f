//! Progress reporting for batch reconstruction (feature `progress`).
//!
//! Components
//! -----------------
//! * [`EventClock`] – wall time of each reconstructed event, with a running mean smoothed
//!   exponentially (`mean ← mean + s·(dt − mean)`, seeded by the first event).
//! * [`fmt_dur`] – short durations for the bar message (`"253µs"`, `"42ms"`, `"3.14s"`).
//! * [`event_progress_bar`] – the `indicatif` bar used by
//!   [`EventBatch`](super::event_batch::EventBatch).
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

const TEMPLATE: &str =
    "{bar:40.cyan/blue} {pos}/{len} events ({percent:>3}%) | {per_sec} | ETA {eta_precise} | {msg}";

#[derive(Debug, Clone)]
pub struct EventClock {
    smoothing: f64,
    last: Duration,
    mean_s: Option<f64>,
}

impl EventClock {
    /// `smoothing` in `(0, 1]`; `1.0` keeps only the latest event.
    pub fn new(smoothing: f64) -> Self {
        EventClock {
            smoothing: smoothing.clamp(f64::EPSILON, 1.0),
            last: Duration::ZERO,
            mean_s: None,
        }
    }

    /// Run `work`, recording how long it took.
    pub fn time<T>(&mut self, work: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = work();
        self.record(start.elapsed());
        out
    }

    pub fn record(&mut self, dt: Duration) {
        let s = dt.as_secs_f64();
        self.last = dt;
        self.mean_s = Some(match self.mean_s {
            None => s,
            Some(m) => m + self.smoothing * (s - m),
        });
    }

    pub fn last(&self) -> Duration {
        self.last
    }

    pub fn mean(&self) -> Duration {
        self.mean_s.map_or(Duration::ZERO, Duration::from_secs_f64)
    }

    /// Bar message: latest and mean event time.
    pub fn status(&self) -> String {
        format!("event {} | mean {}", fmt_dur(self.last), fmt_dur(self.mean()))
    }
}

pub fn fmt_dur(d: Duration) -> String {
    match d.as_secs_f64() {
        s if s < 1e-3 => format!("{}µs", d.as_micros()),
        s if s < 1.0 => format!("{}ms", d.as_millis()),
        s => format!("{s:.2}s"),
    }
}

/// Progress bar over `n_events` events, redrawn every 200 ms.
pub fn event_progress_bar(n_events: usize) -> ProgressBar {
    let pb = ProgressBar::new((n_events as u64).max(1));
    pb.set_style(ProgressStyle::with_template(TEMPLATE).unwrap_or_else(|_| ProgressStyle::default_bar()));
    pb.enable_steady_tick(Duration::from_millis(200));
    pb
}

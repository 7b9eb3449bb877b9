use serde::{Deserialize, Serialize};

use crate::cost;
use crate::detect::ResonanceDetector;
use crate::instrument::vna::points_for;
use crate::probe;
use crate::session::{Bench, CancelToken};
use crate::simplex::{SimplexDriver, Verdict};
use crate::store::SessionStore;
use crate::TuneError;

/// What the session is asked to produce: a resonance at `frequency_hz`
/// whose residual depth is below `depth_tolerance`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub frequency_hz: f64,
    /// Linear-amplitude depth at which the cavity counts as tuned.
    pub depth_tolerance: f64,
    /// Frequency scale of the cost function's offset term.
    pub frequency_tolerance_hz: f64,
}

impl Target {
    pub fn new(frequency_hz: f64) -> Self {
        Self {
            frequency_hz,
            depth_tolerance: 1.0e-3,
            frequency_tolerance_hz: 1.0e4,
        }
    }
}

/// One cost evaluation in the session log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub length_mm: f64,
    pub coupling_steps: f64,
    pub level: f64,
}

/// Detection span for iteration `n` of the simplex search. The window
/// narrows as the simplex closes in, sharpening the cost around the target.
pub fn span_for_iteration(n: u32) -> f64 {
    if n <= 5 {
        200.0e6
    } else if n <= 20 {
        100.0e6
    } else {
        50.0e6
    }
}

/// IF bandwidth used when the callback re-centers the sweep window.
const CALLBACK_BANDWIDTH_HZ: f64 = 1.0e5;

/// Source power during the optimization.
const TUNE_POWER_DBM: f64 = 10.0;

/// Couples the simplex search to the bench.
///
/// Owns everything the evaluator and the per-iteration callback share — the
/// iteration counter, the current detection span, the best point seen and
/// the iteration log — so the two sides cannot fall out of sync.
pub struct TuningController<'a, 'b> {
    bench: &'a mut Bench<'b>,
    target: Target,
    detector: &'a ResonanceDetector,
    store: Option<&'a mut SessionStore>,
    cancel: CancelToken,
    span_hz: f64,
    best: Option<([f64; 2], f64)>,
    log: Vec<IterationRecord>,
}

impl<'a, 'b> TuningController<'a, 'b> {
    pub fn new(
        bench: &'a mut Bench<'b>,
        target: Target,
        detector: &'a ResonanceDetector,
        store: Option<&'a mut SessionStore>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            bench,
            target,
            detector,
            store,
            cancel,
            span_hz: span_for_iteration(0),
            best: None,
            log: Vec::new(),
        }
    }

    /// The evaluation log and the best `(point, level)` seen so far.
    pub fn into_parts(self) -> (Vec<IterationRecord>, Option<([f64; 2], f64)>) {
        (self.log, self.best)
    }

    fn on_evaluate(&mut self, x: [f64; 2]) -> Result<Verdict, TuneError> {
        if self.cancel.is_cancelled() {
            log::warn!("tuning cancelled");
            return Ok(Verdict::Cancelled);
        }

        self.bench.linear.move_abs_mm(x[0])?;
        self.bench.rotary.move_absolute(x[1].round() as i64)?;
        self.bench.rotary.wait_until_idle()?;

        let level = cost::evaluate(
            self.bench.vna,
            self.detector,
            &self.target,
            self.span_hz,
            self.store.as_deref_mut(),
        )?;
        log::info!(
            "cost = {:.4e} at ({:.4} mm, {:.0} steps)",
            level,
            x[0],
            x[1]
        );
        self.log.push(IterationRecord {
            length_mm: x[0],
            coupling_steps: x[1],
            level,
        });

        let depth = probe::tone_depth(self.bench.vna, self.target.frequency_hz)?.depth_linear;
        if depth < self.target.depth_tolerance {
            log::info!("depth tolerance reached: {:.3e}", depth);
            return Ok(Verdict::DepthMet);
        }

        if self.best.map_or(true, |(_, best)| level < best) {
            self.best = Some((x, level));
        }
        Ok(Verdict::Continue(level))
    }

    fn on_iteration(&mut self, iteration: u32, _best: [f64; 2]) -> Result<Verdict, TuneError> {
        if self.cancel.is_cancelled() {
            log::warn!("tuning cancelled");
            return Ok(Verdict::Cancelled);
        }

        let span = span_for_iteration(iteration);
        if span != self.span_hz {
            log::info!(
                "iteration {}: narrowing detection span to {:.0} MHz",
                iteration,
                span * 1e-6
            );
            self.span_hz = span;
        } else {
            log::debug!("iteration {}", iteration);
        }

        // Re-center the displayed window on the target at the new span.
        self.bench.vna.set_span_hz(span)?;
        self.bench.vna.set_center_hz(self.target.frequency_hz)?;
        self.bench.vna.set_bandwidth_hz(CALLBACK_BANDWIDTH_HZ)?;
        self.bench
            .vna
            .set_points(points_for(span, CALLBACK_BANDWIDTH_HZ))?;
        self.bench.vna.set_power_dbm(TUNE_POWER_DBM)?;

        let depth = probe::tone_depth(self.bench.vna, self.target.frequency_hz)?.depth_linear;
        if depth < self.target.depth_tolerance {
            log::info!("depth tolerance reached: {:.3e}", depth);
            return Ok(Verdict::DepthMet);
        }
        Ok(Verdict::Continue(depth))
    }
}

impl SimplexDriver for TuningController<'_, '_> {
    fn evaluate(&mut self, x: [f64; 2]) -> Result<Verdict, TuneError> {
        self.on_evaluate(x)
    }

    fn iteration_finished(&mut self, iteration: u32, best: [f64; 2]) -> Result<Verdict, TuneError> {
        self.on_iteration(iteration, best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_narrows_on_schedule() {
        assert_eq!(span_for_iteration(1), 200.0e6);
        assert_eq!(span_for_iteration(5), 200.0e6);
        assert_eq!(span_for_iteration(6), 100.0e6);
        assert_eq!(span_for_iteration(20), 100.0e6);
        assert_eq!(span_for_iteration(21), 50.0e6);
        assert_eq!(span_for_iteration(40), 50.0e6);
    }

    #[test]
    fn target_defaults_match_the_tuning_tolerances() {
        let target = Target::new(5.2e9);
        assert_eq!(target.depth_tolerance, 1.0e-3);
        assert_eq!(target.frequency_tolerance_hz, 1.0e4);
    }
}

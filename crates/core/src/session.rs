use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::detect::ResonanceDetector;
use crate::error::SessionFailure;
use crate::instrument::vna::{park, unpark};
use crate::instrument::{steps_from_radians, LinearAxis, RotaryAxis, VnaControl};
use crate::lookup::ModeLookup;
use crate::pull::CoarsePuller;
use crate::scan::{scan_coupling, CouplingScanParams};
use crate::simplex::{Bounds, NelderMead, Termination};
use crate::store::SessionStore;
use crate::tuner::{IterationRecord, Target, TuningController};
use crate::TuneError;

/// Convergence criterion of the simplex search.
pub const SIMPLEX_TOLERANCE: f64 = 0.01;

/// Iteration cap of the simplex search; also the runtime bound, since there
/// is no wall-clock timeout.
pub const MAX_ITERATIONS: u32 = 40;

/// Rotary-motor speed used during tuning.
pub const ROTARY_SPEED: u32 = 15;

/// Cooperative cancellation flag, shared with signal handlers.
///
/// Cancellation is only ever observed between measurements, so the session
/// always unwinds through its restore step.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// The three exclusive instrument handles a session drives.
pub struct Bench<'a> {
    pub vna: &'a mut dyn VnaControl,
    pub linear: &'a mut dyn LinearAxis,
    pub rotary: &'a mut dyn RotaryAxis,
}

/// Session options, mirroring the knobs an operator actually changes.
#[derive(Debug, Clone)]
pub struct TuneOptions {
    pub verbose: bool,
    /// Half-width of the length search box around the starting position.
    pub lin_span_mm: f64,
    /// Coupling span, in motor steps, that scales the initial simplex.
    pub coupling_span_steps: f64,
    /// When false, consult the lookup table and coarse-pull before the
    /// simplex search (cold start).
    pub small_change: bool,
    /// When true, scan the coupling angle for a usable starting point.
    pub scan_coupling: bool,
}

impl Default for TuneOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            lin_span_mm: 0.5,
            coupling_span_steps: steps_from_radians(0.1 * TAU) as f64,
            small_change: true,
            scan_coupling: false,
        }
    }
}

/// What a tuning session produced.
#[derive(Debug, Clone)]
pub struct TuneOutcome {
    pub termination: Termination,
    /// Simplex iterations completed.
    pub iterations: u32,
    pub best_length_mm: f64,
    pub best_coupling_steps: f64,
    pub best_level: f64,
    /// Every cost evaluation, in order.
    pub log: Vec<IterationRecord>,
}

impl TuneOutcome {
    /// True when the depth tolerance was actually met.
    pub fn depth_met(&self) -> bool {
        self.termination == Termination::DepthMet
    }
}

/// Top-level tuning session.
///
/// Owns the tuning strategy (detector, puller, scan parameters) and the
/// session-scoped state; the instruments are borrowed for the duration of
/// [`run`](TuningSession::run). The VNA is parked out of band on entry and —
/// on success, convergence failure, cancellation and error alike — restored
/// and re-centered on the target on exit.
pub struct TuningSession {
    target: Target,
    options: TuneOptions,
    detector: ResonanceDetector,
    puller: CoarsePuller,
    scan: CouplingScanParams,
    lookup: Option<ModeLookup>,
    store: Option<SessionStore>,
    cancel: CancelToken,
}

impl TuningSession {
    pub fn new(target: Target, options: TuneOptions) -> Self {
        Self {
            target,
            options,
            detector: ResonanceDetector::default(),
            puller: CoarsePuller::default(),
            scan: CouplingScanParams::default(),
            lookup: None,
            store: None,
            cancel: CancelToken::new(),
        }
    }

    /// Attach the mode lookup table used for cold starts.
    pub fn with_lookup(mut self, lookup: ModeLookup) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Persist raw traces and sweep/peak records into `store`.
    pub fn with_store(mut self, store: SessionStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Use an externally shared cancellation token.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Replace the resonance detector configuration.
    pub fn with_detector(mut self, detector: ResonanceDetector) -> Self {
        self.detector = detector;
        self
    }

    /// Replace the coarse puller configuration.
    pub fn with_puller(mut self, puller: CoarsePuller) -> Self {
        self.puller = puller;
        self
    }

    /// Replace the coupling-scan configuration.
    pub fn with_scan(mut self, scan: CouplingScanParams) -> Self {
        self.scan = scan;
        self
    }

    /// Run the session to completion.
    pub fn run(mut self, bench: &mut Bench) -> Result<TuneOutcome, SessionFailure> {
        log::info!(
            "tuning session started: target {:.6} GHz, depth tolerance {:.1e}",
            self.target.frequency_hz * 1e-9,
            self.target.depth_tolerance
        );

        let saved = park(bench.vna).map_err(|error| SessionFailure {
            error,
            log: Vec::new(),
        })?;

        let result = self.run_inner(bench);

        // Restore runs on every exit path before the result is inspected.
        let restored = unpark(bench.vna, &saved)
            .and_then(|_| bench.vna.set_center_hz(self.target.frequency_hz));
        log::info!("tuning session finished");

        match (result, restored) {
            (Ok(outcome), Ok(())) => Ok(outcome),
            (Err(failure), _) => Err(failure),
            (Ok(outcome), Err(error)) => Err(SessionFailure {
                error,
                log: outcome.log,
            }),
        }
    }

    fn run_inner(&mut self, bench: &mut Bench) -> Result<TuneOutcome, SessionFailure> {
        fn fail(error: TuneError) -> SessionFailure {
            SessionFailure {
                error,
                log: Vec::new(),
            }
        }

        bench.rotary.set_speed(ROTARY_SPEED).map_err(fail)?;
        let fr = self.target.frequency_hz;

        if !self.options.small_change {
            match &self.lookup {
                Some(lookup) => {
                    let positions = lookup.positions_for_hz(fr);
                    if let Some(&position) = positions.last() {
                        log::info!("cold start: lookup suggests {:.3} mm", position);
                        bench.linear.move_abs_mm(position).map_err(fail)?;
                        self.puller
                            .pull(bench, fr, &self.detector, &self.scan, self.store.as_mut())
                            .map_err(fail)?;
                    }
                }
                None => log::warn!(
                    "cold start requested but no lookup table is loaded; tuning from the \
                     current position"
                ),
            }
        }

        if self.options.scan_coupling {
            scan_coupling(bench, fr, &self.scan).map_err(fail)?;
        }

        let initial_length = bench.linear.position_mm().map_err(fail)?;
        let initial_coupling = bench.rotary.position().map_err(fail)? as f64;
        let x0 = [initial_length, initial_coupling];

        let initial_simplex = [
            x0,
            [x0[0] - 0.1, x0[1]],
            [x0[0], x0[1] + 0.05 * self.options.coupling_span_steps],
        ];
        if self.options.verbose {
            log::info!("initial simplex: {:?}", initial_simplex);
        } else {
            log::debug!("initial simplex: {:?}", initial_simplex);
        }

        let optimizer = NelderMead {
            tolerance: SIMPLEX_TOLERANCE,
            max_iterations: MAX_ITERATIONS,
            bounds: Bounds {
                lower: [initial_length - self.options.lin_span_mm, 0.0],
                upper: [initial_length + self.options.lin_span_mm, f64::INFINITY],
            },
        };

        let mut controller = TuningController::new(
            bench,
            self.target,
            &self.detector,
            self.store.as_mut(),
            self.cancel.clone(),
        );
        let outcome = optimizer.run(initial_simplex, &mut controller);
        let (log, best) = controller.into_parts();

        match outcome {
            Ok(simplex) => {
                let (best_x, best_level) = best.unwrap_or((x0, f64::INFINITY));
                if simplex.termination == Termination::IterationCap {
                    log::warn!(
                        "iteration cap reached without meeting the depth tolerance; \
                         best level {:.4e}",
                        best_level
                    );
                }
                Ok(TuneOutcome {
                    termination: simplex.termination,
                    iterations: simplex.iterations,
                    best_length_mm: best_x[0],
                    best_coupling_steps: best_x[1],
                    best_level,
                    log,
                })
            }
            Err(error) => Err(SessionFailure { error, log }),
        }
    }
}

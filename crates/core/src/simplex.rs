use crate::TuneError;

/// Outcome of one objective evaluation or iteration callback.
///
/// The mid-iteration success signal travels through this union instead of an
/// error: the driver inspects it and unwinds cleanly, and every exit still
/// passes through the session's restore step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    /// Keep optimizing; carries the measured level.
    Continue(f64),
    /// The depth tolerance was met — stop, successfully.
    DepthMet,
    /// A cooperative cancellation was requested.
    Cancelled,
}

/// Why the optimizer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    DepthMet,
    SimplexConverged,
    IterationCap,
    Cancelled,
}

/// The optimizer's counterpart: evaluates candidate points and observes
/// iterations. One implementation couples the evaluation, the iteration
/// counter, the span-narrowing schedule and the early-termination check, so
/// they cannot drift apart.
pub trait SimplexDriver {
    /// Move the hardware to `x` and measure the cost there.
    fn evaluate(&mut self, x: [f64; 2]) -> Result<Verdict, TuneError>;

    /// Called after every completed iteration with the current best vertex.
    fn iteration_finished(&mut self, iteration: u32, best: [f64; 2]) -> Result<Verdict, TuneError>;
}

/// Box bounds on the two search parameters. Points outside are projected
/// onto the box rather than reflected, so the simplex can slide along a
/// face without leaving it.
#[derive(Debug, Clone, Copy)]
pub struct Bounds {
    pub lower: [f64; 2],
    pub upper: [f64; 2],
}

impl Bounds {
    pub fn project(&self, mut x: [f64; 2]) -> [f64; 2] {
        for i in 0..2 {
            x[i] = x[i].clamp(self.lower[i], self.upper[i]);
        }
        x
    }

    pub fn contains(&self, x: [f64; 2]) -> bool {
        (0..2).all(|i| x[i] >= self.lower[i] && x[i] <= self.upper[i])
    }
}

/// How the simplex search ended, and after how many iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimplexOutcome {
    pub termination: Termination,
    pub iterations: u32,
}

/// Two-parameter Nelder–Mead with box bounds and a per-iteration callback.
///
/// Standard reflection/expansion/contraction/shrink with coefficients
/// 1, 2, ½, ½. Convergence follows the usual simplex criterion: the search
/// stops once both the vertex spread and the level spread fall below
/// `tolerance`.
#[derive(Debug, Clone, Copy)]
pub struct NelderMead {
    pub tolerance: f64,
    pub max_iterations: u32,
    pub bounds: Bounds,
}

impl NelderMead {
    pub fn run(
        &self,
        initial_simplex: [[f64; 2]; 3],
        driver: &mut dyn SimplexDriver,
    ) -> Result<SimplexOutcome, TuneError> {
        let mut iterations = 0u32;

        macro_rules! eval {
            ($x:expr) => {
                match driver.evaluate($x)? {
                    Verdict::Continue(level) => level,
                    Verdict::DepthMet => {
                        return Ok(SimplexOutcome {
                            termination: Termination::DepthMet,
                            iterations,
                        })
                    }
                    Verdict::Cancelled => {
                        return Ok(SimplexOutcome {
                            termination: Termination::Cancelled,
                            iterations,
                        })
                    }
                }
            };
        }

        let mut simplex: Vec<([f64; 2], f64)> = Vec::with_capacity(3);
        for x in initial_simplex {
            let x = self.bounds.project(x);
            let level = eval!(x);
            simplex.push((x, level));
        }

        loop {
            simplex.sort_by(|a, b| a.1.total_cmp(&b.1));

            if self.converged(&simplex) {
                return Ok(SimplexOutcome {
                    termination: Termination::SimplexConverged,
                    iterations,
                });
            }
            if iterations >= self.max_iterations {
                return Ok(SimplexOutcome {
                    termination: Termination::IterationCap,
                    iterations,
                });
            }

            let best = simplex[0];
            let second = simplex[1];
            let worst = simplex[2];
            let centroid = [
                (best.0[0] + second.0[0]) / 2.0,
                (best.0[1] + second.0[1]) / 2.0,
            ];

            let reflected = self.bounds.project([
                centroid[0] + (centroid[0] - worst.0[0]),
                centroid[1] + (centroid[1] - worst.0[1]),
            ]);
            let reflected_level = eval!(reflected);

            if reflected_level < best.1 {
                // The reflection is the new best — try going further.
                let expanded = self.bounds.project([
                    centroid[0] + 2.0 * (centroid[0] - worst.0[0]),
                    centroid[1] + 2.0 * (centroid[1] - worst.0[1]),
                ]);
                let expanded_level = eval!(expanded);
                simplex[2] = if expanded_level < reflected_level {
                    (expanded, expanded_level)
                } else {
                    (reflected, reflected_level)
                };
            } else if reflected_level < second.1 {
                simplex[2] = (reflected, reflected_level);
            } else {
                // Contract, outside or inside of the face.
                let (candidate, beat) = if reflected_level < worst.1 {
                    (
                        self.bounds.project([
                            centroid[0] + 0.5 * (reflected[0] - centroid[0]),
                            centroid[1] + 0.5 * (reflected[1] - centroid[1]),
                        ]),
                        reflected_level,
                    )
                } else {
                    (
                        self.bounds.project([
                            centroid[0] - 0.5 * (centroid[0] - worst.0[0]),
                            centroid[1] - 0.5 * (centroid[1] - worst.0[1]),
                        ]),
                        worst.1,
                    )
                };
                let candidate_level = eval!(candidate);
                if candidate_level < beat {
                    simplex[2] = (candidate, candidate_level);
                } else {
                    // Shrink everything toward the best vertex.
                    for vertex in simplex.iter_mut().skip(1) {
                        let x = self.bounds.project([
                            best.0[0] + 0.5 * (vertex.0[0] - best.0[0]),
                            best.0[1] + 0.5 * (vertex.0[1] - best.0[1]),
                        ]);
                        let level = eval!(x);
                        *vertex = (x, level);
                    }
                }
            }

            iterations += 1;
            simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
            match driver.iteration_finished(iterations, simplex[0].0)? {
                Verdict::Continue(_) => {}
                Verdict::DepthMet => {
                    return Ok(SimplexOutcome {
                        termination: Termination::DepthMet,
                        iterations,
                    })
                }
                Verdict::Cancelled => {
                    return Ok(SimplexOutcome {
                        termination: Termination::Cancelled,
                        iterations,
                    })
                }
            }
        }
    }

    fn converged(&self, simplex: &[([f64; 2], f64)]) -> bool {
        let (best_x, best_level) = simplex[0];
        simplex[1..].iter().all(|&(x, level)| {
            (x[0] - best_x[0]).abs() <= self.tolerance
                && (x[1] - best_x[1]).abs() <= self.tolerance
                && (level - best_level).abs() <= self.tolerance
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Pure-function driver for exercising the optimizer without hardware.
    struct FnDriver<F: FnMut([f64; 2]) -> f64> {
        objective: F,
        evaluations: u32,
        best: Option<([f64; 2], f64)>,
        stop_below: Option<f64>,
        cancel_at_evaluation: Option<u32>,
    }

    impl<F: FnMut([f64; 2]) -> f64> FnDriver<F> {
        fn new(objective: F) -> Self {
            Self {
                objective,
                evaluations: 0,
                best: None,
                stop_below: None,
                cancel_at_evaluation: None,
            }
        }
    }

    impl<F: FnMut([f64; 2]) -> f64> SimplexDriver for FnDriver<F> {
        fn evaluate(&mut self, x: [f64; 2]) -> Result<Verdict, TuneError> {
            self.evaluations += 1;
            if self.cancel_at_evaluation == Some(self.evaluations) {
                return Ok(Verdict::Cancelled);
            }
            let level = (self.objective)(x);
            if let Some(threshold) = self.stop_below {
                if level < threshold {
                    return Ok(Verdict::DepthMet);
                }
            }
            if self.best.map_or(true, |(_, best)| level < best) {
                self.best = Some((x, level));
            }
            Ok(Verdict::Continue(level))
        }

        fn iteration_finished(&mut self, _n: u32, _best: [f64; 2]) -> Result<Verdict, TuneError> {
            Ok(Verdict::Continue(0.0))
        }
    }

    fn wide_bounds() -> Bounds {
        Bounds {
            lower: [-100.0, -100.0],
            upper: [100.0, 100.0],
        }
    }

    fn simplex_around(x0: [f64; 2]) -> [[f64; 2]; 3] {
        [x0, [x0[0] - 0.1, x0[1]], [x0[0], x0[1] + 0.25]]
    }

    #[test]
    fn minimizes_a_quadratic_bowl() {
        let mut driver = FnDriver::new(|x: [f64; 2]| {
            (x[0] - 3.0) * (x[0] - 3.0) + (x[1] + 2.0) * (x[1] + 2.0)
        });
        let nm = NelderMead {
            tolerance: 1e-6,
            max_iterations: 500,
            bounds: wide_bounds(),
        };
        let outcome = nm.run(simplex_around([0.0, 0.0]), &mut driver).unwrap();
        assert_eq!(outcome.termination, Termination::SimplexConverged);

        let (best_x, best_level) = driver.best.unwrap();
        assert!((best_x[0] - 3.0).abs() < 1e-2, "best x {:?}", best_x);
        assert!((best_x[1] + 2.0).abs() < 1e-2, "best x {:?}", best_x);
        assert!(best_level < 1e-3);
    }

    #[test]
    fn never_leaves_the_bounds() {
        // Minimum outside the box: the search must stick to the face.
        let bounds = Bounds {
            lower: [0.0, 0.0],
            upper: [1.0, 1.0],
        };
        let mut evaluated: Vec<[f64; 2]> = Vec::new();
        let mut driver = FnDriver::new(|x: [f64; 2]| {
            evaluated.push(x);
            (x[0] - 5.0) * (x[0] - 5.0) + x[1] * x[1]
        });
        let nm = NelderMead {
            tolerance: 1e-4,
            max_iterations: 200,
            bounds,
        };
        nm.run([[0.5, 0.5], [0.4, 0.5], [0.5, 0.75]], &mut driver)
            .unwrap();
        drop(driver);
        for x in evaluated {
            assert!(bounds.contains(x), "evaluated out-of-bounds point {:?}", x);
        }
    }

    #[test]
    fn depth_met_unwinds_immediately() {
        let mut driver = FnDriver::new(|x: [f64; 2]| x[0] * x[0] + x[1] * x[1]);
        driver.stop_below = Some(0.5);
        let nm = NelderMead {
            tolerance: 1e-6,
            max_iterations: 100,
            bounds: wide_bounds(),
        };
        let outcome = nm.run(simplex_around([0.3, 0.3]), &mut driver).unwrap();
        assert_eq!(outcome.termination, Termination::DepthMet);
        assert_eq!(outcome.iterations, 0);
    }

    #[test]
    fn iteration_cap_is_enforced() {
        // A drifting objective that never converges.
        let mut n = 0.0;
        let mut driver = FnDriver::new(move |x: [f64; 2]| {
            n += 1.0;
            x[0] * x[0] + x[1] * x[1] - n
        });
        let nm = NelderMead {
            tolerance: 1e-12,
            max_iterations: 7,
            bounds: wide_bounds(),
        };
        let outcome = nm.run(simplex_around([5.0, 5.0]), &mut driver).unwrap();
        assert_eq!(outcome.termination, Termination::IterationCap);
        assert_eq!(outcome.iterations, 7);
    }

    #[test]
    fn cancellation_surfaces_as_cancelled() {
        let mut driver = FnDriver::new(|x: [f64; 2]| x[0] * x[0] + x[1] * x[1]);
        driver.cancel_at_evaluation = Some(5);
        let nm = NelderMead {
            tolerance: 1e-6,
            max_iterations: 100,
            bounds: wide_bounds(),
        };
        let outcome = nm.run(simplex_around([5.0, 5.0]), &mut driver).unwrap();
        assert_eq!(outcome.termination, Termination::Cancelled);
    }

    #[test]
    fn errors_propagate() {
        struct FailingDriver;
        impl SimplexDriver for FailingDriver {
            fn evaluate(&mut self, _x: [f64; 2]) -> Result<Verdict, TuneError> {
                Err(TuneError::Instrument("sweep failed".into()))
            }
            fn iteration_finished(
                &mut self,
                _n: u32,
                _best: [f64; 2],
            ) -> Result<Verdict, TuneError> {
                Ok(Verdict::Continue(0.0))
            }
        }
        let nm = NelderMead {
            tolerance: 1e-6,
            max_iterations: 100,
            bounds: wide_bounds(),
        };
        assert!(matches!(
            nm.run(simplex_around([0.0, 0.0]), &mut FailingDriver),
            Err(TuneError::Instrument(_))
        ));
    }
}

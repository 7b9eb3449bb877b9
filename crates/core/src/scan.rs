use std::f64::consts::TAU;

use crate::instrument::{set_window, steps_from_radians};
use crate::session::Bench;
use crate::TuneError;

/// Parameters of the coupling-angle scan.
#[derive(Debug, Clone)]
pub struct CouplingScanParams {
    /// VNA span while scanning.
    pub span_hz: f64,
    /// IF bandwidth while scanning; coarse, the scan only needs the depth.
    pub bandwidth_hz: f64,
    /// Source power while scanning.
    pub power_dbm: f64,
    /// Angular step between samples.
    pub step_rad: f64,
    /// Total angular range walked from the current position.
    pub range_rad: f64,
    /// Depth at which the coupling counts as good enough to stop early.
    pub good_depth_db: f64,
}

impl Default for CouplingScanParams {
    fn default() -> Self {
        Self {
            span_hz: 200.0e6,
            bandwidth_hz: 1.0e6,
            power_dbm: 10.0,
            step_rad: TAU / 100.0,
            range_rad: TAU,
            good_depth_db: -25.0,
        }
    }
}

/// Walk the rotary axis across `range_rad`, sampling the response depth at
/// the target frequency, to land on a usable antenna coupling before the
/// optimizer starts.
///
/// Stops as soon as a sample crosses `good_depth_db` and leaves the motor
/// there; if nothing crosses, the motor ends up at the far end of the range
/// and the optimizer starts from whatever the deepest neighbourhood was.
pub fn scan_coupling(
    bench: &mut Bench,
    target_hz: f64,
    params: &CouplingScanParams,
) -> Result<(), TuneError> {
    let step_steps = steps_from_radians(params.step_rad);
    let samples = (params.range_rad / params.step_rad).floor() as usize + 1;
    log::info!(
        "scanning coupling: {} samples of {} steps from position {}",
        samples,
        step_steps,
        bench.rotary.position()?
    );

    set_window(
        bench.vna,
        target_hz,
        params.span_hz,
        params.bandwidth_hz,
        params.power_dbm,
    )?;

    for i in 0..samples {
        let trace = bench.vna.acquire()?;
        let depth_linear = trace.amplitude()[trace.nearest_index(target_hz)];
        let depth_db = 10.0 * depth_linear.log10();
        log::debug!(
            "coupling scan sample {}: {:.1} dB at {} steps",
            i,
            depth_db,
            bench.rotary.position()?
        );

        if depth_db < params.good_depth_db {
            log::info!(
                "coupling scan: {:.1} dB at {} steps, stopping early",
                depth_db,
                bench.rotary.position()?
            );
            return Ok(());
        }

        bench.rotary.move_relative(step_steps)?;
        bench.rotary.wait_until_idle()?;
    }

    log::warn!(
        "coupling scan finished without reaching {} dB",
        params.good_depth_db
    );
    Ok(())
}

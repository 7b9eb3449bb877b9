use std::time::Duration;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::scpi::ScpiTransport;
use super::VnaControl;
use crate::trace::frequency_axis;
use crate::{Trace, TuneError};

/// Hard instrument limit on sweep points.
pub const MAX_POINTS: u32 = 100_000;

/// Hard instrument limit on source power.
pub const MAX_POWER_DBM: f64 = 10.0;

/// Minimum points-per-bandwidth ratio: a sweep window is always sampled with
/// `points >= 5 * span / bandwidth` so no resonance falls between samples.
pub const POINTS_PER_BANDWIDTH: f64 = 5.0;

/// Settle time after a frequency-window change before the instrument is
/// trusted again for readback or a sweep.
pub const SETTLE: Duration = Duration::from_millis(300);

/// Out-of-band parking window: far below the cavity band, minimal span, the
/// source quiet, so the instrument does not drive the cavity between
/// measurements.
pub const PARK_SETTINGS: VnaSettings = VnaSettings {
    center_hz: 150.0e6,
    span_hz: 1.0e6,
    bandwidth_hz: 1.0e3,
    points: 11,
    power_dbm: -40.0,
};

/// A captured sweep window, sufficient to put the instrument back exactly
/// where it was.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VnaSettings {
    pub center_hz: f64,
    pub span_hz: f64,
    pub bandwidth_hz: f64,
    pub points: u32,
    pub power_dbm: f64,
}

/// Configure a measurement window in one call: span, center, IF bandwidth,
/// a compliant number of points, and source power.
pub fn set_window(
    vna: &mut dyn VnaControl,
    center_hz: f64,
    span_hz: f64,
    bandwidth_hz: f64,
    power_dbm: f64,
) -> Result<(), TuneError> {
    vna.set_span_hz(span_hz)?;
    vna.set_center_hz(center_hz)?;
    vna.set_bandwidth_hz(bandwidth_hz)?;
    vna.set_points(points_for(span_hz, bandwidth_hz))?;
    vna.set_power_dbm(power_dbm)?;
    Ok(())
}

/// Points required to sample `span_hz` at `bandwidth_hz`, honouring the
/// points-per-bandwidth floor and the instrument maximum.
pub fn points_for(span_hz: f64, bandwidth_hz: f64) -> u32 {
    let points = (POINTS_PER_BANDWIDTH * span_hz / bandwidth_hz).ceil() as u32;
    points.clamp(2, MAX_POINTS)
}

/// Move the instrument to the out-of-band parking window, returning the
/// settings it had so they can be restored with [`unpark`].
pub fn park(vna: &mut dyn VnaControl) -> Result<VnaSettings, TuneError> {
    let saved = vna.settings()?;
    vna.apply_settings(&PARK_SETTINGS)?;
    log::debug!("VNA parked out of band, saved {:?}", saved);
    Ok(saved)
}

/// Restore settings captured by [`park`]. Idempotent.
pub fn unpark(vna: &mut dyn VnaControl, saved: &VnaSettings) -> Result<(), TuneError> {
    vna.apply_settings(saved)?;
    log::debug!("VNA restored to {:?}", saved);
    Ok(())
}

/// Façade for an R&S ZNB-class vector network analyzer over SCPI.
pub struct Vna<T> {
    transport: T,
}

impl<T: ScpiTransport> Vna<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn identify(&mut self) -> Result<String, TuneError> {
        self.transport.query("*IDN?")
    }

    /// Reset to defaults and lock to the external reference.
    pub fn reset(&mut self) -> Result<(), TuneError> {
        self.transport.write("*RST")?;
        self.set_reference_external(true)
    }

    pub fn set_reference_external(&mut self, external: bool) -> Result<(), TuneError> {
        self.transport
            .write(if external { "rosc EXT" } else { "rosc INT" })
    }

    pub fn set_output(&mut self, on: bool) -> Result<(), TuneError> {
        self.transport.write(if on { "output ON" } else { "output OFF" })
    }

    pub fn set_averages(&mut self, count: u32) -> Result<(), TuneError> {
        self.transport.write(&format!("average:count {}", count))?;
        self.transport
            .write(&format!("sens:sweep:count {}", count))
    }

    pub fn set_averaging(&mut self, on: bool) -> Result<(), TuneError> {
        if !on {
            self.transport.write("sens:sweep:count 1")?;
        }
        self.transport
            .write(if on { "average ON" } else { "average OFF" })
    }

    pub fn clear_averages(&mut self) -> Result<(), TuneError> {
        self.transport.write("average:clear")
    }

    /// Fundamental (normal) or arbitrary frequency-conversion mode.
    pub fn set_conversion_arbitrary(&mut self, arbitrary: bool) -> Result<(), TuneError> {
        self.transport.write(if arbitrary {
            "sense:freq:conv ARB"
        } else {
            "sense:freq:conv FUND"
        })
    }

    /// Center the sweep on the trace minimum using a marker.
    pub fn center_to_min(&mut self) -> Result<(), TuneError> {
        self.center_to_marker("min")
    }

    /// Center the sweep on the trace maximum using a marker.
    pub fn center_to_max(&mut self) -> Result<(), TuneError> {
        self.center_to_marker("max")
    }

    fn center_to_marker(&mut self, which: &str) -> Result<(), TuneError> {
        self.transport.write("calc:mark ON")?;
        self.transport
            .write(&format!("calc:mark:func:exec {}", which))?;
        self.transport.write("calc:mark:func:center")?;
        self.transport.write("calc:mark OFF")?;
        std::thread::sleep(SETTLE);
        Ok(())
    }

    /// Drain and return the instrument error queue.
    pub fn clear_errors(&mut self) -> Result<String, TuneError> {
        self.transport.query("syst:err:all?")
    }

    fn query_f64(&mut self, command: &str) -> Result<f64, TuneError> {
        let reply = self.transport.query(command)?;
        reply.trim().parse().map_err(|_| {
            TuneError::Instrument(format!("{}: unparsable reply {:?}", command, reply))
        })
    }

    fn query_u32(&mut self, command: &str) -> Result<u32, TuneError> {
        let reply = self.transport.query(command)?;
        // Some firmware reports integers in exponent notation.
        let value: f64 = reply.trim().parse().map_err(|_| {
            TuneError::Instrument(format!("{}: unparsable reply {:?}", command, reply))
        })?;
        Ok(value.round() as u32)
    }
}

impl<T: ScpiTransport> VnaControl for Vna<T> {
    fn settings(&mut self) -> Result<VnaSettings, TuneError> {
        Ok(VnaSettings {
            center_hz: self.query_f64("frequency:center?")?,
            span_hz: self.query_f64("frequency:span?")?,
            bandwidth_hz: self.query_f64("sens:band?")?,
            points: self.query_u32("sens:sweep:points?")?,
            power_dbm: self.query_f64("source:power?")?,
        })
    }

    fn apply_settings(&mut self, settings: &VnaSettings) -> Result<(), TuneError> {
        self.set_span_hz(settings.span_hz)?;
        self.set_center_hz(settings.center_hz)?;
        self.set_bandwidth_hz(settings.bandwidth_hz)?;
        self.set_points(settings.points)?;
        self.set_power_dbm(settings.power_dbm)
    }

    fn set_center_hz(&mut self, center_hz: f64) -> Result<(), TuneError> {
        self.transport
            .write(&format!("frequency:center {}", center_hz))?;
        std::thread::sleep(SETTLE);
        Ok(())
    }

    fn set_span_hz(&mut self, span_hz: f64) -> Result<(), TuneError> {
        self.transport
            .write(&format!("frequency:span {}", span_hz))?;
        std::thread::sleep(SETTLE);
        Ok(())
    }

    fn span_hz(&mut self) -> Result<f64, TuneError> {
        self.query_f64("frequency:span?")
    }

    fn set_start_stop_hz(&mut self, start_hz: f64, stop_hz: f64) -> Result<(), TuneError> {
        self.transport
            .write(&format!("frequency:start {}", start_hz))?;
        self.transport
            .write(&format!("frequency:stop {}", stop_hz))?;
        std::thread::sleep(SETTLE);
        Ok(())
    }

    fn set_bandwidth_hz(&mut self, bandwidth_hz: f64) -> Result<(), TuneError> {
        self.transport.write(&format!("sens:band {}", bandwidth_hz))
    }

    fn set_points(&mut self, points: u32) -> Result<(), TuneError> {
        let points = points.min(MAX_POINTS);
        self.transport
            .write(&format!("sens:sweep:points {}", points))
    }

    fn set_power_dbm(&mut self, power_dbm: f64) -> Result<(), TuneError> {
        let power = if power_dbm > MAX_POWER_DBM {
            log::warn!(
                "requested power {} dBm exceeds the {} dBm limit, clamping",
                power_dbm,
                MAX_POWER_DBM
            );
            MAX_POWER_DBM
        } else {
            power_dbm
        };
        self.transport.write(&format!("source:power {}", power))
    }

    fn acquire(&mut self) -> Result<Trace, TuneError> {
        // Single triggered sweep; the data query blocks until it completes.
        self.transport.write("initiate:cont OFF")?;
        self.transport.write("init:imm")?;
        self.transport.write("*OPC")?;
        let data = self.transport.query("calculate:Data? Sdata")?;
        self.transport.write("init:cont ON")?;

        let values: Vec<f64> = data
            .split(',')
            .map(|v| v.trim().parse())
            .collect::<Result<_, _>>()
            .map_err(|e| TuneError::Instrument(format!("malformed trace data: {}", e)))?;
        if values.len() % 2 != 0 || values.is_empty() {
            return Err(TuneError::Instrument(format!(
                "trace data has {} values, expected an even count",
                values.len()
            )));
        }
        let samples: Vec<Complex64> = values
            .chunks_exact(2)
            .map(|pair| Complex64::new(pair[0], pair[1]))
            .collect();

        let start = self.query_f64("frequency:start?")?;
        let stop = self.query_f64("frequency:stop?")?;
        let points = self.query_u32("sens:sweep:points?")? as usize;
        if points != samples.len() {
            return Err(TuneError::Instrument(format!(
                "trace has {} samples but the instrument reports {} points",
                samples.len(),
                points
            )));
        }

        Ok(Trace::new(frequency_axis(start, stop, points), samples))
    }

    fn autoscale(&mut self) -> Result<(), TuneError> {
        // Scale every diagram; the catalog reply alternates numbers and names.
        let catalog = self.transport.query("disp:cat?")?;
        let catalog = catalog.trim_matches('\'');
        for diagram in catalog.split(',').step_by(2) {
            self.transport
                .write(&format!("disp:wind{}:trac:y:auto once", diagram.trim()))?;
        }
        // Autoscaling halts the continuous sweep; restart it.
        self.transport.write("initiate:cont ON")
    }

    fn electrical_delay_auto(&mut self) -> Result<(), TuneError> {
        self.transport.write("corr:edelay:auto once")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct ScriptedTransport {
        written: Vec<String>,
        replies: VecDeque<(&'static str, String)>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<(&'static str, String)>) -> Self {
            Self {
                written: Vec::new(),
                replies: replies.into(),
            }
        }
    }

    impl ScpiTransport for ScriptedTransport {
        fn write(&mut self, command: &str) -> Result<(), TuneError> {
            self.written.push(command.to_string());
            Ok(())
        }

        fn query(&mut self, command: &str) -> Result<String, TuneError> {
            self.written.push(command.to_string());
            let (expected, reply) = self
                .replies
                .pop_front()
                .unwrap_or_else(|| panic!("unexpected query {:?}", command));
            assert_eq!(command, expected);
            Ok(reply)
        }
    }

    #[test]
    fn points_for_honours_the_ppb_floor_and_cap() {
        assert_eq!(points_for(200.0e6, 1.0e6), 1000);
        assert_eq!(points_for(0.1e6, 1.0e5), 5);
        assert_eq!(points_for(20.0e9, 1.0e3), MAX_POINTS);
    }

    #[test]
    fn acquire_parses_interleaved_complex_trace() {
        let transport = ScriptedTransport::new(vec![
            ("calculate:Data? Sdata", "1.0,0.0,0.5,-0.5,0.0,1.0".to_string()),
            ("frequency:start?", "5.0e9".to_string()),
            ("frequency:stop?", "5.2e9".to_string()),
            ("sens:sweep:points?", "3".to_string()),
        ]);
        let mut vna = Vna::new(transport);
        let trace = vna.acquire().unwrap();
        assert_eq!(trace.len(), 3);
        assert_eq!(trace.samples[1], Complex64::new(0.5, -0.5));
        assert_eq!(trace.frequencies_hz, vec![5.0e9, 5.1e9, 5.2e9]);
        assert!(vna
            .transport
            .written
            .iter()
            .any(|c| c == "initiate:cont OFF"));
    }

    #[test]
    fn acquire_rejects_odd_value_count() {
        let transport = ScriptedTransport::new(vec![(
            "calculate:Data? Sdata",
            "1.0,0.0,0.5".to_string(),
        )]);
        let mut vna = Vna::new(transport);
        assert!(matches!(vna.acquire(), Err(TuneError::Instrument(_))));
    }

    #[test]
    fn power_is_clamped_to_instrument_limit() {
        let mut vna = Vna::new(ScriptedTransport::new(vec![]));
        vna.set_power_dbm(17.0).unwrap();
        assert_eq!(vna.transport.written, vec!["source:power 10"]);
    }

    #[test]
    fn autoscale_touches_every_diagram() {
        let transport = ScriptedTransport::new(vec![(
            "disp:cat?",
            "'1,Trc1,2,Trc2'".to_string(),
        )]);
        let mut vna = Vna::new(transport);
        vna.autoscale().unwrap();
        assert!(vna
            .transport
            .written
            .contains(&"disp:wind1:trac:y:auto once".to_string()));
        assert!(vna
            .transport
            .written
            .contains(&"disp:wind2:trac:y:auto once".to_string()));
    }
}

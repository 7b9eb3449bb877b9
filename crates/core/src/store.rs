use std::fs;
use std::path::{Path, PathBuf};

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::{Trace, TuneError};

/// On-disk record of one stitched phase-gradient sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepRecord {
    pub created_at: String,
    pub frequencies_hz: Vec<f64>,
    pub phase_rad: Vec<f64>,
    pub phase_unwrapped_rad: Vec<f64>,
    pub phase_gradient: Vec<f64>,
}

/// On-disk record of the peaks found in a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakRecord {
    pub created_at: String,
    pub thresholds: Vec<f64>,
    pub peak_indexes: Vec<usize>,
    pub peak_frequencies_hz: Vec<f64>,
    pub peak_gradients: Vec<f64>,
}

/// Filesystem layout for a session's diagnostic artifacts.
///
/// Raw traces land under `Raw_data/vna_traces/vna_trace_<i>/vna_trace.dat`
/// (one line per sample: `frequency_hz,re,im`); the sweep and peak records
/// are JSON documents at the store root. Everything written here can be read
/// back.
pub struct SessionStore {
    root: PathBuf,
    trace_index: usize,
}

const SWEEP_RECORD_FILE: &str = "sweep_record.json";
const PEAK_RECORD_FILE: &str = "peak_record.json";

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, TuneError> {
        let root = root.into();
        fs::create_dir_all(root.join("Raw_data").join("vna_traces"))?;
        Ok(Self {
            root,
            trace_index: 0,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Append a raw trace, returning the path it was written to.
    pub fn save_raw_trace(&mut self, trace: &Trace) -> Result<PathBuf, TuneError> {
        let dir = self
            .root
            .join("Raw_data")
            .join("vna_traces")
            .join(format!("vna_trace_{}", self.trace_index));
        fs::create_dir_all(&dir)?;
        let path = dir.join("vna_trace.dat");

        let mut contents = String::with_capacity(trace.len() * 48);
        for (f, s) in trace.frequencies_hz.iter().zip(&trace.samples) {
            contents.push_str(&format!("{:.6},{:e},{:e}\n", f, s.re, s.im));
        }
        fs::write(&path, contents)?;

        self.trace_index += 1;
        Ok(path)
    }

    /// Read back a trace written by [`save_raw_trace`](Self::save_raw_trace).
    pub fn load_raw_trace(path: &Path) -> Result<Trace, TuneError> {
        let contents = fs::read_to_string(path)?;
        let mut frequencies = Vec::new();
        let mut samples = Vec::new();
        for (number, line) in contents.lines().enumerate() {
            let mut fields = line.split(',');
            let parse = |field: Option<&str>| -> Result<f64, TuneError> {
                field
                    .and_then(|v| v.trim().parse().ok())
                    .ok_or_else(|| {
                        TuneError::Storage(std::io::Error::new(
                            std::io::ErrorKind::InvalidData,
                            format!("{}: bad trace line {}", path.display(), number + 1),
                        ))
                    })
            };
            frequencies.push(parse(fields.next())?);
            let re = parse(fields.next())?;
            let im = parse(fields.next())?;
            samples.push(Complex64::new(re, im));
        }
        Ok(Trace::new(frequencies, samples))
    }

    pub fn save_sweep_record(&self, record: &SweepRecord) -> Result<(), TuneError> {
        self.save_json(SWEEP_RECORD_FILE, record)
    }

    pub fn load_sweep_record(&self) -> Result<SweepRecord, TuneError> {
        self.load_json(SWEEP_RECORD_FILE)
    }

    pub fn save_peak_record(&self, record: &PeakRecord) -> Result<(), TuneError> {
        self.save_json(PEAK_RECORD_FILE, record)
    }

    pub fn load_peak_record(&self) -> Result<PeakRecord, TuneError> {
        self.load_json(PEAK_RECORD_FILE)
    }

    fn save_json<T: Serialize>(&self, file: &str, value: &T) -> Result<(), TuneError> {
        let contents = serde_json::to_string_pretty(value).map_err(|e| {
            TuneError::Storage(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        fs::write(self.root.join(file), contents)?;
        Ok(())
    }

    fn load_json<T: for<'de> Deserialize<'de>>(&self, file: &str) -> Result<T, TuneError> {
        let contents = fs::read_to_string(self.root.join(file))?;
        serde_json::from_str(&contents).map_err(|e| {
            TuneError::Storage(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })
    }
}

/// Timestamp for record files.
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn raw_traces_round_trip_and_number_sequentially() {
        let dir = TempDir::new().unwrap();
        let mut store = SessionStore::new(dir.path()).unwrap();

        let trace = Trace::new(
            vec![5.0e9, 5.1e9, 5.2e9],
            vec![
                Complex64::new(1.0, 0.0),
                Complex64::new(0.25, -0.75),
                Complex64::new(-1e-6, 3.5e-4),
            ],
        );
        let first = store.save_raw_trace(&trace).unwrap();
        let second = store.save_raw_trace(&trace).unwrap();

        assert!(first.ends_with("Raw_data/vna_traces/vna_trace_0/vna_trace.dat"));
        assert!(second.ends_with("Raw_data/vna_traces/vna_trace_1/vna_trace.dat"));

        let loaded = SessionStore::load_raw_trace(&first).unwrap();
        assert_eq!(loaded.frequencies_hz, trace.frequencies_hz);
        for (a, b) in loaded.samples.iter().zip(&trace.samples) {
            assert!((a - b).norm() < 1e-12);
        }
    }

    #[test]
    fn records_round_trip_as_json() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();

        let sweep = SweepRecord {
            created_at: timestamp(),
            frequencies_hz: vec![1.0, 2.0],
            phase_rad: vec![0.1, 0.2],
            phase_unwrapped_rad: vec![0.1, 0.2],
            phase_gradient: vec![0.0, 0.1],
        };
        store.save_sweep_record(&sweep).unwrap();
        assert_eq!(store.load_sweep_record().unwrap(), sweep);

        let peaks = PeakRecord {
            created_at: timestamp(),
            thresholds: vec![0.5, 0.5],
            peak_indexes: vec![1],
            peak_frequencies_hz: vec![2.0],
            peak_gradients: vec![0.1],
        };
        store.save_peak_record(&peaks).unwrap();
        assert_eq!(store.load_peak_record().unwrap(), peaks);
    }

    #[test]
    fn missing_record_is_a_storage_error() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        assert!(matches!(
            store.load_sweep_record(),
            Err(TuneError::Storage(_))
        ));
    }
}

use std::path::Path;

use crate::TuneError;

/// Frequency window, in GHz, within which a table row matches the target.
pub const MATCH_WINDOW_GHZ: f64 = 0.01;

/// Minimum spacing between returned candidate positions. Rows closer than
/// this belong to the same physical mode and are redundant.
pub const MIN_MODE_SPACING_MM: f64 = 1.8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LookupEntry {
    pub frequency_ghz: f64,
    pub length_mm: f64,
}

/// Precomputed map from resonance frequency to linear-stage position, loaded
/// once per session from a two-column CSV (`frequency_ghz,length_mm`, no
/// header).
#[derive(Debug, Clone)]
pub struct ModeLookup {
    entries: Vec<LookupEntry>,
}

impl ModeLookup {
    /// Load the table from disk. A missing or unreadable file is fatal.
    pub fn load(path: &Path) -> Result<Self, TuneError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| TuneError::LookupTable(format!("{}: {}", path.display(), e)))?;

        let mut entries = Vec::new();
        for (number, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split(',');
            let parse = |field: Option<&str>| {
                field.and_then(|v| v.trim().parse::<f64>().ok()).ok_or_else(|| {
                    TuneError::LookupTable(format!(
                        "{}: bad row at line {}: {:?}",
                        path.display(),
                        number + 1,
                        line
                    ))
                })
            };
            entries.push(LookupEntry {
                frequency_ghz: parse(fields.next())?,
                length_mm: parse(fields.next())?,
            });
        }
        log::info!(
            "loaded {} lookup entries from {}",
            entries.len(),
            path.display()
        );
        Ok(Self { entries })
    }

    pub fn from_entries(entries: Vec<LookupEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Candidate stage positions for a target frequency in Hz, ascending,
    /// deduplicated so successive candidates are at least
    /// [`MIN_MODE_SPACING_MM`] apart.
    ///
    /// An empty result means the target sits in a region the table does not
    /// cover; a warning is emitted and the caller is expected to tune from
    /// the current position.
    pub fn positions_for_hz(&self, target_hz: f64) -> Vec<f64> {
        let target_ghz = target_hz / 1e9;
        let mut positions: Vec<f64> = self
            .entries
            .iter()
            .filter(|e| (e.frequency_ghz - target_ghz).abs() < MATCH_WINDOW_GHZ)
            .map(|e| e.length_mm)
            .collect();

        if positions.is_empty() {
            log::warn!(
                "no table entry within {} MHz of {:.4} GHz: the filter cavity is being \
                 set to an undesirable frequency",
                MATCH_WINDOW_GHZ * 1e3,
                target_ghz
            );
            return positions;
        }

        positions.sort_by(f64::total_cmp);
        let mut deduplicated = vec![positions[0]];
        for &p in &positions[1..] {
            if p >= deduplicated.last().unwrap() + MIN_MODE_SPACING_MM {
                deduplicated.push(p);
            }
        }
        deduplicated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[(f64, f64)]) -> ModeLookup {
        ModeLookup::from_entries(
            rows.iter()
                .map(|&(frequency_ghz, length_mm)| LookupEntry {
                    frequency_ghz,
                    length_mm,
                })
                .collect(),
        )
    }

    #[test]
    fn matches_within_ten_megahertz() {
        let lookup = table(&[(5.199, 12.345), (5.35, 20.0)]);
        assert_eq!(lookup.positions_for_hz(5.200e9), vec![12.345]);
    }

    #[test]
    fn misses_return_empty() {
        let lookup = table(&[(5.18, 10.0), (5.25, 14.0)]);
        assert!(lookup.positions_for_hz(5.2051e9).is_empty());
    }

    #[test]
    fn deduplicates_positions_closer_than_mode_spacing() {
        let lookup = table(&[
            (5.200, 10.0),
            (5.201, 10.9),
            (5.199, 12.0),
            (5.202, 13.7),
            (5.200, 16.0),
        ]);
        let positions = lookup.positions_for_hz(5.200e9);
        assert_eq!(positions, vec![10.0, 12.0, 16.0]);
        for pair in positions.windows(2) {
            assert!(pair[1] - pair[0] >= MIN_MODE_SPACING_MM);
        }
    }

    #[test]
    fn missing_file_is_fatal() {
        let err = ModeLookup::load(Path::new("/nonexistent/lookuptable.csv")).unwrap_err();
        assert!(matches!(err, TuneError::LookupTable(_)));
    }

    #[test]
    fn loads_csv_rows() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("lookuptable.csv");
        std::fs::write(&path, "5.199,12.345\n5.35,20.0\n\n6.1,31.5\n").unwrap();
        let lookup = ModeLookup::load(&path).unwrap();
        assert_eq!(lookup.len(), 3);
        assert_eq!(lookup.positions_for_hz(5.2e9), vec![12.345]);
    }
}

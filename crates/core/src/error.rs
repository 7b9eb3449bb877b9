use thiserror::Error;

use crate::tuner::IterationRecord;

/// Errors raised while tuning the cavity.
///
/// Reaching the iteration cap without meeting the depth tolerance is *not* an
/// error — the session returns its best-so-far result with
/// [`crate::Termination::IterationCap`]. Likewise the mid-iteration success
/// signal is a [`crate::Verdict`], never an `Err`.
#[derive(Debug, Error)]
pub enum TuneError {
    /// Transport failure, timeout or malformed reply from an instrument.
    #[error("instrument I/O: {0}")]
    Instrument(String),

    /// A reply referenced the wrong device, axis or message ID, or carried a
    /// bad checksum.
    #[error("protocol mismatch: {0}")]
    Protocol(String),

    /// The mode lookup table could not be loaded.
    #[error("lookup table: {0}")]
    LookupTable(String),

    /// A requested parameter lies outside instrument bounds.
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// Failure while persisting session artifacts.
    #[error("storage: {0}")]
    Storage(#[from] std::io::Error),
}

impl From<cavtune_zaber::ZaberError> for TuneError {
    fn from(err: cavtune_zaber::ZaberError) -> Self {
        use cavtune_zaber::ZaberError;
        match err {
            ZaberError::ChecksumMismatch { .. } | ZaberError::UnexpectedReply { .. } => {
                TuneError::Protocol(err.to_string())
            }
            ZaberError::InvalidParameter(msg) => TuneError::OutOfRange(msg),
            other => TuneError::Instrument(other.to_string()),
        }
    }
}

/// A tuning session that failed part-way through.
///
/// The error has already propagated through the guaranteed unpark and
/// re-center step; the iteration log collected up to the failure rides along
/// so the caller can see how far the optimizer got.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct SessionFailure {
    pub error: TuneError,
    pub log: Vec<IterationRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use cavtune_zaber::ZaberError;

    #[test]
    fn zaber_errors_map_onto_the_taxonomy() {
        let protocol: TuneError = ZaberError::UnexpectedReply { device: 2, axis: 1 }.into();
        assert!(matches!(protocol, TuneError::Protocol(_)));

        let io: TuneError = ZaberError::Timeout.into();
        assert!(matches!(io, TuneError::Instrument(_)));
    }
}

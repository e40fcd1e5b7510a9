use crate::beam::RawBeamRecord;

/// Common error type for the decoding and transmission pipeline.
#[derive(thiserror::Error, Debug)]
pub enum GateError {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("calibration: {0}")]
    Calibration(String),
    #[error("framing: {0}")]
    Framing(String),
    #[error("fatal: {0}")]
    Fatal(String),
}

pub type GateResult<T> = Result<T, GateError>;

/// Supplies raw physical records, one per call.
///
/// `Ok(None)` is a clean end of stream (logical end of tape, end of file).
pub trait RecordSource {
    fn read_record(&mut self) -> GateResult<Option<Vec<u8>>>;

    /// Tape file holding the most recently returned record.
    fn file_number(&self) -> usize {
        0
    }
}

/// One decoder per radar format, selected once from configuration.
///
/// Framing problems are handled inside the decoder by resynchronizing;
/// `next_beam` only returns `Ok(None)` once the source is exhausted.
pub trait BeamDecoder {
    fn next_beam(&mut self, source: &mut dyn RecordSource) -> GateResult<Option<RawBeamRecord>>;

    /// Short format name used in log lines.
    fn name(&self) -> &'static str;

    /// Records (or byte positions) skipped while resynchronizing.
    fn resyncs(&self) -> u64 {
        0
    }
}

/// Destination for framed packets.
///
/// Returns `Ok(true)` if the frame was written, `Ok(false)` if it was dropped
/// because nobody is listening.
pub trait PacketSink {
    fn send(&mut self, frame: &[u8]) -> GateResult<bool>;
}

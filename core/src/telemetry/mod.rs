pub mod log;
pub mod metrics;

pub use log::BeamPrinter;
pub use metrics::{PacketKind, StatsRecorder, StreamStats};

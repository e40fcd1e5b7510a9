//! Radar tape beam decoding and gate-data packet assembly.
//!
//! Records from a tape, disk image or memory source are decoded by one of
//! five format decoders, filtered, normalized into fixed-layout beams and
//! streamed over TCP by the [`driver::StreamDriver`].

pub mod beam;
pub mod calibration;
pub mod config;
pub mod driver;
pub mod formats;
pub mod prelude;
pub mod processing;
pub mod source;
pub mod telemetry;
pub mod transmit;

pub use config::GateConfig;
pub use driver::{DriverState, StreamDriver};
pub use prelude::{BeamDecoder, GateError, GateResult, PacketSink, RecordSource};

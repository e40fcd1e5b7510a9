pub mod server;
pub mod wire;

pub use server::TcpTransmitter;
pub use wire::{FrameEncoder, GATE_DATA_PACKET, GATE_PARAMS_PACKET};

use crate::prelude::{GateResult, PacketSink};

/// Keeps every frame in memory; `connected = false` drops them instead.
#[derive(Debug)]
pub struct RecordingSink {
    pub frames: Vec<Vec<u8>>,
    pub connected: bool,
    pub dropped: usize,
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self {
            frames: Vec::new(),
            connected: true,
            dropped: 0,
        }
    }
}

impl RecordingSink {
    /// Packet type of each recorded frame, in send order.
    pub fn packet_types(&self) -> Vec<u32> {
        self.frames
            .iter()
            .filter_map(|frame| wire::decode_frame(frame).ok())
            .map(|(header, _)| header.packet_type)
            .collect()
    }
}

impl PacketSink for RecordingSink {
    fn send(&mut self, frame: &[u8]) -> GateResult<bool> {
        if !self.connected {
            self.dropped += 1;
            return Ok(false);
        }
        self.frames.push(frame.to_vec());
        Ok(true)
    }
}

//! Frame layout of the gate-data feed.
//!
//! Every frame starts with four big-endian 32-bit words: magic, packet type,
//! payload length in bytes and a sequence number shared by both packet
//! types. All payload integers are big-endian; gate samples are raw bytes.

use crate::beam::{CanonicalBeam, ScanMode};
use crate::prelude::{GateError, GateResult};
use crate::processing::params::{FieldParams, ParameterBlock};

pub const GATE_MAGIC: u32 = 0x4741_5445;
pub const GATE_PARAMS_PACKET: u32 = 0;
pub const GATE_DATA_PACKET: u32 = 1;
pub const FRAME_HEADER_LEN: usize = 16;
/// 32-bit words in a gate-data header, counting the 64-bit time as two.
pub const BEAM_HEADER_WORDS: usize = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub magic: u32,
    pub packet_type: u32,
    pub length: u32,
    pub seq: u32,
}

/// Stamps frames with a wrapping sequence number.
#[derive(Debug, Default)]
pub struct FrameEncoder {
    seq: u32,
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame(&mut self, packet_type: u32, payload: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
        for word in [GATE_MAGIC, packet_type, payload.len() as u32, self.seq] {
            frame.extend_from_slice(&word.to_be_bytes());
        }
        frame.extend_from_slice(payload);
        self.seq = self.seq.wrapping_add(1);
        frame
    }

    pub fn params_frame(&mut self, block: &ParameterBlock) -> Vec<u8> {
        self.frame(GATE_PARAMS_PACKET, &encode_params(block))
    }

    pub fn beam_frame(&mut self, beam: &CanonicalBeam) -> Vec<u8> {
        self.frame(GATE_DATA_PACKET, &encode_beam(beam))
    }
}

fn push(payload: &mut Vec<u8>, value: i32) {
    payload.extend_from_slice(&value.to_be_bytes());
}

pub fn encode_params(block: &ParameterBlock) -> Vec<u8> {
    let mut payload = Vec::with_capacity((ParameterBlock::SCALAR_WORDS + block.fields.len() * 3) * 4);
    for value in [
        block.radar_id,
        block.altitude,
        block.latitude,
        block.longitude,
        block.ngates_out,
        block.beam_width,
        block.nfields_out,
        block.gate_spacing,
        block.start_range,
        block.samples_per_beam,
        block.pulse_width,
        block.prf,
        block.wavelength,
        block.scan_mode,
        block.scan_type,
        block.field_flag,
        block.nfields_current,
        block.factor,
    ] {
        push(&mut payload, value);
    }
    for field in &block.fields {
        push(&mut payload, field.scale);
        push(&mut payload, field.bias);
        push(&mut payload, field.factor);
    }
    payload
}

pub fn encode_beam(beam: &CanonicalBeam) -> Vec<u8> {
    let gates = beam.packed_gates();
    let mut payload = Vec::with_capacity(BEAM_HEADER_WORDS * 4 + gates.len());
    payload.extend_from_slice(&beam.time.to_be_bytes());
    for value in [
        beam.azimuth,
        beam.elevation,
        beam.target_elevation,
        beam.volume_num,
        beam.tilt_num,
        beam.scan_mode.wire_code(),
        beam.end_of_tilt as i32,
        beam.end_of_volume as i32,
        beam.new_scan_limits as i32,
        beam.field_flag as i32,
        beam.nfields_current() as i32,
        beam.ngates() as i32,
    ] {
        push(&mut payload, value);
    }
    payload.extend_from_slice(&gates);
    payload
}

/// Splits a frame into its header and payload.
pub fn decode_frame(frame: &[u8]) -> GateResult<(FrameHeader, &[u8])> {
    let word = |index: usize| -> GateResult<u32> {
        frame
            .get(index * 4..index * 4 + 4)
            .and_then(|raw| raw.try_into().ok())
            .map(u32::from_be_bytes)
            .ok_or_else(|| GateError::Framing("frame header truncated".into()))
    };
    let header = FrameHeader {
        magic: word(0)?,
        packet_type: word(1)?,
        length: word(2)?,
        seq: word(3)?,
    };
    if header.magic != GATE_MAGIC {
        return Err(GateError::Framing(format!("bad magic {:#010x}", header.magic)));
    }
    let payload = frame
        .get(FRAME_HEADER_LEN..FRAME_HEADER_LEN + header.length as usize)
        .ok_or_else(|| GateError::Framing("frame payload truncated".into()))?;
    Ok((header, payload))
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn i32(&mut self) -> GateResult<i32> {
        let raw = self
            .bytes
            .get(self.offset..self.offset + 4)
            .and_then(|raw| raw.try_into().ok())
            .ok_or_else(|| GateError::Framing("payload truncated".into()))?;
        self.offset += 4;
        Ok(i32::from_be_bytes(raw))
    }

    fn i64(&mut self) -> GateResult<i64> {
        let high = self.i32()? as u32 as u64;
        let low = self.i32()? as u32 as u64;
        Ok(((high << 32) | low) as i64)
    }

    fn rest(&self) -> &'a [u8] {
        &self.bytes[self.offset.min(self.bytes.len())..]
    }
}

pub fn decode_params(payload: &[u8]) -> GateResult<ParameterBlock> {
    let mut reader = Reader { bytes: payload, offset: 0 };
    let mut scalars = [0i32; ParameterBlock::SCALAR_WORDS];
    for value in scalars.iter_mut() {
        *value = reader.i32()?;
    }
    let nfields = scalars[6].max(0) as usize;
    let mut fields = Vec::with_capacity(nfields);
    for _ in 0..nfields {
        fields.push(FieldParams {
            scale: reader.i32()?,
            bias: reader.i32()?,
            factor: reader.i32()?,
        });
    }
    let [radar_id, altitude, latitude, longitude, ngates_out, beam_width, nfields_out, gate_spacing, start_range, samples_per_beam, pulse_width, prf, wavelength, scan_mode, scan_type, field_flag, nfields_current, factor] =
        scalars;
    Ok(ParameterBlock {
        radar_id,
        altitude,
        latitude,
        longitude,
        ngates_out,
        beam_width,
        nfields_out,
        gate_spacing,
        start_range,
        samples_per_beam,
        pulse_width,
        prf,
        wavelength,
        scan_mode,
        scan_type,
        field_flag,
        nfields_current,
        factor,
        fields,
    })
}

/// A gate-data packet as seen by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeamPacket {
    pub time: i64,
    pub azimuth: i32,
    pub elevation: i32,
    pub target_elevation: i32,
    pub volume_num: i32,
    pub tilt_num: i32,
    pub scan_mode: ScanMode,
    pub end_of_tilt: bool,
    pub end_of_volume: bool,
    pub new_scan_limits: bool,
    pub field_flag: u32,
    pub nfields_current: usize,
    pub ngates: usize,
    pub gates: Vec<u8>,
}

pub fn decode_beam(payload: &[u8]) -> GateResult<BeamPacket> {
    let mut reader = Reader { bytes: payload, offset: 0 };
    let time = reader.i64()?;
    let mut words = [0i32; BEAM_HEADER_WORDS - 2];
    for value in words.iter_mut() {
        *value = reader.i32()?;
    }
    let nfields_current = words[10].max(0) as usize;
    let ngates = words[11].max(0) as usize;
    let gates = reader.rest();
    if gates.len() != nfields_current * ngates {
        return Err(GateError::Framing(format!(
            "{} gate bytes for {} fields of {} gates",
            gates.len(),
            nfields_current,
            ngates
        )));
    }
    Ok(BeamPacket {
        time,
        azimuth: words[0],
        elevation: words[1],
        target_elevation: words[2],
        volume_num: words[3],
        tilt_num: words[4],
        scan_mode: ScanMode::from_wire_code(words[5]),
        end_of_tilt: words[6] != 0,
        end_of_volume: words[7] != 0,
        new_scan_limits: words[8] != 0,
        field_flag: words[9] as u32,
        nfields_current,
        ngates,
        gates: gates.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_carry_sequence_and_length() {
        let mut encoder = FrameEncoder::new();
        let first = encoder.frame(GATE_DATA_PACKET, &[1, 2, 3]);
        let second = encoder.frame(GATE_PARAMS_PACKET, &[]);
        let (header, payload) = decode_frame(&first).unwrap();
        assert_eq!(header.packet_type, GATE_DATA_PACKET);
        assert_eq!(header.length, 3);
        assert_eq!(payload, &[1, 2, 3]);
        assert_eq!(&first[..4], &[0x47, 0x41, 0x54, 0x45]);
        assert_eq!(decode_frame(&second).unwrap().0.seq, 1);
    }

    #[test]
    fn gate_payload_holds_only_active_fields() {
        let mut beam = CanonicalBeam::new(3, 4);
        beam.field_flag = 0b110;
        beam.gate_data.row_mut(1).fill(7);
        beam.gate_data.row_mut(2).fill(9);
        beam.time = 1_700_000_000;
        beam.azimuth = -5;
        beam.end_of_tilt = true;
        let payload = encode_beam(&beam);
        assert_eq!(payload.len(), BEAM_HEADER_WORDS * 4 + 2 * 4);

        let packet = decode_beam(&payload).unwrap();
        assert_eq!(packet.time, 1_700_000_000);
        assert_eq!(packet.azimuth, -5);
        assert!(packet.end_of_tilt);
        assert_eq!(packet.gates, vec![7, 7, 7, 7, 9, 9, 9, 9]);
    }

    #[test]
    fn params_payload_is_big_endian() {
        let block = ParameterBlock {
            radar_id: 1,
            nfields_out: 1,
            fields: vec![FieldParams { scale: 5_000, bias: -300_000, factor: 10_000 }],
            ..Default::default()
        };
        let payload = encode_params(&block);
        assert_eq!(&payload[..4], &[0, 0, 0, 1]);
        assert_eq!(payload.len(), (ParameterBlock::SCALAR_WORDS + 3) * 4);
        assert_eq!(decode_params(&payload).unwrap(), block);
    }

    #[test]
    fn corrupt_frames_are_rejected() {
        let mut frame = FrameEncoder::new().frame(GATE_DATA_PACKET, &[0; 8]);
        assert!(decode_frame(&frame[..20]).is_err());
        frame[0] = 0;
        assert!(decode_frame(&frame).is_err());
    }
}

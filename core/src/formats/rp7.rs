//! NCAR RP7 processor tape records.
//!
//! One beam per physical record: a big-endian header of 16-bit words, a
//! per-field descriptor table, then gate data interleaved by gate (all fields
//! of gate 0, all fields of gate 1, ...).

use crate::beam::{normalize_azimuth, BeamHeader, FieldLayout, GateSamples, RawBeamRecord, ScanMode};
use crate::config::GateConfig;
use crate::formats::{
    epoch_seconds, expand_year, next_decoded, short_record, ByteOrder, NativeScale, Words,
};
use crate::prelude::{BeamDecoder, GateError, GateResult, RecordSource};
use chrono::{DateTime, Datelike, Timelike};

/// Fixed-point multiplier of the scale/bias words.
pub const RP7_SCALE_MULT: f64 = 10000.0;

const FIXED_WORDS: usize = 20;
const WORDS_PER_FIELD: usize = 5;

mod word {
    pub const REC_LEN: usize = 0;
    pub const NFIELDS: usize = 1;
    pub const HEADER_LEN: usize = 2;
    pub const YEAR: usize = 3;
    pub const AZIMUTH: usize = 9;
    pub const ELEVATION: usize = 10;
    pub const FIXED_ANGLE: usize = 11;
    pub const VOLUME: usize = 12;
    pub const TILT: usize = 13;
    pub const SCAN_MODE: usize = 14;
    pub const NGATES: usize = 15;
    pub const GATE_SPACING: usize = 16;
    pub const START_RANGE: usize = 17;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rp7Field {
    pub name: String,
    pub native: NativeScale,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rp7Beam {
    pub header: BeamHeader,
    pub samples: GateSamples,
    pub fields: Vec<Rp7Field>,
}

fn scan_mode(code: u16) -> ScanMode {
    match code {
        1 => ScanMode::Sector,
        3 => ScanMode::Rhi,
        8 => ScanMode::Surveillance,
        _ => ScanMode::Unknown,
    }
}

fn scan_code(mode: ScanMode) -> u16 {
    match mode {
        ScanMode::Sector => 1,
        ScanMode::Rhi => 3,
        ScanMode::Surveillance => 8,
        ScanMode::Unknown => 0,
    }
}

pub fn decode_record(record: &[u8], time_correction: i64) -> GateResult<Rp7Beam> {
    let words = Words::new(record, ByteOrder::Big);
    if words.len() < FIXED_WORDS * 2 {
        return Err(GateError::Framing(format!(
            "rp7 record of {} bytes shorter than fixed header",
            record.len()
        )));
    }
    let get = |index: usize| words.word(index).ok_or_else(|| short_record("rp7"));

    let rec_len = get(word::REC_LEN)? as usize * 2;
    let nfields = get(word::NFIELDS)? as usize;
    let header_len = get(word::HEADER_LEN)? as usize * 2;
    let ngates = get(word::NGATES)? as usize;
    if rec_len > record.len() || header_len < (FIXED_WORDS + nfields * WORDS_PER_FIELD) * 2 {
        return Err(GateError::Framing(format!(
            "rp7 lengths inconsistent: record {} header {} fields {}",
            rec_len, header_len, nfields
        )));
    }
    let data = record
        .get(header_len..header_len + nfields * ngates)
        .ok_or_else(|| short_record("rp7"))?;

    let mut clock = [0u16; 6];
    for (offset, part) in clock.iter_mut().enumerate() {
        *part = get(word::YEAR + offset)?;
    }
    let time = epoch_seconds(
        expand_year(clock[0] as i32, 70),
        clock[1] as u32,
        clock[2] as u32,
        clock[3] as u32,
        clock[4] as u32,
        clock[5] as u32,
    )
    .ok_or_else(|| GateError::Framing(format!("rp7 time {:?} invalid", clock)))?;

    let mut fields = Vec::with_capacity(nfields);
    for field in 0..nfields {
        let base = FIXED_WORDS + field * WORDS_PER_FIELD;
        let name_bytes = record
            .get(base * 2..base * 2 + 2)
            .ok_or_else(|| short_record("rp7"))?;
        let scale = words.long_word(base + 1).ok_or_else(|| short_record("rp7"))?;
        let bias = words.long_word(base + 3).ok_or_else(|| short_record("rp7"))?;
        fields.push(Rp7Field {
            name: String::from_utf8_lossy(name_bytes).trim().to_string(),
            native: NativeScale {
                scale: scale as f64 / RP7_SCALE_MULT,
                bias: bias as f64 / RP7_SCALE_MULT,
            },
        });
    }

    let elevation = words
        .signed_word(word::ELEVATION)
        .ok_or_else(|| short_record("rp7"))?;
    let header = BeamHeader {
        time: time + time_correction,
        azimuth_deg: normalize_azimuth(get(word::AZIMUTH)? as f64 / 100.0),
        elevation_deg: elevation as f64 / 100.0,
        target_elevation_deg: get(word::FIXED_ANGLE)? as f64 / 100.0,
        volume_num: get(word::VOLUME)? as i32,
        tilt_num: get(word::TILT)? as i32,
        scan_mode: scan_mode(get(word::SCAN_MODE)?),
        gate_spacing_m: get(word::GATE_SPACING)? as f64,
        start_range_m: get(word::START_RANGE)? as f64,
    };

    Ok(Rp7Beam {
        header,
        samples: GateSamples::new(FieldLayout::Interleaved, nfields, ngates, data.to_vec()),
        fields,
    })
}

impl Rp7Beam {
    /// Serializes the beam back into a physical record, e.g. for synthetic tapes.
    pub fn encode(&self) -> GateResult<Vec<u8>> {
        let nfields = self.fields.len();
        let header_words = FIXED_WORDS + nfields * WORDS_PER_FIELD;
        let data_len = self.samples.bytes.len();
        let total_words = header_words + data_len.div_ceil(2);
        if total_words > u16::MAX as usize {
            return Err(GateError::Framing(format!(
                "rp7 record of {} words too long",
                total_words
            )));
        }
        let stamp = DateTime::from_timestamp(self.header.time, 0)
            .ok_or_else(|| GateError::Framing(format!("time {} unrepresentable", self.header.time)))?;

        let mut header = vec![0u16; FIXED_WORDS];
        header[word::REC_LEN] = total_words as u16;
        header[word::NFIELDS] = nfields as u16;
        header[word::HEADER_LEN] = header_words as u16;
        header[word::YEAR] = stamp.year() as u16;
        header[word::YEAR + 1] = stamp.month() as u16;
        header[word::YEAR + 2] = stamp.day() as u16;
        header[word::YEAR + 3] = stamp.hour() as u16;
        header[word::YEAR + 4] = stamp.minute() as u16;
        header[word::YEAR + 5] = stamp.second() as u16;
        header[word::AZIMUTH] = (self.header.azimuth_deg * 100.0).round() as u16;
        header[word::ELEVATION] = (self.header.elevation_deg * 100.0).round() as i16 as u16;
        header[word::FIXED_ANGLE] = (self.header.target_elevation_deg * 100.0).round() as u16;
        header[word::VOLUME] = self.header.volume_num as u16;
        header[word::TILT] = self.header.tilt_num as u16;
        header[word::SCAN_MODE] = scan_code(self.header.scan_mode);
        header[word::NGATES] = self.samples.ngates as u16;
        header[word::GATE_SPACING] = self.header.gate_spacing_m.round() as u16;
        header[word::START_RANGE] = self.header.start_range_m.round() as u16;

        let mut record = Vec::with_capacity(total_words * 2);
        for value in header {
            record.extend_from_slice(&value.to_be_bytes());
        }
        for field in &self.fields {
            let mut name = [b' '; 2];
            for (slot, byte) in name.iter_mut().zip(field.name.bytes()) {
                *slot = byte;
            }
            record.extend_from_slice(&name);
            let scale = (field.native.scale * RP7_SCALE_MULT).round() as i32;
            let bias = (field.native.bias * RP7_SCALE_MULT).round() as i32;
            record.extend_from_slice(&scale.to_be_bytes());
            record.extend_from_slice(&bias.to_be_bytes());
        }
        record.extend_from_slice(&self.samples.bytes);
        record.resize(total_words * 2, 0);
        Ok(record)
    }
}

pub struct Rp7Decoder {
    time_correction: i64,
    rejected: u64,
}

impl Rp7Decoder {
    pub fn new(config: &GateConfig) -> Self {
        Self {
            time_correction: config.time_correction_secs,
            rejected: 0,
        }
    }
}

impl BeamDecoder for Rp7Decoder {
    fn next_beam(&mut self, source: &mut dyn RecordSource) -> GateResult<Option<RawBeamRecord>> {
        let time_correction = self.time_correction;
        let beam = next_decoded(source, self.name(), &mut self.rejected, |record| {
            decode_record(record, time_correction)
        })?;
        Ok(beam.map(RawBeamRecord::Rp7))
    }

    fn name(&self) -> &'static str {
        "rp7"
    }

    fn resyncs(&self) -> u64 {
        self.rejected
    }
}

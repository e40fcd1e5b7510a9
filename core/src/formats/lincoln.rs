//! Lincoln Laboratory tape records.
//!
//! Big-endian 16-bit header words, one beam per physical record, field data
//! stored field-sequential after the header. Per-field scale and bias are
//! 32-bit integers multiplied by [`LL_SCALE_AND_BIAS_MULT`].

use crate::beam::{normalize_azimuth, BeamHeader, FieldLayout, GateSamples, RawBeamRecord, ScanMode};
use crate::config::GateConfig;
use crate::formats::{
    epoch_seconds, expand_year, next_decoded, short_record, ByteOrder, NativeScale, Words,
};
use crate::prelude::{BeamDecoder, GateError, GateResult, RecordSource};

pub const LL_SCALE_AND_BIAS_MULT: f64 = 100.0;

const FIXED_WORDS: usize = 18;
const WORDS_PER_FIELD: usize = 4;

mod word {
    pub const REC_LEN: usize = 0;
    pub const HEADER_LEN: usize = 1;
    pub const VOLUME: usize = 2;
    pub const TILT: usize = 3;
    pub const SCAN_MODE: usize = 4;
    pub const YEAR: usize = 5;
    pub const AZIMUTH: usize = 11;
    pub const ELEVATION: usize = 12;
    pub const TARGET_ELEVATION: usize = 13;
    pub const NGATES: usize = 14;
    pub const GATE_SPACING: usize = 15;
    pub const START_RANGE: usize = 16;
    pub const NFIELDS: usize = 17;
}

#[derive(Debug, Clone, PartialEq)]
pub struct LincolnBeam {
    pub header: BeamHeader,
    pub samples: GateSamples,
    pub field_scales: Vec<NativeScale>,
}

fn scan_mode(code: u16) -> ScanMode {
    match code {
        1 => ScanMode::Surveillance,
        2 => ScanMode::Sector,
        3 => ScanMode::Rhi,
        _ => ScanMode::Unknown,
    }
}

/// Decodes one physical Lincoln record.
pub fn decode_record(record: &[u8], time_correction: i64) -> GateResult<LincolnBeam> {
    let words = Words::new(record, ByteOrder::Big);
    if words.len() < FIXED_WORDS * 2 {
        return Err(GateError::Framing(format!(
            "lincoln record of {} bytes shorter than fixed header",
            record.len()
        )));
    }
    let get = |index: usize| words.word(index).ok_or_else(|| short_record("lincoln"));

    let rec_len = get(word::REC_LEN)? as usize * 2;
    let header_len = get(word::HEADER_LEN)? as usize * 2;
    let nfields = get(word::NFIELDS)? as usize;
    let ngates = get(word::NGATES)? as usize;
    if rec_len > record.len() || header_len < (FIXED_WORDS + nfields * WORDS_PER_FIELD) * 2 {
        return Err(GateError::Framing(format!(
            "lincoln lengths inconsistent: record {} header {} fields {}",
            rec_len, header_len, nfields
        )));
    }
    let data_len = nfields * ngates;
    let data = record
        .get(header_len..header_len + data_len)
        .ok_or_else(|| short_record("lincoln"))?;

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
    .ok_or_else(|| GateError::Framing(format!("lincoln time {:?} invalid", clock)))?;

    let centi = |index: usize| -> GateResult<f64> {
        Ok(words
            .signed_word(index)
            .ok_or_else(|| short_record("lincoln"))? as f64
            / 100.0)
    };
    let azimuth = get(word::AZIMUTH)? as f64 / 100.0;

    let mut field_scales = Vec::with_capacity(nfields);
    for field in 0..nfields {
        let base = FIXED_WORDS + field * WORDS_PER_FIELD;
        let scale = words.long_word(base).ok_or_else(|| short_record("lincoln"))?;
        let bias = words.long_word(base + 2).ok_or_else(|| short_record("lincoln"))?;
        field_scales.push(NativeScale {
            scale: scale as f64 / LL_SCALE_AND_BIAS_MULT,
            bias: bias as f64 / LL_SCALE_AND_BIAS_MULT,
        });
    }

    let header = BeamHeader {
        time: time + time_correction,
        azimuth_deg: normalize_azimuth(azimuth),
        elevation_deg: centi(word::ELEVATION)?,
        target_elevation_deg: get(word::TARGET_ELEVATION)? as f64 / 100.0,
        volume_num: get(word::VOLUME)? as i32,
        tilt_num: get(word::TILT)? as i32,
        scan_mode: scan_mode(get(word::SCAN_MODE)?),
        gate_spacing_m: get(word::GATE_SPACING)? as f64,
        start_range_m: get(word::START_RANGE)? as f64,
    };

    Ok(LincolnBeam {
        header,
        samples: GateSamples::new(FieldLayout::Sequential, nfields, ngates, data.to_vec()),
        field_scales,
    })
}

pub struct LincolnDecoder {
    time_correction: i64,
    rejected: u64,
}

impl LincolnDecoder {
    pub fn new(config: &GateConfig) -> Self {
        Self {
            time_correction: config.time_correction_secs,
            rejected: 0,
        }
    }
}

impl BeamDecoder for LincolnDecoder {
    fn next_beam(&mut self, source: &mut dyn RecordSource) -> GateResult<Option<RawBeamRecord>> {
        let time_correction = self.time_correction;
        let beam = next_decoded(source, self.name(), &mut self.rejected, |record| {
            decode_record(record, time_correction)
        })?;
        Ok(beam.map(RawBeamRecord::Lincoln))
    }

    fn name(&self) -> &'static str {
        "lincoln"
    }

    fn resyncs(&self) -> u64 {
        self.rejected
    }
}

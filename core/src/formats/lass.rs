//! LASS ray records.
//!
//! Every record repeats the volume summary ahead of its ray header, so each
//! record decodes on its own. Samples arrive on the recorder's internal
//! counts scale and are re-quantized onto the configured output scale.

use crate::beam::{normalize_azimuth, BeamHeader, FieldLayout, GateSamples, RawBeamRecord, ScanMode};
use crate::config::{GateConfig, LassConfig};
use crate::formats::{epoch_seconds, expand_year, short_record, ByteOrder, NativeScale, Words};
use crate::prelude::{BeamDecoder, GateError, GateResult, RecordSource};

pub const LASS_MAGIC: &[u8; 16] = b"LASS_RAY_V1\0\0\0\0\0";
pub const LASS_FIELDS: usize = 2;

const SUMMARY_OFFSET: usize = 16;
const RAY_OFFSET: usize = SUMMARY_OFFSET + 16 * 2;
const DATA_OFFSET: usize = RAY_OFFSET + 4 * 2;

mod summary {
    pub const VOLUME: usize = 0;
    pub const TILT: usize = 1;
    pub const SCAN_MODE: usize = 2;
    pub const YEAR: usize = 3;
    pub const NGATES: usize = 9;
    pub const GATE_SPACING: usize = 10;
    pub const START_RANGE: usize = 11;
    pub const DBZ_SCALE: usize = 12;
}

#[derive(Debug, Clone, PartialEq)]
pub struct LassBeam {
    pub header: BeamHeader,
    /// (dBZ, velocity) pairs, already on the output scale.
    pub samples: GateSamples,
    pub ray_number: i32,
    /// Recorder scale of each field before re-quantization.
    pub recorded: [NativeScale; LASS_FIELDS],
}

fn scan_mode(code: u16) -> ScanMode {
    match code {
        1 => ScanMode::Surveillance,
        2 => ScanMode::Sector,
        3 => ScanMode::Rhi,
        _ => ScanMode::Unknown,
    }
}

/// Output scale of each LASS field.
pub fn output_scales(config: &LassConfig) -> [NativeScale; LASS_FIELDS] {
    [
        NativeScale {
            scale: config.dbz_scale,
            bias: config.dbz_bias,
        },
        NativeScale {
            scale: config.vel_scale,
            bias: config.vel_bias,
        },
    ]
}

fn requantize(count: u8, from: NativeScale, to: NativeScale) -> u8 {
    let value = count as f64 * from.scale + from.bias;
    ((value - to.bias) / to.scale).round().clamp(0.0, 255.0) as u8
}

pub fn decode_record(record: &[u8], output: &LassConfig, time_correction: i64) -> GateResult<LassBeam> {
    if record.len() < DATA_OFFSET {
        return Err(GateError::Framing(format!(
            "lass record of {} bytes shorter than headers",
            record.len()
        )));
    }
    if &record[..SUMMARY_OFFSET] != LASS_MAGIC {
        return Err(GateError::Framing("lass magic_data mismatch".into()));
    }

    let volume = Words::new(&record[SUMMARY_OFFSET..RAY_OFFSET], ByteOrder::Big);
    let ray = Words::new(&record[RAY_OFFSET..DATA_OFFSET], ByteOrder::Big);
    let get = |index: usize| volume.word(index).ok_or_else(|| short_record("lass"));
    let hundredths = |index: usize| -> GateResult<f64> {
        Ok(volume.signed_word(index).ok_or_else(|| short_record("lass"))? as f64 / 100.0)
    };

    let ngates = get(summary::NGATES)? as usize;
    let data = record
        .get(DATA_OFFSET..DATA_OFFSET + ngates * LASS_FIELDS)
        .ok_or_else(|| short_record("lass"))?;

    let mut clock = [0u16; 6];
    for (offset, part) in clock.iter_mut().enumerate() {
        *part = get(summary::YEAR + offset)?;
    }
    let time = epoch_seconds(
        expand_year(clock[0] as i32, 70),
        clock[1] as u32,
        clock[2] as u32,
        clock[3] as u32,
        clock[4] as u32,
        clock[5] as u32,
    )
    .ok_or_else(|| GateError::Framing(format!("lass time {:?} invalid", clock)))?;

    let recorded = [
        NativeScale {
            scale: hundredths(summary::DBZ_SCALE)?,
            bias: hundredths(summary::DBZ_SCALE + 1)?,
        },
        NativeScale {
            scale: hundredths(summary::DBZ_SCALE + 2)?,
            bias: hundredths(summary::DBZ_SCALE + 3)?,
        },
    ];
    let target = output_scales(output);
    let bytes = data
        .chunks_exact(LASS_FIELDS)
        .flat_map(|pair| {
            [
                requantize(pair[0], recorded[0], target[0]),
                requantize(pair[1], recorded[1], target[1]),
            ]
        })
        .collect();

    let ray_word = |index: usize| ray.word(index).ok_or_else(|| short_record("lass"));
    let header = BeamHeader {
        time: time + time_correction,
        azimuth_deg: normalize_azimuth(ray_word(0)? as f64 / 100.0),
        elevation_deg: ray.signed_word(1).ok_or_else(|| short_record("lass"))? as f64 / 100.0,
        target_elevation_deg: ray_word(2)? as f64 / 100.0,
        volume_num: get(summary::VOLUME)? as i32,
        tilt_num: get(summary::TILT)? as i32,
        scan_mode: scan_mode(get(summary::SCAN_MODE)?),
        gate_spacing_m: get(summary::GATE_SPACING)? as f64,
        start_range_m: get(summary::START_RANGE)? as f64,
    };

    Ok(LassBeam {
        header,
        samples: GateSamples::new(FieldLayout::Interleaved, LASS_FIELDS, ngates, bytes),
        ray_number: ray_word(3)? as i32,
        recorded,
    })
}

fn has_magic(record: &[u8]) -> bool {
    record.get(..SUMMARY_OFFSET) == Some(&LASS_MAGIC[..])
}

/// Decodes LASS records, giving up on a tape file once one of its full-size
/// records carries the wrong magic.
pub struct LassDecoder {
    output: LassConfig,
    time_correction: i64,
    rejected: u64,
    abandoned_file: Option<usize>,
}

impl LassDecoder {
    pub fn new(config: &GateConfig) -> Self {
        Self {
            output: config.lass.clone(),
            time_correction: config.time_correction_secs,
            rejected: 0,
            abandoned_file: None,
        }
    }
}

impl BeamDecoder for LassDecoder {
    fn next_beam(&mut self, source: &mut dyn RecordSource) -> GateResult<Option<RawBeamRecord>> {
        while let Some(record) = source.read_record()? {
            let file = source.file_number();
            if self.abandoned_file == Some(file) {
                self.rejected += 1;
                continue;
            }
            if record.len() >= DATA_OFFSET && !has_magic(&record) {
                self.rejected += 1;
                self.abandoned_file = Some(file);
                log::warn!("lass: magic_data mismatch, skipping rest of tape file {}", file);
                continue;
            }
            match decode_record(&record, &self.output, self.time_correction) {
                Ok(beam) => return Ok(Some(RawBeamRecord::Lass(beam))),
                Err(GateError::Framing(reason)) => {
                    self.rejected += 1;
                    log::debug!("lass: skipping record of {} bytes: {}", record.len(), reason);
                }
                Err(other) => return Err(other),
            }
        }
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "lass"
    }

    fn resyncs(&self) -> u64 {
        self.rejected
    }
}

//! Radar and field parameters sent ahead of the gate data.

use crate::beam::{to_micro_degrees, RawBeamRecord};
use crate::config::GateConfig;
use crate::formats::alenia::MOMENT_SCALES;
use crate::formats::lass::output_scales;
use crate::formats::NativeScale;
use serde::Serialize;

/// Fixed-point multiplier for scale, bias, PRF and wavelength.
pub const PARAM_FACTOR: i32 = 10000;

/// `round(value * factor)`, rounding halves upward.
pub fn fixed_point(value: f64, factor: i32) -> i32 {
    (value * factor as f64 + 0.5).floor() as i32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FieldParams {
    pub scale: i32,
    pub bias: i32,
    pub factor: i32,
}

impl FieldParams {
    pub fn from_native(native: NativeScale) -> Self {
        Self {
            scale: fixed_point(native.scale, PARAM_FACTOR),
            bias: fixed_point(native.bias, PARAM_FACTOR),
            factor: PARAM_FACTOR,
        }
    }

    pub fn physical(&self) -> NativeScale {
        let factor = self.factor.max(1) as f64;
        NativeScale {
            scale: self.scale as f64 / factor,
            bias: self.bias as f64 / factor,
        }
    }
}

/// Every scalar is a 32-bit integer; the wire order is the field order here.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ParameterBlock {
    pub radar_id: i32,
    /// Metres.
    pub altitude: i32,
    /// Microdegrees.
    pub latitude: i32,
    /// Microdegrees.
    pub longitude: i32,
    pub ngates_out: i32,
    /// Microdegrees.
    pub beam_width: i32,
    pub nfields_out: i32,
    /// Millimetres.
    pub gate_spacing: i32,
    /// Millimetres to the first transmitted gate.
    pub start_range: i32,
    pub samples_per_beam: i32,
    /// Nanoseconds.
    pub pulse_width: i32,
    /// Hz × `factor`.
    pub prf: i32,
    /// cm × `factor`.
    pub wavelength: i32,
    pub scan_mode: i32,
    pub scan_type: i32,
    pub field_flag: i32,
    pub nfields_current: i32,
    pub factor: i32,
    pub fields: Vec<FieldParams>,
}

impl ParameterBlock {
    /// Number of 32-bit words before the field table.
    pub const SCALAR_WORDS: usize = 18;

    pub fn from_beam(raw: &RawBeamRecord, config: &GateConfig) -> Self {
        let header = raw.header();
        let samples = raw.samples();
        let nfields_out = config.nfields_out();
        let site = &config.radar;

        let position = |out: usize| match raw {
            RawBeamRecord::Chill(_) => Some(out),
            _ => config.out_field_pos.get(out).copied(),
        };
        let native = |out: usize| -> Option<NativeScale> {
            let pos = position(out)?;
            match raw {
                RawBeamRecord::Lincoln(beam) => beam.field_scales.get(pos).copied(),
                RawBeamRecord::Rp7(beam) => beam.fields.get(pos).map(|field| field.native),
                RawBeamRecord::Chill(beam) => beam.field_scales.get(pos).copied(),
                RawBeamRecord::Lass(_) => output_scales(&config.lass).get(pos).copied(),
                RawBeamRecord::Alenia(_) => MOMENT_SCALES.get(pos).copied(),
            }
        };
        let present = |out: usize| match raw {
            RawBeamRecord::Chill(_) | RawBeamRecord::Alenia(_) => {
                position(out).is_some_and(|pos| samples.is_present(pos))
            }
            _ => true,
        };

        let field_flag = (0..nfields_out)
            .filter(|&out| present(out))
            .fold(0u32, |flag, out| flag | (1 << out));
        let fields = (0..nfields_out)
            .map(|out| native(out).map(FieldParams::from_native).unwrap_or(FieldParams {
                factor: PARAM_FACTOR,
                ..Default::default()
            }))
            .collect();

        let dropped = if raw.pre_trimmed() { 0 } else { config.ngates_dropped };
        let start_range_m = header.start_range_m + dropped as f64 * header.gate_spacing_m;

        let (pulse_width_us, prf_hz, wavelength_cm, samples_per_beam, scan_type) = match raw {
            RawBeamRecord::Chill(beam) => (
                beam.params.pulse_len as f64 / 1024.0,
                beam.params.prf_hz,
                beam.params.wavelength_cm,
                site.samples_per_beam,
                beam.scan_type,
            ),
            RawBeamRecord::Alenia(beam) => (
                beam.pulse_width_us,
                beam.prf_hz,
                site.wavelength_cm,
                beam.npulses as i32,
                0,
            ),
            _ => (
                site.pulse_width_us,
                site.prf_hz,
                site.wavelength_cm,
                site.samples_per_beam,
                0,
            ),
        };

        Self {
            radar_id: site.radar_id,
            altitude: site.altitude_m.round() as i32,
            latitude: to_micro_degrees(site.latitude_deg),
            longitude: to_micro_degrees(site.longitude_deg),
            ngates_out: config.ngates_out as i32,
            beam_width: to_micro_degrees(site.beam_width_deg),
            nfields_out: nfields_out as i32,
            gate_spacing: (header.gate_spacing_m * 1000.0).round() as i32,
            start_range: (start_range_m * 1000.0).round() as i32,
            samples_per_beam,
            pulse_width: (pulse_width_us * 1000.0).round() as i32,
            prf: fixed_point(prf_hz, PARAM_FACTOR),
            wavelength: fixed_point(wavelength_cm, PARAM_FACTOR),
            scan_mode: header.scan_mode.wire_code(),
            scan_type,
            field_flag: field_flag as i32,
            nfields_current: field_flag.count_ones() as i32,
            factor: PARAM_FACTOR,
            fields,
        }
    }
}

/// Derives the parameter block for each beam and remembers the last one sent.
#[derive(Debug, Default)]
pub struct ParamSynchronizer {
    previous: Option<ParameterBlock>,
}

impl ParamSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the block differs from the previous one.
    pub fn update(&mut self, raw: &RawBeamRecord, config: &GateConfig) -> bool {
        self.replace(ParameterBlock::from_beam(raw, config))
    }

    /// Stores `block` if it differs from the previous one.
    pub fn replace(&mut self, block: ParameterBlock) -> bool {
        if self.previous.as_ref() == Some(&block) {
            return false;
        }
        self.previous = Some(block);
        true
    }

    /// The block describing the most recent beam.
    pub fn current(&self) -> Option<&ParameterBlock> {
        self.previous.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RadarFormat;
    use crate::formats::alenia::AleniaDecoder;
    use crate::formats::testdata::{alenia_record, rp7_beam, AleniaFixture};
    use crate::prelude::BeamDecoder;
    use crate::source::MemorySource;

    fn rp7_config() -> GateConfig {
        GateConfig {
            nfields_in: 4,
            out_field_pos: vec![0, 2],
            ..Default::default()
        }
    }

    #[test]
    fn rp7_block_uses_native_scales_of_mapped_fields() {
        let raw = RawBeamRecord::Rp7(rp7_beam(5, 10.0, 4, 3));
        let block = ParameterBlock::from_beam(&raw, &rp7_config());
        assert_eq!(block.field_flag, 0b11);
        assert_eq!(block.nfields_current, 2);
        assert_eq!(block.fields[0], FieldParams { scale: 5_000, bias: -320_000, factor: 10_000 });
        assert_eq!(block.fields[1].bias, -300_000);
        assert_eq!(block.gate_spacing, 150_000);
        assert_eq!(block.scan_mode, 8);
    }

    #[test]
    fn alenia_flags_only_present_moments() {
        let config = GateConfig {
            format: RadarFormat::Alenia,
            out_field_pos: vec![0, 1, 3],
            ..Default::default()
        };
        let fixture = AleniaFixture {
            moment_mask: 0b1001,
            ..Default::default()
        };
        let mut source = MemorySource::new(vec![alenia_record(&fixture)]);
        let raw = AleniaDecoder::new(&config).next_beam(&mut source).unwrap().unwrap();
        let block = ParameterBlock::from_beam(&raw, &config);
        assert_eq!(block.field_flag, 0b101);
        assert_eq!(block.nfields_current, 2);
        assert_eq!(block.samples_per_beam, fixture.npulses as i32);
        assert_eq!(block.pulse_width, 1_500);
    }

    #[test]
    fn change_detection_covers_scalars_and_field_table() {
        let mut sync = ParamSynchronizer::new();
        let raw = RawBeamRecord::Rp7(rp7_beam(5, 10.0, 4, 3));
        let config = rp7_config();
        assert!(sync.update(&raw, &config));
        assert!(!sync.update(&raw, &config));

        let mut block = sync.current().cloned().unwrap();
        block.fields[1].bias += 1;
        assert!(sync.replace(block.clone()));
        assert!(!sync.replace(block.clone()));
        block.prf += 1;
        assert!(sync.replace(block));
    }

    #[test]
    fn dropped_gates_move_start_range() {
        let raw = RawBeamRecord::Rp7(rp7_beam(5, 10.0, 4, 3));
        let config = GateConfig {
            ngates_dropped: 2,
            ..rp7_config()
        };
        let block = ParameterBlock::from_beam(&raw, &config);
        assert_eq!(block.start_range, 75_000 + 2 * 150_000);
    }

    #[test]
    fn fixed_point_rounds_half_up() {
        assert_eq!(fixed_point(0.25, 2), 1);
        assert_eq!(fixed_point(-0.25, 2), 0);
        assert_eq!(fixed_point(-30.0, PARAM_FACTOR), -300_000);
        assert_eq!(FieldParams::from_native(NativeScale { scale: 0.5, bias: -30.0 }).physical().bias, -30.0);
    }
}

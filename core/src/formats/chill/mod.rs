//! CSU-CHILL tape rays.
//!
//! Rays are variable length and may share a physical block. Each carries a
//! housekeeping header whose size depends on the tape era, followed by one
//! block per recorded field. Reflectivity arrives as raw integrator counts
//! and is converted to dBZ through the calibration file.

mod housekeeping;
mod smoothing;

pub use housekeeping::{detect_order, scan_fields, FieldBlock, Housekeeping, RawRay, RayReader};
pub use smoothing::{AngleSmoother, CHILL_CIRCLE};

use crate::beam::{normalize_azimuth, BeamHeader, FieldLayout, GateSamples, RawBeamRecord, ScanMode};
use crate::calibration::{CalibrationMatch, CalibrationTable, ReflectivityCalibration};
use crate::config::{GateConfig, RadarSite, ALL_SCAN_TYPES};
use crate::formats::{epoch_seconds, expand_year, NativeScale};
use crate::prelude::{BeamDecoder, GateError, GateResult, RecordSource};

pub const CHILL_DEG_CONV: f64 = 360.0 / CHILL_CIRCLE as f64;
pub const CHILL_DBZ_SCALE: f64 = 0.5;
pub const CHILL_DBZ_BIAS: f64 = -30.0;
pub const CHILL_ZDR_SCALE: f64 = 0.05;
pub const CHILL_ZDR_BIAS: f64 = -3.0;
pub const CHILL_PHASE_SCALE: f64 = 1.40625;
pub const CHILL_PHASE_BIAS: f64 = 0.0;

const DEFAULT_TXBIN: usize = 3;
const MAX_HEADER_TXBIN: u16 = 8;
const UNSET_SEGMENT: &str = "UNSET";

/// Radar parameters carried by extended housekeeping, or defaulted from
/// the site description.
#[derive(Debug, Clone, PartialEq)]
pub struct ChillParams {
    pub gate_spacing_m: f64,
    pub prf_hz: f64,
    pub nyquist_ms: f64,
    pub wavelength_cm: f64,
    /// 1/1024 µs
    pub pulse_len: i32,
    /// 1/1024 µs
    pub gate_len: i32,
    pub scan_mode: ScanMode,
    pub bypass: i32,
}

impl ChillParams {
    fn from_housekeeping(hsk: &Housekeeping, site: &RadarSite, fallback_gate_spacing_m: f64) -> Self {
        let prf_hz = match hsk.prt_us {
            Some(prt) if prt > 0 => 1.0e6 / prt as f64,
            _ => site.prf_hz,
        };
        let (nyquist_ms, wavelength_cm) = match hsk.nyquist_raw {
            Some(raw) => {
                let nyquist = raw as f64 / 256.0;
                (nyquist, 400.0 * nyquist / prf_hz)
            }
            None => (site.wavelength_cm * prf_hz / 400.0, site.wavelength_cm),
        };
        let default_len = (site.pulse_width_us * 1024.0).round() as i32;
        let (pulse_len, gate_len) = match (hsk.pulse_len, hsk.gate_len) {
            (Some(pulse), Some(gate)) => (pulse as i32, gate as i32),
            (Some(pulse), None) => (pulse as i32, default_len),
            _ => (default_len, default_len),
        };
        let gate_spacing_m = match hsk.gate_len {
            Some(gate) if gate > 0 => gate as f64 * 150.0 / 1024.0,
            _ => fallback_gate_spacing_m,
        };
        let scan_mode = match hsk.scan_mode {
            Some(1) => ScanMode::Sector,
            Some(2) => ScanMode::Rhi,
            _ => ScanMode::Surveillance,
        };
        Self {
            gate_spacing_m,
            prf_hz,
            nyquist_ms,
            wavelength_cm,
            pulse_len,
            gate_len,
            scan_mode,
            bypass: hsk.bypass.map(i32::from).unwrap_or(1),
        }
    }

    /// Native scale and bias of a field code under these parameters.
    pub fn field_scale(&self, code: &str) -> NativeScale {
        match code {
            "IP" => NativeScale {
                scale: CHILL_DBZ_SCALE,
                bias: CHILL_DBZ_BIAS,
            },
            "VE" => NativeScale {
                scale: self.nyquist_ms / 128.0,
                bias: -self.nyquist_ms,
            },
            "DR" => NativeScale {
                scale: CHILL_ZDR_SCALE,
                bias: CHILL_ZDR_BIAS,
            },
            _ => NativeScale {
                scale: CHILL_PHASE_SCALE,
                bias: CHILL_PHASE_BIAS,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChillBeam {
    pub header: BeamHeader,
    /// One field-sequential row per configured output code; absent codes are zero rows.
    pub samples: GateSamples,
    pub segment_name: String,
    /// Index of the segment name in the configured scan types.
    pub scan_type: i32,
    pub ray_number: i32,
    pub params: ChillParams,
    /// Scale and bias per configured output code.
    pub field_scales: Vec<NativeScale>,
    pub calibration: CalibrationMatch,
}

/// Key under which the reflectivity tables stay valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CalibrationKey {
    year: i32,
    month: u32,
    day: u32,
    bypass: i32,
    pulse_len: i32,
    gate_len: i32,
}

struct ActiveCalibration {
    key: CalibrationKey,
    tables: ReflectivityCalibration,
    matched: CalibrationMatch,
}

pub struct ChillDecoder {
    fields_out: Vec<String>,
    extended_hsk: bool,
    scan_types: Vec<String>,
    site: RadarSite,
    fallback_gate_spacing_m: f64,
    time_correction: i64,
    table: CalibrationTable,
    reader: RayReader,
    azimuth: AngleSmoother,
    elevation: AngleSmoother,
    calibration: Option<ActiveCalibration>,
    saved: Option<ChillParams>,
    segment_name: String,
    started: bool,
    rejected: u64,
}

impl ChillDecoder {
    /// Loads the calibration file; a missing file is a startup error.
    pub fn new(config: &GateConfig) -> GateResult<Self> {
        let table = CalibrationTable::load(&config.chill.calibration_path)?;
        log::info!(
            "chill: {} calibration entries from {}",
            table.len(),
            config.chill.calibration_path.display()
        );
        Ok(Self::with_table(config, table))
    }

    pub fn with_table(config: &GateConfig, table: CalibrationTable) -> Self {
        Self {
            fields_out: config.chill.fields_out.clone(),
            extended_hsk: config.chill.extended_hsk,
            scan_types: config.chill.scan_types.clone(),
            site: config.radar.clone(),
            fallback_gate_spacing_m: config.target_gate_spacing_m,
            time_correction: config.time_correction_secs,
            table,
            reader: RayReader::default(),
            azimuth: AngleSmoother::default(),
            elevation: AngleSmoother::default(),
            calibration: None,
            saved: None,
            segment_name: UNSET_SEGMENT.to_string(),
            started: false,
            rejected: 0,
        }
    }

    /// How the calibration currently in use was selected.
    pub fn calibration_match(&self) -> Option<CalibrationMatch> {
        self.calibration.as_ref().map(|active| active.matched)
    }

    fn scan_type_index(&self) -> Option<i32> {
        let all = self.scan_types.first().map(String::as_str) == Some(ALL_SCAN_TYPES);
        if all || !self.extended_hsk {
            return Some(0);
        }
        self.scan_types
            .iter()
            .position(|name| *name == self.segment_name)
            .map(|index| index as i32)
    }

    fn beam_time(&self, hsk: &Housekeeping) -> GateResult<i64> {
        epoch_seconds(
            expand_year(hsk.year, 70),
            hsk.month,
            hsk.day,
            hsk.hour,
            hsk.minute,
            hsk.second,
        )
        .ok_or_else(|| {
            GateError::Framing(format!(
                "chill time {}/{}/{} {}:{}:{} invalid",
                hsk.year, hsk.month, hsk.day, hsk.hour, hsk.minute, hsk.second
            ))
        })
    }

    /// Rebuilds the reflectivity tables when the date or radar setup changed.
    fn refresh_calibration(&mut self, hsk: &Housekeeping, params: &ChillParams, time: i64) -> GateResult<()> {
        let key = CalibrationKey {
            year: expand_year(hsk.year, 70),
            month: hsk.month,
            day: hsk.day,
            bypass: params.bypass,
            pulse_len: params.pulse_len,
            gate_len: params.gate_len,
        };
        if self.calibration.as_ref().map(|active| active.key) == Some(key) {
            return Ok(());
        }
        let (entry, matched) = self.table.select(time).ok_or_else(|| {
            GateError::Calibration("calibration table is empty".into())
        })?;
        if let CalibrationMatch::Nearest { distance_secs } = matched {
            log::warn!(
                "chill: no calibration window covers {}, using entry {}s away",
                time,
                distance_secs
            );
        }
        let tables = ReflectivityCalibration::new(entry, params.pulse_len, params.bypass, params.gate_spacing_m);
        self.calibration = Some(ActiveCalibration { key, tables, matched });
        Ok(())
    }

    /// Smooths the antenna angles and splits the ray into its parts.
    fn next_ray(&mut self, source: &mut dyn RecordSource) -> GateResult<Option<(RawRay, Housekeeping)>> {
        while let Some(ray) = self.reader.next_ray(source)? {
            match Housekeeping::parse(&ray.bytes, ray.order) {
                Ok(mut hsk) => {
                    hsk.azimuth = self.azimuth.smooth(hsk.azimuth);
                    hsk.elevation = self.elevation.smooth(hsk.elevation);
                    return Ok(Some((ray, hsk)));
                }
                Err(err) => {
                    self.rejected += 1;
                    log::debug!("chill: {}", err);
                }
            }
        }
        Ok(None)
    }

    /// Consumes rays until the first one that can seed parameters and calibration.
    fn start(&mut self, source: &mut dyn RecordSource) -> GateResult<bool> {
        while let Some((ray, hsk)) = self.next_ray(source)? {
            if self.extended_hsk {
                if !hsk.is_extended() {
                    self.rejected += 1;
                    continue;
                }
                self.segment_name = hsk
                    .segment_name
                    .clone()
                    .unwrap_or_else(|| UNSET_SEGMENT.to_string());
                if self.scan_type_index().is_none() {
                    self.rejected += 1;
                    continue;
                }
            }
            let fields = match scan_fields(&ray.bytes, &hsk, ray.bytes.len()) {
                Ok(fields) if fields.iter().any(|block| block.matches("IP")) => fields,
                _ => {
                    self.rejected += 1;
                    continue;
                }
            };
            let time = match self.beam_time(&hsk) {
                Ok(time) => time,
                Err(_) => {
                    self.rejected += 1;
                    continue;
                }
            };
            let params = ChillParams::from_housekeeping(&hsk, &self.site, self.fallback_gate_spacing_m);
            self.refresh_calibration(&hsk, &params, time)?;
            log::info!(
                "chill: started on segment {} with fields {:?}",
                self.segment_name,
                fields.iter().map(FieldBlock::code_str).collect::<Vec<_>>()
            );
            self.saved = Some(params);
            self.started = true;
            return Ok(true);
        }
        Ok(false)
    }

    fn decode_ray(&mut self, ray: &RawRay, hsk: &Housekeeping) -> GateResult<ChillBeam> {
        let fields = scan_fields(&ray.bytes, hsk, ray.bytes.len())?;
        let ip = fields
            .iter()
            .find(|block| block.matches("IP"))
            .ok_or_else(|| GateError::Framing("chill ray without IP field".into()))?;

        let params = if hsk.is_extended() {
            self.segment_name = hsk
                .segment_name
                .clone()
                .unwrap_or_else(|| UNSET_SEGMENT.to_string());
            ChillParams::from_housekeeping(hsk, &self.site, self.fallback_gate_spacing_m)
        } else {
            match &self.saved {
                Some(saved) => saved.clone(),
                None => ChillParams::from_housekeeping(hsk, &self.site, self.fallback_gate_spacing_m),
            }
        };
        let time = self.beam_time(hsk)?;
        self.refresh_calibration(hsk, &params, time)?;
        self.saved = Some(params.clone());

        let scan_type = self.scan_type_index().ok_or_else(|| {
            GateError::Framing(format!("chill segment {} not configured", self.segment_name))
        })?;

        let txbin = match ip.txbin {
            Some(bin) if bin < MAX_HEADER_TXBIN => bin as usize,
            _ => DEFAULT_TXBIN,
        } + 1;
        let ngates = ip.gates.saturating_sub(txbin);

        let active = self
            .calibration
            .as_ref()
            .ok_or_else(|| GateError::Calibration("no calibration loaded".into()))?;
        let mut bytes = vec![0u8; self.fields_out.len() * ngates];
        let mut slots = Vec::with_capacity(self.fields_out.len());
        let mut field_scales = Vec::with_capacity(self.fields_out.len());
        for (index, code) in self.fields_out.iter().enumerate() {
            let scale = params.field_scale(code);
            field_scales.push(scale);
            let Some(block) = fields.iter().find(|block| block.matches(code)) else {
                slots.push(None);
                continue;
            };
            let start = block.start + block.header_words * 2 + txbin;
            let count = block.gates.saturating_sub(txbin).min(ngates);
            let source = ray.bytes.get(start..start + count).ok_or_else(|| {
                GateError::Framing(format!("chill {} block runs past ray end", code))
            })?;
            let row = &mut bytes[index * ngates..index * ngates + count];
            if code == "IP" {
                for (gate, (out, raw)) in row.iter_mut().zip(source).enumerate() {
                    *out = active.tables.quantize(*raw, gate, scale.scale, scale.bias);
                }
            } else {
                row.copy_from_slice(source);
            }
            slots.push(Some(index));
        }

        let elevation = hsk.elevation as f64 * CHILL_DEG_CONV;
        let target = match hsk.programmed_elevation {
            Some(programmed) => programmed as f64 * CHILL_DEG_CONV,
            None => elevation,
        };
        let header = BeamHeader {
            time: time + self.time_correction,
            azimuth_deg: normalize_azimuth(hsk.azimuth as f64 * CHILL_DEG_CONV),
            elevation_deg: signed_degrees(elevation),
            target_elevation_deg: signed_degrees(target),
            volume_num: hsk.volume_num,
            tilt_num: hsk.sweep_num,
            scan_mode: params.scan_mode,
            gate_spacing_m: params.gate_spacing_m,
            start_range_m: params.gate_spacing_m / 2.0,
        };

        Ok(ChillBeam {
            header,
            samples: GateSamples::with_slots(FieldLayout::Sequential, slots, ngates, bytes),
            segment_name: self.segment_name.clone(),
            scan_type,
            ray_number: hsk.ray_number,
            params,
            field_scales,
            calibration: active.matched,
        })
    }
}

fn signed_degrees(degrees: f64) -> f64 {
    if degrees > 180.0 {
        degrees - 360.0
    } else {
        degrees
    }
}

impl BeamDecoder for ChillDecoder {
    fn next_beam(&mut self, source: &mut dyn RecordSource) -> GateResult<Option<RawBeamRecord>> {
        if !self.started && !self.start(source)? {
            return Ok(None);
        }
        while let Some((ray, hsk)) = self.next_ray(source)? {
            match self.decode_ray(&ray, &hsk) {
                Ok(beam) => return Ok(Some(RawBeamRecord::Chill(beam))),
                Err(GateError::Framing(reason)) => {
                    self.rejected += 1;
                    log::debug!("chill: skipping ray {}: {}", hsk.ray_number, reason);
                }
                Err(other) => return Err(other),
            }
        }
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "chill"
    }

    fn resyncs(&self) -> u64 {
        self.rejected + self.reader.discarded_blocks()
    }
}

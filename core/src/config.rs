use crate::beam::ScanMode;
use crate::prelude::{GateError, GateResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Upper bound on output fields; `field_flag` is a 32-bit mask.
pub const MAX_FIELDS_OUT: usize = 16;
/// Compiled maximum of CHILL output fields.
pub const MAX_CHILL_FIELDS: usize = 8;
/// Field codes the CHILL decoder can load.
pub const CHILL_FIELD_CODES: [&str; 7] = ["IP", "VE", "DR", "DP", "RH", "R1", "R2"];
/// Wildcard scan type accepting every CHILL segment.
pub const ALL_SCAN_TYPES: &str = "ALL";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RadarFormat {
    Lincoln,
    #[default]
    Rp7,
    Chill,
    Lass,
    Alenia,
}

/// Static site description and defaults for formats without native values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RadarSite {
    pub radar_id: i32,
    pub altitude_m: f64,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub beam_width_deg: f64,
    pub pulse_width_us: f64,
    pub prf_hz: f64,
    pub wavelength_cm: f64,
    pub samples_per_beam: i32,
}

impl Default for RadarSite {
    fn default() -> Self {
        Self {
            radar_id: 0,
            altitude_m: 0.0,
            latitude_deg: 0.0,
            longitude_deg: 0.0,
            beam_width_deg: 1.0,
            pulse_width_us: 1.0,
            prf_hz: 1000.0,
            wavelength_cm: 10.0,
            samples_per_beam: 64,
        }
    }
}

/// Ordered list of expected elevation angles used to assign tilt numbers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ElevationTableConfig {
    pub enabled: bool,
    pub angles_deg: Vec<f64>,
}

/// CHILL rule marking the start of a volume.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VolumeStartRule {
    pub scan_type: String,
    pub tilt: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChillConfig {
    pub fields_out: Vec<String>,
    pub extended_hsk: bool,
    pub scan_types: Vec<String>,
    pub calibration_path: PathBuf,
    pub volume_start: Option<VolumeStartRule>,
}

impl Default for ChillConfig {
    fn default() -> Self {
        Self {
            fields_out: vec!["IP".into(), "VE".into()],
            extended_hsk: false,
            scan_types: vec![ALL_SCAN_TYPES.into()],
            calibration_path: PathBuf::from("chill_calib.txt"),
            volume_start: None,
        }
    }
}

/// Output quantization for the two LASS fields (dBZ, velocity).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LassConfig {
    pub dbz_scale: f64,
    pub dbz_bias: f64,
    pub vel_scale: f64,
    pub vel_bias: f64,
}

impl Default for LassConfig {
    fn default() -> Self {
        Self {
            dbz_scale: 0.5,
            dbz_bias: -30.0,
            vel_scale: 0.25,
            vel_bias: -32.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AleniaConfig {
    /// Forward-scan limit when resynchronizing; `None` scans to end of stream.
    pub max_resync_bytes: Option<u64>,
}

impl Default for AleniaConfig {
    fn default() -> Self {
        Self {
            max_resync_bytes: Some(1 << 20),
        }
    }
}

/// Immutable run configuration shared by every pipeline component.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GateConfig {
    pub format: RadarFormat,
    pub radar: RadarSite,
    pub ngates_out: usize,
    pub ngates_dropped: usize,
    /// Input field position feeding each output field (non-CHILL formats).
    pub out_field_pos: Vec<usize>,
    /// Expected native field count (RP7 validity rule).
    pub nfields_in: usize,
    pub target_scan_mode: Option<ScanMode>,
    pub check_gate_spacing: bool,
    pub target_gate_spacing_m: f64,
    pub time_correction_secs: i64,
    pub flush_final_beam: bool,
    pub elevation_table: ElevationTableConfig,
    pub chill: ChillConfig,
    pub lass: LassConfig,
    pub alenia: AleniaConfig,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            format: RadarFormat::default(),
            radar: RadarSite::default(),
            ngates_out: 512,
            ngates_dropped: 0,
            out_field_pos: vec![0, 1],
            nfields_in: 2,
            target_scan_mode: None,
            check_gate_spacing: false,
            target_gate_spacing_m: 150.0,
            time_correction_secs: 0,
            flush_final_beam: false,
            elevation_table: ElevationTableConfig::default(),
            chill: ChillConfig::default(),
            lass: LassConfig::default(),
            alenia: AleniaConfig::default(),
        }
    }
}

impl GateConfig {
    pub fn nfields_out(&self) -> usize {
        match self.format {
            RadarFormat::Chill => self.chill.fields_out.len(),
            _ => self.out_field_pos.len(),
        }
    }

    /// Largest input position a format can carry, if it is fixed.
    fn max_input_fields(&self) -> Option<usize> {
        match self.format {
            RadarFormat::Lass => Some(2),
            RadarFormat::Alenia => Some(4),
            RadarFormat::Rp7 => Some(self.nfields_in),
            _ => None,
        }
    }

    pub fn validate(&self) -> GateResult<()> {
        if self.ngates_out == 0 {
            return Err(GateError::Config("ngates_out must be positive".into()));
        }
        let nfields = self.nfields_out();
        if nfields == 0 || nfields > MAX_FIELDS_OUT {
            return Err(GateError::Config(format!(
                "nfields_out {} outside 1..={}",
                nfields, MAX_FIELDS_OUT
            )));
        }
        if self.format == RadarFormat::Chill {
            if self.chill.fields_out.len() > MAX_CHILL_FIELDS {
                return Err(GateError::Config(format!(
                    "too many CHILL fields: {} > {}",
                    self.chill.fields_out.len(),
                    MAX_CHILL_FIELDS
                )));
            }
            if let Some(code) = self
                .chill
                .fields_out
                .iter()
                .find(|code| !CHILL_FIELD_CODES.contains(&code.as_str()))
            {
                return Err(GateError::Config(format!("unknown CHILL field code {code}")));
            }
            if self.chill.scan_types.is_empty() {
                return Err(GateError::Config("no CHILL scan types listed".into()));
            }
        } else if let Some(max) = self.max_input_fields() {
            if let Some(pos) = self.out_field_pos.iter().find(|&&pos| pos >= max) {
                return Err(GateError::Config(format!(
                    "output field position {} beyond {} input fields",
                    pos, max
                )));
            }
        }
        if self.elevation_table.enabled && self.elevation_table.angles_deg.is_empty() {
            return Err(GateError::Config("elevation table enabled but empty".into()));
        }
        Ok(())
    }
}

use crate::beam::ScanMode;
use crate::formats::alenia::AleniaBeam;
use crate::formats::chill::ChillBeam;
use crate::formats::lass::LassBeam;
use crate::formats::lincoln::LincolnBeam;
use crate::formats::rp7::Rp7Beam;
use serde::{Deserialize, Serialize};

/// Scalar beam description shared by every input format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeamHeader {
    /// Unix seconds, after any configured time correction.
    pub time: i64,
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
    pub target_elevation_deg: f64,
    pub volume_num: i32,
    pub tilt_num: i32,
    pub scan_mode: ScanMode,
    pub gate_spacing_m: f64,
    pub start_range_m: f64,
}

impl BeamHeader {
    /// Gate spacing rounded to whole millimetres, as used by the validity check.
    pub fn gate_spacing_mm(&self) -> i64 {
        (self.gate_spacing_m * 1000.0).round() as i64
    }
}

/// How the per-gate samples of several fields are arranged in a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldLayout {
    /// All fields for gate `g` are contiguous.
    Interleaved,
    /// All gates for field `f` are contiguous.
    Sequential,
}

/// 8-bit samples of one beam in the decoder's native layout.
#[derive(Debug, Clone, PartialEq)]
pub struct GateSamples {
    pub layout: FieldLayout,
    pub ngates: usize,
    /// Number of fields physically stored (the interleave stride).
    pub nfields: usize,
    /// Maps an input field position to its physical slot, `None` if absent.
    slots: Vec<Option<usize>>,
    pub bytes: Vec<u8>,
}

impl GateSamples {
    /// Every input position is stored, in order.
    pub fn new(layout: FieldLayout, nfields: usize, ngates: usize, bytes: Vec<u8>) -> Self {
        Self {
            layout,
            ngates,
            nfields,
            slots: (0..nfields).map(Some).collect(),
            bytes,
        }
    }

    /// Some input positions are absent from this record.
    pub fn with_slots(
        layout: FieldLayout,
        slots: Vec<Option<usize>>,
        ngates: usize,
        bytes: Vec<u8>,
    ) -> Self {
        let nfields = slots.iter().flatten().count();
        Self {
            layout,
            ngates,
            nfields,
            slots,
            bytes,
        }
    }

    pub fn slot(&self, position: usize) -> Option<usize> {
        self.slots.get(position).copied().flatten()
    }

    pub fn is_present(&self, position: usize) -> bool {
        self.slot(position).is_some()
    }

    /// Sample for a physical slot and gate; zero when the record is short.
    pub fn sample(&self, slot: usize, gate: usize) -> u8 {
        let index = match self.layout {
            FieldLayout::Interleaved => gate * self.nfields + slot,
            FieldLayout::Sequential => slot * self.ngates + gate,
        };
        self.bytes.get(index).copied().unwrap_or(0)
    }

    /// Contiguous gates of one slot in a field-sequential record.
    pub fn field_run(&self, slot: usize, first_gate: usize, count: usize) -> &[u8] {
        let start = (slot * self.ngates + first_gate).min(self.bytes.len());
        let end = (start + count).min(self.bytes.len());
        &self.bytes[start..end]
    }
}

/// One decoded physical beam, tagged by the format that produced it.
#[derive(Debug, Clone)]
pub enum RawBeamRecord {
    Lincoln(LincolnBeam),
    Rp7(Rp7Beam),
    Chill(ChillBeam),
    Lass(LassBeam),
    Alenia(AleniaBeam),
}

impl RawBeamRecord {
    pub fn header(&self) -> &BeamHeader {
        match self {
            RawBeamRecord::Lincoln(beam) => &beam.header,
            RawBeamRecord::Rp7(beam) => &beam.header,
            RawBeamRecord::Chill(beam) => &beam.header,
            RawBeamRecord::Lass(beam) => &beam.header,
            RawBeamRecord::Alenia(beam) => &beam.header,
        }
    }

    pub fn samples(&self) -> &GateSamples {
        match self {
            RawBeamRecord::Lincoln(beam) => &beam.samples,
            RawBeamRecord::Rp7(beam) => &beam.samples,
            RawBeamRecord::Chill(beam) => &beam.samples,
            RawBeamRecord::Lass(beam) => &beam.samples,
            RawBeamRecord::Alenia(beam) => &beam.samples,
        }
    }

    /// Scan segment name; only CHILL records carry one.
    pub fn segment_name(&self) -> Option<&str> {
        match self {
            RawBeamRecord::Chill(beam) => Some(beam.segment_name.as_str()),
            _ => None,
        }
    }

    /// Number of input fields the record claims to carry.
    pub fn native_field_count(&self) -> usize {
        match self {
            RawBeamRecord::Lincoln(beam) => beam.field_scales.len(),
            RawBeamRecord::Rp7(beam) => beam.fields.len(),
            other => other.samples().nfields,
        }
    }

    /// Gates already removed by the decoder, so the loader must not drop them again.
    pub fn pre_trimmed(&self) -> bool {
        matches!(self, RawBeamRecord::Chill(_))
    }
}

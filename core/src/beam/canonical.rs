use crate::beam::ScanMode;
use ndarray::Array2;

/// Fixed-layout beam kept by the stream driver until its successor is seen.
///
/// `gate_data` has one row per configured output field (field-sequential);
/// rows whose bit is clear in `field_flag` stay zero.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalBeam {
    pub time: i64,
    /// Microdegrees.
    pub azimuth: i32,
    pub elevation: i32,
    pub target_elevation: i32,
    pub volume_num: i32,
    pub tilt_num: i32,
    pub scan_mode: ScanMode,
    pub segment_name: Option<String>,
    pub end_of_tilt: bool,
    pub end_of_volume: bool,
    pub new_scan_limits: bool,
    pub field_flag: u32,
    pub gate_data: Array2<u8>,
}

impl CanonicalBeam {
    pub fn new(nfields_out: usize, ngates_out: usize) -> Self {
        Self {
            time: 0,
            azimuth: 0,
            elevation: 0,
            target_elevation: 0,
            volume_num: 0,
            tilt_num: 0,
            scan_mode: ScanMode::Unknown,
            segment_name: None,
            end_of_tilt: false,
            end_of_volume: false,
            new_scan_limits: false,
            field_flag: 0,
            gate_data: Array2::zeros((nfields_out, ngates_out)),
        }
    }

    pub fn ngates(&self) -> usize {
        self.gate_data.ncols()
    }

    pub fn nfields_current(&self) -> usize {
        self.field_flag.count_ones() as usize
    }

    pub fn field_active(&self, field: usize) -> bool {
        field < 32 && self.field_flag & (1 << field) != 0
    }

    /// Active rows packed in output order, as carried in a gate-data packet.
    pub fn packed_gates(&self) -> Vec<u8> {
        let mut packed = Vec::with_capacity(self.nfields_current() * self.ngates());
        for (field, row) in self.gate_data.rows().into_iter().enumerate() {
            if self.field_active(field) {
                packed.extend(row.iter().copied());
            }
        }
        packed
    }

    pub fn clear_flags(&mut self) {
        self.end_of_tilt = false;
        self.end_of_volume = false;
        self.new_scan_limits = false;
    }
}

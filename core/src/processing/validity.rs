use crate::beam::{RawBeamRecord, ScanMode};
use crate::config::GateConfig;

/// Why a decodable beam is excluded from the output stream.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    #[error("scan mode {found:?} but {wanted:?} requested")]
    ScanMode { found: ScanMode, wanted: ScanMode },
    #[error("gate spacing {found_mm} mm but {wanted_mm} mm requested")]
    GateSpacing { found_mm: i64, wanted_mm: i64 },
    #[error("{found} fields but {wanted} expected")]
    FieldCount { found: usize, wanted: usize },
}

/// First acceptance rule the beam fails, if any.
pub fn check(raw: &RawBeamRecord, config: &GateConfig) -> Option<Rejection> {
    let header = raw.header();
    if let Some(wanted) = config.target_scan_mode {
        let exempt = matches!(raw, RawBeamRecord::Alenia(_));
        if !exempt && header.scan_mode != wanted {
            return Some(Rejection::ScanMode {
                found: header.scan_mode,
                wanted,
            });
        }
    }
    if config.check_gate_spacing {
        let wanted_mm = (config.target_gate_spacing_m * 1000.0).round() as i64;
        let found_mm = header.gate_spacing_mm();
        if found_mm != wanted_mm {
            return Some(Rejection::GateSpacing { found_mm, wanted_mm });
        }
    }
    if let RawBeamRecord::Rp7(_) = raw {
        let found = raw.native_field_count();
        if found != config.nfields_in {
            return Some(Rejection::FieldCount {
                found,
                wanted: config.nfields_in,
            });
        }
    }
    None
}

pub fn is_valid(raw: &RawBeamRecord, config: &GateConfig) -> bool {
    check(raw, config).is_none()
}

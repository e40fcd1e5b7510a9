pub mod canonical;
pub mod raw;

pub use canonical::CanonicalBeam;
pub use raw::{BeamHeader, FieldLayout, GateSamples, RawBeamRecord};

use serde::{Deserialize, Serialize};

/// Antenna scan strategy, as reported by the record or requested in config.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    Surveillance,
    Sector,
    Rhi,
    #[default]
    Unknown,
}

impl ScanMode {
    /// Code carried in the gate-data parameter packet.
    pub fn wire_code(self) -> i32 {
        match self {
            ScanMode::Sector => 1,
            ScanMode::Rhi => 3,
            ScanMode::Surveillance => 8,
            ScanMode::Unknown => -1,
        }
    }

    pub fn from_wire_code(code: i32) -> Self {
        match code {
            1 => ScanMode::Sector,
            3 => ScanMode::Rhi,
            8 => ScanMode::Surveillance,
            _ => ScanMode::Unknown,
        }
    }
}

/// Degrees to the fixed-point microdegree representation used on the wire.
pub fn to_micro_degrees(degrees: f64) -> i32 {
    (degrees * 1.0e6).round() as i32
}

/// Folds an azimuth into `[0, 360)`.
pub fn normalize_azimuth(degrees: f64) -> f64 {
    let folded = degrees.rem_euclid(360.0);
    if folded >= 360.0 {
        0.0
    } else {
        folded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_mode_codes_are_stable() {
        for mode in [ScanMode::Surveillance, ScanMode::Sector, ScanMode::Rhi] {
            assert_eq!(ScanMode::from_wire_code(mode.wire_code()), mode);
        }
        assert_eq!(ScanMode::from_wire_code(42), ScanMode::Unknown);
    }

    #[test]
    fn micro_degrees_round_to_nearest() {
        assert_eq!(to_micro_degrees(10.5), 10_500_000);
        assert_eq!(to_micro_degrees(-0.0000005), -1);
        assert_eq!(normalize_azimuth(-10.0), 350.0);
        assert_eq!(normalize_azimuth(360.0), 0.0);
    }
}

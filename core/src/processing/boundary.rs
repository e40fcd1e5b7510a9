use crate::beam::CanonicalBeam;
use crate::config::{GateConfig, RadarFormat, VolumeStartRule, ALL_SCAN_TYPES};

/// Sets the end-of-tilt and end-of-volume flags of a beam once its
/// successor is known.
#[derive(Debug, Clone, Default)]
pub struct BoundaryTracker {
    volume_start: Option<VolumeStartRule>,
}

impl BoundaryTracker {
    pub fn new(config: &GateConfig) -> Self {
        let volume_start = match config.format {
            RadarFormat::Chill => config.chill.volume_start.clone(),
            _ => None,
        };
        Self { volume_start }
    }

    fn starts_volume(rule: &VolumeStartRule, current: &CanonicalBeam) -> bool {
        current.tilt_num == rule.tilt
            && (rule.scan_type == ALL_SCAN_TYPES
                || current.segment_name.as_deref() == Some(rule.scan_type.as_str()))
    }

    /// Flags `previous` against `current`; returns whether a tilt ended.
    pub fn set_beam_flags(&self, previous: &mut CanonicalBeam, current: &CanonicalBeam) -> bool {
        previous.end_of_tilt = previous.tilt_num != current.tilt_num;
        previous.end_of_volume = match &self.volume_start {
            Some(rule) => previous.end_of_tilt && Self::starts_volume(rule, current),
            None => previous.volume_num != current.volume_num,
        };
        previous.new_scan_limits =
            previous.end_of_volume || previous.scan_mode != current.scan_mode;
        previous.end_of_tilt
    }
}

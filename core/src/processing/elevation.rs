use crate::beam::CanonicalBeam;
use crate::config::ElevationTableConfig;

/// Assigns tilt numbers from the nearest expected elevation angle, for
/// formats that do not record them. The volume counter advances whenever
/// the tilt wraps from a nonzero index back to zero.
#[derive(Debug, Clone)]
pub struct ElevationTable {
    angles_deg: Vec<f64>,
    volume_num: i32,
    last_tilt: Option<i32>,
}

impl ElevationTable {
    pub fn new(angles_deg: Vec<f64>) -> Self {
        Self {
            angles_deg,
            volume_num: 0,
            last_tilt: None,
        }
    }

    /// `None` unless the table is enabled and non-empty.
    pub fn from_config(config: &ElevationTableConfig) -> Option<Self> {
        (config.enabled && !config.angles_deg.is_empty())
            .then(|| Self::new(config.angles_deg.clone()))
    }

    pub fn nearest_tilt(&self, elevation_deg: f64) -> i32 {
        self.angles_deg
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                (*a - elevation_deg)
                    .abs()
                    .total_cmp(&(*b - elevation_deg).abs())
            })
            .map(|(index, _)| index as i32)
            .unwrap_or(0)
    }

    /// Returns `(tilt_num, volume_num)` for the next beam.
    pub fn assign(&mut self, elevation_deg: f64) -> (i32, i32) {
        let tilt = self.nearest_tilt(elevation_deg);
        if matches!(self.last_tilt, Some(last) if last != 0) && tilt == 0 {
            self.volume_num += 1;
        }
        self.last_tilt = Some(tilt);
        (tilt, self.volume_num)
    }

    pub fn apply(&mut self, beam: &mut CanonicalBeam) {
        let (tilt, volume) = self.assign(beam.elevation as f64 / 1.0e6);
        beam.tilt_num = tilt;
        beam.volume_num = volume;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_angle_wins() {
        let table = ElevationTable::new(vec![0.5, 1.5, 2.4, 3.4]);
        assert_eq!(table.nearest_tilt(0.1), 0);
        assert_eq!(table.nearest_tilt(2.0), 2);
        assert_eq!(table.nearest_tilt(19.0), 3);
    }

    #[test]
    fn volume_advances_on_wrap_to_first_tilt() {
        let mut table = ElevationTable::new(vec![0.5, 1.5, 2.5]);
        let assigned: Vec<(i32, i32)> = [0.5, 0.5, 1.5, 2.5, 0.5, 0.6, 1.4]
            .iter()
            .map(|&elevation| table.assign(elevation))
            .collect();
        assert_eq!(
            assigned,
            vec![(0, 0), (0, 0), (1, 0), (2, 0), (0, 1), (0, 1), (1, 1)]
        );
    }

    #[test]
    fn disabled_table_is_not_built() {
        let config = ElevationTableConfig {
            enabled: false,
            angles_deg: vec![0.5],
        };
        assert!(ElevationTable::from_config(&config).is_none());
    }

    #[test]
    fn apply_uses_beam_elevation() {
        let mut table = ElevationTable::new(vec![0.5, 1.5]);
        let mut beam = CanonicalBeam::new(1, 1);
        beam.elevation = 1_450_000;
        table.apply(&mut beam);
        assert_eq!(beam.tilt_num, 1);
    }
}

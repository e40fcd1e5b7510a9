use crate::beam::CanonicalBeam;
use crate::telemetry::metrics::StreamStats;
use log::info;

/// Periodic diagnostic lines for transmitted beams.
///
/// An interval of zero disables that kind of line.
#[derive(Debug, Clone, Default)]
pub struct BeamPrinter {
    header_every: u64,
    summary_every: u64,
    beams: u64,
}

impl BeamPrinter {
    pub fn new(header_every: u64, summary_every: u64) -> Self {
        Self {
            header_every,
            summary_every,
            beams: 0,
        }
    }

    fn due(every: u64, count: u64) -> bool {
        every > 0 && count % every == 0
    }

    pub fn header_line(beam: &CanonicalBeam) -> String {
        let stamp = chrono::DateTime::from_timestamp(beam.time, 0)
            .map(|time| time.format("%Y/%m/%d %H:%M:%S").to_string())
            .unwrap_or_else(|| beam.time.to_string());
        format!(
            "{} vol {} tilt {} az {:7.2} el {:6.2} fields {:#06x}{}{}",
            stamp,
            beam.volume_num,
            beam.tilt_num,
            beam.azimuth as f64 / 1.0e6,
            beam.elevation as f64 / 1.0e6,
            beam.field_flag,
            if beam.end_of_tilt { " EOT" } else { "" },
            if beam.end_of_volume { " EOV" } else { "" },
        )
    }

    /// Returns the lines logged for this beam.
    pub fn observe(&mut self, beam: &CanonicalBeam, stats: &StreamStats) -> Vec<String> {
        self.beams += 1;
        let mut lines = Vec::new();
        if Self::due(self.header_every, self.beams) {
            lines.push(Self::header_line(beam));
        }
        if Self::due(self.summary_every, self.beams) {
            lines.push(format!(
                "beams {} valid {} invalid {} sent {} dropped {}",
                stats.beams_decoded,
                stats.beams_valid,
                stats.beams_invalid,
                stats.data_packets_sent,
                stats.packets_dropped
            ));
        }
        for line in &lines {
            info!("{}", line);
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prints_on_interval() {
        let mut printer = BeamPrinter::new(2, 3);
        let beam = CanonicalBeam::new(1, 1);
        let stats = StreamStats::default();
        let counts: Vec<usize> = (0..6).map(|_| printer.observe(&beam, &stats).len()).collect();
        assert_eq!(counts, vec![0, 1, 1, 1, 0, 2]);
    }

    #[test]
    fn header_line_shows_boundaries() {
        let mut beam = CanonicalBeam::new(1, 1);
        beam.time = 0;
        beam.azimuth = 10_500_000;
        beam.end_of_tilt = true;
        let line = BeamPrinter::header_line(&beam);
        assert!(line.starts_with("1970/01/01 00:00:00"));
        assert!(line.contains("10.50"));
        assert!(line.ends_with("EOT"));
    }

    #[test]
    fn zero_interval_is_silent() {
        let mut printer = BeamPrinter::default();
        assert!(printer
            .observe(&CanonicalBeam::new(1, 1), &StreamStats::default())
            .is_empty());
    }
}

//! One-beam-lookahead stream driver.
//!
//! A beam is transmitted only once its successor has been decoded, because
//! its end-of-tilt and end-of-volume flags depend on the next beam.

use crate::beam::{CanonicalBeam, RawBeamRecord};
use crate::config::GateConfig;
use crate::formats::build_decoder;
use crate::prelude::{BeamDecoder, GateError, GateResult, PacketSink, RecordSource};
use crate::processing::{load_beam, validity, BoundaryTracker, ElevationTable, ParamSynchronizer};
use crate::telemetry::{BeamPrinter, PacketKind, StatsRecorder, StreamStats};
use crate::transmit::FrameEncoder;
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Uninitialized,
    Streaming,
    Done,
}

/// Counts records as the decoder pulls them.
struct CountingSource<'a> {
    inner: &'a mut dyn RecordSource,
    stats: &'a StatsRecorder,
}

impl RecordSource for CountingSource<'_> {
    fn read_record(&mut self) -> GateResult<Option<Vec<u8>>> {
        let record = self.inner.read_record()?;
        if record.is_some() {
            self.stats.record_read();
        }
        Ok(record)
    }

    fn file_number(&self) -> usize {
        self.inner.file_number()
    }
}

pub struct StreamDriver {
    config: GateConfig,
    decoder: Box<dyn BeamDecoder>,
    params: ParamSynchronizer,
    boundary: BoundaryTracker,
    elevation: Option<ElevationTable>,
    encoder: FrameEncoder,
    previous: CanonicalBeam,
    current: CanonicalBeam,
    prev_valid: bool,
    state: DriverState,
    stats: StatsRecorder,
    printer: BeamPrinter,
    shutdown: Arc<AtomicBool>,
}

impl StreamDriver {
    /// Validates the configuration and builds the matching decoder.
    pub fn from_config(config: GateConfig) -> GateResult<Self> {
        config.validate()?;
        let decoder = build_decoder(&config)?;
        Ok(Self::with_decoder(config, decoder))
    }

    pub fn with_decoder(config: GateConfig, decoder: Box<dyn BeamDecoder>) -> Self {
        let nfields = config.nfields_out();
        Self {
            params: ParamSynchronizer::new(),
            boundary: BoundaryTracker::new(&config),
            elevation: ElevationTable::from_config(&config.elevation_table),
            encoder: FrameEncoder::new(),
            previous: CanonicalBeam::new(nfields, config.ngates_out),
            current: CanonicalBeam::new(nfields, config.ngates_out),
            prev_valid: false,
            state: DriverState::Uninitialized,
            stats: StatsRecorder::new(),
            printer: BeamPrinter::default(),
            shutdown: Arc::new(AtomicBool::new(false)),
            decoder,
            config,
        }
    }

    pub fn with_printer(mut self, printer: BeamPrinter) -> Self {
        self.printer = printer;
        self
    }

    /// Flag checked between records; setting it ends the run.
    pub fn with_shutdown(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn stats(&self) -> StreamStats {
        self.stats.snapshot()
    }

    /// Runs until the source is exhausted or shutdown is requested.
    pub fn run(
        &mut self,
        source: &mut dyn RecordSource,
        sink: &mut dyn PacketSink,
    ) -> GateResult<StreamStats> {
        info!("streaming {} beams", self.decoder.name());
        while self.step(source, sink)? != DriverState::Done {}
        let stats = self.stats();
        info!("stream finished: {}", stats.to_json());
        Ok(stats)
    }

    /// Decodes one beam and advances the state machine.
    pub fn step(
        &mut self,
        source: &mut dyn RecordSource,
        sink: &mut dyn PacketSink,
    ) -> GateResult<DriverState> {
        if self.state == DriverState::Done {
            return Ok(DriverState::Done);
        }
        if self.shutdown.load(Ordering::Relaxed) {
            info!("shutdown requested");
            self.state = DriverState::Done;
            return Ok(self.state);
        }

        let mut counted = CountingSource {
            inner: source,
            stats: &self.stats,
        };
        let next = self.decoder.next_beam(&mut counted)?;
        self.stats.set_resyncs(self.decoder.resyncs());
        let Some(raw) = next else {
            self.finish(sink)?;
            return Ok(self.state);
        };

        let rejection = validity::check(&raw, &self.config);
        if let Some(reason) = &rejection {
            debug!("{} beam rejected: {}", self.decoder.name(), reason);
        }
        let valid = rejection.is_none();
        self.stats.record_beam(valid);

        match (self.state, valid, self.prev_valid) {
            (DriverState::Uninitialized, false, _) => {}
            (DriverState::Uninitialized, true, _) => {
                self.params.update(&raw, &self.config);
                self.send_params(sink)?;
                self.load_current(&raw)?;
                self.prev_valid = true;
                self.state = DriverState::Streaming;
            }
            (_, _, true) => {
                std::mem::swap(&mut self.previous, &mut self.current);
                let changed = self.params.update(&raw, &self.config);
                self.load_current(&raw)?;
                let end_of_tilt = self.boundary.set_beam_flags(&mut self.previous, &self.current);
                self.send_previous(sink)?;
                if changed || end_of_tilt {
                    self.send_params(sink)?;
                }
                self.prev_valid = valid;
            }
            (_, true, false) => {
                if self.params.update(&raw, &self.config) {
                    self.send_params(sink)?;
                }
                self.load_current(&raw)?;
                self.prev_valid = true;
            }
            (_, false, false) => {}
        }
        Ok(self.state)
    }

    fn finish(&mut self, sink: &mut dyn PacketSink) -> GateResult<()> {
        if self.config.flush_final_beam && self.prev_valid {
            std::mem::swap(&mut self.previous, &mut self.current);
            self.previous.end_of_tilt = true;
            self.previous.end_of_volume = true;
            self.previous.new_scan_limits = true;
            self.send_previous(sink)?;
            self.prev_valid = false;
        }
        self.state = DriverState::Done;
        Ok(())
    }

    fn load_current(&mut self, raw: &RawBeamRecord) -> GateResult<()> {
        let params = self
            .params
            .current()
            .ok_or_else(|| GateError::Fatal("beam loaded before any parameter block".into()))?;
        load_beam(raw, params, &self.config, true, &mut self.current);
        if let Some(table) = self.elevation.as_mut() {
            table.apply(&mut self.current);
        }
        Ok(())
    }

    fn send_params(&mut self, sink: &mut dyn PacketSink) -> GateResult<()> {
        let Some(block) = self.params.current() else {
            return Ok(());
        };
        let frame = self.encoder.params_frame(block);
        let delivered = sink.send(&frame)?;
        self.stats.record_packet(PacketKind::Params, delivered);
        Ok(())
    }

    fn send_previous(&mut self, sink: &mut dyn PacketSink) -> GateResult<()> {
        let frame = self.encoder.beam_frame(&self.previous);
        let delivered = sink.send(&frame)?;
        self.stats.record_packet(PacketKind::Data, delivered);
        let stats = self.stats.snapshot();
        self.printer.observe(&self.previous, &stats);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beam::ScanMode;
    use crate::formats::rp7::Rp7Decoder;
    use crate::formats::testdata::rp7_beam;
    use crate::source::MemorySource;
    use crate::transmit::wire::{decode_beam, decode_frame, decode_params};
    use crate::transmit::{RecordingSink, GATE_DATA_PACKET as D, GATE_PARAMS_PACKET as P};

    fn rp7_config() -> GateConfig {
        GateConfig {
            nfields_in: 4,
            out_field_pos: vec![0, 2],
            ngates_out: 6,
            check_gate_spacing: true,
            target_gate_spacing_m: 150.0,
            ..Default::default()
        }
    }

    fn tape(beams: &[(i32, f64, usize)]) -> MemorySource {
        MemorySource::new(
            beams
                .iter()
                .map(|&(tilt, azimuth, nfields)| rp7_beam(tilt, azimuth, nfields, 4).encode().unwrap())
                .collect(),
        )
    }

    fn run(config: GateConfig, mut source: MemorySource) -> (RecordingSink, StreamStats) {
        let decoder = Box::new(Rp7Decoder::new(&config));
        let mut driver = StreamDriver::with_decoder(config, decoder);
        let mut sink = RecordingSink::default();
        let stats = driver.run(&mut source, &mut sink).unwrap();
        assert_eq!(driver.state(), DriverState::Done);
        (sink, stats)
    }

    fn beam_packets(sink: &RecordingSink) -> Vec<crate::transmit::wire::BeamPacket> {
        sink.frames
            .iter()
            .filter_map(|frame| decode_frame(frame).ok())
            .filter(|(header, _)| header.packet_type == D)
            .map(|(_, payload)| decode_beam(payload).unwrap())
            .collect()
    }

    #[test]
    fn tilt_change_flushes_beam_and_resends_params() {
        let (sink, stats) = run(rp7_config(), tape(&[(5, 10.0, 4), (5, 10.5, 4), (6, 11.0, 4)]));
        assert_eq!(sink.packet_types(), vec![P, D, D, P]);

        let beams = beam_packets(&sink);
        assert_eq!(beams[0].azimuth, 10_000_000);
        assert!(!beams[0].end_of_tilt);
        assert_eq!(beams[1].azimuth, 10_500_000);
        assert!(beams[1].end_of_tilt);
        assert_eq!(beams[0].scan_mode, ScanMode::Surveillance);

        // fields 0 and 2 of the interleaved input, four gates padded to six
        let tilt = 5u8;
        assert_eq!(
            beams[0].gates,
            vec![tilt, tilt + 1, tilt + 2, tilt + 3, 0, 0, 80 + tilt, 81 + tilt, 82 + tilt, 83 + tilt, 0, 0]
        );
        assert_eq!(stats.records_read, 3);
        assert_eq!(stats.data_packets_sent, 2);
        assert_eq!(stats.param_packets_sent, 2);
    }

    #[test]
    fn sequence_numbers_span_both_packet_types() {
        let (sink, _) = run(rp7_config(), tape(&[(5, 10.0, 4), (5, 10.5, 4), (6, 11.0, 4)]));
        let seqs: Vec<u32> = sink
            .frames
            .iter()
            .map(|frame| decode_frame(frame).unwrap().0.seq)
            .collect();
        assert_eq!(seqs, vec![0, 1, 2, 3]);
        let (_, payload) = decode_frame(&sink.frames[0]).unwrap();
        let block = decode_params(payload).unwrap();
        assert_eq!(block.nfields_out, 2);
        assert_eq!(block.field_flag, 0b11);
    }

    #[test]
    fn invalid_beams_before_first_valid_are_skipped() {
        let (sink, stats) = run(rp7_config(), tape(&[(1, 0.0, 3), (1, 1.0, 3), (2, 2.0, 4), (2, 3.0, 4)]));
        assert_eq!(sink.packet_types(), vec![P, D]);
        assert_eq!(beam_packets(&sink)[0].azimuth, 2_000_000);
        assert_eq!(stats.beams_invalid, 2);
        assert_eq!(stats.beams_valid, 2);
    }

    #[test]
    fn invalid_beam_closes_previous_but_is_not_sent() {
        let (sink, stats) = run(
            rp7_config(),
            tape(&[(1, 0.0, 4), (2, 1.0, 3), (2, 2.0, 4), (2, 3.0, 4)]),
        );
        let beams = beam_packets(&sink);
        let azimuths: Vec<i32> = beams.iter().map(|beam| beam.azimuth).collect();
        assert_eq!(azimuths, vec![0, 2_000_000]);
        assert!(beams[0].end_of_tilt);
        assert!(!beams[1].end_of_tilt);
        assert_eq!(stats.beams_invalid, 1);
    }

    #[test]
    fn valid_beam_after_invalid_one_resends_its_params_first() {
        let mut wide = rp7_beam(1, 1.0, 4, 4);
        wide.header.gate_spacing_m = 300.0;
        let source = MemorySource::new(vec![
            rp7_beam(1, 0.0, 4, 4).encode().unwrap(),
            wide.encode().unwrap(),
            rp7_beam(1, 2.0, 4, 4).encode().unwrap(),
            rp7_beam(1, 3.0, 4, 4).encode().unwrap(),
        ]);
        let (sink, stats) = run(rp7_config(), source);
        assert_eq!(sink.packet_types(), vec![P, D, P, P, D]);

        let azimuths: Vec<i32> = beam_packets(&sink).iter().map(|beam| beam.azimuth).collect();
        assert_eq!(azimuths, vec![0, 2_000_000]);

        let spacings: Vec<i32> = sink
            .frames
            .iter()
            .map(|frame| decode_frame(frame).unwrap())
            .filter(|(header, _)| header.packet_type == P)
            .map(|(_, payload)| decode_params(payload).unwrap().gate_spacing)
            .collect();
        assert_eq!(spacings, vec![150_000, 300_000, 150_000]);
        assert_eq!(stats.beams_invalid, 1);
    }

    #[test]
    fn final_beam_is_held_unless_flush_configured() {
        let beams = [(5, 10.0, 4), (5, 10.5, 4)];
        let (sink, _) = run(rp7_config(), tape(&beams));
        assert_eq!(beam_packets(&sink).len(), 1);

        let config = GateConfig {
            flush_final_beam: true,
            ..rp7_config()
        };
        let (sink, _) = run(config, tape(&beams));
        let sent = beam_packets(&sink);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].azimuth, 10_500_000);
        assert!(sent[1].end_of_tilt && sent[1].end_of_volume);
    }

    #[test]
    fn disconnected_sink_drops_packets_and_keeps_going() {
        let config = rp7_config();
        let decoder = Box::new(Rp7Decoder::new(&config));
        let mut driver = StreamDriver::with_decoder(config, decoder);
        let mut sink = RecordingSink {
            connected: false,
            ..Default::default()
        };
        let stats = driver
            .run(&mut tape(&[(5, 10.0, 4), (5, 10.5, 4), (6, 11.0, 4)]), &mut sink)
            .unwrap();
        assert!(sink.frames.is_empty());
        assert_eq!(stats.packets_dropped, 4);
    }

    #[test]
    fn shutdown_flag_stops_before_reading() {
        let config = rp7_config();
        let flag = Arc::new(AtomicBool::new(true));
        let decoder = Box::new(Rp7Decoder::new(&config));
        let mut driver = StreamDriver::with_decoder(config, decoder).with_shutdown(flag);
        let mut source = tape(&[(5, 10.0, 4)]);
        let mut sink = RecordingSink::default();
        assert_eq!(driver.step(&mut source, &mut sink).unwrap(), DriverState::Done);
        assert_eq!(source.remaining(), 1);
    }

    #[test]
    fn elevation_table_renumbers_tilts() {
        let mut config = rp7_config();
        config.elevation_table.enabled = true;
        config.elevation_table.angles_deg = vec![0.5, 1.5];
        let (sink, _) = run(config, tape(&[(7, 10.0, 4), (9, 10.5, 4), (9, 11.0, 4)]));
        let beams = beam_packets(&sink);
        assert!(beams.iter().all(|beam| beam.tilt_num == 0));
        assert!(!beams[0].end_of_tilt);
        assert_eq!(sink.packet_types(), vec![P, D, D]);
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let config = GateConfig {
            ngates_out: 0,
            ..Default::default()
        };
        assert!(matches!(StreamDriver::from_config(config), Err(GateError::Config(_))));
    }
}

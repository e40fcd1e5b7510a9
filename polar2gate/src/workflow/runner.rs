use crate::generator::profile::build_tape;
use crate::workflow::config::{DeviceKind, WorkflowConfig};
use anyhow::Context;
use gatecore::prelude::{PacketSink, RecordSource};
use gatecore::source::{list_files, DiskImageSource, FileSummary, MemorySource, TapeDevice};
use gatecore::telemetry::{BeamPrinter, StreamStats};
use gatecore::transmit::TcpTransmitter;
use gatecore::StreamDriver;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    fn device_path(&self) -> anyhow::Result<&PathBuf> {
        self.config
            .device
            .as_ref()
            .with_context(|| format!("no device given for {:?} input", self.config.device_type))
    }

    pub fn open_source(&self) -> anyhow::Result<Box<dyn RecordSource>> {
        let source: Box<dyn RecordSource> = match self.config.device_type {
            DeviceKind::Tape => {
                let path = self.device_path()?;
                Box::new(
                    TapeDevice::open(path)
                        .with_context(|| format!("opening tape device {}", path.display()))?,
                )
            }
            DeviceKind::Disk => {
                let path = self.device_path()?;
                Box::new(
                    DiskImageSource::open(path)
                        .with_context(|| format!("opening disk image {}", path.display()))?,
                )
            }
            DeviceKind::Synthetic => Box::new(MemorySource::new(
                build_tape(&self.config.synthetic, &self.config.gate)
                    .context("generating synthetic tape")?,
            )),
        };
        Ok(source)
    }

    /// Summarizes the tape files without decoding any beams.
    pub fn list_files(&self) -> anyhow::Result<Vec<FileSummary>> {
        let mut source = self.open_source()?;
        list_files(source.as_mut()).context("listing tape files")
    }

    /// Streams beams to whatever client connects on the configured port.
    pub fn serve(&self, shutdown: Arc<AtomicBool>) -> anyhow::Result<StreamStats> {
        let address = self.config.listen_address();
        let mut transmitter = TcpTransmitter::bind(&address)
            .with_context(|| format!("binding gate listener on {}", address))?;
        self.stream(&mut transmitter, shutdown)
    }

    pub fn stream(
        &self,
        sink: &mut dyn PacketSink,
        shutdown: Arc<AtomicBool>,
    ) -> anyhow::Result<StreamStats> {
        let mut source = self.open_source()?;
        let mut driver = StreamDriver::from_config(self.config.gate.clone())
            .context("building stream driver")?
            .with_printer(BeamPrinter::new(
                self.config.header_print,
                self.config.summary_print,
            ))
            .with_shutdown(shutdown);
        driver
            .run(source.as_mut(), sink)
            .context("streaming beams")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::profile::SyntheticConfig;
    use gatecore::transmit::{RecordingSink, GATE_DATA_PACKET, GATE_PARAMS_PACKET};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn synthetic() -> WorkflowConfig {
        WorkflowConfig {
            device_type: DeviceKind::Synthetic,
            synthetic: SyntheticConfig {
                elevations_deg: vec![0.5, 1.5],
                beams_per_tilt: 5,
                ngates: 20,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn synthetic_run_streams_all_but_last_beam() {
        let runner = Runner::new(synthetic());
        let mut sink = RecordingSink::default();
        let stats = runner
            .stream(&mut sink, Arc::new(AtomicBool::new(false)))
            .unwrap();
        assert_eq!(stats.beams_valid, 10);
        assert_eq!(stats.data_packets_sent, 9);

        let types = sink.packet_types();
        assert_eq!(types[0], GATE_PARAMS_PACKET);
        // params again after the last beam of the first tilt
        assert_eq!(types[6], GATE_PARAMS_PACKET);
        assert_eq!(types.iter().filter(|&&kind| kind == GATE_DATA_PACKET).count(), 9);
    }

    #[test]
    fn disk_image_files_are_listed() {
        let mut image = Vec::new();
        for record in [&b"abcd"[..], b"ef", b"", b"ghijkl", b"", b""] {
            let length = (record.len() as u32).to_le_bytes();
            image.extend_from_slice(&length);
            image.extend_from_slice(record);
            if !record.is_empty() {
                image.extend_from_slice(&length);
            }
        }
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(&image).unwrap();

        let runner = Runner::new(WorkflowConfig {
            device_type: DeviceKind::Disk,
            device: Some(temp.path().to_path_buf()),
            ..Default::default()
        });
        let files = runner.list_files().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].records, 2);
        assert_eq!(files[0].bytes, 6);
        assert_eq!(files[1].max_record, 6);
    }

    #[test]
    fn missing_device_fails_setup() {
        let runner = Runner::new(WorkflowConfig {
            device_type: DeviceKind::Disk,
            device: Some(PathBuf::from("/nonexistent/tape.img")),
            ..Default::default()
        });
        assert!(runner.open_source().is_err());
    }
}

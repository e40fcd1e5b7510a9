use crate::generator::profile::SyntheticConfig;
use anyhow::{bail, Context};
use clap::ValueEnum;
use gatecore::config::GateConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    #[default]
    Tape,
    Disk,
    Synthetic,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub device_type: DeviceKind,
    pub device: Option<PathBuf>,
    pub listen_host: String,
    pub port: u16,
    pub header_print: u64,
    pub summary_print: u64,
    pub synthetic: SyntheticConfig,
    pub gate: GateConfig,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            device_type: DeviceKind::default(),
            device: None,
            listen_host: "0.0.0.0".into(),
            port: 65000,
            header_print: 0,
            summary_print: 0,
            synthetic: SyntheticConfig::default(),
            gate: GateConfig::default(),
        }
    }
}

/// Command-line values that take precedence over the parameter file.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub device_type: Option<DeviceKind>,
    pub device: Option<PathBuf>,
    pub port: Option<u16>,
    pub header_print: Option<u64>,
    pub summary_print: Option<u64>,
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading parameter file {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing parameter file {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn apply(mut self, overrides: Overrides) -> Self {
        if let Some(kind) = overrides.device_type {
            self.device_type = kind;
        }
        if overrides.device.is_some() {
            self.device = overrides.device;
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(every) = overrides.header_print {
            self.header_print = every;
        }
        if let Some(every) = overrides.summary_print {
            self.summary_print = every;
        }
        self
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.listen_host, self.port)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.device_type != DeviceKind::Synthetic && self.device.is_none() {
            bail!("device type {:?} needs a device path", self.device_type);
        }
        self.gate.validate().context("checking gate configuration")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatecore::config::RadarFormat;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn config_load_reads_yaml() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(
            b"device_type: disk\ndevice: /data/tape.img\nport: 7000\ngate:\n  format: lincoln\n  ngates_out: 256\n  out_field_pos: [1]\n",
        )
        .unwrap();
        let path = temp.into_temp_path();
        let cfg = WorkflowConfig::load(&path).unwrap();
        assert_eq!(cfg.device_type, DeviceKind::Disk);
        assert_eq!(cfg.listen_address(), "0.0.0.0:7000");
        assert_eq!(cfg.gate.format, RadarFormat::Lincoln);
        assert_eq!(cfg.gate.ngates_out, 256);
        assert_eq!(cfg.gate.nfields_out(), 1);
        cfg.validate().unwrap();
    }

    #[test]
    fn overrides_win_over_file_values() {
        let cfg = WorkflowConfig::default().apply(Overrides {
            device_type: Some(DeviceKind::Synthetic),
            port: Some(9000),
            summary_print: Some(10),
            ..Default::default()
        });
        assert_eq!(cfg.device_type, DeviceKind::Synthetic);
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.summary_print, 10);
        assert_eq!(cfg.header_print, 0);
        cfg.validate().unwrap();
    }

    #[test]
    fn tape_without_device_is_rejected() {
        assert!(WorkflowConfig::default().validate().is_err());
    }

    #[test]
    fn bad_yaml_reports_path() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"port: [not a number]\n").unwrap();
        let path = temp.into_temp_path();
        let err = WorkflowConfig::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("parsing parameter file"));
    }
}

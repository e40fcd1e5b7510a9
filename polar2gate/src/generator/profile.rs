use anyhow::{bail, Context};
use gatecore::beam::{normalize_azimuth, BeamHeader, FieldLayout, GateSamples, ScanMode};
use gatecore::config::{GateConfig, RadarFormat};
use gatecore::formats::rp7::{Rp7Beam, Rp7Field};
use gatecore::formats::NativeScale;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Shape of a generated RP7 tape used for offline runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub volumes: usize,
    pub elevations_deg: Vec<f64>,
    pub beams_per_tilt: usize,
    pub ngates: usize,
    /// Epoch seconds of the first beam.
    pub start_time: i64,
    pub noise: f64,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            volumes: 1,
            elevations_deg: vec![0.5, 1.5, 2.5],
            beams_per_tilt: 360,
            ngates: 256,
            start_time: 800_000_000,
            noise: 4.0,
            seed: 0,
        }
    }
}

fn field_scale(field: usize) -> NativeScale {
    NativeScale {
        scale: 0.5,
        bias: -32.0 + field as f64 * 8.0,
    }
}

/// Builds one record per beam, interleaving `gate.nfields_in` fields.
pub fn build_tape(synthetic: &SyntheticConfig, gate: &GateConfig) -> anyhow::Result<Vec<Vec<u8>>> {
    if gate.format != RadarFormat::Rp7 {
        bail!("synthetic tapes are RP7; configured format is {:?}", gate.format);
    }
    let nfields = gate.nfields_in.max(1);
    let ngates = synthetic.ngates.max(1);
    let beams_per_tilt = synthetic.beams_per_tilt.max(1);
    let mut rng = StdRng::seed_from_u64(synthetic.seed);
    let mut records = Vec::with_capacity(synthetic.volumes * synthetic.elevations_deg.len() * beams_per_tilt);
    let mut time = synthetic.start_time;

    for volume in 0..synthetic.volumes {
        for (tilt, &elevation) in synthetic.elevations_deg.iter().enumerate() {
            for ray in 0..beams_per_tilt {
                let azimuth = normalize_azimuth(ray as f64 * 360.0 / beams_per_tilt as f64);
                let mut bytes = Vec::with_capacity(ngates * nfields);
                for gate_index in 0..ngates {
                    let range_fraction = gate_index as f64 / ngates as f64;
                    for field in 0..nfields {
                        let ring = 120.0 * (1.0 - range_fraction)
                            + 40.0 * (azimuth.to_radians() * (field + 1) as f64).sin();
                        let jitter = if synthetic.noise > 0.0 {
                            rng.gen_range(-synthetic.noise..synthetic.noise)
                        } else {
                            0.0
                        };
                        bytes.push((ring + jitter).round().clamp(0.0, 255.0) as u8);
                    }
                }
                let beam = Rp7Beam {
                    header: BeamHeader {
                        time,
                        azimuth_deg: azimuth,
                        elevation_deg: elevation,
                        target_elevation_deg: elevation,
                        volume_num: volume as i32,
                        tilt_num: tilt as i32,
                        scan_mode: ScanMode::Surveillance,
                        gate_spacing_m: gate.target_gate_spacing_m,
                        start_range_m: gate.target_gate_spacing_m / 2.0,
                    },
                    samples: GateSamples::new(FieldLayout::Interleaved, nfields, ngates, bytes),
                    fields: (0..nfields)
                        .map(|field| Rp7Field {
                            name: format!("F{field}"),
                            native: field_scale(field),
                        })
                        .collect(),
                };
                records.push(
                    beam.encode()
                        .with_context(|| format!("encoding synthetic beam {} of tilt {}", ray, tilt))?,
                );
                time += 1;
            }
        }
    }
    Ok(records)
}

//! CHILL reflectivity calibration.
//!
//! The calibration file holds one line per calibration epoch:
//!
//! ```text
//! yymmdd hhmm slope noisepwr intnoise pktxpwr antgain radcon zdrloss zdrcal -- yymmdd hhmm yymmdd hhmm
//! ```
//!
//! The last four tokens give the validity window. A beam uses the first entry
//! whose window contains its time, otherwise the entry dated closest to it.

use crate::formats::{epoch_seconds, expand_year};
use crate::prelude::{GateError, GateResult};
use std::fs;
use std::path::Path;

/// Number of integrator counts covered by the lookup table.
pub const CTAB_SIZE: usize = 256;
/// Number of gates covered by the range-correction table.
pub const RSQ_SIZE: usize = 2048;

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationEntry {
    pub time: i64,
    pub slope: f64,
    pub noise_power: f64,
    pub integrator_noise: f64,
    pub peak_tx_power: f64,
    pub antenna_gain: f64,
    pub radar_constant: f64,
    pub zdr_loss: f64,
    pub zdr_cal: f64,
    pub window_start: i64,
    pub window_end: i64,
}

/// How the calibration entry for a beam was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationMatch {
    Exact,
    Nearest { distance_secs: i64 },
}

#[derive(Debug, Clone, Default)]
pub struct CalibrationTable {
    entries: Vec<CalibrationEntry>,
}

fn parse_stamp(date: &str, time: &str) -> Option<i64> {
    if date.len() != 6 || time.len() < 4 || !date.is_ascii() || !time.is_ascii() {
        return None;
    }
    let year: i32 = date[0..2].parse().ok()?;
    let month: u32 = date[2..4].parse().ok()?;
    let day: u32 = date[4..6].parse().ok()?;
    let hour: u32 = time[0..2].parse().ok()?;
    let minute: u32 = time[2..4].parse().ok()?;
    epoch_seconds(expand_year(year, 50), month, day, hour, minute, 0)
}

fn parse_line(line: &str) -> Option<CalibrationEntry> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 15 {
        return None;
    }
    let mut numbers = [0.0f64; 8];
    for (value, token) in numbers.iter_mut().zip(&tokens[2..10]) {
        *value = token.parse().ok()?;
    }
    // the integrator curve divides by the slope
    if !(numbers[0].is_finite() && numbers[0] > 0.0) {
        return None;
    }
    Some(CalibrationEntry {
        time: parse_stamp(tokens[0], tokens[1])?,
        slope: numbers[0],
        noise_power: numbers[1],
        integrator_noise: numbers[2],
        peak_tx_power: numbers[3],
        antenna_gain: numbers[4],
        radar_constant: numbers[5],
        zdr_loss: numbers[6],
        zdr_cal: numbers[7],
        window_start: parse_stamp(tokens[11], tokens[12])?,
        window_end: parse_stamp(tokens[13], tokens[14])?,
    })
}

impl CalibrationTable {
    /// Unreadable or malformed lines are skipped.
    pub fn parse(text: &str) -> Self {
        Self {
            entries: text.lines().filter_map(parse_line).collect(),
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> GateResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|err| {
            GateError::Calibration(format!("reading {}: {}", path.display(), err))
        })?;
        let table = Self::parse(&text);
        if table.entries.is_empty() {
            return Err(GateError::Calibration(format!(
                "no usable entries in {}",
                path.display()
            )));
        }
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn select(&self, time: i64) -> Option<(&CalibrationEntry, CalibrationMatch)> {
        if let Some(entry) = self
            .entries
            .iter()
            .find(|entry| entry.window_start <= time && entry.window_end >= time)
        {
            return Some((entry, CalibrationMatch::Exact));
        }
        self.entries
            .iter()
            .min_by_key(|entry| (time - entry.time).abs())
            .map(|entry| {
                let distance_secs = (time - entry.time).abs();
                (entry, CalibrationMatch::Nearest { distance_secs })
            })
    }
}

/// Lookup tables converting raw integrator counts to dBZ.
#[derive(Debug, Clone)]
pub struct ReflectivityCalibration {
    ctab: Vec<f64>,
    rsq: Vec<f64>,
}

impl ReflectivityCalibration {
    /// `pulse_len` is in 1/1024 µs; `bypass == 0` adds the switch loss.
    pub fn new(entry: &CalibrationEntry, pulse_len: i32, bypass: i32, gate_spacing_m: f64) -> Self {
        Self {
            ctab: integrator_table(entry, pulse_len, bypass),
            rsq: range_table(gate_spacing_m, RSQ_SIZE),
        }
    }

    /// dBZ at the given gate for a raw integrator count.
    pub fn dbz(&self, raw: u8, gate: usize) -> f64 {
        let range_term = self
            .rsq
            .get(gate)
            .or_else(|| self.rsq.last())
            .copied()
            .unwrap_or(0.0);
        self.ctab[raw as usize] + range_term
    }

    /// dBZ re-quantized onto `scale`/`bias`, clamped to a byte.
    pub fn quantize(&self, raw: u8, gate: usize, scale: f64, bias: f64) -> u8 {
        let count = ((self.dbz(raw, gate) - bias) / scale + 0.5).floor();
        count.clamp(0.0, 255.0) as u8
    }
}

/// dBZ at 1 km indexed by integrator count.
fn integrator_table(entry: &CalibrationEntry, pulse_len: i32, bypass: i32) -> Vec<f64> {
    let pulse_correction = 10.0 * (1024.0 / pulse_len.max(1) as f64).log10();
    let mut calcon = pulse_correction + entry.radar_constant - entry.peak_tx_power
        - 2.0 * entry.antenna_gain
        + entry.noise_power;
    if bypass == 0 {
        calcon += entry.zdr_loss;
    }

    let a = entry.slope / 10.0;
    let noise = (entry.integrator_noise + 0.5) as i64;
    let start = noise;
    let knee = start.saturating_add((1.0 / a) as i64);
    let first = start + 1;

    let mut table = vec![calcon; CTAB_SIZE];
    for i in first.max(0)..=knee.min(CTAB_SIZE as i64 - 1) {
        let approx = 10f64.powf((i - noise) as f64 * a) - 1.0;
        table[i as usize] = 10.0 * approx.log10() + calcon;
    }
    for i in knee.max(0)..CTAB_SIZE as i64 {
        table[i as usize] = (i - noise) as f64 * entry.slope + calcon;
    }
    if (0..CTAB_SIZE as i64).contains(&first) {
        let floor = table[first as usize];
        for value in table.iter_mut().take((start.max(-1) + 1) as usize) {
            *value = floor;
        }
    }
    table
}

/// `20 log10(range_km)` for each gate centre.
fn range_table(gate_spacing_m: f64, size: usize) -> Vec<f64> {
    let spacing_km = gate_spacing_m / 1000.0;
    (0..size)
        .map(|gate| 20.0 * (spacing_km / 2.0 + gate as f64 * spacing_km).log10())
        .collect()
}

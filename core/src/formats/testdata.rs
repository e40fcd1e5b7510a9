//! Byte-exact synthetic records for decoder and pipeline tests.

use crate::beam::{BeamHeader, FieldLayout, GateSamples, ScanMode};
use crate::calibration::CalibrationTable;
use crate::formats::rp7::{Rp7Beam, Rp7Field};
use crate::formats::{epoch_seconds, ByteOrder, NativeScale};

fn put(bytes: &mut Vec<u8>, value: u16, order: ByteOrder) {
    match order {
        ByteOrder::Big => bytes.extend_from_slice(&value.to_be_bytes()),
        ByteOrder::Little => bytes.extend_from_slice(&value.to_le_bytes()),
    }
}

fn set(bytes: &mut [u8], word: usize, value: u16, order: ByteOrder) {
    let raw = match order {
        ByteOrder::Big => value.to_be_bytes(),
        ByteOrder::Little => value.to_le_bytes(),
    };
    bytes[word * 2..word * 2 + 2].copy_from_slice(&raw);
}

#[derive(Debug, Clone)]
pub struct LincolnFixture {
    pub volume: u16,
    pub tilt: i32,
    pub scan_code: u16,
    pub clock: [u16; 6],
    pub azimuth_centi: u16,
    pub elevation_centi: i16,
    pub target_centi: u16,
    pub ngates: usize,
    pub gate_spacing_m: u16,
    pub start_range_m: u16,
    pub scales: Vec<(i32, i32)>,
}

impl Default for LincolnFixture {
    fn default() -> Self {
        Self {
            volume: 3,
            tilt: 1,
            scan_code: 1,
            clock: [89, 7, 4, 18, 30, 15],
            azimuth_centi: 12_000,
            elevation_centi: 150,
            target_centi: 150,
            ngates: 4,
            gate_spacing_m: 150,
            start_range_m: 75,
            scales: vec![(50, -3_000), (25, 0)],
        }
    }
}

pub fn lincoln_record(fixture: &LincolnFixture) -> Vec<u8> {
    let order = ByteOrder::Big;
    let nfields = fixture.scales.len();
    let header_words = 18 + nfields * 4;
    let data_len = nfields * fixture.ngates;
    let total_words = header_words + data_len.div_ceil(2);

    let mut record = Vec::with_capacity(total_words * 2);
    for value in [
        total_words as u16,
        header_words as u16,
        fixture.volume,
        fixture.tilt as u16,
        fixture.scan_code,
    ] {
        put(&mut record, value, order);
    }
    for part in fixture.clock {
        put(&mut record, part, order);
    }
    for value in [
        fixture.azimuth_centi,
        fixture.elevation_centi as u16,
        fixture.target_centi,
        fixture.ngates as u16,
        fixture.gate_spacing_m,
        fixture.start_range_m,
        nfields as u16,
    ] {
        put(&mut record, value, order);
    }
    for (scale, bias) in &fixture.scales {
        record.extend_from_slice(&scale.to_be_bytes());
        record.extend_from_slice(&bias.to_be_bytes());
    }
    for field in 0..nfields {
        record.extend((0..fixture.ngates).map(|gate| (field * 50 + gate) as u8));
    }
    record.resize(total_words * 2, 0);
    record
}

/// Interleaved RP7 beam whose every value survives an encode/decode cycle.
pub fn rp7_beam(tilt: i32, azimuth_deg: f64, nfields: usize, ngates: usize) -> Rp7Beam {
    let bytes = (0..ngates)
        .flat_map(|gate| (0..nfields).map(move |field| (field * 40 + gate) as u8))
        .map(|value| value.wrapping_add(tilt as u8))
        .collect();
    Rp7Beam {
        header: BeamHeader {
            time: epoch_seconds(1995, 3, 1, 12, 0, 0).unwrap_or_default(),
            azimuth_deg,
            elevation_deg: 0.5,
            target_elevation_deg: 0.5,
            volume_num: 1,
            tilt_num: tilt,
            scan_mode: ScanMode::Surveillance,
            gate_spacing_m: 150.0,
            start_range_m: 75.0,
        },
        samples: GateSamples::new(FieldLayout::Interleaved, nfields, ngates, bytes),
        fields: (0..nfields)
            .map(|field| Rp7Field {
                name: format!("F{field}"),
                native: NativeScale {
                    scale: 0.5,
                    bias: -32.0 + field as f64,
                },
            })
            .collect(),
    }
}

#[derive(Debug, Clone)]
pub struct ChillRayFixture {
    pub order: ByteOrder,
    pub offset1: usize,
    pub ray_number: i32,
    pub azimuth: u16,
    pub elevation: u16,
    pub clock: [u16; 7],
    pub volume: i32,
    pub sweep: i32,
    pub programmed_elevation: u16,
    pub prt_us: u16,
    pub nyquist_raw: i16,
    pub pulse_len: u16,
    pub gate_len: u16,
    pub scan_code: u16,
    pub bypass: u16,
    pub segment_name: String,
    pub txbin: u16,
    pub ip_gates: usize,
}

impl Default for ChillRayFixture {
    fn default() -> Self {
        Self {
            order: ByteOrder::Little,
            offset1: 27,
            ray_number: 1,
            azimuth: 1024,
            elevation: 11,
            // hour, minute, second, tenths, year, month, day
            clock: [12, 30, 0, 0, 94, 6, 15],
            volume: 2,
            sweep: 1,
            programmed_elevation: 11,
            prt_us: 1000,
            nyquist_raw: 16 * 256,
            pulse_len: 1024,
            gate_len: 1024,
            scan_code: 1,
            bypass: 1,
            segment_name: "SUR1".into(),
            txbin: 2,
            ip_gates: 20,
        }
    }
}

impl ChillRayFixture {
    pub fn ip_gates(&self) -> Vec<u8> {
        (0..self.ip_gates).map(|gate| (20 + gate * 3) as u8).collect()
    }

    pub fn vel_gates(&self) -> Vec<u8> {
        (0..self.ip_gates).map(|gate| (100 + gate * 5) as u8).collect()
    }
}

fn chill_block(code: &[u8; 2], header_words: usize, txbin: Option<u16>, gates: &[u8], order: ByteOrder) -> Vec<u8> {
    let length_words = header_words + gates.len().div_ceil(2);
    let mut block = vec![0u8; header_words * 2];
    block[..2].copy_from_slice(code);
    set(&mut block, 1, length_words as u16, order);
    set(&mut block, 2, gates.len() as u16, order);
    set(&mut block, 3, header_words as u16, order);
    if let Some(txbin) = txbin {
        set(&mut block, 9, txbin, order);
    }
    block.extend_from_slice(gates);
    block.resize(length_words * 2, 0);
    block
}

pub fn chill_ray(fixture: &ChillRayFixture) -> Vec<u8> {
    let order = fixture.order;
    let hsk_words = fixture.offset1.max(12);
    let mut ray = vec![0u8; (3 + hsk_words) * 2];
    ray[..2].copy_from_slice(b"CD");
    set(&mut ray, 2, fixture.offset1 as u16, order);

    let mut words: Vec<u16> = vec![fixture.azimuth, fixture.elevation];
    words.extend_from_slice(&fixture.clock);
    words.extend([
        fixture.ray_number as u16,
        fixture.volume as u16,
        fixture.sweep as u16,
        fixture.programmed_elevation,
        fixture.prt_us,
        fixture.nyquist_raw as u16,
        fixture.pulse_len,
        fixture.gate_len,
        fixture.scan_code,
        fixture.bypass,
    ]);
    for (k, value) in words.into_iter().enumerate().take(hsk_words.min(19)) {
        set(&mut ray, 3 + k, value, order);
    }
    if fixture.offset1 >= 27 {
        let start = (3 + 19) * 2;
        let mut name = [0u8; 16];
        for (slot, byte) in name.iter_mut().zip(fixture.segment_name.bytes()) {
            *slot = byte;
        }
        ray[start..start + 16].copy_from_slice(&name);
    }

    ray.extend(chill_block(b"IP", 10, Some(fixture.txbin), &fixture.ip_gates(), order));
    ray.extend(chill_block(b"VR", 4, None, &fixture.vel_gates(), order));
    let raylen = ray.len() / 2;
    set(&mut ray, 1, raylen as u16, order);
    ray
}

pub fn chill_calibration() -> CalibrationTable {
    CalibrationTable::parse(
        "940601 1200 0.5 -110.0 10.0 88.0 44.0 70.0 1.5 0.2 -- 940601 0000 940630 2359\n",
    )
}

#[derive(Debug, Clone)]
pub struct LassFixture {
    pub volume: u16,
    pub tilt: i32,
    pub scan_code: u16,
    pub clock: [u16; 6],
    pub azimuth_centi: u16,
    pub elevation_centi: i16,
    pub target_centi: u16,
    pub ray_number: u16,
    pub gate_spacing_m: u16,
    pub start_range_m: u16,
    /// (scale, bias) ×100 for dBZ then velocity.
    pub recorded: [(i16, i16); 2],
    pub gates: Vec<(u8, u8)>,
}

impl Default for LassFixture {
    fn default() -> Self {
        Self {
            volume: 1,
            tilt: 2,
            scan_code: 1,
            clock: [1998, 8, 20, 6, 15, 0],
            azimuth_centi: 4_500,
            elevation_centi: 250,
            target_centi: 250,
            ray_number: 7,
            gate_spacing_m: 250,
            start_range_m: 125,
            recorded: [(100, -3_200), (50, -6_400)],
            gates: vec![(40, 128), (60, 130), (80, 126), (100, 128)],
        }
    }
}

pub fn lass_record(fixture: &LassFixture) -> Vec<u8> {
    let order = ByteOrder::Big;
    let mut record = crate::formats::lass::LASS_MAGIC.to_vec();
    for value in [fixture.volume, fixture.tilt as u16, fixture.scan_code] {
        put(&mut record, value, order);
    }
    for part in fixture.clock {
        put(&mut record, part, order);
    }
    for value in [fixture.gates.len() as u16, fixture.gate_spacing_m, fixture.start_range_m] {
        put(&mut record, value, order);
    }
    for (scale, bias) in fixture.recorded {
        put(&mut record, scale as u16, order);
        put(&mut record, bias as u16, order);
    }
    for value in [
        fixture.azimuth_centi,
        fixture.elevation_centi as u16,
        fixture.target_centi,
        fixture.ray_number,
    ] {
        put(&mut record, value, order);
    }
    for (dbz, vel) in &fixture.gates {
        record.push(*dbz);
        record.push(*vel);
    }
    record
}

#[derive(Debug, Clone)]
pub struct AleniaFixture {
    /// yy mm dd hh mm ss
    pub clock: [u8; 6],
    pub scan_mode: ScanMode,
    pub pulse_code: u8,
    pub gate_code: u8,
    pub moment_mask: u8,
    pub azimuth: u16,
    pub elevation: u16,
    pub ngates: u16,
    pub npulses: u16,
    pub prf_hz: u16,
}

impl Default for AleniaFixture {
    fn default() -> Self {
        Self {
            clock: [97, 11, 3, 9, 45, 30],
            scan_mode: ScanMode::Surveillance,
            pulse_code: 1,
            gate_code: 2,
            moment_mask: 0b1111,
            azimuth: 16_384,
            elevation: 182,
            ngates: 8,
            npulses: 32,
            prf_hz: 1_000,
        }
    }
}

impl AleniaFixture {
    pub fn sample(&self, gate: usize, moment: usize) -> u8 {
        (gate * 7 + moment * 31 + 1) as u8
    }
}

fn to_bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

pub fn alenia_record(fixture: &AleniaFixture) -> Vec<u8> {
    let order = ByteOrder::Little;
    let mut record: Vec<u8> = fixture.clock.iter().map(|part| to_bcd(*part)).collect();
    record.push(crate::formats::alenia::ModeByte::pack(fixture.scan_mode, fixture.pulse_code));
    record.push((fixture.moment_mask << 4) | (fixture.gate_code & 0x07));
    for value in [
        fixture.azimuth,
        fixture.elevation,
        fixture.ngates,
        fixture.npulses,
        fixture.prf_hz,
        crate::formats::alenia::ALENIA_SYNC,
    ] {
        put(&mut record, value, order);
    }
    record.extend_from_slice(&[0; 4]);
    for gate in 0..fixture.ngates as usize {
        for moment in 0..4 {
            if fixture.moment_mask & (1 << moment) != 0 {
                record.push(fixture.sample(gate, moment));
            }
        }
    }
    record
}

//! Alenia radar recordings.
//!
//! The recorder writes a plain byte stream: a 24-byte little-endian header
//! followed by the moments of every gate, with no record framing. After
//! corruption the decoder scans forward one byte at a time for a header
//! whose gate and pulse counts match the first header it accepted.

use crate::beam::{normalize_azimuth, BeamHeader, FieldLayout, GateSamples, RawBeamRecord, ScanMode};
use crate::config::GateConfig;
use crate::formats::{bcd_to_u8, epoch_seconds, expand_year, ByteOrder, NativeScale, Words};
use crate::prelude::{BeamDecoder, GateError, GateResult, RecordSource};

pub const ALENIA_HEADER_LEN: usize = 24;
pub const ALENIA_SYNC: u16 = 0xA1E5;
/// Moments in mask bit order: Z, V, W, ZDR.
pub const ALENIA_MOMENTS: usize = 4;

/// Pulse widths in µs by two-bit code.
pub const PULSE_WIDTHS_US: [f64; 4] = [3.0, 1.5, 0.5, 0.25];
/// Gate spacings in km by three-bit code; codes 6 and 7 are unused.
pub const GATE_SPACINGS_KM: [f64; 6] = [0.0625, 0.125, 0.25, 0.5, 1.0, 2.0];

/// Byte scaling of each moment as recorded.
pub const MOMENT_SCALES: [NativeScale; ALENIA_MOMENTS] = [
    NativeScale { scale: 0.5, bias: -32.0 },
    NativeScale { scale: 0.25, bias: -32.0 },
    NativeScale { scale: 0.0625, bias: 0.0 },
    NativeScale { scale: 0.0625, bias: -8.0 },
];

const BINARY_ANGLE: f64 = 360.0 / 65536.0;

/// Scan mode and pulse width packed in the header mode byte.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeByte {
    pub scan_mode: ScanMode,
    pub pulse_width_us: f64,
}

impl ModeByte {
    pub fn unpack(byte: u8) -> Self {
        let scan_mode = match byte & 0x03 {
            0 => ScanMode::Surveillance,
            1 => ScanMode::Sector,
            3 => ScanMode::Rhi,
            _ => ScanMode::Unknown,
        };
        Self {
            scan_mode,
            pulse_width_us: PULSE_WIDTHS_US[((byte >> 2) & 0x03) as usize],
        }
    }

    pub fn pack(scan_mode: ScanMode, pulse_code: u8) -> u8 {
        let scan = match scan_mode {
            ScanMode::Surveillance => 0,
            ScanMode::Sector => 1,
            ScanMode::Unknown => 2,
            ScanMode::Rhi => 3,
        };
        scan | ((pulse_code & 0x03) << 2)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AleniaHeader {
    pub time: i64,
    pub mode: ModeByte,
    pub gate_spacing_km: f64,
    pub moment_mask: u8,
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
    pub ngates: usize,
    pub npulses: u16,
    pub prf_hz: f64,
}

impl AleniaHeader {
    pub fn nmoments(&self) -> usize {
        self.moment_mask.count_ones() as usize
    }

    pub fn data_len(&self) -> usize {
        self.ngates * self.nmoments()
    }

    /// Parses a header, `None` when any field fails validation.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let header = bytes.get(..ALENIA_HEADER_LEN)?;
        let words = Words::new(header, ByteOrder::Little);
        if words.u16_at(18)? != ALENIA_SYNC {
            return None;
        }
        let mut clock = [0u8; 6];
        for (part, byte) in clock.iter_mut().zip(&header[..6]) {
            *part = bcd_to_u8(*byte)?;
        }
        let time = epoch_seconds(
            expand_year(clock[0] as i32, 70),
            clock[1] as u32,
            clock[2] as u32,
            clock[3] as u32,
            clock[4] as u32,
            clock[5] as u32,
        )?;
        let gate_spacing_km = *GATE_SPACINGS_KM.get((header[7] & 0x07) as usize)?;
        let moment_mask = header[7] >> 4;
        let ngates = words.u16_at(12)? as usize;
        if moment_mask == 0 || ngates == 0 {
            return None;
        }
        let elevation = words.u16_at(10)? as f64 * BINARY_ANGLE;
        Some(Self {
            time,
            mode: ModeByte::unpack(header[6]),
            gate_spacing_km,
            moment_mask,
            azimuth_deg: normalize_azimuth(words.u16_at(8)? as f64 * BINARY_ANGLE),
            elevation_deg: if elevation > 180.0 { elevation - 360.0 } else { elevation },
            ngates,
            npulses: words.u16_at(14)?,
            prf_hz: words.u16_at(16)? as f64,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AleniaBeam {
    pub header: BeamHeader,
    /// Moments present in this beam, interleaved by gate.
    pub samples: GateSamples,
    pub pulse_width_us: f64,
    pub prf_hz: f64,
    pub npulses: u16,
    pub moment_mask: u8,
}

impl AleniaBeam {
    fn from_parts(header: AleniaHeader, data: &[u8], time_correction: i64) -> Self {
        let mut next = 0;
        let slots = (0..ALENIA_MOMENTS)
            .map(|moment| {
                (header.moment_mask & (1 << moment) != 0).then(|| {
                    next += 1;
                    next - 1
                })
            })
            .collect();
        let gate_spacing_m = header.gate_spacing_km * 1000.0;
        Self {
            header: BeamHeader {
                time: header.time + time_correction,
                azimuth_deg: header.azimuth_deg,
                elevation_deg: header.elevation_deg,
                target_elevation_deg: header.elevation_deg,
                volume_num: 0,
                tilt_num: 0,
                scan_mode: header.mode.scan_mode,
                gate_spacing_m,
                start_range_m: gate_spacing_m / 2.0,
            },
            samples: GateSamples::with_slots(FieldLayout::Interleaved, slots, header.ngates, data.to_vec()),
            pulse_width_us: header.mode.pulse_width_us,
            prf_hz: header.prf_hz,
            npulses: header.npulses,
            moment_mask: header.moment_mask,
        }
    }
}

/// Buffers the byte stream across physical reads.
pub struct AleniaDecoder {
    buffer: Vec<u8>,
    position: usize,
    reference: Option<(usize, u16)>,
    max_resync_bytes: Option<u64>,
    time_correction: i64,
    skipped: u64,
    exhausted: bool,
}

impl AleniaDecoder {
    pub fn new(config: &GateConfig) -> Self {
        Self {
            buffer: Vec::new(),
            position: 0,
            reference: None,
            max_resync_bytes: config.alenia.max_resync_bytes,
            time_correction: config.time_correction_secs,
            skipped: 0,
            exhausted: false,
        }
    }

    fn available(&self) -> usize {
        self.buffer.len() - self.position
    }

    /// Pulls records until `wanted` bytes are buffered; false at end of stream.
    fn fill(&mut self, source: &mut dyn RecordSource, wanted: usize) -> GateResult<bool> {
        while self.available() < wanted {
            if self.exhausted {
                return Ok(false);
            }
            match source.read_record()? {
                Some(record) => {
                    if self.position > 0 {
                        self.buffer.drain(..self.position);
                        self.position = 0;
                    }
                    self.buffer.extend_from_slice(&record);
                }
                None => self.exhausted = true,
            }
        }
        Ok(true)
    }

    fn header_here(&self) -> Option<AleniaHeader> {
        let header = AleniaHeader::parse(&self.buffer[self.position..])?;
        match self.reference {
            Some((ngates, npulses)) if header.ngates != ngates || header.npulses != npulses => None,
            _ => Some(header),
        }
    }
}

impl BeamDecoder for AleniaDecoder {
    fn next_beam(&mut self, source: &mut dyn RecordSource) -> GateResult<Option<RawBeamRecord>> {
        let mut scanned: u64 = 0;
        loop {
            if !self.fill(source, ALENIA_HEADER_LEN)? {
                return Ok(None);
            }
            let Some(header) = self.header_here() else {
                self.position += 1;
                self.skipped += 1;
                scanned += 1;
                if let Some(limit) = self.max_resync_bytes {
                    if scanned > limit {
                        return Err(GateError::Fatal(format!(
                            "alenia: no matching header within {} bytes",
                            limit
                        )));
                    }
                }
                continue;
            };
            if scanned > 0 {
                log::warn!("alenia: resynchronized after {} bytes", scanned);
            }
            let total = ALENIA_HEADER_LEN + header.data_len();
            if !self.fill(source, total)? {
                log::debug!("alenia: stream ended inside a beam");
                return Ok(None);
            }
            if self.reference.is_none() {
                log::info!(
                    "alenia: reference header has {} gates, {} pulses",
                    header.ngates,
                    header.npulses
                );
                self.reference = Some((header.ngates, header.npulses));
            }
            let start = self.position + ALENIA_HEADER_LEN;
            let data = &self.buffer[start..self.position + total];
            let beam = AleniaBeam::from_parts(header, data, self.time_correction);
            self.position += total;
            return Ok(Some(RawBeamRecord::Alenia(beam)));
        }
    }

    fn name(&self) -> &'static str {
        "alenia"
    }

    fn resyncs(&self) -> u64 {
        self.skipped
    }
}

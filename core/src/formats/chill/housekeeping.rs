//! CHILL ray framing: housekeeping words and self-describing field blocks.

use crate::formats::{ByteOrder, Words};
use crate::prelude::{GateError, GateResult};

/// Largest plausible field block or ray, in 16-bit words.
pub const MAX_BLOCK_WORDS: usize = 32768;
/// Housekeeping words present on every tape era.
pub const BASIC_WORDS: usize = 12;
/// `offset1` above this means extended housekeeping is present.
pub const LIMITED_OFFSET: usize = 12;

const RAY_TAG: &[u8; 2] = b"CD";
const PREAMBLE_WORDS: usize = 3;
const SEGNAME_WORDS: usize = 8;

/// Housekeeping word indices, counted from the end of the ray preamble.
pub(crate) mod hsk {
    pub const AZ: usize = 0;
    pub const EL: usize = 1;
    pub const HOUR: usize = 2;
    pub const YEAR: usize = 6;
    pub const DAY: usize = 8;
    pub const RAYNUM: usize = 9;
    pub const VOLNUM: usize = 10;
    pub const SWEEPNUM: usize = 11;
    pub const ELPROGPOS: usize = 12;
    pub const PRT: usize = 13;
    pub const NYQVEL: usize = 14;
    pub const PULSE_LEN: usize = 15;
    pub const GATE_LEN: usize = 16;
    pub const SCANMODE: usize = 17;
    pub const BYPASS: usize = 18;
    pub const SEGNAME: usize = 19;
}

/// Housekeeping words normalized to host order.
///
/// Optional words are `None` on tapes whose `offset1` stops short of them.
#[derive(Debug, Clone, PartialEq)]
pub struct Housekeeping {
    pub order: ByteOrder,
    pub offset1: usize,
    pub azimuth: i32,
    pub elevation: i32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub tenths: u32,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub ray_number: i32,
    pub volume_num: i32,
    pub sweep_num: i32,
    pub programmed_elevation: Option<i32>,
    pub prt_us: Option<u16>,
    pub nyquist_raw: Option<i16>,
    pub pulse_len: Option<u16>,
    pub gate_len: Option<u16>,
    pub scan_mode: Option<u16>,
    pub bypass: Option<u16>,
    pub segment_name: Option<String>,
}

impl Housekeeping {
    pub fn parse(ray: &[u8], order: ByteOrder) -> GateResult<Self> {
        let words = Words::new(ray, order);
        let offset1 = words.word(2).unwrap_or(0) as usize;
        let basic = |k: usize| -> GateResult<u16> {
            words
                .word(PREAMBLE_WORDS + k)
                .ok_or_else(|| GateError::Framing(format!("chill housekeeping word {k} missing")))
        };
        let optional = |k: usize| -> Option<u16> {
            if offset1 > k {
                words.word(PREAMBLE_WORDS + k)
            } else {
                None
            }
        };

        let mut clock = [0u16; 7];
        for (k, part) in clock.iter_mut().enumerate() {
            *part = basic(hsk::HOUR + k)?;
        }

        let segment_name = if offset1 >= hsk::SEGNAME + SEGNAME_WORDS {
            let start = (PREAMBLE_WORDS + hsk::SEGNAME) * 2;
            ray.get(start..start + SEGNAME_WORDS * 2).map(|raw| {
                String::from_utf8_lossy(raw)
                    .trim_end_matches(['\0', ' '])
                    .to_string()
            })
        } else {
            None
        };

        Ok(Self {
            order,
            offset1,
            azimuth: basic(hsk::AZ)? as i32,
            elevation: basic(hsk::EL)? as i32,
            hour: clock[0] as u32,
            minute: clock[1] as u32,
            second: clock[2] as u32,
            tenths: clock[3] as u32,
            year: clock[4] as i32,
            month: clock[5] as u32,
            day: clock[6] as u32,
            ray_number: basic(hsk::RAYNUM)? as i32,
            volume_num: basic(hsk::VOLNUM)? as i32,
            sweep_num: basic(hsk::SWEEPNUM)? as i32,
            programmed_elevation: optional(hsk::ELPROGPOS).map(i32::from),
            prt_us: optional(hsk::PRT),
            nyquist_raw: optional(hsk::NYQVEL).map(|raw| raw as i16),
            pulse_len: optional(hsk::PULSE_LEN),
            gate_len: optional(hsk::GATE_LEN),
            scan_mode: optional(hsk::SCANMODE),
            bypass: optional(hsk::BYPASS),
            segment_name,
        })
    }

    pub fn is_extended(&self) -> bool {
        self.offset1 > LIMITED_OFFSET
    }
}

/// A day-of-month outside 1..=31 read little-endian means the ray was
/// written big-endian.
pub fn detect_order(ray: &[u8]) -> ByteOrder {
    let day = Words::new(ray, ByteOrder::Little).word(PREAMBLE_WORDS + hsk::DAY);
    match day {
        Some(1..=31) => ByteOrder::Little,
        _ => ByteOrder::Big,
    }
}

/// One field block inside a ray.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldBlock {
    pub code: [u8; 2],
    /// Byte offset of the block within the ray.
    pub start: usize,
    pub gates: usize,
    pub header_words: usize,
    pub txbin: Option<u16>,
}

impl FieldBlock {
    pub fn code_str(&self) -> &str {
        std::str::from_utf8(&self.code).unwrap_or("??")
    }

    /// Whether this block carries the field an output code asks for.
    pub fn matches(&self, code: &str) -> bool {
        match code {
            "VE" => &self.code == b"VE" || &self.code == b"VR",
            other => self.code_str() == other,
        }
    }
}

/// Walks the field blocks that follow the housekeeping words.
pub fn scan_fields(ray: &[u8], housekeeping: &Housekeeping, raylen_bytes: usize) -> GateResult<Vec<FieldBlock>> {
    let words = Words::new(ray, housekeeping.order);
    let limit = raylen_bytes.min(ray.len());
    let mut offset = (PREAMBLE_WORDS + housekeeping.offset1) * 2;
    let mut blocks = Vec::new();

    while offset < limit {
        let code: [u8; 2] = ray
            .get(offset..offset + 2)
            .and_then(|raw| raw.try_into().ok())
            .ok_or_else(|| GateError::Framing("chill field tag truncated".into()))?;
        let base = offset / 2;
        let word = |k: usize| -> GateResult<usize> {
            words
                .word(base + k)
                .map(usize::from)
                .ok_or_else(|| GateError::Framing("chill field header truncated".into()))
        };

        let (block, length_words) = if &code == b"DM" {
            let block = FieldBlock {
                code: *b"IP",
                start: offset,
                gates: 512,
                header_words: 8,
                txbin: None,
            };
            (block, 512)
        } else {
            let length_words = word(1)?;
            if length_words == 0 || length_words > MAX_BLOCK_WORDS {
                return Err(GateError::Framing(format!(
                    "chill {} block length {} words",
                    String::from_utf8_lossy(&code),
                    length_words
                )));
            }
            let header_words = word(3)?;
            let txbin = if &code == b"IP" && header_words >= 10 {
                Some(word(9)? as u16)
            } else {
                None
            };
            let block = FieldBlock {
                code,
                start: offset,
                gates: word(2)?,
                header_words,
                txbin,
            };
            (block, length_words)
        };
        blocks.push(block);
        offset += length_words * 2;
    }
    Ok(blocks)
}

/// A complete ray cut out of a tape block.
#[derive(Debug, Clone)]
pub struct RawRay {
    pub bytes: Vec<u8>,
    pub order: ByteOrder,
}

/// Locates `"CD"` rays inside physical tape blocks.
///
/// A block may hold several rays; a ray with an implausible length
/// discards the remainder of its block.
#[derive(Debug, Default)]
pub struct RayReader {
    block: Vec<u8>,
    cursor: usize,
    discarded_blocks: u64,
}

impl RayReader {
    pub fn discarded_blocks(&self) -> u64 {
        self.discarded_blocks
    }

    pub fn next_ray(&mut self, source: &mut dyn crate::prelude::RecordSource) -> GateResult<Option<RawRay>> {
        loop {
            if let Some(ray) = self.take_ray() {
                return Ok(Some(ray));
            }
            match source.read_record()? {
                Some(block) => {
                    self.block = block;
                    self.cursor = 0;
                }
                None => return Ok(None),
            }
        }
    }

    fn take_ray(&mut self) -> Option<RawRay> {
        let mut position = self.cursor;
        while position + 2 <= self.block.len() {
            if &self.block[position..position + 2] != RAY_TAG {
                position += 2;
                continue;
            }
            let rest = &self.block[position..];
            let order = detect_order(rest);
            let raylen_bytes = Words::new(rest, order).word(1).unwrap_or(0) as usize * 2;
            if raylen_bytes == 0 || raylen_bytes > MAX_BLOCK_WORDS * 2 || raylen_bytes > rest.len() {
                log::debug!(
                    "chill: ray length {} bytes at offset {} implausible, dropping block",
                    raylen_bytes,
                    position
                );
                self.discard();
                return None;
            }
            self.cursor = position + raylen_bytes;
            return Some(RawRay {
                bytes: rest[..raylen_bytes].to_vec(),
                order,
            });
        }
        self.block.clear();
        self.cursor = 0;
        None
    }

    fn discard(&mut self) {
        self.discarded_blocks += 1;
        self.block.clear();
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::testdata::{chill_ray, ChillRayFixture};
    use crate::source::MemorySource;

    #[test]
    fn detects_swapped_rays_from_day_of_month() {
        let little = chill_ray(&ChillRayFixture::default());
        let big = chill_ray(&ChillRayFixture {
            order: ByteOrder::Big,
            ..Default::default()
        });
        assert_eq!(detect_order(&little), ByteOrder::Little);
        assert_eq!(detect_order(&big), ByteOrder::Big);

        let a = Housekeeping::parse(&little, ByteOrder::Little).unwrap();
        let b = Housekeeping::parse(&big, ByteOrder::Big).unwrap();
        assert_eq!(a.day, b.day);
        assert_eq!(a.segment_name, b.segment_name);
    }

    #[test]
    fn short_offset_hides_extended_words() {
        let ray = chill_ray(&ChillRayFixture {
            offset1: 12,
            ..Default::default()
        });
        let hsk = Housekeeping::parse(&ray, ByteOrder::Little).unwrap();
        assert!(!hsk.is_extended());
        assert_eq!(hsk.prt_us, None);
        assert_eq!(hsk.segment_name, None);
    }

    #[test]
    fn field_blocks_report_codes_and_txbin() {
        let fixture = ChillRayFixture::default();
        let ray = chill_ray(&fixture);
        let hsk = Housekeeping::parse(&ray, ByteOrder::Little).unwrap();
        let blocks = scan_fields(&ray, &hsk, ray.len()).unwrap();
        let codes: Vec<&str> = blocks.iter().map(FieldBlock::code_str).collect();
        assert_eq!(codes, vec!["IP", "VR"]);
        assert_eq!(blocks[0].txbin, Some(fixture.txbin));
        assert!(blocks[1].matches("VE"));
    }

    #[test]
    fn zero_length_block_rejects_ray() {
        let mut ray = chill_ray(&ChillRayFixture::default());
        let hsk = Housekeeping::parse(&ray, ByteOrder::Little).unwrap();
        let first_block = (3 + hsk.offset1) * 2;
        ray[first_block + 2] = 0;
        ray[first_block + 3] = 0;
        assert!(scan_fields(&ray, &hsk, ray.len()).is_err());
    }

    #[test]
    fn reader_splits_blocks_and_skips_garbage() {
        let ray = chill_ray(&ChillRayFixture::default());
        let mut block = vec![0xee, 0xee];
        block.extend_from_slice(&ray);
        block.extend_from_slice(&ray);
        let mut bad = b"CD".to_vec();
        bad.extend_from_slice(&[0, 0, 0, 0]);
        let mut source = MemorySource::new(vec![block, bad, ray.clone()]);

        let mut reader = RayReader::default();
        for _ in 0..3 {
            let raw = reader.next_ray(&mut source).unwrap().unwrap();
            assert_eq!(raw.bytes, ray);
        }
        assert!(reader.next_ray(&mut source).unwrap().is_none());
        assert_eq!(reader.discarded_blocks(), 1);
    }
}

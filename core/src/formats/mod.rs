//! Decoders for the five supported radar tape formats.
//!
//! Each decoder turns physical records from a [`RecordSource`] into
//! [`RawBeamRecord`](crate::beam::RawBeamRecord)s. Malformed records are skipped (or rescanned) inside the
//! decoder; the caller only ever sees decoded beams or the end of the stream.

pub mod alenia;
pub mod chill;
pub mod lass;
pub mod lincoln;
pub mod rp7;
#[cfg(test)]
pub(crate) mod testdata;

use crate::config::{GateConfig, RadarFormat};
use crate::prelude::{BeamDecoder, GateError, GateResult, RecordSource};
use chrono::NaiveDate;

/// Builds the decoder for the configured format.
pub fn build_decoder(config: &GateConfig) -> GateResult<Box<dyn BeamDecoder>> {
    let decoder: Box<dyn BeamDecoder> = match config.format {
        RadarFormat::Lincoln => Box::new(lincoln::LincolnDecoder::new(config)),
        RadarFormat::Rp7 => Box::new(rp7::Rp7Decoder::new(config)),
        RadarFormat::Chill => Box::new(chill::ChillDecoder::new(config)?),
        RadarFormat::Lass => Box::new(lass::LassDecoder::new(config)),
        RadarFormat::Alenia => Box::new(alenia::AleniaDecoder::new(config)),
    };
    Ok(decoder)
}

/// Linear transform from a raw sample byte to physical units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NativeScale {
    pub scale: f64,
    pub bias: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Big,
    Little,
}

/// 16/32-bit reads at byte offsets with an explicit byte order.
#[derive(Debug, Clone, Copy)]
pub struct Words<'a> {
    bytes: &'a [u8],
    order: ByteOrder,
}

impl<'a> Words<'a> {
    pub fn new(bytes: &'a [u8], order: ByteOrder) -> Self {
        Self { bytes, order }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn u16_at(&self, offset: usize) -> Option<u16> {
        let raw: [u8; 2] = self.bytes.get(offset..offset + 2)?.try_into().ok()?;
        Some(match self.order {
            ByteOrder::Big => u16::from_be_bytes(raw),
            ByteOrder::Little => u16::from_le_bytes(raw),
        })
    }

    pub fn i16_at(&self, offset: usize) -> Option<i16> {
        self.u16_at(offset).map(|value| value as i16)
    }

    pub fn i32_at(&self, offset: usize) -> Option<i32> {
        let raw: [u8; 4] = self.bytes.get(offset..offset + 4)?.try_into().ok()?;
        Some(match self.order {
            ByteOrder::Big => i32::from_be_bytes(raw),
            ByteOrder::Little => i32::from_le_bytes(raw),
        })
    }

    /// 16-bit word by word index.
    pub fn word(&self, index: usize) -> Option<u16> {
        self.u16_at(index * 2)
    }

    pub fn signed_word(&self, index: usize) -> Option<i16> {
        self.i16_at(index * 2)
    }

    /// 32-bit value spanning words `index` and `index + 1`.
    pub fn long_word(&self, index: usize) -> Option<i32> {
        self.i32_at(index * 2)
    }
}

/// Missing bytes inside a record that passed its length checks.
pub(crate) fn short_record(format: &str) -> GateError {
    GateError::Framing(format!("{format} record truncated"))
}

/// Unix seconds for a broken-down UTC time, `None` if any part is out of range.
pub fn epoch_seconds(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
) -> Option<i64> {
    NaiveDate::from_ymd_opt(year, month, day)?
        .and_hms_opt(hour, minute, second)
        .map(|time| time.and_utc().timestamp())
}

/// Expands a two-digit year; values above `pivot` belong to the 1900s.
pub fn expand_year(year: i32, pivot: i32) -> i32 {
    if year >= 1900 {
        year
    } else if year > pivot {
        year + 1900
    } else {
        year + 2000
    }
}

/// Decodes one packed BCD byte, `None` if either nibble exceeds 9.
pub fn bcd_to_u8(byte: u8) -> Option<u8> {
    let high = byte >> 4;
    let low = byte & 0x0f;
    (high <= 9 && low <= 9).then_some(high * 10 + low)
}

/// Reads records until `decode` accepts one, counting the rejects.
pub(crate) fn next_decoded<T>(
    source: &mut dyn RecordSource,
    format: &str,
    rejected: &mut u64,
    mut decode: impl FnMut(&[u8]) -> GateResult<T>,
) -> GateResult<Option<T>> {
    while let Some(record) = source.read_record()? {
        match decode(&record) {
            Ok(beam) => return Ok(Some(beam)),
            Err(GateError::Framing(reason)) => {
                *rejected += 1;
                log::debug!("{}: skipping record of {} bytes: {}", format, record.len(), reason);
            }
            Err(other) => return Err(other),
        }
    }
    Ok(None)
}

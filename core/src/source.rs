//! Physical record sources: in-memory queues, tape images and tape devices.

use crate::prelude::{GateError, GateResult, RecordSource};
use serde::Serialize;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read};
use std::path::Path;

/// Consecutive read failures tolerated before a device is given up.
pub const MAX_READ_ERRORS: u32 = 20;
/// Largest physical tape record.
pub const MAX_RECORD_BYTES: usize = 65536;

/// Records queued in memory.
#[derive(Debug, Default)]
pub struct MemorySource {
    records: VecDeque<Vec<u8>>,
}

impl MemorySource {
    pub fn new(records: Vec<Vec<u8>>) -> Self {
        Self {
            records: records.into(),
        }
    }

    pub fn push(&mut self, record: Vec<u8>) {
        self.records.push_back(record);
    }

    pub fn remaining(&self) -> usize {
        self.records.len()
    }
}

impl RecordSource for MemorySource {
    fn read_record(&mut self) -> GateResult<Option<Vec<u8>>> {
        Ok(self.records.pop_front())
    }
}

/// Counts consecutive read failures.
#[derive(Debug, Default)]
struct ErrorBudget {
    consecutive: u32,
}

impl ErrorBudget {
    fn failed(&mut self, device: &str, err: io::Error) -> GateResult<()> {
        self.consecutive += 1;
        log::warn!("{}: read error {} of {}: {}", device, self.consecutive, MAX_READ_ERRORS, err);
        if self.consecutive >= MAX_READ_ERRORS {
            return Err(GateError::Fatal(format!(
                "{}: {} consecutive read errors",
                device, self.consecutive
            )));
        }
        Ok(())
    }

    fn succeeded(&mut self) {
        self.consecutive = 0;
    }
}

/// Tracks file marks; two in a row is logical end of tape.
#[derive(Debug, Default)]
struct FileMarks {
    file: usize,
    pending_mark: bool,
}

impl FileMarks {
    /// Returns true at logical end of tape.
    fn mark(&mut self) -> bool {
        if self.pending_mark {
            return true;
        }
        self.pending_mark = true;
        self.file += 1;
        false
    }

    fn record(&mut self) {
        self.pending_mark = false;
    }
}

/// Tape image in the SIMH layout: every record is framed by its 32-bit
/// little-endian length on both sides, and a zero length is a file mark.
pub struct DiskImageSource<R = BufReader<File>> {
    reader: R,
    name: String,
    marks: FileMarks,
    errors: ErrorBudget,
    finished: bool,
}

impl DiskImageSource {
    pub fn open<P: AsRef<Path>>(path: P) -> GateResult<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Ok(Self::from_reader(BufReader::new(file), path.display().to_string()))
    }
}

impl<R: Read> DiskImageSource<R> {
    pub fn from_reader(reader: R, name: String) -> Self {
        Self {
            reader,
            name,
            marks: FileMarks::default(),
            errors: ErrorBudget::default(),
            finished: false,
        }
    }

    /// Length word, `None` at a clean end of file.
    fn read_length(&mut self) -> io::Result<Option<u32>> {
        let mut raw = [0u8; 4];
        match self.reader.read_exact(&mut raw) {
            Ok(()) => Ok(Some(u32::from_le_bytes(raw))),
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn read_framed(&mut self) -> io::Result<Option<Option<Vec<u8>>>> {
        let Some(length) = self.read_length()? else {
            return Ok(None);
        };
        if length == 0 {
            return Ok(Some(None));
        }
        if length as usize > MAX_RECORD_BYTES {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                format!("record length {length} exceeds {MAX_RECORD_BYTES}"),
            ));
        }
        let mut record = vec![0u8; length as usize];
        self.reader.read_exact(&mut record)?;
        match self.read_length()? {
            Some(trailer) if trailer == length => Ok(Some(Some(record))),
            other => Err(io::Error::new(
                ErrorKind::InvalidData,
                format!("record length {length} closed by {other:?}"),
            )),
        }
    }
}

impl<R: Read> RecordSource for DiskImageSource<R> {
    fn read_record(&mut self) -> GateResult<Option<Vec<u8>>> {
        while !self.finished {
            match self.read_framed() {
                Ok(None) => self.finished = true,
                Ok(Some(None)) => {
                    if self.marks.mark() {
                        log::info!("{}: logical end of tape", self.name);
                        self.finished = true;
                    }
                }
                Ok(Some(Some(record))) => {
                    self.errors.succeeded();
                    self.marks.record();
                    return Ok(Some(record));
                }
                Err(err) if err.kind() == ErrorKind::UnexpectedEof => self.finished = true,
                Err(err) => self.errors.failed(&self.name, err)?,
            }
        }
        Ok(None)
    }

    fn file_number(&self) -> usize {
        self.marks.file
    }
}

/// Character tape device: one `read` returns one physical record, a zero
/// byte read is a file mark.
pub struct TapeDevice<R = File> {
    device: R,
    name: String,
    buffer: Vec<u8>,
    marks: FileMarks,
    errors: ErrorBudget,
    finished: bool,
}

impl TapeDevice {
    pub fn open<P: AsRef<Path>>(path: P) -> GateResult<Self> {
        let path = path.as_ref();
        let device = File::open(path)?;
        Ok(Self::from_reader(device, path.display().to_string()))
    }
}

impl<R: Read> TapeDevice<R> {
    pub fn from_reader(device: R, name: String) -> Self {
        Self {
            device,
            name,
            buffer: vec![0; MAX_RECORD_BYTES],
            marks: FileMarks::default(),
            errors: ErrorBudget::default(),
            finished: false,
        }
    }
}

impl<R: Read> RecordSource for TapeDevice<R> {
    fn read_record(&mut self) -> GateResult<Option<Vec<u8>>> {
        while !self.finished {
            match self.device.read(&mut self.buffer) {
                Ok(0) => {
                    if self.marks.mark() {
                        log::info!("{}: logical end of tape", self.name);
                        self.finished = true;
                    }
                }
                Ok(n) => {
                    self.errors.succeeded();
                    self.marks.record();
                    return Ok(Some(self.buffer[..n].to_vec()));
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => self.errors.failed(&self.name, err)?,
            }
        }
        Ok(None)
    }

    fn file_number(&self) -> usize {
        self.marks.file
    }
}

/// Record statistics for one tape file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileSummary {
    pub file: usize,
    pub records: u64,
    pub bytes: u64,
    pub min_record: usize,
    pub max_record: usize,
}

/// Reads the whole source and summarizes each tape file.
pub fn list_files(source: &mut dyn RecordSource) -> GateResult<Vec<FileSummary>> {
    let mut files: Vec<FileSummary> = Vec::new();
    while let Some(record) = source.read_record()? {
        let file = source.file_number();
        if files.last().map(|summary| summary.file) != Some(file) {
            files.push(FileSummary {
                file,
                min_record: usize::MAX,
                ..Default::default()
            });
        }
        if let Some(summary) = files.last_mut() {
            summary.records += 1;
            summary.bytes += record.len() as u64;
            summary.min_record = summary.min_record.min(record.len());
            summary.max_record = summary.max_record.max(record.len());
        }
    }
    Ok(files)
}

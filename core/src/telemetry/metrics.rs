use serde::Serialize;
use std::sync::Mutex;

/// Counters for one run, logged at exit and serializable to JSON.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    pub records_read: u64,
    pub beams_decoded: u64,
    pub beams_valid: u64,
    pub beams_invalid: u64,
    pub data_packets_sent: u64,
    pub param_packets_sent: u64,
    pub packets_dropped: u64,
    pub resyncs: u64,
}

impl StreamStats {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Params,
    Data,
}

/// Shared, lock-protected run counters.
#[derive(Debug, Default)]
pub struct StatsRecorder {
    inner: Mutex<StreamStats>,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, apply: impl FnOnce(&mut StreamStats)) {
        if let Ok(mut stats) = self.inner.lock() {
            apply(&mut stats);
        }
    }

    pub fn record_read(&self) {
        self.update(|stats| stats.records_read += 1);
    }

    pub fn record_beam(&self, valid: bool) {
        self.update(|stats| {
            stats.beams_decoded += 1;
            if valid {
                stats.beams_valid += 1;
            } else {
                stats.beams_invalid += 1;
            }
        });
    }

    pub fn record_packet(&self, kind: PacketKind, delivered: bool) {
        self.update(|stats| match (kind, delivered) {
            (_, false) => stats.packets_dropped += 1,
            (PacketKind::Params, true) => stats.param_packets_sent += 1,
            (PacketKind::Data, true) => stats.data_packets_sent += 1,
        });
    }

    pub fn set_resyncs(&self, resyncs: u64) {
        self.update(|stats| stats.resyncs = resyncs);
    }

    pub fn snapshot(&self) -> StreamStats {
        self.inner.lock().map(|stats| *stats).unwrap_or_default()
    }
}

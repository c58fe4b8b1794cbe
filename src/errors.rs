//! Demultiplexer error type.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DemuxError>;

/// Errors reported while demultiplexing a transport stream.
///
/// Variants split in two classes: per-unit errors (a CRC mismatch, a short
/// section, a dropped reassembly buffer) leave the demuxer usable and only
/// drop the affected data unit; per-stream errors (I/O failure, sync loss
/// beyond the scanning budget) repeat on every subsequent call.
#[derive(Debug, Error)]
pub enum DemuxError {
    /// A packet did not start with the sync byte. Reported once per resync
    /// event; the next call proceeds realigned.
    #[error("packet must start with a sync byte")]
    NotSynchronized,

    /// No sync byte was found within the scanning budget. The source is
    /// latched as unsynchronizable and every subsequent call fails.
    #[error("sync lost: no sync byte found within the scanning budget")]
    SyncLost,

    #[error("no more packets")]
    NoMorePackets,

    #[error("table CRC32 {expected:#010x} != computed CRC32 {computed:#010x}")]
    Crc32Mismatch { expected: u32, computed: u32 },

    #[error("short read at offset {offset}: needed {needed} bytes, {left} left")]
    ShortRead {
        offset: usize,
        needed: usize,
        left: usize,
    },

    #[error("invalid section length {0}")]
    InvalidSectionLength(u16),

    #[error("pointer field {pointer} exceeds payload of {len} bytes")]
    InvalidPointerField { pointer: usize, len: usize },

    #[error("unknown table ID {0:#04x}")]
    UnknownTableId(u8),

    #[error("reassembly buffer for PID {pid:#06x} exceeded {cap} bytes")]
    ReassemblyOverflow { pid: u16, cap: usize },

    #[error("demuxing cancelled")]
    Cancelled,

    #[error("MJD {mjd} with BCD time {hour:#04x}:{minute:#04x}:{second:#04x} is not a valid date-time")]
    InvalidDvbTime {
        mjd: u16,
        hour: u8,
        minute: u8,
        second: u8,
    },

    #[error("reading source failed")]
    Io(#[from] std::io::Error),
}

impl DemuxError {
    /// Per-stream errors that terminate the demuxer for good.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DemuxError::Io(_) | DemuxError::NoMorePackets | DemuxError::SyncLost
        )
    }
}

//! Constants for MPEG-TS framing and demultiplexing

/// MPEG-TS packet constants
pub const TS_PACKET_SIZE: usize = 188;
pub const TS_PACKET_SIZE_M2TS: usize = 192; // 188 + 4-byte timestamp
pub const TS_PACKET_SIZE_RS: usize = 204; // 188 + 16-byte Reed-Solomon parity
pub const TS_SYNC_BYTE: u8 = 0x47;

/// PES packet constants
pub const PES_START_CODE: [u8; 3] = [0x00, 0x00, 0x01];

/// Well-known PIDs
pub const PID_PAT: u16 = 0x0000;
pub const PID_CAT: u16 = 0x0001;
pub const PID_NULL: u16 = 0x1FFF;

/// Maximum value of the 12-bit PSI section length field
pub const MAX_SECTION_LENGTH: u16 = 1021;

/// Clock constants
pub const PCR_CLOCK_HZ: u64 = 27_000_000; // 27 MHz
pub const PTS_CLOCK_HZ: u64 = 90_000; // 90 kHz

/// Bytes probed when auto-detecting the packet size
pub const PACKET_SIZE_PROBE_LEN: usize = 1024;

/// Scanning budget before a lost sync becomes fatal
pub const DEFAULT_RESYNC_LIMIT: usize = 1 << 20; // 1 MiB

/// Per-PID reassembly buffer cap
pub const DEFAULT_REASSEMBLY_CAP: usize = 4 << 20; // 4 MiB

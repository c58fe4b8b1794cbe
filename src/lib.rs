//! MPEG-2 Transport Stream demultiplexer and PSI/SI table engine.
//!
//! The demuxer is pull-based: wrap a blocking byte source with
//! [`Demuxer::new`] and call [`Demuxer::next_data`] repeatedly. Each call
//! reads as many packets as needed to complete the next coherent unit, a
//! PSI/SI table (PAT, PMT, NIT, SDT, EIT, TOT) or a PES packet.
//!
//! ```no_run
//! use mpegts_demux::{DataPayload, DemuxError, Demuxer};
//!
//! # fn main() -> Result<(), DemuxError> {
//! let file = std::fs::File::open("capture.ts")?;
//! let mut dmx = Demuxer::new(file);
//! loop {
//!     match dmx.next_data() {
//!         Ok(d) => {
//!             if let DataPayload::Pmt(pmt) = &d.payload {
//!                 println!("program {} has {} streams", pmt.program_number, pmt.streams.len());
//!             }
//!         }
//!         Err(DemuxError::NoMorePackets) => break,
//!         Err(e) if e.is_fatal() => return Err(e),
//!         Err(e) => eprintln!("skipping unit: {e}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod constants;
pub mod cursor;
pub mod data;
pub mod demuxer;
pub mod descriptor;
pub mod dvb;
pub mod errors;
pub mod packet;
pub mod packet_buffer;
pub mod packet_pool;
pub mod pes;
pub mod program_map;
pub mod psi;

pub use clock::ClockReference;
pub use data::{DataPayload, DemuxedData};
pub use demuxer::{CancelToken, Demuxer, PacketsParser};
pub use errors::{DemuxError, Result};
pub use packet::{AdaptationField, Packet, PacketHeader};
pub use packet_pool::PacketGroup;
pub use program_map::ProgramMap;

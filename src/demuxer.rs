//! Pull-based demultiplexer: packets in, coherent data units out.

use std::collections::VecDeque;
use std::io::{Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::constants::{DEFAULT_REASSEMBLY_CAP, DEFAULT_RESYNC_LIMIT};
use crate::data::{parse_group, DataPayload, DemuxedData};
use crate::errors::{DemuxError, Result};
use crate::packet::Packet;
use crate::packet_buffer::PacketBuffer;
use crate::packet_pool::{PacketGroup, PacketPool};
use crate::program_map::ProgramMap;

/// Hook run on every completed packet group before default classification.
/// Returns the units it produced and whether the default pipeline should be
/// skipped for this group.
pub type PacketsParser = Box<dyn FnMut(&PacketGroup) -> Result<(Vec<DemuxedData>, bool)>>;

/// Cooperative cancellation flag, checked at the top of each
/// [`Demuxer::next_data`] iteration.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Transport stream demultiplexer over a blocking byte source.
///
/// Each [`next_data`](Demuxer::next_data) call reads zero or more packets,
/// advances internal state, and returns at most one data unit. Per-unit
/// errors (CRC mismatch, short section, dropped reassembly buffer, a one-off
/// sync loss) are returned to the caller and the demuxer stays usable.
pub struct Demuxer<R: Read> {
    source: Option<R>,
    packet_buffer: Option<PacketBuffer<R>>,
    packet_pool: PacketPool,
    program_map: ProgramMap,
    data_buffer: VecDeque<DemuxedData>,
    packet_size: Option<usize>,
    resync_limit: usize,
    packets_parser: Option<PacketsParser>,
    cancel: CancelToken,
}

impl<R: Read> Demuxer<R> {
    pub fn new(source: R) -> Self {
        Self {
            source: Some(source),
            packet_buffer: None,
            packet_pool: PacketPool::new(DEFAULT_REASSEMBLY_CAP),
            program_map: ProgramMap::new(),
            data_buffer: VecDeque::new(),
            packet_size: None,
            resync_limit: DEFAULT_RESYNC_LIMIT,
            packets_parser: None,
            cancel: CancelToken::new(),
        }
    }

    /// Fixes the frame size (188, 192 or 204) instead of auto-detecting.
    pub fn with_packet_size(mut self, size: usize) -> Self {
        self.packet_size = Some(size);
        self
    }

    /// Bounds each PID's reassembly buffer.
    pub fn with_reassembly_cap(mut self, cap: usize) -> Self {
        self.packet_pool = PacketPool::new(cap);
        self
    }

    /// Bounds the bytes scanned while recovering sync before giving up.
    pub fn with_resync_limit(mut self, limit: usize) -> Self {
        self.resync_limit = limit;
        self
    }

    /// Installs a custom packet-group parser.
    pub fn with_packets_parser(mut self, parser: PacketsParser) -> Self {
        self.packets_parser = Some(parser);
        self
    }

    /// Token for cancelling from another context.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// PMT PIDs learned from PATs so far.
    pub fn program_map(&self) -> &ProgramMap {
        &self.program_map
    }

    /// Continuity counter jumps observed so far.
    pub fn continuity_errors(&self) -> u64 {
        self.packet_pool.continuity_errors()
    }

    /// Returns the next raw packet from the source.
    pub fn next_packet(&mut self) -> Result<Packet> {
        if self.packet_buffer.is_none() {
            let r = match self.source.take() {
                Some(r) => r,
                None => return Err(DemuxError::NoMorePackets),
            };
            self.packet_buffer = Some(PacketBuffer::new(r, self.packet_size, self.resync_limit)?);
        }
        match self.packet_buffer.as_mut() {
            Some(b) => b.next(),
            None => Err(DemuxError::NoMorePackets),
        }
    }

    /// Returns the next demultiplexed data unit.
    ///
    /// At end of stream the pool remainder is flushed and attempted one last
    /// time (silently dropping whatever no longer parses), then
    /// `NoMorePackets` is returned.
    pub fn next_data(&mut self) -> Result<DemuxedData> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(DemuxError::Cancelled);
            }
            if let Some(d) = self.data_buffer.pop_front() {
                return Ok(d);
            }

            let p = match self.next_packet() {
                Ok(p) => p,
                Err(DemuxError::NoMorePackets) => return self.drain_pool(),
                Err(e) => return Err(e),
            };
            let group = match self.packet_pool.add(p)? {
                Some(g) => g,
                None => continue,
            };
            let units = self.process_group(&group)?;
            self.learn_programs(&units);
            self.data_buffer.extend(units);
        }
    }

    /// Resets all demuxing state and seeks the source back to the start.
    pub fn rewind(&mut self) -> Result<u64>
    where
        R: Seek,
    {
        self.data_buffer.clear();
        self.packet_pool.clear();
        let mut r = match self.packet_buffer.take() {
            Some(b) => b.into_inner(),
            None => match self.source.take() {
                Some(r) => r,
                None => return Err(DemuxError::NoMorePackets),
            },
        };
        let n = r.seek(SeekFrom::Start(0))?;
        self.source = Some(r);
        Ok(n)
    }

    fn process_group(&mut self, group: &PacketGroup) -> Result<Vec<DemuxedData>> {
        let mut units = Vec::new();
        if let Some(parser) = &mut self.packets_parser {
            let (custom, skip) = parser(group)?;
            units = custom;
            if skip {
                return Ok(units);
            }
        }
        units.extend(parse_group(group, &self.program_map)?);
        Ok(units)
    }

    fn learn_programs(&mut self, units: &[DemuxedData]) {
        for u in units {
            if let DataPayload::Pat(pat) = &u.payload {
                for e in &pat.programs {
                    // program number 0 designates the NIT
                    if e.program_number > 0 {
                        self.program_map.set(e.pid, e.program_number);
                    }
                }
            }
        }
    }

    fn drain_pool(&mut self) -> Result<DemuxedData> {
        for group in self.packet_pool.dump() {
            match self.process_group(&group) {
                Ok(units) => {
                    self.learn_programs(&units);
                    self.data_buffer.extend(units);
                }
                // trailing partial units fail silently
                Err(e) => log::debug!("dropping partial unit on PID {:#06x}: {e}", group.pid),
            }
        }
        self.data_buffer.pop_front().ok_or(DemuxError::NoMorePackets)
    }
}

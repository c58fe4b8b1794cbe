//! Per-PID payload reassembly.
//!
//! A payload unit (PSI table collection or PES packet) may span several
//! packets of the same PID. The pool accumulates payload bytes per PID and
//! flushes a completed group when the next unit starts on that PID.

use std::collections::{BTreeMap, HashMap};

use crate::errors::{DemuxError, Result};
use crate::packet::Packet;

/// A completed payload unit: joined payload plus the packet that started it.
#[derive(Debug, Clone, PartialEq)]
pub struct PacketGroup {
    pub pid: u16,
    pub first_packet: Packet,
    pub payload: Vec<u8>,
}

struct PoolBuffer {
    first_packet: Packet,
    payload: Vec<u8>,
}

impl PoolBuffer {
    fn into_group(self, pid: u16) -> PacketGroup {
        PacketGroup {
            pid,
            first_packet: self.first_packet,
            payload: self.payload,
        }
    }
}

pub struct PacketPool {
    // BTreeMap keeps dump() deterministic, PIDs ascending
    buffers: BTreeMap<u16, PoolBuffer>,
    cap: usize,
    last_cc: HashMap<u16, u8>,
    continuity_errors: u64,
}

impl PacketPool {
    /// `cap` bounds each PID's accumulating buffer.
    pub fn new(cap: usize) -> Self {
        Self {
            buffers: BTreeMap::new(),
            cap,
            last_cc: HashMap::new(),
            continuity_errors: 0,
        }
    }

    /// Continuity counter jumps seen so far. Tolerated, never fatal.
    pub fn continuity_errors(&self) -> u64 {
        self.continuity_errors
    }

    /// Feeds one packet. Returns the group completed by this packet, if any.
    ///
    /// A buffer growing past the cap is dropped and reported as
    /// [`DemuxError::ReassemblyOverflow`]; the pool stays usable.
    pub fn add(&mut self, p: Packet) -> Result<Option<PacketGroup>> {
        if !p.header.has_payload {
            return Ok(None);
        }
        let pid = p.header.pid;
        self.track_continuity(&p);

        if p.header.payload_unit_start_indicator || !self.buffers.contains_key(&pid) {
            let flushed = self.buffers.remove(&pid).map(|b| b.into_group(pid));
            let payload = p.payload.clone();
            self.buffers.insert(
                pid,
                PoolBuffer {
                    first_packet: p,
                    payload,
                },
            );
            return Ok(flushed);
        }

        // the entry is present; checked just above
        if let Some(buf) = self.buffers.get_mut(&pid) {
            if buf.payload.len() + p.payload.len() > self.cap {
                self.buffers.remove(&pid);
                log::warn!("dropping reassembly buffer for PID {pid:#06x}");
                return Err(DemuxError::ReassemblyOverflow { pid, cap: self.cap });
            }
            buf.payload.extend_from_slice(&p.payload);
        }
        Ok(None)
    }

    /// Flushes every remaining buffer, PIDs ascending. Used at end of
    /// stream.
    pub fn dump(&mut self) -> Vec<PacketGroup> {
        let buffers = std::mem::take(&mut self.buffers);
        buffers
            .into_iter()
            .map(|(pid, b)| b.into_group(pid))
            .collect()
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
        self.last_cc.clear();
    }

    fn track_continuity(&mut self, p: &Packet) {
        let discontinuity = p
            .adaptation_field
            .as_ref()
            .map(|af| af.discontinuity_indicator)
            .unwrap_or(false);
        let cc = p.header.continuity_counter;
        if let Some(prev) = self.last_cc.insert(p.header.pid, cc) {
            if !discontinuity && cc != (prev + 1) & 0x0F {
                self.continuity_errors += 1;
                log::warn!(
                    "continuity counter jump on PID {:#06x}: {prev} -> {cc}",
                    p.header.pid
                );
            }
        }
    }
}

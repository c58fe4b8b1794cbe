//! Byte-stream framing: slices a reader into packet frames, auto-detecting
//! the frame size and recovering from sync loss.

use std::io::Read;

use crate::constants::{
    PACKET_SIZE_PROBE_LEN, TS_PACKET_SIZE, TS_PACKET_SIZE_M2TS, TS_PACKET_SIZE_RS, TS_SYNC_BYTE,
};
use crate::errors::{DemuxError, Result};
use crate::packet::Packet;

const FRAME_SIZES: [usize; 3] = [TS_PACKET_SIZE, TS_PACKET_SIZE_M2TS, TS_PACKET_SIZE_RS];

pub struct PacketBuffer<R: Read> {
    r: R,
    packet_size: usize,
    /// Bytes read ahead of the consumer (probe remainder, resync tail).
    pending: Vec<u8>,
    resync_limit: usize,
    lost: bool,
}

impl<R: Read> PacketBuffer<R> {
    /// Creates a buffer over `r`. Without an explicit `packet_size` the
    /// first KiB is probed for sync bytes at a consistent stride; any bytes
    /// before the first sync are discarded.
    pub fn new(r: R, packet_size: Option<usize>, resync_limit: usize) -> Result<Self> {
        let mut pb = Self {
            r,
            packet_size: packet_size.unwrap_or(0),
            pending: Vec::new(),
            resync_limit,
            lost: false,
        };
        if pb.packet_size == 0 {
            pb.auto_detect()?;
        }
        Ok(pb)
    }

    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    /// True once the scanning budget was exhausted without finding a sync;
    /// from then on `next()` returns `SyncLost`.
    pub fn is_lost(&self) -> bool {
        self.lost
    }

    pub fn into_inner(self) -> R {
        self.r
    }

    /// Returns the next packet, `NoMorePackets` at clean end of stream,
    /// `NotSynchronized` once per resync event, or `SyncLost` once the
    /// scanning budget is exhausted.
    pub fn next(&mut self) -> Result<Packet> {
        if self.lost {
            return Err(DemuxError::SyncLost);
        }
        self.fill(self.packet_size)?;
        if self.pending[0] != TS_SYNC_BYTE {
            self.resync()?;
        }
        let frame: Vec<u8> = self.pending.drain(..self.packet_size).collect();
        Packet::parse(&frame)
    }

    fn auto_detect(&mut self) -> Result<()> {
        // a short stream is fine here; next() will report the end
        if let Err(e) = self.fill(PACKET_SIZE_PROBE_LEN) {
            if !matches!(e, DemuxError::NoMorePackets) {
                return Err(e);
            }
        }
        let probe = &self.pending;

        for idx in 0..probe.len() {
            if probe[idx] != TS_SYNC_BYTE {
                continue;
            }
            for s in FRAME_SIZES {
                if idx + s < probe.len()
                    && probe[idx + s] == TS_SYNC_BYTE
                    && (idx + 2 * s >= probe.len() || probe[idx + 2 * s] == TS_SYNC_BYTE)
                {
                    self.packet_size = s;
                    self.pending.drain(..idx);
                    return Ok(());
                }
            }
            if idx + TS_PACKET_SIZE >= probe.len() {
                // lone trailing packet, nothing to corroborate against
                self.packet_size = TS_PACKET_SIZE;
                self.pending.drain(..idx);
                return Ok(());
            }
        }
        // no sync in the probe; scan on with the bare size
        self.packet_size = TS_PACKET_SIZE;
        Ok(())
    }

    /// Drops bytes until the next sync byte, bounded by the resync budget.
    fn resync(&mut self) -> Result<()> {
        let mut scanned = 0usize;
        loop {
            if let Some(pos) = self.pending.iter().position(|b| *b == TS_SYNC_BYTE) {
                scanned += pos;
                self.pending.drain(..pos);
                if scanned > self.resync_limit {
                    self.lost = true;
                    return Err(DemuxError::SyncLost);
                }
                log::warn!("lost sync, skipped {scanned} bytes");
                // refill so the caller's next call gets a full frame
                self.fill(self.packet_size)?;
                return Err(DemuxError::NotSynchronized);
            }
            scanned += self.pending.len();
            self.pending.clear();
            if scanned > self.resync_limit {
                self.lost = true;
                return Err(DemuxError::SyncLost);
            }
            self.fill(1)?;
        }
    }

    /// Buffers at least `n` bytes; `NoMorePackets` when the source ends
    /// first.
    fn fill(&mut self, n: usize) -> Result<()> {
        let mut buf = [0u8; 4096];
        while self.pending.len() < n {
            let m = self.r.read(&mut buf)?;
            if m == 0 {
                return Err(DemuxError::NoMorePackets);
            }
            self.pending.extend_from_slice(&buf[..m]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_RESYNC_LIMIT;
    use std::io::Cursor;

    fn frame_188(pid: u16, cc: u8) -> Vec<u8> {
        let mut f = vec![
            0x47,
            0x40 | (pid >> 8) as u8,
            pid as u8,
            0x10 | (cc & 0x0F),
        ];
        f.resize(TS_PACKET_SIZE, 0x00);
        f
    }

    fn buffer(stream: Vec<u8>, size: Option<usize>) -> PacketBuffer<Cursor<Vec<u8>>> {
        PacketBuffer::new(Cursor::new(stream), size, DEFAULT_RESYNC_LIMIT).unwrap()
    }

    #[test]
    fn yields_packets_then_no_more() {
        let mut stream = frame_188(0x100, 0);
        stream.extend(frame_188(0x101, 1));
        let mut pb = buffer(stream, Some(TS_PACKET_SIZE));
        assert_eq!(pb.next().unwrap().header.pid, 0x100);
        assert_eq!(pb.next().unwrap().header.pid, 0x101);
        assert!(matches!(pb.next(), Err(DemuxError::NoMorePackets)));
        // end of stream is sticky
        assert!(matches!(pb.next(), Err(DemuxError::NoMorePackets)));
    }

    #[test]
    fn auto_detects_bare_188() {
        let mut stream = frame_188(0x30, 0);
        stream.extend(frame_188(0x30, 1));
        stream.extend(frame_188(0x30, 2));
        let mut pb = buffer(stream, None);
        assert_eq!(pb.packet_size(), TS_PACKET_SIZE);
        assert_eq!(pb.next().unwrap().header.pid, 0x30);
    }

    #[test]
    fn auto_detects_192_with_leading_prefix() {
        // each frame: sync-led 188 bytes followed by a 4-byte timestamp;
        // the stream opens with the first frame's 4-byte prefix
        let mut stream = vec![0x00, 0x11, 0x22, 0x33];
        for cc in 0..5 {
            stream.extend(frame_188(0x42, cc));
            stream.extend_from_slice(&[0x00, 0x11, 0x22, 0x33]);
        }
        let mut pb = buffer(stream, None);
        assert_eq!(pb.packet_size(), TS_PACKET_SIZE_M2TS);
        let p = pb.next().unwrap();
        assert_eq!(p.header.pid, 0x42);
        assert_eq!(p.payload.len(), 184);
        assert_eq!(pb.next().unwrap().header.continuity_counter, 1);
    }

    #[test]
    fn auto_detects_204_with_parity_suffix() {
        let mut stream = Vec::new();
        for cc in 0..5 {
            stream.extend(frame_188(0x55, cc));
            stream.extend_from_slice(&[0xAB; 16]);
        }
        let mut pb = buffer(stream, None);
        assert_eq!(pb.packet_size(), TS_PACKET_SIZE_RS);
        assert_eq!(pb.next().unwrap().header.pid, 0x55);
        assert_eq!(pb.next().unwrap().header.continuity_counter, 1);
    }

    #[test]
    fn resyncs_after_garbage() {
        let mut stream = frame_188(0x10, 0);
        stream.extend_from_slice(&[0x00; 37]); // mid-stream junk
        stream.extend(frame_188(0x11, 1));
        let mut pb = buffer(stream, Some(TS_PACKET_SIZE));
        assert_eq!(pb.next().unwrap().header.pid, 0x10);
        assert!(matches!(pb.next(), Err(DemuxError::NotSynchronized)));
        assert!(!pb.is_lost());
        assert_eq!(pb.next().unwrap().header.pid, 0x11);
    }

    #[test]
    fn sync_loss_beyond_budget_is_latched() {
        let mut stream = frame_188(0x10, 0);
        stream.extend_from_slice(&vec![0x00; 2048]);
        let mut pb =
            PacketBuffer::new(Cursor::new(stream), Some(TS_PACKET_SIZE), 1024).unwrap();
        assert_eq!(pb.next().unwrap().header.pid, 0x10);
        let err = pb.next().unwrap_err();
        assert!(matches!(err, DemuxError::SyncLost));
        assert!(err.is_fatal());
        assert!(pb.is_lost());
        assert!(matches!(pb.next(), Err(DemuxError::SyncLost)));
    }
}

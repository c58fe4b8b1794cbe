//! TS packet framing: 4-byte header, adaptation field, payload.

use std::io;

use crate::clock::{parse_clock_reference, parse_timestamp, write_clock_reference, write_timestamp, ClockReference};
use crate::constants::{TS_PACKET_SIZE, TS_SYNC_BYTE};
use crate::cursor::ByteCursor;
use crate::errors::{DemuxError, Result};

/// One transport stream packet.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub header: PacketHeader,
    pub adaptation_field: Option<AdaptationField>,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub transport_error_indicator: bool,
    pub payload_unit_start_indicator: bool,
    pub transport_priority: bool,
    pub pid: u16,
    pub scrambling_control: ScramblingControl,
    pub has_adaptation_field: bool,
    pub has_payload: bool,
    pub continuity_counter: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScramblingControl {
    NotScrambled,
    Reserved,
    ScrambledWithEvenKey,
    ScrambledWithOddKey,
}

impl ScramblingControl {
    fn from_bits(b: u8) -> Self {
        match b & 0x3 {
            0 => ScramblingControl::NotScrambled,
            1 => ScramblingControl::Reserved,
            2 => ScramblingControl::ScrambledWithEvenKey,
            _ => ScramblingControl::ScrambledWithOddKey,
        }
    }

    fn bits(self) -> u8 {
        match self {
            ScramblingControl::NotScrambled => 0,
            ScramblingControl::Reserved => 1,
            ScramblingControl::ScrambledWithEvenKey => 2,
            ScramblingControl::ScrambledWithOddKey => 3,
        }
    }
}

/// Adaptation field. Optional parts keep their wire order; anything past the
/// last present field up to `length` is stuffing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AdaptationField {
    pub length: u8,
    pub discontinuity_indicator: bool,
    pub random_access_indicator: bool,
    pub elementary_stream_priority_indicator: bool,
    pub pcr: Option<ClockReference>,
    pub opcr: Option<ClockReference>,
    pub splice_countdown: Option<i8>,
    pub transport_private_data: Option<Vec<u8>>,
    pub extension: Option<AdaptationExtension>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AdaptationExtension {
    pub length: u8,
    pub legal_time_window: Option<LegalTimeWindow>,
    pub piecewise_rate: Option<u32>,
    pub seamless_splice: Option<SeamlessSplice>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegalTimeWindow {
    pub valid: bool,
    pub offset: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeamlessSplice {
    pub splice_type: u8,
    pub dts_next_access_unit: u64,
}

impl Packet {
    /// Parses one packet from a frame starting at the sync byte. Frames
    /// longer than 188 bytes (192/204 framing) carry trailing bytes that are
    /// ignored here.
    pub fn parse(frame: &[u8]) -> Result<Packet> {
        if frame.first() != Some(&TS_SYNC_BYTE) {
            return Err(DemuxError::NotSynchronized);
        }
        if frame.len() < TS_PACKET_SIZE {
            return Err(DemuxError::ShortRead {
                offset: 0,
                needed: TS_PACKET_SIZE,
                left: frame.len(),
            });
        }
        let mut c = ByteCursor::new(&frame[..TS_PACKET_SIZE]);
        c.skip(1);

        let header = PacketHeader::parse(&mut c)?;
        let adaptation_field = if header.has_adaptation_field {
            Some(AdaptationField::parse(&mut c)?)
        } else {
            None
        };
        let payload = if header.has_payload {
            c.next_bytes(c.bytes_left())?.to_vec()
        } else {
            Vec::new()
        };
        Ok(Packet {
            header,
            adaptation_field,
            payload,
        })
    }

    /// Serializes back to a 188-byte frame, padding any slack with `0xFF`.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(TS_PACKET_SIZE);
        out.push(TS_SYNC_BYTE);
        self.header.write(&mut out);
        if let Some(af) = &self.adaptation_field {
            af.write(&mut out)?;
        }
        out.extend_from_slice(&self.payload);
        if out.len() > TS_PACKET_SIZE {
            return Err(overflow("packet exceeds 188 bytes"));
        }
        out.resize(TS_PACKET_SIZE, 0xFF);
        Ok(out)
    }
}

impl PacketHeader {
    fn parse(c: &mut ByteCursor) -> Result<PacketHeader> {
        let b = c.next_bytes(3)?;
        let control = (b[2] & 0x30) >> 4;
        Ok(PacketHeader {
            transport_error_indicator: b[0] & 0x80 != 0,
            payload_unit_start_indicator: b[0] & 0x40 != 0,
            transport_priority: b[0] & 0x20 != 0,
            pid: ((b[0] & 0x1F) as u16) << 8 | b[1] as u16,
            scrambling_control: ScramblingControl::from_bits(b[2] >> 6),
            has_adaptation_field: control & 0b10 != 0,
            has_payload: control & 0b01 != 0,
            continuity_counter: b[2] & 0x0F,
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.push(
            (self.transport_error_indicator as u8) << 7
                | (self.payload_unit_start_indicator as u8) << 6
                | (self.transport_priority as u8) << 5
                | (self.pid >> 8) as u8,
        );
        out.push(self.pid as u8);
        let control = (self.has_adaptation_field as u8) << 1 | self.has_payload as u8;
        out.push(self.scrambling_control.bits() << 6 | control << 4 | self.continuity_counter);
    }
}

impl AdaptationField {
    fn parse(c: &mut ByteCursor) -> Result<AdaptationField> {
        let start = c.offset();
        let length = c.next_byte()?;
        let end = start + 1 + length as usize;
        if end > c.len() {
            return Err(DemuxError::ShortRead {
                offset: start,
                needed: 1 + length as usize,
                left: c.len() - start,
            });
        }
        let mut af = AdaptationField {
            length,
            ..Default::default()
        };
        if length == 0 {
            return Ok(af);
        }

        let flags = c.next_byte()?;
        af.discontinuity_indicator = flags & 0x80 != 0;
        af.random_access_indicator = flags & 0x40 != 0;
        af.elementary_stream_priority_indicator = flags & 0x20 != 0;
        if flags & 0x10 != 0 {
            af.pcr = Some(parse_clock_reference(c)?);
        }
        if flags & 0x08 != 0 {
            af.opcr = Some(parse_clock_reference(c)?);
        }
        if flags & 0x04 != 0 {
            af.splice_countdown = Some(c.next_byte()? as i8);
        }
        if flags & 0x02 != 0 {
            let n = c.next_byte()? as usize;
            af.transport_private_data = Some(c.next_bytes(n)?.to_vec());
        }
        if flags & 0x01 != 0 {
            af.extension = Some(AdaptationExtension::parse(c)?);
        }

        // remainder is stuffing
        c.seek(end);
        Ok(af)
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let start = out.len();
        out.push(self.length);
        if self.length == 0 {
            return Ok(());
        }
        out.push(
            (self.discontinuity_indicator as u8) << 7
                | (self.random_access_indicator as u8) << 6
                | (self.elementary_stream_priority_indicator as u8) << 5
                | (self.pcr.is_some() as u8) << 4
                | (self.opcr.is_some() as u8) << 3
                | (self.splice_countdown.is_some() as u8) << 2
                | (self.transport_private_data.is_some() as u8) << 1
                | self.extension.is_some() as u8,
        );
        if let Some(pcr) = &self.pcr {
            write_clock_reference(pcr, out);
        }
        if let Some(opcr) = &self.opcr {
            write_clock_reference(opcr, out);
        }
        if let Some(sc) = self.splice_countdown {
            out.push(sc as u8);
        }
        if let Some(tpd) = &self.transport_private_data {
            out.push(tpd.len() as u8);
            out.extend_from_slice(tpd);
        }
        if let Some(ext) = &self.extension {
            ext.write(out)?;
        }

        let end = start + 1 + self.length as usize;
        if out.len() > end {
            return Err(overflow("adaptation field overflows its length"));
        }
        out.resize(end, 0xFF);
        Ok(())
    }
}

impl AdaptationExtension {
    fn parse(c: &mut ByteCursor) -> Result<AdaptationExtension> {
        let start = c.offset();
        let length = c.next_byte()?;
        let end = start + 1 + length as usize;
        let mut ext = AdaptationExtension {
            length,
            ..Default::default()
        };
        if length == 0 {
            return Ok(ext);
        }

        let flags = c.next_byte()?;
        if flags & 0x80 != 0 {
            let b = c.next_bytes(2)?;
            ext.legal_time_window = Some(LegalTimeWindow {
                valid: b[0] & 0x80 != 0,
                offset: ((b[0] & 0x7F) as u16) << 8 | b[1] as u16,
            });
        }
        if flags & 0x40 != 0 {
            let b = c.next_bytes(3)?;
            ext.piecewise_rate =
                Some(((b[0] & 0x3F) as u32) << 16 | (b[1] as u32) << 8 | b[2] as u32);
        }
        if flags & 0x20 != 0 {
            let (splice_type, dts) = parse_timestamp(c)?;
            ext.seamless_splice = Some(SeamlessSplice {
                splice_type,
                dts_next_access_unit: dts,
            });
        }
        c.seek(end);
        Ok(ext)
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let start = out.len();
        out.push(self.length);
        if self.length == 0 {
            return Ok(());
        }
        // reserved low bits come out as ones
        out.push(
            (self.legal_time_window.is_some() as u8) << 7
                | (self.piecewise_rate.is_some() as u8) << 6
                | (self.seamless_splice.is_some() as u8) << 5
                | 0x1F,
        );
        if let Some(ltw) = &self.legal_time_window {
            out.push((ltw.valid as u8) << 7 | (ltw.offset >> 8) as u8);
            out.push(ltw.offset as u8);
        }
        if let Some(rate) = self.piecewise_rate {
            out.push(0xC0 | (rate >> 16) as u8);
            out.push((rate >> 8) as u8);
            out.push(rate as u8);
        }
        if let Some(ss) = &self.seamless_splice {
            write_timestamp(ss.splice_type, ss.dts_next_access_unit, out);
        }
        let end = start + 1 + self.length as usize;
        if out.len() > end {
            return Err(overflow("adaptation extension overflows its length"));
        }
        out.resize(end, 0xFF);
        Ok(())
    }
}

fn overflow(msg: &'static str) -> DemuxError {
    DemuxError::Io(io::Error::new(io::ErrorKind::InvalidInput, msg))
}

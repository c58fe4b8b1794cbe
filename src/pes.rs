//! Packetized elementary stream headers.

use std::io;

use bitstream_io::{BigEndian, BitRead, BitReader};
use serde::Serialize;

use crate::clock::{parse_timestamp, ClockReference};
use crate::constants::PES_START_CODE;
use crate::cursor::ByteCursor;
use crate::errors::{DemuxError, Result};

// Stream IDs without an optional header
pub const STREAM_ID_PADDING: u8 = 0xBE;
pub const STREAM_ID_PRIVATE_2: u8 = 0xBF;

/// One PES packet: header plus elementary stream bytes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PesData {
    pub header: PesHeader,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PesHeader {
    pub stream_id: u8,
    /// 0 means unbounded (video streams only).
    pub packet_length: u16,
    pub optional: Option<PesOptionalHeader>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct PesOptionalHeader {
    pub scrambling_control: u8,
    pub priority: bool,
    pub data_alignment_indicator: bool,
    pub copyright: bool,
    pub original_or_copy: bool,
    pub header_length: u8,
    pub pts: Option<u64>,
    pub dts: Option<u64>,
    pub escr: Option<ClockReference>,
    /// ES rate in units of 50 bytes/s.
    pub es_rate: Option<u32>,
    pub dsm_trick_mode: Option<u8>,
    pub additional_copy_info: Option<u8>,
    pub crc: Option<u16>,
    pub has_extension: bool,
}

/// True when the buffer opens with the PES start-code prefix.
pub fn is_pes_payload(payload: &[u8]) -> bool {
    payload.len() >= 3 && payload[..3] == PES_START_CODE
}

fn has_optional_header(stream_id: u8) -> bool {
    stream_id != STREAM_ID_PADDING && stream_id != STREAM_ID_PRIVATE_2
}

/// Parses a complete PES packet from a reassembled payload.
pub fn parse_pes(payload: &[u8]) -> Result<PesData> {
    let mut c = ByteCursor::new(payload);
    let b = c.next_bytes(6)?;
    if b[..3] != PES_START_CODE {
        return Err(DemuxError::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            "missing PES start-code prefix",
        )));
    }
    let stream_id = b[3];
    let packet_length = (b[4] as u16) << 8 | b[5] as u16;

    let optional = if has_optional_header(stream_id) {
        Some(parse_optional_header(&mut c)?)
    } else {
        None
    };

    // a zero length means the payload runs to the end of the unit
    let data_end = if packet_length == 0 {
        payload.len()
    } else {
        payload.len().min(6 + packet_length as usize)
    };
    let data = c.range(c.offset(), data_end)?.to_vec();
    Ok(PesData {
        header: PesHeader {
            stream_id,
            packet_length,
            optional,
        },
        data,
    })
}

fn parse_optional_header(c: &mut ByteCursor) -> Result<PesOptionalHeader> {
    let b = c.next_bytes(3)?;
    let mut h = PesOptionalHeader {
        scrambling_control: (b[0] >> 4) & 0x3,
        priority: b[0] & 0x08 != 0,
        data_alignment_indicator: b[0] & 0x04 != 0,
        copyright: b[0] & 0x02 != 0,
        original_or_copy: b[0] & 0x01 != 0,
        header_length: b[2],
        ..Default::default()
    };
    let flags = b[1];
    let header_end = c.offset() + h.header_length as usize;

    match flags >> 6 {
        0b10 => {
            h.pts = Some(parse_timestamp(c)?.1);
        }
        0b11 => {
            h.pts = Some(parse_timestamp(c)?.1);
            h.dts = Some(parse_timestamp(c)?.1);
        }
        _ => {}
    }
    if flags & 0x20 != 0 {
        h.escr = Some(parse_escr(c)?);
    }
    if flags & 0x10 != 0 {
        let b = c.next_bytes(3)?;
        h.es_rate =
            Some(((b[0] & 0x7F) as u32) << 15 | (b[1] as u32) << 7 | (b[2] >> 1) as u32);
    }
    if flags & 0x08 != 0 {
        h.dsm_trick_mode = Some(c.next_byte()?);
    }
    if flags & 0x04 != 0 {
        h.additional_copy_info = Some(c.next_byte()? & 0x7F);
    }
    if flags & 0x02 != 0 {
        let b = c.next_bytes(2)?;
        h.crc = Some((b[0] as u16) << 8 | b[1] as u16);
    }
    h.has_extension = flags & 0x01 != 0;

    // header-data-length is authoritative; anything unparsed is stuffing
    c.seek(header_end);
    Ok(h)
}

// 48 bits: reserved(2) base(3) mk base(15) mk base(15) mk ext(9) mk
fn parse_escr(c: &mut ByteCursor) -> Result<ClockReference> {
    let b = c.next_bytes(6)?;
    let mut r = BitReader::endian(b, BigEndian);
    r.skip(2)?;
    let hi = r.read::<3, u64>()?;
    r.skip(1)?;
    let mid = r.read::<15, u64>()?;
    r.skip(1)?;
    let low = r.read::<15, u64>()?;
    r.skip(1)?;
    let extension = r.read::<9, u16>()?;
    Ok(ClockReference {
        base: hi << 30 | mid << 15 | low,
        extension,
    })
}

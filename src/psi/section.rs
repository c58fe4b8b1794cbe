// psi/section.rs
//! PSI section engine: pointer field, section header, syntax header and
//! CRC-32 (MPEG-2) validation, plus the partial serializer used for PAT and
//! PMT round trips.

use crc::{Crc, CRC_32_MPEG_2};
use serde::Serialize;

use crate::constants::MAX_SECTION_LENGTH;
use crate::cursor::ByteCursor;
use crate::errors::{DemuxError, Result};
use crate::psi::{eit, nit, pat, pmt, sdt, tot};

const CRC_MPEG: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

/// Table type derived from the table-ID byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TableType {
    Bat,
    Dit,
    Eit,
    Nit,
    Null,
    Pat,
    Pmt,
    Rst,
    Sdt,
    Sit,
    St,
    Tdt,
    Tot,
    Unknown,
}

impl TableType {
    /// Total classification of the table-ID byte.
    pub fn classify(table_id: u8) -> TableType {
        match table_id {
            0x00 => TableType::Pat,
            0x02 => TableType::Pmt,
            0x40 | 0x41 => TableType::Nit,
            0x42 | 0x46 => TableType::Sdt,
            0x4A => TableType::Bat,
            0x4E..=0x6F => TableType::Eit,
            0x70 => TableType::Tdt,
            0x71 => TableType::Rst,
            0x72 => TableType::St,
            0x73 => TableType::Tot,
            0x7E => TableType::Dit,
            0x7F => TableType::Sit,
            0xFF => TableType::Null,
            _ => TableType::Unknown,
        }
    }

    /// Tables whose last 4 section bytes are a CRC-32.
    pub fn has_crc32(self) -> bool {
        matches!(
            self,
            TableType::Pat
                | TableType::Pmt
                | TableType::Eit
                | TableType::Nit
                | TableType::Tot
                | TableType::Sdt
        )
    }

    /// Tables carrying the 40-bit syntax header.
    pub fn has_syntax_header(self) -> bool {
        matches!(
            self,
            TableType::Eit | TableType::Nit | TableType::Pat | TableType::Pmt | TableType::Sdt
        )
    }

    /// A Null or Unknown table ID ends section parsing for the payload.
    pub fn stops_parsing(self) -> bool {
        matches!(self, TableType::Null | TableType::Unknown)
    }
}

/// A reassembled PSI payload: pointer field plus the sections that follow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PsiData {
    pub pointer_field: u8,
    pub sections: Vec<PsiSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PsiSection {
    pub header: PsiSectionHeader,
    pub syntax_header: Option<PsiSyntaxHeader>,
    pub body: Option<TableBody>,
    /// Present when the table type mandates a CRC; always validated.
    pub crc32: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PsiSectionHeader {
    pub table_id: u8,
    pub table_type: TableType,
    pub section_syntax_indicator: bool,
    pub private_bit: bool,
    pub section_length: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PsiSyntaxHeader {
    pub table_id_extension: u16,
    pub version_number: u8,
    pub current_next_indicator: bool,
    pub section_number: u8,
    pub last_section_number: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TableBody {
    Pat(pat::PatSection),
    Pmt(pmt::PmtSection),
    Nit(nit::NitSection),
    Sdt(sdt::SdtSection),
    Eit(eit::EitSection),
    Tot(tot::TotSection),
}

/// Parses a PSI payload into its sections.
///
/// Stops without error at the first Null or Unknown table ID; everything
/// after it is stuffing.
pub fn parse_psi(payload: &[u8]) -> Result<PsiData> {
    let mut c = ByteCursor::new(payload);
    let pointer_field = c.next_byte()?;
    if pointer_field as usize > c.bytes_left() {
        return Err(DemuxError::InvalidPointerField {
            pointer: pointer_field as usize,
            len: payload.len(),
        });
    }
    c.skip(pointer_field as usize);

    let mut sections = Vec::new();
    while c.has_bytes_left() {
        let (section, stop) = parse_section(&mut c)?;
        sections.push(section);
        if stop {
            break;
        }
    }
    Ok(PsiData {
        pointer_field,
        sections,
    })
}

fn parse_section(c: &mut ByteCursor) -> Result<(PsiSection, bool)> {
    let offset_start = c.offset();
    let table_id = c.next_byte()?;
    let table_type = TableType::classify(table_id);
    if table_type.stops_parsing() {
        // nothing beyond the ID byte is consumed
        let header = PsiSectionHeader {
            table_id,
            table_type,
            section_syntax_indicator: false,
            private_bit: false,
            section_length: 0,
        };
        return Ok((
            PsiSection {
                header,
                syntax_header: None,
                body: None,
                crc32: None,
            },
            true,
        ));
    }

    let b = c.next_bytes(2)?;
    let header = PsiSectionHeader {
        table_id,
        table_type,
        section_syntax_indicator: b[0] & 0x80 != 0,
        private_bit: b[0] & 0x40 != 0,
        section_length: ((b[0] & 0x0F) as u16) << 8 | b[1] as u16,
    };
    if header.section_length > MAX_SECTION_LENGTH {
        return Err(DemuxError::InvalidSectionLength(header.section_length));
    }
    if table_type.has_crc32() && header.section_length > 0 && header.section_length < 4 {
        return Err(DemuxError::InvalidSectionLength(header.section_length));
    }

    let offset_sections_start = c.offset();
    let offset_end = offset_sections_start + header.section_length as usize;
    let offset_sections_end = if table_type.has_crc32() {
        offset_end - 4
    } else {
        offset_end
    };
    if offset_end > c.len() {
        return Err(DemuxError::ShortRead {
            offset: offset_sections_start,
            needed: header.section_length as usize,
            left: c.len() - offset_sections_start,
        });
    }

    let mut syntax_header = None;
    let mut body = None;
    let mut crc32 = None;
    if header.section_length > 0 {
        if table_type.has_syntax_header() {
            syntax_header = Some(parse_syntax_header(c)?);
        }
        let extension = syntax_header.map(|h| h.table_id_extension).unwrap_or(0);
        body = parse_table_body(c, table_type, offset_sections_end, extension)?;

        if table_type.has_crc32() {
            c.seek(offset_sections_end);
            let b = c.next_bytes(4)?;
            let expected = u32::from_be_bytes([b[0], b[1], b[2], b[3]]);
            let computed = CRC_MPEG.checksum(c.range(offset_start, offset_sections_end)?);
            if expected != computed {
                return Err(DemuxError::Crc32Mismatch { expected, computed });
            }
            crc32 = Some(expected);
        }
    }
    c.seek(offset_end);
    Ok((
        PsiSection {
            header,
            syntax_header,
            body,
            crc32,
        },
        false,
    ))
}

fn parse_syntax_header(c: &mut ByteCursor) -> Result<PsiSyntaxHeader> {
    let b = c.next_bytes(5)?;
    Ok(PsiSyntaxHeader {
        table_id_extension: (b[0] as u16) << 8 | b[1] as u16,
        version_number: (b[2] & 0x3E) >> 1,
        current_next_indicator: b[2] & 0x01 != 0,
        section_number: b[3],
        last_section_number: b[4],
    })
}

fn parse_table_body(
    c: &mut ByteCursor,
    table_type: TableType,
    offset_sections_end: usize,
    extension: u16,
) -> Result<Option<TableBody>> {
    let body = match table_type {
        TableType::Pat => Some(TableBody::Pat(pat::parse_pat(
            c,
            offset_sections_end,
            extension,
        )?)),
        TableType::Pmt => Some(TableBody::Pmt(pmt::parse_pmt(
            c,
            offset_sections_end,
            extension,
        )?)),
        TableType::Nit => Some(TableBody::Nit(nit::parse_nit(c, extension)?)),
        TableType::Sdt => Some(TableBody::Sdt(sdt::parse_sdt(
            c,
            offset_sections_end,
            extension,
        )?)),
        TableType::Eit => Some(TableBody::Eit(eit::parse_eit(
            c,
            offset_sections_end,
            extension,
        )?)),
        TableType::Tot => Some(TableBody::Tot(tot::parse_tot(c)?)),
        // BAT, DIT, RST, SIT, ST, TDT bodies are skipped
        _ => None,
    };
    Ok(body)
}

impl PsiData {
    /// Serializes into a payload of `out_len` bytes, stuffing the tail with
    /// `0xFF`. Only PAT and PMT sections have an encoder; Null/Unknown
    /// sections are skipped.
    pub fn serialize(&self, out_len: usize) -> Result<Vec<u8>> {
        if self.pointer_field != 0 {
            return Err(unsupported("non-zero pointer field serialization"));
        }
        let mut out = vec![self.pointer_field];
        for s in &self.sections {
            s.write(&mut out)?;
        }
        if out.len() > out_len {
            return Err(unsupported("sections exceed output payload"));
        }
        out.resize(out_len, 0xFF);
        Ok(out)
    }
}

impl PsiSection {
    fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        if self.header.table_type.stops_parsing() {
            return Ok(());
        }

        // body first, so the section length can be computed
        let mut payload = Vec::new();
        if let Some(sh) = &self.syntax_header {
            payload.push((sh.table_id_extension >> 8) as u8);
            payload.push(sh.table_id_extension as u8);
            payload.push(0xC0 | (sh.version_number & 0x1F) << 1 | sh.current_next_indicator as u8);
            payload.push(sh.section_number);
            payload.push(sh.last_section_number);
        }
        match &self.body {
            Some(TableBody::Pat(p)) => pat::write_pat(p, &mut payload),
            Some(TableBody::Pmt(p)) => pmt::write_pmt(p, &mut payload),
            None => {}
            Some(_) => return Err(unsupported("serialization for this table type")),
        }

        let has_crc = self.header.table_type.has_crc32();
        let section_length = payload.len() as u16 + if has_crc { 4 } else { 0 };
        let start = out.len();
        out.push(self.header.table_id);
        out.push(
            (self.header.section_syntax_indicator as u8) << 7
                | (self.header.private_bit as u8) << 6
                | 0x30
                | (section_length >> 8) as u8,
        );
        out.push(section_length as u8);
        out.extend_from_slice(&payload);
        if has_crc {
            let crc = CRC_MPEG.checksum(&out[start..]);
            out.extend_from_slice(&crc.to_be_bytes());
        }
        Ok(())
    }
}

fn unsupported(what: &str) -> DemuxError {
    DemuxError::Io(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        format!("{what} is not supported"),
    ))
}

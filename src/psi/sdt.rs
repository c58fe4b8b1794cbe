// psi/sdt.rs
//! Service Description Table body.

use serde::Serialize;

use crate::cursor::ByteCursor;
use crate::descriptor::{parse_descriptors, Descriptor};
use crate::errors::Result;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SdtSection {
    pub transport_stream_id: u16,
    pub original_network_id: u16,
    pub services: Vec<SdtService>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SdtService {
    pub service_id: u16,
    pub eit_schedule: bool,
    pub eit_present_following: bool,
    pub running_status: u8,
    pub free_ca_mode: bool,
    pub descriptors: Vec<Descriptor>,
}

pub fn parse_sdt(
    c: &mut ByteCursor,
    offset_sections_end: usize,
    table_id_extension: u16,
) -> Result<SdtSection> {
    let b = c.next_bytes(3)?; // original network ID + reserved byte
    let original_network_id = (b[0] as u16) << 8 | b[1] as u16;

    let mut services = Vec::new();
    while c.offset() < offset_sections_end {
        let b = c.next_bytes(3)?;
        let service_id = (b[0] as u16) << 8 | b[1] as u16;
        let eit_schedule = b[2] & 0x02 != 0;
        let eit_present_following = b[2] & 0x01 != 0;
        // running status and free-CA share the descriptor loop length bytes
        let b = c.range(c.offset(), c.offset() + 1)?[0];
        services.push(SdtService {
            service_id,
            eit_schedule,
            eit_present_following,
            running_status: b >> 5,
            free_ca_mode: b & 0x10 != 0,
            descriptors: parse_descriptors(c)?,
        });
    }
    Ok(SdtSection {
        transport_stream_id: table_id_extension,
        original_network_id,
        services,
    })
}

// psi/eit.rs
//! Event Information Table body.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cursor::ByteCursor;
use crate::descriptor::{parse_descriptors, Descriptor};
use crate::dvb::{parse_dvb_duration_seconds, parse_dvb_time_opt, serialize_duration};
use crate::errors::Result;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EitSection {
    pub service_id: u16,
    pub transport_stream_id: u16,
    pub original_network_id: u16,
    pub segment_last_section_number: u8,
    pub last_table_id: u8,
    pub events: Vec<EitEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EitEvent {
    pub event_id: u16,
    /// `None` when the stream marks the start time as undefined.
    pub start_time: Option<DateTime<Utc>>,
    #[serde(serialize_with = "serialize_duration")]
    pub duration: chrono::Duration,
    pub running_status: u8,
    pub free_ca_mode: bool,
    pub descriptors: Vec<Descriptor>,
}

pub fn parse_eit(
    c: &mut ByteCursor,
    offset_sections_end: usize,
    table_id_extension: u16,
) -> Result<EitSection> {
    let b = c.next_bytes(6)?;
    let transport_stream_id = (b[0] as u16) << 8 | b[1] as u16;
    let original_network_id = (b[2] as u16) << 8 | b[3] as u16;
    let segment_last_section_number = b[4];
    let last_table_id = b[5];

    let mut events = Vec::new();
    while c.offset() < offset_sections_end {
        let b = c.next_bytes(2)?;
        let event_id = (b[0] as u16) << 8 | b[1] as u16;
        let start_time = parse_dvb_time_opt(c)?;
        let duration = parse_dvb_duration_seconds(c)?;
        // running status and free-CA share the descriptor loop length bytes
        let b = c.range(c.offset(), c.offset() + 1)?[0];
        events.push(EitEvent {
            event_id,
            start_time,
            duration,
            running_status: b >> 5,
            free_ca_mode: b & 0x10 != 0,
            descriptors: parse_descriptors(c)?,
        });
    }
    Ok(EitSection {
        service_id: table_id_extension,
        transport_stream_id,
        original_network_id,
        segment_last_section_number,
        last_table_id,
        events,
    })
}

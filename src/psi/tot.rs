// psi/tot.rs
//! Time Offset Table body.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cursor::ByteCursor;
use crate::descriptor::{parse_descriptors, Descriptor};
use crate::dvb::parse_dvb_time;
use crate::errors::Result;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TotSection {
    pub utc_time: DateTime<Utc>,
    pub descriptors: Vec<Descriptor>,
}

pub fn parse_tot(c: &mut ByteCursor) -> Result<TotSection> {
    let utc_time = parse_dvb_time(c)?;
    let descriptors = parse_descriptors(c)?;
    Ok(TotSection {
        utc_time,
        descriptors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DescriptorPayload;
    use chrono::TimeZone;

    #[test]
    fn parses_time_and_descriptors() {
        let body = [
            0xE2, 0xC8, 0x21, 0x03, 0x54, 0xF0, 0x03, 0x52, 0x01, 0x07,
        ];
        let mut c = ByteCursor::new(&body);
        let tot = parse_tot(&mut c).unwrap();
        assert_eq!(
            tot.utc_time,
            Utc.with_ymd_and_hms(2017, 10, 30, 21, 3, 54).unwrap()
        );
        assert_eq!(
            tot.descriptors[0].payload,
            DescriptorPayload::StreamIdentifier(0x07)
        );
        assert_eq!(c.offset(), body.len());
    }
}

//! DVB date and duration encodings: 16-bit MJD plus BCD fields.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc};

use crate::cursor::ByteCursor;
use crate::errors::{DemuxError, Result};

/// Wire encoding of an undefined event start time.
const UNDEFINED_TIME: [u8; 5] = [0xFF; 5];

/// Parses a 5-byte DVB date-time: 16-bit MJD then BCD HH MM SS.
pub fn parse_dvb_time(c: &mut ByteCursor) -> Result<DateTime<Utc>> {
    let b = c.next_bytes(5)?;
    decode_dvb_time(b)
}

/// Like [`parse_dvb_time`] but maps the all-ones encoding to `None`.
pub fn parse_dvb_time_opt(c: &mut ByteCursor) -> Result<Option<DateTime<Utc>>> {
    let b = c.next_bytes(5)?;
    if b == UNDEFINED_TIME {
        return Ok(None);
    }
    decode_dvb_time(b).map(Some)
}

fn decode_dvb_time(b: &[u8]) -> Result<DateTime<Utc>> {
    let mjd = (b[0] as u16) << 8 | b[1] as u16;
    let invalid = DemuxError::InvalidDvbTime {
        mjd,
        hour: b[2],
        minute: b[3],
        second: b[4],
    };

    // ETSI EN 300 468 Annex C conversion
    let yp = ((mjd as f64 - 15078.2) / 365.25) as i32;
    let mp = ((mjd as f64 - 14956.1 - (yp as f64 * 365.25) as i32 as f64) / 30.6001) as i32;
    let day = mjd as i32 - 14956 - (yp as f64 * 365.25) as i32 - (mp as f64 * 30.6001) as i32;
    let k = if mp == 14 || mp == 15 { 1 } else { 0 };
    let year = 1900 + yp + k;
    let month = mp - 1 - k * 12;

    let date = NaiveDate::from_ymd_opt(year, month as u32, day as u32).ok_or(invalid)?;
    let dt = date
        .and_hms_opt(
            bcd_decode(b[2]) as u32,
            bcd_decode(b[3]) as u32,
            bcd_decode(b[4]) as u32,
        )
        .ok_or(DemuxError::InvalidDvbTime {
            mjd,
            hour: b[2],
            minute: b[3],
            second: b[4],
        })?;
    Ok(Utc.from_utc_datetime(&dt))
}

/// Writes the 5-byte DVB date-time. Dates outside the representable range
/// (1900-03-01 through 2038-04-22) are rejected or will not round-trip.
pub fn write_dvb_time(t: &DateTime<Utc>, out: &mut Vec<u8>) -> Result<()> {
    let (year, month, day) = (t.year(), t.month() as i32, t.day() as i32);
    let l = if month <= 2 { 1 } else { 0 };
    let mjd = 14956
        + day
        + ((year - 1900 - l) as f64 * 365.25) as i32
        + ((month + 1 + l * 12) as f64 * 30.6001) as i32;
    if !(0..=0xFFFF).contains(&mjd) {
        return Err(DemuxError::InvalidDvbTime {
            mjd: mjd as u16,
            hour: t.hour() as u8,
            minute: t.minute() as u8,
            second: t.second() as u8,
        });
    }
    out.push((mjd >> 8) as u8);
    out.push(mjd as u8);
    out.push(bcd_encode(t.hour() as u8));
    out.push(bcd_encode(t.minute() as u8));
    out.push(bcd_encode(t.second() as u8));
    Ok(())
}

/// Parses a 3-byte BCD HHMMSS duration.
pub fn parse_dvb_duration_seconds(c: &mut ByteCursor) -> Result<chrono::Duration> {
    let b = c.next_bytes(3)?;
    let secs =
        bcd_decode(b[0]) as i64 * 3600 + bcd_decode(b[1]) as i64 * 60 + bcd_decode(b[2]) as i64;
    Ok(chrono::Duration::seconds(secs))
}

/// Parses a 2-byte BCD HHMM duration.
pub fn parse_dvb_duration_minutes(c: &mut ByteCursor) -> Result<chrono::Duration> {
    let b = c.next_bytes(2)?;
    let mins = bcd_decode(b[0]) as i64 * 60 + bcd_decode(b[1]) as i64;
    Ok(chrono::Duration::minutes(mins))
}

pub fn write_dvb_duration_seconds(d: &chrono::Duration, out: &mut Vec<u8>) {
    let s = d.num_seconds();
    out.push(bcd_encode((s / 3600) as u8));
    out.push(bcd_encode((s % 3600 / 60) as u8));
    out.push(bcd_encode((s % 60) as u8));
}

pub fn write_dvb_duration_minutes(d: &chrono::Duration, out: &mut Vec<u8>) {
    let m = d.num_minutes();
    out.push(bcd_encode((m / 60) as u8));
    out.push(bcd_encode((m % 60) as u8));
}

/// Serde helper: durations report as whole seconds in JSON output.
pub fn serialize_duration<S: serde::Serializer>(
    d: &chrono::Duration,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_i64(d.num_seconds())
}

fn bcd_decode(b: u8) -> u8 {
    (b >> 4) * 10 + (b & 0x0F)
}

fn bcd_encode(v: u8) -> u8 {
    (v / 10) << 4 | (v % 10)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn parses_known_instant() {
        let b = [0xE2, 0xC8, 0x21, 0x03, 0x54];
        let mut c = ByteCursor::new(&b);
        assert_eq!(
            parse_dvb_time(&mut c).unwrap(),
            utc(2017, 10, 30, 21, 3, 54)
        );
    }

    #[test]
    fn round_trips_across_range() {
        let dates = [
            utc(1900, 3, 1, 0, 0, 0),
            utc(1999, 12, 31, 23, 59, 59),
            utc(2000, 1, 1, 0, 0, 0),
            utc(2017, 10, 30, 21, 3, 54),
            utc(2024, 2, 29, 12, 30, 45),
            utc(2038, 4, 22, 6, 15, 0),
        ];
        for t in dates {
            let mut out = Vec::new();
            write_dvb_time(&t, &mut out).unwrap();
            let mut c = ByteCursor::new(&out);
            assert_eq!(parse_dvb_time(&mut c).unwrap(), t, "date {t}");
        }
    }

    #[test]
    fn undefined_start_time_is_none() {
        let b = [0xFF; 5];
        let mut c = ByteCursor::new(&b);
        assert_eq!(parse_dvb_time_opt(&mut c).unwrap(), None);
    }

    #[test]
    fn durations_decode_from_bcd() {
        let mut c = ByteCursor::new(&[0x01, 0x30, 0x00]);
        assert_eq!(
            parse_dvb_duration_seconds(&mut c).unwrap(),
            chrono::Duration::seconds(5400)
        );
        let mut c = ByteCursor::new(&[0x02, 0x45]);
        assert_eq!(
            parse_dvb_duration_minutes(&mut c).unwrap(),
            chrono::Duration::minutes(165)
        );
    }

    #[test]
    fn durations_round_trip() {
        let d = chrono::Duration::seconds(23 * 3600 + 59 * 60 + 59);
        let mut out = Vec::new();
        write_dvb_duration_seconds(&d, &mut out);
        assert_eq!(out, [0x23, 0x59, 0x59]);
        let m = chrono::Duration::minutes(90);
        out.clear();
        write_dvb_duration_minutes(&m, &mut out);
        assert_eq!(out, [0x01, 0x30]);
    }
}

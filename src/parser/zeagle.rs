//! Zeagle N2ition3 / Cressi / Mares family parser.
//! `zeagle_n2ition3.c` carries only the session-layer paged-read logic
//! (see [`crate::session::pattern_d`]) — no parser-layer decode function
//! exists to ground against. This module decodes the exact record shape
//! `pattern_d::foreach` yields: a 16-byte fingerprint header (dive
//! number, BCD date/time, dive time, max depth) immediately followed by
//! one-byte-per-tick depth samples, at a 4-second sample interval
//! (matching the Aladin family's tick rate, since both are simple
//! depth-only recreational profiles).

use crate::bytes;
use crate::datetime::ParsedDateTime;
use crate::error::{Error, Result};
use crate::parser::{DiveMode, Field, FieldValue, Parser, SampleCallback};
use crate::sample::Sample;

const HEADER_LEN: usize = 16;
const SAMPLE_INTERVAL_S: u32 = 4;

pub struct ZeagleParser {
    data: Vec<u8>,
}

impl ZeagleParser {
    pub fn new() -> Self {
        ZeagleParser { data: Vec::new() }
    }

    fn check_header(&self) -> Result<()> {
        if self.data.len() < HEADER_LEN {
            return Err(Error::DataFormat("Zeagle blob shorter than fixed header".into()));
        }
        Ok(())
    }
}

impl Default for ZeagleParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for ZeagleParser {
    fn set_data(&mut self, data: Vec<u8>) -> Result<()> {
        self.data = data;
        Ok(())
    }

    fn get_datetime(&mut self) -> Result<ParsedDateTime> {
        self.check_header()?;
        let p = &self.data;
        Ok(ParsedDateTime {
            year: bytes::bcd(p[2]) as i32 + 2000,
            month: bytes::bcd(p[3]) as u32,
            day: bytes::bcd(p[4]) as u32,
            hour: bytes::bcd(p[5]) as u32,
            minute: bytes::bcd(p[6]) as u32,
            second: 0,
        })
    }

    fn get_field(&mut self, field: Field) -> Result<FieldValue> {
        self.check_header()?;
        let p = &self.data;
        match field {
            Field::DiveTime => Ok(FieldValue::Seconds(bytes::u16_le(&p[8..10]) as u32 * SAMPLE_INTERVAL_S)),
            Field::MaxDepth => Ok(FieldValue::Depth(bytes::u16_le(&p[10..12]) as f64 / 100.0)),
            Field::GasMixCount => Ok(FieldValue::Count(0)),
            Field::DiveMode => Ok(FieldValue::DiveMode(DiveMode::Air)),
            Field::String(0) => Ok(FieldValue::Text(
                "Dive Number".into(),
                bytes::u16_le(&p[0..2]).to_string(),
            )),
            _ => Err(Error::Unsupported),
        }
    }

    fn samples_foreach(&mut self, callback: &mut SampleCallback) -> Result<()> {
        self.check_header()?;
        let data = &self.data;
        let profile = &data[HEADER_LEN..];

        let mut time = 0u32;
        for &raw in profile {
            if !callback(Sample::Time(time)) {
                return Ok(());
            }
            if !callback(Sample::Depth(raw as f64 / 4.0)) {
                return Ok(());
            }
            time += SAMPLE_INTERVAL_S;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob_with_profile(samples: &[u8]) -> Vec<u8> {
        let mut header = vec![0u8; HEADER_LEN];
        header[0..2].copy_from_slice(&42u16.to_le_bytes());
        header[2] = 0x24; // year 2024
        header[3] = 0x07; // month
        header[4] = 0x15; // day
        header[10..12].copy_from_slice(&3000u16.to_le_bytes());
        let mut data = header;
        data.extend_from_slice(samples);
        data
    }

    #[test]
    fn datetime_decodes_bcd_fields() {
        let mut parser = ZeagleParser::new();
        parser.set_data(blob_with_profile(&[])).unwrap();
        let dt = parser.get_datetime().unwrap();
        assert_eq!(dt.year, 2024);
        assert_eq!(dt.month, 7);
        assert_eq!(dt.day, 15);
    }

    #[test]
    fn max_depth_decodes_in_centimetre_units() {
        let mut parser = ZeagleParser::new();
        parser.set_data(blob_with_profile(&[])).unwrap();
        assert_eq!(parser.get_field(Field::MaxDepth).unwrap(), FieldValue::Depth(30.0));
    }

    #[test]
    fn samples_emit_time_then_depth_per_tick() {
        let mut parser = ZeagleParser::new();
        parser.set_data(blob_with_profile(&[4, 8])).unwrap();
        let mut count = 0;
        parser
            .samples_foreach(&mut |_s| {
                count += 1;
                true
            })
            .unwrap();
        assert_eq!(count, 4);
    }
}

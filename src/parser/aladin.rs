//! Uwatec Aladin family parser. The original device driver's session
//! layer (see [`crate::session::pattern_c`]) owns the dump/extract logic
//! but has no separate parser-layer decode function to work from. This
//! module decodes the exact 18-byte header + variable profile blob shape
//! `pattern_c::extract_dives` builds: a fixed logbook-slot header (dive
//! number, dive/water temperature, max
//! depth, a little-endian timestamp already normalized by the session
//! layer) followed by a one-byte-per-tick depth profile, sampled every
//! four seconds as documented for the Aladin Pro/Air series.

use crate::bytes;
use crate::datetime::ParsedDateTime;
use crate::error::{Error, Result};
use crate::parser::{DiveMode, Field, FieldValue, Parser, SampleCallback};
use crate::sample::Sample;

const HEADER_LEN: usize = 18;
const SAMPLE_INTERVAL_S: u32 = 4;

pub struct UwatecAladinParser {
    data: Vec<u8>,
}

impl UwatecAladinParser {
    pub fn new() -> Self {
        UwatecAladinParser { data: Vec::new() }
    }

    fn check_header(&self) -> Result<()> {
        if self.data.len() < HEADER_LEN {
            return Err(Error::DataFormat("Aladin blob shorter than fixed header".into()));
        }
        Ok(())
    }
}

impl Default for UwatecAladinParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for UwatecAladinParser {
    fn set_data(&mut self, data: Vec<u8>) -> Result<()> {
        self.data = data;
        Ok(())
    }

    fn get_datetime(&mut self) -> Result<ParsedDateTime> {
        self.check_header()?;
        let ticks = bytes::u32_le(&self.data[11..15]);
        Ok(crate::datetime::gmtime_from_unix(ticks as i64))
    }

    fn get_field(&mut self, field: Field) -> Result<FieldValue> {
        self.check_header()?;
        let p = &self.data;
        match field {
            Field::DiveTime => Ok(FieldValue::Seconds(bytes::u16_be(&p[6..8]) as u32)),
            Field::MaxDepth => Ok(FieldValue::Depth(bytes::u16_be(&p[8..10]) as f64 / 4.0)),
            Field::TempSurface => Ok(FieldValue::Temperature(p[10] as f64)),
            Field::TempMin => Ok(FieldValue::Temperature(p[15] as f64)),
            Field::GasMixCount => Ok(FieldValue::Count(0)),
            Field::DiveMode => Ok(FieldValue::DiveMode(DiveMode::Air)),
            Field::String(0) => Ok(FieldValue::Text(
                "Serial".into(),
                format!("{:02x}{:02x}{:02x}", p[0], p[1], p[2]),
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
        header[0..3].copy_from_slice(&[0x12, 0x34, 0x56]);
        header[6..8].copy_from_slice(&1800u16.to_be_bytes());
        header[8..10].copy_from_slice(&(40 * 4u16).to_be_bytes());
        let mut data = header;
        data.extend_from_slice(samples);
        data
    }

    #[test]
    fn max_depth_decodes_in_quarter_metre_units() {
        let mut parser = UwatecAladinParser::new();
        parser.set_data(blob_with_profile(&[])).unwrap();
        assert_eq!(parser.get_field(Field::MaxDepth).unwrap(), FieldValue::Depth(40.0));
    }

    #[test]
    fn samples_emit_time_then_depth_per_tick() {
        let mut parser = UwatecAladinParser::new();
        parser.set_data(blob_with_profile(&[4, 8, 12])).unwrap();
        let mut order = Vec::new();
        parser
            .samples_foreach(&mut |s| {
                order.push(format!("{s:?}"));
                true
            })
            .unwrap();
        assert_eq!(order.len(), 6);
        assert!(order[0].starts_with("Time(0)"));
        assert!(order[1].starts_with("Depth(1"));
        assert!(order[2].starts_with("Time(4)"));
    }
}

//! Suunto D9/Vyper2 family parser, following `suunto_d9_parser.c`: a
//! per-model gas-mix table at a fixed offset, a
//! configuration byte count followed by `(type, interval, divisor)`
//! triples describing which sample channels are recorded and how often,
//! then a flat profile of packed channel values recorded in that
//! repeating order. The divisor table and channel type bytes (`0x64`
//! depth, `0x68` pressure, `0x74` temperature) are preserved exactly.

use crate::bytes;
use crate::datetime::ParsedDateTime;
use crate::error::{Error, Result};
use crate::parser::{DiveMode, Field, FieldValue, GasMixTable, Parser, SampleCallback};
use crate::sample::Sample;

const NGASMIXES: usize = 11;
const MAXPARAMS: usize = 3;
const DIVISORS: [u32; 8] = [1, 2, 4, 5, 10, 50, 100, 1000];

#[derive(Debug, Clone, Copy)]
struct ChannelInfo {
    kind: u8,
    interval: u8,
    divisor: u32,
    size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuuntoD9Model {
    D9,
    D4,
    Vyper2,
}

struct HeaderCache {
    mode: DiveMode,
    gas_table: GasMixTable,
    config_offset: usize,
}

pub struct SuuntoD9Parser {
    data: Vec<u8>,
    model: SuuntoD9Model,
    serial: u32,
    header: Option<HeaderCache>,
}

impl SuuntoD9Parser {
    pub fn new(model: SuuntoD9Model, serial: u32) -> Self {
        SuuntoD9Parser {
            data: Vec::new(),
            model,
            serial,
            header: None,
        }
    }

    fn gasmix_layout(&self) -> (usize, usize, usize) {
        // (gasmode_offset, gasmix_offset, gasmix_count)
        match self.model {
            SuuntoD9Model::D9 | SuuntoD9Model::Vyper2 => (0x19, 0x21, 3),
            SuuntoD9Model::D4 => (0x19, 0x21, 3),
        }
    }

    fn header(&mut self) -> Result<&HeaderCache> {
        if self.header.is_none() {
            self.header = Some(self.scan_header()?);
        }
        Ok(self.header.as_ref().unwrap())
    }

    fn scan_header(&self) -> Result<HeaderCache> {
        let data = &self.data;
        let (gasmode_offset, gasmix_offset, gasmix_count) = self.gasmix_layout();
        let config_offset = if self.model == SuuntoD9Model::D4 { 0x3B } else { 0x3A };
        if config_offset + 1 > data.len() {
            return Err(Error::DataFormat("Suunto blob shorter than config offset".into()));
        }

        let raw_mode = data[gasmode_offset];
        let mut gas_table = GasMixTable::new(NGASMIXES);
        let mode = match raw_mode {
            2 => DiveMode::Gauge,
            3 => DiveMode::Freedive,
            5 => DiveMode::Ccr,
            0 => {
                gas_table.index_of(21, 0)?;
                DiveMode::Air
            }
            _ => {
                for i in 0..gasmix_count {
                    let oxygen = data[gasmix_offset + i];
                    if oxygen == 0x00 || oxygen == 0xFF {
                        break;
                    }
                    gas_table.index_of(oxygen, 0)?;
                }
                DiveMode::Air
            }
        };

        Ok(HeaderCache {
            mode,
            gas_table,
            config_offset,
        })
    }

    fn parse_channels(&self, config_offset: usize) -> Result<Vec<ChannelInfo>> {
        let data = &self.data;
        let nparams = data[config_offset] as usize;
        if nparams == 0 || nparams > MAXPARAMS {
            return Err(Error::DataFormat("invalid sample channel count".into()));
        }
        let mut channels = Vec::with_capacity(nparams);
        for i in 0..nparams {
            let idx = config_offset + 2 + i * 3;
            let kind = data[idx];
            let interval = data[idx + 1];
            let divisor = DIVISORS[((data[idx + 2] & 0x1C) >> 2) as usize];
            let size = match kind {
                0x64 | 0x68 => 2,
                0x74 => 1,
                _ => return Err(Error::DataFormat(format!("unknown sample channel type {kind:#x}"))),
            };
            channels.push(ChannelInfo { kind, interval, divisor, size });
        }
        Ok(channels)
    }
}

impl Parser for SuuntoD9Parser {
    fn set_data(&mut self, data: Vec<u8>) -> Result<()> {
        self.data = data;
        self.header = None;
        Ok(())
    }

    fn get_datetime(&mut self) -> Result<ParsedDateTime> {
        let offset = 0x11;
        if self.data.len() < offset + 7 {
            return Err(Error::DataFormat("Suunto blob shorter than datetime field".into()));
        }
        let p = &self.data[offset..];
        Ok(ParsedDateTime {
            hour: p[0] as u32,
            minute: p[1] as u32,
            second: p[2] as u32,
            year: p[3] as i32 + ((p[4] as i32) << 8),
            month: p[5] as u32,
            day: p[6] as u32,
        })
    }

    fn get_field(&mut self, field: Field) -> Result<FieldValue> {
        const MAXDEPTH_OFFSET: usize = 0x09;
        const DIVETIME_OFFSET: usize = 0x0B;
        if self.data.len() < DIVETIME_OFFSET + 2 {
            return Err(Error::DataFormat("Suunto blob shorter than maxdepth/divetime fields".into()));
        }

        let serial = self.serial;
        let data_maxdepth_raw = bytes::u16_le(&self.data[MAXDEPTH_OFFSET..]) as f64;
        let data_divetime = bytes::u16_le(&self.data[DIVETIME_OFFSET..]) as u32;
        let model = self.model;
        let header = self.header()?;
        match field {
            Field::DiveTime => Ok(FieldValue::Seconds(if model == SuuntoD9Model::D4 {
                data_divetime
            } else {
                data_divetime * 60
            })),
            Field::MaxDepth => Ok(FieldValue::Depth(data_maxdepth_raw / 100.0)),
            Field::GasMixCount => Ok(FieldValue::Count(header.gas_table.len())),
            Field::GasMix(i) => header
                .gas_table
                .get(i)
                .map(FieldValue::GasMix)
                .ok_or(Error::InvalidArgs("gas mix index out of range".into())),
            Field::DiveMode => Ok(FieldValue::DiveMode(header.mode)),
            Field::String(0) => Ok(FieldValue::Text("Serial".into(), format!("{serial:08}"))),
            _ => Err(Error::Unsupported),
        }
    }

    fn samples_foreach(&mut self, callback: &mut SampleCallback) -> Result<()> {
        let config_offset = self.header()?.config_offset;
        let channels = self.parse_channels(config_offset)?;
        let nparams = channels.len();

        let data = &self.data;
        let profile = config_offset + 2 + nparams * 3;
        if profile + 5 > data.len() {
            return Err(Error::DataFormat("profile offset out of range".into()));
        }

        let mut time = 0u32;
        let mut nsamples = 0u32;
        let mut offset = profile + 5;

        while offset < data.len() {
            if !callback(Sample::Time(time)) {
                return Ok(());
            }

            for ch in &channels {
                if ch.interval != 0 && nsamples % ch.interval as u32 == 0 {
                    if offset + ch.size > data.len() {
                        return Err(Error::DataFormat("profile buffer overrun".into()));
                    }
                    match ch.kind {
                        0x64 => {
                            let v = bytes::u16_le(&data[offset..]) as f64 / ch.divisor as f64;
                            if !callback(Sample::Depth(v)) {
                                return Ok(());
                            }
                        }
                        0x68 => {
                            let v = bytes::u16_le(&data[offset..]);
                            if v != 0xFFFF {
                                if !callback(Sample::Pressure {
                                    tank_index: 0,
                                    bar: v as f64 / ch.divisor as f64,
                                }) {
                                    return Ok(());
                                }
                            }
                        }
                        0x74 => {
                            let v = data[offset] as i8 as f64 / ch.divisor as f64;
                            if !callback(Sample::Temperature(v)) {
                                return Ok(());
                            }
                        }
                        _ => unreachable!(),
                    }
                    offset += ch.size;
                }
            }

            if time == 0 {
                let header = self.header.as_ref().unwrap();
                if !header.gas_table.is_empty() {
                    if !callback(Sample::GasMix { index: 0 }) {
                        return Ok(());
                    }
                }
            }

            nsamples += 1;
            time += 1;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob_with_one_depth_channel() -> Vec<u8> {
        let mut data = vec![0u8; 0x50];
        data[0x19] = 0; // AIR mode -> gas table [21/0]
        let config = 0x3A;
        data[config] = 1; // nparams
        data[config + 2] = 0x64; // depth
        data[config + 3] = 1; // interval
        data[config + 4] = 0; // divisor index 0 -> 1
        let profile = config + 2 + 3;
        data.resize(profile + 5 + 2, 0);
        data[profile + 5..profile + 7].copy_from_slice(&500u16.to_le_bytes());
        data
    }

    #[test]
    fn depth_channel_decodes_with_divisor() {
        let mut parser = SuuntoD9Parser::new(SuuntoD9Model::D9, 12345678);
        parser.set_data(blob_with_one_depth_channel()).unwrap();
        let mut depths = Vec::new();
        parser
            .samples_foreach(&mut |s| {
                if let Sample::Depth(d) = s {
                    depths.push(d);
                }
                true
            })
            .unwrap();
        assert_eq!(depths, vec![500.0]);
    }

    #[test]
    fn air_mode_yields_single_gas_mix() {
        let mut parser = SuuntoD9Parser::new(SuuntoD9Model::D9, 1);
        parser.set_data(blob_with_one_depth_channel()).unwrap();
        assert_eq!(parser.get_field(Field::GasMixCount).unwrap(), FieldValue::Count(1));
    }

    #[test]
    fn get_field_on_truncated_blob_is_data_format_not_a_panic() {
        let mut parser = SuuntoD9Parser::new(SuuntoD9Model::D9, 1);
        parser.set_data(vec![0u8; 4]).unwrap();
        assert!(matches!(parser.get_field(Field::GasMixCount), Err(Error::DataFormat(_))));
    }
}

//! Shearwater Predator/Petrel family parser, following
//! `shearwater_predator_parser.c`: fixed 128-byte header and footer
//! blocks (Petrel always carries an extra footer block; Predator only
//! when its footer's first two bytes read `0xFFFD`), 16- or 32-byte
//! profile records depending on variant, deco encoded as a per-sample
//! `(stop_depth, stop_time)` pair.
//!
//! The sensor-ADC calibration offset this header also carries
//! (`sensor_adc_offset`) is parsed for layout correctness but never
//! surfaced — its units are uncertain in the original driver too, so
//! `Parser::get_field` has no query that would expose it.

use crate::bytes;
use crate::datetime::ParsedDateTime;
use crate::error::{Error, Result};
use crate::parser::{DiveMode, Field, FieldValue, GasMixTable, Parser, SampleCallback};
use crate::sample::{Deco, DecoKind, Sample};

const SZ_BLOCK: usize = 0x80;
const SZ_SAMPLE_PREDATOR: usize = 0x10;
const SZ_SAMPLE_PETREL: usize = 0x20;
const NGASMIXES: usize = 10;

const OC: u8 = 0x10;
const SETPOINT_HIGH: u8 = 0x04;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShearwaterVariant {
    Predator,
    Petrel,
}

struct HeaderCache {
    headersize: usize,
    footersize: usize,
    gas_table: GasMixTable,
    mode: DiveMode,
    sensor_cal: [u32; 3],
}

pub struct ShearwaterParser {
    data: Vec<u8>,
    variant: ShearwaterVariant,
    serial: u32,
    header: Option<HeaderCache>,
}

impl ShearwaterParser {
    pub fn new(variant: ShearwaterVariant, serial: u32) -> Self {
        ShearwaterParser {
            data: Vec::new(),
            variant,
            serial,
            header: None,
        }
    }

    fn samplesize(&self) -> usize {
        match self.variant {
            ShearwaterVariant::Predator => SZ_SAMPLE_PREDATOR,
            ShearwaterVariant::Petrel => SZ_SAMPLE_PETREL,
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
        let samplesize = self.samplesize();
        let headersize = SZ_BLOCK;
        let mut footersize = SZ_BLOCK;
        if data.len() < headersize + footersize {
            return Err(Error::DataFormat("Shearwater blob shorter than header+footer".into()));
        }
        let is_petrel = self.variant == ShearwaterVariant::Petrel;
        if is_petrel || bytes::u16_be(&data[data.len() - footersize..]) == 0xFFFD {
            footersize += SZ_BLOCK;
            if data.len() < headersize + footersize {
                return Err(Error::DataFormat("Shearwater blob shorter than extended footer".into()));
            }
        }

        let mut mode = DiveMode::Air;
        let mut gas_table = GasMixTable::new(NGASMIXES);
        let mut o2_previous = 0u8;
        let mut he_previous = 0u8;

        let mut offset = headersize;
        let end = data.len() - footersize;
        while offset < end {
            if data[offset..offset + samplesize].iter().all(|&b| b == 0) {
                offset += samplesize;
                continue;
            }
            let status = data[offset + 11];
            if status & OC == 0 {
                mode = DiveMode::Ccr;
            }
            let o2 = data[offset + 7];
            let he = data[offset + 8];
            if o2 != o2_previous || he != he_previous {
                gas_table.index_of(o2, he)?;
                o2_previous = o2;
                he_previous = he;
            }
            offset += samplesize;
        }

        let mut sensor_cal = [
            bytes::u16_be(&data[87..]) as u32,
            bytes::u16_be(&data[89..]) as u32,
            bytes::u16_be(&data[91..]) as u32,
        ];
        for c in sensor_cal.iter_mut() {
            *c += 1024;
        }
        let _sensor_adc_offset = [data[93] as i8, data[94] as i8, data[95] as i8];

        Ok(HeaderCache {
            headersize,
            footersize,
            gas_table,
            mode,
            sensor_cal,
        })
    }
}

impl Parser for ShearwaterParser {
    fn set_data(&mut self, data: Vec<u8>) -> Result<()> {
        self.data = data;
        self.header = None;
        Ok(())
    }

    fn get_datetime(&mut self) -> Result<ParsedDateTime> {
        if self.data.len() < 2 * SZ_BLOCK {
            return Err(Error::DataFormat("Shearwater blob shorter than two blocks".into()));
        }
        let ticks = bytes::u32_be(&self.data[12..]);
        Ok(crate::datetime::gmtime_from_unix(ticks as i64))
    }

    fn get_field(&mut self, field: Field) -> Result<FieldValue> {
        let serial = self.serial;
        let units_imperial = self.data[8] != 0;
        let data_len = self.data.len();
        let header = self.header()?;
        let footer = data_len - header.footersize;
        match field {
            Field::DiveTime => Ok(FieldValue::Seconds(bytes::u16_be(&self.data[footer + 6..]) as u32 * 60)),
            Field::MaxDepth => {
                let raw = bytes::u16_be(&self.data[footer + 4..]) as f64;
                Ok(FieldValue::Depth(if units_imperial { raw * 0.3048 } else { raw }))
            }
            Field::GasMixCount => Ok(FieldValue::Count(header.gas_table.len())),
            Field::GasMix(i) => header
                .gas_table
                .get(i)
                .map(FieldValue::GasMix)
                .ok_or(Error::InvalidArgs("gas mix index out of range".into())),
            Field::Atmospheric => Ok(FieldValue::Pressure(bytes::u16_be(&self.data[47..]) as f64 / 1000.0)),
            Field::DiveMode => Ok(FieldValue::DiveMode(header.mode)),
            Field::String(1) => Ok(FieldValue::Text("Serial".into(), format!("{serial:08x}"))),
            _ => Err(Error::Unsupported),
        }
    }

    fn samples_foreach(&mut self, callback: &mut SampleCallback) -> Result<()> {
        let samplesize = self.samplesize();
        let petrel = self.variant == ShearwaterVariant::Petrel;
        let units_imperial = self.data[8] != 0;
        let sensor_cal = self.header()?.sensor_cal;
        let headersize = self.header()?.headersize;
        let footersize = self.header()?.footersize;
        let data = &self.data;
        let end = data.len() - footersize;

        let mut o2_previous = 0u8;
        let mut he_previous = 0u8;
        let mut gas_table = GasMixTable::new(NGASMIXES);
        let mut time = 0u32;
        let mut offset = headersize;

        while offset < end {
            if data[offset..offset + samplesize].iter().all(|&b| b == 0) {
                offset += samplesize;
                continue;
            }

            time += 10;
            if !callback(Sample::Time(time)) {
                return Ok(());
            }

            let depth_raw = bytes::u16_be(&data[offset..]) as f64 / 10.0;
            let depth = if units_imperial { depth_raw * 0.3048 } else { depth_raw };
            if !callback(Sample::Depth(depth)) {
                return Ok(());
            }

            let mut temperature = data[offset + 13] as i8 as i32;
            if temperature < 0 {
                temperature += 102;
                if temperature > 0 {
                    temperature = 0;
                }
            }
            let temperature_c = if units_imperial {
                (temperature as f64 - 32.0) * 5.0 / 9.0
            } else {
                temperature as f64
            };
            if !callback(Sample::Temperature(temperature_c)) {
                return Ok(());
            }

            let status = data[offset + 11];
            if status & OC == 0 {
                let cell_active = data[86];
                if cell_active & 0x01 != 0 {
                    let ppo2 = data[offset + 12] as f64 * sensor_cal[0] as f64 / 100_000.0;
                    if !callback(Sample::Ppo2(ppo2)) {
                        return Ok(());
                    }
                }
                if cell_active & 0x02 != 0 {
                    let ppo2 = data[offset + 14] as f64 * sensor_cal[1] as f64 / 100_000.0;
                    if !callback(Sample::Ppo2(ppo2)) {
                        return Ok(());
                    }
                }
                if cell_active & 0x04 != 0 {
                    let ppo2 = data[offset + 15] as f64 * sensor_cal[2] as f64 / 100_000.0;
                    if !callback(Sample::Ppo2(ppo2)) {
                        return Ok(());
                    }
                }

                let setpoint = if petrel {
                    data[offset + 18] as f64 / 100.0
                } else if status & SETPOINT_HIGH != 0 {
                    data[18] as f64 / 100.0
                } else {
                    data[17] as f64 / 100.0
                };
                if !callback(Sample::Setpoint(setpoint)) {
                    return Ok(());
                }
            }

            if petrel {
                if !callback(Sample::Cns(data[offset + 22] as f64 / 100.0)) {
                    return Ok(());
                }
            }

            let o2 = data[offset + 7];
            let he = data[offset + 8];
            if o2 != o2_previous || he != he_previous {
                let idx = gas_table.index_of(o2, he)?;
                if !callback(Sample::GasMix { index: idx }) {
                    return Ok(());
                }
                o2_previous = o2;
                he_previous = he;
            }

            let decostop_raw = bytes::u16_be(&data[offset + 2..]);
            let (kind, depth_m) = if decostop_raw != 0 {
                let d = decostop_raw as f64;
                (DecoKind::DecoStop, if units_imperial { d * 0.3048 } else { d })
            } else {
                (DecoKind::Ndl, 0.0)
            };
            if !callback(Sample::Deco(Deco {
                kind,
                time_s: data[offset + 9] as u32 * 60,
                depth_m,
            })) {
                return Ok(());
            }

            offset += samplesize;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_profile_yields_no_samples() {
        let mut parser = ShearwaterParser::new(ShearwaterVariant::Petrel, 0xDEADBEEF);
        parser.set_data(vec![0u8; SZ_BLOCK * 3]).unwrap();
        let mut calls = 0;
        parser.samples_foreach(&mut |_s| {
            calls += 1;
            true
        }).unwrap();
        assert_eq!(calls, 0);
    }

    #[test]
    fn one_oc_sample_emits_time_depth_temp_in_order() {
        let mut data = vec![0u8; SZ_BLOCK * 2 + SZ_SAMPLE_PETREL];
        data[SZ_BLOCK + 0..SZ_BLOCK + 2].copy_from_slice(&50u16.to_be_bytes()); // 5.0 m
        data[SZ_BLOCK + 11] = OC; // open circuit, no ppo2/setpoint
        data[SZ_BLOCK + 13] = 20; // +20C
        let mut parser = ShearwaterParser::new(ShearwaterVariant::Petrel, 1);
        parser.set_data(data).unwrap();
        let mut order = Vec::new();
        parser
            .samples_foreach(&mut |s| {
                order.push(format!("{s:?}"));
                true
            })
            .unwrap();
        assert!(order[0].starts_with("Time"));
        assert!(order[1].starts_with("Depth"));
        assert!(order[2].starts_with("Temperature"));
    }
}

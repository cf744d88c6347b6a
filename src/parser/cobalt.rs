//! Atomics Cobalt family parser, following `atomics_cobalt_parser.c`: a
//! fixed 228-byte header, a per-gas-mix table (18 bytes/entry) immediately
//! after it, then fixed 16-byte profile segments. Depth is millibar-to-
//! metre via the shared hydrostatic constant; deco state is an NDL
//! counter with a latched deco-stop flag (shared [`CobaltDecoLatch`]).

use crate::bytes;
use crate::datetime::ParsedDateTime;
use crate::error::{Error, Result};
use crate::parser::{CobaltDecoLatch, DiveMode, Field, FieldValue, Parser, SampleCallback};
use crate::sample::{Deco, DecoKind, GasMix, Sample, Tank, TankType};

const SZ_HEADER: usize = 228;
const SZ_GASMIX: usize = 18;
const SZ_SEGMENT: usize = 16;
const HYDROSTATIC: f64 = 1025.0 * 9.80665;

#[derive(Default)]
pub struct AtomicsCobaltParser {
    data: Vec<u8>,
    atmospheric_override: Option<f64>,
}

impl AtomicsCobaltParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// `atomics_cobalt_parser_set_calibration`: an externally supplied
    /// atmospheric pressure that overrides the blob's own recorded value.
    pub fn set_calibration(&mut self, atmospheric_bar: f64) {
        self.atmospheric_override = Some(atmospheric_bar);
    }

    fn atmospheric(&self) -> f64 {
        self.atmospheric_override
            .unwrap_or_else(|| bytes::u16_le(&self.data[0x26..]) as f64 / 1000.0)
    }

    fn ngasmixes(&self) -> usize {
        self.data[0x2a] as usize
    }

    fn check_header(&self) -> Result<()> {
        if self.data.len() < SZ_HEADER {
            return Err(Error::DataFormat("Cobalt blob shorter than fixed header".into()));
        }
        Ok(())
    }
}

impl Parser for AtomicsCobaltParser {
    fn set_data(&mut self, data: Vec<u8>) -> Result<()> {
        self.data = data;
        Ok(())
    }

    fn get_datetime(&mut self) -> Result<ParsedDateTime> {
        self.check_header()?;
        let p = &self.data;
        Ok(ParsedDateTime {
            year: bytes::u16_le(&p[0x14..]) as i32,
            month: p[0x16] as u32,
            day: p[0x17] as u32,
            hour: p[0x18] as u32,
            minute: p[0x19] as u32,
            second: 0,
        })
    }

    fn get_field(&mut self, field: Field) -> Result<FieldValue> {
        self.check_header()?;
        let p = &self.data;
        let atmospheric = self.atmospheric();
        match field {
            Field::DiveTime => Ok(FieldValue::Seconds(bytes::u16_le(&p[0x58..]) as u32 * 60)),
            Field::MaxDepth => {
                let raw = bytes::u16_le(&p[0x56..]) as f64 / 1000.0;
                Ok(FieldValue::Depth((raw - atmospheric) / (HYDROSTATIC / 1.0e5) ))
            }
            Field::GasMixCount | Field::TankCount => Ok(FieldValue::Count(p[0x2a] as usize)),
            Field::GasMix(i) => {
                let off = SZ_HEADER + SZ_GASMIX * i;
                if off + 6 > p.len() {
                    return Err(Error::InvalidArgs("gas mix index out of range".into()));
                }
                Ok(FieldValue::GasMix(GasMix::from_o2_he_percent(p[off + 4], p[off + 5])))
            }
            Field::TempSurface => Ok(FieldValue::Temperature((p[0x1B] as f64 - 32.0) * 5.0 / 9.0)),
            Field::Tank(i) => {
                let off = SZ_HEADER + SZ_GASMIX * i;
                if off + SZ_GASMIX > p.len() {
                    return Err(Error::InvalidArgs("tank index out of range".into()));
                }
                let kind_byte = p[off + 2];
                let (kind, volume_l, work_pressure_bar) = match kind_byte {
                    1 | 2 => {
                        let wp = bytes::u16_le(&p[off + 10..]);
                        if wp == 0 {
                            return Err(Error::DataFormat("zero imperial work pressure".into()));
                        }
                        let vol_cuft = bytes::u16_le(&p[off + 8..]) as f64 * 28.3168 * 1000.0;
                        (TankType::Imperial, vol_cuft / (wp as f64 * 0.0689476 / 1.01325), wp as f64 * 0.0689476)
                    }
                    3 => (TankType::Metric, bytes::u16_le(&p[off + 8..]) as f64 / 10.0, 0.0),
                    _ => return Err(Error::DataFormat("unknown tank volume type".into())),
                };
                Ok(FieldValue::Tank(Tank {
                    gasmix_index: Some(i),
                    kind,
                    volume_l,
                    work_pressure_bar,
                    begin_pressure_bar: bytes::u16_le(&p[off + 6..]) as f64 * 0.0689476,
                    end_pressure_bar: bytes::u16_le(&p[off + 14..]) as f64 * 0.0689476,
                }))
            }
            Field::DiveMode => match p[0x24] {
                0 | 2 => Ok(FieldValue::DiveMode(DiveMode::Air)),
                1 => Ok(FieldValue::DiveMode(DiveMode::Ccr)),
                _ => Err(Error::DataFormat("unknown dive mode byte".into())),
            },
            Field::String(0) => Ok(FieldValue::Text(
                "Serial".into(),
                format!(
                    "{}{}{}{}-{}{}{}{}",
                    p[4] as char, p[5] as char, p[6] as char, p[7] as char,
                    p[8] as char, p[9] as char, p[10] as char, p[11] as char,
                ),
            )),
            Field::String(1) => Ok(FieldValue::Text(
                "Program Version".into(),
                format!("{:.2}", bytes::u16_le(&p[30..]) as f64 / 100.0),
            )),
            _ => Err(Error::Unsupported),
        }
    }

    fn samples_foreach(&mut self, callback: &mut SampleCallback) -> Result<()> {
        self.check_header()?;
        let data = &self.data;
        let interval = data[0x1a] as u32;
        let ngasmixes = self.ngasmixes();
        let nswitches = data[0x2b] as usize;
        let header_end = SZ_HEADER + SZ_GASMIX * ngasmixes + 6 * nswitches;
        if data.len() < header_end {
            return Err(Error::DataFormat("Cobalt blob shorter than gas/switch tables".into()));
        }
        let atmospheric = self.atmospheric();

        let mut tank = 0usize;
        while tank < ngasmixes {
            let sensor = bytes::u16_le(&data[SZ_HEADER + SZ_GASMIX * tank + 12..]);
            if sensor == 1 {
                break;
            }
            tank += 1;
        }
        if tank >= ngasmixes {
            return Err(Error::DataFormat("no primary tank flagged in gas table".into()));
        }

        let mut gasmix_previous: Option<u8> = None;
        let mut latch = CobaltDecoLatch::default();
        let mut time = 0u32;
        let mut offset = header_end;

        while offset + SZ_SEGMENT <= data.len() {
            time += interval;
            if !callback(Sample::Time(time)) {
                return Ok(());
            }

            let depth_raw = bytes::u16_le(&data[offset..]) as f64 / 1000.0;
            if !callback(Sample::Depth((depth_raw - atmospheric) / (HYDROSTATIC / 1.0e5))) {
                return Ok(());
            }

            let pressure_psi = bytes::u16_le(&data[offset + 2..]) as f64;
            if !callback(Sample::Pressure {
                tank_index: tank,
                bar: pressure_psi * 0.0689476,
            }) {
                return Ok(());
            }

            let gasmix = data[offset + 4];
            if gasmix_previous != Some(gasmix) {
                let mut idx = 0;
                while idx < ngasmixes && data[SZ_HEADER + SZ_GASMIX * idx] != gasmix {
                    idx += 1;
                }
                if idx >= ngasmixes {
                    return Err(Error::DataFormat("sample referenced unknown gas mix".into()));
                }
                if !callback(Sample::GasMix { index: idx }) {
                    return Ok(());
                }
                gasmix_previous = Some(gasmix);
            }

            let temperature_f = data[offset + 8] as f64;
            if !callback(Sample::Temperature((temperature_f - 32.0) * 5.0 / 9.0)) {
                return Ok(());
            }

            let violation = data[offset + 11];
            if violation & 0x01 != 0 {
                if !callback(Sample::Event { kind: 1, time_offset: 0, flags: 0, value: 0 }) {
                    return Ok(());
                }
            }
            if violation & 0x04 != 0 {
                if !callback(Sample::Event { kind: 2, time_offset: 0, flags: 0, value: 0 }) {
                    return Ok(());
                }
            }
            if violation & 0x08 != 0 {
                if !callback(Sample::Event { kind: 3, time_offset: 0, flags: 0, value: 0 }) {
                    return Ok(());
                }
            }

            let ndl_s = data[offset + 5] as u32 * 60;
            let (kind, time_s) = latch.update(ndl_s, violation & 0x02 != 0);
            if !callback(Sample::Deco(Deco {
                kind,
                time_s,
                depth_m: 0.0,
            })) {
                return Ok(());
            }

            offset += SZ_SEGMENT;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob() -> Vec<u8> {
        let ngasmixes = 1;
        let mut data = vec![0u8; SZ_HEADER + SZ_GASMIX * ngasmixes + SZ_SEGMENT];
        data[0x2a] = ngasmixes as u8;
        data[0x1a] = 10; // interval
        // gas mix 0: sensor primary, tag 0x10, o2=21 he=0
        data[SZ_HEADER] = 0x10;
        data[SZ_HEADER + 4] = 21;
        data[SZ_HEADER + 5] = 0;
        data[SZ_HEADER + 12..SZ_HEADER + 14].copy_from_slice(&1u16.to_le_bytes());

        let seg = SZ_HEADER + SZ_GASMIX * ngasmixes;
        data[seg..seg + 2].copy_from_slice(&1025u16.to_le_bytes());
        data[seg + 4] = 0x10; // gasmix tag matches
        data[seg + 8] = 60; // temp raw

        data
    }

    #[test]
    fn samples_emit_time_then_depth_then_pressure() {
        let mut parser = AtomicsCobaltParser::new();
        parser.set_data(blob()).unwrap();
        let mut order = Vec::new();
        parser
            .samples_foreach(&mut |s| {
                order.push(format!("{s:?}"));
                true
            })
            .unwrap();
        assert!(order[0].starts_with("Time"));
        assert!(order[1].starts_with("Depth"));
        assert!(order[2].starts_with("Pressure"));
    }

    #[test]
    fn deco_latch_clears_and_sets_through_the_sample_loop() {
        let mut parser = AtomicsCobaltParser::new();
        parser.set_data(blob()).unwrap();
        let mut saw_decostop = false;
        parser
            .samples_foreach(&mut |s| {
                if let Sample::Deco(d) = s {
                    if d.kind == DecoKind::Ndl {
                        saw_decostop = true;
                    }
                }
                true
            })
            .unwrap();
        assert!(saw_decostop);
    }
}

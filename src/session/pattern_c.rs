//! Pattern C: passive dump (Uwatec Aladin family). Grounded
//! directly on `uwatec_aladin.c`'s `uwatec_aladin_device_dump` (preamble
//! scan, bit-reverse, additive checksum, clock capture) and
//! `uwatec_aladin_extract_dives` (backward ring scan building one 18-byte
//! header + variable profile buffer per dive); constants preserved exactly.

use crate::channel::ByteChannel;
use crate::checksum;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::event::{ClockSync, DeviceInfo, Event, EventSink};
use crate::ringbuf;
use crate::sample::DiveBlob;
use crate::session::{DiveCallback, Session, SessionBase};

const SZ_MEMORY: usize = 2048;
const RB_PROFILE_BEGIN: u32 = 0x000;
const RB_PROFILE_END: u32 = 0x600;
const HEADER: usize = 4;

fn rb_next(a: u32) -> Result<u32> {
    ringbuf::increment(a, 1, RB_PROFILE_BEGIN, RB_PROFILE_END)
}

fn rb_distance(a: u32, b: u32) -> Result<u32> {
    ringbuf::distance(a, b, false, RB_PROFILE_BEGIN, RB_PROFILE_END)
}

pub struct UwatecAladinSession<C: ByteChannel> {
    channel: C,
    base: SessionBase,
    /// Caller-set fingerprint: the last-seen dive's little-endian
    /// timestamp; dives with `timestamp <= fingerprint` are not re-yielded.
    timestamp: u32,
}

impl<C: ByteChannel> UwatecAladinSession<C> {
    pub fn open(mut channel: C, context: Context) -> Result<Self> {
        use crate::channel::Parity;
        channel.set_baud(19_200)?;
        channel.set_line(8, Parity::None, 1)?;
        channel.set_timeout(None)?; // infinite: passive dump, no command to time out on.
        channel.set_dtr(true)?;
        channel.set_rts(false)?;
        Ok(UwatecAladinSession {
            channel,
            base: SessionBase::new(context),
            timestamp: 0,
        })
    }

    /// Wait for the `55 55 55 00` preamble, read the rest of the fixed
    /// `SZ_MEMORY + 2` byte package, bit-reverse it, verify the additive
    /// checksum, and capture the host/device clock anchor.
    fn dump(&mut self, sink: &mut dyn EventSink) -> Result<Vec<u8>> {
        let mut answer = vec![0u8; SZ_MEMORY + 2];

        sink.on_event(&Event::Progress {
            current: 0,
            maximum: (SZ_MEMORY + 2) as u64,
        });

        let mut i = 0usize;
        while i < 4 {
            self.base.context.check()?;
            let mut byte = [0u8; 1];
            self.channel.read_exact_backoff(&mut byte)?;
            answer[i] = byte[0];
            let expected = if i < 3 { 0x55 } else { 0x00 };
            if answer[i] == expected {
                i += 1;
            } else {
                i = 0;
                sink.on_event(&Event::Waiting);
            }
        }

        let host_ticks = host_ticks_now();

        sink.on_event(&Event::Progress {
            current: 4,
            maximum: (SZ_MEMORY + 2) as u64,
        });

        self.channel.read_exact_backoff(&mut answer[4..])?;

        sink.on_event(&Event::Progress {
            current: (SZ_MEMORY + 2) as u64,
            maximum: (SZ_MEMORY + 2) as u64,
        });

        crate::bytes::reverse_bits(&mut answer);

        let crc = crate::bytes::u16_le(&answer[SZ_MEMORY..]);
        let ccrc = checksum::additive_u16(&answer[..SZ_MEMORY]);
        if ccrc != crc {
            return Err(Error::Protocol("unexpected answer checksum".into()));
        }

        let device_ticks = crate::bytes::u32_be(&answer[HEADER + 0x7f8..]);
        sink.on_event(&Event::ClockSync(ClockSync {
            host_ticks,
            device_ticks,
        }));

        answer.truncate(SZ_MEMORY);
        Ok(answer)
    }
}

fn host_ticks_now() -> i64 {
    // The source calls dc_datetime_now() here; this crate never reads wall
    // clock time itself, so the caller-observable value is zero unless a
    // clock anchor is threaded in by the embedder.
    0
}

impl<C: ByteChannel> Session for UwatecAladinSession<C> {
    fn set_fingerprint(&mut self, fingerprint: &[u8]) -> Result<()> {
        if fingerprint.is_empty() {
            self.timestamp = 0;
            return Ok(());
        }
        if fingerprint.len() != 4 {
            return Err(Error::InvalidArgs("Aladin fingerprint must be 4 bytes".into()));
        }
        self.timestamp = crate::bytes::u32_le(fingerprint);
        Ok(())
    }

    fn foreach(&mut self, sink: &mut dyn EventSink, callback: &mut DiveCallback) -> Result<()> {
        let data = self.dump(sink)?;

        let info = DeviceInfo {
            model: data[HEADER + 0x7bc] as u16,
            firmware: 0,
            serial: u24_be(&data[HEADER + 0x7ed..]),
        };
        sink.on_event(&Event::DeviceInfo(info));

        extract_dives(&data, self.timestamp, callback)
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

fn u24_be(b: &[u8]) -> u32 {
    ((b[0] as u32) << 16) | ((b[1] as u32) << 8) | b[2] as u32
}

/// Backward scan of the logbook (37 fixed slots, ring-buffer-with-
/// logbook-pointer layout) and the profile ring, building one
/// 18-byte-header + variable-length-profile buffer per dive. Preserved
/// exactly from `uwatec_aladin_extract_dives`.
fn extract_dives(data: &[u8], stop_at_timestamp: u32, callback: &mut DiveCallback) -> Result<()> {
    if data.len() < SZ_MEMORY {
        return Err(Error::DataFormat("dump shorter than SZ_MEMORY".into()));
    }

    let mut ndives = crate::bytes::u16_be(&data[HEADER + 0x7f2..]) as u32;
    if ndives > 37 {
        ndives = 37;
    }

    let eol = (data[HEADER + 0x7f4] as u32 + 37 - 1) % 37;
    let eop = rb_next(
        data[HEADER + 0x7f6] as u32 + (((data[HEADER + 0x7f7] & 0x0F) as u32 >> 1) << 8),
    )?;

    let mut profiles_remaining = true;
    let mut previous = eop;
    let mut current = eop;

    for i in 0..ndives {
        let offset = (((eol + 37 - i) % 37) * 12 + RB_PROFILE_END) as usize;

        let mut header = [0u8; 18];
        header[0..3].copy_from_slice(&data[HEADER + 0x07ed..HEADER + 0x07ed + 3]);
        header[3] = data[HEADER + 0x07bc];
        header[4..16].copy_from_slice(&data[HEADER + offset..HEADER + offset + 12]);
        // Convert the big-endian Aladin timestamp to little-endian, stored
        // at header offset 11 (overlaps the tail of the logbook copy).
        let mut ts = [header[11], header[12], header[13], header[14]];
        ts.reverse();
        header[11..15].copy_from_slice(&ts);

        let mut profile = Vec::new();

        if profiles_remaining {
            let mut found = None;
            loop {
                if current == RB_PROFILE_BEGIN {
                    current = RB_PROFILE_END;
                }
                current -= 1;

                if data[HEADER + current as usize] == 0xFF {
                    found = Some(rb_distance(current, previous)?);
                    previous = current;
                    break;
                }

                if current == eop {
                    break;
                }
            }

            if let Some(mut len) = found {
                if len >= 1 {
                    len -= 1;
                    let begin = rb_next(current)?;
                    if begin + len > RB_PROFILE_END {
                        let a = (RB_PROFILE_END - begin) as usize;
                        let b = (begin + len - RB_PROFILE_END) as usize;
                        profile.extend_from_slice(&data[HEADER + begin as usize..HEADER + begin as usize + a]);
                        profile.extend_from_slice(&data[HEADER..HEADER + b]);
                    } else {
                        profile.extend_from_slice(&data[HEADER + begin as usize..HEADER + begin as usize + len as usize]);
                    }
                }
            }

            if current == eop {
                profiles_remaining = false;
            }
        }

        let timestamp = crate::bytes::u32_le(&header[11..15]);
        if timestamp <= stop_at_timestamp {
            return Ok(());
        }

        let mut bytes = header.to_vec();
        bytes.extend_from_slice(&profile);

        let blob = DiveBlob {
            bytes,
            fingerprint_offset: 11,
            fingerprint_len: 4,
        };
        if !callback(blob) {
            return Ok(());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::FixtureChannel;
    use crate::event::RecordingSink;

    fn empty_dump_bytes() -> Vec<u8> {
        // ndives = 0 at HEADER+0x7f2.
        let body = vec![0u8; SZ_MEMORY];
        let crc = checksum::additive_u16(&body);

        let mut reversed = body.clone();
        reversed.extend_from_slice(&crc.to_le_bytes());
        crate::bytes::reverse_bits(&mut reversed);

        let mut preamble = [0x55u8, 0x55, 0x55, 0x00];
        crate::bytes::reverse_bits(&mut preamble);

        let mut wire = preamble.to_vec();
        wire.extend_from_slice(&reversed[4..]);
        wire
    }

    #[test]
    fn empty_logbook_yields_no_callbacks() {
        let mut ch = FixtureChannel::new();
        ch.push_reply(&empty_dump_bytes());

        let mut session = UwatecAladinSession::open(ch, Context::new()).unwrap();
        let mut sink = RecordingSink::default();
        let mut calls = 0;
        session
            .foreach(&mut sink, &mut |_blob| {
                calls += 1;
                true
            })
            .unwrap();
        assert_eq!(calls, 0);
    }
}

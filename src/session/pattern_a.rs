//! Pattern A: command/echo/data/ready framing (OSTC family, HW Frog).
//! Grounded directly on `hw_frog.c`'s `hw_frog_transfer` and
//! `hw_frog_device_foreach`; constants preserved exactly.

use crate::channel::ByteChannel;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::event::{DeviceInfo, Event, EventSink};
use crate::ringbuf;
use crate::sample::DiveBlob;
use crate::session::{DiveCallback, Session, SessionBase};

const READY: u8 = 0x4D;
const HEADER: u8 = 0x61;
const CLOCK: u8 = 0x62;
const CUSTOMTEXT: u8 = 0x63;
const DIVE: u8 = 0x66;
const IDENTITY: u8 = 0x69;
const DISPLAY: u8 = 0x6E;
const INIT: u8 = 0xBB;
const EXIT: u8 = 0xFF;

const SZ_CUSTOMTEXT: usize = 13;
const SZ_DISPLAY: usize = 15;
const SZ_VERSION: usize = SZ_CUSTOMTEXT + 4;

const RB_LOGBOOK_SIZE: u32 = 256;
const RB_LOGBOOK_COUNT: u32 = 256;
const RB_PROFILE_BEGIN: u32 = 0x000000;
const RB_PROFILE_END: u32 = 0x200000;

const FINGERPRINT_LEN: usize = 5;
const FINGERPRINT_OFFSET: usize = 9;
const DIVE_NUMBER_OFFSET: usize = 52;
const RING_BEGIN_OFFSET: usize = 2;
const RING_END_OFFSET: usize = 5;

fn ring_distance(begin: u32, end: u32) -> Result<u32> {
    ringbuf::distance(begin, end, false, RB_PROFILE_BEGIN, RB_PROFILE_END)
}

/// HW Frog / OSTC family session, Pattern A.
pub struct HwFrogSession<C: ByteChannel> {
    channel: C,
    base: SessionBase,
}

impl<C: ByteChannel> HwFrogSession<C> {
    /// Open the session: configure 115200 8N1, settle, send `INIT`.
    pub fn open(mut channel: C, context: Context) -> Result<Self> {
        use crate::channel::{FlowControl, Parity};
        channel.set_baud(115_200)?;
        channel.set_line(8, Parity::None, 1)?;
        channel.set_flowcontrol(FlowControl::None)?;
        channel.set_timeout(Some(std::time::Duration::from_millis(3000)))?;
        channel.sleep(300);
        channel.flush(crate::channel::Queue::Both)?;

        let mut session = HwFrogSession {
            channel,
            base: SessionBase::new(context),
        };
        session.transfer(None, INIT, None, None)?;
        Ok(session)
    }

    /// Command/echo/data/ready framing, grounded verbatim on
    /// `hw_frog_transfer`. `INIT` and `HEADER` skip the echo; `EXIT` skips
    /// the trailing ready byte.
    fn transfer(
        &mut self,
        sink: Option<&mut dyn EventSink>,
        cmd: u8,
        input: Option<&[u8]>,
        output: Option<&mut [u8]>,
    ) -> Result<()> {
        self.base.context.check()?;

        self.channel.write_all(&[cmd])?;

        if cmd != INIT && cmd != HEADER {
            let mut echo = [0u8; 1];
            self.channel.read_exact_backoff(&mut echo)?;
            if echo[0] != cmd {
                return Err(Error::Protocol("unexpected echo".into()));
            }
        }

        if let Some(input) = input {
            self.channel.write_all(input)?;
        }

        if let Some(output) = output {
            let osize = output.len();
            let mut nbytes = 0usize;
            let mut sink = sink;
            while nbytes < osize {
                let mut len = 1024usize;
                let available = self.channel.bytes_available()? as usize;
                if available > len {
                    len = available;
                }
                if nbytes + len > osize {
                    len = osize - nbytes;
                }
                self.channel
                    .read_exact_backoff(&mut output[nbytes..nbytes + len])?;
                nbytes += len;
                if let Some(sink) = sink.as_deref_mut() {
                    sink.on_event(&Event::Progress {
                        current: nbytes as u64,
                        maximum: osize as u64,
                    });
                }
            }
        }

        if cmd != EXIT {
            let mut ready = [0u8; 1];
            self.channel.read_exact_backoff(&mut ready)?;
            if ready[0] != READY {
                return Err(Error::Protocol("unexpected ready byte".into()));
            }
        }

        Ok(())
    }

    fn version(&mut self) -> Result<[u8; SZ_VERSION]> {
        let mut id = [0u8; SZ_VERSION];
        self.transfer(None, IDENTITY, None, Some(&mut id))?;
        Ok(id)
    }
}

impl<C: ByteChannel> Session for HwFrogSession<C> {
    fn set_fingerprint(&mut self, fingerprint: &[u8]) -> Result<()> {
        if !fingerprint.is_empty() && fingerprint.len() != FINGERPRINT_LEN {
            return Err(Error::InvalidArgs(format!(
                "HW Frog fingerprint must be {FINGERPRINT_LEN} bytes"
            )));
        }
        self.base.fingerprint = fingerprint.to_vec();
        Ok(())
    }

    fn foreach(&mut self, sink: &mut dyn EventSink, callback: &mut DiveCallback) -> Result<()> {
        let total_estimate =
            (RB_LOGBOOK_SIZE as u64 * RB_LOGBOOK_COUNT as u64) + (RB_PROFILE_END - RB_PROFILE_BEGIN) as u64;
        sink.on_event(&Event::Progress {
            current: 0,
            maximum: total_estimate,
        });

        let id = self.version()?;
        let info = DeviceInfo {
            model: 0,
            firmware: crate::bytes::u16_be(&id[2..4]) as u32,
            serial: crate::bytes::u16_le(&id[0..2]) as u32,
        };
        sink.on_event(&Event::DeviceInfo(info));

        let mut header = vec![0u8; (RB_LOGBOOK_SIZE * RB_LOGBOOK_COUNT) as usize];
        self.transfer(None, HEADER, None, Some(&mut header))?;

        let slot_size = RB_LOGBOOK_SIZE as usize;
        let mut count = 0u32;
        let mut latest = 0u32;
        let mut maximum = 0u32;
        for i in 0..RB_LOGBOOK_COUNT {
            let offset = i as usize * slot_size;
            if header[offset..offset + slot_size].iter().all(|&b| b == 0xFF) {
                break;
            }
            let current = crate::bytes::u16_le(&header[offset + DIVE_NUMBER_OFFSET..]) as u32;
            if current > maximum {
                maximum = current;
                latest = i;
            }
            count += 1;
        }

        let mut ndives = 0u32;
        let mut size = 0u32;
        let mut maxsize = 0usize;
        for i in 0..count {
            let idx = (latest + RB_LOGBOOK_COUNT - i) % RB_LOGBOOK_COUNT;
            let offset = idx as usize * slot_size;
            let begin = crate::bytes::u24_le(&header[offset + RING_BEGIN_OFFSET..]);
            let end = crate::bytes::u24_le(&header[offset + RING_END_OFFSET..]);
            if begin < RB_PROFILE_BEGIN || begin >= RB_PROFILE_END || end < RB_PROFILE_BEGIN || end >= RB_PROFILE_END
            {
                return Err(Error::DataFormat("invalid ring-buffer pointer in logbook".into()));
            }
            let length = RB_LOGBOOK_SIZE as usize + ring_distance(begin, end)? as usize - 6;

            if &header[offset + FINGERPRINT_OFFSET..offset + FINGERPRINT_OFFSET + FINGERPRINT_LEN]
                == self.base.fingerprint.as_slice()
                && !self.base.fingerprint.is_empty()
            {
                break;
            }

            if length > maxsize {
                maxsize = length;
            }
            size += length as u32;
            ndives += 1;
        }

        sink.on_event(&Event::Progress {
            current: 0,
            maximum: (RB_LOGBOOK_SIZE * RB_LOGBOOK_COUNT) as u64 + size as u64,
        });

        if ndives == 0 {
            return Ok(());
        }

        for i in 0..ndives {
            self.base.context.check()?;
            let idx = (latest + RB_LOGBOOK_COUNT - i) % RB_LOGBOOK_COUNT;
            let offset = idx as usize * slot_size;
            let begin = crate::bytes::u24_le(&header[offset + RING_BEGIN_OFFSET..]);
            let end = crate::bytes::u24_le(&header[offset + RING_END_OFFSET..]);
            let length = RB_LOGBOOK_SIZE as usize + ring_distance(begin, end)? as usize - 6;

            let mut profile = vec![0u8; length];
            self.transfer(Some(sink), DIVE, Some(&[idx as u8]), Some(&mut profile))?;

            if profile[..slot_size] != header[offset..offset + slot_size] {
                return Err(Error::Protocol("dive profile header mismatch".into()));
            }

            let blob = DiveBlob {
                bytes: profile,
                fingerprint_offset: FINGERPRINT_OFFSET,
                fingerprint_len: FINGERPRINT_LEN,
            };
            if !callback(blob) {
                break;
            }
        }

        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.transfer(None, EXIT, None, None)
    }

    fn set_clock(&mut self, datetime: crate::datetime::ParsedDateTime) -> Result<()> {
        let packet = [
            datetime.hour as u8,
            datetime.minute as u8,
            datetime.second as u8,
            datetime.month as u8,
            datetime.day as u8,
            (datetime.year - 2000) as u8,
        ];
        self.transfer(None, CLOCK, Some(&packet), None)
    }

    fn display_text(&mut self, text: &str) -> Result<()> {
        let packet = pad_spaces::<SZ_DISPLAY>(text)?;
        self.transfer(None, DISPLAY, Some(&packet), None)
    }

    fn custom_text(&mut self, text: &str) -> Result<()> {
        let packet = pad_spaces::<SZ_CUSTOMTEXT>(text)?;
        self.transfer(None, CUSTOMTEXT, Some(&packet), None)
    }
}

fn pad_spaces<const N: usize>(text: &str) -> Result<[u8; N]> {
    let bytes = text.as_bytes();
    if bytes.len() > N {
        return Err(Error::InvalidArgs(format!("text longer than {N} bytes")));
    }
    let mut packet = [0x20u8; N];
    packet[..bytes.len()].copy_from_slice(bytes);
    Ok(packet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::FixtureChannel;
    use crate::event::RecordingSink;

    fn open_exit_fixture() -> FixtureChannel {
        let mut ch = FixtureChannel::new();
        // INIT: no echo, ready byte.
        ch.push_reply(&[READY]);
        ch
    }

    #[test]
    fn open_exit_round_trip_seed_scenario() {
        let mut ch = open_exit_fixture();
        // IDENTITY: echo + 17-byte payload + ready.
        ch.push_reply(&[IDENTITY]);
        ch.push_reply(&[0x12, 0x34, 0x00, 0x5A]);
        ch.push_reply(&[0u8; SZ_VERSION - 4]);
        ch.push_reply(&[READY]);

        let mut session = HwFrogSession::open(ch, Context::new()).unwrap();
        let id = session.version().unwrap();
        assert_eq!(crate::bytes::u16_le(&id[0..2]), 0x3412);
        assert_eq!(crate::bytes::u16_be(&id[2..4]), 0x005A);

        session.close().unwrap();

        let writes = &session.channel.writes;
        assert_eq!(writes[0], vec![INIT]);
        assert_eq!(writes[1], vec![IDENTITY]);
        assert_eq!(writes[2], vec![EXIT]);
    }

    #[test]
    fn empty_logbook_yields_no_callbacks() {
        let mut ch = open_exit_fixture();
        ch.push_reply(&[IDENTITY]);
        ch.push_reply(&[0u8; SZ_VERSION]);
        ch.push_reply(&[READY]);
        ch.push_reply(&[0xFFu8; (RB_LOGBOOK_SIZE * RB_LOGBOOK_COUNT) as usize]);
        ch.push_reply(&[READY]);

        let mut session = HwFrogSession::open(ch, Context::new()).unwrap();
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
